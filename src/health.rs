//! Gateway health report

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::{GatewayConfig, ResolvedPaths, MAX_TIMEOUT_MS, MIN_TIMEOUT_MS};
use crate::fs_utils::is_writable_dir;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Degraded => "degraded",
            Self::Unhealthy => "unhealthy",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthCheck {
    pub name: String,
    pub status: HealthStatus,
    pub message: String,
}

impl HealthCheck {
    fn new(name: impl Into<String>, status: HealthStatus, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub status: HealthStatus,
    pub version: String,
    pub checked_at: DateTime<Utc>,
    pub checks: Vec<HealthCheck>,
}

impl HealthReport {
    pub fn is_unhealthy(&self) -> bool {
        self.status == HealthStatus::Unhealthy
    }
}

/// Missing directories are created on demand, so they only degrade
fn directory_check(name: &str, dir: &Path) -> HealthCheck {
    if !dir.exists() {
        HealthCheck::new(
            name,
            HealthStatus::Degraded,
            format!("{} does not exist yet", dir.display()),
        )
    } else if !dir.is_dir() {
        HealthCheck::new(
            name,
            HealthStatus::Unhealthy,
            format!("{} is not a directory", dir.display()),
        )
    } else if !is_writable_dir(dir) {
        HealthCheck::new(
            name,
            HealthStatus::Unhealthy,
            format!("{} is not writable", dir.display()),
        )
    } else {
        HealthCheck::new(name, HealthStatus::Healthy, format!("{} is writable", dir.display()))
    }
}

/// Check directories, timeout configuration and the tool registry
pub fn check_health(config: &GatewayConfig, paths: &ResolvedPaths, tool_count: usize) -> HealthReport {
    let mut checks = vec![
        directory_check("rollback-state", &paths.rollback_dir.join("state")),
        directory_check("rollback-snapshots", &paths.rollback_dir.join("snapshots")),
        directory_check("transactions", &paths.transaction_dir),
    ];
    if config.analysis_cache.enabled {
        checks.push(directory_check("analysis-cache", &paths.cache_dir));
    }

    let out_of_range: Vec<String> = config
        .timeout_values()
        .into_iter()
        .filter(|(_, value)| !(MIN_TIMEOUT_MS..=MAX_TIMEOUT_MS).contains(value))
        .map(|(name, value)| format!("{}={}ms", name, value))
        .collect();
    checks.push(if out_of_range.is_empty() {
        HealthCheck::new("timeouts", HealthStatus::Healthy, "all timeouts within 1s-1h")
    } else {
        HealthCheck::new(
            "timeouts",
            HealthStatus::Unhealthy,
            format!("outside 1s-1h: {}", out_of_range.join(", ")),
        )
    });

    checks.push(if tool_count > 0 {
        HealthCheck::new("tools", HealthStatus::Healthy, format!("{} tool(s) registered", tool_count))
    } else {
        HealthCheck::new("tools", HealthStatus::Unhealthy, "no tools registered")
    });

    let status = checks
        .iter()
        .map(|c| c.status)
        .max()
        .unwrap_or(HealthStatus::Healthy);

    HealthReport {
        status,
        version: env!("CARGO_PKG_VERSION").to_string(),
        checked_at: Utc::now(),
        checks,
    }
}
