//! Gateway configuration management.
//!
//! Configuration is read from `<project>/.context-gateway/config.toml` (or an
//! explicit `--config` path). Every section has serde defaults, so a missing
//! file or a partial file yields a usable configuration.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{GatewayError, Result};

/// Name of the per-project state directory
pub const STATE_DIR_NAME: &str = ".context-gateway";

/// Lower bound accepted for any timeout value (1 second)
pub const MIN_TIMEOUT_MS: u64 = 1_000;
/// Upper bound accepted for any timeout value (1 hour)
pub const MAX_TIMEOUT_MS: u64 = 3_600_000;

/// Top-level gateway configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GatewayConfig {
    #[serde(default)]
    pub paths: PathsConfig,

    #[serde(default)]
    pub timeouts: TimeoutConfig,

    #[serde(default)]
    pub sessions: SessionConfig,

    #[serde(default)]
    pub rollback: RetentionPolicy,

    #[serde(default)]
    pub impact: ImpactConfig,

    #[serde(default)]
    pub granular: GranularConfig,

    #[serde(default)]
    pub analysis_cache: AnalysisCacheConfig,

    #[serde(default)]
    pub coordination: CoordinationConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Filesystem layout. Relative paths resolve against the project root.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Directory holding generated domain context documents
    #[serde(default = "default_context_dir")]
    pub context_dir: PathBuf,

    /// Rollback store root (`state/` + `snapshots/`)
    #[serde(default = "default_rollback_dir")]
    pub rollback_dir: PathBuf,

    /// Per-transaction backup directories of the atomic mutation engine
    #[serde(default = "default_transaction_dir")]
    pub transaction_dir: PathBuf,

    /// Semantic analysis cache
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,
}

fn default_context_dir() -> PathBuf {
    PathBuf::from(".context")
}

fn default_rollback_dir() -> PathBuf {
    PathBuf::from(STATE_DIR_NAME).join("rollback")
}

fn default_transaction_dir() -> PathBuf {
    PathBuf::from(STATE_DIR_NAME).join("transactions")
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from(STATE_DIR_NAME).join("analysis-cache")
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            context_dir: default_context_dir(),
            rollback_dir: default_rollback_dir(),
            transaction_dir: default_transaction_dir(),
            cache_dir: default_cache_dir(),
        }
    }
}

/// Timeout budgets, all in milliseconds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutConfig {
    /// Default wall-clock budget for one holistic update
    #[serde(default = "default_performance_timeout")]
    pub performance_timeout_ms: u64,

    /// How long the coordinator waits on an approval gate
    #[serde(default = "default_approval_timeout")]
    pub approval_timeout_ms: u64,

    /// Budget for rolling back a failed coordination plan
    #[serde(default = "default_rollback_timeout")]
    pub rollback_timeout_ms: u64,

    /// Interval between background maintenance sweeps
    #[serde(default = "default_maintenance_interval")]
    pub maintenance_interval_ms: u64,
}

fn default_performance_timeout() -> u64 {
    30_000
}

fn default_approval_timeout() -> u64 {
    300_000
}

fn default_rollback_timeout() -> u64 {
    60_000
}

fn default_maintenance_interval() -> u64 {
    900_000
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            performance_timeout_ms: default_performance_timeout(),
            approval_timeout_ms: default_approval_timeout(),
            rollback_timeout_ms: default_rollback_timeout(),
            maintenance_interval_ms: default_maintenance_interval(),
        }
    }
}

/// Session limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,

    /// Idle time after which a session is swept (milliseconds)
    #[serde(default = "default_session_timeout")]
    pub session_timeout_ms: u64,

    /// Interval of the idle-session sweep (milliseconds)
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_ms: u64,
}

fn default_max_sessions() -> usize {
    100
}

fn default_session_timeout() -> u64 {
    1_800_000
}

fn default_sweep_interval() -> u64 {
    60_000
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_sessions: default_max_sessions(),
            session_timeout_ms: default_session_timeout(),
            sweep_interval_ms: default_sweep_interval(),
        }
    }
}

/// Rollback snapshot retention
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionPolicy {
    #[serde(default = "default_max_age_hours")]
    pub max_age_hours: u64,

    #[serde(default = "default_max_snapshots")]
    pub max_snapshots: usize,

    /// Cleanup reasons that actually run a sweep (`manual` always does)
    #[serde(default = "default_cleanup_triggers")]
    pub cleanup_triggers: Vec<String>,

    /// Also remove snapshots beyond `max_snapshots` that are not yet expired
    #[serde(default)]
    pub aggressive_cleanup: bool,
}

fn default_max_age_hours() -> u64 {
    168
}

fn default_max_snapshots() -> usize {
    50
}

fn default_cleanup_triggers() -> Vec<String> {
    vec![
        "startup".to_string(),
        "post-update".to_string(),
        "scheduled".to_string(),
    ]
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            max_age_hours: default_max_age_hours(),
            max_snapshots: default_max_snapshots(),
            cleanup_triggers: default_cleanup_triggers(),
            aggressive_cleanup: false,
        }
    }
}

impl RetentionPolicy {
    pub fn max_age(&self) -> chrono::Duration {
        chrono::Duration::hours(self.max_age_hours as i64)
    }
}

/// Impact prediction tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImpactConfig {
    /// No impact node may reach this depth
    #[serde(default = "default_max_depth")]
    pub max_propagation_depth: usize,

    /// Edges weaker than this are flagged as low-confidence
    #[serde(default = "default_low_confidence")]
    pub low_confidence_threshold: f64,

    /// Dependents count above which a domain is a fan-out risk
    #[serde(default = "default_fan_out")]
    pub fan_out_threshold: usize,

    /// Upper bound on files walked when building the domain map
    #[serde(default = "default_max_files")]
    pub max_files: usize,
}

fn default_max_depth() -> usize {
    3
}

fn default_low_confidence() -> f64 {
    0.4
}

fn default_fan_out() -> usize {
    4
}

fn default_max_files() -> usize {
    5_000
}

impl Default for ImpactConfig {
    fn default() -> Self {
        Self {
            max_propagation_depth: default_max_depth(),
            low_confidence_threshold: default_low_confidence(),
            fan_out_threshold: default_fan_out(),
            max_files: default_max_files(),
        }
    }
}

/// Granular (child) context qualification thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GranularConfig {
    #[serde(default = "default_min_concepts")]
    pub min_business_concepts: usize,

    #[serde(default = "default_min_rules")]
    pub min_business_rules: usize,

    #[serde(default = "default_granular_threshold")]
    pub confidence_threshold: f64,
}

fn default_min_concepts() -> usize {
    3
}

fn default_min_rules() -> usize {
    2
}

fn default_granular_threshold() -> f64 {
    0.6
}

impl Default for GranularConfig {
    fn default() -> Self {
        Self {
            min_business_concepts: default_min_concepts(),
            min_business_rules: default_min_rules(),
            confidence_threshold: default_granular_threshold(),
        }
    }
}

/// Semantic analysis cache
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisCacheConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_cache_max_age")]
    pub max_age_hours: u64,
}

fn default_true() -> bool {
    true
}

fn default_cache_max_age() -> u64 {
    24
}

impl Default for AnalysisCacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_age_hours: default_cache_max_age(),
        }
    }
}

/// Coordinator behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinationConfig {
    /// Gate `High` risk phases behind approval (`Critical` always is)
    #[serde(default)]
    pub require_approval_for_high_risk: bool,

    /// Plans kept in memory for status queries
    #[serde(default = "default_retained_plans")]
    pub max_retained_plans: usize,

    /// Source files handed to the orchestrator per indirectly impacted domain
    #[serde(default = "default_refresh_files")]
    pub max_refresh_files_per_domain: usize,
}

fn default_retained_plans() -> usize {
    100
}

fn default_refresh_files() -> usize {
    50
}

impl Default for CoordinationConfig {
    fn default() -> Self {
        Self {
            require_approval_for_high_risk: false,
            max_retained_plans: default_retained_plans(),
            max_refresh_files_per_domain: default_refresh_files(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Absolute locations derived from [`PathsConfig`] for one project
#[derive(Debug, Clone)]
pub struct ResolvedPaths {
    pub project_root: PathBuf,
    pub context_dir: PathBuf,
    pub rollback_dir: PathBuf,
    pub transaction_dir: PathBuf,
    pub cache_dir: PathBuf,
}

impl GatewayConfig {
    /// Default config file location for a project
    pub fn default_path(project_root: &Path) -> PathBuf {
        project_root.join(STATE_DIR_NAME).join("config.toml")
    }

    /// Load configuration from a specific path (defaults if missing)
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content).map_err(|e| GatewayError::Config {
            message: format!("Failed to parse {}: {}", path.display(), e),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// User-wide config location:
    /// - Linux: ~/.config/context-gateway/config.toml
    /// - macOS: ~/Library/Application Support/context-gateway/config.toml
    /// - Windows: %APPDATA%\context-gateway\config.toml
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("context-gateway").join("config.toml"))
    }

    /// Load the project's configuration, falling back to the user-wide file
    pub fn load_for_project(project_root: &Path) -> Result<Self> {
        let project_path = Self::default_path(project_root);
        if project_path.exists() {
            return Self::load_from(&project_path);
        }
        match Self::user_config_path() {
            Some(user_path) => Self::load_from(&user_path),
            None => Ok(Self::default()),
        }
    }

    /// Save configuration as TOML
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self).map_err(|e| GatewayError::Config {
            message: format!("Failed to serialize config: {}", e),
        })?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Timeout values that must fall within [`MIN_TIMEOUT_MS`, `MAX_TIMEOUT_MS`]
    pub fn timeout_values(&self) -> Vec<(&'static str, u64)> {
        vec![
            ("timeouts.performance_timeout_ms", self.timeouts.performance_timeout_ms),
            ("timeouts.approval_timeout_ms", self.timeouts.approval_timeout_ms),
            ("timeouts.rollback_timeout_ms", self.timeouts.rollback_timeout_ms),
            ("timeouts.maintenance_interval_ms", self.timeouts.maintenance_interval_ms),
            ("sessions.session_timeout_ms", self.sessions.session_timeout_ms),
            ("sessions.sweep_interval_ms", self.sessions.sweep_interval_ms),
        ]
    }

    /// Collect every configuration problem (empty when valid)
    pub fn issues(&self) -> Vec<String> {
        let mut issues = Vec::new();

        for (name, value) in self.timeout_values() {
            if !(MIN_TIMEOUT_MS..=MAX_TIMEOUT_MS).contains(&value) {
                issues.push(format!(
                    "{} = {}ms is outside the allowed range 1s-1h",
                    name, value
                ));
            }
        }
        if self.sessions.max_sessions == 0 {
            issues.push("sessions.max_sessions must be greater than 0".to_string());
        }
        if self.impact.max_propagation_depth == 0 {
            issues.push("impact.max_propagation_depth must be at least 1".to_string());
        }
        if !(0.0..=1.0).contains(&self.granular.confidence_threshold) {
            issues.push("granular.confidence_threshold must be within [0, 1]".to_string());
        }
        if self.logging.level.parse::<tracing::Level>().is_err() {
            issues.push(format!("logging.level '{}' is not a valid level", self.logging.level));
        }

        issues
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        let issues = self.issues();
        if issues.is_empty() {
            Ok(())
        } else {
            Err(GatewayError::Config {
                message: issues.join("; "),
            })
        }
    }

    /// Resolve configured paths against a project root
    pub fn resolve_paths(&self, project_root: &Path) -> ResolvedPaths {
        let resolve = |p: &Path| {
            if p.is_absolute() {
                p.to_path_buf()
            } else {
                project_root.join(p)
            }
        };
        ResolvedPaths {
            project_root: project_root.to_path_buf(),
            context_dir: resolve(&self.paths.context_dir),
            rollback_dir: resolve(&self.paths.rollback_dir),
            transaction_dir: resolve(&self.paths.transaction_dir),
            cache_dir: resolve(&self.paths.cache_dir),
        }
    }

    pub fn session_timeout(&self) -> Duration {
        Duration::from_millis(self.sessions.session_timeout_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sessions.sweep_interval_ms)
    }

    pub fn maintenance_interval(&self) -> Duration {
        Duration::from_millis(self.timeouts.maintenance_interval_ms)
    }
}
