//! Command modules for the context-gateway CLI
//!
//! Each command module implements a single top-level command:
//! - `serve` - MCP server on stdio
//! - `health` - health report
//! - `update` - coordinated context update
//! - `impact` - impact prediction for changed files
//! - `domains` - domain map
//! - `maintenance` - one retention and pruning pass
//! - `recover` - leftover transaction recovery
//!
//! All command handlers take a shared `CommandContext` holding the project
//! root and its loaded configuration.

pub mod domains;
pub mod health;
pub mod impact;
pub mod maintenance;
pub mod recover;
pub mod serve;
pub mod update;

pub use domains::run_domains;
pub use health::run_health;
pub use impact::run_impact;
pub use maintenance::run_maintenance;
pub use recover::run_recover;
pub use serve::run_serve;
pub use update::run_update;

use std::path::PathBuf;
use std::process::ExitCode;

use serde::Serialize;
use tracing_subscriber::EnvFilter;

use crate::cli::Cli;
use crate::config::GatewayConfig;
use crate::error::{GatewayError, Result};
use crate::gateway::Gateway;

/// Shared context passed to all command handlers
#[derive(Debug, Clone)]
pub struct CommandContext {
    pub project_root: PathBuf,
    pub config: GatewayConfig,
    pub verbose: bool,
}

impl CommandContext {
    /// Resolve the project root and load its configuration
    pub fn from_cli(cli: &Cli) -> Result<Self> {
        let root = match &cli.project {
            Some(path) => path.clone(),
            None => std::env::current_dir()?,
        };
        if !root.is_dir() {
            return Err(GatewayError::validation(format!(
                "project root is not a directory: {}",
                root.display()
            )));
        }
        let project_root = root.canonicalize()?;

        let config = match &cli.config {
            Some(path) if !path.exists() => {
                return Err(GatewayError::Config {
                    message: format!("config file not found: {}", path.display()),
                })
            }
            Some(path) => GatewayConfig::load_from(path)?,
            None => GatewayConfig::load_for_project(&project_root)?,
        };

        Ok(Self {
            project_root,
            config,
            verbose: cli.verbose,
        })
    }

    pub async fn open_gateway(&self) -> Result<Gateway> {
        Gateway::open(&self.project_root, self.config.clone()).await
    }

    /// Effective log level: `--verbose` wins over the configured level
    pub fn log_level(&self) -> &str {
        if self.verbose {
            "debug"
        } else {
            &self.config.logging.level
        }
    }
}

/// What a command prints and how the process exits
#[derive(Debug)]
pub struct CommandOutput {
    pub text: String,
    pub exit_code: ExitCode,
}

impl CommandOutput {
    pub fn ok(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            exit_code: ExitCode::SUCCESS,
        }
    }

    pub fn failed(text: impl Into<String>, exit_code: ExitCode) -> Self {
        Self {
            text: text.into(),
            exit_code,
        }
    }
}

/// Pretty JSON with a trailing newline
pub fn to_json<T: Serialize>(value: &T) -> Result<String> {
    let mut json = serde_json::to_string_pretty(value)?;
    json.push('\n');
    Ok(json)
}

/// Exit code for a failure reported only by its category tag
pub fn exit_code_for_category(category: &str) -> ExitCode {
    match category {
        "not_found" | "io" => ExitCode::from(1),
        "validation" | "config" => ExitCode::from(2),
        "timeout" => ExitCode::from(3),
        "git" => ExitCode::from(5),
        "capacity" => ExitCode::from(6),
        _ => ExitCode::from(4),
    }
}

/// Initialize tracing to stderr. `RUST_LOG` overrides `level`.
pub fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("context_gateway={},rmcp=info", level))
    });
    // Fails only if a subscriber is already installed
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
