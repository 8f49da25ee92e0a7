//! Error types and exit codes for context-gateway

use std::process::ExitCode;
use thiserror::Error;

/// Main error type for context-gateway operations
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Malformed request, rejected before any side effect
    #[error("Invalid request: {message}")]
    Validation { message: String },

    /// A pipeline phase exceeded its wall-clock budget
    #[error("Operation timed out in phase {phase} after {budget_ms}ms")]
    Timeout { phase: String, budget_ms: u64 },

    /// The atomic mutation engine failed mid-batch (state already restored)
    #[error("Atomic file operation failed: {message}")]
    PartialWrite { message: String },

    /// A domain update failed while executing a coordination plan
    #[error("Coordination failed: {message}")]
    Coordination { message: String },

    /// The semantic analyzer, template engine or approval workflow failed
    #[error("{name} failed: {message}")]
    Collaborator { name: String, message: String },

    /// Session capacity reached
    #[error("Maximum concurrent sessions reached ({limit}); new session rejected")]
    Capacity { limit: usize },

    #[error("{kind} not found: {id}")]
    NotFound { kind: String, id: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Git error: {message}")]
    Git { message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl GatewayError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn collaborator(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Collaborator {
            name: name.into(),
            message: message.into(),
        }
    }

    pub fn not_found(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind: kind.into(),
            id: id.into(),
        }
    }

    /// Machine-checkable category tag for user-visible failures
    pub fn category(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "validation",
            Self::Timeout { .. } => "timeout",
            Self::PartialWrite { .. } => "partial_write",
            Self::Coordination { .. } => "coordination",
            Self::Collaborator { .. } => "collaborator",
            Self::Capacity { .. } => "capacity",
            Self::NotFound { .. } => "not_found",
            Self::Config { .. } => "config",
            Self::Git { .. } => "git",
            Self::Io(_) | Self::Json(_) => "io",
        }
    }

    /// Convert error to a process exit code:
    /// - 1: IO / not found
    /// - 2: validation or configuration
    /// - 3: timeout
    /// - 4: write, coordination or collaborator failure
    /// - 5: git
    /// - 6: capacity
    pub fn exit_code(&self) -> ExitCode {
        match self {
            Self::Io(_) | Self::Json(_) | Self::NotFound { .. } => ExitCode::from(1),
            Self::Validation { .. } | Self::Config { .. } => ExitCode::from(2),
            Self::Timeout { .. } => ExitCode::from(3),
            Self::PartialWrite { .. } | Self::Coordination { .. } | Self::Collaborator { .. } => {
                ExitCode::from(4)
            }
            Self::Git { .. } => ExitCode::from(5),
            Self::Capacity { .. } => ExitCode::from(6),
        }
    }
}

/// Result type alias for context-gateway operations
pub type Result<T> = std::result::Result<T, GatewayError>;
