//! context-gateway: domain-aware context maintenance
//!
//! Keeps one `CONTEXT.md` per business domain consistent with the source
//! tree. A change set is analyzed into domains, its impact is propagated
//! along domain relationships, and every affected context document is
//! regenerated in dependency order with all-or-nothing file writes and
//! persistent rollback snapshots.
//!
//! # Layers
//!
//! - [`analyzer`] - per-file semantic analysis (tree-sitter, cached)
//! - [`domain`] - domain map, impact prediction, risk assessment
//! - [`orchestrator`] - one holistic update under a phased time budget
//! - [`coordinator`] - phased cross-domain plans with rollback
//! - [`atomic`] / [`rollback`] - transactional writes and snapshots
//! - [`session`] / [`gateway`] - sessions, request tracking, lifecycle
//! - [`mcp_server`] - the MCP tool surface
//!
//! # Example
//!
//! ```ignore
//! use context_gateway::{Gateway, GatewayConfig, CoordinationRequest, TriggerType};
//!
//! let gateway = Gateway::open(project_root, GatewayConfig::default()).await?;
//! let request = CoordinationRequest::new(vec!["Billing/Invoice.cs".into()], TriggerType::Manual);
//! let result = gateway.coordinator().coordinate_update(request).await;
//! println!("updated: {:?}", result.updated_domains);
//! ```

pub mod analyzer;
pub mod approval;
pub mod atomic;
pub mod cli;
pub mod commands;
pub mod config;
pub mod coordinator;
pub mod domain;
pub mod error;
pub mod fs_utils;
pub mod gateway;
pub mod git;
pub mod health;
pub mod lang;
pub mod mcp_server;
pub mod orchestrator;
pub mod rollback;
pub mod session;
pub mod template;

// Re-export commonly used types
pub use analyzer::{AnalysisResult, CachedAnalyzer, SemanticAnalyzer, TreeSitterAnalyzer};
pub use approval::{ApprovalWorkflow, AutoApproval, ManualApproval};
pub use atomic::{AtomicFileManager, AtomicOperationResult, FileOperation};
pub use cli::Cli;
pub use config::GatewayConfig;
pub use coordinator::{CoordinationPlan, CoordinationRequest, CoordinationResult, CrossDomainCoordinator};
pub use domain::{DomainGraphBuilder, DomainMap, ImpactPrediction};
pub use error::{GatewayError, Result};
pub use gateway::{Collaborators, Gateway};
pub use health::{HealthReport, HealthStatus};
pub use mcp_server::{GatewayServer, ToolRequest};
pub use orchestrator::{HolisticUpdateRequest, HolisticUpdateResult, TriggerType, UpdateOrchestrator};
pub use rollback::RollbackStore;
pub use session::{SessionAwareExecutor, SessionManager};
pub use template::{MarkdownTemplateEngine, TemplateEngine};
