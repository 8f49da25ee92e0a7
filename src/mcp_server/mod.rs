//! MCP server for context-gateway
//!
//! Exposes domain analysis, impact prediction and cross-domain coordination
//! as MCP tools over stdio. One server instance is one client session.

pub mod dispatch;
pub mod types;

pub use dispatch::{dispatch, failure_envelope, handle_request, is_success, success_envelope};
pub use types::{ToolRequest, TOOL_NAMES};

use std::sync::Arc;

use rmcp::{
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::*,
    tool, tool_handler, tool_router, ErrorData as McpError, ServerHandler,
};

use crate::error::Result as GatewayResult;
use crate::gateway::Gateway;
use crate::session::{SessionMetadata, SessionState};

use types::{
    AnalyzeDomainMapArgs, CoordinateUpdateArgs, CoordinationStatusArgs, HealthArgs,
    PredictChangeImpactArgs, SpecificDomainsImpactArgs,
};

/// MCP server bound to one gateway session
#[derive(Clone)]
pub struct GatewayServer {
    gateway: Arc<Gateway>,
    session_id: String,
    tool_router: ToolRouter<GatewayServer>,
}

#[tool_router]
impl GatewayServer {
    /// Register a new session on `gateway`; fails when the session limit is reached
    pub fn new(gateway: Arc<Gateway>, meta: SessionMetadata) -> GatewayResult<Self> {
        let session = gateway.sessions().add_session(meta)?;
        Ok(Self {
            gateway,
            session_id: session.id,
            tool_router: Self::tool_router(),
        })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn gateway(&self) -> &Arc<Gateway> {
        &self.gateway
    }

    /// Number of registered tools
    pub fn tool_count() -> usize {
        Self::tool_router().list_all().len()
    }

    /// Drop the session and the bookkeeping of its in-flight requests
    pub fn disconnect(&self) {
        let sessions = self.gateway.sessions();
        if let Err(e) = sessions.update_state(&self.session_id, SessionState::Disconnecting) {
            tracing::debug!("Session {} already gone: {}", self.session_id, e);
        }
        let cancelled = self.gateway.executor().cancel_session_requests(&self.session_id);
        sessions.remove_session(&self.session_id);
        tracing::info!(
            "Session {} disconnected ({} request(s) cancelled)",
            self.session_id,
            cancelled
        );
    }

    async fn respond(&self, request: ToolRequest) -> std::result::Result<CallToolResult, McpError> {
        let envelope =
            handle_request(&self.gateway, &self.session_id, request, Self::tool_count()).await;
        let text = serde_json::to_string_pretty(&envelope)
            .unwrap_or_else(|_| r#"{"success":false}"#.to_string());
        if is_success(&envelope) {
            Ok(CallToolResult::success(vec![Content::text(text)]))
        } else {
            Ok(CallToolResult::error(vec![Content::text(text)]))
        }
    }

    #[tool(
        name = "analyze-domain-map",
        description = "Analyze a project into business domains and the relationships between them. Optionally forces the domains of changedFiles into the map and returns a Mermaid visualization."
    )]
    async fn analyze_domain_map(
        &self,
        Parameters(args): Parameters<AnalyzeDomainMapArgs>,
    ) -> std::result::Result<CallToolResult, McpError> {
        self.respond(ToolRequest::AnalyzeDomainMap(args)).await
    }

    #[tool(
        name = "predict-change-impact",
        description = "Predict which domains a set of changed files affects, with impact levels, risk factors, recommendations and a dependency-respecting update sequence."
    )]
    async fn predict_change_impact(
        &self,
        Parameters(args): Parameters<PredictChangeImpactArgs>,
    ) -> std::result::Result<CallToolResult, McpError> {
        self.respond(ToolRequest::PredictChangeImpact(args)).await
    }

    #[tool(
        name = "coordinate-cross-domain-update",
        description = "Plan and execute context updates across every domain affected by a change, phase by phase, rolling back completed domains if a later phase fails. Set dryRun to only build the plan."
    )]
    async fn coordinate_cross_domain_update(
        &self,
        Parameters(args): Parameters<CoordinateUpdateArgs>,
    ) -> std::result::Result<CallToolResult, McpError> {
        self.respond(ToolRequest::CoordinateCrossDomainUpdate(args)).await
    }

    #[tool(
        name = "analyze-specific-domains-impact",
        description = "Report how changes to the given source domains propagate, including propagation paths, optionally restricted to target domains."
    )]
    async fn analyze_specific_domains_impact(
        &self,
        Parameters(args): Parameters<SpecificDomainsImpactArgs>,
    ) -> std::result::Result<CallToolResult, McpError> {
        self.respond(ToolRequest::AnalyzeSpecificDomainsImpact(args)).await
    }

    #[tool(
        name = "get-cross-domain-coordination-status",
        description = "Return one coordination plan by planId, or every plan that is still planned or executing."
    )]
    async fn get_cross_domain_coordination_status(
        &self,
        Parameters(args): Parameters<CoordinationStatusArgs>,
    ) -> std::result::Result<CallToolResult, McpError> {
        self.respond(ToolRequest::GetCrossDomainCoordinationStatus(args)).await
    }

    #[tool(
        name = "gateway-health",
        description = "Report gateway health: writable state directories, timeout configuration, registered tools, sessions and in-flight requests."
    )]
    async fn gateway_health(
        &self,
        Parameters(args): Parameters<HealthArgs>,
    ) -> std::result::Result<CallToolResult, McpError> {
        self.respond(ToolRequest::GatewayHealth(args)).await
    }
}

#[tool_handler]
impl ServerHandler for GatewayServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "context-gateway".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                title: Some("Context Gateway".to_string()),
                website_url: None,
                icons: None,
            },
            instructions: Some(MCP_INSTRUCTIONS.to_string()),
        }
    }
}

const MCP_INSTRUCTIONS: &str = r#"Context Gateway - domain-aware context maintenance

## Purpose
Keeps per-domain CONTEXT.md documents consistent with the source tree and
coordinates updates that span several domains.

## Tools
- analyze-domain-map: domains, relationships, cross-cutting concerns
- predict-change-impact: affected domains, risks and update order for changed files
- coordinate-cross-domain-update: phased, rollback-safe context updates (dryRun to preview)
- analyze-specific-domains-impact: propagation from named domains
- get-cross-domain-coordination-status: plan status by id, or active plans
- gateway-health: state directories, timeouts, sessions

## Responses
Every tool returns JSON with "success". Failures carry "error", "category"
(validation, timeout, partial_write, coordination, collaborator, capacity,
not_found) and "timestamp".

## Workflow
1. predict-change-impact to see what a change touches
2. coordinate-cross-domain-update with dryRun=true to review the plan
3. coordinate-cross-domain-update to apply it
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GatewayConfig;
    use tempfile::TempDir;

    #[test]
    fn test_router_registers_every_tool() {
        let tools = GatewayServer::tool_router().list_all();
        assert_eq!(tools.len(), TOOL_NAMES.len());
        for name in TOOL_NAMES {
            assert!(
                tools.iter().any(|t| t.name == *name),
                "missing tool {}",
                name
            );
        }
    }

    #[tokio::test]
    async fn test_server_owns_a_session() {
        let dir = TempDir::new().unwrap();
        let mut config = GatewayConfig::default();
        config.sessions.max_sessions = 1;
        let gateway = Arc::new(Gateway::open(dir.path(), config).await.unwrap());

        let server = GatewayServer::new(Arc::clone(&gateway), SessionMetadata::default()).unwrap();
        assert!(gateway.sessions().get_session(server.session_id()).is_some());

        let err = GatewayServer::new(Arc::clone(&gateway), SessionMetadata::default())
            .err()
            .unwrap();
        assert_eq!(err.category(), "capacity");

        server.disconnect();
        assert!(gateway.sessions().list_sessions().is_empty());
        assert_eq!(server.get_info().server_info.name, "context-gateway");
    }

    #[tokio::test]
    async fn test_disconnect_after_sweep_still_cancels_requests() {
        let dir = TempDir::new().unwrap();
        let gateway = Arc::new(Gateway::open(dir.path(), GatewayConfig::default()).await.unwrap());
        let server = GatewayServer::new(Arc::clone(&gateway), SessionMetadata::default()).unwrap();

        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let held = {
            let gateway = Arc::clone(&gateway);
            let session = server.session_id().to_string();
            tokio::spawn(async move {
                gateway
                    .executor()
                    .execute_with_session(&session, "gateway-health", rx, |rx| async move {
                        let _ = rx.await;
                    })
                    .await
            })
        };
        while gateway.executor().active_request_count() < 1 {
            tokio::task::yield_now().await;
        }

        gateway.sessions().remove_session(server.session_id());
        server.disconnect();
        assert_eq!(gateway.executor().active_request_count(), 0);
        assert!(gateway.sessions().list_sessions().is_empty());

        let _ = tx.send(());
        held.await.unwrap();
    }
}
