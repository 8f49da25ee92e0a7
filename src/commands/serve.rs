//! MCP Server command handler
//!
//! Runs the gateway over stdio transport. Stdout carries JSON-RPC only;
//! everything else is logged to stderr.

use std::sync::Arc;

use anyhow::Context;
use rmcp::transport::stdio;
use rmcp::ServiceExt;

use super::{CommandContext, CommandOutput};
use crate::error::{GatewayError, Result};
use crate::mcp_server::GatewayServer;
use crate::session::SessionMetadata;

/// Run the MCP server until the client disconnects
pub async fn run_serve(ctx: &CommandContext) -> Result<CommandOutput> {
    tracing::info!(
        "Starting context-gateway MCP server v{}",
        env!("CARGO_PKG_VERSION")
    );
    tracing::info!("Project root: {}", ctx.project_root.display());

    let gateway = Arc::new(ctx.open_gateway().await?);
    gateway.start_background_tasks();

    let server = GatewayServer::new(
        Arc::clone(&gateway),
        SessionMetadata {
            user_agent: Some("stdio".to_string()),
            remote_address: None,
        },
    )?;

    let served = serve_stdio(server.clone()).await;

    server.disconnect();
    gateway.shutdown().await;

    served.map_err(transport_error)?;
    // Server exits cleanly - no output needed
    Ok(CommandOutput::ok(String::new()))
}

/// The stdio transport failing is an I/O failure, whatever rmcp reported
fn transport_error(e: anyhow::Error) -> GatewayError {
    GatewayError::Io(std::io::Error::other(format!("{:#}", e)))
}

async fn serve_stdio(server: GatewayServer) -> anyhow::Result<()> {
    let service = server
        .serve(stdio())
        .await
        .context("Failed to start MCP server")?;

    tracing::info!("MCP server initialized, waiting for requests...");
    service
        .waiting()
        .await
        .context("MCP server terminated abnormally")?;
    tracing::info!("MCP client disconnected");
    Ok(())
}
