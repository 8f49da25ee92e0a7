//! Health command handler

use std::process::ExitCode;

use super::{to_json, CommandContext, CommandOutput};
use crate::error::Result;
use crate::health::check_health;
use crate::mcp_server::GatewayServer;

/// Print the health report; exits with 1 when unhealthy
///
/// Directories are inspected as they are, not created.
pub async fn run_health(ctx: &CommandContext) -> Result<CommandOutput> {
    let paths = ctx.config.resolve_paths(&ctx.project_root);
    let report = check_health(&ctx.config, &paths, GatewayServer::tool_count());
    let text = to_json(&report)?;

    Ok(if report.is_unhealthy() {
        CommandOutput::failed(text, ExitCode::from(1))
    } else {
        CommandOutput::ok(text)
    })
}
