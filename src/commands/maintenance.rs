//! Maintenance command handler

use super::{to_json, CommandContext, CommandOutput};
use crate::error::Result;

/// One rollback retention, transaction purge and cache pruning pass
pub async fn run_maintenance(ctx: &CommandContext) -> Result<CommandOutput> {
    let gateway = ctx.open_gateway().await?;
    let report = gateway.orchestrator().perform_maintenance().await?;
    Ok(CommandOutput::ok(to_json(&report)?))
}
