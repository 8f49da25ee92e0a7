//! Domains command handler

use super::{to_json, CommandContext, CommandOutput};
use crate::cli::DomainsArgs;
use crate::error::Result;

pub async fn run_domains(ctx: &CommandContext, args: &DomainsArgs) -> Result<CommandOutput> {
    let gateway = ctx.open_gateway().await?;
    let map = gateway.coordinator().builder().analyze_domain_map(None).await?;
    tracing::info!(
        "{} domain(s), {} relationship(s)",
        map.domains.len(),
        map.relationships.len()
    );

    if args.mermaid {
        Ok(CommandOutput::ok(map.to_mermaid()))
    } else {
        Ok(CommandOutput::ok(to_json(&map)?))
    }
}
