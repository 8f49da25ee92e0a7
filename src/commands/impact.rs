//! Impact command handler

use super::{to_json, CommandContext, CommandOutput};
use crate::cli::ImpactArgs;
use crate::domain::predict_change_impact;
use crate::error::Result;

pub async fn run_impact(ctx: &CommandContext, args: &ImpactArgs) -> Result<CommandOutput> {
    let gateway = ctx.open_gateway().await?;
    let map = gateway
        .coordinator()
        .builder()
        .analyze_domain_map(Some(args.files.as_slice()))
        .await?;
    let prediction = predict_change_impact(&map, &args.files, &ctx.config.impact);
    Ok(CommandOutput::ok(to_json(&prediction)?))
}
