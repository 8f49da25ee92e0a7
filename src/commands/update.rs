//! Update command handler

use std::path::PathBuf;

use super::{exit_code_for_category, to_json, CommandContext, CommandOutput};
use crate::cli::UpdateArgs;
use crate::coordinator::CoordinationRequest;
use crate::error::{GatewayError, Result};
use crate::git;

/// Files named on the command line, or discovered from git
fn changed_files(ctx: &CommandContext, args: &UpdateArgs) -> Result<Vec<PathBuf>> {
    let mut files = args.files.clone();
    if let Some(sha) = &args.commit {
        files.extend(git::files_in_commit(&ctx.project_root, sha)?);
    } else if let Some(since) = &args.since {
        files.extend(git::files_since(&ctx.project_root, since)?);
    }
    if files.is_empty() {
        return Err(GatewayError::validation(
            "no changed files: pass FILES, --commit or --since",
        ));
    }
    files.sort();
    files.dedup();
    Ok(files)
}

pub async fn run_update(ctx: &CommandContext, args: &UpdateArgs) -> Result<CommandOutput> {
    let files = changed_files(ctx, args)?;
    tracing::info!("Coordinating update for {} changed file(s)", files.len());

    let gateway = ctx.open_gateway().await?;
    let mut request = CoordinationRequest::new(files, args.trigger_type());
    request.performance_timeout_ms = args.timeout;
    request.dry_run = args.dry_run;
    request.git_commit_hash = args.commit.clone();

    let result = gateway.coordinator().coordinate_update(request).await;
    gateway.shutdown().await;

    let text = to_json(&result)?;
    Ok(if result.success {
        CommandOutput::ok(text)
    } else {
        let category = result.error_category.as_deref().unwrap_or("coordination");
        CommandOutput::failed(text, exit_code_for_category(category))
    })
}
