//! Recover command handler
//!
//! A transaction directory survives only when a process died mid-batch or a
//! restore failed. Recovering it puts every target back as the manifest
//! recorded it.

use super::{to_json, CommandContext, CommandOutput};
use crate::atomic::AtomicFileManager;
use crate::cli::RecoverArgs;
use crate::error::Result;

pub async fn run_recover(ctx: &CommandContext, args: &RecoverArgs) -> Result<CommandOutput> {
    let paths = ctx.config.resolve_paths(&ctx.project_root);
    let manager = AtomicFileManager::new(paths.transaction_dir);

    match (&args.transaction_id, args.list) {
        (Some(id), false) => {
            let restored = manager.recover_transaction(id).await?;
            Ok(CommandOutput::ok(format!(
                "Recovered {}: {} file(s) restored\n",
                id, restored
            )))
        }
        _ => {
            let pending = manager.get_pending_transactions().await?;
            if pending.is_empty() {
                tracing::info!("No leftover transactions");
            }
            Ok(CommandOutput::ok(to_json(&pending)?))
        }
    }
}
