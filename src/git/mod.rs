//! Changed-file discovery through the `git` binary
//!
//! Read-only: the gateway asks which files a commit or ref range touched
//! and never writes to the repository.

mod diff;

pub use diff::{changes_in_commit, changes_since, ChangeKind, FileChange};

use std::path::{Path, PathBuf};
use std::process::Command;

use crate::error::{GatewayError, Result};

/// Trimmed stdout of `git <args>` run in `cwd`
pub fn git_command(args: &[&str], cwd: Option<&Path>) -> Result<String> {
    let mut cmd = Command::new("git");
    cmd.args(args);
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }

    let output = cmd.output().map_err(|e| GatewayError::Git {
        message: format!("cannot run git: {}", e),
    })?;
    if !output.status.success() {
        return Err(GatewayError::Git {
            message: format!(
                "git {} exited with {}: {}",
                args.first().copied().unwrap_or_default(),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

fn repo_root(dir: &Path) -> Result<PathBuf> {
    git_command(&["rev-parse", "--show-toplevel"], Some(dir)).map(PathBuf::from)
}

/// Absolute paths of files touched by `commit` that still exist on disk
pub fn files_in_commit(project_root: &Path, commit: &str) -> Result<Vec<PathBuf>> {
    let root = repo_root(project_root)?;
    let changes = changes_in_commit(commit, project_root)?;
    tracing::debug!("Commit {} touched {} file(s)", commit, changes.len());
    Ok(surviving_files(&root, changes))
}

/// Absolute paths of files changed since `since` that still exist on disk
pub fn files_since(project_root: &Path, since: &str) -> Result<Vec<PathBuf>> {
    let root = repo_root(project_root)?;
    let changes = changes_since(since, project_root)?;
    tracing::debug!("{} file(s) changed since {}", changes.len(), since);
    Ok(surviving_files(&root, changes))
}

fn surviving_files(repo_root: &Path, changes: Vec<FileChange>) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = changes
        .into_iter()
        .filter(|c| c.kind.leaves_file())
        .map(|c| repo_root.join(c.path))
        .filter(|p| p.is_file())
        .collect();
    files.sort();
    files.dedup();
    files
}
