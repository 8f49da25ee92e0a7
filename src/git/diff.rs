//! `--name-status` change lists

use std::path::Path;

use super::git_command;
use crate::error::{GatewayError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Added,
    Modified,
    Deleted,
    /// Renamed or copied; `previous_path` holds the source
    Moved,
    TypeChanged,
}

impl ChangeKind {
    fn from_status(status: &str) -> Option<Self> {
        Some(match status.chars().next()? {
            'A' => Self::Added,
            'M' => Self::Modified,
            'D' => Self::Deleted,
            'R' | 'C' => Self::Moved,
            'T' => Self::TypeChanged,
            _ => return None,
        })
    }

    /// Whether the path still names a file after the change
    pub fn leaves_file(&self) -> bool {
        !matches!(self, Self::Deleted)
    }
}

/// One entry of a change list, repository-relative
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChange {
    pub kind: ChangeKind,
    pub path: String,
    pub previous_path: Option<String>,
}

/// Changes between `since` and the working tree
pub fn changes_since(since: &str, cwd: &Path) -> Result<Vec<FileChange>> {
    let output = git_command(&["diff", "--name-status", "-M", since], Some(cwd))?;
    parse_name_status(&output)
}

/// Changes introduced by `commit`
pub fn changes_in_commit(commit: &str, cwd: &Path) -> Result<Vec<FileChange>> {
    let output = git_command(
        &["diff-tree", "--no-commit-id", "--name-status", "-r", "-M", "--root", commit],
        Some(cwd),
    )?;
    parse_name_status(&output)
}

fn parse_name_status(output: &str) -> Result<Vec<FileChange>> {
    output
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(parse_line)
        .collect()
}

fn parse_line(line: &str) -> Result<FileChange> {
    let malformed = || GatewayError::Git {
        message: format!("unexpected name-status line: {}", line),
    };
    let mut fields = line.split('\t');
    let status = fields.next().ok_or_else(malformed)?;
    let kind = ChangeKind::from_status(status).ok_or_else(malformed)?;
    let first = fields.next().ok_or_else(malformed)?.to_string();

    let change = match (kind, fields.next()) {
        (ChangeKind::Moved, Some(second)) => FileChange {
            kind,
            path: second.to_string(),
            previous_path: Some(first),
        },
        (ChangeKind::Moved, None) => return Err(malformed()),
        _ => FileChange {
            kind,
            path: first,
            previous_path: None,
        },
    };
    Ok(change)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_modified_and_deleted() {
        let changes = parse_name_status("M\tBilling/Invoice.cs\nD\tOrders/Legacy.cs\n").unwrap();
        assert_eq!(changes.len(), 2);
        assert_eq!(changes[0].kind, ChangeKind::Modified);
        assert_eq!(changes[0].path, "Billing/Invoice.cs");
        assert!(!changes[1].kind.leaves_file());
    }

    #[test]
    fn test_rename_keeps_previous_path() {
        let changes = parse_name_status("R087\tBilling/Old.cs\tPayments/New.cs").unwrap();
        assert_eq!(
            changes[0],
            FileChange {
                kind: ChangeKind::Moved,
                path: "Payments/New.cs".to_string(),
                previous_path: Some("Billing/Old.cs".to_string()),
            }
        );
    }

    #[test]
    fn test_malformed_lines_rejected() {
        assert!(parse_name_status("X\tBilling/Invoice.cs").is_err());
        assert!(parse_name_status("R100\tonly-one-path.cs").is_err());
        assert!(parse_name_status("M").is_err());
    }
}
