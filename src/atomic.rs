//! Atomic multi-file mutation engine
//!
//! Executes a batch of file creations, updates and deletions as one
//! all-or-nothing transaction:
//!
//! 1. validate every operation (no disk access beyond `stat`)
//! 2. back up every existing target into `<transactions>/<txid>/`
//! 3. apply operations in input order
//! 4. on the first failure, restore backups in reverse order
//! 5. on success, drop the backup directory
//!
//! A `manifest.json` inside each transaction directory describes the batch so
//! leftovers from a crashed process can be listed, recovered or purged.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{GatewayError, Result};
use crate::fs_utils::{is_contained, nearest_existing_ancestor, write_atomic};

const MANIFEST_FILE: &str = "manifest.json";

/// Kind of file mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Create,
    Update,
    Delete,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

/// One file mutation inside a transaction
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileOperation {
    pub kind: OperationKind,
    pub target: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backup_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_content: Option<String>,
}

impl FileOperation {
    pub fn create(target: impl Into<PathBuf>, content: impl Into<String>) -> Self {
        Self {
            kind: OperationKind::Create,
            target: target.into(),
            content: Some(content.into()),
            backup_path: None,
            original_content: None,
        }
    }

    pub fn update(target: impl Into<PathBuf>, content: impl Into<String>) -> Self {
        Self {
            kind: OperationKind::Update,
            target: target.into(),
            content: Some(content.into()),
            backup_path: None,
            original_content: None,
        }
    }

    pub fn delete(target: impl Into<PathBuf>) -> Self {
        Self {
            kind: OperationKind::Delete,
            target: target.into(),
            content: None,
            backup_path: None,
            original_content: None,
        }
    }

    /// `Create` when the target is absent, `Update` otherwise
    pub async fn write(target: impl Into<PathBuf>, content: impl Into<String>) -> Self {
        let target = target.into();
        if tokio::fs::try_exists(&target).await.unwrap_or(false) {
            Self::update(target, content)
        } else {
            Self::create(target, content)
        }
    }
}

/// Everything needed to reverse the operations a transaction executed
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RollbackData {
    pub transaction_id: String,
    pub timestamp: DateTime<Utc>,
    /// Executed operations with `original_content` captured where a file existed
    pub operations: Vec<FileOperation>,
    /// Whether the engine's own restore succeeded (failure path only)
    pub restored: bool,
    pub restore_errors: Vec<String>,
}

/// Outcome of [`AtomicFileManager::execute_atomic_operations`]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AtomicOperationResult {
    pub success: bool,
    pub transaction_id: String,
    pub operations_executed: Vec<FileOperation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rollback_data: Option<RollbackData>,
}

/// Transaction directory left behind by a crash or a failed restore
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingTransaction {
    pub transaction_id: String,
    pub created_at: DateTime<Utc>,
    pub directory: PathBuf,
    pub operation_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ManifestEntry {
    index: usize,
    kind: OperationKind,
    target: PathBuf,
    existed: bool,
    backup: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct TransactionManifest {
    transaction_id: String,
    created_at: DateTime<Utc>,
    entries: Vec<ManifestEntry>,
}

/// Generate `txn_<timestamp>_<suffix>`
pub fn generate_transaction_id() -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!(
        "txn_{}_{}",
        Utc::now().format("%Y%m%d%H%M%S%3f"),
        &suffix[..8]
    )
}

/// Atomic multi-file mutation engine
#[derive(Debug, Clone)]
pub struct AtomicFileManager {
    /// Root under which every transaction gets its private directory
    transaction_root: PathBuf,
}

impl AtomicFileManager {
    pub fn new(transaction_root: PathBuf) -> Self {
        Self { transaction_root }
    }

    pub fn transaction_root(&self) -> &Path {
        &self.transaction_root
    }

    fn transaction_dir(&self, transaction_id: &str) -> PathBuf {
        self.transaction_root.join(transaction_id)
    }

    /// Execute `ops` as one all-or-nothing transaction
    pub async fn execute_atomic_operations(&self, ops: Vec<FileOperation>) -> AtomicOperationResult {
        let transaction_id = generate_transaction_id();

        if let Err(e) = validate_operations(&ops).await {
            tracing::warn!("Transaction {} rejected: {}", transaction_id, e);
            return AtomicOperationResult {
                success: false,
                transaction_id,
                operations_executed: Vec::new(),
                error: Some(e.to_string()),
                rollback_data: None,
            };
        }

        let tx_dir = self.transaction_dir(&transaction_id);
        let mut ops = ops;
        if let Err(e) = self.backup_targets(&transaction_id, &tx_dir, &mut ops).await {
            let _ = tokio::fs::remove_dir_all(&tx_dir).await;
            return AtomicOperationResult {
                success: false,
                transaction_id,
                operations_executed: Vec::new(),
                error: Some(format!("Backup failed: {}", e)),
                rollback_data: None,
            };
        }

        let mut executed: Vec<FileOperation> = Vec::with_capacity(ops.len());
        let mut created_dirs: Vec<PathBuf> = Vec::new();

        for op in &ops {
            if let Err(e) = apply_operation(op, &transaction_id, &mut created_dirs).await {
                let message = format!(
                    "{} {} failed: {}",
                    op.kind.as_str(),
                    op.target.display(),
                    e
                );
                tracing::error!("Transaction {}: {}", transaction_id, message);

                let restore_errors = restore_operations(&executed, &created_dirs).await;
                let restored = restore_errors.is_empty();
                if restored {
                    let _ = tokio::fs::remove_dir_all(&tx_dir).await;
                } else {
                    tracing::error!(
                        "Transaction {} restore incomplete, backups kept in {}",
                        transaction_id,
                        tx_dir.display()
                    );
                }

                let rollback_data = RollbackData {
                    transaction_id: transaction_id.clone(),
                    timestamp: Utc::now(),
                    operations: executed.clone(),
                    restored,
                    restore_errors,
                };
                return AtomicOperationResult {
                    success: false,
                    transaction_id,
                    operations_executed: executed,
                    error: Some(message),
                    rollback_data: Some(rollback_data),
                };
            }
            executed.push(op.clone());
        }

        if let Err(e) = tokio::fs::remove_dir_all(&tx_dir).await {
            tracing::warn!("Failed to remove backups for {}: {}", transaction_id, e);
        }
        tracing::debug!(
            "Transaction {} committed {} operations",
            transaction_id,
            executed.len()
        );

        AtomicOperationResult {
            success: true,
            transaction_id: transaction_id.clone(),
            operations_executed: executed.clone(),
            error: None,
            rollback_data: Some(RollbackData {
                transaction_id,
                timestamp: Utc::now(),
                operations: executed,
                restored: false,
                restore_errors: Vec::new(),
            }),
        }
    }

    /// Copy existing targets aside, capture their content, and write the manifest
    async fn backup_targets(
        &self,
        transaction_id: &str,
        tx_dir: &Path,
        ops: &mut [FileOperation],
    ) -> std::io::Result<()> {
        tokio::fs::create_dir_all(tx_dir).await?;

        let mut entries = Vec::with_capacity(ops.len());
        for (index, op) in ops.iter_mut().enumerate() {
            let existed = tokio::fs::try_exists(&op.target).await.unwrap_or(false);
            let mut backup = None;
            if existed {
                let backup_path = tx_dir.join(format!("{}.bak", index));
                tokio::fs::copy(&op.target, &backup_path).await?;
                let original = tokio::fs::read(&op.target).await?;
                op.original_content = Some(String::from_utf8_lossy(&original).into_owned());
                op.backup_path = Some(backup_path.clone());
                backup = Some(backup_path);
            }
            entries.push(ManifestEntry {
                index,
                kind: op.kind,
                target: op.target.clone(),
                existed,
                backup,
            });
        }

        let manifest = TransactionManifest {
            transaction_id: transaction_id.to_string(),
            created_at: Utc::now(),
            entries,
        };
        let json = serde_json::to_vec_pretty(&manifest)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        tokio::fs::write(tx_dir.join(MANIFEST_FILE), json).await
    }

    /// Transactions whose backup directory still exists
    pub async fn get_pending_transactions(&self) -> Result<Vec<PendingTransaction>> {
        let mut pending = Vec::new();
        let mut entries = match tokio::fs::read_dir(&self.transaction_root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(pending),
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let dir = entry.path();
            match read_manifest(&dir).await {
                Some(manifest) => pending.push(PendingTransaction {
                    transaction_id: manifest.transaction_id,
                    created_at: manifest.created_at,
                    directory: dir,
                    operation_count: manifest.entries.len(),
                }),
                None => {
                    tracing::debug!("Skipping transaction dir without manifest: {}", dir.display())
                }
            }
        }

        pending.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(pending)
    }

    /// Remove leftover transaction directories older than `max_age`
    pub async fn cleanup_old_transactions(&self, max_age: Duration) -> Result<usize> {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(max_age).unwrap_or_else(|_| chrono::Duration::zero());
        let mut removed = 0;
        for tx in self.get_pending_transactions().await? {
            if tx.created_at < cutoff {
                tokio::fs::remove_dir_all(&tx.directory).await?;
                tracing::info!("Purged stale transaction {}", tx.transaction_id);
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Restore the pre-transaction state recorded in a leftover manifest
    pub async fn recover_transaction(&self, transaction_id: &str) -> Result<usize> {
        let dir = self.transaction_dir(transaction_id);
        let manifest = read_manifest(&dir)
            .await
            .ok_or_else(|| GatewayError::not_found("transaction", transaction_id))?;

        let mut restored = 0;
        for entry in manifest.entries.iter().rev() {
            match (&entry.backup, entry.existed) {
                (Some(backup), true) => {
                    if let Some(parent) = entry.target.parent() {
                        tokio::fs::create_dir_all(parent).await?;
                    }
                    tokio::fs::copy(backup, &entry.target).await?;
                    restored += 1;
                }
                (_, false) => {
                    if tokio::fs::try_exists(&entry.target).await.unwrap_or(false) {
                        tokio::fs::remove_file(&entry.target).await?;
                        restored += 1;
                    }
                }
                (None, true) => {
                    return Err(GatewayError::PartialWrite {
                        message: format!(
                            "backup for {} missing in transaction {}",
                            entry.target.display(),
                            transaction_id
                        ),
                    });
                }
            }
        }

        tokio::fs::remove_dir_all(&dir).await?;
        tracing::info!(
            "Recovered transaction {} ({} files restored)",
            transaction_id,
            restored
        );
        Ok(restored)
    }
}

async fn read_manifest(dir: &Path) -> Option<TransactionManifest> {
    let bytes = tokio::fs::read(dir.join(MANIFEST_FILE)).await.ok()?;
    serde_json::from_slice(&bytes).ok()
}

/// Check every precondition before any disk mutation
pub async fn validate_operations(ops: &[FileOperation]) -> Result<()> {
    if ops.is_empty() {
        return Err(GatewayError::validation("no file operations supplied"));
    }

    let mut seen = HashSet::new();
    for (index, op) in ops.iter().enumerate() {
        let target = &op.target;
        let label = format!("operation {} ({} {})", index, op.kind.as_str(), target.display());

        if target.as_os_str().is_empty() || target.to_string_lossy().contains('\0') {
            return Err(GatewayError::validation(format!("{}: malformed path", label)));
        }
        if !target.is_absolute() {
            return Err(GatewayError::validation(format!("{}: path must be absolute", label)));
        }
        if !is_contained(target) {
            return Err(GatewayError::validation(format!(
                "{}: path must not contain '..'",
                label
            )));
        }
        if !seen.insert(target.clone()) {
            return Err(GatewayError::validation(format!(
                "{}: target appears more than once in the batch",
                label
            )));
        }

        let parent = target
            .parent()
            .ok_or_else(|| GatewayError::validation(format!("{}: no parent directory", label)))?;
        let parent_is_dir = match nearest_existing_ancestor(parent).await {
            Some(ancestor) => tokio::fs::metadata(&ancestor)
                .await
                .map(|m| m.is_dir())
                .unwrap_or(false),
            None => false,
        };
        if !parent_is_dir {
            return Err(GatewayError::validation(format!(
                "{}: parent directory is not resolvable",
                label
            )));
        }

        let metadata = tokio::fs::metadata(target).await.ok();
        let exists = metadata.is_some();
        match op.kind {
            OperationKind::Create => {
                if exists {
                    return Err(GatewayError::validation(format!(
                        "{}: target already exists",
                        label
                    )));
                }
            }
            OperationKind::Update | OperationKind::Delete => {
                if !metadata.as_ref().is_some_and(|m| m.is_file()) {
                    return Err(GatewayError::validation(format!(
                        "{}: target is not an existing file",
                        label
                    )));
                }
            }
        }
        if matches!(op.kind, OperationKind::Create | OperationKind::Update) && op.content.is_none() {
            return Err(GatewayError::validation(format!("{}: content is required", label)));
        }
    }
    Ok(())
}

async fn apply_operation(
    op: &FileOperation,
    transaction_id: &str,
    created_dirs: &mut Vec<PathBuf>,
) -> std::io::Result<()> {
    match op.kind {
        OperationKind::Create | OperationKind::Update => {
            if let Some(parent) = op.target.parent() {
                create_dirs_tracked(parent, created_dirs).await?;
            }
            let content = op.content.as_deref().unwrap_or_default();
            write_atomic(&op.target, content.as_bytes(), transaction_id).await
        }
        OperationKind::Delete => tokio::fs::remove_file(&op.target).await,
    }
}

/// `create_dir_all` that records each directory it had to create
async fn create_dirs_tracked(dir: &Path, created: &mut Vec<PathBuf>) -> std::io::Result<()> {
    let mut missing = Vec::new();
    let mut current = Some(dir);
    while let Some(p) = current {
        if tokio::fs::try_exists(p).await.unwrap_or(false) {
            break;
        }
        missing.push(p.to_path_buf());
        current = p.parent();
    }
    for p in missing.into_iter().rev() {
        tokio::fs::create_dir(&p).await?;
        created.push(p);
    }
    Ok(())
}

/// Reverse executed operations (newest first), then drop created directories
async fn restore_operations(executed: &[FileOperation], created_dirs: &[PathBuf]) -> Vec<String> {
    let mut errors = Vec::new();

    for op in executed.iter().rev() {
        let result = match (op.kind, &op.backup_path) {
            (OperationKind::Create, _) => tokio::fs::remove_file(&op.target).await,
            (_, Some(backup)) => tokio::fs::copy(backup, &op.target).await.map(|_| ()),
            (_, None) => match &op.original_content {
                Some(original) => tokio::fs::write(&op.target, original).await,
                None => Err(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "no backup captured",
                )),
            },
        };
        if let Err(e) = result {
            errors.push(format!("restore {} failed: {}", op.target.display(), e));
        }
    }

    for dir in created_dirs.iter().rev() {
        // Only empty directories are removed; anything else is not ours
        let _ = tokio::fs::remove_dir(dir).await;
    }

    errors
}
