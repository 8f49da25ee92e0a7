//! Rollback snapshot store
//!
//! Layout under the rollback root:
//!
//! ```text
//! state/index.json            one entry per update id
//! snapshots/<id>-<seq>.json   payload: executed operations + original content
//! ```
//!
//! Every snapshot gets a monotonically increasing sequence number. Payload
//! files carry it in their name, and a cleanup sweep only touches entries whose
//! sequence was already allocated when the sweep started, so snapshots written
//! concurrently with a sweep always survive it.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::atomic::{FileOperation, OperationKind, RollbackData};
use crate::config::RetentionPolicy;
use crate::error::{GatewayError, Result};
use crate::fs_utils::{fnv1a_hex, write_atomic};

/// Reason that always runs a sweep regardless of the configured triggers
pub const MANUAL_TRIGGER: &str = "manual";

const INDEX_FILE: &str = "index.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SnapshotStatus {
    /// The update committed; the snapshot can reverse it
    Committed,
    /// The transaction failed; kept for post-mortem
    Failed,
    RolledBack,
}

/// One reversible file mutation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotOperation {
    pub kind: OperationKind,
    pub target: PathBuf,
    /// Content before the update; `None` when the update created the file
    pub original_content: Option<String>,
    /// FNV-1a hash of the content the update wrote
    pub content_hash: Option<String>,
}

impl From<&FileOperation> for SnapshotOperation {
    fn from(op: &FileOperation) -> Self {
        Self {
            kind: op.kind,
            target: op.target.clone(),
            original_content: op.original_content.clone(),
            content_hash: op.content.as_ref().map(|c| fnv1a_hex(c.as_bytes())),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RollbackSnapshot {
    pub update_id: String,
    pub seq: u64,
    pub created_at: DateTime<Utc>,
    pub status: SnapshotStatus,
    pub domains: Vec<String>,
    pub project_root: PathBuf,
    pub transaction_id: Option<String>,
    pub operations: Vec<SnapshotOperation>,
    #[serde(default)]
    pub restore_errors: Vec<String>,
}

/// Index entry for one snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotSummary {
    pub update_id: String,
    pub seq: u64,
    pub created_at: DateTime<Utc>,
    pub status: SnapshotStatus,
    pub domains: Vec<String>,
    pub operation_count: usize,
}

impl SnapshotSummary {
    fn payload_name(&self) -> String {
        payload_name(&self.update_id, self.seq)
    }
}

fn payload_name(update_id: &str, seq: u64) -> String {
    format!("{}-{}.json", update_id, seq)
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RollbackIndex {
    next_seq: u64,
    entries: BTreeMap<String, SnapshotSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupReport {
    pub removed_count: usize,
    /// The reason is not a configured trigger, so nothing ran
    pub skipped: bool,
    pub reason: String,
}

/// Persistent store of whole-update rollback snapshots
#[derive(Debug)]
pub struct RollbackStore {
    root: PathBuf,
    policy: RetentionPolicy,
    index: Mutex<RollbackIndex>,
}

impl RollbackStore {
    /// Open (or initialise) the store under `root`
    pub async fn open(root: PathBuf, policy: RetentionPolicy) -> Result<Self> {
        tokio::fs::create_dir_all(root.join("state")).await?;
        tokio::fs::create_dir_all(root.join("snapshots")).await?;

        let index_path = root.join("state").join(INDEX_FILE);
        let index = match tokio::fs::read(&index_path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_else(|e| {
                tracing::warn!("Rollback index unreadable, starting empty: {}", e);
                RollbackIndex::default()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => RollbackIndex::default(),
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            root,
            policy,
            index: Mutex::new(index),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn state_dir(&self) -> PathBuf {
        self.root.join("state")
    }

    pub fn snapshots_dir(&self) -> PathBuf {
        self.root.join("snapshots")
    }

    fn payload_path(&self, name: &str) -> PathBuf {
        self.snapshots_dir().join(name)
    }

    async fn save_index(&self, index: &RollbackIndex) -> Result<()> {
        let json = serde_json::to_vec_pretty(index)?;
        write_atomic(&self.state_dir().join(INDEX_FILE), &json, "index").await?;
        Ok(())
    }

    async fn insert(&self, mut snapshot: RollbackSnapshot) -> Result<SnapshotSummary> {
        let mut index = self.index.lock().await;
        index.next_seq += 1;
        snapshot.seq = index.next_seq;

        let json = serde_json::to_vec_pretty(&snapshot)?;
        let name = payload_name(&snapshot.update_id, snapshot.seq);
        write_atomic(&self.payload_path(&name), &json, "snapshot").await?;

        let summary = SnapshotSummary {
            update_id: snapshot.update_id.clone(),
            seq: snapshot.seq,
            created_at: snapshot.created_at,
            status: snapshot.status,
            domains: snapshot.domains.clone(),
            operation_count: snapshot.operations.len(),
        };
        // Same id: replace the entry and drop the superseded payload
        if let Some(old) = index
            .entries
            .insert(summary.update_id.clone(), summary.clone())
        {
            let _ = tokio::fs::remove_file(self.payload_path(&old.payload_name())).await;
        }
        self.save_index(&index).await?;
        Ok(summary)
    }

    /// Persist a snapshot able to reverse a committed update
    pub async fn create_snapshot(
        &self,
        update_id: &str,
        domains: &[String],
        project_root: &Path,
        operations: &[FileOperation],
    ) -> Result<SnapshotSummary> {
        let summary = self
            .insert(RollbackSnapshot {
                update_id: update_id.to_string(),
                seq: 0,
                created_at: Utc::now(),
                status: SnapshotStatus::Committed,
                domains: domains.to_vec(),
                project_root: project_root.to_path_buf(),
                transaction_id: None,
                operations: operations.iter().map(SnapshotOperation::from).collect(),
                restore_errors: Vec::new(),
            })
            .await?;
        tracing::debug!(
            "Snapshot {} stored ({} operations)",
            update_id,
            summary.operation_count
        );
        Ok(summary)
    }

    /// Keep a record of a failed transaction
    pub async fn record_failed_transaction(
        &self,
        update_id: &str,
        domains: &[String],
        project_root: &Path,
        rollback_data: &RollbackData,
    ) -> Result<SnapshotSummary> {
        self.insert(RollbackSnapshot {
            update_id: update_id.to_string(),
            seq: 0,
            created_at: Utc::now(),
            status: SnapshotStatus::Failed,
            domains: domains.to_vec(),
            project_root: project_root.to_path_buf(),
            transaction_id: Some(rollback_data.transaction_id.clone()),
            operations: rollback_data
                .operations
                .iter()
                .map(SnapshotOperation::from)
                .collect(),
            restore_errors: rollback_data.restore_errors.clone(),
        })
        .await
    }

    pub async fn list_snapshots(&self) -> Vec<SnapshotSummary> {
        let index = self.index.lock().await;
        let mut list: Vec<SnapshotSummary> = index.entries.values().cloned().collect();
        list.sort_by_key(|s| s.seq);
        list
    }

    pub async fn get_snapshot(&self, update_id: &str) -> Result<RollbackSnapshot> {
        let summary = {
            let index = self.index.lock().await;
            index
                .entries
                .get(update_id)
                .cloned()
                .ok_or_else(|| GatewayError::not_found("snapshot", update_id))?
        };
        let bytes = tokio::fs::read(self.payload_path(&summary.payload_name())).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Whether a committed snapshot exists with a readable payload
    pub async fn can_restore(&self, update_id: &str) -> bool {
        match self.get_snapshot(update_id).await {
            Ok(snapshot) => snapshot.status == SnapshotStatus::Committed,
            Err(_) => false,
        }
    }

    /// Reverse a committed update, newest operation first; returns files restored
    pub async fn restore_snapshot(&self, update_id: &str) -> Result<usize> {
        let mut snapshot = self.get_snapshot(update_id).await?;
        if snapshot.status != SnapshotStatus::Committed {
            return Err(GatewayError::validation(format!(
                "snapshot {} is {:?} and cannot be restored",
                update_id, snapshot.status
            )));
        }

        let mut restored = 0;
        let mut errors = Vec::new();
        for op in snapshot.operations.iter().rev() {
            if let Some(expected) = &op.content_hash {
                if let Ok(current) = tokio::fs::read(&op.target).await {
                    if &fnv1a_hex(&current) != expected {
                        tracing::warn!(
                            "{} changed since update {}; restoring anyway",
                            op.target.display(),
                            update_id
                        );
                    }
                }
            }
            match restore_one(op).await {
                Ok(()) => restored += 1,
                Err(e) => errors.push(format!("restore {} failed: {}", op.target.display(), e)),
            }
        }

        snapshot.restore_errors = errors.clone();
        if errors.is_empty() {
            snapshot.status = SnapshotStatus::RolledBack;
        }
        {
            let mut index = self.index.lock().await;
            if let Some(entry) = index.entries.get_mut(update_id) {
                if entry.seq == snapshot.seq {
                    entry.status = snapshot.status;
                    let json = serde_json::to_vec_pretty(&snapshot)?;
                    write_atomic(&self.payload_path(&entry.payload_name()), &json, "snapshot")
                        .await?;
                }
            }
            self.save_index(&index).await?;
        }

        if errors.is_empty() {
            tracing::info!("Rolled back update {} ({} files)", update_id, restored);
            Ok(restored)
        } else {
            Err(GatewayError::PartialWrite {
                message: errors.join("; "),
            })
        }
    }

    /// Apply the retention policy if `reason` is a configured trigger
    pub async fn trigger_cleanup(&self, reason: &str) -> Result<CleanupReport> {
        let runs = reason == MANUAL_TRIGGER || self.policy.cleanup_triggers.iter().any(|t| t == reason);
        if !runs {
            return Ok(CleanupReport {
                removed_count: 0,
                skipped: true,
                reason: reason.to_string(),
            });
        }

        // Phase 1: pick victims among entries that existed when the sweep began
        let victims: Vec<SnapshotSummary> = {
            let index = self.index.lock().await;
            let watermark = index.next_seq;
            let mut eligible: Vec<&SnapshotSummary> = index
                .entries
                .values()
                .filter(|e| e.seq <= watermark)
                .collect();
            eligible.sort_by_key(|e| e.seq);

            let cutoff = Utc::now() - self.policy.max_age();
            let mut victims: Vec<SnapshotSummary> = eligible
                .iter()
                .copied()
                .filter(|e| e.created_at < cutoff)
                .cloned()
                .collect();

            let survivors: Vec<&SnapshotSummary> =
                eligible.into_iter().filter(|e| e.created_at >= cutoff).collect();
            if survivors.len() > self.policy.max_snapshots {
                let excess = survivors.len() - self.policy.max_snapshots;
                if self.policy.aggressive_cleanup {
                    victims.extend(survivors.into_iter().take(excess).cloned());
                } else {
                    tracing::warn!(
                        "{} rollback snapshots exceed the limit of {}; enable aggressive_cleanup to trim",
                        survivors.len(),
                        self.policy.max_snapshots
                    );
                }
            }
            victims
        };

        // Phase 2: delete payloads without holding the index
        for victim in &victims {
            match tokio::fs::remove_file(self.payload_path(&victim.payload_name())).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }

        // Phase 3: drop index entries that still point at the removed payloads
        let mut removed_count = 0;
        {
            let mut index = self.index.lock().await;
            for victim in &victims {
                let same = index
                    .entries
                    .get(&victim.update_id)
                    .map(|e| e.seq == victim.seq)
                    .unwrap_or(false);
                if same {
                    index.entries.remove(&victim.update_id);
                    removed_count += 1;
                }
            }
            if removed_count > 0 {
                self.save_index(&index).await?;
            }
        }

        if removed_count > 0 {
            tracing::info!(
                "Rollback cleanup ({}) removed {} snapshot(s)",
                reason,
                removed_count
            );
        }
        Ok(CleanupReport {
            removed_count,
            skipped: false,
            reason: reason.to_string(),
        })
    }

    #[cfg(test)]
    async fn backdate(&self, update_id: &str, created_at: DateTime<Utc>) {
        let mut index = self.index.lock().await;
        if let Some(entry) = index.entries.get_mut(update_id) {
            entry.created_at = created_at;
        }
    }
}

async fn restore_one(op: &SnapshotOperation) -> std::io::Result<()> {
    match (op.kind, &op.original_content) {
        (OperationKind::Create, _) => match tokio::fs::remove_file(&op.target).await {
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            other => other,
        },
        (_, Some(original)) => {
            if let Some(parent) = op.target.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            write_atomic(&op.target, original.as_bytes(), "restore").await
        }
        (_, None) => Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "original content was not captured",
        )),
    }
}
