//! Approval workflow for risky coordination phases

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::domain::RiskLevel;
use crate::error::{GatewayError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
}

/// What the approver is asked to sign off on
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalCriteria {
    pub plan_id: String,
    pub phase: usize,
    pub risk_level: RiskLevel,
    pub domains: Vec<String>,
    pub estimated_time_ms: u64,
}

#[async_trait]
pub trait ApprovalWorkflow: Send + Sync {
    /// Submit a request and return its approval id
    async fn request_approval(&self, description: &str, criteria: &ApprovalCriteria)
        -> Result<String>;

    async fn get_status(&self, approval_id: &str) -> Result<ApprovalStatus>;
}

fn new_approval_id() -> String {
    format!("apr_{}", uuid::Uuid::new_v4().simple())
}

/// Approves every request immediately
#[derive(Debug, Clone, Default)]
pub struct AutoApproval;

#[async_trait]
impl ApprovalWorkflow for AutoApproval {
    async fn request_approval(
        &self,
        description: &str,
        criteria: &ApprovalCriteria,
    ) -> Result<String> {
        tracing::debug!(
            "Auto-approving phase {} of {}: {}",
            criteria.phase,
            criteria.plan_id,
            description
        );
        Ok(new_approval_id())
    }

    async fn get_status(&self, _approval_id: &str) -> Result<ApprovalStatus> {
        Ok(ApprovalStatus::Approved)
    }
}

/// A request waiting on a human decision
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalRequest {
    pub id: String,
    pub description: String,
    pub criteria: ApprovalCriteria,
    pub status: ApprovalStatus,
    pub requested_at: DateTime<Utc>,
}

/// In-memory queue decided through [`ManualApproval::decide`]
#[derive(Debug, Default)]
pub struct ManualApproval {
    requests: Mutex<HashMap<String, ApprovalRequest>>,
}

impl ManualApproval {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn decide(&self, approval_id: &str, approved: bool) -> Result<()> {
        let mut requests = self.requests.lock();
        let request = requests
            .get_mut(approval_id)
            .ok_or_else(|| GatewayError::not_found("approval", approval_id))?;
        request.status = if approved {
            ApprovalStatus::Approved
        } else {
            ApprovalStatus::Rejected
        };
        Ok(())
    }

    pub fn pending(&self) -> Vec<ApprovalRequest> {
        let mut pending: Vec<ApprovalRequest> = self
            .requests
            .lock()
            .values()
            .filter(|r| r.status == ApprovalStatus::Pending)
            .cloned()
            .collect();
        pending.sort_by(|a, b| a.requested_at.cmp(&b.requested_at));
        pending
    }
}

#[async_trait]
impl ApprovalWorkflow for ManualApproval {
    async fn request_approval(
        &self,
        description: &str,
        criteria: &ApprovalCriteria,
    ) -> Result<String> {
        let id = new_approval_id();
        self.requests.lock().insert(
            id.clone(),
            ApprovalRequest {
                id: id.clone(),
                description: description.to_string(),
                criteria: criteria.clone(),
                status: ApprovalStatus::Pending,
                requested_at: Utc::now(),
            },
        );
        tracing::info!("Approval {} requested: {}", id, description);
        Ok(id)
    }

    async fn get_status(&self, approval_id: &str) -> Result<ApprovalStatus> {
        self.requests
            .lock()
            .get(approval_id)
            .map(|r| r.status)
            .ok_or_else(|| GatewayError::not_found("approval", approval_id))
    }
}

/// Poll `workflow` until the request leaves `Pending` or `timeout` elapses
pub async fn wait_for_decision(
    workflow: &dyn ApprovalWorkflow,
    approval_id: &str,
    timeout: Duration,
    poll_interval: Duration,
) -> Result<ApprovalStatus> {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let status = workflow.get_status(approval_id).await?;
        if status != ApprovalStatus::Pending {
            return Ok(status);
        }
        if tokio::time::Instant::now() >= deadline {
            return Err(GatewayError::Timeout {
                phase: "approval".to_string(),
                budget_ms: timeout.as_millis() as u64,
            });
        }
        tokio::time::sleep(poll_interval).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn criteria() -> ApprovalCriteria {
        ApprovalCriteria {
            plan_id: "plan_1".to_string(),
            phase: 1,
            risk_level: RiskLevel::Critical,
            domains: vec!["Billing".to_string()],
            estimated_time_ms: 500,
        }
    }

    #[tokio::test]
    async fn test_auto_approval() {
        let workflow = AutoApproval;
        let id = workflow.request_approval("phase 1", &criteria()).await.unwrap();
        assert_eq!(workflow.get_status(&id).await.unwrap(), ApprovalStatus::Approved);
    }

    #[tokio::test]
    async fn test_manual_decision_unblocks_waiter() {
        let workflow = Arc::new(ManualApproval::new());
        let id = workflow.request_approval("phase 1", &criteria()).await.unwrap();
        assert_eq!(workflow.pending().len(), 1);

        let decider = workflow.clone();
        let decided_id = id.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            decider.decide(&decided_id, false).unwrap();
        });

        let status = wait_for_decision(
            workflow.as_ref(),
            &id,
            Duration::from_secs(5),
            Duration::from_millis(5),
        )
        .await
        .unwrap();
        assert_eq!(status, ApprovalStatus::Rejected);
        assert!(workflow.pending().is_empty());
    }

    #[tokio::test]
    async fn test_wait_times_out() {
        let workflow = ManualApproval::new();
        let id = workflow.request_approval("phase 1", &criteria()).await.unwrap();
        let err = wait_for_decision(
            &workflow,
            &id,
            Duration::from_millis(20),
            Duration::from_millis(5),
        )
        .await
        .unwrap_err();
        assert_eq!(err.category(), "timeout");
    }

    #[test]
    fn test_unknown_id_is_not_found() {
        let workflow = ManualApproval::new();
        assert!(workflow.decide("apr_missing", true).is_err());
    }
}
