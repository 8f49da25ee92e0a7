//! Per-session request tracking around tool handlers

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackedRequest {
    pub request_id: String,
    pub session_id: String,
    pub tool_name: String,
    pub started_at: DateTime<Utc>,
}

type Registry = Mutex<HashMap<String, HashMap<String, TrackedRequest>>>;

/// Removes its request from the registry when dropped, so the entry goes away
/// whether the handler returned, failed, panicked or was dropped
struct RequestGuard {
    registry: Arc<Registry>,
    session_id: String,
    request_id: String,
}

impl Drop for RequestGuard {
    fn drop(&mut self) {
        let mut registry = self.registry.lock();
        if let Some(requests) = registry.get_mut(&self.session_id) {
            requests.remove(&self.request_id);
            if requests.is_empty() {
                registry.remove(&self.session_id);
            }
        }
    }
}

/// Runs tool handlers while tracking them per session.
///
/// Cancelling a session only drops its bookkeeping: running handlers finish
/// and their results are discarded by the caller.
#[derive(Default)]
pub struct SessionAwareExecutor {
    registry: Arc<Registry>,
    counter: AtomicU64,
}

impl SessionAwareExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_request_id(&self, session_id: &str) -> String {
        let n = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        format!("req_{}_{}", session_id, n)
    }

    fn track(&self, session_id: &str, tool_name: &str) -> RequestGuard {
        let request = TrackedRequest {
            request_id: self.next_request_id(session_id),
            session_id: session_id.to_string(),
            tool_name: tool_name.to_string(),
            started_at: Utc::now(),
        };
        let guard = RequestGuard {
            registry: Arc::clone(&self.registry),
            session_id: session_id.to_string(),
            request_id: request.request_id.clone(),
        };
        self.registry
            .lock()
            .entry(session_id.to_string())
            .or_default()
            .insert(request.request_id.clone(), request);
        guard
    }

    /// Run `handler(params)` as a tracked request of `session_id`
    pub async fn execute_with_session<P, F, Fut, T>(
        &self,
        session_id: &str,
        tool_name: &str,
        params: P,
        handler: F,
    ) -> T
    where
        F: FnOnce(P) -> Fut,
        Fut: Future<Output = T>,
    {
        let guard = self.track(session_id, tool_name);
        tracing::debug!("{} started {}", guard.request_id, tool_name);
        let output = handler(params).await;
        tracing::debug!("{} settled", guard.request_id);
        drop(guard);
        output
    }

    /// Drop the bookkeeping of every request of `session_id`; returns how many there were
    pub fn cancel_session_requests(&self, session_id: &str) -> usize {
        let removed = self
            .registry
            .lock()
            .remove(session_id)
            .map(|requests| requests.len())
            .unwrap_or(0);
        if removed > 0 {
            tracing::info!("Cancelled {} request(s) of session {}", removed, session_id);
        }
        removed
    }

    pub fn get_session_requests(&self, session_id: &str) -> Vec<TrackedRequest> {
        let mut requests: Vec<TrackedRequest> = self
            .registry
            .lock()
            .get(session_id)
            .map(|r| r.values().cloned().collect())
            .unwrap_or_default();
        requests.sort_by(|a, b| a.started_at.cmp(&b.started_at));
        requests
    }

    pub fn get_all_active_requests(&self) -> Vec<TrackedRequest> {
        let mut requests: Vec<TrackedRequest> = self
            .registry
            .lock()
            .values()
            .flat_map(|r| r.values().cloned())
            .collect();
        requests.sort_by(|a, b| a.started_at.cmp(&b.started_at));
        requests
    }

    pub fn active_request_count(&self) -> usize {
        self.registry.lock().values().map(|r| r.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn test_request_removed_after_success_and_failure() {
        let executor = SessionAwareExecutor::new();
        let ok: Result<u32, String> = executor
            .execute_with_session("s1", "gateway-health", 2u32, |n| async move { Ok(n * 2) })
            .await;
        assert_eq!(ok, Ok(4));

        let err: Result<u32, String> = executor
            .execute_with_session("s1", "gateway-health", (), |_| async {
                Err("boom".to_string())
            })
            .await;
        assert!(err.is_err());
        assert_eq!(executor.active_request_count(), 0);
        assert!(executor.get_session_requests("s1").is_empty());
    }

    #[tokio::test]
    async fn test_cancel_counts_outstanding_requests() {
        let executor = Arc::new(SessionAwareExecutor::new());
        let mut releases = Vec::new();
        let mut handles = Vec::new();
        for _ in 0..3 {
            let (tx, rx) = oneshot::channel::<()>();
            releases.push(tx);
            let executor = Arc::clone(&executor);
            handles.push(tokio::spawn(async move {
                executor
                    .execute_with_session("s1", "predict-change-impact", rx, |rx| async move {
                        let _ = rx.await;
                        "done"
                    })
                    .await
            }));
        }
        while executor.active_request_count() < 3 {
            tokio::task::yield_now().await;
        }
        let other = executor.get_all_active_requests();
        assert_eq!(other.len(), 3);
        assert!(other.iter().all(|r| r.request_id.starts_with("req_s1_")));

        assert_eq!(executor.cancel_session_requests("s1"), 3);
        assert_eq!(executor.cancel_session_requests("s1"), 0);

        // Handlers still run to completion
        for tx in releases {
            let _ = tx.send(());
        }
        for handle in handles {
            assert_eq!(handle.await.unwrap(), "done");
        }
        assert_eq!(executor.active_request_count(), 0);
    }

    #[tokio::test]
    async fn test_sessions_are_isolated() {
        let executor = Arc::new(SessionAwareExecutor::new());
        let (tx, rx) = oneshot::channel::<()>();
        let running = {
            let executor = Arc::clone(&executor);
            tokio::spawn(async move {
                executor
                    .execute_with_session("s2", "analyze-domain-map", rx, |rx| async move {
                        let _ = rx.await;
                    })
                    .await
            })
        };
        while executor.active_request_count() < 1 {
            tokio::task::yield_now().await;
        }

        assert_eq!(executor.cancel_session_requests("s1"), 0);
        assert_eq!(executor.get_session_requests("s2").len(), 1);
        let _ = tx.send(());
        running.await.unwrap();
    }
}
