//! Client sessions and per-session request tracking
//!
//! A session is one logical client connection. Sessions isolate request
//! bookkeeping; they are not a security boundary.
//!
//! # Thread Safety
//!
//! - The session table is a `parking_lot::RwLock`: status reads don't block each other
//! - Guards are never held across `.await`

pub mod executor;

pub use executor::{SessionAwareExecutor, TrackedRequest};

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;

use crate::config::GatewayConfig;
use crate::error::{GatewayError, Result};

/// Connection lifecycle of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Connecting,
    Connected,
    Idle,
    Disconnecting,
    Disconnected,
}

impl SessionState {
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Connecting | Self::Connected)
    }
}

/// What a client tells us about itself when connecting
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionMetadata {
    pub user_agent: Option<String>,
    pub remote_address: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientSession {
    pub id: String,
    pub connected_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub user_agent: Option<String>,
    pub remote_address: Option<String>,
    pub state: SessionState,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionMetrics {
    pub total_sessions: usize,
    pub active_sessions: usize,
    pub idle_sessions: usize,
    pub max_sessions: usize,
    pub oldest_connection: Option<DateTime<Utc>>,
    pub last_activity: Option<DateTime<Utc>>,
}

fn new_session_id() -> String {
    format!("ses_{}", uuid::Uuid::new_v4().simple())
}

pub struct SessionManager {
    sessions: RwLock<HashMap<String, ClientSession>>,
    max_sessions: usize,
    session_timeout: Duration,
    sweep_interval: Duration,
}

impl SessionManager {
    pub fn new(max_sessions: usize, session_timeout: Duration, sweep_interval: Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            max_sessions,
            session_timeout,
            sweep_interval,
        }
    }

    pub fn from_config(config: &GatewayConfig) -> Self {
        Self::new(
            config.sessions.max_sessions,
            config.session_timeout(),
            config.sweep_interval(),
        )
    }

    pub fn max_sessions(&self) -> usize {
        self.max_sessions
    }

    /// Register a new connected session
    pub fn add_session(&self, meta: SessionMetadata) -> Result<ClientSession> {
        self.insert_session(new_session_id(), meta)
    }

    fn insert_session(&self, id: String, meta: SessionMetadata) -> Result<ClientSession> {
        let mut sessions = self.sessions.write();
        if sessions.len() >= self.max_sessions {
            tracing::warn!("Session limit of {} reached", self.max_sessions);
            return Err(GatewayError::Capacity {
                limit: self.max_sessions,
            });
        }

        let now = Utc::now();
        let session = ClientSession {
            id,
            connected_at: now,
            last_activity: now,
            user_agent: meta.user_agent,
            remote_address: meta.remote_address,
            state: SessionState::Connected,
        };
        sessions.insert(session.id.clone(), session.clone());
        tracing::info!(
            "Session {} connected ({} of {})",
            session.id,
            sessions.len(),
            self.max_sessions
        );
        Ok(session)
    }

    /// Touch `session_id`, registering it again under the same id if it was
    /// swept or removed. Fails with `Capacity` when no slot is free.
    pub fn touch_or_register(&self, session_id: &str, meta: SessionMetadata) -> Result<()> {
        match self.update_activity(session_id) {
            Err(GatewayError::NotFound { .. }) => {
                tracing::info!("Session {} re-registered on request", session_id);
                self.insert_session(session_id.to_string(), meta).map(|_| ())
            }
            other => other,
        }
    }

    pub fn remove_session(&self, session_id: &str) -> Option<ClientSession> {
        let removed = self.sessions.write().remove(session_id);
        if removed.is_some() {
            tracing::info!("Session {} removed", session_id);
        }
        removed
    }

    /// Touch the session; an idle session becomes connected again
    pub fn update_activity(&self, session_id: &str) -> Result<()> {
        let mut sessions = self.sessions.write();
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| GatewayError::not_found("session", session_id))?;
        session.last_activity = Utc::now();
        if session.state == SessionState::Idle {
            session.state = SessionState::Connected;
        }
        Ok(())
    }

    pub fn update_state(&self, session_id: &str, state: SessionState) -> Result<()> {
        let mut sessions = self.sessions.write();
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| GatewayError::not_found("session", session_id))?;
        tracing::debug!("Session {}: {:?} -> {:?}", session_id, session.state, state);
        session.state = state;
        Ok(())
    }

    pub fn get_session(&self, session_id: &str) -> Option<ClientSession> {
        self.sessions.read().get(session_id).cloned()
    }

    /// All sessions, oldest connection first
    pub fn list_sessions(&self) -> Vec<ClientSession> {
        let mut sessions: Vec<ClientSession> = self.sessions.read().values().cloned().collect();
        sessions.sort_by(|a, b| a.connected_at.cmp(&b.connected_at).then_with(|| a.id.cmp(&b.id)));
        sessions
    }

    /// Remove sessions idle longer than the session timeout; returns their ids
    pub fn sweep_expired(&self) -> Vec<String> {
        let timeout = chrono::Duration::from_std(self.session_timeout)
            .unwrap_or_else(|_| chrono::Duration::zero());
        let cutoff = Utc::now() - timeout;

        let mut sessions = self.sessions.write();
        let expired: Vec<String> = sessions
            .values()
            .filter(|s| s.last_activity < cutoff)
            .map(|s| s.id.clone())
            .collect();
        for id in &expired {
            sessions.remove(id);
        }
        drop(sessions);

        if !expired.is_empty() {
            tracing::info!("Swept {} expired session(s)", expired.len());
        }
        expired
    }

    /// Sweep on an interval; `on_expired` runs for every removed session
    pub fn start_sweeper<F>(self: &Arc<Self>, on_expired: F) -> JoinHandle<()>
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        let manager = Arc::clone(self);
        let period = self.sweep_interval.max(Duration::from_millis(10));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // First tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                for id in manager.sweep_expired() {
                    on_expired(&id);
                }
            }
        })
    }

    pub fn metrics(&self) -> SessionMetrics {
        let sessions = self.sessions.read();
        SessionMetrics {
            total_sessions: sessions.len(),
            active_sessions: sessions.values().filter(|s| s.state.is_active()).count(),
            idle_sessions: sessions
                .values()
                .filter(|s| s.state == SessionState::Idle)
                .count(),
            max_sessions: self.max_sessions,
            oldest_connection: sessions.values().map(|s| s.connected_at).min(),
            last_activity: sessions.values().map(|s| s.last_activity).max(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn manager(max: usize, timeout_ms: u64) -> SessionManager {
        SessionManager::new(max, Duration::from_millis(timeout_ms), Duration::from_millis(20))
    }

    #[test]
    fn test_capacity_error_names_limit() {
        let sessions = manager(2, 60_000);
        sessions.add_session(SessionMetadata::default()).unwrap();
        sessions.add_session(SessionMetadata::default()).unwrap();

        let err = sessions.add_session(SessionMetadata::default()).unwrap_err();
        assert!(matches!(err, GatewayError::Capacity { limit: 2 }));
        assert!(err.to_string().contains('2'));
        assert_eq!(sessions.metrics().total_sessions, 2);
    }

    #[test]
    fn test_removal_frees_capacity() {
        let sessions = manager(1, 60_000);
        let first = sessions.add_session(SessionMetadata::default()).unwrap();
        assert!(sessions.remove_session(&first.id).is_some());
        assert!(sessions.add_session(SessionMetadata::default()).is_ok());
    }

    #[test]
    fn test_state_and_activity() {
        let sessions = manager(4, 60_000);
        let session = sessions
            .add_session(SessionMetadata {
                user_agent: Some("cli/1.0".to_string()),
                remote_address: None,
            })
            .unwrap();

        sessions.update_state(&session.id, SessionState::Idle).unwrap();
        let metrics = sessions.metrics();
        assert_eq!(metrics.idle_sessions, 1);
        assert_eq!(metrics.active_sessions, 0);

        sessions.update_activity(&session.id).unwrap();
        let current = sessions.get_session(&session.id).unwrap();
        assert_eq!(current.state, SessionState::Connected);
        assert!(current.last_activity >= session.last_activity);
        assert_eq!(current.user_agent.as_deref(), Some("cli/1.0"));

        assert!(sessions.update_activity("ses_missing").is_err());
    }

    #[test]
    fn test_removed_session_is_registered_again_within_the_cap() {
        let sessions = manager(1, 60_000);
        let first = sessions.add_session(SessionMetadata::default()).unwrap();
        sessions.remove_session(&first.id);

        sessions
            .touch_or_register(&first.id, SessionMetadata::default())
            .unwrap();
        assert_eq!(sessions.get_session(&first.id).unwrap().state, SessionState::Connected);

        sessions.remove_session(&first.id);
        sessions.add_session(SessionMetadata::default()).unwrap();
        let err = sessions
            .touch_or_register(&first.id, SessionMetadata::default())
            .unwrap_err();
        assert!(matches!(err, GatewayError::Capacity { limit: 1 }));
        assert!(sessions.get_session(&first.id).is_none());
    }

    #[tokio::test]
    async fn test_sweep_removes_only_expired() {
        let sessions = manager(4, 50);
        let stale = sessions.add_session(SessionMetadata::default()).unwrap();
        tokio::time::sleep(Duration::from_millis(80)).await;
        let fresh = sessions.add_session(SessionMetadata::default()).unwrap();

        assert_eq!(sessions.sweep_expired(), vec![stale.id]);
        assert!(sessions.get_session(&fresh.id).is_some());
        assert!(sessions.sweep_expired().is_empty());
    }

    #[tokio::test]
    async fn test_sweeper_reports_expired_sessions() {
        let sessions = Arc::new(manager(4, 10));
        sessions.add_session(SessionMetadata::default()).unwrap();
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        let handle = sessions.start_sweeper(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        tokio::time::sleep(Duration::from_millis(150)).await;
        handle.abort();
        assert_eq!(seen.load(Ordering::SeqCst), 1);
        assert!(sessions.list_sessions().is_empty());
    }
}
