//! In-memory session registry used by the bundled host
//!
//! Each login session gets a random id and its own async mutex, so
//! concurrent requests for different sessions never contend, and requests
//! for the same session run one after another.

use chrono::{Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::session::state::SessionState;

/// Shared handle to one session's state
pub type SessionHandle = Arc<Mutex<SessionState>>;

/// Holds all live login sessions
#[derive(Clone)]
pub struct SessionRegistry {
    sessions: Arc<RwLock<HashMap<String, SessionHandle>>>,
    login_timeout: Duration,
}

impl SessionRegistry {
    #[must_use]
    pub fn new(login_timeout_minutes: i64) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            login_timeout: Duration::minutes(login_timeout_minutes),
        }
    }

    /// Create a fresh session and return its id and handle.
    /// Sessions older than the login timeout are swept out first.
    pub async fn create(&self) -> (String, SessionHandle) {
        let session_id = Uuid::new_v4().to_string();
        let handle = Arc::new(Mutex::new(SessionState::new(&session_id)));

        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        let now = Utc::now();
        let login_timeout = self.login_timeout;
        // Sessions locked by an in-flight request are left for the next sweep
        sessions.retain(|_, existing| match existing.try_lock() {
            Ok(state) => now - state.created_at() <= login_timeout,
            Err(_) => true,
        });
        let swept = before - sessions.len();
        if swept > 0 {
            log::info!("Dropped {swept} expired login session(s)");
        }
        sessions.insert(session_id.clone(), handle.clone());
        drop(sessions);

        log::debug!("Created login session {session_id}");
        (session_id, handle)
    }

    /// Look up a session; sessions older than the timeout are dropped
    pub async fn get(&self, session_id: &str) -> Option<SessionHandle> {
        let handle = self.sessions.read().await.get(session_id).cloned()?;

        let expired = {
            let state = handle.lock().await;
            Utc::now() - state.created_at() > self.login_timeout
        };
        if expired {
            log::info!("Login session {session_id} expired before completion");
            self.remove(session_id).await;
            return None;
        }
        Some(handle)
    }

    pub async fn remove(&self, session_id: &str) -> bool {
        self.sessions.write().await.remove(session_id).is_some()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_and_get() {
        let registry = SessionRegistry::new(10);
        let (id, handle) = registry.create().await;
        assert_eq!(handle.lock().await.session_id(), Some(id.as_str()));
        assert!(registry.get(&id).await.is_some());
        assert!(registry.get("unknown").await.is_none());
    }

    #[tokio::test]
    async fn test_sessions_are_isolated() {
        let registry = SessionRegistry::new(10);
        let (first, _) = registry.create().await;
        let (second, _) = registry.create().await;
        assert_ne!(first, second);

        registry
            .get(&first)
            .await
            .unwrap()
            .lock()
            .await
            .set("key", "value".to_string());
        assert!(registry
            .get(&second)
            .await
            .unwrap()
            .lock()
            .await
            .get("key")
            .is_none());
    }

    #[tokio::test]
    async fn test_unfinished_login_expires() {
        let registry = SessionRegistry::new(0);
        let (id, _) = registry.create().await;
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        assert!(registry.get(&id).await.is_none());
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_create_sweeps_expired_sessions() {
        let registry = SessionRegistry::new(0);
        let (first, _) = registry.create().await;
        let (second, _) = registry.create().await;
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;

        let (third, _) = registry.create().await;
        assert_eq!(registry.len().await, 1);
        assert!(registry.sessions.read().await.contains_key(&third));
        assert!(!registry.sessions.read().await.contains_key(&first));
        assert!(!registry.sessions.read().await.contains_key(&second));
    }

    #[tokio::test]
    async fn test_sweep_keeps_sessions_in_use() {
        let registry = SessionRegistry::new(0);
        let (busy, handle) = registry.create().await;
        let _guard = handle.lock().await;
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;

        registry.create().await;
        assert!(registry.sessions.read().await.contains_key(&busy));
    }

    #[tokio::test]
    async fn test_remove() {
        let registry = SessionRegistry::new(10);
        let (id, _) = registry.create().await;
        assert!(registry.remove(&id).await);
        assert!(!registry.remove(&id).await);
        assert_eq!(registry.len().await, 0);
    }
}
