//! Chat sessions: one per UI connection, each bound to one agent service thread.
//!
//! A session is created when a client connects (after its thread has been
//! created) and removed when the connection ends. The thread id never changes
//! for the lifetime of the session.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Unique session identifier (opaque string).
pub type SessionId = String;

/// A session: id and the thread it talks to.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: SessionId,
    pub thread_id: String,
    pub created_at: DateTime<Utc>,
}

/// In-memory store for live sessions (create, remove, count).
pub struct SessionStore {
    inner: Arc<RwLock<HashMap<SessionId, Session>>>,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Create a session bound to `thread_id` with a generated id.
    pub async fn create(&self, thread_id: impl Into<String>) -> Session {
        let session = Session {
            id: format!("sess-{}", uuid::Uuid::new_v4()),
            thread_id: thread_id.into(),
            created_at: Utc::now(),
        };
        self.inner
            .write()
            .await
            .insert(session.id.clone(), session.clone());
        session
    }

    /// Remove a session; returns it if it existed.
    pub async fn remove(&self, id: &str) -> Option<Session> {
        self.inner.write().await.remove(id)
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_and_remove() {
        let store = SessionStore::new();
        let a = store.create("thread_a").await;
        let b = store.create("thread_b").await;
        assert_ne!(a.id, b.id);
        assert!(a.id.starts_with("sess-"));
        assert!(a.created_at <= Utc::now());
        assert_eq!(store.len().await, 2);

        let removed = store.remove(&a.id).await.expect("session a exists");
        assert_eq!(removed.thread_id, "thread_a");
        assert_eq!(store.len().await, 1);
        assert!(store.remove(&a.id).await.is_none());
        assert_eq!(
            store.remove(&b.id).await.map(|s| s.thread_id).as_deref(),
            Some("thread_b")
        );
        assert_eq!(store.len().await, 0);
    }
}
