//! `SessionStore` port plus an in-memory reference implementation. Writes
//! are serialized per `sessionId`; the `DashMap` shard lock gives us that
//! for free.

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;

#[derive(Clone, Debug)]
pub struct Session {
    pub session_id: String,
    pub user_id: String,
    pub created_at_epoch: f64,
    pub expires_at_epoch: f64,
    pub idle_timeout_seconds: f64,
    pub last_accessed_at_epoch: f64,
    pub claims: HashMap<String, Value>,
}

impl Session {
    pub fn is_expired(&self, now: f64) -> bool {
        now >= self.expires_at_epoch
    }

    pub fn is_idle(&self, now: f64) -> bool {
        now - self.last_accessed_at_epoch >= self.idle_timeout_seconds
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SessionStoreError {
    #[error("session store unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get(&self, session_id: &str) -> Result<Option<Session>, SessionStoreError>;
    async fn put(&self, session: Session) -> Result<(), SessionStoreError>;
    async fn update_last_accessed(&self, session_id: &str, now: f64) -> Result<(), SessionStoreError>;
    async fn invalidate(&self, session_id: &str) -> Result<(), SessionStoreError>;
    async fn invalidate_user(&self, user_id: &str) -> Result<(), SessionStoreError>;
    fn watch_invalidations(&self) -> broadcast::Receiver<String>;
}

pub struct InMemorySessionStore {
    sessions: DashMap<String, Session>,
    invalidations: broadcast::Sender<String>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(256);
        Self {
            sessions: DashMap::new(),
            invalidations: tx,
        }
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

impl Default for InMemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get(&self, session_id: &str) -> Result<Option<Session>, SessionStoreError> {
        Ok(self.sessions.get(session_id).map(|e| e.value().clone()))
    }

    async fn put(&self, session: Session) -> Result<(), SessionStoreError> {
        self.sessions.insert(session.session_id.clone(), session);
        Ok(())
    }

    async fn update_last_accessed(&self, session_id: &str, now: f64) -> Result<(), SessionStoreError> {
        if let Some(mut entry) = self.sessions.get_mut(session_id) {
            entry.last_accessed_at_epoch = now;
        }
        Ok(())
    }

    async fn invalidate(&self, session_id: &str) -> Result<(), SessionStoreError> {
        self.sessions.remove(session_id);
        let _ = self.invalidations.send(session_id.to_string());
        Ok(())
    }

    async fn invalidate_user(&self, user_id: &str) -> Result<(), SessionStoreError> {
        let ids: Vec<String> = self
            .sessions
            .iter()
            .filter(|e| e.value().user_id == user_id)
            .map(|e| e.key().clone())
            .collect();
        for id in ids {
            self.sessions.remove(&id);
            let _ = self.invalidations.send(id);
        }
        Ok(())
    }

    fn watch_invalidations(&self) -> broadcast::Receiver<String> {
        self.invalidations.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(id: &str, user: &str, now: f64) -> Session {
        Session {
            session_id: id.to_string(),
            user_id: user.to_string(),
            created_at_epoch: now,
            expires_at_epoch: now + 3600.0,
            idle_timeout_seconds: 900.0,
            last_accessed_at_epoch: now,
            claims: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let store = InMemorySessionStore::new();
        store.put(session("s1", "u1", 0.0)).await.unwrap();
        let got = store.get("s1").await.unwrap().unwrap();
        assert_eq!(got.user_id, "u1");
    }

    #[test]
    fn expiry_and_idle_checks() {
        let s = session("s1", "u1", 0.0);
        assert!(!s.is_expired(100.0));
        assert!(s.is_expired(4000.0));
        assert!(!s.is_idle(100.0));
        assert!(s.is_idle(1000.0));
    }

    #[tokio::test]
    async fn invalidate_user_removes_all_their_sessions() {
        let store = InMemorySessionStore::new();
        store.put(session("s1", "u1", 0.0)).await.unwrap();
        store.put(session("s2", "u1", 0.0)).await.unwrap();
        store.put(session("s3", "u2", 0.0)).await.unwrap();
        store.invalidate_user("u1").await.unwrap();
        assert!(store.get("s1").await.unwrap().is_none());
        assert!(store.get("s2").await.unwrap().is_none());
        assert!(store.get("s3").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn invalidate_emits_on_watch_channel() {
        let store = InMemorySessionStore::new();
        let mut rx = store.watch_invalidations();
        store.put(session("s1", "u1", 0.0)).await.unwrap();
        store.invalidate("s1").await.unwrap();
        assert_eq!(rx.recv().await.unwrap(), "s1");
    }
}
