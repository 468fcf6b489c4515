//! Session table — in-memory registrations keyed by conversation id.
//!
//! Owned by the dispatcher and passed around by handle; nothing here is
//! global. Sessions do not survive a restart.

use std::collections::HashMap;

use tokio::sync::RwLock;

use super::model::Registration;

/// Opaque identity of one chat thread (Telegram `chat.id`).
pub type ConversationId = i64;

/// Active registrations, at most one per conversation.
///
/// Callers are expected to serialize access per conversation id (see
/// `Dispatcher`); the lock here only protects the map itself.
#[derive(Debug, Default)]
pub struct SessionTable {
    sessions: RwLock<HashMap<ConversationId, Registration>>,
}

impl SessionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the session for `id`, if one is active.
    pub async fn get(&self, id: ConversationId) -> Option<Registration> {
        self.sessions.read().await.get(&id).cloned()
    }

    pub async fn contains(&self, id: ConversationId) -> bool {
        self.sessions.read().await.contains_key(&id)
    }

    /// Store (or replace) the session for `id`.
    pub async fn insert(&self, id: ConversationId, registration: Registration) {
        self.sessions.write().await.insert(id, registration);
    }

    pub async fn remove(&self, id: ConversationId) -> Option<Registration> {
        self.sessions.write().await.remove(&id)
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Drop every session. Returns how many were discarded.
    pub async fn clear(&self) -> usize {
        let mut sessions = self.sessions.write().await;
        let count = sessions.len();
        sessions.clear();
        count
    }
}
