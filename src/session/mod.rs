//! Message-history persistence boundary.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::OrbitError;
use crate::types::Message;

/// Storage backend for conversation histories, keyed by session id.
///
/// Implementations must round-trip every content block unchanged, including
/// opaque extension blocks they do not understand.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Load a history; an unknown session yields `None`.
    async fn load(&self, session_id: &str) -> Result<Option<Vec<Message>>, OrbitError>;

    async fn save(&self, session_id: &str, messages: &[Message]) -> Result<(), OrbitError>;

    async fn delete(&self, session_id: &str) -> Result<(), OrbitError>;
}

/// Process-local [`SessionStore`].
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<String, Vec<Message>>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn session_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.sessions.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn load(&self, session_id: &str) -> Result<Option<Vec<Message>>, OrbitError> {
        Ok(self.sessions.read().await.get(session_id).cloned())
    }

    async fn save(&self, session_id: &str, messages: &[Message]) -> Result<(), OrbitError> {
        self.sessions
            .write()
            .await
            .insert(session_id.to_string(), messages.to_vec());
        Ok(())
    }

    async fn delete(&self, session_id: &str) -> Result<(), OrbitError> {
        self.sessions.write().await.remove(session_id);
        Ok(())
    }
}
