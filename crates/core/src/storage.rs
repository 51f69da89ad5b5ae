//! Optional write-through persistence for sessions.
//!
//! The session manager calls these after each in-memory mutation. A failing
//! store never fails the mutation; the manager logs and moves on.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::StorageError;
use crate::message::Message;

/// Session metadata as persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredSession {
    pub id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub model_key: String,
    #[serde(default)]
    pub total_tokens: u64,
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn save_session(&self, session: &StoredSession) -> Result<(), StorageError>;

    async fn save_message(&self, session_id: &str, message: &Message) -> Result<(), StorageError>;

    /// Messages of one session in insertion order.
    async fn load_messages(&self, session_id: &str) -> Result<Vec<Message>, StorageError>;

    /// Most recently created sessions first, at most `limit`.
    async fn list_sessions(&self, limit: usize) -> Result<Vec<StoredSession>, StorageError>;

    async fn update_session_title(&self, session_id: &str, title: &str) -> Result<(), StorageError>;
}

#[derive(Default)]
struct StoreState {
    sessions: HashMap<String, StoredSession>,
    messages: HashMap<String, Vec<Message>>,
}

/// Process-local store, useful for tests and embedding.
#[derive(Default)]
pub struct InMemorySessionStore {
    state: RwLock<StoreState>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn session_count(&self) -> usize {
        self.state.read().await.sessions.len()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn save_session(&self, session: &StoredSession) -> Result<(), StorageError> {
        self.state
            .write()
            .await
            .sessions
            .insert(session.id.clone(), session.clone());
        Ok(())
    }

    async fn save_message(&self, session_id: &str, message: &Message) -> Result<(), StorageError> {
        let mut state = self.state.write().await;
        if !state.sessions.contains_key(session_id) {
            return Err(StorageError::NotFound(session_id.to_string()));
        }
        state
            .messages
            .entry(session_id.to_string())
            .or_default()
            .push(message.clone());
        Ok(())
    }

    async fn load_messages(&self, session_id: &str) -> Result<Vec<Message>, StorageError> {
        Ok(self
            .state
            .read()
            .await
            .messages
            .get(session_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn list_sessions(&self, limit: usize) -> Result<Vec<StoredSession>, StorageError> {
        let state = self.state.read().await;
        let mut sessions: Vec<StoredSession> = state.sessions.values().cloned().collect();
        sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        sessions.truncate(limit);
        Ok(sessions)
    }

    async fn update_session_title(&self, session_id: &str, title: &str) -> Result<(), StorageError> {
        let mut state = self.state.write().await;
        let session = state
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| StorageError::NotFound(session_id.to_string()))?;
        session.title = title.to_string();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stored(id: &str, minutes_ago: i64) -> StoredSession {
        StoredSession {
            id: id.into(),
            title: format!("Session {id}"),
            created_at: Utc::now() - chrono::Duration::minutes(minutes_ago),
            model_key: "deepseek-chat".into(),
            total_tokens: 0,
        }
    }

    #[tokio::test]
    async fn messages_round_trip_in_order() {
        let store = InMemorySessionStore::new();
        store.save_session(&stored("a", 0)).await.unwrap();
        store.save_message("a", &Message::user("one")).await.unwrap();
        store.save_message("a", &Message::assistant("two")).await.unwrap();

        let loaded = store.load_messages("a").await.unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[1].content(), "two");
        assert!(store.load_messages("missing").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn message_for_unknown_session_is_rejected() {
        let store = InMemorySessionStore::new();
        let err = store.save_message("ghost", &Message::user("x")).await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));
    }

    #[tokio::test]
    async fn list_sessions_is_newest_first_and_limited() {
        let store = InMemorySessionStore::new();
        store.save_session(&stored("old", 30)).await.unwrap();
        store.save_session(&stored("new", 1)).await.unwrap();
        store.save_session(&stored("mid", 10)).await.unwrap();

        let ids: Vec<String> = store
            .list_sessions(2)
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.id)
            .collect();
        assert_eq!(ids, vec!["new", "mid"]);
    }

    #[tokio::test]
    async fn title_update() {
        let store = InMemorySessionStore::new();
        store.save_session(&stored("a", 0)).await.unwrap();
        store.update_session_title("a", "Renamed").await.unwrap();
        assert_eq!(store.list_sessions(1).await.unwrap()[0].title, "Renamed");
        assert!(store.update_session_title("b", "x").await.is_err());
    }
}
