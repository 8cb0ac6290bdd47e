//! Per-session conversation history shared by `generate` calls
//!
//! Sessions are created lazily on first reference and live for the rest of the
//! process. Each session carries its own async mutex so a read-call-append
//! sequence for one session id is never interleaved with another.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

/// One content fragment of a turn, in the provider's wire shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Part {
    Text(String),
    #[serde(rename_all = "camelCase")]
    InlineData { mime_type: String, data: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub parts: Vec<Part>,
}

impl ConversationTurn {
    pub fn user(parts: Vec<Part>) -> Self {
        Self {
            role: Role::User,
            parts,
        }
    }

    pub fn user_text(text: impl Into<String>) -> Self {
        Self::user(vec![Part::Text(text.into())])
    }

    pub fn model_text(text: impl Into<String>) -> Self {
        Self {
            role: Role::Model,
            parts: vec![Part::Text(text.into())],
        }
    }
}

/// Exclusive access to one session's history until dropped.
pub struct SessionGuard {
    session_id: String,
    turns: OwnedMutexGuard<Vec<ConversationTurn>>,
}

impl SessionGuard {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    pub fn append(&mut self, turns: impl IntoIterator<Item = ConversationTurn>) {
        self.turns.extend(turns);
    }
}

#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Locks a session, creating it empty on first reference.
    async fn lock_session(&self, session_id: &str) -> SessionGuard;

    async fn history(&self, session_id: &str) -> Option<Vec<ConversationTurn>>;

    /// Removes a session. A holder of its guard keeps appending to the detached copy.
    async fn evict(&self, session_id: &str) -> bool;

    async fn session_count(&self) -> usize;
}

/// Unbounded process-lifetime store with no expiry.
#[derive(Debug, Default)]
pub struct InMemoryConversationStore {
    sessions: Mutex<HashMap<String, Arc<Mutex<Vec<ConversationTurn>>>>>,
}

impl InMemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn session(&self, session_id: &str) -> Option<Arc<Mutex<Vec<ConversationTurn>>>> {
        self.sessions.lock().await.get(session_id).cloned()
    }
}

#[async_trait]
impl ConversationStore for InMemoryConversationStore {
    async fn lock_session(&self, session_id: &str) -> SessionGuard {
        let session = {
            let mut sessions = self.sessions.lock().await;
            sessions
                .entry(session_id.to_string())
                .or_default()
                .clone()
        };

        SessionGuard {
            session_id: session_id.to_string(),
            turns: session.lock_owned().await,
        }
    }

    async fn history(&self, session_id: &str) -> Option<Vec<ConversationTurn>> {
        let session = self.session(session_id).await?;
        let turns = session.lock().await;
        Some(turns.clone())
    }

    async fn evict(&self, session_id: &str) -> bool {
        self.sessions.lock().await.remove(session_id).is_some()
    }

    async fn session_count(&self) -> usize {
        self.sessions.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use super::*;

    #[test]
    fn turns_serialize_in_provider_shape() {
        let turn = ConversationTurn::user(vec![
            Part::Text("describe".to_string()),
            Part::InlineData {
                mime_type: "image/png".to_string(),
                data: "aGVsbG8=".to_string(),
            },
        ]);

        assert_eq!(
            serde_json::to_value(&turn).expect("serialize turn"),
            json!({
                "role": "user",
                "parts": [
                    { "text": "describe" },
                    { "inlineData": { "mimeType": "image/png", "data": "aGVsbG8=" } }
                ]
            })
        );
    }

    #[tokio::test]
    async fn sessions_are_created_lazily_and_keep_order() {
        let store = InMemoryConversationStore::new();
        assert_eq!(store.history("s1").await, None);

        {
            let mut guard = store.lock_session("s1").await;
            assert!(guard.turns().is_empty());
            guard.append([
                ConversationTurn::user_text("hi"),
                ConversationTurn::model_text("hello"),
            ]);
        }

        let history = store.history("s1").await.expect("session exists");
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].role, Role::User);
        assert_eq!(history[1].role, Role::Model);
        assert_eq!(store.session_count().await, 1);
    }

    #[tokio::test]
    async fn evict_removes_session() {
        let store = InMemoryConversationStore::new();
        store
            .lock_session("s1")
            .await
            .append([ConversationTurn::user_text("hi")]);

        assert!(store.evict("s1").await);
        assert!(!store.evict("s1").await);
        assert_eq!(store.history("s1").await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn same_session_access_is_serialized() {
        let store = Arc::new(InMemoryConversationStore::new());

        let first = {
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                let mut guard = store.lock_session("s1").await;
                let seen = guard.turns().len();
                tokio::time::sleep(Duration::from_millis(50)).await;
                guard.append([ConversationTurn::user_text("first")]);
                seen
            })
        };
        tokio::task::yield_now().await;

        let second = {
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                let mut guard = store.lock_session("s1").await;
                let seen = guard.turns().len();
                guard.append([ConversationTurn::user_text("second")]);
                seen
            })
        };

        assert_eq!(first.await.expect("first task"), 0);
        assert_eq!(second.await.expect("second task"), 1);

        let history = store.history("s1").await.expect("session exists");
        assert_eq!(
            history,
            vec![
                ConversationTurn::user_text("first"),
                ConversationTurn::user_text("second"),
            ]
        );
    }
}
