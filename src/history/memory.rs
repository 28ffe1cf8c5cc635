//! In-process chat store

use async_trait::async_trait;
use indexmap::{IndexMap, IndexSet};
use tokio::sync::RwLock;

use super::{
    require_id, ChatMessage, ChatStore, HistoryResult, SessionSummary, MAX_SESSIONS, MAX_USERS,
};

#[derive(Default)]
struct State {
    /// user -> owned sessions, in link order
    users: IndexMap<String, IndexSet<String>>,
    /// session -> messages, in creation order
    sessions: IndexMap<String, Vec<ChatMessage>>,
}

impl State {
    fn append(&mut self, session_id: &str, message: ChatMessage) {
        self.sessions
            .entry(session_id.to_string())
            .or_default()
            .push(message);
    }

    fn summary(&self, session_id: &str) -> SessionSummary {
        SessionSummary {
            session_id: session_id.to_string(),
            last_message: self
                .sessions
                .get(session_id)
                .and_then(|m| m.last())
                .map(|m| m.content.clone()),
        }
    }

    fn last_activity(&self, session_id: &str) -> Option<chrono::DateTime<chrono::Utc>> {
        self.sessions
            .get(session_id)
            .and_then(|m| m.last())
            .map(|m| m.created_at)
    }
}

/// Chat store kept in memory; used when no graph store is configured
#[derive(Default)]
pub struct MemoryChatStore {
    state: RwLock<State>,
}

impl MemoryChatStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ChatStore for MemoryChatStore {
    async fn add_user_message(&self, session_id: &str, content: &str) -> HistoryResult<()> {
        let session_id = require_id("session_id", session_id)?;
        self.state
            .write()
            .await
            .append(session_id, ChatMessage::user(content));
        Ok(())
    }

    async fn add_ai_message(
        &self,
        session_id: &str,
        content: &str,
        thought: Option<&str>,
    ) -> HistoryResult<()> {
        let session_id = require_id("session_id", session_id)?;
        let message = ChatMessage::assistant(content, thought.map(str::to_string));
        self.state.write().await.append(session_id, message);
        Ok(())
    }

    async fn link_session_to_user(&self, session_id: &str, user_id: &str) -> HistoryResult<()> {
        let session_id = require_id("session_id", session_id)?;
        let user_id = require_id("user_id", user_id)?;

        let mut state = self.state.write().await;
        state.sessions.entry(session_id.to_string()).or_default();
        state
            .users
            .entry(user_id.to_string())
            .or_default()
            .insert(session_id.to_string());
        Ok(())
    }

    async fn list_sessions(&self, user_id: Option<&str>) -> HistoryResult<Vec<SessionSummary>> {
        let state = self.state.read().await;

        let mut ids: Vec<&String> = match user_id {
            Some(user_id) => match state.users.get(user_id) {
                Some(sessions) => sessions.iter().collect(),
                None => return Ok(Vec::new()),
            },
            None => state.sessions.keys().collect(),
        };

        // Newest activity first; sessions without messages last
        ids.sort_by(|a, b| state.last_activity(b).cmp(&state.last_activity(a)));

        Ok(ids
            .into_iter()
            .take(MAX_SESSIONS)
            .map(|id| state.summary(id))
            .collect())
    }

    async fn list_users(&self) -> HistoryResult<Vec<String>> {
        let state = self.state.read().await;
        Ok(state.users.keys().take(MAX_USERS).cloned().collect())
    }

    async fn get_messages(&self, session_id: &str) -> HistoryResult<Vec<ChatMessage>> {
        let session_id = require_id("session_id", session_id)?;
        let state = self.state.read().await;
        Ok(state.sessions.get(session_id).cloned().unwrap_or_default())
    }

    async fn delete_session(&self, session_id: &str) -> HistoryResult<()> {
        let session_id = require_id("session_id", session_id)?;
        let mut state = self.state.write().await;
        state.sessions.shift_remove(session_id);
        for sessions in state.users.values_mut() {
            sessions.shift_remove(session_id);
        }
        Ok(())
    }

    async fn delete_user(&self, user_id: &str) -> HistoryResult<()> {
        let user_id = require_id("user_id", user_id)?;
        let mut state = self.state.write().await;

        let Some(owned) = state.users.shift_remove(user_id) else {
            return Ok(());
        };
        for session_id in &owned {
            state.sessions.shift_remove(session_id);
            for sessions in state.users.values_mut() {
                sessions.shift_remove(session_id);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::Role;

    #[tokio::test]
    async fn test_messages_in_order_with_thought() {
        let store = MemoryChatStore::new();
        store.add_user_message("s1", "What is Flask?").await.unwrap();
        store
            .add_ai_message("s1", "A micro framework.", Some("recall docs"))
            .await
            .unwrap();

        let messages = store.get_messages("s1").await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::User);
        assert_eq!(messages[1].role, Role::Assistant);
        assert_eq!(messages[1].thought.as_deref(), Some("recall docs"));
        assert!(messages[0].created_at <= messages[1].created_at);
    }

    #[tokio::test]
    async fn test_sessions_per_user() {
        let store = MemoryChatStore::new();
        store.link_session_to_user("s1", "alice").await.unwrap();
        store.link_session_to_user("s2", "alice").await.unwrap();
        store.link_session_to_user("s3", "bob").await.unwrap();
        store.add_user_message("s2", "latest").await.unwrap();

        let alice = store.list_sessions(Some("alice")).await.unwrap();
        assert_eq!(alice.len(), 2);
        assert_eq!(alice[0].session_id, "s2");
        assert_eq!(alice[0].last_message.as_deref(), Some("latest"));
        assert_eq!(alice[1].last_message, None);

        assert_eq!(store.list_sessions(None).await.unwrap().len(), 3);
        assert!(store.list_sessions(Some("nobody")).await.unwrap().is_empty());
        assert_eq!(store.list_users().await.unwrap(), vec!["alice", "bob"]);
    }

    #[tokio::test]
    async fn test_delete_user_cascades() {
        let store = MemoryChatStore::new();
        store.link_session_to_user("s1", "alice").await.unwrap();
        store.add_user_message("s1", "hi").await.unwrap();
        store.link_session_to_user("s2", "bob").await.unwrap();

        store.delete_user("alice").await.unwrap();
        assert!(store.get_messages("s1").await.unwrap().is_empty());
        assert_eq!(store.list_users().await.unwrap(), vec!["bob"]);
        assert_eq!(store.list_sessions(None).await.unwrap().len(), 1);

        // Deleting again is a no-op
        store.delete_user("alice").await.unwrap();
    }

    #[tokio::test]
    async fn test_delete_session_unlinks() {
        let store = MemoryChatStore::new();
        store.link_session_to_user("s1", "alice").await.unwrap();
        store.add_user_message("s1", "hi").await.unwrap();

        store.delete_session("s1").await.unwrap();
        assert!(store.get_messages("s1").await.unwrap().is_empty());
        assert!(store.list_sessions(Some("alice")).await.unwrap().is_empty());
        assert_eq!(store.list_users().await.unwrap(), vec!["alice"]);
    }

    #[tokio::test]
    async fn test_blank_ids_rejected() {
        let store = MemoryChatStore::new();
        assert!(store.add_user_message(" ", "x").await.is_err());
        assert!(store.delete_user("").await.is_err());
    }
}
