//! Conversation history
//!
//! Users own sessions, sessions own an ordered list of messages. Assistant
//! messages may carry the reasoning text that was streamed alongside them.

pub mod graph_store;
pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::graph::GraphError;

pub use graph_store::GraphChatStore;
pub use memory::MemoryChatStore;

/// Most sessions returned by one listing
pub const MAX_SESSIONS: usize = 100;

/// Most users returned by one listing
pub const MAX_USERS: usize = 1000;

#[derive(Error, Debug)]
pub enum HistoryError {
    #[error("Graph store error: {0}")]
    Store(#[from] GraphError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Malformed record: {0}")]
    MalformedRecord(String),
}

pub type HistoryResult<T> = Result<T, HistoryError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    /// Message type stored in the graph
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "human",
            Role::Assistant => "ai",
        }
    }

    pub fn from_stored(value: &str) -> Option<Self> {
        match value {
            "human" | "user" => Some(Role::User),
            "ai" | "assistant" => Some(Role::Assistant),
            _ => None,
        }
    }
}

/// One stored message. Only assistant messages carry a thought.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thought: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            thought: None,
            created_at: Utc::now(),
        }
    }

    pub fn assistant(content: impl Into<String>, thought: Option<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            thought: thought.filter(|t| !t.is_empty()),
            created_at: Utc::now(),
        }
    }
}

/// Session listing entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: String,
    /// Content of the newest message, if any
    pub last_message: Option<String>,
}

/// Persistent store of users, sessions and messages
#[async_trait]
pub trait ChatStore: Send + Sync {
    /// Append a user message, creating the session on first use
    async fn add_user_message(&self, session_id: &str, content: &str) -> HistoryResult<()>;

    /// Append an assistant message with its optional reasoning
    async fn add_ai_message(
        &self,
        session_id: &str,
        content: &str,
        thought: Option<&str>,
    ) -> HistoryResult<()>;

    /// Record that `user_id` owns `session_id`, creating either as needed
    async fn link_session_to_user(&self, session_id: &str, user_id: &str) -> HistoryResult<()>;

    /// Sessions of one user, or all sessions, newest activity first
    async fn list_sessions(&self, user_id: Option<&str>) -> HistoryResult<Vec<SessionSummary>>;

    async fn list_users(&self) -> HistoryResult<Vec<String>>;

    /// Messages of a session in chronological order
    async fn get_messages(&self, session_id: &str) -> HistoryResult<Vec<ChatMessage>>;

    /// Remove a session and its messages
    async fn delete_session(&self, session_id: &str) -> HistoryResult<()>;

    /// Remove a user with all of their sessions and messages
    async fn delete_user(&self, user_id: &str) -> HistoryResult<()>;
}

/// Reject blank identifiers before they reach a store
pub fn require_id<'a>(kind: &str, id: &'a str) -> HistoryResult<&'a str> {
    let trimmed = id.trim();
    if trimmed.is_empty() {
        return Err(HistoryError::InvalidInput(format!("{} must not be empty", kind)));
    }
    Ok(trimmed)
}
