//! Question answering pipeline
//!
//! One turn: record the question, gather history and context, stream the
//! model's answer through the think-tag splitter to the caller, then persist
//! the assistant message once the stream completes.

pub mod events;
pub mod service;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ConfigError;
use crate::embed::EmbedError;
use crate::graph::GraphError;
use crate::history::{ChatMessage, HistoryError, Role};
use crate::ingest::IngestError;
use crate::llm::LlmError;
use crate::retrieval::RetrievalError;

pub use events::{AskEvent, StreamPayload, EVENT_ERROR, EVENT_THINKING_END, EVENT_THINKING_START};
pub use service::{ChatService, ChatSettings, ServiceInfo};

#[derive(Error, Debug)]
pub enum ChatError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Graph store error: {0}")]
    Graph(#[from] GraphError),

    #[error("Embedding error: {0}")]
    Embed(#[from] EmbedError),

    #[error("Retrieval error: {0}")]
    Retrieval(#[from] RetrievalError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("History error: {0}")]
    History(#[from] HistoryError),

    #[error("No output from the model for {0}s")]
    IdleTimeout(u64),

    #[error("Answer not finished within {0}s")]
    AnswerTimeout(u64),

    #[error("Chat history is disabled")]
    HistoryDisabled,

    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error("Graph loading is not available")]
    IngestDisabled,
}

pub type ChatResult<T> = Result<T, ChatError>;

/// A prior turn supplied by the client instead of stored history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub role: String,
    pub content: String,
}

impl HistoryEntry {
    /// Entries with an unknown role are dropped
    pub fn to_message(&self) -> Option<ChatMessage> {
        match Role::from_stored(&self.role)? {
            Role::User => Some(ChatMessage::user(self.content.clone())),
            Role::Assistant => Some(ChatMessage::assistant(self.content.clone(), None)),
        }
    }
}

/// Body of `POST /stream-ask`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AskRequest {
    pub question: String,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub chat_history: Vec<HistoryEntry>,
}

impl AskRequest {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            ..Self::default()
        }
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Trim the question and drop blank identifiers
    pub fn validated(mut self) -> ChatResult<Self> {
        let question = self.question.trim();
        if question.is_empty() {
            return Err(ChatError::InvalidRequest("question must not be empty".to_string()));
        }
        self.question = question.to_string();
        self.session_id = self.session_id.map(|s| s.trim().to_string()).filter(|s| !s.is_empty());
        self.user_id = self.user_id.map(|s| s.trim().to_string()).filter(|s| !s.is_empty());
        Ok(self)
    }
}
