//! Streaming chat completions
//!
//! [`LlmClient`] is the seam between the chat pipeline and a model provider.
//! Providers yield [`LlmChunk`]s: raw content (which may carry inline
//! `<think>` tags) and, for models that report it separately, reasoning text.

pub mod client;
pub mod ndjson;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use client::ChatModelClient;

#[derive(Error, Debug)]
pub enum LlmError {
    #[error("LLM API error: {0}")]
    ApiError(String),
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("Network error: {0}")]
    NetworkError(String),
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

pub type LlmResult<T> = Result<T, LlmError>;

/// Speaker of a prompt message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptRole {
    System,
    User,
    Assistant,
}

/// One message sent to the model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptMessage {
    pub role: PromptRole,
    pub content: String,
}

impl PromptMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: PromptRole::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: PromptRole::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: PromptRole::Assistant, content: content.into() }
    }
}

/// One streamed increment of model output
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LlmChunk {
    pub content: String,
    /// Reasoning reported out of band (e.g. Ollama `thinking`)
    pub reasoning: String,
}

impl LlmChunk {
    pub fn content(text: impl Into<String>) -> Self {
        Self { content: text.into(), reasoning: String::new() }
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty() && self.reasoning.is_empty()
    }
}

pub type LlmStream = BoxStream<'static, LlmResult<LlmChunk>>;

/// A streaming chat model.
///
/// Dropping the returned stream releases the upstream connection.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Model name reported by `/api/v1/config`
    fn model(&self) -> &str;

    /// Start a completion for `messages`
    async fn stream_chat(&self, messages: &[PromptMessage]) -> LlmResult<LlmStream>;
}
