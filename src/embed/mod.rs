//! Question and document embeddings
//!
//! [`EmbeddingClient`] talks to the configured provider; [`CachedEmbedder`]
//! memoises repeated questions in front of any [`Embedder`].

pub mod cache;
pub mod client;

use async_trait::async_trait;
use thiserror::Error;

pub use cache::CachedEmbedder;
pub use client::EmbeddingClient;

/// Embed errors
#[derive(Error, Debug)]
pub enum EmbedError {
    /// API error from the embedding provider
    #[error("Embedding API error: {0}")]
    ApiError(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Network error
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Serialization/Deserialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

pub type EmbedResult<T> = Result<T, EmbedError>;

/// Anything that turns text into vectors
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a batch of texts, one vector per input in order
    async fn embed_documents(&self, texts: &[String]) -> EmbedResult<Vec<Vec<f32>>>;

    /// Embed a single question
    async fn embed_query(&self, text: &str) -> EmbedResult<Vec<f32>> {
        let mut vectors = self.embed_documents(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| EmbedError::ApiError("provider returned no embedding".to_string()))
    }
}
