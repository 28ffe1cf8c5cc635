//! Error types for the GraphRAG SDK

use thiserror::Error;

/// Errors that can occur when using the GraphRAG SDK
#[derive(Error, Debug)]
pub enum SdkError {
    /// The server answered with a non-success status
    #[error("API error ({status}): {message}")]
    ApiError { status: u16, message: String },

    /// The answer stream ended with an error event
    #[error("Answer failed: {0}")]
    AnswerError(String),

    /// Malformed Server-Sent Events stream
    #[error("Stream error: {0}")]
    StreamError(String),

    /// Pipeline error (embedded mode)
    #[error("Chat error: {0}")]
    ChatError(#[from] graphrag_chat::ChatError),

    /// History store error (embedded mode)
    #[error("History error: {0}")]
    HistoryError(#[from] graphrag_chat::history::HistoryError),

    /// Schema or import error (embedded mode)
    #[error("Ingest error: {0}")]
    IngestError(#[from] graphrag_chat::ingest::IngestError),

    /// HTTP transport error
    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

pub type SdkResult<T> = Result<T, SdkError>;
