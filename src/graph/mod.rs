//! Graph store access
//!
//! Retrieval and chat history both speak Cypher to an external property
//! graph. [`GraphClient`] is the seam; [`Neo4jHttpClient`] implements it over
//! the Neo4j HTTP transaction endpoint.

pub mod neo4j;

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

pub use neo4j::Neo4jHttpClient;

/// Graph store errors
#[derive(Error, Debug)]
pub enum GraphError {
    /// HTTP transport error
    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    /// The store rejected the statement
    #[error("Query error [{code}]: {message}")]
    QueryError { code: String, message: String },

    /// Response did not have the expected shape
    #[error("Protocol error: {0}")]
    ProtocolError(String),

    /// Bad connection settings
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

pub type GraphResult<T> = Result<T, GraphError>;

/// One result row, keyed by column name
pub type Row = Map<String, Value>;

/// Executes parameterised Cypher statements
#[async_trait]
pub trait GraphClient: Send + Sync {
    /// Run one statement in its own transaction and return all rows
    async fn run(&self, cypher: &str, params: Value) -> GraphResult<Vec<Row>>;
}
