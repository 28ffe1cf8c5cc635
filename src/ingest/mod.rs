//! Knowledge graph preparation
//!
//! The retriever expects every source label to carry an `embedding` vector
//! index and a `text` full-text index. This module creates them, embeds nodes
//! that have no vector yet, and loads StackOverflow questions into the graph
//! through the StackExchange API, keeping an `ImportLog` of every run.

pub mod catalog;
pub mod import;
pub mod schema;
pub mod stackexchange;

use std::sync::Arc;
use thiserror::Error;
use tracing::warn;

use crate::config::{IngestConfig, RetrievalConfig};
use crate::embed::{EmbedError, Embedder};
use crate::graph::{GraphClient, GraphError};

pub use catalog::{DatabaseSummary, ImportLogEntry};
pub use import::{ImportReport, ImportRequest, Importer, PageOutcome, PageStatus};
pub use schema::{ensure_schema, SchemaReport};
pub use stackexchange::StackExchangeClient;

/// Ingestion errors
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Invalid import request: {0}")]
    InvalidRequest(String),

    #[error("Graph store error: {0}")]
    Graph(#[from] GraphError),

    #[error("Embedding error: {0}")]
    Embed(#[from] EmbedError),

    /// StackExchange transport or HTTP status failure
    #[error("StackExchange request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// StackExchange answered with an error payload
    #[error("StackExchange API error {name}: {message}")]
    Api { name: String, message: String },

    #[error("Unexpected response: {0}")]
    Malformed(String),
}

pub type IngestResult<T> = Result<T, IngestError>;

/// Schema bootstrap, import and import catalog over one graph
pub struct Ingestion {
    graph: Arc<dyn GraphClient>,
    embedder: Arc<dyn Embedder>,
    retrieval: RetrievalConfig,
    backfill_batch: usize,
    importer: Importer,
}

impl Ingestion {
    pub fn new(
        graph: Arc<dyn GraphClient>,
        embedder: Arc<dyn Embedder>,
        retrieval: RetrievalConfig,
        config: &IngestConfig,
    ) -> IngestResult<Self> {
        let importer = Importer::new(
            graph.clone(),
            embedder.clone(),
            StackExchangeClient::new(config)?,
            config.concurrency,
        );
        Ok(Self {
            graph,
            embedder,
            retrieval,
            backfill_batch: config.backfill_batch.max(1),
            importer,
        })
    }

    pub async fn ensure_schema(&self) -> IngestResult<SchemaReport> {
        ensure_schema(
            self.graph.as_ref(),
            self.embedder.as_ref(),
            &self.retrieval,
            self.backfill_batch,
        )
        .await
    }

    pub async fn summary(&self) -> IngestResult<DatabaseSummary> {
        catalog::database_summary(self.graph.as_ref()).await
    }

    pub async fn import_history(&self, limit: usize) -> IngestResult<Vec<ImportLogEntry>> {
        catalog::import_history(self.graph.as_ref(), limit).await
    }

    /// Load the requested pages, then embed the tags and users they created
    pub async fn import(&self, request: &ImportRequest) -> IngestResult<ImportReport> {
        let report = self.importer.run(request).await?;
        for source in &self.retrieval.sources {
            let backfill = schema::backfill_embeddings(
                self.graph.as_ref(),
                self.embedder.as_ref(),
                source,
                self.backfill_batch,
            );
            if let Err(e) = backfill.await {
                warn!("Embedding new {} nodes failed: {}", source.label, e);
            }
        }
        Ok(report)
    }
}

/// Wrap a label, index or property name for safe use in Cypher text
pub(crate) fn quote_identifier(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_identifier() {
        assert_eq!(quote_identifier("Question_index"), "`Question_index`");
        assert_eq!(quote_identifier("odd`name"), "`odd``name`");
    }
}
