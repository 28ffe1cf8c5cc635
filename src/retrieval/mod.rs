//! Multi-source retrieval
//!
//! Each [`SearchSource`] returns scored candidates for one node category. The
//! [`EnsembleRetriever`] thresholds and diversifies them per source, merges the
//! lists, filters community mismatches and optionally reranks the result.

pub mod community;
pub mod ensemble;
pub mod graph_source;
pub mod keyword;
pub mod memory_source;
pub mod mmr;
pub mod queries;
pub mod rerank;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::embed::EmbedError;
use crate::graph::GraphError;
use crate::vector::VectorError;

pub use ensemble::EnsembleRetriever;
pub use graph_source::GraphSearchSource;
pub use memory_source::{MemoryEntry, MemorySearchSource};
pub use rerank::{HttpReranker, Reranker};

/// Retrieval errors
#[derive(Error, Debug)]
pub enum RetrievalError {
    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbedError),

    #[error("Graph store error: {0}")]
    Graph(#[from] GraphError),

    #[error("Vector index error: {0}")]
    Vector(#[from] VectorError),

    #[error("Reranker error: {0}")]
    Rerank(String),

    #[error("Invalid search parameters: {0}")]
    InvalidParams(String),

    #[error("Malformed search result: {0}")]
    MalformedResult(String),

    #[error("Retrieval timed out after {0}s")]
    Timeout(u64),

    #[error("Search task failed: {0}")]
    Task(String),
}

pub type RetrievalResult<T> = Result<T, RetrievalError>;

/// A retrieved piece of context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub text: String,
    pub metadata: Map<String, Value>,
    pub score: f32,
}

impl Document {
    pub fn new(text: impl Into<String>, metadata: Map<String, Value>, score: f32) -> Self {
        Self {
            text: text.into(),
            metadata,
            score,
        }
    }

    /// Stable identity used for deduplication.
    ///
    /// The metadata `id` when present, otherwise a SHA-256 of the text.
    pub fn identity(&self) -> String {
        match self.metadata.get("id") {
            Some(Value::String(id)) => format!("id:{}", id),
            Some(Value::Number(id)) => format!("id:{}", id),
            _ => {
                let digest = Sha256::digest(self.text.as_bytes());
                let hex: String = digest.iter().map(|b| format!("{:02x}", b)).collect();
                format!("sha256:{}", hex)
            }
        }
    }
}

/// One question prepared for searching
#[derive(Debug, Clone)]
pub struct RetrievalQuery {
    pub raw_question: String,
    pub embedding: Vec<f32>,
    /// Lucene-escaped full-text query
    pub keyword_terms: String,
}

impl RetrievalQuery {
    pub fn new(question: impl Into<String>, embedding: Vec<f32>) -> Self {
        let raw_question = question.into();
        let keyword_terms = keyword::escape_lucene(&raw_question);
        Self {
            raw_question,
            embedding,
            keyword_terms,
        }
    }

    /// Replace the full-text query (escaped like the question)
    pub fn with_keyword_query(mut self, keyword_query: &str) -> Self {
        self.keyword_terms = keyword::escape_lucene(keyword_query);
        self
    }
}

/// Per-source search parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchParams {
    /// Documents kept per source after MMR
    pub k: usize,
    /// Candidates considered per source before MMR
    pub fetch_k: usize,
    /// Minimum relevance score in [0, 1]
    pub score_threshold: f32,
    /// MMR trade-off: 1.0 is pure relevance, 0.0 pure diversity
    pub lambda_mult: f32,
    /// Overrides the question as full-text query
    pub keyword_query: Option<String>,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            k: 10,
            fetch_k: 100,
            score_threshold: 0.85,
            lambda_mult: 0.5,
            keyword_query: None,
        }
    }
}

impl SearchParams {
    pub fn validate(&self) -> RetrievalResult<()> {
        if self.k == 0 {
            return Err(RetrievalError::InvalidParams("k must be at least 1".to_string()));
        }
        if self.fetch_k < self.k {
            return Err(RetrievalError::InvalidParams(format!(
                "fetch_k ({}) must not be smaller than k ({})",
                self.fetch_k, self.k
            )));
        }
        if !(0.0..=1.0).contains(&self.score_threshold) {
            return Err(RetrievalError::InvalidParams(format!(
                "score_threshold {} is outside [0, 1]",
                self.score_threshold
            )));
        }
        if !(0.0..=1.0).contains(&self.lambda_mult) {
            return Err(RetrievalError::InvalidParams(format!(
                "lambda_mult {} is outside [0, 1]",
                self.lambda_mult
            )));
        }
        if matches!(&self.keyword_query, Some(q) if q.trim().is_empty()) {
            return Err(RetrievalError::InvalidParams("keyword_query must not be blank".to_string()));
        }
        Ok(())
    }
}

/// A scored hit from one source, before selection
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub document: Document,
    /// Embedding of the hit, used for MMR diversity
    pub embedding: Option<Vec<f32>>,
    /// Communities of the entity the hit was routed from
    pub anchor_communities: Vec<i64>,
    /// Communities of the hit itself
    pub hit_communities: Vec<i64>,
}

impl Candidate {
    pub fn new(document: Document) -> Self {
        Self {
            document,
            embedding: None,
            anchor_communities: Vec::new(),
            hit_communities: Vec::new(),
        }
    }

    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    pub fn with_communities(mut self, anchor: Vec<i64>, hit: Vec<i64>) -> Self {
        self.anchor_communities = anchor;
        self.hit_communities = hit;
        self
    }

    pub fn score(&self) -> f32 {
        self.document.score
    }
}

/// A searchable collection of one node category
#[async_trait]
pub trait SearchSource: Send + Sync {
    /// Label used in logs
    fn name(&self) -> &str;

    /// Hybrid (vector + full-text) search returning at most `params.fetch_k`
    /// candidates, best first
    async fn search(
        &self,
        query: &RetrievalQuery,
        params: &SearchParams,
    ) -> RetrievalResult<Vec<Candidate>>;
}
