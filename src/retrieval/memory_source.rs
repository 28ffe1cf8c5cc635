//! In-process search source over an HNSW index
//!
//! Serves small corpora without a graph store: offline runs, demos and tests.
//! Scoring mirrors the graph source, the max of `(1 + cos) / 2` and a
//! keyword-overlap score.

use async_trait::async_trait;
use rustc_hash::FxHashMap;
use serde_json::{Map, Value};
use std::sync::Arc;

use super::keyword::{keyword_score, query_terms};
use super::{Candidate, Document, RetrievalError, RetrievalQuery, RetrievalResult, SearchParams, SearchSource};
use crate::embed::Embedder;
use crate::vector::{cosine_similarity, VectorIndex};

/// A document stored in a [`MemorySearchSource`]
#[derive(Debug, Clone)]
pub struct MemoryEntry {
    pub text: String,
    pub metadata: Map<String, Value>,
    pub embedding: Vec<f32>,
    pub anchor_communities: Vec<i64>,
    pub hit_communities: Vec<i64>,
}

impl MemoryEntry {
    pub fn new(text: impl Into<String>, metadata: Map<String, Value>, embedding: Vec<f32>) -> Self {
        Self {
            text: text.into(),
            metadata,
            embedding,
            anchor_communities: Vec::new(),
            hit_communities: Vec::new(),
        }
    }

    pub fn with_communities(mut self, anchor: Vec<i64>, hit: Vec<i64>) -> Self {
        self.anchor_communities = anchor;
        self.hit_communities = hit;
        self
    }
}

struct MemoryIndex {
    index: VectorIndex,
    entries: Vec<MemoryEntry>,
}

impl MemoryIndex {
    fn search(&self, query: &RetrievalQuery, fetch_k: usize) -> RetrievalResult<Vec<Candidate>> {
        if self.entries.is_empty() {
            return Ok(Vec::new());
        }
        let mut scores: FxHashMap<usize, f32> = FxHashMap::default();

        for (slot, _distance) in self.index.search(&query.embedding, fetch_k)? {
            let Some(entry) = self.entries.get(slot) else { continue };
            // Rescore exactly; HNSW distances are approximate
            let score = (1.0 + cosine_similarity(&query.embedding, &entry.embedding)) / 2.0;
            scores.insert(slot, score);
        }

        let terms = query_terms(&query.keyword_terms);
        for (slot, entry) in self.entries.iter().enumerate() {
            let score = keyword_score(&terms, &entry.text);
            if score > 0.0 {
                let best = scores.entry(slot).or_insert(0.0);
                *best = best.max(score);
            }
        }

        let mut ranked: Vec<(usize, f32)> = scores.into_iter().collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        ranked.truncate(fetch_k);

        Ok(ranked
            .into_iter()
            .filter_map(|(slot, score)| {
                let entry = self.entries.get(slot)?;
                let document = Document::new(entry.text.clone(), entry.metadata.clone(), score);
                Some(
                    Candidate::new(document)
                        .with_embedding(entry.embedding.clone())
                        .with_communities(
                            entry.anchor_communities.clone(),
                            entry.hit_communities.clone(),
                        ),
                )
            })
            .collect())
    }
}

/// Immutable in-memory collection of one node category
pub struct MemorySearchSource {
    label: String,
    inner: Arc<MemoryIndex>,
}

impl MemorySearchSource {
    /// Index `entries`, all of which must have `dimensions` components
    pub fn new(
        label: impl Into<String>,
        dimensions: usize,
        entries: Vec<MemoryEntry>,
    ) -> RetrievalResult<Self> {
        let mut index = VectorIndex::new(dimensions, entries.len());
        for (slot, entry) in entries.iter().enumerate() {
            index.add(slot, &entry.embedding)?;
        }
        Ok(Self {
            label: label.into(),
            inner: Arc::new(MemoryIndex { index, entries }),
        })
    }

    /// Embed `documents` with `embedder` and index them
    pub async fn from_documents(
        label: impl Into<String>,
        embedder: &dyn Embedder,
        documents: Vec<(String, Map<String, Value>)>,
    ) -> RetrievalResult<Self> {
        let texts: Vec<String> = documents.iter().map(|(text, _)| text.clone()).collect();
        let embeddings = embedder.embed_documents(&texts).await?;
        let dimensions = embeddings.first().map(Vec::len).unwrap_or(0);

        let entries = documents
            .into_iter()
            .zip(embeddings)
            .map(|((text, metadata), embedding)| MemoryEntry::new(text, metadata, embedding))
            .collect();
        Self::new(label, dimensions, entries)
    }

    pub fn len(&self) -> usize {
        self.inner.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.entries.is_empty()
    }
}

#[async_trait]
impl SearchSource for MemorySearchSource {
    fn name(&self) -> &str {
        &self.label
    }

    async fn search(
        &self,
        query: &RetrievalQuery,
        params: &SearchParams,
    ) -> RetrievalResult<Vec<Candidate>> {
        let inner = Arc::clone(&self.inner);
        let query = query.clone();
        let fetch_k = params.fetch_k;

        tokio::task::spawn_blocking(move || inner.search(&query, fetch_k))
            .await
            .map_err(|e| RetrievalError::Task(e.to_string()))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EmbeddingConfig, LlmProvider};
    use crate::embed::EmbeddingClient;
    use serde_json::json;

    fn meta(id: i64) -> Map<String, Value> {
        json!({ "id": id }).as_object().cloned().unwrap_or_default()
    }

    #[tokio::test]
    async fn test_vector_and_keyword_scores() {
        let source = MemorySearchSource::new(
            "Question",
            2,
            vec![
                MemoryEntry::new("flask routing", meta(1), vec![1.0, 0.0]),
                MemoryEntry::new("docker networks", meta(2), vec![0.0, 1.0]),
                MemoryEntry::new("opposite", meta(3), vec![-1.0, 0.0]),
            ],
        )
        .unwrap();

        let query = RetrievalQuery::new("routing", vec![1.0, 0.0]);
        let candidates = source.search(&query, &SearchParams::default()).await.unwrap();

        assert_eq!(candidates[0].document.metadata["id"], json!(1));
        assert!((candidates[0].score() - 1.0).abs() < 1e-5);
        let docker = candidates.iter().find(|c| c.document.metadata["id"] == json!(2)).unwrap();
        assert!((docker.score() - 0.5).abs() < 1e-5);
        let opposite = candidates.iter().find(|c| c.document.metadata["id"] == json!(3)).unwrap();
        assert!(opposite.score().abs() < 1e-5);
    }

    #[tokio::test]
    async fn test_fetch_k_caps_results() {
        let entries = (0..20)
            .map(|i| MemoryEntry::new(format!("doc {}", i), meta(i), vec![1.0, i as f32 / 20.0]))
            .collect();
        let source = MemorySearchSource::new("Tag", 2, entries).unwrap();
        let params = SearchParams { k: 2, fetch_k: 5, ..SearchParams::default() };

        let candidates = source
            .search(&RetrievalQuery::new("anything", vec![1.0, 0.0]), &params)
            .await
            .unwrap();
        assert_eq!(candidates.len(), 5);
        assert!(candidates.windows(2).all(|w| w[0].score() >= w[1].score()));
    }

    #[tokio::test]
    async fn test_wrong_query_dimension_fails() {
        let source =
            MemorySearchSource::new("Tag", 2, vec![MemoryEntry::new("a", meta(1), vec![1.0, 0.0])])
                .unwrap();
        let result = source
            .search(&RetrievalQuery::new("a", vec![1.0, 0.0, 0.0]), &SearchParams::default())
            .await;
        assert!(matches!(result, Err(RetrievalError::Vector(_))));
    }

    #[tokio::test]
    async fn test_from_documents_uses_embedder() {
        let embedder = EmbeddingClient::new(&EmbeddingConfig {
            provider: LlmProvider::Mock,
            dimensions: 32,
            ..EmbeddingConfig::default()
        })
        .unwrap();

        let source = MemorySearchSource::from_documents(
            "Answer",
            &embedder,
            vec![("first".to_string(), meta(1)), ("second".to_string(), meta(2))],
        )
        .await
        .unwrap();
        assert_eq!(source.len(), 2);
        assert_eq!(source.name(), "Answer");
    }
}
