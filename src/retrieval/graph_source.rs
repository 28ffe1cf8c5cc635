//! Search source backed by the graph store's vector and full-text indexes

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;

use super::community::parse_community_ids;
use super::queries::hybrid_search_query;
use super::{
    Candidate, Document, RetrievalError, RetrievalQuery, RetrievalResult, SearchParams,
    SearchSource,
};
use crate::config::SourceConfig;
use crate::graph::{GraphClient, Row};

/// One node category searched through its vector + full-text index pair
pub struct GraphSearchSource {
    client: Arc<dyn GraphClient>,
    source: SourceConfig,
    statement: String,
}

impl GraphSearchSource {
    pub fn new(client: Arc<dyn GraphClient>, source: SourceConfig, retrieval_query: &str) -> Self {
        Self {
            client,
            source,
            statement: hybrid_search_query(retrieval_query),
        }
    }

    pub fn source(&self) -> &SourceConfig {
        &self.source
    }
}

#[async_trait]
impl SearchSource for GraphSearchSource {
    fn name(&self) -> &str {
        &self.source.label
    }

    async fn search(
        &self,
        query: &RetrievalQuery,
        params: &SearchParams,
    ) -> RetrievalResult<Vec<Candidate>> {
        let parameters = json!({
            "index": self.source.index_name,
            "keyword_index": self.source.keyword_index_name,
            "k": params.fetch_k,
            "embedding": query.embedding,
            "keyword_query": query.keyword_terms,
        });

        let rows = self.client.run(&self.statement, parameters).await?;
        debug!("{} index returned {} rows", self.source.label, rows.len());

        let mut candidates = rows
            .into_iter()
            .map(candidate_from_row)
            .collect::<RetrievalResult<Vec<_>>>()?;
        candidates.truncate(params.fetch_k);
        Ok(candidates)
    }
}

fn candidate_from_row(mut row: Row) -> RetrievalResult<Candidate> {
    let text = match row.remove("text") {
        Some(Value::String(text)) => text,
        Some(Value::Null) | None => String::new(),
        // Some retrieval queries project a map as text
        Some(other) => other.to_string(),
    };

    let metadata = match row.remove("metadata") {
        Some(Value::Object(map)) => map,
        Some(Value::Null) | None => Default::default(),
        Some(other) => {
            return Err(RetrievalError::MalformedResult(format!(
                "metadata is not a map: {}",
                other
            )))
        }
    };

    let score = row
        .get("score")
        .and_then(Value::as_f64)
        .ok_or_else(|| RetrievalError::MalformedResult("row has no numeric score".to_string()))?
        as f32;

    let embedding = row.get("embedding").and_then(Value::as_array).map(|values| {
        values
            .iter()
            .filter_map(Value::as_f64)
            .map(|v| v as f32)
            .collect::<Vec<f32>>()
    });

    let mut candidate = Candidate::new(Document::new(text, metadata, score)).with_communities(
        parse_community_ids(row.get("anchor_communities")),
        parse_community_ids(row.get("hit_communities")),
    );
    if let Some(embedding) = embedding.filter(|e| !e.is_empty()) {
        candidate = candidate.with_embedding(embedding);
    }
    Ok(candidate)
}
