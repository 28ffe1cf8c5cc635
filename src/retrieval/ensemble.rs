//! Ensemble retrieval across all configured sources

use futures::future::join_all;
use indexmap::map::Entry;
use indexmap::IndexMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::community::communities_compatible;
use super::mmr::maximal_marginal_relevance;
use super::{
    Candidate, Document, Reranker, RetrievalError, RetrievalQuery, RetrievalResult, SearchParams,
    SearchSource,
};
use crate::config::RetrievalConfig;
use crate::embed::Embedder;

/// Queries every source concurrently and merges the results.
///
/// Per source: drop candidates below the score threshold, keep the best
/// `fetch_k`, pick `k` with MMR and drop community mismatches. Across
/// sources: deduplicate by document identity (highest score wins), sort by
/// score and keep `top_n`, reranking first when a reranker is configured.
pub struct EnsembleRetriever {
    sources: Vec<Arc<dyn SearchSource>>,
    params: SearchParams,
    top_n: usize,
    community_filter: bool,
    reranker: Option<Arc<dyn Reranker>>,
    timeout: Duration,
}

impl EnsembleRetriever {
    pub fn new(sources: Vec<Arc<dyn SearchSource>>, params: SearchParams) -> Self {
        Self {
            sources,
            params,
            top_n: 10,
            community_filter: true,
            reranker: None,
            timeout: Duration::from_secs(30),
        }
    }

    /// Retriever with the search settings of `config`
    pub fn from_config(config: &RetrievalConfig, sources: Vec<Arc<dyn SearchSource>>) -> Self {
        Self::new(sources, config.search.clone())
            .with_top_n(config.top_n)
            .with_community_filter(config.community_filter)
            .with_timeout(Duration::from_secs(config.timeout_secs))
    }

    pub fn with_top_n(mut self, top_n: usize) -> Self {
        self.top_n = top_n;
        self
    }

    pub fn with_community_filter(mut self, enabled: bool) -> Self {
        self.community_filter = enabled;
        self
    }

    pub fn with_reranker(mut self, reranker: Arc<dyn Reranker>) -> Self {
        self.reranker = Some(reranker);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn params(&self) -> &SearchParams {
        &self.params
    }

    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    /// Embed `question` and retrieve context for it
    pub async fn retrieve_question(
        &self,
        embedder: &dyn Embedder,
        question: &str,
    ) -> RetrievalResult<Vec<Document>> {
        let embedding = embedder.embed_query(question).await?;
        self.retrieve(&RetrievalQuery::new(question, embedding)).await
    }

    /// Retrieve context for a prepared query within the configured deadline
    pub async fn retrieve(&self, query: &RetrievalQuery) -> RetrievalResult<Vec<Document>> {
        self.params.validate()?;

        let query = match &self.params.keyword_query {
            Some(keywords) => query.clone().with_keyword_query(keywords),
            None => query.clone(),
        };

        tokio::time::timeout(self.timeout, self.retrieve_all(&query))
            .await
            .map_err(|_| RetrievalError::Timeout(self.timeout.as_secs()))?
    }

    async fn retrieve_all(&self, query: &RetrievalQuery) -> RetrievalResult<Vec<Document>> {
        info!("Retrieving context from {} sources", self.sources.len());

        let per_source = join_all(
            self.sources
                .iter()
                .map(|source| self.search_source(source.as_ref(), query)),
        )
        .await;

        let mut merged: IndexMap<String, Candidate> = IndexMap::new();
        for candidate in per_source.into_iter().flatten() {
            match merged.entry(candidate.document.identity()) {
                Entry::Occupied(mut existing) => {
                    if candidate.score() > existing.get().score() {
                        existing.insert(candidate);
                    }
                }
                Entry::Vacant(slot) => {
                    slot.insert(candidate);
                }
            }
        }

        let mut kept: Vec<Candidate> = merged.into_values().collect();
        kept.sort_by(|a, b| b.score().total_cmp(&a.score()));

        let mut documents: Vec<Document> = kept.into_iter().map(|c| c.document).collect();
        debug!("{} documents after merge", documents.len());

        if let Some(reranker) = &self.reranker {
            if !documents.is_empty() {
                match reranker
                    .rerank(&query.raw_question, documents.clone(), self.top_n)
                    .await
                {
                    Ok(mut reranked) => {
                        reranked.sort_by(|a, b| b.score.total_cmp(&a.score));
                        reranked.truncate(self.top_n);
                        return Ok(reranked);
                    }
                    Err(e) => warn!("Reranker failed, keeping retrieval order: {}", e),
                }
            }
        }

        documents.truncate(self.top_n);
        Ok(documents)
    }

    /// Search one source, retrying once; a source that fails twice is skipped
    async fn search_source(&self, source: &dyn SearchSource, query: &RetrievalQuery) -> Vec<Candidate> {
        let candidates = match source.search(query, &self.params).await {
            Ok(candidates) => candidates,
            Err(first) => {
                warn!("Search on {} failed, retrying: {}", source.name(), first);
                match source.search(query, &self.params).await {
                    Ok(candidates) => candidates,
                    Err(e) => {
                        warn!("Skipping source {}: {}", source.name(), e);
                        return Vec::new();
                    }
                }
            }
        };

        let mut selected = select_candidates(candidates, &self.params);
        if self.community_filter {
            selected.retain(|c| communities_compatible(&c.anchor_communities, &c.hit_communities));
        }
        debug!("{} kept {} candidates", source.name(), selected.len());
        selected
    }
}

/// Threshold, cap at `fetch_k` and diversify down to `k`
pub fn select_candidates(mut candidates: Vec<Candidate>, params: &SearchParams) -> Vec<Candidate> {
    candidates.retain(|c| c.score() >= params.score_threshold);
    candidates.sort_by(|a, b| b.score().total_cmp(&a.score()));
    candidates.truncate(params.fetch_k);
    maximal_marginal_relevance(candidates, params.k, params.lambda_mult)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;

    fn candidate(text: &str, score: f32) -> Candidate {
        Candidate::new(Document::new(text, Map::new(), score))
    }

    #[test]
    fn test_select_applies_threshold_and_k() {
        let params = SearchParams {
            k: 2,
            fetch_k: 10,
            score_threshold: 0.5,
            lambda_mult: 1.0,
            keyword_query: None,
        };
        let selected = select_candidates(
            vec![
                candidate("low", 0.2),
                candidate("mid", 0.6),
                candidate("high", 0.9),
                candidate("edge", 0.5),
                candidate("nan", f32::NAN),
            ],
            &params,
        );
        let texts: Vec<_> = selected.iter().map(|c| c.document.text.as_str()).collect();
        assert_eq!(texts, vec!["high", "mid"]);
    }

    #[test]
    fn test_select_respects_fetch_k() {
        let params = SearchParams {
            k: 5,
            fetch_k: 5,
            score_threshold: 0.0,
            lambda_mult: 1.0,
            keyword_query: None,
        };
        let candidates = (0..8).map(|i| candidate(&format!("d{}", i), i as f32 / 10.0)).collect();
        let selected = select_candidates(candidates, &params);
        assert_eq!(selected.len(), 5);
        assert_eq!(selected[0].document.text, "d7");
        assert_eq!(selected[4].document.text, "d3");
    }
}
