use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use graphrag_chat::config::{EmbeddingConfig, LlmProvider};
use graphrag_chat::embed::EmbeddingClient;
use graphrag_chat::retrieval::{
    Candidate, Document, EnsembleRetriever, GraphSearchSource, MemoryEntry, MemorySearchSource,
    Reranker, RetrievalError, RetrievalQuery, RetrievalResult, SearchParams, SearchSource,
};

fn meta(id: i64) -> Map<String, Value> {
    json!({ "id": id }).as_object().cloned().unwrap()
}

fn mock_embedder() -> EmbeddingClient {
    EmbeddingClient::new(&EmbeddingConfig {
        provider: LlmProvider::Mock,
        dimensions: 384,
        ..EmbeddingConfig::default()
    })
    .unwrap()
}

fn params(k: usize, score_threshold: f32) -> SearchParams {
    SearchParams {
        k,
        fetch_k: 100,
        score_threshold,
        lambda_mult: 0.5,
        keyword_query: None,
    }
}

/// Returns a fixed candidate list
struct StaticSource {
    name: String,
    candidates: Vec<Candidate>,
}

impl StaticSource {
    fn new(name: &str, candidates: Vec<Candidate>) -> Arc<dyn SearchSource> {
        Arc::new(Self { name: name.to_string(), candidates })
    }
}

#[async_trait]
impl SearchSource for StaticSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn search(&self, _: &RetrievalQuery, params: &SearchParams) -> RetrievalResult<Vec<Candidate>> {
        Ok(self.candidates.iter().take(params.fetch_k).cloned().collect())
    }
}

/// Fails every call and counts attempts
struct FailingSource {
    calls: AtomicUsize,
}

#[async_trait]
impl SearchSource for FailingSource {
    fn name(&self) -> &str {
        "Broken"
    }

    async fn search(&self, _: &RetrievalQuery, _: &SearchParams) -> RetrievalResult<Vec<Candidate>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(RetrievalError::MalformedResult("store unavailable".to_string()))
    }
}

struct SlowSource;

#[async_trait]
impl SearchSource for SlowSource {
    fn name(&self) -> &str {
        "Slow"
    }

    async fn search(&self, _: &RetrievalQuery, _: &SearchParams) -> RetrievalResult<Vec<Candidate>> {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok(Vec::new())
    }
}

fn candidate(id: i64, score: f32) -> Candidate {
    Candidate::new(Document::new(format!("doc {}", id), meta(id), score))
}

fn ids(documents: &[Document]) -> Vec<i64> {
    documents.iter().map(|d| d.metadata["id"].as_i64().unwrap()).collect()
}

fn query() -> RetrievalQuery {
    RetrievalQuery::new("anything", vec![1.0, 0.0])
}

#[tokio::test]
async fn test_flask_question_ignores_docker_document() {
    let embedder = mock_embedder();
    let source = MemorySearchSource::from_documents(
        "Question",
        &embedder,
        vec![
            ("What is Flask? Flask is a lightweight Python web framework.".to_string(), meta(1)),
            ("Docker networking: bridge and overlay drivers".to_string(), meta(2)),
        ],
    )
    .await
    .unwrap();

    let retriever = EnsembleRetriever::new(vec![Arc::new(source)], params(10, 0.7));
    let documents = retriever.retrieve_question(&embedder, "What is Flask?").await.unwrap();

    assert_eq!(ids(&documents), vec![1]);
    assert!(documents[0].score >= 0.7);
}

#[tokio::test]
async fn test_every_document_meets_threshold() {
    let candidates: Vec<Candidate> = (0..20).map(|i| candidate(i, i as f32 / 20.0)).collect();
    for threshold in [0.0, 0.25, 0.5, 0.85, 0.95, 1.0] {
        let retriever = EnsembleRetriever::new(
            vec![StaticSource::new("Tag", candidates.clone())],
            params(20, threshold),
        )
        .with_top_n(20);

        let documents = retriever.retrieve(&query()).await.unwrap();
        assert!(documents.iter().all(|d| d.score >= threshold), "threshold {}", threshold);
    }
}

#[tokio::test]
async fn test_result_counts_respect_k_and_top_n() {
    let a: Vec<Candidate> = (0..10).map(|i| candidate(i, 0.9)).collect();
    let b: Vec<Candidate> = (100..110).map(|i| candidate(i, 0.9)).collect();
    let sources = || vec![StaticSource::new("A", a.clone()), StaticSource::new("B", b.clone())];

    let unlimited = EnsembleRetriever::new(sources(), params(3, 0.5)).with_top_n(100);
    let documents = unlimited.retrieve(&query()).await.unwrap();
    assert_eq!(documents.len(), 6);
    assert_eq!(documents.iter().filter(|d| d.metadata["id"].as_i64() < Some(100)).count(), 3);

    let capped = EnsembleRetriever::new(sources(), params(3, 0.5)).with_top_n(4);
    assert_eq!(capped.retrieve(&query()).await.unwrap().len(), 4);
}

#[tokio::test]
async fn test_duplicates_merge_to_highest_score() {
    let retriever = EnsembleRetriever::new(
        vec![
            StaticSource::new("Question", vec![candidate(1, 0.9), candidate(2, 0.8)]),
            StaticSource::new("Tag", vec![candidate(1, 0.95), candidate(3, 0.7)]),
        ],
        params(10, 0.5),
    );

    let documents = retriever.retrieve(&query()).await.unwrap();
    assert_eq!(ids(&documents), vec![1, 2, 3]);
    assert_eq!(documents[0].score, 0.95);
}

#[tokio::test]
async fn test_retrieval_is_deterministic() {
    let embedder = mock_embedder();
    let corpus: Vec<(String, Map<String, Value>)> = [
        "Flask application factory pattern",
        "Running Flask behind gunicorn",
        "Flask blueprints and routing",
        "Docker compose for Python services",
        "Neo4j vector index configuration",
    ]
    .iter()
    .enumerate()
    .map(|(i, text)| (text.to_string(), meta(i as i64)))
    .collect();

    let source = MemorySearchSource::from_documents("Question", &embedder, corpus).await.unwrap();
    let retriever = EnsembleRetriever::new(vec![Arc::new(source)], params(3, 0.5));

    let first = retriever.retrieve_question(&embedder, "How do I structure a Flask app?").await.unwrap();
    let second = retriever.retrieve_question(&embedder, "How do I structure a Flask app?").await.unwrap();
    assert_eq!(first, second);
    assert!(!first.is_empty());
}

#[tokio::test]
async fn test_failing_source_is_retried_then_skipped() {
    let broken = Arc::new(FailingSource { calls: AtomicUsize::new(0) });
    let retriever = EnsembleRetriever::new(
        vec![broken.clone() as Arc<dyn SearchSource>, StaticSource::new("Question", vec![candidate(1, 0.9)])],
        params(10, 0.5),
    );

    let documents = retriever.retrieve(&query()).await.unwrap();
    assert_eq!(ids(&documents), vec![1]);
    assert_eq!(broken.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_community_filter() {
    let candidates = vec![
        candidate(1, 0.9).with_communities(vec![4], vec![4, 5]),
        candidate(2, 0.9).with_communities(vec![4], vec![7]),
        candidate(3, 0.9).with_communities(vec![], vec![7]),
        candidate(4, 0.9),
    ];

    let filtered = EnsembleRetriever::new(
        vec![StaticSource::new("Tag", candidates.clone())],
        params(10, 0.5),
    );
    let mut kept = ids(&filtered.retrieve(&query()).await.unwrap());
    kept.sort();
    assert_eq!(kept, vec![1, 4]);

    let unfiltered = EnsembleRetriever::new(vec![StaticSource::new("Tag", candidates)], params(10, 0.5))
        .with_community_filter(false);
    assert_eq!(unfiltered.retrieve(&query()).await.unwrap().len(), 4);
}

#[tokio::test]
async fn test_community_filter_applies_per_source_before_merge() {
    // The best-scoring copy comes from a mismatched pairing
    let tag = StaticSource::new("Tag", vec![candidate(1, 0.95).with_communities(vec![9], vec![4])]);
    let answer = StaticSource::new("Answer", vec![candidate(1, 0.90).with_communities(vec![4], vec![4])]);
    let retriever = EnsembleRetriever::new(vec![tag, answer], params(10, 0.5));

    let documents = retriever.retrieve(&query()).await.unwrap();
    assert_eq!(ids(&documents), vec![1]);
    assert_eq!(documents[0].score, 0.90);
}

/// Reverses the incoming order and scores by the new position
struct ReversingReranker;

#[async_trait]
impl Reranker for ReversingReranker {
    async fn rerank(&self, _: &str, documents: Vec<Document>, top_n: usize) -> RetrievalResult<Vec<Document>> {
        Ok(documents
            .into_iter()
            .rev()
            .enumerate()
            .map(|(i, mut d)| {
                d.score = 1.0 - i as f32 * 0.1;
                d
            })
            .take(top_n)
            .collect())
    }
}

/// Ignores `top_n` and returns its input unchanged
struct PassthroughReranker;

#[async_trait]
impl Reranker for PassthroughReranker {
    async fn rerank(&self, _: &str, documents: Vec<Document>, _: usize) -> RetrievalResult<Vec<Document>> {
        Ok(documents)
    }
}

/// Returns documents in ascending score order
struct AscendingReranker;

#[async_trait]
impl Reranker for AscendingReranker {
    async fn rerank(&self, _: &str, mut documents: Vec<Document>, _: usize) -> RetrievalResult<Vec<Document>> {
        documents.sort_by(|a, b| a.score.total_cmp(&b.score));
        Ok(documents)
    }
}

struct BrokenReranker;

#[async_trait]
impl Reranker for BrokenReranker {
    async fn rerank(&self, _: &str, _: Vec<Document>, _: usize) -> RetrievalResult<Vec<Document>> {
        Err(RetrievalError::Rerank("connection refused".to_string()))
    }
}

#[tokio::test]
async fn test_reranker_orders_and_caps() {
    let source = || StaticSource::new("Tag", vec![candidate(1, 0.9), candidate(2, 0.8), candidate(3, 0.7)]);

    let reranked = EnsembleRetriever::new(vec![source()], params(10, 0.5))
        .with_top_n(2)
        .with_reranker(Arc::new(ReversingReranker));
    assert_eq!(ids(&reranked.retrieve(&query()).await.unwrap()), vec![3, 2]);

    let fallback = EnsembleRetriever::new(vec![source()], params(10, 0.5))
        .with_top_n(2)
        .with_reranker(Arc::new(BrokenReranker));
    assert_eq!(ids(&fallback.retrieve(&query()).await.unwrap()), vec![1, 2]);
}

#[tokio::test]
async fn test_reranked_output_is_capped_and_sorted() {
    let source = || StaticSource::new("Tag", vec![candidate(1, 0.9), candidate(2, 0.8), candidate(3, 0.7)]);

    let capped = EnsembleRetriever::new(vec![source()], params(10, 0.5))
        .with_top_n(1)
        .with_reranker(Arc::new(PassthroughReranker));
    assert_eq!(ids(&capped.retrieve(&query()).await.unwrap()), vec![1]);

    let sorted = EnsembleRetriever::new(vec![source()], params(10, 0.5))
        .with_top_n(3)
        .with_reranker(Arc::new(AscendingReranker));
    assert_eq!(ids(&sorted.retrieve(&query()).await.unwrap()), vec![1, 2, 3]);
}

#[tokio::test]
async fn test_slow_sources_time_out() {
    let retriever = EnsembleRetriever::new(vec![Arc::new(SlowSource)], params(10, 0.5))
        .with_timeout(Duration::from_millis(50));
    let result = retriever.retrieve(&query()).await;
    assert!(matches!(result, Err(RetrievalError::Timeout(_))));
}

#[tokio::test]
async fn test_invalid_params_are_rejected() {
    let retriever = EnsembleRetriever::new(
        vec![StaticSource::new("Tag", vec![candidate(1, 0.9)])],
        SearchParams { k: 10, fetch_k: 5, ..SearchParams::default() },
    );
    assert!(matches!(retriever.retrieve(&query()).await, Err(RetrievalError::InvalidParams(_))));
}

#[tokio::test]
async fn test_mmr_prefers_diverse_documents() {
    let same = vec![1.0, 0.0, 0.0];
    let entries = vec![
        MemoryEntry::new("flask routing basics", meta(1), same.clone()),
        MemoryEntry::new("flask routing again", meta(2), same.clone()),
        MemoryEntry::new("flask templates", meta(3), vec![0.8, 0.6, 0.0]),
    ];
    let source = MemorySearchSource::new("Question", 3, entries).unwrap();
    let retriever = EnsembleRetriever::new(
        vec![Arc::new(source)],
        SearchParams { lambda_mult: 0.3, ..params(2, 0.0) },
    );

    let documents = retriever.retrieve(&RetrievalQuery::new("zzz", same)).await.unwrap();
    let mut picked = ids(&documents);
    picked.sort();
    assert_eq!(picked, vec![1, 3]);
}

// Only checks construction; searching needs a running graph store
#[test]
fn test_graph_source_is_a_search_source() {
    use graphrag_chat::config::{GraphConfig, SourceConfig};
    use graphrag_chat::graph::{GraphClient, Neo4jHttpClient};

    let client: Arc<dyn GraphClient> = Arc::new(Neo4jHttpClient::new(&GraphConfig::default()).unwrap());
    let source: Arc<dyn SearchSource> =
        Arc::new(GraphSearchSource::new(client, SourceConfig::for_label("Answer"), "RETURN 1"));
    assert_eq!(source.name(), "Answer");
}
