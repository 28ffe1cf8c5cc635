//! Cross-encoder reranking

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

use super::{Document, RetrievalError, RetrievalResult};
use crate::config::RerankerConfig;

/// Reorders merged documents by relevance to the question
#[async_trait]
pub trait Reranker: Send + Sync {
    /// Return at most `top_n` documents, most relevant first, with `score`
    /// replaced by the reranker's score
    async fn rerank(
        &self,
        question: &str,
        documents: Vec<Document>,
        top_n: usize,
    ) -> RetrievalResult<Vec<Document>>;
}

/// Client for a text-embeddings-inference style `POST /rerank` endpoint
pub struct HttpReranker {
    client: Client,
    url: String,
    model: Option<String>,
}

#[derive(Serialize)]
struct RerankRequest<'a> {
    query: &'a str,
    texts: Vec<&'a str>,
    truncate: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
}

#[derive(Deserialize)]
struct RerankHit {
    index: usize,
    score: f32,
}

impl HttpReranker {
    pub fn new(config: &RerankerConfig) -> RetrievalResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| RetrievalError::Rerank(e.to_string()))?;

        Ok(Self {
            client,
            url: format!("{}/rerank", config.url.trim_end_matches('/')),
            model: config.model.clone(),
        })
    }
}

/// Order `documents` by `hits`, keeping the retrieval score in metadata
fn apply_scores(
    documents: Vec<Document>,
    mut hits: Vec<RerankHit>,
    top_n: usize,
) -> RetrievalResult<Vec<Document>> {
    hits.sort_by(|a, b| b.score.total_cmp(&a.score).then(a.index.cmp(&b.index)));

    let mut slots: Vec<Option<Document>> = documents.into_iter().map(Some).collect();
    let mut reranked = Vec::with_capacity(top_n.min(slots.len()));
    for hit in hits {
        if reranked.len() == top_n {
            break;
        }
        let mut document = slots
            .get_mut(hit.index)
            .and_then(Option::take)
            .ok_or_else(|| {
                RetrievalError::MalformedResult(format!("reranker returned bad index {}", hit.index))
            })?;
        document
            .metadata
            .insert("retrieval_score".to_string(), Value::from(document.score as f64));
        document.score = hit.score;
        reranked.push(document);
    }
    Ok(reranked)
}

#[async_trait]
impl Reranker for HttpReranker {
    async fn rerank(
        &self,
        question: &str,
        documents: Vec<Document>,
        top_n: usize,
    ) -> RetrievalResult<Vec<Document>> {
        if documents.is_empty() || top_n == 0 {
            return Ok(Vec::new());
        }

        let request = RerankRequest {
            query: question,
            texts: documents.iter().map(|d| d.text.as_str()).collect(),
            truncate: true,
            model: self.model.as_deref(),
        };

        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|e| RetrievalError::Rerank(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(RetrievalError::Rerank(format!("reranker returned {}: {}", status, text)));
        }

        let hits: Vec<RerankHit> = response
            .json()
            .await
            .map_err(|e| RetrievalError::Rerank(e.to_string()))?;
        apply_scores(documents, hits, top_n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{routing::post, Json, Router};
    use serde_json::{json, Map};

    fn doc(text: &str, score: f32) -> Document {
        Document::new(text, Map::new(), score)
    }

    #[test]
    fn test_apply_scores_orders_and_truncates() {
        let documents = vec![doc("a", 0.9), doc("b", 0.88), doc("c", 0.86)];
        let hits = vec![
            RerankHit { index: 0, score: 0.1 },
            RerankHit { index: 1, score: 0.7 },
            RerankHit { index: 2, score: 0.4 },
        ];

        let reranked = apply_scores(documents, hits, 2).unwrap();
        assert_eq!(reranked.len(), 2);
        assert_eq!(reranked[0].text, "b");
        assert_eq!(reranked[0].score, 0.7);
        assert_eq!(reranked[0].metadata["retrieval_score"].as_f64().map(|s| s as f32), Some(0.88));
        assert_eq!(reranked[1].text, "c");
    }

    #[test]
    fn test_apply_scores_rejects_unknown_index() {
        let result = apply_scores(vec![doc("a", 0.9)], vec![RerankHit { index: 3, score: 1.0 }], 5);
        assert!(matches!(result, Err(RetrievalError::MalformedResult(_))));
    }

    #[tokio::test]
    async fn test_http_reranker_against_local_server() {
        // Scores texts by length so the longest comes first
        let app = Router::new().route(
            "/rerank",
            post(|Json(body): Json<serde_json::Value>| async move {
                let texts = body["texts"].as_array().cloned().unwrap_or_default();
                let hits: Vec<_> = texts
                    .iter()
                    .enumerate()
                    .map(|(i, t)| json!({"index": i, "score": t.as_str().unwrap_or("").len() as f32}))
                    .collect();
                Json(json!(hits))
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let reranker = HttpReranker::new(&RerankerConfig {
            url: format!("http://{}/", addr),
            model: None,
        })
        .unwrap();

        let reranked = reranker
            .rerank("q", vec![doc("short", 0.9), doc("much longer text", 0.9)], 1)
            .await
            .unwrap();
        assert_eq!(reranked.len(), 1);
        assert_eq!(reranked[0].text, "much longer text");
    }
}
