//! StackOverflow question loader

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, warn};

use super::catalog;
use super::stackexchange::{Question, StackExchangeClient};
use super::{IngestError, IngestResult};
use crate::embed::Embedder;
use crate::graph::GraphClient;

const IMPORT_QUESTIONS: &str = r#"
UNWIND $data AS q
MERGE (question:Question {id: q.question_id})
ON CREATE SET question.title = q.title, question.link = q.link, question.score = q.score,
    question.favorite_count = q.favorite_count,
    question.creation_date = datetime({epochSeconds: q.creation_date}),
    question.body = q.body_markdown, question.text = q.text, question.embedding = q.embedding
FOREACH (tagName IN q.tags |
    MERGE (tag:Tag {name: tagName})
    MERGE (question)-[:TAGGED]->(tag)
)
FOREACH (a IN q.answers |
    MERGE (question)<-[:ANSWERS]-(answer:Answer {id: a.answer_id})
    SET answer.is_accepted = a.is_accepted,
        answer.score = a.score,
        answer.creation_date = datetime({epochSeconds: a.creation_date}),
        answer.body = a.body_markdown,
        answer.text = a.text,
        answer.embedding = a.embedding
    MERGE (answerer:User {id: coalesce(a.owner.user_id, "deleted")})
    ON CREATE SET answerer.display_name = a.owner.display_name,
                  answerer.reputation = a.owner.reputation
    MERGE (answer)<-[:PROVIDED]-(answerer)
)
WITH * WHERE NOT q.owner.user_id IS NULL
MERGE (owner:User {id: q.owner.user_id})
ON CREATE SET owner.display_name = q.owner.display_name,
              owner.reputation = q.owner.reputation
MERGE (owner)-[:ASKED]->(question)
"#;

fn default_start_page() -> u32 {
    1
}

/// Tags and page range to load
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportRequest {
    pub tags: Vec<String>,
    /// Pages per tag, 100 questions each
    pub pages: u32,
    #[serde(default = "default_start_page")]
    pub start_page: u32,
}

impl ImportRequest {
    /// Trimmed, non-empty, first occurrence of each tag
    pub fn clean_tags(&self) -> Vec<String> {
        let mut tags: Vec<String> = Vec::new();
        for tag in self.tags.iter().map(|t| t.trim()).filter(|t| !t.is_empty()) {
            if !tags.iter().any(|seen| seen == tag) {
                tags.push(tag.to_string());
            }
        }
        tags
    }

    pub fn validate(&self) -> IngestResult<()> {
        if self.clean_tags().is_empty() {
            return Err(IngestError::InvalidRequest("at least one tag is required".to_string()));
        }
        if self.pages == 0 {
            return Err(IngestError::InvalidRequest("pages must be at least 1".to_string()));
        }
        if self.start_page == 0 {
            return Err(IngestError::InvalidRequest("start_page must be at least 1".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum PageStatus {
    Imported { count: usize },
    /// The API had no questions on this page
    Empty,
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageOutcome {
    pub tag: String,
    pub page: u32,
    pub status: PageStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportReport {
    /// Id of the `ImportLog` node written for this run
    pub import_id: String,
    pub total_questions: usize,
    pub pages: Vec<PageOutcome>,
}

/// Loads tagged questions with their answers, owners and tags.
///
/// Pages run concurrently. A failed page is reported in its [`PageOutcome`]
/// and does not stop the others.
pub struct Importer {
    graph: Arc<dyn GraphClient>,
    embedder: Arc<dyn Embedder>,
    source: StackExchangeClient,
    concurrency: usize,
}

impl Importer {
    pub fn new(
        graph: Arc<dyn GraphClient>,
        embedder: Arc<dyn Embedder>,
        source: StackExchangeClient,
        concurrency: usize,
    ) -> Self {
        Self {
            graph,
            embedder,
            source,
            concurrency: concurrency.max(1),
        }
    }

    pub async fn run(&self, request: &ImportRequest) -> IngestResult<ImportReport> {
        request.validate()?;
        let tags = request.clean_tags();

        let jobs: Vec<(String, u32)> = tags
            .iter()
            .flat_map(|tag| (0..request.pages).map(move |i| (tag.clone(), request.start_page + i)))
            .collect();
        info!("Importing {} pages for {} tags", jobs.len(), tags.len());

        let mut pages: Vec<PageOutcome> = stream::iter(jobs)
            .map(|(tag, page)| async move {
                let status = match self.import_page(&tag, page).await {
                    Ok(0) => PageStatus::Empty,
                    Ok(count) => PageStatus::Imported { count },
                    Err(e) => {
                        warn!("Page {} of '{}' failed: {}", page, tag, e);
                        PageStatus::Failed { error: e.to_string() }
                    }
                };
                PageOutcome { tag, page, status }
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;
        pages.sort_by(|a, b| a.tag.cmp(&b.tag).then(a.page.cmp(&b.page)));

        let total_questions = pages
            .iter()
            .map(|p| match p.status {
                PageStatus::Imported { count } => count,
                _ => 0,
            })
            .sum();

        let entry = catalog::record_import(self.graph.as_ref(), total_questions, &tags, request.pages).await?;
        Ok(ImportReport {
            import_id: entry.id,
            total_questions,
            pages,
        })
    }

    async fn import_page(&self, tag: &str, page: u32) -> IngestResult<usize> {
        let questions = self.source.fetch_page(tag, page).await?;
        if questions.is_empty() {
            return Ok(0);
        }

        let count = questions.len();
        let data = self.with_embeddings(questions).await?;
        self.graph.run(IMPORT_QUESTIONS, json!({ "data": data })).await?;
        info!("Imported {} questions from page {} of '{}'", count, page, tag);
        Ok(count)
    }

    /// Question text is title and body; answer text is prefixed with the
    /// question text. Both are embedded in one batch.
    async fn with_embeddings(&self, questions: Vec<Question>) -> IngestResult<Vec<Value>> {
        let mut texts = Vec::new();
        for question in &questions {
            let question_text = format!("{}\n{}", question.title, question.body_markdown);
            for answer in &question.answers {
                texts.push(format!("{}\n{}", question_text, answer.body_markdown));
            }
            texts.push(question_text);
        }

        let vectors = self.embedder.embed_documents(&texts).await?;
        if vectors.len() != texts.len() {
            return Err(IngestError::Malformed(format!(
                "{} embeddings for {} texts",
                vectors.len(),
                texts.len()
            )));
        }

        let mut embedded = texts.into_iter().zip(vectors);
        let mut data = Vec::with_capacity(questions.len());
        for question in questions {
            let mut answers = Vec::with_capacity(question.answers.len());
            for answer in &question.answers {
                let (text, embedding) = embedded.next().ok_or_else(|| {
                    IngestError::Malformed("embedding count mismatch".to_string())
                })?;
                let mut value = serde_json::to_value(answer).map_err(|e| IngestError::Malformed(e.to_string()))?;
                value["text"] = json!(text);
                value["embedding"] = json!(embedding);
                answers.push(value);
            }
            let (text, embedding) = embedded
                .next()
                .ok_or_else(|| IngestError::Malformed("embedding count mismatch".to_string()))?;

            let mut value = serde_json::to_value(&question).map_err(|e| IngestError::Malformed(e.to_string()))?;
            value["answers"] = Value::Array(answers);
            value["text"] = json!(text);
            value["embedding"] = json!(embedding);
            data.push(value);
        }
        Ok(data)
    }
}
