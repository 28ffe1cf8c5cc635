//! Import log and corpus counts

use chrono::{SecondsFormat, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

use super::{IngestError, IngestResult};
use crate::graph::{GraphClient, Row};

pub const DEFAULT_HISTORY_LIMIT: usize = 20;

const RECORD_IMPORT: &str = r#"
CREATE (log:ImportLog {
  id: $id,
  timestamp: $timestamp,
  total_questions: $questions,
  total_tags: $tags,
  total_pages: $pages,
  tags_list: $tags_list
})
"#;

const DATABASE_SUMMARY: &str = r#"
OPTIONAL MATCH (log:ImportLog)
WITH count(log) AS total_imports, max(log.timestamp) AS last_import
RETURN COUNT { (:Question) } AS total_questions,
       COUNT { (:Tag) } AS total_tags,
       COUNT { (:Answer) } AS total_answers,
       COUNT { (:User) } AS total_users,
       total_imports,
       last_import
"#;

const IMPORT_HISTORY: &str = r#"
MATCH (log:ImportLog)
RETURN log.id AS id, log.timestamp AS timestamp, log.total_questions AS questions,
       log.total_tags AS tags, log.total_pages AS pages, log.tags_list AS tags_list
ORDER BY log.timestamp DESC
LIMIT $limit
"#;

/// Node counts of the StackOverflow corpus
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseSummary {
    pub total_questions: u64,
    pub total_tags: u64,
    pub total_answers: u64,
    pub total_users: u64,
    pub total_imports: u64,
    /// RFC 3339 time of the newest import
    pub last_import: Option<String>,
}

/// One recorded import run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportLogEntry {
    pub id: String,
    pub timestamp: String,
    pub questions: u64,
    pub tags: u64,
    pub pages: u64,
    #[serde(default)]
    pub tags_list: Vec<String>,
}

fn from_row<T: DeserializeOwned>(row: Row) -> IngestResult<T> {
    serde_json::from_value(Value::Object(row)).map_err(|e| IngestError::Malformed(e.to_string()))
}

/// Write an `ImportLog` node for a finished import
pub async fn record_import(
    graph: &dyn GraphClient,
    total_questions: usize,
    tags: &[String],
    pages: u32,
) -> IngestResult<ImportLogEntry> {
    let entry = ImportLogEntry {
        id: Uuid::new_v4().to_string(),
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        questions: total_questions as u64,
        tags: tags.len() as u64,
        pages: pages as u64,
        tags_list: tags.to_vec(),
    };

    graph
        .run(
            RECORD_IMPORT,
            json!({
                "id": entry.id,
                "timestamp": entry.timestamp,
                "questions": entry.questions,
                "tags": entry.tags,
                "pages": entry.pages,
                "tags_list": entry.tags_list,
            }),
        )
        .await?;

    info!("Recorded import {} ({} questions)", entry.id, entry.questions);
    Ok(entry)
}

/// Corpus counts; all zero on an empty graph
pub async fn database_summary(graph: &dyn GraphClient) -> IngestResult<DatabaseSummary> {
    match graph.run(DATABASE_SUMMARY, json!({})).await?.into_iter().next() {
        Some(row) => from_row(row),
        None => Ok(DatabaseSummary::default()),
    }
}

/// Most recent imports first
pub async fn import_history(graph: &dyn GraphClient, limit: usize) -> IngestResult<Vec<ImportLogEntry>> {
    graph
        .run(IMPORT_HISTORY, json!({ "limit": limit }))
        .await?
        .into_iter()
        .map(from_row)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::GraphResult;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingGraph {
        rows: Vec<Row>,
        calls: Mutex<Vec<(String, Value)>>,
    }

    #[async_trait]
    impl GraphClient for RecordingGraph {
        async fn run(&self, cypher: &str, params: Value) -> GraphResult<Vec<Row>> {
            self.calls.lock().unwrap().push((cypher.to_string(), params));
            Ok(self.rows.clone())
        }
    }

    fn row(value: Value) -> Row {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_record_import_params() {
        let graph = RecordingGraph::default();
        let tags = vec!["neo4j".to_string(), "cypher".to_string()];
        let entry = record_import(&graph, 150, &tags, 2).await.unwrap();

        assert_eq!(entry.tags, 2);
        assert!(Uuid::parse_str(&entry.id).is_ok());

        let calls = graph.calls.lock().unwrap();
        let (cypher, params) = &calls[0];
        assert!(cypher.contains("CREATE (log:ImportLog"));
        assert_eq!(params["questions"], json!(150));
        assert_eq!(params["pages"], json!(2));
        assert_eq!(params["tags_list"], json!(["neo4j", "cypher"]));
        assert!(params["timestamp"].as_str().unwrap().ends_with('Z'));
    }

    #[tokio::test]
    async fn test_summary_of_empty_graph() {
        let graph = RecordingGraph {
            rows: vec![row(json!({
                "total_questions": 0, "total_tags": 0, "total_answers": 0,
                "total_users": 0, "total_imports": 0, "last_import": null
            }))],
            ..RecordingGraph::default()
        };
        assert_eq!(database_summary(&graph).await.unwrap(), DatabaseSummary::default());

        let silent = RecordingGraph::default();
        assert_eq!(database_summary(&silent).await.unwrap(), DatabaseSummary::default());
    }

    #[tokio::test]
    async fn test_import_history_rows() {
        let graph = RecordingGraph {
            rows: vec![row(json!({
                "id": "abc", "timestamp": "2026-01-02T03:04:05.000Z",
                "questions": 100, "tags": 1, "pages": 1, "tags_list": ["rust"]
            }))],
            ..RecordingGraph::default()
        };

        let history = import_history(&graph, 5).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].tags_list, vec!["rust"]);
        assert_eq!(graph.calls.lock().unwrap()[0].1["limit"], json!(5));
    }

    #[tokio::test]
    async fn test_import_history_rejects_bad_row() {
        let graph = RecordingGraph {
            rows: vec![row(json!({ "id": "abc" }))],
            ..RecordingGraph::default()
        };
        assert!(matches!(import_history(&graph, 5).await, Err(IngestError::Malformed(_))));
    }
}
