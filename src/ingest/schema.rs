//! Constraints, search indexes and embedding backfill

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info};

use super::{quote_identifier, IngestError, IngestResult};
use crate::config::{Preset, RetrievalConfig, SourceConfig};
use crate::embed::Embedder;
use crate::graph::GraphClient;

/// Uniqueness constraints as (name, label, property)
type Constraint = (&'static str, &'static str, &'static str);

const STACKOVERFLOW_CONSTRAINTS: &[Constraint] = &[
    ("question_id", "Question", "id"),
    ("answer_id", "Answer", "id"),
    ("user_id", "User", "id"),
    ("tag_name", "Tag", "name"),
    ("importlog_id", "ImportLog", "id"),
];

const MOVIES_CONSTRAINTS: &[Constraint] = &[
    ("movie_id", "Movie", "id"),
    ("person_name", "Person", "name"),
    ("category_name", "Category", "name"),
    ("country_name", "Country", "name"),
    ("type_name", "Type", "type"),
];

const HISTORY_CONSTRAINTS: &[Constraint] = &[
    ("app_user_id", "AppUser", "id"),
    ("chat_session_id", "Session", "id"),
];

const STORE_EMBEDDINGS: &str = r#"
UNWIND $rows AS row
MATCH (n) WHERE elementId(n) = row.id
SET n.text = row.text, n.embedding = row.embedding
"#;

/// What [`ensure_schema`] set up
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaReport {
    pub constraints: usize,
    pub vector_indexes: Vec<String>,
    pub keyword_indexes: Vec<String>,
    /// Vector size used for the vector indexes
    pub dimensions: usize,
    /// Nodes that received an embedding during this run
    pub embedded_nodes: usize,
}

pub fn constraint_statements(preset: Preset) -> Vec<String> {
    let corpus = match preset {
        Preset::StackOverflow => STACKOVERFLOW_CONSTRAINTS,
        Preset::Movies => MOVIES_CONSTRAINTS,
    };
    corpus
        .iter()
        .chain(HISTORY_CONSTRAINTS)
        .map(|(name, label, property)| {
            format!(
                "CREATE CONSTRAINT {} IF NOT EXISTS FOR (n:{}) REQUIRE n.{} IS UNIQUE",
                quote_identifier(name),
                quote_identifier(label),
                quote_identifier(property)
            )
        })
        .collect()
}

pub fn vector_index_statement(source: &SourceConfig, dimensions: usize) -> String {
    format!(
        "CREATE VECTOR INDEX {} IF NOT EXISTS FOR (n:{}) ON (n.embedding) \
         OPTIONS {{indexConfig: {{`vector.dimensions`: {}, `vector.similarity_function`: 'cosine'}}}}",
        quote_identifier(&source.index_name),
        quote_identifier(&source.label),
        dimensions
    )
}

pub fn keyword_index_statement(source: &SourceConfig) -> String {
    format!(
        "CREATE FULLTEXT INDEX {} IF NOT EXISTS FOR (n:{}) ON EACH [n.text]",
        quote_identifier(&source.keyword_index_name),
        quote_identifier(&source.label)
    )
}

fn pending_nodes_query(label: &str) -> String {
    format!(
        r#"MATCH (n:{})
WHERE n.embedding IS NULL AND any(k IN $properties WHERE n[k] IS NOT NULL)
RETURN elementId(n) AS id,
       reduce(text = '', k IN $properties | text + '\n' + k + ': ' + coalesce(toString(n[k]), '')) AS text
LIMIT $limit"#,
        quote_identifier(label)
    )
}

/// Embed every node of `source` that has no `embedding` yet.
///
/// Each node's `text` becomes one `property: value` line per text property,
/// the same text the full-text index searches.
pub async fn backfill_embeddings(
    graph: &dyn GraphClient,
    embedder: &dyn Embedder,
    source: &SourceConfig,
    batch_size: usize,
) -> IngestResult<usize> {
    let query = pending_nodes_query(&source.label);
    let properties = source.text_properties();
    let mut embedded = 0;

    loop {
        let rows = graph
            .run(&query, json!({ "properties": properties, "limit": batch_size }))
            .await?;
        if rows.is_empty() {
            break;
        }

        let mut ids = Vec::with_capacity(rows.len());
        let mut texts = Vec::with_capacity(rows.len());
        for row in &rows {
            match (row.get("id").and_then(Value::as_str), row.get("text").and_then(Value::as_str)) {
                (Some(id), Some(text)) => {
                    ids.push(id.to_string());
                    texts.push(text.to_string());
                }
                _ => return Err(IngestError::Malformed(format!("pending {} row without id/text", source.label))),
            }
        }

        let vectors = embedder.embed_documents(&texts).await?;
        if vectors.len() != texts.len() {
            return Err(IngestError::Malformed(format!(
                "{} embeddings for {} texts",
                vectors.len(),
                texts.len()
            )));
        }

        let updates: Vec<Value> = ids
            .into_iter()
            .zip(texts)
            .zip(vectors)
            .map(|((id, text), embedding)| json!({ "id": id, "text": text, "embedding": embedding }))
            .collect();
        graph.run(STORE_EMBEDDINGS, json!({ "rows": updates })).await?;

        embedded += rows.len();
        debug!("Embedded {} {} nodes so far", embedded, source.label);
        if rows.len() < batch_size {
            break;
        }
    }

    Ok(embedded)
}

/// Create constraints and both search indexes for every source, then embed
/// unembedded nodes. Every statement is idempotent.
pub async fn ensure_schema(
    graph: &dyn GraphClient,
    embedder: &dyn Embedder,
    retrieval: &RetrievalConfig,
    batch_size: usize,
) -> IngestResult<SchemaReport> {
    let dimensions = embedder.embed_query("vector size").await?.len();
    if dimensions == 0 {
        return Err(IngestError::Malformed("embedding provider returned an empty vector".to_string()));
    }

    let mut report = SchemaReport {
        dimensions,
        ..SchemaReport::default()
    };

    for statement in constraint_statements(retrieval.preset) {
        graph.run(&statement, json!({})).await?;
        report.constraints += 1;
    }

    for source in &retrieval.sources {
        graph.run(&vector_index_statement(source, dimensions), json!({})).await?;
        report.vector_indexes.push(source.index_name.clone());

        graph.run(&keyword_index_statement(source), json!({})).await?;
        report.keyword_indexes.push(source.keyword_index_name.clone());

        report.embedded_nodes += backfill_embeddings(graph, embedder, source, batch_size).await?;
    }

    info!(
        "Schema ready: {} constraints, {} sources, {} nodes embedded",
        report.constraints,
        report.vector_indexes.len(),
        report.embedded_nodes
    );
    Ok(report)
}
