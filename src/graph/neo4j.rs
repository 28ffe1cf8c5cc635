//! Neo4j HTTP transaction API client

use super::{GraphClient, GraphError, GraphResult, Row};
use crate::config::GraphConfig;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

/// Client for `POST /db/{database}/tx/commit`
pub struct Neo4jHttpClient {
    http_client: Client,
    commit_url: String,
    username: String,
    password: Option<String>,
}

#[derive(Deserialize)]
struct CommitResponse {
    #[serde(default)]
    results: Vec<StatementResult>,
    #[serde(default)]
    errors: Vec<StatementError>,
}

#[derive(Deserialize)]
struct StatementResult {
    columns: Vec<String>,
    #[serde(default)]
    data: Vec<RowData>,
}

#[derive(Deserialize)]
struct RowData {
    row: Vec<Value>,
}

#[derive(Deserialize)]
struct StatementError {
    code: String,
    message: String,
}

impl Neo4jHttpClient {
    pub fn new(config: &GraphConfig) -> GraphResult<Self> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| GraphError::ConfigError(e.to_string()))?;

        if config.database.trim().is_empty() {
            return Err(GraphError::ConfigError("database name is empty".to_string()));
        }

        let commit_url = format!("{}/db/{}/tx/commit", http_base_url(&config.url)?, config.database);
        Ok(Self {
            http_client,
            commit_url,
            username: config.username.clone(),
            password: config.password.clone(),
        })
    }

    pub fn commit_url(&self) -> &str {
        &self.commit_url
    }
}

/// Map a driver URL to the HTTP endpoint of the same server.
///
/// `bolt://host:7687` and `neo4j://host:7687` become `http://host:7474`;
/// `+s` variants map to https.
pub fn http_base_url(url: &str) -> GraphResult<String> {
    let url = url.trim().trim_end_matches('/');
    let (scheme, rest) = url
        .split_once("://")
        .ok_or_else(|| GraphError::ConfigError(format!("graph URL '{}' has no scheme", url)))?;

    let http_scheme = match scheme {
        "http" | "https" => return Ok(url.to_string()),
        "bolt" | "neo4j" => "http",
        "bolt+s" | "neo4j+s" | "bolt+ssc" | "neo4j+ssc" => "https",
        other => {
            return Err(GraphError::ConfigError(format!("unsupported graph URL scheme '{}'", other)))
        }
    };

    let rest = match rest.strip_suffix(":7687") {
        Some(host) => format!("{}:7474", host),
        None => rest.to_string(),
    };
    Ok(format!("{}://{}", http_scheme, rest))
}

fn rows_from_response(response: CommitResponse) -> GraphResult<Vec<Row>> {
    if let Some(err) = response.errors.into_iter().next() {
        return Err(GraphError::QueryError {
            code: err.code,
            message: err.message,
        });
    }

    let Some(result) = response.results.into_iter().next() else {
        return Ok(Vec::new());
    };

    result
        .data
        .into_iter()
        .map(|data| {
            if data.row.len() != result.columns.len() {
                return Err(GraphError::ProtocolError(format!(
                    "row has {} values for {} columns",
                    data.row.len(),
                    result.columns.len()
                )));
            }
            Ok(result.columns.iter().cloned().zip(data.row).collect())
        })
        .collect()
}

#[async_trait]
impl GraphClient for Neo4jHttpClient {
    async fn run(&self, cypher: &str, params: Value) -> GraphResult<Vec<Row>> {
        let body = json!({
            "statements": [{ "statement": cypher, "parameters": params }]
        });

        let response = self
            .http_client
            .post(&self.commit_url)
            .basic_auth(&self.username, self.password.as_ref())
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(GraphError::ProtocolError(format!("graph store returned {}: {}", status, text)));
        }

        let parsed: CommitResponse = response.json().await?;
        let rows = rows_from_response(parsed)?;
        debug!("Graph statement returned {} rows", rows.len());
        Ok(rows)
    }
}
