//! RemoteClient: network client for a running chat server
//!
//! Answers arrive as Server-Sent Events from `POST /stream-ask`; history
//! management goes through the `/api/v1` JSON routes.

use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::stream::{self, StreamExt};
use reqwest::{Client, Response};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

use graphrag_chat::chat::ServiceInfo;
use graphrag_chat::ingest::{DatabaseSummary, ImportLogEntry, ImportReport, ImportRequest, SchemaReport};
use graphrag_chat::{AskEvent, AskRequest, ChatMessage, SessionSummary};

use crate::client::{AskStream, ChatClient};
use crate::error::{SdkError, SdkResult};
use crate::models::HealthStatus;

/// Network client that connects to a running chat server.
pub struct RemoteClient {
    http_base_url: String,
    http_client: Client,
}

impl RemoteClient {
    /// Create a new RemoteClient connecting to the given HTTP base URL.
    ///
    /// # Example
    /// ```no_run
    /// # use graphrag_sdk::RemoteClient;
    /// let client = RemoteClient::new("http://localhost:8000");
    /// ```
    pub fn new(http_base_url: &str) -> Self {
        Self {
            http_base_url: http_base_url.trim_end_matches('/').to_string(),
            http_client: Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.http_base_url, path)
    }

    /// Turn a non-success response into [`SdkError::ApiError`]
    async fn check(response: Response) -> SdkResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body: Value = response.json().await.unwrap_or(Value::Null);
        let message = body
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or_else(|| status.canonical_reason().unwrap_or("Unknown error"))
            .to_string();
        Err(SdkError::ApiError {
            status: status.as_u16(),
            message,
        })
    }

    /// GET `path` and decode `field` of the envelope
    async fn get_field<T: DeserializeOwned>(&self, path: &str, field: &str) -> SdkResult<T> {
        let response = self.http_client.get(self.url(path)).send().await?;
        let status = response.status().as_u16();
        let mut body: Value = Self::check(response).await?.json().await?;

        // Listing failures arrive as 200 with an error envelope
        if body["status"] == "error" {
            let message = body["message"].as_str().unwrap_or("Unknown error").to_string();
            return Err(SdkError::ApiError { status, message });
        }
        Ok(serde_json::from_value(body[field].take())?)
    }

    /// POST `body` to `path` and decode `field` of the envelope
    async fn post_field<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
        field: &str,
    ) -> SdkResult<T> {
        let response = self.http_client.post(self.url(path)).json(body).send().await?;
        let mut body: Value = Self::check(response).await?.json().await?;
        Ok(serde_json::from_value(body[field].take())?)
    }

    async fn delete(&self, path: &str) -> SdkResult<()> {
        let response = self.http_client.delete(self.url(path)).send().await?;
        Self::check(response).await?;
        Ok(())
    }
}

#[async_trait]
impl ChatClient for RemoteClient {
    async fn ask(&self, request: AskRequest) -> SdkResult<AskStream> {
        let response = self
            .http_client
            .post(self.url("/stream-ask"))
            .json(&request)
            .send()
            .await?;
        let response = Self::check(response).await?;

        let events = response.bytes_stream().eventsource().flat_map(|item| {
            let decoded: Vec<SdkResult<AskEvent>> = match item {
                Ok(event) => match AskEvent::from_sse(&event.event, &event.data) {
                    Ok(events) => events.into_iter().map(Ok).collect(),
                    Err(e) => vec![Err(SdkError::from(e))],
                },
                Err(e) => vec![Err(SdkError::StreamError(e.to_string()))],
            };
            stream::iter(decoded)
        });
        Ok(events.boxed())
    }

    async fn health(&self) -> SdkResult<HealthStatus> {
        let response = self.http_client.get(self.url("/health")).send().await?;
        Ok(Self::check(response).await?.json().await?)
    }

    async fn config(&self) -> SdkResult<ServiceInfo> {
        let response = self.http_client.get(self.url("/api/v1/config")).send().await?;
        Ok(Self::check(response).await?.json().await?)
    }

    async fn users(&self) -> SdkResult<Vec<String>> {
        self.get_field("/api/v1/users", "users").await
    }

    async fn sessions(&self, user_id: Option<&str>) -> SdkResult<Vec<SessionSummary>> {
        match user_id {
            Some(user_id) => {
                self.get_field(&format!("/api/v1/users/{}/sessions", user_id), "sessions")
                    .await
            }
            None => self.get_field("/api/v1/sessions", "sessions").await,
        }
    }

    async fn messages(&self, session_id: &str) -> SdkResult<Vec<ChatMessage>> {
        self.get_field(&format!("/api/v1/sessions/{}/messages", session_id), "messages")
            .await
    }

    async fn delete_session(&self, session_id: &str) -> SdkResult<()> {
        self.delete(&format!("/api/v1/sessions/{}", session_id)).await
    }

    async fn delete_user(&self, user_id: &str) -> SdkResult<()> {
        self.delete(&format!("/api/v1/users/{}", user_id)).await
    }

    async fn summary(&self) -> SdkResult<DatabaseSummary> {
        self.get_field("/api/v1/summary", "summary").await
    }

    async fn imports(&self, limit: Option<usize>) -> SdkResult<Vec<ImportLogEntry>> {
        match limit {
            Some(limit) => self.get_field(&format!("/api/v1/imports?limit={}", limit), "imports").await,
            None => self.get_field("/api/v1/imports", "imports").await,
        }
    }

    async fn import(&self, request: ImportRequest) -> SdkResult<ImportReport> {
        self.post_field("/api/v1/imports", &request, "report").await
    }

    async fn ensure_schema(&self) -> SdkResult<SchemaReport> {
        self.post_field("/api/v1/schema", &serde_json::json!({}), "schema").await
    }
}
