//! EmbeddedClient: in-process chat client
//!
//! Drives a `ChatService` directly, no network needed.

use async_trait::async_trait;
use futures::StreamExt;
use std::sync::Arc;

use graphrag_chat::chat::ServiceInfo;
use graphrag_chat::ingest::{
    catalog::DEFAULT_HISTORY_LIMIT, DatabaseSummary, ImportLogEntry, ImportReport, ImportRequest,
    SchemaReport,
};
use graphrag_chat::{AppConfig, AskRequest, ChatMessage, ChatService, SessionSummary};

use crate::client::{AskStream, ChatClient};
use crate::error::SdkResult;
use crate::models::HealthStatus;

/// In-process client that wraps a [`ChatService`].
pub struct EmbeddedClient {
    service: Arc<ChatService>,
}

impl EmbeddedClient {
    pub fn new(service: Arc<ChatService>) -> Self {
        Self { service }
    }

    /// Build the whole pipeline from configuration
    pub fn from_config(config: &AppConfig) -> SdkResult<Self> {
        Ok(Self::new(Arc::new(ChatService::from_config(config)?)))
    }

    /// The underlying service
    pub fn service(&self) -> &Arc<ChatService> {
        &self.service
    }
}

#[async_trait]
impl ChatClient for EmbeddedClient {
    async fn ask(&self, request: AskRequest) -> SdkResult<AskStream> {
        let events = self.service.ask(request)?;
        Ok(events.map(Ok).boxed())
    }

    async fn health(&self) -> SdkResult<HealthStatus> {
        Ok(HealthStatus {
            status: "healthy".to_string(),
            version: graphrag_chat::VERSION.to_string(),
            sources: self.service.source_count(),
            history: self.service.history().is_some(),
        })
    }

    async fn config(&self) -> SdkResult<ServiceInfo> {
        Ok(self.service.info().clone())
    }

    async fn users(&self) -> SdkResult<Vec<String>> {
        let store = self.service.require_history()?;
        Ok(store.list_users().await?)
    }

    async fn sessions(&self, user_id: Option<&str>) -> SdkResult<Vec<SessionSummary>> {
        let store = self.service.require_history()?;
        Ok(store.list_sessions(user_id).await?)
    }

    async fn messages(&self, session_id: &str) -> SdkResult<Vec<ChatMessage>> {
        let store = self.service.require_history()?;
        Ok(store.get_messages(session_id).await?)
    }

    async fn delete_session(&self, session_id: &str) -> SdkResult<()> {
        let store = self.service.require_history()?;
        Ok(store.delete_session(session_id).await?)
    }

    async fn delete_user(&self, user_id: &str) -> SdkResult<()> {
        let store = self.service.require_history()?;
        Ok(store.delete_user(user_id).await?)
    }

    async fn summary(&self) -> SdkResult<DatabaseSummary> {
        Ok(self.service.require_ingest()?.summary().await?)
    }

    async fn imports(&self, limit: Option<usize>) -> SdkResult<Vec<ImportLogEntry>> {
        let ingest = self.service.require_ingest()?;
        Ok(ingest.import_history(limit.unwrap_or(DEFAULT_HISTORY_LIMIT)).await?)
    }

    async fn import(&self, request: ImportRequest) -> SdkResult<ImportReport> {
        Ok(self.service.require_ingest()?.import(&request).await?)
    }

    async fn ensure_schema(&self) -> SdkResult<SchemaReport> {
        Ok(self.service.require_ingest()?.ensure_schema().await?)
    }
}
