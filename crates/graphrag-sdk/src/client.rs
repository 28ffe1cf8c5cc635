//! ChatClient trait: the unified interface for embedded and remote modes

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::SdkResult;
use crate::models::{collect_answer, Answer, HealthStatus};
use graphrag_chat::chat::ServiceInfo;
use graphrag_chat::ingest::{DatabaseSummary, ImportLogEntry, ImportReport, ImportRequest, SchemaReport};
use graphrag_chat::{AskEvent, AskRequest, ChatMessage, SessionSummary};

/// Events of one answer, in order
pub type AskStream = BoxStream<'static, SdkResult<AskEvent>>;

/// Unified client interface for the GraphRAG chat API.
///
/// Implemented by:
/// - `EmbeddedClient`: in-process, no network
/// - `RemoteClient`: connects to a running server via HTTP
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Ask a question and stream the answer
    async fn ask(&self, request: AskRequest) -> SdkResult<AskStream>;

    /// Ask a question and wait for the whole answer
    async fn ask_collect(&self, request: AskRequest) -> SdkResult<Answer> {
        collect_answer(self.ask(request).await?).await
    }

    /// Get server health
    async fn health(&self) -> SdkResult<HealthStatus>;

    /// Get deployment details
    async fn config(&self) -> SdkResult<ServiceInfo>;

    /// List all users
    async fn users(&self) -> SdkResult<Vec<String>>;

    /// List sessions of one user, or all sessions
    async fn sessions(&self, user_id: Option<&str>) -> SdkResult<Vec<SessionSummary>>;

    /// Messages of a session, oldest first
    async fn messages(&self, session_id: &str) -> SdkResult<Vec<ChatMessage>>;

    /// Delete a session and its messages
    async fn delete_session(&self, session_id: &str) -> SdkResult<()>;

    /// Delete a user with all of their sessions
    async fn delete_user(&self, user_id: &str) -> SdkResult<()>;

    /// Node counts of the loaded corpus
    async fn summary(&self) -> SdkResult<DatabaseSummary>;

    /// Recent imports, newest first (server default limit when `None`)
    async fn imports(&self, limit: Option<usize>) -> SdkResult<Vec<ImportLogEntry>>;

    /// Load StackOverflow pages into the graph
    async fn import(&self, request: ImportRequest) -> SdkResult<ImportReport>;

    /// Create missing constraints and indexes, then embed unembedded nodes
    async fn ensure_schema(&self) -> SdkResult<SchemaReport>;
}
