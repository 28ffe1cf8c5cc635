//! GraphRAG SDK: client library for the GraphRAG chat API
//!
//! Provides two client implementations:
//!
//! - **`EmbeddedClient`**: in-process, no network. Drives a `ChatService`
//!   directly. Ideal for tests and embedded applications.
//!
//! - **`RemoteClient`**: connects to a running server over HTTP and decodes
//!   the Server-Sent Events answer stream.
//!
//! Both implement the `ChatClient` trait for a unified API.
//!
//! # Quick Start
//!
//! ```no_run
//! use graphrag_sdk::{AskRequest, ChatClient, RemoteClient};
//!
//! #[tokio::main]
//! async fn main() {
//!     let client = RemoteClient::new("http://localhost:8000");
//!
//!     let answer = client
//!         .ask_collect(AskRequest::new("How do I run Flask in Docker?").with_session("s1"))
//!         .await
//!         .unwrap();
//!     println!("{}", answer.answer);
//! }
//! ```

pub mod client;
pub mod embedded;
pub mod error;
pub mod models;
pub mod remote;

pub use client::{AskStream, ChatClient};
pub use embedded::EmbeddedClient;
pub use error::{SdkError, SdkResult};
pub use models::{collect_answer, Answer, HealthStatus};
pub use remote::RemoteClient;

// Request and response types shared with the server
pub use graphrag_chat::chat::ServiceInfo;
pub use graphrag_chat::ingest::{
    DatabaseSummary, ImportLogEntry, ImportReport, ImportRequest, PageOutcome, PageStatus, SchemaReport,
};
pub use graphrag_chat::{AskEvent, AskRequest, ChatMessage, HistoryEntry, Role, SessionSummary};
