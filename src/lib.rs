//! GraphRAG Chat
//!
//! Question answering over a knowledge graph with streamed, reasoning-aware
//! answers.
//!
//! # Architecture
//!
//! - `stream`: splits a model's token stream into answer and thought channels
//!   on `<think>` / `</think>` tags, whatever the chunk boundaries
//! - `retrieval`: hybrid vector + keyword search per node category, MMR
//!   diversification, community filtering and optional reranking
//! - `history`: per-session chat history in the graph store (or in memory)
//! - `prompt`: assembles the system prompt, context and history
//! - `chat`: the end-to-end turn, producing a stream of [`AskEvent`]s
//! - `ingest`: index and constraint bootstrap, embedding backfill and the
//!   StackOverflow loader with its import log
//! - `http`: the SSE endpoint and history management API
//!
//! ## Example Usage
//!
//! ```rust
//! use graphrag_chat::stream::{StreamEvent, TagSplitter};
//!
//! let mut splitter = TagSplitter::new();
//! let mut events = splitter.push("<thi");
//! events.extend(splitter.push("nk>checking</think>Hello"));
//! events.extend(splitter.finish());
//!
//! assert_eq!(
//!     events,
//!     vec![
//!         StreamEvent::ThinkingStarted,
//!         StreamEvent::Thought("checking".to_string()),
//!         StreamEvent::ThinkingEnded,
//!         StreamEvent::Answer("Hello".to_string()),
//!     ]
//! );
//! ```

#![allow(missing_docs)]
#![warn(clippy::all)]

pub mod chat;
pub mod config;
pub mod embed;
pub mod graph;
pub mod history;
pub mod http;
pub mod ingest;
pub mod llm;
pub mod prompt;
pub mod retrieval;
pub mod stream;
pub mod vector;

// Re-export main types for convenience
pub use chat::{AskEvent, AskRequest, ChatError, ChatResult, ChatService, HistoryEntry};

pub use config::{AppConfig, ConfigError, LlmProvider, Preset};

pub use history::{ChatMessage, ChatStore, GraphChatStore, MemoryChatStore, Role, SessionSummary};

pub use retrieval::{Document, EnsembleRetriever, SearchParams, SearchSource};

pub use stream::{StreamEvent, TagSplitter};

pub use http::HttpServer;

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get version string
pub fn version() -> &'static str {
    VERSION
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        let ver = version();
        assert!(!ver.is_empty());
        assert_eq!(ver, "1.2.0");
    }
}
