//! Data models for the GraphRAG SDK

use futures::StreamExt;
use serde::{Deserialize, Serialize};

use crate::client::AskStream;
use crate::error::{SdkError, SdkResult};
use graphrag_chat::AskEvent;

/// Reply of `GET /health`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub version: String,
    /// Number of configured search sources
    pub sources: usize,
    /// Whether chat history is enabled
    pub history: bool,
}

/// A fully received answer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Answer {
    pub answer: String,
    /// Concatenated reasoning, if the model produced any
    pub thought: Option<String>,
}

/// Drain an answer stream. An error event becomes [`SdkError::AnswerError`].
pub async fn collect_answer(mut events: AskStream) -> SdkResult<Answer> {
    let mut answer = String::new();
    let mut thought = String::new();

    while let Some(event) = events.next().await {
        match event? {
            AskEvent::Answer(text) => answer.push_str(&text),
            AskEvent::Thought(text) => thought.push_str(&text),
            AskEvent::ThinkingStarted | AskEvent::ThinkingEnded => {}
            AskEvent::Error(message) => return Err(SdkError::AnswerError(message)),
        }
    }

    Ok(Answer {
        answer,
        thought: Some(thought).filter(|t| !t.is_empty()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    #[tokio::test]
    async fn test_collect_answer_joins_channels() {
        let events: AskStream = Box::pin(stream::iter(vec![
            Ok(AskEvent::ThinkingStarted),
            Ok(AskEvent::Thought("a".to_string())),
            Ok(AskEvent::Thought("b".to_string())),
            Ok(AskEvent::ThinkingEnded),
            Ok(AskEvent::Answer("Hello".to_string())),
            Ok(AskEvent::Answer(" world".to_string())),
        ]));

        let answer = collect_answer(events).await.unwrap();
        assert_eq!(answer.answer, "Hello world");
        assert_eq!(answer.thought.as_deref(), Some("ab"));
    }

    #[tokio::test]
    async fn test_collect_answer_surfaces_error_event() {
        let events: AskStream = Box::pin(stream::iter(vec![
            Ok(AskEvent::Answer("partial".to_string())),
            Ok(AskEvent::Error("model went away".to_string())),
        ]));

        let result = collect_answer(events).await;
        assert!(matches!(result, Err(SdkError::AnswerError(m)) if m == "model went away"));
    }
}
