//! Events streamed to the client for one answer

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::stream::StreamEvent;

/// Named SSE event sent when the model starts reasoning
pub const EVENT_THINKING_START: &str = "thinking_start";

/// Named SSE event sent when the model stops reasoning
pub const EVENT_THINKING_END: &str = "thinking_end";

/// Named SSE event carrying a terminal failure
pub const EVENT_ERROR: &str = "error";

/// Data of an unnamed SSE event
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamPayload {
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub reasoning_content: String,
}

/// One client-visible piece of an answer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AskEvent {
    Answer(String),
    Thought(String),
    ThinkingStarted,
    ThinkingEnded,
    /// The turn failed; no further events follow
    Error(String),
}

impl From<StreamEvent> for AskEvent {
    fn from(event: StreamEvent) -> Self {
        match event {
            StreamEvent::Answer(text) => AskEvent::Answer(text),
            StreamEvent::Thought(text) => AskEvent::Thought(text),
            StreamEvent::ThinkingStarted => AskEvent::ThinkingStarted,
            StreamEvent::ThinkingEnded => AskEvent::ThinkingEnded,
        }
    }
}

impl AskEvent {
    /// SSE event name; `None` for plain data events
    pub fn event_name(&self) -> Option<&'static str> {
        match self {
            AskEvent::Answer(_) | AskEvent::Thought(_) => None,
            AskEvent::ThinkingStarted => Some(EVENT_THINKING_START),
            AskEvent::ThinkingEnded => Some(EVENT_THINKING_END),
            AskEvent::Error(_) => Some(EVENT_ERROR),
        }
    }

    /// JSON data of the SSE event
    pub fn payload(&self) -> Value {
        let payload = match self {
            AskEvent::Answer(text) => StreamPayload {
                content: text.clone(),
                ..StreamPayload::default()
            },
            AskEvent::Thought(text) => StreamPayload {
                reasoning_content: text.clone(),
                ..StreamPayload::default()
            },
            AskEvent::ThinkingStarted | AskEvent::ThinkingEnded => StreamPayload::default(),
            AskEvent::Error(message) => return json!({"status": "error", "message": message}),
        };
        json!(payload)
    }

    /// Decode a received SSE event back into events.
    ///
    /// A data event carrying both fields yields the thought first.
    pub fn from_sse(event_name: &str, data: &str) -> Result<Vec<AskEvent>, serde_json::Error> {
        match event_name {
            EVENT_THINKING_START => Ok(vec![AskEvent::ThinkingStarted]),
            EVENT_THINKING_END => Ok(vec![AskEvent::ThinkingEnded]),
            EVENT_ERROR => {
                let value: Value = serde_json::from_str(data)?;
                let message = value
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown error")
                    .to_string();
                Ok(vec![AskEvent::Error(message)])
            }
            _ => {
                let payload: StreamPayload = serde_json::from_str(data)?;
                let mut events = Vec::new();
                if !payload.reasoning_content.is_empty() {
                    events.push(AskEvent::Thought(payload.reasoning_content));
                }
                if !payload.content.is_empty() {
                    events.push(AskEvent::Answer(payload.content));
                }
                Ok(events)
            }
        }
    }
}
