//! Streaming response handling
//!
//! Splits raw LLM output into an answer channel and a thought channel, and
//! accumulates both for persistence once the turn completes.

pub mod splitter;

pub use splitter::{Channel, StreamEvent, TagSplitter, THINK_CLOSE, THINK_OPEN};

/// Accumulated text of one output channel
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelBuffer {
    /// Everything emitted on this channel so far
    pub accumulated_text: String,
    /// Whether the channel is currently receiving text
    pub is_active: bool,
}

impl ChannelBuffer {
    pub fn is_empty(&self) -> bool {
        self.accumulated_text.is_empty()
    }
}

/// Both channels of one response turn
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transcript {
    pub answer: ChannelBuffer,
    pub thought: ChannelBuffer,
}

impl Transcript {
    pub fn new() -> Self {
        Self {
            answer: ChannelBuffer {
                accumulated_text: String::new(),
                is_active: true,
            },
            thought: ChannelBuffer::default(),
        }
    }

    /// Fold one splitter event into the buffers
    pub fn record(&mut self, event: &StreamEvent) {
        match event {
            StreamEvent::Answer(text) => self.answer.accumulated_text.push_str(text),
            StreamEvent::Thought(text) => self.thought.accumulated_text.push_str(text),
            StreamEvent::ThinkingStarted => {
                self.answer.is_active = false;
                self.thought.is_active = true;
            }
            StreamEvent::ThinkingEnded => {
                self.thought.is_active = false;
                self.answer.is_active = true;
            }
        }
    }

    /// Hand both channels to the caller as `(answer, thought)`.
    ///
    /// The thought is `None` when the model produced no reasoning text.
    pub fn finalize(self) -> (String, Option<String>) {
        let thought = if self.thought.is_empty() {
            None
        } else {
            Some(self.thought.accumulated_text)
        };
        (self.answer.accumulated_text, thought)
    }
}

impl Default for Transcript {
    fn default() -> Self {
        Self::new()
    }
}
