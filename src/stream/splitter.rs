//! Tag-delimited splitter for reasoning model output
//!
//! Reasoning models interleave `<think>...</think>` regions with the answer
//! text. [`TagSplitter`] is a two-state lexer over the raw chunk stream that
//! re-emits the text as answer and thought pieces, replacing the tags with
//! channel-switch markers.

/// Opening sentinel tag of a reasoning region
pub const THINK_OPEN: &str = "<think>";

/// Closing sentinel tag of a reasoning region
pub const THINK_CLOSE: &str = "</think>";

/// Output channel of the splitter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    /// Normal answer text (initial state)
    Answer,
    /// Text inside a `<think>` region
    Thought,
}

/// One event emitted by the splitter
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// A piece of answer text
    Answer(String),
    /// A piece of reasoning text
    Thought(String),
    /// The stream switched to the thought channel
    ThinkingStarted,
    /// The stream switched back to the answer channel
    ThinkingEnded,
}

impl StreamEvent {
    /// Build a text event for the given channel
    pub fn text(channel: Channel, text: impl Into<String>) -> Self {
        match channel {
            Channel::Answer => StreamEvent::Answer(text.into()),
            Channel::Thought => StreamEvent::Thought(text.into()),
        }
    }

    /// Whether this event is a channel-switch marker
    pub fn is_marker(&self) -> bool {
        matches!(self, StreamEvent::ThinkingStarted | StreamEvent::ThinkingEnded)
    }
}

/// Incremental `<think>` tag splitter.
///
/// A fresh splitter must be used for every response turn. Text that could be
/// the beginning of the awaited tag is held back until the next chunk confirms
/// or rules it out, so tags straddling chunk boundaries never leak.
#[derive(Debug)]
pub struct TagSplitter {
    channel: Channel,
    buffer: String,
}

impl TagSplitter {
    /// Create a splitter in the answering state
    pub fn new() -> Self {
        Self {
            channel: Channel::Answer,
            buffer: String::new(),
        }
    }

    /// Channel the next plain text will be routed to
    pub fn channel(&self) -> Channel {
        self.channel
    }

    /// Bytes currently held back waiting for more input
    pub fn pending(&self) -> &str {
        &self.buffer
    }

    /// Feed one chunk and collect the events it completes
    pub fn push(&mut self, chunk: &str) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        self.buffer.push_str(chunk);

        loop {
            let tag = self.awaited_tag();
            if let Some(pos) = self.buffer.find(tag) {
                let rest = self.buffer.split_off(pos + tag.len());
                self.buffer.truncate(pos);
                let before = std::mem::replace(&mut self.buffer, rest);
                self.emit_text(&mut events, before);
                events.push(self.switch_channel());
                continue;
            }

            let held = partial_tag_suffix(&self.buffer, tag);
            let flush_len = self.buffer.len() - held;
            let text: String = self.buffer.drain(..flush_len).collect();
            self.emit_text(&mut events, text);
            return events;
        }
    }

    /// End of input: flush whatever is still buffered to the current channel
    pub fn finish(mut self) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        let rest = std::mem::take(&mut self.buffer);
        self.emit_text(&mut events, rest);
        events
    }

    fn awaited_tag(&self) -> &'static str {
        match self.channel {
            Channel::Answer => THINK_OPEN,
            Channel::Thought => THINK_CLOSE,
        }
    }

    fn switch_channel(&mut self) -> StreamEvent {
        match self.channel {
            Channel::Answer => {
                self.channel = Channel::Thought;
                StreamEvent::ThinkingStarted
            }
            Channel::Thought => {
                self.channel = Channel::Answer;
                StreamEvent::ThinkingEnded
            }
        }
    }

    fn emit_text(&self, events: &mut Vec<StreamEvent>, text: String) {
        if !text.is_empty() {
            events.push(StreamEvent::text(self.channel, text));
        }
    }
}

impl Default for TagSplitter {
    fn default() -> Self {
        Self::new()
    }
}

/// Length of the longest suffix of `buffer` that is a strict prefix of `tag`.
///
/// Tags are ASCII, so a matching suffix always starts on a char boundary.
fn partial_tag_suffix(buffer: &str, tag: &str) -> usize {
    (1..tag.len())
        .rev()
        .find(|&n| buffer.ends_with(&tag[..n]))
        .unwrap_or(0)
}
