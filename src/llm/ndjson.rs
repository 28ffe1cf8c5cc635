//! Newline-delimited JSON framing over a byte stream

use bytes::{Buf, BytesMut};
use futures::stream::{self, Stream, StreamExt};
use std::fmt::Display;

use super::{LlmError, LlmResult};

/// Re-frame a byte stream into complete lines.
///
/// Empty lines are skipped; a trailing line without a newline is emitted when
/// the input ends. The first transport error ends the stream.
pub fn ndjson_lines<S, B, E>(input: S) -> impl Stream<Item = LlmResult<String>>
where
    S: Stream<Item = Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
    E: Display,
{
    struct State<S> {
        input: S,
        buffer: BytesMut,
        done: bool,
    }

    let state = State {
        input,
        buffer: BytesMut::new(),
        done: false,
    };

    stream::unfold(state, |mut st| async move {
        loop {
            if let Some(pos) = st.buffer.iter().position(|b| *b == b'\n') {
                let line = st.buffer.split_to(pos);
                st.buffer.advance(1);
                match decode_line(&line) {
                    Some(result) => return Some((result, st)),
                    None => continue,
                }
            }

            if st.done {
                if st.buffer.is_empty() {
                    return None;
                }
                let line = st.buffer.split();
                match decode_line(&line) {
                    Some(result) => return Some((result, st)),
                    None => return None,
                }
            }

            match st.input.next().await {
                Some(Ok(bytes)) => st.buffer.extend_from_slice(bytes.as_ref()),
                Some(Err(e)) => {
                    st.done = true;
                    st.buffer.clear();
                    return Some((Err(LlmError::NetworkError(e.to_string())), st));
                }
                None => st.done = true,
            }
        }
    })
}

fn decode_line(line: &[u8]) -> Option<LlmResult<String>> {
    match std::str::from_utf8(line) {
        Ok(text) if text.trim().is_empty() => None,
        Ok(text) => Some(Ok(text.trim().to_string())),
        Err(e) => Some(Err(LlmError::SerializationError(e.to_string()))),
    }
}
