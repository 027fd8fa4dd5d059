//! OpenAI-style SSE decoding.
//!
//! llama-server and other OpenAI-compatible servers stream chat
//! completions as Server-Sent Events:
//!
//! ```text
//! data: {"choices":[{"delta":{"content":"Hel"}}]}
//!
//! data: [DONE]
//! ```
//!
//! This module turns that byte stream into plain text deltas.

use std::fmt::Display;

use aigate_core::{DeltaStream, InferenceError};
use bytes::{Bytes, BytesMut};
use futures_util::stream::BoxStream;
use futures_util::{Stream, StreamExt, stream};
use tracing::debug;

/// State threaded through the `unfold` stream.
struct SseState<E> {
    stream: BoxStream<'static, Result<Bytes, E>>,
    buf: BytesMut,
    /// `[DONE]` seen or the stream failed.
    done: bool,
    /// Upstream body exhausted; only buffered lines remain.
    eof: bool,
}

/// Decode an SSE byte stream into content deltas.
///
/// Empty deltas (role-only or finish chunks) are skipped. An upstream
/// body that ends without `[DONE]` simply ends the delta stream.
pub(crate) fn sse_deltas<S, E>(byte_stream: S) -> DeltaStream
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: Display + Send + 'static,
{
    let state = SseState {
        stream: byte_stream.boxed(),
        buf: BytesMut::new(),
        done: false,
        eof: false,
    };

    stream::unfold(state, |mut st| async move {
        if st.done {
            return None;
        }

        loop {
            if let Some(line_end) = find_newline(&st.buf) {
                let line = st.buf.split_to(line_end);
                let line = String::from_utf8_lossy(&line);
                let trimmed = line.trim();

                // Blank separators, comments and non-data fields.
                let Some(data) = trimmed.strip_prefix("data:") else {
                    continue;
                };
                let data = data.trim();

                if data == "[DONE]" {
                    return None;
                }

                match serde_json::from_str::<serde_json::Value>(data) {
                    Ok(event) => {
                        if let Some(error) = event.get("error") {
                            st.done = true;
                            let message = error["message"].as_str().unwrap_or("unknown error");
                            return Some((
                                Err(InferenceError::InvalidResponse(format!(
                                    "upstream stream error: {message}"
                                ))),
                                st,
                            ));
                        }

                        let content = event["choices"][0]["delta"]["content"]
                            .as_str()
                            .unwrap_or("");
                        if content.is_empty() {
                            continue;
                        }
                        return Some((Ok(content.to_string()), st));
                    }
                    Err(e) => {
                        debug!(error = %e, "Skipping undecodable SSE event");
                        continue;
                    }
                }
            }

            if st.eof {
                return None;
            }

            match st.stream.next().await {
                Some(Ok(chunk)) => st.buf.extend_from_slice(&chunk),
                Some(Err(e)) => {
                    st.done = true;
                    return Some((Err(InferenceError::Interrupted(e.to_string())), st));
                }
                None => {
                    st.eof = true;
                    if !st.buf.is_empty() {
                        st.buf.extend_from_slice(b"\n");
                    }
                }
            }
        }
    })
    .boxed()
}

/// Index just past the next `\n`, if any.
fn find_newline(buf: &BytesMut) -> Option<usize> {
    buf.iter().position(|&b| b == b'\n').map(|pos| pos + 1)
}
