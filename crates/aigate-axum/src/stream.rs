//! NDJSON streaming response writer.
//!
//! Turns a backend [`DeltaStream`] into a chunked HTTP body with one JSON
//! object per line:
//!
//! ```text
//! {"delta":"Hel"}
//! {"delta":"lo"}
//! {"done":true}
//! ```
//!
//! Each delta is yielded to hyper as soon as the backend produces it. The
//! done marker is written exactly once, after the backend stream ends, and
//! nothing follows it. A backend error or an idle timeout ends the body
//! without a done marker so the caller can tell the answer was cut short.
//!
//! When the client goes away hyper drops the body, which drops the backend
//! stream and with it the in-flight upstream call.

use std::time::{Duration, Instant};

use aigate_core::{DeltaStream, StreamChunk};
use axum::body::Body;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures_util::{Stream, StreamExt, stream};
use tracing::{debug, info, warn};

/// Single-use writer for one streamed response.
pub struct NdjsonStreamWriter {
    deltas: DeltaStream,
    idle_timeout: Duration,
    request_id: String,
}

impl NdjsonStreamWriter {
    pub fn new(deltas: DeltaStream, idle_timeout: Duration) -> Self {
        Self {
            deltas,
            idle_timeout,
            request_id: String::new(),
        }
    }

    /// Tag log lines for this stream with a request id.
    #[must_use]
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = request_id.into();
        self
    }

    /// The framed body as a byte stream.
    pub fn into_body_stream(self) -> impl Stream<Item = Result<Bytes, std::io::Error>> + Send {
        let state = WriterState {
            deltas: self.deltas,
            idle_timeout: self.idle_timeout,
            guard: DisconnectGuard::new(self.request_id),
        };

        stream::unfold(state, |mut st| async move {
            if st.guard.finished {
                return None;
            }

            loop {
                match tokio::time::timeout(st.idle_timeout, st.deltas.next()).await {
                    Ok(Some(Ok(delta))) => {
                        if delta.is_empty() {
                            continue;
                        }
                        st.guard.deltas += 1;
                        return Some((frame(&StreamChunk::Delta(delta)), st));
                    }
                    Ok(None) => {
                        st.guard.finish();
                        debug!(
                            request_id = %st.guard.request_id,
                            deltas = st.guard.deltas,
                            elapsed_ms = st.guard.elapsed_ms(),
                            "Stream completed"
                        );
                        return Some((frame(&StreamChunk::Done), st));
                    }
                    Ok(Some(Err(e))) => {
                        st.guard.finish();
                        warn!(
                            request_id = %st.guard.request_id,
                            deltas = st.guard.deltas,
                            error = %e,
                            "Backend stream failed; ending response without done marker"
                        );
                        return None;
                    }
                    Err(_) => {
                        st.guard.finish();
                        warn!(
                            request_id = %st.guard.request_id,
                            deltas = st.guard.deltas,
                            idle_timeout_ms = u64::try_from(st.idle_timeout.as_millis()).unwrap_or(u64::MAX),
                            "Backend stream idle; aborting"
                        );
                        return None;
                    }
                }
            }
        })
    }
}

impl IntoResponse for NdjsonStreamWriter {
    fn into_response(self) -> Response {
        Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, "text/plain; charset=utf-8")
            .header(header::TRANSFER_ENCODING, "chunked")
            .header(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"))
            .header("x-accel-buffering", "no") // Disable nginx buffering
            .body(Body::from_stream(self.into_body_stream()))
            .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
    }
}

/// State threaded through the `unfold` stream.
struct WriterState {
    deltas: DeltaStream,
    idle_timeout: Duration,
    guard: DisconnectGuard,
}

/// Logs when a stream is dropped before it finished, i.e. the client left.
struct DisconnectGuard {
    request_id: String,
    started: Instant,
    deltas: usize,
    finished: bool,
}

impl DisconnectGuard {
    fn new(request_id: String) -> Self {
        Self {
            request_id,
            started: Instant::now(),
            deltas: 0,
            finished: false,
        }
    }

    const fn finish(&mut self) {
        self.finished = true;
    }

    fn elapsed_ms(&self) -> u64 {
        u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX)
    }
}

impl Drop for DisconnectGuard {
    fn drop(&mut self) {
        if !self.finished {
            info!(
                request_id = %self.request_id,
                deltas = self.deltas,
                elapsed_ms = self.elapsed_ms(),
                "Client disconnected mid-stream; upstream call aborted"
            );
        }
    }
}

fn frame(chunk: &StreamChunk) -> Result<Bytes, std::io::Error> {
    let mut line = serde_json::to_vec(chunk).map_err(std::io::Error::other)?;
    line.push(b'\n');
    Ok(Bytes::from(line))
}
