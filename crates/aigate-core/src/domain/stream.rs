//! Inference output and streaming chunk types.

use std::fmt;
use std::pin::Pin;

use futures_util::Stream;
use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::ports::InferenceError;

/// Incremental text fragments produced by an inference backend.
pub type DeltaStream = Pin<Box<dyn Stream<Item = Result<String, InferenceError>> + Send>>;

/// What an inference backend hands back: a complete result or a stream of deltas.
pub enum InferenceOutput {
    /// Full text result (assistant message, vision result or transcript).
    Complete(String),
    /// Incremental text fragments, in emission order.
    Stream(DeltaStream),
}

impl fmt::Debug for InferenceOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Complete(text) => f.debug_tuple("Complete").field(text).finish(),
            Self::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

/// One line of a streamed response.
///
/// Serializes to exactly `{"delta":"..."}` or `{"done":true}`. The done
/// marker is always the last chunk of a stream and appears once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamChunk {
    Delta(String),
    Done,
}

impl StreamChunk {
    pub fn delta(text: impl Into<String>) -> Self {
        Self::Delta(text.into())
    }

    #[must_use]
    pub const fn is_done(&self) -> bool {
        matches!(self, Self::Done)
    }
}

impl Serialize for StreamChunk {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        match self {
            Self::Delta(text) => map.serialize_entry("delta", text)?,
            Self::Done => map.serialize_entry("done", &true)?,
        }
        map.end()
    }
}
