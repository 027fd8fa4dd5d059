//! Inference backend adapters.
//!
//! Concrete [`aigate_core::InferenceBackend`] implementations, chosen at
//! the composition root.

pub mod echo;
pub mod openai;
mod sse;

pub use echo::EchoBackend;
pub use openai::{OpenAiCompatBackend, OpenAiConfig};
