//! Inference backend port.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{GatewayRequest, InferenceOutput};

/// Errors raised by an inference backend.
///
/// All of them surface to the caller as a generic 500; the detail is logged.
#[derive(Debug, Error)]
pub enum InferenceError {
    /// Could not reach the upstream provider.
    #[error("upstream unreachable: {0}")]
    Connect(String),

    /// Upstream answered with a non-success status.
    #[error("upstream returned {status}: {body}")]
    Status { status: u16, body: String },

    /// Upstream answered with something we could not interpret.
    #[error("invalid upstream response: {0}")]
    InvalidResponse(String),

    /// The request could not be turned into an upstream call.
    #[error("unsupported request: {0}")]
    Unsupported(String),

    /// The stream broke after it had started.
    #[error("stream interrupted: {0}")]
    Interrupted(String),
}

/// Black-box model provider behind the gateway.
#[async_trait]
pub trait InferenceBackend: Send + Sync {
    /// Run a validated request.
    ///
    /// `stream` is true when the caller asked for incremental output and
    /// the endpoint supports it. Backends may still return a complete
    /// result (or a stream when `stream` is false); the gateway adapts
    /// either to the caller's mode.
    async fn invoke(
        &self,
        request: &GatewayRequest,
        stream: bool,
    ) -> Result<InferenceOutput, InferenceError>;
}
