#![doc = include_str!("../README.md")]
#![deny(unused_crate_dependencies)]

pub mod auth;
pub mod domain;
pub mod limiter;
pub mod pipeline;
pub mod ports;
pub mod settings;
pub mod validation;

// Re-export commonly used types for convenience
pub use auth::{AuthError, AuthGate, parse_bearer};
pub use domain::{
    AuthenticatedIdentity, ChatMessage, ChatRequest, ChatRole, DeltaStream, EndpointKind,
    GatewayRequest, InferenceOutput, RateLimitKey, SpeechRequest, StreamChunk, VisionRequest,
};
pub use limiter::{RateDecision, RateLimitPolicy, RateLimits, TokenBucketLimiter};
pub use pipeline::{Admitted, Gateway, GatewayError, RequestHead};
pub use ports::{InferenceBackend, InferenceError, TokenVerifier, VerifyError};
pub use settings::{GatewaySettings, SettingsError, SettingsOverrides};
pub use validation::{BAD_REQUEST, ValidationError, validate};

// Silence unused dev-dependency warnings; async tests use #[tokio::test]
#[cfg(test)]
use tokio_test as _;
