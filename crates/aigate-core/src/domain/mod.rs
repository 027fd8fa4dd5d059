//! Core domain types for the gateway.
//!
//! These are pure data types with no transport dependencies. The wire
//! representation (camelCase JSON) is expressed through serde attributes.

mod identity;
mod request;
mod stream;

pub use identity::{AuthenticatedIdentity, RateLimitKey};
pub use request::{
    ChatMessage, ChatRequest, ChatRole, EndpointKind, GatewayRequest, SpeechRequest,
    VisionRequest,
};
pub use stream::{DeltaStream, InferenceOutput, StreamChunk};
