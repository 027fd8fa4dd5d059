//! Port definitions (trait abstractions) for external collaborators.
//!
//! Ports define the interfaces that the gateway expects from infrastructure.
//! They contain no implementation details and use only domain types.
//!
//! # Design Rules
//!
//! - No HTTP framework or client types in any signature
//! - Verification and inference are opaque: "verify or fail", "answer or fail"
//! - Implementations must be `Send + Sync` so they can be shared via `Arc`

pub mod inference;
pub mod token_verifier;

pub use inference::{InferenceBackend, InferenceError};
pub use token_verifier::{TokenVerifier, VerifyError};
