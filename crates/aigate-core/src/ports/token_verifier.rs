//! Identity-token verifier port.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::AuthenticatedIdentity;

/// Reasons a token failed verification.
///
/// These never reach the caller: the auth gate collapses all of them
/// into a single `Unauthorized` response and only logs the variant.
#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("token expired")]
    Expired,

    #[error("malformed token: {0}")]
    Malformed(String),

    #[error("signature mismatch")]
    InvalidSignature,

    #[error("token revoked or unknown")]
    Revoked,

    #[error("claim rejected: {0}")]
    InvalidClaims(String),

    /// The trust store could not be loaded.
    #[error("verifier unavailable: {0}")]
    Unavailable(String),
}

/// Verifies bearer credentials and produces a caller identity.
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    /// Load the trust store (keys, token tables).
    ///
    /// Called at most once successfully per [`crate::AuthGate`]; the gate
    /// guards it so repeated requests do not re-run it.
    async fn initialize(&self) -> Result<(), VerifyError> {
        Ok(())
    }

    /// Verify a bearer token, returning the identity it proves.
    async fn verify(&self, token: &str) -> Result<AuthenticatedIdentity, VerifyError>;
}
