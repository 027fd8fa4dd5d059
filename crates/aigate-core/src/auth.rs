//! Bearer-token authentication gate.
//!
//! Extracts the bearer credential from an `Authorization` header value and
//! hands it to a [`TokenVerifier`]. The verifier's trust store is loaded
//! lazily on first use behind a [`OnceCell`], so concurrent first requests
//! share one initialization and a failed one is retried by the next call.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use crate::domain::AuthenticatedIdentity;
use crate::ports::{TokenVerifier, VerifyError};

/// Why a request was not authenticated.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("missing Authorization header")]
    MissingCredentials,

    #[error("Authorization header is not a bearer credential")]
    MalformedCredentials,

    /// The verifier rejected the token. The reason is logged, not returned.
    #[error("invalid or expired token")]
    Unauthorized,

    /// The trust store could not be loaded or the verifier timed out.
    #[error("token verifier unavailable: {0}")]
    VerifierUnavailable(String),
}

/// Extract the token from an `Authorization` header value.
///
/// The scheme is matched case-insensitively; the token must be non-empty.
pub fn parse_bearer(header: Option<&str>) -> Result<&str, AuthError> {
    let header = header.ok_or(AuthError::MissingCredentials)?.trim();
    if header.is_empty() {
        return Err(AuthError::MissingCredentials);
    }

    let (scheme, token) = header
        .split_once(' ')
        .ok_or(AuthError::MalformedCredentials)?;
    let token = token.trim();

    if !scheme.eq_ignore_ascii_case("bearer") || token.is_empty() {
        return Err(AuthError::MalformedCredentials);
    }
    Ok(token)
}

/// Authentication stage of the request pipeline.
pub struct AuthGate {
    verifier: Arc<dyn TokenVerifier>,
    initialized: OnceCell<()>,
    verify_timeout: Duration,
}

impl AuthGate {
    pub fn new(verifier: Arc<dyn TokenVerifier>, verify_timeout: Duration) -> Self {
        Self {
            verifier,
            initialized: OnceCell::new(),
            verify_timeout,
        }
    }

    /// Whether the verifier's trust store has been loaded.
    pub fn is_initialized(&self) -> bool {
        self.initialized.initialized()
    }

    /// Authenticate a request from its raw `Authorization` header value.
    pub async fn authenticate(
        &self,
        authorization: Option<&str>,
    ) -> Result<AuthenticatedIdentity, AuthError> {
        let token = parse_bearer(authorization)?;

        self.initialized
            .get_or_try_init(|| async {
                match tokio::time::timeout(self.verify_timeout, self.verifier.initialize()).await {
                    Ok(Ok(())) => {
                        debug!("Token verifier initialized");
                        Ok(())
                    }
                    Ok(Err(e)) => {
                        warn!(error = %e, "Token verifier initialization failed");
                        Err(AuthError::VerifierUnavailable(e.to_string()))
                    }
                    Err(_) => {
                        warn!(timeout_ms = self.verify_timeout.as_millis(), "Token verifier initialization timed out");
                        Err(AuthError::VerifierUnavailable("initialization timed out".into()))
                    }
                }
            })
            .await?;

        match tokio::time::timeout(self.verify_timeout, self.verifier.verify(token)).await {
            Ok(Ok(identity)) => Ok(identity),
            Ok(Err(VerifyError::Unavailable(reason))) => {
                warn!(%reason, "Token verifier unavailable");
                Err(AuthError::VerifierUnavailable(reason))
            }
            Ok(Err(e)) => {
                debug!(reason = %e, "Bearer token rejected");
                Err(AuthError::Unauthorized)
            }
            Err(_) => {
                warn!(timeout_ms = self.verify_timeout.as_millis(), "Token verification timed out");
                Err(AuthError::Unauthorized)
            }
        }
    }
}

impl std::fmt::Debug for AuthGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthGate")
            .field("initialized", &self.is_initialized())
            .field("verify_timeout", &self.verify_timeout)
            .finish_non_exhaustive()
    }
}
