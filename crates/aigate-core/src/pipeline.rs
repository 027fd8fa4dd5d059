//! Request admission and dispatch.
//!
//! Every endpoint runs the same ordered stages, stopping at the first
//! failure:
//!
//! 1. method check (POST only)
//! 2. authentication
//! 3. rate limiting, keyed by `{endpoint}:{subject}:{origin}`
//! 4. body validation
//! 5. inference
//!
//! The body is only read once the caller is authenticated and within its
//! budget, so rejected callers never cost a body read or a JSON parse.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{StreamExt, TryStreamExt, stream};
use thiserror::Error;
use tracing::{error, info};

use crate::auth::{AuthError, AuthGate};
use crate::domain::{
    AuthenticatedIdentity, DeltaStream, EndpointKind, GatewayRequest, InferenceOutput,
    RateLimitKey,
};
use crate::limiter::{RateDecision, RateLimits, TokenBucketLimiter};
use crate::ports::{InferenceBackend, InferenceError};
use crate::validation::{ValidationError, validate};

/// Terminal outcome of a rejected or failed request.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("method not allowed")]
    MethodNotAllowed,

    #[error("unauthorized")]
    Unauthorized,

    #[error("rate limit exceeded, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    #[error(transparent)]
    ValidationFailed(#[from] ValidationError),

    #[error("request body exceeds {limit} bytes")]
    PayloadTooLarge { limit: usize },

    /// Detail is for logs only; callers get a generic message.
    #[error("upstream failure: {0}")]
    UpstreamFailure(String),
}

impl GatewayError {
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::MethodNotAllowed => 405,
            Self::Unauthorized => 401,
            Self::RateLimited { .. } => 429,
            Self::ValidationFailed(_) => 400,
            Self::PayloadTooLarge { .. } => 413,
            Self::UpstreamFailure(_) => 500,
        }
    }

    /// `Retry-After` value in whole seconds, rounded up and at least 1.
    #[must_use]
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            Self::RateLimited { retry_after } => {
                let secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
                Some(secs.max(1))
            }
            _ => None,
        }
    }
}

impl From<AuthError> for GatewayError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::MissingCredentials
            | AuthError::MalformedCredentials
            | AuthError::Unauthorized => Self::Unauthorized,
            AuthError::VerifierUnavailable(reason) => Self::UpstreamFailure(reason),
        }
    }
}

/// Transport-neutral view of the request line and headers.
#[derive(Debug, Clone, Copy)]
pub struct RequestHead<'a> {
    pub method: &'a str,
    /// Raw `Authorization` header value.
    pub authorization: Option<&'a str>,
    /// Resolved caller origin (client address or `unknown`).
    pub origin: &'a str,
}

/// A request that passed every admission stage.
#[derive(Debug, Clone)]
pub struct Admitted {
    pub identity: AuthenticatedIdentity,
    pub request: GatewayRequest,
    /// Effective response mode: requested and supported by the endpoint.
    pub stream: bool,
}

/// The request pipeline shared by all endpoints.
pub struct Gateway {
    auth: AuthGate,
    limiter: Arc<TokenBucketLimiter>,
    limits: RateLimits,
    backend: Arc<dyn InferenceBackend>,
    inference_timeout: Duration,
}

impl Gateway {
    pub fn new(
        auth: AuthGate,
        limiter: Arc<TokenBucketLimiter>,
        limits: RateLimits,
        backend: Arc<dyn InferenceBackend>,
        inference_timeout: Duration,
    ) -> Self {
        Self {
            auth,
            limiter,
            limits,
            backend,
            inference_timeout,
        }
    }

    #[must_use]
    pub const fn limiter(&self) -> &Arc<TokenBucketLimiter> {
        &self.limiter
    }

    #[must_use]
    pub const fn limits(&self) -> &RateLimits {
        &self.limits
    }

    /// Run the admission stages for one request.
    ///
    /// `body` is awaited only after the caller is authenticated and has
    /// been granted a token.
    pub async fn admit<F, B>(
        &self,
        kind: EndpointKind,
        head: RequestHead<'_>,
        body: F,
    ) -> Result<Admitted, GatewayError>
    where
        F: Future<Output = Result<B, GatewayError>>,
        B: AsRef<[u8]>,
    {
        if !head.method.eq_ignore_ascii_case("POST") {
            return Err(GatewayError::MethodNotAllowed);
        }

        let identity = self.auth.authenticate(head.authorization).await?;

        let key = RateLimitKey::new(kind, &identity.subject_id, head.origin);
        if let RateDecision::Limited { retry_after } =
            self.limiter.check(key.as_str(), self.limits.for_kind(kind))
        {
            info!(
                key = %key,
                retry_after_ms = u64::try_from(retry_after.as_millis()).unwrap_or(u64::MAX),
                "Rate limit exceeded"
            );
            return Err(GatewayError::RateLimited { retry_after });
        }

        let raw = body.await?;
        let request = validate(kind, raw.as_ref())?;
        let stream = request.wants_stream() && kind.supports_streaming();

        Ok(Admitted {
            identity,
            request,
            stream,
        })
    }

    /// Invoke the backend for an admitted request.
    ///
    /// The result always matches `admitted.stream`: a stream handed back
    /// for a buffered request is collected, and a complete result for a
    /// streaming request becomes a single delta. A stream is only returned
    /// once its first non-empty delta has arrived, so a backend that fails
    /// before producing output is reported here instead of after the
    /// response is committed. The timeout bounds the time to a buffered
    /// result, or to the first delta of a stream.
    pub async fn dispatch(&self, admitted: &Admitted) -> Result<InferenceOutput, GatewayError> {
        let kind = admitted.request.kind();
        let streaming = admitted.stream;

        let work = async {
            let output = self.backend.invoke(&admitted.request, streaming).await?;
            Ok::<_, InferenceError>(match (output, streaming) {
                (InferenceOutput::Stream(deltas), false) => {
                    InferenceOutput::Complete(deltas.try_collect::<String>().await?)
                }
                (InferenceOutput::Stream(deltas), true) => {
                    InferenceOutput::Stream(prime(deltas).await?)
                }
                (InferenceOutput::Complete(text), true) => InferenceOutput::Stream(
                    stream::once(async move { Ok::<_, InferenceError>(text) }).boxed(),
                ),
                (output @ InferenceOutput::Complete(_), false) => output,
            })
        };

        match tokio::time::timeout(self.inference_timeout, work).await {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(e)) => {
                error!(endpoint = %kind, error = %e, "Inference backend failed");
                Err(GatewayError::UpstreamFailure(e.to_string()))
            }
            Err(_) => {
                error!(
                    endpoint = %kind,
                    timeout_ms = u64::try_from(self.inference_timeout.as_millis()).unwrap_or(u64::MAX),
                    "Inference backend timed out"
                );
                Err(GatewayError::UpstreamFailure("inference timed out".into()))
            }
        }
    }
}

/// Wait for the first non-empty delta and put it back in front.
///
/// An error before any output fails the whole call. A stream that ends
/// without output stays empty.
async fn prime(mut deltas: DeltaStream) -> Result<DeltaStream, InferenceError> {
    loop {
        match deltas.next().await {
            Some(Ok(delta)) if delta.is_empty() => {}
            Some(Ok(delta)) => {
                return Ok(stream::once(async move { Ok(delta) }).chain(deltas).boxed());
            }
            Some(Err(e)) => return Err(e),
            None => return Ok(stream::empty().boxed()),
        }
    }
}

impl std::fmt::Debug for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateway")
            .field("auth", &self.auth)
            .field("limits", &self.limits)
            .field("buckets", &self.limiter.bucket_count())
            .field("inference_timeout", &self.inference_timeout)
            .finish_non_exhaustive()
    }
}
