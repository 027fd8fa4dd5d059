//! Shared fixtures for aigate-axum integration tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use aigate_axum::bootstrap::GatewayContext;
use aigate_axum::routes::create_router;
use aigate_axum::verifiers::StaticTokenVerifier;
use aigate_core::{
    GatewayRequest, GatewaySettings, InferenceBackend, InferenceError, InferenceOutput,
    RateLimitPolicy, TokenBucketLimiter,
};
use async_trait::async_trait;
use axum::Router;
use futures_util::{StreamExt, stream};

/// Bearer token accepted by the test verifier, mapped to subject `alice`.
pub const TOKEN: &str = "test-token";

/// Backend with canned replies that counts how often it was called.
#[derive(Default)]
pub struct ScriptedBackend {
    pub calls: AtomicUsize,
    pub fail: bool,
    pub fail_stream: bool,
}

impl ScriptedBackend {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// Streams that break before producing any text.
    pub fn failing_stream() -> Self {
        Self {
            fail_stream: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl InferenceBackend for ScriptedBackend {
    async fn invoke(
        &self,
        request: &GatewayRequest,
        stream: bool,
    ) -> Result<InferenceOutput, InferenceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(InferenceError::Connect("connection refused to 10.0.0.7".into()));
        }

        if self.fail_stream && stream {
            return Ok(InferenceOutput::Stream(
                stream::iter([Err::<String, _>(InferenceError::Interrupted(
                    "upstream closed before first token".into(),
                ))])
                .boxed(),
            ));
        }

        Ok(match request {
            GatewayRequest::Chat(_) if stream => InferenceOutput::Stream(
                stream::iter(["Hel", "", "lo"].map(|d| Ok(d.to_string()))).boxed(),
            ),
            GatewayRequest::Chat(_) => InferenceOutput::Complete("Hello".into()),
            GatewayRequest::Vision(_) => InferenceOutput::Complete("a red bicycle".into()),
            GatewayRequest::Speech(_) => InferenceOutput::Complete("hello world".into()),
        })
    }
}

/// Settings with small, deterministic limits.
pub fn test_settings() -> GatewaySettings {
    let mut settings = GatewaySettings::with_defaults();
    settings.rate_limits.chat = RateLimitPolicy::new(2.0, 0.001);
    settings.max_body_bytes = 1024;
    settings
}

pub fn router_with(settings: GatewaySettings, backend: Arc<ScriptedBackend>) -> Router {
    router_and_limiter(settings, backend).0
}

/// Router plus a handle on its limiter, for inspecting bucket state.
pub fn router_and_limiter(
    settings: GatewaySettings,
    backend: Arc<ScriptedBackend>,
) -> (Router, Arc<TokenBucketLimiter>) {
    let verifier = Arc::new(StaticTokenVerifier::new([(
        TOKEN.to_string(),
        "alice".to_string(),
    )]));
    let ctx = GatewayContext::new(settings, verifier, backend);
    let limiter = Arc::clone(ctx.gateway.limiter());
    (create_router(ctx), limiter)
}

pub fn test_router() -> (Router, Arc<ScriptedBackend>) {
    let backend = Arc::new(ScriptedBackend::default());
    (router_with(test_settings(), Arc::clone(&backend)), backend)
}
