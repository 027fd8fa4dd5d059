//! Axum server bootstrap - the composition root.
//!
//! This module is the ONLY place where concrete adapters (verifiers,
//! backends, the limiter store) are instantiated and wired into a
//! [`Gateway`].

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use aigate_core::{
    AuthGate, Gateway, GatewaySettings, InferenceBackend, TokenBucketLimiter, TokenVerifier,
};
use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::backend::{EchoBackend, OpenAiCompatBackend, OpenAiConfig};
use crate::routes::create_router;
use crate::verifiers::{JwtConfig, JwtVerifier, StaticTokenVerifier};

/// Which inference backend to run.
#[derive(Debug, Clone)]
pub enum BackendConfig {
    /// Deterministic local backend, no upstream.
    Echo { word_delay: Duration },
    /// OpenAI-compatible HTTP upstream.
    OpenAi(OpenAiConfig),
}

/// Which token verifier guards the endpoints.
#[derive(Debug, Clone)]
pub enum VerifierConfig {
    Static {
        tokens: Vec<(String, String)>,
        token_file: Option<PathBuf>,
    },
    Jwt(JwtConfig),
}

/// Everything needed to build and run a gateway.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub settings: GatewaySettings,
    pub backend: BackendConfig,
    pub verifier: VerifierConfig,
}

/// Application context for the Axum adapter.
pub struct GatewayContext {
    pub gateway: Gateway,
    pub settings: GatewaySettings,
}

impl GatewayContext {
    /// Wire a context from already-built collaborators.
    pub fn new(
        settings: GatewaySettings,
        verifier: Arc<dyn TokenVerifier>,
        backend: Arc<dyn InferenceBackend>,
    ) -> Self {
        let limiter = Arc::new(TokenBucketLimiter::with_bounds(
            settings.max_buckets,
            settings.bucket_ttl(),
        ));
        let gateway = Gateway::new(
            AuthGate::new(verifier, settings.verify_timeout()),
            limiter,
            settings.rate_limits,
            backend,
            settings.inference_timeout(),
        );
        Self { gateway, settings }
    }
}

fn build_verifier(config: VerifierConfig) -> Arc<dyn TokenVerifier> {
    match config {
        VerifierConfig::Static { tokens, token_file } => {
            let verifier = StaticTokenVerifier::new(tokens);
            match token_file {
                Some(path) => Arc::new(verifier.with_token_file(path)),
                None => Arc::new(verifier),
            }
        }
        VerifierConfig::Jwt(config) => Arc::new(JwtVerifier::new(config)),
    }
}

/// Remote media gets the same ceiling as an inline request body.
fn build_backend(
    config: BackendConfig,
    max_media_bytes: usize,
) -> Result<Arc<dyn InferenceBackend>> {
    Ok(match config {
        BackendConfig::Echo { word_delay } => {
            Arc::new(EchoBackend::new().with_word_delay(word_delay))
        }
        BackendConfig::OpenAi(mut config) => {
            config.max_media_bytes = max_media_bytes;
            info!(
                upstream = %config.base_url,
                max_media_bytes,
                "Using OpenAI-compatible backend"
            );
            Arc::new(OpenAiCompatBackend::new(config).context("Failed to build upstream client")?)
        }
    })
}

/// Bootstrap the gateway context from configuration.
///
/// Settings are validated here; the verifier's trust store is not loaded
/// until the first authenticated request.
pub fn bootstrap(config: ServerConfig) -> Result<GatewayContext> {
    config.settings.validate().context("Invalid gateway settings")?;

    let verifier = build_verifier(config.verifier);
    let backend = build_backend(config.backend, config.settings.max_body_bytes)?;
    Ok(GatewayContext::new(config.settings, verifier, backend))
}

/// React to the result of waiting for Ctrl-C.
///
/// Only a received signal cancels `shutdown`; if the handler could not be
/// installed the server keeps running.
pub fn handle_shutdown_signal(result: std::io::Result<()>, shutdown: &CancellationToken) {
    match result {
        Ok(()) => {
            info!("Shutdown signal received");
            shutdown.cancel();
        }
        Err(e) => warn!(error = %e, "Failed to listen for ctrl-c; continuing without it"),
    }
}

/// Start the HTTP server and run until `shutdown` is cancelled.
pub async fn start_server(config: ServerConfig, shutdown: CancellationToken) -> Result<()> {
    let addr = config.settings.socket_addr()?;
    let ctx = bootstrap(config)?;

    let cleanup = ctx
        .gateway
        .limiter()
        .spawn_cleanup_task(ctx.settings.cleanup_interval(), shutdown.child_token());

    info!(
        prefix = %ctx.settings.route_prefix,
        max_body_bytes = ctx.settings.max_body_bytes,
        "Gateway configured"
    );
    let app = create_router(ctx);

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!("aigate listening on http://{}", listener.local_addr()?);

    let signal = shutdown.clone();
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move { signal.cancelled().await })
    .await
    .context("Server error")?;

    shutdown.cancel();
    cleanup.await.ok();
    info!("aigate stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_cancels_shutdown() {
        let shutdown = CancellationToken::new();
        handle_shutdown_signal(Ok(()), &shutdown);
        assert!(shutdown.is_cancelled());
    }

    #[test]
    fn test_failed_signal_handler_keeps_serving() {
        let shutdown = CancellationToken::new();
        handle_shutdown_signal(Err(std::io::Error::other("no signal support")), &shutdown);
        assert!(!shutdown.is_cancelled());
    }
}
