//! Gateway settings and validation.
//!
//! Pure data: the binary decides where values come from (file, env, flags)
//! and merges them into a [`GatewaySettings`] before validating it.

use std::net::SocketAddr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::limiter::RateLimits;

/// Default listen address.
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8787";

/// Default mount point for the AI endpoints.
pub const DEFAULT_ROUTE_PREFIX: &str = "/ai";

/// Default request body ceiling (10 MiB).
pub const DEFAULT_MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Gateway settings.
///
/// Missing fields in a config file fall back to [`GatewaySettings::with_defaults`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewaySettings {
    /// Socket address to listen on.
    pub bind_addr: String,

    /// Path prefix for the AI routes (`""` mounts them at the root).
    pub route_prefix: String,

    /// Per-endpoint token bucket policies.
    pub rate_limits: RateLimits,

    /// Upper bound on tracked rate-limit buckets.
    pub max_buckets: usize,

    /// Idle time after which a bucket is forgotten.
    pub bucket_ttl_secs: u64,

    /// How often idle buckets are swept.
    pub cleanup_interval_secs: u64,

    /// Bound on trust-store loading and on each token verification.
    pub verify_timeout_ms: u64,

    /// Bound on a buffered inference call, or on the first response of a stream.
    pub inference_timeout_ms: u64,

    /// Longest allowed gap between two streamed deltas.
    pub stream_idle_timeout_ms: u64,

    /// Request bodies above this size are rejected with 413.
    pub max_body_bytes: usize,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl GatewaySettings {
    /// Create settings with production defaults.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            route_prefix: DEFAULT_ROUTE_PREFIX.to_string(),
            rate_limits: RateLimits::default(),
            max_buckets: 100_000,
            bucket_ttl_secs: 600,
            cleanup_interval_secs: 60,
            verify_timeout_ms: 5_000,
            inference_timeout_ms: 60_000,
            stream_idle_timeout_ms: 30_000,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }

    #[must_use]
    pub const fn bucket_ttl(&self) -> Duration {
        Duration::from_secs(self.bucket_ttl_secs)
    }

    #[must_use]
    pub const fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }

    #[must_use]
    pub const fn verify_timeout(&self) -> Duration {
        Duration::from_millis(self.verify_timeout_ms)
    }

    #[must_use]
    pub const fn inference_timeout(&self) -> Duration {
        Duration::from_millis(self.inference_timeout_ms)
    }

    #[must_use]
    pub const fn stream_idle_timeout(&self) -> Duration {
        Duration::from_millis(self.stream_idle_timeout_ms)
    }

    /// Parsed listen address. Call [`Self::validate`] first.
    pub fn socket_addr(&self) -> Result<SocketAddr, SettingsError> {
        self.bind_addr
            .parse()
            .map_err(|_| SettingsError::InvalidBindAddr(self.bind_addr.clone()))
    }

    /// Apply overrides, only touching fields that are `Some`.
    pub fn merge(&mut self, overrides: &SettingsOverrides) {
        if let Some(ref addr) = overrides.bind_addr {
            self.bind_addr.clone_from(addr);
        }
        if let Some(ref prefix) = overrides.route_prefix {
            self.route_prefix.clone_from(prefix);
        }
        if let Some(max) = overrides.max_buckets {
            self.max_buckets = max;
        }
        if let Some(ttl) = overrides.bucket_ttl_secs {
            self.bucket_ttl_secs = ttl;
        }
        if let Some(ms) = overrides.verify_timeout_ms {
            self.verify_timeout_ms = ms;
        }
        if let Some(ms) = overrides.inference_timeout_ms {
            self.inference_timeout_ms = ms;
        }
        if let Some(ms) = overrides.stream_idle_timeout_ms {
            self.stream_idle_timeout_ms = ms;
        }
        if let Some(bytes) = overrides.max_body_bytes {
            self.max_body_bytes = bytes;
        }
    }

    /// Validate settings values.
    pub fn validate(&self) -> Result<(), SettingsError> {
        self.socket_addr()?;

        let prefix = self.route_prefix.as_str();
        if !prefix.is_empty() && (!prefix.starts_with('/') || prefix.ends_with('/')) {
            return Err(SettingsError::InvalidRoutePrefix(prefix.to_string()));
        }

        for (endpoint, policy) in [
            ("chat", self.rate_limits.chat),
            ("vision", self.rate_limits.vision),
            ("speech", self.rate_limits.speech),
        ] {
            if !policy.is_valid() {
                return Err(SettingsError::InvalidRateLimit {
                    endpoint,
                    capacity: policy.capacity,
                    refill_per_second: policy.refill_per_second,
                });
            }
        }

        for (field, value) in [
            ("max_buckets", self.max_buckets as u64),
            ("bucket_ttl_secs", self.bucket_ttl_secs),
            ("cleanup_interval_secs", self.cleanup_interval_secs),
            ("verify_timeout_ms", self.verify_timeout_ms),
            ("inference_timeout_ms", self.inference_timeout_ms),
            ("stream_idle_timeout_ms", self.stream_idle_timeout_ms),
            ("max_body_bytes", self.max_body_bytes as u64),
        ] {
            if value == 0 {
                return Err(SettingsError::Zero(field));
            }
        }

        Ok(())
    }
}

/// Partial settings, as collected from environment variables and flags.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SettingsOverrides {
    pub bind_addr: Option<String>,
    pub route_prefix: Option<String>,
    pub max_buckets: Option<usize>,
    pub bucket_ttl_secs: Option<u64>,
    pub verify_timeout_ms: Option<u64>,
    pub inference_timeout_ms: Option<u64>,
    pub stream_idle_timeout_ms: Option<u64>,
    pub max_body_bytes: Option<usize>,
}

/// Settings validation error.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SettingsError {
    #[error("Bind address must be host:port, got {0:?}")]
    InvalidBindAddr(String),

    #[error("Route prefix must be empty or start (and not end) with '/', got {0:?}")]
    InvalidRoutePrefix(String),

    #[error(
        "Rate limit for {endpoint} needs a positive capacity and refill rate, got {capacity}/{refill_per_second}"
    )]
    InvalidRateLimit {
        endpoint: &'static str,
        capacity: f64,
        refill_per_second: f64,
    },

    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}
