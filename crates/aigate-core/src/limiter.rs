//! Token bucket rate limiter.
//!
//! Buckets refill continuously (not on discrete ticks) and are created
//! lazily per key. The store is an owned object injected into the
//! pipeline, so tests and alternative stores never share global state.
//!
//! Each key's bucket is mutated under its `DashMap` shard lock, which keeps
//! `0 <= tokens <= capacity` under concurrent access to the same key.
//! Growth is bounded: idle buckets expire after a TTL and, when the store is
//! full, an approximately least recently used bucket is evicted to admit a
//! new key. Admission at capacity sweeps idle buckets at most once per
//! [`SWEEP_INTERVAL`] and picks the eviction victim from a bounded sample,
//! so a flood of new keys never costs a full scan per request.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::domain::EndpointKind;

/// Minimum time between idle sweeps triggered by a full store.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// Buckets inspected when choosing an eviction victim.
const EVICTION_SAMPLE: usize = 32;

/// Capacity and refill rate for one class of requests.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RateLimitPolicy {
    /// Maximum tokens a bucket can hold (burst size).
    pub capacity: f64,
    /// Tokens added per second of elapsed time.
    pub refill_per_second: f64,
}

impl RateLimitPolicy {
    #[must_use]
    pub const fn new(capacity: f64, refill_per_second: f64) -> Self {
        Self {
            capacity,
            refill_per_second,
        }
    }

    /// Both parameters must be finite and strictly positive.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.capacity.is_finite()
            && self.capacity > 0.0
            && self.refill_per_second.is_finite()
            && self.refill_per_second > 0.0
    }
}

/// Per-endpoint rate-limit policies.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimits {
    pub chat: RateLimitPolicy,
    pub vision: RateLimitPolicy,
    pub speech: RateLimitPolicy,
}

impl RateLimits {
    #[must_use]
    pub const fn for_kind(&self, kind: EndpointKind) -> RateLimitPolicy {
        match kind {
            EndpointKind::Chat => self.chat,
            EndpointKind::Vision => self.vision,
            EndpointKind::Speech => self.speech,
        }
    }
}

impl Default for RateLimits {
    fn default() -> Self {
        Self {
            chat: RateLimitPolicy::new(10.0, 0.5),
            vision: RateLimitPolicy::new(5.0, 0.2),
            speech: RateLimitPolicy::new(5.0, 0.2),
        }
    }
}

/// Outcome of a rate-limit check.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RateDecision {
    Allowed,
    /// Rejected; `retry_after` is the time until one token is available.
    Limited { retry_after: Duration },
}

impl RateDecision {
    #[must_use]
    pub const fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }
}

#[derive(Debug, Clone)]
struct TokenBucket {
    tokens: f64,
    last_refill: Instant,
    last_access: Instant,
}

impl TokenBucket {
    const fn full(capacity: f64, now: Instant) -> Self {
        Self {
            tokens: capacity,
            last_refill: now,
            last_access: now,
        }
    }

    /// Refill for the elapsed time, then try to take one token.
    ///
    /// `last_refill` advances on every call, allowed or not, so elapsed
    /// time is never counted twice.
    fn refill_and_consume(&mut self, policy: RateLimitPolicy, now: Instant) -> RateDecision {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * policy.refill_per_second).min(policy.capacity);
        self.last_refill = self.last_refill.max(now);
        self.last_access = self.last_access.max(now);

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            RateDecision::Allowed
        } else {
            let wait = (1.0 - self.tokens) / policy.refill_per_second;
            RateDecision::Limited {
                retry_after: Duration::try_from_secs_f64(wait).unwrap_or(Duration::MAX),
            }
        }
    }
}

/// In-memory token bucket store keyed by arbitrary strings.
#[derive(Debug)]
pub struct TokenBucketLimiter {
    buckets: DashMap<String, TokenBucket>,
    max_buckets: usize,
    bucket_ttl: Duration,
    last_sweep: Mutex<Option<Instant>>,
}

impl Default for TokenBucketLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenBucketLimiter {
    pub const DEFAULT_MAX_BUCKETS: usize = 100_000;
    pub const DEFAULT_BUCKET_TTL: Duration = Duration::from_secs(600);

    #[must_use]
    pub fn new() -> Self {
        Self::with_bounds(Self::DEFAULT_MAX_BUCKETS, Self::DEFAULT_BUCKET_TTL)
    }

    /// Store holding at most `max_buckets` keys, expiring buckets idle for `bucket_ttl`.
    #[must_use]
    pub fn with_bounds(max_buckets: usize, bucket_ttl: Duration) -> Self {
        Self {
            buckets: DashMap::new(),
            max_buckets: max_buckets.max(1),
            bucket_ttl,
            last_sweep: Mutex::new(None),
        }
    }

    /// Take one token for `key` if available.
    ///
    /// Always mutates the stored bucket, whether or not the call is allowed.
    pub fn try_consume(&self, key: &str, capacity: f64, refill_per_second: f64) -> bool {
        self.check(key, RateLimitPolicy::new(capacity, refill_per_second))
            .is_allowed()
    }

    /// Like [`Self::try_consume`] but reports how long to wait when limited.
    pub fn check(&self, key: &str, policy: RateLimitPolicy) -> RateDecision {
        self.check_at(key, policy, Instant::now())
    }

    /// Check against an explicit clock reading.
    pub fn check_at(&self, key: &str, policy: RateLimitPolicy, now: Instant) -> RateDecision {
        if let Some(mut bucket) = self.buckets.get_mut(key) {
            return bucket.refill_and_consume(policy, now);
        }

        if self.buckets.len() >= self.max_buckets {
            self.make_room(now);
        }

        let mut bucket = self
            .buckets
            .entry(key.to_owned())
            .or_insert_with(|| TokenBucket::full(policy.capacity, now));
        bucket.refill_and_consume(policy, now)
    }

    /// Remove buckets idle for longer than the TTL. Returns how many were removed.
    pub fn cleanup_idle(&self) -> usize {
        self.cleanup_idle_at(Instant::now())
    }

    fn cleanup_idle_at(&self, now: Instant) -> usize {
        let before = self.buckets.len();
        let ttl = self.bucket_ttl;
        self.buckets
            .retain(|_, bucket| now.saturating_duration_since(bucket.last_access) < ttl);
        before.saturating_sub(self.buckets.len())
    }

    /// Free a slot for a new key: drop idle buckets, else the oldest sampled one.
    fn make_room(&self, now: Instant) {
        if self.sweep_if_due(now).is_some_and(|removed| removed > 0)
            && self.buckets.len() < self.max_buckets
        {
            return;
        }

        let oldest = self
            .buckets
            .iter()
            .take(EVICTION_SAMPLE)
            .min_by_key(|entry| entry.value().last_access)
            .map(|entry| entry.key().clone());

        if let Some(key) = oldest {
            self.buckets.remove(&key);
            debug!(key = %key, "Evicted least recently used rate-limit bucket");
        }
    }

    /// Expire idle buckets unless a sweep ran within [`SWEEP_INTERVAL`].
    ///
    /// Returns `None` when skipped, including while another thread is sweeping.
    fn sweep_if_due(&self, now: Instant) -> Option<usize> {
        let mut last = self.last_sweep.try_lock().ok()?;
        if last.is_some_and(|at| now.saturating_duration_since(at) < SWEEP_INTERVAL) {
            return None;
        }
        *last = Some(now);
        drop(last);
        Some(self.cleanup_idle_at(now))
    }

    /// Periodically expire idle buckets until `cancel` fires.
    pub fn spawn_cleanup_task(
        self: &Arc<Self>,
        every: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let limiter = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    _ = interval.tick() => {
                        let removed = limiter.cleanup_idle();
                        if removed > 0 {
                            debug!(
                                removed,
                                remaining = limiter.bucket_count(),
                                "Expired idle rate-limit buckets"
                            );
                        }
                    }
                }
            }
        })
    }

    #[must_use]
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// Stored token count for `key`, without refilling. `None` if the key was never used.
    #[must_use]
    pub fn tokens(&self, key: &str) -> Option<f64> {
        self.buckets.get(key).map(|bucket| bucket.tokens)
    }
}
