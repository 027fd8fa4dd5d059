//! Caller identity and the rate-limit key derived from it.

use std::fmt;

use serde::Serialize;

use super::EndpointKind;

/// Verified caller identity, produced once per request by the auth gate.
///
/// Never constructed from the raw bearer token text; only a
/// [`crate::ports::TokenVerifier`] creates one.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuthenticatedIdentity {
    /// Stable subject identifier (e.g. the `sub` claim).
    pub subject_id: String,
    /// Verifier-specific claims, opaque to the gateway.
    pub raw_claims: serde_json::Value,
}

impl AuthenticatedIdentity {
    pub fn new(subject_id: impl Into<String>, raw_claims: serde_json::Value) -> Self {
        Self {
            subject_id: subject_id.into(),
            raw_claims,
        }
    }

    /// Identity with no claims beyond the subject.
    pub fn subject(subject_id: impl Into<String>) -> Self {
        Self::new(subject_id, serde_json::Value::Null)
    }
}

/// Limiter map key: `{endpoint}:{subject}:{origin}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RateLimitKey(String);

impl RateLimitKey {
    #[must_use]
    pub fn new(kind: EndpointKind, subject_id: &str, origin: &str) -> Self {
        Self(format!("{}:{subject_id}:{origin}", kind.as_str()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RateLimitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limit_key_format() {
        let key = RateLimitKey::new(EndpointKind::Vision, "user-42", "10.0.0.7");
        assert_eq!(key.as_str(), "vision:user-42:10.0.0.7");
        assert_eq!(key.to_string(), "vision:user-42:10.0.0.7");
    }
}
