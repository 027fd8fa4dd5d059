//! HS256 JWT verifier.
//!
//! The signing secret is loaded on first use, either inline or from a file,
//! so a missing secret file surfaces as a verifier outage rather than a
//! startup failure. Tokens must carry `exp` and `sub`; `iss` and `aud` are
//! checked when configured.

use std::path::PathBuf;

use aigate_core::{AuthenticatedIdentity, TokenVerifier, VerifyError};
use async_trait::async_trait;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use tokio::sync::OnceCell;
use tracing::info;

/// Where the HMAC secret lives.
#[derive(Debug, Clone)]
pub enum JwtSecret {
    Inline(String),
    File(PathBuf),
}

#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub secret: JwtSecret,
    pub issuer: Option<String>,
    pub audience: Option<String>,
}

pub struct JwtVerifier {
    config: JwtConfig,
    key: OnceCell<DecodingKey>,
}

impl JwtVerifier {
    pub fn new(config: JwtConfig) -> Self {
        Self {
            config,
            key: OnceCell::new(),
        }
    }

    fn validation(&self) -> Validation {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_required_spec_claims(&["exp", "sub"]);
        if let Some(issuer) = &self.config.issuer {
            validation.set_issuer(&[issuer]);
        }
        match &self.config.audience {
            Some(audience) => validation.set_audience(&[audience]),
            None => validation.validate_aud = false,
        }
        validation
    }
}

fn map_jwt_error(err: &jsonwebtoken::errors::Error) -> VerifyError {
    match err.kind() {
        ErrorKind::ExpiredSignature => VerifyError::Expired,
        ErrorKind::InvalidSignature => VerifyError::InvalidSignature,
        ErrorKind::InvalidIssuer
        | ErrorKind::InvalidAudience
        | ErrorKind::InvalidSubject
        | ErrorKind::ImmatureSignature
        | ErrorKind::MissingRequiredClaim(_) => VerifyError::InvalidClaims(err.to_string()),
        _ => VerifyError::Malformed(err.to_string()),
    }
}

#[async_trait]
impl TokenVerifier for JwtVerifier {
    async fn initialize(&self) -> Result<(), VerifyError> {
        let secret = match &self.config.secret {
            JwtSecret::Inline(secret) => secret.clone(),
            JwtSecret::File(path) => tokio::fs::read_to_string(path)
                .await
                .map_err(|e| {
                    VerifyError::Unavailable(format!("cannot read {}: {e}", path.display()))
                })?
                .trim()
                .to_string(),
        };

        if secret.is_empty() {
            return Err(VerifyError::Unavailable("JWT secret is empty".into()));
        }

        let _ = self.key.set(DecodingKey::from_secret(secret.as_bytes()));
        info!(
            issuer = self.config.issuer.as_deref().unwrap_or("-"),
            audience = self.config.audience.as_deref().unwrap_or("-"),
            "JWT verifier ready"
        );
        Ok(())
    }

    async fn verify(&self, token: &str) -> Result<AuthenticatedIdentity, VerifyError> {
        let key = self
            .key
            .get()
            .ok_or_else(|| VerifyError::Unavailable("JWT secret not loaded".into()))?;

        let data = jsonwebtoken::decode::<serde_json::Value>(token, key, &self.validation())
            .map_err(|e| map_jwt_error(&e))?;

        let subject = data.claims["sub"]
            .as_str()
            .filter(|sub| !sub.is_empty())
            .ok_or_else(|| VerifyError::InvalidClaims("sub must be a non-empty string".into()))?
            .to_string();

        Ok(AuthenticatedIdentity::new(subject, data.claims))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{EncodingKey, Header};
    use serde_json::json;
    use std::io::Write;
    use std::time::{SystemTime, UNIX_EPOCH};

    const SECRET: &str = "test-secret-value";

    fn now() -> i64 {
        i64::try_from(SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs()).unwrap()
    }

    fn sign(claims: &serde_json::Value, secret: &str) -> String {
        jsonwebtoken::encode(
            &Header::new(Algorithm::HS256),
            claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    fn config(issuer: Option<&str>, audience: Option<&str>) -> JwtConfig {
        JwtConfig {
            secret: JwtSecret::Inline(SECRET.to_string()),
            issuer: issuer.map(str::to_string),
            audience: audience.map(str::to_string),
        }
    }

    async fn ready(config: JwtConfig) -> JwtVerifier {
        let verifier = JwtVerifier::new(config);
        verifier.initialize().await.unwrap();
        verifier
    }

    #[tokio::test]
    async fn test_valid_token() {
        let verifier = ready(config(None, None)).await;
        let token = sign(&json!({ "sub": "user-7", "exp": now() + 3600, "plan": "pro" }), SECRET);

        let identity = verifier.verify(&token).await.unwrap();
        assert_eq!(identity.subject_id, "user-7");
        assert_eq!(identity.raw_claims["plan"], "pro");
    }

    #[tokio::test]
    async fn test_failure_kinds() {
        let verifier = ready(config(Some("aigate"), None)).await;

        let expired = sign(&json!({ "sub": "u", "exp": now() - 3600, "iss": "aigate" }), SECRET);
        assert!(matches!(verifier.verify(&expired).await, Err(VerifyError::Expired)));

        let forged = sign(&json!({ "sub": "u", "exp": now() + 3600, "iss": "aigate" }), "other");
        assert!(matches!(verifier.verify(&forged).await, Err(VerifyError::InvalidSignature)));

        let wrong_issuer = sign(&json!({ "sub": "u", "exp": now() + 3600, "iss": "else" }), SECRET);
        assert!(matches!(
            verifier.verify(&wrong_issuer).await,
            Err(VerifyError::InvalidClaims(_))
        ));

        let no_subject = sign(&json!({ "exp": now() + 3600, "iss": "aigate" }), SECRET);
        assert!(matches!(
            verifier.verify(&no_subject).await,
            Err(VerifyError::InvalidClaims(_))
        ));

        assert!(matches!(
            verifier.verify("not-a-jwt").await,
            Err(VerifyError::Malformed(_))
        ));
    }

    #[tokio::test]
    async fn test_audience_checked_when_configured() {
        let verifier = ready(config(None, Some("gateway"))).await;

        let good = sign(&json!({ "sub": "u", "exp": now() + 3600, "aud": "gateway" }), SECRET);
        assert!(verifier.verify(&good).await.is_ok());

        let bad = sign(&json!({ "sub": "u", "exp": now() + 3600, "aud": "billing" }), SECRET);
        assert!(matches!(verifier.verify(&bad).await, Err(VerifyError::InvalidClaims(_))));
    }

    #[tokio::test]
    async fn test_secret_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "{SECRET}").unwrap();

        let verifier = ready(JwtConfig {
            secret: JwtSecret::File(file.path().to_path_buf()),
            issuer: None,
            audience: None,
        })
        .await;
        let token = sign(&json!({ "sub": "u", "exp": now() + 60 }), SECRET);
        assert!(verifier.verify(&token).await.is_ok());

        let missing = JwtVerifier::new(JwtConfig {
            secret: JwtSecret::File("/nonexistent/secret".into()),
            issuer: None,
            audience: None,
        });
        assert!(matches!(missing.initialize().await, Err(VerifyError::Unavailable(_))));
    }
}
