//! Static bearer token table.
//!
//! Maps opaque tokens to subjects. Tokens come from the command line and,
//! optionally, a file of `token=subject` lines (`#` starts a comment) that
//! is read when the verifier is first used.

use std::collections::HashMap;
use std::path::PathBuf;

use aigate_core::{AuthenticatedIdentity, TokenVerifier, VerifyError};
use async_trait::async_trait;
use serde_json::json;
use tokio::sync::OnceCell;
use tracing::info;

pub struct StaticTokenVerifier {
    inline: HashMap<String, String>,
    file: Option<PathBuf>,
    table: OnceCell<HashMap<String, String>>,
}

impl StaticTokenVerifier {
    pub fn new(tokens: impl IntoIterator<Item = (String, String)>) -> Self {
        Self {
            inline: tokens.into_iter().collect(),
            file: None,
            table: OnceCell::new(),
        }
    }

    /// Also load tokens from `path` on initialization.
    #[must_use]
    pub fn with_token_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.file = Some(path.into());
        self
    }
}

/// Parse a `TOKEN=SUBJECT` pair.
pub fn parse_token_pair(raw: &str) -> Result<(String, String), String> {
    let (token, subject) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected TOKEN=SUBJECT, got {raw:?}"))?;
    let (token, subject) = (token.trim(), subject.trim());
    if token.is_empty() || subject.is_empty() {
        return Err(format!("token and subject must be non-empty in {raw:?}"));
    }
    Ok((token.to_string(), subject.to_string()))
}

fn parse_token_file(contents: &str) -> Result<Vec<(String, String)>, String> {
    contents
        .lines()
        .enumerate()
        .map(|(n, line)| (n + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty() && !line.starts_with('#'))
        .map(|(n, line)| parse_token_pair(line).map_err(|e| format!("line {n}: {e}")))
        .collect()
}

#[async_trait]
impl TokenVerifier for StaticTokenVerifier {
    async fn initialize(&self) -> Result<(), VerifyError> {
        let mut table = self.inline.clone();

        if let Some(path) = &self.file {
            let contents = tokio::fs::read_to_string(path).await.map_err(|e| {
                VerifyError::Unavailable(format!("cannot read {}: {e}", path.display()))
            })?;
            let pairs = parse_token_file(&contents).map_err(|e| {
                VerifyError::Unavailable(format!("invalid token file {}: {e}", path.display()))
            })?;
            table.extend(pairs);
        }

        if table.is_empty() {
            return Err(VerifyError::Unavailable("no static tokens configured".into()));
        }

        info!(tokens = table.len(), "Loaded static bearer tokens");
        // A concurrent initializer may have won; its table is equivalent.
        let _ = self.table.set(table);
        Ok(())
    }

    async fn verify(&self, token: &str) -> Result<AuthenticatedIdentity, VerifyError> {
        let table = self
            .table
            .get()
            .ok_or_else(|| VerifyError::Unavailable("token table not loaded".into()))?;

        table
            .get(token)
            .map(|subject| AuthenticatedIdentity::new(subject.clone(), json!({ "source": "static" })))
            .ok_or(VerifyError::Revoked)
    }
}
