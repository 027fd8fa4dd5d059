//! Command-line parsing and configuration loading.
//!
//! Precedence, lowest to highest: built-in defaults, the TOML file given
//! by `--config`, `AIGATE_*` environment variables (a `.env` file is read
//! first by the binary), then command-line flags.

use std::path::{Path, PathBuf};
use std::time::Duration;

use aigate_core::{GatewaySettings, SettingsOverrides};
use anyhow::{Context, Result, bail};
use clap::{Parser, ValueEnum};

use crate::backend::OpenAiConfig;
use crate::bootstrap::{BackendConfig, ServerConfig, VerifierConfig};
use crate::verifiers::{JwtConfig, JwtSecret, parse_token_pair};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BackendKind {
    /// OpenAI-compatible HTTP upstream
    #[value(name = "openai")]
    OpenAi,
    /// Local echo backend for development
    Echo,
}

/// AI request gateway: authenticated, rate-limited chat, vision and speech endpoints.
#[derive(Debug, Parser)]
#[command(name = "aigate", version)]
pub struct Cli {
    /// TOML settings file
    #[arg(long, env = "AIGATE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Listen address (host:port)
    #[arg(long, env = "AIGATE_BIND_ADDR")]
    pub bind_addr: Option<String>,

    /// Path prefix for the AI routes ("" for none)
    #[arg(long, env = "AIGATE_ROUTE_PREFIX")]
    pub route_prefix: Option<String>,

    /// Maximum request body size in bytes
    #[arg(long, env = "AIGATE_MAX_BODY_BYTES")]
    pub max_body_bytes: Option<usize>,

    /// Maximum number of tracked rate-limit buckets
    #[arg(long, env = "AIGATE_MAX_BUCKETS")]
    pub max_buckets: Option<usize>,

    /// Seconds of inactivity before a rate-limit bucket is dropped
    #[arg(long, env = "AIGATE_BUCKET_TTL_SECS")]
    pub bucket_ttl_secs: Option<u64>,

    /// Timeout for token verification, in milliseconds
    #[arg(long, env = "AIGATE_VERIFY_TIMEOUT_MS")]
    pub verify_timeout_ms: Option<u64>,

    /// Timeout for a buffered inference call, in milliseconds
    #[arg(long, env = "AIGATE_INFERENCE_TIMEOUT_MS")]
    pub inference_timeout_ms: Option<u64>,

    /// Longest gap between streamed deltas, in milliseconds
    #[arg(long, env = "AIGATE_STREAM_IDLE_TIMEOUT_MS")]
    pub stream_idle_timeout_ms: Option<u64>,

    /// Inference backend
    #[arg(long, value_enum, env = "AIGATE_BACKEND", default_value_t = BackendKind::OpenAi)]
    pub backend: BackendKind,

    /// Base URL of the OpenAI-compatible upstream
    #[arg(long, env = "AIGATE_UPSTREAM_URL", default_value = "http://127.0.0.1:8080")]
    pub upstream_url: String,

    /// API key sent to the upstream
    #[arg(long, env = "AIGATE_UPSTREAM_API_KEY", hide_env_values = true)]
    pub upstream_api_key: Option<String>,

    /// Default chat model
    #[arg(long, env = "AIGATE_CHAT_MODEL")]
    pub chat_model: Option<String>,

    /// Default vision model
    #[arg(long, env = "AIGATE_VISION_MODEL")]
    pub vision_model: Option<String>,

    /// Transcription model
    #[arg(long, env = "AIGATE_SPEECH_MODEL")]
    pub speech_model: Option<String>,

    /// Delay between words streamed by the echo backend, in milliseconds
    #[arg(long, default_value_t = 0)]
    pub echo_word_delay_ms: u64,

    /// Accepted bearer token as TOKEN=SUBJECT (repeatable)
    #[arg(
        long = "static-token",
        env = "AIGATE_STATIC_TOKENS",
        value_delimiter = ',',
        value_parser = parse_token_pair,
        hide_env_values = true
    )]
    pub static_tokens: Vec<(String, String)>,

    /// File of TOKEN=SUBJECT lines
    #[arg(long, env = "AIGATE_STATIC_TOKEN_FILE")]
    pub static_token_file: Option<PathBuf>,

    /// HS256 secret for JWT bearer tokens
    #[arg(long, env = "AIGATE_JWT_SECRET", hide_env_values = true, conflicts_with = "jwt_secret_file")]
    pub jwt_secret: Option<String>,

    /// File holding the HS256 secret
    #[arg(long, env = "AIGATE_JWT_SECRET_FILE")]
    pub jwt_secret_file: Option<PathBuf>,

    /// Required JWT issuer
    #[arg(long, env = "AIGATE_JWT_ISSUER")]
    pub jwt_issuer: Option<String>,

    /// Required JWT audience
    #[arg(long, env = "AIGATE_JWT_AUDIENCE")]
    pub jwt_audience: Option<String>,

    /// Enable verbose/debug output
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,
}

impl Cli {
    /// Defaults, then the config file, then env/flag overrides.
    pub fn load_settings(&self) -> Result<GatewaySettings> {
        let mut settings = match &self.config {
            Some(path) => load_settings_file(path)?,
            None => GatewaySettings::with_defaults(),
        };
        settings.merge(&self.overrides());
        Ok(settings)
    }

    fn overrides(&self) -> SettingsOverrides {
        SettingsOverrides {
            bind_addr: self.bind_addr.clone(),
            route_prefix: self.route_prefix.clone(),
            max_buckets: self.max_buckets,
            bucket_ttl_secs: self.bucket_ttl_secs,
            verify_timeout_ms: self.verify_timeout_ms,
            inference_timeout_ms: self.inference_timeout_ms,
            stream_idle_timeout_ms: self.stream_idle_timeout_ms,
            max_body_bytes: self.max_body_bytes,
        }
    }

    pub fn backend_config(&self) -> BackendConfig {
        match self.backend {
            BackendKind::Echo => BackendConfig::Echo {
                word_delay: Duration::from_millis(self.echo_word_delay_ms),
            },
            BackendKind::OpenAi => {
                let mut config = OpenAiConfig::new(self.upstream_url.clone());
                config.api_key.clone_from(&self.upstream_api_key);
                if let Some(model) = &self.chat_model {
                    config.chat_model.clone_from(model);
                }
                if let Some(model) = &self.vision_model {
                    config.vision_model.clone_from(model);
                }
                if let Some(model) = &self.speech_model {
                    config.speech_model.clone_from(model);
                }
                BackendConfig::OpenAi(config)
            }
        }
    }

    /// JWT when a secret is given, otherwise the static token table.
    pub fn verifier_config(&self) -> Result<VerifierConfig> {
        let secret = match (&self.jwt_secret, &self.jwt_secret_file) {
            (Some(secret), _) => Some(JwtSecret::Inline(secret.clone())),
            (None, Some(path)) => Some(JwtSecret::File(path.clone())),
            (None, None) => None,
        };

        if let Some(secret) = secret {
            return Ok(VerifierConfig::Jwt(JwtConfig {
                secret,
                issuer: self.jwt_issuer.clone(),
                audience: self.jwt_audience.clone(),
            }));
        }

        if self.static_tokens.is_empty() && self.static_token_file.is_none() {
            bail!(
                "No token verifier configured: pass --static-token, --static-token-file, \
                 --jwt-secret or --jwt-secret-file"
            );
        }

        Ok(VerifierConfig::Static {
            tokens: self.static_tokens.clone(),
            token_file: self.static_token_file.clone(),
        })
    }

    pub fn server_config(&self) -> Result<ServerConfig> {
        Ok(ServerConfig {
            settings: self.load_settings()?,
            backend: self.backend_config(),
            verifier: self.verifier_config()?,
        })
    }
}

/// Read a TOML settings file. Missing keys keep their defaults.
pub fn load_settings_file(path: &Path) -> Result<GatewaySettings> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    toml::from_str(&contents)
        .with_context(|| format!("Failed to parse config file {}", path.display()))
}
