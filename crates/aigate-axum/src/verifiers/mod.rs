//! Token verifier adapters.

pub mod jwt;
pub mod static_token;

pub use jwt::{JwtConfig, JwtSecret, JwtVerifier};
pub use static_token::{StaticTokenVerifier, parse_token_pair};
