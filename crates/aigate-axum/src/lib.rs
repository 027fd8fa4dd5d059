#![doc = include_str!("../README.md")]
#![deny(unsafe_code)]
#![deny(unused_crate_dependencies)]

// Test-only crates used by unit tests or planned test infrastructure
#[cfg(test)]
use tokio_test as _;

// Used by the main.rs binary
use dotenvy as _;
use tracing_subscriber as _;

pub mod backend;
pub mod bootstrap;
pub mod cli;
pub mod cors;
pub mod dto;
pub mod error;
pub mod handlers;
pub mod origin;
pub mod routes;
pub mod state;
pub mod stream;
pub mod verifiers;

// Re-export primary types
pub use bootstrap::{
    BackendConfig, GatewayContext, ServerConfig, VerifierConfig, bootstrap, start_server,
};
pub use cli::Cli;
pub use error::HttpError;
pub use routes::create_router;
pub use state::AppState;
pub use stream::NdjsonStreamWriter;
