//! aigate binary entry point.

use aigate_axum::bootstrap::handle_shutdown_signal;
use aigate_axum::{Cli, start_server};
use anyhow::Result;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env before clap reads AIGATE_* variables
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let config = cli.server_config()?;

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        handle_shutdown_signal(tokio::signal::ctrl_c().await, &signal);
    });

    start_server(config, shutdown).await
}
