//! DHG Throttle CLI
//!
//! Inspect rate limit configuration and watch a limiter admit a burst of
//! concurrent calls.
//!
//! # Installation
//!
//! ```bash
//! cargo install --path crates/dhg-cli
//! ```
//!
//! Configuration is layered: built-in defaults, then the file given by
//! `--config` (skipped when missing), then `DHG_*` environment variables.

mod args;
mod commands;
mod console;
mod logging;
mod router;

use args::Cli;
use clap::Parser;
use dhg_core::ConfigLoader;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = ConfigLoader::new()
        .with_defaults()
        .with_file(&cli.config_file)
        .with_env()
        .load()?;

    logging::init(&config.logging, cli.verbose);
    tracing::debug!(config_file = %cli.config_file.display(), "Starting dhg-throttle");

    router::route(cli, config).await
}
