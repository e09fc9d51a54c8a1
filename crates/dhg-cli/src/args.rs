//! CLI argument definitions using clap
//!
//! - dhg-throttle simulate            # Fire concurrent calls at a limiter
//! - dhg-throttle config show/init    # Inspect or create configuration
//! - dhg-throttle presets             # List built-in provider presets

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

/// Default configuration file name used across all CLI commands.
pub const DEFAULT_CONFIG_FILE: &str = "dhg_throttle.toml";

#[derive(Parser, Debug)]
#[command(name = "dhg-throttle")]
#[command(about = "DHG Throttle - token-bucket admission control for upstream API calls")]
#[command(
    long_about = r#"DHG Throttle - token-bucket admission control for upstream API calls

USAGE:
  dhg-throttle simulate --provider openai --calls 30
  dhg-throttle config show
  dhg-throttle config init
  dhg-throttle presets

Settings are read from the config file, then DHG_* environment variables."#
)]
#[command(version)]
pub struct Cli {
    /// Path to configuration file (.toml, .yaml/.yml or .json)
    #[arg(long = "config", global = true, default_value = DEFAULT_CONFIG_FILE)]
    pub config_file: PathBuf,

    /// Enable verbose output
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Fire concurrent acquisitions at a limiter and report admission times
    Simulate(SimulateArgs),

    /// Manage configuration files
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// List built-in provider presets
    Presets,
}

#[derive(clap::Args, Debug, Clone)]
pub struct SimulateArgs {
    /// Endpoint to throttle (defaults to the configured default provider)
    #[arg(long, short)]
    pub provider: Option<String>,

    /// Number of concurrent calls
    #[arg(long, short = 'n', default_value_t = 10)]
    pub calls: usize,

    /// Token cost of each call
    #[arg(long, default_value_t = 1.0)]
    pub cost: f64,

    /// Give up on a call after waiting this long (e.g. "5s", "1m")
    #[arg(long, value_parser = parse_duration)]
    pub timeout: Option<Duration>,

    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum ConfigAction {
    /// Display the effective configuration
    Show {
        /// Print as JSON instead of TOML
        #[arg(long)]
        json: bool,
    },

    /// Create a new configuration file with every preset spelled out
    Init {
        /// Path for the new configuration file
        #[arg(default_value = DEFAULT_CONFIG_FILE)]
        path: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

fn parse_duration(value: &str) -> Result<Duration, String> {
    humantime_serde::re::humantime::parse_duration(value).map_err(|e| e.to_string())
}
