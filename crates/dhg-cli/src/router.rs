//! Command routing logic for CLI

use crate::args::{Cli, Commands, ConfigAction};
use crate::commands;
use dhg_core::ThrottleConfig;

/// Route CLI commands to their respective handlers
pub async fn route(cli: Cli, config: ThrottleConfig) -> anyhow::Result<()> {
    match cli.command {
        Commands::Simulate(args) => commands::simulate::execute(&config, args, cli.verbose).await,
        Commands::Config { action } => match action {
            ConfigAction::Show { json } => commands::config::show(&config, &cli.config_file, json),
            ConfigAction::Init { path, force } => commands::config::init(&path, force).await,
        },
        Commands::Presets => commands::presets::show(&config),
    }
}
