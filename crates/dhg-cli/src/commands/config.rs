//! Configuration management commands

use crate::console::CliConsole;
use anyhow::{Context, bail};
use dhg_core::ThrottleConfig;
use std::path::Path;

const TEMPLATE_HEADER: &str = "\
# DHG Throttle configuration
#
# Limits are in provider units: requests_per_minute is the sustained rate,
# burst_size the number of calls allowed back to back. Set max_wait
# (e.g. \"30s\") to bound how long callers queue. Any DHG_RATE_LIMIT_<PROVIDER>_*
# environment variable overrides the values below.

";

/// Show the effective configuration
pub fn show(config: &ThrottleConfig, config_file: &Path, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(&serde_json::to_value(config)?)?);
        return Ok(());
    }

    let console = CliConsole::new(true);
    console.print_header("Configuration");
    if config_file.exists() {
        console.success(&format!("Loaded configuration from: {}", config_file.display()));
    } else {
        console.warn(&format!(
            "Configuration file not found: {}",
            config_file.display()
        ));
        console.info("Using defaults, presets and environment overrides");
    }
    println!();
    print!("{}", render_toml(config)?);
    Ok(())
}

/// Write a configuration template with every preset spelled out
pub async fn init(path: &Path, force: bool) -> anyhow::Result<()> {
    let console = CliConsole::new(true);
    console.print_header("Configuration Initialization");

    if path.extension().and_then(|ext| ext.to_str()) != Some("toml") {
        bail!(
            "Templates are written as TOML; use a .toml path instead of {}",
            path.display()
        );
    }

    if path.exists() && !force {
        console.error(&format!(
            "Configuration file already exists: {}",
            path.display()
        ));
        console.info("Use --force to overwrite");
        bail!("Configuration file already exists: {}", path.display());
    }

    let content = render_template()?;
    tokio::fs::write(path, content)
        .await
        .with_context(|| format!("Failed to write configuration file {}", path.display()))?;

    console.success(&format!("Created configuration file: {}", path.display()));
    Ok(())
}

/// Render the `config init` template
pub fn render_template() -> anyhow::Result<String> {
    Ok(format!(
        "{TEMPLATE_HEADER}{}",
        render_toml(&ThrottleConfig::with_presets())?
    ))
}

// Going through `toml::Value` sorts provider tables by name
fn render_toml(config: &ThrottleConfig) -> anyhow::Result<String> {
    let value = toml::Value::try_from(config).context("Failed to serialize configuration")?;
    toml::to_string_pretty(&value).context("Failed to serialize configuration")
}
