//! Built-in provider presets

use crate::console::CliConsole;
use colored::*;
use dhg_core::config::PRESET_PROVIDERS;
use dhg_core::{RateLimitConfig, ThrottleConfig};

struct PresetRow {
    provider: &'static str,
    preset: RateLimitConfig,
    effective: RateLimitConfig,
}

impl PresetRow {
    fn overridden(&self) -> bool {
        self.preset != self.effective
    }
}

fn rows(config: &ThrottleConfig) -> Vec<PresetRow> {
    PRESET_PROVIDERS
        .iter()
        .map(|&provider| PresetRow {
            provider,
            preset: RateLimitConfig::for_provider(provider),
            effective: config.rate_limit_for(provider),
        })
        .collect()
}

/// List built-in presets, flagging those the configuration overrides
pub fn show(config: &ThrottleConfig) -> anyhow::Result<()> {
    let console = CliConsole::new(true);
    console.print_header("Provider Presets");

    println!(
        "  {:<14} {:>8} {:>7} {:>9}",
        "PROVIDER".bold(),
        "RPM".bold(),
        "BURST".bold(),
        "PER SEC".bold()
    );
    for row in rows(config) {
        let limits = &row.effective;
        let name = if row.provider == config.default_provider {
            format!("{} *", row.provider)
        } else {
            row.provider.to_string()
        };
        let note = match (limits.enabled, row.overridden()) {
            (false, _) => "disabled".red().to_string(),
            (true, true) => "overridden".yellow().to_string(),
            (true, false) => String::new(),
        };
        println!(
            "  {:<14} {:>8} {:>7} {:>9.3} {}",
            name.cyan(),
            limits.requests_per_minute,
            limits.burst_size,
            limits.refill_rate_per_second(),
            note
        );
    }

    println!();
    console.info("* default provider; unknown providers get 60 RPM with a burst of 10");
    Ok(())
}
