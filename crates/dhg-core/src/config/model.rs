//! Top-level configuration model

use super::logging_config::LoggingConfig;
use super::rate_limit::{RateLimitConfig, RateLimitOverride};
use crate::error::{DhgError, DhgResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Provider used when no endpoint name is given
pub const DEFAULT_PROVIDER: &str = "anthropic";

/// Configuration for the owning application
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThrottleConfig {
    /// Endpoint used when callers do not name one
    #[serde(default)]
    pub default_provider: String,

    /// Per-endpoint rate limits, keyed by lower-case name
    #[serde(default)]
    pub providers: HashMap<String, RateLimitConfig>,

    /// Logging settings
    #[serde(default = "LoggingConfig::unset")]
    pub logging: LoggingConfig,
}

/// Configuration as read from a file
///
/// Everything is optional; [`ThrottleConfig::apply_file`] layers what is
/// present onto the configuration loaded so far.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub default_provider: Option<String>,

    #[serde(default)]
    pub providers: HashMap<String, RateLimitOverride>,

    #[serde(default = "LoggingConfig::unset")]
    pub logging: LoggingConfig,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            default_provider: DEFAULT_PROVIDER.to_string(),
            providers: HashMap::new(),
            logging: LoggingConfig::default(),
        }
    }
}

impl ThrottleConfig {
    /// Default configuration with every preset spelled out, used for templates
    pub fn with_presets() -> Self {
        let providers = super::rate_limit::PRESET_PROVIDERS
            .iter()
            .map(|name| (name.to_string(), RateLimitConfig::for_provider(name)))
            .collect();
        Self {
            providers,
            ..Default::default()
        }
    }

    /// Overlay `other` on top of this configuration
    pub fn merge(&mut self, other: ThrottleConfig) {
        if !other.default_provider.is_empty() {
            self.default_provider = other.default_provider;
        }

        for (name, limits) in other.providers {
            self.providers.insert(name.to_lowercase(), limits);
        }

        self.logging.merge(other.logging);
    }

    /// Layer a config file on top of this configuration
    ///
    /// A provider table only replaces the fields it sets; the rest come from
    /// the provider's current settings, else its preset.
    pub fn apply_file(&mut self, file: ConfigFile) {
        if let Some(provider) = file.default_provider.filter(|p| !p.trim().is_empty()) {
            self.default_provider = provider.to_lowercase();
        }

        for (name, partial) in file.providers {
            let key = name.to_lowercase();
            let limits = partial.apply_to(self.rate_limit_for(&key));
            self.providers.insert(key, limits);
        }

        self.logging.merge(file.logging);
    }

    /// Rate limit for an endpoint: configured settings, else the built-in preset
    pub fn rate_limit_for(&self, provider: &str) -> RateLimitConfig {
        let key = provider.to_lowercase();
        self.providers
            .get(&key)
            .cloned()
            .unwrap_or_else(|| RateLimitConfig::for_provider(&key))
    }

    /// Validate the merged configuration
    pub fn validate(&self) -> DhgResult<()> {
        if self.default_provider.trim().is_empty() {
            return Err(DhgError::config("default_provider must not be empty"));
        }

        for (name, limits) in &self.providers {
            limits.validate().map_err(|e| {
                DhgError::config_with_context(e.to_string(), format!("providers.{name}"))
            })?;
        }

        self.logging.validate()
    }
}
