//! Configuration loading and management

use super::model::{ConfigFile, ThrottleConfig};
use super::rate_limit::RateLimitConfig;
use crate::error::{DhgError, DhgResult};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Prefix for per-provider rate limit overrides, e.g. `DHG_RATE_LIMIT_OPENAI_RPM`
const RATE_LIMIT_PREFIX: &str = "DHG_RATE_LIMIT_";

/// Source of configuration data
#[derive(Debug, Clone)]
pub enum ConfigSource {
    /// Configuration from a file
    File(PathBuf),
    /// Overrides from the process environment
    Environment,
    /// Overrides from explicit `KEY=value` pairs, in environment syntax
    Vars(Vec<(String, String)>),
    /// Default configuration
    Default,
}

/// Configuration loader with support for multiple sources
///
/// Sources are applied in the order they were added; later sources win.
#[derive(Debug, Default)]
pub struct ConfigLoader {
    sources: Vec<ConfigSource>,
}

impl ConfigLoader {
    /// Create a new config loader
    pub fn new() -> Self {
        Self {
            sources: Vec::new(),
        }
    }

    /// Add a configuration source
    pub fn add_source(mut self, source: ConfigSource) -> Self {
        self.sources.push(source);
        self
    }

    /// Add a file source
    pub fn with_file<P: AsRef<Path>>(self, path: P) -> Self {
        self.add_source(ConfigSource::File(path.as_ref().to_path_buf()))
    }

    /// Add environment variables source
    pub fn with_env(self) -> Self {
        self.add_source(ConfigSource::Environment)
    }

    /// Add explicit environment-style overrides
    pub fn with_vars<I, K, V>(self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let vars = vars.into_iter().map(|(k, v)| (k.into(), v.into())).collect();
        self.add_source(ConfigSource::Vars(vars))
    }

    /// Add default configuration source
    pub fn with_defaults(self) -> Self {
        self.add_source(ConfigSource::Default)
    }

    /// Load configuration from all sources
    pub fn load(self) -> DhgResult<ThrottleConfig> {
        let mut config = ThrottleConfig::default();

        for source in &self.sources {
            match source {
                ConfigSource::File(path) => {
                    tracing::debug!("Loading config from file: {}", path.display());
                    if let Some(file) = load_from_file(path)? {
                        config.apply_file(file);
                    }
                }
                ConfigSource::Environment => {
                    tracing::debug!("Loading config overrides from environment");
                    apply_env_overrides(&mut config, env::vars())?;
                }
                ConfigSource::Vars(vars) => {
                    apply_env_overrides(&mut config, vars.iter().cloned())?;
                }
                ConfigSource::Default => {
                    tracing::debug!("Loading default config");
                    config.merge(ThrottleConfig::default());
                }
            }
        }

        config.validate()?;
        tracing::debug!(
            default_provider = %config.default_provider,
            providers = config.providers.len(),
            "Configuration loaded"
        );
        Ok(config)
    }
}

/// Read a config file; a missing file yields `None`
pub fn load_from_file(path: &Path) -> DhgResult<Option<ConfigFile>> {
    if !path.exists() {
        tracing::debug!("Config file {} not found, skipping", path.display());
        return Ok(None);
    }

    let content = fs::read_to_string(path).map_err(|e| {
        DhgError::config_with_context(
            format!("Failed to read config file: {}", e),
            format!("Reading configuration from '{}'", path.display()),
        )
    })?;

    let config: ConfigFile = match path.extension().and_then(|s| s.to_str()) {
        Some("toml") => toml::from_str(&content).map_err(|e| {
            DhgError::config_with_context(
                format!("Failed to parse TOML config: {}", e),
                format!("Deserializing TOML configuration from '{}'", path.display()),
            )
        })?,
        Some("yaml") | Some("yml") => serde_yaml::from_str(&content).map_err(|e| {
            DhgError::config_with_context(
                format!("Failed to parse YAML config: {}", e),
                format!("Deserializing YAML configuration from '{}'", path.display()),
            )
        })?,
        _ => serde_json::from_str(&content).map_err(|e| {
            DhgError::config_with_context(
                format!("Failed to parse JSON config: {}", e),
                format!("Deserializing JSON configuration from '{}'", path.display()),
            )
        })?,
    };

    Ok(Some(config))
}

/// Apply `DHG_*` overrides onto an existing configuration
///
/// Recognised keys:
/// - `DHG_DEFAULT_PROVIDER`, `DHG_LOG_LEVEL`, `DHG_LOG_FORMAT`
/// - `DHG_RATE_LIMIT_<PROVIDER>_{RPM,BURST,ENABLED,MAX_WAIT}`, where
///   underscores in `<PROVIDER>` become dashes (`GOOGLE_DRIVE` is `google-drive`)
///
/// Unrelated variables are ignored.
pub fn apply_env_overrides<I>(config: &mut ThrottleConfig, vars: I) -> DhgResult<()>
where
    I: IntoIterator<Item = (String, String)>,
{
    for (key, value) in vars {
        match key.as_str() {
            "DHG_DEFAULT_PROVIDER" => config.default_provider = value.to_lowercase(),
            "DHG_LOG_LEVEL" => config.logging.level = value,
            "DHG_LOG_FORMAT" => config.logging.format = value,
            _ => {
                if let Some(rest) = key.strip_prefix(RATE_LIMIT_PREFIX) {
                    apply_rate_limit_override(config, &key, rest, &value)?;
                }
            }
        }
    }
    Ok(())
}

fn apply_rate_limit_override(
    config: &mut ThrottleConfig,
    key: &str,
    rest: &str,
    value: &str,
) -> DhgResult<()> {
    const SUFFIXES: &[&str] = &["_MAX_WAIT", "_ENABLED", "_BURST", "_RPM"];

    let Some((provider, suffix)) = SUFFIXES.iter().find_map(|suffix| {
        rest.strip_suffix(suffix)
            .filter(|provider| !provider.is_empty())
            .map(|provider| (provider, *suffix))
    }) else {
        tracing::debug!("Ignoring unrecognised rate limit variable {}", key);
        return Ok(());
    };

    let provider = provider.to_lowercase().replace('_', "-");
    let limits = config
        .providers
        .entry(provider.clone())
        .or_insert_with(|| RateLimitConfig::for_provider(&provider));

    let invalid = || {
        DhgError::config_with_context(
            format!("Invalid {} value '{}'", key, value),
            "Loading configuration overrides from environment",
        )
    };

    match suffix {
        "_RPM" => limits.requests_per_minute = value.trim().parse().map_err(|_| invalid())?,
        "_BURST" => limits.burst_size = value.trim().parse().map_err(|_| invalid())?,
        "_ENABLED" => limits.enabled = parse_bool(value).ok_or_else(invalid)?,
        _ => {
            limits.max_wait = match value.trim() {
                "" | "none" => None,
                text => Some(
                    humantime_serde::re::humantime::parse_duration(text)
                        .map_err(|_| invalid())?,
                ),
            }
        }
    }
    Ok(())
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
