//! Logging configuration

use crate::error::{DhgError, DhgResult};
use serde::{Deserialize, Serialize};

const LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error", "off"];
const FORMATS: &[&str] = &["pretty", "compact", "json"];

/// Logging configuration
///
/// Empty fields mean "not set" and are skipped when merging.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error, off)
    #[serde(default)]
    pub level: String,
    /// Log format (pretty, compact, json)
    #[serde(default)]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl LoggingConfig {
    /// A config with nothing set, used as the serde default for partial files
    pub fn unset() -> Self {
        Self {
            level: String::new(),
            format: String::new(),
        }
    }

    /// Merge with another logging config
    pub fn merge(&mut self, other: LoggingConfig) {
        if !other.level.is_empty() {
            self.level = other.level;
        }

        if !other.format.is_empty() {
            self.format = other.format;
        }
    }

    /// Check level and format against the supported values
    pub fn validate(&self) -> DhgResult<()> {
        if !LEVELS.contains(&self.level.to_lowercase().as_str()) {
            return Err(DhgError::config_with_context(
                format!("Unknown log level '{}'", self.level),
                format!("Expected one of: {}", LEVELS.join(", ")),
            ));
        }
        if !FORMATS.contains(&self.format.to_lowercase().as_str()) {
            return Err(DhgError::config_with_context(
                format!("Unknown log format '{}'", self.format),
                format!("Expected one of: {}", FORMATS.join(", ")),
            ));
        }
        Ok(())
    }
}
