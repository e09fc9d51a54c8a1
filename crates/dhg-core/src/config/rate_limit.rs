//! Rate limit configuration in provider units
//!
//! Upstream providers publish limits as requests per minute plus an allowed
//! burst. [`RateLimitConfig`] keeps those units and converts them to the
//! bucket's capacity and per-second refill rate.

use crate::ratelimit::RateLimitError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Providers with built-in presets, in display order
pub const PRESET_PROVIDERS: &[&str] = &[
    "anthropic",
    "openai",
    "google",
    "google-drive",
    "modal",
    "ollama",
];

/// Rate limit configuration for one upstream endpoint
///
/// # Examples
///
/// ```
/// use dhg_core::config::RateLimitConfig;
///
/// // 10 requests per minute, bursts of 3
/// let config = RateLimitConfig::new(10.0, 3.0);
/// assert!((config.refill_rate_per_second() - 10.0 / 60.0).abs() < 1e-12);
/// assert_eq!(config.capacity(), 3.0);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Sustained limit in requests (or cost units) per minute
    #[serde(default = "default_requests_per_minute")]
    pub requests_per_minute: f64,

    /// Maximum burst size (token bucket capacity)
    #[serde(default = "default_burst_size")]
    pub burst_size: f64,

    /// Whether rate limiting is enabled
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// How long callers that opt into bounded waits are willing to queue
    #[serde(
        default,
        with = "humantime_serde",
        skip_serializing_if = "Option::is_none"
    )]
    pub max_wait: Option<Duration>,
}

fn default_requests_per_minute() -> f64 {
    60.0
}
fn default_burst_size() -> f64 {
    10.0
}
fn default_enabled() -> bool {
    true
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            // 1 request per second on average
            requests_per_minute: 60.0,
            burst_size: 10.0,
            enabled: true,
            max_wait: None,
        }
    }
}

impl RateLimitConfig {
    /// Create a new rate limit configuration
    pub fn new(requests_per_minute: f64, burst_size: f64) -> Self {
        Self {
            requests_per_minute,
            burst_size,
            ..Default::default()
        }
    }

    /// Create a disabled configuration
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Default::default()
        }
    }

    /// Get configuration for a specific provider
    pub fn for_provider(provider: &str) -> Self {
        match provider.to_lowercase().as_str() {
            // Claude: tier 1 allows 50 RPM
            "anthropic" | "claude" => Self::new(50.0, 5.0),
            // OpenAI: varies by tier, use conservative defaults
            "openai" => Self::new(60.0, 20.0),
            // Gemini
            "google" | "gemini" => Self::new(60.0, 15.0),
            // Drive API quota is per user and generous, but sync jobs fan out
            "google-drive" | "drive" => Self::new(300.0, 50.0),
            // Modal transcription jobs are long-running; keep the burst small
            "modal" => Self::new(30.0, 5.0),
            // Local, can be more generous
            "ollama" => Self::new(120.0, 30.0),
            _ => Self::default(),
        }
    }

    // ========== Builder methods ==========

    /// Set requests per minute
    pub fn with_requests_per_minute(mut self, rpm: f64) -> Self {
        self.requests_per_minute = rpm;
        self
    }

    /// Set requests per second (converts to requests per minute)
    pub fn with_rps(mut self, rps: f64) -> Self {
        self.requests_per_minute = rps * 60.0;
        self
    }

    /// Set burst size
    pub fn with_burst_size(mut self, size: f64) -> Self {
        self.burst_size = size;
        self
    }

    /// Enable or disable rate limiting
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Set maximum wait time for bounded acquisitions
    pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = Some(max_wait);
        self
    }

    // ========== Conversion helpers ==========

    /// Tokens added to the bucket per second
    pub fn refill_rate_per_second(&self) -> f64 {
        self.requests_per_minute / 60.0
    }

    /// Bucket capacity
    pub fn capacity(&self) -> f64 {
        self.burst_size
    }

    /// Check that an enabled configuration describes a usable bucket
    pub fn validate(&self) -> Result<(), RateLimitError> {
        if !self.enabled {
            return Ok(());
        }
        if !self.requests_per_minute.is_finite() || self.requests_per_minute <= 0.0 {
            return Err(RateLimitError::invalid_configuration(format!(
                "requests_per_minute must be a finite positive number, got {}",
                self.requests_per_minute
            )));
        }
        if !self.burst_size.is_finite() || self.burst_size <= 0.0 {
            return Err(RateLimitError::invalid_configuration(format!(
                "burst_size must be a finite positive number, got {}",
                self.burst_size
            )));
        }
        if self.max_wait == Some(Duration::ZERO) {
            return Err(RateLimitError::invalid_configuration(
                "max_wait must be greater than zero when set",
            ));
        }
        Ok(())
    }
}

/// Partial rate limit settings, as written in a config file
///
/// Fields left out keep the value of the configuration they are layered
/// onto, which for a fresh provider is its built-in preset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RateLimitOverride {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requests_per_minute: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub burst_size: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,

    #[serde(
        default,
        with = "humantime_serde",
        skip_serializing_if = "Option::is_none"
    )]
    pub max_wait: Option<Duration>,
}

impl RateLimitOverride {
    /// Layer the fields that are set onto `base`
    pub fn apply_to(&self, mut base: RateLimitConfig) -> RateLimitConfig {
        if let Some(rpm) = self.requests_per_minute {
            base.requests_per_minute = rpm;
        }
        if let Some(burst) = self.burst_size {
            base.burst_size = burst;
        }
        if let Some(enabled) = self.enabled {
            base.enabled = enabled;
        }
        if let Some(max_wait) = self.max_wait {
            base.max_wait = Some(max_wait);
        }
        base
    }
}
