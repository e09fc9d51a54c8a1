//! Configuration management for DHG Throttle
//!
//! Layered loading (defaults, then files, then `DHG_*` environment
//! overrides) into a [`ThrottleConfig`] holding per-endpoint rate limits
//! and logging settings.

pub mod loader;
pub mod logging_config;
pub mod model;
pub mod rate_limit;

pub use loader::{ConfigLoader, ConfigSource, apply_env_overrides, load_from_file};
pub use logging_config::LoggingConfig;
pub use model::{ConfigFile, DEFAULT_PROVIDER, ThrottleConfig};
pub use rate_limit::{PRESET_PROVIDERS, RateLimitConfig, RateLimitOverride};
