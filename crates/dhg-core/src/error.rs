//! Error types for DHG Throttle
//!
//! Limiter-level failures live in [`RateLimitError`]; everything the owning
//! application does around the limiter (loading configuration, building the
//! registry) reports through [`DhgError`].

use crate::ratelimit::RateLimitError;
use thiserror::Error;

/// Result type alias for DHG Throttle operations
pub type DhgResult<T> = Result<T, DhgError>;

/// Main error type
#[derive(Error, Debug)]
pub enum DhgError {
    /// Configuration related errors
    #[error("Configuration error: {message}")]
    Config {
        message: String,
        context: Option<String>,
    },

    /// I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Rate limiter errors
    #[error(transparent)]
    RateLimit(#[from] RateLimitError),
}

impl DhgError {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            context: None,
        }
    }

    /// Create a configuration error with context
    pub fn config_with_context(message: impl Into<String>, context: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            context: Some(context.into()),
        }
    }

    /// Get the error code for programmatic handling
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Config { .. } => "DHG_CONFIG",
            Self::Io(_) => "DHG_IO",
            Self::RateLimit(e) => e.error_code(),
        }
    }

    /// Additional context, if any was attached
    pub fn context(&self) -> Option<&str> {
        match self {
            Self::Config { context, .. } => context.as_deref(),
            _ => None,
        }
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RateLimit(e) => e.is_retryable(),
            _ => false,
        }
    }
}
