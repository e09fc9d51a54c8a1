//! DHG Throttle core library
//!
//! Admission control for outbound calls to rate-limited upstream APIs
//! (AI inference, Google Drive, Modal). The central type is the token-bucket
//! [`RateLimiter`]; a [`LimiterRegistry`] holds one limiter per upstream
//! endpoint and is constructed from a [`ThrottleConfig`].

pub mod config;
pub mod error;
pub mod ratelimit;
pub mod registry;

// Re-export commonly used types
pub use config::{ConfigLoader, LoggingConfig, RateLimitConfig, ThrottleConfig};
pub use error::{DhgError, DhgResult};
pub use ratelimit::{LimiterMetrics, LimiterStatus, RateLimitError, RateLimiter};
pub use registry::LimiterRegistry;
