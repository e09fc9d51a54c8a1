//! Type definitions for rate limiting

use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

/// Rate limit errors
///
/// Running out of tokens is never an error: callers are queued instead.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RateLimitError {
    /// Capacity or refill rate is not a finite positive number
    #[error("Invalid rate limiter configuration: {message}")]
    InvalidConfiguration { message: String },

    /// A single request can never be satisfied by this bucket
    #[error("Requested cost {cost} exceeds bucket capacity {capacity}")]
    CostExceedsCapacity { cost: f64, capacity: f64 },

    /// Cost is zero, negative or not finite
    #[error("Invalid request cost {cost}: must be a finite positive number")]
    InvalidCost { cost: f64 },

    /// The caller's cancellation token fired while queued
    #[error("Rate limit acquisition cancelled")]
    Cancelled,

    /// The caller's deadline expired while queued
    #[error("Rate limit acquisition timed out after {waited:?}")]
    TimedOut { waited: Duration },
}

impl RateLimitError {
    pub(crate) fn invalid_configuration(message: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            message: message.into(),
        }
    }

    /// Get the error code for programmatic handling
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidConfiguration { .. } => "RATE_LIMIT_INVALID_CONFIGURATION",
            Self::CostExceedsCapacity { .. } => "RATE_LIMIT_COST_EXCEEDS_CAPACITY",
            Self::InvalidCost { .. } => "RATE_LIMIT_INVALID_COST",
            Self::Cancelled => "RATE_LIMIT_CANCELLED",
            Self::TimedOut { .. } => "RATE_LIMIT_TIMED_OUT",
        }
    }

    /// Only abandoned waits are worth retrying; the rest are caller bugs
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Cancelled | Self::TimedOut { .. })
    }
}

/// Point-in-time view of a limiter
///
/// Disabled limiters report `f64::INFINITY` for the bucket figures, which
/// serializes to `null` in JSON.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LimiterStatus {
    /// Whether rate limiting applies
    pub enabled: bool,
    /// Tokens available right now (after refill)
    pub tokens_available: f64,
    /// Callers currently waiting for admission
    pub queue_length: usize,
    /// Bucket capacity
    pub capacity: f64,
    /// Sustained refill rate
    pub refill_rate_per_second: f64,
}

/// Cumulative admission counters
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LimiterMetrics {
    /// Requests admitted without queueing
    pub granted_immediately: u64,
    /// Requests admitted from the wait queue
    pub granted_after_wait: u64,
    /// Queued requests that timed out or were cancelled
    pub abandoned: u64,
    /// Total cost admitted and not refunded
    pub admitted_cost: f64,
    /// Sum of queue waits for requests admitted from the queue
    #[serde(with = "humantime_serde")]
    pub total_wait: Duration,
    /// Longest single queue wait
    #[serde(with = "humantime_serde")]
    pub max_wait: Duration,
}

impl LimiterMetrics {
    pub(crate) fn record_immediate(&mut self, cost: f64) {
        self.granted_immediately += 1;
        self.admitted_cost += cost;
    }

    pub(crate) fn record_queued(&mut self, cost: f64, waited: Duration) {
        self.granted_after_wait += 1;
        self.admitted_cost += cost;
        self.total_wait += waited;
        self.max_wait = self.max_wait.max(waited);
    }

    pub(crate) fn record_abandoned(&mut self) {
        self.abandoned += 1;
    }

    pub(crate) fn record_refund(&mut self, cost: f64) {
        self.granted_after_wait = self.granted_after_wait.saturating_sub(1);
        self.admitted_cost = (self.admitted_cost - cost).max(0.0);
    }

    /// Total number of admitted requests
    pub fn total_granted(&self) -> u64 {
        self.granted_immediately + self.granted_after_wait
    }

    /// Mean queue wait of requests that had to wait
    pub fn average_wait(&self) -> Duration {
        if self.granted_after_wait == 0 {
            Duration::ZERO
        } else {
            self.total_wait / u32::try_from(self.granted_after_wait).unwrap_or(u32::MAX)
        }
    }
}
