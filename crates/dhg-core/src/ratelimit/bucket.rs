//! Token bucket state and arithmetic
//!
//! The bucket never reads the clock itself; every operation that depends on
//! time takes the current instant from the caller.

use super::types::RateLimitError;
use std::time::Duration;
use tokio::time::Instant;

/// Deficits below this are treated as satisfied to absorb float rounding
pub(crate) const TOKEN_EPSILON: f64 = 1e-9;

/// Token bucket: `capacity` tokens at most, refilled continuously at
/// `refill_rate` tokens per second.
#[derive(Debug, Clone)]
pub struct TokenBucket {
    capacity: f64,
    refill_rate: f64,
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    /// Create a full bucket
    pub fn new(capacity: f64, refill_rate: f64, now: Instant) -> Result<Self, RateLimitError> {
        if !capacity.is_finite() || capacity <= 0.0 {
            return Err(RateLimitError::invalid_configuration(format!(
                "capacity must be a finite positive number, got {capacity}"
            )));
        }
        if !refill_rate.is_finite() || refill_rate <= 0.0 {
            return Err(RateLimitError::invalid_configuration(format!(
                "refill rate must be a finite positive number, got {refill_rate}"
            )));
        }

        Ok(Self {
            capacity,
            refill_rate,
            tokens: capacity,
            last_refill: now,
        })
    }

    /// A bucket that never runs dry, backing disabled limiters
    pub(crate) fn unlimited(now: Instant) -> Self {
        Self {
            capacity: f64::MAX,
            refill_rate: 1.0,
            tokens: f64::MAX,
            last_refill: now,
        }
    }

    /// Add tokens for the time elapsed since the last refill, capped at capacity
    pub fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_rate).min(self.capacity);
        // An earlier `now` leaves the timestamp alone so elapsed time is never counted twice
        if now > self.last_refill {
            self.last_refill = now;
        }
    }

    /// Deduct `cost` if the bucket currently covers it
    pub fn try_take(&mut self, cost: f64) -> bool {
        if self.tokens + TOKEN_EPSILON >= cost {
            self.tokens = (self.tokens - cost).max(0.0);
            true
        } else {
            false
        }
    }

    /// Return tokens taken by a grant nobody observed
    pub fn give_back(&mut self, cost: f64) {
        self.tokens = (self.tokens + cost).min(self.capacity);
    }

    /// Time until `cost` tokens will be available, assuming no other grants
    pub fn time_until(&self, cost: f64) -> Duration {
        let deficit = cost - self.tokens;
        if deficit <= TOKEN_EPSILON {
            return Duration::ZERO;
        }
        Duration::try_from_secs_f64(deficit / self.refill_rate).unwrap_or(Duration::MAX)
    }

    pub fn tokens(&self) -> f64 {
        self.tokens
    }

    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    pub fn refill_rate(&self) -> f64 {
        self.refill_rate
    }

    pub fn last_refill(&self) -> Instant {
        self.last_refill
    }
}
