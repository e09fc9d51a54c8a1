//! Rate limiting for upstream API calls
//!
//! Implements a token bucket with a strict FIFO wait queue. Callers that
//! arrive while the bucket cannot cover their cost are queued rather than
//! rejected, and a drain task admits them in arrival order as tokens refill.

mod bucket;
mod limiter;
mod queue;
mod types;

#[cfg(test)]
mod tests;

pub use bucket::TokenBucket;
pub use limiter::RateLimiter;
pub use types::{LimiterMetrics, LimiterStatus, RateLimitError};
