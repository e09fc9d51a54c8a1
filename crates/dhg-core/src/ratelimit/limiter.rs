//! Token bucket rate limiter with a FIFO wait queue

use super::bucket::TokenBucket;
use super::queue::WaitQueue;
use super::types::{LimiterMetrics, LimiterStatus, RateLimitError};
use crate::config::RateLimitConfig;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::{Notify, oneshot};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Shortest sleep between drain passes
const MIN_DRAIN_SLICE: Duration = Duration::from_millis(1);
/// Longest sleep between drain passes
const MAX_DRAIN_SLICE: Duration = Duration::from_secs(3600);

/// Rate limiter using the token bucket algorithm
///
/// Bursts up to the bucket capacity are admitted immediately; beyond that,
/// callers wait in strict arrival order until the sustained refill rate
/// covers their cost. Nobody is rejected for lack of tokens.
///
/// Cloning shares the underlying bucket and queue, so every clone throttles
/// against the same budget.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    shared: Arc<Shared>,
}

#[derive(Debug)]
struct Shared {
    /// Upstream endpoint name (for logging)
    name: String,
    /// Disabled limiters admit everything
    enabled: bool,
    /// Bucket, queue and counters behind one lock so that
    /// refill, admission check and deduction are a single step
    state: Mutex<LimiterState>,
    /// Wakes the drain task when the queue changes outside of a grant
    queue_changed: Notify,
    /// Wakes queued callers when a drain task went away with work left
    drain_stopped: Notify,
}

#[derive(Debug)]
struct LimiterState {
    bucket: TokenBucket,
    queue: WaitQueue,
    /// Whether a drain task is currently running
    draining: bool,
    metrics: LimiterMetrics,
}

impl LimiterState {
    /// Refill, then admit queued callers from the head while their cost fits
    fn admit_ready(&mut self, name: &str, now: Instant) {
        self.bucket.refill(now);

        while let Some(cost) = self.queue.front_cost() {
            if !self.bucket.try_take(cost) {
                break;
            }
            let Some(waiter) = self.queue.pop_front() else {
                break;
            };
            let waited = now.saturating_duration_since(waiter.enqueued_at);

            if waiter.grant.send(()).is_err() {
                self.bucket.give_back(cost);
                self.metrics.record_abandoned();
                continue;
            }

            self.metrics.record_queued(cost, waited);
            debug!(
                limiter = %name,
                cost,
                waited_ms = waited.as_millis() as u64,
                remaining = self.bucket.tokens(),
                queue_length = self.queue.len(),
                "Rate limiter: admitted queued request"
            );
        }
    }
}

enum Admission {
    Granted,
    Queued(Ticket),
}

/// A caller's place in the wait queue
///
/// Dropping an unsettled ticket (timeout, cancellation, or the acquiring
/// future being dropped) takes the entry out of the queue, or returns the
/// tokens if the grant had already been sent.
struct Ticket {
    shared: Arc<Shared>,
    id: u64,
    cost: f64,
    enqueued_at: Instant,
    rx: oneshot::Receiver<()>,
    settled: bool,
}

impl Ticket {
    async fn wait(mut self) -> Result<(), RateLimitError> {
        let shared = Arc::clone(&self.shared);
        loop {
            let stopped = shared.drain_stopped.notified();
            tokio::pin!(stopped);
            // Register before checking so a drain that stops in between still wakes us
            stopped.as_mut().enable();
            ensure_draining(&shared);

            tokio::select! {
                result = &mut self.rx => {
                    self.settled = true;
                    return result.map_err(|_| RateLimitError::Cancelled);
                }
                _ = stopped => {}
            }
        }
    }
}

impl Drop for Ticket {
    fn drop(&mut self) {
        if self.settled {
            return;
        }

        let waited = self.enqueued_at.elapsed();
        let mut state = self.shared.state.lock();
        if state.queue.remove(self.id).is_some() {
            state.metrics.record_abandoned();
        } else if self.rx.try_recv().is_ok() {
            state.bucket.give_back(self.cost);
            state.metrics.record_refund(self.cost);
            state.metrics.record_abandoned();
        } else {
            return;
        }
        let queue_length = state.queue.len();
        drop(state);

        warn!(
            limiter = %self.shared.name,
            cost = self.cost,
            waited_ms = waited.as_millis() as u64,
            queue_length,
            "Rate limiter: queued request abandoned"
        );
        self.shared.queue_changed.notify_one();
    }
}

/// Spawn a drain task on the current runtime unless one is running
fn ensure_draining(shared: &Arc<Shared>) {
    let runtime = {
        let mut state = shared.state.lock();
        if state.draining || state.queue.is_empty() {
            return;
        }
        let runtime = Handle::current();
        state.draining = true;
        runtime
    };
    debug!(limiter = %shared.name, "Rate limiter: restarting drain task");
    runtime.spawn(drain(Arc::clone(shared)));
}

/// Clears `draining` when a drain task is dropped before the queue empties,
/// e.g. because the runtime it was spawned on shut down
struct DrainGuard {
    shared: Arc<Shared>,
    finished: bool,
}

impl Drop for DrainGuard {
    fn drop(&mut self) {
        if self.finished {
            return;
        }

        let queue_length = {
            let mut state = self.shared.state.lock();
            state.draining = false;
            state.queue.len()
        };
        warn!(
            limiter = %self.shared.name,
            queue_length,
            "Rate limiter: drain task stopped before the queue emptied"
        );
        if queue_length > 0 {
            self.shared.drain_stopped.notify_waiters();
        }
    }
}

/// Admits queued callers as tokens refill; exits once the queue is empty
async fn drain(shared: Arc<Shared>) {
    debug!(limiter = %shared.name, "Rate limiter: drain task started");
    let mut guard = DrainGuard {
        shared: Arc::clone(&shared),
        finished: false,
    };

    loop {
        let wait = {
            let mut state = shared.state.lock();
            state.admit_ready(&shared.name, Instant::now());
            match state.queue.front_cost() {
                Some(cost) => state
                    .bucket
                    .time_until(cost)
                    .clamp(MIN_DRAIN_SLICE, MAX_DRAIN_SLICE),
                None => {
                    state.draining = false;
                    guard.finished = true;
                    break;
                }
            }
        };

        tokio::select! {
            _ = tokio::time::sleep(wait) => {}
            _ = shared.queue_changed.notified() => {}
        }
    }

    debug!(limiter = %shared.name, "Rate limiter: drain task finished");
}

impl RateLimiter {
    /// Create a rate limiter holding up to `capacity` tokens, refilled at
    /// `refill_rate_per_second`. The bucket starts full.
    pub fn new(capacity: f64, refill_rate_per_second: f64) -> Result<Self, RateLimitError> {
        Self::named("default", capacity, refill_rate_per_second)
    }

    /// Create a rate limiter labelled with the upstream endpoint it guards
    pub fn named(
        name: impl Into<String>,
        capacity: f64,
        refill_rate_per_second: f64,
    ) -> Result<Self, RateLimitError> {
        let bucket = TokenBucket::new(capacity, refill_rate_per_second, Instant::now())?;
        Ok(Self::from_bucket(name.into(), true, bucket))
    }

    /// Create a rate limiter from provider-unit configuration
    pub fn from_config(
        name: impl Into<String>,
        config: &RateLimitConfig,
    ) -> Result<Self, RateLimitError> {
        if !config.enabled {
            return Ok(Self::disabled(name));
        }
        Self::named(name, config.capacity(), config.refill_rate_per_second())
    }

    /// Create a rate limiter using the built-in preset for a provider
    pub fn for_provider(provider: &str) -> Result<Self, RateLimitError> {
        Self::from_config(provider.to_lowercase(), &RateLimitConfig::for_provider(provider))
    }

    /// Create a pass-through limiter that admits every request immediately
    pub fn disabled(name: impl Into<String>) -> Self {
        Self::from_bucket(name.into(), false, TokenBucket::unlimited(Instant::now()))
    }

    fn from_bucket(name: String, enabled: bool, bucket: TokenBucket) -> Self {
        Self {
            shared: Arc::new(Shared {
                name,
                enabled,
                state: Mutex::new(LimiterState {
                    bucket,
                    queue: WaitQueue::new(),
                    draining: false,
                    metrics: LimiterMetrics::default(),
                }),
                queue_changed: Notify::new(),
                drain_stopped: Notify::new(),
            }),
        }
    }

    /// Name of the upstream endpoint this limiter guards
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Check if rate limiting is enabled
    pub fn is_enabled(&self) -> bool {
        self.shared.enabled
    }

    /// Acquire a single token, waiting if necessary
    ///
    /// # Panics
    ///
    /// A caller that has to queue starts the limiter's drain task on the
    /// current tokio runtime, so the future panics if it is polled outside
    /// one (e.g. under `futures::executor::block_on`). The runtime needs the
    /// time driver enabled. The same holds for every other `acquire*`
    /// method; immediate grants and `try_acquire*` work anywhere.
    pub async fn acquire(&self) -> Result<(), RateLimitError> {
        self.acquire_weighted(1.0).await
    }

    /// Acquire `cost` tokens, waiting in FIFO order if necessary
    ///
    /// Fails without waiting if `cost` is not a finite positive number or
    /// exceeds the bucket capacity.
    pub async fn acquire_weighted(&self, cost: f64) -> Result<(), RateLimitError> {
        match self.enter(cost)? {
            Admission::Granted => Ok(()),
            Admission::Queued(ticket) => ticket.wait().await,
        }
    }

    /// Acquire `cost` tokens, giving up after `timeout`
    ///
    /// On timeout the request leaves the queue without disturbing the order
    /// of the callers behind it.
    pub async fn acquire_timeout(&self, cost: f64, timeout: Duration) -> Result<(), RateLimitError> {
        let ticket = match self.enter(cost)? {
            Admission::Granted => return Ok(()),
            Admission::Queued(ticket) => ticket,
        };
        let enqueued_at = ticket.enqueued_at;

        match tokio::time::timeout(timeout, ticket.wait()).await {
            Ok(result) => result,
            Err(_) => Err(RateLimitError::TimedOut {
                waited: enqueued_at.elapsed(),
            }),
        }
    }

    /// Acquire `cost` tokens unless `cancel` fires first
    pub async fn acquire_cancellable(
        &self,
        cost: f64,
        cancel: &CancellationToken,
    ) -> Result<(), RateLimitError> {
        if cancel.is_cancelled() {
            return Err(RateLimitError::Cancelled);
        }
        let ticket = match self.enter(cost)? {
            Admission::Granted => return Ok(()),
            Admission::Queued(ticket) => ticket,
        };

        tokio::select! {
            biased;
            result = ticket.wait() => result,
            _ = cancel.cancelled() => Err(RateLimitError::Cancelled),
        }
    }

    /// Try to acquire a single token without waiting
    pub fn try_acquire(&self) -> Result<bool, RateLimitError> {
        self.try_acquire_weighted(1.0)
    }

    /// Try to acquire `cost` tokens without waiting
    ///
    /// Returns `Ok(false)` when the caller would have to queue, including
    /// when others are already queued.
    pub fn try_acquire_weighted(&self, cost: f64) -> Result<bool, RateLimitError> {
        validate_cost(cost)?;

        let mut state = self.shared.state.lock();
        if !self.shared.enabled {
            state.metrics.record_immediate(cost);
            return Ok(true);
        }
        check_capacity(&state.bucket, cost)?;

        state.bucket.refill(Instant::now());
        if state.queue.is_empty() && state.bucket.try_take(cost) {
            state.metrics.record_immediate(cost);
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// Current tokens and queue length; refills but never admits anyone
    ///
    /// A disabled limiter reports infinite tokens, capacity and rate.
    pub fn status(&self) -> LimiterStatus {
        if !self.shared.enabled {
            return LimiterStatus {
                enabled: false,
                tokens_available: f64::INFINITY,
                queue_length: 0,
                capacity: f64::INFINITY,
                refill_rate_per_second: f64::INFINITY,
            };
        }

        let mut state = self.shared.state.lock();
        state.bucket.refill(Instant::now());
        LimiterStatus {
            enabled: true,
            tokens_available: state.bucket.tokens(),
            queue_length: state.queue.len(),
            capacity: state.bucket.capacity(),
            refill_rate_per_second: state.bucket.refill_rate(),
        }
    }

    /// Snapshot of cumulative admission counters
    pub fn metrics(&self) -> LimiterMetrics {
        self.shared.state.lock().metrics.clone()
    }

    /// Admit immediately, or take a place at the tail of the queue
    fn enter(&self, cost: f64) -> Result<Admission, RateLimitError> {
        validate_cost(cost)?;

        let now = Instant::now();
        let mut state = self.shared.state.lock();
        if !self.shared.enabled {
            state.metrics.record_immediate(cost);
            return Ok(Admission::Granted);
        }
        check_capacity(&state.bucket, cost)?;

        state.bucket.refill(now);
        // A non-empty queue means earlier callers come first, whatever the bucket holds
        if state.queue.is_empty() && state.bucket.try_take(cost) {
            state.metrics.record_immediate(cost);
            debug!(
                limiter = %self.shared.name,
                cost,
                remaining = state.bucket.tokens(),
                "Rate limiter: acquired tokens"
            );
            return Ok(Admission::Granted);
        }

        // Outside a runtime this panics before the queue or `draining` change
        let runtime = Handle::current();
        let (id, rx) = state.queue.push(cost, now);
        let queue_length = state.queue.len();
        let start_drain = !state.draining;
        state.draining = true;
        drop(state);

        debug!(
            limiter = %self.shared.name,
            cost,
            queue_length,
            "Rate limiter: no tokens available, queued"
        );

        if start_drain {
            runtime.spawn(drain(Arc::clone(&self.shared)));
        }

        Ok(Admission::Queued(Ticket {
            shared: Arc::clone(&self.shared),
            id,
            cost,
            enqueued_at: now,
            rx,
            settled: false,
        }))
    }
}

fn validate_cost(cost: f64) -> Result<(), RateLimitError> {
    if cost.is_finite() && cost > 0.0 {
        Ok(())
    } else {
        Err(RateLimitError::InvalidCost { cost })
    }
}

fn check_capacity(bucket: &TokenBucket, cost: f64) -> Result<(), RateLimitError> {
    if cost > bucket.capacity() {
        Err(RateLimitError::CostExceedsCapacity {
            cost,
            capacity: bucket.capacity(),
        })
    } else {
        Ok(())
    }
}
