//! Tests for the rate limiter
//!
//! Timing tests run on tokio's paused clock, so sleeps complete instantly
//! and admission instants are exact.

use super::{RateLimitError, RateLimiter};
use crate::config::RateLimitConfig;
use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .unwrap()
}

fn poll_once<F: Future>(future: F) -> Poll<F::Output> {
    let mut future = std::pin::pin!(future);
    future.as_mut().poll(&mut Context::from_waker(Waker::noop()))
}

/// Let spawned tasks run until they block
async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}

fn approx(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-6
}

#[test]
fn test_rejects_invalid_configuration() {
    for (capacity, rate) in [(0.0, 1.0), (-1.0, 1.0), (3.0, 0.0)] {
        let err = RateLimiter::new(capacity, rate).unwrap_err();
        assert!(
            matches!(err, RateLimitError::InvalidConfiguration { .. }),
            "capacity={capacity} rate={rate}"
        );
    }
}

#[tokio::test(start_paused = true)]
async fn test_burst_then_wait() {
    let limiter = RateLimiter::new(3.0, 1.0).unwrap();
    let start = Instant::now();

    for _ in 0..3 {
        limiter.acquire().await.unwrap();
    }
    assert_eq!(Instant::now(), start);

    let fourth = tokio::spawn({
        let limiter = limiter.clone();
        async move {
            limiter.acquire().await.unwrap();
            Instant::now()
        }
    });
    settle().await;
    assert!(!fourth.is_finished());
    assert_eq!(limiter.status().queue_length, 1);

    tokio::time::advance(Duration::from_millis(500)).await;
    let status = limiter.status();
    assert!(approx(status.tokens_available, 0.5), "{status:?}");
    assert_eq!(status.queue_length, 1);
    assert!(!fourth.is_finished());

    let admitted_at = fourth.await.unwrap();
    assert!(admitted_at - start >= Duration::from_secs(1));
    assert!(admitted_at - start < Duration::from_millis(1100));
    assert_eq!(limiter.status().queue_length, 0);
}

#[tokio::test(start_paused = true)]
async fn test_fifo_head_of_line_blocking() {
    let limiter = RateLimiter::new(3.0, 1.0).unwrap();
    limiter.acquire_weighted(3.0).await.unwrap();
    let start = Instant::now();
    let order = Arc::new(Mutex::new(Vec::new()));

    let spawn = |label: &'static str, cost: f64| {
        let limiter = limiter.clone();
        let order = Arc::clone(&order);
        tokio::spawn(async move {
            limiter.acquire_weighted(cost).await.unwrap();
            order.lock().push((label, Instant::now()));
        })
    };

    let a = spawn("a", 3.0);
    settle().await;
    let b = spawn("b", 1.0);
    settle().await;
    assert_eq!(limiter.status().queue_length, 2);

    a.await.unwrap();
    b.await.unwrap();

    let order = order.lock().clone();
    assert_eq!(order[0].0, "a");
    assert_eq!(order[1].0, "b");
    // b could have gone after one second on its own, but waits behind a
    assert!(order[0].1 - start >= Duration::from_secs(3));
    assert!(order[1].1 - start >= Duration::from_secs(4));
}

#[tokio::test(start_paused = true)]
async fn test_new_arrivals_do_not_bypass_queue() {
    let limiter = RateLimiter::new(2.0, 1.0).unwrap();
    limiter.acquire_weighted(2.0).await.unwrap();

    let head = tokio::spawn({
        let limiter = limiter.clone();
        async move { limiter.acquire_weighted(2.0).await }
    });
    settle().await;

    tokio::time::advance(Duration::from_millis(1500)).await;
    assert!(limiter.status().tokens_available >= 1.0);
    assert!(!limiter.try_acquire().unwrap());

    head.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_unsatisfiable_cost_fails_without_waiting() {
    let limiter = RateLimiter::new(3.0, 1.0).unwrap();
    let start = Instant::now();

    let err = limiter.acquire_weighted(3.5).await.unwrap_err();
    assert_eq!(
        err,
        RateLimitError::CostExceedsCapacity {
            cost: 3.5,
            capacity: 3.0
        }
    );
    assert_eq!(Instant::now(), start);
    assert_eq!(limiter.status().queue_length, 0);
    assert!(approx(limiter.status().tokens_available, 3.0));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn test_invalid_cost() {
    let limiter = RateLimiter::new(3.0, 1.0).unwrap();
    for cost in [0.0, -1.0, f64::NAN, f64::INFINITY] {
        let err = limiter.acquire_weighted(cost).await.unwrap_err();
        assert!(matches!(err, RateLimitError::InvalidCost { .. }), "{cost}");
        assert!(limiter.try_acquire_weighted(cost).is_err());
    }
}

#[tokio::test(start_paused = true)]
async fn test_capacity_bound_under_load() {
    let capacity = 5.0;
    let rate = 2.0;
    let limiter = RateLimiter::new(capacity, rate).unwrap();
    let start = Instant::now();

    let handles: Vec<_> = (0..30)
        .map(|_| {
            let limiter = limiter.clone();
            tokio::spawn(async move {
                limiter.acquire().await.unwrap();
                Instant::now()
            })
        })
        .collect();

    let mut admitted = Vec::new();
    for handle in handles {
        admitted.push(handle.await.unwrap() - start);
    }
    admitted.sort();

    for (index, at) in admitted.iter().enumerate() {
        let admitted_cost = (index + 1) as f64;
        let bound = capacity + at.as_secs_f64() * rate;
        assert!(admitted_cost <= bound + 1e-6, "{admitted_cost} > {bound} at {at:?}");
    }
    assert_eq!(admitted.iter().filter(|at| at.is_zero()).count(), 5);

    let metrics = limiter.metrics();
    assert_eq!(metrics.granted_immediately, 5);
    assert_eq!(metrics.granted_after_wait, 25);
    assert!(approx(metrics.admitted_cost, 30.0));
}

#[tokio::test(start_paused = true)]
async fn test_timeout_leaves_rest_of_queue_in_order() {
    let limiter = RateLimiter::new(1.0, 1.0).unwrap();
    limiter.acquire().await.unwrap();
    let start = Instant::now();
    let order = Arc::new(Mutex::new(Vec::new()));

    let spawn = |label: &'static str| {
        let limiter = limiter.clone();
        let order = Arc::clone(&order);
        tokio::spawn(async move {
            limiter.acquire().await.unwrap();
            order.lock().push((label, Instant::now()));
        })
    };

    let a = spawn("a");
    settle().await;
    let b = tokio::spawn({
        let limiter = limiter.clone();
        async move { limiter.acquire_timeout(1.0, Duration::from_millis(500)).await }
    });
    settle().await;
    let c = spawn("c");
    settle().await;
    assert_eq!(limiter.status().queue_length, 3);

    let err = b.await.unwrap().unwrap_err();
    match &err {
        RateLimitError::TimedOut { waited } => {
            assert!(*waited >= Duration::from_millis(500), "{waited:?}");
            assert!(*waited < Duration::from_millis(600), "{waited:?}");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(err.is_retryable());
    assert_eq!(limiter.status().queue_length, 2);

    a.await.unwrap();
    c.await.unwrap();
    let order = order.lock().clone();
    assert_eq!(order[0].0, "a");
    assert_eq!(order[1].0, "c");
    assert!(order[0].1 - start >= Duration::from_secs(1));
    assert!(order[1].1 - start >= Duration::from_secs(2));
    assert!(order[1].1 - start < Duration::from_millis(2100));
    assert_eq!(limiter.metrics().abandoned, 1);
}

#[tokio::test(start_paused = true)]
async fn test_timeout_not_hit_when_admitted_in_time() {
    let limiter = RateLimiter::new(1.0, 10.0).unwrap();
    limiter.acquire().await.unwrap();
    limiter
        .acquire_timeout(1.0, Duration::from_secs(1))
        .await
        .unwrap();
    assert_eq!(limiter.metrics().granted_after_wait, 1);
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_removes_waiter() {
    let limiter = RateLimiter::new(2.0, 0.5).unwrap();
    limiter.acquire_weighted(2.0).await.unwrap();
    let cancel = CancellationToken::new();

    let waiter = tokio::spawn({
        let limiter = limiter.clone();
        let cancel = cancel.clone();
        async move { limiter.acquire_cancellable(1.0, &cancel).await }
    });
    settle().await;
    assert_eq!(limiter.status().queue_length, 1);

    cancel.cancel();
    assert_eq!(waiter.await.unwrap(), Err(RateLimitError::Cancelled));
    assert_eq!(limiter.status().queue_length, 0);
    assert_eq!(limiter.metrics().abandoned, 1);

    // The bucket keeps refilling for the next caller
    tokio::time::advance(Duration::from_secs(2)).await;
    assert!(limiter.try_acquire().unwrap());
}

#[tokio::test]
async fn test_cancelled_token_fails_fast() {
    let limiter = RateLimiter::new(2.0, 1.0).unwrap();
    let cancel = CancellationToken::new();
    cancel.cancel();
    assert_eq!(
        limiter.acquire_cancellable(1.0, &cancel).await,
        Err(RateLimitError::Cancelled)
    );
    assert!(approx(limiter.status().tokens_available, 2.0));
}

#[tokio::test(start_paused = true)]
async fn test_queue_drains_again_after_going_idle() {
    let limiter = RateLimiter::new(1.0, 4.0).unwrap();

    for _ in 0..2 {
        limiter.acquire().await.unwrap();
        let start = Instant::now();
        limiter.acquire().await.unwrap();
        assert!(Instant::now() - start >= Duration::from_millis(250));
        tokio::time::advance(Duration::from_secs(5)).await;
    }
    assert_eq!(limiter.metrics().granted_after_wait, 2);
}

#[tokio::test]
async fn test_try_acquire() {
    let limiter = RateLimiter::new(2.0, 0.001).unwrap();
    assert!(limiter.try_acquire().unwrap());
    assert!(limiter.try_acquire_weighted(1.0).unwrap());
    assert!(!limiter.try_acquire().unwrap());
    assert!(matches!(
        limiter.try_acquire_weighted(3.0),
        Err(RateLimitError::CostExceedsCapacity { .. })
    ));
}

#[tokio::test]
async fn test_disabled_limiter_admits_everything() {
    let limiter = RateLimiter::from_config("local", &RateLimitConfig::disabled()).unwrap();
    assert!(!limiter.is_enabled());

    for _ in 0..100 {
        limiter.acquire_weighted(1000.0).await.unwrap();
    }
    assert!(limiter.try_acquire().unwrap());
    assert_eq!(limiter.metrics().granted_immediately, 101);
    assert_eq!(limiter.status().queue_length, 0);
}

#[test]
fn test_disabled_status_is_unbounded() {
    let status = RateLimiter::disabled("local").status();
    assert!(!status.enabled);
    assert_eq!(status.capacity, f64::INFINITY);
    assert_eq!(status.tokens_available, f64::INFINITY);

    let json = serde_json::to_value(status).unwrap();
    assert_eq!(json["enabled"], false);
    assert!(json["capacity"].is_null());
    assert!(json["tokens_available"].is_null());
    assert_eq!(json["queue_length"], 0);
}

#[tokio::test]
async fn test_clone_shares_state() {
    let limiter1 = RateLimiter::new(5.0, 0.001).unwrap();
    let limiter2 = limiter1.clone();

    limiter1.acquire().await.unwrap();
    limiter1.acquire().await.unwrap();

    assert_eq!(
        limiter1.status().tokens_available.floor(),
        limiter2.status().tokens_available.floor()
    );
    assert_eq!(limiter2.metrics().granted_immediately, 2);
}

#[tokio::test(start_paused = true)]
async fn test_status_does_not_admit() {
    let limiter = RateLimiter::new(1.0, 1.0).unwrap();
    limiter.acquire().await.unwrap();

    let waiter = tokio::spawn({
        let limiter = limiter.clone();
        async move { limiter.acquire().await }
    });
    settle().await;

    for _ in 0..5 {
        let status = limiter.status();
        assert_eq!(status.queue_length, 1);
        assert!(status.tokens_available < 1.0);
    }
    waiter.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_metrics_track_waits() {
    let limiter = RateLimiter::new(1.0, 2.0).unwrap();
    limiter.acquire().await.unwrap();
    limiter.acquire().await.unwrap();
    limiter.acquire().await.unwrap();

    let metrics = limiter.metrics();
    assert_eq!(metrics.granted_immediately, 1);
    assert_eq!(metrics.granted_after_wait, 2);
    assert_eq!(metrics.total_granted(), 3);
    assert!(metrics.max_wait >= Duration::from_millis(500));
    assert!(metrics.average_wait() >= Duration::from_millis(500));
}

#[test]
fn test_for_provider_uses_preset() {
    let limiter = RateLimiter::for_provider("Anthropic").unwrap();
    assert_eq!(limiter.name(), "anthropic");
    let status = limiter.status();
    assert_eq!(status.capacity, 5.0);
    assert!(approx(status.refill_rate_per_second, 50.0 / 60.0));
}

#[test]
fn test_error_display() {
    let timeout = RateLimitError::TimedOut {
        waited: Duration::from_secs(30),
    };
    assert!(timeout.to_string().contains("30"));

    let cost = RateLimitError::CostExceedsCapacity {
        cost: 12.0,
        capacity: 10.0,
    };
    assert!(cost.to_string().contains("12"));
    assert_eq!(cost.error_code(), "RATE_LIMIT_COST_EXCEEDS_CAPACITY");
}

#[test]
fn test_queue_recovers_after_runtime_shutdown() {
    let limiter = RateLimiter::new(1.0, 20.0).unwrap();

    let first = runtime();
    first.block_on(async {
        limiter.acquire().await.unwrap();
        let waiter = limiter.clone();
        tokio::spawn(async move { waiter.acquire().await });
        settle().await;
        assert_eq!(limiter.status().queue_length, 1);
    });
    // Drops the queued caller and the drain task mid-sleep
    drop(first);
    assert_eq!(limiter.status().queue_length, 0);

    let second = runtime();
    let result = second.block_on(async {
        tokio::time::timeout(Duration::from_secs(2), async {
            limiter.acquire().await?;
            limiter.acquire().await
        })
        .await
    });
    assert_eq!(result, Ok(Ok(())));
    assert!(limiter.metrics().granted_after_wait >= 1);
}

#[test]
fn test_waiter_restarts_drain_when_its_runtime_stops() {
    let limiter = RateLimiter::new(1.0, 5.0).unwrap();

    let first = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .enable_time()
        .build()
        .unwrap();
    first.block_on(async {
        limiter.acquire().await.unwrap();
        let waiter = limiter.clone();
        tokio::spawn(async move { waiter.acquire().await });
        tokio::time::sleep(Duration::from_millis(10)).await;
    });
    // The drain task serving the queue now lives on `first`

    let second = runtime();
    let result = second.block_on(async move {
        let waiter = limiter.clone();
        let queued = tokio::spawn(async move { waiter.acquire().await });
        settle().await;
        assert_eq!(limiter.status().queue_length, 2);

        first.shutdown_background();
        tokio::time::timeout(Duration::from_secs(2), queued).await
    });
    assert!(matches!(result, Ok(Ok(Ok(())))), "{result:?}");
}

#[test]
fn test_immediate_grant_needs_no_runtime() {
    let limiter = RateLimiter::new(2.0, 1.0).unwrap();
    assert_eq!(poll_once(limiter.acquire()), Poll::Ready(Ok(())));
    assert_eq!(poll_once(limiter.acquire_weighted(1.0)), Poll::Ready(Ok(())));
    assert!(!limiter.try_acquire().unwrap());
}

#[test]
fn test_queued_acquire_outside_runtime_leaves_state_clean() {
    let limiter = RateLimiter::new(1.0, 20.0).unwrap();
    assert!(limiter.try_acquire().unwrap());

    let outside = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        let _ = poll_once(limiter.acquire());
    }));
    assert!(outside.is_err());
    assert_eq!(limiter.status().queue_length, 0);

    // A later caller inside a runtime still gets a drain task
    let result = runtime().block_on(async {
        tokio::time::timeout(Duration::from_secs(2), limiter.acquire()).await
    });
    assert_eq!(result, Ok(Ok(())));
}
