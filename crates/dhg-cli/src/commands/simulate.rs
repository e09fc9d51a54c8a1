//! Admission simulation against a configured limiter
//!
//! Fires a batch of concurrent calls at one limiter and records when each
//! was admitted. Ctrl-C cancels every call still waiting.

use crate::args::SimulateArgs;
use crate::console::CliConsole;
use anyhow::{Context, bail};
use colored::*;
use dhg_core::{
    LimiterMetrics, LimiterRegistry, LimiterStatus, RateLimitError, RateLimiter, ThrottleConfig,
};
use serde::Serialize;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Outcome of one simulated call
#[derive(Debug, Clone, Serialize)]
pub struct CallOutcome {
    /// Position in which the call was issued
    pub call: usize,
    /// Offset from the start of the run at which the call was admitted
    #[serde(with = "humantime_serde")]
    pub admitted_after: Option<Duration>,
    /// How long a call that timed out had been queued
    #[serde(with = "humantime_serde")]
    pub waited: Option<Duration>,
    /// Why the call was not admitted
    pub error: Option<String>,
}

/// Everything a run produced
#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    pub provider: String,
    pub enabled: bool,
    pub cost: f64,
    #[serde(with = "humantime_serde")]
    pub timeout: Option<Duration>,
    pub outcomes: Vec<CallOutcome>,
    pub status: LimiterStatus,
    pub metrics: LimiterMetrics,
}

impl SimulationReport {
    /// Number of calls that were admitted
    pub fn admitted(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|outcome| outcome.admitted_after.is_some())
            .count()
    }
}

/// Execute the `simulate` command
pub async fn execute(
    config: &ThrottleConfig,
    args: SimulateArgs,
    verbose: bool,
) -> anyhow::Result<()> {
    if args.calls == 0 {
        bail!("--calls must be at least 1");
    }

    let registry = LimiterRegistry::new(config);
    let provider = args
        .provider
        .clone()
        .unwrap_or_else(|| registry.default_provider().to_string());
    let limiter = registry
        .get_or_create(&provider)
        .with_context(|| format!("Failed to create rate limiter for '{provider}'"))?;
    let timeout = args.timeout.or(registry.settings_for(&provider).max_wait);

    let cancel = CancellationToken::new();
    let watcher = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupted, cancelling waiting calls");
                cancel.cancel();
            }
        })
    };

    let report = run(&limiter, args.calls, args.cost, timeout, &cancel).await;
    watcher.abort();
    let report = report?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&CliConsole::new(verbose), &report);
    }
    Ok(())
}

/// Issue `calls` concurrent acquisitions of `cost` tokens and wait for all of them
pub async fn run(
    limiter: &RateLimiter,
    calls: usize,
    cost: f64,
    timeout: Option<Duration>,
    cancel: &CancellationToken,
) -> anyhow::Result<SimulationReport> {
    let started = Instant::now();

    let handles: Vec<_> = (0..calls)
        .map(|call| {
            let limiter = limiter.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                let acquisition = async {
                    match timeout {
                        Some(limit) => limiter.acquire_timeout(cost, limit).await,
                        None => limiter.acquire_weighted(cost).await,
                    }
                };
                let result = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => Err(RateLimitError::Cancelled),
                    result = acquisition => result,
                };
                match result {
                    Ok(()) => CallOutcome {
                        call,
                        admitted_after: Some(started.elapsed()),
                        waited: None,
                        error: None,
                    },
                    Err(e) => CallOutcome {
                        call,
                        admitted_after: None,
                        waited: match &e {
                            RateLimitError::TimedOut { waited } => Some(*waited),
                            _ => None,
                        },
                        error: Some(e.to_string()),
                    },
                }
            })
        })
        .collect();

    let mut outcomes = Vec::with_capacity(calls);
    for handle in handles {
        outcomes.push(handle.await.context("Simulated call panicked")?);
    }
    // Admitted calls first, in admission order
    outcomes.sort_by_key(|outcome| {
        (
            outcome.admitted_after.is_none(),
            outcome.admitted_after,
            outcome.call,
        )
    });

    Ok(SimulationReport {
        provider: limiter.name().to_string(),
        enabled: limiter.is_enabled(),
        cost,
        timeout,
        outcomes,
        status: limiter.status(),
        metrics: limiter.metrics(),
    })
}

fn print_report(console: &CliConsole, report: &SimulationReport) {
    console.print_header(&format!("Simulation: {}", report.provider));
    if report.enabled {
        console.field("Burst size", report.status.capacity);
        console.field(
            "Requests per minute",
            report.status.refill_rate_per_second * 60.0,
        );
    } else {
        console.warn("Rate limiting is disabled for this provider");
    }
    console.field("Cost per call", report.cost);
    if let Some(timeout) = report.timeout {
        console.field("Timeout", format!("{timeout:?}"));
    }
    println!();

    for outcome in &report.outcomes {
        let label = format!("call #{:<3}", outcome.call + 1);
        match (&outcome.admitted_after, &outcome.error) {
            (Some(offset), _) => println!(
                "  {} {} +{:.3}s",
                label.cyan(),
                "admitted".green(),
                offset.as_secs_f64()
            ),
            (None, Some(error)) => println!("  {} {}", label.cyan(), error.red()),
            (None, None) => println!("  {} {}", label.cyan(), "no result".dimmed()),
        }
    }

    console.print_header("Result");
    console.field(
        "Admitted",
        format!("{}/{}", report.admitted(), report.outcomes.len()),
    );
    console.field("Granted immediately", report.metrics.granted_immediately);
    console.field("Granted after wait", report.metrics.granted_after_wait);
    console.field("Abandoned", report.metrics.abandoned);
    console.field("Max wait", format!("{:?}", report.metrics.max_wait));
    console.field("Average wait", format!("{:?}", report.metrics.average_wait()));
    if report.enabled {
        console.field(
            "Tokens left",
            format!("{:.2}", report.status.tokens_available),
        );
    }

    if report.admitted() == report.outcomes.len() {
        console.success("All calls admitted");
    } else {
        console.warn("Some calls were not admitted");
    }
}
