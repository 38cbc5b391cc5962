// Copyright (c) 2025 The Rampart Authors
// SPDX-License-Identifier: MIT

//! Retry policy for Kubernetes API calls.
//!
//! Status and shim writes go through [`retry_api_call`], which retries
//! transient API errors (rate limiting, server errors, connection failures)
//! with jittered exponential backoff and gives up on client errors
//! immediately. Reconcile-level retries are handled separately by the work
//! queue; this layer only smooths over short API-server blips inside a
//! single reconcile.

use anyhow::Result;
use rand::RngExt as _;
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

/// Jittered exponential backoff schedule.
#[derive(Clone, Debug)]
pub struct ExponentialBackoff {
    /// Delay before the first retry.
    pub initial_interval: Duration,
    /// Multiplier applied after each retry.
    pub multiplier: f64,
    /// Upper bound on a single delay.
    pub max_interval: Duration,
    /// Total time budget; `None` retries until the caller gives up.
    pub max_elapsed_time: Option<Duration>,
    /// Randomisation factor, 0.0 to 1.0.
    pub jitter: f64,

    current_interval: Duration,
}

impl ExponentialBackoff {
    #[must_use]
    pub fn new(
        initial_interval: Duration,
        multiplier: f64,
        max_interval: Duration,
        max_elapsed_time: Option<Duration>,
        jitter: f64,
    ) -> Self {
        Self {
            initial_interval,
            multiplier,
            max_interval,
            max_elapsed_time,
            jitter,
            current_interval: initial_interval,
        }
    }

    /// The next delay to sleep, with jitter applied.
    pub fn next_backoff(&mut self) -> Duration {
        let interval = self.apply_jitter(self.current_interval);
        let next = self.current_interval.mul_f64(self.multiplier);
        self.current_interval = next.min(self.max_interval);
        interval
    }

    /// Reset the schedule to its initial interval.
    pub fn reset(&mut self) {
        self.current_interval = self.initial_interval;
    }

    fn apply_jitter(&self, interval: Duration) -> Duration {
        if self.jitter <= 0.0 {
            return interval;
        }
        let spread = interval.as_secs_f64() * self.jitter;
        let offset = rand::rng().random_range(-spread..=spread);
        Duration::from_secs_f64((interval.as_secs_f64() + offset).max(0.0))
    }
}

/// Default schedule for API calls: 100ms doubling to a 30s cap, ±10%
/// jitter, five minutes total.
#[must_use]
pub fn default_backoff() -> ExponentialBackoff {
    ExponentialBackoff::new(
        Duration::from_millis(100),
        2.0,
        Duration::from_secs(30),
        Some(Duration::from_secs(300)),
        0.1,
    )
}

/// Whether a Kubernetes API error is worth retrying.
///
/// Rate limiting (429) and server errors (5xx) are transient, as are
/// connection-level failures. Everything else is a client error and fails
/// immediately.
#[must_use]
pub fn is_retryable_error(err: &kube::Error) -> bool {
    match err {
        kube::Error::Api(api_err) => {
            api_err.code == 429 || (api_err.code >= 500 && api_err.code < 600)
        }
        kube::Error::Service(_) => true,
        _ => false,
    }
}

/// Run `operation` until it succeeds, a non-retryable error occurs, or the
/// backoff budget is exhausted.
///
/// # Errors
///
/// Returns the underlying error for non-retryable failures, or a budget
/// exhaustion error wrapping the last failure.
pub async fn retry_api_call<T, F, Fut>(mut operation: F, operation_name: &str) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, kube::Error>>,
{
    let mut backoff = default_backoff();
    let start = Instant::now();
    let mut attempt: u32 = 0;

    loop {
        attempt += 1;
        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(
                        operation = operation_name,
                        attempt,
                        elapsed = ?start.elapsed(),
                        "API call succeeded after retries"
                    );
                }
                return Ok(value);
            }
            Err(e) if !is_retryable_error(&e) => {
                error!(
                    operation = operation_name,
                    error = %e,
                    "Non-retryable API error"
                );
                return Err(e.into());
            }
            Err(e) => {
                if let Some(budget) = backoff.max_elapsed_time {
                    if start.elapsed() >= budget {
                        error!(
                            operation = operation_name,
                            attempt,
                            error = %e,
                            "Retry budget exhausted"
                        );
                        return Err(anyhow::anyhow!(
                            "retry budget exhausted after {attempt} attempts: {e}"
                        ));
                    }
                }
                let delay = backoff.next_backoff();
                warn!(
                    operation = operation_name,
                    attempt,
                    retry_after = ?delay,
                    error = %e,
                    "Transient API error, will retry"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
#[path = "retry_tests.rs"]
mod retry_tests;
