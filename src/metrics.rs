// Copyright (c) 2025 The Rampart Authors
// SPDX-License-Identifier: MIT

//! Prometheus metrics for the Rampart ingress controller.
//!
//! All metrics live in the `rampart_` namespace and are registered in
//! [`METRICS_REGISTRY`], exposed on the health server's `/metrics`
//! endpoint.

use prometheus::{
    CounterVec, Encoder, Gauge, GaugeVec, Histogram, HistogramOpts, HistogramVec, Opts, Registry,
    TextEncoder,
};
use std::sync::LazyLock;
use std::time::Duration;

/// Namespace prefix for all Rampart metrics.
const METRICS_NAMESPACE: &str = "rampart";

/// Global Prometheus metrics registry.
pub static METRICS_REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

// ============================================================================
// Reload metrics
// ============================================================================

/// Total NGINX reloads by outcome.
///
/// Labels:
/// - `status`: `success` or `error`
pub static RELOADS_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_nginx_reloads_total"),
        "Total number of NGINX reloads by outcome",
    );
    let counter = CounterVec::new(opts, &["status"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

/// Time from reload signal to verified worker pickup, in seconds.
pub static RELOAD_DURATION_SECONDS: LazyLock<Histogram> = LazyLock::new(|| {
    let opts = HistogramOpts::new(
        format!("{METRICS_NAMESPACE}_nginx_reload_duration_seconds"),
        "Time from reload signal to verified worker pickup in seconds",
    )
    .buckets(vec![0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 15.0, 60.0]);
    let histogram = Histogram::with_opts(opts).unwrap();
    METRICS_REGISTRY
        .register(Box::new(histogram.clone()))
        .unwrap();
    histogram
});

/// Whether the last reload succeeded (1) or failed (0).
pub static LAST_RELOAD_STATUS: LazyLock<Gauge> = LazyLock::new(|| {
    let gauge = Gauge::new(
        format!("{METRICS_NAMESPACE}_nginx_last_reload_status"),
        "Whether the last NGINX reload succeeded (1) or failed (0)",
    )
    .unwrap();
    METRICS_REGISTRY.register(Box::new(gauge.clone())).unwrap();
    gauge
});

/// The configuration version the running workers serve.
pub static CONFIG_VERSION: LazyLock<Gauge> = LazyLock::new(|| {
    let gauge = Gauge::new(
        format!("{METRICS_NAMESPACE}_nginx_config_version"),
        "Configuration version the running NGINX workers serve",
    )
    .unwrap();
    METRICS_REGISTRY.register(Box::new(gauge.clone())).unwrap();
    gauge
});

/// Total upstream updates applied through the Plus API without a reload.
pub static DYNAMIC_UPDATES_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_dynamic_updates_total"),
        "Total upstream updates applied through the Plus API without a reload",
    );
    let counter = CounterVec::new(opts, &["scope"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

// ============================================================================
// Reconciliation metrics
// ============================================================================

/// Total syncs by worker and outcome.
///
/// Labels:
/// - `worker`: `main`, `certshim` or `externaldns`
/// - `status`: `success` or `error`
pub static SYNCS_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_syncs_total"),
        "Total number of syncs by worker and outcome",
    );
    let counter = CounterVec::new(opts, &["worker", "status"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

/// Sync duration in seconds by worker.
pub static SYNC_DURATION_SECONDS: LazyLock<HistogramVec> = LazyLock::new(|| {
    let opts = HistogramOpts::new(
        format!("{METRICS_NAMESPACE}_sync_duration_seconds"),
        "Sync duration in seconds by worker",
    )
    .buckets(vec![0.001, 0.01, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0]);
    let histogram = HistogramVec::new(opts, &["worker"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(histogram.clone()))
        .unwrap();
    histogram
});

/// Keys currently waiting in a work queue.
pub static QUEUE_DEPTH: LazyLock<GaugeVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_workqueue_depth"),
        "Keys currently waiting in a work queue",
    );
    let gauge = GaugeVec::new(opts, &["queue"]).unwrap();
    METRICS_REGISTRY.register(Box::new(gauge.clone())).unwrap();
    gauge
});

// ============================================================================
// Leader election metrics
// ============================================================================

/// Current leadership status (1 = leader, 0 = follower).
pub static LEADER_STATUS: LazyLock<GaugeVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_leader_status"),
        "Current leadership status (1 = leader, 0 = follower)",
    );
    let gauge = GaugeVec::new(opts, &["pod"]).unwrap();
    METRICS_REGISTRY.register(Box::new(gauge.clone())).unwrap();
    gauge
});

// ============================================================================
// Recording helpers
// ============================================================================

/// Record a verified reload.
pub fn record_reload_success(duration: Duration, version: u64) {
    RELOADS_TOTAL.with_label_values(&["success"]).inc();
    RELOAD_DURATION_SECONDS.observe(duration.as_secs_f64());
    LAST_RELOAD_STATUS.set(1.0);
    // Precision loss is acceptable: versions reset on process restart.
    #[allow(clippy::cast_precision_loss)]
    CONFIG_VERSION.set(version as f64);
}

/// Record a failed reload.
pub fn record_reload_failure() {
    RELOADS_TOTAL.with_label_values(&["error"]).inc();
    LAST_RELOAD_STATUS.set(0.0);
}

/// Record a dynamic upstream update.
pub fn record_dynamic_update(scope: &str) {
    DYNAMIC_UPDATES_TOTAL.with_label_values(&[scope]).inc();
}

/// Record a completed sync.
pub fn record_sync(worker: &str, success: bool, duration: Duration) {
    let status = if success { "success" } else { "error" };
    SYNCS_TOTAL.with_label_values(&[worker, status]).inc();
    SYNC_DURATION_SECONDS
        .with_label_values(&[worker])
        .observe(duration.as_secs_f64());
}

/// Update a queue depth gauge.
pub fn set_queue_depth(queue: &str, depth: usize) {
    #[allow(clippy::cast_precision_loss)]
    QUEUE_DEPTH.with_label_values(&[queue]).set(depth as f64);
}

/// Update the leadership gauge for this pod.
pub fn set_leader_status(pod: &str, leader: bool) {
    LEADER_STATUS
        .with_label_values(&[pod])
        .set(if leader { 1.0 } else { 0.0 });
}

/// Render all registered metrics in the Prometheus text format.
///
/// # Errors
///
/// Returns an error when encoding fails.
pub fn gather_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let families = METRICS_REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&families, &mut buffer)?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}

#[cfg(test)]
#[path = "metrics_tests.rs"]
mod metrics_tests;
