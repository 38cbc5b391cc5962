// Copyright (c) 2025 The Rampart Authors
// SPDX-License-Identifier: MIT

//! Reconciliation controllers.
//!
//! Three controllers share one scheduling skeleton: the main reconciler
//! (drives NGINX configuration), the cert-manager shim and the
//! external-dns shim. Each owns a work queue and exactly one worker task;
//! concurrency is per key, so reconciles for the same resource never
//! overlap within a controller.
//!
//! Cache handlers enqueue the parent key. Child objects (Certificates,
//! DNSEndpoints) resolve their controller owner reference first, so a
//! change to a generated object requeues the VirtualServer that owns it.

pub mod certshim;
pub mod configuration;
pub mod events;
pub mod externaldns;
pub mod ingress;
pub mod retry;
pub mod status;

use std::future::Future;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::queue::WorkQueue;

/// Drain a work queue with a sync function until the queue shuts down.
///
/// Failed keys are requeued with backoff; successful keys have their
/// failure history cleared. The loop ends when [`WorkQueue::shut_down`]
/// fires and the queue drains.
pub async fn run_worker<F, Fut>(queue: Arc<WorkQueue>, worker: &str, mut sync: F)
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = anyhow::Result<()>>,
{
    debug!(worker, "Worker started");
    while let Some(key) = queue.get().await {
        let started = std::time::Instant::now();
        let outcome = sync(key.clone()).await;
        crate::metrics::record_sync(worker, outcome.is_ok(), started.elapsed());
        match outcome {
            Ok(()) => queue.forget(&key),
            Err(e) => {
                warn!(worker, key = %key, error = %e, "Sync failed, requeuing");
                queue.add_rate_limited(&key);
            }
        }
        queue.done(&key);
        crate::metrics::set_queue_depth(worker, queue.len());
    }
    debug!(worker, "Worker stopped");
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod mod_tests;
