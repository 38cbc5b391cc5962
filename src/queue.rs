// Copyright (c) 2025 The Rampart Authors
// SPDX-License-Identifier: MIT

//! Deduplicating, rate-limited work queue of `namespace/name` keys.
//!
//! Each sub-controller owns one [`WorkQueue`] and exactly one worker task
//! consuming it. Producers are the informer event handlers, which enqueue the
//! *parent* key for every observed change; handlers run inline on the watcher
//! task, so every producer-side operation is synchronous and non-suspending.
//! Only [`WorkQueue::get`] suspends.
//!
//! # Guarantees
//!
//! - **Deduplication**: while a key is pending or in flight, further `add`
//!   calls coalesce into at most one further run.
//! - **At-most-one in flight per key**: a key handed out by [`WorkQueue::get`]
//!   is not handed out again until [`WorkQueue::done`] is called for it.
//! - **Rate limiting**: [`WorkQueue::add_rate_limited`] applies per-key
//!   exponential backoff (5 s base, 5 min cap), reset by [`WorkQueue::forget`].
//! - **Shutdown**: in-flight work drains; subsequent `get` calls return
//!   `None`; post-shutdown `add` is a silent no-op.

use crate::constants::{QUEUE_BASE_DELAY, QUEUE_MAX_DELAY};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use tracing::trace;

/// Internal queue state, guarded by a single mutex.
///
/// The lock is only ever held for map/deque operations, never across an
/// await point.
struct QueueState {
    /// FIFO of keys ready to be handed to the worker.
    queue: VecDeque<String>,

    /// Keys that are queued or need re-processing after the current run.
    dirty: HashSet<String>,

    /// Keys currently held by the worker between `get` and `done`.
    processing: HashSet<String>,

    /// Per-key consecutive failure counts driving the backoff.
    failures: HashMap<String, u32>,

    /// Set once by `shut_down`; queue refuses new work afterwards.
    shutting_down: bool,
}

/// A multi-producer, single-consumer queue of opaque string keys.
pub struct WorkQueue {
    inner: Mutex<QueueState>,
    notify: Notify,
}

impl WorkQueue {
    /// Create an empty queue.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(QueueState {
                queue: VecDeque::new(),
                dirty: HashSet::new(),
                processing: HashSet::new(),
                failures: HashMap::new(),
                shutting_down: false,
            }),
            notify: Notify::new(),
        })
    }

    /// Lock the state, recovering from a poisoned lock.
    ///
    /// Queue operations cannot leave the maps inconsistent mid-panic, so the
    /// poison flag carries no information here.
    fn lock(&self) -> std::sync::MutexGuard<'_, QueueState> {
        self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Enqueue a key immediately.
    ///
    /// Coalesces with an already-pending copy of the same key. If the key is
    /// currently in flight, it is re-queued when the worker calls `done`.
    pub fn add(&self, key: &str) {
        {
            let mut state = self.lock();
            if state.shutting_down {
                trace!(key, "Dropping key: queue is shutting down");
                return;
            }
            if state.dirty.contains(key) {
                return;
            }
            state.dirty.insert(key.to_string());
            if state.processing.contains(key) {
                // Re-queued by done() once the current run finishes.
                return;
            }
            state.queue.push_back(key.to_string());
        }
        self.notify.notify_one();
    }

    /// Enqueue a key after its per-key backoff delay.
    ///
    /// Each call increments the key's failure count, doubling the delay up to
    /// the cap. [`WorkQueue::forget`] resets the count.
    pub fn add_rate_limited(self: &Arc<Self>, key: &str) {
        let delay = {
            let mut state = self.lock();
            if state.shutting_down {
                return;
            }
            let retries = state.failures.entry(key.to_string()).or_insert(0);
            let delay = backoff_delay(*retries);
            *retries += 1;
            delay
        };

        trace!(key, ?delay, "Scheduling rate-limited re-add");
        let queue = Arc::clone(self);
        let key = key.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            queue.add(&key);
        });
    }

    /// Block until a key is available or the queue is shut down.
    ///
    /// Returns `None` once the queue is shut down and drained. Every
    /// `Some(key)` must be answered with a [`WorkQueue::done`] call.
    pub async fn get(&self) -> Option<String> {
        loop {
            let notified = self.notify.notified();
            {
                let mut state = self.lock();
                if let Some(key) = state.queue.pop_front() {
                    state.dirty.remove(&key);
                    state.processing.insert(key.clone());
                    return Some(key);
                }
                if state.shutting_down {
                    return None;
                }
            }
            notified.await;
        }
    }

    /// Mark a key's current run finished.
    ///
    /// If the key was re-added while in flight it goes straight back onto the
    /// queue, collapsing the burst into one further run.
    pub fn done(&self, key: &str) {
        let requeued = {
            let mut state = self.lock();
            state.processing.remove(key);
            if state.dirty.contains(key) {
                state.queue.push_back(key.to_string());
                true
            } else {
                false
            }
        };
        if requeued {
            self.notify.notify_one();
        }
    }

    /// Reset the key's failure count, ending its backoff.
    pub fn forget(&self, key: &str) {
        self.lock().failures.remove(key);
    }

    /// Number of keys waiting (not counting in-flight keys).
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().queue.len()
    }

    /// Whether no keys are waiting.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Consecutive failures recorded for a key.
    #[must_use]
    pub fn num_requeues(&self, key: &str) -> u32 {
        self.lock().failures.get(key).copied().unwrap_or(0)
    }

    /// Shut the queue down.
    ///
    /// Pending keys may still be drained by the worker; new `add` calls are
    /// ignored; `get` returns `None` once the queue is empty.
    pub fn shut_down(&self) {
        self.lock().shutting_down = true;
        self.notify.notify_waiters();
    }

    /// Whether `shut_down` has been called.
    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        self.lock().shutting_down
    }
}

/// Exponential backoff delay for the given consecutive-failure count.
///
/// 5 s, 10 s, 20 s, ... capped at 5 minutes.
#[must_use]
pub fn backoff_delay(retries: u32) -> Duration {
    let exp = retries.min(16); // 5s << 16 already far beyond the cap
    let delay = QUEUE_BASE_DELAY * 2u32.saturating_pow(exp);
    delay.min(QUEUE_MAX_DELAY)
}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod queue_tests;
