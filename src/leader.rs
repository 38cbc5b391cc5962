// Copyright (c) 2025 The Rampart Authors
// SPDX-License-Identifier: MIT

//! Leader election over a Kubernetes Lease.
//!
//! One replica at a time holds the lease and is allowed to write
//! fleet-level status fields. Followers watch the leadership channel and
//! stop those writes the moment it flips; per-replica validation status is
//! not gated.

use anyhow::Result;
use kube::Client;
use kube_lease_manager::LeaseManagerBuilder;
use tokio::sync::watch;
use tracing::info;

use crate::constants::{
    DEFAULT_LEASE_DURATION_SECS, DEFAULT_LEASE_GRACE_SECS, LEADER_ELECTION_LEASE,
};

/// Start contending for leadership.
///
/// Returns a watch channel carrying the current leadership state. The
/// lease task runs until the process exits; on lease loss the channel
/// flips to `false` before the next renewal interval.
///
/// # Errors
///
/// Fails when the Lease object cannot be created or read.
pub async fn start(
    client: Client,
    namespace: &str,
    identity: &str,
) -> Result<watch::Receiver<bool>> {
    let manager = LeaseManagerBuilder::new(client, LEADER_ELECTION_LEASE)
        .with_namespace(namespace.to_string())
        .with_identity(identity.to_string())
        .with_duration(DEFAULT_LEASE_DURATION_SECS)
        .with_grace(DEFAULT_LEASE_GRACE_SECS)
        .build()
        .await?;

    let (receiver, _task) = manager.watch().await;

    // Mirror leadership changes into logs and metrics.
    let mut mirror = receiver.clone();
    let pod = identity.to_string();
    tokio::spawn(async move {
        loop {
            let leader = *mirror.borrow_and_update();
            crate::metrics::set_leader_status(&pod, leader);
            if leader {
                info!(identity = %pod, "Acquired leadership");
            } else {
                info!(identity = %pod, "Not the leader");
            }
            if mirror.changed().await.is_err() {
                return;
            }
        }
    });

    Ok(receiver)
}
