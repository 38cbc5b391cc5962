// Copyright (c) 2025 The Rampart Authors
// SPDX-License-Identifier: MIT

//! Periodic product telemetry.
//!
//! Once per interval (with jitter, so a fleet of controllers does not
//! report in lockstep) the collector assembles a [`Report`] from the
//! cluster and the resource caches and hands it to an [`Exporter`].
//! Collection is strictly best effort: a field that cannot be determined
//! is reported as an empty string, and an export failure is logged and
//! retried on the next cycle. Telemetry never affects reconciliation.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, ReplicaSet};
use k8s_openapi::api::core::v1::{Namespace, Node, Pod};
use kube::{Api, Client};
use rand::RngExt as _;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::constants::{TELEMETRY_PROJECT_NAME, TELEMETRY_REPORT_INTERVAL};
use crate::namespaces::NamespaceManager;

/// One telemetry report.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub project_name: String,
    pub version: String,
    pub arch: String,
    #[serde(rename = "clusterID")]
    pub cluster_id: String,
    pub cluster_version: String,
    pub cluster_platform: String,
    pub node_count: usize,
    #[serde(rename = "installationID")]
    pub installation_id: String,
    pub replica_count: i32,
    pub vs_count: usize,
    pub vsr_count: usize,
    pub ts_count: usize,
}

/// Sink for assembled reports.
#[async_trait]
pub trait Exporter: Send + Sync {
    /// Ship one report.
    ///
    /// # Errors
    ///
    /// Fails when the report cannot be delivered.
    async fn export(&self, report: &Report) -> Result<()>;
}

/// Exporter that writes reports as JSON lines to stdout.
pub struct StdoutExporter;

#[async_trait]
impl Exporter for StdoutExporter {
    async fn export(&self, report: &Report) -> Result<()> {
        println!("{}", serde_json::to_string(report)?);
        Ok(())
    }
}

/// Assembles reports from the cluster and the resource caches.
pub struct Collector {
    client: Client,
    namespaces: Arc<NamespaceManager>,
    pod_namespace: String,
    pod_name: String,
}

impl Collector {
    #[must_use]
    pub fn new(
        client: Client,
        namespaces: Arc<NamespaceManager>,
        pod_namespace: String,
        pod_name: String,
    ) -> Self {
        Self { client, namespaces, pod_namespace, pod_name }
    }

    /// Assemble one report. Fields that cannot be determined are empty.
    pub async fn collect(&self) -> Report {
        let (node_count, cluster_platform) = self.nodes().await;
        let (installation_id, replica_count) =
            self.installation().await.unwrap_or_else(|| (String::new(), 0));
        let (vs_count, vsr_count, ts_count) = resource_counts(&self.namespaces);

        Report {
            project_name: TELEMETRY_PROJECT_NAME.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            arch: std::env::consts::ARCH.to_string(),
            cluster_id: self.cluster_id().await,
            cluster_version: self.cluster_version().await,
            cluster_platform,
            node_count,
            installation_id,
            replica_count,
            vs_count,
            vsr_count,
            ts_count,
        }
    }

    /// The UID of the `kube-system` namespace, the conventional cluster id.
    async fn cluster_id(&self) -> String {
        let api: Api<Namespace> = Api::all(self.client.clone());
        match api.get("kube-system").await {
            Ok(ns) => ns.metadata.uid.unwrap_or_default(),
            Err(e) => {
                debug!(error = %e, "Could not read kube-system namespace");
                String::new()
            }
        }
    }

    async fn cluster_version(&self) -> String {
        match self.client.apiserver_version().await {
            Ok(info) => info.git_version,
            Err(e) => {
                debug!(error = %e, "Could not read API server version");
                String::new()
            }
        }
    }

    /// Node count and the platform derived from the first node's provider id.
    async fn nodes(&self) -> (usize, String) {
        let api: Api<Node> = Api::all(self.client.clone());
        match api.list(&kube::api::ListParams::default()).await {
            Ok(nodes) => {
                let provider_id = nodes
                    .items
                    .first()
                    .and_then(|node| node.spec.as_ref())
                    .and_then(|spec| spec.provider_id.as_deref());
                (nodes.items.len(), platform_from_provider_id(provider_id))
            }
            Err(e) => {
                debug!(error = %e, "Could not list nodes");
                (0, String::new())
            }
        }
    }

    /// The UID of the workload owning this pod, and its replica count.
    ///
    /// Deployment-managed pods resolve through their ReplicaSet to the
    /// Deployment; DaemonSet-managed pods use the DaemonSet directly.
    async fn installation(&self) -> Option<(String, i32)> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), &self.pod_namespace);
        let pod = pods.get(&self.pod_name).await.ok()?;
        let owner = pod
            .metadata
            .owner_references
            .as_ref()?
            .iter()
            .find(|r| r.controller == Some(true))?
            .clone();

        match owner.kind.as_str() {
            "ReplicaSet" => {
                let replica_sets: Api<ReplicaSet> =
                    Api::namespaced(self.client.clone(), &self.pod_namespace);
                let rs = replica_sets.get(&owner.name).await.ok()?;
                let deployment_ref = rs
                    .metadata
                    .owner_references
                    .as_ref()?
                    .iter()
                    .find(|r| r.controller == Some(true) && r.kind == "Deployment")?
                    .clone();
                let deployments: Api<Deployment> =
                    Api::namespaced(self.client.clone(), &self.pod_namespace);
                let deployment = deployments.get(&deployment_ref.name).await.ok()?;
                let replicas = deployment.spec.as_ref().and_then(|s| s.replicas).unwrap_or(0);
                Some((deployment.metadata.uid.unwrap_or_default(), replicas))
            }
            "DaemonSet" => {
                let daemon_sets: Api<DaemonSet> =
                    Api::namespaced(self.client.clone(), &self.pod_namespace);
                let ds = daemon_sets.get(&owner.name).await.ok()?;
                let replicas = ds
                    .status
                    .as_ref()
                    .map(|s| s.desired_number_scheduled)
                    .unwrap_or(0);
                Some((ds.metadata.uid.unwrap_or_default(), replicas))
            }
            _ => None,
        }
    }
}

/// Total resource counts across every watched namespace.
fn resource_counts(namespaces: &NamespaceManager) -> (usize, usize, usize) {
    let mut vs = 0;
    let mut vsr = 0;
    let mut ts = 0;
    for group in namespaces.all() {
        vs += group.virtual_servers.len();
        vsr += group.virtual_server_routes.len();
        ts += group.transport_servers.len();
    }
    (vs, vsr, ts)
}

/// The platform name embedded in a node provider id.
///
/// Provider ids look like `aws:///us-west-2a/i-0abc...`; the scheme names
/// the platform. Absent or malformed ids map to `"other"`.
fn platform_from_provider_id(provider_id: Option<&str>) -> String {
    let Some(id) = provider_id else {
        return "other".to_string();
    };
    match id.split_once("://") {
        Some((scheme, _)) if !scheme.is_empty() => scheme.to_string(),
        _ => "other".to_string(),
    }
}

/// Report forever with a jittered interval until the stop channel fires.
pub async fn run(
    collector: Collector,
    exporter: Arc<dyn Exporter>,
    mut stop: watch::Receiver<bool>,
) {
    loop {
        let report = collector.collect().await;
        match exporter.export(&report).await {
            Ok(()) => info!(vs = report.vs_count, ts = report.ts_count, "Sent telemetry report"),
            Err(e) => warn!(error = %e, "Failed to export telemetry report"),
        }

        let interval = jittered_interval(TELEMETRY_REPORT_INTERVAL);
        tokio::select! {
            () = tokio::time::sleep(interval) => {}
            _ = stop.changed() => {
                if *stop.borrow() {
                    debug!("Telemetry loop stopped");
                    return;
                }
            }
        }
    }
}

/// Apply ±10% jitter to the report interval.
fn jittered_interval(base: std::time::Duration) -> std::time::Duration {
    let spread = base.as_secs_f64() * 0.1;
    let delta = rand::rng().random_range(-spread..=spread);
    std::time::Duration::from_secs_f64((base.as_secs_f64() + delta).max(1.0))
}

#[cfg(test)]
#[path = "telemetry_tests.rs"]
mod telemetry_tests;
