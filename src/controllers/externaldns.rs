// Copyright (c) 2025 The Rampart Authors
// SPDX-License-Identifier: MIT

//! external-dns shim: publishes DNSEndpoint records for VirtualServers
//! with `externalDNS.enable`.
//!
//! The record targets come from `status.externalEndpoints`, which the
//! leader writes once the fronting Service has an address. Until then the
//! shim returns a transient error and the worker requeues.

use anyhow::{anyhow, Result};
use kube::api::{Patch, PatchParams, PostParams};
use kube::{Api, Client, Resource, ResourceExt};
use std::net::IpAddr;
use tracing::{debug, warn};

use super::certshim::{is_owned_by_uid, owner_reference};
use super::events::{
    EventSink, REASON_BAD_CONFIG, REASON_CREATE_DNS_ENDPOINT, REASON_UPDATE_DNS_ENDPOINT,
};
use super::retry::retry_api_call;
use crate::crd::{DNSEndpoint, DNSEndpointSpec, Endpoint, ExternalEndpoint, VirtualServer};
use crate::store::Cache;

/// Derive `(targets, record_type)` from the fleet's external endpoints.
///
/// Any valid IPv4 address makes the record an `A`; otherwise IPv6 makes it
/// an `AAAA`; otherwise hostnames make it a `CNAME`. Invalid IP literals
/// are dropped. Returns `None` when nothing usable remains.
#[must_use]
pub fn derive_targets(endpoints: &[ExternalEndpoint]) -> Option<(Vec<String>, String)> {
    let mut ips: Vec<String> = Vec::new();
    let mut has_v4 = false;
    let mut has_v6 = false;
    let mut hostnames: Vec<String> = Vec::new();

    for endpoint in endpoints {
        if let Some(ip) = &endpoint.ip {
            match ip.parse::<IpAddr>() {
                Ok(IpAddr::V4(_)) => {
                    has_v4 = true;
                    ips.push(ip.clone());
                }
                Ok(IpAddr::V6(_)) => {
                    has_v6 = true;
                    ips.push(ip.clone());
                }
                Err(_) => {
                    debug!(ip = %ip, "Dropping invalid IP literal from DNS targets");
                }
            }
        }
        if let Some(hostname) = &endpoint.hostname {
            if !hostname.is_empty() {
                hostnames.push(hostname.clone());
            }
        }
    }

    if has_v4 {
        Some((ips, "A".to_string()))
    } else if has_v6 {
        Some((ips, "AAAA".to_string()))
    } else if !hostnames.is_empty() {
        Some((hostnames, "CNAME".to_string()))
    } else {
        None
    }
}

/// Build the DNSEndpoint this VirtualServer calls for.
///
/// Returns `None` when the stanza is absent or disabled, or no usable
/// targets exist yet.
#[must_use]
pub fn desired_dns_endpoint(vs: &VirtualServer) -> Option<DNSEndpoint> {
    let config = vs.spec.external_dns.as_ref()?;
    if !config.enable {
        return None;
    }
    let endpoints = vs
        .status
        .as_ref()
        .and_then(|status| status.external_endpoints.as_deref())
        .unwrap_or_default();
    let (targets, derived_type) = derive_targets(endpoints)?;

    let mut dep = DNSEndpoint::new(
        &vs.name_any(),
        DNSEndpointSpec {
            endpoints: vec![Endpoint {
                dns_name: vs.spec.host.clone(),
                targets,
                record_type: config.record_type.clone().unwrap_or(derived_type),
                record_ttl: config.record_ttl,
                labels: config.labels.clone(),
                provider_specific: config.provider_specific.clone(),
            }],
        },
    );
    dep.metadata.namespace = vs.namespace();
    dep.metadata.owner_references = Some(vec![owner_reference(vs)]);
    Some(dep)
}

/// Reconcile the DNSEndpoint for one VirtualServer.
///
/// # Errors
///
/// Returns a transient error while `status.externalEndpoints` is still
/// empty, and API errors (including `AlreadyExists` races) so the worker
/// requeues.
pub async fn sync_dns_endpoint(
    client: &Client,
    events: &EventSink,
    vs: &VirtualServer,
    dns_endpoints: &Cache<DNSEndpoint>,
) -> Result<()> {
    let Some(config) = vs.spec.external_dns.as_ref() else {
        return Ok(());
    };
    if !config.enable {
        return Ok(());
    }

    let namespace = vs.namespace().unwrap_or_default();
    let vs_uid = vs.meta().uid.clone().unwrap_or_default();

    let has_endpoints = vs
        .status
        .as_ref()
        .and_then(|status| status.external_endpoints.as_ref())
        .is_some_and(|endpoints| !endpoints.is_empty());
    if !has_endpoints {
        return Err(anyhow!(
            "external endpoints not yet allocated for {namespace}/{}",
            vs.name_any()
        ));
    }

    let Some(desired) = desired_dns_endpoint(vs) else {
        events
            .warning(
                vs,
                REASON_BAD_CONFIG,
                "no valid DNS targets could be derived from external endpoints".to_string(),
            )
            .await;
        return Ok(());
    };
    let name = desired.name_any();
    let api: Api<DNSEndpoint> = Api::namespaced(client.clone(), &namespace);

    match dns_endpoints.get(&namespace, &name) {
        None => {
            debug!(namespace = %namespace, endpoint = %name, "Creating DNSEndpoint");
            retry_api_call(
                || {
                    let api = api.clone();
                    let desired = desired.clone();
                    async move { api.create(&PostParams::default(), &desired).await }
                },
                "create_dns_endpoint",
            )
            .await?;
            events
                .normal(vs, REASON_CREATE_DNS_ENDPOINT, format!("Created DNSEndpoint {name}"))
                .await;
        }
        Some(existing) if !is_owned_by_uid(existing.owner_references(), &vs_uid) => {
            warn!(
                namespace = %namespace,
                endpoint = %name,
                "DNSEndpoint exists but is not owned by this VirtualServer, refusing to adopt"
            );
        }
        Some(existing) if existing.spec == desired.spec => {}
        Some(_) => {
            debug!(namespace = %namespace, endpoint = %name, "Updating DNSEndpoint");
            let patch = serde_json::json!({ "spec": desired.spec });
            retry_api_call(
                || {
                    let api = api.clone();
                    let patch = patch.clone();
                    let name = name.clone();
                    async move {
                        api.patch(&name, &PatchParams::default(), &Patch::Merge(&patch))
                            .await
                    }
                },
                "patch_dns_endpoint",
            )
            .await?;
            events
                .normal(vs, REASON_UPDATE_DNS_ENDPOINT, format!("Updated DNSEndpoint {name}"))
                .await;
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "externaldns_tests.rs"]
mod externaldns_tests;
