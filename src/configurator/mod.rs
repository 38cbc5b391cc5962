// Copyright (c) 2025 The Rampart Authors
// SPDX-License-Identifier: MIT

//! Translation of composed resources into the running NGINX configuration.
//!
//! The [`Configurator`] sits between the reconcilers and the
//! [`NginxManager`]: it renders fragments, decides whether a change needs a
//! worker reload or can be applied through the Plus API, and keeps the
//! host/upstream bookkeeping the health endpoints answer from.
//!
//! # Reload decision
//!
//! Every apply renders the resource and classifies the change:
//!
//! - render unchanged, endpoints unchanged: nothing to do
//! - render unchanged, endpoints changed: Plus applies membership through
//!   the API without a reload; OSS renders peers inline so this case cannot
//!   occur there
//! - render changed: write the fragment and reload
//!
//! On OSS a change whose only config effect is split weights still reloads,
//! but is flagged so the reconciler can emit a `DynamicWeightsUnsupported`
//! warning event.

pub mod params;
pub mod render;
pub mod resources;

use crate::crd::TransportServerUpstream;
use crate::nginx::admin::{PlusClient, UpstreamServer};
use crate::nginx::{NginxError, NginxManager};
use params::{render_main_config, ConfigParams};
use render::{mask_weights, render_transport_server, render_virtual_server};
use resources::{passthrough_socket, SecretFile, SecretFileKind, TransportServerEx, VirtualServerEx};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

/// Key-value zone recording the live weight of every split group peer.
const SPLIT_WEIGHTS_ZONE: &str = "split_weights";

/// How an apply took effect.
#[derive(Debug, PartialEq, Eq)]
pub enum Applied {
    /// Nothing changed.
    Unchanged,

    /// Membership or weights were applied through the Plus API; no reload.
    Dynamic {
        /// Upstream groups that were reconciled.
        upstreams: usize,
    },

    /// The fragment changed and NGINX was reloaded.
    Reloaded {
        /// Config version now live.
        version: u64,
        /// Set when the only rendered difference was split weights, which
        /// OSS cannot apply dynamically.
        weights_fallback: bool,
    },
}

/// Classification of a pending change, separated out for testability.
#[derive(Debug, PartialEq, Eq)]
enum Plan {
    Unchanged,
    DynamicOnly,
    Reload { weights_fallback: bool },
}

/// Classify a render against the previously applied one.
fn classify(previous: Option<&str>, next: &str, endpoints_changed: bool, plus: bool) -> Plan {
    match previous {
        None => Plan::Reload {
            weights_fallback: false,
        },
        Some(previous) if previous == next => {
            if endpoints_changed {
                // Peers are inline on OSS, so a peer change always changes
                // the render there; only Plus reaches this arm.
                Plan::DynamicOnly
            } else {
                Plan::Unchanged
            }
        }
        Some(previous) => {
            let weights_only = !plus && mask_weights(previous) == mask_weights(next);
            Plan::Reload {
                weights_fallback: weights_only,
            }
        }
    }
}

/// Mutable bookkeeping behind one lock.
#[derive(Default)]
struct State {
    /// Last applied render per config object name.
    renders: HashMap<String, String>,

    /// Last applied peer sets per upstream group.
    endpoints: HashMap<String, Vec<UpstreamServer>>,

    /// SNI host map for TLS passthrough.
    passthrough_hosts: BTreeMap<String, String>,

    /// Hosts currently configured, `host -> config object name`.
    hosts: HashMap<String, String>,
}

/// Applies composed resources to NGINX.
pub struct Configurator {
    manager: Arc<NginxManager>,
    plus: Option<PlusClient>,
    state: Mutex<State>,
}

impl Configurator {
    /// Create a configurator. `plus` enables the dynamic API path.
    #[must_use]
    pub fn new(manager: Arc<NginxManager>, plus: Option<PlusClient>) -> Self {
        Self {
            manager,
            plus,
            state: Mutex::new(State::default()),
        }
    }

    /// Whether the dynamic Plus API path is available.
    #[must_use]
    pub fn is_plus(&self) -> bool {
        self.plus.is_some()
    }

    /// Hosts currently configured, for the deep probe endpoints.
    #[must_use]
    pub fn configured_hosts(&self) -> Vec<String> {
        self.lock().hosts.keys().cloned().collect()
    }

    /// Upstream groups currently known for a host.
    #[must_use]
    pub fn host_upstreams(&self, host: &str) -> Vec<String> {
        let state = self.lock();
        let Some(config_name) = state.hosts.get(host) else {
            return Vec::new();
        };
        let prefix = format!("{config_name}_");
        state
            .endpoints
            .keys()
            .filter(|group| group.starts_with(&prefix))
            .cloned()
            .collect()
    }

    /// Whether a host is currently configured.
    #[must_use]
    pub fn has_host(&self, host: &str) -> bool {
        self.lock().hosts.contains_key(host)
    }

    /// Upstream groups of a configured object, or `None` when the object
    /// is unknown.
    #[must_use]
    pub fn config_groups(&self, config_name: &str) -> Option<Vec<String>> {
        let state = self.lock();
        if !state.renders.contains_key(config_name) {
            return None;
        }
        let prefix = format!("{config_name}_");
        Some(
            state
                .endpoints
                .keys()
                .filter(|group| group.starts_with(&prefix))
                .cloned()
                .collect(),
        )
    }

    /// Resolve a TransportServer probe name to its rendered config object.
    ///
    /// Accepts the full `<namespace>_<name>` form and, when it matches
    /// exactly one configured object, the bare resource name. An ambiguous
    /// bare name resolves to nothing.
    #[must_use]
    pub fn find_transport_server(&self, name: &str) -> Option<String> {
        let state = self.lock();
        let exact = format!("ts_{name}");
        if state.renders.contains_key(&exact) {
            return Some(exact);
        }
        let suffix = format!("_{name}");
        let mut matches = state
            .renders
            .keys()
            .filter(|key| key.starts_with("ts_") && key.ends_with(&suffix));
        let first = matches.next()?.clone();
        matches.next().is_none().then_some(first)
    }

    /// Peer totals for one upstream group: `(total, up)`.
    ///
    /// On Plus the up count reflects live API membership; on OSS every
    /// configured peer counts as up, since the proxy exposes no state.
    ///
    /// # Errors
    ///
    /// Fails when the Plus API is unreachable.
    pub async fn probe_group(&self, group: &str) -> Result<(usize, usize), NginxError> {
        let desired = {
            let state = self.lock();
            state.endpoints.get(group).map(Vec::len).unwrap_or(0)
        };
        match &self.plus {
            Some(plus) => {
                let live = if group.starts_with("ts_") {
                    plus.stream_servers(group).await?
                } else {
                    plus.http_servers(group).await?
                };
                Ok((desired, live.len().min(desired)))
            }
            None => Ok((desired, desired)),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    // ========================================================================
    // Main config
    // ========================================================================

    /// Apply the primary ConfigMap parameters.
    ///
    /// # Errors
    ///
    /// Fails when the write or the reload fails.
    pub async fn apply_config_params(
        &self,
        config_params: &ConfigParams,
        tls_passthrough: bool,
    ) -> Result<Applied, NginxError> {
        let render = render_main_config(config_params, tls_passthrough);
        if !self.manager.write_main_config(&render)? {
            return Ok(Applied::Unchanged);
        }
        let version = self.manager.reload().await?;
        Ok(Applied::Reloaded {
            version,
            weights_fallback: false,
        })
    }

    // ========================================================================
    // VirtualServer
    // ========================================================================

    /// Apply a composed `VirtualServer`.
    ///
    /// # Errors
    ///
    /// Fails when writing, reloading or the Plus API call fails.
    pub async fn apply_virtual_server(&self, ex: &VirtualServerEx) -> Result<Applied, NginxError> {
        let config_name = ex.config_name();
        let render = render_virtual_server(ex, self.is_plus());
        let desired = desired_virtual_server_groups(ex);
        // Secret material lands on disk before the fragment that names it,
        // and a change to it forces a reload even when the render is stable.
        let secrets_changed = self.write_secret_files(&ex.secrets)?;
        self.apply(
            &config_name,
            &render,
            desired,
            ex.virtual_server.spec.host.clone(),
            secrets_changed,
        )
        .await
    }

    /// Remove a `VirtualServer`'s configuration.
    ///
    /// # Errors
    ///
    /// Fails when the file removal or the reload fails.
    pub async fn delete_virtual_server(&self, config_name: &str) -> Result<Applied, NginxError> {
        let changed = self.manager.delete_server_config(config_name)?;
        self.manager.delete_state_files(config_name)?;
        {
            let mut state = self.lock();
            state.renders.remove(config_name);
            state.hosts.retain(|_, v| v != config_name);
            let prefix = format!("{config_name}_");
            state.endpoints.retain(|group, _| !group.starts_with(&prefix));
        }
        if !changed {
            return Ok(Applied::Unchanged);
        }
        let version = self.manager.reload().await?;
        info!(config_name, version, "Removed VirtualServer config");
        Ok(Applied::Reloaded {
            version,
            weights_fallback: false,
        })
    }

    // ========================================================================
    // TransportServer
    // ========================================================================

    /// Apply a composed `TransportServer`.
    ///
    /// Passthrough servers additionally maintain the SNI host map.
    ///
    /// # Errors
    ///
    /// Fails when writing, reloading or the Plus API call fails.
    pub async fn apply_transport_server(
        &self,
        ex: &TransportServerEx,
    ) -> Result<Applied, NginxError> {
        let config_name = ex.config_name();
        let render = render_transport_server(ex, self.is_plus());
        let desired = desired_transport_server_groups(ex);
        let secrets_changed = self.write_secret_files(&ex.secrets)?;

        let mut map_changed = false;
        if ex.listener_port.is_none() {
            if let Some(host) = &ex.transport_server.spec.host {
                let socket = passthrough_socket(ex.namespace(), ex.name());
                let map = {
                    let mut state = self.lock();
                    state.passthrough_hosts.insert(host.clone(), socket);
                    state.passthrough_hosts.clone()
                };
                map_changed = self.manager.write_tls_passthrough_hosts(&map)?;
            }
        }

        let host = ex.transport_server.spec.host.clone().unwrap_or_default();
        let applied = self
            .apply(&config_name, &render, desired, host, map_changed | secrets_changed)
            .await?;
        Ok(applied)
    }

    /// Remove a `TransportServer`'s configuration and host-map entry.
    ///
    /// # Errors
    ///
    /// Fails when the file removal or the reload fails.
    pub async fn delete_transport_server(&self, config_name: &str) -> Result<Applied, NginxError> {
        let changed = self.manager.delete_stream_config(config_name)?;
        self.manager.delete_state_files(config_name)?;
        let map = {
            let mut state = self.lock();
            state.renders.remove(config_name);
            state.hosts.retain(|_, v| v != config_name);
            let prefix = format!("{config_name}_");
            state.endpoints.retain(|group, _| !group.starts_with(&prefix));
            let socket_suffix = config_name
                .strip_prefix("ts_")
                .map(|rest| rest.replace('_', "-"))
                .unwrap_or_default();
            let before = state.passthrough_hosts.len();
            state
                .passthrough_hosts
                .retain(|_, socket| !socket.contains(&socket_suffix));
            (state.passthrough_hosts.len() != before).then(|| state.passthrough_hosts.clone())
        };

        let mut dirty = changed;
        if let Some(map) = map {
            dirty |= self.manager.write_tls_passthrough_hosts(&map)?;
        }
        if !dirty {
            return Ok(Applied::Unchanged);
        }
        let version = self.manager.reload().await?;
        info!(config_name, version, "Removed TransportServer config");
        Ok(Applied::Reloaded {
            version,
            weights_fallback: false,
        })
    }

    // ========================================================================
    // Shared apply path
    // ========================================================================

    /// Write referenced secret material under `secrets/`.
    ///
    /// Returns whether anything on disk changed.
    fn write_secret_files(&self, secrets: &[SecretFile]) -> Result<bool, NginxError> {
        let mut changed = false;
        for secret in secrets {
            changed |= match secret.kind {
                SecretFileKind::Tls => {
                    self.manager.write_tls_secret(&secret.name, &secret.content)?
                }
                SecretFileKind::Aux => {
                    self.manager.write_aux_secret(&secret.name, &secret.content)?
                }
            };
        }
        Ok(changed)
    }

    /// Write-and-reload or go dynamic, based on [`classify`].
    async fn apply(
        &self,
        config_name: &str,
        render: &str,
        desired: HashMap<String, Vec<UpstreamServer>>,
        host: String,
        force_reload: bool,
    ) -> Result<Applied, NginxError> {
        let (plan, stale_groups) = {
            let state = self.lock();
            let previous = state.renders.get(config_name).map(String::as_str);
            let stale: Vec<String> = desired
                .iter()
                .filter(|(group, peers)| state.endpoints.get(*group) != Some(peers))
                .map(|(group, _)| group.clone())
                .collect();
            let mut plan = classify(previous, render, !stale.is_empty(), self.is_plus());
            if force_reload && plan == Plan::Unchanged {
                plan = Plan::Reload {
                    weights_fallback: false,
                };
            }
            (plan, stale)
        };

        match plan {
            Plan::Unchanged => Ok(Applied::Unchanged),
            Plan::DynamicOnly => {
                let Some(plus) = &self.plus else {
                    return Ok(Applied::Unchanged);
                };
                // Dynamic updates are only safe against the configuration
                // they were planned for.
                self.manager.confirm_version().await?;
                let mut updated = 0;
                for group in &stale_groups {
                    if let Some(peers) = desired.get(group) {
                        let is_stream = group.starts_with("ts_");
                        if is_stream {
                            plus.update_stream_servers(group, peers).await?;
                        } else {
                            plus.update_http_servers(group, peers).await?;
                        }
                        if group.contains("_split_") {
                            let weights: serde_json::Map<String, serde_json::Value> = peers
                                .iter()
                                .map(|peer| {
                                    (
                                        peer.server.clone(),
                                        serde_json::Value::from(peer.weight.unwrap_or(1)),
                                    )
                                })
                                .collect();
                            plus.upsert_key_value(
                                SPLIT_WEIGHTS_ZONE,
                                group,
                                &serde_json::Value::Object(weights),
                            )
                            .await?;
                        }
                        updated += 1;
                    }
                }
                self.commit(config_name, render, desired, host);
                crate::metrics::record_dynamic_update(if config_name.starts_with("ts_") {
                    "stream"
                } else {
                    "http"
                });
                debug!(config_name, updated, "Applied change dynamically");
                Ok(Applied::Dynamic { upstreams: updated })
            }
            Plan::Reload { weights_fallback } => {
                if config_name.starts_with("ts_") {
                    self.manager.write_stream_config(config_name, render)?;
                } else {
                    self.manager.write_server_config(config_name, render)?;
                }
                let version = self.manager.reload().await?;
                // Plus workers restart with state files; re-sync membership
                // so new groups get their peers.
                if let Some(plus) = &self.plus {
                    for (group, peers) in &desired {
                        if group.starts_with("ts_") {
                            plus.update_stream_servers(group, peers).await?;
                        } else {
                            plus.update_http_servers(group, peers).await?;
                        }
                    }
                }
                self.commit(config_name, render, desired, host);
                info!(config_name, version, "Applied change with reload");
                Ok(Applied::Reloaded {
                    version,
                    weights_fallback,
                })
            }
        }
    }

    /// Record the applied state.
    fn commit(
        &self,
        config_name: &str,
        render: &str,
        desired: HashMap<String, Vec<UpstreamServer>>,
        host: String,
    ) {
        let mut state = self.lock();
        state
            .renders
            .insert(config_name.to_string(), render.to_string());
        for (group, peers) in desired {
            state.endpoints.insert(group, peers);
        }
        if !host.is_empty() {
            state.hosts.insert(host, config_name.to_string());
        }
    }
}

/// Desired Plus membership for every group a `VirtualServer` owns.
fn desired_virtual_server_groups(ex: &VirtualServerEx) -> HashMap<String, Vec<UpstreamServer>> {
    let spec = &ex.virtual_server.spec;
    let mut groups = HashMap::new();

    for upstream in &spec.upstreams {
        let group = ex.upstream_name(&upstream.name);
        let peers = ex
            .endpoints
            .get(&group)
            .map_or(&[][..], |p| p)
            .iter()
            .map(|addr| UpstreamServer {
                max_fails: upstream.max_fails,
                fail_timeout: upstream.fail_timeout.clone(),
                ..UpstreamServer::new(addr.clone())
            })
            .collect();
        groups.insert(group, peers);
    }

    let mut split_index = 0usize;
    for route in &spec.routes {
        if let Some(splits) = &route.splits {
            let group = format!("{}_split_{split_index}", ex.config_name());
            let mut peers = Vec::new();
            for split in splits {
                if let Some(pass) = &split.action.pass {
                    let source = ex.upstream_name(pass);
                    for addr in ex.endpoints.get(&source).map_or(&[][..], |p| p) {
                        peers.push(UpstreamServer {
                            weight: Some(u32::from(split.weight)),
                            ..UpstreamServer::new(addr.clone())
                        });
                    }
                }
            }
            groups.insert(group, peers);
            split_index += 1;
        }
    }

    groups
}

/// Desired Plus membership for every group a `TransportServer` owns.
fn desired_transport_server_groups(ex: &TransportServerEx) -> HashMap<String, Vec<UpstreamServer>> {
    ex.transport_server
        .spec
        .upstreams
        .iter()
        .map(|upstream: &TransportServerUpstream| {
            let group = ex.upstream_name(&upstream.name);
            let peers = ex
                .endpoints
                .get(&group)
                .map_or(&[][..], |p| p)
                .iter()
                .map(|addr| UpstreamServer {
                    max_conns: upstream.max_conns,
                    ..UpstreamServer::new(addr.clone())
                })
                .collect();
            (group, peers)
        })
        .collect()
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod mod_tests;
