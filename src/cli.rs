// Copyright (c) 2025 The Rampart Authors
// SPDX-License-Identifier: MIT

//! Command-line surface of the controller binary.
//!
//! Flags configure the watched namespaces (static list or label selector,
//! mutually exclusive), the proxy flavour, feature gates for the shims, and
//! the serving ports. Self identity (pod namespace and name) comes from the
//! downward-API environment variables.

use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::Parser;

use crate::constants::{
    DEFAULT_METRICS_PORT, DEFAULT_NGINX_CONF_ROOT, DEFAULT_PLUS_API_SOCKET,
    DEFAULT_READY_STATUS_PORT, DEFAULT_SERVICE_INSIGHT_PORT, DEFAULT_TLS_PASSTHROUGH_PORT,
    POD_NAMESPACE_ENV, POD_NAME_ENV,
};

/// Controller configuration parsed from flags.
#[derive(Parser, Debug, Clone)]
#[command(name = "rampart", version, about = "NGINX ingress controller for Kubernetes")]
pub struct Args {
    /// Namespace to watch. Repeatable; watches `default` when absent.
    #[arg(
        long = "watch-namespace",
        value_name = "NAMESPACE",
        conflicts_with = "watch_namespace_label"
    )]
    pub watch_namespaces: Vec<String>,

    /// Label selector for dynamic namespace discovery.
    #[arg(long = "watch-namespace-label", value_name = "SELECTOR")]
    pub watch_namespace_label: Option<String>,

    /// Drive NGINX Plus: dynamic upstream updates over the admin socket.
    #[arg(long = "nginx-plus")]
    pub nginx_plus: bool,

    /// NGINX prefix directory holding the generated configuration tree.
    #[arg(long = "nginx-prefix", value_name = "DIR", default_value = DEFAULT_NGINX_CONF_ROOT)]
    pub nginx_prefix: PathBuf,

    /// Path of the nginx binary.
    #[arg(long = "nginx-binary", value_name = "PATH", default_value = "/usr/sbin/nginx")]
    pub nginx_binary: PathBuf,

    /// Unix socket of the NGINX Plus admin API.
    #[arg(long = "plus-api-socket", value_name = "PATH", default_value = DEFAULT_PLUS_API_SOCKET)]
    pub plus_api_socket: PathBuf,

    /// Primary controller ConfigMap as `namespace/name`. Startup fails when
    /// set but unreadable.
    #[arg(long = "nginx-configmaps", value_name = "NAMESPACE/NAME")]
    pub nginx_configmaps: Option<String>,

    /// Service whose external address is published on resource statuses.
    #[arg(long = "external-service", value_name = "NAMESPACE/NAME")]
    pub external_service: Option<String>,

    /// GlobalConfiguration resource defining custom listeners.
    #[arg(long = "global-configuration", value_name = "NAMESPACE/NAME")]
    pub global_configuration: Option<String>,

    /// Generate cert-manager Certificates from VirtualServer TLS stanzas.
    #[arg(long = "enable-cert-manager")]
    pub enable_cert_manager: bool,

    /// Generate external-dns DNSEndpoints from VirtualServer stanzas.
    #[arg(long = "enable-external-dns")]
    pub enable_external_dns: bool,

    /// Contend for leadership; followers skip fleet-level status writes.
    #[arg(
        long = "enable-leader-election",
        value_name = "true|false",
        default_value_t = true,
        action = clap::ArgAction::Set
    )]
    pub enable_leader_election: bool,

    /// Accept TLS passthrough TransportServers.
    #[arg(long = "enable-tls-passthrough")]
    pub enable_tls_passthrough: bool,

    /// Port of the TLS passthrough internal proxy.
    #[arg(long = "tls-passthrough-port", value_name = "PORT", default_value_t = DEFAULT_TLS_PASSTHROUGH_PORT)]
    pub tls_passthrough_port: u16,

    /// Port of the readiness endpoint.
    #[arg(long = "ready-status-port", value_name = "PORT", default_value_t = DEFAULT_READY_STATUS_PORT)]
    pub ready_status_port: u16,

    /// Port of the Prometheus metrics endpoint.
    #[arg(long = "metrics-port", value_name = "PORT", default_value_t = DEFAULT_METRICS_PORT)]
    pub metrics_port: u16,

    /// Port of the deep service-insight probes.
    #[arg(long = "service-insight-port", value_name = "PORT", default_value_t = DEFAULT_SERVICE_INSIGHT_PORT)]
    pub service_insight_port: u16,

    /// Disable periodic telemetry reports.
    #[arg(long = "disable-telemetry")]
    pub disable_telemetry: bool,
}

impl Args {
    /// The namespaces to watch statically. Defaults to `default` when
    /// neither a list nor a label selector is given.
    #[must_use]
    pub fn static_namespaces(&self) -> Vec<String> {
        if self.watch_namespaces.is_empty() {
            vec!["default".to_string()]
        } else {
            self.watch_namespaces.clone()
        }
    }
}

/// Split a `namespace/name` flag value.
///
/// # Errors
///
/// Fails when the value is not exactly `namespace/name` with both parts
/// non-empty.
pub fn split_namespaced_name(value: &str) -> Result<(String, String)> {
    match value.split_once('/') {
        Some((namespace, name)) if !namespace.is_empty() && !name.is_empty() && !name.contains('/') => {
            Ok((namespace.to_string(), name.to_string()))
        }
        _ => bail!("expected namespace/name, got {value:?}"),
    }
}

/// Pod namespace and name from the downward API, with local-run fallbacks.
#[must_use]
pub fn pod_identity() -> (String, String) {
    let namespace =
        std::env::var(POD_NAMESPACE_ENV).unwrap_or_else(|_| "default".to_string());
    let name = std::env::var(POD_NAME_ENV).unwrap_or_else(|_| "rampart".to_string());
    (namespace, name)
}

#[cfg(test)]
#[path = "cli_tests.rs"]
mod cli_tests;
