// Copyright (c) 2025 The Rampart Authors
// SPDX-License-Identifier: MIT

//! Global NGINX parameters sourced from the primary ConfigMap.
//!
//! Parsing is fail-soft: an unparsable value keeps its default and produces
//! a warning the reconciler attaches to an event, so one bad key never takes
//! down the whole configuration.

use crate::constants::{
    CONFIG_VERSION_FILE, HTTP_CONF_DIR, STREAM_CONF_DIR, TLS_PASSTHROUGH_HOSTS_FILE,
};
use k8s_openapi::api::core::v1::ConfigMap;
use std::fmt::Write as _;

/// Tunables for the main `nginx.conf`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigParams {
    /// `worker_processes` directive value.
    pub worker_processes: String,

    /// `worker_connections` directive value.
    pub worker_connections: u32,

    /// `error_log` severity.
    pub error_log_level: String,

    /// `keepalive_timeout` directive value.
    pub keepalive_timeout: String,

    /// `proxy_connect_timeout` directive value.
    pub proxy_connect_timeout: String,

    /// `proxy_read_timeout` directive value.
    pub proxy_read_timeout: String,

    /// Emit the `server_tokens` directive as on/off.
    pub server_tokens: bool,

    /// Verbatim snippet appended inside the http block.
    pub http_snippets: Option<String>,

    /// Verbatim snippet appended inside the stream block.
    pub stream_snippets: Option<String>,
}

impl Default for ConfigParams {
    fn default() -> Self {
        Self {
            worker_processes: "auto".to_string(),
            worker_connections: 1024,
            error_log_level: "notice".to_string(),
            keepalive_timeout: "65s".to_string(),
            proxy_connect_timeout: "60s".to_string(),
            proxy_read_timeout: "60s".to_string(),
            server_tokens: true,
            http_snippets: None,
            stream_snippets: None,
        }
    }
}

impl ConfigParams {
    /// Build parameters from the primary ConfigMap.
    ///
    /// Returns the parameters plus one warning per key that was skipped.
    #[must_use]
    pub fn from_configmap(cm: &ConfigMap) -> (Self, Vec<String>) {
        let mut params = Self::default();
        let mut warnings = Vec::new();
        let Some(data) = &cm.data else {
            return (params, warnings);
        };

        for (key, value) in data {
            match key.as_str() {
                "worker-processes" => params.worker_processes = value.clone(),
                "worker-connections" => match value.parse::<u32>() {
                    Ok(v) if v > 0 => params.worker_connections = v,
                    _ => warnings.push(format!(
                        "Skipping worker-connections: {value:?} is not a positive integer"
                    )),
                },
                "error-log-level" => {
                    if matches!(
                        value.as_str(),
                        "debug" | "info" | "notice" | "warn" | "error" | "crit"
                    ) {
                        params.error_log_level = value.clone();
                    } else {
                        warnings
                            .push(format!("Skipping error-log-level: unknown level {value:?}"));
                    }
                }
                "keepalive-timeout" => params.keepalive_timeout = value.clone(),
                "proxy-connect-timeout" => params.proxy_connect_timeout = value.clone(),
                "proxy-read-timeout" => params.proxy_read_timeout = value.clone(),
                "server-tokens" => match value.parse::<bool>() {
                    Ok(v) => params.server_tokens = v,
                    Err(_) => warnings
                        .push(format!("Skipping server-tokens: {value:?} is not a boolean")),
                },
                "http-snippets" => params.http_snippets = Some(value.clone()),
                "stream-snippets" => params.stream_snippets = Some(value.clone()),
                other => warnings.push(format!("Ignoring unknown ConfigMap key {other:?}")),
            }
        }

        (params, warnings)
    }
}

/// Render the main `nginx.conf`.
///
/// `tls_passthrough` adds the SNI multiplexer on 443: an `ssl_preread`
/// stream server that proxies matched hosts to per-server unix sockets via
/// the generated host map.
#[must_use]
pub fn render_main_config(params: &ConfigParams, tls_passthrough: bool) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "worker_processes {};", params.worker_processes);
    let _ = writeln!(out, "error_log stderr {};", params.error_log_level);
    let _ = writeln!(out, "events {{");
    let _ = writeln!(out, "    worker_connections {};", params.worker_connections);
    let _ = writeln!(out, "}}");

    let _ = writeln!(out, "http {{");
    let _ = writeln!(
        out,
        "    server_tokens {};",
        if params.server_tokens { "on" } else { "off" }
    );
    let _ = writeln!(out, "    keepalive_timeout {};", params.keepalive_timeout);
    let _ = writeln!(out, "    proxy_connect_timeout {};", params.proxy_connect_timeout);
    let _ = writeln!(out, "    proxy_read_timeout {};", params.proxy_read_timeout);
    if let Some(snippets) = &params.http_snippets {
        for line in snippets.lines() {
            let _ = writeln!(out, "    {line}");
        }
    }
    let _ = writeln!(out, "    include {CONFIG_VERSION_FILE};");
    let _ = writeln!(out, "    include {HTTP_CONF_DIR}/*.conf;");
    let _ = writeln!(out, "}}");

    let _ = writeln!(out, "stream {{");
    if let Some(snippets) = &params.stream_snippets {
        for line in snippets.lines() {
            let _ = writeln!(out, "    {line}");
        }
    }
    if tls_passthrough {
        let _ = writeln!(
            out,
            "    map $ssl_preread_server_name $rampart_passthrough {{"
        );
        let _ = writeln!(out, "        include {TLS_PASSTHROUGH_HOSTS_FILE};");
        let _ = writeln!(out, "        default \"\";");
        let _ = writeln!(out, "    }}");
        let _ = writeln!(out, "    server {{");
        let _ = writeln!(out, "        listen 443;");
        let _ = writeln!(out, "        ssl_preread on;");
        let _ = writeln!(out, "        proxy_protocol on;");
        let _ = writeln!(out, "        proxy_pass $rampart_passthrough;");
        let _ = writeln!(out, "    }}");
    }
    let _ = writeln!(out, "    include {STREAM_CONF_DIR}/*.conf;");
    let _ = writeln!(out, "}}");

    out
}

#[cfg(test)]
#[path = "params_tests.rs"]
mod params_tests;
