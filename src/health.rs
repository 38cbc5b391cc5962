// Copyright (c) 2025 The Rampart Authors
// SPDX-License-Identifier: MIT

//! Readiness, metrics and deep service-insight endpoints.
//!
//! The controller serves a small HTTP surface next to the proxy:
//!
//! - `GET /nginx-ready` answers 200 once the first configuration version
//!   has been verified live, 503 before that. Kubernetes readiness probes
//!   point here so a pod only receives traffic after NGINX serves the
//!   generated configuration.
//! - `GET /probe/{hostname}` and `GET /probe/ts/{name}` report peer
//!   health for a configured host or TransportServer: 404 for unknown
//!   names, 500 when the proxy admin API cannot be queried, 418 when
//!   every peer is down, 200 with a JSON body otherwise. The
//!   TransportServer probe accepts `<namespace>_<name>` or, when unique,
//!   the bare resource name.
//! - `GET /metrics` exposes the Prometheus registry in text format.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tracing::{error, info};

use crate::configurator::Configurator;
use crate::nginx::NginxManager;

/// Shared state behind the health router.
pub struct HealthState {
    /// Manager answering readiness.
    pub manager: Arc<NginxManager>,

    /// Configurator answering host and peer lookups.
    pub configurator: Arc<Configurator>,
}

/// Peer counts for one probed host or TransportServer.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct ProbeReport {
    /// Configured peers across all upstream groups.
    #[serde(rename = "Total")]
    pub total: usize,

    /// Peers currently up.
    #[serde(rename = "Up")]
    pub up: usize,

    /// Peers configured but not up.
    #[serde(rename = "Unhealthy")]
    pub unhealthy: usize,
}

/// Build the health router.
#[must_use]
pub fn router(state: Arc<HealthState>) -> Router {
    Router::new()
        .route("/nginx-ready", get(nginx_ready))
        .route("/probe/{hostname}", get(probe_host))
        .route("/probe/ts/{name}", get(probe_transport_server))
        .route("/metrics", get(metrics))
        .with_state(state)
}

/// Serve the health router until the listener fails.
///
/// # Errors
///
/// Fails when the port cannot be bound or the server errors.
pub async fn serve(state: Arc<HealthState>, port: u16) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    info!(port, "Health server listening");
    axum::serve(listener, router(state)).await?;
    Ok(())
}

async fn nginx_ready(State(state): State<Arc<HealthState>>) -> Response {
    if state.manager.is_ready() {
        (StatusCode::OK, "Ready").into_response()
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "Not ready: have not received the initial configuration").into_response()
    }
}

async fn probe_host(
    State(state): State<Arc<HealthState>>,
    Path(hostname): Path<String>,
) -> Response {
    if !state.configurator.has_host(&hostname) {
        return (StatusCode::NOT_FOUND, "Host not found").into_response();
    }
    let groups = state.configurator.host_upstreams(&hostname);
    probe_groups(&state.configurator, &groups).await
}

async fn probe_transport_server(
    State(state): State<Arc<HealthState>>,
    Path(name): Path<String>,
) -> Response {
    let Some(config_name) = state.configurator.find_transport_server(&name) else {
        return (StatusCode::NOT_FOUND, "TransportServer not found").into_response();
    };
    let Some(groups) = state.configurator.config_groups(&config_name) else {
        return (StatusCode::NOT_FOUND, "TransportServer not found").into_response();
    };
    probe_groups(&state.configurator, &groups).await
}

/// Sum peer counts across upstream groups and map them to a response.
async fn probe_groups(configurator: &Configurator, groups: &[String]) -> Response {
    let mut total = 0;
    let mut up = 0;
    for group in groups {
        match configurator.probe_group(group).await {
            Ok((t, u)) => {
                total += t;
                up += u;
            }
            Err(e) => {
                error!(group = %group, error = %e, "Peer probe failed");
                return (StatusCode::INTERNAL_SERVER_ERROR, "Failed to query peers").into_response();
            }
        }
    }
    let report = ProbeReport { total, up, unhealthy: total - up };
    let code = if up == 0 { StatusCode::IM_A_TEAPOT } else { StatusCode::OK };
    (code, Json(report)).into_response()
}

async fn metrics() -> Response {
    match crate::metrics::gather_metrics() {
        Ok(text) => (StatusCode::OK, text).into_response(),
        Err(e) => {
            error!(error = %e, "Failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to encode metrics").into_response()
        }
    }
}

#[cfg(test)]
#[path = "health_tests.rs"]
mod health_tests;
