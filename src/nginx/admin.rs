// Copyright (c) 2025 The Rampart Authors
// SPDX-License-Identifier: MIT

//! NGINX Plus API client over the local unix socket.
//!
//! The Plus API allows changing upstream membership in the running workers
//! without a reload. The API listens on a unix socket inside the pod, so the
//! client speaks minimal HTTP/1.1 over a [`tokio::net::UnixStream`] with
//! `Connection: close` semantics, one connection per request.
//!
//! Dynamic updates are only safe against the configuration generation they
//! were computed from; the configurator verifies the live config version
//! before calling [`PlusClient::update_http_servers`].

use super::NginxError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;
use tracing::debug;

/// Plus API version the client speaks.
const API_VERSION: u8 = 9;

/// A peer inside a Plus upstream, as the API represents it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UpstreamServer {
    /// Server ID assigned by NGINX. Absent on servers being added.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,

    /// Peer address, `host:port`.
    pub server: String,

    /// Maximum failed attempts before the peer is marked unavailable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_fails: Option<u32>,

    /// Unavailability window after `max_fails` failures.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fail_timeout: Option<String>,

    /// Maximum simultaneous connections.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_conns: Option<u32>,

    /// Relative weight for load balancing.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weight: Option<u32>,
}

impl UpstreamServer {
    /// A plain peer with only an address.
    #[must_use]
    pub fn new(server: impl Into<String>) -> Self {
        Self {
            id: None,
            server: server.into(),
            max_fails: None,
            fail_timeout: None,
            max_conns: None,
            weight: None,
        }
    }

    /// Whether two peers with the same address differ in tunable parameters.
    #[must_use]
    pub fn params_differ(&self, other: &Self) -> bool {
        self.max_fails != other.max_fails
            || self.fail_timeout != other.fail_timeout
            || self.max_conns != other.max_conns
            || self.weight != other.weight
    }
}

/// Outcome of reconciling one upstream's membership.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct UpstreamUpdate {
    /// Peers added.
    pub added: usize,
    /// Peers removed.
    pub removed: usize,
    /// Peers whose parameters (weight, limits) were patched in place.
    pub updated: usize,
}

/// NGINX Plus API client.
#[derive(Debug, Clone)]
pub struct PlusClient {
    socket: PathBuf,
}

impl PlusClient {
    /// Create a client against the given unix socket.
    #[must_use]
    pub fn new(socket: impl Into<PathBuf>) -> Self {
        Self {
            socket: socket.into(),
        }
    }

    /// The socket path this client dials.
    #[must_use]
    pub fn socket(&self) -> &Path {
        &self.socket
    }

    /// List the peers of an HTTP upstream.
    ///
    /// # Errors
    ///
    /// Fails when the socket is unreachable or the response cannot be decoded.
    pub async fn http_servers(&self, upstream: &str) -> Result<Vec<UpstreamServer>, NginxError> {
        self.list_servers("http", upstream).await
    }

    /// List the peers of a stream upstream.
    ///
    /// # Errors
    ///
    /// Fails when the socket is unreachable or the response cannot be decoded.
    pub async fn stream_servers(&self, upstream: &str) -> Result<Vec<UpstreamServer>, NginxError> {
        self.list_servers("stream", upstream).await
    }

    /// Reconcile an HTTP upstream's membership to the desired peer set.
    ///
    /// # Errors
    ///
    /// Fails when any individual add or remove fails.
    pub async fn update_http_servers(
        &self,
        upstream: &str,
        desired: &[UpstreamServer],
    ) -> Result<UpstreamUpdate, NginxError> {
        self.update_servers("http", upstream, desired).await
    }

    /// Reconcile a stream upstream's membership to the desired peer set.
    ///
    /// # Errors
    ///
    /// Fails when any individual add or remove fails.
    pub async fn update_stream_servers(
        &self,
        upstream: &str,
        desired: &[UpstreamServer],
    ) -> Result<UpstreamUpdate, NginxError> {
        self.update_servers("stream", upstream, desired).await
    }

    /// Upsert one entry in a key-value zone.
    ///
    /// New keys are created with POST; when the key already exists the API
    /// answers 409 and the entry is modified with PATCH instead.
    ///
    /// # Errors
    ///
    /// Fails when the socket is unreachable or the API rejects both the
    /// create and the modify.
    pub async fn upsert_key_value(
        &self,
        zone: &str,
        key: &str,
        value: &serde_json::Value,
    ) -> Result<(), NginxError> {
        let path = format!("/api/{API_VERSION}/http/keyvals/{zone}");
        let body = serde_json::to_string(&serde_json::json!({ key: value }))
            .map_err(|source| NginxError::ApiDecode { path: path.clone(), source })?;

        let (status, resp) = self.roundtrip("POST", &path, Some(&body)).await?;
        if status == 201 || status == 200 || status == 204 {
            debug!(zone, key, "Created key-value entry");
            return Ok(());
        }
        let (status, resp2) = self.roundtrip("PATCH", &path, Some(&body)).await?;
        if status == 200 || status == 204 {
            debug!(zone, key, "Modified key-value entry");
            return Ok(());
        }
        Err(NginxError::Api {
            method: "PATCH".to_string(),
            path,
            reason: format!("status {status}: {resp2} (create answered: {resp})"),
        })
    }

    async fn list_servers(
        &self,
        module: &str,
        upstream: &str,
    ) -> Result<Vec<UpstreamServer>, NginxError> {
        let path = format!("/api/{API_VERSION}/{module}/upstreams/{upstream}/servers");
        let (status, body) = self.roundtrip("GET", &path, None).await?;
        if status != 200 {
            return Err(NginxError::Api {
                method: "GET".to_string(),
                path,
                reason: format!("status {status}: {body}"),
            });
        }
        serde_json::from_str(&body).map_err(|source| NginxError::ApiDecode { path, source })
    }

    /// Diff current against desired membership by peer address and apply it.
    async fn update_servers(
        &self,
        module: &str,
        upstream: &str,
        desired: &[UpstreamServer],
    ) -> Result<UpstreamUpdate, NginxError> {
        let current = self.list_servers(module, upstream).await?;
        let base = format!("/api/{API_VERSION}/{module}/upstreams/{upstream}/servers");
        let mut update = UpstreamUpdate::default();

        for server in desired {
            if !current.iter().any(|c| c.server == server.server) {
                let body = serde_json::to_string(server).map_err(|source| {
                    NginxError::ApiDecode {
                        path: base.clone(),
                        source,
                    }
                })?;
                let (status, resp) = self.roundtrip("POST", &base, Some(&body)).await?;
                if status != 201 && status != 200 {
                    return Err(NginxError::Api {
                        method: "POST".to_string(),
                        path: base,
                        reason: format!("status {status}: {resp}"),
                    });
                }
                update.added += 1;
            }
        }

        for server in &current {
            match desired.iter().find(|d| d.server == server.server) {
                None => {
                    let Some(id) = server.id else { continue };
                    let path = format!("{base}/{id}");
                    let (status, resp) = self.roundtrip("DELETE", &path, None).await?;
                    if status != 200 && status != 204 {
                        return Err(NginxError::Api {
                            method: "DELETE".to_string(),
                            path,
                            reason: format!("status {status}: {resp}"),
                        });
                    }
                    update.removed += 1;
                }
                Some(want) if want.params_differ(server) => {
                    let Some(id) = server.id else { continue };
                    let path = format!("{base}/{id}");
                    let mut patch = want.clone();
                    patch.id = None;
                    let body = serde_json::to_string(&patch).map_err(|source| {
                        NginxError::ApiDecode {
                            path: path.clone(),
                            source,
                        }
                    })?;
                    let (status, resp) = self.roundtrip("PATCH", &path, Some(&body)).await?;
                    if status != 200 {
                        return Err(NginxError::Api {
                            method: "PATCH".to_string(),
                            path,
                            reason: format!("status {status}: {resp}"),
                        });
                    }
                    update.updated += 1;
                }
                Some(_) => {}
            }
        }

        debug!(
            module,
            upstream,
            added = update.added,
            removed = update.removed,
            "Updated upstream membership"
        );
        Ok(update)
    }

    /// One HTTP/1.1 exchange over a fresh unix connection.
    ///
    /// Returns the status code and body. `Connection: close` makes
    /// read-to-EOF the body framing, so no chunked decoding is needed.
    async fn roundtrip(
        &self,
        method: &str,
        path: &str,
        body: Option<&str>,
    ) -> Result<(u16, String), NginxError> {
        let api_err = |reason: String| NginxError::Api {
            method: method.to_string(),
            path: path.to_string(),
            reason,
        };

        let mut stream = UnixStream::connect(&self.socket)
            .await
            .map_err(|e| api_err(format!("connect {}: {e}", self.socket.display())))?;

        let mut request = format!(
            "{method} {path} HTTP/1.1\r\nHost: nginx-plus-api\r\nConnection: close\r\n"
        );
        if let Some(body) = body {
            request.push_str(&format!(
                "Content-Type: application/json\r\nContent-Length: {}\r\n",
                body.len()
            ));
        }
        request.push_str("\r\n");
        if let Some(body) = body {
            request.push_str(body);
        }

        stream
            .write_all(request.as_bytes())
            .await
            .map_err(|e| api_err(format!("write: {e}")))?;

        let mut response = Vec::new();
        stream
            .read_to_end(&mut response)
            .await
            .map_err(|e| api_err(format!("read: {e}")))?;
        let response = String::from_utf8_lossy(&response);

        let (head, body) = response
            .split_once("\r\n\r\n")
            .ok_or_else(|| api_err("malformed response: no header terminator".to_string()))?;
        let status = head
            .lines()
            .next()
            .and_then(|line| line.split_whitespace().nth(1))
            .and_then(|code| code.parse::<u16>().ok())
            .ok_or_else(|| api_err(format!("malformed status line: {head:?}")))?;

        Ok((status, body.to_string()))
    }
}

#[cfg(test)]
#[path = "admin_tests.rs"]
mod admin_tests;
