// Copyright (c) 2025 The Rampart Authors
// SPDX-License-Identifier: MIT

//! Composed views of watched resources, ready for rendering.
//!
//! The reconciler joins a resource with everything its configuration depends
//! on: delegated routes, referenced policies and the live endpoints of every
//! upstream Service. Rendering then needs no store access.

use crate::crd::{Policy, TransportServer, VirtualServer, VirtualServerRoute};
use std::collections::HashMap;
use std::sync::Arc;

/// How a referenced Secret's material lands on disk.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SecretFileKind {
    /// Certificate plus key, written with mode 0600.
    Tls,
    /// Non-key material (JWKs, htpasswd files, CA bundles), mode 0644.
    Aux,
}

/// Secret material a rendered config references under `secrets/`.
///
/// The reconciler resolves referenced Secrets into these entries so the
/// configurator can write the files before NGINX is asked to load a config
/// that names them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SecretFile {
    /// File name under `secrets/`, conventionally `<namespace>-<secret>`.
    pub name: String,

    /// File mode class.
    pub kind: SecretFileKind,

    /// Raw file content.
    pub content: Vec<u8>,
}

/// A `VirtualServer` joined with its dependencies.
#[derive(Clone)]
pub struct VirtualServerEx {
    /// The server itself.
    pub virtual_server: Arc<VirtualServer>,

    /// Delegated routes referencing this server's host, keyed by
    /// `namespace/name`.
    pub routes: Vec<Arc<VirtualServerRoute>>,

    /// Referenced policies, keyed by `namespace/name`.
    pub policies: HashMap<String, Arc<Policy>>,

    /// Live peers per upstream, keyed by the rendered upstream name.
    pub endpoints: HashMap<String, Vec<String>>,

    /// Secret material the rendered config references.
    pub secrets: Vec<SecretFile>,

    /// Resolved HTTP listen port (custom listener or 80).
    pub http_port: u16,

    /// Resolved HTTPS listen port (custom listener or 443).
    pub https_port: u16,
}

/// A `TransportServer` joined with its dependencies.
#[derive(Clone)]
pub struct TransportServerEx {
    /// The server itself.
    pub transport_server: Arc<TransportServer>,

    /// Live peers per upstream, keyed by the rendered upstream name.
    pub endpoints: HashMap<String, Vec<String>>,

    /// Secret material the rendered config references.
    pub secrets: Vec<SecretFile>,

    /// Resolved listener port. `None` for TLS passthrough servers, which
    /// listen on a unix socket behind the SNI multiplexer.
    pub listener_port: Option<u16>,
}

/// Rendered name of a `VirtualServer` config object (file and server group).
///
/// Flat and collision-free across namespaces: `vs_<namespace>_<name>`.
#[must_use]
pub fn virtual_server_name(namespace: &str, name: &str) -> String {
    format!("vs_{namespace}_{name}")
}

/// Rendered name of a `TransportServer` config object.
#[must_use]
pub fn transport_server_name(namespace: &str, name: &str) -> String {
    format!("ts_{namespace}_{name}")
}

/// Unix socket a TLS passthrough `TransportServer` listens on.
///
/// The built-in SNI multiplexer on port 443 proxies matched connections to
/// this socket.
#[must_use]
pub fn passthrough_socket(namespace: &str, name: &str) -> String {
    format!("unix:/var/lib/nginx/passthrough-{namespace}-{name}.sock")
}

/// Rendered name of an upstream server group.
///
/// `vs_<namespace>_<vs-name>_<upstream>`, matching the group names the Plus
/// API exposes.
#[must_use]
pub fn upstream_name(kind_prefix: &str, namespace: &str, owner: &str, upstream: &str) -> String {
    format!("{kind_prefix}_{namespace}_{owner}_{upstream}")
}

impl VirtualServerEx {
    /// Namespace of the underlying resource.
    #[must_use]
    pub fn namespace(&self) -> &str {
        self.virtual_server
            .metadata
            .namespace
            .as_deref()
            .unwrap_or("default")
    }

    /// Name of the underlying resource.
    #[must_use]
    pub fn name(&self) -> &str {
        self.virtual_server.metadata.name.as_deref().unwrap_or_default()
    }

    /// Rendered config object name.
    #[must_use]
    pub fn config_name(&self) -> String {
        virtual_server_name(self.namespace(), self.name())
    }

    /// Rendered name for one of this server's upstreams.
    #[must_use]
    pub fn upstream_name(&self, upstream: &str) -> String {
        upstream_name("vs", self.namespace(), self.name(), upstream)
    }
}

impl TransportServerEx {
    /// Namespace of the underlying resource.
    #[must_use]
    pub fn namespace(&self) -> &str {
        self.transport_server
            .metadata
            .namespace
            .as_deref()
            .unwrap_or("default")
    }

    /// Name of the underlying resource.
    #[must_use]
    pub fn name(&self) -> &str {
        self.transport_server
            .metadata
            .name
            .as_deref()
            .unwrap_or_default()
    }

    /// Rendered config object name.
    #[must_use]
    pub fn config_name(&self) -> String {
        transport_server_name(self.namespace(), self.name())
    }

    /// Rendered name for one of this server's upstreams.
    #[must_use]
    pub fn upstream_name(&self, upstream: &str) -> String {
        upstream_name("ts", self.namespace(), self.name(), upstream)
    }
}
