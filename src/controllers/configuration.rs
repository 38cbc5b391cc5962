// Copyright (c) 2025 The Rampart Authors
// SPDX-License-Identifier: MIT

//! The main reconciler: drives NGINX configuration from watched resources.
//!
//! One worker consumes typed keys (`vs/`, `vsr/`, `ts/`, `gc/`, `pol/`,
//! `pr/` and `ing/` prefixes) from a shared queue. Each sync validates the
//! resource, joins it with
//! its dependencies from the caches, hands the composed view to the
//! [`Configurator`] and reports the outcome through status and Events.
//!
//! Validation failures stop the resource but never the worker: the last
//! good configuration stays on disk until a valid spec replaces it.
//!
//! The cert-manager and external-dns shims run as separate workers over
//! their own queues; see [`super::certshim`] and [`super::externaldns`].

use anyhow::Result;
use k8s_openapi::api::core::v1::{Endpoints, Secret};
use kube::{Client, Resource, ResourceExt};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::certshim::sync_certificates;
use super::events::{
    EventSink, REASON_ADDED_OR_UPDATED, REASON_DYNAMIC_WEIGHTS_UNSUPPORTED,
    REASON_NO_VIRTUAL_SERVER_FOUND, REASON_REJECTED,
};
use super::externaldns::sync_dns_endpoint;
use super::status::{
    status_changed, write_external_endpoints, write_validation_status,
};
use crate::configurator::resources::{
    transport_server_name, upstream_name, virtual_server_name, SecretFile, SecretFileKind,
    TransportServerEx, VirtualServerEx,
};
use crate::configurator::{Applied, Configurator};
use crate::constants::TLS_PASSTHROUGH_LISTENER;
use crate::crd::{
    ExternalEndpoint, Listener, Policy, ResourceState, TransportServer, VirtualServer,
    VirtualServerRoute,
};
use crate::namespaces::NamespaceManager;
use crate::queue::WorkQueue;
use crate::store::{object_key, CacheEvent, InformerGroup};
use crate::validation::globalconfiguration::validate_global_configuration;
use crate::validation::policy::validate_policy;
use crate::validation::protectedresource::validate_protected_resource;
use crate::validation::transportserver::validate_transport_server;
use crate::validation::virtualserver::{validate_virtual_server, validate_virtual_server_route};

// ============================================================================
// Keys
// ============================================================================

/// Build a typed queue key: `<kind>/<namespace>/<name>`.
#[must_use]
pub fn typed_key(kind: &str, namespace: &str, name: &str) -> String {
    format!("{kind}/{namespace}/{name}")
}

/// Split a typed key into `(kind, namespace, name)`.
#[must_use]
pub fn parse_key(key: &str) -> Option<(&str, &str, &str)> {
    let mut parts = key.splitn(3, '/');
    Some((parts.next()?, parts.next()?, parts.next()?))
}

// ============================================================================
// Context
// ============================================================================

/// Everything the controllers share.
pub struct ReconcilerContext {
    pub client: Client,
    pub namespaces: Arc<NamespaceManager>,
    pub configurator: Arc<Configurator>,
    pub events: EventSink,

    /// Main reconciler queue (typed keys).
    pub queue: Arc<WorkQueue>,
    /// Certificate shim queue (`vs/` keys).
    pub cert_queue: Arc<WorkQueue>,
    /// external-dns shim queue (`vs/` keys).
    pub dns_queue: Arc<WorkQueue>,

    /// Accepted listeners from the GlobalConfiguration, by name.
    pub listeners: RwLock<HashMap<String, Listener>>,

    /// Leadership signal; gates fleet-level status writes.
    pub is_leader: watch::Receiver<bool>,

    /// The fleet's public addresses, written to resource statuses by the
    /// leader.
    pub external_endpoints: RwLock<Vec<ExternalEndpoint>>,
}

impl ReconcilerContext {
    fn leader(&self) -> bool {
        *self.is_leader.borrow()
    }

    fn fleet_endpoints(&self) -> Vec<ExternalEndpoint> {
        self.external_endpoints
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// Attach the controllers' cache handlers to a new informer group.
///
/// Parent kinds enqueue their own key; child and dependency kinds resolve
/// the affected parents first, so the queues only ever carry parent keys.
pub fn register_handlers(ctx: &Arc<ReconcilerContext>, group: &Arc<InformerGroup>) {
    let ns = group.namespace.clone();

    {
        let ctx = Arc::clone(ctx);
        group.virtual_servers.add_handler(move |event| {
            let vs = event.latest();
            let key = typed_key("vs", &vs.namespace().unwrap_or_default(), &vs.name_any());
            ctx.queue.add(&key);
            ctx.cert_queue.add(&key);
            ctx.dns_queue.add(&key);
        });
    }
    {
        let ctx = Arc::clone(ctx);
        group.virtual_server_routes.add_handler(move |event| {
            let vsr = event.latest();
            ctx.queue.add(&typed_key(
                "vsr",
                &vsr.namespace().unwrap_or_default(),
                &vsr.name_any(),
            ));
        });
    }
    {
        let ctx = Arc::clone(ctx);
        group.transport_servers.add_handler(move |event| {
            let ts = event.latest();
            ctx.queue.add(&typed_key(
                "ts",
                &ts.namespace().unwrap_or_default(),
                &ts.name_any(),
            ));
        });
    }
    {
        let ctx = Arc::clone(ctx);
        group.global_configurations.add_handler(move |event| {
            let gc = event.latest();
            ctx.queue.add(&typed_key(
                "gc",
                &gc.namespace().unwrap_or_default(),
                &gc.name_any(),
            ));
        });
    }

    // Dependency kinds: requeue the parents that reference the changed
    // object. The scans run over the caches, inline on the watcher task.
    {
        let ctx = Arc::clone(ctx);
        let group_ref = Arc::downgrade(group);
        group.endpoints.add_handler(move |event| {
            let Some(group) = group_ref.upgrade() else { return };
            let service = event.latest().name_any();
            enqueue_service_parents(&ctx, &group, &service);
        });
    }
    {
        let ctx = Arc::clone(ctx);
        let group_ref = Arc::downgrade(group);
        group.secrets.add_handler(move |event| {
            let Some(group) = group_ref.upgrade() else { return };
            let secret = event.latest().name_any();
            enqueue_secret_parents(&ctx, &group, &secret);
        });
    }
    {
        let ctx = Arc::clone(ctx);
        let policy_ns = ns.clone();
        group.policies.add_handler(move |event| {
            let policy = event.latest().name_any();
            ctx.queue.add(&typed_key("pol", &policy_ns, &policy));
            enqueue_policy_parents(&ctx, &policy_ns, &policy);
        });
    }
    {
        let ctx = Arc::clone(ctx);
        group.protected_resources.add_handler(move |event| {
            let pr = event.latest();
            ctx.queue.add(&typed_key(
                "pr",
                &pr.namespace().unwrap_or_default(),
                &pr.name_any(),
            ));
        });
    }
    {
        let ctx = Arc::clone(ctx);
        group.ingresses.add_handler(move |event| {
            let ing = event.latest();
            ctx.queue.add(&typed_key(
                "ing",
                &ing.namespace().unwrap_or_default(),
                &ing.name_any(),
            ));
        });
    }

    // Child kinds: resolve the controller owner reference.
    {
        let ctx = Arc::clone(ctx);
        let owner_ns = ns.clone();
        group.certificates.add_handler(move |event| {
            if let Some(owner) = controller_owner(event, "VirtualServer") {
                ctx.cert_queue.add(&typed_key("vs", &owner_ns, &owner));
            }
        });
    }
    {
        let ctx = Arc::clone(ctx);
        let owner_ns = ns;
        group.dns_endpoints.add_handler(move |event| {
            if let Some(owner) = controller_owner(event, "VirtualServer") {
                ctx.dns_queue.add(&typed_key("vs", &owner_ns, &owner));
            }
        });
    }
}

fn controller_owner<K>(event: &CacheEvent<K>, kind: &str) -> Option<String>
where
    K: Resource<DynamicType = ()>,
{
    event
        .latest()
        .owner_references()
        .iter()
        .find(|or| or.controller == Some(true) && or.kind == kind)
        .map(|or| or.name.clone())
}

fn enqueue_service_parents(ctx: &ReconcilerContext, group: &InformerGroup, service: &str) {
    for vs in group.virtual_servers.list() {
        let references = vs.spec.upstreams.iter().any(|u| u.service == service)
            || group.virtual_server_routes.list().iter().any(|vsr| {
                vsr.spec.host == vs.spec.host
                    && vsr.spec.upstreams.iter().any(|u| u.service == service)
            });
        if references {
            ctx.queue
                .add(&typed_key("vs", &group.namespace, &vs.name_any()));
        }
    }
    for ts in group.transport_servers.list() {
        if ts.spec.upstreams.iter().any(|u| u.service == service) {
            ctx.queue
                .add(&typed_key("ts", &group.namespace, &ts.name_any()));
        }
    }
    for ing in group.ingresses.list() {
        if super::ingress::backend_services(&ing).iter().any(|s| s == service) {
            ctx.queue
                .add(&typed_key("ing", &group.namespace, &ing.name_any()));
        }
    }
}

fn enqueue_secret_parents(ctx: &ReconcilerContext, group: &InformerGroup, secret: &str) {
    for vs in group.virtual_servers.list() {
        let references = vs
            .spec
            .tls
            .as_ref()
            .and_then(|tls| tls.secret.as_deref())
            == Some(secret);
        if references {
            ctx.queue
                .add(&typed_key("vs", &group.namespace, &vs.name_any()));
        }
    }
    for ts in group.transport_servers.list() {
        if ts.spec.tls.as_ref().map(|tls| tls.secret.as_str()) == Some(secret) {
            ctx.queue
                .add(&typed_key("ts", &group.namespace, &ts.name_any()));
        }
    }
    for ing in group.ingresses.list() {
        if super::ingress::tls_secrets(&ing).iter().any(|s| s == secret) {
            ctx.queue
                .add(&typed_key("ing", &group.namespace, &ing.name_any()));
        }
    }
}

fn enqueue_policy_parents(ctx: &ReconcilerContext, policy_namespace: &str, policy: &str) {
    // Policies can be referenced across namespaces, so scan every group.
    for group in ctx.namespaces.all() {
        for vs in group.virtual_servers.list() {
            let references = vs.spec.policies.as_deref().unwrap_or_default().iter().any(
                |reference| {
                    reference.name == policy
                        && reference.namespace.as_deref().unwrap_or(&group.namespace)
                            == policy_namespace
                },
            );
            if references {
                ctx.queue
                    .add(&typed_key("vs", &group.namespace, &vs.name_any()));
            }
        }
    }
}

// ============================================================================
// Composition
// ============================================================================

/// Peers of one Endpoints object for a given port.
///
/// Subset ports are matched by number; a subset with a single port matches
/// any requested port, covering the common unnamed-port case.
#[must_use]
pub fn peers_for_port(endpoints: &Endpoints, port: u16) -> Vec<String> {
    let mut peers = Vec::new();
    for subset in endpoints.subsets.as_deref().unwrap_or_default() {
        let ports = subset.ports.as_deref().unwrap_or_default();
        let matched = ports
            .iter()
            .find(|p| p.port == i32::from(port))
            .or_else(|| (ports.len() == 1).then(|| &ports[0]));
        let Some(matched) = matched else { continue };
        for address in subset.addresses.as_deref().unwrap_or_default() {
            if address.ip.contains(':') {
                peers.push(format!("[{}]:{}", address.ip, matched.port));
            } else {
                peers.push(format!("{}:{}", address.ip, matched.port));
            }
        }
    }
    peers.sort();
    peers
}

/// Resolve a VirtualServer's listen ports from its custom listener
/// assignment, falling back to 80/443.
#[must_use]
pub fn resolve_virtual_server_ports(
    vs: &VirtualServer,
    listeners: &HashMap<String, Listener>,
) -> (u16, u16, Vec<String>) {
    let mut warnings = Vec::new();
    let mut http_port = 80;
    let mut https_port = 443;
    if let Some(assignment) = &vs.spec.listener {
        if let Some(name) = &assignment.http {
            match listeners.get(name) {
                Some(listener) if listener.protocol == "HTTP" => http_port = listener.port,
                _ => warnings.push(format!("HTTP listener {name} is not defined")),
            }
        }
        if let Some(name) = &assignment.https {
            match listeners.get(name) {
                Some(listener) if listener.protocol == "HTTP" => https_port = listener.port,
                _ => warnings.push(format!("HTTPS listener {name} is not defined")),
            }
        }
    }
    (http_port, https_port, warnings)
}

/// Resolve a TransportServer's listen port.
///
/// The built-in `tls-passthrough` listener maps to `None` (the server
/// listens on a unix socket behind the SNI multiplexer).
pub fn resolve_transport_server_port(
    ts: &TransportServer,
    listeners: &HashMap<String, Listener>,
) -> Result<Option<u16>, String> {
    let listener = &ts.spec.listener;
    if listener.name == TLS_PASSTHROUGH_LISTENER {
        return Ok(None);
    }
    match listeners.get(&listener.name) {
        Some(declared) if declared.protocol == listener.protocol => Ok(Some(declared.port)),
        Some(declared) => Err(format!(
            "listener {} is declared with protocol {}, not {}",
            listener.name, declared.protocol, listener.protocol
        )),
        None => Err(format!(
            "listener {} is not defined in the GlobalConfiguration",
            listener.name
        )),
    }
}

/// Join a VirtualServer with its routes, policies and endpoints.
///
/// Missing references produce warnings, not errors: the resource degrades
/// to `Warning` but is still configured.
#[must_use]
pub fn build_virtual_server_ex(
    vs: &Arc<VirtualServer>,
    group: &InformerGroup,
    namespaces: &NamespaceManager,
    listeners: &HashMap<String, Listener>,
) -> (VirtualServerEx, Vec<String>) {
    let namespace = vs.namespace().unwrap_or_default();
    let name = vs.name_any();
    let (http_port, https_port, mut warnings) = resolve_virtual_server_ports(vs, listeners);

    // Delegated routes are linked by host.
    let routes: Vec<Arc<VirtualServerRoute>> = group
        .virtual_server_routes
        .list()
        .into_iter()
        .filter(|vsr| vsr.spec.host == vs.spec.host)
        .collect();

    let mut policies = HashMap::new();
    let mut secrets = Vec::new();
    for reference in vs.spec.policies.as_deref().unwrap_or_default() {
        let policy_ns = reference.namespace.as_deref().unwrap_or(&namespace);
        let resolved = namespaces
            .get(policy_ns)
            .and_then(|g| g.policies.get(policy_ns, &reference.name));
        match resolved {
            Some(policy) => {
                // An invalid policy never reaches the render; the server is
                // configured without it and degrades to Warning.
                if let Err(errors) = validate_policy(&policy) {
                    warnings.push(format!(
                        "policy {policy_ns}/{} is invalid: {errors}",
                        reference.name
                    ));
                    continue;
                }
                collect_policy_secret_files(
                    policy_ns,
                    &policy,
                    namespaces,
                    &mut secrets,
                    &mut warnings,
                );
                policies.insert(object_key(policy_ns, &reference.name), policy);
            }
            None => warnings.push(format!(
                "policy {policy_ns}/{} is not found",
                reference.name
            )),
        }
    }

    if let Some(secret) = vs.spec.tls.as_ref().and_then(|tls| tls.secret.as_deref()) {
        match group.secrets.get(&namespace, secret) {
            Some(obj) => match tls_secret_file(&namespace, secret, &obj) {
                Some(file) => secrets.push(file),
                None => warnings.push(format!(
                    "TLS secret {namespace}/{secret} is missing tls.crt or tls.key"
                )),
            },
            None => warnings.push(format!("TLS secret {namespace}/{secret} is not found")),
        }
    }

    let mut endpoints = HashMap::new();
    for upstream in &vs.spec.upstreams {
        let peers = group
            .endpoints
            .get(&namespace, &upstream.service)
            .map(|e| peers_for_port(&e, upstream.port))
            .unwrap_or_default();
        endpoints.insert(upstream_name("vs", &namespace, &name, &upstream.name), peers);
    }
    for vsr in &routes {
        let vsr_ns = vsr.namespace().unwrap_or_default();
        let vsr_name = vsr.name_any();
        for upstream in &vsr.spec.upstreams {
            let peers = group
                .endpoints
                .get(&vsr_ns, &upstream.service)
                .map(|e| peers_for_port(&e, upstream.port))
                .unwrap_or_default();
            endpoints.insert(
                upstream_name("vsr", &vsr_ns, &vsr_name, &upstream.name),
                peers,
            );
        }
    }

    (
        VirtualServerEx {
            virtual_server: Arc::clone(vs),
            routes,
            policies,
            endpoints,
            secrets,
            http_port,
            https_port,
        },
        warnings,
    )
}

/// Material of one Secret data key.
fn secret_bytes(secret: &Secret, key: &str) -> Option<Vec<u8>> {
    secret.data.as_ref()?.get(key).map(|bytes| bytes.0.clone())
}

/// TLS Secret material as one PEM file: certificate chain then key.
///
/// The render points both `ssl_certificate` and `ssl_certificate_key` at
/// the same file, which NGINX accepts for concatenated PEM.
fn tls_secret_file(namespace: &str, name: &str, secret: &Secret) -> Option<SecretFile> {
    let mut content = secret_bytes(secret, "tls.crt")?;
    content.extend(secret_bytes(secret, "tls.key")?);
    Some(SecretFile {
        name: format!("{namespace}-{name}"),
        kind: SecretFileKind::Tls,
        content,
    })
}

/// Collect the secret files a policy's render references.
///
/// Missing Secrets and missing data keys degrade the owning VirtualServer
/// to Warning; the policy itself stays attached.
fn collect_policy_secret_files(
    policy_ns: &str,
    policy: &Arc<Policy>,
    namespaces: &NamespaceManager,
    secrets: &mut Vec<SecretFile>,
    warnings: &mut Vec<String>,
) {
    let Some(group) = namespaces.get(policy_ns) else { return };
    let spec = &policy.spec;

    let mut aux = |secret_name: &str, key: &str| {
        match group
            .secrets
            .get(policy_ns, secret_name)
            .and_then(|obj| secret_bytes(&obj, key))
        {
            Some(content) => secrets.push(SecretFile {
                name: format!("{policy_ns}-{secret_name}"),
                kind: SecretFileKind::Aux,
                content,
            }),
            None => warnings.push(format!(
                "secret {policy_ns}/{secret_name} is missing or has no {key} entry"
            )),
        }
    };

    if let Some(secret_name) = spec.jwt.as_ref().and_then(|jwt| jwt.secret.as_deref()) {
        aux(secret_name, "jwk");
    }
    if let Some(basic) = &spec.basic_auth {
        aux(&basic.secret, "htpasswd");
    }
    if let Some(mtls) = &spec.ingress_mtls {
        aux(&mtls.client_cert_secret, "ca.crt");
    }
    if let Some(mtls) = &spec.egress_mtls {
        if let Some(secret_name) = &mtls.trusted_cert_secret {
            aux(secret_name, "ca.crt");
        }
        if let Some(secret_name) = &mtls.tls_secret {
            match group.secrets.get(policy_ns, secret_name) {
                Some(obj) => match tls_secret_file(policy_ns, secret_name, &obj) {
                    Some(file) => secrets.push(file),
                    None => warnings.push(format!(
                        "TLS secret {policy_ns}/{secret_name} is missing tls.crt or tls.key"
                    )),
                },
                None => warnings.push(format!(
                    "TLS secret {policy_ns}/{secret_name} is not found"
                )),
            }
        }
    }
}

/// Join a TransportServer with its endpoints.
#[must_use]
pub fn build_transport_server_ex(
    ts: &Arc<TransportServer>,
    group: &InformerGroup,
    listener_port: Option<u16>,
) -> TransportServerEx {
    let namespace = ts.namespace().unwrap_or_default();
    let name = ts.name_any();
    let mut endpoints = HashMap::new();
    for upstream in &ts.spec.upstreams {
        let peers = group
            .endpoints
            .get(&namespace, &upstream.service)
            .map(|e| peers_for_port(&e, upstream.port))
            .unwrap_or_default();
        endpoints.insert(upstream_name("ts", &namespace, &name, &upstream.name), peers);
    }
    let secrets = ts
        .spec
        .tls
        .as_ref()
        .and_then(|tls| {
            let obj = group.secrets.get(&namespace, &tls.secret)?;
            tls_secret_file(&namespace, &tls.secret, &obj)
        })
        .into_iter()
        .collect();
    TransportServerEx {
        transport_server: Arc::clone(ts),
        endpoints,
        secrets,
        listener_port,
    }
}

// ============================================================================
// Sync
// ============================================================================

/// Dispatch one typed key from the main queue.
///
/// # Errors
///
/// Returns an error for transient failures; the worker requeues with
/// backoff.
pub async fn sync(ctx: &Arc<ReconcilerContext>, key: &str) -> Result<()> {
    let Some((kind, namespace, name)) = parse_key(key) else {
        warn!(key, "Dropping malformed queue key");
        return Ok(());
    };
    match kind {
        "vs" => sync_virtual_server(ctx, namespace, name).await,
        "vsr" => sync_virtual_server_route(ctx, namespace, name).await,
        "ts" => sync_transport_server(ctx, namespace, name).await,
        "gc" => sync_global_configuration(ctx, namespace, name).await,
        "pol" => sync_policy(ctx, namespace, name).await,
        "pr" => sync_protected_resource(ctx, namespace, name).await,
        "ing" => sync_ingress(ctx, namespace, name).await,
        _ => {
            warn!(key, "Dropping key of unknown kind");
            Ok(())
        }
    }
}

async fn sync_virtual_server(
    ctx: &Arc<ReconcilerContext>,
    namespace: &str,
    name: &str,
) -> Result<()> {
    let Some(group) = ctx.namespaces.get(namespace) else {
        // The namespace is no longer watched; nothing to do.
        return Ok(());
    };
    let Some(vs) = group.virtual_servers.get(namespace, name) else {
        let applied = ctx
            .configurator
            .delete_virtual_server(&virtual_server_name(namespace, name))
            .await?;
        if applied != Applied::Unchanged {
            info!(namespace, name, "Removed deleted VirtualServer");
        }
        return Ok(());
    };

    if let Err(errors) = validate_virtual_server(&vs) {
        ctx.events
            .warning(
                vs.as_ref(),
                REASON_REJECTED,
                format!("VirtualServer {namespace}/{name} was rejected: {errors}"),
            )
            .await;
        write_status_if_changed(
            ctx,
            vs.as_ref(),
            &ResourceState::Invalid,
            REASON_REJECTED,
            &errors.to_string(),
            vs.status
                .as_ref()
                .map(|s| (&s.state, s.reason.as_deref(), s.message.as_deref())),
        )
        .await?;
        return Ok(());
    }

    let listeners = ctx
        .listeners
        .read()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
        .clone();
    let (ex, warnings) = build_virtual_server_ex(&vs, &group, &ctx.namespaces, &listeners);
    let applied = ctx.configurator.apply_virtual_server(&ex).await?;
    debug!(namespace, name, ?applied, "Applied VirtualServer");

    if let Applied::Reloaded {
        weights_fallback: true,
        ..
    } = applied
    {
        ctx.events
            .warning(
                vs.as_ref(),
                REASON_DYNAMIC_WEIGHTS_UNSUPPORTED,
                "split weights changed via reload; dynamic weight updates require NGINX Plus"
                    .to_string(),
            )
            .await;
    }

    let (state, message) = if warnings.is_empty() {
        (
            ResourceState::Valid,
            format!("Configuration for {namespace}/{name} was added or updated"),
        )
    } else {
        (
            ResourceState::Warning,
            format!(
                "Configuration for {namespace}/{name} was added or updated with warnings: {}",
                warnings.join("; ")
            ),
        )
    };
    ctx.events
        .normal(vs.as_ref(), REASON_ADDED_OR_UPDATED, message.clone())
        .await;
    write_status_if_changed(
        ctx,
        vs.as_ref(),
        &state,
        REASON_ADDED_OR_UPDATED,
        &message,
        vs.status
            .as_ref()
            .map(|s| (&s.state, s.reason.as_deref(), s.message.as_deref())),
    )
    .await?;

    if ctx.leader() {
        let endpoints = ctx.fleet_endpoints();
        let current = vs
            .status
            .as_ref()
            .and_then(|s| s.external_endpoints.as_deref())
            .unwrap_or_default();
        if current != endpoints {
            write_external_endpoints::<VirtualServer>(&ctx.client, namespace, name, &endpoints)
                .await?;
        }
    }
    Ok(())
}

async fn sync_virtual_server_route(
    ctx: &Arc<ReconcilerContext>,
    namespace: &str,
    name: &str,
) -> Result<()> {
    let Some(group) = ctx.namespaces.get(namespace) else {
        return Ok(());
    };
    let Some(vsr) = group.virtual_server_routes.get(namespace, name) else {
        // Parents render delegated routes from the cache; requeue any
        // parent that referenced this host.
        return Ok(());
    };

    if let Err(errors) = validate_virtual_server_route(&vsr) {
        ctx.events
            .warning(
                vsr.as_ref(),
                REASON_REJECTED,
                format!("VirtualServerRoute {namespace}/{name} was rejected: {errors}"),
            )
            .await;
        write_status_if_changed(
            ctx,
            vsr.as_ref(),
            &ResourceState::Invalid,
            REASON_REJECTED,
            &errors.to_string(),
            vsr.status
                .as_ref()
                .map(|s| (&s.state, s.reason.as_deref(), s.message.as_deref())),
        )
        .await?;
        return Ok(());
    }

    // Find the parent by host across all watched namespaces and requeue it;
    // the parent's sync renders this route's contribution.
    let mut parent = None;
    for candidate_group in ctx.namespaces.all() {
        for vs in candidate_group.virtual_servers.list() {
            if vs.spec.host == vsr.spec.host {
                parent = Some((candidate_group.namespace.clone(), vs.name_any()));
                break;
            }
        }
        if parent.is_some() {
            break;
        }
    }

    match parent {
        Some((parent_ns, parent_name)) => {
            ctx.queue.add(&typed_key("vs", &parent_ns, &parent_name));
            write_status_if_changed(
                ctx,
                vsr.as_ref(),
                &ResourceState::Valid,
                REASON_ADDED_OR_UPDATED,
                &format!("Referenced by VirtualServer {parent_ns}/{parent_name}"),
                vsr.status
                    .as_ref()
                    .map(|s| (&s.state, s.reason.as_deref(), s.message.as_deref())),
            )
            .await?;
        }
        None => {
            ctx.events
                .warning(
                    vsr.as_ref(),
                    REASON_NO_VIRTUAL_SERVER_FOUND,
                    format!("No VirtualServer references host {}", vsr.spec.host),
                )
                .await;
            write_status_if_changed(
                ctx,
                vsr.as_ref(),
                &ResourceState::Warning,
                REASON_NO_VIRTUAL_SERVER_FOUND,
                &format!("no VirtualServer exists for host {}", vsr.spec.host),
                vsr.status
                    .as_ref()
                    .map(|s| (&s.state, s.reason.as_deref(), s.message.as_deref())),
            )
            .await?;
        }
    }
    Ok(())
}

async fn sync_transport_server(
    ctx: &Arc<ReconcilerContext>,
    namespace: &str,
    name: &str,
) -> Result<()> {
    let Some(group) = ctx.namespaces.get(namespace) else {
        return Ok(());
    };
    let Some(ts) = group.transport_servers.get(namespace, name) else {
        let applied = ctx
            .configurator
            .delete_transport_server(&transport_server_name(namespace, name))
            .await?;
        if applied != Applied::Unchanged {
            info!(namespace, name, "Removed deleted TransportServer");
        }
        return Ok(());
    };

    if let Err(errors) = validate_transport_server(&ts) {
        ctx.events
            .warning(
                ts.as_ref(),
                REASON_REJECTED,
                format!("TransportServer {namespace}/{name} was rejected: {errors}"),
            )
            .await;
        write_status_if_changed(
            ctx,
            ts.as_ref(),
            &ResourceState::Invalid,
            REASON_REJECTED,
            &errors.to_string(),
            ts.status
                .as_ref()
                .map(|s| (&s.state, s.reason.as_deref(), s.message.as_deref())),
        )
        .await?;
        return Ok(());
    }

    let listeners = ctx
        .listeners
        .read()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
        .clone();
    let listener_port = match resolve_transport_server_port(&ts, &listeners) {
        Ok(port) => port,
        Err(problem) => {
            ctx.events
                .warning(
                    ts.as_ref(),
                    REASON_REJECTED,
                    format!("TransportServer {namespace}/{name} was rejected: {problem}"),
                )
                .await;
            write_status_if_changed(
                ctx,
                ts.as_ref(),
                &ResourceState::Invalid,
                REASON_REJECTED,
                &problem,
                ts.status
                    .as_ref()
                    .map(|s| (&s.state, s.reason.as_deref(), s.message.as_deref())),
            )
            .await?;
            return Ok(());
        }
    };

    if let Some(secret) = ts.spec.tls.as_ref().map(|tls| tls.secret.as_str()) {
        if group.secrets.get(namespace, secret).is_none() {
            debug!(namespace, name, secret, "TLS secret not yet present");
        }
    }

    let ex = build_transport_server_ex(&ts, &group, listener_port);
    let applied = ctx.configurator.apply_transport_server(&ex).await?;
    debug!(namespace, name, ?applied, "Applied TransportServer");

    let message = format!("Configuration for {namespace}/{name} was added or updated");
    ctx.events
        .normal(ts.as_ref(), REASON_ADDED_OR_UPDATED, message.clone())
        .await;
    write_status_if_changed(
        ctx,
        ts.as_ref(),
        &ResourceState::Valid,
        REASON_ADDED_OR_UPDATED,
        &message,
        ts.status
            .as_ref()
            .map(|s| (&s.state, s.reason.as_deref(), s.message.as_deref())),
    )
    .await?;
    Ok(())
}

async fn sync_global_configuration(
    ctx: &Arc<ReconcilerContext>,
    namespace: &str,
    name: &str,
) -> Result<()> {
    let Some(group) = ctx.namespaces.get(namespace) else {
        return Ok(());
    };
    let Some(gc) = group.global_configurations.get(namespace, name) else {
        // Deleted: every listener-bound server falls back to rejection on
        // its next sync.
        ctx.listeners
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clear();
        requeue_listener_consumers(ctx);
        return Ok(());
    };

    let validation = validate_global_configuration(&gc);
    let accepted: HashMap<String, Listener> = validation
        .accepted
        .iter()
        .map(|listener| (listener.name.clone(), listener.clone()))
        .collect();
    {
        let mut listeners = ctx
            .listeners
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        *listeners = accepted;
    }

    if validation.is_clean() {
        write_status_if_changed(
            ctx,
            gc.as_ref(),
            &ResourceState::Valid,
            REASON_ADDED_OR_UPDATED,
            &format!("{} listeners accepted", validation.accepted.len()),
            gc.status
                .as_ref()
                .map(|s| (&s.state, s.reason.as_deref(), s.message.as_deref())),
        )
        .await?;
    } else {
        let errors = validation.errors().to_string();
        ctx.events
            .warning(
                gc.as_ref(),
                REASON_REJECTED,
                format!("Some listeners were rejected: {errors}"),
            )
            .await;
        write_status_if_changed(
            ctx,
            gc.as_ref(),
            &ResourceState::Warning,
            REASON_REJECTED,
            &format!(
                "{} listeners accepted, rejected: {errors}",
                validation.accepted.len()
            ),
            gc.status
                .as_ref()
                .map(|s| (&s.state, s.reason.as_deref(), s.message.as_deref())),
        )
        .await?;
    }

    requeue_listener_consumers(ctx);
    Ok(())
}

async fn sync_policy(ctx: &Arc<ReconcilerContext>, namespace: &str, name: &str) -> Result<()> {
    let Some(group) = ctx.namespaces.get(namespace) else {
        return Ok(());
    };
    let Some(policy) = group.policies.get(namespace, name) else {
        // Deleted: referencing servers re-render without it.
        enqueue_policy_parents(ctx, namespace, name);
        return Ok(());
    };

    match validate_policy(&policy) {
        Err(errors) => {
            ctx.events
                .warning(
                    policy.as_ref(),
                    REASON_REJECTED,
                    format!("Policy {namespace}/{name} was rejected: {errors}"),
                )
                .await;
            write_status_if_changed(
                ctx,
                policy.as_ref(),
                &ResourceState::Invalid,
                REASON_REJECTED,
                &errors.to_string(),
                policy
                    .status
                    .as_ref()
                    .map(|s| (&s.state, s.reason.as_deref(), s.message.as_deref())),
            )
            .await?;
        }
        Ok(()) => {
            write_status_if_changed(
                ctx,
                policy.as_ref(),
                &ResourceState::Valid,
                REASON_ADDED_OR_UPDATED,
                &format!("Policy {namespace}/{name} was added or updated"),
                policy
                    .status
                    .as_ref()
                    .map(|s| (&s.state, s.reason.as_deref(), s.message.as_deref())),
            )
            .await?;
        }
    }
    // Either way the referencing servers re-compose: a policy turning
    // invalid must drop out of their renders.
    enqueue_policy_parents(ctx, namespace, name);
    Ok(())
}

async fn sync_protected_resource(
    ctx: &Arc<ReconcilerContext>,
    namespace: &str,
    name: &str,
) -> Result<()> {
    let Some(group) = ctx.namespaces.get(namespace) else {
        return Ok(());
    };
    let Some(pr) = group.protected_resources.get(namespace, name) else {
        return Ok(());
    };

    match validate_protected_resource(&pr) {
        Err(errors) => {
            ctx.events
                .warning(
                    pr.as_ref(),
                    REASON_REJECTED,
                    format!("ProtectedResource {namespace}/{name} was rejected: {errors}"),
                )
                .await;
            write_status_if_changed(
                ctx,
                pr.as_ref(),
                &ResourceState::Invalid,
                REASON_REJECTED,
                &errors.to_string(),
                pr.status
                    .as_ref()
                    .map(|s| (&s.state, s.reason.as_deref(), s.message.as_deref())),
            )
            .await
        }
        Ok(()) => {
            let message = format!("ProtectedResource {namespace}/{name} was added or updated");
            ctx.events
                .normal(pr.as_ref(), REASON_ADDED_OR_UPDATED, message.clone())
                .await;
            write_status_if_changed(
                ctx,
                pr.as_ref(),
                &ResourceState::Valid,
                REASON_ADDED_OR_UPDATED,
                &message,
                pr.status
                    .as_ref()
                    .map(|s| (&s.state, s.reason.as_deref(), s.message.as_deref())),
            )
            .await
        }
    }
}

async fn sync_ingress(ctx: &Arc<ReconcilerContext>, namespace: &str, name: &str) -> Result<()> {
    let Some(group) = ctx.namespaces.get(namespace) else {
        return Ok(());
    };
    let config_name = virtual_server_name(namespace, &super::ingress::synthetic_name(name));
    let translated = group
        .ingresses
        .get(namespace, name)
        .map(|ing| (Arc::clone(&ing), super::ingress::virtual_server_from_ingress(&ing)));

    let Some((ing, Some(vs))) = translated else {
        // Deleted, claimed by another class, or nothing usable: drop
        // whatever this Ingress previously rendered.
        let applied = ctx.configurator.delete_virtual_server(&config_name).await?;
        if applied != Applied::Unchanged {
            info!(namespace, name, "Removed Ingress config");
        }
        return Ok(());
    };

    let listeners = ctx
        .listeners
        .read()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
        .clone();
    let vs = Arc::new(vs);
    let (ex, warnings) = build_virtual_server_ex(&vs, &group, &ctx.namespaces, &listeners);
    let applied = ctx.configurator.apply_virtual_server(&ex).await?;
    debug!(namespace, name, ?applied, "Applied Ingress");

    // Ingress carries no operator-owned status; Events are the only report.
    let message = if warnings.is_empty() {
        format!("Configuration for {namespace}/{name} was added or updated")
    } else {
        format!(
            "Configuration for {namespace}/{name} was added or updated with warnings: {}",
            warnings.join("; ")
        )
    };
    ctx.events
        .normal(ing.as_ref(), REASON_ADDED_OR_UPDATED, message)
        .await;
    Ok(())
}

/// Requeue every resource whose configuration depends on the listener
/// table.
fn requeue_listener_consumers(ctx: &Arc<ReconcilerContext>) {
    for group in ctx.namespaces.all() {
        for ts in group.transport_servers.list() {
            ctx.queue
                .add(&typed_key("ts", &group.namespace, &ts.name_any()));
        }
        for vs in group.virtual_servers.list() {
            if vs.spec.listener.is_some() {
                ctx.queue
                    .add(&typed_key("vs", &group.namespace, &vs.name_any()));
            }
        }
    }
}

async fn write_status_if_changed<K>(
    ctx: &Arc<ReconcilerContext>,
    obj: &K,
    state: &ResourceState,
    reason: &str,
    message: &str,
    current: Option<(&ResourceState, Option<&str>, Option<&str>)>,
) -> Result<()>
where
    K: Resource<DynamicType = (), Scope = k8s_openapi::NamespaceResourceScope>
        + Clone
        + serde::de::DeserializeOwned
        + std::fmt::Debug,
{
    if !status_changed(current, state, reason, message) {
        return Ok(());
    }
    let namespace = obj.meta().namespace.clone().unwrap_or_default();
    let name = obj.meta().name.clone().unwrap_or_default();
    write_validation_status::<K>(&ctx.client, &namespace, &name, state, reason, message).await
}

// ============================================================================
// Shim workers
// ============================================================================

/// Sync one `vs/` key for the certificate shim.
///
/// # Errors
///
/// Propagates API failures for requeue.
pub async fn sync_certificates_key(ctx: &Arc<ReconcilerContext>, key: &str) -> Result<()> {
    let Some((_, namespace, name)) = parse_key(key) else {
        return Ok(());
    };
    let Some(group) = ctx.namespaces.get(namespace) else {
        return Ok(());
    };
    let Some(vs) = group.virtual_servers.get(namespace, name) else {
        // Deletion cascades through owner references.
        return Ok(());
    };
    sync_certificates(&ctx.client, &ctx.events, &vs, &group.certificates).await
}

/// Sync one `vs/` key for the external-dns shim.
///
/// # Errors
///
/// Propagates API failures and the transient missing-endpoints state for
/// requeue.
pub async fn sync_dns_endpoint_key(ctx: &Arc<ReconcilerContext>, key: &str) -> Result<()> {
    let Some((_, namespace, name)) = parse_key(key) else {
        return Ok(());
    };
    let Some(group) = ctx.namespaces.get(namespace) else {
        return Ok(());
    };
    let Some(vs) = group.virtual_servers.get(namespace, name) else {
        return Ok(());
    };
    sync_dns_endpoint(&ctx.client, &ctx.events, &vs, &group.dns_endpoints).await
}

#[cfg(test)]
#[path = "configuration_tests.rs"]
mod configuration_tests;
