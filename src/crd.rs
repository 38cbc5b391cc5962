// Copyright (c) 2025 The Rampart Authors
// SPDX-License-Identifier: MIT

//! Custom Resource Definitions (CRDs) for ingress configuration.
//!
//! This module defines all Kubernetes Custom Resource Definitions used by Rampart
//! to configure the co-located NGINX reverse proxy declaratively.
//!
//! # Resource Types
//!
//! ## Traffic configuration
//!
//! - [`VirtualServer`] - A logical HTTP service with host, TLS, upstreams, routes
//! - [`VirtualServerRoute`] - A delegated sub-path tree referencing a parent VirtualServer
//! - [`TransportServer`] - An L4 (TCP/UDP/TLS-passthrough) service
//!
//! ## Cross-cutting configuration
//!
//! - [`Policy`] - Exactly one of access-control, rate-limit, JWT, basic-auth,
//!   ingress-mTLS, egress-mTLS, OIDC or WAF
//! - [`GlobalConfiguration`] - Singleton list of named L4 listeners
//! - [`ProtectedResource`] - WAF dataplane protection binding
//!
//! ## Generated objects (owned by a VirtualServer)
//!
//! - [`Certificate`] - cert-manager.io certificate request, produced by the cert shim
//! - [`DNSEndpoint`] - external-dns record, produced by the DNS shim
//!
//! # Example: a VirtualServer
//!
//! ```rust,no_run
//! use rampart::crd::{VirtualServerSpec, Upstream, Route, RouteAction};
//!
//! let spec = VirtualServerSpec {
//!     host: "cafe.example.com".to_string(),
//!     tls: None,
//!     upstreams: vec![Upstream {
//!         name: "tea".to_string(),
//!         service: "tea-svc".to_string(),
//!         port: 80,
//!         ..Upstream::default()
//!     }],
//!     routes: vec![Route {
//!         path: "/tea".to_string(),
//!         action: Some(RouteAction {
//!             pass: Some("tea".to_string()),
//!         }),
//!         splits: None,
//!     }],
//!     external_dns: None,
//!     policies: None,
//!     listener: None,
//! };
//! ```

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ============================================================================
// Shared status machinery
// ============================================================================

/// Validation state of a Rampart resource, written to `status.state`.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
pub enum ResourceState {
    /// The resource validated cleanly and is configured in NGINX.
    Valid,
    /// The resource is configured but with degraded references or soft issues.
    Warning,
    /// The resource failed validation and was not configured.
    Invalid,
    /// The resource has not been processed yet.
    #[default]
    Pending,
}

impl std::fmt::Display for ResourceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceState::Valid => write!(f, "Valid"),
            ResourceState::Warning => write!(f, "Warning"),
            ResourceState::Invalid => write!(f, "Invalid"),
            ResourceState::Pending => write!(f, "Pending"),
        }
    }
}

/// A public address at which a `VirtualServer` or `TransportServer` is reachable.
///
/// Written by the leader only, since it describes the fleet's external address
/// rather than this replica's view.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ExternalEndpoint {
    /// IP address, when the fronting service exposes one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,

    /// Hostname, when the fronting service exposes one (e.g. an ELB name).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,

    /// Ports the endpoint serves.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ports: Option<String>,
}

// ============================================================================
// VirtualServer
// ============================================================================

/// TLS configuration for a `VirtualServer`.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct VirtualServerTls {
    /// Name of the Kubernetes Secret holding the certificate and key.
    ///
    /// When `certManager` is also set, this names the Secret the generated
    /// Certificate object materialises into.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,

    /// Request a certificate from cert-manager instead of referencing
    /// pre-provisioned material.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cert_manager: Option<CertManager>,

    /// Redirect plain HTTP requests to HTTPS.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect: Option<TlsRedirect>,
}

/// HTTP-to-HTTPS redirect behaviour.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct TlsRedirect {
    /// Enable the redirect.
    pub enable: bool,

    /// Redirect status code (301 or 302).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<u16>,
}

/// cert-manager issuance parameters translated into a Certificate object.
///
/// Exactly one of `issuer` and `clusterIssuer` must be set; `clusterIssuer`
/// is incompatible with `issuerKind` and `issuerGroup`.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct CertManager {
    /// Name of a namespaced cert-manager Issuer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issuer: Option<String>,

    /// Name of a cert-manager ClusterIssuer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cluster_issuer: Option<String>,

    /// Issuer kind for external issuers. Only valid with `issuer`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issuer_kind: Option<String>,

    /// Issuer group for external issuers. Only valid with `issuer`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issuer_group: Option<String>,

    /// Common name for the certificate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub common_name: Option<String>,

    /// Requested certificate lifetime (Go duration string, e.g. "2160h").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,

    /// How long before expiry the certificate is renewed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub renew_before: Option<String>,

    /// Requested key usages.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usages: Option<Vec<String>>,

    /// Issue a temporary self-signed certificate while the real one is pending.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issue_temp_cert: Option<bool>,
}

/// A logical backend pool: a name, a Service selector, and runtime peers.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Upstream {
    /// Upstream name referenced by route actions. Unique within the resource.
    pub name: String,

    /// Kubernetes Service backing this upstream.
    pub service: String,

    /// Service port.
    pub port: u16,

    /// Load-balancing method (e.g. "`round_robin`", "`least_conn`").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lb_method: Option<String>,

    /// Maximum failed attempts before a peer is marked unavailable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_fails: Option<u32>,

    /// Time a peer stays unavailable after `max_fails` failures (e.g. "10s").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fail_timeout: Option<String>,

    /// Maximum number of keepalive connections to cache per worker.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keepalive: Option<u32>,
}

/// Action taken when a route matches.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct RouteAction {
    /// Name of the upstream to pass the request to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pass: Option<String>,
}

/// A weighted traffic split across upstreams.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct RouteSplit {
    /// Percentage of traffic, 0-100. Splits in a route must sum to 100.
    pub weight: u8,

    /// Action for this slice of traffic.
    pub action: RouteAction,
}

/// A routing rule inside a `VirtualServer` or `VirtualServerRoute`.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Route {
    /// URI path prefix this route matches.
    pub path: String,

    /// Single-destination action. Mutually exclusive with `splits`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<RouteAction>,

    /// Weighted splits. Mutually exclusive with `action`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub splits: Option<Vec<RouteSplit>>,
}

/// external-dns record generation parameters.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ExternalDns {
    /// Enable DNSEndpoint generation for this VirtualServer.
    pub enable: bool,

    /// Override the derived record type (A/AAAA/CNAME).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record_type: Option<String>,

    /// Record TTL in seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record_ttl: Option<i64>,

    /// Labels copied onto the generated endpoint.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<BTreeMap<String, String>>,

    /// Provider-specific properties passed through to external-dns.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_specific: Option<Vec<ProviderSpecific>>,
}

/// A provider-specific property on a DNSEndpoint.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
pub struct ProviderSpecific {
    /// Property name.
    pub name: String,

    /// Property value.
    pub value: String,
}

/// Reference to a `Policy` resource.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct PolicyReference {
    /// Policy name.
    pub name: String,

    /// Policy namespace; defaults to the referencing resource's namespace.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

/// Custom listener assignment for a `VirtualServer`.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct VirtualServerListener {
    /// Name of an HTTP listener declared in the GlobalConfiguration.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http: Option<String>,

    /// Name of an HTTPS listener declared in the GlobalConfiguration.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub https: Option<String>,
}

/// VirtualServer defines a logical HTTP service: a host, optional TLS,
/// a set of named upstreams and routing rules over them.
#[derive(CustomResource, Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Default)]
#[kube(
    group = "k8s.rampart.io",
    version = "v1",
    kind = "VirtualServer",
    namespaced,
    shortname = "vs",
    doc = "VirtualServer represents a logical HTTP service routed by NGINX. It declares a host, optional TLS termination, a set of named upstream pools and routing rules that map request paths onto those pools."
)]
#[kube(status = "VirtualServerStatus")]
#[kube(derive = "PartialEq")]
#[serde(rename_all = "camelCase")]
pub struct VirtualServerSpec {
    /// Host name this server answers for. Must be a valid DNS name.
    #[schemars(regex(
        pattern = r"^([a-zA-Z0-9]([a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?\.)*[a-zA-Z0-9]([a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?$"
    ))]
    pub host: String,

    /// TLS termination configuration.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tls: Option<VirtualServerTls>,

    /// Named upstream pools.
    #[serde(default)]
    pub upstreams: Vec<Upstream>,

    /// Routing rules. Every upstream an action references must be declared
    /// in `upstreams`.
    #[serde(default)]
    pub routes: Vec<Route>,

    /// external-dns record generation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_dns: Option<ExternalDns>,

    /// Policies applied to the whole server.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub policies: Option<Vec<PolicyReference>>,

    /// Custom listener assignment.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub listener: Option<VirtualServerListener>,
}

/// Status of a `VirtualServer`.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct VirtualServerStatus {
    /// Validation state: Valid, Warning, Invalid or Pending.
    #[serde(default)]
    pub state: ResourceState,

    /// Programmatic reason for the current state.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Human-readable explanation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Public addresses of the ingress fleet. Written only by the leader.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_endpoints: Option<Vec<ExternalEndpoint>>,
}

// ============================================================================
// VirtualServerRoute
// ============================================================================

/// VirtualServerRoute carries a delegated sub-path tree for a parent
/// VirtualServer identified by host.
#[derive(CustomResource, Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq)]
#[kube(
    group = "k8s.rampart.io",
    version = "v1",
    kind = "VirtualServerRoute",
    namespaced,
    shortname = "vsr",
    doc = "VirtualServerRoute defines a delegated sub-path routing tree. A parent VirtualServer references it by host; the route contributes upstreams and subroutes under the parent's host."
)]
#[kube(status = "VirtualServerRouteStatus")]
#[kube(derive = "PartialEq")]
#[serde(rename_all = "camelCase")]
pub struct VirtualServerRouteSpec {
    /// Host of the parent VirtualServer.
    #[schemars(regex(
        pattern = r"^([a-zA-Z0-9]([a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?\.)*[a-zA-Z0-9]([a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?$"
    ))]
    pub host: String,

    /// Named upstream pools contributed by this route.
    #[serde(default)]
    pub upstreams: Vec<Upstream>,

    /// Subroutes under the parent's delegated path.
    #[serde(default)]
    pub subroutes: Vec<Route>,
}

/// Status of a `VirtualServerRoute`.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct VirtualServerRouteStatus {
    /// Validation state.
    #[serde(default)]
    pub state: ResourceState,

    /// Programmatic reason for the current state.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Human-readable explanation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Parent VirtualServer that references this route, as `namespace/name`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub referenced_by: Option<String>,

    /// Public addresses of the ingress fleet. Written only by the leader.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_endpoints: Option<Vec<ExternalEndpoint>>,
}

// ============================================================================
// TransportServer
// ============================================================================

/// Listener binding for a `TransportServer`.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct TransportServerListener {
    /// Listener name. Must match a GlobalConfiguration listener or the
    /// built-in `tls-passthrough`.
    pub name: String,

    /// Listener protocol: TCP, UDP or `TLS_PASSTHROUGH`.
    pub protocol: String,
}

/// TLS termination for a TCP `TransportServer`.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct TransportServerTls {
    /// Name of the Secret holding certificate and key.
    pub secret: String,
}

/// An upstream pool for a `TransportServer`.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct TransportServerUpstream {
    /// Upstream name referenced by the action.
    pub name: String,

    /// Kubernetes Service backing this upstream.
    pub service: String,

    /// Service port.
    pub port: u16,

    /// Maximum simultaneous connections to a peer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_conns: Option<u32>,
}

/// The single action of a `TransportServer`.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct TransportServerAction {
    /// Name of the upstream connections are passed to.
    pub pass: String,
}

/// TransportServer defines an L4 service: TCP, UDP or TLS passthrough.
#[derive(CustomResource, Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq)]
#[kube(
    group = "k8s.rampart.io",
    version = "v1",
    kind = "TransportServer",
    namespaced,
    shortname = "ts",
    doc = "TransportServer represents an L4 service routed by NGINX stream blocks: TCP, UDP, or SNI-multiplexed TLS passthrough to backend sockets without terminating TLS."
)]
#[kube(status = "TransportServerStatus")]
#[kube(derive = "PartialEq")]
#[serde(rename_all = "camelCase")]
pub struct TransportServerSpec {
    /// Listener this server binds to.
    pub listener: TransportServerListener,

    /// Host for TLS passthrough SNI matching. Required when the listener is
    /// `tls-passthrough`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    /// L4 TLS termination. Forbidden on TLS passthrough listeners.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tls: Option<TransportServerTls>,

    /// Upstream pools.
    #[serde(default)]
    pub upstreams: Vec<TransportServerUpstream>,

    /// The single pass action.
    pub action: TransportServerAction,
}

/// Status of a `TransportServer`.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct TransportServerStatus {
    /// Validation state.
    #[serde(default)]
    pub state: ResourceState,

    /// Programmatic reason for the current state.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Human-readable explanation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

// ============================================================================
// Policy
// ============================================================================

/// Source-address access control. Exactly one of allow/deny must be set.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct AccessControl {
    /// CIDRs allowed to connect; everything else is denied.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allow: Option<Vec<String>>,

    /// CIDRs denied; everything else is allowed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deny: Option<Vec<String>>,
}

/// Request rate limiting.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct RateLimit {
    /// Rate expression, e.g. "10r/s" or "100r/m".
    pub rate: String,

    /// Key the rate is accounted against, e.g. "`${binary_remote_addr}`".
    pub key: String,

    /// Shared zone size, e.g. "10M" or "64k". Minimum 32k.
    pub zone_size: String,

    /// Requests allowed to burst above the rate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub burst: Option<u32>,

    /// Serve burst requests without delay.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub no_delay: Option<bool>,

    /// Number of requests after which excess requests are delayed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delay: Option<u32>,

    /// Status code for rejected requests, 400-599.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reject_code: Option<u16>,

    /// Log level for rejections: info, notice, warn or error.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
}

/// JWT validation. Exactly one of `secret` and `jwksURI` must be set.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Jwt {
    /// Realm reported in WWW-Authenticate on rejection.
    pub realm: String,

    /// Secret holding the local JWK set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,

    /// Remote JWKS endpoint.
    #[serde(rename = "jwksURI", skip_serializing_if = "Option::is_none")]
    pub jwks_uri: Option<String>,

    /// How long fetched keys are cached. Mandatory with `jwksURI`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_cache: Option<String>,

    /// Variable the token is read from, e.g. "`$http_token`".
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

/// HTTP basic authentication.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct BasicAuth {
    /// Secret holding the htpasswd file.
    pub secret: String,

    /// Realm reported on rejection.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub realm: Option<String>,
}

/// Client certificate verification at the ingress hop.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct IngressMtls {
    /// Secret holding the CA bundle clients are verified against.
    pub client_cert_secret: String,

    /// Verification mode: on, off or optional.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verify_client: Option<String>,

    /// Maximum verification chain depth.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verify_depth: Option<u32>,
}

/// Client certificate presented to upstreams.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct EgressMtls {
    /// Secret holding the client certificate and key.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tls_secret: Option<String>,

    /// Secret holding the CA bundle upstream servers are verified against.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trusted_cert_secret: Option<String>,

    /// Verify the upstream certificate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verify_server: Option<bool>,

    /// SNI name sent to the upstream.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ssl_name: Option<String>,
}

/// OpenID Connect authentication.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Oidc {
    /// OAuth2 client ID.
    pub client_id: String,

    /// Secret holding the OAuth2 client secret.
    pub client_secret: String,

    /// Authorization endpoint URL.
    pub auth_endpoint: String,

    /// Token endpoint URL.
    pub token_endpoint: String,

    /// JWKS endpoint URL.
    #[serde(rename = "jwksURI")]
    pub jwks_uri: String,

    /// Requested scope. Must contain `openid`; tokens are `+`-delimited.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

/// Web application firewall attachment.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Waf {
    /// Enable WAF enforcement.
    pub enable: bool,

    /// Reference to an APPolicy resource. Mutually exclusive with `apBundle`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ap_policy: Option<String>,

    /// Pre-compiled policy bundle file name. Mutually exclusive with `apPolicy`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ap_bundle: Option<String>,

    /// Security log configuration.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub security_log: Option<SecurityLog>,
}

/// WAF security log settings.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct SecurityLog {
    /// Enable security logging.
    pub enable: bool,

    /// Reference to an APLogConf resource.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ap_log_conf: Option<String>,

    /// Log destination: `stderr` or `host:port`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_dest: Option<String>,
}

/// Policy holds exactly one traffic-management policy.
#[derive(CustomResource, Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Default)]
#[kube(
    group = "k8s.rampart.io",
    version = "v1",
    kind = "Policy",
    namespaced,
    shortname = "pol",
    doc = "Policy holds exactly one traffic-management policy (access control, rate limiting, JWT, basic auth, ingress/egress mTLS, OIDC or WAF) that VirtualServers attach by reference."
)]
#[kube(status = "PolicyStatus")]
#[kube(derive = "PartialEq")]
#[serde(rename_all = "camelCase")]
pub struct PolicySpec {
    /// Source-address access control.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_control: Option<AccessControl>,

    /// Request rate limiting.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<RateLimit>,

    /// JWT validation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jwt: Option<Jwt>,

    /// HTTP basic authentication.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub basic_auth: Option<BasicAuth>,

    /// Ingress-side client certificate verification.
    #[serde(rename = "ingressMTLS", skip_serializing_if = "Option::is_none")]
    pub ingress_mtls: Option<IngressMtls>,

    /// Egress-side client certificate presentation.
    #[serde(rename = "egressMTLS", skip_serializing_if = "Option::is_none")]
    pub egress_mtls: Option<EgressMtls>,

    /// OpenID Connect authentication.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oidc: Option<Oidc>,

    /// Web application firewall.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub waf: Option<Waf>,
}

/// Status of a `Policy`.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct PolicyStatus {
    /// Validation state.
    #[serde(default)]
    pub state: ResourceState,

    /// Programmatic reason for the current state.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Human-readable explanation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

// ============================================================================
// GlobalConfiguration
// ============================================================================

/// A named L4 listener.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Listener {
    /// Listener name. Unique, and never the reserved `tls-passthrough`.
    pub name: String,

    /// Port, 1-65535, outside the forbidden set.
    pub port: u16,

    /// Protocol: TCP, UDP or HTTP.
    pub protocol: String,
}

/// GlobalConfiguration is the singleton list of named L4 listeners.
#[derive(CustomResource, Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq)]
#[kube(
    group = "k8s.rampart.io",
    version = "v1",
    kind = "GlobalConfiguration",
    namespaced,
    shortname = "gc",
    doc = "GlobalConfiguration declares the named L4 listeners TransportServers may bind to. At most one instance is consumed per controller scope."
)]
#[kube(status = "GlobalConfigurationStatus")]
#[kube(derive = "PartialEq")]
#[serde(rename_all = "camelCase")]
pub struct GlobalConfigurationSpec {
    /// Declared listeners.
    #[serde(default)]
    pub listeners: Vec<Listener>,
}

/// Status of a `GlobalConfiguration`.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct GlobalConfigurationStatus {
    /// Validation state.
    #[serde(default)]
    pub state: ResourceState,

    /// Programmatic reason for the current state.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Human-readable explanation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

// ============================================================================
// ProtectedResource
// ============================================================================

/// ProtectedResource binds a WAF policy and log destination to a workload.
#[derive(CustomResource, Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq)]
#[kube(
    group = "k8s.rampart.io",
    version = "v1",
    kind = "ProtectedResource",
    namespaced,
    doc = "ProtectedResource binds a WAF dataplane policy and a security log destination to a protected workload."
)]
#[kube(status = "ProtectedResourceStatus")]
#[kube(derive = "PartialEq")]
#[serde(rename_all = "camelCase")]
pub struct ProtectedResourceSpec {
    /// Name of the WAF policy to enforce.
    pub waf_policy: String,

    /// Security log destination: `stderr` or `host:port`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_destination: Option<String>,
}

/// Status of a `ProtectedResource`.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ProtectedResourceStatus {
    /// Validation state.
    #[serde(default)]
    pub state: ResourceState,

    /// Programmatic reason for the current state.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Human-readable explanation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

// ============================================================================
// Foreign CRDs produced by the shims
// ============================================================================

/// Reference to a cert-manager issuer.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct IssuerRef {
    /// Issuer name.
    pub name: String,

    /// Issuer kind: Issuer or ClusterIssuer (or an external kind).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    /// Issuer API group.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
}

/// cert-manager.io/v1 Certificate, as produced by the certificate shim.
///
/// Only the fields the shim manages are modelled; cert-manager owns the rest.
#[derive(CustomResource, Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq)]
#[kube(
    group = "cert-manager.io",
    version = "v1",
    kind = "Certificate",
    namespaced,
    schema = "disabled"
)]
#[kube(derive = "PartialEq")]
#[serde(rename_all = "camelCase")]
pub struct CertificateSpec {
    /// Name of the Secret the issued certificate is written to.
    pub secret_name: String,

    /// DNS names on the certificate.
    #[serde(default)]
    pub dns_names: Vec<String>,

    /// Common name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub common_name: Option<String>,

    /// Certificate lifetime.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,

    /// Renewal lead time.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub renew_before: Option<String>,

    /// Key usages.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usages: Option<Vec<String>>,

    /// Issuer reference.
    pub issuer_ref: IssuerRef,
}

/// A single DNS record inside a `DNSEndpoint`.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Endpoint {
    /// Fully qualified record name.
    pub dns_name: String,

    /// Record targets: IPs or hostnames.
    #[serde(default)]
    pub targets: Vec<String>,

    /// Record type: A, AAAA or CNAME.
    pub record_type: String,

    /// Record TTL in seconds.
    #[serde(rename = "recordTTL", skip_serializing_if = "Option::is_none")]
    pub record_ttl: Option<i64>,

    /// external-dns endpoint labels.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<BTreeMap<String, String>>,

    /// Provider-specific properties.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_specific: Option<Vec<ProviderSpecific>>,
}

/// externaldns.k8s.io/v1alpha1 DNSEndpoint, as produced by the DNS shim.
#[derive(CustomResource, Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq)]
#[kube(
    group = "externaldns.k8s.io",
    version = "v1alpha1",
    kind = "DNSEndpoint",
    namespaced,
    schema = "disabled"
)]
#[kube(derive = "PartialEq")]
#[serde(rename_all = "camelCase")]
pub struct DNSEndpointSpec {
    /// Records external-dns should materialise.
    #[serde(default)]
    pub endpoints: Vec<Endpoint>,
}

#[cfg(test)]
#[path = "crd_tests.rs"]
mod crd_tests;
