// Copyright (c) 2025 The Rampart Authors
// SPDX-License-Identifier: MIT

//! Global constants for the Rampart ingress controller.
//!
//! This module contains all numeric and string constants used throughout the codebase.
//! Constants are organized by category for easy maintenance.

use std::time::Duration;

// ============================================================================
// API Constants
// ============================================================================

/// API group for all Rampart CRDs
pub const API_GROUP: &str = "k8s.rampart.io";

/// API version for all Rampart CRDs
pub const API_VERSION: &str = "v1";

/// Fully qualified API version (group/version)
pub const API_GROUP_VERSION: &str = "k8s.rampart.io/v1";

/// Kind name for `VirtualServer` resource
pub const KIND_VIRTUAL_SERVER: &str = "VirtualServer";

/// Kind name for `VirtualServerRoute` resource
pub const KIND_VIRTUAL_SERVER_ROUTE: &str = "VirtualServerRoute";

/// Kind name for `TransportServer` resource
pub const KIND_TRANSPORT_SERVER: &str = "TransportServer";

/// Kind name for `Policy` resource
pub const KIND_POLICY: &str = "Policy";

/// Kind name for `GlobalConfiguration` resource
pub const KIND_GLOBAL_CONFIGURATION: &str = "GlobalConfiguration";

/// Kind name for cert-manager `Certificate` resources created by the shim
pub const KIND_CERTIFICATE: &str = "Certificate";

/// Kind name for external-dns `DNSEndpoint` resources created by the shim
pub const KIND_DNS_ENDPOINT: &str = "DNSEndpoint";

/// IngressClass name this controller claims native Ingress resources for
pub const INGRESS_CLASS: &str = "rampart";

/// Legacy annotation naming the ingress class on pre-v1 Ingress objects
pub const INGRESS_CLASS_ANNOTATION: &str = "kubernetes.io/ingress.class";

// ============================================================================
// Listener Constants
// ============================================================================

/// Reserved listener name used for TLS passthrough; user listeners may not claim it
pub const TLS_PASSTHROUGH_LISTENER: &str = "tls-passthrough";

/// Default port for the TLS passthrough internal proxy
pub const DEFAULT_TLS_PASSTHROUGH_PORT: u16 = 443;

/// Default port for the NGINX stub status endpoint
pub const NGINX_STATUS_PORT: u16 = 8080;

/// Default port for the readiness endpoint
pub const DEFAULT_READY_STATUS_PORT: u16 = 8081;

/// Default port for Prometheus metrics
pub const DEFAULT_METRICS_PORT: u16 = 9113;

/// Default port for the deep service-insight probes
pub const DEFAULT_SERVICE_INSIGHT_PORT: u16 = 9114;

/// Ports that `GlobalConfiguration` listeners may never claim.
///
/// These are already owned by the controller or NGINX itself: HTTP/HTTPS,
/// stub status, readiness, metrics, service insight.
pub const FORBIDDEN_LISTENER_PORTS: [u16; 6] = [
    80,
    443,
    NGINX_STATUS_PORT,
    DEFAULT_READY_STATUS_PORT,
    DEFAULT_METRICS_PORT,
    DEFAULT_SERVICE_INSIGHT_PORT,
];

// ============================================================================
// NGINX Filesystem Layout
// ============================================================================

/// Default root of the NGINX configuration tree
pub const DEFAULT_NGINX_CONF_ROOT: &str = "/etc/nginx";

/// Main configuration file name, relative to the config root
pub const MAIN_CONFIG_FILE: &str = "nginx.conf";

/// Directory for per-VirtualServer HTTP configuration fragments
pub const HTTP_CONF_DIR: &str = "conf.d";

/// Directory for per-TransportServer stream configuration fragments
pub const STREAM_CONF_DIR: &str = "stream-conf.d";

/// Directory for materialised secret files
pub const SECRETS_DIR: &str = "secrets";

/// Directory for per-VirtualServer key-value state files
pub const STATE_FILES_DIR: &str = "state_files";

/// SNI-to-backend map for TLS passthrough
pub const TLS_PASSTHROUGH_HOSTS_FILE: &str = "tls-passthrough-hosts.conf";

/// Fragment carrying the current config version integer
pub const CONFIG_VERSION_FILE: &str = "config-version.conf";

/// File mode for generated configuration files
pub const CONFIG_FILE_MODE: u32 = 0o644;

/// File mode for TLS secret material
pub const TLS_SECRET_FILE_MODE: u32 = 0o600;

/// File mode for JWK / htpasswd / CA material
pub const AUX_SECRET_FILE_MODE: u32 = 0o644;

// ============================================================================
// Reload and Admin API Constants
// ============================================================================

/// Default unix socket for the NGINX Plus admin API
pub const DEFAULT_PLUS_API_SOCKET: &str = "/var/lib/nginx/nginx-plus-api.sock";

/// Endpoint the verification client polls after each reload
pub const CONFIG_VERSION_CHECK_PATH: &str = "/configVersionCheck";

/// Header carrying the expected config version on verification requests
pub const CONFIG_VERSION_HEADER: &str = "X-Expected-Config-Version";

/// How long a reload may take before verification gives up
pub const DEFAULT_RELOAD_TIMEOUT: Duration = Duration::from_secs(60);

/// Interval between verification polls
pub const VERIFY_POLL_INTERVAL: Duration = Duration::from_millis(25);

// ============================================================================
// Work Queue Constants
// ============================================================================

/// Base delay for per-key rate limiting in the work queue
pub const QUEUE_BASE_DELAY: Duration = Duration::from_secs(5);

/// Cap on the per-key rate-limit delay
pub const QUEUE_MAX_DELAY: Duration = Duration::from_secs(300);

// ============================================================================
// Telemetry Constants
// ============================================================================

/// Interval between telemetry reports (before jitter)
pub const TELEMETRY_REPORT_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// Project name sent in telemetry reports
pub const TELEMETRY_PROJECT_NAME: &str = "rampart";

// ============================================================================
// Validation Constants
// ============================================================================

/// Maximum length of a `ProtectedResource` name
pub const MAX_PROTECTED_RESOURCE_NAME_LEN: usize = 63;

/// Minimum rate-limit zone size in kilobytes
pub const MIN_RATE_LIMIT_ZONE_KB: u64 = 32;

// ============================================================================
// Leader Election
// ============================================================================

/// Name of the Lease object used for leader election
pub const LEADER_ELECTION_LEASE: &str = "rampart-leader-election";

/// Leader election lease duration (seconds)
pub const DEFAULT_LEASE_DURATION_SECS: u64 = 15;

/// Grace period before a lease is considered expired (seconds)
pub const DEFAULT_LEASE_GRACE_SECS: u64 = 5;

// ============================================================================
// Environment Variables
// ============================================================================

/// Environment variable carrying the controller pod's namespace
pub const POD_NAMESPACE_ENV: &str = "POD_NAMESPACE";

/// Environment variable carrying the controller pod's name
pub const POD_NAME_ENV: &str = "POD_NAME";
