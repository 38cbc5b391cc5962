// Copyright (c) 2025 The Rampart Authors
// SPDX-License-Identifier: MIT

//! # Rampart - NGINX Ingress Controller for Kubernetes
//!
//! Rampart watches a set of custom resources (VirtualServer,
//! VirtualServerRoute, TransportServer, Policy, GlobalConfiguration) and
//! drives a co-located NGINX instance: it renders configuration fragments,
//! coordinates version-gated reloads, and on NGINX Plus applies endpoint
//! churn dynamically over the admin socket without reloading at all.
//!
//! ## Modules
//!
//! - [`crd`] - Custom Resource Definition types
//! - [`store`] - Typed per-namespace caches fed by watchers
//! - [`queue`] - Rate-limited work queue of resource keys
//! - [`validation`] - Pure admission-style validators per kind
//! - [`nginx`] - Proxy manager: config tree, reload protocol, Plus admin API
//! - [`configurator`] - Render + diff + reload-vs-dynamic decisions
//! - [`controllers`] - Main reconciler plus the cert-manager and
//!   external-dns shims
//! - [`namespaces`] - Static or label-driven namespace discovery
//! - [`leader`] - Lease-based leader election
//! - [`health`] - Readiness, metrics and deep service-insight endpoints
//! - [`telemetry`] - Periodic installation reports
//!
//! The controller binary wires these together; `crdgen` prints the CRD
//! manifests as YAML.

pub mod cli;
pub mod configurator;
pub mod constants;
pub mod controllers;
pub mod crd;
pub mod health;
pub mod leader;
pub mod metrics;
pub mod namespaces;
pub mod nginx;
pub mod queue;
pub mod store;
pub mod telemetry;
pub mod validation;
