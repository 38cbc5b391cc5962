// Copyright (c) 2025 The Rampart Authors
// SPDX-License-Identifier: MIT

//! Validation for `GlobalConfiguration` listeners.
//!
//! Listener validation is per-listener and fail-soft at the reconciler level:
//! an invalid listener is rejected while the valid remainder is applied. The
//! validator therefore reports which listeners failed, keyed by name, instead
//! of failing the whole resource.

use super::{ValidationError, ValidationErrors};
use crate::constants::{FORBIDDEN_LISTENER_PORTS, TLS_PASSTHROUGH_LISTENER};
use crate::crd::{GlobalConfiguration, Listener};
use std::collections::HashSet;

/// Outcome of validating a `GlobalConfiguration`.
#[derive(Debug, Default)]
pub struct ListenerValidation {
    /// Listeners that passed and may be rendered.
    pub accepted: Vec<Listener>,

    /// Failures for the listeners that were rejected.
    pub rejected: Vec<ValidationError>,
}

impl ListenerValidation {
    /// Whether every declared listener was accepted.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.rejected.is_empty()
    }

    /// The rejections as a `ValidationErrors` for event and status messages.
    #[must_use]
    pub fn errors(&self) -> ValidationErrors {
        ValidationErrors(self.rejected.clone())
    }
}

/// Validate the listeners of a `GlobalConfiguration`.
///
/// Listeners are processed in declaration order; a listener conflicting with
/// an earlier accepted one is the one rejected.
#[must_use]
pub fn validate_global_configuration(gc: &GlobalConfiguration) -> ListenerValidation {
    let mut out = ListenerValidation::default();
    let mut names: HashSet<&str> = HashSet::new();

    for (i, listener) in gc.spec.listeners.iter().enumerate() {
        let field = format!("spec.listeners[{i}]");

        if listener.name.is_empty() {
            out.rejected.push(ValidationError::new(
                format!("{field}.name"),
                "",
                "must not be empty",
            ));
            continue;
        }
        if listener.name == TLS_PASSTHROUGH_LISTENER {
            out.rejected.push(ValidationError::new(
                format!("{field}.name"),
                &listener.name,
                "is reserved for the built-in TLS passthrough listener",
            ));
            continue;
        }
        if !names.insert(listener.name.as_str()) {
            out.rejected.push(ValidationError::new(
                format!("{field}.name"),
                &listener.name,
                "duplicate listener name",
            ));
            continue;
        }

        if !matches!(listener.protocol.as_str(), "TCP" | "UDP" | "HTTP") {
            out.rejected.push(ValidationError::new(
                format!("{field}.protocol"),
                &listener.protocol,
                "must be TCP, UDP or HTTP",
            ));
            continue;
        }

        if listener.port == 0 {
            out.rejected.push(ValidationError::new(
                format!("{field}.port"),
                "0",
                "must be between 1 and 65535",
            ));
            continue;
        }
        if FORBIDDEN_LISTENER_PORTS.contains(&listener.port) {
            out.rejected.push(ValidationError::new(
                format!("{field}.port"),
                listener.port.to_string(),
                "is reserved for the controller's own endpoints",
            ));
            continue;
        }

        if let Some(message) = port_conflict(listener, &out.accepted) {
            out.rejected.push(ValidationError::new(
                format!("{field}.port"),
                listener.port.to_string(),
                message,
            ));
            continue;
        }

        out.accepted.push(listener.clone());
    }

    out
}

/// Check a candidate listener's port against the already accepted ones.
///
/// TCP and UDP listeners may share a port; an HTTP listener owns its port
/// exclusively against the L4 protocols and vice versa.
fn port_conflict(candidate: &Listener, accepted: &[Listener]) -> Option<String> {
    for existing in accepted {
        if existing.port != candidate.port {
            continue;
        }
        let existing_http = existing.protocol == "HTTP";
        let candidate_http = candidate.protocol == "HTTP";
        if existing_http && candidate_http {
            return Some(format!(
                "port {} is taken by HTTP listener {}",
                candidate.port, existing.name
            ));
        }
        if existing_http != candidate_http {
            let kind = if existing_http { "HTTP" } else { "TCP/UDP" };
            return Some(format!(
                "port {} is taken by {kind} listener {}",
                candidate.port, existing.name
            ));
        }
        // Both L4: only the same protocol conflicts.
        if existing.protocol == candidate.protocol {
            return Some(format!(
                "port {} is taken by {} listener {}",
                candidate.port, existing.protocol, existing.name
            ));
        }
    }
    None
}

#[cfg(test)]
#[path = "globalconfiguration_tests.rs"]
mod globalconfiguration_tests;
