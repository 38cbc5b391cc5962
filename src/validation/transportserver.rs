// Copyright (c) 2025 The Rampart Authors
// SPDX-License-Identifier: MIT

//! Validation for `TransportServer`.

use super::{into_result, is_dns_name, ValidationError, ValidationErrors};
use crate::constants::TLS_PASSTHROUGH_LISTENER;
use crate::crd::TransportServer;
use std::collections::HashSet;

/// Validate a `TransportServer` spec.
///
/// Listener existence against the active `GlobalConfiguration` is checked by
/// the reconciler; everything self-contained is checked here.
///
/// # Errors
///
/// Returns every field-level failure found.
pub fn validate_transport_server(ts: &TransportServer) -> Result<(), ValidationErrors> {
    let mut errors = Vec::new();

    let listener = &ts.spec.listener;
    if listener.name.is_empty() {
        errors.push(ValidationError::new(
            "spec.listener.name",
            "",
            "must not be empty",
        ));
    }

    let passthrough = listener.name == TLS_PASSTHROUGH_LISTENER;
    match listener.protocol.as_str() {
        "TLS_PASSTHROUGH" => {
            if !passthrough {
                errors.push(ValidationError::new(
                    "spec.listener.protocol",
                    &listener.protocol,
                    "only valid with the built-in tls-passthrough listener",
                ));
            }
        }
        "TCP" | "UDP" => {
            if passthrough {
                errors.push(ValidationError::new(
                    "spec.listener.protocol",
                    &listener.protocol,
                    "the tls-passthrough listener requires protocol TLS_PASSTHROUGH",
                ));
            }
        }
        other => errors.push(ValidationError::new(
            "spec.listener.protocol",
            other,
            "must be TCP, UDP or TLS_PASSTHROUGH",
        )),
    }

    if passthrough {
        match &ts.spec.host {
            Some(host) if is_dns_name(host) => {}
            Some(host) => errors.push(ValidationError::new(
                "spec.host",
                host,
                "must be a valid DNS name",
            )),
            None => errors.push(ValidationError::new(
                "spec.host",
                "",
                "required for TLS passthrough: connections are multiplexed by SNI",
            )),
        }
        if ts.spec.tls.is_some() {
            errors.push(ValidationError::new(
                "spec.tls",
                "",
                "TLS termination is not valid on a TLS passthrough listener",
            ));
        }
    } else if let Some(tls) = &ts.spec.tls {
        if tls.secret.is_empty() {
            errors.push(ValidationError::new(
                "spec.tls.secret",
                "",
                "must not be empty",
            ));
        }
        if listener.protocol == "UDP" {
            errors.push(ValidationError::new(
                "spec.tls",
                "",
                "TLS termination is not valid on a UDP listener",
            ));
        }
    }

    let mut declared = HashSet::new();
    for (i, upstream) in ts.spec.upstreams.iter().enumerate() {
        if upstream.name.is_empty() {
            errors.push(ValidationError::new(
                format!("spec.upstreams[{i}].name"),
                "",
                "must not be empty",
            ));
        } else if !declared.insert(upstream.name.as_str()) {
            errors.push(ValidationError::new(
                format!("spec.upstreams[{i}].name"),
                &upstream.name,
                "duplicate upstream name",
            ));
        }
        if upstream.service.is_empty() {
            errors.push(ValidationError::new(
                format!("spec.upstreams[{i}].service"),
                "",
                "must not be empty",
            ));
        }
        if upstream.port == 0 {
            errors.push(ValidationError::new(
                format!("spec.upstreams[{i}].port"),
                "0",
                "must be between 1 and 65535",
            ));
        }
    }

    if !declared.contains(ts.spec.action.pass.as_str()) {
        errors.push(ValidationError::new(
            "spec.action.pass",
            &ts.spec.action.pass,
            "references an upstream that is not declared",
        ));
    }

    into_result(errors)
}

#[cfg(test)]
#[path = "transportserver_tests.rs"]
mod transportserver_tests;
