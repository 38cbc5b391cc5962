// Copyright (c) 2025 The Rampart Authors
// SPDX-License-Identifier: MIT

//! Validation for `VirtualServer` and `VirtualServerRoute`.

use super::{into_result, is_dns_name, ValidationError, ValidationErrors};
use crate::crd::{Route, Upstream, VirtualServer, VirtualServerRoute};
use std::collections::HashSet;

/// Validate a `VirtualServer` spec.
///
/// Checks the host, upstream declarations, route references and the TLS
/// block, including the cert-manager issuance parameters.
///
/// # Errors
///
/// Returns every field-level failure found, not just the first.
pub fn validate_virtual_server(vs: &VirtualServer) -> Result<(), ValidationErrors> {
    let mut errors = Vec::new();

    if !is_dns_name(&vs.spec.host) {
        errors.push(ValidationError::new(
            "spec.host",
            &vs.spec.host,
            "must be a valid DNS name",
        ));
    }

    let declared = validate_upstreams(&vs.spec.upstreams, "spec.upstreams", &mut errors);
    validate_routes(&vs.spec.routes, "spec.routes", &declared, &mut errors);

    if let Some(tls) = &vs.spec.tls {
        if let Some(cm) = &tls.cert_manager {
            let field = "spec.tls.certManager";
            match (&cm.issuer, &cm.cluster_issuer) {
                (None, None) => errors.push(ValidationError::new(
                    field,
                    "",
                    "one of issuer or clusterIssuer must be set",
                )),
                (Some(_), Some(_)) => errors.push(ValidationError::new(
                    field,
                    "",
                    "issuer and clusterIssuer are mutually exclusive",
                )),
                _ => {}
            }
            if cm.cluster_issuer.is_some() && (cm.issuer_kind.is_some() || cm.issuer_group.is_some())
            {
                errors.push(ValidationError::new(
                    field,
                    "",
                    "issuerKind and issuerGroup are not valid with clusterIssuer",
                ));
            }
            if tls.secret.as_deref().unwrap_or_default().is_empty() {
                errors.push(ValidationError::new(
                    "spec.tls.secret",
                    "",
                    "required when certManager is set: names the Secret the certificate is written to",
                ));
            }
        }
        if let Some(redirect) = &tls.redirect {
            if let Some(code) = redirect.code {
                if code != 301 && code != 302 {
                    errors.push(ValidationError::new(
                        "spec.tls.redirect.code",
                        code.to_string(),
                        "must be 301 or 302",
                    ));
                }
            }
        }
    }

    if let Some(dns) = &vs.spec.external_dns {
        if let Some(record_type) = &dns.record_type {
            if !matches!(record_type.as_str(), "A" | "AAAA" | "CNAME") {
                errors.push(ValidationError::new(
                    "spec.externalDNS.recordType",
                    record_type,
                    "must be A, AAAA or CNAME",
                ));
            }
        }
        if let Some(ttl) = dns.record_ttl {
            if ttl <= 0 {
                errors.push(ValidationError::new(
                    "spec.externalDNS.recordTTL",
                    ttl.to_string(),
                    "must be positive",
                ));
            }
        }
    }

    into_result(errors)
}

/// Validate a `VirtualServerRoute` spec.
///
/// # Errors
///
/// Returns every field-level failure found.
pub fn validate_virtual_server_route(vsr: &VirtualServerRoute) -> Result<(), ValidationErrors> {
    let mut errors = Vec::new();

    if !is_dns_name(&vsr.spec.host) {
        errors.push(ValidationError::new(
            "spec.host",
            &vsr.spec.host,
            "must be a valid DNS name",
        ));
    }

    let declared = validate_upstreams(&vsr.spec.upstreams, "spec.upstreams", &mut errors);
    validate_routes(&vsr.spec.subroutes, "spec.subroutes", &declared, &mut errors);

    into_result(errors)
}

/// Check upstream declarations and return the set of declared names.
fn validate_upstreams(
    upstreams: &[Upstream],
    field: &str,
    errors: &mut Vec<ValidationError>,
) -> HashSet<String> {
    let mut declared = HashSet::new();
    for (i, upstream) in upstreams.iter().enumerate() {
        if upstream.name.is_empty() {
            errors.push(ValidationError::new(
                format!("{field}[{i}].name"),
                "",
                "must not be empty",
            ));
        } else if !declared.insert(upstream.name.clone()) {
            errors.push(ValidationError::new(
                format!("{field}[{i}].name"),
                &upstream.name,
                "duplicate upstream name",
            ));
        }
        if upstream.service.is_empty() {
            errors.push(ValidationError::new(
                format!("{field}[{i}].service"),
                "",
                "must not be empty",
            ));
        }
        if upstream.port == 0 {
            errors.push(ValidationError::new(
                format!("{field}[{i}].port"),
                "0",
                "must be between 1 and 65535",
            ));
        }
    }
    declared
}

/// Check routes against the declared upstream names.
fn validate_routes(
    routes: &[Route],
    field: &str,
    declared: &HashSet<String>,
    errors: &mut Vec<ValidationError>,
) {
    for (i, route) in routes.iter().enumerate() {
        if !route.path.starts_with('/') {
            errors.push(ValidationError::new(
                format!("{field}[{i}].path"),
                &route.path,
                "must start with /",
            ));
        }
        match (&route.action, &route.splits) {
            (None, None) => errors.push(ValidationError::new(
                format!("{field}[{i}]"),
                &route.path,
                "one of action or splits must be set",
            )),
            (Some(_), Some(_)) => errors.push(ValidationError::new(
                format!("{field}[{i}]"),
                &route.path,
                "action and splits are mutually exclusive",
            )),
            (Some(action), None) => {
                if let Some(pass) = &action.pass {
                    check_pass_target(pass, &format!("{field}[{i}].action.pass"), declared, errors);
                }
            }
            (None, Some(splits)) => {
                if splits.is_empty() {
                    errors.push(ValidationError::new(
                        format!("{field}[{i}].splits"),
                        "",
                        "must not be empty",
                    ));
                    continue;
                }
                let total: u32 = splits.iter().map(|s| u32::from(s.weight)).sum();
                if total != 100 {
                    errors.push(ValidationError::new(
                        format!("{field}[{i}].splits"),
                        total.to_string(),
                        "split weights must sum to 100",
                    ));
                }
                for (j, split) in splits.iter().enumerate() {
                    if let Some(pass) = &split.action.pass {
                        check_pass_target(
                            pass,
                            &format!("{field}[{i}].splits[{j}].action.pass"),
                            declared,
                            errors,
                        );
                    }
                }
            }
        }
    }
}

fn check_pass_target(
    pass: &str,
    field: &str,
    declared: &HashSet<String>,
    errors: &mut Vec<ValidationError>,
) {
    if !declared.contains(pass) {
        errors.push(ValidationError::new(
            field,
            pass,
            "references an upstream that is not declared",
        ));
    }
}

#[cfg(test)]
#[path = "virtualserver_tests.rs"]
mod virtualserver_tests;
