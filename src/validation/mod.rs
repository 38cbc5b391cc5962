// Copyright (c) 2025 The Rampart Authors
// SPDX-License-Identifier: MIT

//! Pure validators for every watched resource kind.
//!
//! Each validator is a pure function `validate_<kind>(obj)` returning a
//! structured error list; the reconcilers translate a non-empty list into an
//! `Invalid` status and a `Warning` event. No validator touches the API
//! server or the filesystem.
//!
//! # Error shape
//!
//! Every [`ValidationError`] carries the field path, the offending value and
//! a message, so status messages and events can point at the exact field.

pub mod globalconfiguration;
pub mod policy;
pub mod protectedresource;
pub mod transportserver;
pub mod virtualserver;

pub use globalconfiguration::validate_global_configuration;
pub use policy::validate_policy;
pub use protectedresource::validate_protected_resource;
pub use transportserver::validate_transport_server;
pub use virtualserver::{validate_virtual_server, validate_virtual_server_route};

/// A single field-level validation failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Path of the invalid field, e.g. `spec.upstreams[0].port`.
    pub field: String,

    /// The offending value, rendered for humans.
    pub value: String,

    /// What is wrong with it.
    pub message: String,
}

impl ValidationError {
    /// Build an error for a field path and value.
    #[must_use]
    pub fn new(field: impl Into<String>, value: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {} (value: {:?})", self.field, self.message, self.value)
    }
}

/// A non-empty list of validation failures for one resource.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub struct ValidationErrors(pub Vec<ValidationError>);

impl std::fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let rendered: Vec<String> = self.0.iter().map(ToString::to_string).collect();
        write!(f, "{}", rendered.join("; "))
    }
}

/// Convert a collected error list into a validator result.
///
/// # Errors
///
/// Returns `ValidationErrors` when the list is non-empty.
pub fn into_result(errors: Vec<ValidationError>) -> Result<(), ValidationErrors> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(ValidationErrors(errors))
    }
}

// ============================================================================
// Shared field checks
// ============================================================================

/// Whether a string is a valid DNS name (RFC 1123 subdomain).
#[must_use]
pub fn is_dns_name(name: &str) -> bool {
    if name.is_empty() || name.len() > 253 {
        return false;
    }
    name.split('.').all(|label| {
        !label.is_empty()
            && label.len() <= 63
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
            && !label.starts_with('-')
            && !label.ends_with('-')
    })
}

/// Whether a string is a well-formed `host:port` pair with a port in range.
#[must_use]
pub fn is_host_port(value: &str) -> bool {
    let Some((host, port)) = value.rsplit_once(':') else {
        return false;
    };
    if host.is_empty() {
        return false;
    }
    matches!(port.parse::<u32>(), Ok(p) if (1..=65535).contains(&p))
}

/// Substitution variables permitted in policy key expressions.
pub const SUPPORTED_VARIABLES: [&str; 7] = [
    "binary_remote_addr",
    "remote_addr",
    "host",
    "uri",
    "request_uri",
    "args",
    "jwt_claim_sub",
];

/// Validate an escaped string that may embed `${variable}` substitutions.
///
/// Rejects unescaped double quotes and `$` signs that do not introduce a
/// curated `${variable}` reference.
#[must_use]
pub fn is_escaped_string_with_variables(value: &str) -> bool {
    let bytes = value.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => {
                // Escape consumes the next character.
                if i + 1 >= bytes.len() {
                    return false;
                }
                i += 2;
            }
            b'"' => return false,
            b'$' => {
                if i + 1 >= bytes.len() || bytes[i + 1] != b'{' {
                    return false;
                }
                let rest = &value[i + 2..];
                let Some(end) = rest.find('}') else {
                    return false;
                };
                if !SUPPORTED_VARIABLES.contains(&&rest[..end]) {
                    return false;
                }
                i += 2 + end + 1;
            }
            _ => i += 1,
        }
    }
    true
}

/// Parse a shared-memory zone size like `64k` or `10M` into kilobytes.
#[must_use]
pub fn parse_zone_size_kb(value: &str) -> Option<u64> {
    if value.is_empty() {
        return None;
    }
    let (digits, suffix) = value.split_at(value.len() - 1);
    match suffix {
        "k" | "K" => digits.parse::<u64>().ok(),
        "m" | "M" => digits.parse::<u64>().ok().map(|m| m * 1024),
        _ => value.parse::<u64>().ok().map(|b| b / 1024),
    }
}
