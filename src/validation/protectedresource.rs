// Copyright (c) 2025 The Rampart Authors
// SPDX-License-Identifier: MIT

//! Validation for `ProtectedResource`.

use super::{into_result, is_host_port, ValidationError, ValidationErrors};
use crate::constants::MAX_PROTECTED_RESOURCE_NAME_LEN;
use crate::crd::ProtectedResource;

/// Validate a `ProtectedResource`.
///
/// The metadata name feeds into generated dataplane identifiers, so it is
/// bounded like a DNS label.
///
/// # Errors
///
/// Returns every field-level failure found.
pub fn validate_protected_resource(pr: &ProtectedResource) -> Result<(), ValidationErrors> {
    let mut errors = Vec::new();

    let name = pr.metadata.name.as_deref().unwrap_or_default();
    if name.len() > MAX_PROTECTED_RESOURCE_NAME_LEN {
        errors.push(ValidationError::new(
            "metadata.name",
            name,
            format!("must be at most {MAX_PROTECTED_RESOURCE_NAME_LEN} characters"),
        ));
    }

    if pr.spec.waf_policy.is_empty() {
        errors.push(ValidationError::new(
            "spec.wafPolicy",
            "",
            "must not be empty",
        ));
    }

    if let Some(dest) = &pr.spec.log_destination {
        if dest != "stderr" && !is_host_port(dest) {
            errors.push(ValidationError::new(
                "spec.logDestination",
                dest,
                "must be stderr or host:port",
            ));
        }
    }

    into_result(errors)
}

#[cfg(test)]
#[path = "protectedresource_tests.rs"]
mod protectedresource_tests;
