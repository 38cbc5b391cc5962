// Copyright (c) 2025 The Rampart Authors
// SPDX-License-Identifier: MIT

//! Validation for `Policy`.
//!
//! A Policy must carry exactly one policy member; each member has its own
//! rule set mirroring what NGINX will accept in the rendered config.

use super::{
    into_result, is_escaped_string_with_variables, parse_zone_size_kb, ValidationError,
    ValidationErrors,
};
use crate::constants::MIN_RATE_LIMIT_ZONE_KB;
use crate::crd::{Jwt, Oidc, Policy, RateLimit, Waf};
use url::Url;

/// Validate a `Policy` spec.
///
/// # Errors
///
/// Returns every field-level failure found.
pub fn validate_policy(policy: &Policy) -> Result<(), ValidationErrors> {
    let mut errors = Vec::new();
    let spec = &policy.spec;

    let members = [
        spec.access_control.is_some(),
        spec.rate_limit.is_some(),
        spec.jwt.is_some(),
        spec.basic_auth.is_some(),
        spec.ingress_mtls.is_some(),
        spec.egress_mtls.is_some(),
        spec.oidc.is_some(),
        spec.waf.is_some(),
    ];
    let count = members.iter().filter(|m| **m).count();
    if count != 1 {
        errors.push(ValidationError::new(
            "spec",
            count.to_string(),
            "exactly one policy member must be set",
        ));
    }

    if let Some(ac) = &spec.access_control {
        match (&ac.allow, &ac.deny) {
            (Some(_), Some(_)) => errors.push(ValidationError::new(
                "spec.accessControl",
                "",
                "allow and deny are mutually exclusive",
            )),
            (None, None) => errors.push(ValidationError::new(
                "spec.accessControl",
                "",
                "one of allow or deny must be set",
            )),
            _ => {}
        }
    }

    if let Some(rl) = &spec.rate_limit {
        validate_rate_limit(rl, &mut errors);
    }
    if let Some(jwt) = &spec.jwt {
        validate_jwt(jwt, &mut errors);
    }
    if let Some(basic) = &spec.basic_auth {
        if basic.secret.is_empty() {
            errors.push(ValidationError::new(
                "spec.basicAuth.secret",
                "",
                "must not be empty",
            ));
        }
    }
    if let Some(mtls) = &spec.ingress_mtls {
        if mtls.client_cert_secret.is_empty() {
            errors.push(ValidationError::new(
                "spec.ingressMTLS.clientCertSecret",
                "",
                "must not be empty",
            ));
        }
        if let Some(mode) = &mtls.verify_client {
            if !matches!(mode.as_str(), "on" | "off" | "optional") {
                errors.push(ValidationError::new(
                    "spec.ingressMTLS.verifyClient",
                    mode,
                    "must be on, off or optional",
                ));
            }
        }
    }
    if let Some(mtls) = &spec.egress_mtls {
        if mtls.verify_server == Some(true) && mtls.trusted_cert_secret.is_none() {
            errors.push(ValidationError::new(
                "spec.egressMTLS.trustedCertSecret",
                "",
                "required when verifyServer is true",
            ));
        }
    }
    if let Some(oidc) = &spec.oidc {
        validate_oidc(oidc, &mut errors);
    }
    if let Some(waf) = &spec.waf {
        validate_waf(waf, &mut errors);
    }

    into_result(errors)
}

fn validate_rate_limit(rl: &RateLimit, errors: &mut Vec<ValidationError>) {
    if !is_valid_rate(&rl.rate) {
        errors.push(ValidationError::new(
            "spec.rateLimit.rate",
            &rl.rate,
            "must match <positive integer>r/s or <positive integer>r/m",
        ));
    }

    if rl.key.is_empty() {
        errors.push(ValidationError::new(
            "spec.rateLimit.key",
            "",
            "must not be empty",
        ));
    } else if !is_escaped_string_with_variables(&rl.key) {
        errors.push(ValidationError::new(
            "spec.rateLimit.key",
            &rl.key,
            "contains an unescaped quote or an unsupported variable",
        ));
    }

    match parse_zone_size_kb(&rl.zone_size) {
        Some(kb) if kb >= MIN_RATE_LIMIT_ZONE_KB => {}
        Some(_) => errors.push(ValidationError::new(
            "spec.rateLimit.zoneSize",
            &rl.zone_size,
            "must be at least 32k",
        )),
        None => errors.push(ValidationError::new(
            "spec.rateLimit.zoneSize",
            &rl.zone_size,
            "must be a size like 64k or 10M",
        )),
    }

    if let Some(code) = rl.reject_code {
        if !(400..=599).contains(&code) {
            errors.push(ValidationError::new(
                "spec.rateLimit.rejectCode",
                code.to_string(),
                "must be between 400 and 599",
            ));
        }
    }

    if let Some(level) = &rl.log_level {
        if !matches!(level.as_str(), "info" | "notice" | "warn" | "error") {
            errors.push(ValidationError::new(
                "spec.rateLimit.logLevel",
                level,
                "must be info, notice, warn or error",
            ));
        }
    }
}

fn validate_jwt(jwt: &Jwt, errors: &mut Vec<ValidationError>) {
    if jwt.realm.is_empty() {
        errors.push(ValidationError::new("spec.jwt.realm", "", "must not be empty"));
    } else if !is_realm(&jwt.realm) {
        errors.push(ValidationError::new(
            "spec.jwt.realm",
            &jwt.realm,
            "must not contain unescaped double quotes or $ signs",
        ));
    }

    match (&jwt.secret, &jwt.jwks_uri) {
        (None, None) => errors.push(ValidationError::new(
            "spec.jwt",
            "",
            "one of secret or jwksURI must be set",
        )),
        (Some(_), Some(_)) => errors.push(ValidationError::new(
            "spec.jwt",
            "",
            "secret and jwksURI are mutually exclusive",
        )),
        (None, Some(uri)) => {
            if Url::parse(uri).is_err() {
                errors.push(ValidationError::new(
                    "spec.jwt.jwksURI",
                    uri,
                    "must be a valid URL",
                ));
            }
            if jwt.key_cache.is_none() {
                errors.push(ValidationError::new(
                    "spec.jwt.keyCache",
                    "",
                    "required when jwksURI is set",
                ));
            }
        }
        (Some(_), None) => {}
    }

    if let Some(token) = &jwt.token {
        if !is_token_variable(token) {
            errors.push(ValidationError::new(
                "spec.jwt.token",
                token,
                "must be a $http_, $arg_ or $cookie_ variable",
            ));
        }
    }
}

fn validate_oidc(oidc: &Oidc, errors: &mut Vec<ValidationError>) {
    for (field, value) in [
        ("spec.oidc.authEndpoint", &oidc.auth_endpoint),
        ("spec.oidc.tokenEndpoint", &oidc.token_endpoint),
        ("spec.oidc.jwksURI", &oidc.jwks_uri),
    ] {
        if Url::parse(value).is_err() {
            errors.push(ValidationError::new(field, value, "must be a valid URL"));
        }
    }

    if let Some(scope) = &oidc.scope {
        let tokens: Vec<&str> = scope.split('+').collect();
        if !tokens.contains(&"openid") {
            errors.push(ValidationError::new(
                "spec.oidc.scope",
                scope,
                "must contain the openid scope",
            ));
        }
        for token in tokens {
            if token.is_empty() || !token.bytes().all(is_scope_char) {
                errors.push(ValidationError::new(
                    "spec.oidc.scope",
                    scope,
                    "scope tokens must use RFC 6749 characters",
                ));
                break;
            }
        }
    }
}

fn validate_waf(waf: &Waf, errors: &mut Vec<ValidationError>) {
    if waf.ap_policy.is_some() && waf.ap_bundle.is_some() {
        errors.push(ValidationError::new(
            "spec.waf",
            "",
            "apPolicy and apBundle are mutually exclusive",
        ));
    }
    if let Some(log) = &waf.security_log {
        if let Some(dest) = &log.log_dest {
            if dest != "stderr" && !super::is_host_port(dest) {
                errors.push(ValidationError::new(
                    "spec.waf.securityLog.logDest",
                    dest,
                    "must be stderr or host:port",
                ));
            }
        }
    }
}

/// Whether a rate expression matches `<positive integer>r/s` or `r/m`.
fn is_valid_rate(rate: &str) -> bool {
    let Some(digits) = rate.strip_suffix("r/s").or_else(|| rate.strip_suffix("r/m")) else {
        return false;
    };
    !digits.is_empty()
        && !digits.starts_with('0')
        && digits.bytes().all(|b| b.is_ascii_digit())
}

/// Whether a realm is safe to embed in a quoted NGINX directive.
fn is_realm(realm: &str) -> bool {
    let bytes = realm.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => {
                if i + 1 >= bytes.len() {
                    return false;
                }
                i += 2;
            }
            b'"' | b'$' => return false,
            _ => i += 1,
        }
    }
    true
}

/// Whether a token source is one of the supported request variables.
fn is_token_variable(token: &str) -> bool {
    let Some(name) = token.strip_prefix('$') else {
        return false;
    };
    let suffix_ok = |rest: &str| {
        !rest.is_empty() && rest.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_')
    };
    ["http_", "arg_", "cookie_"]
        .iter()
        .any(|prefix| name.strip_prefix(prefix).is_some_and(suffix_ok))
}

/// RFC 6749 scope-token characters: %x21 / %x23-5B / %x5D-7E.
fn is_scope_char(b: u8) -> bool {
    b == 0x21 || (0x23..=0x5b).contains(&b) || (0x5d..=0x7e).contains(&b)
}

#[cfg(test)]
#[path = "policy_tests.rs"]
mod policy_tests;
