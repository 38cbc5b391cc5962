// Copyright (c) 2025 The Rampart Authors
// SPDX-License-Identifier: MIT

//! Unit tests for `protectedresource.rs`

#[cfg(test)]
mod tests {
    use super::super::validate_protected_resource;
    use crate::crd::{ProtectedResource, ProtectedResourceSpec};

    fn pr(name: &str, spec: ProtectedResourceSpec) -> ProtectedResource {
        ProtectedResource::new(name, spec)
    }

    fn base_spec() -> ProtectedResourceSpec {
        ProtectedResourceSpec {
            waf_policy: "dataguard-blocking".to_string(),
            log_destination: None,
        }
    }

    #[test]
    fn test_valid_resource() {
        assert!(validate_protected_resource(&pr("webapp", base_spec())).is_ok());
    }

    #[test]
    fn test_name_length_bound() {
        let long = "a".repeat(64);
        let errors = validate_protected_resource(&pr(&long, base_spec())).unwrap_err();
        assert!(errors.to_string().contains("at most 63 characters"));

        let ok = "a".repeat(63);
        assert!(validate_protected_resource(&pr(&ok, base_spec())).is_ok());
    }

    #[test]
    fn test_waf_policy_required() {
        let mut spec = base_spec();
        spec.waf_policy = String::new();
        let errors = validate_protected_resource(&pr("webapp", spec)).unwrap_err();
        assert!(errors.to_string().contains("spec.wafPolicy"));
    }

    #[test]
    fn test_log_destination_shapes() {
        for (dest, ok) in [
            ("stderr", true),
            ("syslog-svc.default:514", true),
            ("127.0.0.1:1514", true),
            ("no-port", false),
            (":514", false),
            ("host:99999", false),
        ] {
            let mut spec = base_spec();
            spec.log_destination = Some(dest.to_string());
            assert_eq!(
                validate_protected_resource(&pr("webapp", spec)).is_ok(),
                ok,
                "Destination {dest:?}"
            );
        }
    }
}
