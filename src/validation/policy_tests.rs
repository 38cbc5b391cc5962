// Copyright (c) 2025 The Rampart Authors
// SPDX-License-Identifier: MIT

//! Unit tests for `policy.rs`

#[cfg(test)]
mod tests {
    use super::super::validate_policy;
    use crate::crd::{
        AccessControl, Jwt, Oidc, Policy, PolicySpec, RateLimit, Waf,
    };

    fn policy(spec: PolicySpec) -> Policy {
        Policy::new("webapp-policy", spec)
    }

    fn rate_limit() -> RateLimit {
        RateLimit {
            rate: "10r/s".to_string(),
            key: "${binary_remote_addr}".to_string(),
            zone_size: "10M".to_string(),
            burst: None,
            no_delay: None,
            delay: None,
            reject_code: None,
            log_level: None,
        }
    }

    #[test]
    fn test_exactly_one_member_required() {
        let errors = validate_policy(&policy(PolicySpec::default())).unwrap_err();
        assert!(errors.to_string().contains("exactly one policy member"));

        let both = PolicySpec {
            access_control: Some(AccessControl {
                allow: Some(vec!["10.0.0.0/8".to_string()]),
                deny: None,
            }),
            rate_limit: Some(rate_limit()),
            ..PolicySpec::default()
        };
        let errors = validate_policy(&policy(both)).unwrap_err();
        assert!(errors.to_string().contains("exactly one policy member"));
    }

    #[test]
    fn test_access_control_allow_xor_deny() {
        let both = PolicySpec {
            access_control: Some(AccessControl {
                allow: Some(vec!["10.0.0.0/8".to_string()]),
                deny: Some(vec!["192.168.0.0/16".to_string()]),
            }),
            ..PolicySpec::default()
        };
        let errors = validate_policy(&policy(both)).unwrap_err();
        assert!(errors.to_string().contains("allow and deny are mutually exclusive"));

        let neither = PolicySpec {
            access_control: Some(AccessControl::default()),
            ..PolicySpec::default()
        };
        let errors = validate_policy(&policy(neither)).unwrap_err();
        assert!(errors.to_string().contains("one of allow or deny"));
    }

    #[test]
    fn test_valid_rate_limit() {
        let spec = PolicySpec {
            rate_limit: Some(rate_limit()),
            ..PolicySpec::default()
        };
        assert!(validate_policy(&policy(spec)).is_ok());
    }

    #[test]
    fn test_rate_expression_shapes() {
        for bad in ["10r/h", "0r/s", "r/s", "10 r/s", "-1r/m", "10R/S"] {
            let mut rl = rate_limit();
            rl.rate = bad.to_string();
            let spec = PolicySpec {
                rate_limit: Some(rl),
                ..PolicySpec::default()
            };
            assert!(
                validate_policy(&policy(spec)).is_err(),
                "Rate {bad:?} should be rejected"
            );
        }

        for good in ["1r/s", "100r/m"] {
            let mut rl = rate_limit();
            rl.rate = good.to_string();
            let spec = PolicySpec {
                rate_limit: Some(rl),
                ..PolicySpec::default()
            };
            assert!(
                validate_policy(&policy(spec)).is_ok(),
                "Rate {good:?} should be accepted"
            );
        }
    }

    #[test]
    fn test_zone_size_minimum() {
        let mut rl = rate_limit();
        rl.zone_size = "16k".to_string();
        let spec = PolicySpec {
            rate_limit: Some(rl),
            ..PolicySpec::default()
        };
        let errors = validate_policy(&policy(spec)).unwrap_err();
        assert!(errors.to_string().contains("at least 32k"));
    }

    #[test]
    fn test_reject_code_range() {
        let mut rl = rate_limit();
        rl.reject_code = Some(302);
        let spec = PolicySpec {
            rate_limit: Some(rl),
            ..PolicySpec::default()
        };
        let errors = validate_policy(&policy(spec)).unwrap_err();
        assert!(errors.to_string().contains("between 400 and 599"));
    }

    #[test]
    fn test_rate_limit_key_rejects_raw_quote() {
        let mut rl = rate_limit();
        rl.key = r#"key with " quote"#.to_string();
        let spec = PolicySpec {
            rate_limit: Some(rl),
            ..PolicySpec::default()
        };
        assert!(validate_policy(&policy(spec)).is_err());
    }

    #[test]
    fn test_jwt_secret_xor_jwks_uri() {
        let neither = PolicySpec {
            jwt: Some(Jwt {
                realm: "API".to_string(),
                ..Jwt::default()
            }),
            ..PolicySpec::default()
        };
        let errors = validate_policy(&policy(neither)).unwrap_err();
        assert!(errors.to_string().contains("one of secret or jwksURI"));

        let both = PolicySpec {
            jwt: Some(Jwt {
                realm: "API".to_string(),
                secret: Some("jwk-secret".to_string()),
                jwks_uri: Some("https://idp.example.com/keys".to_string()),
                key_cache: Some("1h".to_string()),
                token: None,
            }),
            ..PolicySpec::default()
        };
        let errors = validate_policy(&policy(both)).unwrap_err();
        assert!(errors.to_string().contains("mutually exclusive"));
    }

    #[test]
    fn test_jwks_uri_requires_key_cache() {
        let spec = PolicySpec {
            jwt: Some(Jwt {
                realm: "API".to_string(),
                jwks_uri: Some("https://idp.example.com/keys".to_string()),
                ..Jwt::default()
            }),
            ..PolicySpec::default()
        };
        let errors = validate_policy(&policy(spec)).unwrap_err();
        assert!(errors.to_string().contains("keyCache"));
    }

    #[test]
    fn test_jwt_realm_rejects_dollar() {
        let spec = PolicySpec {
            jwt: Some(Jwt {
                realm: "realm $var".to_string(),
                secret: Some("jwk-secret".to_string()),
                ..Jwt::default()
            }),
            ..PolicySpec::default()
        };
        let errors = validate_policy(&policy(spec)).unwrap_err();
        assert!(errors.to_string().contains("spec.jwt.realm"));
    }

    #[test]
    fn test_jwt_token_variable() {
        for (token, ok) in [
            ("$http_token", true),
            ("$arg_access_token", true),
            ("$cookie_auth", true),
            ("http_token", false),
            ("$remote_addr", false),
            ("$http_", false),
        ] {
            let spec = PolicySpec {
                jwt: Some(Jwt {
                    realm: "API".to_string(),
                    secret: Some("jwk-secret".to_string()),
                    token: Some(token.to_string()),
                    ..Jwt::default()
                }),
                ..PolicySpec::default()
            };
            assert_eq!(
                validate_policy(&policy(spec)).is_ok(),
                ok,
                "Token {token:?}"
            );
        }
    }

    #[test]
    fn test_oidc_scope_must_contain_openid() {
        let spec = PolicySpec {
            oidc: Some(Oidc {
                client_id: "webapp".to_string(),
                client_secret: "oidc-secret".to_string(),
                auth_endpoint: "https://idp.example.com/auth".to_string(),
                token_endpoint: "https://idp.example.com/token".to_string(),
                jwks_uri: "https://idp.example.com/keys".to_string(),
                scope: Some("profile+email".to_string()),
            }),
            ..PolicySpec::default()
        };
        let errors = validate_policy(&policy(spec)).unwrap_err();
        assert!(errors.to_string().contains("openid"));
    }

    #[test]
    fn test_oidc_scope_charset() {
        let spec = PolicySpec {
            oidc: Some(Oidc {
                client_id: "webapp".to_string(),
                client_secret: "oidc-secret".to_string(),
                auth_endpoint: "https://idp.example.com/auth".to_string(),
                token_endpoint: "https://idp.example.com/token".to_string(),
                jwks_uri: "https://idp.example.com/keys".to_string(),
                scope: Some("openid+bad scope".to_string()),
            }),
            ..PolicySpec::default()
        };
        let errors = validate_policy(&policy(spec)).unwrap_err();
        assert!(errors.to_string().contains("RFC 6749"));
    }

    #[test]
    fn test_waf_policy_xor_bundle() {
        let spec = PolicySpec {
            waf: Some(Waf {
                enable: true,
                ap_policy: Some("dataguard".to_string()),
                ap_bundle: Some("dataguard.tgz".to_string()),
                security_log: None,
            }),
            ..PolicySpec::default()
        };
        let errors = validate_policy(&policy(spec)).unwrap_err();
        assert!(errors.to_string().contains("apPolicy and apBundle"));
    }
}
