// Copyright (c) 2025 The Rampart Authors
// SPDX-License-Identifier: MIT

//! Unit tests for `virtualserver.rs`

#[cfg(test)]
mod tests {
    use super::super::{validate_virtual_server, validate_virtual_server_route};
    use crate::crd::{
        CertManager, Route, RouteAction, RouteSplit, Upstream, VirtualServer, VirtualServerRoute,
        VirtualServerRouteSpec, VirtualServerSpec, VirtualServerTls,
    };

    fn upstream(name: &str) -> Upstream {
        Upstream {
            name: name.to_string(),
            service: format!("{name}-svc"),
            port: 80,
            ..Upstream::default()
        }
    }

    fn pass_route(path: &str, target: &str) -> Route {
        Route {
            path: path.to_string(),
            action: Some(RouteAction {
                pass: Some(target.to_string()),
            }),
            splits: None,
        }
    }

    fn vs(spec: VirtualServerSpec) -> VirtualServer {
        VirtualServer::new("cafe", spec)
    }

    fn base_spec() -> VirtualServerSpec {
        VirtualServerSpec {
            host: "cafe.example.com".to_string(),
            tls: None,
            upstreams: vec![upstream("tea"), upstream("coffee")],
            routes: vec![pass_route("/tea", "tea"), pass_route("/coffee", "coffee")],
            external_dns: None,
            policies: None,
            listener: None,
        }
    }

    #[test]
    fn test_valid_virtual_server() {
        assert!(validate_virtual_server(&vs(base_spec())).is_ok());
    }

    #[test]
    fn test_invalid_host() {
        let mut spec = base_spec();
        spec.host = "not a host".to_string();
        let errors = validate_virtual_server(&vs(spec)).unwrap_err();
        assert!(errors.to_string().contains("spec.host"));
    }

    #[test]
    fn test_route_references_undeclared_upstream() {
        let mut spec = base_spec();
        spec.routes.push(pass_route("/juice", "juice"));
        let errors = validate_virtual_server(&vs(spec)).unwrap_err();
        assert!(errors
            .to_string()
            .contains("references an upstream that is not declared"));
    }

    #[test]
    fn test_duplicate_upstream_names() {
        let mut spec = base_spec();
        spec.upstreams.push(upstream("tea"));
        let errors = validate_virtual_server(&vs(spec)).unwrap_err();
        assert!(errors.to_string().contains("duplicate upstream name"));
    }

    #[test]
    fn test_route_requires_action_or_splits() {
        let mut spec = base_spec();
        spec.routes.push(Route {
            path: "/empty".to_string(),
            action: None,
            splits: None,
        });
        let errors = validate_virtual_server(&vs(spec)).unwrap_err();
        assert!(errors
            .to_string()
            .contains("one of action or splits must be set"));
    }

    #[test]
    fn test_split_weights_must_sum_to_100() {
        let mut spec = base_spec();
        spec.routes = vec![Route {
            path: "/".to_string(),
            action: None,
            splits: Some(vec![
                RouteSplit {
                    weight: 80,
                    action: RouteAction {
                        pass: Some("tea".to_string()),
                    },
                },
                RouteSplit {
                    weight: 30,
                    action: RouteAction {
                        pass: Some("coffee".to_string()),
                    },
                },
            ]),
        }];
        let errors = validate_virtual_server(&vs(spec)).unwrap_err();
        assert!(errors.to_string().contains("must sum to 100"));
    }

    #[test]
    fn test_valid_splits() {
        let mut spec = base_spec();
        spec.routes = vec![Route {
            path: "/".to_string(),
            action: None,
            splits: Some(vec![
                RouteSplit {
                    weight: 80,
                    action: RouteAction {
                        pass: Some("tea".to_string()),
                    },
                },
                RouteSplit {
                    weight: 20,
                    action: RouteAction {
                        pass: Some("coffee".to_string()),
                    },
                },
            ]),
        }];
        assert!(validate_virtual_server(&vs(spec)).is_ok());
    }

    #[test]
    fn test_cert_manager_requires_one_issuer() {
        let mut spec = base_spec();
        spec.tls = Some(VirtualServerTls {
            secret: Some("cafe-secret".to_string()),
            cert_manager: Some(CertManager::default()),
            redirect: None,
        });
        let errors = validate_virtual_server(&vs(spec)).unwrap_err();
        assert!(errors
            .to_string()
            .contains("one of issuer or clusterIssuer must be set"));
    }

    #[test]
    fn test_cert_manager_issuers_mutually_exclusive() {
        let mut spec = base_spec();
        spec.tls = Some(VirtualServerTls {
            secret: Some("cafe-secret".to_string()),
            cert_manager: Some(CertManager {
                issuer: Some("ns-issuer".to_string()),
                cluster_issuer: Some("cluster-issuer".to_string()),
                ..CertManager::default()
            }),
            redirect: None,
        });
        let errors = validate_virtual_server(&vs(spec)).unwrap_err();
        assert!(errors.to_string().contains("mutually exclusive"));
    }

    #[test]
    fn test_cluster_issuer_rejects_issuer_kind() {
        let mut spec = base_spec();
        spec.tls = Some(VirtualServerTls {
            secret: Some("cafe-secret".to_string()),
            cert_manager: Some(CertManager {
                cluster_issuer: Some("cluster-issuer".to_string()),
                issuer_kind: Some("Origin".to_string()),
                ..CertManager::default()
            }),
            redirect: None,
        });
        let errors = validate_virtual_server(&vs(spec)).unwrap_err();
        assert!(errors
            .to_string()
            .contains("issuerKind and issuerGroup are not valid with clusterIssuer"));
    }

    #[test]
    fn test_cert_manager_requires_tls_secret() {
        let mut spec = base_spec();
        spec.tls = Some(VirtualServerTls {
            secret: None,
            cert_manager: Some(CertManager {
                issuer: Some("ns-issuer".to_string()),
                ..CertManager::default()
            }),
            redirect: None,
        });
        let errors = validate_virtual_server(&vs(spec)).unwrap_err();
        assert!(errors.to_string().contains("spec.tls.secret"));
    }

    #[test]
    fn test_virtual_server_route_checks_subroutes() {
        let vsr = VirtualServerRoute::new(
            "coffee",
            VirtualServerRouteSpec {
                host: "cafe.example.com".to_string(),
                upstreams: vec![upstream("latte")],
                subroutes: vec![pass_route("/coffee/latte", "espresso")],
            },
        );
        let errors = validate_virtual_server_route(&vsr).unwrap_err();
        assert!(errors.to_string().contains("spec.subroutes[0].action.pass"));
    }
}
