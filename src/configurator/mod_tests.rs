// Copyright (c) 2025 The Rampart Authors
// SPDX-License-Identifier: MIT

//! Unit tests for `configurator/mod.rs`

#[cfg(test)]
mod tests {
    use super::super::params::ConfigParams;
    use super::super::render::render_virtual_server;
    use super::super::resources::{SecretFile, SecretFileKind, TransportServerEx, VirtualServerEx};
    use super::super::{
        classify, desired_transport_server_groups, desired_virtual_server_groups, Applied,
        Configurator, Plan,
    };
    use crate::crd::{
        Route, RouteAction, RouteSplit, TransportServer, TransportServerAction,
        TransportServerListener, TransportServerSpec, TransportServerUpstream, Upstream,
        VirtualServer, VirtualServerSpec,
    };
    use crate::nginx::NginxManager;
    use std::collections::HashMap;
    use std::sync::Arc;

    #[test]
    fn test_classify_first_apply_reloads() {
        assert_eq!(
            classify(None, "server {}\n", false, false),
            Plan::Reload {
                weights_fallback: false
            }
        );
    }

    #[test]
    fn test_classify_identical_render_is_unchanged() {
        assert_eq!(
            classify(Some("server {}\n"), "server {}\n", false, true),
            Plan::Unchanged
        );
    }

    /// Endpoint churn under an identical render goes through the API.
    #[test]
    fn test_classify_endpoint_churn_is_dynamic() {
        assert_eq!(
            classify(Some("server {}\n"), "server {}\n", true, true),
            Plan::DynamicOnly
        );
    }

    /// A weight-only diff on OSS reloads and flags the fallback.
    #[test]
    fn test_classify_weight_only_change_on_oss() {
        let old = "server 10.0.0.1:80 weight=80;\n";
        let new = "server 10.0.0.1:80 weight=20;\n";
        assert_eq!(
            classify(Some(old), new, false, false),
            Plan::Reload {
                weights_fallback: true
            }
        );
    }

    #[test]
    fn test_classify_structural_change_is_plain_reload() {
        let old = "server 10.0.0.1:80 weight=80;\n";
        let new = "server 10.0.0.9:80 weight=80;\n";
        assert_eq!(
            classify(Some(old), new, false, false),
            Plan::Reload {
                weights_fallback: false
            }
        );
    }

    fn vs_ex() -> VirtualServerEx {
        let mut vs = VirtualServer::new(
            "cafe",
            VirtualServerSpec {
                host: "cafe.example.com".to_string(),
                tls: None,
                upstreams: vec![
                    Upstream {
                        name: "tea".to_string(),
                        service: "tea-svc".to_string(),
                        port: 80,
                        max_fails: Some(3),
                        ..Upstream::default()
                    },
                    Upstream {
                        name: "coffee".to_string(),
                        service: "coffee-svc".to_string(),
                        port: 80,
                        ..Upstream::default()
                    },
                ],
                routes: vec![Route {
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
                }],
                external_dns: None,
                policies: None,
                listener: None,
            },
        );
        vs.metadata.namespace = Some("default".to_string());

        let mut endpoints = HashMap::new();
        endpoints.insert(
            "vs_default_cafe_tea".to_string(),
            vec!["10.0.0.1:80".to_string()],
        );
        endpoints.insert(
            "vs_default_cafe_coffee".to_string(),
            vec!["10.0.0.5:80".to_string()],
        );
        VirtualServerEx {
            virtual_server: Arc::new(vs),
            routes: vec![],
            policies: HashMap::new(),
            endpoints,
            secrets: vec![],
            http_port: 80,
            https_port: 443,
        }
    }

    /// Split groups merge peers of the referenced upstreams with weights.
    #[test]
    fn test_desired_groups_carry_weights_and_params() {
        let groups = desired_virtual_server_groups(&vs_ex());

        let tea = &groups["vs_default_cafe_tea"];
        assert_eq!(tea.len(), 1);
        assert_eq!(tea[0].server, "10.0.0.1:80");
        assert_eq!(tea[0].max_fails, Some(3));
        assert_eq!(tea[0].weight, None);

        let split = &groups["vs_default_cafe_split_0"];
        assert_eq!(split.len(), 2);
        assert_eq!(split[0].weight, Some(80));
        assert_eq!(split[1].weight, Some(20));
    }

    #[test]
    fn test_desired_transport_groups_carry_max_conns() {
        let mut ts = TransportServer::new(
            "dns",
            TransportServerSpec {
                listener: TransportServerListener {
                    name: "dns-udp".to_string(),
                    protocol: "UDP".to_string(),
                },
                host: None,
                tls: None,
                upstreams: vec![TransportServerUpstream {
                    name: "dns-app".to_string(),
                    service: "dns-svc".to_string(),
                    port: 5353,
                    max_conns: Some(16),
                }],
                action: TransportServerAction {
                    pass: "dns-app".to_string(),
                },
            },
        );
        ts.metadata.namespace = Some("default".to_string());
        let mut endpoints = HashMap::new();
        endpoints.insert(
            "ts_default_dns_dns-app".to_string(),
            vec!["10.0.0.9:5353".to_string()],
        );
        let ex = TransportServerEx {
            transport_server: Arc::new(ts),
            endpoints,
            secrets: vec![],
            listener_port: Some(5353),
        };

        let groups = desired_transport_server_groups(&ex);
        let peers = &groups["ts_default_dns_dns-app"];
        assert_eq!(peers[0].max_conns, Some(16));
    }

    /// Deleting an object that was never applied does not reload.
    #[tokio::test]
    async fn test_delete_unknown_is_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let manager = Arc::new(NginxManager::new(dir.path(), "/usr/sbin/nginx").unwrap());
        let configurator = Configurator::new(manager, None);

        let applied = configurator
            .delete_virtual_server("vs_default_ghost")
            .await
            .unwrap();
        assert_eq!(applied, Applied::Unchanged);
    }

    /// New secret material under an identical render still reloads.
    #[tokio::test]
    async fn test_changed_secret_material_forces_reload() {
        let dir = tempfile::tempdir().unwrap();
        let manager = Arc::new(NginxManager::new(dir.path(), "/nonexistent/nginx").unwrap());
        let configurator = Configurator::new(manager, None);

        let mut ex = vs_ex();
        let render = render_virtual_server(&ex, false);
        configurator.commit(
            "vs_default_cafe",
            &render,
            desired_virtual_server_groups(&ex),
            "cafe.example.com".to_string(),
        );

        // Stable render, stable peers, no secrets: nothing to do.
        let applied = configurator.apply_virtual_server(&ex).await.unwrap();
        assert_eq!(applied, Applied::Unchanged);

        // Adding a secret forces a reload; the broken binary makes the
        // attempt observable as an error.
        ex.secrets.push(SecretFile {
            name: "default-cafe-secret".to_string(),
            kind: SecretFileKind::Tls,
            content: b"cert-and-key".to_vec(),
        });
        assert!(configurator.apply_virtual_server(&ex).await.is_err());
    }

    /// A failed reload surfaces, but the rendered main config is on disk.
    #[tokio::test]
    async fn test_failed_reload_keeps_main_config() {
        let dir = tempfile::tempdir().unwrap();
        let manager = Arc::new(NginxManager::new(dir.path(), "/nonexistent/nginx").unwrap());
        let configurator = Configurator::new(manager, None);

        let params = ConfigParams {
            worker_processes: "4".to_string(),
            ..ConfigParams::default()
        };
        assert!(configurator.apply_config_params(&params, false).await.is_err());

        let conf = std::fs::read_to_string(dir.path().join("nginx.conf")).unwrap();
        assert!(conf.contains("worker_processes 4;"));
    }

    #[test]
    fn test_find_transport_server_resolution() {
        let dir = tempfile::tempdir().unwrap();
        let manager = Arc::new(NginxManager::new(dir.path(), "/usr/sbin/nginx").unwrap());
        let configurator = Configurator::new(manager, None);

        configurator.commit("ts_default_dns", "server {}\n", HashMap::new(), String::new());
        assert_eq!(
            configurator.find_transport_server("default_dns").as_deref(),
            Some("ts_default_dns")
        );
        // A bare name resolves while it names exactly one object.
        assert_eq!(
            configurator.find_transport_server("dns").as_deref(),
            Some("ts_default_dns")
        );
        assert_eq!(configurator.find_transport_server("ghost"), None);

        configurator.commit("ts_other_dns", "server {}\n", HashMap::new(), String::new());
        assert_eq!(configurator.find_transport_server("dns"), None);
    }
}
