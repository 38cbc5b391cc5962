// Copyright (c) 2025 The Rampart Authors
// SPDX-License-Identifier: MIT

//! Unit tests for `configuration.rs`

#[cfg(test)]
mod tests {
    use super::super::{
        build_transport_server_ex, build_virtual_server_ex, parse_key, peers_for_port,
        register_handlers, resolve_transport_server_port, resolve_virtual_server_ports,
        typed_key, ReconcilerContext,
    };
    use crate::configurator::resources::SecretFileKind;
    use crate::configurator::Configurator;
    use crate::controllers::events::EventSink;
    use crate::crd::{
        AccessControl, Listener, Policy, PolicyReference, PolicySpec, ProtectedResource,
        ProtectedResourceSpec, RateLimit, Route, RouteAction, TransportServer,
        TransportServerAction, TransportServerListener, TransportServerSpec,
        TransportServerUpstream, Upstream, VirtualServer, VirtualServerListener,
        VirtualServerRoute, VirtualServerRouteSpec, VirtualServerSpec, VirtualServerTls,
    };
    use crate::namespaces::NamespaceManager;
    use crate::nginx::NginxManager;
    use crate::queue::WorkQueue;
    use crate::store::InformerGroup;
    use k8s_openapi::api::core::v1::{
        EndpointAddress, EndpointPort, EndpointSubset, Endpoints, Secret,
    };
    use k8s_openapi::api::networking::v1::Ingress;
    use k8s_openapi::ByteString;
    use kube::runtime::watcher;
    use kube::{Client, Config};
    use std::collections::{BTreeMap, HashMap};
    use std::sync::{Arc, RwLock};
    use tokio::sync::watch;

    fn listener(name: &str, port: u16, protocol: &str) -> Listener {
        Listener {
            name: name.to_string(),
            port,
            protocol: protocol.to_string(),
        }
    }

    fn listeners(entries: &[Listener]) -> HashMap<String, Listener> {
        entries
            .iter()
            .map(|l| (l.name.clone(), l.clone()))
            .collect()
    }

    fn endpoints_object(name: &str, ips: &[&str], port: i32) -> Endpoints {
        let mut endpoints = Endpoints {
            subsets: Some(vec![EndpointSubset {
                addresses: Some(
                    ips.iter()
                        .map(|ip| EndpointAddress {
                            ip: (*ip).to_string(),
                            ..EndpointAddress::default()
                        })
                        .collect(),
                ),
                ports: Some(vec![EndpointPort {
                    port,
                    ..EndpointPort::default()
                }]),
                ..EndpointSubset::default()
            }]),
            ..Endpoints::default()
        };
        endpoints.metadata.name = Some(name.to_string());
        endpoints.metadata.namespace = Some("default".to_string());
        endpoints
    }

    #[test]
    fn test_typed_key_round_trip() {
        let key = typed_key("vs", "default", "cafe");
        assert_eq!(key, "vs/default/cafe");
        assert_eq!(parse_key(&key), Some(("vs", "default", "cafe")));
        assert_eq!(parse_key("vs/default"), None);
    }

    #[test]
    fn test_peers_for_port_matches_by_number() {
        let endpoints = endpoints_object("tea-svc", &["10.0.0.1", "10.0.0.2"], 8080);
        assert_eq!(
            peers_for_port(&endpoints, 8080),
            vec!["10.0.0.1:8080", "10.0.0.2:8080"]
        );
    }

    /// A single unnamed port matches any requested port.
    #[test]
    fn test_peers_for_port_single_port_fallback() {
        let endpoints = endpoints_object("tea-svc", &["10.0.0.1"], 8080);
        assert_eq!(peers_for_port(&endpoints, 80), vec!["10.0.0.1:8080"]);
    }

    #[test]
    fn test_peers_for_port_brackets_ipv6() {
        let endpoints = endpoints_object("tea-svc", &["2001:db8::1"], 8080);
        assert_eq!(peers_for_port(&endpoints, 8080), vec!["[2001:db8::1]:8080"]);
    }

    #[test]
    fn test_resolve_virtual_server_ports() {
        let table = listeners(&[listener("http-alt", 8083, "HTTP")]);

        let mut vs = VirtualServer::new(
            "cafe",
            VirtualServerSpec {
                host: "cafe.example.com".to_string(),
                tls: None,
                upstreams: vec![],
                routes: vec![],
                external_dns: None,
                policies: None,
                listener: Some(VirtualServerListener {
                    http: Some("http-alt".to_string()),
                    https: None,
                }),
            },
        );
        let (http, https, warnings) = resolve_virtual_server_ports(&vs, &table);
        assert_eq!(http, 8083);
        assert_eq!(https, 443);
        assert!(warnings.is_empty());

        vs.spec.listener = Some(VirtualServerListener {
            http: Some("missing".to_string()),
            https: None,
        });
        let (http, _, warnings) = resolve_virtual_server_ports(&vs, &table);
        assert_eq!(http, 80);
        assert_eq!(warnings.len(), 1);
    }

    fn ts(listener_name: &str, protocol: &str) -> TransportServer {
        let mut ts = TransportServer::new(
            "dns",
            TransportServerSpec {
                listener: TransportServerListener {
                    name: listener_name.to_string(),
                    protocol: protocol.to_string(),
                },
                host: None,
                tls: None,
                upstreams: vec![TransportServerUpstream {
                    name: "dns-app".to_string(),
                    service: "dns-svc".to_string(),
                    port: 5353,
                    max_conns: None,
                }],
                action: TransportServerAction {
                    pass: "dns-app".to_string(),
                },
            },
        );
        ts.metadata.namespace = Some("default".to_string());
        ts
    }

    #[test]
    fn test_resolve_transport_server_port() {
        let table = listeners(&[listener("dns-udp", 5353, "UDP")]);

        assert_eq!(
            resolve_transport_server_port(&ts("dns-udp", "UDP"), &table),
            Ok(Some(5353))
        );
        assert_eq!(
            resolve_transport_server_port(&ts("tls-passthrough", "TLS_PASSTHROUGH"), &table),
            Ok(None)
        );

        let mismatch = resolve_transport_server_port(&ts("dns-udp", "TCP"), &table);
        assert!(mismatch.unwrap_err().contains("protocol UDP, not TCP"));

        let missing = resolve_transport_server_port(&ts("nowhere", "TCP"), &table);
        assert!(missing
            .unwrap_err()
            .contains("not defined in the GlobalConfiguration"));
    }

    async fn offline_manager() -> Arc<NamespaceManager> {
        let server = wiremock::MockServer::start().await;
        let config = Config::new(server.uri().parse().unwrap());
        NamespaceManager::new(Client::try_from(config).unwrap())
    }

    fn seeded_group() -> Arc<InformerGroup> {
        let group = InformerGroup::new("default");
        group.endpoints.apply(watcher::Event::Apply(endpoints_object(
            "tea-svc",
            &["10.0.0.1"],
            8080,
        )));
        group
    }

    /// Endpoints, delegated routes and missing references all land in the
    /// composed view.
    #[tokio::test]
    async fn test_build_virtual_server_ex() {
        let manager = offline_manager().await;
        let group = seeded_group();

        let mut vsr = VirtualServerRoute::new(
            "teas",
            VirtualServerRouteSpec {
                host: "cafe.example.com".to_string(),
                upstreams: vec![Upstream {
                    name: "green".to_string(),
                    service: "tea-svc".to_string(),
                    port: 8080,
                    ..Upstream::default()
                }],
                subroutes: vec![Route {
                    path: "/tea/green".to_string(),
                    action: Some(RouteAction {
                        pass: Some("green".to_string()),
                    }),
                    splits: None,
                }],
            },
        );
        vsr.metadata.namespace = Some("default".to_string());
        group.virtual_server_routes.apply(watcher::Event::Apply(vsr));

        let mut vs = VirtualServer::new(
            "cafe",
            VirtualServerSpec {
                host: "cafe.example.com".to_string(),
                tls: Some(VirtualServerTls {
                    secret: Some("cafe-secret".to_string()),
                    cert_manager: None,
                    redirect: None,
                }),
                upstreams: vec![Upstream {
                    name: "tea".to_string(),
                    service: "tea-svc".to_string(),
                    port: 8080,
                    ..Upstream::default()
                }],
                routes: vec![Route {
                    path: "/tea".to_string(),
                    action: Some(RouteAction {
                        pass: Some("tea".to_string()),
                    }),
                    splits: None,
                }],
                external_dns: None,
                policies: Some(vec![PolicyReference {
                    name: "rate-limit".to_string(),
                    namespace: None,
                }]),
                listener: None,
            },
        );
        vs.metadata.namespace = Some("default".to_string());

        let (ex, warnings) =
            build_virtual_server_ex(&Arc::new(vs), &group, &manager, &HashMap::new());

        assert_eq!(
            ex.endpoints["vs_default_cafe_tea"],
            vec!["10.0.0.1:8080".to_string()]
        );
        assert_eq!(
            ex.endpoints["vsr_default_teas_green"],
            vec!["10.0.0.1:8080".to_string()]
        );
        assert_eq!(ex.routes.len(), 1);
        assert_eq!(ex.http_port, 80);
        // The policy namespace is unwatched and the secret object absent.
        assert!(warnings.iter().any(|w| w.contains("rate-limit")));
        assert!(warnings.iter().any(|w| w.contains("cafe-secret")));
    }

    #[tokio::test]
    async fn test_build_virtual_server_ex_resolves_policies() {
        let manager = offline_manager().await;
        manager.add_namespace("default");
        let group = manager.get("default").unwrap();
        group.endpoints.apply(watcher::Event::Apply(endpoints_object(
            "tea-svc",
            &["10.0.0.1"],
            8080,
        )));

        let mut policy = Policy::new(
            "allow-internal",
            PolicySpec {
                access_control: Some(AccessControl {
                    allow: Some(vec!["10.0.0.0/8".to_string()]),
                    deny: None,
                }),
                ..PolicySpec::default()
            },
        );
        policy.metadata.namespace = Some("default".to_string());
        group.policies.apply(watcher::Event::Apply(policy));

        let mut vs = VirtualServer::new(
            "cafe",
            VirtualServerSpec {
                host: "cafe.example.com".to_string(),
                tls: None,
                upstreams: vec![],
                routes: vec![],
                external_dns: None,
                policies: Some(vec![PolicyReference {
                    name: "allow-internal".to_string(),
                    namespace: None,
                }]),
                listener: None,
            },
        );
        vs.metadata.namespace = Some("default".to_string());

        let (ex, warnings) =
            build_virtual_server_ex(&Arc::new(vs), &group, &manager, &HashMap::new());
        assert!(warnings.is_empty());
        assert!(ex.policies.contains_key("default/allow-internal"));
    }

    /// An invalid policy is excluded from the composed view with a warning
    /// instead of poisoning the render.
    #[tokio::test]
    async fn test_build_virtual_server_ex_excludes_invalid_policy() {
        let manager = offline_manager().await;
        manager.add_namespace("default");
        let group = manager.get("default").unwrap();

        let mut policy = Policy::new(
            "rate-limit",
            PolicySpec {
                rate_limit: Some(RateLimit {
                    rate: "not-a-rate".to_string(),
                    key: "${binary_remote_addr}".to_string(),
                    zone_size: "10M".to_string(),
                    burst: None,
                    no_delay: None,
                    delay: None,
                    reject_code: None,
                    log_level: None,
                }),
                ..PolicySpec::default()
            },
        );
        policy.metadata.namespace = Some("default".to_string());
        group.policies.apply(watcher::Event::Apply(policy));

        let mut vs = VirtualServer::new(
            "cafe",
            VirtualServerSpec {
                host: "cafe.example.com".to_string(),
                tls: None,
                upstreams: vec![],
                routes: vec![],
                external_dns: None,
                policies: Some(vec![PolicyReference {
                    name: "rate-limit".to_string(),
                    namespace: None,
                }]),
                listener: None,
            },
        );
        vs.metadata.namespace = Some("default".to_string());

        let (ex, warnings) =
            build_virtual_server_ex(&Arc::new(vs), &group, &manager, &HashMap::new());
        assert!(ex.policies.is_empty());
        assert!(warnings
            .iter()
            .any(|w| w.contains("default/rate-limit is invalid")));
    }

    /// A present TLS Secret lands in the composed view as concatenated PEM.
    #[tokio::test]
    async fn test_build_virtual_server_ex_collects_tls_secret() {
        let manager = offline_manager().await;
        let group = seeded_group();

        let mut secret = Secret::default();
        secret.metadata.name = Some("cafe-secret".to_string());
        secret.metadata.namespace = Some("default".to_string());
        let data: BTreeMap<String, ByteString> = [
            ("tls.crt".to_string(), ByteString(b"CERT".to_vec())),
            ("tls.key".to_string(), ByteString(b"KEY".to_vec())),
        ]
        .into_iter()
        .collect();
        secret.data = Some(data);
        group.secrets.apply(watcher::Event::Apply(secret));

        let mut vs = VirtualServer::new(
            "cafe",
            VirtualServerSpec {
                host: "cafe.example.com".to_string(),
                tls: Some(VirtualServerTls {
                    secret: Some("cafe-secret".to_string()),
                    cert_manager: None,
                    redirect: None,
                }),
                upstreams: vec![],
                routes: vec![],
                external_dns: None,
                policies: None,
                listener: None,
            },
        );
        vs.metadata.namespace = Some("default".to_string());

        let (ex, warnings) =
            build_virtual_server_ex(&Arc::new(vs), &group, &manager, &HashMap::new());
        assert!(warnings.is_empty());
        assert_eq!(ex.secrets.len(), 1);
        assert_eq!(ex.secrets[0].name, "default-cafe-secret");
        assert_eq!(ex.secrets[0].kind, SecretFileKind::Tls);
        assert_eq!(ex.secrets[0].content, b"CERTKEY".to_vec());
    }

    /// ProtectedResource and Ingress changes enqueue their typed keys.
    #[tokio::test]
    async fn test_handlers_enqueue_protected_resources_and_ingresses() {
        let server = wiremock::MockServer::start().await;
        let config = Config::new(server.uri().parse().unwrap());
        let client = Client::try_from(config).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let nginx = Arc::new(NginxManager::new(dir.path(), "/usr/sbin/nginx").unwrap());
        let (_leader_tx, is_leader) = watch::channel(true);

        let ctx = Arc::new(ReconcilerContext {
            client: client.clone(),
            namespaces: NamespaceManager::new(client.clone()),
            configurator: Arc::new(Configurator::new(nginx, None)),
            events: EventSink::new(client, None),
            queue: WorkQueue::new(),
            cert_queue: WorkQueue::new(),
            dns_queue: WorkQueue::new(),
            listeners: RwLock::new(HashMap::new()),
            is_leader,
            external_endpoints: RwLock::new(Vec::new()),
        });
        let group = InformerGroup::new("default");
        register_handlers(&ctx, &group);

        let mut pr = ProtectedResource::new(
            "web",
            ProtectedResourceSpec {
                waf_policy: "strict".to_string(),
                log_destination: None,
            },
        );
        pr.metadata.namespace = Some("default".to_string());
        group.protected_resources.apply(watcher::Event::Apply(pr));

        let mut ing = Ingress::default();
        ing.metadata.name = Some("cafe".to_string());
        ing.metadata.namespace = Some("default".to_string());
        group.ingresses.apply(watcher::Event::Apply(ing));

        assert_eq!(ctx.queue.len(), 2);
        assert_eq!(ctx.queue.get().await.as_deref(), Some("pr/default/web"));
        assert_eq!(ctx.queue.get().await.as_deref(), Some("ing/default/cafe"));
    }

    #[test]
    fn test_build_transport_server_ex() {
        let group = seeded_group();
        group.endpoints.apply(watcher::Event::Apply(endpoints_object(
            "dns-svc",
            &["10.0.0.9"],
            5353,
        )));

        let ex = build_transport_server_ex(&Arc::new(ts("dns-udp", "UDP")), &group, Some(5353));
        assert_eq!(ex.listener_port, Some(5353));
        assert_eq!(
            ex.endpoints["ts_default_dns_dns-app"],
            vec!["10.0.0.9:5353".to_string()]
        );
    }
}
