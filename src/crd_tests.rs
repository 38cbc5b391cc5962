// Copyright (c) 2025 The Rampart Authors
// SPDX-License-Identifier: MIT

//! Unit tests for `crd.rs`

#[cfg(test)]
mod tests {
    use crate::crd::{
        CertManager, Endpoint, ExternalDns, Listener, PolicySpec, RateLimit, ResourceState, Route,
        RouteAction, TransportServerSpec, Upstream, VirtualServerSpec, VirtualServerTls,
    };

    /// VirtualServer specs round-trip through serde with camelCase keys
    #[test]
    fn test_virtualserver_spec_serde_camel_case() {
        let spec = VirtualServerSpec {
            host: "cafe.example.com".to_string(),
            tls: Some(VirtualServerTls {
                secret: Some("cafe-cert".to_string()),
                cert_manager: Some(CertManager {
                    cluster_issuer: Some("letsencrypt".to_string()),
                    ..CertManager::default()
                }),
                redirect: None,
            }),
            upstreams: vec![Upstream {
                name: "u1".to_string(),
                service: "cafe-svc".to_string(),
                port: 8080,
                ..Upstream::default()
            }],
            routes: vec![Route {
                path: "/".to_string(),
                action: Some(RouteAction {
                    pass: Some("u1".to_string()),
                }),
                splits: None,
            }],
            external_dns: None,
            policies: None,
            listener: None,
        };

        let json = serde_json::to_value(&spec).unwrap();
        assert_eq!(json["host"], "cafe.example.com");
        assert_eq!(json["tls"]["certManager"]["clusterIssuer"], "letsencrypt");
        assert_eq!(json["upstreams"][0]["service"], "cafe-svc");

        let back: VirtualServerSpec = serde_json::from_value(json).unwrap();
        assert_eq!(back, spec);
    }

    /// Optional fields are omitted from serialized output
    #[test]
    fn test_optional_fields_skipped() {
        let upstream = Upstream {
            name: "u1".to_string(),
            service: "svc".to_string(),
            port: 80,
            ..Upstream::default()
        };

        let json = serde_json::to_value(&upstream).unwrap();
        assert!(json.get("lbMethod").is_none());
        assert!(json.get("maxFails").is_none());
        assert!(json.get("failTimeout").is_none());
    }

    /// The jwksURI field keeps its uppercase URI suffix on the wire
    #[test]
    fn test_jwks_uri_wire_name() {
        let policy: PolicySpec = serde_json::from_str(
            r#"{
                "jwt": {
                    "realm": "api",
                    "jwksURI": "https://idp.example.com/keys",
                    "keyCache": "1h"
                }
            }"#,
        )
        .unwrap();

        let jwt = policy.jwt.unwrap();
        assert_eq!(
            jwt.jwks_uri.as_deref(),
            Some("https://idp.example.com/keys")
        );
        assert_eq!(jwt.key_cache.as_deref(), Some("1h"));
    }

    /// TransportServer specs deserialize from their declarative YAML shape
    #[test]
    fn test_transportserver_spec_from_yaml() {
        let spec: TransportServerSpec = serde_yaml::from_str(
            r"
listener:
  name: dns-tcp
  protocol: TCP
upstreams:
  - name: dns-app
    service: coredns
    port: 5353
action:
  pass: dns-app
",
        )
        .unwrap();

        assert_eq!(spec.listener.name, "dns-tcp");
        assert_eq!(spec.action.pass, "dns-app");
        assert_eq!(spec.upstreams[0].port, 5353);
    }

    /// ResourceState defaults to Pending and displays its wire name
    #[test]
    fn test_resource_state_default_and_display() {
        assert_eq!(ResourceState::default(), ResourceState::Pending);
        assert_eq!(ResourceState::Valid.to_string(), "Valid");
        assert_eq!(ResourceState::Warning.to_string(), "Warning");
        assert_eq!(ResourceState::Invalid.to_string(), "Invalid");
    }

    /// RateLimit accepts the documented field shapes
    #[test]
    fn test_rate_limit_shape() {
        let rl: RateLimit = serde_json::from_str(
            r#"{
                "rate": "10r/s",
                "key": "${binary_remote_addr}",
                "zoneSize": "10M",
                "rejectCode": 429,
                "logLevel": "warn"
            }"#,
        )
        .unwrap();

        assert_eq!(rl.rate, "10r/s");
        assert_eq!(rl.reject_code, Some(429));
    }

    /// Listener equality is field-wise, used by GlobalConfiguration diffing
    #[test]
    fn test_listener_equality() {
        let a = Listener {
            name: "dns-udp".to_string(),
            port: 5353,
            protocol: "UDP".to_string(),
        };
        let b = a.clone();
        assert_eq!(a, b);

        let c = Listener { port: 5354, ..b };
        assert_ne!(a, c);
    }

    /// DNSEndpoint record TTL uses the recordTTL wire name
    #[test]
    fn test_endpoint_record_ttl_wire_name() {
        let ep = Endpoint {
            dns_name: "cafe.example.com".to_string(),
            targets: vec!["10.0.0.1".to_string()],
            record_type: "A".to_string(),
            record_ttl: Some(300),
            labels: None,
            provider_specific: None,
        };

        let json = serde_json::to_value(&ep).unwrap();
        assert_eq!(json["recordTTL"], 300);
        assert_eq!(json["recordType"], "A");
    }

    /// Every operator-owned CRD exposes the status subresource so the
    /// controller can patch state without touching spec.
    #[test]
    fn test_owned_crds_have_status_subresource() {
        use crate::crd::{GlobalConfiguration, Policy, ProtectedResource, TransportServer, VirtualServer};
        use kube::CustomResourceExt;

        for (name, crd) in [
            ("VirtualServer", VirtualServer::crd()),
            ("TransportServer", TransportServer::crd()),
            ("Policy", Policy::crd()),
            ("GlobalConfiguration", GlobalConfiguration::crd()),
            ("ProtectedResource", ProtectedResource::crd()),
        ] {
            let version = &crd.spec.versions[0];
            assert!(
                version.subresources.as_ref().and_then(|s| s.status.as_ref()).is_some(),
                "{name} CRD is missing the status subresource"
            );
        }
    }

    /// externalDNS enable flag defaults come from the declarative form
    #[test]
    fn test_external_dns_from_json() {
        let ed: ExternalDns = serde_json::from_str(
            r#"{"enable": true, "recordType": "CNAME", "recordTTL": 120}"#,
        )
        .unwrap();
        assert!(ed.enable);
        assert_eq!(ed.record_type.as_deref(), Some("CNAME"));
        assert_eq!(ed.record_ttl, Some(120));
    }
}
