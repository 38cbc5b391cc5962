// Copyright (c) 2025 The Rampart Authors
// SPDX-License-Identifier: MIT

//! Unit tests for `externaldns.rs`

#[cfg(test)]
mod tests {
    use super::super::{derive_targets, desired_dns_endpoint};
    use crate::crd::{
        ExternalDns, ExternalEndpoint, VirtualServer, VirtualServerSpec, VirtualServerStatus,
    };

    fn ip(addr: &str) -> ExternalEndpoint {
        ExternalEndpoint {
            ip: Some(addr.to_string()),
            hostname: None,
            ports: None,
        }
    }

    fn hostname(name: &str) -> ExternalEndpoint {
        ExternalEndpoint {
            ip: None,
            hostname: Some(name.to_string()),
            ports: None,
        }
    }

    fn vs(external_dns: ExternalDns, endpoints: Vec<ExternalEndpoint>) -> VirtualServer {
        let mut vs = VirtualServer::new(
            "cafe",
            VirtualServerSpec {
                host: "cafe.example.com".to_string(),
                tls: None,
                upstreams: vec![],
                routes: vec![],
                external_dns: Some(external_dns),
                policies: None,
                listener: None,
            },
        );
        vs.metadata.namespace = Some("default".to_string());
        vs.metadata.uid = Some("uid-cafe".to_string());
        vs.status = Some(VirtualServerStatus {
            external_endpoints: Some(endpoints),
            ..VirtualServerStatus::default()
        });
        vs
    }

    /// Mixed IPv4 and IPv6 endpoints produce an A record carrying both
    /// addresses.
    #[test]
    fn test_ipv4_takes_precedence_over_ipv6() {
        let (targets, record_type) =
            derive_targets(&[ip("10.0.0.1"), ip("2001:db8::1")]).unwrap();
        assert_eq!(record_type, "A");
        assert_eq!(targets, vec!["10.0.0.1", "2001:db8::1"]);
    }

    #[test]
    fn test_ipv6_only_yields_aaaa() {
        let (targets, record_type) = derive_targets(&[ip("2001:db8::1")]).unwrap();
        assert_eq!(record_type, "AAAA");
        assert_eq!(targets, vec!["2001:db8::1"]);
    }

    #[test]
    fn test_hostnames_yield_cname() {
        let (targets, record_type) =
            derive_targets(&[hostname("lb.example.net")]).unwrap();
        assert_eq!(record_type, "CNAME");
        assert_eq!(targets, vec!["lb.example.net"]);
    }

    #[test]
    fn test_invalid_ip_literals_are_dropped() {
        let (targets, record_type) =
            derive_targets(&[ip("not-an-ip"), ip("10.0.0.1")]).unwrap();
        assert_eq!(record_type, "A");
        assert_eq!(targets, vec!["10.0.0.1"]);

        assert!(derive_targets(&[ip("not-an-ip")]).is_none());
        assert!(derive_targets(&[]).is_none());
    }

    #[test]
    fn test_desired_endpoint_carries_config() {
        let config = ExternalDns {
            enable: true,
            record_type: None,
            record_ttl: Some(120),
            labels: None,
            provider_specific: None,
        };
        let dep = desired_dns_endpoint(&vs(config, vec![ip("10.0.0.1")])).unwrap();

        let record = &dep.spec.endpoints[0];
        assert_eq!(record.dns_name, "cafe.example.com");
        assert_eq!(record.record_type, "A");
        assert_eq!(record.record_ttl, Some(120));
        assert_eq!(record.targets, vec!["10.0.0.1"]);
        assert_eq!(dep.metadata.namespace.as_deref(), Some("default"));
        assert_eq!(dep.metadata.owner_references.as_ref().unwrap()[0].uid, "uid-cafe");
    }

    #[test]
    fn test_record_type_override_wins() {
        let config = ExternalDns {
            enable: true,
            record_type: Some("CNAME".to_string()),
            record_ttl: None,
            labels: None,
            provider_specific: None,
        };
        let dep = desired_dns_endpoint(&vs(config, vec![ip("10.0.0.1")])).unwrap();
        assert_eq!(dep.spec.endpoints[0].record_type, "CNAME");
    }

    #[test]
    fn test_disabled_stanza_yields_nothing() {
        let config = ExternalDns {
            enable: false,
            record_type: None,
            record_ttl: None,
            labels: None,
            provider_specific: None,
        };
        assert!(desired_dns_endpoint(&vs(config, vec![ip("10.0.0.1")])).is_none());
    }
}
