// Copyright (c) 2025 The Rampart Authors
// SPDX-License-Identifier: MIT

//! Unit tests for `transportserver.rs`

#[cfg(test)]
mod tests {
    use super::super::validate_transport_server;
    use crate::crd::{
        TransportServer, TransportServerAction, TransportServerListener, TransportServerSpec,
        TransportServerTls, TransportServerUpstream,
    };

    fn ts(spec: TransportServerSpec) -> TransportServer {
        TransportServer::new("dns-tcp", spec)
    }

    fn tcp_spec() -> TransportServerSpec {
        TransportServerSpec {
            listener: TransportServerListener {
                name: "dns-tcp".to_string(),
                protocol: "TCP".to_string(),
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
        }
    }

    fn passthrough_spec() -> TransportServerSpec {
        let mut spec = tcp_spec();
        spec.listener = TransportServerListener {
            name: "tls-passthrough".to_string(),
            protocol: "TLS_PASSTHROUGH".to_string(),
        };
        spec.host = Some("app.example.com".to_string());
        spec
    }

    #[test]
    fn test_valid_tcp_server() {
        assert!(validate_transport_server(&ts(tcp_spec())).is_ok());
    }

    #[test]
    fn test_valid_passthrough_server() {
        assert!(validate_transport_server(&ts(passthrough_spec())).is_ok());
    }

    #[test]
    fn test_unknown_protocol() {
        let mut spec = tcp_spec();
        spec.listener.protocol = "SCTP".to_string();
        let errors = validate_transport_server(&ts(spec)).unwrap_err();
        assert!(errors.to_string().contains("must be TCP, UDP or TLS_PASSTHROUGH"));
    }

    #[test]
    fn test_passthrough_requires_host() {
        let mut spec = passthrough_spec();
        spec.host = None;
        let errors = validate_transport_server(&ts(spec)).unwrap_err();
        assert!(errors.to_string().contains("required for TLS passthrough"));
    }

    #[test]
    fn test_passthrough_forbids_tls_block() {
        let mut spec = passthrough_spec();
        spec.tls = Some(TransportServerTls {
            secret: "app-secret".to_string(),
        });
        let errors = validate_transport_server(&ts(spec)).unwrap_err();
        assert!(errors
            .to_string()
            .contains("not valid on a TLS passthrough listener"));
    }

    #[test]
    fn test_passthrough_listener_requires_passthrough_protocol() {
        let mut spec = tcp_spec();
        spec.listener.name = "tls-passthrough".to_string();
        let errors = validate_transport_server(&ts(spec)).unwrap_err();
        assert!(errors
            .to_string()
            .contains("requires protocol TLS_PASSTHROUGH"));
    }

    #[test]
    fn test_tls_not_valid_on_udp() {
        let mut spec = tcp_spec();
        spec.listener.protocol = "UDP".to_string();
        spec.tls = Some(TransportServerTls {
            secret: "app-secret".to_string(),
        });
        let errors = validate_transport_server(&ts(spec)).unwrap_err();
        assert!(errors.to_string().contains("not valid on a UDP listener"));
    }

    #[test]
    fn test_action_must_reference_declared_upstream() {
        let mut spec = tcp_spec();
        spec.action.pass = "ghost".to_string();
        let errors = validate_transport_server(&ts(spec)).unwrap_err();
        assert!(errors.to_string().contains("spec.action.pass"));
    }
}
