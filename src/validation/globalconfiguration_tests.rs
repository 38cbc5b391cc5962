// Copyright (c) 2025 The Rampart Authors
// SPDX-License-Identifier: MIT

//! Unit tests for `globalconfiguration.rs`

#[cfg(test)]
mod tests {
    use super::super::validate_global_configuration;
    use crate::crd::{GlobalConfiguration, GlobalConfigurationSpec, Listener};

    fn gc(listeners: Vec<Listener>) -> GlobalConfiguration {
        GlobalConfiguration::new("rampart-config", GlobalConfigurationSpec { listeners })
    }

    fn listener(name: &str, port: u16, protocol: &str) -> Listener {
        Listener {
            name: name.to_string(),
            port,
            protocol: protocol.to_string(),
        }
    }

    #[test]
    fn test_accepts_valid_listeners() {
        let result = validate_global_configuration(&gc(vec![
            listener("dns-tcp", 5353, "TCP"),
            listener("dns-udp", 5353, "UDP"),
            listener("http-alt", 8085, "HTTP"),
        ]));
        assert!(result.is_clean());
        assert_eq!(result.accepted.len(), 3);
    }

    #[test]
    fn test_rejects_reserved_name() {
        let result =
            validate_global_configuration(&gc(vec![listener("tls-passthrough", 5353, "TCP")]));
        assert!(result.accepted.is_empty());
        assert!(result.errors().to_string().contains("reserved"));
    }

    #[test]
    fn test_rejects_duplicate_names() {
        let result = validate_global_configuration(&gc(vec![
            listener("dup", 5353, "TCP"),
            listener("dup", 5454, "TCP"),
        ]));
        assert_eq!(result.accepted.len(), 1, "First declaration wins");
        assert!(result.errors().to_string().contains("duplicate listener name"));
    }

    #[test]
    fn test_rejects_forbidden_ports() {
        for port in [80, 443, 8080, 8081, 9113, 9114] {
            let result = validate_global_configuration(&gc(vec![listener("l", port, "TCP")]));
            assert!(result.accepted.is_empty(), "Port {port} should be rejected");
        }
    }

    #[test]
    fn test_rejects_unknown_protocol() {
        let result = validate_global_configuration(&gc(vec![listener("l", 5353, "SCTP")]));
        assert!(result.errors().to_string().contains("must be TCP, UDP or HTTP"));
    }

    /// An HTTP listener cannot claim a port an L4 listener holds.
    #[test]
    fn test_http_listener_conflicts_with_l4_port() {
        let result = validate_global_configuration(&gc(vec![
            listener("l4", 5000, "TCP"),
            listener("web", 5000, "HTTP"),
        ]));
        assert_eq!(result.accepted.len(), 1);
        assert!(result
            .errors()
            .to_string()
            .contains("port 5000 is taken by TCP/UDP listener"));
    }

    /// The reverse conflict names the HTTP listener holding the port.
    #[test]
    fn test_l4_listener_conflicts_with_http_port() {
        let result = validate_global_configuration(&gc(vec![
            listener("web", 5000, "HTTP"),
            listener("l4", 5000, "UDP"),
        ]));
        assert_eq!(result.accepted.len(), 1);
        assert!(result
            .errors()
            .to_string()
            .contains("port 5000 is taken by HTTP listener"));
    }

    #[test]
    fn test_same_protocol_port_clash() {
        let result = validate_global_configuration(&gc(vec![
            listener("a", 5353, "TCP"),
            listener("b", 5353, "TCP"),
        ]));
        assert_eq!(result.accepted.len(), 1);
        assert!(result
            .errors()
            .to_string()
            .contains("port 5353 is taken by TCP listener a"));
    }

    /// Rejecting one listener does not reject the resource.
    #[test]
    fn test_fail_soft_keeps_valid_remainder() {
        let result = validate_global_configuration(&gc(vec![
            listener("good", 5353, "TCP"),
            listener("bad", 80, "TCP"),
            listener("also-good", 6000, "UDP"),
        ]));
        assert_eq!(result.accepted.len(), 2);
        assert_eq!(result.rejected.len(), 1);
        assert!(!result.is_clean());
    }
}
