// Copyright (c) 2025 The Rampart Authors
// SPDX-License-Identifier: MIT

//! Unit tests for `cli.rs`

#[cfg(test)]
mod tests {
    use super::super::{split_namespaced_name, Args};
    use clap::Parser;

    #[test]
    fn test_defaults() {
        let args = Args::try_parse_from(["rampart"]).unwrap();
        assert!(!args.nginx_plus);
        assert!(args.enable_leader_election);
        assert!(!args.enable_cert_manager);
        assert_eq!(args.ready_status_port, 8081);
        assert_eq!(args.metrics_port, 9113);
        assert_eq!(args.static_namespaces(), vec!["default".to_string()]);
    }

    #[test]
    fn test_watch_namespace_is_repeatable() {
        let args = Args::try_parse_from([
            "rampart",
            "--watch-namespace",
            "default",
            "--watch-namespace",
            "staging",
        ])
        .unwrap();
        assert_eq!(args.static_namespaces(), vec!["default", "staging"]);
    }

    #[test]
    fn test_namespace_list_conflicts_with_label_selector() {
        let result = Args::try_parse_from([
            "rampart",
            "--watch-namespace",
            "default",
            "--watch-namespace-label",
            "team=edge",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_leader_election_can_be_disabled() {
        let args =
            Args::try_parse_from(["rampart", "--enable-leader-election", "false"]).unwrap();
        assert!(!args.enable_leader_election);
    }

    #[test]
    fn test_split_namespaced_name() {
        assert_eq!(
            split_namespaced_name("nginx-ingress/nginx-config").unwrap(),
            ("nginx-ingress".to_string(), "nginx-config".to_string())
        );
        assert!(split_namespaced_name("no-slash").is_err());
        assert!(split_namespaced_name("/name").is_err());
        assert!(split_namespaced_name("ns/").is_err());
        assert!(split_namespaced_name("a/b/c").is_err());
    }
}
