// Copyright (c) 2025 The Rampart Authors
// SPDX-License-Identifier: MIT

//! Unit tests for `params.rs`

#[cfg(test)]
mod tests {
    use super::super::{render_main_config, ConfigParams};
    use k8s_openapi::api::core::v1::ConfigMap;
    use std::collections::BTreeMap;

    fn configmap(entries: &[(&str, &str)]) -> ConfigMap {
        let data: BTreeMap<String, String> = entries
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        ConfigMap {
            data: Some(data),
            ..ConfigMap::default()
        }
    }

    #[test]
    fn test_defaults_without_data() {
        let (params, warnings) = ConfigParams::from_configmap(&ConfigMap::default());
        assert_eq!(params, ConfigParams::default());
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_parses_known_keys() {
        let cm = configmap(&[
            ("worker-processes", "4"),
            ("worker-connections", "2048"),
            ("error-log-level", "warn"),
            ("server-tokens", "false"),
        ]);
        let (params, warnings) = ConfigParams::from_configmap(&cm);
        assert_eq!(params.worker_processes, "4");
        assert_eq!(params.worker_connections, 2048);
        assert_eq!(params.error_log_level, "warn");
        assert!(!params.server_tokens);
        assert!(warnings.is_empty());
    }

    /// One bad value keeps its default and produces a warning.
    #[test]
    fn test_bad_value_is_fail_soft() {
        let cm = configmap(&[
            ("worker-connections", "lots"),
            ("error-log-level", "screaming"),
        ]);
        let (params, warnings) = ConfigParams::from_configmap(&cm);
        assert_eq!(params.worker_connections, 1024);
        assert_eq!(params.error_log_level, "notice");
        assert_eq!(warnings.len(), 2);
    }

    #[test]
    fn test_unknown_key_warns() {
        let cm = configmap(&[("no-such-key", "1")]);
        let (_, warnings) = ConfigParams::from_configmap(&cm);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("no-such-key"));
    }

    #[test]
    fn test_main_config_includes_fragment_dirs() {
        let conf = render_main_config(&ConfigParams::default(), false);
        assert!(conf.contains("include config-version.conf;"));
        assert!(conf.contains("include conf.d/*.conf;"));
        assert!(conf.contains("include stream-conf.d/*.conf;"));
        assert!(!conf.contains("ssl_preread"));
    }

    #[test]
    fn test_main_config_with_passthrough_multiplexer() {
        let conf = render_main_config(&ConfigParams::default(), true);
        assert!(conf.contains("map $ssl_preread_server_name $rampart_passthrough"));
        assert!(conf.contains("include tls-passthrough-hosts.conf;"));
        assert!(conf.contains("listen 443;"));
        assert!(conf.contains("proxy_pass $rampart_passthrough;"));
    }

    #[test]
    fn test_snippets_are_verbatim() {
        let params = ConfigParams {
            http_snippets: Some("gzip on;\ngzip_types text/plain;".to_string()),
            ..ConfigParams::default()
        };
        let conf = render_main_config(&params, false);
        assert!(conf.contains("    gzip on;"));
        assert!(conf.contains("    gzip_types text/plain;"));
    }
}
