// Copyright (c) 2025 The Rampart Authors
// SPDX-License-Identifier: MIT

//! Unit tests for `verify.rs`

#[cfg(test)]
mod tests {
    use super::super::super::NginxError;
    use super::super::VerifyClient;
    use crate::constants::CONFIG_VERSION_CHECK_PATH;
    use std::time::Duration;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer, timeout: Duration) -> VerifyClient {
        VerifyClient::with_endpoint(
            format!("{}{CONFIG_VERSION_CHECK_PATH}", server.uri()),
            timeout,
        )
    }

    #[tokio::test]
    async fn test_returns_once_version_is_live() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(CONFIG_VERSION_CHECK_PATH))
            .and(header("X-Expected-Config-Version", "3"))
            .respond_with(ResponseTemplate::new(200).set_body_string("3"))
            .mount(&server)
            .await;

        let verify = client(&server, Duration::from_secs(5));
        verify.wait_for_version(3).await.unwrap();
    }

    /// Old workers answer 503 for a version they were not started with.
    #[tokio::test]
    async fn test_times_out_while_old_workers_answer() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(CONFIG_VERSION_CHECK_PATH))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let verify = client(&server, Duration::from_millis(120));
        let err = verify.wait_for_version(4).await.unwrap_err();
        assert!(matches!(
            err,
            NginxError::VerifyTimeout { expected: 4, .. }
        ));
    }

    /// A refused connection counts as "not yet", then times out.
    #[tokio::test]
    async fn test_times_out_when_endpoint_unreachable() {
        let verify = VerifyClient::with_endpoint(
            "http://127.0.0.1:1/configVersionCheck".to_string(),
            Duration::from_millis(120),
        );
        let err = verify.wait_for_version(1).await.unwrap_err();
        assert!(matches!(err, NginxError::VerifyTimeout { .. }));
    }
}
