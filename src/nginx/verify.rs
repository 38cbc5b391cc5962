// Copyright (c) 2025 The Rampart Authors
// SPDX-License-Identifier: MIT

//! Post-reload verification against the config version endpoint.
//!
//! After a reload the manager must not report success until the new workers
//! actually serve the new configuration. The version endpoint answers 200
//! only when the serving worker was started with the expected version, so
//! polling it until the first 200 bounds the reload end to end.

use super::NginxError;
use crate::constants::{
    CONFIG_VERSION_CHECK_PATH, CONFIG_VERSION_HEADER, DEFAULT_RELOAD_TIMEOUT,
    VERIFY_POLL_INTERVAL,
};
use std::time::Duration;
use tracing::{debug, trace};

/// Polls the version check endpoint until the expected version is live.
#[derive(Debug, Clone)]
pub struct VerifyClient {
    client: reqwest::Client,
    endpoint: String,
    timeout: Duration,
}

impl VerifyClient {
    /// Create a client polling localhost on the given status port.
    #[must_use]
    pub fn new(port: u16) -> Self {
        Self::with_endpoint(
            format!("http://127.0.0.1:{port}{CONFIG_VERSION_CHECK_PATH}"),
            DEFAULT_RELOAD_TIMEOUT,
        )
    }

    /// Create a client against an explicit endpoint URL.
    #[must_use]
    pub fn with_endpoint(endpoint: String, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint,
            timeout,
        }
    }

    /// Wait until the workers answer for `version`.
    ///
    /// Polls every 25 ms. Connection errors and non-200 answers both count
    /// as "not yet": old workers answer 503 and a worker mid-restart may
    /// refuse the connection entirely.
    ///
    /// # Errors
    ///
    /// Returns [`NginxError::VerifyTimeout`] when the version does not come
    /// live within the configured timeout.
    pub async fn wait_for_version(&self, version: u64) -> Result<(), NginxError> {
        let deadline = tokio::time::Instant::now() + self.timeout;
        loop {
            match self
                .client
                .get(&self.endpoint)
                .header(CONFIG_VERSION_HEADER, version.to_string())
                .send()
                .await
            {
                Ok(resp) if resp.status().is_success() => {
                    debug!(version, "Config version is live");
                    return Ok(());
                }
                Ok(resp) => {
                    trace!(version, status = %resp.status(), "Config version not live yet");
                }
                Err(e) => {
                    trace!(version, error = %e, "Version endpoint unreachable");
                }
            }

            if tokio::time::Instant::now() >= deadline {
                return Err(NginxError::VerifyTimeout {
                    expected: version,
                    timeout: self.timeout,
                });
            }
            tokio::time::sleep(VERIFY_POLL_INTERVAL).await;
        }
    }
}

#[cfg(test)]
#[path = "verify_tests.rs"]
mod verify_tests;
