// Copyright (c) 2025 The Rampart Authors
// SPDX-License-Identifier: MIT

//! NGINX master process supervision.
//!
//! The controller starts the master in the foreground (`daemon off`) and
//! holds the child handle. An unexpected master exit is fatal for the pod:
//! the supervisor reports it on a channel the main select loop listens on.

use super::NginxError;
use std::path::PathBuf;
use std::process::ExitStatus;
use tokio::process::{Child, Command};
use tokio::sync::oneshot;
use tracing::{error, info};

/// A running NGINX master process.
pub struct NginxProcess {
    child: Child,
}

impl NginxProcess {
    /// Start the master in the foreground under the given prefix.
    ///
    /// # Errors
    ///
    /// Fails when the binary cannot be spawned.
    pub fn start(binary: impl Into<PathBuf>, prefix: impl Into<PathBuf>) -> Result<Self, NginxError> {
        let binary = binary.into();
        let prefix = prefix.into();
        let child = Command::new(&binary)
            .arg("-p")
            .arg(&prefix)
            .arg("-c")
            .arg(crate::constants::MAIN_CONFIG_FILE)
            .arg("-g")
            .arg("daemon off;")
            .spawn()
            .map_err(|source| NginxError::Command {
                args: "-g 'daemon off;'".to_string(),
                source,
            })?;
        info!(binary = %binary.display(), prefix = %prefix.display(), "Started NGINX master");
        Ok(Self { child })
    }

    /// Move the child onto a supervisor task.
    ///
    /// The returned receiver fires once, with the exit status, when the
    /// master terminates for any reason.
    pub fn supervise(mut self) -> oneshot::Receiver<ExitStatus> {
        let (tx, rx) = oneshot::channel();
        tokio::spawn(async move {
            match self.child.wait().await {
                Ok(status) => {
                    if !status.success() {
                        error!(%status, "NGINX master exited");
                    }
                    let _ = tx.send(status);
                }
                Err(e) => {
                    error!(error = %e, "Failed to wait on NGINX master");
                }
            }
        });
        rx
    }
}
