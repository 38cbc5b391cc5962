// Copyright (c) 2025 The Rampart Authors
// SPDX-License-Identifier: MIT

//! NGINX management: configuration files, reloads and the Plus API.
//!
//! The [`NginxManager`] owns the co-located NGINX instance. It writes
//! configuration fragments and secret material under the NGINX prefix,
//! maintains a monotonically increasing configuration version, and drives
//! version-gated reloads: every reload bumps the version, rewrites the
//! version endpoint fragment, signals the master process and then polls the
//! endpoint until the running workers serve the new version.
//!
//! # Layout under the prefix
//!
//! - `nginx.conf` - main configuration
//! - `conf.d/<name>.conf` - one fragment per HTTP server
//! - `stream-conf.d/<name>.conf` - one fragment per L4 server
//! - `secrets/<name>` - certificate and key material, mode 0600
//! - `state_files/` - NGINX Plus state files
//! - `tls-passthrough-hosts.conf` - SNI host map for the passthrough proxy
//! - `config-version.conf` - the version check endpoint
//!
//! # Submodules
//!
//! - [`verify`] - polls the version endpoint after a reload
//! - [`admin`] - NGINX Plus API client over the unix socket
//! - [`process`] - master process supervision

pub mod admin;
pub mod process;
pub mod verify;

use crate::constants::{
    CONFIG_FILE_MODE, CONFIG_VERSION_CHECK_PATH, CONFIG_VERSION_FILE, CONFIG_VERSION_HEADER,
    HTTP_CONF_DIR, MAIN_CONFIG_FILE, NGINX_STATUS_PORT, SECRETS_DIR, STATE_FILES_DIR,
    STREAM_CONF_DIR, TLS_PASSTHROUGH_HOSTS_FILE, TLS_SECRET_FILE_MODE,
};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info, warn};
use verify::VerifyClient;

/// Errors from NGINX management operations.
#[derive(Debug, thiserror::Error)]
pub enum NginxError {
    /// A configuration or secret file could not be written or removed.
    #[error("File operation on {path} failed: {source}")]
    Io {
        /// Path the operation targeted.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The NGINX binary could not be invoked.
    #[error("Failed to run nginx {args}: {source}")]
    Command {
        /// Arguments passed to the binary.
        args: String,
        /// Underlying spawn/wait error.
        #[source]
        source: std::io::Error,
    },

    /// The NGINX binary exited non-zero.
    #[error("nginx {args} exited with {status}: {stderr}")]
    CommandFailed {
        /// Arguments passed to the binary.
        args: String,
        /// Exit status.
        status: std::process::ExitStatus,
        /// Captured standard error.
        stderr: String,
    },

    /// The workers never served the expected configuration version.
    #[error("Config version {expected} not live after {timeout:?}")]
    VerifyTimeout {
        /// Version that was awaited.
        expected: u64,
        /// How long the poll ran.
        timeout: std::time::Duration,
    },

    /// A Plus API request failed.
    #[error("Plus API request {method} {path} failed: {reason}")]
    Api {
        /// HTTP method.
        method: String,
        /// Request path.
        path: String,
        /// What went wrong.
        reason: String,
    },

    /// A Plus API response could not be decoded.
    #[error("Failed to decode Plus API response from {path}")]
    ApiDecode {
        /// Request path.
        path: String,
        /// Underlying decode error.
        #[source]
        source: serde_json::Error,
    },
}

/// Manager for the co-located NGINX instance.
pub struct NginxManager {
    /// NGINX prefix directory holding all generated files.
    prefix: PathBuf,

    /// Path of the nginx binary.
    binary: PathBuf,

    /// Last configuration version written to `config-version.conf`.
    version: AtomicU64,

    /// Last configuration version that passed post-reload verification.
    verified_version: AtomicU64,

    /// Client polling the version check endpoint after reloads.
    verify: VerifyClient,
}

impl NginxManager {
    /// Create a manager rooted at the given prefix.
    ///
    /// # Errors
    ///
    /// Fails when the directory skeleton under the prefix cannot be created.
    pub fn new(prefix: impl Into<PathBuf>, binary: impl Into<PathBuf>) -> Result<Self, NginxError> {
        let prefix = prefix.into();
        for dir in [HTTP_CONF_DIR, STREAM_CONF_DIR, SECRETS_DIR, STATE_FILES_DIR] {
            let path = prefix.join(dir);
            std::fs::create_dir_all(&path).map_err(|source| NginxError::Io { path, source })?;
        }
        let manager = Self {
            prefix,
            binary: binary.into(),
            version: AtomicU64::new(0),
            verified_version: AtomicU64::new(0),
            verify: VerifyClient::new(NGINX_STATUS_PORT),
        };
        // The main config includes the version fragment, so it must exist
        // before the first nginx start.
        manager.write_version_config(0)?;
        Ok(manager)
    }

    /// The prefix directory.
    #[must_use]
    pub fn prefix(&self) -> &Path {
        &self.prefix
    }

    /// The configuration version currently written out.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::SeqCst)
    }

    /// Whether at least one reload has been verified live.
    ///
    /// The readiness endpoint answers 503 until this flips.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.verified_version.load(Ordering::SeqCst) > 0
    }

    // ========================================================================
    // File operations
    // ========================================================================

    /// Write the main `nginx.conf`.
    ///
    /// Returns `true` when the file content actually changed.
    ///
    /// # Errors
    ///
    /// Fails when the file cannot be written.
    pub fn write_main_config(&self, content: &str) -> Result<bool, NginxError> {
        self.write_if_changed(&self.prefix.join(MAIN_CONFIG_FILE), content.as_bytes(), CONFIG_FILE_MODE)
    }

    /// Write an HTTP server fragment under `conf.d/`.
    ///
    /// # Errors
    ///
    /// Fails when the file cannot be written.
    pub fn write_server_config(&self, name: &str, content: &str) -> Result<bool, NginxError> {
        let path = self.prefix.join(HTTP_CONF_DIR).join(format!("{name}.conf"));
        self.write_if_changed(&path, content.as_bytes(), CONFIG_FILE_MODE)
    }

    /// Remove an HTTP server fragment. Missing files are not an error.
    ///
    /// # Errors
    ///
    /// Fails when the file exists but cannot be removed.
    pub fn delete_server_config(&self, name: &str) -> Result<bool, NginxError> {
        let path = self.prefix.join(HTTP_CONF_DIR).join(format!("{name}.conf"));
        remove_if_present(&path)
    }

    /// Write an L4 server fragment under `stream-conf.d/`.
    ///
    /// # Errors
    ///
    /// Fails when the file cannot be written.
    pub fn write_stream_config(&self, name: &str, content: &str) -> Result<bool, NginxError> {
        let path = self.prefix.join(STREAM_CONF_DIR).join(format!("{name}.conf"));
        self.write_if_changed(&path, content.as_bytes(), CONFIG_FILE_MODE)
    }

    /// Remove an L4 server fragment. Missing files are not an error.
    ///
    /// # Errors
    ///
    /// Fails when the file exists but cannot be removed.
    pub fn delete_stream_config(&self, name: &str) -> Result<bool, NginxError> {
        let path = self.prefix.join(STREAM_CONF_DIR).join(format!("{name}.conf"));
        remove_if_present(&path)
    }

    /// Write TLS secret material (certificates and private keys), mode 0600.
    ///
    /// Returns `true` when the file content actually changed.
    ///
    /// # Errors
    ///
    /// Fails when the file cannot be written.
    pub fn write_tls_secret(&self, name: &str, content: &[u8]) -> Result<bool, NginxError> {
        let path = self.prefix.join(SECRETS_DIR).join(name);
        self.write_if_changed(&path, content, TLS_SECRET_FILE_MODE)
    }

    /// Write auxiliary secret material (JWKs, htpasswd files, CA bundles).
    ///
    /// NGINX workers read these after dropping privileges, so they are world
    /// readable unlike private keys. Returns `true` when the content changed.
    ///
    /// # Errors
    ///
    /// Fails when the file cannot be written.
    pub fn write_aux_secret(&self, name: &str, content: &[u8]) -> Result<bool, NginxError> {
        let path = self.prefix.join(SECRETS_DIR).join(name);
        self.write_if_changed(&path, content, crate::constants::AUX_SECRET_FILE_MODE)
    }

    /// Remove secret material. Missing files are not an error.
    ///
    /// # Errors
    ///
    /// Fails when the file exists but cannot be removed.
    pub fn delete_secret(&self, name: &str) -> Result<bool, NginxError> {
        remove_if_present(&self.prefix.join(SECRETS_DIR).join(name))
    }

    /// Remove Plus state files belonging to a configuration object.
    ///
    /// NGINX Plus writes `state_files/<group>.state` itself; stale files are
    /// cleaned up when the owning object goes away. Missing files are not an
    /// error.
    ///
    /// # Errors
    ///
    /// Fails when the directory cannot be read or a file cannot be removed.
    pub fn delete_state_files(&self, config_name: &str) -> Result<(), NginxError> {
        let dir = self.prefix.join(STATE_FILES_DIR);
        let entries = std::fs::read_dir(&dir)
            .map_err(|source| NginxError::Io { path: dir.clone(), source })?;
        let group_prefix = format!("{config_name}_");
        for entry in entries {
            let entry =
                entry.map_err(|source| NginxError::Io { path: dir.clone(), source })?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if name.starts_with(&group_prefix) && name.ends_with(".state") {
                remove_if_present(&entry.path())?;
            }
        }
        Ok(())
    }

    /// Write the SNI host map consumed by the TLS passthrough proxy.
    ///
    /// # Errors
    ///
    /// Fails when the file cannot be written.
    pub fn write_tls_passthrough_hosts(
        &self,
        hosts: &BTreeMap<String, String>,
    ) -> Result<bool, NginxError> {
        let mut content = String::new();
        for (host, unix_socket) in hosts {
            content.push_str(&format!("{host} {unix_socket};\n"));
        }
        self.write_if_changed(
            &self.prefix.join(TLS_PASSTHROUGH_HOSTS_FILE),
            content.as_bytes(),
            CONFIG_FILE_MODE,
        )
    }

    /// Atomically write a file, skipping the write when content is unchanged.
    ///
    /// Content comparison is by SHA-256 of the existing file, so an unchanged
    /// render never dirties mtimes or triggers a reload. The write goes to a
    /// temp file in the same directory followed by a rename, so a crashed
    /// write never leaves NGINX a half-written file.
    fn write_if_changed(&self, path: &Path, content: &[u8], mode: u32) -> Result<bool, NginxError> {
        let io = |source| NginxError::Io { path: path.to_path_buf(), source };

        if let Ok(existing) = std::fs::read(path) {
            if Sha256::digest(&existing) == Sha256::digest(content) {
                debug!(path = %path.display(), "Skipping write: content unchanged");
                return Ok(false);
            }
        }

        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, content).map_err(io)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&tmp, std::fs::Permissions::from_mode(mode)).map_err(io)?;
        }
        std::fs::rename(&tmp, path).map_err(io)?;
        debug!(path = %path.display(), "Wrote file");
        Ok(true)
    }

    // ========================================================================
    // Reload protocol
    // ========================================================================

    /// Reload NGINX and wait until the new configuration version is live.
    ///
    /// Validates the on-disk configuration first, then bumps the version
    /// counter, rewrites the version endpoint fragment, signals the master
    /// process, and polls the version endpoint until the workers answer for
    /// the new version or the timeout passes. A configuration that fails
    /// validation never bumps the version: the running workers keep serving
    /// the last good version.
    ///
    /// # Errors
    ///
    /// Fails when the configuration does not validate, the version fragment
    /// cannot be written, the reload signal fails, or the new version does
    /// not come live within the timeout.
    pub async fn reload(&self) -> Result<u64, NginxError> {
        if let Err(e) = self.test_config().await {
            crate::metrics::record_reload_failure();
            return Err(e);
        }
        let version = self.version.fetch_add(1, Ordering::SeqCst) + 1;
        self.write_version_config(version)?;

        info!(version, "Reloading NGINX");
        let started = std::time::Instant::now();
        let outcome = async {
            self.signal("reload").await?;
            self.verify.wait_for_version(version).await
        }
        .await;
        if let Err(e) = outcome {
            crate::metrics::record_reload_failure();
            return Err(e);
        }
        self.verified_version.store(version, Ordering::SeqCst);
        crate::metrics::record_reload_success(started.elapsed(), version);
        info!(version, "Reload complete");
        Ok(version)
    }

    /// Validate the on-disk configuration (`nginx -t`).
    ///
    /// # Errors
    ///
    /// Fails when the binary cannot be invoked or the configuration does
    /// not validate.
    pub async fn test_config(&self) -> Result<(), NginxError> {
        let args = "-t".to_string();
        let output = tokio::process::Command::new(&self.binary)
            .arg("-t")
            .arg("-p")
            .arg(&self.prefix)
            .output()
            .await
            .map_err(|source| NginxError::Command { args: args.clone(), source })?;

        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
            warn!(%stderr, "nginx config test failed");
            Err(NginxError::CommandFailed {
                args,
                status: output.status,
                stderr,
            })
        }
    }

    /// Block until the last written configuration version is verified live.
    ///
    /// Dynamic API mutations are only safe against the configuration they
    /// were planned for, so callers confirm the version before touching the
    /// API. Version 0 means nothing has been written yet and there is no
    /// running configuration to race against.
    ///
    /// # Errors
    ///
    /// Fails when the version does not come live within the timeout.
    pub async fn confirm_version(&self) -> Result<(), NginxError> {
        let version = self.version.load(Ordering::SeqCst);
        if version == 0 || self.verified_version.load(Ordering::SeqCst) == version {
            return Ok(());
        }
        self.verify.wait_for_version(version).await?;
        self.verified_version.store(version, Ordering::SeqCst);
        Ok(())
    }

    /// Gracefully stop NGINX (`nginx -s quit`).
    ///
    /// # Errors
    ///
    /// Fails when the signal cannot be delivered.
    pub async fn quit(&self) -> Result<(), NginxError> {
        self.signal("quit").await
    }

    /// Render and write `config-version.conf`.
    ///
    /// The fragment serves the version check endpoint on the status port:
    /// 200 when the expected-version header matches the version the worker
    /// was started with, 503 otherwise. Old workers keep answering 503 for
    /// the new version until the reload replaces them.
    fn write_version_config(&self, version: u64) -> Result<bool, NginxError> {
        let header_var = CONFIG_VERSION_HEADER.to_lowercase().replace('-', "_");
        let content = format!(
            "server {{\n    listen {NGINX_STATUS_PORT};\n    location {CONFIG_VERSION_CHECK_PATH} {{\n        default_type text/plain;\n        if ($http_{header_var} = \"{version}\") {{\n            return 200 \"{version}\";\n        }}\n        return 503;\n    }}\n}}\n"
        );
        self.write_if_changed(
            &self.prefix.join(CONFIG_VERSION_FILE),
            content.as_bytes(),
            CONFIG_FILE_MODE,
        )
    }

    /// Deliver a signal via `nginx -s <signal>`.
    async fn signal(&self, signal: &str) -> Result<(), NginxError> {
        let args = format!("-s {signal}");
        let output = tokio::process::Command::new(&self.binary)
            .arg("-s")
            .arg(signal)
            .arg("-p")
            .arg(&self.prefix)
            .output()
            .await
            .map_err(|source| NginxError::Command { args: args.clone(), source })?;

        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
            warn!(signal, %stderr, "nginx signal failed");
            Err(NginxError::CommandFailed {
                args,
                status: output.status,
                stderr,
            })
        }
    }
}

/// Remove a file, treating absence as a no-op.
fn remove_if_present(path: &Path) -> Result<bool, NginxError> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(source) => Err(NginxError::Io { path: path.to_path_buf(), source }),
    }
}
