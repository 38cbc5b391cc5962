// Copyright (c) 2025 The Rampart Authors
// SPDX-License-Identifier: MIT

//! Status subresource writes.
//!
//! Validation status (`state`/`reason`/`message`) describes this replica's
//! own view and may be written by any replica. `externalEndpoints` names
//! the fleet's public address and is written by the leader only; callers
//! gate on the leadership watch before invoking
//! [`write_external_endpoints`].
//!
//! Writes go through merge patches on the status subresource so concurrent
//! writers never clobber fields they do not own.

use anyhow::Result;
use k8s_openapi::NamespaceResourceScope;
use kube::api::{Patch, PatchParams};
use kube::{Api, Client, Resource};
use serde::de::DeserializeOwned;
use serde_json::json;
use std::fmt::Debug;
use tracing::debug;

use super::retry::retry_api_call;
use crate::crd::{ExternalEndpoint, ResourceState};

/// The merge-patch body for a validation status write.
#[must_use]
pub fn validation_patch(
    state: &ResourceState,
    reason: &str,
    message: &str,
) -> serde_json::Value {
    json!({
        "status": {
            "state": state.to_string(),
            "reason": reason,
            "message": message,
        }
    })
}

/// The merge-patch body for a leader endpoint write.
#[must_use]
pub fn endpoints_patch(endpoints: &[ExternalEndpoint]) -> serde_json::Value {
    json!({
        "status": {
            "externalEndpoints": endpoints,
        }
    })
}

/// Whether a status write would change anything.
///
/// Suppressing no-op writes keeps resync storms from generating API
/// traffic.
#[must_use]
pub fn status_changed(
    current: Option<(&ResourceState, Option<&str>, Option<&str>)>,
    state: &ResourceState,
    reason: &str,
    message: &str,
) -> bool {
    match current {
        None => true,
        Some((cur_state, cur_reason, cur_message)) => {
            cur_state != state || cur_reason != Some(reason) || cur_message != Some(message)
        }
    }
}

/// Write the validation status of a namespaced resource.
///
/// # Errors
///
/// Returns an error when the patch fails after retries.
pub async fn write_validation_status<K>(
    client: &Client,
    namespace: &str,
    name: &str,
    state: &ResourceState,
    reason: &str,
    message: &str,
) -> Result<()>
where
    K: Resource<DynamicType = (), Scope = NamespaceResourceScope>
        + Clone
        + DeserializeOwned
        + Debug,
{
    debug!(
        kind = %K::kind(&()),
        namespace,
        name,
        state = %state,
        reason,
        "Writing validation status"
    );
    let api: Api<K> = Api::namespaced(client.clone(), namespace);
    let patch = validation_patch(state, reason, message);
    let name = name.to_string();
    retry_api_call(
        move || {
            let api = api.clone();
            let patch = patch.clone();
            let name = name.clone();
            async move {
                api.patch_status(&name, &PatchParams::default(), &Patch::Merge(&patch))
                    .await
            }
        },
        "patch_status",
    )
    .await?;
    Ok(())
}

/// Write the fleet's external endpoints. Leader only.
///
/// # Errors
///
/// Returns an error when the patch fails after retries.
pub async fn write_external_endpoints<K>(
    client: &Client,
    namespace: &str,
    name: &str,
    endpoints: &[ExternalEndpoint],
) -> Result<()>
where
    K: Resource<DynamicType = (), Scope = NamespaceResourceScope>
        + Clone
        + DeserializeOwned
        + Debug,
{
    debug!(
        kind = %K::kind(&()),
        namespace,
        name,
        count = endpoints.len(),
        "Writing external endpoints"
    );
    let api: Api<K> = Api::namespaced(client.clone(), namespace);
    let patch = endpoints_patch(endpoints);
    let name = name.to_string();
    retry_api_call(
        move || {
            let api = api.clone();
            let patch = patch.clone();
            let name = name.clone();
            async move {
                api.patch_status(&name, &PatchParams::default(), &Patch::Merge(&patch))
                    .await
            }
        },
        "patch_external_endpoints",
    )
    .await?;
    Ok(())
}

#[cfg(test)]
#[path = "status_tests.rs"]
mod status_tests;
