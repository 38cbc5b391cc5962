// Copyright (c) 2025 The Rampart Authors
// SPDX-License-Identifier: MIT

//! cert-manager shim: materialises `tls.certManager` stanzas on
//! VirtualServers into cert-manager Certificate objects.
//!
//! Reconciliation converges on exactly the set of Certificates the current
//! spec calls for: a secret rename creates the new Certificate and deletes
//! the orphan; removing the stanza deletes everything owned. The shim never
//! touches a Certificate whose controller owner reference is not the
//! VirtualServer being reconciled.

use anyhow::Result;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::api::{DeleteParams, Patch, PatchParams, PostParams};
use kube::{Api, Client, Resource, ResourceExt};
use std::collections::BTreeMap;
use tracing::{debug, warn};

use super::events::{
    EventSink, REASON_BAD_CONFIG, REASON_CREATE_CERTIFICATE, REASON_DELETE_CERTIFICATE,
    REASON_UPDATE_CERTIFICATE,
};
use super::retry::retry_api_call;
use crate::crd::{Certificate, CertificateSpec, CertManager, IssuerRef, VirtualServer};
use crate::store::Cache;

/// Annotation requesting a temporary self-signed certificate while the
/// real one is pending.
const TEMP_CERT_ANNOTATION: &str = "cert-manager.io/issue-temporary-certificate";

/// Default key usages on generated certificates.
const DEFAULT_USAGES: [&str; 2] = ["digital signature", "key encipherment"];

/// Controller owner reference pointing at `vs`.
#[must_use]
pub fn owner_reference(vs: &VirtualServer) -> OwnerReference {
    OwnerReference {
        api_version: VirtualServer::api_version(&()).into_owned(),
        kind: VirtualServer::kind(&()).into_owned(),
        name: vs.name_any(),
        uid: vs.meta().uid.clone().unwrap_or_default(),
        controller: Some(true),
        block_owner_deletion: None,
    }
}

/// Whether the owner references name a controller owner with `vs_uid`.
#[must_use]
pub fn is_owned_by_uid(refs: &[OwnerReference], vs_uid: &str) -> bool {
    refs.iter()
        .any(|or| or.controller == Some(true) && or.uid == vs_uid)
}

/// The issuer reference a `certManager` stanza translates to.
///
/// Assumes the stanza already passed validation: exactly one of `issuer`
/// and `clusterIssuer` set, and `clusterIssuer` without kind or group
/// overrides.
#[must_use]
pub fn issuer_ref(cm: &CertManager) -> IssuerRef {
    if let Some(cluster_issuer) = &cm.cluster_issuer {
        IssuerRef {
            name: cluster_issuer.clone(),
            kind: Some("ClusterIssuer".to_string()),
            group: None,
        }
    } else {
        IssuerRef {
            name: cm.issuer.clone().unwrap_or_default(),
            kind: Some(cm.issuer_kind.clone().unwrap_or_else(|| "Issuer".to_string())),
            group: cm.issuer_group.clone(),
        }
    }
}

/// Build the Certificate this VirtualServer calls for, if any.
///
/// Returns `None` when the spec carries no `certManager` stanza or no
/// target secret.
#[must_use]
pub fn desired_certificate(vs: &VirtualServer) -> Option<Certificate> {
    let tls = vs.spec.tls.as_ref()?;
    let cm = tls.cert_manager.as_ref()?;
    let secret = tls.secret.as_ref()?;

    let mut cert = Certificate::new(
        secret,
        CertificateSpec {
            secret_name: secret.clone(),
            dns_names: vec![vs.spec.host.clone()],
            common_name: cm.common_name.clone(),
            duration: cm.duration.clone(),
            renew_before: cm.renew_before.clone(),
            usages: Some(
                cm.usages
                    .clone()
                    .unwrap_or_else(|| DEFAULT_USAGES.iter().map(ToString::to_string).collect()),
            ),
            issuer_ref: issuer_ref(cm),
        },
    );
    cert.metadata.namespace = vs.namespace();
    cert.metadata.owner_references = Some(vec![owner_reference(vs)]);
    if let Some(temp) = cm.issue_temp_cert {
        let mut annotations = BTreeMap::new();
        annotations.insert(TEMP_CERT_ANNOTATION.to_string(), temp.to_string());
        cert.metadata.annotations = Some(annotations);
    }
    Some(cert)
}

/// Field-wise equality over everything the shim manages.
///
/// cert-manager mutates fields the shim does not own, so a full spec
/// compare would patch forever.
#[must_use]
pub fn certificates_equal(existing: &Certificate, desired: &Certificate) -> bool {
    existing.name_any() == desired.name_any()
        && existing.metadata.labels == desired.metadata.labels
        && existing.spec.common_name == desired.spec.common_name
        && existing.spec.dns_names == desired.spec.dns_names
        && existing.spec.secret_name == desired.spec.secret_name
        && existing.spec.issuer_ref.name == desired.spec.issuer_ref.name
        && existing.spec.issuer_ref.kind == desired.spec.issuer_ref.kind
}

/// Whether the `certManager` stanza is usable at reconcile time.
fn issuer_config_error(cm: &CertManager) -> Option<&'static str> {
    match (&cm.issuer, &cm.cluster_issuer) {
        (None, None) => Some("one of issuer or clusterIssuer must be set"),
        (Some(_), Some(_)) => Some("issuer and clusterIssuer are mutually exclusive"),
        (None, Some(_)) if cm.issuer_kind.is_some() || cm.issuer_group.is_some() => {
            Some("clusterIssuer cannot be combined with issuerKind or issuerGroup")
        }
        _ => None,
    }
}

/// Reconcile the Certificates owned by one VirtualServer.
///
/// # Errors
///
/// Returns an error on API failures, including `AlreadyExists` races on
/// create; the worker requeues and the next pass finds the object.
pub async fn sync_certificates(
    client: &Client,
    events: &EventSink,
    vs: &VirtualServer,
    certificates: &Cache<Certificate>,
) -> Result<()> {
    let namespace = vs.namespace().unwrap_or_default();
    let vs_uid = vs.meta().uid.clone().unwrap_or_default();
    let api: Api<Certificate> = Api::namespaced(client.clone(), &namespace);

    let desired = match vs.spec.tls.as_ref().and_then(|tls| tls.cert_manager.as_ref()) {
        Some(cm) => {
            if let Some(problem) = issuer_config_error(cm) {
                events
                    .warning(vs, REASON_BAD_CONFIG, problem.to_string())
                    .await;
                return Ok(());
            }
            desired_certificate(vs)
        }
        None => None,
    };

    // Delete owned certificates the spec no longer references. Covers both
    // secret renames and removal of the whole stanza.
    let keep = desired.as_ref().map(kube::ResourceExt::name_any);
    for cert in certificates.list() {
        if !is_owned_by_uid(cert.owner_references(), &vs_uid) {
            continue;
        }
        if keep.as_deref() == Some(cert.name_any().as_str()) {
            continue;
        }
        let name = cert.name_any();
        debug!(namespace = %namespace, certificate = %name, "Deleting orphaned certificate");
        match api.delete(&name, &DeleteParams::default()).await {
            Ok(_) => {
                events
                    .normal(vs, REASON_DELETE_CERTIFICATE, format!("Deleted Certificate {name}"))
                    .await;
            }
            Err(kube::Error::Api(e)) if e.code == 404 => {}
            Err(e) => return Err(e.into()),
        }
    }

    let Some(desired) = desired else {
        return Ok(());
    };
    let name = desired.name_any();

    match certificates.get(&namespace, &name) {
        None => {
            debug!(namespace = %namespace, certificate = %name, "Creating certificate");
            retry_api_call(
                || {
                    let api = api.clone();
                    let desired = desired.clone();
                    async move { api.create(&PostParams::default(), &desired).await }
                },
                "create_certificate",
            )
            .await?;
            events
                .normal(vs, REASON_CREATE_CERTIFICATE, format!("Created Certificate {name}"))
                .await;
        }
        Some(existing) if !is_owned_by_uid(existing.owner_references(), &vs_uid) => {
            warn!(
                namespace = %namespace,
                certificate = %name,
                "Certificate exists but is not owned by this VirtualServer, refusing to adopt"
            );
        }
        Some(existing) if certificates_equal(&existing, &desired) => {}
        Some(_) => {
            debug!(namespace = %namespace, certificate = %name, "Updating certificate");
            let patch = serde_json::json!({
                "metadata": { "labels": desired.metadata.labels },
                "spec": desired.spec,
            });
            retry_api_call(
                || {
                    let api = api.clone();
                    let patch = patch.clone();
                    let name = name.clone();
                    async move {
                        api.patch(&name, &PatchParams::default(), &Patch::Merge(&patch))
                            .await
                    }
                },
                "patch_certificate",
            )
            .await?;
            events
                .normal(vs, REASON_UPDATE_CERTIFICATE, format!("Updated Certificate {name}"))
                .await;
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "certshim_tests.rs"]
mod certshim_tests;
