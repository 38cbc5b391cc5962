// Copyright (c) 2025 The Rampart Authors
// SPDX-License-Identifier: MIT

//! Kubernetes Event emission.
//!
//! Every controller shares one [`EventSink`]; events are best-effort and a
//! failed publish is logged, never propagated, so a flaky events endpoint
//! cannot wedge a reconcile.

use kube::runtime::events::{Event, EventType, Recorder, Reporter};
use kube::{Client, Resource};
use tracing::warn;

// Event reasons shared across the controllers.
pub const REASON_ADDED_OR_UPDATED: &str = "AddedOrUpdated";
pub const REASON_REJECTED: &str = "Rejected";
pub const REASON_NO_VIRTUAL_SERVER_FOUND: &str = "NoVirtualServerFound";
pub const REASON_BAD_CONFIG: &str = "BadConfig";
pub const REASON_CREATE_CERTIFICATE: &str = "CreateCertificate";
pub const REASON_UPDATE_CERTIFICATE: &str = "UpdateCertificate";
pub const REASON_DELETE_CERTIFICATE: &str = "DeleteCertificate";
pub const REASON_CREATE_DNS_ENDPOINT: &str = "CreateDNSEndpoint";
pub const REASON_UPDATE_DNS_ENDPOINT: &str = "UpdateDNSEndpoint";
pub const REASON_DYNAMIC_WEIGHTS_UNSUPPORTED: &str = "DynamicWeightsUnsupported";

/// Publishes Events attributed to the rampart controller.
#[derive(Clone)]
pub struct EventSink {
    recorder: Recorder,
}

impl EventSink {
    /// Create a sink reporting as `rampart`, instanced by pod name when
    /// known.
    #[must_use]
    pub fn new(client: Client, instance: Option<String>) -> Self {
        let reporter = Reporter {
            controller: "rampart".to_string(),
            instance,
        };
        Self {
            recorder: Recorder::new(client, reporter),
        }
    }

    /// Emit a Normal event against `obj`.
    pub async fn normal<K>(&self, obj: &K, reason: &str, message: String)
    where
        K: Resource<DynamicType = ()>,
    {
        self.publish(obj, EventType::Normal, reason, message).await;
    }

    /// Emit a Warning event against `obj`.
    pub async fn warning<K>(&self, obj: &K, reason: &str, message: String)
    where
        K: Resource<DynamicType = ()>,
    {
        self.publish(obj, EventType::Warning, reason, message).await;
    }

    async fn publish<K>(&self, obj: &K, type_: EventType, reason: &str, message: String)
    where
        K: Resource<DynamicType = ()>,
    {
        let event = Event {
            type_,
            reason: reason.to_string(),
            note: Some(message),
            action: "Reconcile".to_string(),
            secondary: None,
        };
        if let Err(e) = self.recorder.publish(&event, &obj.object_ref(&())).await {
            warn!(reason, error = %e, "Failed to publish event");
        }
    }
}
