// Copyright (c) 2025 The Rampart Authors
// SPDX-License-Identifier: MIT

//! Dynamic management of watched namespaces.
//!
//! In label-selector mode the controller does not know its namespaces up
//! front: a Namespace watcher adds an [`InformerGroup`] when a namespace
//! gains the selector label and tears it down when the namespace loses the
//! label or is deleted. In static mode the set is fixed at startup.
//!
//! Work queued for a namespace that has since been removed resolves against
//! an absent group and becomes a no-op; nothing cancels in-flight keys.

use futures::StreamExt;
use k8s_openapi::api::core::v1::Namespace;
use kube::runtime::{watcher, WatchStreamExt};
use kube::{Api, Client, ResourceExt};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::store::InformerGroup;

/// Callback invoked with every newly created group, before its watchers
/// start. Controllers use it to attach their event handlers.
pub type GroupHook = Box<dyn Fn(&Arc<InformerGroup>) + Send + Sync>;

/// Owns the informer groups for all currently watched namespaces.
pub struct NamespaceManager {
    client: Client,
    groups: RwLock<HashMap<String, Arc<InformerGroup>>>,
    hooks: RwLock<Vec<GroupHook>>,
}

impl NamespaceManager {
    #[must_use]
    pub fn new(client: Client) -> Arc<Self> {
        Arc::new(Self {
            client,
            groups: RwLock::new(HashMap::new()),
            hooks: RwLock::new(Vec::new()),
        })
    }

    /// Register a hook that runs for every group before its watchers start.
    ///
    /// Must be called before any namespace is added; groups created earlier
    /// never see the hook.
    pub fn on_group_created<F>(&self, hook: F)
    where
        F: Fn(&Arc<InformerGroup>) + Send + Sync + 'static,
    {
        self.hooks
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(Box::new(hook));
    }

    /// The informer group for a namespace, if it is currently watched.
    #[must_use]
    pub fn get(&self, namespace: &str) -> Option<Arc<InformerGroup>> {
        self.groups
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(namespace)
            .cloned()
    }

    /// All currently watched groups.
    #[must_use]
    pub fn all(&self) -> Vec<Arc<InformerGroup>> {
        self.groups
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    /// Whether every watched namespace has completed its initial list.
    #[must_use]
    pub fn has_synced(&self) -> bool {
        self.all().iter().all(|group| group.has_synced())
    }

    /// Start watching a namespace. Idempotent.
    pub fn add_namespace(&self, namespace: &str) {
        {
            let groups = self
                .groups
                .read()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            if groups.contains_key(namespace) {
                return;
            }
        }

        info!(namespace = %namespace, "Watching namespace");
        let group = InformerGroup::new(namespace);
        {
            let hooks = self
                .hooks
                .read()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            for hook in hooks.iter() {
                hook(&group);
            }
        }
        group.start(&self.client);

        let mut groups = self
            .groups
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        groups.entry(namespace.to_string()).or_insert(group);
    }

    /// Stop watching a namespace and drop its caches. Idempotent.
    pub fn remove_namespace(&self, namespace: &str) {
        let removed = {
            let mut groups = self
                .groups
                .write()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            groups.remove(namespace)
        };
        if let Some(group) = removed {
            info!(namespace = %namespace, "Unwatching namespace");
            group.stop();
        }
    }

    /// Watch Namespace objects matching `label_selector` and keep the group
    /// set in step with them. Runs until the stop signal fires.
    pub async fn run_label_watcher(
        self: Arc<Self>,
        label_selector: String,
        mut stop: watch::Receiver<bool>,
    ) {
        let api: Api<Namespace> = Api::all(self.client.clone());
        let config = watcher::Config::default().labels(&label_selector);
        let mut stream = watcher(api, config).default_backoff().boxed();

        debug!(selector = %label_selector, "Starting namespace label watcher");
        loop {
            tokio::select! {
                event = stream.next() => match event {
                    Some(Ok(event)) => self.apply_namespace_event(event),
                    Some(Err(e)) => {
                        warn!(error = %e, "Namespace watch error, backing off");
                    }
                    None => {
                        warn!("Namespace watch stream ended unexpectedly");
                        return;
                    }
                },
                _ = stop.changed() => {
                    debug!("Namespace label watcher stopping");
                    return;
                }
            }
        }
    }

    fn apply_namespace_event(&self, event: watcher::Event<Namespace>) {
        match event {
            watcher::Event::Apply(ns) | watcher::Event::InitApply(ns) => {
                self.add_namespace(&ns.name_any());
            }
            watcher::Event::Delete(ns) => {
                self.remove_namespace(&ns.name_any());
            }
            watcher::Event::Init | watcher::Event::InitDone => {}
        }
    }
}

#[cfg(test)]
#[path = "namespaces_tests.rs"]
mod namespaces_tests;
