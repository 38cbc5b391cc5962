// Copyright (c) 2025 The Rampart Authors
// SPDX-License-Identifier: MIT

//! Typed, namespace-scoped resource caches backed by list-watch streams.
//!
//! Each watched namespace owns one [`InformerGroup`]: a set of [`Cache`]s,
//! one per watched kind, each fed by a `kube::runtime::watcher` stream. The
//! caches are eventually consistent with the API server; downstream
//! components must tolerate stale reads.
//!
//! # Event dispatch
//!
//! Handlers registered on a cache run inline on the watcher task and must be
//! non-suspending. Update events are suppressed when the old and new objects
//! compare equal, so a resync never floods the work queues. Deletion events
//! carry the last-known object state (tombstone recovery covers deletes
//! missed across a relist).

use futures::StreamExt;
use k8s_openapi::api::core::v1::{Endpoints, Secret};
use k8s_openapi::api::networking::v1::Ingress;
use kube::runtime::{watcher, WatchStreamExt};
use kube::{Api, Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use std::collections::{HashMap, HashSet};
use std::fmt::Debug;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::crd::{
    Certificate, DNSEndpoint, GlobalConfiguration, Policy, ProtectedResource, TransportServer,
    VirtualServer, VirtualServerRoute,
};

/// Build the canonical `namespace/name` key for an object.
#[must_use]
pub fn object_key(namespace: &str, name: &str) -> String {
    format!("{namespace}/{name}")
}

/// Split a `namespace/name` key back into its parts.
#[must_use]
pub fn split_key(key: &str) -> Option<(&str, &str)> {
    key.split_once('/')
}

/// A change observed by a cache and dispatched to its handlers.
#[derive(Clone, Debug)]
pub enum CacheEvent<K> {
    /// A previously unseen object appeared.
    Added(Arc<K>),
    /// An object changed. Suppressed when `old == new`.
    Updated {
        /// The previously cached state.
        old: Arc<K>,
        /// The newly observed state.
        new: Arc<K>,
    },
    /// An object disappeared. Carries the last-known state (tombstone).
    Deleted(Arc<K>),
}

impl<K> CacheEvent<K> {
    /// The most recent object state carried by this event.
    #[must_use]
    pub fn latest(&self) -> &Arc<K> {
        match self {
            CacheEvent::Added(obj) | CacheEvent::Deleted(obj) => obj,
            CacheEvent::Updated { new, .. } => new,
        }
    }
}

type Handler<K> = Box<dyn Fn(&CacheEvent<K>) + Send + Sync>;

/// A typed cache of one resource kind within one namespace.
pub struct Cache<K> {
    objects: RwLock<HashMap<String, Arc<K>>>,
    handlers: RwLock<Vec<Handler<K>>>,
    synced: AtomicBool,
    /// Keys seen during the current relist, for tombstone recovery.
    relist_seen: Mutex<Option<HashSet<String>>>,
}

impl<K> Default for Cache<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K> Cache<K> {
    /// Create an empty, unsynced cache.
    #[must_use]
    pub fn new() -> Self {
        Self {
            objects: RwLock::new(HashMap::new()),
            handlers: RwLock::new(Vec::new()),
            synced: AtomicBool::new(false),
            relist_seen: Mutex::new(None),
        }
    }

    /// Whether the initial list has completed.
    #[must_use]
    pub fn has_synced(&self) -> bool {
        self.synced.load(Ordering::Acquire)
    }

    /// Register an event handler. Handlers run inline on the watcher task.
    pub fn add_handler<F>(&self, handler: F)
    where
        F: Fn(&CacheEvent<K>) + Send + Sync + 'static,
    {
        self.handlers
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(Box::new(handler));
    }

    fn dispatch(&self, event: &CacheEvent<K>) {
        let handlers = self
            .handlers
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        for handler in handlers.iter() {
            handler(event);
        }
    }
}

impl<K> Cache<K>
where
    K: Resource<DynamicType = ()> + Clone,
{
    /// Look up an object by namespace and name.
    #[must_use]
    pub fn get(&self, namespace: &str, name: &str) -> Option<Arc<K>> {
        self.objects
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(&object_key(namespace, name))
            .cloned()
    }

    /// List all cached objects.
    #[must_use]
    pub fn list(&self) -> Vec<Arc<K>> {
        self.objects
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    /// Number of cached objects.
    #[must_use]
    pub fn len(&self) -> usize {
        self.objects
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    /// Whether the cache holds no objects.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<K> Cache<K>
where
    K: Resource<DynamicType = ()> + Clone + PartialEq,
{
    /// Apply one watcher event to the cache and dispatch the resulting
    /// [`CacheEvent`]s.
    pub fn apply(&self, event: watcher::Event<K>) {
        match event {
            watcher::Event::Init => {
                let mut seen = self
                    .relist_seen
                    .lock()
                    .unwrap_or_else(std::sync::PoisonError::into_inner);
                *seen = Some(HashSet::new());
            }
            watcher::Event::InitApply(obj) => {
                let key = object_key(&obj.namespace().unwrap_or_default(), &obj.name_any());
                {
                    let mut seen = self
                        .relist_seen
                        .lock()
                        .unwrap_or_else(std::sync::PoisonError::into_inner);
                    if let Some(seen) = seen.as_mut() {
                        seen.insert(key.clone());
                    }
                }
                self.upsert(key, obj);
            }
            watcher::Event::InitDone => {
                self.finish_relist();
                self.synced.store(true, Ordering::Release);
            }
            watcher::Event::Apply(obj) => {
                let key = object_key(&obj.namespace().unwrap_or_default(), &obj.name_any());
                self.upsert(key, obj);
            }
            watcher::Event::Delete(obj) => {
                let key = object_key(&obj.namespace().unwrap_or_default(), &obj.name_any());
                let cached = {
                    let mut objects = self
                        .objects
                        .write()
                        .unwrap_or_else(std::sync::PoisonError::into_inner);
                    objects.remove(&key)
                };
                // Prefer the cached state as tombstone: the delete event may
                // carry a partial final object.
                let tombstone = cached.unwrap_or_else(|| Arc::new(obj));
                self.dispatch(&CacheEvent::Deleted(tombstone));
            }
        }
    }

    fn upsert(&self, key: String, obj: K) {
        let new = Arc::new(obj);
        let old = {
            let mut objects = self
                .objects
                .write()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            objects.insert(key, Arc::clone(&new))
        };
        match old {
            Some(old) if *old == *new => {
                trace!("Suppressing no-op update event");
            }
            Some(old) => self.dispatch(&CacheEvent::Updated { old, new }),
            None => self.dispatch(&CacheEvent::Added(new)),
        }
    }

    /// Emit tombstones for objects that disappeared across a relist.
    fn finish_relist(&self) {
        let seen = {
            let mut seen = self
                .relist_seen
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            seen.take()
        };
        let Some(seen) = seen else { return };

        let missed: Vec<Arc<K>> = {
            let mut objects = self
                .objects
                .write()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            let gone: Vec<String> = objects
                .keys()
                .filter(|key| !seen.contains(*key))
                .cloned()
                .collect();
            gone.iter().filter_map(|key| objects.remove(key)).collect()
        };
        for tombstone in missed {
            debug!("Recovering missed delete via relist tombstone");
            self.dispatch(&CacheEvent::Deleted(tombstone));
        }
    }
}

/// Drive a watcher stream into a cache until the stop signal fires.
pub async fn run_watcher<K>(
    api: Api<K>,
    cache: Arc<Cache<K>>,
    mut stop: watch::Receiver<bool>,
) where
    K: Resource<DynamicType = ()>
        + Clone
        + DeserializeOwned
        + Debug
        + PartialEq
        + Send
        + Sync
        + 'static,
{
    let mut stream = watcher(api, watcher::Config::default())
        .default_backoff()
        .boxed();

    loop {
        tokio::select! {
            event = stream.next() => match event {
                Some(Ok(event)) => cache.apply(event),
                Some(Err(e)) => {
                    warn!(error = %e, "Watch stream error, backing off");
                }
                None => {
                    warn!("Watch stream ended unexpectedly");
                    return;
                }
            },
            _ = stop.changed() => {
                debug!("Watcher stopping");
                return;
            }
        }
    }
}

/// All caches for one watched namespace.
///
/// Construction registers no watchers; callers attach handlers first, then
/// call [`InformerGroup::start`]. Stopping closes the shared stop channel,
/// ending every watcher task in the group.
pub struct InformerGroup {
    /// The namespace this group watches.
    pub namespace: String,

    pub virtual_servers: Arc<Cache<VirtualServer>>,
    pub virtual_server_routes: Arc<Cache<VirtualServerRoute>>,
    pub transport_servers: Arc<Cache<TransportServer>>,
    pub policies: Arc<Cache<Policy>>,
    pub global_configurations: Arc<Cache<GlobalConfiguration>>,
    pub protected_resources: Arc<Cache<ProtectedResource>>,
    pub ingresses: Arc<Cache<Ingress>>,
    pub secrets: Arc<Cache<Secret>>,
    pub endpoints: Arc<Cache<Endpoints>>,
    pub certificates: Arc<Cache<Certificate>>,
    pub dns_endpoints: Arc<Cache<DNSEndpoint>>,

    stop_tx: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl InformerGroup {
    /// Create the caches for a namespace without starting any watchers.
    #[must_use]
    pub fn new(namespace: &str) -> Arc<Self> {
        let (stop_tx, _) = watch::channel(false);
        Arc::new(Self {
            namespace: namespace.to_string(),
            virtual_servers: Arc::new(Cache::new()),
            virtual_server_routes: Arc::new(Cache::new()),
            transport_servers: Arc::new(Cache::new()),
            policies: Arc::new(Cache::new()),
            global_configurations: Arc::new(Cache::new()),
            protected_resources: Arc::new(Cache::new()),
            ingresses: Arc::new(Cache::new()),
            secrets: Arc::new(Cache::new()),
            endpoints: Arc::new(Cache::new()),
            certificates: Arc::new(Cache::new()),
            dns_endpoints: Arc::new(Cache::new()),
            stop_tx,
            tasks: Mutex::new(Vec::new()),
        })
    }

    /// Spawn one watcher task per kind.
    pub fn start(&self, client: &Client) {
        let ns = &self.namespace;
        debug!(namespace = %ns, "Starting informer group");

        let mut tasks = self
            .tasks
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        macro_rules! spawn_watcher {
            ($kind:ty, $cache:expr) => {
                tasks.push(tokio::spawn(run_watcher(
                    Api::<$kind>::namespaced(client.clone(), ns),
                    Arc::clone(&$cache),
                    self.stop_tx.subscribe(),
                )));
            };
        }

        spawn_watcher!(VirtualServer, self.virtual_servers);
        spawn_watcher!(VirtualServerRoute, self.virtual_server_routes);
        spawn_watcher!(TransportServer, self.transport_servers);
        spawn_watcher!(Policy, self.policies);
        spawn_watcher!(GlobalConfiguration, self.global_configurations);
        spawn_watcher!(ProtectedResource, self.protected_resources);
        spawn_watcher!(Ingress, self.ingresses);
        spawn_watcher!(Secret, self.secrets);
        spawn_watcher!(Endpoints, self.endpoints);
        spawn_watcher!(Certificate, self.certificates);
        spawn_watcher!(DNSEndpoint, self.dns_endpoints);
    }

    /// Whether every cache in the group has completed its initial list.
    #[must_use]
    pub fn has_synced(&self) -> bool {
        self.virtual_servers.has_synced()
            && self.virtual_server_routes.has_synced()
            && self.transport_servers.has_synced()
            && self.policies.has_synced()
            && self.global_configurations.has_synced()
            && self.protected_resources.has_synced()
            && self.ingresses.has_synced()
            && self.secrets.has_synced()
            && self.endpoints.has_synced()
            && self.certificates.has_synced()
            && self.dns_endpoints.has_synced()
    }

    /// Poll until every cache is synced or the timeout elapses.
    ///
    /// Returns `true` on sync, `false` on timeout.
    pub async fn wait_for_sync(&self, timeout: std::time::Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        while !self.has_synced() {
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        }
        true
    }

    /// Signal every watcher in the group to stop.
    pub fn stop(&self) {
        debug!(namespace = %self.namespace, "Stopping informer group");
        let _ = self.stop_tx.send(true);
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod store_tests;
