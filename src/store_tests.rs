// Copyright (c) 2025 The Rampart Authors
// SPDX-License-Identifier: MIT

//! Unit tests for `store.rs`

#[cfg(test)]
mod tests {
    use super::super::{object_key, split_key, Cache, CacheEvent};
    use crate::crd::{VirtualServer, VirtualServerSpec};
    use kube::runtime::watcher;
    use std::sync::{Arc, Mutex};

    fn vs(namespace: &str, name: &str, host: &str) -> VirtualServer {
        let mut vs = VirtualServer::new(
            name,
            VirtualServerSpec {
                host: host.to_string(),
                tls: None,
                upstreams: vec![],
                routes: vec![],
                external_dns: None,
                policies: None,
                listener: None,
            },
        );
        vs.metadata.namespace = Some(namespace.to_string());
        vs
    }

    /// Shorthand describing dispatched events for assertions
    #[derive(Debug, PartialEq, Eq)]
    enum Seen {
        Added(String),
        Updated(String),
        Deleted(String),
    }

    fn recording_cache() -> (Arc<Cache<VirtualServer>>, Arc<Mutex<Vec<Seen>>>) {
        let cache = Arc::new(Cache::new());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        cache.add_handler(move |event: &CacheEvent<VirtualServer>| {
            let name = event.latest().metadata.name.clone().unwrap_or_default();
            let entry = match event {
                CacheEvent::Added(_) => Seen::Added(name),
                CacheEvent::Updated { .. } => Seen::Updated(name),
                CacheEvent::Deleted(_) => Seen::Deleted(name),
            };
            sink.lock().unwrap().push(entry);
        });
        (cache, seen)
    }

    #[test]
    fn test_object_key_round_trip() {
        let key = object_key("default", "cafe");
        assert_eq!(key, "default/cafe");
        assert_eq!(split_key(&key), Some(("default", "cafe")));
        assert_eq!(split_key("no-slash"), None);
    }

    /// First apply dispatches Added, a changed object dispatches Updated
    #[test]
    fn test_added_then_updated() {
        let (cache, seen) = recording_cache();

        cache.apply(watcher::Event::Apply(vs("default", "cafe", "cafe.example.com")));
        cache.apply(watcher::Event::Apply(vs("default", "cafe", "tea.example.com")));

        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                Seen::Added("cafe".to_string()),
                Seen::Updated("cafe".to_string())
            ]
        );
        let cached = cache.get("default", "cafe").unwrap();
        assert_eq!(cached.spec.host, "tea.example.com");
    }

    /// An apply carrying an identical object dispatches nothing
    #[test]
    fn test_identical_update_suppressed() {
        let (cache, seen) = recording_cache();

        cache.apply(watcher::Event::Apply(vs("default", "cafe", "cafe.example.com")));
        cache.apply(watcher::Event::Apply(vs("default", "cafe", "cafe.example.com")));

        assert_eq!(*seen.lock().unwrap(), vec![Seen::Added("cafe".to_string())]);
    }

    /// Deletion dispatches the last cached state as tombstone
    #[test]
    fn test_delete_carries_tombstone() {
        let cache: Arc<Cache<VirtualServer>> = Arc::new(Cache::new());
        let tombstone_host = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&tombstone_host);
        cache.add_handler(move |event: &CacheEvent<VirtualServer>| {
            if let CacheEvent::Deleted(obj) = event {
                *sink.lock().unwrap() = Some(obj.spec.host.clone());
            }
        });

        cache.apply(watcher::Event::Apply(vs("default", "cafe", "cafe.example.com")));
        // The delete event carries a stripped object; the cached state wins.
        cache.apply(watcher::Event::Delete(vs("default", "cafe", "")));

        assert_eq!(
            tombstone_host.lock().unwrap().as_deref(),
            Some("cafe.example.com")
        );
        assert!(cache.get("default", "cafe").is_none());
    }

    /// Objects missing from a relist are deleted with tombstones
    #[test]
    fn test_relist_recovers_missed_deletes() {
        let (cache, seen) = recording_cache();

        cache.apply(watcher::Event::Apply(vs("default", "cafe", "cafe.example.com")));
        cache.apply(watcher::Event::Apply(vs("default", "tea", "tea.example.com")));
        seen.lock().unwrap().clear();

        // Relist observes only "cafe": "tea" was deleted while disconnected.
        cache.apply(watcher::Event::Init);
        cache.apply(watcher::Event::InitApply(vs(
            "default",
            "cafe",
            "cafe.example.com",
        )));
        cache.apply(watcher::Event::InitDone);

        assert_eq!(
            *seen.lock().unwrap(),
            vec![Seen::Deleted("tea".to_string())]
        );
        assert!(cache.get("default", "tea").is_none());
        assert!(cache.get("default", "cafe").is_some());
    }

    /// has_synced flips only once the initial list completes
    #[test]
    fn test_has_synced_after_init_done() {
        let cache: Cache<VirtualServer> = Cache::new();
        assert!(!cache.has_synced());

        cache.apply(watcher::Event::Init);
        cache.apply(watcher::Event::InitApply(vs(
            "default",
            "cafe",
            "cafe.example.com",
        )));
        assert!(!cache.has_synced(), "Synced only after InitDone");

        cache.apply(watcher::Event::InitDone);
        assert!(cache.has_synced());
        assert_eq!(cache.len(), 1);
    }

    /// list() returns every cached object
    #[test]
    fn test_list() {
        let cache: Cache<VirtualServer> = Cache::new();
        cache.apply(watcher::Event::Apply(vs("default", "cafe", "cafe.example.com")));
        cache.apply(watcher::Event::Apply(vs("default", "tea", "tea.example.com")));

        let mut hosts: Vec<String> = cache.list().iter().map(|v| v.spec.host.clone()).collect();
        hosts.sort();
        assert_eq!(hosts, vec!["cafe.example.com", "tea.example.com"]);
    }
}
