// Copyright (c) 2025 The Rampart Authors
// SPDX-License-Identifier: MIT

//! Unit tests for `namespaces.rs`

#[cfg(test)]
mod tests {
    use super::super::NamespaceManager;
    use kube::{Client, Config};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    async fn offline_client() -> Client {
        // Watchers started against this server fail and back off; the
        // manager's bookkeeping is what these tests exercise.
        let server = wiremock::MockServer::start().await;
        let config = Config::new(server.uri().parse().unwrap());
        Client::try_from(config).unwrap()
    }

    #[tokio::test]
    async fn test_add_and_remove_namespace() {
        let manager = NamespaceManager::new(offline_client().await);

        manager.add_namespace("team-a");
        assert!(manager.get("team-a").is_some());
        assert!(manager.get("team-b").is_none());
        assert_eq!(manager.all().len(), 1);

        manager.remove_namespace("team-a");
        assert!(manager.get("team-a").is_none());
        assert!(manager.all().is_empty());
    }

    #[tokio::test]
    async fn test_add_is_idempotent() {
        let manager = NamespaceManager::new(offline_client().await);
        manager.add_namespace("team-a");
        let first = manager.get("team-a").unwrap();
        manager.add_namespace("team-a");
        assert!(Arc::ptr_eq(&first, &manager.get("team-a").unwrap()));
    }

    #[tokio::test]
    async fn test_remove_unknown_is_noop() {
        let manager = NamespaceManager::new(offline_client().await);
        manager.remove_namespace("ghost");
        assert!(manager.all().is_empty());
    }

    /// Hooks run once per created group, before its watchers start.
    #[tokio::test]
    async fn test_group_hook_runs_once_per_group() {
        let manager = NamespaceManager::new(offline_client().await);
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        manager.on_group_created(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        manager.add_namespace("team-a");
        manager.add_namespace("team-a");
        manager.add_namespace("team-b");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
