// Copyright (c) 2025 The Rampart Authors
// SPDX-License-Identifier: MIT

//! Unit tests for `controllers/mod.rs`

#[cfg(test)]
mod tests {
    use super::super::run_worker;
    use crate::queue::WorkQueue;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    #[tokio::test]
    async fn test_worker_processes_and_requeues() {
        let queue = WorkQueue::new();
        queue.add("default/good");
        queue.add("default/bad");

        let seen = Arc::new(Mutex::new(Vec::<String>::new()));
        let log = Arc::clone(&seen);
        let worker = tokio::spawn(run_worker(Arc::clone(&queue), "test", move |key| {
            let log = Arc::clone(&log);
            async move {
                log.lock().unwrap().push(key.clone());
                if key.ends_with("bad") {
                    anyhow::bail!("boom");
                }
                Ok(())
            }
        }));

        tokio::time::sleep(Duration::from_millis(100)).await;
        queue.shut_down();
        worker.await.unwrap();

        let seen = seen.lock().unwrap();
        assert!(seen.contains(&"default/good".to_string()));
        assert!(seen.contains(&"default/bad".to_string()));
        // The failure is remembered for backoff, the success is forgotten.
        assert_eq!(queue.num_requeues("default/bad"), 1);
        assert_eq!(queue.num_requeues("default/good"), 0);
    }

    #[tokio::test]
    async fn test_worker_exits_on_shutdown() {
        let queue = WorkQueue::new();
        queue.shut_down();
        run_worker(queue, "test", |_key| async { Ok(()) }).await;
    }
}
