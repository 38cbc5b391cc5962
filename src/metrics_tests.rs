// Copyright (c) 2025 The Rampart Authors
// SPDX-License-Identifier: MIT

//! Unit tests for `metrics.rs`

#[cfg(test)]
mod tests {
    use super::super::{
        gather_metrics, record_reload_success, record_sync, set_leader_status, set_queue_depth,
        LEADER_STATUS, QUEUE_DEPTH, RELOADS_TOTAL, SYNCS_TOTAL, SYNC_DURATION_SECONDS,
    };
    use std::time::Duration;

    #[test]
    fn test_record_sync() {
        record_sync("main", true, Duration::from_millis(50));
        record_sync("main", false, Duration::from_millis(10));

        assert!(SYNCS_TOTAL.with_label_values(&["main", "success"]).get() > 0.0);
        assert!(SYNCS_TOTAL.with_label_values(&["main", "error"]).get() > 0.0);
        assert!(
            SYNC_DURATION_SECONDS
                .with_label_values(&["main"])
                .get_sample_count()
                > 0
        );
    }

    #[test]
    fn test_reload_and_gauges() {
        record_reload_success(Duration::from_millis(120), 3);
        assert!(RELOADS_TOTAL.with_label_values(&["success"]).get() > 0.0);

        set_queue_depth("main", 4);
        assert!((QUEUE_DEPTH.with_label_values(&["main"]).get() - 4.0).abs() < f64::EPSILON);

        set_leader_status("rampart-0", true);
        assert!((LEADER_STATUS.with_label_values(&["rampart-0"]).get() - 1.0).abs() < f64::EPSILON);
        set_leader_status("rampart-0", false);
        assert!(LEADER_STATUS.with_label_values(&["rampart-0"]).get().abs() < f64::EPSILON);
    }

    #[test]
    fn test_gather_metrics_renders_text() {
        record_sync("gather", true, Duration::from_millis(5));
        let text = gather_metrics().unwrap();
        assert!(text.contains("rampart_syncs_total"));
    }
}
