// =====================================================================================
// File: core-threat-intel/src/failure_tracker.rs
// Description: Consecutive-failure tracking with alert cooldown
// =====================================================================================

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

/// Per-feed failure record. Process-local; not persisted across restarts.
#[derive(Debug, Clone)]
pub struct FailureRecord {
    pub feed_id: Uuid,
    pub feed_name: String,
    pub failure_count: u32,
    pub first_failure_at: Option<DateTime<Utc>>,
    pub last_failure_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub last_error_kind: Option<String>,
    pub alert_sent: bool,
    pub alert_sent_at: Option<DateTime<Utc>>,
}

impl FailureRecord {
    fn new(feed_id: Uuid, feed_name: &str) -> Self {
        Self {
            feed_id,
            feed_name: feed_name.to_string(),
            failure_count: 0,
            first_failure_at: None,
            last_failure_at: None,
            last_error: None,
            last_error_kind: None,
            alert_sent: false,
            alert_sent_at: None,
        }
    }
}

/// Tracks consecutive collection failures per feed and decides when an
/// alert should fire. The cooldown suppresses duplicate alerts, not the
/// underlying failures.
pub struct FailureTracker {
    failure_threshold: u32,
    alert_cooldown: Duration,
    records: Mutex<HashMap<Uuid, FailureRecord>>,
}

impl FailureTracker {
    pub fn new(failure_threshold: u32, alert_cooldown_hours: i64) -> Self {
        Self {
            failure_threshold,
            alert_cooldown: Duration::hours(alert_cooldown_hours),
            records: Mutex::new(HashMap::new()),
        }
    }

    /// Record one failure. Returns true when an alert should be emitted.
    pub fn record_failure(
        &self,
        feed_id: Uuid,
        feed_name: &str,
        error: &str,
        error_kind: &str,
    ) -> bool {
        let now = Utc::now();
        let mut records = self.records.lock().expect("failure tracker poisoned");
        let record = records
            .entry(feed_id)
            .or_insert_with(|| FailureRecord::new(feed_id, feed_name));

        record.failure_count += 1;
        record.last_failure_at = Some(now);
        record.last_error = Some(error.to_string());
        record.last_error_kind = Some(error_kind.to_string());
        if record.first_failure_at.is_none() {
            record.first_failure_at = Some(now);
        }

        warn!(
            feed_id = %feed_id,
            feed_name = %feed_name,
            failure_count = record.failure_count,
            error_kind = %error_kind,
            "Collection failure recorded"
        );

        let should_alert =
            record.failure_count >= self.failure_threshold && !Self::in_cooldown(record, now, self.alert_cooldown);

        if should_alert {
            record.alert_sent = true;
            record.alert_sent_at = Some(now);
        }

        should_alert
    }

    /// Record one success; resets the failure state in a single step.
    pub fn record_success(&self, feed_id: Uuid) {
        let mut records = self.records.lock().expect("failure tracker poisoned");
        if let Some(record) = records.get_mut(&feed_id) {
            if record.failure_count > 0 {
                info!(
                    feed_id = %feed_id,
                    feed_name = %record.feed_name,
                    previous_failures = record.failure_count,
                    "Collection succeeded, failure count reset"
                );
            }
            record.failure_count = 0;
            record.first_failure_at = None;
            record.alert_sent = false;
            record.alert_sent_at = None;
        }
    }

    pub fn record_for(&self, feed_id: Uuid) -> Option<FailureRecord> {
        self.records
            .lock()
            .expect("failure tracker poisoned")
            .get(&feed_id)
            .cloned()
    }

    fn in_cooldown(record: &FailureRecord, now: DateTime<Utc>, cooldown: Duration) -> bool {
        match record.alert_sent_at {
            Some(sent_at) => now < sent_at + cooldown,
            None => false,
        }
    }

    #[cfg(test)]
    fn backdate_alert(&self, feed_id: Uuid, hours: i64) {
        let mut records = self.records.lock().unwrap();
        if let Some(record) = records.get_mut(&feed_id) {
            record.alert_sent_at = record.alert_sent_at.map(|t| t - Duration::hours(hours));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker() -> FailureTracker {
        FailureTracker::new(3, 24)
    }

    #[test]
    fn test_alert_after_threshold() {
        let tracker = tracker();
        let feed = Uuid::new_v4();
        assert!(!tracker.record_failure(feed, "NVD", "timeout", "timeout"));
        assert!(!tracker.record_failure(feed, "NVD", "timeout", "timeout"));
        assert!(tracker.record_failure(feed, "NVD", "timeout", "timeout"));
    }

    #[test]
    fn test_cooldown_suppresses_duplicate_alerts() {
        let tracker = tracker();
        let feed = Uuid::new_v4();
        for _ in 0..3 {
            tracker.record_failure(feed, "NVD", "HTTP 503", "transient_server");
        }
        // Fourth failure inside the cooldown: counted, not alerted.
        assert!(!tracker.record_failure(feed, "NVD", "HTTP 503", "transient_server"));
        let record = tracker.record_for(feed).unwrap();
        assert_eq!(record.failure_count, 4);
        assert!(record.alert_sent);
    }

    #[test]
    fn test_success_resets_in_one_step() {
        let tracker = tracker();
        let feed = Uuid::new_v4();
        for _ in 0..3 {
            tracker.record_failure(feed, "NVD", "HTTP 503", "transient_server");
        }
        tracker.record_success(feed);
        let record = tracker.record_for(feed).unwrap();
        assert_eq!(record.failure_count, 0);
        assert!(record.first_failure_at.is_none());
        assert!(!record.alert_sent);
    }

    #[test]
    fn test_alert_cycle_after_reset() {
        // Three failures alert once; a success then three more failures
        // alert exactly once more.
        let tracker = tracker();
        let feed = Uuid::new_v4();

        let mut alerts = 0;
        for _ in 0..3 {
            if tracker.record_failure(feed, "NVD", "e", "timeout") {
                alerts += 1;
            }
        }
        if tracker.record_failure(feed, "NVD", "e", "timeout") {
            alerts += 1;
        }
        assert_eq!(alerts, 1);

        tracker.record_success(feed);
        for _ in 0..3 {
            if tracker.record_failure(feed, "NVD", "e", "timeout") {
                alerts += 1;
            }
        }
        assert_eq!(alerts, 2);
    }

    #[test]
    fn test_alert_again_after_cooldown_expiry() {
        let tracker = tracker();
        let feed = Uuid::new_v4();
        for _ in 0..3 {
            tracker.record_failure(feed, "NVD", "e", "timeout");
        }
        // Shift the alert 25 hours into the past; the next failure re-alerts.
        tracker.backdate_alert(feed, 25);
        assert!(tracker.record_failure(feed, "NVD", "e", "timeout"));
    }

    #[test]
    fn test_records_keep_last_error() {
        let tracker = tracker();
        let feed = Uuid::new_v4();
        tracker.record_failure(feed, "MSRC", "HTTP 401", "authentication");
        let record = tracker.record_for(feed).unwrap();
        assert_eq!(record.last_error.as_deref(), Some("HTTP 401"));
        assert_eq!(record.last_error_kind.as_deref(), Some("authentication"));
    }
}
