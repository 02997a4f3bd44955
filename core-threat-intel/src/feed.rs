// =====================================================================================
// File: core-threat-intel/src/feed.rs
// Description: ThreatFeed aggregate
// =====================================================================================

use crate::types::{CollectionFrequency, CollectionStatus, FeedPriority};
use crate::ThreatIntelResult;
use chrono::{DateTime, Utc};
use core_utils::Validate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A configured external advisory source.
///
/// Created and mutated by operator commands; the scheduler only touches the
/// last-run metadata through `begin_collection` / `finish_collection`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreatFeed {
    pub id: Uuid,
    /// Display name, unique across feeds
    pub name: String,
    pub priority: FeedPriority,
    pub enabled: bool,
    pub frequency: CollectionFrequency,
    /// Opaque credential blob; stored encrypted at rest, masked in logs
    pub credential: Option<String>,
    pub last_run_at: Option<DateTime<Utc>>,
    pub last_run_status: Option<CollectionStatus>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ThreatFeed {
    pub fn create(
        name: &str,
        priority: FeedPriority,
        frequency: CollectionFrequency,
        credential: Option<String>,
    ) -> ThreatIntelResult<Self> {
        Validate::not_empty(name, "name")?;
        Validate::length(name, "name", None, Some(255))?;

        let now = Utc::now();
        Ok(Self {
            id: Uuid::new_v4(),
            name: name.trim().to_string(),
            priority,
            enabled: true,
            frequency,
            credential,
            last_run_at: None,
            last_run_status: None,
            last_error: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// Operator update of the configurable fields.
    pub fn update(
        &mut self,
        name: Option<&str>,
        priority: Option<FeedPriority>,
        frequency: Option<CollectionFrequency>,
        credential: Option<Option<String>>,
    ) -> ThreatIntelResult<()> {
        if let Some(name) = name {
            Validate::not_empty(name, "name")?;
            self.name = name.trim().to_string();
        }
        if let Some(priority) = priority {
            self.priority = priority;
        }
        if let Some(frequency) = frequency {
            self.frequency = frequency;
        }
        if let Some(credential) = credential {
            self.credential = credential;
        }
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn enable(&mut self) {
        if !self.enabled {
            self.enabled = true;
            self.updated_at = Utc::now();
        }
    }

    pub fn disable(&mut self) {
        if self.enabled {
            self.enabled = false;
            self.updated_at = Utc::now();
        }
    }

    /// Mark a collection run as started.
    pub fn begin_collection(&mut self) {
        self.last_run_status = Some(CollectionStatus::InProgress);
        self.updated_at = Utc::now();
    }

    /// Record the terminal outcome of a collection run.
    pub fn finish_collection(&mut self, status: CollectionStatus, error: Option<String>) {
        let now = Utc::now();
        self.last_run_at = Some(now);
        self.last_run_status = Some(status);
        self.last_error = error;
        self.updated_at = now;
    }

    /// Whether the feed is the CISA KEV catalogue, which carries a risk
    /// weight downstream.
    pub fn is_kev_catalogue(&self) -> bool {
        let name = self.name.to_lowercase();
        name.contains("cisa") || name.contains("kev")
    }
}

impl ThreatFeed {
    /// Guard against malformed persisted rows.
    pub fn validate(&self) -> ThreatIntelResult<()> {
        Validate::not_empty(&self.name, "name")?;
        if self.last_run_status == Some(CollectionStatus::Failed) && self.last_error.is_none() {
            // A failed run without error text is tolerated but surfaced.
            tracing::warn!(feed_id = %self.id, "Failed run recorded without error text");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_feed() {
        let feed = ThreatFeed::create(
            "CISA KEV",
            FeedPriority::P0,
            CollectionFrequency::Daily,
            None,
        )
        .unwrap();
        assert!(feed.enabled);
        assert!(feed.last_run_at.is_none());
        assert!(feed.is_kev_catalogue());
    }

    #[test]
    fn test_create_feed_rejects_empty_name() {
        assert!(
            ThreatFeed::create("  ", FeedPriority::P1, CollectionFrequency::Daily, None).is_err()
        );
    }

    #[test]
    fn test_collection_lifecycle_metadata() {
        let mut feed =
            ThreatFeed::create("NVD", FeedPriority::P1, CollectionFrequency::Hourly, None)
                .unwrap();

        feed.begin_collection();
        assert_eq!(feed.last_run_status, Some(CollectionStatus::InProgress));
        assert!(feed.last_run_at.is_none());

        feed.finish_collection(CollectionStatus::Failed, Some("HTTP 503".to_string()));
        assert_eq!(feed.last_run_status, Some(CollectionStatus::Failed));
        assert_eq!(feed.last_error.as_deref(), Some("HTTP 503"));
        assert!(feed.last_run_at.is_some());

        feed.finish_collection(CollectionStatus::Success, None);
        assert_eq!(feed.last_run_status, Some(CollectionStatus::Success));
        assert!(feed.last_error.is_none());
    }

    #[test]
    fn test_enable_disable() {
        let mut feed =
            ThreatFeed::create("VMware VMSA", FeedPriority::P2, CollectionFrequency::Weekly, None)
                .unwrap();
        feed.disable();
        assert!(!feed.enabled);
        feed.enable();
        assert!(feed.enabled);
        assert!(!feed.is_kev_catalogue());
    }

    #[test]
    fn test_update_fields() {
        let mut feed =
            ThreatFeed::create("MSRC", FeedPriority::P2, CollectionFrequency::Weekly, None)
                .unwrap();
        feed.update(
            Some("Microsoft MSRC"),
            Some(FeedPriority::P1),
            Some(CollectionFrequency::Daily),
            Some(Some("api-key".to_string())),
        )
        .unwrap();
        assert_eq!(feed.name, "Microsoft MSRC");
        assert_eq!(feed.priority, FeedPriority::P1);
        assert_eq!(feed.frequency, CollectionFrequency::Daily);
        assert_eq!(feed.credential.as_deref(), Some("api-key"));
    }
}
