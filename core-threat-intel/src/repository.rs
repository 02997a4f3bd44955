// =====================================================================================
// File: core-threat-intel/src/repository.rs
// Description: Feed and threat repository contracts with in-memory implementations
// =====================================================================================

use crate::feed::ThreatFeed;
use crate::threat::Threat;
use crate::{ThreatIntelError, ThreatIntelResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Persistence contract for configured feeds.
#[async_trait]
pub trait FeedRepository: Send + Sync {
    async fn save(&self, feed: &ThreatFeed) -> ThreatIntelResult<()>;
    async fn get(&self, id: Uuid) -> ThreatIntelResult<Option<ThreatFeed>>;
    async fn get_by_name(&self, name: &str) -> ThreatIntelResult<Option<ThreatFeed>>;
    async fn list_all(&self) -> ThreatIntelResult<Vec<ThreatFeed>>;
    async fn list_enabled(&self) -> ThreatIntelResult<Vec<ThreatFeed>>;
    async fn delete(&self, id: Uuid) -> ThreatIntelResult<()>;
}

/// Persistence contract for threats.
#[async_trait]
pub trait ThreatRepository: Send + Sync {
    async fn save(&self, threat: &Threat) -> ThreatIntelResult<()>;
    async fn get(&self, id: Uuid) -> ThreatIntelResult<Option<Threat>>;
    async fn find_by_cve(&self, cve_id: &str) -> ThreatIntelResult<Option<Threat>>;
    async fn find_by_dedup_key(&self, dedup_key: &str) -> ThreatIntelResult<Option<Threat>>;
    async fn list_all(&self) -> ThreatIntelResult<Vec<Threat>>;
    async fn list_collected_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> ThreatIntelResult<Vec<Threat>>;
    async fn count(&self) -> ThreatIntelResult<u64>;
}

/// In-memory feed store for default wiring and tests.
#[derive(Default)]
pub struct InMemoryFeedRepository {
    feeds: RwLock<HashMap<Uuid, ThreatFeed>>,
}

impl InMemoryFeedRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FeedRepository for InMemoryFeedRepository {
    async fn save(&self, feed: &ThreatFeed) -> ThreatIntelResult<()> {
        let mut feeds = self.feeds.write().await;
        // Display names are unique across feeds.
        if feeds
            .values()
            .any(|f| f.name == feed.name && f.id != feed.id)
        {
            let mut error = core_utils::ValidationError::new();
            error.add_error("name", "display name already in use");
            return Err(ThreatIntelError::Validation(error));
        }
        feeds.insert(feed.id, feed.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> ThreatIntelResult<Option<ThreatFeed>> {
        Ok(self.feeds.read().await.get(&id).cloned())
    }

    async fn get_by_name(&self, name: &str) -> ThreatIntelResult<Option<ThreatFeed>> {
        Ok(self
            .feeds
            .read()
            .await
            .values()
            .find(|f| f.name == name)
            .cloned())
    }

    async fn list_all(&self) -> ThreatIntelResult<Vec<ThreatFeed>> {
        let mut feeds: Vec<_> = self.feeds.read().await.values().cloned().collect();
        feeds.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(feeds)
    }

    async fn list_enabled(&self) -> ThreatIntelResult<Vec<ThreatFeed>> {
        let mut feeds: Vec<_> = self
            .feeds
            .read()
            .await
            .values()
            .filter(|f| f.enabled)
            .cloned()
            .collect();
        feeds.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(feeds)
    }

    async fn delete(&self, id: Uuid) -> ThreatIntelResult<()> {
        self.feeds.write().await.remove(&id);
        Ok(())
    }
}

/// In-memory threat store for default wiring and tests.
#[derive(Default)]
pub struct InMemoryThreatRepository {
    threats: RwLock<HashMap<Uuid, Threat>>,
}

impl InMemoryThreatRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ThreatRepository for InMemoryThreatRepository {
    async fn save(&self, threat: &Threat) -> ThreatIntelResult<()> {
        self.threats.write().await.insert(threat.id, threat.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> ThreatIntelResult<Option<Threat>> {
        Ok(self.threats.read().await.get(&id).cloned())
    }

    async fn find_by_cve(&self, cve_id: &str) -> ThreatIntelResult<Option<Threat>> {
        let needle = cve_id.to_uppercase();
        Ok(self
            .threats
            .read()
            .await
            .values()
            .find(|t| {
                t.cve_id
                    .as_deref()
                    .map(|c| c.to_uppercase() == needle)
                    .unwrap_or(false)
            })
            .cloned())
    }

    async fn find_by_dedup_key(&self, dedup_key: &str) -> ThreatIntelResult<Option<Threat>> {
        Ok(self
            .threats
            .read()
            .await
            .values()
            .find(|t| t.dedup_key == dedup_key)
            .cloned())
    }

    async fn list_all(&self) -> ThreatIntelResult<Vec<Threat>> {
        let mut threats: Vec<_> = self.threats.read().await.values().cloned().collect();
        threats.sort_by(|a, b| a.collected_at.cmp(&b.collected_at));
        Ok(threats)
    }

    async fn list_collected_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> ThreatIntelResult<Vec<Threat>> {
        let mut threats: Vec<_> = self
            .threats
            .read()
            .await
            .values()
            .filter(|t| t.collected_at >= from && t.collected_at <= to)
            .cloned()
            .collect();
        threats.sort_by(|a, b| a.collected_at.cmp(&b.collected_at));
        Ok(threats)
    }

    async fn count(&self) -> ThreatIntelResult<u64> {
        Ok(self.threats.read().await.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CollectionFrequency, FeedPriority};

    fn feed(name: &str) -> ThreatFeed {
        ThreatFeed::create(name, FeedPriority::P1, CollectionFrequency::Daily, None).unwrap()
    }

    fn threat(feed_id: Uuid, cve: Option<&str>) -> Threat {
        Threat::create(
            feed_id,
            "Some advisory",
            None,
            cve.map(str::to_string),
            None,
            None,
            None,
            Some("https://example.org/advisory".to_string()),
            None,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_feed_round_trip() {
        let repository = InMemoryFeedRepository::new();
        let feed = feed("NVD");
        repository.save(&feed).await.unwrap();

        let loaded = repository.get(feed.id).await.unwrap().unwrap();
        assert_eq!(loaded.name, feed.name);
        assert_eq!(loaded.priority, feed.priority);

        let by_name = repository.get_by_name("NVD").await.unwrap().unwrap();
        assert_eq!(by_name.id, feed.id);
    }

    #[tokio::test]
    async fn test_feed_name_uniqueness() {
        let repository = InMemoryFeedRepository::new();
        repository.save(&feed("NVD")).await.unwrap();
        let duplicate = feed("NVD");
        assert!(repository.save(&duplicate).await.is_err());
    }

    #[tokio::test]
    async fn test_list_enabled_excludes_disabled() {
        let repository = InMemoryFeedRepository::new();
        let mut disabled = feed("VMware VMSA");
        disabled.disable();
        repository.save(&feed("NVD")).await.unwrap();
        repository.save(&disabled).await.unwrap();

        let enabled = repository.list_enabled().await.unwrap();
        assert_eq!(enabled.len(), 1);
        assert_eq!(enabled[0].name, "NVD");
    }

    #[tokio::test]
    async fn test_threat_round_trip_and_lookups() {
        let repository = InMemoryThreatRepository::new();
        let feed_id = Uuid::new_v4();
        let with_cve = threat(feed_id, Some("CVE-2024-12345"));
        let without_cve = threat(feed_id, None);
        repository.save(&with_cve).await.unwrap();
        repository.save(&without_cve).await.unwrap();

        let by_cve = repository
            .find_by_cve("cve-2024-12345")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_cve.id, with_cve.id);

        let by_key = repository
            .find_by_dedup_key(&without_cve.dedup_key)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_key.id, without_cve.id);

        assert_eq!(repository.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_list_collected_between() {
        let repository = InMemoryThreatRepository::new();
        let record = threat(Uuid::new_v4(), Some("CVE-2024-1"));
        repository.save(&record).await.unwrap();

        let now = Utc::now();
        let hits = repository
            .list_collected_between(now - chrono::Duration::hours(1), now)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);

        let misses = repository
            .list_collected_between(now - chrono::Duration::hours(2), now - chrono::Duration::hours(1))
            .await
            .unwrap();
        assert!(misses.is_empty());
    }
}
