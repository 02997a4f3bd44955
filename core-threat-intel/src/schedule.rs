// =====================================================================================
// File: core-threat-intel/src/schedule.rs
// Description: Interval-based collection scheduler
// =====================================================================================

use crate::collection::ThreatCollectionService;
use crate::feed::ThreatFeed;
use crate::repository::FeedRepository;
use crate::{ThreatIntelError, ThreatIntelResult};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant};
use tracing::{error, info, warn};
use uuid::Uuid;

/// Installs one timer per enabled feed and kicks collection runs on fire.
/// The collection service itself guards against overlapping runs of the
/// same feed.
pub struct CollectionScheduler {
    feeds: Arc<dyn FeedRepository>,
    collection: Arc<ThreatCollectionService>,
    jobs: Mutex<HashMap<Uuid, JoinHandle<()>>>,
}

impl CollectionScheduler {
    pub fn new(feeds: Arc<dyn FeedRepository>, collection: Arc<ThreatCollectionService>) -> Self {
        Self {
            feeds,
            collection,
            jobs: Mutex::new(HashMap::new()),
        }
    }

    /// Load every enabled feed and install its timer.
    pub async fn start(&self) -> ThreatIntelResult<()> {
        let feeds = self.feeds.list_enabled().await?;
        info!(feed_count = feeds.len(), "Loading collection schedules");
        for feed in feeds {
            self.add_schedule(&feed).await;
        }
        Ok(())
    }

    /// Install (or replace) the timer for one feed. Disabled feeds are
    /// skipped.
    pub async fn add_schedule(&self, feed: &ThreatFeed) {
        if !feed.enabled {
            warn!(feed_id = %feed.id, feed_name = %feed.name, "Feed disabled, not scheduling");
            return;
        }

        let mut jobs = self.jobs.lock().await;
        if let Some(existing) = jobs.remove(&feed.id) {
            existing.abort();
        }

        let period = feed.frequency.as_duration();
        let collection = Arc::clone(&self.collection);
        let feed_id = feed.id;
        let feed_name = feed.name.clone();

        let handle = tokio::spawn(async move {
            // First fire after one full period, not at install time.
            let mut timer = interval_at(Instant::now() + period, period);
            loop {
                timer.tick().await;
                info!(feed_id = %feed_id, feed_name = %feed_name, "Scheduled collection fired");
                match collection.collect_from_feed(feed_id).await {
                    Ok(outcome) if outcome.success => {}
                    Ok(outcome) => {
                        warn!(
                            feed_id = %feed_id,
                            errors = ?outcome.errors,
                            "Scheduled collection reported failure"
                        );
                    }
                    Err(ThreatIntelError::AlreadyRunning(_)) => {
                        warn!(feed_id = %feed_id, "Previous run still active, skipping this fire");
                    }
                    Err(e) => {
                        error!(feed_id = %feed_id, error = %e, "Scheduled collection errored");
                    }
                }
            }
        });

        info!(
            feed_id = %feed.id,
            feed_name = %feed.name,
            frequency = %feed.frequency,
            "Collection schedule installed"
        );
        jobs.insert(feed.id, handle);
    }

    /// Remove a feed's timer.
    pub async fn remove_schedule(&self, feed_id: Uuid) {
        let mut jobs = self.jobs.lock().await;
        if let Some(handle) = jobs.remove(&feed_id) {
            handle.abort();
            info!(feed_id = %feed_id, "Collection schedule removed");
        } else {
            warn!(feed_id = %feed_id, "No schedule installed for feed");
        }
    }

    /// Replace a feed's timer after a configuration change.
    pub async fn update_schedule(&self, feed: &ThreatFeed) {
        self.remove_schedule(feed.id).await;
        if feed.enabled {
            self.add_schedule(feed).await;
        }
    }

    /// Manual kick, guarded against overlap by the collection service.
    pub async fn run_now(&self, feed_id: Uuid) -> ThreatIntelResult<crate::CollectionOutcome> {
        self.collection.collect_from_feed(feed_id).await
    }

    /// Whether a timer is installed for the feed.
    pub async fn is_scheduled(&self, feed_id: Uuid) -> bool {
        self.jobs.lock().await.contains_key(&feed_id)
    }

    /// Abort every installed timer.
    pub async fn stop(&self) {
        let mut jobs = self.jobs.lock().await;
        for (_, handle) in jobs.drain() {
            handle.abort();
        }
        info!("Collection scheduler stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collectors::CollectorFactory;
    use crate::failure_tracker::FailureTracker;
    use crate::repository::{InMemoryFeedRepository, InMemoryThreatRepository};
    use crate::types::{CollectionFrequency, FeedPriority};
    use core_config::CollectionConfig;
    use core_events::InMemoryEventBus;
    use core_extraction::ExtractionService;

    async fn scheduler() -> (CollectionScheduler, Arc<InMemoryFeedRepository>) {
        let bus = Arc::new(InMemoryEventBus::new());
        bus.start().await;
        let feeds = Arc::new(InMemoryFeedRepository::new());
        let threats = Arc::new(InMemoryThreatRepository::new());
        let extraction = Arc::new(ExtractionService::rules_only());
        let config = CollectionConfig::default();
        let collectors = Arc::new(CollectorFactory::new(&config, extraction.clone()));
        let failure_tracker = Arc::new(FailureTracker::new(3, 24));
        let collection = Arc::new(ThreatCollectionService::new(
            &config,
            feeds.clone(),
            threats,
            collectors,
            extraction,
            failure_tracker,
            bus,
        ));
        (CollectionScheduler::new(feeds.clone(), collection), feeds)
    }

    #[tokio::test]
    async fn test_start_installs_enabled_feeds_only() {
        let (scheduler, feeds) = scheduler().await;
        let enabled =
            ThreatFeed::create("NVD", FeedPriority::P1, CollectionFrequency::Daily, None).unwrap();
        let mut disabled = ThreatFeed::create(
            "CISA KEV",
            FeedPriority::P0,
            CollectionFrequency::Daily,
            None,
        )
        .unwrap();
        disabled.disable();
        feeds.save(&enabled).await.unwrap();
        feeds.save(&disabled).await.unwrap();

        scheduler.start().await.unwrap();
        assert!(scheduler.is_scheduled(enabled.id).await);
        assert!(!scheduler.is_scheduled(disabled.id).await);
        scheduler.stop().await;
    }

    #[tokio::test]
    async fn test_remove_and_update_schedule() {
        let (scheduler, feeds) = scheduler().await;
        let mut feed =
            ThreatFeed::create("NVD", FeedPriority::P1, CollectionFrequency::Daily, None).unwrap();
        feeds.save(&feed).await.unwrap();

        scheduler.add_schedule(&feed).await;
        assert!(scheduler.is_scheduled(feed.id).await);

        scheduler.remove_schedule(feed.id).await;
        assert!(!scheduler.is_scheduled(feed.id).await);

        // Updating a disabled feed leaves no timer behind.
        feed.disable();
        scheduler.update_schedule(&feed).await;
        assert!(!scheduler.is_scheduled(feed.id).await);

        feed.enable();
        scheduler.update_schedule(&feed).await;
        assert!(scheduler.is_scheduled(feed.id).await);
        scheduler.stop().await;
    }

    #[tokio::test]
    async fn test_run_now_missing_feed() {
        let (scheduler, _) = scheduler().await;
        assert!(scheduler.run_now(Uuid::new_v4()).await.is_err());
    }
}
