// =====================================================================================
// File: core-threat-intel/src/collection.rs
// Description: Threat collection service
// =====================================================================================

use crate::collectors::{CollectionWindow, CollectorFactory};
use crate::failure_tracker::FailureTracker;
use crate::rate_limit::RateLimiterRegistry;
use crate::repository::{FeedRepository, ThreatRepository};
use crate::retry::RetryHandler;
use crate::threat::Threat;
use crate::types::CollectionStatus;
use crate::{ThreatIntelError, ThreatIntelResult};
use chrono::Utc;
use core_config::CollectionConfig;
use core_events::{
    CollectionFailureAlert, DomainEvent, EventPublisher, ThreatIngested,
};
use core_extraction::ExtractionService;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Result of one collection run for one feed.
#[derive(Debug, Clone)]
pub struct CollectionOutcome {
    pub feed_id: Uuid,
    pub success: bool,
    pub threats_collected: usize,
    pub errors: Vec<String>,
}

/// Summary of a collect-all sweep.
#[derive(Debug, Clone, Default)]
pub struct CollectionSummary {
    pub total_feeds: usize,
    pub successful_feeds: usize,
    pub failed_feeds: usize,
    pub total_threats: usize,
}

/// Orchestrates one feed's collection: driver under rate limit and retry,
/// extraction enrichment, upsert, feed status bookkeeping, failure tracking,
/// and `ThreatIngested` publication.
pub struct ThreatCollectionService {
    feeds: Arc<dyn FeedRepository>,
    threats: Arc<dyn ThreatRepository>,
    collectors: Arc<CollectorFactory>,
    extraction: Arc<ExtractionService>,
    failure_tracker: Arc<FailureTracker>,
    retry: RetryHandler,
    rate_limiters: RateLimiterRegistry,
    events: Arc<dyn EventPublisher>,
    semaphore: Arc<Semaphore>,
    running: Mutex<HashSet<Uuid>>,
}

impl ThreatCollectionService {
    pub fn new(
        config: &CollectionConfig,
        feeds: Arc<dyn FeedRepository>,
        threats: Arc<dyn ThreatRepository>,
        collectors: Arc<CollectorFactory>,
        extraction: Arc<ExtractionService>,
        failure_tracker: Arc<FailureTracker>,
        events: Arc<dyn EventPublisher>,
    ) -> Self {
        Self {
            feeds,
            threats,
            collectors,
            extraction,
            failure_tracker,
            retry: RetryHandler::new(config.retry.clone()),
            rate_limiters: RateLimiterRegistry::new(
                config.rate_limit_max_requests,
                config.rate_limit_window_seconds,
            ),
            events,
            semaphore: Arc::new(Semaphore::new(config.max_concurrent_collections)),
            running: Mutex::new(HashSet::new()),
        }
    }

    /// Collect one feed. A feed never runs concurrently with itself.
    pub async fn collect_from_feed(&self, feed_id: Uuid) -> ThreatIntelResult<CollectionOutcome> {
        {
            let mut running = self.running.lock().await;
            if !running.insert(feed_id) {
                return Err(ThreatIntelError::AlreadyRunning(feed_id));
            }
        }

        let result = self.collect_guarded(feed_id).await;
        self.running.lock().await.remove(&feed_id);
        result
    }

    async fn collect_guarded(&self, feed_id: Uuid) -> ThreatIntelResult<CollectionOutcome> {
        let Some(mut feed) = self.feeds.get(feed_id).await? else {
            return Err(ThreatIntelError::NotFound(format!("feed {}", feed_id)));
        };

        if !feed.enabled {
            return Ok(CollectionOutcome {
                feed_id,
                success: false,
                threats_collected: 0,
                errors: vec![format!("feed '{}' is disabled", feed.name)],
            });
        }

        let Some(collector) = self.collectors.collector_for(&feed) else {
            let message = format!("no driver for feed '{}'", feed.name);
            error!(feed_id = %feed_id, feed_name = %feed.name, "No collector registered");
            feed.finish_collection(CollectionStatus::Failed, Some(message.clone()));
            self.feeds.save(&feed).await?;
            return Ok(CollectionOutcome {
                feed_id,
                success: false,
                threats_collected: 0,
                errors: vec![message],
            });
        };

        info!(feed_id = %feed_id, feed_name = %feed.name, driver = collector.collector_type(), "Collection run starting");
        let window = CollectionWindow::new(feed.last_run_at, None);
        feed.begin_collection();
        self.feeds.save(&feed).await?;

        let limiter = self.rate_limiters.limiter_for(feed.id).await;
        let collected = self
            .retry
            .execute(|| {
                let collector = collector.clone();
                let feed = feed.clone();
                let limiter = limiter.clone();
                async move {
                    limiter.acquire().await;
                    collector.collect(&feed, window).await
                }
            })
            .await;

        match collected {
            Ok(threats) => {
                let outcome = self.persist_threats(&feed, threats).await?;
                self.failure_tracker.record_success(feed.id);
                feed.finish_collection(CollectionStatus::Success, None);
                self.feeds.save(&feed).await?;
                info!(
                    feed_id = %feed_id,
                    feed_name = %feed.name,
                    threats = outcome.threats_collected,
                    "Collection run finished"
                );
                Ok(outcome)
            }
            Err(e) => {
                let kind = e.kind();
                let message = e.to_string();
                warn!(feed_id = %feed_id, feed_name = %feed.name, error = %message, kind, "Collection run failed");

                let should_alert =
                    self.failure_tracker
                        .record_failure(feed.id, &feed.name, &message, kind);
                if should_alert {
                    let record = self.failure_tracker.record_for(feed.id);
                    let failure_count = record.map(|r| r.failure_count).unwrap_or_default();
                    if let Err(publish_error) = self
                        .events
                        .publish(DomainEvent::CollectionFailureAlert(CollectionFailureAlert {
                            feed_id: feed.id,
                            feed_name: feed.name.clone(),
                            failure_count,
                            last_error: message.clone(),
                            error_kind: kind.to_string(),
                            alerted_at: Utc::now(),
                        }))
                        .await
                    {
                        error!(error = %publish_error, "Failed to publish collection alert");
                    }
                }

                feed.finish_collection(CollectionStatus::Failed, Some(message.clone()));
                self.feeds.save(&feed).await?;
                Ok(CollectionOutcome {
                    feed_id,
                    success: false,
                    threats_collected: 0,
                    errors: vec![message],
                })
            }
        }
    }

    async fn persist_threats(
        &self,
        feed: &crate::feed::ThreatFeed,
        threats: Vec<Threat>,
    ) -> ThreatIntelResult<CollectionOutcome> {
        let mut persisted = 0usize;
        let mut errors = Vec::new();

        // Threats persist in fetch order for a single feed.
        for mut threat in threats {
            threat.feed_id = feed.id;

            if threat.needs_enrichment() {
                let info = self.extraction.extract(&threat.extraction_text()).await;
                threat.merge_extracted(&info);
            }

            match self.upsert_threat(threat).await {
                Ok(stored) => {
                    persisted += 1;
                    if let Err(e) = self
                        .events
                        .publish(DomainEvent::ThreatIngested(ThreatIngested {
                            threat_id: stored.id,
                            feed_id: feed.id,
                            feed_name: feed.name.clone(),
                            cve_id: stored.cve_id.clone(),
                            ingested_at: Utc::now(),
                        }))
                        .await
                    {
                        error!(threat_id = %stored.id, error = %e, "Failed to publish ThreatIngested");
                    }
                }
                Err(e) => {
                    warn!(feed_id = %feed.id, error = %e, "Failed to persist threat");
                    errors.push(e.to_string());
                }
            }
        }

        Ok(CollectionOutcome {
            feed_id: feed.id,
            success: true,
            threats_collected: persisted,
            errors,
        })
    }

    /// Upsert by CVE when present, else by the content-derived key.
    /// Re-ingesting an existing advisory updates only the mutable fields.
    async fn upsert_threat(&self, threat: Threat) -> ThreatIntelResult<Threat> {
        let existing = match &threat.cve_id {
            Some(cve) => self.threats.find_by_cve(cve).await?,
            None => self.threats.find_by_dedup_key(&threat.dedup_key).await?,
        };

        match existing {
            Some(mut current) => {
                current.update_from(&threat)?;
                self.threats.save(&current).await?;
                Ok(current)
            }
            None => {
                self.threats.save(&threat).await?;
                Ok(threat)
            }
        }
    }

    /// Collect every enabled feed, at most `max_concurrent_collections`
    /// simultaneously.
    pub async fn collect_all_feeds(self: &Arc<Self>) -> ThreatIntelResult<CollectionSummary> {
        let feeds = self.feeds.list_enabled().await?;
        if feeds.is_empty() {
            warn!("No enabled feeds to collect");
            return Ok(CollectionSummary::default());
        }

        let mut join_set = JoinSet::new();
        for feed in &feeds {
            let service = Arc::clone(self);
            let feed_id = feed.id;
            join_set.spawn(async move {
                let _permit = service
                    .semaphore
                    .clone()
                    .acquire_owned()
                    .await
                    .expect("semaphore closed");
                service.collect_from_feed(feed_id).await
            });
        }

        let mut summary = CollectionSummary {
            total_feeds: feeds.len(),
            ..Default::default()
        };

        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(Ok(outcome)) if outcome.success => {
                    summary.successful_feeds += 1;
                    summary.total_threats += outcome.threats_collected;
                }
                Ok(Ok(_)) => summary.failed_feeds += 1,
                Ok(Err(e)) => {
                    warn!(error = %e, "Feed collection errored");
                    summary.failed_feeds += 1;
                }
                Err(e) => {
                    error!(error = %e, "Feed collection task panicked");
                    summary.failed_feeds += 1;
                }
            }
        }

        info!(
            total = summary.total_feeds,
            successful = summary.successful_feeds,
            failed = summary.failed_feeds,
            threats = summary.total_threats,
            "Collection sweep finished"
        );
        Ok(summary)
    }
}
