// =====================================================================================
// File: core-threat-intel/src/lib.rs
// Description: Threat intelligence collection pipeline for the AETIM platform
// =====================================================================================

//! # Core Threat Intel
//!
//! The ingestion half of the platform: configured feeds, one driver per
//! external source, per-source rate limiting and retry, consecutive-failure
//! alerting, and the scheduler that orchestrates collection runs. Collected
//! threats are normalised into the uniform threat model, enriched through the
//! extraction service, upserted, and announced on the event bus.

pub mod collection;
pub mod collectors;
pub mod failure_tracker;
pub mod feed;
pub mod rate_limit;
pub mod repository;
pub mod retry;
pub mod schedule;
pub mod threat;
pub mod types;

pub use collection::{CollectionOutcome, ThreatCollectionService};
pub use collectors::{Collector, CollectorFactory, CollectionWindow};
pub use failure_tracker::{FailureRecord, FailureTracker};
pub use feed::ThreatFeed;
pub use rate_limit::RateLimiter;
pub use repository::{
    FeedRepository, InMemoryFeedRepository, InMemoryThreatRepository, ThreatRepository,
};
pub use retry::{CollectorError, RetryHandler};
pub use schedule::CollectionScheduler;
pub use threat::{Threat, ThreatProduct};
pub use types::{
    CollectionFrequency, CollectionStatus, FeedPriority, ThreatSeverity, ThreatStatus,
};

use core_utils::ValidationError;
use thiserror::Error;

/// Threat intelligence pipeline errors
#[derive(Error, Debug)]
pub enum ThreatIntelError {
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Illegal status transition from '{from}' to '{to}'")]
    IllegalTransition { from: String, to: String },
    #[error("Collector error: {0}")]
    Collector(#[from] CollectorError),
    #[error("Repository error: {0}")]
    Repository(String),
    #[error("Event publishing error: {0}")]
    Event(String),
    #[error("Collection already running for feed {0}")]
    AlreadyRunning(uuid::Uuid),
}

/// Result type for threat intelligence operations
pub type ThreatIntelResult<T> = Result<T, ThreatIntelError>;
