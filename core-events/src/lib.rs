// =====================================================================================
// File: core-events/src/lib.rs
// Description: Domain events and event bus contracts for the AETIM platform
// =====================================================================================

//! # Core Events
//!
//! The in-process publish/subscribe seam connecting the intelligence
//! pipeline: collection publishes `ThreatIngested`, correlation publishes
//! `AssociationCreated`, scoring publishes `RiskAssessmentCompleted`, and the
//! emitters consume those plus the reporting/notification events. Subscriber
//! failures are logged and swallowed by the bus; they never reach the
//! publisher.

pub mod event_bus;

pub use event_bus::{EventBusStats, InMemoryEventBus};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Event system errors
#[derive(Error, Debug, Clone)]
pub enum EventError {
    #[error("Publishing failed: {0}")]
    PublishingFailed(String),
    #[error("Subscription failed: {0}")]
    SubscriptionFailed(String),
    #[error("Handler error: {0}")]
    HandlerError(String),
}

/// Result type for event operations
pub type EventResult<T> = Result<T, EventError>;

/// Event kind identifiers, used as subscription keys
pub mod kinds {
    pub const THREAT_INGESTED: &str = "ThreatIngested";
    pub const ASSOCIATION_CREATED: &str = "AssociationCreated";
    pub const RISK_ASSESSMENT_COMPLETED: &str = "RiskAssessmentCompleted";
    pub const REPORT_GENERATED: &str = "ReportGenerated";
    pub const NOTIFICATION_RULE_UPDATED: &str = "NotificationRuleUpdated";
    pub const TICKET_STATUS_UPDATED: &str = "TicketStatusUpdated";
    pub const COLLECTION_FAILURE_ALERT: &str = "CollectionFailureAlert";
}

/// A threat was persisted by the collection pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreatIngested {
    pub threat_id: Uuid,
    pub feed_id: Uuid,
    pub feed_name: String,
    pub cve_id: Option<String>,
    pub ingested_at: DateTime<Utc>,
}

/// A (threat, asset) association was created or re-scored
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssociationCreated {
    pub association_id: Uuid,
    pub threat_id: Uuid,
    pub asset_id: Uuid,
    pub confidence: f64,
    pub match_kind: String,
    pub created_at: DateTime<Utc>,
}

/// A risk assessment finished for one association
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskAssessmentCompleted {
    pub assessment_id: Uuid,
    pub threat_id: Uuid,
    pub association_id: Uuid,
    pub final_score: f64,
    pub risk_level: String,
    pub affected_asset_count: u32,
    pub completed_at: DateTime<Utc>,
}

/// A report artefact was rendered and stored
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportGenerated {
    pub report_id: Uuid,
    pub report_kind: String,
    pub path: String,
    pub generated_at: DateTime<Utc>,
}

/// A notification rule was created, updated or toggled
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationRuleUpdated {
    pub rule_id: Uuid,
    pub rule_kind: String,
    pub enabled: bool,
    pub updated_at: DateTime<Utc>,
}

/// An IT ticket moved through its state machine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketStatusUpdated {
    pub report_id: Uuid,
    pub old_status: String,
    pub new_status: String,
    pub updated_at: DateTime<Utc>,
}

/// A feed crossed its consecutive-failure threshold
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionFailureAlert {
    pub feed_id: Uuid,
    pub feed_name: String,
    pub failure_count: u32,
    pub last_error: String,
    pub error_kind: String,
    pub alerted_at: DateTime<Utc>,
}

/// The closed set of domain events crossing the bus
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload")]
pub enum DomainEvent {
    ThreatIngested(ThreatIngested),
    AssociationCreated(AssociationCreated),
    RiskAssessmentCompleted(RiskAssessmentCompleted),
    ReportGenerated(ReportGenerated),
    NotificationRuleUpdated(NotificationRuleUpdated),
    TicketStatusUpdated(TicketStatusUpdated),
    CollectionFailureAlert(CollectionFailureAlert),
}

impl DomainEvent {
    /// Subscription key for this event
    pub fn kind(&self) -> &'static str {
        match self {
            DomainEvent::ThreatIngested(_) => kinds::THREAT_INGESTED,
            DomainEvent::AssociationCreated(_) => kinds::ASSOCIATION_CREATED,
            DomainEvent::RiskAssessmentCompleted(_) => kinds::RISK_ASSESSMENT_COMPLETED,
            DomainEvent::ReportGenerated(_) => kinds::REPORT_GENERATED,
            DomainEvent::NotificationRuleUpdated(_) => kinds::NOTIFICATION_RULE_UPDATED,
            DomainEvent::TicketStatusUpdated(_) => kinds::TICKET_STATUS_UPDATED,
            DomainEvent::CollectionFailureAlert(_) => kinds::COLLECTION_FAILURE_ALERT,
        }
    }
}

/// Subscriber contract. Handlers must be infallible from the publisher's
/// point of view; returned errors are logged by the bus and dropped.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Stable handler name for logs and subscription bookkeeping
    fn name(&self) -> &str;

    /// Process one event
    async fn handle(&self, event: &DomainEvent) -> EventResult<()>;
}

/// Publisher contract
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: DomainEvent) -> EventResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_kind_mapping() {
        let event = DomainEvent::ThreatIngested(ThreatIngested {
            threat_id: Uuid::new_v4(),
            feed_id: Uuid::new_v4(),
            feed_name: "NVD".to_string(),
            cve_id: Some("CVE-2024-12345".to_string()),
            ingested_at: Utc::now(),
        });
        assert_eq!(event.kind(), kinds::THREAT_INGESTED);
    }

    #[test]
    fn test_event_serialization_round_trip() {
        let event = DomainEvent::RiskAssessmentCompleted(RiskAssessmentCompleted {
            assessment_id: Uuid::new_v4(),
            threat_id: Uuid::new_v4(),
            association_id: Uuid::new_v4(),
            final_score: 7.5,
            risk_level: "High".to_string(),
            affected_asset_count: 3,
            completed_at: Utc::now(),
        });
        let json = serde_json::to_string(&event).unwrap();
        let decoded: DomainEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded.kind(), kinds::RISK_ASSESSMENT_COMPLETED);
    }
}
