// =====================================================================================
// File: intel-service/src/commands.rs
// Description: Operator commands, gated and audited
// =====================================================================================

//! Every mutating operator command passes the authorization gate before it
//! touches a store, and both grants and denials are audited. The transport
//! framing (HTTP/CLI) sits outside this crate; these functions are the
//! command surface it calls into.

use crate::bootstrap::AppState;
use anyhow::Result;
use core_assessment::{Pir, PirConditionType, PirPriority};
use core_audit::{AuditAction, Permission, Principal, RequestOrigin};
use core_reporting::TicketStatus;
use core_threat_intel::{CollectionFrequency, FeedPriority, ThreatFeed};
use serde_json::json;
use uuid::Uuid;

/// Create a feed.
pub async fn create_feed(
    state: &AppState,
    principal: &Principal,
    origin: &RequestOrigin,
    name: &str,
    priority: FeedPriority,
    frequency: CollectionFrequency,
    credential: Option<String>,
) -> Result<ThreatFeed> {
    let feed = ThreatFeed::create(name, priority, frequency, credential)?;
    state
        .gate
        .enforce(
            principal,
            origin,
            Permission::ManageFeeds,
            AuditAction::Create,
            "ThreatFeed",
            Some(feed.id.to_string()),
            json!({ "name": feed.name, "frequency": feed.frequency.to_string() }),
        )
        .await?;
    state.feeds.save(&feed).await?;
    state.collection_scheduler.add_schedule(&feed).await;
    Ok(feed)
}

/// Enable or disable a feed, replacing its timer.
pub async fn toggle_feed(
    state: &AppState,
    principal: &Principal,
    origin: &RequestOrigin,
    feed_id: Uuid,
) -> Result<ThreatFeed> {
    state
        .gate
        .enforce(
            principal,
            origin,
            Permission::ManageFeeds,
            AuditAction::Toggle,
            "ThreatFeed",
            Some(feed_id.to_string()),
            json!({}),
        )
        .await?;

    let mut feed = state
        .feeds
        .get(feed_id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("feed {} not found", feed_id))?;
    if feed.enabled {
        feed.disable();
    } else {
        feed.enable();
    }
    state.feeds.save(&feed).await?;
    state.collection_scheduler.update_schedule(&feed).await;
    Ok(feed)
}

/// Manual collection kick.
pub async fn run_collection_now(
    state: &AppState,
    principal: &Principal,
    origin: &RequestOrigin,
    feed_id: Uuid,
) -> Result<core_threat_intel::CollectionOutcome> {
    state
        .gate
        .enforce(
            principal,
            origin,
            Permission::ImportThreats,
            AuditAction::Import,
            "ThreatFeed",
            Some(feed_id.to_string()),
            json!({ "manual": true }),
        )
        .await?;
    Ok(state.collection_scheduler.run_now(feed_id).await?)
}

/// Create a priority intelligence rule.
pub async fn create_pir(
    state: &AppState,
    principal: &Principal,
    origin: &RequestOrigin,
    name: &str,
    description: &str,
    priority: PirPriority,
    condition_type: PirConditionType,
    condition_value: &str,
) -> Result<Pir> {
    let pir = Pir::create(name, description, priority, condition_type, condition_value)?;
    state
        .gate
        .enforce(
            principal,
            origin,
            Permission::ManagePirs,
            AuditAction::Create,
            "Pir",
            Some(pir.id.to_string()),
            json!({ "name": pir.name, "condition_value": pir.condition_value }),
        )
        .await?;
    state.pirs.save(&pir).await?;
    Ok(pir)
}

/// Toggle a PIR. Disabled rules are silently ignored by the scorer.
pub async fn toggle_pir(
    state: &AppState,
    principal: &Principal,
    origin: &RequestOrigin,
    pir_id: Uuid,
) -> Result<Pir> {
    state
        .gate
        .enforce(
            principal,
            origin,
            Permission::ManagePirs,
            AuditAction::Toggle,
            "Pir",
            Some(pir_id.to_string()),
            json!({}),
        )
        .await?;

    let mut pir = state
        .pirs
        .get(pir_id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("pir {} not found", pir_id))?;
    pir.toggle();
    state.pirs.save(&pir).await?;
    Ok(pir)
}

/// Move a ticket through its state machine.
pub async fn update_ticket_status(
    state: &AppState,
    principal: &Principal,
    origin: &RequestOrigin,
    report_id: Uuid,
    target: TicketStatus,
) -> Result<()> {
    state
        .gate
        .enforce(
            principal,
            origin,
            Permission::ManageTickets,
            AuditAction::Update,
            "Report",
            Some(report_id.to_string()),
            json!({ "target_status": target.to_string() }),
        )
        .await?;
    state.tickets.update_ticket_status(report_id, target).await?;
    Ok(())
}

/// Batch-export tickets as the JSON envelope.
pub async fn export_tickets(
    state: &AppState,
    principal: &Principal,
    origin: &RequestOrigin,
    ids: &[Uuid],
) -> Result<serde_json::Value> {
    state
        .gate
        .enforce(
            principal,
            origin,
            Permission::ExportReports,
            AuditAction::Export,
            "Report",
            None,
            json!({ "ticket_count": ids.len() }),
        )
        .await?;
    Ok(state.tickets.export_tickets(ids).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bootstrap::build;
    use core_audit::{AuditQuery, Role};
    use core_config::AppConfig;

    fn test_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.ai_service.enabled = false;
        config.reports.base_dir = std::env::temp_dir()
            .join(format!("aetim-test-{}", Uuid::new_v4()))
            .to_string_lossy()
            .to_string();
        config
    }

    fn origin() -> RequestOrigin {
        RequestOrigin {
            ip_address: Some("198.51.100.7".to_string()),
            user_agent: Some("aetim-cli/1.0".to_string()),
        }
    }

    #[tokio::test]
    async fn test_create_feed_is_gated_and_audited() {
        let state = build(test_config()).await.unwrap();
        let admin = Principal::new("alice", vec![Role::Admin]);

        let feed = create_feed(
            &state,
            &admin,
            &origin(),
            "CISA KEV",
            FeedPriority::P0,
            CollectionFrequency::Daily,
            None,
        )
        .await
        .unwrap();
        assert!(state.collection_scheduler.is_scheduled(feed.id).await);

        let entries = state.audit.query(&AuditQuery::default()).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].resource_kind, "ThreatFeed");
        state.collection_scheduler.stop().await;
    }

    #[tokio::test]
    async fn test_viewer_cannot_create_feed() {
        let state = build(test_config()).await.unwrap();
        let viewer = Principal::new("mallory", vec![Role::Viewer]);

        let result = create_feed(
            &state,
            &viewer,
            &origin(),
            "NVD",
            FeedPriority::P1,
            CollectionFrequency::Daily,
            None,
        )
        .await;
        assert!(result.is_err());
        assert!(state.feeds.list_all().await.unwrap().is_empty());

        // The denial itself is on the record.
        let entries = state.audit.query(&AuditQuery::default()).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].details["denied"], json!(true));
    }

    #[tokio::test]
    async fn test_pir_lifecycle() {
        let state = build(test_config()).await.unwrap();
        let analyst = Principal::new("bob", vec![Role::Analyst]);

        let pir = create_pir(
            &state,
            &analyst,
            &origin(),
            "2024 watch",
            "Track 2024 identifiers",
            PirPriority::High,
            PirConditionType::CveId,
            "CVE-2024-",
        )
        .await
        .unwrap();
        assert!(pir.enabled);

        let toggled = toggle_pir(&state, &analyst, &origin(), pir.id).await.unwrap();
        assert!(!toggled.enabled);

        let entries = state.audit.query(&AuditQuery::default()).await.unwrap();
        assert_eq!(entries.len(), 2);
    }
}
