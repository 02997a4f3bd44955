// =====================================================================================
// File: core-reporting/src/ticket.rs
// Description: IT ticket synthesis from completed risk assessments
// =====================================================================================

use crate::report::{FileFormat, Report, TicketPriority, TicketStatus};
use crate::repository::ReportRepository;
use crate::storage::ReportFileStore;
use crate::templates::{TemplateEngine, TICKET_HTML, TICKET_TEXT};
use crate::{ReportingError, ReportingResult};
use async_trait::async_trait;
use chrono::Utc;
use core_assessment::{AssetDirectory, AssociationRepository};
use core_events::{
    DomainEvent, EventHandler, EventPublisher, EventResult, RiskAssessmentCompleted,
    TicketStatusUpdated,
};
use core_threat_intel::ThreatRepository;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Renderable ticket content; the JSON rendering of this struct is the
/// symmetric export format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketView {
    pub title: String,
    pub cve: String,
    pub description: String,
    pub cvss_base_score: f64,
    pub final_risk_score: f64,
    pub risk_level: String,
    pub priority: String,
    pub status: String,
    pub remediation_url: String,
    pub assets: Vec<TicketAssetView>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketAssetView {
    pub hostname: String,
    pub ip: String,
    pub owner: String,
    pub operating_system: String,
    pub products: String,
    pub match_kind: String,
    pub confidence: f64,
}

/// Synthesises an IT ticket when an assessment crosses the threshold.
pub struct TicketGenerationService {
    threats: Arc<dyn ThreatRepository>,
    associations: Arc<dyn AssociationRepository>,
    assets: Arc<dyn AssetDirectory>,
    reports: Arc<dyn ReportRepository>,
    store: Arc<ReportFileStore>,
    templates: Arc<TemplateEngine>,
    events: Arc<dyn EventPublisher>,
    threshold: f64,
}

impl TicketGenerationService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        threats: Arc<dyn ThreatRepository>,
        associations: Arc<dyn AssociationRepository>,
        assets: Arc<dyn AssetDirectory>,
        reports: Arc<dyn ReportRepository>,
        store: Arc<ReportFileStore>,
        templates: Arc<TemplateEngine>,
        events: Arc<dyn EventPublisher>,
        threshold: f64,
    ) -> Self {
        Self {
            threats,
            associations,
            assets,
            reports,
            store,
            templates,
            events,
            threshold,
        }
    }

    /// React to one completed assessment; below-threshold scores are a no-op.
    pub async fn handle_assessment(
        &self,
        payload: &RiskAssessmentCompleted,
    ) -> ReportingResult<Option<Report>> {
        if payload.final_score < self.threshold {
            return Ok(None);
        }
        self.generate_ticket(payload).await.map(Some)
    }

    /// Build, render and persist the ticket.
    pub async fn generate_ticket(
        &self,
        payload: &RiskAssessmentCompleted,
    ) -> ReportingResult<Report> {
        let threat = self
            .threats
            .get(payload.threat_id)
            .await
            .map_err(|e| ReportingError::Repository(e.to_string()))?
            .ok_or_else(|| ReportingError::NotFound(format!("threat {}", payload.threat_id)))?;

        let associations = self
            .associations
            .list_by_threat(threat.id)
            .await
            .map_err(|e| ReportingError::Repository(e.to_string()))?;

        let mut asset_views = Vec::new();
        for association in &associations {
            let Some(asset) = self
                .assets
                .get(association.asset_id)
                .await
                .map_err(|e| ReportingError::Repository(e.to_string()))?
            else {
                continue;
            };
            asset_views.push(TicketAssetView {
                hostname: asset.hostname.clone(),
                ip: asset.ip_addresses.join(", "),
                owner: asset.owner.clone(),
                operating_system: asset.operating_system.clone(),
                products: asset
                    .products
                    .iter()
                    .map(|p| match &p.product_version {
                        Some(version) => format!("{} {}", p.product_name, version),
                        None => p.product_name.clone(),
                    })
                    .collect::<Vec<_>>()
                    .join(", "),
                match_kind: association.match_kind.to_string(),
                confidence: association.confidence,
            });
        }

        let subject = threat
            .cve_id
            .clone()
            .unwrap_or_else(|| threat.title.clone());
        let priority = TicketPriority::from_score(payload.final_score);
        let view = TicketView {
            title: format!("IT Ticket - {}", subject),
            cve: threat.cve_id.clone().unwrap_or_default(),
            description: threat.description.clone().unwrap_or_default(),
            cvss_base_score: threat.cvss_base_score.unwrap_or(0.0),
            final_risk_score: payload.final_score,
            risk_level: payload.risk_level.clone(),
            priority: priority.to_string(),
            status: TicketStatus::Pending.to_string(),
            remediation_url: threat.source_url.clone().unwrap_or_default(),
            assets: asset_views,
        };

        let text = self.templates.render(TICKET_TEXT, &view)?;
        let html = self.templates.render(TICKET_HTML, &view)?;

        // One file per ticket: the layout date plus a discriminator keeps
        // paths unique per (kind, timestamp).
        let now = Utc::now();
        let relative = format!(
            "{}/{}/IT_Ticket_Report_{}_{}.txt",
            now.format("%Y"),
            now.format("%Y%m"),
            now.format("%Y-%m-%dT%H%M%S"),
            &Uuid::new_v4().to_string()[..8],
        );
        self.store.write_at(&relative, text.as_bytes()).await?;

        let mut report = Report::new_ticket(&view.title, &relative, FileFormat::Txt)?;
        report
            .metadata
            .insert("ticket".to_string(), serde_json::to_value(&view).unwrap_or_default());
        report
            .metadata
            .insert("html".to_string(), serde_json::Value::String(html));
        report.metadata.insert(
            "assessment_id".to_string(),
            json!(payload.assessment_id),
        );
        self.reports
            .save(&report)
            .await
            .map_err(|e| ReportingError::Repository(e.to_string()))?;

        info!(
            report_id = %report.id,
            threat_id = %threat.id,
            score = payload.final_score,
            priority = %priority,
            "IT ticket generated"
        );
        Ok(report)
    }

    /// Walk the ticket state machine and announce the transition.
    pub async fn update_ticket_status(
        &self,
        report_id: Uuid,
        target: TicketStatus,
    ) -> ReportingResult<Report> {
        let Some(mut report) = self
            .reports
            .get(report_id)
            .await
            .map_err(|e| ReportingError::Repository(e.to_string()))?
        else {
            return Err(ReportingError::NotFound(format!("report {}", report_id)));
        };

        let (old, new) = report.update_ticket_status(target)?;
        self.reports
            .save(&report)
            .await
            .map_err(|e| ReportingError::Repository(e.to_string()))?;

        if let Err(e) = self
            .events
            .publish(DomainEvent::TicketStatusUpdated(TicketStatusUpdated {
                report_id,
                old_status: old.to_string(),
                new_status: new.to_string(),
                updated_at: Utc::now(),
            }))
            .await
        {
            error!(report_id = %report_id, error = %e, "Failed to publish TicketStatusUpdated");
        }

        Ok(report)
    }

    /// Export one ticket as its symmetric JSON rendering.
    pub async fn export_ticket(&self, report_id: Uuid) -> ReportingResult<serde_json::Value> {
        let Some(report) = self
            .reports
            .get(report_id)
            .await
            .map_err(|e| ReportingError::Repository(e.to_string()))?
        else {
            return Err(ReportingError::NotFound(format!("report {}", report_id)));
        };
        let Some(ticket) = report.metadata.get("ticket") else {
            return Err(ReportingError::NotFound(format!(
                "report {} carries no ticket payload",
                report_id
            )));
        };
        let mut value = ticket.clone();
        if let Some(object) = value.as_object_mut() {
            object.insert(
                "status".to_string(),
                json!(report
                    .ticket_status
                    .map(|s| s.to_string())
                    .unwrap_or_default()),
            );
        }
        Ok(value)
    }

    /// Batch export: `{exported_at, ticket_count, tickets: [...]}`.
    pub async fn export_tickets(&self, ids: &[Uuid]) -> ReportingResult<serde_json::Value> {
        let mut tickets = Vec::new();
        for id in ids {
            match self.export_ticket(*id).await {
                Ok(ticket) => tickets.push(ticket),
                Err(e) => warn!(report_id = %id, error = %e, "Skipping unexportable ticket"),
            }
        }
        Ok(json!({
            "exported_at": Utc::now().to_rfc3339(),
            "ticket_count": tickets.len(),
            "tickets": tickets,
        }))
    }
}

/// Bus subscriber: ticket synthesis on `RiskAssessmentCompleted`.
pub struct TicketAssessmentHandler {
    service: Arc<TicketGenerationService>,
}

impl TicketAssessmentHandler {
    pub fn new(service: Arc<TicketGenerationService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl EventHandler for TicketAssessmentHandler {
    fn name(&self) -> &str {
        "ticket-generation"
    }

    async fn handle(&self, event: &DomainEvent) -> EventResult<()> {
        if let DomainEvent::RiskAssessmentCompleted(payload) = event {
            if let Err(e) = self.service.handle_assessment(payload).await {
                warn!(assessment_id = %payload.assessment_id, error = %e, "Ticket generation failed");
            }
        }
        Ok(())
    }
}
