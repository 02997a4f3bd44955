// =====================================================================================
// File: core-assessment/src/service.rs
// Description: Event-driven assessment orchestration
// =====================================================================================

use crate::association::{
    AssociationAnalysisService, AssociationCandidate, AssociationRepository,
};
use crate::asset::AssetDirectory;
use crate::pir::PirRepository;
use crate::risk::{
    RiskAssessment, RiskAssessmentRepository, RiskCalculationService, RiskHistoryEntry,
    RiskHistoryRepository,
};
use crate::{AssessmentError, AssessmentResult};
use async_trait::async_trait;
use chrono::Utc;
use core_events::{
    AssociationCreated, DomainEvent, EventHandler, EventPublisher, EventResult,
    RiskAssessmentCompleted,
};
use core_threat_intel::{FeedRepository, ThreatRepository, ThreatStatus};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Drives the correlation and scoring stages: consumes `ThreatIngested`,
/// produces `AssociationCreated`, consumes that and produces
/// `RiskAssessmentCompleted`.
pub struct AssessmentService {
    threats: Arc<dyn ThreatRepository>,
    feeds: Arc<dyn FeedRepository>,
    assets: Arc<dyn AssetDirectory>,
    associations: Arc<dyn AssociationRepository>,
    pirs: Arc<dyn PirRepository>,
    assessments: Arc<dyn RiskAssessmentRepository>,
    history: Arc<dyn RiskHistoryRepository>,
    analysis: AssociationAnalysisService,
    calculator: RiskCalculationService,
    events: Arc<dyn EventPublisher>,
}

impl AssessmentService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        threats: Arc<dyn ThreatRepository>,
        feeds: Arc<dyn FeedRepository>,
        assets: Arc<dyn AssetDirectory>,
        associations: Arc<dyn AssociationRepository>,
        pirs: Arc<dyn PirRepository>,
        assessments: Arc<dyn RiskAssessmentRepository>,
        history: Arc<dyn RiskHistoryRepository>,
        calculator: RiskCalculationService,
        events: Arc<dyn EventPublisher>,
    ) -> Self {
        Self {
            threats,
            feeds,
            assets,
            associations,
            pirs,
            assessments,
            history,
            analysis: AssociationAnalysisService::new(),
            calculator,
            events,
        }
    }

    /// Correlate one threat against the inventory. Moves New threats into
    /// Analyzing on entry and Analyzing into Processed on completion;
    /// a failed run leaves the state untouched.
    pub async fn correlate_threat(&self, threat_id: Uuid) -> AssessmentResult<Vec<Uuid>> {
        let Some(mut threat) = self.threats.get(threat_id).await? else {
            return Err(AssessmentError::NotFound(format!("threat {}", threat_id)));
        };

        let assets = self.assets.list_all().await?;
        info!(
            threat_id = %threat_id,
            assets = assets.len(),
            "Correlation run starting"
        );

        if threat.status == ThreatStatus::New {
            threat.update_status(ThreatStatus::Analyzing)?;
            self.threats.save(&threat).await?;
        }

        let candidates = self.analysis.analyze(&threat, &assets);
        let mut association_ids = Vec::new();

        for candidate in &candidates {
            let association = self.associations.upsert(candidate).await?;
            association_ids.push(association.id);

            if let Err(e) = self
                .events
                .publish(DomainEvent::AssociationCreated(AssociationCreated {
                    association_id: association.id,
                    threat_id: association.threat_id,
                    asset_id: association.asset_id,
                    confidence: association.confidence,
                    match_kind: association.match_kind.to_string(),
                    created_at: association.created_at,
                }))
                .await
            {
                error!(association_id = %association.id, error = %e, "Failed to publish AssociationCreated");
            }
        }

        if threat.status == ThreatStatus::Analyzing {
            threat.update_status(ThreatStatus::Processed)?;
            self.threats.save(&threat).await?;
        }

        info!(
            threat_id = %threat_id,
            associations = association_ids.len(),
            "Correlation run finished"
        );
        Ok(association_ids)
    }

    /// Score one association: assemble the inputs, upsert the assessment,
    /// append the immutable history row, publish the completion event.
    pub async fn score_association(&self, association_id: Uuid) -> AssessmentResult<RiskAssessment> {
        let Some(association) = self.associations.get(association_id).await? else {
            return Err(AssessmentError::NotFound(format!(
                "association {}",
                association_id
            )));
        };
        let Some(threat) = self.threats.get(association.threat_id).await? else {
            return Err(AssessmentError::NotFound(format!(
                "threat {}",
                association.threat_id
            )));
        };

        let feed_name = self
            .feeds
            .get(threat.feed_id)
            .await?
            .map(|feed| feed.name);

        // The blast radius: every asset currently associated with the threat.
        let sibling_associations = self.associations.list_by_threat(threat.id).await?;
        let mut affected_assets = Vec::new();
        for sibling in &sibling_associations {
            if let Some(asset) = self.assets.get(sibling.asset_id).await? {
                affected_assets.push(asset);
            }
        }

        let pirs = self.pirs.list_enabled().await?;
        let computed = self.calculator.calculate(
            &threat,
            feed_name.as_deref(),
            association_id,
            &affected_assets,
            &pirs,
        )?;

        // One assessment row per association; re-scoring updates in place.
        let assessment = match self.assessments.find_by_association(association_id).await? {
            Some(existing) => RiskAssessment {
                id: existing.id,
                created_at: existing.created_at,
                updated_at: Utc::now(),
                ..computed
            },
            None => computed,
        };
        self.assessments.save(&assessment).await?;

        self.history
            .append(&RiskHistoryEntry {
                id: Uuid::new_v4(),
                assessment_id: assessment.id,
                threat_id: assessment.threat_id,
                association_id: assessment.association_id,
                final_risk_score: assessment.final_risk_score,
                risk_level: assessment.risk_level,
                calculation_details: assessment.calculation_details.clone(),
                recorded_at: Utc::now(),
            })
            .await?;

        if let Err(e) = self
            .events
            .publish(DomainEvent::RiskAssessmentCompleted(RiskAssessmentCompleted {
                assessment_id: assessment.id,
                threat_id: assessment.threat_id,
                association_id: assessment.association_id,
                final_score: assessment.final_risk_score,
                risk_level: assessment.risk_level.to_string(),
                affected_asset_count: assessment.affected_asset_count,
                completed_at: Utc::now(),
            }))
            .await
        {
            error!(assessment_id = %assessment.id, error = %e, "Failed to publish RiskAssessmentCompleted");
        }

        Ok(assessment)
    }

    /// Re-run correlation for every threat referencing a changed asset:
    /// recompute the candidate set, delete edges that disappeared, upsert
    /// the rest.
    pub async fn recorrelate_for_asset(&self, asset_id: Uuid) -> AssessmentResult<()> {
        let existing = self.associations.list_by_asset(asset_id).await?;
        let threat_ids: HashSet<Uuid> = existing.iter().map(|a| a.threat_id).collect();

        info!(
            asset_id = %asset_id,
            threats = threat_ids.len(),
            "Re-correlating after asset change"
        );

        let assets = self.assets.list_all().await?;
        for threat_id in threat_ids {
            let Some(threat) = self.threats.get(threat_id).await? else {
                continue;
            };

            let candidates = self.analysis.analyze(&threat, &assets);
            let kept: HashSet<Uuid> = candidates.iter().map(|c| c.asset_id).collect();

            for stale in self
                .associations
                .list_by_threat(threat_id)
                .await?
                .iter()
                .filter(|a| !kept.contains(&a.asset_id))
            {
                debug!(association_id = %stale.id, "Deleting stale association");
                self.associations.delete(stale.id).await?;
            }

            for candidate in &candidates {
                self.upsert_and_announce(candidate).await?;
            }
        }
        Ok(())
    }

    async fn upsert_and_announce(&self, candidate: &AssociationCandidate) -> AssessmentResult<()> {
        let association = self.associations.upsert(candidate).await?;
        if let Err(e) = self
            .events
            .publish(DomainEvent::AssociationCreated(AssociationCreated {
                association_id: association.id,
                threat_id: association.threat_id,
                asset_id: association.asset_id,
                confidence: association.confidence,
                match_kind: association.match_kind.to_string(),
                created_at: association.created_at,
            }))
            .await
        {
            error!(association_id = %association.id, error = %e, "Failed to publish AssociationCreated");
        }
        Ok(())
    }
}

/// Bus subscriber: correlation on `ThreatIngested`.
pub struct ThreatIngestedHandler {
    service: Arc<AssessmentService>,
}

impl ThreatIngestedHandler {
    pub fn new(service: Arc<AssessmentService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl EventHandler for ThreatIngestedHandler {
    fn name(&self) -> &str {
        "assessment-correlation"
    }

    async fn handle(&self, event: &DomainEvent) -> EventResult<()> {
        if let DomainEvent::ThreatIngested(payload) = event {
            if let Err(e) = self.service.correlate_threat(payload.threat_id).await {
                warn!(threat_id = %payload.threat_id, error = %e, "Correlation failed");
            }
        }
        Ok(())
    }
}

/// Bus subscriber: scoring on `AssociationCreated`.
pub struct AssociationCreatedHandler {
    service: Arc<AssessmentService>,
}

impl AssociationCreatedHandler {
    pub fn new(service: Arc<AssessmentService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl EventHandler for AssociationCreatedHandler {
    fn name(&self) -> &str {
        "assessment-scoring"
    }

    async fn handle(&self, event: &DomainEvent) -> EventResult<()> {
        if let DomainEvent::AssociationCreated(payload) = event {
            if let Err(e) = self.service.score_association(payload.association_id).await {
                warn!(association_id = %payload.association_id, error = %e, "Scoring failed");
            }
        }
        Ok(())
    }
}
