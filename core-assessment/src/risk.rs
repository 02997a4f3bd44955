// =====================================================================================
// File: core-assessment/src/risk.rs
// Description: Deterministic risk scoring with immutable history
// =====================================================================================

use crate::asset::Asset;
use crate::pir::{Pir, PirThreatFacts};
use crate::{AssessmentError, AssessmentResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use core_config::RiskWeightsConfig;
use core_threat_intel::Threat;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Contextual risk level. The bands differ from the severity bands on
/// purpose: severity reflects the advisory as authored, risk reflects
/// contextualised impact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    /// [0,4) Low, [4,6) Medium, [6,8) High, [8,10] Critical.
    pub fn from_score(score: f64) -> Self {
        if score >= 8.0 {
            RiskLevel::Critical
        } else if score >= 6.0 {
            RiskLevel::High
        } else if score >= 4.0 {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiskLevel::Low => write!(f, "Low"),
            RiskLevel::Medium => write!(f, "Medium"),
            RiskLevel::High => write!(f, "High"),
            RiskLevel::Critical => write!(f, "Critical"),
        }
    }
}

/// One scoring of one (threat, association) pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub id: Uuid,
    pub threat_id: Uuid,
    pub association_id: Uuid,
    pub base_cvss_score: f64,
    pub asset_importance_weight: f64,
    pub affected_asset_count: u32,
    pub asset_count_weight: f64,
    pub pir_match_weight: f64,
    pub kev_weight: f64,
    pub final_risk_score: f64,
    pub risk_level: RiskLevel,
    /// Structured reproduction of the formula inputs and result
    pub calculation_details: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Append-only history row; immutable after write.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskHistoryEntry {
    pub id: Uuid,
    pub assessment_id: Uuid,
    pub threat_id: Uuid,
    pub association_id: Uuid,
    pub final_risk_score: f64,
    pub risk_level: RiskLevel,
    pub calculation_details: serde_json::Value,
    pub recorded_at: DateTime<Utc>,
}

/// The deterministic scoring formula:
///
/// `final = clamp(base · asset_w + count_w + pir_w + kev_w, 0, 10)`
pub struct RiskCalculationService {
    weights: RiskWeightsConfig,
}

impl RiskCalculationService {
    pub fn new(weights: RiskWeightsConfig) -> Self {
        Self { weights }
    }

    /// Assemble the inputs and produce a scored assessment for one
    /// association.
    pub fn calculate(
        &self,
        threat: &Threat,
        feed_name: Option<&str>,
        association_id: Uuid,
        affected_assets: &[Asset],
        pirs: &[Pir],
    ) -> AssessmentResult<RiskAssessment> {
        let base = match threat.cvss_base_score {
            Some(score) => score,
            None => {
                warn!(threat_id = %threat.id, "Threat has no CVSS score, scoring from 0.0");
                0.0
            }
        };

        let asset_weight = Self::asset_importance_weight(affected_assets);
        let affected_count = affected_assets.len() as u32;
        let count_weight = self.asset_count_weight(affected_count);
        let pir_weight = self.pir_match_weight(threat, pirs);
        let kev_weight = self.kev_weight(feed_name);

        let raw = base * asset_weight + count_weight + pir_weight + kev_weight;
        let final_score = raw.clamp(0.0, 10.0);
        let level = RiskLevel::from_score(final_score);

        if !(0.0..=10.0).contains(&final_score) {
            return Err(AssessmentError::Invariant(format!(
                "final risk score out of range: {}",
                final_score
            )));
        }

        let details = serde_json::json!({
            "base_cvss_score": base,
            "asset_importance_weight": asset_weight,
            "affected_asset_count": affected_count,
            "asset_count_weight": count_weight,
            "pir_match_weight": pir_weight,
            "kev_weight": kev_weight,
            "calculation_formula": format!(
                "final_score = {} * {} + {} + {} + {}",
                base, asset_weight, count_weight, pir_weight, kev_weight
            ),
            "final_risk_score": final_score,
            "risk_level": level.to_string(),
        });

        info!(
            threat_id = %threat.id,
            association_id = %association_id,
            final_score,
            level = %level,
            "Risk assessment computed"
        );

        let now = Utc::now();
        Ok(RiskAssessment {
            id: Uuid::new_v4(),
            threat_id: threat.id,
            association_id,
            base_cvss_score: base,
            asset_importance_weight: asset_weight,
            affected_asset_count: affected_count,
            asset_count_weight: count_weight,
            pir_match_weight: pir_weight,
            kev_weight,
            final_risk_score: final_score,
            risk_level: level,
            calculation_details: details,
            created_at: now,
            updated_at: now,
        })
    }

    /// Mean of sensitivity x criticality over the affected assets; 1.0 when
    /// none are known.
    fn asset_importance_weight(assets: &[Asset]) -> f64 {
        if assets.is_empty() {
            return 1.0;
        }
        let total: f64 = assets.iter().map(Asset::importance_weight).sum();
        total / assets.len() as f64
    }

    /// `(affected_count / 10) · weight_per_10`
    fn asset_count_weight(&self, affected_count: u32) -> f64 {
        if affected_count == 0 {
            return 0.0;
        }
        (affected_count as f64 / 10.0) * self.weights.asset_count_weight_per_10
    }

    /// High-priority enabled PIR hit adds the configured weight once.
    fn pir_match_weight(&self, threat: &Threat, pirs: &[Pir]) -> f64 {
        if pirs.is_empty() {
            return 0.0;
        }

        let facts = PirThreatFacts {
            cve: threat.cve_id.clone().unwrap_or_default(),
            product_names: threat
                .products
                .iter()
                .map(|p| p.product_name.as_str())
                .collect::<Vec<_>>()
                .join(", "),
            threat_type: threat.title.clone(),
            cvss_score: threat.cvss_base_score.unwrap_or(0.0),
        };

        for pir in pirs {
            if pir.enabled
                && pir.priority == crate::pir::PirPriority::High
                && pir.matches(&facts)
            {
                debug!(threat_id = %threat.id, pir_id = %pir.id, "High-priority PIR matched");
                return self.weights.pir_high_priority_weight;
            }
        }
        0.0
    }

    /// KEV catalogue membership, keyed off the owning feed's name.
    fn kev_weight(&self, feed_name: Option<&str>) -> f64 {
        match feed_name {
            Some(name) => {
                let name = name.to_lowercase();
                if name.contains("cisa") || name.contains("kev") {
                    self.weights.kev_weight
                } else {
                    0.0
                }
            }
            None => 0.0,
        }
    }
}

/// Persistence contract for assessments. One row per association, updated
/// in place on re-scoring.
#[async_trait]
pub trait RiskAssessmentRepository: Send + Sync {
    async fn save(&self, assessment: &RiskAssessment) -> AssessmentResult<()>;
    async fn get(&self, id: Uuid) -> AssessmentResult<Option<RiskAssessment>>;
    async fn find_by_association(
        &self,
        association_id: Uuid,
    ) -> AssessmentResult<Option<RiskAssessment>>;
    async fn list_by_threat(&self, threat_id: Uuid) -> AssessmentResult<Vec<RiskAssessment>>;
    async fn list_completed_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> AssessmentResult<Vec<RiskAssessment>>;
}

/// Append-only history contract. There is intentionally no update or delete.
#[async_trait]
pub trait RiskHistoryRepository: Send + Sync {
    async fn append(&self, entry: &RiskHistoryEntry) -> AssessmentResult<()>;
    async fn list_by_assessment(
        &self,
        assessment_id: Uuid,
    ) -> AssessmentResult<Vec<RiskHistoryEntry>>;
}

/// In-memory assessment store.
#[derive(Default)]
pub struct InMemoryRiskAssessmentRepository {
    assessments: RwLock<HashMap<Uuid, RiskAssessment>>,
}

impl InMemoryRiskAssessmentRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RiskAssessmentRepository for InMemoryRiskAssessmentRepository {
    async fn save(&self, assessment: &RiskAssessment) -> AssessmentResult<()> {
        self.assessments
            .write()
            .await
            .insert(assessment.id, assessment.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> AssessmentResult<Option<RiskAssessment>> {
        Ok(self.assessments.read().await.get(&id).cloned())
    }

    async fn find_by_association(
        &self,
        association_id: Uuid,
    ) -> AssessmentResult<Option<RiskAssessment>> {
        Ok(self
            .assessments
            .read()
            .await
            .values()
            .find(|a| a.association_id == association_id)
            .cloned())
    }

    async fn list_by_threat(&self, threat_id: Uuid) -> AssessmentResult<Vec<RiskAssessment>> {
        let mut assessments: Vec<_> = self
            .assessments
            .read()
            .await
            .values()
            .filter(|a| a.threat_id == threat_id)
            .cloned()
            .collect();
        assessments.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(assessments)
    }

    async fn list_completed_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> AssessmentResult<Vec<RiskAssessment>> {
        let mut assessments: Vec<_> = self
            .assessments
            .read()
            .await
            .values()
            .filter(|a| a.updated_at >= from && a.updated_at <= to)
            .cloned()
            .collect();
        assessments.sort_by(|a, b| a.updated_at.cmp(&b.updated_at));
        Ok(assessments)
    }
}

/// In-memory append-only history store.
#[derive(Default)]
pub struct InMemoryRiskHistoryRepository {
    entries: RwLock<Vec<RiskHistoryEntry>>,
}

impl InMemoryRiskHistoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl RiskHistoryRepository for InMemoryRiskHistoryRepository {
    async fn append(&self, entry: &RiskHistoryEntry) -> AssessmentResult<()> {
        self.entries.write().await.push(entry.clone());
        Ok(())
    }

    async fn list_by_assessment(
        &self,
        assessment_id: Uuid,
    ) -> AssessmentResult<Vec<RiskHistoryEntry>> {
        Ok(self
            .entries
            .read()
            .await
            .iter()
            .filter(|e| e.assessment_id == assessment_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::{sample_asset, WeightTier};
    use crate::pir::{Pir, PirConditionType, PirPriority};

    fn service() -> RiskCalculationService {
        RiskCalculationService::new(RiskWeightsConfig::default())
    }

    fn threat_with_score(score: Option<f64>) -> Threat {
        Threat::create(
            Uuid::new_v4(),
            "Test advisory",
            None,
            Some("CVE-2024-12345".to_string()),
            score,
            None,
            None,
            None,
            None,
        )
        .unwrap()
    }

    #[test]
    fn test_risk_level_boundaries() {
        assert_eq!(RiskLevel::from_score(8.0), RiskLevel::Critical);
        assert_eq!(RiskLevel::from_score(7.99), RiskLevel::High);
        assert_eq!(RiskLevel::from_score(6.0), RiskLevel::High);
        assert_eq!(RiskLevel::from_score(5.99), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_score(4.0), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_score(3.99), RiskLevel::Low);
        assert_eq!(RiskLevel::from_score(0.0), RiskLevel::Low);
        assert_eq!(RiskLevel::from_score(10.0), RiskLevel::Critical);
    }

    #[test]
    fn test_formula_with_single_medium_asset() {
        let service = service();
        let threat = threat_with_score(Some(7.0));
        let asset = sample_asset("db-01", vec![]);

        let assessment = service
            .calculate(&threat, Some("NVD"), Uuid::new_v4(), &[asset], &[])
            .unwrap();

        // 7.0 * 1.0 + 0.01 + 0 + 0
        assert!((assessment.final_risk_score - 7.01).abs() < 1e-9);
        assert_eq!(assessment.risk_level, RiskLevel::High);
        assert_eq!(assessment.affected_asset_count, 1);
    }

    #[test]
    fn test_kev_feed_adds_weight() {
        let service = service();
        let threat = threat_with_score(Some(7.0));
        let asset = sample_asset("db-01", vec![]);

        let assessment = service
            .calculate(&threat, Some("CISA KEV"), Uuid::new_v4(), &[asset], &[])
            .unwrap();
        assert!((assessment.kev_weight - 0.5).abs() < 1e-9);
        assert!((assessment.final_risk_score - 7.51).abs() < 1e-9);
    }

    #[test]
    fn test_high_priority_pir_adds_weight() {
        let service = service();
        let threat = threat_with_score(Some(6.0));
        let asset = sample_asset("db-01", vec![]);
        let pir = Pir::create(
            "2024 CVEs",
            "watch 2024",
            PirPriority::High,
            PirConditionType::CveId,
            "CVE-2024-",
        )
        .unwrap();

        let assessment = service
            .calculate(&threat, Some("NVD"), Uuid::new_v4(), &[asset], &[pir])
            .unwrap();
        assert!((assessment.pir_match_weight - 0.3).abs() < 1e-9);
    }

    #[test]
    fn test_low_priority_pir_does_not_add_weight() {
        let service = service();
        let threat = threat_with_score(Some(6.0));
        let asset = sample_asset("db-01", vec![]);
        let pir = Pir::create(
            "2024 CVEs",
            "watch 2024",
            PirPriority::Medium,
            PirConditionType::CveId,
            "CVE-2024-",
        )
        .unwrap();

        let assessment = service
            .calculate(&threat, Some("NVD"), Uuid::new_v4(), &[asset], &[pir])
            .unwrap();
        assert_eq!(assessment.pir_match_weight, 0.0);
    }

    #[test]
    fn test_missing_cvss_scores_from_zero() {
        let service = service();
        let threat = threat_with_score(None);
        let assessment = service
            .calculate(&threat, Some("NVD"), Uuid::new_v4(), &[], &[])
            .unwrap();
        assert_eq!(assessment.base_cvss_score, 0.0);
        assert_eq!(assessment.final_risk_score, 0.0);
        assert_eq!(assessment.risk_level, RiskLevel::Low);
    }

    #[test]
    fn test_final_score_clamped_to_ten() {
        let service = service();
        let threat = threat_with_score(Some(10.0));
        let mut asset = sample_asset("crown-jewel", vec![]);
        asset.data_sensitivity = WeightTier::High;
        asset.business_criticality = WeightTier::High;

        let assessment = service
            .calculate(&threat, Some("CISA KEV"), Uuid::new_v4(), &[asset], &[])
            .unwrap();
        assert_eq!(assessment.final_risk_score, 10.0);
        assert_eq!(assessment.risk_level, RiskLevel::Critical);
    }

    #[test]
    fn test_asset_weight_is_mean() {
        let mut sensitive = sample_asset("a", vec![]);
        sensitive.data_sensitivity = WeightTier::High;
        sensitive.business_criticality = WeightTier::High; // 2.25
        let plain = sample_asset("b", vec![]); // 1.0

        let service = service();
        let threat = threat_with_score(Some(5.0));
        let assessment = service
            .calculate(
                &threat,
                Some("NVD"),
                Uuid::new_v4(),
                &[sensitive, plain],
                &[],
            )
            .unwrap();
        assert!((assessment.asset_importance_weight - 1.625).abs() < 1e-9);
        assert_eq!(assessment.affected_asset_count, 2);
        assert!((assessment.asset_count_weight - 0.02).abs() < 1e-9);
    }

    #[test]
    fn test_calculation_details_reproduce_formula() {
        let service = service();
        let threat = threat_with_score(Some(7.5));
        let assessment = service
            .calculate(&threat, Some("NVD"), Uuid::new_v4(), &[], &[])
            .unwrap();
        let details = &assessment.calculation_details;
        assert_eq!(details["base_cvss_score"], 7.5);
        assert!(details["calculation_formula"]
            .as_str()
            .unwrap()
            .starts_with("final_score = 7.5"));
    }

    #[tokio::test]
    async fn test_history_is_append_only() {
        let history = InMemoryRiskHistoryRepository::new();
        let assessment_id = Uuid::new_v4();
        for score in [5.0, 6.5] {
            history
                .append(&RiskHistoryEntry {
                    id: Uuid::new_v4(),
                    assessment_id,
                    threat_id: Uuid::new_v4(),
                    association_id: Uuid::new_v4(),
                    final_risk_score: score,
                    risk_level: RiskLevel::from_score(score),
                    calculation_details: serde_json::json!({}),
                    recorded_at: Utc::now(),
                })
                .await
                .unwrap();
        }

        let entries = history.list_by_assessment(assessment_id).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].final_risk_score, 5.0);
        assert_eq!(entries[1].final_risk_score, 6.5);
    }
}
