// =====================================================================================
// File: core-assessment/src/association.rs
// Description: Threat-asset association analysis and persistence
// =====================================================================================

use crate::asset::Asset;
use crate::product_match::{lcs_ratio, normalize_product_name};
use crate::version_match::{match_versions, VersionMatchKind};
use crate::{AssessmentError, AssessmentResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use core_threat_intel::{Threat, ThreatProduct};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

/// Combined product/version match classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    ExactProductExactVersion,
    ExactProductVersionRange,
    ExactProductMajorVersion,
    ExactProductNoVersion,
    FuzzyProductExactVersion,
    FuzzyProductVersionRange,
    FuzzyProductMajorVersion,
    FuzzyProductNoVersion,
    OsMatch,
}

impl MatchKind {
    fn from_parts(exact_name: bool, version: VersionMatchKind) -> Self {
        match (exact_name, version) {
            (true, VersionMatchKind::Exact) => MatchKind::ExactProductExactVersion,
            (true, VersionMatchKind::Range) => MatchKind::ExactProductVersionRange,
            (true, VersionMatchKind::Major) => MatchKind::ExactProductMajorVersion,
            (true, VersionMatchKind::NoVersion) => MatchKind::ExactProductNoVersion,
            (false, VersionMatchKind::Exact) => MatchKind::FuzzyProductExactVersion,
            (false, VersionMatchKind::Range) => MatchKind::FuzzyProductVersionRange,
            (false, VersionMatchKind::Major) => MatchKind::FuzzyProductMajorVersion,
            (false, VersionMatchKind::NoVersion) => MatchKind::FuzzyProductNoVersion,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MatchKind::ExactProductExactVersion => "exact_product_exact_version",
            MatchKind::ExactProductVersionRange => "exact_product_version_range",
            MatchKind::ExactProductMajorVersion => "exact_product_major_version",
            MatchKind::ExactProductNoVersion => "exact_product_no_version",
            MatchKind::FuzzyProductExactVersion => "fuzzy_product_exact_version",
            MatchKind::FuzzyProductVersionRange => "fuzzy_product_version_range",
            MatchKind::FuzzyProductMajorVersion => "fuzzy_product_major_version",
            MatchKind::FuzzyProductNoVersion => "fuzzy_product_no_version",
            MatchKind::OsMatch => "os_match",
        }
    }
}

impl fmt::Display for MatchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A persisted (threat, asset) edge. (threat, asset) is a unique key;
/// re-computation upserts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Association {
    pub id: Uuid,
    pub threat_id: Uuid,
    pub asset_id: Uuid,
    pub confidence: f64,
    pub match_kind: MatchKind,
    pub match_details: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Analysis output before persistence.
#[derive(Debug, Clone)]
pub struct AssociationCandidate {
    pub threat_id: Uuid,
    pub asset_id: Uuid,
    pub confidence: f64,
    pub match_kind: MatchKind,
    pub match_details: serde_json::Value,
}

/// Version-kind confidence multipliers for exact product-name matches.
/// Fuzzy combinations scale by a further 0.9.
fn version_multiplier(version: VersionMatchKind) -> f64 {
    match version {
        VersionMatchKind::Exact => 1.0,
        VersionMatchKind::Range => 0.9,
        VersionMatchKind::Major => 0.8,
        VersionMatchKind::NoVersion => 0.7,
    }
}

const FUZZY_PRODUCT_FACTOR: f64 = 0.9;
const OS_EXACT_CONFIDENCE: f64 = 0.9;
const OS_FUZZY_FACTOR: f64 = 0.8;

/// Fuzzy matcher from one threat against the asset inventory.
pub struct AssociationAnalysisService {
    similarity_threshold: f64,
}

impl AssociationAnalysisService {
    pub fn new() -> Self {
        Self {
            similarity_threshold: 0.8,
        }
    }

    /// Produce the best-scoring candidate per asset; zero-confidence pairs
    /// are dropped.
    pub fn analyze(&self, threat: &Threat, assets: &[Asset]) -> Vec<AssociationCandidate> {
        let mut candidates = Vec::new();
        for asset in assets {
            if let Some(candidate) = self.match_threat_to_asset(threat, asset) {
                if candidate.confidence > 0.0 {
                    debug!(
                        threat_id = %threat.id,
                        asset_id = %asset.id,
                        confidence = candidate.confidence,
                        match_kind = %candidate.match_kind,
                        "Association candidate found"
                    );
                    candidates.push(candidate);
                }
            }
        }
        candidates
    }

    /// Best pair across every (threat product, asset product) combination,
    /// with the OS pass competing on equal terms. One association per
    /// (threat, asset); no combined kinds.
    fn match_threat_to_asset(&self, threat: &Threat, asset: &Asset) -> Option<AssociationCandidate> {
        let mut best: Option<AssociationCandidate> = None;

        for threat_product in &threat.products {
            for asset_product in &asset.products {
                let candidate = self.match_products(
                    threat,
                    asset,
                    threat_product,
                    &asset_product.product_name,
                    asset_product.product_version.as_deref(),
                );
                if let Some(candidate) = candidate {
                    if best
                        .as_ref()
                        .map(|b| candidate.confidence > b.confidence)
                        .unwrap_or(true)
                    {
                        best = Some(candidate);
                    }
                }
            }
        }

        if let Some(candidate) = self.match_operating_system(threat, asset) {
            if best
                .as_ref()
                .map(|b| candidate.confidence > b.confidence)
                .unwrap_or(true)
            {
                best = Some(candidate);
            }
        }

        best
    }

    fn match_products(
        &self,
        threat: &Threat,
        asset: &Asset,
        threat_product: &ThreatProduct,
        asset_product_name: &str,
        asset_product_version: Option<&str>,
    ) -> Option<AssociationCandidate> {
        let threat_name = normalize_product_name(&threat_product.product_name);
        let asset_name = normalize_product_name(asset_product_name);
        if threat_name.is_empty() || asset_name.is_empty() {
            return None;
        }

        let (exact_name, name_base) = if threat_name == asset_name {
            (true, 1.0)
        } else {
            let similarity = lcs_ratio(&threat_name, &asset_name);
            if similarity < self.similarity_threshold {
                return None;
            }
            (false, similarity)
        };

        let version = match_versions(
            threat_product.product_version.as_deref(),
            asset_product_version,
        )?;

        let mut multiplier = version_multiplier(version);
        if !exact_name {
            multiplier *= FUZZY_PRODUCT_FACTOR;
        }
        let confidence = (name_base * multiplier).clamp(0.0, 1.0);

        Some(AssociationCandidate {
            threat_id: threat.id,
            asset_id: asset.id,
            confidence,
            match_kind: MatchKind::from_parts(exact_name, version),
            match_details: serde_json::json!({
                "threat_product": threat_product.product_name,
                "threat_version": threat_product.product_version,
                "asset_product": asset_product_name,
                "asset_version": asset_product_version,
            }),
        })
    }

    /// OS-typed threat products matched against the asset's operating
    /// system label.
    fn match_operating_system(&self, threat: &Threat, asset: &Asset) -> Option<AssociationCandidate> {
        let asset_os = normalize_product_name(&asset.operating_system);
        if asset_os.is_empty() {
            return None;
        }

        let mut best: Option<AssociationCandidate> = None;
        for product in threat.products.iter().filter(|p| p.is_operating_system()) {
            let threat_os = normalize_product_name(&product.product_name);
            if threat_os.is_empty() {
                continue;
            }

            let confidence = if threat_os == asset_os {
                OS_EXACT_CONFIDENCE
            } else {
                let similarity = lcs_ratio(&threat_os, &asset_os);
                if similarity < self.similarity_threshold {
                    continue;
                }
                OS_FUZZY_FACTOR * similarity
            };

            let candidate = AssociationCandidate {
                threat_id: threat.id,
                asset_id: asset.id,
                confidence,
                match_kind: MatchKind::OsMatch,
                match_details: serde_json::json!({
                    "threat_os": product.product_name,
                    "asset_os": asset.operating_system,
                }),
            };

            if best
                .as_ref()
                .map(|b| candidate.confidence > b.confidence)
                .unwrap_or(true)
            {
                best = Some(candidate);
            }
        }
        best
    }
}

impl Default for AssociationAnalysisService {
    fn default() -> Self {
        Self::new()
    }
}

/// Persistence contract for associations.
#[async_trait]
pub trait AssociationRepository: Send + Sync {
    /// Insert or update the unique (threat, asset) edge.
    async fn upsert(&self, candidate: &AssociationCandidate) -> AssessmentResult<Association>;
    async fn get(&self, id: Uuid) -> AssessmentResult<Option<Association>>;
    async fn list_by_threat(&self, threat_id: Uuid) -> AssessmentResult<Vec<Association>>;
    async fn list_by_asset(&self, asset_id: Uuid) -> AssessmentResult<Vec<Association>>;
    async fn delete(&self, id: Uuid) -> AssessmentResult<()>;
}

/// In-memory association store.
#[derive(Default)]
pub struct InMemoryAssociationRepository {
    by_key: RwLock<HashMap<(Uuid, Uuid), Association>>,
}

impl InMemoryAssociationRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AssociationRepository for InMemoryAssociationRepository {
    async fn upsert(&self, candidate: &AssociationCandidate) -> AssessmentResult<Association> {
        if !(0.0..=1.0).contains(&candidate.confidence) {
            return Err(AssessmentError::Invariant(format!(
                "association confidence out of range: {}",
                candidate.confidence
            )));
        }

        let mut map = self.by_key.write().await;
        let key = (candidate.threat_id, candidate.asset_id);
        let now = Utc::now();

        let association = match map.get(&key) {
            Some(existing) => Association {
                id: existing.id,
                threat_id: candidate.threat_id,
                asset_id: candidate.asset_id,
                confidence: candidate.confidence,
                match_kind: candidate.match_kind,
                match_details: candidate.match_details.clone(),
                created_at: existing.created_at,
                updated_at: now,
            },
            None => Association {
                id: Uuid::new_v4(),
                threat_id: candidate.threat_id,
                asset_id: candidate.asset_id,
                confidence: candidate.confidence,
                match_kind: candidate.match_kind,
                match_details: candidate.match_details.clone(),
                created_at: now,
                updated_at: now,
            },
        };

        map.insert(key, association.clone());
        Ok(association)
    }

    async fn get(&self, id: Uuid) -> AssessmentResult<Option<Association>> {
        Ok(self
            .by_key
            .read()
            .await
            .values()
            .find(|a| a.id == id)
            .cloned())
    }

    async fn list_by_threat(&self, threat_id: Uuid) -> AssessmentResult<Vec<Association>> {
        let mut associations: Vec<_> = self
            .by_key
            .read()
            .await
            .values()
            .filter(|a| a.threat_id == threat_id)
            .cloned()
            .collect();
        associations.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(associations)
    }

    async fn list_by_asset(&self, asset_id: Uuid) -> AssessmentResult<Vec<Association>> {
        let mut associations: Vec<_> = self
            .by_key
            .read()
            .await
            .values()
            .filter(|a| a.asset_id == asset_id)
            .cloned()
            .collect();
        associations.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(associations)
    }

    async fn delete(&self, id: Uuid) -> AssessmentResult<()> {
        let mut map = self.by_key.write().await;
        map.retain(|_, a| a.id != id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::{sample_asset, AssetProduct};
    use core_threat_intel::Threat;

    fn threat_with_product(name: &str, version: Option<&str>) -> Threat {
        let mut threat = Threat::create(
            Uuid::new_v4(),
            "Test advisory",
            None,
            Some("CVE-2024-12345".to_string()),
            Some(9.8),
            None,
            None,
            None,
            None,
        )
        .unwrap();
        threat.add_product(name, version.map(str::to_string), None, None);
        threat
    }

    #[test]
    fn test_exact_product_no_version_confidence() {
        // "SQL Server 2019" x "Microsoft SQL Server": same normalised name,
        // threat version absent, asset version present -> no_version at 0.7.
        let service = AssociationAnalysisService::new();
        let threat = threat_with_product("SQL Server 2019", None);
        let asset = sample_asset(
            "db-01",
            vec![AssetProduct::new("Microsoft SQL Server", Some("15.0.2000"))],
        );

        let candidates = service.analyze(&threat, std::slice::from_ref(&asset));
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].match_kind, MatchKind::ExactProductNoVersion);
        assert!((candidates[0].confidence - 0.70).abs() < 1e-9);
    }

    #[test]
    fn test_exact_product_version_range_confidence() {
        // ESXi "7.0.x" covers the asset's 7.0.3 at 0.9.
        let service = AssociationAnalysisService::new();
        let threat = threat_with_product("VMware ESXi", Some("7.0.x"));
        let asset = sample_asset(
            "esx-01",
            vec![AssetProduct::new("VMware ESXi", Some("7.0.3"))],
        );

        let candidates = service.analyze(&threat, std::slice::from_ref(&asset));
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].match_kind, MatchKind::ExactProductVersionRange);
        assert!((candidates[0].confidence - 0.9).abs() < 1e-9);
    }

    #[test]
    fn test_asset_version_missing_is_no_match() {
        let service = AssociationAnalysisService::new();
        let threat = threat_with_product("VMware ESXi", Some("7.0.x"));
        let asset = sample_asset("esx-02", vec![AssetProduct::new("VMware ESXi", None)]);
        assert!(service.analyze(&threat, &[asset]).is_empty());
    }

    #[test]
    fn test_unrelated_products_do_not_match() {
        let service = AssociationAnalysisService::new();
        let threat = threat_with_product("Apache Tomcat", Some("9.0"));
        let asset = sample_asset("db-02", vec![AssetProduct::new("MongoDB", Some("6.0"))]);
        assert!(service.analyze(&threat, &[asset]).is_empty());
    }

    #[test]
    fn test_os_match() {
        let service = AssociationAnalysisService::new();
        let mut threat = Threat::create(
            Uuid::new_v4(),
            "Windows kernel advisory",
            None,
            Some("CVE-2024-0001".to_string()),
            Some(7.8),
            None,
            None,
            None,
            None,
        )
        .unwrap();
        threat.add_product(
            "Windows Server 2019",
            None,
            Some("Operating System".to_string()),
            None,
        );

        let asset = sample_asset("dc-01", vec![]);
        let candidates = service.analyze(&threat, std::slice::from_ref(&asset));
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].match_kind, MatchKind::OsMatch);
        assert!((candidates[0].confidence - 0.9).abs() < 1e-9);
    }

    #[test]
    fn test_best_pair_wins() {
        // Both a weak product match and a strong OS match exist; the single
        // recorded association carries the higher confidence.
        let service = AssociationAnalysisService::new();
        let mut threat = threat_with_product("Windows Server", Some("2019"));
        threat.add_product(
            "Windows Server 2019",
            None,
            Some("Operating System".to_string()),
            None,
        );
        let asset = sample_asset(
            "dc-02",
            vec![AssetProduct::new("Windows Server", Some("2022"))],
        );

        let candidates = service.analyze(&threat, std::slice::from_ref(&asset));
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].match_kind, MatchKind::OsMatch);
    }

    #[tokio::test]
    async fn test_upsert_is_unique_per_pair() {
        let repository = InMemoryAssociationRepository::new();
        let threat_id = Uuid::new_v4();
        let asset_id = Uuid::new_v4();
        let candidate = AssociationCandidate {
            threat_id,
            asset_id,
            confidence: 0.7,
            match_kind: MatchKind::ExactProductNoVersion,
            match_details: serde_json::json!({}),
        };

        let first = repository.upsert(&candidate).await.unwrap();
        let second = repository
            .upsert(&AssociationCandidate {
                confidence: 0.9,
                match_kind: MatchKind::ExactProductVersionRange,
                ..candidate.clone()
            })
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.confidence, 0.9);
        assert_eq!(
            repository.list_by_threat(threat_id).await.unwrap().len(),
            1
        );
    }

    #[tokio::test]
    async fn test_out_of_range_confidence_rejected() {
        let repository = InMemoryAssociationRepository::new();
        let candidate = AssociationCandidate {
            threat_id: Uuid::new_v4(),
            asset_id: Uuid::new_v4(),
            confidence: 1.5,
            match_kind: MatchKind::OsMatch,
            match_details: serde_json::json!({}),
        };
        assert!(repository.upsert(&candidate).await.is_err());
    }

    #[test]
    fn test_recorrelation_is_deterministic() {
        let service = AssociationAnalysisService::new();
        let threat = threat_with_product("PostgreSQL", Some("15.2"));
        let asset = sample_asset(
            "db-03",
            vec![AssetProduct::new("Postgres", Some("15.2"))],
        );

        let first = service.analyze(&threat, std::slice::from_ref(&asset));
        let second = service.analyze(&threat, std::slice::from_ref(&asset));
        assert_eq!(first.len(), second.len());
        assert!((first[0].confidence - second[0].confidence).abs() < 1e-9);
        assert_eq!(first[0].match_kind, second[0].match_kind);
    }
}
