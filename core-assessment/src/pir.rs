// =====================================================================================
// File: core-assessment/src/pir.rs
// Description: Priority intelligence requirements (PIR) and their predicates
// =====================================================================================

use crate::AssessmentResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use core_utils::Validate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

/// PIR priority. Only High-priority matches feed the risk formula.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PirPriority {
    Low,
    Medium,
    High,
}

/// How the condition value is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PirConditionType {
    /// Case-insensitive substring over the threat's product names
    ProductName,
    /// Equality, or prefix match when the value ends with '-'
    CveId,
    /// Case-insensitive substring over the threat type / title
    ThreatType,
    /// `>`/`<` strict comparison, bare number means at-least
    CvssScore,
}

/// Threat attributes a PIR predicate evaluates against.
#[derive(Debug, Clone, Default)]
pub struct PirThreatFacts {
    pub cve: String,
    pub product_names: String,
    pub threat_type: String,
    pub cvss_score: f64,
}

/// An operator-defined priority intelligence rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pir {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub priority: PirPriority,
    pub condition_type: PirConditionType,
    pub condition_value: String,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Pir {
    pub fn create(
        name: &str,
        description: &str,
        priority: PirPriority,
        condition_type: PirConditionType,
        condition_value: &str,
    ) -> AssessmentResult<Self> {
        Validate::not_empty(name, "name")?;
        Validate::not_empty(description, "description")?;
        Validate::not_empty(condition_value, "condition_value")?;

        let now = Utc::now();
        Ok(Self {
            id: Uuid::new_v4(),
            name: name.trim().to_string(),
            description: description.trim().to_string(),
            priority,
            condition_type,
            condition_value: condition_value.trim().to_string(),
            enabled: true,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn update(
        &mut self,
        name: Option<&str>,
        description: Option<&str>,
        priority: Option<PirPriority>,
        condition_type: Option<PirConditionType>,
        condition_value: Option<&str>,
    ) -> AssessmentResult<()> {
        if let Some(name) = name {
            Validate::not_empty(name, "name")?;
            self.name = name.trim().to_string();
        }
        if let Some(description) = description {
            Validate::not_empty(description, "description")?;
            self.description = description.trim().to_string();
        }
        if let Some(priority) = priority {
            self.priority = priority;
        }
        if let Some(condition_type) = condition_type {
            self.condition_type = condition_type;
        }
        if let Some(condition_value) = condition_value {
            Validate::not_empty(condition_value, "condition_value")?;
            self.condition_value = condition_value.trim().to_string();
        }
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn toggle(&mut self) {
        self.enabled = !self.enabled;
        self.updated_at = Utc::now();
    }

    /// Evaluate the predicate. Disabled rules never match; they are ignored
    /// silently rather than raising.
    pub fn matches(&self, facts: &PirThreatFacts) -> bool {
        if !self.enabled {
            return false;
        }

        match self.condition_type {
            PirConditionType::ProductName => facts
                .product_names
                .to_lowercase()
                .contains(&self.condition_value.to_lowercase()),
            PirConditionType::CveId => {
                if self.condition_value.ends_with('-') {
                    facts.cve.starts_with(&self.condition_value)
                } else {
                    facts.cve == self.condition_value
                }
            }
            PirConditionType::ThreatType => facts
                .threat_type
                .to_lowercase()
                .contains(&self.condition_value.to_lowercase()),
            PirConditionType::CvssScore => {
                let value = self.condition_value.trim();
                if let Some(rest) = value.strip_prefix('>') {
                    rest.trim()
                        .parse::<f64>()
                        .map(|threshold| facts.cvss_score > threshold)
                        .unwrap_or(false)
                } else if let Some(rest) = value.strip_prefix('<') {
                    rest.trim()
                        .parse::<f64>()
                        .map(|threshold| facts.cvss_score < threshold)
                        .unwrap_or(false)
                } else {
                    value
                        .parse::<f64>()
                        .map(|threshold| facts.cvss_score >= threshold)
                        .unwrap_or(false)
                }
            }
        }
    }
}

/// Persistence contract for PIRs.
#[async_trait]
pub trait PirRepository: Send + Sync {
    async fn save(&self, pir: &Pir) -> AssessmentResult<()>;
    async fn get(&self, id: Uuid) -> AssessmentResult<Option<Pir>>;
    async fn list_all(&self) -> AssessmentResult<Vec<Pir>>;
    async fn list_enabled(&self) -> AssessmentResult<Vec<Pir>>;
    async fn delete(&self, id: Uuid) -> AssessmentResult<()>;
}

/// In-memory PIR store.
#[derive(Default)]
pub struct InMemoryPirRepository {
    pirs: RwLock<HashMap<Uuid, Pir>>,
}

impl InMemoryPirRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PirRepository for InMemoryPirRepository {
    async fn save(&self, pir: &Pir) -> AssessmentResult<()> {
        debug!(pir_id = %pir.id, name = %pir.name, enabled = pir.enabled, "Saving PIR");
        self.pirs.write().await.insert(pir.id, pir.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> AssessmentResult<Option<Pir>> {
        Ok(self.pirs.read().await.get(&id).cloned())
    }

    async fn list_all(&self) -> AssessmentResult<Vec<Pir>> {
        let mut pirs: Vec<_> = self.pirs.read().await.values().cloned().collect();
        pirs.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(pirs)
    }

    async fn list_enabled(&self) -> AssessmentResult<Vec<Pir>> {
        let mut pirs: Vec<_> = self
            .pirs
            .read()
            .await
            .values()
            .filter(|p| p.enabled)
            .cloned()
            .collect();
        pirs.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(pirs)
    }

    async fn delete(&self, id: Uuid) -> AssessmentResult<()> {
        self.pirs.write().await.remove(&id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pir(condition_type: PirConditionType, condition_value: &str) -> Pir {
        Pir::create(
            "rule",
            "a rule",
            PirPriority::High,
            condition_type,
            condition_value,
        )
        .unwrap()
    }

    #[test]
    fn test_cve_prefix_match() {
        let rule = pir(PirConditionType::CveId, "CVE-2024-");
        let mut facts = PirThreatFacts {
            cve: "CVE-2024-00123".to_string(),
            ..Default::default()
        };
        assert!(rule.matches(&facts));

        facts.cve = "CVE-2023-99999".to_string();
        assert!(!rule.matches(&facts));
    }

    #[test]
    fn test_cve_equality_match() {
        let rule = pir(PirConditionType::CveId, "CVE-2024-12345");
        let facts = PirThreatFacts {
            cve: "CVE-2024-12345".to_string(),
            ..Default::default()
        };
        assert!(rule.matches(&facts));

        let near_miss = PirThreatFacts {
            cve: "CVE-2024-123456".to_string(),
            ..Default::default()
        };
        assert!(!rule.matches(&near_miss));
    }

    #[test]
    fn test_product_name_substring() {
        let rule = pir(PirConditionType::ProductName, "sql server");
        let facts = PirThreatFacts {
            product_names: "Microsoft SQL Server, Windows Server".to_string(),
            ..Default::default()
        };
        assert!(rule.matches(&facts));
    }

    #[test]
    fn test_threat_type_substring() {
        let rule = pir(PirConditionType::ThreatType, "ransomware");
        let facts = PirThreatFacts {
            threat_type: "LockBit Ransomware campaign".to_string(),
            ..Default::default()
        };
        assert!(rule.matches(&facts));
    }

    #[test]
    fn test_cvss_comparators() {
        let strict = pir(PirConditionType::CvssScore, ">7.0");
        let mut facts = PirThreatFacts {
            cvss_score: 7.0,
            ..Default::default()
        };
        assert!(!strict.matches(&facts));
        facts.cvss_score = 7.1;
        assert!(strict.matches(&facts));

        let below = pir(PirConditionType::CvssScore, "< 4.0");
        facts.cvss_score = 3.9;
        assert!(below.matches(&facts));

        // Bare number means at-least.
        let at_least = pir(PirConditionType::CvssScore, "8.0");
        facts.cvss_score = 8.0;
        assert!(at_least.matches(&facts));
        facts.cvss_score = 7.9;
        assert!(!at_least.matches(&facts));
    }

    #[test]
    fn test_disabled_rule_never_matches() {
        let mut rule = pir(PirConditionType::CveId, "CVE-2024-");
        rule.toggle();
        assert!(!rule.enabled);
        let facts = PirThreatFacts {
            cve: "CVE-2024-00123".to_string(),
            ..Default::default()
        };
        assert!(!rule.matches(&facts));
    }

    #[test]
    fn test_create_validation() {
        assert!(Pir::create("", "d", PirPriority::High, PirConditionType::CveId, "x").is_err());
        assert!(Pir::create("n", "d", PirPriority::High, PirConditionType::CveId, " ").is_err());
    }

    #[tokio::test]
    async fn test_repository_enabled_filter() {
        let repository = InMemoryPirRepository::new();
        let enabled = pir(PirConditionType::CveId, "CVE-2024-");
        let mut disabled = pir(PirConditionType::CveId, "CVE-2023-");
        disabled.toggle();
        repository.save(&enabled).await.unwrap();
        repository.save(&disabled).await.unwrap();

        assert_eq!(repository.list_all().await.unwrap().len(), 2);
        let active = repository.list_enabled().await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, enabled.id);
    }
}
