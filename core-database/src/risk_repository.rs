// =====================================================================================
// File: core-database/src/risk_repository.rs
// Description: PostgreSQL association, assessment and history repositories
// =====================================================================================

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use core_assessment::{
    AssessmentError, AssessmentResult, Association, AssociationCandidate, AssociationRepository,
    MatchKind, RiskAssessment, RiskAssessmentRepository, RiskHistoryEntry, RiskHistoryRepository,
    RiskLevel,
};
use sqlx::postgres::PgRow;
use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;

fn get<'r, T: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>>(
    row: &'r PgRow,
    column: &str,
) -> AssessmentResult<T> {
    row.try_get(column)
        .map_err(|e| AssessmentError::Repository(format!("column {}: {}", column, e)))
}

fn match_kind_from_str(value: &str) -> AssessmentResult<MatchKind> {
    serde_json::from_value(serde_json::Value::String(value.to_string()))
        .map_err(|_| AssessmentError::Repository(format!("unknown match kind '{}'", value)))
}

fn risk_level_to_str(level: RiskLevel) -> &'static str {
    match level {
        RiskLevel::Low => "Low",
        RiskLevel::Medium => "Medium",
        RiskLevel::High => "High",
        RiskLevel::Critical => "Critical",
    }
}

fn risk_level_from_str(value: &str) -> AssessmentResult<RiskLevel> {
    match value {
        "Low" => Ok(RiskLevel::Low),
        "Medium" => Ok(RiskLevel::Medium),
        "High" => Ok(RiskLevel::High),
        "Critical" => Ok(RiskLevel::Critical),
        other => Err(AssessmentError::Repository(format!(
            "unknown risk level '{}'",
            other
        ))),
    }
}

/// sqlx-backed association repository. (threat, asset) uniqueness is
/// enforced by the table constraint; the upsert rides on it.
pub struct PostgresAssociationRepository {
    pool: Pool<Postgres>,
}

impl PostgresAssociationRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    fn map_row(row: &PgRow) -> AssessmentResult<Association> {
        Ok(Association {
            id: get(row, "id")?,
            threat_id: get(row, "threat_id")?,
            asset_id: get(row, "asset_id")?,
            confidence: get(row, "confidence")?,
            match_kind: match_kind_from_str(&get::<String>(row, "match_kind")?)?,
            match_details: get(row, "match_details")?,
            created_at: get(row, "created_at")?,
            updated_at: get(row, "updated_at")?,
        })
    }
}

const ASSOCIATION_UPSERT_SQL: &str = r#"
INSERT INTO threat_asset_associations
    (id, threat_id, asset_id, confidence, match_kind, match_details, created_at, updated_at)
VALUES ($1, $2, $3, $4, $5, $6, now(), now())
ON CONFLICT (threat_id, asset_id) DO UPDATE SET
    confidence = EXCLUDED.confidence,
    match_kind = EXCLUDED.match_kind,
    match_details = EXCLUDED.match_details,
    updated_at = now()
RETURNING *
"#;

#[async_trait]
impl AssociationRepository for PostgresAssociationRepository {
    async fn upsert(&self, candidate: &AssociationCandidate) -> AssessmentResult<Association> {
        if !(0.0..=1.0).contains(&candidate.confidence) {
            return Err(AssessmentError::Invariant(format!(
                "association confidence out of range: {}",
                candidate.confidence
            )));
        }

        let match_kind = candidate.match_kind.as_str();
        let row = sqlx::query(ASSOCIATION_UPSERT_SQL)
            .bind(Uuid::new_v4())
            .bind(candidate.threat_id)
            .bind(candidate.asset_id)
            .bind(candidate.confidence)
            .bind(match_kind)
            .bind(&candidate.match_details)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| AssessmentError::Repository(e.to_string()))?;
        Self::map_row(&row)
    }

    async fn get(&self, id: Uuid) -> AssessmentResult<Option<Association>> {
        let row = sqlx::query("SELECT * FROM threat_asset_associations WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AssessmentError::Repository(e.to_string()))?;
        row.as_ref().map(Self::map_row).transpose()
    }

    async fn list_by_threat(&self, threat_id: Uuid) -> AssessmentResult<Vec<Association>> {
        let rows = sqlx::query(
            "SELECT * FROM threat_asset_associations WHERE threat_id = $1 ORDER BY created_at",
        )
        .bind(threat_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AssessmentError::Repository(e.to_string()))?;
        rows.iter().map(Self::map_row).collect()
    }

    async fn list_by_asset(&self, asset_id: Uuid) -> AssessmentResult<Vec<Association>> {
        let rows = sqlx::query(
            "SELECT * FROM threat_asset_associations WHERE asset_id = $1 ORDER BY created_at",
        )
        .bind(asset_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AssessmentError::Repository(e.to_string()))?;
        rows.iter().map(Self::map_row).collect()
    }

    async fn delete(&self, id: Uuid) -> AssessmentResult<()> {
        sqlx::query("DELETE FROM threat_asset_associations WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| AssessmentError::Repository(e.to_string()))?;
        Ok(())
    }
}

/// sqlx-backed assessment repository; one row per association.
pub struct PostgresRiskAssessmentRepository {
    pool: Pool<Postgres>,
}

impl PostgresRiskAssessmentRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    fn map_row(row: &PgRow) -> AssessmentResult<RiskAssessment> {
        let affected: i32 = get(row, "affected_asset_count")?;
        Ok(RiskAssessment {
            id: get(row, "id")?,
            threat_id: get(row, "threat_id")?,
            association_id: get(row, "association_id")?,
            base_cvss_score: get(row, "base_cvss_score")?,
            asset_importance_weight: get(row, "asset_importance_weight")?,
            affected_asset_count: affected as u32,
            asset_count_weight: get(row, "asset_count_weight")?,
            pir_match_weight: get(row, "pir_match_weight")?,
            kev_weight: get(row, "kev_weight")?,
            final_risk_score: get(row, "final_risk_score")?,
            risk_level: risk_level_from_str(&get::<String>(row, "risk_level")?)?,
            calculation_details: get(row, "calculation_details")?,
            created_at: get(row, "created_at")?,
            updated_at: get(row, "updated_at")?,
        })
    }
}

const ASSESSMENT_UPSERT_SQL: &str = r#"
INSERT INTO risk_assessments
    (id, threat_id, association_id, base_cvss_score, asset_importance_weight,
     affected_asset_count, asset_count_weight, pir_match_weight, kev_weight,
     final_risk_score, risk_level, calculation_details, created_at, updated_at)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
ON CONFLICT (association_id) DO UPDATE SET
    base_cvss_score = EXCLUDED.base_cvss_score,
    asset_importance_weight = EXCLUDED.asset_importance_weight,
    affected_asset_count = EXCLUDED.affected_asset_count,
    asset_count_weight = EXCLUDED.asset_count_weight,
    pir_match_weight = EXCLUDED.pir_match_weight,
    kev_weight = EXCLUDED.kev_weight,
    final_risk_score = EXCLUDED.final_risk_score,
    risk_level = EXCLUDED.risk_level,
    calculation_details = EXCLUDED.calculation_details,
    updated_at = EXCLUDED.updated_at
"#;

#[async_trait]
impl RiskAssessmentRepository for PostgresRiskAssessmentRepository {
    async fn save(&self, assessment: &RiskAssessment) -> AssessmentResult<()> {
        sqlx::query(ASSESSMENT_UPSERT_SQL)
            .bind(assessment.id)
            .bind(assessment.threat_id)
            .bind(assessment.association_id)
            .bind(assessment.base_cvss_score)
            .bind(assessment.asset_importance_weight)
            .bind(assessment.affected_asset_count as i32)
            .bind(assessment.asset_count_weight)
            .bind(assessment.pir_match_weight)
            .bind(assessment.kev_weight)
            .bind(assessment.final_risk_score)
            .bind(risk_level_to_str(assessment.risk_level))
            .bind(&assessment.calculation_details)
            .bind(assessment.created_at)
            .bind(assessment.updated_at)
            .execute(&self.pool)
            .await
            .map_err(|e| AssessmentError::Repository(e.to_string()))?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> AssessmentResult<Option<RiskAssessment>> {
        let row = sqlx::query("SELECT * FROM risk_assessments WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AssessmentError::Repository(e.to_string()))?;
        row.as_ref().map(Self::map_row).transpose()
    }

    async fn find_by_association(
        &self,
        association_id: Uuid,
    ) -> AssessmentResult<Option<RiskAssessment>> {
        let row = sqlx::query("SELECT * FROM risk_assessments WHERE association_id = $1")
            .bind(association_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AssessmentError::Repository(e.to_string()))?;
        row.as_ref().map(Self::map_row).transpose()
    }

    async fn list_by_threat(&self, threat_id: Uuid) -> AssessmentResult<Vec<RiskAssessment>> {
        let rows =
            sqlx::query("SELECT * FROM risk_assessments WHERE threat_id = $1 ORDER BY created_at")
                .bind(threat_id)
                .fetch_all(&self.pool)
                .await
                .map_err(|e| AssessmentError::Repository(e.to_string()))?;
        rows.iter().map(Self::map_row).collect()
    }

    async fn list_completed_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> AssessmentResult<Vec<RiskAssessment>> {
        let rows = sqlx::query(
            "SELECT * FROM risk_assessments WHERE updated_at >= $1 AND updated_at <= $2
             ORDER BY updated_at",
        )
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AssessmentError::Repository(e.to_string()))?;
        rows.iter().map(Self::map_row).collect()
    }
}

/// sqlx-backed history repository: insert and select, never update or
/// delete.
pub struct PostgresRiskHistoryRepository {
    pool: Pool<Postgres>,
}

impl PostgresRiskHistoryRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    fn map_row(row: &PgRow) -> AssessmentResult<RiskHistoryEntry> {
        Ok(RiskHistoryEntry {
            id: get(row, "id")?,
            assessment_id: get(row, "assessment_id")?,
            threat_id: get(row, "threat_id")?,
            association_id: get(row, "association_id")?,
            final_risk_score: get(row, "final_risk_score")?,
            risk_level: risk_level_from_str(&get::<String>(row, "risk_level")?)?,
            calculation_details: get(row, "calculation_details")?,
            recorded_at: get(row, "recorded_at")?,
        })
    }
}

#[async_trait]
impl RiskHistoryRepository for PostgresRiskHistoryRepository {
    async fn append(&self, entry: &RiskHistoryEntry) -> AssessmentResult<()> {
        sqlx::query(
            "INSERT INTO risk_assessment_history
                (id, assessment_id, threat_id, association_id, final_risk_score,
                 risk_level, calculation_details, recorded_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(entry.id)
        .bind(entry.assessment_id)
        .bind(entry.threat_id)
        .bind(entry.association_id)
        .bind(entry.final_risk_score)
        .bind(risk_level_to_str(entry.risk_level))
        .bind(&entry.calculation_details)
        .bind(entry.recorded_at)
        .execute(&self.pool)
        .await
        .map_err(|e| AssessmentError::Repository(e.to_string()))?;
        Ok(())
    }

    async fn list_by_assessment(
        &self,
        assessment_id: Uuid,
    ) -> AssessmentResult<Vec<RiskHistoryEntry>> {
        let rows = sqlx::query(
            "SELECT * FROM risk_assessment_history WHERE assessment_id = $1
             ORDER BY recorded_at",
        )
        .bind(assessment_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AssessmentError::Repository(e.to_string()))?;
        rows.iter().map(Self::map_row).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_risk_level_mapping_round_trip() {
        for level in [
            RiskLevel::Low,
            RiskLevel::Medium,
            RiskLevel::High,
            RiskLevel::Critical,
        ] {
            assert_eq!(risk_level_from_str(risk_level_to_str(level)).unwrap(), level);
        }
        assert!(risk_level_from_str("Severe").is_err());
    }

    #[test]
    fn test_match_kind_parses_snake_case() {
        assert_eq!(
            match_kind_from_str("exact_product_no_version").unwrap(),
            MatchKind::ExactProductNoVersion
        );
        assert_eq!(match_kind_from_str("os_match").unwrap(), MatchKind::OsMatch);
        assert!(match_kind_from_str("bogus_kind").is_err());
    }
}
