// =====================================================================================
// File: core-database/src/threat_repository.rs
// Description: PostgreSQL threat repository
// =====================================================================================

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use core_extraction::IocBuckets;
use core_threat_intel::{
    Threat, ThreatIntelError, ThreatIntelResult, ThreatProduct, ThreatRepository, ThreatSeverity,
    ThreatStatus,
};
use sqlx::postgres::PgRow;
use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;

/// sqlx-backed threat repository. Products, TTPs and IOC buckets persist as
/// JSONB columns.
pub struct PostgresThreatRepository {
    pool: Pool<Postgres>,
}

impl PostgresThreatRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    fn map_row(row: &PgRow) -> ThreatIntelResult<Threat> {
        let products: serde_json::Value = get(row, "products")?;
        let ttps: serde_json::Value = get(row, "ttps")?;
        let iocs: serde_json::Value = get(row, "iocs")?;

        let products: Vec<ThreatProduct> = serde_json::from_value(products)
            .map_err(|e| ThreatIntelError::Repository(format!("products: {}", e)))?;
        let ttps: Vec<String> = serde_json::from_value(ttps)
            .map_err(|e| ThreatIntelError::Repository(format!("ttps: {}", e)))?;
        let iocs: IocBuckets = serde_json::from_value(iocs)
            .map_err(|e| ThreatIntelError::Repository(format!("iocs: {}", e)))?;

        Ok(Threat {
            id: get(row, "id")?,
            feed_id: get(row, "feed_id")?,
            cve_id: get(row, "cve_id")?,
            title: get(row, "title")?,
            description: get(row, "description")?,
            cvss_base_score: get(row, "cvss_base_score")?,
            cvss_vector: get(row, "cvss_vector")?,
            severity: get::<Option<String>>(row, "severity")?
                .map(|s| severity_from_str(&s))
                .transpose()?,
            status: status_from_str(&get::<String>(row, "status")?)?,
            source_url: get(row, "source_url")?,
            published_at: get(row, "published_at")?,
            collected_at: get(row, "collected_at")?,
            products,
            ttps,
            iocs,
            raw_payload: get(row, "raw_payload")?,
            dedup_key: get(row, "dedup_key")?,
            created_at: get(row, "created_at")?,
            updated_at: get(row, "updated_at")?,
        })
    }
}

fn get<'r, T: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>>(
    row: &'r PgRow,
    column: &str,
) -> ThreatIntelResult<T> {
    row.try_get(column)
        .map_err(|e| ThreatIntelError::Repository(format!("column {}: {}", column, e)))
}

fn severity_to_str(severity: ThreatSeverity) -> &'static str {
    match severity {
        ThreatSeverity::Low => "Low",
        ThreatSeverity::Medium => "Medium",
        ThreatSeverity::High => "High",
        ThreatSeverity::Critical => "Critical",
    }
}

fn severity_from_str(value: &str) -> ThreatIntelResult<ThreatSeverity> {
    match value {
        "Low" => Ok(ThreatSeverity::Low),
        "Medium" => Ok(ThreatSeverity::Medium),
        "High" => Ok(ThreatSeverity::High),
        "Critical" => Ok(ThreatSeverity::Critical),
        other => Err(ThreatIntelError::Repository(format!(
            "unknown severity '{}'",
            other
        ))),
    }
}

fn status_to_str(status: ThreatStatus) -> &'static str {
    match status {
        ThreatStatus::New => "New",
        ThreatStatus::Analyzing => "Analyzing",
        ThreatStatus::Processed => "Processed",
        ThreatStatus::Closed => "Closed",
    }
}

fn status_from_str(value: &str) -> ThreatIntelResult<ThreatStatus> {
    match value {
        "New" => Ok(ThreatStatus::New),
        "Analyzing" => Ok(ThreatStatus::Analyzing),
        "Processed" => Ok(ThreatStatus::Processed),
        "Closed" => Ok(ThreatStatus::Closed),
        other => Err(ThreatIntelError::Repository(format!(
            "unknown status '{}'",
            other
        ))),
    }
}

const UPSERT_SQL: &str = r#"
INSERT INTO threats
    (id, feed_id, cve_id, title, description, cvss_base_score, cvss_vector,
     severity, status, source_url, published_at, collected_at,
     products, ttps, iocs, raw_payload, dedup_key, created_at, updated_at)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19)
ON CONFLICT (dedup_key) DO UPDATE SET
    title = EXCLUDED.title,
    description = EXCLUDED.description,
    cvss_base_score = EXCLUDED.cvss_base_score,
    cvss_vector = EXCLUDED.cvss_vector,
    severity = EXCLUDED.severity,
    status = EXCLUDED.status,
    source_url = EXCLUDED.source_url,
    published_at = EXCLUDED.published_at,
    products = EXCLUDED.products,
    ttps = EXCLUDED.ttps,
    iocs = EXCLUDED.iocs,
    raw_payload = EXCLUDED.raw_payload,
    updated_at = EXCLUDED.updated_at
"#;

#[async_trait]
impl ThreatRepository for PostgresThreatRepository {
    async fn save(&self, threat: &Threat) -> ThreatIntelResult<()> {
        let products = serde_json::to_value(&threat.products)
            .map_err(|e| ThreatIntelError::Repository(e.to_string()))?;
        let ttps = serde_json::to_value(&threat.ttps)
            .map_err(|e| ThreatIntelError::Repository(e.to_string()))?;
        let iocs = serde_json::to_value(&threat.iocs)
            .map_err(|e| ThreatIntelError::Repository(e.to_string()))?;

        sqlx::query(UPSERT_SQL)
            .bind(threat.id)
            .bind(threat.feed_id)
            .bind(&threat.cve_id)
            .bind(&threat.title)
            .bind(&threat.description)
            .bind(threat.cvss_base_score)
            .bind(&threat.cvss_vector)
            .bind(threat.severity.map(severity_to_str))
            .bind(status_to_str(threat.status))
            .bind(&threat.source_url)
            .bind(threat.published_at)
            .bind(threat.collected_at)
            .bind(products)
            .bind(ttps)
            .bind(iocs)
            .bind(&threat.raw_payload)
            .bind(&threat.dedup_key)
            .bind(threat.created_at)
            .bind(threat.updated_at)
            .execute(&self.pool)
            .await
            .map_err(|e| ThreatIntelError::Repository(e.to_string()))?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> ThreatIntelResult<Option<Threat>> {
        let row = sqlx::query("SELECT * FROM threats WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| ThreatIntelError::Repository(e.to_string()))?;
        row.as_ref().map(Self::map_row).transpose()
    }

    async fn find_by_cve(&self, cve_id: &str) -> ThreatIntelResult<Option<Threat>> {
        let row = sqlx::query("SELECT * FROM threats WHERE upper(cve_id) = upper($1)")
            .bind(cve_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| ThreatIntelError::Repository(e.to_string()))?;
        row.as_ref().map(Self::map_row).transpose()
    }

    async fn find_by_dedup_key(&self, dedup_key: &str) -> ThreatIntelResult<Option<Threat>> {
        let row = sqlx::query("SELECT * FROM threats WHERE dedup_key = $1")
            .bind(dedup_key)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| ThreatIntelError::Repository(e.to_string()))?;
        row.as_ref().map(Self::map_row).transpose()
    }

    async fn list_all(&self) -> ThreatIntelResult<Vec<Threat>> {
        let rows = sqlx::query("SELECT * FROM threats ORDER BY collected_at")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| ThreatIntelError::Repository(e.to_string()))?;
        rows.iter().map(Self::map_row).collect()
    }

    async fn list_collected_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> ThreatIntelResult<Vec<Threat>> {
        let rows = sqlx::query(
            "SELECT * FROM threats WHERE collected_at >= $1 AND collected_at <= $2
             ORDER BY collected_at",
        )
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| ThreatIntelError::Repository(e.to_string()))?;
        rows.iter().map(Self::map_row).collect()
    }

    async fn count(&self) -> ThreatIntelResult<u64> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM threats")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| ThreatIntelError::Repository(e.to_string()))?;
        let count: i64 = row
            .try_get("count")
            .map_err(|e| ThreatIntelError::Repository(e.to_string()))?;
        Ok(count as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_mapping_round_trip() {
        for severity in [
            ThreatSeverity::Low,
            ThreatSeverity::Medium,
            ThreatSeverity::High,
            ThreatSeverity::Critical,
        ] {
            assert_eq!(
                severity_from_str(severity_to_str(severity)).unwrap(),
                severity
            );
        }
        assert!(severity_from_str("Catastrophic").is_err());
    }

    #[test]
    fn test_status_mapping_round_trip() {
        for status in [
            ThreatStatus::New,
            ThreatStatus::Analyzing,
            ThreatStatus::Processed,
            ThreatStatus::Closed,
        ] {
            assert_eq!(status_from_str(status_to_str(status)).unwrap(), status);
        }
        assert!(status_from_str("Archived").is_err());
    }
}
