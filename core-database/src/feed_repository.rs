// =====================================================================================
// File: core-database/src/feed_repository.rs
// Description: PostgreSQL feed repository
// =====================================================================================

use async_trait::async_trait;
use core_threat_intel::{
    CollectionFrequency, CollectionStatus, FeedPriority, FeedRepository, ThreatFeed,
    ThreatIntelError, ThreatIntelResult,
};
use sqlx::postgres::PgRow;
use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;

/// sqlx-backed feed repository.
pub struct PostgresFeedRepository {
    pool: Pool<Postgres>,
}

impl PostgresFeedRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    fn map_row(row: &PgRow) -> ThreatIntelResult<ThreatFeed> {
        Ok(ThreatFeed {
            id: get(row, "id")?,
            name: get(row, "name")?,
            priority: priority_from_str(&get::<String>(row, "priority")?)?,
            enabled: get(row, "enabled")?,
            frequency: frequency_from_str(&get::<String>(row, "frequency")?)?,
            credential: get(row, "credential")?,
            last_run_at: get(row, "last_run_at")?,
            last_run_status: get::<Option<String>>(row, "last_run_status")?
                .map(|s| status_from_str(&s))
                .transpose()?,
            last_error: get(row, "last_error")?,
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

fn priority_to_str(priority: FeedPriority) -> &'static str {
    match priority {
        FeedPriority::P0 => "P0",
        FeedPriority::P1 => "P1",
        FeedPriority::P2 => "P2",
        FeedPriority::P3 => "P3",
    }
}

fn priority_from_str(value: &str) -> ThreatIntelResult<FeedPriority> {
    match value {
        "P0" => Ok(FeedPriority::P0),
        "P1" => Ok(FeedPriority::P1),
        "P2" => Ok(FeedPriority::P2),
        "P3" => Ok(FeedPriority::P3),
        other => Err(ThreatIntelError::Repository(format!(
            "unknown priority '{}'",
            other
        ))),
    }
}

fn frequency_to_str(frequency: CollectionFrequency) -> &'static str {
    match frequency {
        CollectionFrequency::Hourly => "hourly",
        CollectionFrequency::Daily => "daily",
        CollectionFrequency::Weekly => "weekly",
        CollectionFrequency::Monthly => "monthly",
    }
}

fn frequency_from_str(value: &str) -> ThreatIntelResult<CollectionFrequency> {
    match value {
        "hourly" => Ok(CollectionFrequency::Hourly),
        "daily" => Ok(CollectionFrequency::Daily),
        "weekly" => Ok(CollectionFrequency::Weekly),
        "monthly" => Ok(CollectionFrequency::Monthly),
        other => Err(ThreatIntelError::Repository(format!(
            "unknown frequency '{}'",
            other
        ))),
    }
}

fn status_to_str(status: CollectionStatus) -> &'static str {
    match status {
        CollectionStatus::Success => "success",
        CollectionStatus::Failed => "failed",
        CollectionStatus::InProgress => "in-progress",
    }
}

fn status_from_str(value: &str) -> ThreatIntelResult<CollectionStatus> {
    match value {
        "success" => Ok(CollectionStatus::Success),
        "failed" => Ok(CollectionStatus::Failed),
        "in-progress" => Ok(CollectionStatus::InProgress),
        other => Err(ThreatIntelError::Repository(format!(
            "unknown collection status '{}'",
            other
        ))),
    }
}

const UPSERT_SQL: &str = r#"
INSERT INTO threat_feeds
    (id, name, priority, enabled, frequency, credential,
     last_run_at, last_run_status, last_error, created_at, updated_at)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
ON CONFLICT (id) DO UPDATE SET
    name = EXCLUDED.name,
    priority = EXCLUDED.priority,
    enabled = EXCLUDED.enabled,
    frequency = EXCLUDED.frequency,
    credential = EXCLUDED.credential,
    last_run_at = EXCLUDED.last_run_at,
    last_run_status = EXCLUDED.last_run_status,
    last_error = EXCLUDED.last_error,
    updated_at = EXCLUDED.updated_at
"#;

#[async_trait]
impl FeedRepository for PostgresFeedRepository {
    async fn save(&self, feed: &ThreatFeed) -> ThreatIntelResult<()> {
        sqlx::query(UPSERT_SQL)
            .bind(feed.id)
            .bind(&feed.name)
            .bind(priority_to_str(feed.priority))
            .bind(feed.enabled)
            .bind(frequency_to_str(feed.frequency))
            .bind(&feed.credential)
            .bind(feed.last_run_at)
            .bind(feed.last_run_status.map(status_to_str))
            .bind(&feed.last_error)
            .bind(feed.created_at)
            .bind(feed.updated_at)
            .execute(&self.pool)
            .await
            .map_err(|e| ThreatIntelError::Repository(e.to_string()))?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> ThreatIntelResult<Option<ThreatFeed>> {
        let row = sqlx::query("SELECT * FROM threat_feeds WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| ThreatIntelError::Repository(e.to_string()))?;
        row.as_ref().map(Self::map_row).transpose()
    }

    async fn get_by_name(&self, name: &str) -> ThreatIntelResult<Option<ThreatFeed>> {
        let row = sqlx::query("SELECT * FROM threat_feeds WHERE name = $1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| ThreatIntelError::Repository(e.to_string()))?;
        row.as_ref().map(Self::map_row).transpose()
    }

    async fn list_all(&self) -> ThreatIntelResult<Vec<ThreatFeed>> {
        let rows = sqlx::query("SELECT * FROM threat_feeds ORDER BY created_at")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| ThreatIntelError::Repository(e.to_string()))?;
        rows.iter().map(Self::map_row).collect()
    }

    async fn list_enabled(&self) -> ThreatIntelResult<Vec<ThreatFeed>> {
        let rows =
            sqlx::query("SELECT * FROM threat_feeds WHERE enabled = TRUE ORDER BY created_at")
                .fetch_all(&self.pool)
                .await
                .map_err(|e| ThreatIntelError::Repository(e.to_string()))?;
        rows.iter().map(Self::map_row).collect()
    }

    async fn delete(&self, id: Uuid) -> ThreatIntelResult<()> {
        sqlx::query("DELETE FROM threat_feeds WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| ThreatIntelError::Repository(e.to_string()))?;
        Ok(())
    }
}
