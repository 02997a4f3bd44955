// =====================================================================================
// File: core-database/src/audit_repository.rs
// Description: PostgreSQL audit store (insert and select only)
// =====================================================================================

use async_trait::async_trait;
use core_audit::{AuditAction, AuditEntry, AuditError, AuditQuery, AuditResult, AuditStore};
use sqlx::postgres::PgRow;
use sqlx::{Pool, Postgres, Row};

fn get<'r, T: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>>(
    row: &'r PgRow,
    column: &str,
) -> AuditResult<T> {
    row.try_get(column)
        .map_err(|e| AuditError::Storage(format!("column {}: {}", column, e)))
}

fn action_to_str(action: AuditAction) -> &'static str {
    action.as_str()
}

fn action_from_str(value: &str) -> AuditResult<AuditAction> {
    match value {
        "CREATE" => Ok(AuditAction::Create),
        "UPDATE" => Ok(AuditAction::Update),
        "DELETE" => Ok(AuditAction::Delete),
        "IMPORT" => Ok(AuditAction::Import),
        "VIEW" => Ok(AuditAction::View),
        "TOGGLE" => Ok(AuditAction::Toggle),
        "EXPORT" => Ok(AuditAction::Export),
        "LOGIN" => Ok(AuditAction::Login),
        "LOGOUT" => Ok(AuditAction::Logout),
        other => Err(AuditError::Storage(format!("unknown action '{}'", other))),
    }
}

/// sqlx-backed audit store. This type deliberately has no update or delete
/// statement; the table is written once per entry and only ever read back.
pub struct PostgresAuditStore {
    pool: Pool<Postgres>,
}

impl PostgresAuditStore {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    fn map_row(row: &PgRow) -> AuditResult<AuditEntry> {
        Ok(AuditEntry {
            id: get(row, "id")?,
            subject_id: get(row, "subject_id")?,
            action: action_from_str(&get::<String>(row, "action")?)?,
            resource_kind: get(row, "resource_kind")?,
            resource_id: get(row, "resource_id")?,
            details: get(row, "details")?,
            ip_address: get(row, "ip_address")?,
            user_agent: get(row, "user_agent")?,
            created_at: get(row, "created_at")?,
        })
    }
}

#[async_trait]
impl AuditStore for PostgresAuditStore {
    async fn record(&self, entry: AuditEntry) -> AuditResult<()> {
        let result = sqlx::query(
            "INSERT INTO audit_log
                (id, subject_id, action, resource_kind, resource_id,
                 details, ip_address, user_agent, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(entry.id)
        .bind(&entry.subject_id)
        .bind(action_to_str(entry.action))
        .bind(&entry.resource_kind)
        .bind(&entry.resource_id)
        .bind(&entry.details)
        .bind(&entry.ip_address)
        .bind(&entry.user_agent)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                Err(AuditError::DuplicateEntry(entry.id))
            }
            Err(e) => Err(AuditError::Storage(e.to_string())),
        }
    }

    async fn query(&self, query: &AuditQuery) -> AuditResult<Vec<AuditEntry>> {
        // Conjunctive filter set; NULL parameters disable their clause.
        let limit = query.limit.map(|l| l as i64).unwrap_or(1000);
        let rows = sqlx::query(
            "SELECT * FROM audit_log
             WHERE ($1::TEXT IS NULL OR subject_id = $1)
               AND ($2::TEXT IS NULL OR action = $2)
               AND ($3::TEXT IS NULL OR resource_kind = $3)
               AND ($4::TEXT IS NULL OR resource_id = $4)
               AND ($5::TIMESTAMPTZ IS NULL OR created_at >= $5)
               AND ($6::TIMESTAMPTZ IS NULL OR created_at <= $6)
             ORDER BY created_at DESC
             LIMIT $7",
        )
        .bind(&query.subject_id)
        .bind(query.action.map(action_to_str))
        .bind(&query.resource_kind)
        .bind(&query.resource_id)
        .bind(query.from)
        .bind(query.to)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AuditError::Storage(e.to_string()))?;

        rows.iter().map(Self::map_row).collect()
    }
}
