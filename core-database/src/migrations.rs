// =====================================================================================
// File: core-database/src/migrations.rs
// Description: Embedded schema migrations
// =====================================================================================

use crate::{DatabaseError, DatabaseResult};
use sqlx::{Pool, Postgres};
use tracing::info;

/// Ordered migration list. Each entry runs once; applied versions are
/// tracked in `schema_migrations`.
const MIGRATIONS: &[(&str, &str)] = &[
    (
        "0001_threat_feeds",
        r#"
        CREATE TABLE IF NOT EXISTS threat_feeds (
            id UUID PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            priority TEXT NOT NULL,
            enabled BOOLEAN NOT NULL DEFAULT TRUE,
            frequency TEXT NOT NULL,
            credential TEXT,
            last_run_at TIMESTAMPTZ,
            last_run_status TEXT,
            last_error TEXT,
            created_at TIMESTAMPTZ NOT NULL,
            updated_at TIMESTAMPTZ NOT NULL
        )
        "#,
    ),
    (
        "0002_threats",
        r#"
        CREATE TABLE IF NOT EXISTS threats (
            id UUID PRIMARY KEY,
            feed_id UUID NOT NULL,
            cve_id TEXT,
            title TEXT NOT NULL,
            description TEXT,
            cvss_base_score DOUBLE PRECISION,
            cvss_vector TEXT,
            severity TEXT,
            status TEXT NOT NULL,
            source_url TEXT,
            published_at TIMESTAMPTZ,
            collected_at TIMESTAMPTZ NOT NULL,
            products JSONB NOT NULL DEFAULT '[]',
            ttps JSONB NOT NULL DEFAULT '[]',
            iocs JSONB NOT NULL DEFAULT '{}',
            raw_payload TEXT,
            dedup_key TEXT NOT NULL UNIQUE,
            created_at TIMESTAMPTZ NOT NULL,
            updated_at TIMESTAMPTZ NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_threats_cve ON threats (cve_id);
        CREATE INDEX IF NOT EXISTS idx_threats_collected_at ON threats (collected_at)
        "#,
    ),
    (
        "0003_associations",
        r#"
        CREATE TABLE IF NOT EXISTS threat_asset_associations (
            id UUID PRIMARY KEY,
            threat_id UUID NOT NULL,
            asset_id UUID NOT NULL,
            confidence DOUBLE PRECISION NOT NULL,
            match_kind TEXT NOT NULL,
            match_details JSONB NOT NULL DEFAULT '{}',
            created_at TIMESTAMPTZ NOT NULL,
            updated_at TIMESTAMPTZ NOT NULL,
            UNIQUE (threat_id, asset_id)
        )
        "#,
    ),
    (
        "0004_risk_assessments",
        r#"
        CREATE TABLE IF NOT EXISTS risk_assessments (
            id UUID PRIMARY KEY,
            threat_id UUID NOT NULL,
            association_id UUID NOT NULL UNIQUE,
            base_cvss_score DOUBLE PRECISION NOT NULL,
            asset_importance_weight DOUBLE PRECISION NOT NULL,
            affected_asset_count INTEGER NOT NULL,
            asset_count_weight DOUBLE PRECISION NOT NULL,
            pir_match_weight DOUBLE PRECISION NOT NULL,
            kev_weight DOUBLE PRECISION NOT NULL,
            final_risk_score DOUBLE PRECISION NOT NULL
                CHECK (final_risk_score >= 0.0 AND final_risk_score <= 10.0),
            risk_level TEXT NOT NULL,
            calculation_details JSONB NOT NULL DEFAULT '{}',
            created_at TIMESTAMPTZ NOT NULL,
            updated_at TIMESTAMPTZ NOT NULL
        )
        "#,
    ),
    (
        "0005_risk_assessment_history",
        r#"
        CREATE TABLE IF NOT EXISTS risk_assessment_history (
            id UUID PRIMARY KEY,
            assessment_id UUID NOT NULL,
            threat_id UUID NOT NULL,
            association_id UUID NOT NULL,
            final_risk_score DOUBLE PRECISION NOT NULL,
            risk_level TEXT NOT NULL,
            calculation_details JSONB NOT NULL DEFAULT '{}',
            recorded_at TIMESTAMPTZ NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_history_assessment
            ON risk_assessment_history (assessment_id)
        "#,
    ),
    (
        "0006_audit_log",
        r#"
        CREATE TABLE IF NOT EXISTS audit_log (
            id UUID PRIMARY KEY,
            subject_id TEXT,
            action TEXT NOT NULL,
            resource_kind TEXT NOT NULL,
            resource_id TEXT,
            details JSONB NOT NULL DEFAULT '{}',
            ip_address TEXT,
            user_agent TEXT,
            created_at TIMESTAMPTZ NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_audit_subject ON audit_log (subject_id);
        CREATE INDEX IF NOT EXISTS idx_audit_created_at ON audit_log (created_at)
        "#,
    ),
];

/// Apply any pending migrations.
pub async fn run_migrations(pool: &Pool<Postgres>) -> DatabaseResult<()> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version TEXT PRIMARY KEY,
            applied_at TIMESTAMPTZ NOT NULL DEFAULT now()
        )",
    )
    .execute(pool)
    .await
    .map_err(|e| DatabaseError::Migration(e.to_string()))?;

    for (version, sql) in MIGRATIONS {
        let applied: Option<(String,)> =
            sqlx::query_as("SELECT version FROM schema_migrations WHERE version = $1")
                .bind(version)
                .fetch_optional(pool)
                .await
                .map_err(|e| DatabaseError::Migration(e.to_string()))?;
        if applied.is_some() {
            continue;
        }

        info!(version = %version, "Applying migration");
        for statement in sql.split(';').filter(|s| !s.trim().is_empty()) {
            sqlx::query(statement)
                .execute(pool)
                .await
                .map_err(|e| DatabaseError::Migration(format!("{}: {}", version, e)))?;
        }
        sqlx::query("INSERT INTO schema_migrations (version) VALUES ($1)")
            .bind(version)
            .execute(pool)
            .await
            .map_err(|e| DatabaseError::Migration(e.to_string()))?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_are_ordered_and_unique() {
        let mut versions: Vec<&str> = MIGRATIONS.iter().map(|(v, _)| *v).collect();
        let original = versions.clone();
        versions.sort();
        versions.dedup();
        assert_eq!(versions, original);
    }

    #[test]
    fn test_audit_migration_has_no_destructive_statements() {
        let (_, sql) = MIGRATIONS
            .iter()
            .find(|(v, _)| *v == "0006_audit_log")
            .unwrap();
        let lowered = sql.to_lowercase();
        assert!(!lowered.contains("drop "));
        assert!(!lowered.contains("delete "));
        assert!(!lowered.contains("update "));
    }
}
