// =====================================================================================
// File: core-database/src/postgres.rs
// Description: PostgreSQL connection pool management
// =====================================================================================

use crate::{DatabaseError, DatabaseResult};
use core_config::DatabaseConfig;
use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};
use std::time::Duration;
use tracing::info;

/// Create a PostgreSQL connection pool from the configured limits.
pub async fn create_pool(config: &DatabaseConfig) -> DatabaseResult<Pool<Postgres>> {
    info!("Creating PostgreSQL connection pool");

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.connect_timeout))
        .idle_timeout(Duration::from_secs(config.idle_timeout))
        .max_lifetime(Duration::from_secs(config.max_lifetime))
        .connect(&config.url)
        .await
        .map_err(|e| DatabaseError::Connection(format!("Failed to create pool: {}", e)))?;

    // Fail fast on an unusable pool.
    let _conn = pool
        .acquire()
        .await
        .map_err(|e| DatabaseError::Connection(format!("Failed to acquire connection: {}", e)))?;

    info!("PostgreSQL connection pool created");
    Ok(pool)
}

/// Cheap liveness probe.
pub async fn health_check(pool: &Pool<Postgres>) -> DatabaseResult<()> {
    sqlx::query("SELECT 1")
        .execute(pool)
        .await
        .map_err(|e| DatabaseError::Connection(e.to_string()))?;
    Ok(())
}
