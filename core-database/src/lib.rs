// =====================================================================================
// File: core-database/src/lib.rs
// Description: PostgreSQL persistence facade for the AETIM platform
// =====================================================================================

//! # Core Database
//!
//! PostgreSQL implementations of the domain repository traits, plus pool
//! management and embedded schema migrations. Nested collections (products,
//! TTPs, IOC buckets, calculation breakdowns) persist as JSONB. The audit
//! table is insert-and-select only; no update or delete statement for it
//! exists anywhere in this crate.

pub mod audit_repository;
pub mod feed_repository;
pub mod migrations;
pub mod postgres;
pub mod risk_repository;
pub mod threat_repository;

pub use audit_repository::PostgresAuditStore;
pub use feed_repository::PostgresFeedRepository;
pub use migrations::run_migrations;
pub use postgres::{create_pool, health_check};
pub use risk_repository::{
    PostgresAssociationRepository, PostgresRiskAssessmentRepository,
    PostgresRiskHistoryRepository,
};
pub use threat_repository::PostgresThreatRepository;

use thiserror::Error;

/// Database errors
#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Connection error: {0}")]
    Connection(String),
    #[error("Query error: {0}")]
    Query(String),
    #[error("Migration error: {0}")]
    Migration(String),
    #[error("Mapping error: {0}")]
    Mapping(String),
}

/// Result type for database operations
pub type DatabaseResult<T> = Result<T, DatabaseError>;

impl From<sqlx::Error> for DatabaseError {
    fn from(err: sqlx::Error) -> Self {
        DatabaseError::Query(err.to_string())
    }
}
