// =====================================================================================
// File: core-utils/src/lib.rs
// Description: Utility functions and shared helpers for the AETIM platform
// =====================================================================================

//! # Core Utils
//!
//! Cross-cutting helpers shared by the AETIM crates:
//! - timestamp formatting and parsing
//! - identifier generation and content-derived hashes
//! - input validation primitives
//! - reusable test fixtures (advisory text samples, feed payloads)

pub mod fixtures;
pub mod helpers;
pub mod validation;

pub use helpers::*;
pub use validation::*;

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Utility error types
#[derive(Error, Debug)]
pub enum UtilError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Processing error: {0}")]
    ProcessingError(String),
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

/// Common result type for utilities
pub type UtilResult<T> = Result<T, UtilError>;

/// Format the current time in ISO 8601 format
pub fn format_timestamp() -> String {
    Utc::now().to_rfc3339()
}

/// Parse an RFC 3339 timestamp
pub fn parse_timestamp(timestamp: &str) -> UtilResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(timestamp)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| UtilError::ProcessingError(format!("Failed to parse timestamp: {}", e)))
}

/// Generate a unique identifier
pub fn generate_id() -> uuid::Uuid {
    uuid::Uuid::new_v4()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_round_trip() {
        let formatted = format_timestamp();
        let parsed = parse_timestamp(&formatted).unwrap();
        assert!((Utc::now() - parsed).num_seconds() < 5);
    }

    #[test]
    fn test_parse_timestamp_rejects_garbage() {
        assert!(parse_timestamp("not-a-timestamp").is_err());
    }

    #[test]
    fn test_generate_id_unique() {
        assert_ne!(generate_id(), generate_id());
    }
}
