// =====================================================================================
// File: core-audit/src/lib.rs
// Description: Append-only audit log and authorization gate
// =====================================================================================

//! # Core Audit
//!
//! The cross-cutting safety fabric: every mutating command passes the
//! authorization gate, and both grants and denials land in the append-only
//! audit log. The write path is the only code that touches the log; there is
//! no update or delete anywhere in this crate's surface.

pub mod auth;
pub mod entry;
pub mod store;

pub use auth::{AuthorizationGate, Permission, Principal, RequestOrigin, Role};
pub use entry::{AuditAction, AuditEntry};
pub use store::{AuditQuery, AuditStore, InMemoryAuditStore};

use core_utils::ValidationError;
use thiserror::Error;

/// Audit subsystem errors
#[derive(Error, Debug)]
pub enum AuditError {
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),
    #[error("Authorization denied: {subject} lacks {permission}")]
    AuthorizationDenied { subject: String, permission: String },
    #[error("Duplicate audit entry id: {0}")]
    DuplicateEntry(uuid::Uuid),
    #[error("Storage error: {0}")]
    Storage(String),
}

/// Result type for audit operations
pub type AuditResult<T> = Result<T, AuditError>;
