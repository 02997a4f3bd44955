// =====================================================================================
// File: core-audit/src/entry.rs
// Description: Immutable audit entry
// =====================================================================================

use crate::AuditResult;
use chrono::{DateTime, Utc};
use core_utils::Validate;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// The closed verb set recorded by the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AuditAction {
    Create,
    Update,
    Delete,
    Import,
    View,
    Toggle,
    Export,
    Login,
    Logout,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Create => "CREATE",
            AuditAction::Update => "UPDATE",
            AuditAction::Delete => "DELETE",
            AuditAction::Import => "IMPORT",
            AuditAction::View => "VIEW",
            AuditAction::Toggle => "TOGGLE",
            AuditAction::Export => "EXPORT",
            AuditAction::Login => "LOGIN",
            AuditAction::Logout => "LOGOUT",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One audit row. Immutable once persisted: the store exposes no way to
/// change or remove it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: Uuid,
    pub subject_id: Option<String>,
    pub action: AuditAction,
    pub resource_kind: String,
    pub resource_id: Option<String>,
    pub details: serde_json::Value,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl AuditEntry {
    pub fn new(
        subject_id: Option<String>,
        action: AuditAction,
        resource_kind: &str,
        resource_id: Option<String>,
        details: serde_json::Value,
        ip_address: Option<String>,
        user_agent: Option<String>,
    ) -> AuditResult<Self> {
        Validate::not_empty(resource_kind, "resource_kind")?;
        Ok(Self {
            id: Uuid::new_v4(),
            subject_id,
            action,
            resource_kind: resource_kind.to_string(),
            resource_id,
            details,
            ip_address,
            user_agent,
            created_at: Utc::now(),
        })
    }
}
