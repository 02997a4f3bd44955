// =====================================================================================
// File: core-audit/src/auth.rs
// Description: Role/permission matrix and authorization gate
// =====================================================================================

use crate::entry::{AuditAction, AuditEntry};
use crate::store::AuditStore;
use crate::{AuditError, AuditResult};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

/// Roles carried by a verified principal. Identity exchange happens outside
/// the core; by the time a command arrives the subject is already verified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Admin,
    Analyst,
    Operator,
    Viewer,
}

/// Permissions gating the mutating operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Permission {
    ManageFeeds,
    ManagePirs,
    ManageNotificationRules,
    ManageTickets,
    ManageSchedules,
    ImportThreats,
    ExportReports,
    ViewThreats,
    ViewAuditLog,
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Permission::ManageFeeds => "manage_feeds",
            Permission::ManagePirs => "manage_pirs",
            Permission::ManageNotificationRules => "manage_notification_rules",
            Permission::ManageTickets => "manage_tickets",
            Permission::ManageSchedules => "manage_schedules",
            Permission::ImportThreats => "import_threats",
            Permission::ExportReports => "export_reports",
            Permission::ViewThreats => "view_threats",
            Permission::ViewAuditLog => "view_audit_log",
        };
        write!(f, "{}", name)
    }
}

impl Role {
    /// The role -> permission matrix.
    pub fn permissions(&self) -> HashSet<Permission> {
        use Permission::*;
        match self {
            Role::Admin => [
                ManageFeeds,
                ManagePirs,
                ManageNotificationRules,
                ManageTickets,
                ManageSchedules,
                ImportThreats,
                ExportReports,
                ViewThreats,
                ViewAuditLog,
            ]
            .into_iter()
            .collect(),
            Role::Analyst => [
                ManagePirs,
                ManageTickets,
                ImportThreats,
                ExportReports,
                ViewThreats,
            ]
            .into_iter()
            .collect(),
            Role::Operator => [ManageFeeds, ManageSchedules, ViewThreats]
                .into_iter()
                .collect(),
            Role::Viewer => [ViewThreats].into_iter().collect(),
        }
    }
}

/// A verified subject with its role set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Principal {
    pub subject_id: String,
    pub roles: Vec<Role>,
}

impl Principal {
    pub fn new(subject_id: &str, roles: Vec<Role>) -> Self {
        Self {
            subject_id: subject_id.to_string(),
            roles,
        }
    }

    pub fn has_permission(&self, permission: Permission) -> bool {
        self.roles
            .iter()
            .any(|role| role.permissions().contains(&permission))
    }
}

/// Where the command came from.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestOrigin {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

/// The gate every mutating command passes. Grants and denials both land in
/// the audit log; a denial additionally raises.
pub struct AuthorizationGate {
    store: Arc<dyn AuditStore>,
}

impl AuthorizationGate {
    pub fn new(store: Arc<dyn AuditStore>) -> Self {
        Self { store }
    }

    /// Check (principal, permission) and audit the outcome.
    pub async fn enforce(
        &self,
        principal: &Principal,
        origin: &RequestOrigin,
        permission: Permission,
        action: AuditAction,
        resource_kind: &str,
        resource_id: Option<String>,
        details: serde_json::Value,
    ) -> AuditResult<()> {
        if principal.has_permission(permission) {
            let entry = AuditEntry::new(
                Some(principal.subject_id.clone()),
                action,
                resource_kind,
                resource_id,
                details,
                origin.ip_address.clone(),
                origin.user_agent.clone(),
            )?;
            self.store.record(entry).await?;
            info!(
                subject = %principal.subject_id,
                permission = %permission,
                resource_kind = %resource_kind,
                "Command authorized"
            );
            Ok(())
        } else {
            let entry = AuditEntry::new(
                Some(principal.subject_id.clone()),
                action,
                resource_kind,
                resource_id,
                json!({
                    "denied": true,
                    "required_permission": permission.to_string(),
                    "roles": principal.roles,
                    "requested": details,
                }),
                origin.ip_address.clone(),
                origin.user_agent.clone(),
            )?;
            self.store.record(entry).await?;
            warn!(
                subject = %principal.subject_id,
                permission = %permission,
                resource_kind = %resource_kind,
                "Command denied"
            );
            Err(AuditError::AuthorizationDenied {
                subject: principal.subject_id.clone(),
                permission: permission.to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{AuditQuery, InMemoryAuditStore};

    fn origin() -> RequestOrigin {
        RequestOrigin {
            ip_address: Some("203.0.113.9".to_string()),
            user_agent: Some("aetim-cli/1.0".to_string()),
        }
    }

    #[test]
    fn test_role_matrix() {
        assert!(Role::Admin.permissions().contains(&Permission::ManageFeeds));
        assert!(Role::Admin.permissions().contains(&Permission::ViewAuditLog));
        assert!(Role::Analyst.permissions().contains(&Permission::ManagePirs));
        assert!(!Role::Analyst.permissions().contains(&Permission::ManageFeeds));
        assert!(Role::Operator.permissions().contains(&Permission::ManageFeeds));
        assert!(!Role::Viewer.permissions().contains(&Permission::ManagePirs));
    }

    #[test]
    fn test_principal_union_of_roles() {
        let principal = Principal::new("carol", vec![Role::Viewer, Role::Operator]);
        assert!(principal.has_permission(Permission::ManageFeeds));
        assert!(principal.has_permission(Permission::ViewThreats));
        assert!(!principal.has_permission(Permission::ManagePirs));
    }

    #[tokio::test]
    async fn test_granted_command_is_audited() {
        let store = Arc::new(InMemoryAuditStore::new());
        let gate = AuthorizationGate::new(store.clone());
        let principal = Principal::new("alice", vec![Role::Admin]);

        gate.enforce(
            &principal,
            &origin(),
            Permission::ManageFeeds,
            AuditAction::Create,
            "ThreatFeed",
            Some("feed-1".to_string()),
            json!({"name": "NVD"}),
        )
        .await
        .unwrap();

        let entries = store.query(&AuditQuery::default()).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].subject_id.as_deref(), Some("alice"));
        assert_eq!(entries[0].ip_address.as_deref(), Some("203.0.113.9"));
        assert!(entries[0].details.get("denied").is_none());
    }

    #[tokio::test]
    async fn test_denied_command_raises_and_audits() {
        let store = Arc::new(InMemoryAuditStore::new());
        let gate = AuthorizationGate::new(store.clone());
        let principal = Principal::new("mallory", vec![Role::Viewer]);

        let result = gate
            .enforce(
                &principal,
                &origin(),
                Permission::ManageFeeds,
                AuditAction::Delete,
                "ThreatFeed",
                Some("feed-1".to_string()),
                json!({}),
            )
            .await;

        assert!(matches!(
            result,
            Err(AuditError::AuthorizationDenied { .. })
        ));

        let entries = store.query(&AuditQuery::default()).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].details["denied"], json!(true));
        assert_eq!(
            entries[0].details["required_permission"],
            json!("manage_feeds")
        );
    }
}
