// =====================================================================================
// File: core-audit/src/store.rs
// Description: Append-only audit store with query surface
// =====================================================================================

use crate::entry::{AuditAction, AuditEntry};
use crate::{AuditError, AuditResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

/// Filter set for audit queries; every field is optional and conjunctive.
#[derive(Debug, Clone, Default)]
pub struct AuditQuery {
    pub subject_id: Option<String>,
    pub action: Option<AuditAction>,
    pub resource_kind: Option<String>,
    pub resource_id: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

/// Append-only store contract: record and query, nothing else.
#[async_trait]
pub trait AuditStore: Send + Sync {
    async fn record(&self, entry: AuditEntry) -> AuditResult<()>;
    async fn query(&self, query: &AuditQuery) -> AuditResult<Vec<AuditEntry>>;
}

/// In-memory append-only store. Entries are pushed and never touched again.
#[derive(Default)]
pub struct InMemoryAuditStore {
    entries: RwLock<Vec<AuditEntry>>,
    ids: RwLock<HashSet<Uuid>>,
}

impl InMemoryAuditStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl AuditStore for InMemoryAuditStore {
    async fn record(&self, entry: AuditEntry) -> AuditResult<()> {
        {
            let mut ids = self.ids.write().await;
            if !ids.insert(entry.id) {
                return Err(AuditError::DuplicateEntry(entry.id));
            }
        }
        debug!(
            entry_id = %entry.id,
            action = %entry.action,
            resource_kind = %entry.resource_kind,
            "Audit entry recorded"
        );
        self.entries.write().await.push(entry);
        Ok(())
    }

    async fn query(&self, query: &AuditQuery) -> AuditResult<Vec<AuditEntry>> {
        let entries = self.entries.read().await;
        let mut matches: Vec<AuditEntry> = entries
            .iter()
            .filter(|entry| {
                query
                    .subject_id
                    .as_ref()
                    .map(|s| entry.subject_id.as_ref() == Some(s))
                    .unwrap_or(true)
                    && query.action.map(|a| entry.action == a).unwrap_or(true)
                    && query
                        .resource_kind
                        .as_ref()
                        .map(|k| &entry.resource_kind == k)
                        .unwrap_or(true)
                    && query
                        .resource_id
                        .as_ref()
                        .map(|r| entry.resource_id.as_ref() == Some(r))
                        .unwrap_or(true)
                    && query.from.map(|f| entry.created_at >= f).unwrap_or(true)
                    && query.to.map(|t| entry.created_at <= t).unwrap_or(true)
            })
            .cloned()
            .collect();

        // Newest first.
        matches.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        if let Some(limit) = query.limit {
            matches.truncate(limit);
        }
        Ok(matches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entry(subject: &str, action: AuditAction, resource_kind: &str) -> AuditEntry {
        AuditEntry::new(
            Some(subject.to_string()),
            action,
            resource_kind,
            None,
            json!({}),
            None,
            None,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_record_and_query() {
        let store = InMemoryAuditStore::new();
        store
            .record(entry("alice", AuditAction::Create, "ThreatFeed"))
            .await
            .unwrap();
        store
            .record(entry("bob", AuditAction::Delete, "Pir"))
            .await
            .unwrap();

        let all = store.query(&AuditQuery::default()).await.unwrap();
        assert_eq!(all.len(), 2);

        let by_subject = store
            .query(&AuditQuery {
                subject_id: Some("alice".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(by_subject.len(), 1);
        assert_eq!(by_subject[0].resource_kind, "ThreatFeed");

        let by_action = store
            .query(&AuditQuery {
                action: Some(AuditAction::Delete),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(by_action.len(), 1);
    }

    #[tokio::test]
    async fn test_entries_are_immutable_after_write() {
        let store = InMemoryAuditStore::new();
        let original = entry("alice", AuditAction::Update, "NotificationRule");
        store.record(original.clone()).await.unwrap();

        // Every subsequent read returns the identical row.
        let first = store.query(&AuditQuery::default()).await.unwrap();
        let second = store.query(&AuditQuery::default()).await.unwrap();
        assert_eq!(first[0], original);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_duplicate_id_rejected() {
        let store = InMemoryAuditStore::new();
        let original = entry("alice", AuditAction::Create, "Pir");
        store.record(original.clone()).await.unwrap();
        let result = store.record(original).await;
        assert!(matches!(result, Err(AuditError::DuplicateEntry(_))));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_query_time_window_and_limit() {
        let store = InMemoryAuditStore::new();
        for i in 0..5 {
            store
                .record(entry(&format!("user-{}", i), AuditAction::View, "Threat"))
                .await
                .unwrap();
        }

        let limited = store
            .query(&AuditQuery {
                limit: Some(2),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(limited.len(), 2);

        let future_only = store
            .query(&AuditQuery {
                from: Some(Utc::now() + chrono::Duration::hours(1)),
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(future_only.is_empty());
    }
}
