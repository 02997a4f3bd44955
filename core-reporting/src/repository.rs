// =====================================================================================
// File: core-reporting/src/repository.rs
// Description: Report and notification persistence contracts
// =====================================================================================

use crate::notification::{Notification, NotificationKind, NotificationRule};
use crate::report::{Report, ReportKind};
use crate::ReportingResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Persistence contract for rendered reports and tickets.
#[async_trait]
pub trait ReportRepository: Send + Sync {
    async fn save(&self, report: &Report) -> ReportingResult<()>;
    async fn get(&self, id: Uuid) -> ReportingResult<Option<Report>>;
    async fn list_by_kind(&self, kind: ReportKind) -> ReportingResult<Vec<Report>>;
    async fn list_generated_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> ReportingResult<Vec<Report>>;
}

/// Persistence contract for notification rules.
#[async_trait]
pub trait NotificationRuleRepository: Send + Sync {
    async fn save(&self, rule: &NotificationRule) -> ReportingResult<()>;
    async fn get(&self, id: Uuid) -> ReportingResult<Option<NotificationRule>>;
    async fn list_enabled_by_kind(
        &self,
        kind: NotificationKind,
    ) -> ReportingResult<Vec<NotificationRule>>;
    async fn list_all(&self) -> ReportingResult<Vec<NotificationRule>>;
    async fn delete(&self, id: Uuid) -> ReportingResult<()>;
}

/// Persistence contract for sent notifications.
#[async_trait]
pub trait NotificationRepository: Send + Sync {
    async fn save(&self, notification: &Notification) -> ReportingResult<()>;
    async fn list_by_rule(&self, rule_id: Uuid) -> ReportingResult<Vec<Notification>>;
    async fn list_all(&self) -> ReportingResult<Vec<Notification>>;
}

/// In-memory report store.
#[derive(Default)]
pub struct InMemoryReportRepository {
    reports: RwLock<HashMap<Uuid, Report>>,
}

impl InMemoryReportRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ReportRepository for InMemoryReportRepository {
    async fn save(&self, report: &Report) -> ReportingResult<()> {
        self.reports.write().await.insert(report.id, report.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> ReportingResult<Option<Report>> {
        Ok(self.reports.read().await.get(&id).cloned())
    }

    async fn list_by_kind(&self, kind: ReportKind) -> ReportingResult<Vec<Report>> {
        let mut reports: Vec<_> = self
            .reports
            .read()
            .await
            .values()
            .filter(|r| r.kind == kind)
            .cloned()
            .collect();
        reports.sort_by(|a, b| a.generated_at.cmp(&b.generated_at));
        Ok(reports)
    }

    async fn list_generated_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> ReportingResult<Vec<Report>> {
        let mut reports: Vec<_> = self
            .reports
            .read()
            .await
            .values()
            .filter(|r| r.generated_at >= from && r.generated_at <= to)
            .cloned()
            .collect();
        reports.sort_by(|a, b| a.generated_at.cmp(&b.generated_at));
        Ok(reports)
    }
}

/// In-memory notification rule store.
#[derive(Default)]
pub struct InMemoryNotificationRuleRepository {
    rules: RwLock<HashMap<Uuid, NotificationRule>>,
}

impl InMemoryNotificationRuleRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl NotificationRuleRepository for InMemoryNotificationRuleRepository {
    async fn save(&self, rule: &NotificationRule) -> ReportingResult<()> {
        self.rules.write().await.insert(rule.id, rule.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> ReportingResult<Option<NotificationRule>> {
        Ok(self.rules.read().await.get(&id).cloned())
    }

    async fn list_enabled_by_kind(
        &self,
        kind: NotificationKind,
    ) -> ReportingResult<Vec<NotificationRule>> {
        let mut rules: Vec<_> = self
            .rules
            .read()
            .await
            .values()
            .filter(|r| r.enabled && r.kind == kind)
            .cloned()
            .collect();
        rules.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(rules)
    }

    async fn list_all(&self) -> ReportingResult<Vec<NotificationRule>> {
        let mut rules: Vec<_> = self.rules.read().await.values().cloned().collect();
        rules.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(rules)
    }

    async fn delete(&self, id: Uuid) -> ReportingResult<()> {
        self.rules.write().await.remove(&id);
        Ok(())
    }
}

/// In-memory notification record store.
#[derive(Default)]
pub struct InMemoryNotificationRepository {
    notifications: RwLock<Vec<Notification>>,
}

impl InMemoryNotificationRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl NotificationRepository for InMemoryNotificationRepository {
    async fn save(&self, notification: &Notification) -> ReportingResult<()> {
        self.notifications.write().await.push(notification.clone());
        Ok(())
    }

    async fn list_by_rule(&self, rule_id: Uuid) -> ReportingResult<Vec<Notification>> {
        Ok(self
            .notifications
            .read()
            .await
            .iter()
            .filter(|n| n.rule_id == rule_id)
            .cloned()
            .collect())
    }

    async fn list_all(&self) -> ReportingResult<Vec<Notification>> {
        Ok(self.notifications.read().await.clone())
    }
}
