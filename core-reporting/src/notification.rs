// =====================================================================================
// File: core-reporting/src/notification.rs
// Description: Notification rules, mail delivery contract and dispatch
// =====================================================================================

use crate::repository::{NotificationRepository, NotificationRuleRepository};
use crate::templates::{
    TemplateEngine, NOTIFICATION_CRITICAL, NOTIFICATION_DIGEST, NOTIFICATION_WEEKLY,
};
use crate::{ReportingError, ReportingResult};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use core_assessment::RiskAssessmentRepository;
use core_config::SmtpConfig;
use core_events::{
    DomainEvent, EventHandler, EventPublisher, EventResult, NotificationRuleUpdated,
    ReportGenerated, RiskAssessmentCompleted,
};
use core_threat_intel::ThreatRepository;
use core_utils::Validate;
use lettre::message::MultiPart;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Notification rule kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotificationKind {
    CriticalThreat,
    HighRiskDailyDigest,
    WeeklyReport,
}

impl NotificationKind {
    /// Default score threshold for threshold-driven kinds.
    pub fn default_threshold(&self) -> Option<f64> {
        match self {
            NotificationKind::CriticalThreat => Some(8.0),
            NotificationKind::HighRiskDailyDigest => Some(6.0),
            NotificationKind::WeeklyReport => None,
        }
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotificationKind::CriticalThreat => write!(f, "CriticalThreat"),
            NotificationKind::HighRiskDailyDigest => write!(f, "HighRiskDailyDigest"),
            NotificationKind::WeeklyReport => write!(f, "WeeklyReport"),
        }
    }
}

/// Subscription describing when and whom to notify.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationRule {
    pub id: Uuid,
    pub kind: NotificationKind,
    pub enabled: bool,
    pub risk_score_threshold: Option<f64>,
    /// Digest send time, "HH:MM" in operator timezone
    pub send_time: Option<String>,
    pub recipients: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl NotificationRule {
    pub fn create(kind: NotificationKind, recipients: Vec<String>) -> ReportingResult<Self> {
        for recipient in &recipients {
            Validate::email(recipient, "recipients")?;
        }
        if let Some(threshold) = kind.default_threshold() {
            Validate::score_range(threshold, "risk_score_threshold")?;
        }
        let now = Utc::now();
        Ok(Self {
            id: Uuid::new_v4(),
            kind,
            enabled: true,
            risk_score_threshold: kind.default_threshold(),
            send_time: match kind {
                NotificationKind::HighRiskDailyDigest => Some("08:00".to_string()),
                _ => None,
            },
            recipients,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn set_threshold(&mut self, threshold: f64) -> ReportingResult<()> {
        Validate::score_range(threshold, "risk_score_threshold")?;
        self.risk_score_threshold = Some(threshold);
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Replace the recipient list atomically.
    pub fn set_recipients(&mut self, recipients: Vec<String>) -> ReportingResult<()> {
        for recipient in &recipients {
            Validate::email(recipient, "recipients")?;
        }
        self.recipients = recipients;
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn toggle(&mut self) {
        self.enabled = !self.enabled;
        self.updated_at = Utc::now();
    }

    /// Threshold check for score-driven kinds.
    pub fn should_trigger(&self, score: f64) -> bool {
        if !self.enabled {
            return false;
        }
        match self.risk_score_threshold {
            Some(threshold) => score >= threshold,
            None => true,
        }
    }
}

/// Delivery state of one sent notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotificationStatus {
    Sent,
    Failed,
}

/// Record of one delivery attempt chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub rule_id: Uuid,
    pub recipients: Vec<String>,
    pub subject: String,
    pub status: NotificationStatus,
    pub error: Option<String>,
    pub sent_at: DateTime<Utc>,
}

/// Mail delivery contract. SMTP mechanics live behind this seam; the
/// notification service owns retries.
#[async_trait]
pub trait MailSender: Send + Sync {
    async fn send(
        &self,
        recipients: &[String],
        subject: &str,
        body_text: &str,
        body_html: Option<&str>,
    ) -> ReportingResult<()>;
}

/// SMTP mail sender.
pub struct LettreMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from_address: String,
}

impl LettreMailer {
    pub fn new(config: &SmtpConfig) -> ReportingResult<Self> {
        let builder = if config.use_tls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
                .map_err(|e| ReportingError::Delivery(e.to_string()))?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
        };

        let mut builder = builder.port(config.port);
        if !config.username.is_empty() {
            builder = builder.credentials(Credentials::new(
                config.username.clone(),
                config.password.clone(),
            ));
        }

        Ok(Self {
            transport: builder.build(),
            from_address: config.from_address.clone(),
        })
    }
}

#[async_trait]
impl MailSender for LettreMailer {
    async fn send(
        &self,
        recipients: &[String],
        subject: &str,
        body_text: &str,
        body_html: Option<&str>,
    ) -> ReportingResult<()> {
        let mut builder = Message::builder()
            .from(
                self.from_address
                    .parse()
                    .map_err(|e| ReportingError::Delivery(format!("from address: {}", e)))?,
            )
            .subject(subject);

        for recipient in recipients {
            builder = builder.to(recipient
                .parse()
                .map_err(|e| ReportingError::Delivery(format!("recipient: {}", e)))?);
        }

        let message = match body_html {
            Some(html) => builder
                .multipart(MultiPart::alternative_plain_html(
                    body_text.to_string(),
                    html.to_string(),
                ))
                .map_err(|e| ReportingError::Delivery(e.to_string()))?,
            None => builder
                .body(body_text.to_string())
                .map_err(|e| ReportingError::Delivery(e.to_string()))?,
        };

        self.transport
            .send(message)
            .await
            .map_err(|e| ReportingError::Delivery(e.to_string()))?;
        Ok(())
    }
}

const DELIVERY_MAX_ATTEMPTS: u32 = 3;

/// Dispatches rule-driven notifications. Delivery failures are recorded on
/// the Notification row; nothing propagates to the event source.
pub struct NotificationService {
    rules: Arc<dyn NotificationRuleRepository>,
    notifications: Arc<dyn NotificationRepository>,
    assessments: Arc<dyn RiskAssessmentRepository>,
    threats: Arc<dyn ThreatRepository>,
    templates: Arc<TemplateEngine>,
    mailer: Arc<dyn MailSender>,
    events: Arc<dyn EventPublisher>,
}

impl NotificationService {
    pub fn new(
        rules: Arc<dyn NotificationRuleRepository>,
        notifications: Arc<dyn NotificationRepository>,
        assessments: Arc<dyn RiskAssessmentRepository>,
        threats: Arc<dyn ThreatRepository>,
        templates: Arc<TemplateEngine>,
        mailer: Arc<dyn MailSender>,
        events: Arc<dyn EventPublisher>,
    ) -> Self {
        Self {
            rules,
            notifications,
            assessments,
            threats,
            templates,
            mailer,
            events,
        }
    }

    /// Persist a rule change and announce it.
    pub async fn save_rule(&self, rule: &NotificationRule) -> ReportingResult<()> {
        self.rules.save(rule).await?;
        if let Err(e) = self
            .events
            .publish(DomainEvent::NotificationRuleUpdated(NotificationRuleUpdated {
                rule_id: rule.id,
                rule_kind: rule.kind.to_string(),
                enabled: rule.enabled,
                updated_at: Utc::now(),
            }))
            .await
        {
            error!(rule_id = %rule.id, error = %e, "Failed to publish NotificationRuleUpdated");
        }
        Ok(())
    }

    /// `CriticalThreat` rules react to completed assessments.
    pub async fn handle_assessment(
        &self,
        payload: &RiskAssessmentCompleted,
    ) -> ReportingResult<()> {
        let rules = self
            .rules
            .list_enabled_by_kind(NotificationKind::CriticalThreat)
            .await?;

        for rule in rules {
            if !rule.should_trigger(payload.final_score) {
                continue;
            }

            let (threat_title, cve) = match self.threats.get(payload.threat_id).await {
                Ok(Some(threat)) => (threat.title, threat.cve_id.unwrap_or_default()),
                _ => (payload.threat_id.to_string(), String::new()),
            };

            let subject = format!("[AETIM] Critical threat: {}", threat_title);
            let body = self.templates.render(
                NOTIFICATION_CRITICAL,
                &json!({
                    "threat_title": threat_title,
                    "cve": cve,
                    "final_risk_score": payload.final_score,
                    "risk_level": payload.risk_level,
                    "affected_asset_count": payload.affected_asset_count,
                }),
            )?;

            self.deliver(&rule, &subject, &body).await;
        }
        Ok(())
    }

    /// Daily digest of assessments at or above the rule threshold. Empty
    /// days send nothing.
    pub async fn send_daily_digest(&self, date: NaiveDate) -> ReportingResult<()> {
        let rules = self
            .rules
            .list_enabled_by_kind(NotificationKind::HighRiskDailyDigest)
            .await?;
        if rules.is_empty() {
            return Ok(());
        }

        let from = date
            .and_hms_opt(0, 0, 0)
            .map(|naive| DateTime::from_naive_utc_and_offset(naive, Utc))
            .ok_or_else(|| ReportingError::Schedule("invalid digest date".to_string()))?;
        let to = from + chrono::Duration::days(1) - chrono::Duration::seconds(1);

        let assessments = self
            .assessments
            .list_completed_between(from, to)
            .await
            .map_err(|e| ReportingError::Repository(e.to_string()))?;

        for rule in rules {
            let threshold = rule.risk_score_threshold.unwrap_or(6.0);
            let mut items = Vec::new();
            for assessment in assessments
                .iter()
                .filter(|a| a.final_risk_score >= threshold)
            {
                let (title, cve) = match self.threats.get(assessment.threat_id).await {
                    Ok(Some(threat)) => {
                        (threat.title, threat.cve_id.unwrap_or_default())
                    }
                    _ => (assessment.threat_id.to_string(), String::new()),
                };
                items.push(json!({
                    "threat_title": title,
                    "cve": cve,
                    "final_risk_score": assessment.final_risk_score,
                    "risk_level": assessment.risk_level.to_string(),
                    "affected_asset_count": assessment.affected_asset_count,
                }));
            }

            if items.is_empty() {
                info!(rule_id = %rule.id, date = %date, "No high-risk assessments, digest skipped");
                continue;
            }

            let subject = format!("[AETIM] High-risk digest for {}", date);
            let body = self.templates.render(
                NOTIFICATION_DIGEST,
                &json!({
                    "date": date.to_string(),
                    "threshold": threshold,
                    "items": items,
                    "total": items.len(),
                }),
            )?;

            self.deliver(&rule, &subject, &body).await;
        }
        Ok(())
    }

    /// `WeeklyReport` rules react to the weekly report being generated.
    pub async fn handle_report_generated(&self, payload: &ReportGenerated) -> ReportingResult<()> {
        if payload.report_kind != crate::report::ReportKind::CisoWeekly.as_str() {
            return Ok(());
        }

        let rules = self
            .rules
            .list_enabled_by_kind(NotificationKind::WeeklyReport)
            .await?;
        for rule in rules {
            let subject = "[AETIM] Weekly CISO report available".to_string();
            let body = self.templates.render(
                NOTIFICATION_WEEKLY,
                &json!({
                    "title": "CISO Weekly Report",
                    "path": payload.path,
                    "generated_at": payload.generated_at.to_rfc3339(),
                }),
            )?;
            self.deliver(&rule, &subject, &body).await;
        }
        Ok(())
    }

    /// Attempt delivery with exponential backoff (2^attempt seconds, three
    /// attempts) and record the outcome.
    async fn deliver(&self, rule: &NotificationRule, subject: &str, body: &str) {
        if rule.recipients.is_empty() {
            warn!(rule_id = %rule.id, "Rule has no recipients, delivery skipped");
            return;
        }

        let mut last_error: Option<String> = None;
        for attempt in 0..DELIVERY_MAX_ATTEMPTS {
            match self
                .mailer
                .send(&rule.recipients, subject, body, None)
                .await
            {
                Ok(()) => {
                    last_error = None;
                    break;
                }
                Err(e) => {
                    warn!(
                        rule_id = %rule.id,
                        attempt = attempt + 1,
                        error = %e,
                        "Notification delivery failed"
                    );
                    last_error = Some(e.to_string());
                    if attempt + 1 < DELIVERY_MAX_ATTEMPTS {
                        sleep(Duration::from_secs(2u64.pow(attempt + 1))).await;
                    }
                }
            }
        }

        let record = Notification {
            id: Uuid::new_v4(),
            rule_id: rule.id,
            recipients: rule.recipients.clone(),
            subject: subject.to_string(),
            status: if last_error.is_none() {
                NotificationStatus::Sent
            } else {
                NotificationStatus::Failed
            },
            error: last_error,
            sent_at: Utc::now(),
        };

        if let Err(e) = self.notifications.save(&record).await {
            error!(rule_id = %rule.id, error = %e, "Failed to persist notification record");
        }
    }
}

/// Bus subscriber for `RiskAssessmentCompleted` and `ReportGenerated`.
pub struct NotificationEventHandler {
    service: Arc<NotificationService>,
}

impl NotificationEventHandler {
    pub fn new(service: Arc<NotificationService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl EventHandler for NotificationEventHandler {
    fn name(&self) -> &str {
        "notification-dispatch"
    }

    async fn handle(&self, event: &DomainEvent) -> EventResult<()> {
        let result = match event {
            DomainEvent::RiskAssessmentCompleted(payload) => {
                self.service.handle_assessment(payload).await
            }
            DomainEvent::ReportGenerated(payload) => {
                self.service.handle_report_generated(payload).await
            }
            _ => Ok(()),
        };
        if let Err(e) = result {
            warn!(error = %e, "Notification handling failed");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::{
        InMemoryNotificationRepository, InMemoryNotificationRuleRepository,
    };
    use core_assessment::{InMemoryRiskAssessmentRepository, RiskAssessment, RiskLevel};
    use core_events::InMemoryEventBus;
    use core_threat_intel::InMemoryThreatRepository;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::sync::RwLock;

    struct RecordingMailer {
        sent: RwLock<Vec<(Vec<String>, String, String)>>,
        failures_before_success: AtomicU32,
    }

    impl RecordingMailer {
        fn new(failures_before_success: u32) -> Self {
            Self {
                sent: RwLock::new(Vec::new()),
                failures_before_success: AtomicU32::new(failures_before_success),
            }
        }
    }

    #[async_trait]
    impl MailSender for RecordingMailer {
        async fn send(
            &self,
            recipients: &[String],
            subject: &str,
            body_text: &str,
            _body_html: Option<&str>,
        ) -> ReportingResult<()> {
            if self.failures_before_success.load(Ordering::SeqCst) > 0 {
                self.failures_before_success.fetch_sub(1, Ordering::SeqCst);
                return Err(ReportingError::Delivery("smtp down".to_string()));
            }
            self.sent.write().await.push((
                recipients.to_vec(),
                subject.to_string(),
                body_text.to_string(),
            ));
            Ok(())
        }
    }

    struct Fixture {
        service: Arc<NotificationService>,
        rules: Arc<InMemoryNotificationRuleRepository>,
        notifications: Arc<InMemoryNotificationRepository>,
        assessments: Arc<InMemoryRiskAssessmentRepository>,
        threats: Arc<InMemoryThreatRepository>,
        mailer: Arc<RecordingMailer>,
    }

    async fn fixture(failures_before_success: u32) -> Fixture {
        let bus = Arc::new(InMemoryEventBus::new());
        bus.start().await;
        let rules = Arc::new(InMemoryNotificationRuleRepository::new());
        let notifications = Arc::new(InMemoryNotificationRepository::new());
        let assessments = Arc::new(InMemoryRiskAssessmentRepository::new());
        let threats = Arc::new(InMemoryThreatRepository::new());
        let mailer = Arc::new(RecordingMailer::new(failures_before_success));

        let service = Arc::new(NotificationService::new(
            rules.clone(),
            notifications.clone(),
            assessments.clone(),
            threats.clone(),
            Arc::new(TemplateEngine::new().unwrap()),
            mailer.clone(),
            bus,
        ));

        Fixture {
            service,
            rules,
            notifications,
            assessments,
            threats,
            mailer,
        }
    }

    fn assessment_payload(score: f64) -> RiskAssessmentCompleted {
        RiskAssessmentCompleted {
            assessment_id: Uuid::new_v4(),
            threat_id: Uuid::new_v4(),
            association_id: Uuid::new_v4(),
            final_score: score,
            risk_level: RiskLevel::from_score(score).to_string(),
            affected_asset_count: 2,
            completed_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_critical_rule_fires_at_threshold() {
        let fixture = fixture(0).await;
        let rule = NotificationRule::create(
            NotificationKind::CriticalThreat,
            vec!["soc@acme.example".to_string()],
        )
        .unwrap();
        fixture.rules.save(&rule).await.unwrap();

        fixture
            .service
            .handle_assessment(&assessment_payload(8.0))
            .await
            .unwrap();

        let sent = fixture.mailer.sent.read().await;
        assert_eq!(sent.len(), 1);
        assert!(sent[0].1.contains("Critical threat"));

        let records = fixture.notifications.list_by_rule(rule.id).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, NotificationStatus::Sent);
    }

    #[tokio::test]
    async fn test_below_threshold_does_not_fire() {
        let fixture = fixture(0).await;
        let rule = NotificationRule::create(
            NotificationKind::CriticalThreat,
            vec!["soc@acme.example".to_string()],
        )
        .unwrap();
        fixture.rules.save(&rule).await.unwrap();

        fixture
            .service
            .handle_assessment(&assessment_payload(7.9))
            .await
            .unwrap();
        assert!(fixture.mailer.sent.read().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_delivery_retries_then_succeeds() {
        let fixture = fixture(2).await;
        let rule = NotificationRule::create(
            NotificationKind::CriticalThreat,
            vec!["soc@acme.example".to_string()],
        )
        .unwrap();
        fixture.rules.save(&rule).await.unwrap();

        fixture
            .service
            .handle_assessment(&assessment_payload(9.0))
            .await
            .unwrap();

        let records = fixture.notifications.list_by_rule(rule.id).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, NotificationStatus::Sent);
        assert_eq!(fixture.mailer.sent.read().await.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_delivery_recorded_as_failed() {
        let fixture = fixture(10).await;
        let rule = NotificationRule::create(
            NotificationKind::CriticalThreat,
            vec!["soc@acme.example".to_string()],
        )
        .unwrap();
        fixture.rules.save(&rule).await.unwrap();

        // The handler itself must not error out.
        fixture
            .service
            .handle_assessment(&assessment_payload(9.0))
            .await
            .unwrap();

        let records = fixture.notifications.list_by_rule(rule.id).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, NotificationStatus::Failed);
        assert!(records[0].error.as_deref().unwrap().contains("smtp down"));
    }

    #[tokio::test]
    async fn test_daily_digest_content_and_empty_day() {
        let fixture = fixture(0).await;
        let rule = NotificationRule::create(
            NotificationKind::HighRiskDailyDigest,
            vec!["ciso@acme.example".to_string()],
        )
        .unwrap();
        fixture.rules.save(&rule).await.unwrap();

        // Empty day sends nothing.
        fixture
            .service
            .send_daily_digest(Utc::now().date_naive())
            .await
            .unwrap();
        assert!(fixture.mailer.sent.read().await.is_empty());

        // Seed one qualifying and one below-threshold assessment.
        for score in [7.2, 4.0] {
            let assessment = RiskAssessment {
                id: Uuid::new_v4(),
                threat_id: Uuid::new_v4(),
                association_id: Uuid::new_v4(),
                base_cvss_score: score,
                asset_importance_weight: 1.0,
                affected_asset_count: 1,
                asset_count_weight: 0.01,
                pir_match_weight: 0.0,
                kev_weight: 0.0,
                final_risk_score: score,
                risk_level: RiskLevel::from_score(score),
                calculation_details: json!({}),
                created_at: Utc::now(),
                updated_at: Utc::now(),
            };
            fixture.assessments.save(&assessment).await.unwrap();
        }

        fixture
            .service
            .send_daily_digest(Utc::now().date_naive())
            .await
            .unwrap();
        let sent = fixture.mailer.sent.read().await;
        assert_eq!(sent.len(), 1);
        assert!(sent[0].2.contains("Total: 1 assessment(s)."));
    }

    #[tokio::test]
    async fn test_weekly_rule_reacts_to_ciso_report_only() {
        let fixture = fixture(0).await;
        let rule = NotificationRule::create(
            NotificationKind::WeeklyReport,
            vec!["ciso@acme.example".to_string()],
        )
        .unwrap();
        fixture.rules.save(&rule).await.unwrap();

        fixture
            .service
            .handle_report_generated(&ReportGenerated {
                report_id: Uuid::new_v4(),
                report_kind: "IT_Ticket".to_string(),
                path: "x".to_string(),
                generated_at: Utc::now(),
            })
            .await
            .unwrap();
        assert!(fixture.mailer.sent.read().await.is_empty());

        fixture
            .service
            .handle_report_generated(&ReportGenerated {
                report_id: Uuid::new_v4(),
                report_kind: "CISO_Weekly".to_string(),
                path: "2024/202403/CISO_Weekly_Report_2024-03-11.html".to_string(),
                generated_at: Utc::now(),
            })
            .await
            .unwrap();
        assert_eq!(fixture.mailer.sent.read().await.len(), 1);
    }

    #[tokio::test]
    async fn test_rule_defaults() {
        let critical = NotificationRule::create(
            NotificationKind::CriticalThreat,
            vec!["a@b.example".to_string()],
        )
        .unwrap();
        assert_eq!(critical.risk_score_threshold, Some(8.0));
        assert!(critical.send_time.is_none());

        let digest = NotificationRule::create(
            NotificationKind::HighRiskDailyDigest,
            vec!["a@b.example".to_string()],
        )
        .unwrap();
        assert_eq!(digest.risk_score_threshold, Some(6.0));
        assert_eq!(digest.send_time.as_deref(), Some("08:00"));

        assert!(NotificationRule::create(
            NotificationKind::CriticalThreat,
            vec!["not-an-address".to_string()],
        )
        .is_err());
    }

    #[tokio::test]
    async fn test_critical_body_names_the_threat() {
        let fixture = fixture(0).await;
        let rule = NotificationRule::create(
            NotificationKind::CriticalThreat,
            vec!["soc@acme.example".to_string()],
        )
        .unwrap();
        fixture.rules.save(&rule).await.unwrap();

        let threat = core_threat_intel::Threat::create(
            Uuid::new_v4(),
            "ScreenConnect auth bypass",
            None,
            Some("CVE-2024-1709".to_string()),
            Some(10.0),
            None,
            None,
            None,
            None,
        )
        .unwrap();
        fixture.threats.save(&threat).await.unwrap();

        let mut payload = assessment_payload(9.5);
        payload.threat_id = threat.id;
        fixture.service.handle_assessment(&payload).await.unwrap();

        let sent = fixture.mailer.sent.read().await;
        assert!(sent[0].1.contains("ScreenConnect auth bypass"));
        assert!(sent[0].2.contains("CVE-2024-1709"));
    }
}
