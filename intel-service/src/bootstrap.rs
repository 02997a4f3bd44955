// =====================================================================================
// File: intel-service/src/bootstrap.rs
// Description: Service wiring for the AETIM pipeline
// =====================================================================================

use anyhow::Context;
use core_assessment::{
    AssessmentService, AssociationCreatedHandler, AssociationRepository, InMemoryAssetDirectory,
    InMemoryAssociationRepository, InMemoryPirRepository, InMemoryRiskAssessmentRepository,
    InMemoryRiskHistoryRepository, PirRepository, RiskAssessmentRepository,
    RiskCalculationService, RiskHistoryRepository, ThreatIngestedHandler,
};
use core_audit::{AuditStore, AuthorizationGate, InMemoryAuditStore};
use core_config::AppConfig;
use core_database::{
    create_pool, run_migrations, PostgresAssociationRepository, PostgresAuditStore,
    PostgresFeedRepository, PostgresRiskAssessmentRepository, PostgresRiskHistoryRepository,
    PostgresThreatRepository,
};
use core_events::{kinds, EventPublisher, InMemoryEventBus};
use core_extraction::{AiServiceClient, ExtractionService};
use core_reporting::ticket::TicketAssessmentHandler;
use core_reporting::{
    InMemoryNotificationRepository, InMemoryNotificationRuleRepository, InMemoryReportRepository,
    LettreMailer, MailSender, NoPdfRenderer, NotificationEventHandler, NotificationService,
    ReportFileStore, ReportRepository, ReportScheduleService, TemplateEngine,
    TicketGenerationService, WeeklyReportService,
};
use core_threat_intel::{
    CollectionScheduler, CollectorFactory, FailureTracker, FeedRepository,
    InMemoryFeedRepository, InMemoryThreatRepository, ThreatCollectionService, ThreatRepository,
};
use std::sync::Arc;
use tracing::{info, warn};

/// Everything the daemon (and the out-of-scope command surface) needs.
pub struct AppState {
    pub config: AppConfig,
    pub bus: Arc<InMemoryEventBus>,
    pub feeds: Arc<dyn FeedRepository>,
    pub threats: Arc<dyn ThreatRepository>,
    pub assets: Arc<InMemoryAssetDirectory>,
    pub pirs: Arc<dyn PirRepository>,
    pub audit: Arc<dyn AuditStore>,
    pub gate: Arc<AuthorizationGate>,
    pub collection: Arc<ThreatCollectionService>,
    pub collection_scheduler: Arc<CollectionScheduler>,
    pub assessment: Arc<AssessmentService>,
    pub reports: Arc<dyn ReportRepository>,
    pub tickets: Arc<TicketGenerationService>,
    pub notifications: Arc<NotificationService>,
    pub weekly: Arc<WeeklyReportService>,
    pub report_scheduler: Arc<ReportScheduleService>,
}

/// Build and wire the whole pipeline. Stores are PostgreSQL when a database
/// URL is configured, in-memory otherwise.
pub async fn build(config: AppConfig) -> anyhow::Result<AppState> {
    let bus = Arc::new(InMemoryEventBus::new());
    bus.start().await;

    // Persistence selection.
    let (feeds, threats, associations, assessments, history, audit): (
        Arc<dyn FeedRepository>,
        Arc<dyn ThreatRepository>,
        Arc<dyn AssociationRepository>,
        Arc<dyn RiskAssessmentRepository>,
        Arc<dyn RiskHistoryRepository>,
        Arc<dyn AuditStore>,
    ) = if config.database.url.is_empty() {
        info!("No database URL configured, using in-memory stores");
        (
            Arc::new(InMemoryFeedRepository::new()),
            Arc::new(InMemoryThreatRepository::new()),
            Arc::new(InMemoryAssociationRepository::new()),
            Arc::new(InMemoryRiskAssessmentRepository::new()),
            Arc::new(InMemoryRiskHistoryRepository::new()),
            Arc::new(InMemoryAuditStore::new()),
        )
    } else {
        let pool = create_pool(&config.database)
            .await
            .context("database pool")?;
        run_migrations(&pool).await.context("migrations")?;
        (
            Arc::new(PostgresFeedRepository::new(pool.clone())),
            Arc::new(PostgresThreatRepository::new(pool.clone())),
            Arc::new(PostgresAssociationRepository::new(pool.clone())),
            Arc::new(PostgresRiskAssessmentRepository::new(pool.clone())),
            Arc::new(PostgresRiskHistoryRepository::new(pool.clone())),
            Arc::new(PostgresAuditStore::new(pool)),
        )
    };

    let assets = Arc::new(InMemoryAssetDirectory::new());
    let pirs: Arc<dyn PirRepository> = Arc::new(InMemoryPirRepository::new());
    let gate = Arc::new(AuthorizationGate::new(audit.clone()));

    // Extraction: the AI collaborator when configured, rules always behind it.
    let ai_client = if config.ai_service.enabled {
        match AiServiceClient::new(&config.ai_service) {
            Ok(client) => Some(Arc::new(client)),
            Err(e) => {
                warn!(error = %e, "AI client unavailable, rule engine only");
                None
            }
        }
    } else {
        None
    };
    let extraction = Arc::new(ExtractionService::new(ai_client.clone()));

    // Collection pipeline.
    let collectors = Arc::new(CollectorFactory::new(&config.collection, extraction.clone()));
    let failure_tracker = Arc::new(FailureTracker::new(
        config.collection.failure_threshold,
        config.collection.alert_cooldown_hours,
    ));
    let collection = Arc::new(ThreatCollectionService::new(
        &config.collection,
        feeds.clone(),
        threats.clone(),
        collectors,
        extraction,
        failure_tracker,
        bus.clone() as Arc<dyn EventPublisher>,
    ));
    let collection_scheduler = Arc::new(CollectionScheduler::new(feeds.clone(), collection.clone()));

    // Assessment pipeline.
    let assessment = Arc::new(AssessmentService::new(
        threats.clone(),
        feeds.clone(),
        assets.clone(),
        associations.clone(),
        pirs.clone(),
        assessments.clone(),
        history,
        RiskCalculationService::new(config.risk.clone()),
        bus.clone() as Arc<dyn EventPublisher>,
    ));

    // Emission.
    let templates = Arc::new(TemplateEngine::new()?);
    let store = Arc::new(ReportFileStore::new(&config.reports.base_dir));
    let reports = Arc::new(InMemoryReportRepository::new());
    let reports_handle: Arc<dyn ReportRepository> = reports.clone();
    let tickets = Arc::new(TicketGenerationService::new(
        threats.clone(),
        associations.clone(),
        assets.clone(),
        reports.clone(),
        store.clone(),
        templates.clone(),
        bus.clone() as Arc<dyn EventPublisher>,
        config.risk.ticket_threshold,
    ));

    let mailer: Arc<dyn MailSender> = Arc::new(
        LettreMailer::new(&config.smtp).context("smtp transport")?,
    );
    let notification_rules = Arc::new(InMemoryNotificationRuleRepository::new());
    let notification_log = Arc::new(InMemoryNotificationRepository::new());
    let notifications = Arc::new(NotificationService::new(
        notification_rules,
        notification_log,
        assessments.clone(),
        threats.clone(),
        templates.clone(),
        mailer,
        bus.clone() as Arc<dyn EventPublisher>,
    ));

    let weekly = Arc::new(WeeklyReportService::new(
        threats.clone(),
        assessments,
        associations,
        assets.clone(),
        reports,
        store,
        templates,
        ai_client,
        Arc::new(NoPdfRenderer),
        bus.clone() as Arc<dyn EventPublisher>,
        config.reports.clone(),
    ));

    let report_scheduler = Arc::new(ReportScheduleService::new(
        weekly.clone(),
        notifications.clone(),
        &config.reports.weekly_cron,
        &config.notifications.digest_send_time,
        &config.reports.timezone_offset,
        config.reports.timezone(),
    )?);

    // Event subscriptions: C5 -> C6 -> C7 -> C9.
    bus.subscribe(
        kinds::THREAT_INGESTED,
        Arc::new(ThreatIngestedHandler::new(assessment.clone())),
    )
    .await;
    bus.subscribe(
        kinds::ASSOCIATION_CREATED,
        Arc::new(AssociationCreatedHandler::new(assessment.clone())),
    )
    .await;
    bus.subscribe(
        kinds::RISK_ASSESSMENT_COMPLETED,
        Arc::new(TicketAssessmentHandler::new(tickets.clone())),
    )
    .await;
    bus.subscribe(
        kinds::RISK_ASSESSMENT_COMPLETED,
        Arc::new(NotificationEventHandler::new(notifications.clone())),
    )
    .await;
    bus.subscribe(
        kinds::REPORT_GENERATED,
        Arc::new(NotificationEventHandler::new(notifications.clone())),
    )
    .await;

    Ok(AppState {
        config,
        bus,
        feeds,
        threats,
        assets,
        pirs,
        audit,
        gate,
        collection,
        collection_scheduler,
        assessment,
        reports: reports_handle,
        tickets,
        notifications,
        weekly,
        report_scheduler,
    })
}

impl AppState {
    /// Start the time-triggered workers.
    pub async fn start_workers(&self) -> anyhow::Result<()> {
        self.collection_scheduler
            .start()
            .await
            .context("collection scheduler")?;
        self.report_scheduler.start().await;
        Ok(())
    }

    /// Stop the time-triggered workers.
    pub async fn stop_workers(&self) {
        self.collection_scheduler.stop().await;
        self.report_scheduler.stop().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_threat_intel::{CollectionFrequency, FeedPriority, ThreatFeed};

    fn test_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.ai_service.enabled = false;
        config.reports.base_dir = std::env::temp_dir()
            .join(format!("aetim-test-{}", uuid::Uuid::new_v4()))
            .to_string_lossy()
            .to_string();
        config
    }

    #[tokio::test]
    async fn test_build_with_in_memory_stores() {
        let state = build(test_config()).await.unwrap();
        assert!(state.config.database.url.is_empty());

        // The wiring is usable end to end: a saved feed shows up enabled.
        let feed = ThreatFeed::create(
            "CISA KEV",
            FeedPriority::P0,
            CollectionFrequency::Daily,
            None,
        )
        .unwrap();
        state.feeds.save(&feed).await.unwrap();
        assert_eq!(state.feeds.list_enabled().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_workers_start_and_stop() {
        let state = build(test_config()).await.unwrap();
        state.start_workers().await.unwrap();
        state.stop_workers().await;
    }
}
