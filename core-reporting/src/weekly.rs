// =====================================================================================
// File: core-reporting/src/weekly.rs
// Description: Weekly CISO report generation
// =====================================================================================

use crate::report::{FileFormat, Report, ReportKind};
use crate::repository::ReportRepository;
use crate::storage::ReportFileStore;
use crate::templates::{TemplateEngine, WEEKLY_HTML};
use crate::{ReportingError, ReportingResult};
use chrono::{DateTime, Datelike, Duration, TimeZone, Utc};
use core_assessment::{AssetDirectory, AssociationRepository, RiskAssessmentRepository};
use core_config::ReportConfig;
use core_events::{DomainEvent, EventPublisher, ReportGenerated};
use core_extraction::AiServiceClient;
use core_threat_intel::ThreatRepository;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Optional PDF rendering seam. The default implementation is unavailable
/// and the report degrades to HTML only.
pub trait PdfRenderer: Send + Sync {
    fn render(&self, html: &str) -> ReportingResult<Vec<u8>>;
}

/// Placeholder renderer: always unavailable.
#[derive(Debug, Default)]
pub struct NoPdfRenderer;

impl PdfRenderer for NoPdfRenderer {
    fn render(&self, _html: &str) -> ReportingResult<Vec<u8>> {
        Err(ReportingError::RendererUnavailable(
            "no PDF renderer configured".to_string(),
        ))
    }
}

/// Technical-to-business phrasing used when the summariser collaborator is
/// unavailable.
const BUSINESS_PHRASES: &[(&str, &str)] = &[
    ("remote code execution", "full system takeover risk"),
    ("privilege escalation", "unauthorised administrative access"),
    ("vulnerabilities", "security weaknesses"),
    ("vulnerability", "security weakness"),
    ("exploited", "actively abused by attackers"),
    ("exploitation", "active abuse by attackers"),
    ("CVSS", "industry severity rating"),
    ("patch", "vendor fix"),
    ("threat actor", "attacker group"),
    ("denial of service", "service outage risk"),
];

/// Weekly statistics gathered for one period.
#[derive(Debug, Clone, Default)]
struct WeekStats {
    total_threats: usize,
    critical_assessments: usize,
    mean_risk: f64,
}

/// Generates the weekly CISO report: previous Monday 00:00 through Sunday
/// 23:59 in the operator timezone.
pub struct WeeklyReportService {
    threats: Arc<dyn ThreatRepository>,
    assessments: Arc<dyn RiskAssessmentRepository>,
    associations: Arc<dyn AssociationRepository>,
    assets: Arc<dyn AssetDirectory>,
    reports: Arc<dyn ReportRepository>,
    store: Arc<ReportFileStore>,
    templates: Arc<TemplateEngine>,
    summarizer: Option<Arc<AiServiceClient>>,
    pdf: Arc<dyn PdfRenderer>,
    events: Arc<dyn EventPublisher>,
    config: ReportConfig,
}

impl WeeklyReportService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        threats: Arc<dyn ThreatRepository>,
        assessments: Arc<dyn RiskAssessmentRepository>,
        associations: Arc<dyn AssociationRepository>,
        assets: Arc<dyn AssetDirectory>,
        reports: Arc<dyn ReportRepository>,
        store: Arc<ReportFileStore>,
        templates: Arc<TemplateEngine>,
        summarizer: Option<Arc<AiServiceClient>>,
        pdf: Arc<dyn PdfRenderer>,
        events: Arc<dyn EventPublisher>,
        config: ReportConfig,
    ) -> Self {
        Self {
            threats,
            assessments,
            associations,
            assets,
            reports,
            store,
            templates,
            summarizer,
            pdf,
            events,
            config,
        }
    }

    /// Period window: the previous Monday 00:00 to Sunday 23:59:59 in the
    /// configured timezone, expressed in UTC.
    pub fn period_for(&self, now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        let tz = self.config.timezone();
        let local = now.with_timezone(&tz);
        let days_from_monday = local.weekday().num_days_from_monday() as i64;
        let this_monday = local.date_naive() - Duration::days(days_from_monday);
        let previous_monday = this_monday - Duration::days(7);

        let start_naive = previous_monday.and_hms_opt(0, 0, 0).expect("midnight exists");
        let end_naive = start_naive + Duration::days(7) - Duration::seconds(1);

        let start = tz
            .from_local_datetime(&start_naive)
            .single()
            .expect("unambiguous fixed-offset time")
            .with_timezone(&Utc);
        let end = tz
            .from_local_datetime(&end_naive)
            .single()
            .expect("unambiguous fixed-offset time")
            .with_timezone(&Utc);
        (start, end)
    }

    async fn stats_for(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> ReportingResult<WeekStats> {
        let threats = self
            .threats
            .list_collected_between(from, to)
            .await
            .map_err(|e| ReportingError::Repository(e.to_string()))?;
        let assessments = self
            .assessments
            .list_completed_between(from, to)
            .await
            .map_err(|e| ReportingError::Repository(e.to_string()))?;

        let critical = assessments
            .iter()
            .filter(|a| a.final_risk_score >= 8.0)
            .count();
        let mean = if assessments.is_empty() {
            0.0
        } else {
            assessments.iter().map(|a| a.final_risk_score).sum::<f64>()
                / assessments.len() as f64
        };

        Ok(WeekStats {
            total_threats: threats.len(),
            critical_assessments: critical,
            mean_risk: mean,
        })
    }

    /// Generate and store the report for the period containing `now`.
    pub async fn generate(&self, now: DateTime<Utc>) -> ReportingResult<Report> {
        let (start, end) = self.period_for(now);
        let (previous_start, previous_end) = (start - Duration::days(7), start - Duration::seconds(1));

        info!(period_start = %start, period_end = %end, "Generating weekly CISO report");

        let stats = self.stats_for(start, end).await?;
        let previous = self.stats_for(previous_start, previous_end).await?;

        // Top threats ranked by their best assessment score.
        let assessments = self
            .assessments
            .list_completed_between(start, end)
            .await
            .map_err(|e| ReportingError::Repository(e.to_string()))?;

        let mut best_by_threat: HashMap<uuid::Uuid, (f64, u32)> = HashMap::new();
        for assessment in &assessments {
            let entry = best_by_threat
                .entry(assessment.threat_id)
                .or_insert((0.0, 0));
            if assessment.final_risk_score > entry.0 {
                *entry = (assessment.final_risk_score, assessment.affected_asset_count);
            }
        }
        let mut ranked: Vec<_> = best_by_threat.into_iter().collect();
        ranked.sort_by(|a, b| b.1 .0.partial_cmp(&a.1 .0).unwrap_or(std::cmp::Ordering::Equal));
        ranked.truncate(self.config.weekly_top_n);

        let mut top_threats = Vec::new();
        for (threat_id, (score, asset_count)) in &ranked {
            if let Ok(Some(threat)) = self.threats.get(*threat_id).await {
                top_threats.push(json!({
                    "cve": threat.cve_id.unwrap_or_default(),
                    "title": threat.title,
                    "severity": threat.severity.map(|s| s.to_string()).unwrap_or_default(),
                    "risk_score": format!("{:.2}", score),
                    "asset_count": asset_count,
                }));
            }
        }

        // Affected-asset statistics: bucket by OS and by importance tier.
        let mut affected_asset_ids = std::collections::HashSet::new();
        for (threat_id, _) in &ranked {
            if let Ok(associations) = self.associations.list_by_threat(*threat_id).await {
                for association in associations {
                    affected_asset_ids.insert(association.asset_id);
                }
            }
        }
        let mut os_buckets: HashMap<String, usize> = HashMap::new();
        let mut importance_buckets: HashMap<String, usize> = HashMap::new();
        for asset_id in &affected_asset_ids {
            if let Ok(Some(asset)) = self.assets.get(*asset_id).await {
                *os_buckets.entry(asset.operating_system.clone()).or_default() += 1;
                let tier = format!("importance {:.2}", asset.importance_weight());
                *importance_buckets.entry(tier).or_default() += 1;
            }
        }
        let mut asset_buckets: Vec<_> = os_buckets
            .into_iter()
            .chain(importance_buckets)
            .map(|(name, count)| json!({ "name": name, "count": count }))
            .collect();
        asset_buckets.sort_by(|a, b| a["name"].as_str().cmp(&b["name"].as_str()));

        let technical_summary = format!(
            "During the reporting week {} threats were ingested and {} risk assessments \
scored at or above the critical band. The mean risk score was {:.2}. \
{} assets are currently affected by the highest ranked vulnerabilities.",
            stats.total_threats,
            stats.critical_assessments,
            stats.mean_risk,
            affected_asset_ids.len(),
        );
        let summary = self.business_summary(&technical_summary).await;

        let report_date = end.with_timezone(&self.config.timezone()).date_naive();
        let data = json!({
            "title": format!("CISO Weekly Report {}", report_date),
            "period_start": start.with_timezone(&self.config.timezone()).format("%Y-%m-%d %H:%M").to_string(),
            "period_end": end.with_timezone(&self.config.timezone()).format("%Y-%m-%d %H:%M").to_string(),
            "summary": summary,
            "total_threats": stats.total_threats,
            "threat_delta": delta_label(stats.total_threats as f64 - previous.total_threats as f64),
            "critical_assessments": stats.critical_assessments,
            "mean_risk": format!("{:.2}", stats.mean_risk),
            "risk_delta": delta_label(stats.mean_risk - previous.mean_risk),
            "affected_assets": affected_asset_ids.len(),
            "top_threats": top_threats,
            "asset_buckets": asset_buckets,
        });

        let html = self.templates.render(WEEKLY_HTML, &data)?;
        let relative = self
            .store
            .write(ReportKind::CisoWeekly, FileFormat::Html, end, html.as_bytes())
            .await?;

        // PDF is optional; an unavailable renderer degrades to HTML only.
        match self.pdf.render(&html) {
            Ok(bytes) => {
                if let Err(e) = self
                    .store
                    .write(ReportKind::CisoWeekly, FileFormat::Pdf, end, &bytes)
                    .await
                {
                    warn!(error = %e, "PDF artefact write failed");
                }
            }
            Err(e) => warn!(error = %e, "PDF rendering unavailable, HTML only"),
        }

        let mut report = Report::new_weekly(
            data["title"].as_str().unwrap_or("CISO Weekly Report"),
            &relative,
            FileFormat::Html,
            start,
            end,
        )?;
        report.ai_summary = Some(summary);
        report.metadata.insert("total_threats".to_string(), json!(stats.total_threats));
        report
            .metadata
            .insert("critical_assessments".to_string(), json!(stats.critical_assessments));
        report
            .metadata
            .insert("mean_risk".to_string(), json!(stats.mean_risk));
        report
            .metadata
            .insert("affected_assets".to_string(), json!(affected_asset_ids.len()));

        self.reports
            .save(&report)
            .await
            .map_err(|e| ReportingError::Repository(e.to_string()))?;

        if let Err(e) = self
            .events
            .publish(DomainEvent::ReportGenerated(ReportGenerated {
                report_id: report.id,
                report_kind: report.kind.as_str().to_string(),
                path: report.path.clone(),
                generated_at: report.generated_at,
            }))
            .await
        {
            error!(report_id = %report.id, error = %e, "Failed to publish ReportGenerated");
        }

        info!(report_id = %report.id, path = %report.path, "Weekly CISO report stored");
        Ok(report)
    }

    /// Business-language summary: the collaborator when reachable, the
    /// phrase dictionary otherwise.
    async fn business_summary(&self, technical: &str) -> String {
        if let Some(summarizer) = &self.summarizer {
            match summarizer
                .summarize(technical, Some(120), Some("en"), Some("business"))
                .await
            {
                Ok(summary) => return summary,
                Err(e) => {
                    warn!(error = %e, "Summariser unavailable, using rule-based paraphrase");
                }
            }
        }
        business_paraphrase(technical)
    }
}

/// Apply the technical-to-business phrase dictionary.
pub fn business_paraphrase(text: &str) -> String {
    let mut result = text.to_string();
    for (technical, business) in BUSINESS_PHRASES {
        result = result.replace(technical, business);
    }
    result
}

fn delta_label(delta: f64) -> String {
    if delta >= 0.0 {
        format!("+{:.2}", delta)
    } else {
        format!("{:.2}", delta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::InMemoryReportRepository;
    use core_assessment::{
        InMemoryAssetDirectory, InMemoryAssociationRepository, InMemoryRiskAssessmentRepository,
        RiskAssessment, RiskLevel,
    };
    use core_events::InMemoryEventBus;
    use core_threat_intel::{InMemoryThreatRepository, Threat};
    use uuid::Uuid;

    struct Fixture {
        service: WeeklyReportService,
        threats: Arc<InMemoryThreatRepository>,
        assessments: Arc<InMemoryRiskAssessmentRepository>,
        reports: Arc<InMemoryReportRepository>,
        _dir: tempfile::TempDir,
    }

    async fn fixture(timezone_offset: &str) -> Fixture {
        let bus = Arc::new(InMemoryEventBus::new());
        bus.start().await;
        let dir = tempfile::tempdir().unwrap();
        let threats = Arc::new(InMemoryThreatRepository::new());
        let assessments = Arc::new(InMemoryRiskAssessmentRepository::new());
        let associations = Arc::new(InMemoryAssociationRepository::new());
        let assets = Arc::new(InMemoryAssetDirectory::new());
        let reports = Arc::new(InMemoryReportRepository::new());
        let mut config = ReportConfig::default();
        config.timezone_offset = timezone_offset.to_string();

        let service = WeeklyReportService::new(
            threats.clone(),
            assessments.clone(),
            associations,
            assets,
            reports.clone(),
            Arc::new(ReportFileStore::new(dir.path().to_str().unwrap())),
            Arc::new(TemplateEngine::new().unwrap()),
            None,
            Arc::new(NoPdfRenderer),
            bus,
            config,
        );

        Fixture {
            service,
            threats,
            assessments,
            reports,
            _dir: dir,
        }
    }

    fn utc(rfc3339: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(rfc3339)
            .unwrap()
            .with_timezone(&Utc)
    }

    #[tokio::test]
    async fn test_period_is_previous_monday_to_sunday() {
        let fixture = fixture("+00:00").await;
        // 2024-03-13 is a Wednesday.
        let (start, end) = fixture.service.period_for(utc("2024-03-13T10:00:00Z"));
        assert_eq!(start, utc("2024-03-04T00:00:00Z"));
        assert_eq!(end, utc("2024-03-10T23:59:59Z"));
    }

    #[tokio::test]
    async fn test_period_respects_timezone_offset() {
        let fixture = fixture("+08:00").await;
        // 2024-03-11T01:00 in +08:00 is already Monday, so the report covers
        // the week before.
        let (start, end) = fixture.service.period_for(utc("2024-03-10T17:30:00Z"));
        assert_eq!(start, utc("2024-03-03T16:00:00Z"));
        assert_eq!(end, utc("2024-03-10T15:59:59Z"));
    }

    #[tokio::test]
    async fn test_generate_writes_html_and_persists_report() {
        let fixture = fixture("+00:00").await;

        // Seed one threat + assessment inside the previous week.
        let mut threat = Threat::create(
            Uuid::new_v4(),
            "FortiOS out-of-bounds write",
            None,
            Some("CVE-2024-21762".to_string()),
            Some(9.8),
            None,
            None,
            None,
            None,
        )
        .unwrap();
        threat.collected_at = utc("2024-03-05T12:00:00Z");
        fixture.threats.save(&threat).await.unwrap();

        let assessment = RiskAssessment {
            id: Uuid::new_v4(),
            threat_id: threat.id,
            association_id: Uuid::new_v4(),
            base_cvss_score: 9.8,
            asset_importance_weight: 1.0,
            affected_asset_count: 1,
            asset_count_weight: 0.01,
            pir_match_weight: 0.0,
            kev_weight: 0.5,
            final_risk_score: 9.0,
            risk_level: RiskLevel::Critical,
            calculation_details: json!({}),
            created_at: utc("2024-03-05T12:30:00Z"),
            updated_at: utc("2024-03-05T12:30:00Z"),
        };
        fixture.assessments.save(&assessment).await.unwrap();

        let report = fixture
            .service
            .generate(utc("2024-03-13T10:00:00Z"))
            .await
            .unwrap();

        assert_eq!(report.kind, ReportKind::CisoWeekly);
        assert!(report.path.ends_with("CISO_Weekly_Report_2024-03-10.html"));
        assert!(report.path.starts_with("2024/202403/"));
        assert_eq!(report.metadata["total_threats"], json!(1));
        assert_eq!(report.metadata["critical_assessments"], json!(1));
        assert!(report.ai_summary.is_some());

        let stored = fixture.reports.get(report.id).await.unwrap().unwrap();
        assert_eq!(stored.period_start, Some(utc("2024-03-04T00:00:00Z")));
    }

    #[tokio::test]
    async fn test_empty_week_still_generates() {
        let fixture = fixture("+00:00").await;
        let report = fixture
            .service
            .generate(utc("2024-03-13T10:00:00Z"))
            .await
            .unwrap();
        assert_eq!(report.metadata["total_threats"], json!(0));
    }

    #[test]
    fn test_business_paraphrase_dictionary() {
        let text = "A vulnerability allowing remote code execution was exploited.";
        let paraphrased = business_paraphrase(text);
        assert!(paraphrased.contains("security weakness"));
        assert!(paraphrased.contains("full system takeover risk"));
        assert!(paraphrased.contains("actively abused by attackers"));
        assert!(!paraphrased.contains("remote code execution"));
    }
}
