// =====================================================================================
// File: core-threat-intel/src/collectors/cisa_kev.rs
// Description: CISA Known Exploited Vulnerabilities catalogue driver
// =====================================================================================

use super::{get_text, CollectionWindow, Collector};
use crate::feed::ThreatFeed;
use crate::retry::CollectorError;
use crate::threat::Threat;
use crate::types::ThreatSeverity;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{info, warn};

const KEV_FEED_URL: &str =
    "https://www.cisa.gov/sites/default/files/feeds/known_exploited_vulnerabilities.json";
const KEV_CATALOG_URL: &str = "https://www.cisa.gov/known-exploited-vulnerabilities-catalog";

#[derive(Debug, Deserialize)]
struct KevDocument {
    #[serde(default)]
    vulnerabilities: Vec<KevEntry>,
}

#[derive(Debug, Deserialize)]
struct KevEntry {
    #[serde(rename = "cveID")]
    cve_id: String,
    #[serde(rename = "vendorProject", default)]
    vendor_project: String,
    #[serde(default)]
    product: String,
    #[serde(rename = "vulnerabilityName", default)]
    vulnerability_name: String,
    #[serde(rename = "shortDescription", default)]
    short_description: String,
    #[serde(rename = "dateAdded", default)]
    date_added: String,
    #[serde(rename = "requiredAction", default)]
    required_action: String,
    #[serde(rename = "cvssScore")]
    cvss_score: Option<f64>,
}

/// Driver for the CISA KEV catalogue. A KEV listing already implies active
/// exploitation, so entries without a CVSS score default to High severity.
pub struct CisaKevCollector {
    client: Client,
    feed_url: String,
    timeout: Duration,
}

impl CisaKevCollector {
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: Client::new(),
            feed_url: KEV_FEED_URL.to_string(),
            timeout,
        }
    }

    /// Parse a KEV catalogue document into threat records.
    pub fn parse_document(
        payload: &str,
        feed: &ThreatFeed,
        window: CollectionWindow,
    ) -> Result<Vec<Threat>, CollectorError> {
        let document: KevDocument = serde_json::from_str(payload)
            .map_err(|e| CollectorError::DataFormat(format!("KEV document: {}", e)))?;

        let mut threats = Vec::new();
        for entry in document.vulnerabilities {
            let date_added = parse_date_added(&entry.date_added);

            if let (Some(since), Some(added)) = (window.since, date_added) {
                if added < since {
                    continue;
                }
            }

            match Self::threat_from_entry(&entry, feed, date_added) {
                Ok(threat) => threats.push(threat),
                Err(e) => {
                    warn!(cve = %entry.cve_id, error = %e, "Skipping malformed KEV entry");
                }
            }
        }
        Ok(threats)
    }

    fn threat_from_entry(
        entry: &KevEntry,
        feed: &ThreatFeed,
        date_added: Option<DateTime<Utc>>,
    ) -> Result<Threat, CollectorError> {
        let title = if entry.vulnerability_name.is_empty() {
            entry.cve_id.clone()
        } else {
            entry.vulnerability_name.clone()
        };

        let mut description = entry.short_description.clone();
        if !entry.required_action.is_empty() {
            if !description.is_empty() {
                description.push_str("\n\n");
            }
            description.push_str("Required action: ");
            description.push_str(&entry.required_action);
        }

        // Exploitation is a given for KEV listings.
        let severity = if entry.cvss_score.is_none() {
            Some(ThreatSeverity::High)
        } else {
            None
        };

        let mut threat = Threat::create(
            feed.id,
            &title,
            Some(description),
            Some(entry.cve_id.clone()),
            entry.cvss_score,
            None,
            severity,
            Some(KEV_CATALOG_URL.to_string()),
            date_added,
        )
        .map_err(|e| CollectorError::DataFormat(e.to_string()))?;

        let product_name = match (entry.vendor_project.is_empty(), entry.product.is_empty()) {
            (false, false) => Some(format!("{} {}", entry.vendor_project, entry.product)),
            (false, true) => Some(entry.vendor_project.clone()),
            (true, false) => Some(entry.product.clone()),
            (true, true) => None,
        };
        if let Some(name) = product_name {
            threat.add_product(&name, None, None, Some(entry.product.clone()));
        }

        threat.raw_payload = serde_json::to_string(&serde_json::json!({
            "cveID": entry.cve_id,
            "vendorProject": entry.vendor_project,
            "product": entry.product,
            "vulnerabilityName": entry.vulnerability_name,
            "shortDescription": entry.short_description,
            "dateAdded": entry.date_added,
            "requiredAction": entry.required_action,
            "cvssScore": entry.cvss_score,
        }))
        .ok();

        Ok(threat)
    }
}

fn parse_date_added(value: &str) -> Option<DateTime<Utc>> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| DateTime::from_naive_utc_and_offset(naive, Utc))
}

#[async_trait]
impl Collector for CisaKevCollector {
    fn collector_type(&self) -> &'static str {
        "CISA-KEV"
    }

    async fn collect(
        &self,
        feed: &ThreatFeed,
        window: CollectionWindow,
    ) -> Result<Vec<Threat>, CollectorError> {
        info!(feed_id = %feed.id, feed_name = %feed.name, "Collecting CISA KEV catalogue");
        let payload = get_text(&self.client, &self.feed_url, &[], self.timeout).await?;
        let threats = Self::parse_document(&payload, feed, window)?;
        info!(feed_id = %feed.id, count = threats.len(), "KEV catalogue parsed");
        Ok(threats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CollectionFrequency, FeedPriority};
    use core_utils::fixtures::KEV_SAMPLE;

    fn kev_feed() -> ThreatFeed {
        ThreatFeed::create("CISA KEV", FeedPriority::P0, CollectionFrequency::Daily, None)
            .unwrap()
    }

    #[test]
    fn test_parse_kev_document() {
        let feed = kev_feed();
        let threats =
            CisaKevCollector::parse_document(KEV_SAMPLE, &feed, CollectionWindow::default())
                .unwrap();
        assert_eq!(threats.len(), 1);

        let threat = &threats[0];
        assert_eq!(threat.cve_id.as_deref(), Some("CVE-2024-1709"));
        assert_eq!(threat.cvss_base_score, Some(10.0));
        assert_eq!(threat.severity, Some(ThreatSeverity::Critical));
        assert_eq!(threat.source_url.as_deref(), Some(KEV_CATALOG_URL));
        assert!(threat
            .description
            .as_deref()
            .unwrap()
            .contains("Required action: Apply mitigations"));
        assert_eq!(threat.products[0].product_name, "ConnectWise ScreenConnect");
        assert!(threat.raw_payload.is_some());
    }

    #[test]
    fn test_missing_cvss_defaults_to_high() {
        let payload = r#"{"vulnerabilities":[{
            "cveID": "CVE-2023-0001",
            "vendorProject": "Acme",
            "product": "Widget",
            "vulnerabilityName": "Acme Widget RCE",
            "shortDescription": "Remote code execution.",
            "dateAdded": "2023-06-01",
            "requiredAction": "Patch."
        }]}"#;
        let feed = kev_feed();
        let threats =
            CisaKevCollector::parse_document(payload, &feed, CollectionWindow::default()).unwrap();
        assert_eq!(threats[0].severity, Some(ThreatSeverity::High));
        assert!(threats[0].cvss_base_score.is_none());
    }

    #[test]
    fn test_window_filters_old_entries() {
        let feed = kev_feed();
        let window = CollectionWindow::new(
            Some(Utc::now()), // everything in the fixture predates "now"
            None,
        );
        let threats = CisaKevCollector::parse_document(KEV_SAMPLE, &feed, window).unwrap();
        assert!(threats.is_empty());
    }

    #[test]
    fn test_malformed_document_is_data_format_error() {
        let feed = kev_feed();
        let result =
            CisaKevCollector::parse_document("not json", &feed, CollectionWindow::default());
        assert!(matches!(result, Err(CollectorError::DataFormat(_))));
    }
}
