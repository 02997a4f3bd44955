// =====================================================================================
// File: core-threat-intel/src/collectors/nvd.rs
// Description: NVD REST v2.0 driver
// =====================================================================================

use super::{get_text, CollectionWindow, Collector};
use crate::feed::ThreatFeed;
use crate::rate_limit::RateLimiter;
use crate::retry::CollectorError;
use crate::threat::Threat;
use crate::types::ThreatSeverity;
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, NaiveDateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, warn};

const NVD_API_BASE_URL: &str = "https://services.nvd.nist.gov/rest/json/cves/2.0";

/// NVD API page ceiling.
const RESULTS_PER_PAGE: usize = 2000;

/// Token bucket: 5 requests per 6 seconds without a key, 50 with one.
const RATE_LIMIT_WINDOW_SECONDS: u64 = 6;
const RATE_LIMIT_ANONYMOUS: usize = 5;
const RATE_LIMIT_WITH_KEY: usize = 50;

/// Incremental default: the last seven days.
const DEFAULT_WINDOW_DAYS: i64 = 7;

#[derive(Debug, Deserialize)]
struct NvdResponse {
    #[serde(default)]
    vulnerabilities: Vec<NvdVulnerability>,
}

#[derive(Debug, Deserialize)]
struct NvdVulnerability {
    cve: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct NvdCve {
    id: String,
    #[serde(default)]
    published: Option<String>,
    #[serde(default)]
    descriptions: Vec<NvdDescription>,
    #[serde(default)]
    metrics: NvdMetrics,
    #[serde(default)]
    configurations: Vec<NvdConfiguration>,
}

#[derive(Debug, Deserialize)]
struct NvdDescription {
    #[serde(default)]
    lang: String,
    #[serde(default)]
    value: String,
}

#[derive(Debug, Default, Deserialize)]
struct NvdMetrics {
    #[serde(rename = "cvssMetricV31", default)]
    v31: Vec<NvdMetric>,
    #[serde(rename = "cvssMetricV30", default)]
    v30: Vec<NvdMetric>,
    #[serde(rename = "cvssMetricV2", default)]
    v2: Vec<NvdMetric>,
}

#[derive(Debug, Deserialize)]
struct NvdMetric {
    #[serde(rename = "cvssData", default)]
    cvss_data: NvdCvssData,
}

#[derive(Debug, Default, Deserialize)]
struct NvdCvssData {
    #[serde(rename = "baseScore")]
    base_score: Option<f64>,
    #[serde(rename = "vectorString")]
    vector_string: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NvdConfiguration {
    #[serde(default)]
    nodes: Vec<NvdNode>,
}

#[derive(Debug, Deserialize)]
struct NvdNode {
    #[serde(rename = "cpeMatch", default)]
    cpe_match: Vec<NvdCpeMatch>,
}

#[derive(Debug, Deserialize)]
struct NvdCpeMatch {
    #[serde(default)]
    criteria: Option<String>,
}

/// Parsed CPE 2.3 product identity.
#[derive(Debug, PartialEq)]
pub(crate) struct CpeProduct {
    pub name: String,
    pub version: Option<String>,
    pub product_type: Option<String>,
}

/// Driver for the NVD REST API. Carries its own global token bucket so the
/// service-wide request ceiling holds across concurrent collections.
pub struct NvdCollector {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    timeout: Duration,
    rate_limiter: RateLimiter,
}

impl NvdCollector {
    pub fn new(timeout: Duration, api_key: Option<String>) -> Self {
        let permits = if api_key.is_some() {
            RATE_LIMIT_WITH_KEY
        } else {
            RATE_LIMIT_ANONYMOUS
        };
        Self {
            client: Client::new(),
            base_url: NVD_API_BASE_URL.to_string(),
            api_key,
            timeout,
            rate_limiter: RateLimiter::new(permits, RATE_LIMIT_WINDOW_SECONDS),
        }
    }

    /// Query-string date format required by the API.
    pub(crate) fn format_query_date(date: DateTime<Utc>) -> String {
        date.format("%Y-%m-%dT%H:%M:%S.000 UTC-00:00").to_string()
    }

    /// Parse one API page into threat records.
    pub(crate) fn parse_page(payload: &str, feed: &ThreatFeed) -> Result<(Vec<Threat>, usize), CollectorError> {
        let response: NvdResponse = serde_json::from_str(payload)
            .map_err(|e| CollectorError::DataFormat(format!("NVD response: {}", e)))?;

        let page_len = response.vulnerabilities.len();
        let mut threats = Vec::new();
        for vulnerability in response.vulnerabilities {
            let raw = vulnerability.cve.clone();
            let cve: NvdCve = match serde_json::from_value(vulnerability.cve) {
                Ok(cve) => cve,
                Err(e) => {
                    warn!(error = %e, "Skipping unparsable NVD entry");
                    continue;
                }
            };
            match Self::threat_from_cve(&cve, &raw, feed) {
                Ok(threat) => threats.push(threat),
                Err(e) => warn!(cve = %cve.id, error = %e, "Skipping malformed NVD entry"),
            }
        }
        Ok((threats, page_len))
    }

    fn threat_from_cve(
        cve: &NvdCve,
        raw: &serde_json::Value,
        feed: &ThreatFeed,
    ) -> Result<Threat, CollectorError> {
        // English description preferred, first available otherwise.
        let description = cve
            .descriptions
            .iter()
            .find(|d| d.lang == "en")
            .or_else(|| cve.descriptions.first())
            .map(|d| d.value.clone())
            .unwrap_or_else(|| format!("CVE: {}", cve.id));

        let first_sentence: String = description
            .split('.')
            .next()
            .unwrap_or(&description)
            .chars()
            .take(100)
            .collect();
        let title = format!("{}: {}", cve.id, first_sentence);

        let published = cve.published.as_deref().and_then(parse_nvd_timestamp);

        // Prefer CVSS v3.1, then v3.0, then v2.0.
        let metric = cve
            .metrics
            .v31
            .first()
            .or_else(|| cve.metrics.v30.first())
            .or_else(|| cve.metrics.v2.first());
        let base_score = metric.and_then(|m| m.cvss_data.base_score);
        let vector = metric.and_then(|m| m.cvss_data.vector_string.clone());

        // No CVSS at all: tag Medium rather than leaving the record unranked.
        let severity = if base_score.is_none() {
            Some(ThreatSeverity::Medium)
        } else {
            None
        };

        let mut threat = Threat::create(
            feed.id,
            &title,
            Some(description),
            Some(cve.id.clone()),
            base_score,
            vector,
            severity,
            Some(format!("https://nvd.nist.gov/vuln/detail/{}", cve.id)),
            published,
        )
        .map_err(|e| CollectorError::DataFormat(e.to_string()))?;

        for configuration in &cve.configurations {
            for node in &configuration.nodes {
                for cpe in &node.cpe_match {
                    if let Some(criteria) = &cpe.criteria {
                        if let Some(product) = parse_cpe(criteria) {
                            threat.add_product(
                                &product.name,
                                product.version,
                                product.product_type,
                                Some(criteria.clone()),
                            );
                        }
                    }
                }
            }
        }

        threat.raw_payload = serde_json::to_string(raw).ok();
        Ok(threat)
    }
}

/// Parse `cpe:2.3:{a|o|h}:vendor:product:version:...` into a product identity.
pub(crate) fn parse_cpe(cpe: &str) -> Option<CpeProduct> {
    let parts: Vec<&str> = cpe.split(':').collect();
    if parts.len() < 6 || parts[0] != "cpe" {
        return None;
    }

    let product_type = match parts[2] {
        "a" => Some("Application".to_string()),
        "o" => Some("Operating System".to_string()),
        "h" => Some("Hardware".to_string()),
        _ => None,
    };

    let vendor = parts[3];
    let product = parts[4];
    let version = match parts[5] {
        "" | "*" | "-" => None,
        v => Some(v.to_string()),
    };

    let name = match (vendor != "*" && !vendor.is_empty(), product != "*" && !product.is_empty()) {
        (true, true) => format!("{} {}", vendor, product),
        (true, false) => vendor.to_string(),
        (false, true) => product.to_string(),
        (false, false) => return None,
    };

    Some(CpeProduct {
        name: name.replace('_', " "),
        version,
        product_type,
    })
}

fn parse_nvd_timestamp(value: &str) -> Option<DateTime<Utc>> {
    // NVD format: 2024-01-15T10:30:00.000
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.3f")
        .ok()
        .map(|naive| DateTime::from_naive_utc_and_offset(naive, Utc))
        .or_else(|| {
            DateTime::parse_from_rfc3339(value)
                .ok()
                .map(|dt| dt.with_timezone(&Utc))
        })
}

#[async_trait]
impl Collector for NvdCollector {
    fn collector_type(&self) -> &'static str {
        "NVD"
    }

    async fn collect(
        &self,
        feed: &ThreatFeed,
        window: CollectionWindow,
    ) -> Result<Vec<Threat>, CollectorError> {
        // Incremental fetch: explicit window, else last run, else 7 days.
        let since = window
            .since
            .or(feed.last_run_at)
            .unwrap_or_else(|| Utc::now() - ChronoDuration::days(DEFAULT_WINDOW_DAYS));
        let until = window.until.unwrap_or_else(Utc::now);

        info!(
            feed_id = %feed.id,
            since = %since,
            until = %until,
            "Collecting NVD vulnerabilities"
        );

        let mut headers: Vec<(&str, String)> = Vec::new();
        if let Some(key) = &self.api_key {
            headers.push(("apiKey", key.clone()));
        }

        let mut threats = Vec::new();
        let mut start_index = 0usize;

        loop {
            self.rate_limiter.acquire().await;

            let url = format!(
                "{}?startIndex={}&resultsPerPage={}&pubStartDate={}&pubEndDate={}",
                self.base_url,
                start_index,
                RESULTS_PER_PAGE,
                urlencode(&Self::format_query_date(since)),
                urlencode(&Self::format_query_date(until)),
            );

            let payload = get_text(&self.client, &url, &headers, self.timeout).await?;
            let (mut page_threats, page_len) = Self::parse_page(&payload, feed)?;
            threats.append(&mut page_threats);

            debug!(feed_id = %feed.id, collected = threats.len(), "NVD page parsed");

            if page_len < RESULTS_PER_PAGE {
                break;
            }
            start_index += RESULTS_PER_PAGE;
        }

        info!(feed_id = %feed.id, count = threats.len(), "NVD collection parsed");
        Ok(threats)
    }
}

fn urlencode(value: &str) -> String {
    value
        .replace('%', "%25")
        .replace(' ', "%20")
        .replace(':', "%3A")
        .replace('+', "%2B")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CollectionFrequency, FeedPriority};
    use core_utils::fixtures::NVD_SAMPLE;

    fn nvd_feed() -> ThreatFeed {
        ThreatFeed::create("NVD", FeedPriority::P1, CollectionFrequency::Daily, None).unwrap()
    }

    #[test]
    fn test_parse_page() {
        let feed = nvd_feed();
        let (threats, page_len) = NvdCollector::parse_page(NVD_SAMPLE, &feed).unwrap();
        assert_eq!(page_len, 1);
        assert_eq!(threats.len(), 1);

        let threat = &threats[0];
        assert_eq!(threat.cve_id.as_deref(), Some("CVE-2024-21762"));
        assert_eq!(threat.cvss_base_score, Some(9.8));
        assert_eq!(threat.severity, Some(ThreatSeverity::Critical));
        assert!(threat.title.starts_with("CVE-2024-21762: "));
        assert!(threat
            .description
            .as_deref()
            .unwrap()
            .contains("out-of-bounds write"));
        assert_eq!(
            threat.source_url.as_deref(),
            Some("https://nvd.nist.gov/vuln/detail/CVE-2024-21762")
        );
        assert!(threat.published_at.is_some());

        // CPE parsed into an OS product.
        assert_eq!(threat.products.len(), 1);
        assert_eq!(threat.products[0].product_name, "fortinet fortios");
        assert_eq!(threat.products[0].product_version.as_deref(), Some("7.4.2"));
        assert_eq!(
            threat.products[0].product_type.as_deref(),
            Some("Operating System")
        );
    }

    #[test]
    fn test_english_description_preferred() {
        let feed = nvd_feed();
        let (threats, _) = NvdCollector::parse_page(NVD_SAMPLE, &feed).unwrap();
        assert!(!threats[0].description.as_deref().unwrap().contains("limites"));
    }

    #[test]
    fn test_parse_cpe_variants() {
        let parsed = parse_cpe("cpe:2.3:a:microsoft:sql_server:2019:*:*:*:*:*:*:*").unwrap();
        assert_eq!(parsed.name, "microsoft sql server");
        assert_eq!(parsed.version.as_deref(), Some("2019"));
        assert_eq!(parsed.product_type.as_deref(), Some("Application"));

        let no_version = parse_cpe("cpe:2.3:h:cisco:asa:*:*:*:*:*:*:*:*").unwrap();
        assert!(no_version.version.is_none());
        assert_eq!(no_version.product_type.as_deref(), Some("Hardware"));

        assert!(parse_cpe("not-a-cpe").is_none());
    }

    #[test]
    fn test_missing_cvss_defaults_medium() {
        let feed = nvd_feed();
        let payload = r#"{"vulnerabilities":[{"cve":{
            "id": "CVE-2024-0042",
            "descriptions": [{"lang": "en", "value": "No metrics yet."}]
        }}]}"#;
        let (threats, _) = NvdCollector::parse_page(payload, &feed).unwrap();
        assert_eq!(threats[0].severity, Some(ThreatSeverity::Medium));
    }

    #[test]
    fn test_query_date_format() {
        let date = DateTime::parse_from_rfc3339("2024-02-09T16:15:00Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(
            NvdCollector::format_query_date(date),
            "2024-02-09T16:15:00.000 UTC-00:00"
        );
    }

    #[test]
    fn test_malformed_page_is_data_format_error() {
        let feed = nvd_feed();
        assert!(matches!(
            NvdCollector::parse_page("[]", &feed),
            Err(CollectorError::DataFormat(_))
        ));
    }
}
