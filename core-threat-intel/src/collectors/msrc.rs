// =====================================================================================
// File: core-threat-intel/src/collectors/msrc.rs
// Description: Microsoft Security Response Center (CVRF) driver
// =====================================================================================

use super::{get_text, CollectionWindow, Collector};
use crate::feed::ThreatFeed;
use crate::retry::CollectorError;
use crate::threat::Threat;
use crate::types::ThreatSeverity;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::{info, warn};

const MSRC_API_BASE_URL: &str = "https://api.msrc.microsoft.com/cvrf/v2.0";

/// Driver for the MSRC security update API: the update index first, then one
/// CVRF document per update, one threat per distinct CVE in the document.
pub struct MsrcCollector {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl MsrcCollector {
    pub fn new(timeout: Duration, api_key: Option<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: MSRC_API_BASE_URL.to_string(),
            api_key,
            timeout,
        }
    }

    fn headers(&self) -> Vec<(&'static str, String)> {
        let mut headers = vec![("Accept", "application/json".to_string())];
        if let Some(key) = &self.api_key {
            headers.push(("apiKey", key.clone()));
        }
        headers
    }

    /// Update ids listed by the index, filtered to the collection window.
    pub(crate) fn parse_update_index(
        payload: &str,
        window: CollectionWindow,
    ) -> Result<Vec<String>, CollectorError> {
        let document: Value = serde_json::from_str(payload)
            .map_err(|e| CollectorError::DataFormat(format!("MSRC index: {}", e)))?;

        let updates = document
            .get("value")
            .and_then(Value::as_array)
            .ok_or_else(|| CollectorError::DataFormat("MSRC index missing 'value'".to_string()))?;

        let mut ids = Vec::new();
        for update in updates {
            let Some(id) = update.get("ID").and_then(Value::as_str) else {
                continue;
            };
            if let Some(since) = window.since {
                let release = update
                    .get("ReleaseDate")
                    .and_then(Value::as_str)
                    .and_then(parse_iso_datetime);
                if let Some(release) = release {
                    if release < since {
                        continue;
                    }
                }
            }
            ids.push(id.to_string());
        }
        Ok(ids)
    }

    /// Parse one CVRF document into threat records.
    pub(crate) fn parse_cvrf_document(
        payload: &str,
        feed: &ThreatFeed,
    ) -> Result<Vec<Threat>, CollectorError> {
        let document: Value = serde_json::from_str(payload)
            .map_err(|e| CollectorError::DataFormat(format!("CVRF document: {}", e)))?;

        let document_title = document
            .get("DocumentTitle")
            .and_then(value_or_nested_str)
            .unwrap_or_default();

        let published = document
            .get("DocumentTracking")
            .and_then(|t| t.get("InitialReleaseDate"))
            .and_then(Value::as_str)
            .and_then(parse_iso_datetime);

        let empty = Vec::new();
        let vulnerabilities = document
            .get("Vulnerability")
            .and_then(Value::as_array)
            .unwrap_or(&empty);

        let mut threats = Vec::new();
        let mut seen_cves: Vec<String> = Vec::new();

        for vulnerability in vulnerabilities {
            let Some(cve) = vulnerability.get("CVE").and_then(Value::as_str) else {
                continue;
            };
            if seen_cves.iter().any(|c| c == cve) {
                continue;
            }
            seen_cves.push(cve.to_string());

            match Self::threat_from_vulnerability(vulnerability, cve, &document_title, published, feed)
            {
                Ok(threat) => threats.push(threat),
                Err(e) => warn!(cve = %cve, error = %e, "Skipping malformed CVRF entry"),
            }
        }
        Ok(threats)
    }

    fn threat_from_vulnerability(
        vulnerability: &Value,
        cve: &str,
        document_title: &str,
        published: Option<DateTime<Utc>>,
        feed: &ThreatFeed,
    ) -> Result<Threat, CollectorError> {
        let title = if document_title.is_empty() {
            cve.to_string()
        } else {
            format!("{}: {}", cve, document_title)
        };

        // English note of type "Description" preferred.
        let empty = Vec::new();
        let notes = vulnerability
            .get("Notes")
            .and_then(Value::as_array)
            .unwrap_or(&empty);
        let description = notes
            .iter()
            .find(|note| {
                note.get("Type").and_then(note_type_is_description).unwrap_or(false)
                    && note
                        .get("Lang")
                        .and_then(Value::as_str)
                        .map(|l| l.starts_with("en"))
                        .unwrap_or(true)
            })
            .and_then(|note| {
                note.get("Text")
                    .or_else(|| note.get("Value"))
                    .and_then(Value::as_str)
            })
            .map(str::to_string)
            .unwrap_or_else(|| format!("Microsoft Security Update: {}", cve));

        let cvss_set = vulnerability
            .get("CVSSScoreSets")
            .and_then(Value::as_array)
            .and_then(|sets| sets.first());
        let base_score = cvss_set
            .and_then(|s| s.get("BaseScore"))
            .and_then(Value::as_f64);
        let vector = cvss_set
            .and_then(|s| s.get("Vector"))
            .and_then(Value::as_str)
            .map(str::to_string);

        let severity = if base_score.is_none() {
            Some(ThreatSeverity::Medium)
        } else {
            None
        };

        let mut threat = Threat::create(
            feed.id,
            &title,
            Some(description),
            Some(cve.to_string()),
            base_score,
            vector,
            severity,
            Some(format!(
                "https://msrc.microsoft.com/update-guide/vulnerability/{}",
                cve
            )),
            published,
        )
        .map_err(|e| CollectorError::DataFormat(e.to_string()))?;

        // Product statuses carry product ids; the full product tree lookup
        // is out of scope, the ids still give correlation something to chew.
        if let Some(statuses) = vulnerability.get("ProductStatuses").and_then(Value::as_array) {
            for status in statuses {
                if let Some(ids) = status.get("ProductID").and_then(Value::as_array) {
                    for id in ids.iter().filter_map(Value::as_str) {
                        threat.add_product(id, None, None, Some(id.to_string()));
                    }
                }
            }
        }

        threat.raw_payload = serde_json::to_string(vulnerability).ok();
        Ok(threat)
    }
}

/// CVRF titles appear both as plain strings and `{"Value": "..."}` objects.
fn value_or_nested_str(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Object(map) => map.get("Value").and_then(Value::as_str).map(str::to_string),
        _ => None,
    }
}

/// Note Type is numeric (2 = Description) in the JSON rendering, but tolerate
/// the string form too.
fn note_type_is_description(value: &Value) -> Option<bool> {
    match value {
        Value::Number(n) => Some(n.as_i64() == Some(2)),
        Value::String(s) => Some(s == "Description"),
        _ => Some(false),
    }
}

fn parse_iso_datetime(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

#[async_trait]
impl Collector for MsrcCollector {
    fn collector_type(&self) -> &'static str {
        "MSRC"
    }

    async fn collect(
        &self,
        feed: &ThreatFeed,
        window: CollectionWindow,
    ) -> Result<Vec<Threat>, CollectorError> {
        info!(feed_id = %feed.id, feed_name = %feed.name, "Collecting MSRC updates");

        let index_url = format!("{}/updates", self.base_url);
        let index = get_text(&self.client, &index_url, &self.headers(), self.timeout).await?;
        let update_ids = Self::parse_update_index(&index, window)?;

        info!(feed_id = %feed.id, updates = update_ids.len(), "MSRC update index parsed");

        let mut threats = Vec::new();
        for update_id in update_ids {
            let url = format!("{}/cvrf/{}", self.base_url, update_id);
            match get_text(&self.client, &url, &self.headers(), self.timeout).await {
                Ok(payload) => match Self::parse_cvrf_document(&payload, feed) {
                    Ok(mut parsed) => threats.append(&mut parsed),
                    Err(e) => {
                        warn!(feed_id = %feed.id, update_id = %update_id, error = %e, "CVRF parse failed");
                    }
                },
                Err(e) => {
                    warn!(feed_id = %feed.id, update_id = %update_id, error = %e, "CVRF fetch failed");
                }
            }
        }

        info!(feed_id = %feed.id, count = threats.len(), "MSRC collection parsed");
        Ok(threats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CollectionFrequency, FeedPriority};

    fn msrc_feed() -> ThreatFeed {
        ThreatFeed::create(
            "Microsoft MSRC",
            FeedPriority::P1,
            CollectionFrequency::Weekly,
            None,
        )
        .unwrap()
    }

    const CVRF_SAMPLE: &str = r#"{
        "DocumentTitle": {"Value": "March 2024 Security Updates"},
        "DocumentTracking": {"InitialReleaseDate": "2024-03-12T08:00:00Z"},
        "Vulnerability": [
            {
                "CVE": "CVE-2024-26170",
                "Notes": [
                    {"Type": 2, "Lang": "en", "Text": "Windows kernel elevation of privilege vulnerability."}
                ],
                "CVSSScoreSets": [
                    {"BaseScore": 7.8, "Vector": "CVSS:3.1/AV:L/AC:L/PR:L/UI:N/S:U/C:H/I:H/A:H"}
                ],
                "ProductStatuses": [
                    {"ProductID": ["11568", "11569"]}
                ]
            },
            {
                "CVE": "CVE-2024-26170",
                "Notes": []
            },
            {
                "CVE": "CVE-2024-21334",
                "Notes": []
            }
        ]
    }"#;

    #[test]
    fn test_parse_cvrf_one_threat_per_distinct_cve() {
        let feed = msrc_feed();
        let threats = MsrcCollector::parse_cvrf_document(CVRF_SAMPLE, &feed).unwrap();
        assert_eq!(threats.len(), 2);
        assert_eq!(threats[0].cve_id.as_deref(), Some("CVE-2024-26170"));
        assert_eq!(threats[1].cve_id.as_deref(), Some("CVE-2024-21334"));
    }

    #[test]
    fn test_cvrf_description_and_cvss() {
        let feed = msrc_feed();
        let threats = MsrcCollector::parse_cvrf_document(CVRF_SAMPLE, &feed).unwrap();
        let threat = &threats[0];
        assert!(threat
            .description
            .as_deref()
            .unwrap()
            .contains("elevation of privilege"));
        assert_eq!(threat.cvss_base_score, Some(7.8));
        assert_eq!(threat.severity, Some(ThreatSeverity::High));
        assert_eq!(threat.products.len(), 2);
        assert!(threat.published_at.is_some());
        assert!(threat.title.contains("March 2024 Security Updates"));
    }

    #[test]
    fn test_cvrf_without_cvss_defaults_medium() {
        let feed = msrc_feed();
        let threats = MsrcCollector::parse_cvrf_document(CVRF_SAMPLE, &feed).unwrap();
        assert_eq!(threats[1].severity, Some(ThreatSeverity::Medium));
        assert!(threats[1]
            .description
            .as_deref()
            .unwrap()
            .contains("Microsoft Security Update"));
    }

    #[test]
    fn test_parse_update_index_with_window() {
        let index = r#"{"value": [
            {"ID": "2024-Mar", "ReleaseDate": "2024-03-12T08:00:00Z"},
            {"ID": "2023-Nov", "ReleaseDate": "2023-11-14T08:00:00Z"}
        ]}"#;
        let window = CollectionWindow::new(
            Some(
                DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z")
                    .unwrap()
                    .with_timezone(&Utc),
            ),
            None,
        );
        let ids = MsrcCollector::parse_update_index(index, window).unwrap();
        assert_eq!(ids, vec!["2024-Mar"]);
    }

    #[test]
    fn test_malformed_index_is_data_format_error() {
        assert!(matches!(
            MsrcCollector::parse_update_index("{}", CollectionWindow::default()),
            Err(CollectorError::DataFormat(_))
        ));
    }
}
