// =====================================================================================
// File: core-threat-intel/src/collectors/vmware.rs
// Description: VMware security advisory (VMSA) driver
// =====================================================================================

use super::{get_text, CollectionWindow, Collector};
use crate::feed::ThreatFeed;
use crate::retry::CollectorError;
use crate::threat::Threat;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use core_extraction::CveExtractor;
use once_cell::sync::Lazy;
use quick_xml::events::Event;
use quick_xml::Reader;
use regex::Regex;
use reqwest::Client;
use scraper::{Html, Selector};
use std::time::Duration;
use tracing::{info, warn};

const VMSA_RSS_URL: &str = "https://www.vmware.com/security/advisories.xml";
const VMSA_INDEX_URL: &str = "https://www.vmware.com/security/advisories.html";

static VMSA_ID_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"VMSA-(\d{4})-(\d{4,5})").expect("valid VMSA pattern"));

/// One parsed RSS item.
#[derive(Debug, Default, Clone)]
pub(crate) struct RssItem {
    pub title: String,
    pub description: String,
    pub link: String,
    pub pub_date: Option<DateTime<Utc>>,
}

/// Driver for VMware security advisories. Prefers the RSS feed; an empty
/// feed degrades to scraping the advisory index and fetching each page.
pub struct VmwareVmsaCollector {
    client: Client,
    rss_url: String,
    index_url: String,
    timeout: Duration,
    cve_extractor: CveExtractor,
}

impl VmwareVmsaCollector {
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: Client::new(),
            rss_url: VMSA_RSS_URL.to_string(),
            index_url: VMSA_INDEX_URL.to_string(),
            timeout,
            cve_extractor: CveExtractor::new(),
        }
    }

    /// Parse an RSS document into its items.
    pub(crate) fn parse_rss(payload: &str) -> Result<Vec<RssItem>, CollectorError> {
        let mut reader = Reader::from_str(payload);

        let mut items = Vec::new();
        let mut current: Option<RssItem> = None;
        let mut field: Option<String> = None;

        loop {
            match reader.read_event() {
                Ok(Event::Start(e)) => {
                    let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                    if name == "item" {
                        current = Some(RssItem::default());
                    } else if current.is_some() {
                        field = Some(name);
                    }
                }
                Ok(Event::Text(e)) => {
                    if let (Some(item), Some(field)) = (current.as_mut(), field.as_deref()) {
                        let text = e
                            .unescape()
                            .map_err(|err| {
                                CollectorError::DataFormat(format!("RSS text: {}", err))
                            })?
                            .trim()
                            .to_string();
                        if text.is_empty() {
                            continue;
                        }
                        match field {
                            "title" => item.title.push_str(&text),
                            "description" => item.description.push_str(&text),
                            "link" => item.link.push_str(&text),
                            "pubDate" => {
                                item.pub_date = DateTime::parse_from_rfc2822(&text)
                                    .ok()
                                    .map(|dt| dt.with_timezone(&Utc));
                            }
                            _ => {}
                        }
                    }
                }
                Ok(Event::End(e)) => {
                    let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                    if name == "item" {
                        if let Some(item) = current.take() {
                            items.push(item);
                        }
                    } else {
                        field = None;
                    }
                }
                Ok(Event::Eof) => break,
                Err(e) => {
                    return Err(CollectorError::DataFormat(format!("RSS document: {}", e)))
                }
                _ => {}
            }
        }

        Ok(items)
    }

    /// Advisory page links found on the HTML index.
    pub(crate) fn parse_index_links(html: &str, base: &str) -> Vec<String> {
        let document = Html::parse_document(html);
        let selector = Selector::parse("a[href]").expect("valid selector");

        let mut links = Vec::new();
        for element in document.select(&selector) {
            let Some(href) = element.value().attr("href") else {
                continue;
            };
            if VMSA_ID_PATTERN.is_match(href) {
                let absolute = if href.starts_with("http") {
                    href.to_string()
                } else {
                    // Host-absolute paths join against the scheme://host origin.
                    let origin = base
                        .find("://")
                        .and_then(|i| base[i + 3..].find('/').map(|j| &base[..i + 3 + j]))
                        .unwrap_or(base);
                    format!("{}/{}", origin.trim_end_matches('/'), href.trim_start_matches('/'))
                };
                if !links.contains(&absolute) {
                    links.push(absolute);
                }
            }
        }
        links
    }

    /// Build the threat records for one advisory. One record per extracted
    /// CVE; an advisory without any becomes a single CVE-less record.
    pub(crate) fn threats_from_advisory(
        &self,
        feed: &ThreatFeed,
        title: &str,
        description: &str,
        link: &str,
        published: Option<DateTime<Utc>>,
        raw_payload: &str,
    ) -> Vec<Threat> {
        let text = format!("{}\n{}", title, description);
        let cves = self.cve_extractor.extract_all(&text);
        let vmsa_id = VMSA_ID_PATTERN
            .find(title)
            .map(|m| m.as_str().to_string());

        let make = |cve: Option<String>| -> Option<Threat> {
            let title = match (&cve, &vmsa_id) {
                (Some(cve), Some(vmsa)) => format!("{}: {}", cve, vmsa),
                (Some(cve), None) => cve.clone(),
                (None, _) => title.to_string(),
            };
            let mut threat = Threat::create(
                feed.id,
                &title,
                Some(description.to_string()),
                cve,
                None,
                None,
                None,
                Some(link.to_string()),
                published,
            )
            .ok()?;
            threat.raw_payload = Some(raw_payload.to_string());
            Some(threat)
        };

        if cves.is_empty() {
            make(None).into_iter().collect()
        } else {
            cves.into_iter().filter_map(|cve| make(Some(cve))).collect()
        }
    }

    async fn collect_from_rss(
        &self,
        feed: &ThreatFeed,
        window: CollectionWindow,
    ) -> Result<Vec<Threat>, CollectorError> {
        let payload = get_text(&self.client, &self.rss_url, &[], self.timeout).await?;
        let items = Self::parse_rss(&payload)?;

        let mut threats = Vec::new();
        for item in items {
            if let (Some(since), Some(published)) = (window.since, item.pub_date) {
                if published < since {
                    continue;
                }
            }
            threats.extend(self.threats_from_advisory(
                feed,
                &item.title,
                &item.description,
                &item.link,
                item.pub_date,
                &format!("{}\n{}", item.title, item.description),
            ));
        }
        Ok(threats)
    }

    async fn collect_from_index(
        &self,
        feed: &ThreatFeed,
    ) -> Result<Vec<Threat>, CollectorError> {
        let index = get_text(&self.client, &self.index_url, &[], self.timeout).await?;
        let links = Self::parse_index_links(&index, &self.index_url);

        let mut threats = Vec::new();
        for link in links {
            match get_text(&self.client, &link, &[], self.timeout).await {
                Ok(page) => {
                    let document = Html::parse_document(&page);
                    let text: String = document.root_element().text().collect::<Vec<_>>().join(" ");
                    let title = VMSA_ID_PATTERN
                        .find(&link)
                        .map(|m| m.as_str().to_string())
                        .unwrap_or_else(|| link.clone());
                    threats.extend(self.threats_from_advisory(
                        feed, &title, &text, &link, None, &page,
                    ));
                }
                Err(e) => {
                    warn!(feed_id = %feed.id, url = %link, error = %e, "Advisory page fetch failed");
                }
            }
        }
        Ok(threats)
    }
}

#[async_trait]
impl Collector for VmwareVmsaCollector {
    fn collector_type(&self) -> &'static str {
        "VMware-VMSA"
    }

    async fn collect(
        &self,
        feed: &ThreatFeed,
        window: CollectionWindow,
    ) -> Result<Vec<Threat>, CollectorError> {
        info!(feed_id = %feed.id, feed_name = %feed.name, "Collecting VMware advisories");

        let threats = self.collect_from_rss(feed, window).await?;
        if !threats.is_empty() {
            info!(feed_id = %feed.id, count = threats.len(), "VMSA RSS parsed");
            return Ok(threats);
        }

        // Empty RSS: degrade to the HTML index.
        info!(feed_id = %feed.id, "VMSA RSS empty, scraping advisory index");
        let threats = self.collect_from_index(feed).await?;
        info!(feed_id = %feed.id, count = threats.len(), "VMSA index parsed");
        Ok(threats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CollectionFrequency, FeedPriority};
    use core_utils::fixtures::VMSA_RSS_SAMPLE;

    fn vmsa_feed() -> ThreatFeed {
        ThreatFeed::create(
            "VMware VMSA",
            FeedPriority::P2,
            CollectionFrequency::Weekly,
            None,
        )
        .unwrap()
    }

    fn collector() -> VmwareVmsaCollector {
        VmwareVmsaCollector::new(Duration::from_secs(5))
    }

    #[test]
    fn test_parse_rss_items() {
        let items = VmwareVmsaCollector::parse_rss(VMSA_RSS_SAMPLE).unwrap();
        assert_eq!(items.len(), 1);
        assert!(items[0].title.contains("VMSA-2024-0006"));
        assert!(items[0].link.contains("VMSA-2024-0006"));
        assert!(items[0].pub_date.is_some());
    }

    #[test]
    fn test_one_threat_per_cve() {
        let collector = collector();
        let feed = vmsa_feed();
        let items = VmwareVmsaCollector::parse_rss(VMSA_RSS_SAMPLE).unwrap();
        let item = &items[0];
        let threats = collector.threats_from_advisory(
            &feed,
            &item.title,
            &item.description,
            &item.link,
            item.pub_date,
            "raw",
        );
        assert_eq!(threats.len(), 2);
        let cves: Vec<_> = threats.iter().filter_map(|t| t.cve_id.as_deref()).collect();
        assert!(cves.contains(&"CVE-2024-22252"));
        assert!(cves.contains(&"CVE-2024-22253"));
        assert!(threats.iter().all(|t| t.title.contains("VMSA-2024-0006")));
    }

    #[test]
    fn test_advisory_without_cve_emits_single_record() {
        let collector = collector();
        let feed = vmsa_feed();
        let threats = collector.threats_from_advisory(
            &feed,
            "VMSA-2024-0001: VMware Tools update",
            "An update with no identifier yet.",
            "https://www.vmware.com/security/advisories/VMSA-2024-0001.html",
            None,
            "raw",
        );
        assert_eq!(threats.len(), 1);
        assert!(threats[0].cve_id.is_none());
        assert_eq!(threats[0].title, "VMSA-2024-0001: VMware Tools update");
    }

    #[test]
    fn test_parse_index_links() {
        let html = r#"<html><body>
            <a href="/security/advisories/VMSA-2024-0006.html">VMSA-2024-0006</a>
            <a href="/security/advisories/VMSA-2024-0007.html">VMSA-2024-0007</a>
            <a href="/unrelated.html">other</a>
            <a href="/security/advisories/VMSA-2024-0006.html">duplicate</a>
        </body></html>"#;
        let links = VmwareVmsaCollector::parse_index_links(
            html,
            "https://www.vmware.com/security/advisories.html",
        );
        assert_eq!(links.len(), 2);
        assert!(links[0].starts_with("https://www.vmware.com/"));
        assert!(links[0].contains("VMSA-2024-0006"));
    }

    #[test]
    fn test_malformed_rss_is_data_format_error() {
        let result = VmwareVmsaCollector::parse_rss("<rss><channel><item></rss");
        assert!(matches!(result, Err(CollectorError::DataFormat(_))));
    }
}
