// =====================================================================================
// File: core-threat-intel/src/collectors/twcert.rs
// Description: TWCERT/CC advisory driver
// =====================================================================================

use super::{get_text, CollectionWindow, Collector};
use crate::feed::ThreatFeed;
use crate::retry::CollectorError;
use crate::threat::Threat;
use async_trait::async_trait;
use core_extraction::{ExtractedThreatInfo, ExtractionService};
use reqwest::Client;
use scraper::{Html, Selector};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

const TWCERT_BASE_URL: &str = "https://www.twcert.org.tw";
const TWCERT_ADVISORY_PATH: &str = "/twcert/advisory";

/// One advisory link from the index.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct AdvisoryLink {
    pub url: String,
    pub title: String,
}

/// Driver for TWCERT/CC advisories. The content is Chinese prose, so every
/// page goes through the extraction service; one threat per extracted CVE,
/// or a single CVE-less record carrying the advisory title.
pub struct TwcertCollector {
    client: Client,
    base_url: String,
    timeout: Duration,
    extraction: Arc<ExtractionService>,
}

impl TwcertCollector {
    pub fn new(timeout: Duration, extraction: Arc<ExtractionService>) -> Self {
        Self {
            client: Client::new(),
            base_url: TWCERT_BASE_URL.to_string(),
            timeout,
            extraction,
        }
    }

    /// Advisory anchors on the index page.
    pub(crate) fn parse_index(html: &str, base_url: &str) -> Vec<AdvisoryLink> {
        let document = Html::parse_document(html);
        let selector = Selector::parse("a[href]").expect("valid selector");

        let mut links = Vec::new();
        for element in document.select(&selector) {
            let Some(href) = element.value().attr("href") else {
                continue;
            };
            if !href.contains(TWCERT_ADVISORY_PATH) || href.trim_end_matches('/').ends_with("advisory")
            {
                continue;
            }
            let title: String = element.text().collect::<Vec<_>>().join(" ").trim().to_string();
            let url = if href.starts_with("http") {
                href.to_string()
            } else {
                format!("{}/{}", base_url.trim_end_matches('/'), href.trim_start_matches('/'))
            };
            let link = AdvisoryLink { url, title };
            if !links.contains(&link) {
                links.push(link);
            }
        }
        links
    }

    /// Visible text of an advisory page.
    pub(crate) fn page_text(html: &str) -> String {
        let document = Html::parse_document(html);
        document
            .root_element()
            .text()
            .collect::<Vec<_>>()
            .join(" ")
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Build threat records from one advisory's extraction result.
    pub(crate) fn threats_from_extraction(
        feed: &ThreatFeed,
        advisory: &AdvisoryLink,
        info: &ExtractedThreatInfo,
        description: &str,
        raw_payload: &str,
    ) -> Vec<Threat> {
        let make = |cve: Option<String>| -> Option<Threat> {
            let title = match &cve {
                Some(cve) => format!("{}: {}", cve, advisory.title),
                None => advisory.title.clone(),
            };
            let mut threat = Threat::create(
                feed.id,
                &title,
                Some(description.to_string()),
                cve,
                None,
                None,
                None,
                Some(advisory.url.clone()),
                None,
            )
            .ok()?;
            for product in &info.products {
                threat.add_product(
                    &product.product_name,
                    product.product_version.clone(),
                    product.product_type.clone(),
                    product.original_text.clone(),
                );
            }
            for ttp in &info.ttps {
                threat.add_ttp(ttp);
            }
            for ip in &info.iocs.ips {
                threat.add_ioc_ip(ip);
            }
            for domain in &info.iocs.domains {
                threat.add_ioc_domain(domain);
            }
            for hash in &info.iocs.hashes {
                threat.add_ioc_hash(hash);
            }
            threat.raw_payload = Some(raw_payload.to_string());
            Some(threat)
        };

        if info.cves.is_empty() {
            make(None).into_iter().collect()
        } else {
            info.cves
                .iter()
                .filter_map(|cve| make(Some(cve.clone())))
                .collect()
        }
    }
}

#[async_trait]
impl Collector for TwcertCollector {
    fn collector_type(&self) -> &'static str {
        "TWCERT"
    }

    async fn collect(
        &self,
        feed: &ThreatFeed,
        _window: CollectionWindow,
    ) -> Result<Vec<Threat>, CollectorError> {
        info!(feed_id = %feed.id, feed_name = %feed.name, "Collecting TWCERT advisories");

        let index_url = format!("{}{}", self.base_url, TWCERT_ADVISORY_PATH);
        let index = get_text(&self.client, &index_url, &[], self.timeout).await?;
        let advisories = Self::parse_index(&index, &self.base_url);

        info!(feed_id = %feed.id, advisories = advisories.len(), "TWCERT index parsed");

        let mut threats = Vec::new();
        for advisory in advisories {
            let page = match get_text(&self.client, &advisory.url, &[], self.timeout).await {
                Ok(page) => page,
                Err(e) => {
                    warn!(feed_id = %feed.id, url = %advisory.url, error = %e, "Advisory fetch failed");
                    continue;
                }
            };

            let text = Self::page_text(&page);
            let extraction_input = format!("{}\n{}", advisory.title, text);
            let info = self.extraction.extract(&extraction_input).await;

            threats.extend(Self::threats_from_extraction(
                feed, &advisory, &info, &text, &page,
            ));
        }

        info!(feed_id = %feed.id, count = threats.len(), "TWCERT collection parsed");
        Ok(threats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CollectionFrequency, FeedPriority};

    fn twcert_feed() -> ThreatFeed {
        ThreatFeed::create("TWCERT/CC", FeedPriority::P2, CollectionFrequency::Daily, None)
            .unwrap()
    }

    const INDEX_SAMPLE: &str = r#"<html><body>
        <a href="/twcert/advisory/TA-2024-0012">台灣企業遭勒索軟體攻擊通報</a>
        <a href="/twcert/advisory/TA-2024-0013">重大漏洞 CVE-2024-12345 通報</a>
        <a href="/twcert/advisory">index</a>
        <a href="/other/page">unrelated</a>
    </body></html>"#;

    #[test]
    fn test_parse_index_extracts_advisory_links() {
        let links = TwcertCollector::parse_index(INDEX_SAMPLE, TWCERT_BASE_URL);
        assert_eq!(links.len(), 2);
        assert_eq!(
            links[0].url,
            "https://www.twcert.org.tw/twcert/advisory/TA-2024-0012"
        );
        assert!(links[0].title.contains("勒索軟體"));
    }

    #[tokio::test]
    async fn test_one_threat_per_extracted_cve() {
        let feed = twcert_feed();
        let advisory = AdvisoryLink {
            url: "https://www.twcert.org.tw/twcert/advisory/TA-2024-0013".to_string(),
            title: "重大漏洞通報".to_string(),
        };
        let service = ExtractionService::rules_only();
        let info = service
            .extract("本通報涵蓋 CVE-2024-12345 與 CVE-2024-67890，屬釣魚攻擊")
            .await;
        let threats =
            TwcertCollector::threats_from_extraction(&feed, &advisory, &info, "描述", "raw");

        assert_eq!(threats.len(), 2);
        assert!(threats.iter().all(|t| t.title.contains("重大漏洞通報")));
        assert!(threats.iter().all(|t| t.ttps.contains(&"T1566.001".to_string())));
    }

    #[tokio::test]
    async fn test_advisory_without_cve_emits_single_record() {
        let feed = twcert_feed();
        let advisory = AdvisoryLink {
            url: "https://www.twcert.org.tw/twcert/advisory/TA-2024-0012".to_string(),
            title: "資安事件通報".to_string(),
        };
        let service = ExtractionService::rules_only();
        let info = service.extract("無法識別具體編號的事件描述").await;
        let threats =
            TwcertCollector::threats_from_extraction(&feed, &advisory, &info, "描述", "raw");

        assert_eq!(threats.len(), 1);
        assert!(threats[0].cve_id.is_none());
        assert_eq!(threats[0].title, "資安事件通報");
    }

    #[test]
    fn test_page_text_strips_markup() {
        let text = TwcertCollector::page_text("<html><body><p>第一段</p><p>第二段</p></body></html>");
        assert_eq!(text, "第一段 第二段");
    }
}
