// =====================================================================================
// File: core-threat-intel/src/collectors/mod.rs
// Description: Feed driver contract and driver selection
// =====================================================================================

//! One driver per external feed type. Drivers are pure transformers from
//! source bytes to threat records: they fetch and parse, but never touch the
//! threat store, the scheduler or the scorer.

pub mod cisa_kev;
pub mod msrc;
pub mod nvd;
pub mod twcert;
pub mod vmware;

pub use cisa_kev::CisaKevCollector;
pub use msrc::MsrcCollector;
pub use nvd::NvdCollector;
pub use twcert::TwcertCollector;
pub use vmware::VmwareVmsaCollector;

use crate::feed::ThreatFeed;
use crate::retry::CollectorError;
use crate::threat::Threat;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use core_config::CollectionConfig;
use core_extraction::ExtractionService;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;

/// Incremental collection window.
#[derive(Debug, Clone, Copy, Default)]
pub struct CollectionWindow {
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

impl CollectionWindow {
    pub fn new(since: Option<DateTime<Utc>>, until: Option<DateTime<Utc>>) -> Self {
        Self { since, until }
    }
}

/// Feed driver contract.
#[async_trait]
pub trait Collector: Send + Sync {
    /// Driver identifier for logs
    fn collector_type(&self) -> &'static str;

    /// Fetch and parse the source, yielding canonical threat records
    /// carrying the raw source payload.
    async fn collect(
        &self,
        feed: &ThreatFeed,
        window: CollectionWindow,
    ) -> Result<Vec<Threat>, CollectorError>;
}

/// Picks the driver for a feed by its display name.
pub struct CollectorFactory {
    cisa_kev: Arc<CisaKevCollector>,
    nvd: Arc<NvdCollector>,
    vmware: Arc<VmwareVmsaCollector>,
    msrc: Arc<MsrcCollector>,
    twcert: Arc<TwcertCollector>,
}

impl CollectorFactory {
    pub fn new(config: &CollectionConfig, extraction: Arc<ExtractionService>) -> Self {
        let timeout = Duration::from_secs(config.request_timeout_seconds);
        Self {
            cisa_kev: Arc::new(CisaKevCollector::new(timeout)),
            nvd: Arc::new(NvdCollector::new(timeout, config.nvd_api_key.clone())),
            vmware: Arc::new(VmwareVmsaCollector::new(timeout)),
            msrc: Arc::new(MsrcCollector::new(timeout, config.msrc_api_key.clone())),
            twcert: Arc::new(TwcertCollector::new(timeout, extraction)),
        }
    }

    /// Resolve the driver for a feed. Returns None when no driver claims
    /// the feed name.
    pub fn collector_for(&self, feed: &ThreatFeed) -> Option<Arc<dyn Collector>> {
        let name = feed.name.to_lowercase();
        if name.contains("cisa") || name.contains("kev") {
            Some(self.cisa_kev.clone())
        } else if name.contains("nvd") {
            Some(self.nvd.clone())
        } else if name.contains("vmware") || name.contains("vmsa") {
            Some(self.vmware.clone())
        } else if name.contains("msrc") || name.contains("microsoft") {
            Some(self.msrc.clone())
        } else if name.contains("twcert") {
            Some(self.twcert.clone())
        } else {
            None
        }
    }
}

/// GET a URL and return the response body, mapping transport failures and
/// non-success statuses onto the collector error taxonomy.
pub(crate) async fn get_text(
    client: &Client,
    url: &str,
    headers: &[(&str, String)],
    timeout: Duration,
) -> Result<String, CollectorError> {
    let mut request = client.get(url).timeout(timeout);
    for (name, value) in headers {
        request = request.header(*name, value);
    }

    let response = request.send().await.map_err(CollectorError::from_reqwest)?;
    if !response.status().is_success() {
        return Err(CollectorError::from_response(&response));
    }
    response.text().await.map_err(CollectorError::from_reqwest)
}
