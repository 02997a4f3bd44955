// =====================================================================================
// File: core-threat-intel/src/threat.rs
// Description: Threat aggregate and embedded product entities
// =====================================================================================

use crate::types::{ThreatSeverity, ThreatStatus};
use crate::{ThreatIntelError, ThreatIntelResult};
use chrono::{DateTime, Utc};
use core_extraction::{ExtractedThreatInfo, IocBuckets};
use core_utils::{content_digest, Validate};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A product mention embedded in a threat
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreatProduct {
    pub id: Uuid,
    pub product_name: String,
    pub product_version: Option<String>,
    pub product_type: Option<String>,
    /// The literal source fragment this mention was extracted from
    pub original_text: Option<String>,
}

impl ThreatProduct {
    pub fn new(
        product_name: &str,
        product_version: Option<String>,
        product_type: Option<String>,
        original_text: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            product_name: product_name.to_string(),
            product_version,
            product_type,
            original_text,
        }
    }

    /// True when the mention refers to an operating system.
    pub fn is_operating_system(&self) -> bool {
        self.product_type
            .as_deref()
            .map(|t| {
                let t = t.to_lowercase();
                t == "operating system" || t == "os"
            })
            .unwrap_or(false)
    }
}

/// One vulnerability advisory, normalised into the uniform threat model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Threat {
    pub id: Uuid,
    pub feed_id: Uuid,
    /// Globally unique when present
    pub cve_id: Option<String>,
    pub title: String,
    pub description: Option<String>,
    pub cvss_base_score: Option<f64>,
    pub cvss_vector: Option<String>,
    pub severity: Option<ThreatSeverity>,
    pub status: ThreatStatus,
    pub source_url: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub collected_at: DateTime<Utc>,
    pub products: Vec<ThreatProduct>,
    /// ATT&CK technique ids
    pub ttps: Vec<String>,
    pub iocs: IocBuckets,
    /// Original source bytes, verbatim
    pub raw_payload: Option<String>,
    /// Upsert key: the CVE id when present, else a digest of
    /// (feed, source URL, title)
    pub dedup_key: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Threat {
    #[allow(clippy::too_many_arguments)]
    pub fn create(
        feed_id: Uuid,
        title: &str,
        description: Option<String>,
        cve_id: Option<String>,
        cvss_base_score: Option<f64>,
        cvss_vector: Option<String>,
        severity: Option<ThreatSeverity>,
        source_url: Option<String>,
        published_at: Option<DateTime<Utc>>,
    ) -> ThreatIntelResult<Self> {
        Validate::not_empty(title, "title")?;
        if let Some(score) = cvss_base_score {
            Validate::score_range(score, "cvss_base_score")?;
        }

        // The provided severity wins; CVSS only fills a missing tag.
        let severity = severity.or_else(|| cvss_base_score.map(ThreatSeverity::from_cvss));

        let dedup_key = Self::dedup_key_for(feed_id, &cve_id, &source_url, title);
        let now = Utc::now();
        Ok(Self {
            id: Uuid::new_v4(),
            feed_id,
            cve_id,
            title: title.trim().to_string(),
            description,
            cvss_base_score,
            cvss_vector,
            severity,
            status: ThreatStatus::New,
            source_url,
            published_at,
            collected_at: now,
            products: Vec::new(),
            ttps: Vec::new(),
            iocs: IocBuckets::default(),
            raw_payload: None,
            dedup_key,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn dedup_key_for(
        feed_id: Uuid,
        cve_id: &Option<String>,
        source_url: &Option<String>,
        title: &str,
    ) -> String {
        match cve_id {
            Some(cve) => cve.to_uppercase(),
            None => {
                let feed = feed_id.to_string();
                content_digest(&[&feed, source_url.as_deref().unwrap_or(""), title])
            }
        }
    }

    /// Move the threat through its lifecycle. Forbidden transitions raise.
    pub fn update_status(&mut self, new_status: ThreatStatus) -> ThreatIntelResult<()> {
        if !self.status.can_transition_to(new_status) {
            return Err(ThreatIntelError::IllegalTransition {
                from: self.status.to_string(),
                to: new_status.to_string(),
            });
        }
        self.status = new_status;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Add a product mention, skipping (name, version) duplicates.
    pub fn add_product(
        &mut self,
        product_name: &str,
        product_version: Option<String>,
        product_type: Option<String>,
        original_text: Option<String>,
    ) {
        let exists = self.products.iter().any(|p| {
            p.product_name == product_name && p.product_version == product_version
        });
        if exists {
            return;
        }
        self.products.push(ThreatProduct::new(
            product_name,
            product_version,
            product_type,
            original_text,
        ));
        self.updated_at = Utc::now();
    }

    pub fn add_ttp(&mut self, ttp_id: &str) {
        if !self.ttps.iter().any(|t| t == ttp_id) {
            self.ttps.push(ttp_id.to_string());
            self.updated_at = Utc::now();
        }
    }

    pub fn add_ioc_ip(&mut self, ip: &str) {
        if !self.iocs.ips.iter().any(|v| v == ip) {
            self.iocs.ips.push(ip.to_string());
            self.updated_at = Utc::now();
        }
    }

    pub fn add_ioc_domain(&mut self, domain: &str) {
        if !self.iocs.domains.iter().any(|v| v == domain) {
            self.iocs.domains.push(domain.to_string());
            self.updated_at = Utc::now();
        }
    }

    pub fn add_ioc_hash(&mut self, hash: &str) {
        if !self.iocs.hashes.iter().any(|v| v == hash) {
            self.iocs.hashes.push(hash.to_string());
            self.updated_at = Utc::now();
        }
    }

    /// Update the mutable advisory fields. Re-ingesting a known CVE goes
    /// through here; identity fields (cve, feed) never change.
    pub fn update_from(&mut self, other: &Threat) -> ThreatIntelResult<()> {
        Validate::not_empty(&other.title, "title")?;
        self.title = other.title.clone();
        if other.description.is_some() {
            self.description = other.description.clone();
        }
        if let Some(score) = other.cvss_base_score {
            Validate::score_range(score, "cvss_base_score")?;
            self.cvss_base_score = Some(score);
            // Recompute the tag unless the source authored one.
            self.severity = other
                .severity
                .or(Some(ThreatSeverity::from_cvss(score)));
        } else if other.severity.is_some() {
            self.severity = other.severity;
        }
        if other.cvss_vector.is_some() {
            self.cvss_vector = other.cvss_vector.clone();
        }
        if other.source_url.is_some() {
            self.source_url = other.source_url.clone();
        }
        if other.published_at.is_some() {
            self.published_at = other.published_at;
        }
        if other.raw_payload.is_some() {
            self.raw_payload = other.raw_payload.clone();
        }
        for product in &other.products {
            self.add_product(
                &product.product_name,
                product.product_version.clone(),
                product.product_type.clone(),
                product.original_text.clone(),
            );
        }
        for ttp in &other.ttps {
            self.add_ttp(ttp);
        }
        self.merge_iocs(&other.iocs);
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Merge extraction output. Nothing is overwritten: the CVE only fills a
    /// missing identifier, collections are appended with de-duplication.
    pub fn merge_extracted(&mut self, info: &ExtractedThreatInfo) {
        if self.cve_id.is_none() {
            if let Some(cve) = info.cves.first() {
                self.cve_id = Some(cve.clone());
                self.dedup_key = cve.to_uppercase();
            }
        }
        for product in &info.products {
            self.add_product(
                &product.product_name,
                product.product_version.clone(),
                product.product_type.clone(),
                product.original_text.clone(),
            );
        }
        for ttp in &info.ttps {
            self.add_ttp(ttp);
        }
        self.merge_iocs(&info.iocs);
    }

    fn merge_iocs(&mut self, iocs: &IocBuckets) {
        for ip in &iocs.ips {
            self.add_ioc_ip(ip);
        }
        for domain in &iocs.domains {
            self.add_ioc_domain(domain);
        }
        for hash in &iocs.hashes {
            self.add_ioc_hash(hash);
        }
    }

    /// Whether the record still needs an extraction pass.
    pub fn needs_enrichment(&self) -> bool {
        self.products.is_empty() && self.ttps.is_empty() && self.iocs.is_empty()
    }

    /// Text fed to the extraction service.
    pub fn extraction_text(&self) -> String {
        match &self.description {
            Some(description) => format!("{}\n{}", self.title, description),
            None => self.title.clone(),
        }
    }
}
