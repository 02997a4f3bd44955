// =====================================================================================
// File: core-extraction/src/lib.rs
// Description: Threat entity extraction framework for the AETIM platform
// =====================================================================================

//! # Core Extraction
//!
//! Pulls CVE identifiers, product mentions, ATT&CK technique ids and IOCs out
//! of free advisory text. Two paths exist: the external ML extractor
//! collaborator (preferred when reachable) and the in-process rule engine.
//! The rule engine is the unconditional fallback; extraction never fails
//! closed because the collaborator is down.

pub mod ai_client;
pub mod cve;
pub mod ioc;
pub mod product;
pub mod service;
pub mod ttp;

pub use ai_client::AiServiceClient;
pub use cve::CveExtractor;
pub use ioc::IocExtractor;
pub use product::ProductExtractor;
pub use service::ExtractionService;
pub use ttp::TtpExtractor;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Extraction errors
#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("Extractor service unavailable: {0}")]
    ServiceUnavailable(String),
    #[error("Extractor service returned malformed output: {0}")]
    MalformedResponse(String),
    #[error("Extractor service disabled")]
    Disabled,
    #[error("Network error: {0}")]
    Network(String),
}

/// Result type for extraction operations
pub type ExtractionResult<T> = Result<T, ExtractionError>;

/// Which engine produced an extraction result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionOrigin {
    Ml,
    Rule,
}

impl std::fmt::Display for ExtractionOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExtractionOrigin::Ml => write!(f, "ml"),
            ExtractionOrigin::Rule => write!(f, "rule"),
        }
    }
}

/// One extracted product mention
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedProduct {
    pub product_name: String,
    #[serde(default)]
    pub product_version: Option<String>,
    #[serde(default)]
    pub product_type: Option<String>,
    #[serde(default)]
    pub original_text: Option<String>,
    #[serde(default)]
    pub confidence: f64,
}

/// IOC buckets: ip addresses, domains and file hashes
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IocBuckets {
    #[serde(default)]
    pub ips: Vec<String>,
    #[serde(default)]
    pub domains: Vec<String>,
    #[serde(default)]
    pub hashes: Vec<String>,
}

impl IocBuckets {
    pub fn is_empty(&self) -> bool {
        self.ips.is_empty() && self.domains.is_empty() && self.hashes.is_empty()
    }
}

/// The uniform extraction result consumed by the collection pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedThreatInfo {
    pub cves: Vec<String>,
    pub products: Vec<ExtractedProduct>,
    pub ttps: Vec<String>,
    pub iocs: IocBuckets,
    pub confidence: f64,
    pub origin: ExtractionOrigin,
}

impl ExtractedThreatInfo {
    pub fn is_empty(&self) -> bool {
        self.cves.is_empty()
            && self.products.is_empty()
            && self.ttps.is_empty()
            && self.iocs.is_empty()
    }
}
