// =====================================================================================
// File: core-extraction/src/product.rs
// Description: Product name and version extraction rules
// =====================================================================================

use crate::ExtractedProduct;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

/// Well-known vendor/product spellings the rule engine recognises.
const PRODUCT_KEYWORDS: &[&str] = &[
    "Windows Server",
    "VMware",
    "SQL Server",
    "Apache",
    "MySQL",
    "Delphi",
    "EEP",
    "Ruby On Rails",
    "Windows",
    "Linux",
    "Ubuntu",
    "CentOS",
    "Red Hat",
    "Oracle",
    "PostgreSQL",
    "MongoDB",
    "Redis",
    "Nginx",
    "IIS",
    "Tomcat",
    "Java",
    "Python",
    "Node.js",
    "PHP",
    "Ruby",
    "Docker",
    "Kubernetes",
    "ESXi",
    "vSphere",
    "Hyper-V",
];

/// Confidence assigned to keyword hits.
pub const KEYWORD_MATCH_CONFIDENCE: f64 = 0.8;
/// Confidence assigned to ML-only hits.
pub const ML_MATCH_CONFIDENCE: f64 = 0.7;

struct KeywordPatterns {
    keyword: &'static str,
    /// Version pattern cascade; the first capture wins.
    cascade: Vec<Regex>,
}

static KEYWORD_TABLE: Lazy<Vec<KeywordPatterns>> = Lazy::new(|| {
    PRODUCT_KEYWORDS
        .iter()
        .map(|keyword| {
            let kw = regex::escape(keyword);
            let raw_patterns = [
                format!(r"(?i){}\s+v?(\d+\.\d+(?:\.\d+){{0,2}})", kw),
                format!(r"(?i){}\s+v?(\d+\.\d+)", kw),
                format!(r"(?i){}\s+v?(\d+)", kw),
                format!(r"(?i){}\s+(\d{{4}})", kw),
                format!(r"(?i){}[^\w]*(\d+\.\d+(?:\.\d+)?)", kw),
            ];
            KeywordPatterns {
                keyword,
                cascade: raw_patterns
                    .iter()
                    .map(|p| Regex::new(p).expect("valid version pattern"))
                    .collect(),
            }
        })
        .collect()
});

static VERSION_FORMAT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d+\.\d+(?:\.\d+)?(?:\.\d+)?|\d{4}|\d+)$").expect("valid version format")
});

/// Rule-based product mention extractor.
#[derive(Debug, Default, Clone)]
pub struct ProductExtractor;

impl ProductExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Extract keyword-matched products with their versions. De-duplicated
    /// by (name, version), first occurrence order preserved.
    pub fn extract(&self, text: &str) -> Vec<ExtractedProduct> {
        if text.is_empty() {
            return Vec::new();
        }

        let haystack = text.to_lowercase();
        let mut seen: HashSet<String> = HashSet::new();
        let mut products = Vec::new();

        for entry in KEYWORD_TABLE.iter() {
            if !haystack.contains(&entry.keyword.to_lowercase()) {
                continue;
            }

            let version = Self::extract_version(entry, text);
            let key = format!(
                "{}:{}",
                entry.keyword.to_lowercase(),
                version.as_deref().unwrap_or("")
            );
            if seen.insert(key) {
                products.push(ExtractedProduct {
                    product_name: entry.keyword.to_string(),
                    product_version: version,
                    product_type: None,
                    original_text: None,
                    confidence: KEYWORD_MATCH_CONFIDENCE,
                });
            }
        }

        products
    }

    fn extract_version(entry: &KeywordPatterns, text: &str) -> Option<String> {
        for pattern in &entry.cascade {
            if let Some(caps) = pattern.captures(text) {
                let version = caps[1].to_string();
                if VERSION_FORMAT.is_match(&version) {
                    return Some(version);
                }
            }
        }
        None
    }
}
