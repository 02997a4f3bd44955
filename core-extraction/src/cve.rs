// =====================================================================================
// File: core-extraction/src/cve.rs
// Description: CVE identifier extraction rules
// =====================================================================================

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;

// CVE-YYYY-NNNNN with tolerated separators; year range checked after match.
static CVE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)CVE[-\s]?(\d{4})[-\s]?(\d{4,7})").expect("valid CVE pattern"));

const MIN_YEAR: i32 = 1999;
const MAX_YEAR: i32 = 2099;

/// Rule-based CVE identifier extractor.
#[derive(Debug, Default, Clone)]
pub struct CveExtractor;

impl CveExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Extract the first valid CVE identifier, canonical upper-case form.
    pub fn extract(&self, text: &str) -> Option<String> {
        CVE_PATTERN
            .captures_iter(text)
            .find_map(|caps| Self::canonicalize(&caps[1], &caps[2]))
    }

    /// Extract every valid CVE identifier, de-duplicated and sorted ascending.
    pub fn extract_all(&self, text: &str) -> Vec<String> {
        let cves: BTreeSet<String> = CVE_PATTERN
            .captures_iter(text)
            .filter_map(|caps| Self::canonicalize(&caps[1], &caps[2]))
            .collect();
        cves.into_iter().collect()
    }

    /// Check whether a string is a canonical CVE identifier.
    pub fn is_valid(&self, cve: &str) -> bool {
        static CANONICAL: Lazy<Regex> =
            Lazy::new(|| Regex::new(r"^(?i)CVE-(\d{4})-(\d{4,7})$").expect("valid pattern"));
        CANONICAL
            .captures(cve)
            .and_then(|caps| caps[1].parse::<i32>().ok())
            .map(|year| (MIN_YEAR..=MAX_YEAR).contains(&year))
            .unwrap_or(false)
    }

    fn canonicalize(year: &str, number: &str) -> Option<String> {
        let parsed: i32 = year.parse().ok()?;
        if !(MIN_YEAR..=MAX_YEAR).contains(&parsed) {
            return None;
        }
        Some(format!("CVE-{}-{}", year, number))
    }
}
