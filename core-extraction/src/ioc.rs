// =====================================================================================
// File: core-extraction/src/ioc.rs
// Description: IOC extraction rules (ip addresses, domains, file hashes)
// =====================================================================================

use crate::IocBuckets;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;
use std::net::{Ipv4Addr, Ipv6Addr};

static IPV4_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:(?:25[0-5]|2[0-4][0-9]|[01]?[0-9][0-9]?)\.){3}(?:25[0-5]|2[0-4][0-9]|[01]?[0-9][0-9]?)\b")
        .expect("valid IPv4 pattern")
});

// Full eight-group form only; compressed notation is out of scope.
static IPV6_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:[0-9a-fA-F]{1,4}:){7}[0-9a-fA-F]{1,4}\b").expect("valid IPv6 pattern")
});

static DOMAIN_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?\.)+[a-zA-Z]{2,}\b")
        .expect("valid domain pattern")
});

// MD5 / SHA-1 / SHA-256 lengths; exact lengths re-checked after match.
static HASH_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b[a-fA-F0-9]{32,64}\b").expect("valid hash pattern"));

const EXCLUDED_DOMAINS: &[&str] = &["example.com", "localhost"];

const EXCLUDED_HASHES: &[&str] = &[
    "00000000000000000000000000000000",
    "ffffffffffffffffffffffffffffffff",
];

/// Rule-based IOC extractor.
#[derive(Debug, Default, Clone)]
pub struct IocExtractor;

impl IocExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Extract every IOC bucket from the text.
    pub fn extract(&self, text: &str) -> IocBuckets {
        IocBuckets {
            ips: self.extract_ips(text),
            domains: self.extract_domains(text),
            hashes: self.extract_hashes(text),
        }
    }

    fn extract_ips(&self, text: &str) -> Vec<String> {
        let mut ips: BTreeSet<String> = BTreeSet::new();

        for m in IPV4_PATTERN.find_iter(text) {
            if let Ok(addr) = m.as_str().parse::<Ipv4Addr>() {
                if addr.is_loopback() || addr == Ipv4Addr::UNSPECIFIED {
                    continue;
                }
                ips.insert(m.as_str().to_string());
            }
        }

        for m in IPV6_PATTERN.find_iter(text) {
            if m.as_str().parse::<Ipv6Addr>().is_ok() {
                ips.insert(m.as_str().to_lowercase());
            }
        }

        ips.into_iter().collect()
    }

    fn extract_domains(&self, text: &str) -> Vec<String> {
        let mut domains: BTreeSet<String> = BTreeSet::new();

        for m in DOMAIN_PATTERN.find_iter(text) {
            // Drop the host part of email addresses.
            if m.start() > 0 && text.as_bytes()[m.start() - 1] == b'@' {
                continue;
            }

            let candidate = m.as_str().to_lowercase();
            if candidate.len() < 4 || candidate.contains('@') {
                continue;
            }
            if Self::is_excluded_domain(&candidate) {
                continue;
            }
            domains.insert(candidate);
        }

        domains.into_iter().collect()
    }

    fn extract_hashes(&self, text: &str) -> Vec<String> {
        let mut hashes: BTreeSet<String> = BTreeSet::new();

        for m in HASH_PATTERN.find_iter(text) {
            let len = m.as_str().len();
            if len != 32 && len != 40 && len != 64 {
                continue;
            }
            let candidate = m.as_str().to_lowercase();
            if EXCLUDED_HASHES.contains(&candidate.as_str()) {
                continue;
            }
            hashes.insert(candidate);
        }

        hashes.into_iter().collect()
    }

    fn is_excluded_domain(domain: &str) -> bool {
        if EXCLUDED_DOMAINS.contains(&domain) {
            return true;
        }
        if domain.starts_with("localhost") || domain.starts_with("127.") {
            return true;
        }
        // Documentation-style placeholder hosts.
        domain.contains("test") && domain.contains("example")
    }
}
