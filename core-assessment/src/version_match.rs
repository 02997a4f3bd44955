// =====================================================================================
// File: core-assessment/src/version_match.rs
// Description: Version reconciliation between threat and asset products
// =====================================================================================

use once_cell::sync::Lazy;
use regex::Regex;
use std::cmp::Ordering;

/// How the two version strings reconciled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionMatchKind {
    Exact,
    Range,
    Major,
    NoVersion,
}

static VERSION_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^v(ersion)?\s*").expect("valid prefix pattern"));
static COMPARATOR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(>=|<=|>|<)\s*(\d+(?:\.\d+)*)").expect("valid comparator pattern"));
static YEAR_FORM: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d{4})").expect("valid year pattern"));

/// Reconcile a threat's affected-version expression against an asset's
/// installed version.
///
/// - both absent: `NoVersion`
/// - threat absent: `NoVersion` (the advisory affects all versions)
/// - asset absent: no match
/// - identical normalised strings: `Exact`
/// - `X.Y.x` pattern with a matching asset prefix: `Range`
/// - comparator expressions (`>= 7.0` and friends) that hold: `Range`
/// - equal major components: `Major`
pub fn match_versions(
    threat_version: Option<&str>,
    asset_version: Option<&str>,
) -> Option<VersionMatchKind> {
    let threat_version = threat_version.map(str::trim).filter(|v| !v.is_empty());
    let asset_version = asset_version.map(str::trim).filter(|v| !v.is_empty());

    match (threat_version, asset_version) {
        (None, _) => Some(VersionMatchKind::NoVersion),
        (Some(_), None) => None,
        (Some(threat), Some(asset)) => {
            let threat_clean = normalize_version(threat);
            let asset_clean = normalize_version(asset);

            if threat_clean == asset_clean {
                return Some(VersionMatchKind::Exact);
            }

            // "7.0.x" covers every 7.0 patch level.
            if let Some(base) = threat_clean.strip_suffix(".x") {
                if asset_clean.starts_with(base) {
                    return Some(VersionMatchKind::Range);
                }
            }

            if let Some(caps) = COMPARATOR.captures(&threat_clean) {
                let operator = &caps[1];
                let target = parse_version(&caps[2])?;
                let asset_parsed = parse_version(&asset_clean)?;
                let ordering = compare_versions(&asset_parsed, &target);
                let holds = match operator {
                    ">=" => ordering != Ordering::Less,
                    "<=" => ordering != Ordering::Greater,
                    ">" => ordering == Ordering::Greater,
                    "<" => ordering == Ordering::Less,
                    _ => false,
                };
                if holds {
                    return Some(VersionMatchKind::Range);
                }
                return None;
            }

            let threat_parsed = parse_version(&threat_clean)?;
            let asset_parsed = parse_version(&asset_clean)?;
            if threat_parsed.first() == asset_parsed.first() {
                return Some(VersionMatchKind::Major);
            }

            None
        }
    }
}

/// Strip `v` / `version` prefixes.
pub fn normalize_version(version: &str) -> String {
    VERSION_PREFIX.replace(version.trim(), "").to_string()
}

/// Parse a version string into numeric components. Non-numeric suffixes on a
/// component are dropped (`7.0.1-beta` parses as 7.0.1); a bare year form
/// parses as a single component.
pub fn parse_version(version: &str) -> Option<Vec<u64>> {
    let normalized = normalize_version(version);
    let mut parts = Vec::new();

    for part in normalized.split('.') {
        let digits: String = part.chars().filter(|c| c.is_ascii_digit()).collect();
        if digits.is_empty() {
            break;
        }
        match digits.parse() {
            Ok(value) => parts.push(value),
            Err(_) => break,
        }
    }

    if parts.is_empty() {
        let year = YEAR_FORM.captures(&normalized)?;
        return year[1].parse().ok().map(|y| vec![y]);
    }

    Some(parts)
}

/// Component-wise comparison, missing components compare as zero.
pub fn compare_versions(a: &[u64], b: &[u64]) -> Ordering {
    let len = a.len().max(b.len());
    for i in 0..len {
        let left = a.get(i).copied().unwrap_or(0);
        let right = b.get(i).copied().unwrap_or(0);
        match left.cmp(&right) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    Ordering::Equal
}
