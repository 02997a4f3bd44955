// =====================================================================================
// File: core-assessment/src/product_match.rs
// Description: Product name normalisation and similarity
// =====================================================================================

use once_cell::sync::Lazy;
use regex::Regex;

/// Synonym table applied after version stripping. Keys and values are in
/// normalised (lower-case) form; a whole-string hit rewrites the name.
const PRODUCT_SYNONYMS: &[(&str, &str)] = &[
    ("ms sql", "microsoft sql server"),
    ("mssql", "microsoft sql server"),
    ("mssql server", "microsoft sql server"),
    ("sql server", "microsoft sql server"),
    ("win server", "windows server"),
    ("win", "windows"),
    ("esxi", "vmware esxi"),
    ("iis", "internet information services"),
    ("apache httpd", "apache http server"),
    ("tomcat", "apache tomcat"),
    ("postgres", "postgresql"),
    ("oracle db", "oracle database"),
];

static TRAILING_YEAR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+\d{4}$").expect("valid year pattern"));
static TRAILING_VERSION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+v?\d+\.\d+.*$").expect("valid version pattern"));
static NON_ALPHANUMERIC: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^\w\s]").expect("valid strip pattern"));
static WHITESPACE_RUN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+").expect("valid whitespace pattern"));

/// Normalise a product name for matching: lower-case, strip a trailing year
/// or version, rewrite known synonyms, drop punctuation, collapse spaces.
pub fn normalize_product_name(name: &str) -> String {
    if name.trim().is_empty() {
        return String::new();
    }

    let mut normalized = name.to_lowercase().trim().to_string();
    normalized = TRAILING_YEAR.replace(&normalized, "").to_string();
    normalized = TRAILING_VERSION.replace(&normalized, "").to_string();

    for (variant, standard) in PRODUCT_SYNONYMS {
        if normalized == *variant {
            normalized = standard.to_string();
            break;
        }
    }

    normalized = NON_ALPHANUMERIC.replace_all(&normalized, "").to_string();
    WHITESPACE_RUN
        .replace_all(&normalized, " ")
        .trim()
        .to_string()
}

/// Longest-common-subsequence ratio in [0, 1]: `2·lcs / (|a| + |b|)` over
/// characters. Chosen over edit distance to keep ranking reproducible.
pub fn lcs_ratio(a: &str, b: &str) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();

    let mut previous = vec![0usize; b_chars.len() + 1];
    let mut current = vec![0usize; b_chars.len() + 1];

    for &ca in &a_chars {
        for (j, &cb) in b_chars.iter().enumerate() {
            current[j + 1] = if ca == cb {
                previous[j] + 1
            } else {
                previous[j + 1].max(current[j])
            };
        }
        std::mem::swap(&mut previous, &mut current);
        current.fill(0);
    }

    let lcs = previous[b_chars.len()];
    (2.0 * lcs as f64) / ((a_chars.len() + b_chars.len()) as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_strips_year_and_version() {
        assert_eq!(normalize_product_name("Windows Server 2019"), "windows server");
        assert_eq!(normalize_product_name("VMware ESXi 7.0"), "vmware esxi");
        assert_eq!(normalize_product_name("nginx v1.25.3"), "nginx");
    }

    #[test]
    fn test_normalize_synonyms() {
        // Both spellings land on the same canonical name.
        assert_eq!(
            normalize_product_name("SQL Server 2019"),
            "microsoft sql server"
        );
        assert_eq!(
            normalize_product_name("Microsoft SQL Server"),
            "microsoft sql server"
        );
        assert_eq!(normalize_product_name("Postgres"), "postgresql");
        assert_eq!(
            normalize_product_name("IIS 10"),
            "internet information services"
        );
        assert_eq!(normalize_product_name("ESXi"), "vmware esxi");
    }

    #[test]
    fn test_normalize_strips_punctuation() {
        assert_eq!(normalize_product_name("Node.js"), "nodejs");
        assert_eq!(normalize_product_name("Red-Hat   Enterprise"), "redhat enterprise");
    }

    #[test]
    fn test_lcs_ratio_bounds() {
        assert_eq!(lcs_ratio("abc", "abc"), 1.0);
        assert_eq!(lcs_ratio("", ""), 1.0);
        assert_eq!(lcs_ratio("abc", ""), 0.0);
        assert_eq!(lcs_ratio("abc", "xyz"), 0.0);
    }

    #[test]
    fn test_lcs_ratio_partial() {
        // lcs("windows server", "windows") = 7
        let ratio = lcs_ratio("windows server", "windows");
        assert!((ratio - (2.0 * 7.0 / 21.0)).abs() < 1e-9);
    }

    #[test]
    fn test_lcs_ratio_symmetric() {
        let a = "apache tomcat";
        let b = "apache http server";
        assert!((lcs_ratio(a, b) - lcs_ratio(b, a)).abs() < 1e-12);
    }

    #[test]
    fn test_similar_names_score_high() {
        let a = normalize_product_name("VMware ESXi Server");
        let b = normalize_product_name("VMware ESXi");
        assert!(lcs_ratio(&a, &b) >= 0.8);
    }
}
