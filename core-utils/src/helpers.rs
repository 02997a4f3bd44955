// =====================================================================================
// File: core-utils/src/helpers.rs
// Description: General-purpose helpers for the AETIM platform
// =====================================================================================

use sha2::{Digest, Sha256};

/// Compute a stable hex digest over a set of string parts.
///
/// Used as the upsert key for threats without a CVE identifier, where the
/// identity is derived from (feed, source URL, title). Parts are joined with
/// a separator that cannot occur inside any of them after trimming.
pub fn content_digest(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            hasher.update([0x1f]);
        }
        hasher.update(part.trim().to_lowercase().as_bytes());
    }
    hex::encode(hasher.finalize())
}

/// Truncate a string to at most `max_chars` characters, appending an ellipsis
/// when content was dropped.
pub fn truncate_chars(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    let truncated: String = value.chars().take(max_chars).collect();
    format!("{}...", truncated)
}

/// Mask a credential for log output, keeping the first and last two characters.
pub fn mask_credential(secret: &str) -> String {
    let len = secret.chars().count();
    if len <= 4 {
        return "****".to_string();
    }
    let head: String = secret.chars().take(2).collect();
    let tail: String = secret.chars().skip(len - 2).collect();
    format!("{}{}{}", head, "*".repeat(len - 4), tail)
}

/// De-duplicate a vector preserving first-seen order.
pub fn dedup_preserve_order<T: Eq + std::hash::Hash + Clone>(values: Vec<T>) -> Vec<T> {
    let mut seen = std::collections::HashSet::new();
    values
        .into_iter()
        .filter(|v| seen.insert(v.clone()))
        .collect()
}

/// Collapse runs of whitespace into single spaces and trim.
pub fn collapse_whitespace(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}
