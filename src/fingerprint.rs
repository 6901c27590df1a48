// src/fingerprint.rs

//! Content fingerprinting for deduplication and log merging.
//!
//! A fingerprint is a SHA-256 digest over the fields that define
//! "sameness" for a record kind, case-normalized and trimmed, so a
//! re-submitted record hashes to the same value across restarts.

use sha2::{Digest, Sha256};

/// Compute a fingerprint over the given content-defining fields.
///
/// Each field is trimmed and lowercased, then the fields are joined
/// with `|` before hashing. Returns a lowercase hex digest.
pub fn fingerprint(parts: &[&str]) -> String {
    let normalized: Vec<String> = parts
        .iter()
        .map(|p| p.trim().to_lowercase())
        .collect();

    let mut hasher = Sha256::new();
    hasher.update(normalized.join("|").as_bytes());
    hex::encode(hasher.finalize())
}

/// Fingerprint of a bug report: title + description.
pub fn report_fingerprint(title: &str, description: &str) -> String {
    fingerprint(&[title, description])
}

/// Fingerprint of a log event: title + stack trace + type tag.
pub fn log_fingerprint(title: &str, trace: &str, kind_tag: &str) -> String {
    fingerprint(&[title, trace, kind_tag])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deterministic() {
        let a = report_fingerprint("Crash on save", "App crashes");
        let b = report_fingerprint("Crash on save", "App crashes");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_case_and_whitespace_normalized() {
        let a = report_fingerprint("  Crash On Save ", "APP CRASHES");
        let b = report_fingerprint("crash on save", "app crashes");
        assert_eq!(a, b);
    }

    #[test]
    fn test_field_boundaries_matter() {
        // "ab" + "c" must not collide with "a" + "bc"
        let a = fingerprint(&["ab", "c"]);
        let b = fingerprint(&["a", "bc"]);
        assert_ne!(a, b);
    }

    #[test]
    fn test_distinct_content_distinct_fingerprint() {
        let a = log_fingerprint("NPE", "at main()", "error");
        let b = log_fingerprint("NPE", "at main()", "warning");
        assert_ne!(a, b);
    }
}
