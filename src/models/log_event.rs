//! Error log event data structures.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::fingerprint::log_fingerprint;

/// An incoming log event before it is stored or merged.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogDraft {
    /// Event title
    pub title: String,

    /// Stack trace
    pub trace: String,

    /// Category tag (e.g. "error", "warning")
    #[serde(rename = "type")]
    pub kind_tag: String,
}

impl LogDraft {
    /// A draft is storable only when all three identity fields are
    /// non-empty after trimming.
    pub fn is_valid(&self) -> bool {
        !self.title.trim().is_empty()
            && !self.trace.trim().is_empty()
            && !self.kind_tag.trim().is_empty()
    }

    /// Fingerprint over the draft's identity fields.
    pub fn fingerprint(&self) -> String {
        log_fingerprint(&self.title, &self.trace, &self.kind_tag)
    }
}

/// A stored log event.
///
/// Repeat submissions with the same fingerprint merge into one event:
/// the count grows, the last-seen timestamp refreshes, and the
/// submitting origin joins the origin set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LogEvent {
    /// Event title
    pub title: String,

    /// Stack trace
    pub trace: String,

    /// Category tag
    #[serde(rename = "type")]
    pub kind_tag: String,

    /// Number of merged occurrences
    pub count: u64,

    /// Origin of the first submission
    #[serde(rename = "userIP")]
    pub origin: String,

    /// Every origin that has contributed an occurrence
    #[serde(default)]
    pub origins: BTreeSet<String>,

    /// Timestamp of the most recent occurrence
    #[serde(rename = "lastLogTimestamp")]
    pub last_seen: DateTime<Utc>,

    /// Content fingerprint over title + trace + type
    #[serde(rename = "hash")]
    pub fingerprint: String,
}

impl LogEvent {
    /// Build a fresh count-1 event from a draft.
    pub fn from_draft(draft: &LogDraft, origin: &str, now: DateTime<Utc>) -> Self {
        let fingerprint = draft.fingerprint();
        let mut origins = BTreeSet::new();
        origins.insert(origin.to_string());

        Self {
            title: draft.title.trim().to_string(),
            trace: draft.trace.trim().to_string(),
            kind_tag: draft.kind_tag.trim().to_string(),
            count: 1,
            origin: origin.to_string(),
            origins,
            last_seen: now,
            fingerprint,
        }
    }

    /// Fold another occurrence of the same fingerprint into this event.
    pub fn absorb(&mut self, other: &LogEvent) {
        debug_assert_eq!(self.fingerprint, other.fingerprint);
        self.count += other.count;
        self.origins.extend(other.origins.iter().cloned());
        if other.last_seen > self.last_seen {
            self.last_seen = other.last_seen;
        }
    }

    /// Record one more occurrence from `origin` at `now`.
    pub fn record_occurrence(&mut self, origin: &str, now: DateTime<Utc>) {
        self.count += 1;
        self.origins.insert(origin.to_string());
        if now > self.last_seen {
            self.last_seen = now;
        }
    }

    /// Case-insensitive substring match over title and trace.
    pub fn matches(&self, needle_lower: &str) -> bool {
        self.title.to_lowercase().contains(needle_lower)
            || self.trace.to_lowercase().contains(needle_lower)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(title: &str, trace: &str, tag: &str) -> LogDraft {
        LogDraft {
            title: title.to_string(),
            trace: trace.to_string(),
            kind_tag: tag.to_string(),
        }
    }

    #[test]
    fn test_draft_validity() {
        assert!(draft("NPE", "at main()", "error").is_valid());
        assert!(!draft("", "at main()", "error").is_valid());
        assert!(!draft("NPE", "  ", "error").is_valid());
    }

    #[test]
    fn test_absorb_sums_counts_and_unions_origins() {
        let now = Utc::now();
        let mut a = LogEvent::from_draft(&draft("NPE", "at main()", "error"), "1.1.1.1", now);
        let later = now + chrono::Duration::hours(1);
        let mut b = LogEvent::from_draft(&draft("NPE", "at main()", "error"), "2.2.2.2", later);
        b.count = 3;

        a.absorb(&b);
        assert_eq!(a.count, 4);
        assert_eq!(a.origins.len(), 2);
        assert_eq!(a.last_seen, later);
        assert_eq!(a.origin, "1.1.1.1");
    }

    #[test]
    fn test_record_occurrence() {
        let now = Utc::now();
        let mut e = LogEvent::from_draft(&draft("NPE", "at main()", "error"), "1.1.1.1", now);
        e.record_occurrence("3.3.3.3", now + chrono::Duration::minutes(5));
        assert_eq!(e.count, 2);
        assert!(e.origins.contains("3.3.3.3"));
        assert!(e.last_seen > now);
    }
}
