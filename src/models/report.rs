//! Bug report data structure.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A stored bug report.
///
/// Append-only: once written the only mutation is pruning of photo
/// references after quota eviction removes the underlying file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BugReport {
    /// Unique, monotonically increasing identifier
    pub id: u64,

    /// Client network identity that submitted the report
    #[serde(rename = "userIP")]
    pub origin: String,

    /// Report title (trimmed, non-empty)
    pub title: String,

    /// Report description (trimmed, non-empty)
    pub description: String,

    /// Optional free-text log bundle attached by the client
    #[serde(default)]
    pub logs: Option<String>,

    /// Stored photo references, in upload order
    #[serde(default)]
    pub photos: Vec<PathBuf>,

    /// Submission time
    pub timestamp: DateTime<Utc>,

    /// Content fingerprint over title + description
    #[serde(rename = "reportHash")]
    pub fingerprint: String,
}

impl BugReport {
    /// Case-insensitive substring match over the report's text fields.
    pub fn matches(&self, needle_lower: &str) -> bool {
        self.title.to_lowercase().contains(needle_lower)
            || self.description.to_lowercase().contains(needle_lower)
    }
}

/// A validated submission before the store assigns id and timestamp.
#[derive(Debug, Clone)]
pub struct ReportDraft {
    pub origin: String,
    pub title: String,
    pub description: String,
    pub logs: Option<String>,
    pub photos: Vec<PathBuf>,
}

impl ReportDraft {
    /// Fingerprint over the draft's content-defining fields.
    pub fn fingerprint(&self) -> String {
        crate::fingerprint::report_fingerprint(&self.title, &self.description)
    }
}
