// src/models/mod.rs

//! Domain models for the intake service.

mod log_event;
mod report;

pub use log_event::{LogDraft, LogEvent};
pub use report::{BugReport, ReportDraft};

use std::fmt;

use serde::{Deserialize, Serialize};

/// The two record kinds held by the store, each in its own
/// date-partitioned subdirectory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    BugReport,
    LogEvent,
}

impl RecordKind {
    /// Subdirectory name under the storage root.
    pub fn dir_name(&self) -> &'static str {
        match self {
            RecordKind::BugReport => "reports",
            RecordKind::LogEvent => "logs",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordKind::BugReport => write!(f, "bugreport"),
            RecordKind::LogEvent => write!(f, "logevent"),
        }
    }
}
