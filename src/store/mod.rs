//! Date-partitioned record persistence.
//!
//! The store exclusively owns the on-disk partition files: one JSON
//! array per calendar day per record kind, under per-kind
//! subdirectories of the storage root.
//!
//! ## Storage Layout
//!
//! ```text
//! {root}/
//! ├── reports/              # Bug report partitions
//! │   └── YYYY-MM-DD.json
//! └── logs/                 # Log event partitions
//!     └── YYYY-MM-DD.json
//! ```
//!
//! ## Dedup vs merge
//!
//! The two record kinds carry deliberately different collision
//! policies: a bug report whose fingerprint already exists in today's
//! partition is **rejected**; a log event whose fingerprint already
//! exists is **merged** into the existing event.

pub mod partition;

mod record_store;

pub use record_store::RecordStore;

/// One slice of a paged query, with enough totals for the caller to
/// render pagination controls.
#[derive(Debug, Clone)]
pub struct Page<T> {
    /// Records in this slice, newest first
    pub records: Vec<T>,
    /// 1-based page number that was requested
    pub page: usize,
    /// Total number of pages at this page size
    pub total_pages: usize,
    /// Total record count across all partitions
    pub total: usize,
}
