//! The record store: append, query, search and purge over
//! date-partitioned JSON files.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{NaiveDate, Utc};
use tokio::sync::Mutex as AsyncMutex;

use crate::aggregate::merge_by_fingerprint;
use crate::error::{AppError, Result};
use crate::models::{BugReport, LogDraft, LogEvent, RecordKind, ReportDraft};
use crate::store::{Page, partition};

/// Append-only, date-partitioned store for bug reports and log events.
///
/// Partition files are rewritten wholesale on every mutation, so each
/// (kind, date) partition has its own async mutex serializing
/// read-modify-write cycles. Reads that tolerate eventual consistency
/// (search, range queries) read whole files without taking the lock.
pub struct RecordStore {
    root: PathBuf,
    locks: Mutex<HashMap<(RecordKind, NaiveDate), Arc<AsyncMutex<()>>>>,
    last_id: AtomicU64,
}

impl RecordStore {
    /// Create a store rooted at the given directory.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            locks: Mutex::new(HashMap::new()),
            last_id: AtomicU64::new(0),
        }
    }

    /// Directory holding one kind's partitions.
    fn kind_dir(&self, kind: RecordKind) -> PathBuf {
        self.root.join(kind.dir_name())
    }

    /// Per-partition write lock, created lazily.
    fn partition_lock(&self, kind: RecordKind, date: NaiveDate) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().expect("partition lock map poisoned");
        locks.entry((kind, date)).or_default().clone()
    }

    /// Next record identifier: wall-clock milliseconds, bumped past the
    /// previously issued id so concurrent appends never collide.
    fn next_id(&self) -> u64 {
        let now = Utc::now().timestamp_millis() as u64;
        self.last_id
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |prev| {
                Some(now.max(prev + 1))
            })
            .map(|prev| now.max(prev + 1))
            .unwrap_or(now)
    }

    // ---------------------------------------------------------
    // Append
    // ---------------------------------------------------------

    /// Append a bug report to today's partition.
    ///
    /// Rejects with `Duplicate` when any record already stored today
    /// shares the draft's content fingerprint.
    pub async fn append_report(&self, draft: ReportDraft) -> Result<BugReport> {
        let today = Utc::now().date_naive();
        let dir = self.kind_dir(RecordKind::BugReport);
        let fingerprint = draft.fingerprint();

        let lock = self.partition_lock(RecordKind::BugReport, today);
        let _guard = lock.lock().await;

        let mut reports: Vec<BugReport> =
            partition::read(&dir, RecordKind::BugReport, today).await?;

        if reports.iter().any(|r| r.fingerprint == fingerprint) {
            return Err(AppError::Duplicate { fingerprint });
        }

        let report = BugReport {
            id: self.next_id(),
            origin: draft.origin,
            title: draft.title.trim().to_string(),
            description: draft.description.trim().to_string(),
            logs: draft.logs,
            photos: draft.photos,
            timestamp: Utc::now(),
            fingerprint,
        };

        reports.push(report.clone());
        partition::write(&dir, today, &reports).await?;

        log::debug!(
            "Stored bug report {} from {} ({} in partition)",
            report.id,
            report.origin,
            reports.len()
        );
        Ok(report)
    }

    /// True when today's report partition already holds this fingerprint.
    ///
    /// Used by the intake layer to reject duplicates before attachment
    /// processing; `append_report` re-checks under the partition lock.
    pub async fn has_report_fingerprint(&self, fingerprint: &str) -> Result<bool> {
        let today = Utc::now().date_naive();
        let reports = self.query_reports_by_date(today).await?;
        Ok(reports.iter().any(|r| r.fingerprint == fingerprint))
    }

    /// Append a log event to today's partition, or merge it into an
    /// existing event with the same fingerprint.
    ///
    /// Returns the stored event and `true` when a new record was
    /// created (`false` when merged).
    pub async fn append_log(&self, origin: &str, draft: &LogDraft) -> Result<(LogEvent, bool)> {
        let today = Utc::now().date_naive();
        let dir = self.kind_dir(RecordKind::LogEvent);
        let fingerprint = draft.fingerprint();
        let now = Utc::now();

        let lock = self.partition_lock(RecordKind::LogEvent, today);
        let _guard = lock.lock().await;

        let mut events: Vec<LogEvent> =
            partition::read(&dir, RecordKind::LogEvent, today).await?;

        let (event, created) = match events.iter_mut().find(|e| e.fingerprint == fingerprint) {
            Some(existing) => {
                existing.record_occurrence(origin, now);
                (existing.clone(), false)
            }
            None => {
                let event = LogEvent::from_draft(draft, origin, now);
                events.push(event.clone());
                (event, true)
            }
        };

        partition::write(&dir, today, &events).await?;
        Ok((event, created))
    }

    // ---------------------------------------------------------
    // Query
    // ---------------------------------------------------------

    /// All bug reports stored on one day; empty for a missing day.
    pub async fn query_reports_by_date(&self, date: NaiveDate) -> Result<Vec<BugReport>> {
        partition::read(&self.kind_dir(RecordKind::BugReport), RecordKind::BugReport, date).await
    }

    /// All log events stored on one day; empty for a missing day.
    pub async fn query_logs_by_date(&self, date: NaiveDate) -> Result<Vec<LogEvent>> {
        partition::read(&self.kind_dir(RecordKind::LogEvent), RecordKind::LogEvent, date).await
    }

    /// Bug reports across an inclusive date range: a plain union of
    /// the partitions in range.
    pub async fn query_reports_by_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<BugReport>> {
        let dir = self.kind_dir(RecordKind::BugReport);
        let mut all = Vec::new();

        for date in partition::list_dates(&dir).await? {
            if date < start || date > end {
                continue;
            }
            let mut reports: Vec<BugReport> =
                partition::read(&dir, RecordKind::BugReport, date).await?;
            all.append(&mut reports);
        }

        Ok(all)
    }

    /// Log events across an inclusive date range, merged by
    /// fingerprint: counts summed, origin sets unioned, latest
    /// timestamp kept.
    pub async fn query_logs_by_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<LogEvent>> {
        let dir = self.kind_dir(RecordKind::LogEvent);
        let mut all = Vec::new();

        for date in partition::list_dates(&dir).await? {
            if date < start || date > end {
                continue;
            }
            let mut events: Vec<LogEvent> =
                partition::read(&dir, RecordKind::LogEvent, date).await?;
            all.append(&mut events);
        }

        Ok(merge_by_fingerprint(all))
    }

    /// One page of bug reports, partitions scanned newest date first
    /// and records within a partition ordered newest first.
    ///
    /// `page` is 1-based. Scanning keeps a running offset and stops
    /// collecting once the slice is full, but continues counting so
    /// `total` and `total_pages` cover the whole store.
    pub async fn query_reports_page(
        &self,
        page: usize,
        page_size: usize,
    ) -> Result<Page<BugReport>> {
        if page_size == 0 {
            return Err(AppError::validation("page size must be > 0"));
        }
        let page = page.max(1);
        let dir = self.kind_dir(RecordKind::BugReport);

        let mut dates = partition::list_dates(&dir).await?;
        dates.reverse();

        let start = (page - 1) * page_size;
        let end = start + page_size;

        let mut records = Vec::new();
        let mut offset = 0usize;
        let mut total = 0usize;

        for date in dates {
            let mut reports: Vec<BugReport> =
                partition::read(&dir, RecordKind::BugReport, date).await?;
            total += reports.len();

            if offset < end && records.len() < page_size {
                reports.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
                for report in reports {
                    if offset >= start && offset < end {
                        records.push(report);
                    }
                    offset += 1;
                }
            } else {
                offset += reports.len();
            }
        }

        Ok(Page {
            records,
            page,
            total_pages: total.div_ceil(page_size),
            total,
        })
    }

    /// Case-insensitive substring search over report titles and
    /// descriptions across all partitions. Results are unsorted.
    pub async fn search_reports(&self, needle: &str) -> Result<Vec<BugReport>> {
        let dir = self.kind_dir(RecordKind::BugReport);
        let needle = needle.to_lowercase();
        let mut results = Vec::new();

        for date in partition::list_dates(&dir).await? {
            let reports: Vec<BugReport> =
                partition::read(&dir, RecordKind::BugReport, date).await?;
            results.extend(reports.into_iter().filter(|r| r.matches(&needle)));
        }

        Ok(results)
    }

    /// Case-insensitive substring search over log titles and traces
    /// across all partitions, optionally restricted to one type tag.
    pub async fn search_logs(
        &self,
        needle: &str,
        kind_tag: Option<&str>,
    ) -> Result<Vec<LogEvent>> {
        let dir = self.kind_dir(RecordKind::LogEvent);
        let needle = needle.to_lowercase();
        let mut results = Vec::new();

        for date in partition::list_dates(&dir).await? {
            let events: Vec<LogEvent> =
                partition::read(&dir, RecordKind::LogEvent, date).await?;
            results.extend(events.into_iter().filter(|e| {
                e.matches(&needle) && kind_tag.is_none_or(|tag| e.kind_tag == tag)
            }));
        }

        Ok(results)
    }

    // ---------------------------------------------------------
    // Purge / repair
    // ---------------------------------------------------------

    /// Remove every bug report submitted by `origin`, across all
    /// partitions. Returns the number of reports removed.
    pub async fn purge_reports_by_origin(&self, origin: &str) -> Result<u64> {
        let dir = self.kind_dir(RecordKind::BugReport);
        let mut removed = 0u64;

        for date in partition::list_dates(&dir).await? {
            let lock = self.partition_lock(RecordKind::BugReport, date);
            let _guard = lock.lock().await;

            let reports: Vec<BugReport> =
                partition::read(&dir, RecordKind::BugReport, date).await?;
            let before = reports.len();
            let kept: Vec<BugReport> =
                reports.into_iter().filter(|r| r.origin != origin).collect();

            if kept.len() != before {
                removed += (before - kept.len()) as u64;
                partition::write(&dir, date, &kept).await?;
            }
        }

        Ok(removed)
    }

    /// Remove every log event that `origin` contributed to, across all
    /// partitions. Returns the number of events removed.
    pub async fn purge_logs_by_origin(&self, origin: &str) -> Result<u64> {
        let dir = self.kind_dir(RecordKind::LogEvent);
        let mut removed = 0u64;

        for date in partition::list_dates(&dir).await? {
            let lock = self.partition_lock(RecordKind::LogEvent, date);
            let _guard = lock.lock().await;

            let events: Vec<LogEvent> =
                partition::read(&dir, RecordKind::LogEvent, date).await?;
            let before = events.len();
            // Older records may predate the origin set; fall back to
            // the first-reporter field for those.
            let kept: Vec<LogEvent> = events
                .into_iter()
                .filter(|e| !e.origins.contains(origin) && e.origin != origin)
                .collect();

            if kept.len() != before {
                removed += (before - kept.len()) as u64;
                partition::write(&dir, date, &kept).await?;
            }
        }

        Ok(removed)
    }

    /// Drop photo references to files the janitor has deleted, so no
    /// stored report points at a file that no longer exists. Returns
    /// the number of references pruned.
    pub async fn prune_attachment_refs(&self, deleted: &[PathBuf]) -> Result<u64> {
        if deleted.is_empty() {
            return Ok(0);
        }
        let gone: HashSet<&Path> = deleted.iter().map(PathBuf::as_path).collect();
        let dir = self.kind_dir(RecordKind::BugReport);
        let mut pruned = 0u64;

        for date in partition::list_dates(&dir).await? {
            let lock = self.partition_lock(RecordKind::BugReport, date);
            let _guard = lock.lock().await;

            let mut reports: Vec<BugReport> =
                partition::read(&dir, RecordKind::BugReport, date).await?;
            let mut changed = false;

            for report in &mut reports {
                let before = report.photos.len();
                report.photos.retain(|p| !gone.contains(p.as_path()));
                if report.photos.len() != before {
                    pruned += (before - report.photos.len()) as u64;
                    changed = true;
                }
            }

            if changed {
                partition::write(&dir, date, &reports).await?;
            }
        }

        Ok(pruned)
    }
}
