// src/intake.rs

//! The submission pipeline.
//!
//! An inbound submission passes through the rate limiter (reject if
//! exhausted), the duplicate check (reject before any attachment
//! work), attachment persistence, and finally the record store.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use futures::future::join_all;

use crate::error::{AppError, Result};
use crate::janitor::{StorageJanitor, sanitize_origin};
use crate::limiter::{RateAction, RateLimiter};
use crate::models::{BugReport, LogDraft, ReportDraft};
use crate::store::RecordStore;

/// Persists one uploaded image and returns a stable reference usable
/// for later deletion and size accounting.
#[async_trait]
pub trait ImageProcessor: Send + Sync {
    /// Transform and store one upload. `index` is the position within
    /// the submission, used to keep stored filenames unique.
    async fn store(&self, raw: &Path, index: usize, origin: &str) -> Result<PathBuf>;
}

/// Processor that moves uploads into the photos directory under the
/// origin-tagged naming scheme, without transcoding.
pub struct CopyProcessor {
    photos_dir: PathBuf,
}

impl CopyProcessor {
    pub fn new(photos_dir: impl Into<PathBuf>) -> Self {
        Self {
            photos_dir: photos_dir.into(),
        }
    }
}

#[async_trait]
impl ImageProcessor for CopyProcessor {
    async fn store(&self, raw: &Path, index: usize, origin: &str) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&self.photos_dir).await?;

        let millis = Utc::now().timestamp_millis();
        let dest = self
            .photos_dir
            .join(format!("{}-{}-{}.jpg", sanitize_origin(origin), millis, index));

        tokio::fs::copy(raw, &dest).await?;
        if let Err(e) = tokio::fs::remove_file(raw).await {
            log::warn!("Could not remove upload temp file {:?}: {}", raw, e);
        }
        Ok(dest)
    }
}

/// Outcome of a log batch submission.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogBatchOutcome {
    /// Entries stored as new events
    pub stored: usize,
    /// Entries merged into existing events
    pub merged: usize,
    /// Entries dropped for missing title/trace/type
    pub skipped: usize,
}

impl LogBatchOutcome {
    /// A batch counts as accepted when at least one entry landed.
    pub fn accepted(&self) -> bool {
        self.stored + self.merged > 0
    }
}

/// Outcome of an origin-scoped purge across all storage.
#[derive(Debug, Default, Clone, Copy)]
pub struct PurgeOutcome {
    pub reports_removed: u64,
    pub logs_removed: u64,
    pub photos_deleted: u64,
}

/// Wires the limiter, hasher, janitor, processor and store into the
/// submission control flow.
pub struct IntakeService {
    store: Arc<RecordStore>,
    limiter: Arc<RateLimiter>,
    janitor: StorageJanitor,
    processor: Box<dyn ImageProcessor>,
}

impl IntakeService {
    pub fn new(
        store: Arc<RecordStore>,
        limiter: Arc<RateLimiter>,
        janitor: StorageJanitor,
        processor: Box<dyn ImageProcessor>,
    ) -> Self {
        Self {
            store,
            limiter,
            janitor,
            processor,
        }
    }

    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    /// Submit a bug report.
    ///
    /// Rejection order matters: validation costs nothing and runs
    /// first; rate limiting and the duplicate check both run before
    /// any attachment is touched, so a rejected request leaves no
    /// stored bytes behind.
    pub async fn submit_report(
        &self,
        origin: &str,
        title: &str,
        description: &str,
        logs: Option<String>,
        uploads: &[PathBuf],
    ) -> Result<BugReport> {
        if title.trim().is_empty() || description.trim().is_empty() {
            return Err(AppError::validation("Title and description are required"));
        }

        if !self.limiter.allow(origin, RateAction::ReportBug) {
            return Err(AppError::RateLimited {
                origin: origin.to_string(),
                action: RateAction::ReportBug.to_string(),
            });
        }

        let fingerprint = crate::fingerprint::report_fingerprint(title, description);
        if self.store.has_report_fingerprint(&fingerprint).await? {
            return Err(AppError::Duplicate { fingerprint });
        }

        // Make room before storing new attachments
        self.enforce_quota().await?;

        let photos = self.process_uploads(origin, uploads).await;

        self.store
            .append_report(ReportDraft {
                origin: origin.to_string(),
                title: title.to_string(),
                description: description.to_string(),
                logs,
                photos,
            })
            .await
    }

    /// Run every upload through the processor concurrently. A
    /// processing failure is non-fatal: the submission keeps the raw
    /// path rather than losing the attachment.
    async fn process_uploads(&self, origin: &str, uploads: &[PathBuf]) -> Vec<PathBuf> {
        let futures = uploads
            .iter()
            .enumerate()
            .map(|(index, raw)| self.processor.store(raw, index, origin));

        join_all(futures)
            .await
            .into_iter()
            .zip(uploads)
            .map(|(result, raw)| match result {
                Ok(stored) => stored,
                Err(e) => {
                    log::warn!("Image processing failed for {:?}: {}", raw, e);
                    raw.clone()
                }
            })
            .collect()
    }

    /// Run one quota enforcement pass and repair record references to
    /// anything it evicted. Returns (files evicted, references pruned).
    pub async fn enforce_quota(&self) -> Result<(usize, u64)> {
        let evicted = self.janitor.enforce_quota().await?;
        if evicted.is_empty() {
            return Ok((0, 0));
        }

        let pruned = self.store.prune_attachment_refs(&evicted).await?;
        log::info!(
            "Evicted {} photos, pruned {} stale references",
            evicted.len(),
            pruned
        );
        Ok((evicted.len(), pruned))
    }

    /// Submit a batch of log events. One rate limit unit is consumed
    /// per batch; invalid entries are skipped, not fatal.
    pub async fn submit_logs(
        &self,
        origin: &str,
        entries: &[LogDraft],
    ) -> Result<LogBatchOutcome> {
        if !self.limiter.allow(origin, RateAction::ReportLogs) {
            return Err(AppError::RateLimited {
                origin: origin.to_string(),
                action: RateAction::ReportLogs.to_string(),
            });
        }

        let mut outcome = LogBatchOutcome::default();
        for entry in entries {
            if !entry.is_valid() {
                outcome.skipped += 1;
                continue;
            }
            let (_, created) = self.store.append_log(origin, entry).await?;
            if created {
                outcome.stored += 1;
            } else {
                outcome.merged += 1;
            }
        }

        log::debug!(
            "Log batch from {}: {} stored, {} merged, {} skipped",
            origin,
            outcome.stored,
            outcome.merged,
            outcome.skipped
        );
        Ok(outcome)
    }

    /// Remove everything an origin has ever submitted: reports, log
    /// events and attachment files.
    pub async fn purge_origin(&self, origin: &str) -> Result<PurgeOutcome> {
        let reports_removed = self.store.purge_reports_by_origin(origin).await?;
        let logs_removed = self.store.purge_logs_by_origin(origin).await?;
        let photos_deleted = self.janitor.purge_by_origin(origin).await?;

        Ok(PurgeOutcome {
            reports_removed,
            logs_removed,
            photos_deleted,
        })
    }

    /// Flush mutable state before the process exits.
    pub async fn shutdown(&self) -> Result<()> {
        self.limiter.flush().await
    }
}
