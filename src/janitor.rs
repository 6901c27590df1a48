// src/janitor.rs

//! Photo storage quota enforcement and origin-scoped cleanup.
//!
//! The janitor exclusively owns the photos directory. When usage
//! exceeds the cap it evicts oldest-first by modification time down to
//! a target below the cap, and reports what it deleted so the record
//! store can prune dangling attachment references.

use std::path::PathBuf;
use std::time::SystemTime;

use crate::error::{AppError, Result};

/// Replace `:` with `-` so origins (IPv6 included) are safe in file
/// names. Attachment files are tagged `{origin}-{millis}-{index}.jpg`.
pub fn sanitize_origin(origin: &str) -> String {
    origin.replace(':', "-")
}

/// Byte-size quota enforcement over a flat attachment directory.
pub struct StorageJanitor {
    dir: PathBuf,
    max_bytes: u64,
    target_fraction: f64,
}

impl StorageJanitor {
    pub fn new(dir: impl Into<PathBuf>, max_bytes: u64, target_fraction: f64) -> Self {
        Self {
            dir: dir.into(),
            max_bytes,
            target_fraction,
        }
    }

    /// The directory this janitor owns.
    pub fn dir(&self) -> &PathBuf {
        &self.dir
    }

    /// Sum of file sizes in the directory, non-recursive. A missing
    /// directory counts as zero.
    pub async fn current_usage(&self) -> Result<u64> {
        let mut total = 0u64;
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(AppError::Io(e)),
        };

        while let Some(entry) = entries.next_entry().await? {
            let meta = entry.metadata().await?;
            if meta.is_file() {
                total += meta.len();
            }
        }
        Ok(total)
    }

    /// Evict oldest files until usage falls to the target threshold.
    ///
    /// No-op when under quota, so it is safe to call before every
    /// accepted submission. The target sits below the cap itself to
    /// avoid re-evicting on every subsequent write. Returns the paths
    /// actually deleted; callers must prune record references to them.
    pub async fn enforce_quota(&self) -> Result<Vec<PathBuf>> {
        let mut usage = self.current_usage().await?;
        if usage <= self.max_bytes {
            return Ok(Vec::new());
        }

        let target = (self.max_bytes as f64 * self.target_fraction) as u64;
        log::info!(
            "Photo storage over quota ({} > {} bytes), evicting down to {}",
            usage,
            self.max_bytes,
            target
        );

        // Oldest first by modification time
        let mut files: Vec<(PathBuf, u64, SystemTime)> = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            match entry.metadata().await {
                Ok(meta) if meta.is_file() => {
                    let modified = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
                    files.push((entry.path(), meta.len(), modified));
                }
                Ok(_) => {}
                Err(e) => {
                    log::warn!("Skipping unreadable file {:?}: {}", entry.path(), e);
                }
            }
        }
        files.sort_by_key(|(_, _, modified)| *modified);

        let mut deleted = Vec::new();
        for (path, size, _) in files {
            if usage <= target {
                break;
            }
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {
                    log::info!("Evicted {:?} ({} bytes)", path, size);
                    usage = usage.saturating_sub(size);
                    deleted.push(path);
                }
                Err(e) => {
                    log::warn!("Failed to evict {:?}: {}", path, e);
                }
            }
        }

        Ok(deleted)
    }

    /// Delete every attachment whose name is tagged with `origin`.
    /// Returns the number of files deleted.
    pub async fn purge_by_origin(&self, origin: &str) -> Result<u64> {
        let prefix = format!("{}-", sanitize_origin(origin));
        let mut deleted = 0u64;

        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(AppError::Io(e)),
        };

        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if !name.starts_with(&prefix) {
                continue;
            }
            match tokio::fs::remove_file(entry.path()).await {
                Ok(()) => deleted += 1,
                Err(e) => {
                    log::warn!("Failed to delete {:?}: {}", entry.path(), e);
                }
            }
        }

        log::info!("Deleted {} attachments for origin {}", deleted, origin);
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn write_file(dir: &std::path::Path, name: &str, len: usize) {
        tokio::fs::write(dir.join(name), vec![0u8; len]).await.unwrap();
        // Distinct mtimes so eviction order is deterministic
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }

    #[test]
    fn test_sanitize_origin() {
        assert_eq!(sanitize_origin("::ffff:10.0.0.1"), "--ffff-10.0.0.1");
        assert_eq!(sanitize_origin("10.0.0.1"), "10.0.0.1");
    }

    #[tokio::test]
    async fn test_current_usage() {
        let tmp = TempDir::new().unwrap();
        let janitor = StorageJanitor::new(tmp.path(), 1000, 0.9);

        assert_eq!(janitor.current_usage().await.unwrap(), 0);
        write_file(tmp.path(), "a.jpg", 300).await;
        write_file(tmp.path(), "b.jpg", 200).await;
        assert_eq!(janitor.current_usage().await.unwrap(), 500);
    }

    #[tokio::test]
    async fn test_missing_dir_usage_is_zero() {
        let janitor = StorageJanitor::new("/nonexistent/photos", 1000, 0.9);
        assert_eq!(janitor.current_usage().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_enforce_quota_noop_under_cap() {
        let tmp = TempDir::new().unwrap();
        let janitor = StorageJanitor::new(tmp.path(), 1000, 0.9);
        write_file(tmp.path(), "a.jpg", 100).await;

        let deleted = janitor.enforce_quota().await.unwrap();
        assert!(deleted.is_empty());
        assert_eq!(janitor.current_usage().await.unwrap(), 100);
    }

    #[tokio::test]
    async fn test_enforce_quota_evicts_oldest_first_to_target() {
        let tmp = TempDir::new().unwrap();
        // Cap 1000, target 500
        let janitor = StorageJanitor::new(tmp.path(), 1000, 0.5);

        write_file(tmp.path(), "oldest.jpg", 400).await;
        write_file(tmp.path(), "middle.jpg", 400).await;
        write_file(tmp.path(), "newest.jpg", 400).await;

        let deleted = janitor.enforce_quota().await.unwrap();

        // 1200 -> evict oldest (800) -> still above 500 -> evict middle (400)
        assert_eq!(deleted.len(), 2);
        assert!(deleted[0].ends_with("oldest.jpg"));
        assert!(deleted[1].ends_with("middle.jpg"));
        assert!(tmp.path().join("newest.jpg").exists());
        assert_eq!(janitor.current_usage().await.unwrap(), 400);
    }

    #[tokio::test]
    async fn test_purge_by_origin() {
        let tmp = TempDir::new().unwrap();
        let janitor = StorageJanitor::new(tmp.path(), 1000, 0.9);

        write_file(tmp.path(), "1.1.1.1-100-0.jpg", 10).await;
        write_file(tmp.path(), "1.1.1.1-100-1.jpg", 10).await;
        write_file(tmp.path(), "2.2.2.2-200-0.jpg", 10).await;

        let deleted = janitor.purge_by_origin("1.1.1.1").await.unwrap();
        assert_eq!(deleted, 2);
        assert!(tmp.path().join("2.2.2.2-200-0.jpg").exists());
    }

    #[tokio::test]
    async fn test_purge_by_ipv6_origin() {
        let tmp = TempDir::new().unwrap();
        let janitor = StorageJanitor::new(tmp.path(), 1000, 0.9);

        write_file(tmp.path(), "--1-300-0.jpg", 10).await;
        let deleted = janitor.purge_by_origin("::1").await.unwrap();
        assert_eq!(deleted, 1);
    }
}
