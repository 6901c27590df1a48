//! Partition file naming and I/O.
//!
//! A partition is the single JSON-array file holding all records of one
//! kind for one calendar day, named `YYYY-MM-DD.json`. This module owns
//! the naming scheme and the read/write primitives; policy (dedup,
//! merge, paging) lives in the store itself.

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::{Serialize, de::DeserializeOwned};
use tokio::io::AsyncWriteExt;

use crate::error::{AppError, Result};
use crate::models::RecordKind;

/// Partition filename format.
const DATE_FORMAT: &str = "%Y-%m-%d";

/// File name for a partition date: `2024-01-01.json`.
pub fn file_name(date: NaiveDate) -> String {
    format!("{}.json", date.format(DATE_FORMAT))
}

/// Parse a partition date back out of a file name.
///
/// Returns `None` for files that do not follow the naming scheme
/// (editor leftovers, temp files); callers skip those.
pub fn parse_file_name(name: &str) -> Option<NaiveDate> {
    let stem = name.strip_suffix(".json")?;
    NaiveDate::parse_from_str(stem, DATE_FORMAT).ok()
}

/// Full path of a partition file.
pub fn path_for(dir: &Path, date: NaiveDate) -> PathBuf {
    dir.join(file_name(date))
}

/// List all partition dates present in a kind directory, sorted
/// ascending. A missing directory yields an empty list.
pub async fn list_dates(dir: &Path) -> Result<Vec<NaiveDate>> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(AppError::Io(e)),
    };

    let mut dates = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        match parse_file_name(name) {
            Some(date) => dates.push(date),
            None => {
                if !name.ends_with(".tmp") {
                    log::warn!("Skipping non-partition file in {:?}: {}", dir, name);
                }
            }
        }
    }

    dates.sort_unstable();
    Ok(dates)
}

/// Read one partition as a vector of records.
///
/// A missing file is an empty partition, never an error. A file that
/// exists but fails to parse surfaces `CorruptPartition` for that date
/// only.
pub async fn read<T: DeserializeOwned>(
    dir: &Path,
    kind: RecordKind,
    date: NaiveDate,
) -> Result<Vec<T>> {
    let path = path_for(dir, date);
    let bytes = match tokio::fs::read(&path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(AppError::Io(e)),
    };

    serde_json::from_slice(&bytes).map_err(|e| AppError::corrupt_partition(kind, date, e))
}

/// Write one partition atomically (write `.tmp`, then rename), so a
/// crash mid-write never leaves a half-written partition behind.
pub async fn write<T: Serialize>(dir: &Path, date: NaiveDate, records: &[T]) -> Result<()> {
    tokio::fs::create_dir_all(dir).await?;

    let path = path_for(dir, date);
    let tmp = path.with_extension("tmp");
    let bytes = serde_json::to_vec_pretty(records)?;

    let mut file = tokio::fs::File::create(&tmp).await?;
    file.write_all(&bytes).await?;
    file.flush().await?;
    drop(file);

    tokio::fs::rename(&tmp, &path).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_file_name_round_trip() {
        let d = date("2024-01-01");
        assert_eq!(file_name(d), "2024-01-01.json");
        assert_eq!(parse_file_name("2024-01-01.json"), Some(d));
        assert_eq!(parse_file_name("notes.txt"), None);
        assert_eq!(parse_file_name("2024-13-01.json"), None);
    }

    #[tokio::test]
    async fn test_missing_partition_is_empty() {
        let tmp = TempDir::new().unwrap();
        let records: Vec<String> =
            read(tmp.path(), RecordKind::BugReport, date("2024-01-01"))
                .await
                .unwrap();
        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn test_write_and_read_back() {
        let tmp = TempDir::new().unwrap();
        let d = date("2024-01-01");
        write(tmp.path(), d, &["a".to_string(), "b".to_string()])
            .await
            .unwrap();

        let records: Vec<String> = read(tmp.path(), RecordKind::BugReport, d).await.unwrap();
        assert_eq!(records, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_corrupt_partition_surfaces_date_and_kind() {
        let tmp = TempDir::new().unwrap();
        let d = date("2024-01-01");
        std::fs::write(path_for(tmp.path(), d), b"{not json").unwrap();

        let err = read::<String>(tmp.path(), RecordKind::LogEvent, d)
            .await
            .unwrap_err();
        match err {
            AppError::CorruptPartition { kind, date, .. } => {
                assert_eq!(kind, RecordKind::LogEvent);
                assert_eq!(date, d);
            }
            other => panic!("expected CorruptPartition, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_list_dates_sorted_and_filtered() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), date("2024-01-03"), &["x".to_string()])
            .await
            .unwrap();
        write(tmp.path(), date("2024-01-01"), &["y".to_string()])
            .await
            .unwrap();
        std::fs::write(tmp.path().join("README.md"), b"ignore me").unwrap();

        let dates = list_dates(tmp.path()).await.unwrap();
        assert_eq!(dates, vec![date("2024-01-01"), date("2024-01-03")]);
    }
}
