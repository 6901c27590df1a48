// src/aggregate.rs

//! Cross-partition log aggregation.
//!
//! A thin combinator over the record store's range query: log events
//! sharing a content fingerprint collapse into one, counts summed,
//! origin sets unioned, latest timestamp kept.

use chrono::NaiveDate;

use crate::error::Result;
use crate::models::LogEvent;
use crate::store::RecordStore;

/// Merge events by fingerprint, preserving first-seen order.
///
/// Pure reduction shared by the store's range query and the
/// aggregator. The first event seen for a fingerprint keeps its
/// identity fields; later ones are absorbed into it.
pub fn merge_by_fingerprint(events: Vec<LogEvent>) -> Vec<LogEvent> {
    let mut merged: Vec<LogEvent> = Vec::new();

    for event in events {
        match merged.iter_mut().find(|e| e.fingerprint == event.fingerprint) {
            Some(existing) => existing.absorb(&event),
            None => merged.push(event),
        }
    }

    merged
}

/// Aggregated read access to log events.
pub struct LogAggregator<'a> {
    store: &'a RecordStore,
}

impl<'a> LogAggregator<'a> {
    pub fn new(store: &'a RecordStore) -> Self {
        Self { store }
    }

    /// One event per distinct fingerprint across the inclusive date
    /// range.
    pub async fn aggregate_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<LogEvent>> {
        self.store.query_logs_by_range(start, end).await
    }

    /// Range aggregation restricted to one type tag. The merge runs
    /// before the filter, so counts still cover every occurrence of a
    /// fingerprint in the range.
    pub async fn aggregate_range_by_type(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        kind_tag: &str,
    ) -> Result<Vec<LogEvent>> {
        let mut events = self.aggregate_range(start, end).await?;
        events.retain(|e| e.kind_tag == kind_tag);
        Ok(events)
    }

    /// Substring search restricted to one type tag.
    pub async fn search_by_type(&self, needle: &str, kind_tag: &str) -> Result<Vec<LogEvent>> {
        self.store.search_logs(needle, Some(kind_tag)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{LogDraft, RecordKind};
    use crate::store::partition;
    use chrono::Utc;
    use tempfile::TempDir;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn event(title: &str, origin: &str, count: u64) -> LogEvent {
        let draft = LogDraft {
            title: title.to_string(),
            trace: "at main()".to_string(),
            kind_tag: "error".to_string(),
        };
        let mut e = LogEvent::from_draft(&draft, origin, Utc::now());
        e.count = count;
        e
    }

    #[test]
    fn test_merge_sums_counts_and_unions_origins() {
        let merged = merge_by_fingerprint(vec![
            event("NPE", "1.1.1.1", 2),
            event("NPE", "2.2.2.2", 3),
            event("OOM", "1.1.1.1", 1),
        ]);

        assert_eq!(merged.len(), 2);
        let npe = merged.iter().find(|e| e.title == "NPE").unwrap();
        assert_eq!(npe.count, 5);
        assert_eq!(npe.origins.len(), 2);
        let oom = merged.iter().find(|e| e.title == "OOM").unwrap();
        assert_eq!(oom.count, 1);
    }

    #[test]
    fn test_merge_empty() {
        assert!(merge_by_fingerprint(Vec::new()).is_empty());
    }

    async fn seed_logs(root: &std::path::Path, day: &str, events: &[LogEvent]) {
        let dir = root.join(RecordKind::LogEvent.dir_name());
        partition::write(&dir, date(day), events).await.unwrap();
    }

    #[tokio::test]
    async fn test_aggregate_range_across_days() {
        let tmp = TempDir::new().unwrap();
        let store = RecordStore::new(tmp.path());

        seed_logs(tmp.path(), "2024-01-01", &[event("NPE", "1.1.1.1", 2)]).await;
        seed_logs(tmp.path(), "2024-01-02", &[event("NPE", "2.2.2.2", 3)]).await;
        seed_logs(tmp.path(), "2024-01-05", &[event("NPE", "3.3.3.3", 7)]).await;

        let aggregator = LogAggregator::new(&store);
        let merged = aggregator
            .aggregate_range(date("2024-01-01"), date("2024-01-02"))
            .await
            .unwrap();

        // 2024-01-05 falls outside the inclusive range
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].count, 5);
        assert_eq!(
            merged[0].origins.iter().cloned().collect::<Vec<_>>(),
            vec!["1.1.1.1".to_string(), "2.2.2.2".to_string()]
        );
    }

    fn typed_event(title: &str, origin: &str, tag: &str) -> LogEvent {
        let draft = LogDraft {
            title: title.to_string(),
            trace: "at main()".to_string(),
            kind_tag: tag.to_string(),
        };
        LogEvent::from_draft(&draft, origin, Utc::now())
    }

    #[tokio::test]
    async fn test_aggregate_range_by_type_filters_after_merge() {
        let tmp = TempDir::new().unwrap();
        let store = RecordStore::new(tmp.path());

        seed_logs(
            tmp.path(),
            "2024-01-01",
            &[
                event("NPE", "1.1.1.1", 2),
                typed_event("Disk full", "1.1.1.1", "warning"),
            ],
        )
        .await;
        seed_logs(
            tmp.path(),
            "2024-01-02",
            &[typed_event("Disk full", "2.2.2.2", "warning")],
        )
        .await;

        let aggregator = LogAggregator::new(&store);
        let hits = aggregator
            .aggregate_range_by_type(date("2024-01-01"), date("2024-01-02"), "warning")
            .await
            .unwrap();

        // The error event drops out; the two warning occurrences merge
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].kind_tag, "warning");
        assert_eq!(hits[0].count, 2);
        assert_eq!(hits[0].origins.len(), 2);
    }

    #[tokio::test]
    async fn test_search_by_type() {
        let tmp = TempDir::new().unwrap();
        let store = RecordStore::new(tmp.path());

        let mut warning = event("NPE in handler", "1.1.1.1", 1);
        warning.kind_tag = "warning".to_string();
        seed_logs(
            tmp.path(),
            "2024-01-01",
            &[event("NPE in handler", "1.1.1.1", 1), warning],
        )
        .await;

        let aggregator = LogAggregator::new(&store);
        let hits = aggregator.search_by_type("npe", "warning").await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].kind_tag, "warning");
    }
}
