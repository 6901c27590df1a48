// src/limiter.rs

//! Per-origin, per-action rate limiting with sliding expiration.
//!
//! State lives in a lock-guarded in-memory table, loaded once at
//! startup and flushed back as a full-state overwrite: periodically,
//! and when the process shuts down. A crash loses at most one flush
//! interval of counts, which is acceptable for abuse mitigation.
//!
//! On-disk format (compatible with the original `limits.json`):
//!
//! ```json
//! { "1.2.3.4": { "reportBug": { "count": 3, "expires": 1700000000000 } } }
//! ```

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::task::JoinHandle;

use crate::config::LimitConfig;
use crate::error::{AppError, Result};

/// The recognized rate-limited actions.
///
/// A closed enum rather than free-form strings: requesting a limit for
/// an unknown action is a compile error, not a runtime surprise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RateAction {
    ReportBug,
    ReportLogs,
}

impl fmt::Display for RateAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RateAction::ReportBug => write!(f, "reportBug"),
            RateAction::ReportLogs => write!(f, "reportLogs"),
        }
    }
}

/// Counter for one (origin, action) pair.
///
/// An entry past its expiration behaves as absent: the next use resets
/// it rather than treating the quota as available indefinitely.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitEntry {
    pub count: u32,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub expires: DateTime<Utc>,
}

type LimitTable = HashMap<String, HashMap<RateAction, RateLimitEntry>>;

/// Process-wide rate limiter backed by a JSON state file.
pub struct RateLimiter {
    path: PathBuf,
    config: LimitConfig,
    state: Mutex<LimitTable>,
}

impl RateLimiter {
    /// Create a limiter persisting to the given file. Call [`load`]
    /// before first use.
    ///
    /// [`load`]: RateLimiter::load
    pub fn new(path: impl Into<PathBuf>, config: LimitConfig) -> Self {
        Self {
            path: path.into(),
            config,
            state: Mutex::new(HashMap::new()),
        }
    }

    /// Configured ceiling for an action.
    fn ceiling(&self, action: RateAction) -> u32 {
        match action {
            RateAction::ReportBug => self.config.report_bug_max,
            RateAction::ReportLogs => self.config.report_logs_max,
        }
    }

    fn ttl(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.config.expiration_days))
    }

    /// Load persisted state, pruning entries that expired while the
    /// process was down and dropping origins left with no actions.
    pub async fn load(&self) -> Result<()> {
        let table: LimitTable = match tokio::fs::read(&self.path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(AppError::Io(e)),
        };

        let now = Utc::now();
        let before: usize = table.values().map(HashMap::len).sum();

        let mut pruned = table;
        for actions in pruned.values_mut() {
            actions.retain(|_, entry| entry.expires > now);
        }
        pruned.retain(|_, actions| !actions.is_empty());

        let after: usize = pruned.values().map(HashMap::len).sum();
        if before != after {
            log::info!("Pruned {} expired rate limit entries", before - after);
        }

        *self.state.lock().expect("rate limit state poisoned") = pruned;
        Ok(())
    }

    /// Check and consume one unit of quota for (origin, action).
    ///
    /// Returns `false` when the origin has reached the action's
    /// ceiling; a denied call leaves the entry untouched, so the
    /// window does not reset early.
    pub fn allow(&self, origin: &str, action: RateAction) -> bool {
        let now = Utc::now();
        let mut state = self.state.lock().expect("rate limit state poisoned");
        let actions = state.entry(origin.to_string()).or_default();

        match actions.get_mut(&action) {
            Some(entry) if entry.expires > now => {
                if entry.count >= self.ceiling(action) {
                    log::debug!("Rate limit hit: {} on {}", origin, action);
                    return false;
                }
                entry.count += 1;
                true
            }
            _ => {
                actions.insert(
                    action,
                    RateLimitEntry {
                        count: 1,
                        expires: now + self.ttl(),
                    },
                );
                true
            }
        }
    }

    /// Persist the full state atomically, overwriting the previous
    /// file.
    pub async fn flush(&self) -> Result<()> {
        let bytes = {
            let state = self.state.lock().expect("rate limit state poisoned");
            serde_json::to_vec_pretty(&*state)?
        };

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let tmp = self.path.with_extension("tmp");
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(&bytes).await?;
        file.flush().await?;
        drop(file);

        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }

    /// Spawn the periodic flush task. Flush failures are logged and
    /// retried on the next tick, never fatal.
    pub fn spawn_flusher(self: Arc<Self>) -> JoinHandle<()> {
        let limiter = self;
        let period = Duration::from_secs(limiter.config.flush_interval_mins * 60);

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            // The first tick fires immediately; skip it
            interval.tick().await;
            loop {
                interval.tick().await;
                if let Err(e) = limiter.flush().await {
                    log::error!("Periodic rate limit flush failed: {}", e);
                }
            }
        })
    }

    #[cfg(test)]
    fn entry(&self, origin: &str, action: RateAction) -> Option<RateLimitEntry> {
        self.state
            .lock()
            .unwrap()
            .get(origin)
            .and_then(|actions| actions.get(&action))
            .cloned()
    }
}
