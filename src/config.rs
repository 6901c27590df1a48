// src/config.rs

//! Application configuration structures.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Root application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Storage paths and quota settings
    #[serde(default)]
    pub storage: StorageConfig,

    /// Rate limiting settings
    #[serde(default)]
    pub limits: LimitConfig,

    /// Operator shared secret for privileged operations. When unset,
    /// privileged operations are open (development mode).
    #[serde(default)]
    pub password: Option<String>,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration or return default if loading fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            log::warn!(
                "Config load failed from {:?}: {}. Using defaults.",
                path.as_ref(),
                e
            );
            Self::default()
        })
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.storage.max_photos_gb <= 0.0 {
            return Err(AppError::config("storage.max_photos_gb must be > 0"));
        }
        let fraction = self.storage.eviction_target_fraction;
        if !(fraction > 0.0 && fraction <= 1.0) {
            return Err(AppError::config(
                "storage.eviction_target_fraction must be in (0, 1]",
            ));
        }
        if self.storage.page_size == 0 {
            return Err(AppError::config("storage.page_size must be > 0"));
        }
        if self.limits.report_bug_max == 0 {
            return Err(AppError::config("limits.report_bug_max must be > 0"));
        }
        if self.limits.report_logs_max == 0 {
            return Err(AppError::config("limits.report_logs_max must be > 0"));
        }
        if self.limits.expiration_days == 0 {
            return Err(AppError::config("limits.expiration_days must be > 0"));
        }
        if self.limits.flush_interval_mins == 0 {
            return Err(AppError::config(
                "limits.flush_interval_mins must be > 0",
            ));
        }
        Ok(())
    }

    /// Shared-secret equality check performed by the boundary layer
    /// before privileged operations.
    pub fn check_password(&self, provided: Option<&str>) -> bool {
        match &self.password {
            Some(expected) => provided == Some(expected.as_str()),
            None => true,
        }
    }
}

/// Storage paths and quota settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory for record partitions, relative to the storage root
    #[serde(default = "defaults::root_dir")]
    pub root_dir: PathBuf,

    /// Directory for uploaded photos, relative to the storage root
    #[serde(default = "defaults::photos_dir")]
    pub photos_dir: PathBuf,

    /// Photo storage cap in gigabytes
    #[serde(default = "defaults::max_photos_gb")]
    pub max_photos_gb: f64,

    /// After eviction, usage is reduced to this fraction of the cap
    /// rather than the cap itself, to avoid thrashing on every write
    #[serde(default = "defaults::eviction_target_fraction")]
    pub eviction_target_fraction: f64,

    /// Default page size for paged report queries
    #[serde(default = "defaults::page_size")]
    pub page_size: usize,
}

impl StorageConfig {
    /// Photo storage cap in bytes.
    pub fn max_photos_bytes(&self) -> u64 {
        (self.max_photos_gb * 1024.0 * 1024.0 * 1024.0) as u64
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root_dir: defaults::root_dir(),
            photos_dir: defaults::photos_dir(),
            max_photos_gb: defaults::max_photos_gb(),
            eviction_target_fraction: defaults::eviction_target_fraction(),
            page_size: defaults::page_size(),
        }
    }
}

/// Rate limiting settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitConfig {
    /// Bug report submissions allowed per origin per window
    #[serde(default = "defaults::report_bug_max")]
    pub report_bug_max: u32,

    /// Log batch submissions allowed per origin per window
    #[serde(default = "defaults::report_logs_max")]
    pub report_logs_max: u32,

    /// Window length in days before an origin's counters expire
    #[serde(default = "defaults::expiration_days")]
    pub expiration_days: u32,

    /// Minutes between periodic flushes of limiter state to disk
    #[serde(default = "defaults::flush_interval_mins")]
    pub flush_interval_mins: u64,
}

impl Default for LimitConfig {
    fn default() -> Self {
        Self {
            report_bug_max: defaults::report_bug_max(),
            report_logs_max: defaults::report_logs_max(),
            expiration_days: defaults::expiration_days(),
            flush_interval_mins: defaults::flush_interval_mins(),
        }
    }
}

mod defaults {
    use std::path::PathBuf;

    // Storage defaults
    pub fn root_dir() -> PathBuf {
        "records".into()
    }
    pub fn photos_dir() -> PathBuf {
        "photos".into()
    }
    pub fn max_photos_gb() -> f64 {
        1.0
    }
    pub fn eviction_target_fraction() -> f64 {
        0.9
    }
    pub fn page_size() -> usize {
        20
    }

    // Limit defaults
    pub fn report_bug_max() -> u32 {
        15
    }
    pub fn report_logs_max() -> u32 {
        1000
    }
    pub fn expiration_days() -> u32 {
        3
    }
    pub fn flush_interval_mins() -> u64 {
        30
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_default_config_ok() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn validate_rejects_zero_quota() {
        let mut config = Config::default();
        config.storage.max_photos_gb = 0.0;
        let err = config.validate().unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }

    #[test]
    fn validate_rejects_bad_fraction() {
        let mut config = Config::default();
        config.storage.eviction_target_fraction = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_max_photos_bytes() {
        let mut config = StorageConfig::default();
        config.max_photos_gb = 2.0;
        assert_eq!(config.max_photos_bytes(), 2 * 1024 * 1024 * 1024);
    }

    #[test]
    fn test_check_password() {
        let mut config = Config::default();
        assert!(config.check_password(None));

        config.password = Some("hunter2".to_string());
        assert!(config.check_password(Some("hunter2")));
        assert!(!config.check_password(Some("wrong")));
        assert!(!config.check_password(None));
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: Config = toml::from_str("[limits]\nreport_bug_max = 5\n").unwrap();
        assert_eq!(config.limits.report_bug_max, 5);
        assert_eq!(config.limits.report_logs_max, 1000);
        assert_eq!(config.storage.page_size, 20);
    }
}
