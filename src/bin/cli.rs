//! bugring operator CLI
//!
//! Local entry point over the intake library: submit telemetry, query
//! and search stored records, purge an origin, run storage cleanup.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};

use bugring::{
    aggregate::LogAggregator,
    config::Config,
    error::{AppError, Result},
    intake::{CopyProcessor, IntakeService},
    janitor::StorageJanitor,
    limiter::RateLimiter,
    models::LogDraft,
    store::RecordStore,
};

/// bugring - Telemetry Intake Service
#[derive(Parser, Debug)]
#[command(name = "bugring", version, about = "Bug report and error log intake")]
struct Cli {
    /// Path to storage directory containing config.toml
    #[arg(short, long, default_value = "storage")]
    storage_dir: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Submit a bug report
    Submit {
        /// Report title
        #[arg(long)]
        title: String,

        /// Report description
        #[arg(long)]
        description: String,

        /// Optional file holding a free-text log bundle
        #[arg(long)]
        log_file: Option<PathBuf>,

        /// Image files to attach (max 3)
        #[arg(long, num_args = 0..=3)]
        photo: Vec<PathBuf>,

        /// Submitting client identity
        #[arg(long, default_value = "cli")]
        origin: String,
    },

    /// Submit a batch of error log events from a JSON file
    Log {
        /// JSON file: array of {title, trace, type}
        file: PathBuf,

        /// Submitting client identity
        #[arg(long, default_value = "cli")]
        origin: String,
    },

    /// List bug reports, newest first (privileged)
    Reports {
        #[arg(long, default_value_t = 1)]
        page: usize,

        #[arg(long)]
        page_size: Option<usize>,

        #[arg(long)]
        password: Option<String>,
    },

    /// Aggregate or search error logs (privileged)
    Logs {
        /// Range start, YYYY-MM-DD
        #[arg(long, conflicts_with = "search")]
        start: Option<String>,

        /// Range end, YYYY-MM-DD
        #[arg(long, requires = "start")]
        end: Option<String>,

        /// Substring search over titles and traces
        #[arg(long)]
        search: Option<String>,

        /// Restrict to one type tag
        #[arg(long = "type")]
        kind_tag: Option<String>,

        #[arg(long)]
        password: Option<String>,
    },

    /// Search bug reports by title and description (privileged)
    Search {
        needle: String,

        #[arg(long)]
        password: Option<String>,
    },

    /// Delete everything an origin has submitted (privileged)
    Purge {
        origin: String,

        #[arg(long)]
        password: Option<String>,
    },

    /// Enforce the photo storage quota now
    Gc,

    /// Validate the configuration file
    Validate,
}

/// Initialize logging based on verbosity flag.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|_| AppError::validation(format!("Invalid date '{s}', expected YYYY-MM-DD")))
}

fn require_password(config: &Config, provided: Option<&str>) -> Result<()> {
    if config.check_password(provided) {
        Ok(())
    } else {
        Err(AppError::validation("Access denied: invalid password"))
    }
}

fn build_service(storage_dir: &PathBuf, config: &Config) -> (IntakeService, Arc<RateLimiter>) {
    let root = storage_dir.join(&config.storage.root_dir);
    let photos_dir = storage_dir.join(&config.storage.photos_dir);

    let store = Arc::new(RecordStore::new(&root));
    let limiter = Arc::new(RateLimiter::new(
        storage_dir.join("limits.json"),
        config.limits.clone(),
    ));
    let janitor = StorageJanitor::new(
        &photos_dir,
        config.storage.max_photos_bytes(),
        config.storage.eviction_target_fraction,
    );
    let service = IntakeService::new(
        store,
        limiter.clone(),
        janitor,
        Box::new(CopyProcessor::new(&photos_dir)),
    );
    (service, limiter)
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config_path = cli.storage_dir.join("config.toml");
    let config = Config::load_or_default(&config_path);
    config.validate()?;

    let (service, limiter) = build_service(&cli.storage_dir, &config);
    limiter.load().await?;

    let outcome = run(cli.command, &service, &config, &config_path).await;

    // Persist rate limit state even when the command itself failed.
    if let Err(e) = service.shutdown().await {
        log::error!("Failed to flush rate limit state: {e}");
    }
    outcome
}

async fn run(
    command: Command,
    service: &IntakeService,
    config: &Config,
    config_path: &PathBuf,
) -> Result<()> {
    match command {
        Command::Submit {
            title,
            description,
            log_file,
            photo,
            origin,
        } => {
            let logs = match log_file {
                Some(path) => Some(tokio::fs::read_to_string(path).await?),
                None => None,
            };

            let report = service
                .submit_report(&origin, &title, &description, logs, &photo)
                .await?;
            log::info!("Stored bug report {}", report.id);
            println!("{}", serde_json::to_string_pretty(&report)?);
        }

        Command::Log { file, origin } => {
            let bytes = tokio::fs::read(&file).await?;
            let entries: Vec<LogDraft> = serde_json::from_slice(&bytes)?;

            let outcome = service.submit_logs(&origin, &entries).await?;
            log::info!(
                "Log batch: {} stored, {} merged, {} skipped",
                outcome.stored,
                outcome.merged,
                outcome.skipped
            );
            if !outcome.accepted() {
                log::warn!("No entries in the batch were storable");
            }
        }

        Command::Reports {
            page,
            page_size,
            password,
        } => {
            require_password(config, password.as_deref())?;

            let size = page_size.unwrap_or(config.storage.page_size);
            let result = service.store().query_reports_page(page, size).await?;
            log::info!(
                "Page {}/{} ({} reports total)",
                result.page,
                result.total_pages,
                result.total
            );
            println!("{}", serde_json::to_string_pretty(&result.records)?);
        }

        Command::Logs {
            start,
            end,
            search,
            kind_tag,
            password,
        } => {
            require_password(config, password.as_deref())?;

            let aggregator = LogAggregator::new(service.store());
            let mut events = match (&search, &start) {
                (Some(needle), _) => match &kind_tag {
                    Some(tag) => aggregator.search_by_type(needle, tag).await?,
                    None => service.store().search_logs(needle, None).await?,
                },
                (None, Some(start)) => {
                    let start = parse_date(start)?;
                    let end = match &end {
                        Some(end) => parse_date(end)?,
                        None => start,
                    };
                    match &kind_tag {
                        Some(tag) => {
                            aggregator.aggregate_range_by_type(start, end, tag).await?
                        }
                        None => aggregator.aggregate_range(start, end).await?,
                    }
                }
                (None, None) => {
                    return Err(AppError::validation(
                        "Provide either --search or --start/--end",
                    ));
                }
            };

            // Hottest events first
            events.sort_by(|a, b| b.count.cmp(&a.count));
            println!("{}", serde_json::to_string_pretty(&events)?);
        }

        Command::Search { needle, password } => {
            require_password(config, password.as_deref())?;

            let mut hits = service.store().search_reports(&needle).await?;
            hits.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
            log::info!("{} reports match '{}'", hits.len(), needle);
            println!("{}", serde_json::to_string_pretty(&hits)?);
        }

        Command::Purge { origin, password } => {
            require_password(config, password.as_deref())?;

            let outcome = service.purge_origin(&origin).await?;
            log::info!(
                "Purged origin {}: {} reports, {} log events, {} photos",
                origin,
                outcome.reports_removed,
                outcome.logs_removed,
                outcome.photos_deleted
            );
        }

        Command::Gc => {
            let (evicted, _) = service.enforce_quota().await?;
            if evicted == 0 {
                log::info!("Photo storage under quota, nothing to do");
            }
        }

        Command::Validate => {
            config.validate()?;
            log::info!("Configuration OK ({})", config_path.display());
        }
    }

    Ok(())
}
