//! Tremors CLI
//!
//! Local execution entry point, meant to be run from cron or a timer.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tremors::{
    error::Result,
    models::{Config, PathsConfig, env_keys},
    pipeline::Announcer,
    services::{BlueskyClient, FeedClient},
    storage::{Ledger, LedgerLock, ledger::KEY_COLUMN},
};

/// Tremors - earthquake announcer for Bluesky
#[derive(Parser, Debug)]
#[command(
    name = "tremors",
    version,
    about = "Post recent strong earthquakes to Bluesky"
)]
struct Cli {
    /// Path to storage directory containing config.toml and the ledger
    #[arg(short, long, default_value = "storage")]
    storage_dir: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch the feed and announce new qualifying earthquakes (default)
    Run {
        /// Record events without posting them
        #[arg(long)]
        dry_run: bool,
    },

    /// Validate configuration and print effective settings
    Validate,

    /// Show ledger info
    Info,
}

/// Initialize logging based on verbosity flag.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .target(env_logger::Target::Stdout)
        .format_timestamp_secs()
        .init();
}

/// Build the effective configuration: file, then environment.
fn load_config(storage_dir: &Path) -> Result<Config> {
    let config_path = storage_dir.join("config.toml");
    let mut config = if config_path.exists() {
        Config::load(&config_path)?
    } else {
        log::debug!("No config at {}, using defaults", config_path.display());
        Config::default()
    };

    // Keep the ledger next to config.toml unless placed elsewhere explicitly
    if config.paths.output_dir == PathsConfig::default().output_dir {
        config.paths.output_dir = storage_dir.to_path_buf();
    }

    config.apply_env(|key| std::env::var(key).ok())?;
    Ok(config)
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Ok(path) = dotenvy::dotenv() {
        log::debug!("Loaded environment from {}", path.display());
    }

    let mut config = match load_config(&cli.storage_dir) {
        Ok(config) => config,
        Err(e) => {
            log::error!("Config load failed: {}", e);
            return Err(e);
        }
    };

    match cli.command.unwrap_or(Command::Run { dry_run: false }) {
        Command::Run { dry_run } => {
            if dry_run {
                config.run.dry_run = true;
            }
            if let Err(e) = config.validate() {
                log::error!("{}", e);
                return Err(e);
            }

            let config = Arc::new(config);
            let feed = FeedClient::new(&config.feed)?;
            let mut publisher = BlueskyClient::new(&config.bluesky)?;

            log::info!(
                "Checking {} for {} events of magnitude >= {} in the last {}s{}",
                feed.url(),
                config.filter.event_type,
                config.filter.magnitude_threshold,
                config.filter.window_secs,
                if config.run.dry_run { " (dry run)" } else { "" }
            );

            let summary = Announcer::new(Arc::clone(&config), &feed, &mut publisher)
                .run(chrono::Utc::now())
                .await?;

            if summary.failed > 0 {
                log::warn!("{} announcement(s) could not be posted", summary.failed);
            }
        }

        Command::Validate => {
            log::info!("Validating configuration...");

            if let Err(e) = config.validate() {
                log::error!("Config validation failed: {}", e);
                return Err(e);
            }

            log::info!("Feed: {}", config.feed.url);
            log::info!(
                "Timeouts: connect {}s, read {}s",
                config.feed.connect_timeout_secs,
                config.feed.read_timeout_secs
            );
            log::info!(
                "Filter: {} with magnitude >= {} ({}) within {}s ({})",
                config.filter.event_type,
                config.filter.magnitude_threshold,
                env_keys::MAGNITUDE,
                config.filter.window_secs,
                env_keys::WINDOW
            );
            log::info!("Bluesky: {:?}", config.bluesky);
            log::info!("Dry run: {}", config.run.dry_run);
            log::info!("Ledger: {}", config.ledger_path().display());

            log::info!("✓ Config OK");
        }

        Command::Info => {
            let ledger_path = config.ledger_path();
            log::info!("Storage directory: {}", cli.storage_dir.display());
            log::info!("Ledger: {}", ledger_path.display());

            let lock_path = LedgerLock::path_for(&ledger_path);
            if lock_path.exists() {
                log::info!("Lock held: {}", lock_path.display());
            }

            let ledger = Ledger::load(&ledger_path).await?;
            if ledger.is_empty() {
                log::info!("No announcements recorded yet.");
            } else {
                log::info!("Recorded announcements: {}", ledger.len());
                if let Some(latest) = ledger.last_value(KEY_COLUMN) {
                    log::info!("Most recent event: {}", latest);
                }
            }
        }
    }

    Ok(())
}
