// src/pipeline/announce.rs

//! One announcer pass: fetch → filter → dedup → format → publish → record.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::error::{AppError, Result};
use crate::models::{Config, EventRecord};
use crate::pipeline::filter::parse_and_filter;
use crate::pipeline::format::format_event;
use crate::services::{FeedSource, Publisher};
use crate::storage::{Ledger, LedgerLock};

/// Counts from a single run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// The feed was downloaded successfully
    pub fetched: bool,
    /// Events passing the type, magnitude and recency filters
    pub qualifying: usize,
    /// Qualifying events already present in the ledger
    pub already_posted: usize,
    /// Events posted and recorded
    pub published: usize,
    /// Events recorded without posting (dry run)
    pub dry_run: usize,
    /// Events that could not be posted; not recorded
    pub failed: usize,
    /// Another run held the ledger lock, nothing was done
    pub locked: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    NotStarted,
    Active,
    Failed,
}

/// Drives one pass of the pipeline against a feed and a publisher.
pub struct Announcer<'a> {
    config: Arc<Config>,
    feed: &'a dyn FeedSource,
    publisher: &'a mut dyn Publisher,
    session: SessionState,
}

impl<'a> Announcer<'a> {
    pub fn new(
        config: Arc<Config>,
        feed: &'a dyn FeedSource,
        publisher: &'a mut dyn Publisher,
    ) -> Self {
        Self {
            config,
            feed,
            publisher,
            session: SessionState::NotStarted,
        }
    }

    /// Run the pipeline once, judging recency against `now`.
    ///
    /// Fetch failures and empty results end the run early with `Ok`. Only
    /// ledger I/O errors are returned as `Err`.
    pub async fn run(&mut self, now: DateTime<Utc>) -> Result<RunSummary> {
        let mut summary = RunSummary::default();
        let filter = &self.config.filter;

        let raw = match self.feed.fetch().await {
            Ok(raw) => raw,
            Err(e) => {
                log::warn!("{}", e);
                log::info!("No earthquakes (feed unavailable)");
                return Ok(summary);
            }
        };
        summary.fetched = true;

        let events = parse_and_filter(&raw, filter, now);
        summary.qualifying = events.len();
        if events.is_empty() {
            log::info!(
                "No earthquakes above magnitude {} within {}s",
                filter.magnitude_threshold,
                filter.window_secs
            );
            return Ok(summary);
        }
        log::info!("{} qualifying earthquake(s)", events.len());

        let ledger_path = self.config.ledger_path();
        let stale_after = Duration::from_secs(self.config.run.lock_stale_secs);
        let _lock = match LedgerLock::acquire(&ledger_path, stale_after) {
            Ok(lock) => lock,
            Err(AppError::Locked(path)) => {
                log::warn!(
                    "Another run is active ({} exists); skipping this run",
                    path.display()
                );
                summary.locked = true;
                return Ok(summary);
            }
            Err(e) => return Err(e),
        };

        let mut ledger = Ledger::load(&ledger_path).await?;
        for event in &events {
            self.process(event, &mut ledger, &mut summary).await?;
        }

        log::info!(
            "Run complete: {} qualifying, {} published, {} dry-run, {} already posted, {} failed",
            summary.qualifying,
            summary.published,
            summary.dry_run,
            summary.already_posted,
            summary.failed
        );
        Ok(summary)
    }

    async fn process(
        &mut self,
        event: &EventRecord,
        ledger: &mut Ledger,
        summary: &mut RunSummary,
    ) -> Result<()> {
        if ledger.contains(&event.time) {
            log::info!(
                "Already posted: Magnitude {} {} on {}",
                event.mag,
                event.place,
                event.time
            );
            summary.already_posted += 1;
            return Ok(());
        }

        let announcement = format_event(event);
        log::info!("{}", announcement.text.trim_end());
        log::info!("Map: {}", announcement.map_link);

        if self.config.run.dry_run {
            ledger.append(event).await?;
            summary.dry_run += 1;
            log::info!("Dry run: recorded {} without posting", event.time);
            return Ok(());
        }

        if !self.ensure_session().await {
            summary.failed += 1;
            log::warn!("Not posting {}: no Bluesky session", event.time);
            return Ok(());
        }

        match self
            .publisher
            .post(&announcement.text, Some(&announcement.map_link))
            .await
        {
            Ok(receipt) => {
                log::info!("CID: {} URI: {}", receipt.cid, receipt.uri);
                ledger.append(event).await?;
                summary.published += 1;
            }
            Err(e) => {
                log::error!("{} (event {})", e, event.time);
                summary.failed += 1;
            }
        }
        Ok(())
    }

    /// Log in on first use; a failed login is not retried within the run.
    async fn ensure_session(&mut self) -> bool {
        match self.session {
            SessionState::Active => true,
            SessionState::Failed => false,
            SessionState::NotStarted => {
                let account = &self.config.bluesky;
                match self
                    .publisher
                    .login(&account.identifier, &account.password)
                    .await
                {
                    Ok(()) => {
                        self.session = SessionState::Active;
                        true
                    }
                    Err(e) => {
                        log::error!("{}", e);
                        self.session = SessionState::Failed;
                        false
                    }
                }
            }
        }
    }
}
