// src/pipeline/filter.rs

//! Feed parsing and qualification.
//!
//! Turns the raw CSV body into [`EventRecord`]s and keeps only rows that
//! match the event type, exceed the magnitude threshold and fall inside
//! the recency window. Every row is judged on its own; a bad row is
//! reported and skipped without affecting the rest of the batch.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use crate::models::{EventRecord, FilterConfig, RawRow};

/// Largest window `chrono::Duration::seconds` accepts.
const MAX_WINDOW_SECS: i64 = i64::MAX / 1_000;

/// Why a feed row did not qualify.
#[derive(Debug, Clone, PartialEq)]
pub enum Rejection {
    /// `type` differs from the configured event type
    WrongType,
    /// Magnitude at or below the threshold
    BelowThreshold,
    /// Event time further than the window from now
    OutsideWindow,
    /// `time` could not be parsed as an RFC 3339 date-time
    BadTimestamp(String),
    /// A required column is missing or not a number
    Malformed(String),
}

/// Row counts from one parse, for diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FilterStats {
    pub rows: usize,
    pub qualifying: usize,
    pub wrong_type: usize,
    pub below_threshold: usize,
    pub outside_window: usize,
    pub invalid: usize,
}

/// Parse the feed and return qualifying events in feed order.
pub fn parse_and_filter(
    raw_text: &str,
    criteria: &FilterConfig,
    now: DateTime<Utc>,
) -> Vec<EventRecord> {
    parse_and_filter_with_stats(raw_text, criteria, now).0
}

/// Same as [`parse_and_filter`], also returning per-reason counts.
pub fn parse_and_filter_with_stats(
    raw_text: &str,
    criteria: &FilterConfig,
    now: DateTime<Utc>,
) -> (Vec<EventRecord>, FilterStats) {
    let mut stats = FilterStats::default();
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(raw_text.as_bytes());

    let columns: Arc<[String]> = match reader.headers() {
        Ok(header) => header.iter().map(|c| c.trim().to_string()).collect(),
        Err(e) => {
            log::warn!("Feed header could not be read: {}", e);
            return (Vec::new(), stats);
        }
    };
    if columns.iter().all(|c| c.is_empty()) {
        return (Vec::new(), stats);
    }

    let mut qualifying = Vec::new();
    for result in reader.records() {
        stats.rows += 1;
        let record = match result {
            Ok(record) => record,
            Err(e) => {
                stats.invalid += 1;
                log::warn!("Skipping unreadable feed row: {}", e);
                continue;
            }
        };

        let row = RawRow::new(
            Arc::clone(&columns),
            record.iter().map(str::to_string).collect(),
        );

        match evaluate(row, criteria, now) {
            Ok(event) => qualifying.push(event),
            Err(Rejection::WrongType) => stats.wrong_type += 1,
            Err(Rejection::BelowThreshold) => stats.below_threshold += 1,
            Err(Rejection::OutsideWindow) => stats.outside_window += 1,
            Err(Rejection::BadTimestamp(message)) => {
                stats.invalid += 1;
                log::warn!("Invalid date format: {}", message);
            }
            Err(Rejection::Malformed(message)) => {
                stats.invalid += 1;
                log::warn!("Skipping malformed feed row: {}", message);
            }
        }
    }

    stats.qualifying = qualifying.len();
    log::debug!(
        "Feed rows: {} total, {} qualifying, {} other type, {} below M{}, {} outside {}s, {} invalid",
        stats.rows,
        stats.qualifying,
        stats.wrong_type,
        stats.below_threshold,
        criteria.magnitude_threshold,
        stats.outside_window,
        criteria.window_secs,
        stats.invalid
    );

    (qualifying, stats)
}

/// Judge a single row against the criteria.
pub fn evaluate(
    row: RawRow,
    criteria: &FilterConfig,
    now: DateTime<Utc>,
) -> Result<EventRecord, Rejection> {
    let event_type = required(&row, "type")?.to_string();
    if event_type != criteria.event_type {
        return Err(Rejection::WrongType);
    }

    let mag = required(&row, "mag")?.trim().to_string();
    let magnitude = parse_number(&mag, "mag")?;
    if magnitude <= criteria.magnitude_threshold {
        return Err(Rejection::BelowThreshold);
    }

    let time = required(&row, "time")?.to_string();
    let occurred_at = parse_time(&time).map_err(Rejection::BadTimestamp)?;
    let place = required(&row, "place")?.to_string();

    if !within_window(occurred_at, now, criteria.window_secs) {
        log::info!("SKIP: Magnitude {} {} on {}", mag, place, time);
        return Err(Rejection::OutsideWindow);
    }

    let latitude = parse_number(required(&row, "latitude")?, "latitude")?;
    let longitude = parse_number(required(&row, "longitude")?, "longitude")?;

    Ok(EventRecord {
        event_type,
        magnitude,
        mag,
        time,
        occurred_at,
        place,
        latitude,
        longitude,
        row,
    })
}

/// True when `|now - at| <= window_secs`, in either direction.
pub fn within_window(at: DateTime<Utc>, now: DateTime<Utc>, window_secs: u64) -> bool {
    let secs = i64::try_from(window_secs)
        .unwrap_or(MAX_WINDOW_SECS)
        .min(MAX_WINDOW_SECS);
    let window = Duration::seconds(secs);
    let offset = now.signed_duration_since(at);
    offset <= window && offset >= -window
}

/// Parse an ISO 8601 / RFC 3339 timestamp with offset into UTC.
pub fn parse_time(text: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(text.trim())
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| format!("{text:?}: {e}"))
}

fn required<'a>(row: &'a RawRow, column: &str) -> Result<&'a str, Rejection> {
    row.get(column)
        .ok_or_else(|| Rejection::Malformed(format!("missing column '{column}'")))
}

fn parse_number(text: &str, column: &str) -> Result<f64, Rejection> {
    text.trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| Rejection::Malformed(format!("{column} is not a number: {text:?}")))
}
