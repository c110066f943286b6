//! Earthquake event records parsed from the feed.

use std::sync::Arc;

use chrono::{DateTime, Utc};

/// A feed row exactly as fetched: ordered column names plus values.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRow {
    columns: Arc<[String]>,
    values: Vec<String>,
}

impl RawRow {
    /// Pair a shared header with one row of values.
    ///
    /// Short rows are padded with empty values so every column has an entry.
    pub fn new(columns: Arc<[String]>, mut values: Vec<String>) -> Self {
        if values.len() < columns.len() {
            values.resize(columns.len(), String::new());
        }
        Self { columns, values }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &[String] {
        &self.values[..self.columns.len()]
    }

    /// Value of the named column, if the column exists.
    pub fn get(&self, column: &str) -> Option<&str> {
        self.columns
            .iter()
            .position(|c| c == column)
            .map(|i| self.values[i].as_str())
    }
}

/// A validated earthquake event.
#[derive(Debug, Clone, PartialEq)]
pub struct EventRecord {
    /// Feed `type` column (e.g. "earthquake", "quarry blast")
    pub event_type: String,

    /// Parsed magnitude
    pub magnitude: f64,

    /// Magnitude as written in the feed, used verbatim in announcements
    pub mag: String,

    /// Event time as written in the feed; the dedup key
    pub time: String,

    /// Parsed event time
    pub occurred_at: DateTime<Utc>,

    /// Human readable location
    pub place: String,

    pub latitude: f64,
    pub longitude: f64,

    /// Full source row, persisted to the ledger
    pub row: RawRow,
}

impl EventRecord {
    /// Raw latitude text, falling back to the parsed value.
    pub fn latitude_text(&self) -> String {
        self.row
            .get("latitude")
            .map(|s| s.trim().to_string())
            .unwrap_or_else(|| self.latitude.to_string())
    }

    /// Raw longitude text, falling back to the parsed value.
    pub fn longitude_text(&self) -> String {
        self.row
            .get("longitude")
            .map(|s| s.trim().to_string())
            .unwrap_or_else(|| self.longitude.to_string())
    }
}
