//! Append-only CSV ledger of announced events.
//!
//! The ledger is the dedup memory between runs. Each announced event is
//! stored as its full feed row; the first line is a header taken from the
//! first event ever written. Rows are never rewritten or removed.
//!
//! ```text
//! {output_dir}/tremors.csv
//! time,latitude,longitude,depth,mag,...,place,type,...
//! 2026-10-15T12:00:00.000Z,10.0,20.0,10,6.1,...,"10km N of Testville",earthquake,...
//! ```

use std::path::{Path, PathBuf};

use tokio::io::AsyncWriteExt;

use crate::error::{AppError, Result};
use crate::models::EventRecord;

/// Column holding the dedup key.
pub const KEY_COLUMN: &str = "time";

/// In-memory snapshot of the ledger file plus its location.
#[derive(Debug, Clone)]
pub struct Ledger {
    path: PathBuf,
    header: Option<Vec<String>>,
    rows: Vec<Vec<String>>,
    key_index: Option<usize>,
}

impl Ledger {
    /// Read the whole ledger. A missing file yields an empty ledger.
    pub async fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::info!("No ledger at {} yet", path.display());
                return Ok(Self::empty(path));
            }
            Err(e) => return Err(AppError::Io(e)),
        };

        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_reader(bytes.as_slice());

        let header: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
        if header.iter().all(|c| c.is_empty()) {
            return Ok(Self::empty(path));
        }

        let mut rows = Vec::new();
        for record in reader.records() {
            rows.push(record?.iter().map(str::to_string).collect());
        }

        let key_index = header.iter().position(|c| c.trim() == KEY_COLUMN);
        if key_index.is_none() {
            log::warn!(
                "Ledger {} has no '{}' column; nothing will be treated as already posted",
                path.display(),
                KEY_COLUMN
            );
        }

        log::debug!("Loaded {} ledger rows from {}", rows.len(), path.display());
        Ok(Self {
            path,
            header: Some(header),
            rows,
            key_index,
        })
    }

    fn empty(path: PathBuf) -> Self {
        Self {
            path,
            header: None,
            rows: Vec::new(),
            key_index: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn header(&self) -> Option<&[String]> {
        self.header.as_deref()
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Value of `column` in the most recently appended row.
    pub fn last_value(&self, column: &str) -> Option<&str> {
        let index = self.header.as_ref()?.iter().position(|c| c == column)?;
        self.rows.last()?.get(index).map(String::as_str)
    }

    /// True if a stored row carries exactly this timestamp string.
    pub fn contains(&self, time: &str) -> bool {
        let Some(index) = self.key_index else {
            return false;
        };
        self.rows
            .iter()
            .any(|row| row.get(index).is_some_and(|v| v == time))
    }

    /// Append the event's full row to the file and the snapshot.
    ///
    /// Writes a header first when the file is new or empty. Against an
    /// existing header, values are laid out in that header's order.
    pub async fn append(&mut self, event: &EventRecord) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;

        let fresh = file.metadata().await?.len() == 0;
        let header = match (&self.header, fresh) {
            (Some(header), false) => header.clone(),
            _ => event.row.columns().to_vec(),
        };

        let values: Vec<String> = header
            .iter()
            .map(|column| event.row.get(column).unwrap_or_default().to_string())
            .collect();

        let mut lines = Vec::new();
        if fresh {
            lines.push(header.as_slice());
        }
        lines.push(values.as_slice());
        let bytes = encode_rows(&lines)?;

        file.write_all(&bytes).await?;
        file.flush().await?;
        drop(file);

        if fresh || self.header.is_none() {
            self.key_index = header.iter().position(|c| c.trim() == KEY_COLUMN);
            self.header = Some(header);
        }
        self.rows.push(values);
        Ok(())
    }
}

/// Encode rows as CSV, quoting only where required.
fn encode_rows(rows: &[&[String]]) -> Result<Vec<u8>> {
    let mut writer = csv::WriterBuilder::new()
        .quote_style(csv::QuoteStyle::Necessary)
        .terminator(csv::Terminator::Any(b'\n'))
        .flexible(true)
        .from_writer(Vec::new());
    for row in rows {
        writer.write_record(row.iter())?;
    }
    writer.into_inner().map_err(|e| AppError::Io(e.into_error()))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::models::{FilterConfig, RawRow};
    use crate::pipeline::filter::{evaluate, parse_time};
    use tempfile::TempDir;

    fn event(time: &str, place: &str) -> EventRecord {
        let columns: Arc<[String]> = ["time", "mag", "place", "type", "latitude", "longitude"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let row = RawRow::new(
            columns,
            vec![
                time.into(),
                "6.1".into(),
                place.into(),
                "earthquake".into(),
                "10.0".into(),
                "20.0".into(),
            ],
        );
        evaluate(row, &FilterConfig::default(), parse_time(time).unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_load_missing_file_is_empty() {
        let tmp = TempDir::new().unwrap();
        let ledger = Ledger::load(tmp.path().join("tremors.csv")).await.unwrap();
        assert!(ledger.is_empty());
        assert!(ledger.header().is_none());
        assert!(!ledger.contains("2026-10-15T12:00:00Z"));
    }

    #[tokio::test]
    async fn test_append_writes_header_once() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("tremors.csv");
        let mut ledger = Ledger::load(&path).await.unwrap();

        ledger
            .append(&event("2026-10-15T12:00:00Z", "10km N of Testville"))
            .await
            .unwrap();
        ledger
            .append(&event("2026-10-15T12:05:00Z", "Offshore"))
            .await
            .unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            content,
            "time,mag,place,type,latitude,longitude\n\
             2026-10-15T12:00:00Z,6.1,10km N of Testville,earthquake,10.0,20.0\n\
             2026-10-15T12:05:00Z,6.1,Offshore,earthquake,10.0,20.0\n"
        );
        assert_eq!(ledger.len(), 2);
    }

    #[tokio::test]
    async fn test_appended_rows_are_found_on_reload() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested/dir/tremors.csv");

        let mut first_run = Ledger::load(&path).await.unwrap();
        first_run
            .append(&event("2026-10-15T12:00:00.396Z", "Somewhere"))
            .await
            .unwrap();
        assert!(first_run.contains("2026-10-15T12:00:00.396Z"));

        let second_run = Ledger::load(&path).await.unwrap();
        assert_eq!(second_run.len(), 1);
        assert!(second_run.contains("2026-10-15T12:00:00.396Z"));
        assert_eq!(second_run.last_value("place"), Some("Somewhere"));
    }

    #[tokio::test]
    async fn test_contains_uses_exact_string_match() {
        let tmp = TempDir::new().unwrap();
        let mut ledger = Ledger::load(tmp.path().join("l.csv")).await.unwrap();
        ledger
            .append(&event("2026-10-15T12:00:00.000Z", "Somewhere"))
            .await
            .unwrap();

        assert!(ledger.contains("2026-10-15T12:00:00.000Z"));
        // Same instant, different spelling.
        assert!(!ledger.contains("2026-10-15T12:00:00Z"));
    }

    #[tokio::test]
    async fn test_fields_are_quoted_only_when_needed() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("l.csv");
        let mut ledger = Ledger::load(&path).await.unwrap();
        ledger
            .append(&event("2026-10-15T12:00:00Z", "8 km SSW of Volcano, Hawaii"))
            .await
            .unwrap();
        ledger
            .append(&event("2026-10-15T12:01:00Z", "the \"Big\" one"))
            .await
            .unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains(",\"8 km SSW of Volcano, Hawaii\","));
        assert!(content.contains(",\"the \"\"Big\"\" one\","));
        assert!(content.contains("2026-10-15T12:00:00Z,6.1,"));

        let reloaded = Ledger::load(&path).await.unwrap();
        assert_eq!(reloaded.last_value("place"), Some("the \"Big\" one"));
    }

    #[tokio::test]
    async fn test_existing_header_order_is_kept() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("l.csv");
        std::fs::write(&path, "place,time,depth\nOld,2020-01-01T00:00:00Z,5\n").unwrap();

        let mut ledger = Ledger::load(&path).await.unwrap();
        assert!(ledger.contains("2020-01-01T00:00:00Z"));
        ledger
            .append(&event("2026-10-15T12:00:00Z", "New"))
            .await
            .unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.ends_with("New,2026-10-15T12:00:00Z,\n"));
        assert!(ledger.contains("2026-10-15T12:00:00Z"));
    }

    #[tokio::test]
    async fn test_ledger_without_time_column_matches_nothing() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("l.csv");
        std::fs::write(&path, "when,place\n2026-10-15T12:00:00Z,Old\n").unwrap();

        let ledger = Ledger::load(&path).await.unwrap();
        assert_eq!(ledger.len(), 1);
        assert!(!ledger.contains("2026-10-15T12:00:00Z"));
    }
}
