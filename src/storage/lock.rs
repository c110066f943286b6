//! Single-flight guard over the ledger path.
//!
//! A run holds `<ledger>.lock` for its whole duration so two overlapping
//! scheduled runs cannot both announce and append the same event.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use crate::error::{AppError, Result};

/// Exclusive lock file next to the ledger, removed on drop.
#[derive(Debug)]
pub struct LedgerLock {
    path: PathBuf,
}

impl LedgerLock {
    /// Lock file location for a ledger.
    pub fn path_for(ledger: &Path) -> PathBuf {
        let mut name = ledger.as_os_str().to_owned();
        name.push(".lock");
        PathBuf::from(name)
    }

    /// Take the lock, replacing one older than `stale_after`.
    ///
    /// Fails with [`AppError::Locked`] while another run holds a fresh lock.
    pub fn acquire(ledger: &Path, stale_after: Duration) -> Result<Self> {
        let path = Self::path_for(ledger);
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        match Self::create(&path) {
            Ok(lock) => Ok(lock),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                if !Self::is_stale(&path, stale_after) {
                    return Err(AppError::Locked(path));
                }
                log::warn!("Replacing stale ledger lock {}", path.display());
                match fs::remove_file(&path) {
                    Ok(()) => {}
                    Err(e) if e.kind() == ErrorKind::NotFound => {}
                    Err(e) => return Err(AppError::Io(e)),
                }
                Self::create(&path).map_err(|e| match e.kind() {
                    ErrorKind::AlreadyExists => AppError::Locked(path.clone()),
                    _ => AppError::Io(e),
                })
            }
            Err(e) => Err(AppError::Io(e)),
        }
    }

    fn create(path: &Path) -> std::io::Result<Self> {
        let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;
        let stamp = chrono::Utc::now().to_rfc3339();
        writeln!(file, "{} {}", std::process::id(), stamp)?;
        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    fn is_stale(path: &Path, stale_after: Duration) -> bool {
        fs::metadata(path)
            .and_then(|m| m.modified())
            .ok()
            .and_then(|modified| SystemTime::now().duration_since(modified).ok())
            .is_some_and(|age| age > stale_after)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for LedgerLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            log::warn!("Could not remove ledger lock {}: {}", self.path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const STALE: Duration = Duration::from_secs(600);

    #[test]
    fn test_lock_path_appends_suffix() {
        assert_eq!(
            LedgerLock::path_for(Path::new("storage/tremors.csv")),
            PathBuf::from("storage/tremors.csv.lock")
        );
    }

    #[test]
    fn test_second_acquire_fails_while_held() {
        let tmp = TempDir::new().unwrap();
        let ledger = tmp.path().join("tremors.csv");

        let held = LedgerLock::acquire(&ledger, STALE).unwrap();
        assert!(held.path().exists());
        assert!(matches!(
            LedgerLock::acquire(&ledger, STALE),
            Err(AppError::Locked(_))
        ));
    }

    #[test]
    fn test_lock_released_on_drop() {
        let tmp = TempDir::new().unwrap();
        let ledger = tmp.path().join("tremors.csv");

        let lock_path = {
            let lock = LedgerLock::acquire(&ledger, STALE).unwrap();
            lock.path().to_path_buf()
        };
        assert!(!lock_path.exists());
        assert!(LedgerLock::acquire(&ledger, STALE).is_ok());
    }

    #[test]
    fn test_stale_lock_is_replaced() {
        let tmp = TempDir::new().unwrap();
        let ledger = tmp.path().join("tremors.csv");
        fs::write(LedgerLock::path_for(&ledger), "4242 leftover\n").unwrap();

        std::thread::sleep(Duration::from_millis(20));
        let lock = LedgerLock::acquire(&ledger, Duration::from_millis(1)).unwrap();
        let content = fs::read_to_string(lock.path()).unwrap();
        assert!(content.starts_with(&std::process::id().to_string()));
    }
}
