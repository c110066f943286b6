//! Persistence for announced events.
//!
//! ## Directory Structure
//!
//! ```text
//! storage/
//! ├── config.toml           # Announcer configuration
//! ├── tremors.csv           # Ledger: one row per announced event
//! └── tremors.csv.lock      # Present only while a run is active
//! ```

pub mod ledger;
pub mod lock;

// Re-export for convenience
pub use ledger::Ledger;
pub use lock::LedgerLock;
