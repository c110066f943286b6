//! Pipeline stages for one announcer run.
//!
//! - `filter`: Parse the feed CSV and keep qualifying events
//! - `format`: Render an event as announcement text plus map link
//! - `announce`: Drive fetch, dedup, publish and record

pub mod announce;
pub mod filter;
pub mod format;

pub use announce::{Announcer, RunSummary};
pub use filter::{parse_and_filter, parse_and_filter_with_stats, FilterStats, Rejection};
pub use format::{format_event, map_link};
