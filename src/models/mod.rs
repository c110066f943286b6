// src/models/mod.rs

//! Domain models for the announcer.

mod config;
mod event;

// Re-export all public types
pub use config::{
    BlueskyConfig, Config, FeedConfig, FilterConfig, PathsConfig, RunConfig, env_keys,
};
pub use event::{EventRecord, RawRow};

/// Text ready to be published for one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Announcement {
    /// `Magnitude {mag} {place} on {date}\n`
    pub text: String,
    /// Map URL for the epicenter
    pub map_link: String,
}

/// Reference to a published post.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct PostReceipt {
    pub uri: String,
    pub cid: String,
}
