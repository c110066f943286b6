//! Service layer: the feed source and the social network publisher.
//!
//! - Feed download (`FeedClient`)
//! - Bluesky posting (`BlueskyClient`)

mod bluesky;
mod feed;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::PostReceipt;

pub use bluesky::{BlueskyClient, MAX_POST_GRAPHEMES};
pub use feed::FeedClient;

/// Source of the raw CSV feed.
#[async_trait]
pub trait FeedSource: Send + Sync {
    /// Fetch the whole feed body. Any non-success outcome is an error.
    async fn fetch(&self) -> Result<String>;
}

/// Social network account that announcements are posted to.
#[async_trait]
pub trait Publisher: Send {
    /// Establish a session. Called at most once per run.
    async fn login(&mut self, identifier: &str, password: &str) -> Result<()>;

    /// Publish `text`, attaching `link` when given.
    async fn post(&mut self, text: &str, link: Option<&str>) -> Result<PostReceipt>;
}
