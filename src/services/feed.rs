// src/services/feed.rs

//! USGS CSV feed client.

use async_trait::async_trait;
use reqwest::Client;

use crate::error::{AppError, Result};
use crate::models::FeedConfig;
use crate::services::FeedSource;
use crate::utils::http;

/// Fetches the feed body with a single GET. No retries.
pub struct FeedClient {
    url: String,
    client: Client,
}

impl FeedClient {
    /// Create a feed client from configuration.
    pub fn new(config: &FeedConfig) -> Result<Self> {
        Ok(Self {
            url: config.url.clone(),
            client: http::create_client(config)?,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl FeedSource for FeedClient {
    async fn fetch(&self) -> Result<String> {
        log::debug!("GET {}", self.url);
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| AppError::fetch(&self.url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::fetch(&self.url, format!("HTTP {}", status)));
        }

        let body = response
            .text()
            .await
            .map_err(|e| AppError::fetch(&self.url, e))?;
        log::debug!("Fetched {} bytes from feed", body.len());
        Ok(body)
    }
}
