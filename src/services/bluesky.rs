// src/services/bluesky.rs

//! Bluesky (AT Protocol) publisher.
//!
//! Logs in with `com.atproto.server.createSession` and posts with
//! `com.atproto.repo.createRecord`. A map link is appended to the post text
//! and marked with a link facet so it renders as a clickable URL.

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{AppError, Result};
use crate::models::{BlueskyConfig, PostReceipt};
use crate::services::Publisher;
use crate::utils::{grapheme_len, http, truncate_graphemes};

/// Bluesky's post length limit, in grapheme clusters.
pub const MAX_POST_GRAPHEMES: usize = 300;

const REQUEST_TIMEOUT_SECS: u64 = 15;
const CREATE_SESSION: &str = "xrpc/com.atproto.server.createSession";
const CREATE_RECORD: &str = "xrpc/com.atproto.repo.createRecord";
const POST_COLLECTION: &str = "app.bsky.feed.post";
const LINK_FEATURE: &str = "app.bsky.richtext.facet#link";
const LINK_LABEL: &str = "Map: ";

#[derive(Serialize)]
struct CreateSessionRequest<'a> {
    identifier: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Session {
    access_jwt: String,
    did: String,
    #[serde(default)]
    handle: String,
}

#[derive(Serialize)]
struct CreateRecordRequest<'a> {
    repo: &'a str,
    collection: &'static str,
    record: PostRecord,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
struct PostRecord {
    #[serde(rename = "$type")]
    kind: &'static str,
    text: String,
    created_at: String,
    langs: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    facets: Vec<Facet>,
}

#[derive(Debug, Serialize, PartialEq)]
struct Facet {
    index: ByteSlice,
    features: Vec<FacetFeature>,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
struct ByteSlice {
    byte_start: usize,
    byte_end: usize,
}

#[derive(Debug, Serialize, PartialEq)]
struct FacetFeature {
    #[serde(rename = "$type")]
    kind: &'static str,
    uri: String,
}

/// Error body returned by XRPC endpoints.
#[derive(Deserialize)]
struct XrpcError {
    error: String,
    #[serde(default)]
    message: Option<String>,
}

/// Publisher backed by a Bluesky account.
pub struct BlueskyClient {
    service: Url,
    language: String,
    client: Client,
    session: Option<Session>,
}

impl BlueskyClient {
    /// Create a client for the configured service. No network traffic yet.
    pub fn new(config: &BlueskyConfig) -> Result<Self> {
        let mut service = Url::parse(&config.service)?;
        if !service.path().ends_with('/') {
            let path = format!("{}/", service.path());
            service.set_path(&path);
        }
        Ok(Self {
            service,
            language: config.language.clone(),
            client: http::create_api_client(REQUEST_TIMEOUT_SECS)?,
            session: None,
        })
    }

    pub fn is_logged_in(&self) -> bool {
        self.session.is_some()
    }

    fn endpoint(&self, method: &str) -> Result<Url> {
        Ok(self.service.join(method)?)
    }
}

#[async_trait]
impl Publisher for BlueskyClient {
    async fn login(&mut self, identifier: &str, password: &str) -> Result<()> {
        let url = self.endpoint(CREATE_SESSION)?;
        let response = self
            .client
            .post(url)
            .json(&CreateSessionRequest {
                identifier,
                password,
            })
            .send()
            .await
            .map_err(AppError::auth)?;

        let session: Session = read_json(response).await.map_err(AppError::auth)?;
        log::info!("Logged in to Bluesky as {} ({})", session.handle, session.did);
        self.session = Some(session);
        Ok(())
    }

    async fn post(&mut self, text: &str, link: Option<&str>) -> Result<PostReceipt> {
        let session = self
            .session
            .as_ref()
            .ok_or_else(|| AppError::publish("not logged in"))?;

        let (text, facets) = compose(text, link);
        let request = CreateRecordRequest {
            repo: &session.did,
            collection: POST_COLLECTION,
            record: PostRecord {
                kind: POST_COLLECTION,
                text,
                created_at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
                langs: vec![self.language.clone()],
                facets,
            },
        };

        let url = self.endpoint(CREATE_RECORD)?;
        let response = self
            .client
            .post(url)
            .bearer_auth(&session.access_jwt)
            .json(&request)
            .send()
            .await
            .map_err(AppError::publish)?;

        read_json(response).await.map_err(AppError::publish)
    }
}

/// Decode a success body, or describe the XRPC error.
async fn read_json<T: DeserializeOwned>(response: reqwest::Response) -> std::result::Result<T, String> {
    let status = response.status();
    let body = response.text().await.map_err(|e| e.to_string())?;
    if !status.is_success() {
        let detail = match serde_json::from_str::<XrpcError>(&body) {
            Ok(err) => match err.message {
                Some(message) => format!("{}: {}", err.error, message),
                None => err.error,
            },
            Err(_) => body.chars().take(200).collect(),
        };
        return Err(format!("HTTP {}: {}", status, detail));
    }
    serde_json::from_str(&body).map_err(|e| format!("unexpected response: {e}"))
}

/// Build the final post text and its link facet.
///
/// The announcement is shortened if needed so that the whole post, link
/// included, fits in [`MAX_POST_GRAPHEMES`].
fn compose(text: &str, link: Option<&str>) -> (String, Vec<Facet>) {
    let Some(link) = link else {
        return (truncate_graphemes(text, MAX_POST_GRAPHEMES), Vec::new());
    };

    let tail = format!("{LINK_LABEL}{link}\n");
    let budget = MAX_POST_GRAPHEMES.saturating_sub(grapheme_len(&tail));
    let mut body = text.to_string();
    if grapheme_len(&body) > budget {
        body = truncate_graphemes(body.trim_end(), budget.saturating_sub(1));
        body.push('\n');
    }

    let byte_start = body.len() + LINK_LABEL.len();
    let byte_end = byte_start + link.len();
    body.push_str(&tail);

    let facet = Facet {
        index: ByteSlice {
            byte_start,
            byte_end,
        },
        features: vec![FacetFeature {
            kind: LINK_FEATURE,
            uri: link.to_string(),
        }],
    };
    (body, vec![facet])
}
