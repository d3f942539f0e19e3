//! Feed sources.
//!
//! The digest only ever sees [`FeedEntry`] records. Each source owns the
//! adapter from its wire format into that record, so optional fields are
//! resolved once at the boundary.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::fs;
use tracing::debug;

/// One article as reported by a feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedEntry {
    /// Headline.
    pub title: String,

    /// Short summary; may be empty.
    #[serde(default)]
    pub summary: String,

    /// Link to the article.
    #[serde(default)]
    pub url: Option<String>,
}

impl FeedEntry {
    /// Create an entry without a link.
    pub fn new(title: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            summary: summary.into(),
            url: None,
        }
    }

    /// Set the link.
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Text used for the embedding: title and summary joined by a space.
    pub fn embedding_text(&self) -> String {
        if self.summary.is_empty() {
            self.title.clone()
        } else {
            format!("{} {}", self.title, self.summary)
        }
    }
}

/// Errors reported by a feed source.
#[derive(Error, Debug)]
pub enum FeedError {
    /// The request could not be sent or completed.
    #[error("{source_name}: request failed: {cause}")]
    Request { source_name: String, cause: String },

    /// The server answered with a non-success status.
    #[error("{source_name}: HTTP {status}")]
    Status { source_name: String, status: u16 },

    /// The request timed out.
    #[error("{source_name}: timed out after {timeout_secs}s")]
    Timeout {
        source_name: String,
        timeout_secs: u64,
    },

    /// The document could not be parsed.
    #[error("{source_name}: could not parse feed: {cause}")]
    Parse { source_name: String, cause: String },

    /// The snapshot file could not be read.
    #[error("{source_name}: {cause}")]
    Io { source_name: String, cause: String },
}

/// A source of feed entries.
#[async_trait]
pub trait FeedSource: Send + Sync {
    /// Name used in logs and reports.
    fn name(&self) -> &str;

    /// Fetch the current entries.
    async fn fetch(&self) -> Result<Vec<FeedEntry>, FeedError>;
}

/// JSON Feed 1.x document.
#[derive(Debug, Deserialize)]
struct JsonFeedDocument {
    items: Vec<JsonFeedItem>,
}

#[derive(Debug, Deserialize)]
struct JsonFeedItem {
    title: Option<String>,
    summary: Option<String>,
    content_text: Option<String>,
    url: Option<String>,
    external_url: Option<String>,
}

impl JsonFeedItem {
    fn into_entry(self) -> Option<FeedEntry> {
        let title = self.title?.trim().to_string();
        if title.is_empty() {
            return None;
        }
        Some(FeedEntry {
            title,
            summary: self
                .summary
                .or(self.content_text)
                .map(|s| s.trim().to_string())
                .unwrap_or_default(),
            url: self.url.or(self.external_url),
        })
    }
}

/// Accepted document shapes: a JSON Feed, or a bare list of entries.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum FeedDocument {
    JsonFeed(JsonFeedDocument),
    Entries(Vec<FeedEntry>),
}

/// Parse a feed document into entries. Items without a title are dropped.
pub fn parse_feed_document(bytes: &[u8]) -> Result<Vec<FeedEntry>, serde_json::Error> {
    let entries = match serde_json::from_slice::<FeedDocument>(bytes)? {
        FeedDocument::JsonFeed(doc) => doc
            .items
            .into_iter()
            .filter_map(JsonFeedItem::into_entry)
            .collect(),
        FeedDocument::Entries(entries) => entries
            .into_iter()
            .filter(|e| !e.title.trim().is_empty())
            .collect(),
    };
    Ok(entries)
}

/// Feed fetched over HTTP.
pub struct JsonFeedSource {
    name: String,
    url: String,
    client: reqwest::Client,
    timeout: Duration,
}

impl JsonFeedSource {
    /// Create a source for `url`, failing requests that exceed `timeout`.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, FeedError> {
        let url = url.into();
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FeedError::Request {
                source_name: url.clone(),
                cause: e.to_string(),
            })?;
        Ok(Self {
            name: url.clone(),
            url,
            client,
            timeout,
        })
    }

    /// Override the display name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

#[async_trait]
impl FeedSource for JsonFeedSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self) -> Result<Vec<FeedEntry>, FeedError> {
        debug!("Fetching feed {}", self.url);

        let request_error = |e: reqwest::Error| {
            if e.is_timeout() {
                FeedError::Timeout {
                    source_name: self.name.clone(),
                    timeout_secs: self.timeout.as_secs(),
                }
            } else {
                FeedError::Request {
                    source_name: self.name.clone(),
                    cause: e.to_string(),
                }
            }
        };

        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(request_error)?;

        if !response.status().is_success() {
            return Err(FeedError::Status {
                source_name: self.name.clone(),
                status: response.status().as_u16(),
            });
        }

        let body = response.bytes().await.map_err(request_error)?;
        parse_feed_document(&body).map_err(|e| FeedError::Parse {
            source_name: self.name.clone(),
            cause: e.to_string(),
        })
    }
}

/// Feed read from a local snapshot file.
pub struct FileFeedSource {
    name: String,
    path: PathBuf,
}

impl FileFeedSource {
    pub fn new(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        Self {
            name: path.display().to_string(),
            path,
        }
    }
}

#[async_trait]
impl FeedSource for FileFeedSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self) -> Result<Vec<FeedEntry>, FeedError> {
        let content = fs::read(&self.path).await.map_err(|e| FeedError::Io {
            source_name: self.name.clone(),
            cause: e.to_string(),
        })?;
        parse_feed_document(&content).map_err(|e| FeedError::Parse {
            source_name: self.name.clone(),
            cause: e.to_string(),
        })
    }
}

/// Fixed in-memory entries.
pub struct StaticFeedSource {
    name: String,
    entries: Vec<FeedEntry>,
}

impl StaticFeedSource {
    pub fn new(name: impl Into<String>, entries: Vec<FeedEntry>) -> Self {
        Self {
            name: name.into(),
            entries,
        }
    }
}

#[async_trait]
impl FeedSource for StaticFeedSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self) -> Result<Vec<FeedEntry>, FeedError> {
        Ok(self.entries.clone())
    }
}

/// Build a source from a location: `http(s)://` URLs are fetched, anything
/// else is read as a local file.
pub fn source_for(location: &str, timeout: Duration) -> Result<Box<dyn FeedSource>, FeedError> {
    if location.starts_with("http://") || location.starts_with("https://") {
        Ok(Box::new(JsonFeedSource::new(location, timeout)?))
    } else {
        Ok(Box::new(FileFeedSource::new(location)))
    }
}
