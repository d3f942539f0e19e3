//! Configuration for a digest run.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{DigestError, Result};

/// Configuration for a digest run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DigestConfig {
    /// Feed locations: `http(s)://` URLs or local snapshot files.
    pub feeds: Vec<String>,

    /// Embedding provider configuration.
    pub embedding: EmbeddingConfig,

    /// Cache configuration.
    pub cache: CacheConfig,

    /// Ingestion configuration.
    pub ingest: IngestConfig,
}

impl DigestConfig {
    /// Load a configuration file. Missing fields take their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| DigestError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml(&content)
    }

    /// Parse a configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Default location of the configuration file.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("newsmorph").join("config.toml"))
    }

    /// Add a feed location.
    pub fn with_feed(mut self, feed: impl Into<String>) -> Self {
        self.feeds.push(feed.into());
        self
    }
}

/// Read a feeds list: one location per line, blank lines and `#` comments
/// ignored.
pub fn load_feeds_file(path: impl AsRef<Path>) -> Result<Vec<String>> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)
        .map_err(|e| DigestError::Config(format!("{}: {e}", path.display())))?;
    Ok(parse_feeds_list(&content))
}

fn parse_feeds_list(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

/// Configuration for the embedding provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Which provider to use.
    pub provider: EmbeddingProviderType,

    /// Model to use; the provider's default when unset.
    pub model: Option<String>,

    /// Endpoint override.
    pub base_url: Option<String>,

    /// Environment variable holding the API key (OpenAI only).
    pub api_key_env: String,

    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

impl EmbeddingConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProviderType::Ollama,
            model: None,
            base_url: None,
            api_key_env: "OPENAI_API_KEY".to_string(),
            timeout_secs: 60,
        }
    }
}

/// Type of embedding provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingProviderType {
    /// Local Ollama server.
    Ollama,
    /// OpenAI embeddings API.
    #[serde(rename = "openai")]
    OpenAI,
}

/// Configuration for the embedding cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Persist embeddings across runs.
    pub enabled: bool,

    /// Directory for persisted entries.
    pub dir: PathBuf,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: dirs::cache_dir()
                .unwrap_or_default()
                .join("newsmorph/embeddings"),
        }
    }
}

/// Configuration for feed ingestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Embedding requests in flight at once.
    pub concurrency: usize,

    /// Cap on the number of corpus items.
    pub max_items: Option<usize>,

    /// Per-feed fetch timeout in seconds.
    pub feed_timeout_secs: u64,
}

impl IngestConfig {
    pub fn feed_timeout(&self) -> Duration {
        Duration::from_secs(self.feed_timeout_secs)
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            max_items: None,
            feed_timeout_secs: 30,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = DigestConfig::default();

        assert!(config.feeds.is_empty());
        assert_eq!(config.embedding.provider, EmbeddingProviderType::Ollama);
        assert_eq!(config.embedding.timeout(), Duration::from_secs(60));
        assert!(config.cache.enabled);
        assert_eq!(config.ingest.concurrency, 4);
        assert_eq!(config.ingest.max_items, None);
    }

    #[test]
    fn test_partial_toml() {
        let config = DigestConfig::from_toml(
            r#"
            feeds = ["https://example.com/world.json", "snapshots/us.json"]

            [embedding]
            provider = "openai"
            model = "text-embedding-3-small"

            [ingest]
            max_items = 15
            "#,
        )
        .unwrap();

        assert_eq!(config.feeds.len(), 2);
        assert_eq!(config.embedding.provider, EmbeddingProviderType::OpenAI);
        assert_eq!(
            config.embedding.model.as_deref(),
            Some("text-embedding-3-small")
        );
        assert_eq!(config.embedding.timeout_secs, 60);
        assert_eq!(config.ingest.max_items, Some(15));
        assert_eq!(config.ingest.concurrency, 4);
    }

    #[test]
    fn test_with_feed_appends() {
        let config = DigestConfig::from_toml("feeds = [\"a.json\"]")
            .unwrap()
            .with_feed("https://example.com/world.json");

        assert_eq!(
            config.feeds,
            vec!["a.json".to_string(), "https://example.com/world.json".to_string()]
        );
    }

    #[test]
    fn test_invalid_toml() {
        let err = DigestConfig::from_toml("[embedding]\nprovider = \"nope\"").unwrap_err();
        assert!(matches!(err, DigestError::ConfigParse(_)));
    }

    #[test]
    fn test_load_missing_file() {
        let err = DigestConfig::load("/definitely/not/here.toml").unwrap_err();
        assert!(matches!(err, DigestError::Config(_)));
    }

    #[test]
    fn test_feeds_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("rss_feeds.txt");
        std::fs::write(
            &path,
            "https://example.com/world.json\n\n  # paused\n   snapshots/us.json  \n",
        )
        .unwrap();

        assert_eq!(
            load_feeds_file(&path).unwrap(),
            vec![
                "https://example.com/world.json".to_string(),
                "snapshots/us.json".to_string(),
            ]
        );
    }
}
