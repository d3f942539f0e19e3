//! Durable key-value storage behind the embedding cache.
//!
//! Entries are immutable once written. [`DiskStore`] keeps one JSON file per
//! entry so a single unreadable file never takes the rest of the cache with
//! it.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::fs;
use tokio::sync::RwLock;
use tracing::debug;

use crate::Embedding;
use crate::error::{EmbeddingError, Result};

/// Compute the cache key for a `(model, prompt)` pair.
///
/// The NUL separator keeps `("ab", "c")` and `("a", "bc")` apart.
pub fn cache_key(model: &str, prompt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(model.as_bytes());
    hasher.update([0u8]);
    hasher.update(prompt.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// A persisted embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Key derived from model and prompt.
    pub key: String,

    /// Model used to generate the embedding.
    pub model: String,

    /// The raw (un-normalized) embedding.
    pub embedding: Embedding,

    /// When the entry was written.
    pub created_at: DateTime<Utc>,
}

impl CacheEntry {
    /// Create an entry for `(model, prompt)`.
    pub fn new(model: &str, prompt: &str, embedding: Embedding) -> Self {
        Self {
            key: cache_key(model, prompt),
            model: model.to_string(),
            embedding,
            created_at: Utc::now(),
        }
    }
}

/// Point-lookup storage for cache entries.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Look up an entry. A present but unreadable entry is
    /// [`EmbeddingError::CacheCorruption`].
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>>;

    /// Insert (or replace) an entry.
    async fn put(&self, entry: &CacheEntry) -> Result<()>;

    /// Remove an entry. Returns whether it existed.
    async fn remove(&self, key: &str) -> Result<bool>;
}

/// In-memory store. Nothing survives the process.
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn put(&self, entry: &CacheEntry) -> Result<()> {
        self.entries
            .write()
            .await
            .insert(entry.key.clone(), entry.clone());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<bool> {
        Ok(self.entries.write().await.remove(key).is_some())
    }
}

/// One JSON file per entry under `root/<2 hex chars>/<key>.json`.
pub struct DiskStore {
    root: PathBuf,
}

impl DiskStore {
    /// Open (creating if needed) a store rooted at `root`.
    pub async fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).await.map_err(|e| {
            EmbeddingError::Cache(format!("failed to create {}: {e}", root.display()))
        })?;
        Ok(Self { root })
    }

    /// Root directory of the store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the file holding `key`.
    pub fn entry_path(&self, key: &str) -> PathBuf {
        let shard = key.get(..2).unwrap_or("00");
        self.root.join(shard).join(format!("{key}.json"))
    }
}

#[async_trait]
impl CacheStore for DiskStore {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>> {
        let path = self.entry_path(key);
        let content = match fs::read(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(EmbeddingError::CacheCorruption {
                    key: key.to_string(),
                    reason: format!("{}: {e}", path.display()),
                });
            }
        };

        let entry: CacheEntry =
            serde_json::from_slice(&content).map_err(|e| EmbeddingError::CacheCorruption {
                key: key.to_string(),
                reason: e.to_string(),
            })?;

        if entry.key != key || entry.embedding.is_empty() {
            return Err(EmbeddingError::CacheCorruption {
                key: key.to_string(),
                reason: "entry does not match its key".to_string(),
            });
        }

        Ok(Some(entry))
    }

    async fn put(&self, entry: &CacheEntry) -> Result<()> {
        let path = self.entry_path(&entry.key);
        let content = serde_json::to_vec(entry)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        // Write atomically using a temp file private to this writer
        let temp_path = temp_path_for(&path);
        fs::write(&temp_path, &content).await.map_err(|e| {
            EmbeddingError::Cache(format!("failed to write {}: {e}", temp_path.display()))
        })?;
        fs::rename(&temp_path, &path).await.map_err(|e| {
            EmbeddingError::Cache(format!("failed to write {}: {e}", path.display()))
        })?;

        debug!("Persisted cache entry {}", entry.key);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<bool> {
        match fs::remove_file(self.entry_path(key)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Temp file beside `path`, unique per process and per write.
fn temp_path_for(path: &Path) -> PathBuf {
    let n = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    path.with_extension(format!("json.{}.{n}.tmp", std::process::id()))
}
