//! Embedding cache for avoiding redundant provider calls.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::Embedding;
use crate::error::{EmbeddingError, Result};
use crate::provider::EmbeddingProvider;
use crate::store::{CacheEntry, CacheStore, cache_key};

/// Cache-aside memoization of [`EmbeddingProvider`] calls.
///
/// Every miss is written to the backing [`CacheStore`] before the vector is
/// returned; a failed write is logged and the vector is still returned.
/// Failed provider calls are never stored. Concurrent calls for the
/// same key wait on a key-local lock so only one of them reaches the
/// provider.
pub struct EmbeddingCache {
    provider: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn CacheStore>,
    in_flight: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    counters: Counters,
}

#[derive(Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    provider_failures: AtomicU64,
    corrupt_entries: AtomicU64,
}

impl EmbeddingCache {
    /// Create a cache over `store` that fills misses from `provider`.
    pub fn new(provider: Arc<dyn EmbeddingProvider>, store: Arc<dyn CacheStore>) -> Self {
        Self {
            provider,
            store,
            in_flight: Mutex::new(HashMap::new()),
            counters: Counters::default(),
        }
    }

    /// Return the embedding for `(model, prompt)`, computing it on a miss.
    pub async fn get_or_compute(&self, model: &str, prompt: &str) -> Result<Embedding> {
        let key = cache_key(model, prompt);

        if let Some(embedding) = self.lookup(&key, false).await {
            return Ok(embedding);
        }

        let guard = self.key_lock(&key).await;
        let result = {
            let _held = guard.lock().await;

            // Another caller may have filled the entry while we waited.
            match self.lookup(&key, true).await {
                Some(embedding) => Ok(embedding),
                None => self.compute(&key, model, prompt).await,
            }
        };
        self.release_key(&key, guard).await;

        result
    }

    /// Whether `(model, prompt)` is already stored.
    pub async fn contains(&self, model: &str, prompt: &str) -> bool {
        matches!(self.store.get(&cache_key(model, prompt)).await, Ok(Some(_)))
    }

    /// Drop the stored entry for `(model, prompt)`.
    pub async fn evict(&self, model: &str, prompt: &str) -> Result<bool> {
        let key = cache_key(model, prompt);
        let removed = self.store.remove(&key).await?;
        if removed {
            debug!("Evicted cache entry {key}");
        }
        Ok(removed)
    }

    /// Get cache statistics.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            provider_failures: self.counters.provider_failures.load(Ordering::Relaxed),
            corrupt_entries: self.counters.corrupt_entries.load(Ordering::Relaxed),
        }
    }

    /// Read `key` from the store, treating unreadable entries as misses.
    ///
    /// Corruption is counted only when `record_corruption` is set, so the
    /// unlocked fast path and the locked re-check count an entry once.
    async fn lookup(&self, key: &str, record_corruption: bool) -> Option<Embedding> {
        match self.store.get(key).await {
            Ok(Some(entry)) => {
                self.counters.hits.fetch_add(1, Ordering::Relaxed);
                debug!("Cache hit for {key}");
                Some(entry.embedding)
            }
            Ok(None) => None,
            Err(EmbeddingError::CacheCorruption { key, reason }) => {
                if record_corruption {
                    self.counters.corrupt_entries.fetch_add(1, Ordering::Relaxed);
                    warn!("Ignoring corrupt cache entry {key}: {reason}");
                }
                None
            }
            Err(e) => {
                warn!("Cache lookup failed for {key}: {e}");
                None
            }
        }
    }

    async fn compute(&self, key: &str, model: &str, prompt: &str) -> Result<Embedding> {
        self.counters.misses.fetch_add(1, Ordering::Relaxed);
        debug!("Cache miss for {key}, calling {}", self.provider.name());

        let embedding = match self.provider.embed(model, prompt).await {
            Ok(embedding) => embedding,
            Err(e) => {
                self.counters.provider_failures.fetch_add(1, Ordering::Relaxed);
                return Err(e);
            }
        };

        let entry = CacheEntry::new(model, prompt, embedding);
        if let Err(e) = self.store.put(&entry).await {
            warn!("Could not persist cache entry {key}: {e}");
        }

        Ok(entry.embedding)
    }

    async fn key_lock(&self, key: &str) -> Arc<Mutex<()>> {
        let mut in_flight = self.in_flight.lock().await;
        in_flight
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    async fn release_key(&self, key: &str, guard: Arc<Mutex<()>>) {
        let mut in_flight = self.in_flight.lock().await;
        drop(guard);
        // Only the map still holds the lock once every waiter has finished.
        if in_flight
            .get(key)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            in_flight.remove(key);
        }
    }
}

/// Statistics about the embedding cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Lookups answered from the store.
    pub hits: u64,

    /// Lookups that went to the provider.
    pub misses: u64,

    /// Provider calls that failed.
    pub provider_failures: u64,

    /// Unreadable entries that were recomputed.
    pub corrupt_entries: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{DiskStore, MemoryStore};
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;
    use tempfile::TempDir;

    /// Returns `[len(prompt), 1.0]`, counting calls; fails while `failures_left > 0`.
    struct CountingProvider {
        calls: AtomicUsize,
        failures_left: AtomicUsize,
        delay: Duration,
    }

    impl CountingProvider {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                failures_left: AtomicUsize::new(0),
                delay: Duration::ZERO,
            }
        }

        fn failing(times: usize) -> Self {
            let provider = Self::new();
            provider.failures_left.store(times, Ordering::SeqCst);
            provider
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl EmbeddingProvider for CountingProvider {
        fn name(&self) -> &str {
            "counting"
        }

        fn default_model(&self) -> &str {
            "test-model"
        }

        async fn embed(&self, _model: &str, prompt: &str) -> Result<Embedding> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if self
                .failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(EmbeddingError::Provider {
                    status: Some(503),
                    cause: "unavailable".to_string(),
                });
            }
            Ok(vec![prompt.len() as f32, 1.0])
        }
    }

    fn memory_cache(provider: Arc<CountingProvider>) -> EmbeddingCache {
        EmbeddingCache::new(provider, Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn test_second_call_is_a_hit() {
        let provider = Arc::new(CountingProvider::new());
        let cache = memory_cache(provider.clone());

        let first = cache.get_or_compute("m", "hello").await.unwrap();
        let second = cache.get_or_compute("m", "hello").await.unwrap();

        assert_eq!(first, second);
        assert_eq!(provider.calls(), 1);
        assert_eq!(
            cache.stats(),
            CacheStats {
                hits: 1,
                misses: 1,
                provider_failures: 0,
                corrupt_entries: 0,
            }
        );
    }

    #[tokio::test]
    async fn test_model_is_part_of_the_key() {
        let provider = Arc::new(CountingProvider::new());
        let cache = memory_cache(provider.clone());

        cache.get_or_compute("a", "hello").await.unwrap();
        cache.get_or_compute("b", "hello").await.unwrap();

        assert_eq!(provider.calls(), 2);
    }

    #[tokio::test]
    async fn test_failure_is_not_cached() {
        let provider = Arc::new(CountingProvider::failing(1));
        let cache = memory_cache(provider.clone());

        let err = cache.get_or_compute("m", "hello").await.unwrap_err();
        assert!(err.is_recoverable());
        assert!(!cache.contains("m", "hello").await);

        let embedding = cache.get_or_compute("m", "hello").await.unwrap();
        assert_eq!(embedding, vec![5.0, 1.0]);
        assert_eq!(provider.calls(), 2);
        assert_eq!(cache.stats().provider_failures, 1);
    }

    #[tokio::test]
    async fn test_concurrent_same_key_calls_provider_once() {
        let provider = Arc::new(CountingProvider {
            delay: Duration::from_millis(50),
            ..CountingProvider::new()
        });
        let cache = Arc::new(memory_cache(provider.clone()));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let cache = cache.clone();
                tokio::spawn(async move { cache.get_or_compute("m", "same").await })
            })
            .collect();

        for task in tasks {
            assert_eq!(task.await.unwrap().unwrap(), vec![4.0, 1.0]);
        }
        assert_eq!(provider.calls(), 1);
        assert!(cache.in_flight.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_persisted_across_instances() {
        let temp_dir = TempDir::new().unwrap();
        let provider = Arc::new(CountingProvider::new());

        {
            let store = Arc::new(DiskStore::open(temp_dir.path()).await.unwrap());
            let cache = EmbeddingCache::new(provider.clone(), store);
            cache.get_or_compute("m", "hello").await.unwrap();
        }

        let store = Arc::new(DiskStore::open(temp_dir.path()).await.unwrap());
        let cache = EmbeddingCache::new(provider.clone(), store);
        assert_eq!(
            cache.get_or_compute("m", "hello").await.unwrap(),
            vec![5.0, 1.0]
        );
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn test_corrupt_entry_is_recomputed() {
        let temp_dir = TempDir::new().unwrap();
        let provider = Arc::new(CountingProvider::new());
        let store = Arc::new(DiskStore::open(temp_dir.path()).await.unwrap());
        let cache = EmbeddingCache::new(provider.clone(), store.clone());

        cache.get_or_compute("m", "hello").await.unwrap();
        std::fs::write(store.entry_path(&cache_key("m", "hello")), b"garbage").unwrap();

        let embedding = cache.get_or_compute("m", "hello").await.unwrap();
        assert_eq!(embedding, vec![5.0, 1.0]);
        assert_eq!(provider.calls(), 2);
        assert_eq!(cache.stats().corrupt_entries, 1);

        // The rewritten entry is readable again.
        cache.get_or_compute("m", "hello").await.unwrap();
        assert_eq!(provider.calls(), 2);
    }

    #[tokio::test]
    async fn test_evict_forces_recompute() {
        let provider = Arc::new(CountingProvider::new());
        let cache = memory_cache(provider.clone());

        cache.get_or_compute("m", "hello").await.unwrap();
        assert!(cache.evict("m", "hello").await.unwrap());
        assert!(!cache.evict("m", "hello").await.unwrap());
        cache.get_or_compute("m", "hello").await.unwrap();

        assert_eq!(provider.calls(), 2);
    }

    /// Accepts reads but refuses every write.
    struct ReadOnlyStore;

    #[async_trait]
    impl CacheStore for ReadOnlyStore {
        async fn get(&self, _key: &str) -> Result<Option<CacheEntry>> {
            Ok(None)
        }

        async fn put(&self, _entry: &CacheEntry) -> Result<()> {
            Err(EmbeddingError::Cache("disk full".to_string()))
        }

        async fn remove(&self, _key: &str) -> Result<bool> {
            Ok(false)
        }
    }

    #[tokio::test]
    async fn test_failed_write_still_returns_embedding() {
        let provider = Arc::new(CountingProvider::new());
        let cache = EmbeddingCache::new(provider.clone(), Arc::new(ReadOnlyStore));

        assert_eq!(
            cache.get_or_compute("m", "hello").await.unwrap(),
            vec![5.0, 1.0]
        );
        assert_eq!(cache.stats().misses, 1);
        assert_eq!(cache.stats().provider_failures, 0);
    }
}
