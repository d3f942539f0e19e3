//! Digest engine: feeds in, neighbor report out.

use std::sync::Arc;

use futures::StreamExt;
use futures::future::join_all;
use futures::stream;
use tracing::{debug, info, warn};

use newsmorph_embeddings::provider::OLLAMA_DEFAULT_URL;
use newsmorph_embeddings::{
    CacheStore, CorpusIndex, DiskStore, EmbeddingCache, EmbeddingProvider, ItemId, MemoryStore,
    OllamaProvider, OpenAIProvider, SimilarityMatrix, normalize,
};

use crate::config::{DigestConfig, EmbeddingProviderType};
use crate::error::{DigestError, Result};
use crate::feed::{FeedEntry, FeedSource};
use crate::report::{ItemFailure, NeighborRecord, NeighborReport, SourceFailure};

/// Builds the neighbor report for a set of feed sources.
///
/// A run goes through three phases:
/// - every source is fetched concurrently, then ingested in source order
/// - new items are embedded with bounded concurrency through the cache
/// - the similarity matrix is built once and every item is ranked
///
/// Failures of single sources or items are recorded in the report and the
/// run carries on. Only a run that embeds nothing at all fails.
pub struct DigestEngine {
    cache: Arc<EmbeddingCache>,
    model: String,
    concurrency: usize,
    max_items: Option<usize>,
}

impl DigestEngine {
    /// Create an engine over an existing cache.
    pub fn new(cache: Arc<EmbeddingCache>, model: impl Into<String>) -> Self {
        Self {
            cache,
            model: model.into(),
            concurrency: 4,
            max_items: None,
        }
    }

    /// Build the provider, store and cache described by `config`.
    pub async fn from_config(config: &DigestConfig) -> Result<Self> {
        let embedding = &config.embedding;

        let provider: Arc<dyn EmbeddingProvider> = match embedding.provider {
            EmbeddingProviderType::Ollama => {
                let base_url = embedding
                    .base_url
                    .clone()
                    .unwrap_or_else(|| OLLAMA_DEFAULT_URL.to_string());
                Arc::new(OllamaProvider::with_timeout(base_url, embedding.timeout())?)
            }
            EmbeddingProviderType::OpenAI => {
                let mut provider = OpenAIProvider::new()?.with_timeout(embedding.timeout())?;
                if let Ok(key) = std::env::var(&embedding.api_key_env) {
                    provider = provider.with_api_key(key);
                }
                if let Some(base_url) = &embedding.base_url {
                    provider = provider.with_base_url(base_url.clone());
                }
                Arc::new(provider)
            }
        };

        let store: Arc<dyn CacheStore> = if config.cache.enabled {
            info!("Embedding cache at {}", config.cache.dir.display());
            Arc::new(DiskStore::open(&config.cache.dir).await?)
        } else {
            info!("Embedding cache disabled; embeddings live for this run only");
            Arc::new(MemoryStore::new())
        };

        let model = embedding
            .model
            .clone()
            .unwrap_or_else(|| provider.default_model().to_string());

        let cache = Arc::new(EmbeddingCache::new(provider, store));

        Ok(Self::new(cache, model)
            .with_concurrency(config.ingest.concurrency)
            .with_max_items(config.ingest.max_items))
    }

    /// Set how many embedding requests may be in flight at once.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Cap the corpus size.
    pub fn with_max_items(mut self, max_items: Option<usize>) -> Self {
        self.max_items = max_items;
        self
    }

    /// Model used for every embedding.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// The shared embedding cache.
    pub fn cache(&self) -> &Arc<EmbeddingCache> {
        &self.cache
    }

    /// Run the whole pipeline over `sources`.
    pub async fn run(&self, sources: &[Box<dyn FeedSource>]) -> Result<NeighborReport> {
        if sources.is_empty() {
            return Err(DigestError::NoSources);
        }

        let mut report = NeighborReport::default();
        let mut corpus = CorpusIndex::new();

        let added = self.ingest(sources, &mut corpus, &mut report).await;
        info!(
            "Ingested {} items from {} sources ({} duplicates)",
            corpus.len(),
            report.stats.sources_ok,
            report.stats.duplicates
        );

        self.embed(&added, &mut corpus, &mut report).await;
        report.stats.items = corpus.len();
        report.stats.embedded = corpus.embedded_len();

        if report.stats.embedded == 0 {
            return Err(DigestError::EmptyCorpus {
                items: corpus.len(),
            });
        }

        report.records = rank(&corpus)?;
        report.cache = self.cache.stats();

        info!(
            "Ranked {} of {} items (cache: {} hits, {} misses)",
            report.records.len(),
            corpus.len(),
            report.cache.hits,
            report.cache.misses
        );

        Ok(report)
    }

    /// Fetch every source and add its entries to `corpus`.
    ///
    /// Returns the ids of newly added items in insertion order.
    async fn ingest(
        &self,
        sources: &[Box<dyn FeedSource>],
        corpus: &mut CorpusIndex,
        report: &mut NeighborReport,
    ) -> Vec<ItemId> {
        let fetched = join_all(sources.iter().map(|source| async move {
            (source.name().to_string(), source.fetch().await)
        }))
        .await;

        let mut added = Vec::new();

        for (name, result) in fetched {
            let entries = match result {
                Ok(entries) => entries,
                Err(e) => {
                    warn!("Skipping feed {name}: {e}");
                    report.stats.sources_failed += 1;
                    report.source_failures.push(SourceFailure {
                        source: name,
                        error: e.to_string(),
                    });
                    continue;
                }
            };

            debug!("Feed {name} returned {} entries", entries.len());
            report.stats.sources_ok += 1;
            report.stats.entries_seen += entries.len();

            for entry in entries {
                if corpus.contains_title(&entry.title) {
                    report.stats.duplicates += 1;
                    continue;
                }
                if self.max_items.is_some_and(|max| corpus.len() >= max) {
                    report.stats.capped += 1;
                    continue;
                }
                match add_entry(corpus, entry, &name) {
                    Some(id) => added.push(id),
                    None => report.stats.duplicates += 1,
                }
            }
        }

        added
    }

    /// Embed and normalize `ids`, storing each vector in `corpus`.
    async fn embed(&self, ids: &[ItemId], corpus: &mut CorpusIndex, report: &mut NeighborReport) {
        let jobs: Vec<(ItemId, String)> = ids
            .iter()
            .filter_map(|&id| corpus.get(id).map(|item| (id, item.body.clone())))
            .collect();

        let results: Vec<_> = stream::iter(jobs)
            .map(|(id, body)| {
                let cache = self.cache.clone();
                let model = self.model.as_str();
                async move {
                    let vector = cache
                        .get_or_compute(model, &body)
                        .await
                        .and_then(|raw| normalize(&raw));
                    (id, vector)
                }
            })
            .buffered(self.concurrency)
            .collect()
            .await;

        for (id, vector) in results {
            let stored = vector.and_then(|v| corpus.set_vector(id, v));
            let title = corpus.get(id).map(|item| item.title.clone()).unwrap_or_default();

            match stored {
                Ok(()) => debug!("{id} {title}"),
                Err(e) => {
                    warn!("Could not embed item {id} ({title}): {e}");
                    report.item_failures.push(ItemFailure {
                        item_id: id,
                        title,
                        error: e.to_string(),
                    });
                }
            }
        }
    }
}

fn add_entry(corpus: &mut CorpusIndex, entry: FeedEntry, source: &str) -> Option<ItemId> {
    let body = entry.embedding_text();
    corpus.add_with_origin(entry.title, body, entry.url, Some(source.to_string()))
}

/// Build the similarity matrix once over every embedded item and pick each
/// item's nearest distinct neighbor.
pub fn rank(corpus: &CorpusIndex) -> Result<Vec<NeighborRecord>> {
    let embedded = corpus.vectors();
    let ids: Vec<ItemId> = embedded.iter().map(|(id, _)| *id).collect();
    let vectors: Vec<&[f32]> = embedded.iter().map(|(_, v)| *v).collect();

    let matrix = SimilarityMatrix::build(&vectors)?;

    let mut records = Vec::with_capacity(ids.len());
    for (row, &item_id) in ids.iter().enumerate() {
        let Some(neighbor) = matrix.top_neighbor(row) else {
            debug!("Item {item_id} has no other item to compare with");
            continue;
        };

        let neighbor_id = ids[neighbor.index];
        let (Some(item), Some(other)) = (corpus.get(item_id), corpus.get(neighbor_id)) else {
            continue;
        };

        records.push(NeighborRecord {
            item_id,
            title: item.title.clone(),
            url: item.url.clone(),
            neighbor_id,
            neighbor_title: other.title.clone(),
            score: neighbor.score,
        });
    }

    Ok(records)
}
