//! # Digest
//!
//! Near-duplicate detection across news feeds. Each run pulls entries from
//! a set of feeds, embeds them through the shared embedding cache and pairs
//! every item with its most similar other item.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        Digest Engine                            │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────┐          │
//! │  │    Feed      │  │    Feed      │  │    Feed      │          │
//! │  │   Source     │  │   Source     │  │   Source     │          │
//! │  └──────────────┘  └──────────────┘  └──────────────┘          │
//! │         │                │                  │                   │
//! │         └────────────────┼──────────────────┘                   │
//! │                          ▼                                      │
//! │                  ┌──────────────┐                               │
//! │                  │ CorpusIndex  │  (deduplicated by title)      │
//! │                  └──────────────┘                               │
//! │                          │                                      │
//! │                          ▼                                      │
//! │                  ┌──────────────┐                               │
//! │                  │  Embedding   │                               │
//! │                  │    Cache     │                               │
//! │                  └──────────────┘                               │
//! │                          │                                      │
//! │                          ▼                                      │
//! │                  ┌──────────────┐                               │
//! │                  │  Neighbor    │                               │
//! │                  │   Report     │                               │
//! │                  └──────────────┘                               │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use newsmorph_digest::{DigestConfig, DigestEngine, feed::source_for};
//!
//! let config = DigestConfig::default().with_feed("https://example.com/world.json");
//! let engine = DigestEngine::from_config(&config).await?;
//! let sources = vec![source_for(&config.feeds[0], config.ingest.feed_timeout())?];
//!
//! let report = engine.run(&sources).await?;
//! print!("{}", report.render_text());
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod feed;
pub mod report;

pub use config::{CacheConfig, DigestConfig, EmbeddingConfig, EmbeddingProviderType, IngestConfig};
pub use engine::DigestEngine;
pub use error::{DigestError, Result};
pub use feed::{FeedEntry, FeedError, FeedSource, FileFeedSource, JsonFeedSource, StaticFeedSource};
pub use report::{ItemFailure, NeighborRecord, NeighborReport, RunStats, SourceFailure};

// Re-export from dependencies for convenience
pub use newsmorph_embeddings::{CacheStats, EmbeddingCache, EmbeddingProvider, ItemId};
