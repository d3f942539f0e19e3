//! # Embeddings
//!
//! Embedding generation, memoization and nearest-neighbor similarity for
//! the newsmorph digest.
//!
//! ## Features
//!
//! - **Providers**: Ollama and OpenAI embedding endpoints behind one trait
//! - **Caching**: Durable cache-aside memoization keyed by model and prompt
//! - **Corpus**: Title-deduplicated, insertion-ordered text items
//! - **Similarity**: One all-pairs matrix per corpus, ranked neighbors per row
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    Embeddings System                            │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  EmbeddingProvider ──► EmbeddingCache ──► normalize            │
//! │       │                    │                  │                 │
//! │       ▼                    ▼                  ▼                 │
//! │  Ollama/OpenAI         CacheStore        CorpusIndex           │
//! │                                               │                 │
//! │                                               ▼                 │
//! │                                        SimilarityMatrix         │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod cache;
pub mod error;
pub mod index;
pub mod provider;
pub mod similarity;
pub mod store;

pub use cache::{CacheStats, EmbeddingCache};
pub use error::{EmbeddingError, Result};
pub use index::{CorpusIndex, ItemId, TextItem};
pub use provider::{EmbeddingProvider, OllamaProvider, OpenAIProvider};
pub use similarity::{Neighbor, SimilarityMatrix, cosine_similarity, dot_product, normalize};
pub use store::{CacheEntry, CacheStore, DiskStore, MemoryStore};

/// A dense vector embedding.
pub type Embedding = Vec<f32>;
