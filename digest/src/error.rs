//! Error types for the digest run.

use thiserror::Error;

/// Result type alias for digest operations.
pub type Result<T> = std::result::Result<T, DigestError>;

/// Errors that can occur while building a digest.
#[derive(Error, Debug)]
pub enum DigestError {
    /// Embedding error.
    #[error("embedding error: {0}")]
    Embedding(#[from] newsmorph_embeddings::EmbeddingError),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Configuration file could not be parsed.
    #[error("invalid configuration file: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// No sources were configured.
    #[error("no feed sources configured")]
    NoSources,

    /// Nothing was embedded, so there is nothing to compare.
    #[error("no items could be embedded ({items} ingested)")]
    EmptyCorpus { items: usize },

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
