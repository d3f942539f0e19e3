//! Error types for the embeddings system.

use thiserror::Error;

/// Result type alias for embedding operations.
pub type Result<T> = std::result::Result<T, EmbeddingError>;

/// Errors that can occur in the embeddings system.
#[derive(Error, Debug)]
pub enum EmbeddingError {
    /// Provider not configured (missing API key, etc.).
    #[error("embedding provider not configured: {0}")]
    ProviderNotConfigured(String),

    /// The provider answered with an error or could not be reached.
    #[error("provider request failed (status {status:?}): {cause}")]
    Provider {
        /// HTTP status, when the provider answered at all.
        status: Option<u16>,
        /// What went wrong.
        cause: String,
    },

    /// The provider did not answer in time.
    #[error("provider request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    /// Invalid response from provider.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Zero-norm or non-finite vector; it has no direction to normalize.
    #[error("degenerate embedding vector (norm {norm})")]
    DegenerateVector { norm: f32 },

    /// Dimension mismatch.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// A vector that should be unit length is not.
    #[error("vector is not normalized (norm {norm})")]
    NotNormalized { norm: f32 },

    /// Unknown corpus item.
    #[error("unknown corpus item: {0}")]
    UnknownItem(usize),

    /// A persisted cache entry could not be read back.
    #[error("corrupt cache entry {key}: {reason}")]
    CacheCorruption { key: String, reason: String },

    /// Cache backend error.
    #[error("cache error: {0}")]
    Cache(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl EmbeddingError {
    /// Whether a later retry of the same call could succeed.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Provider { .. } | Self::Timeout { .. } | Self::InvalidResponse(_)
        )
    }
}

impl From<reqwest::Error> for EmbeddingError {
    fn from(err: reqwest::Error) -> Self {
        Self::Provider {
            status: err.status().map(|s| s.as_u16()),
            cause: err.to_string(),
        }
    }
}
