//! Embedding providers.
//!
//! A provider turns `(model, prompt)` into a fixed-length vector. Calls are
//! slow and rate limited, which is why [`crate::EmbeddingCache`] sits in
//! front of every provider.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::Embedding;
use crate::error::{EmbeddingError, Result};

/// Default Ollama endpoint.
pub const OLLAMA_DEFAULT_URL: &str = "http://localhost:11434";

/// Default request timeout for provider calls.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Trait for embedding providers.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Get the name of this provider.
    fn name(&self) -> &str;

    /// Get the default model for this provider.
    fn default_model(&self) -> &str;

    /// Generate an embedding for `prompt` with `model`.
    async fn embed(&self, model: &str, prompt: &str) -> Result<Embedding>;
}

/// Build the HTTP client shared by the HTTP providers.
fn http_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| EmbeddingError::ProviderNotConfigured(format!("http client: {e}")))
}

/// Map a transport error, keeping timeouts distinct from other failures.
fn transport_error(err: reqwest::Error, timeout: Duration) -> EmbeddingError {
    if err.is_timeout() {
        EmbeddingError::Timeout {
            timeout_secs: timeout.as_secs(),
        }
    } else {
        EmbeddingError::from(err)
    }
}

/// Turn a non-success HTTP response into a provider error.
async fn status_error(response: reqwest::Response) -> EmbeddingError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    EmbeddingError::Provider {
        status: Some(status),
        cause: if body.is_empty() {
            "empty error body".to_string()
        } else {
            body
        },
    }
}

/// Embedding provider backed by a local Ollama server.
pub struct OllamaProvider {
    base_url: String,
    client: reqwest::Client,
    default_model: String,
    timeout: Duration,
}

impl OllamaProvider {
    /// Create a provider for `base_url` with a per-request timeout.
    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: http_client(timeout)?,
            default_model: "llama2".to_string(),
            timeout,
        })
    }
}

#[derive(Debug, Deserialize)]
struct OllamaEmbeddingResponse {
    embedding: Vec<f32>,
}

#[async_trait]
impl EmbeddingProvider for OllamaProvider {
    fn name(&self) -> &str {
        "ollama"
    }

    fn default_model(&self) -> &str {
        &self.default_model
    }

    async fn embed(&self, model: &str, prompt: &str) -> Result<Embedding> {
        debug!("Requesting ollama embedding with model: {model}");

        let body = serde_json::json!({
            "model": model,
            "prompt": prompt,
        });

        let response = self
            .client
            .post(format!("{}/api/embeddings", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(e, self.timeout))?;

        if !response.status().is_success() {
            return Err(status_error(response).await);
        }

        let result: OllamaEmbeddingResponse = response
            .json()
            .await
            .map_err(|e| EmbeddingError::InvalidResponse(e.to_string()))?;

        if result.embedding.is_empty() {
            return Err(EmbeddingError::InvalidResponse(
                "empty embedding in response".to_string(),
            ));
        }

        Ok(result.embedding)
    }
}

/// OpenAI embedding provider.
pub struct OpenAIProvider {
    api_key: Option<String>,
    base_url: String,
    client: reqwest::Client,
    default_model: String,
    timeout: Duration,
}

impl OpenAIProvider {
    /// Create a provider reading its key from `OPENAI_API_KEY`.
    pub fn new() -> Result<Self> {
        Ok(Self {
            api_key: std::env::var("OPENAI_API_KEY").ok(),
            base_url: "https://api.openai.com/v1".to_string(),
            client: http_client(DEFAULT_TIMEOUT)?,
            default_model: "text-embedding-3-small".to_string(),
            timeout: DEFAULT_TIMEOUT,
        })
    }

    /// Set the API key.
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Set the base URL.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Set the per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self> {
        self.client = http_client(timeout)?;
        self.timeout = timeout;
        Ok(self)
    }
}

/// OpenAI API response format.
#[derive(Debug, Deserialize)]
struct OpenAIEmbeddingResponse {
    data: Vec<OpenAIEmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct OpenAIEmbeddingData {
    embedding: Vec<f32>,
}

#[async_trait]
impl EmbeddingProvider for OpenAIProvider {
    fn name(&self) -> &str {
        "openai"
    }

    fn default_model(&self) -> &str {
        &self.default_model
    }

    async fn embed(&self, model: &str, prompt: &str) -> Result<Embedding> {
        let api_key = self.api_key.as_ref().ok_or_else(|| {
            EmbeddingError::ProviderNotConfigured("OPENAI_API_KEY is not set".to_string())
        })?;

        debug!("Requesting openai embedding with model: {model}");

        let body = serde_json::json!({
            "input": prompt,
            "model": model,
        });

        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .header("Authorization", format!("Bearer {api_key}"))
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(e, self.timeout))?;

        if !response.status().is_success() {
            return Err(status_error(response).await);
        }

        let result: OpenAIEmbeddingResponse = response
            .json()
            .await
            .map_err(|e| EmbeddingError::InvalidResponse(e.to_string()))?;

        result
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| EmbeddingError::InvalidResponse("no embedding in response".to_string()))
    }
}
