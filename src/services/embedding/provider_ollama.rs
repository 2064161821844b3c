//! Ollama Embedding Provider
//!
//! Implements the `EmbeddingProvider` trait for Ollama local embedding models
//! using the `ollama-rs` native SDK. Requires a running Ollama server but no
//! API key.
//!
//! ## Default Model
//!
//! Uses `all-minilm` (384-dimensional), matching the width the memory bank
//! stores. Models of another width are rejected by the embedding service.

use async_trait::async_trait;
use ollama_rs::generation::embeddings::request::{EmbeddingsInput, GenerateEmbeddingsRequest};
use ollama_rs::Ollama;

use super::provider::{
    EmbeddingError, EmbeddingProvider, EmbeddingProviderType, EmbeddingResult,
    EMBEDDING_DIMENSION,
};
use crate::models::settings::EmbeddingSettings;

/// Default Ollama API endpoint.
const OLLAMA_DEFAULT_URL: &str = "http://localhost:11434";

/// Default embedding model.
const DEFAULT_MODEL: &str = "all-minilm";

/// Maximum batch size for Ollama embedding requests.
const MAX_BATCH_SIZE: usize = 64;

/// Ollama embedding provider using the native ollama-rs SDK.
pub struct OllamaEmbeddingProvider {
    client: Ollama,
    model: String,
    display_name: String,
    /// The base URL string (for error messages).
    base_url: String,
}

impl OllamaEmbeddingProvider {
    pub fn new(settings: &EmbeddingSettings) -> Self {
        let model = if settings.model.trim().is_empty() {
            DEFAULT_MODEL.to_string()
        } else {
            settings.model.trim().to_string()
        };

        let base_url = if settings.base_url.trim().is_empty() {
            OLLAMA_DEFAULT_URL.to_string()
        } else {
            settings.base_url.trim().to_string()
        };

        let client = Self::create_client(&base_url);
        let display_name = format!("Ollama ({})", model);

        Self {
            client,
            model,
            display_name,
            base_url,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Create an Ollama SDK client from a base URL string.
    ///
    /// Parses the URL to extract host and port for `Ollama::new()`.
    /// Falls back to `Ollama::default()` if parsing fails.
    fn create_client(base_url: &str) -> Ollama {
        if let Ok(parsed) = url::Url::parse(base_url) {
            let scheme = parsed.scheme();
            let host = parsed.host_str().unwrap_or("localhost");
            let port = parsed.port().unwrap_or(11434);
            Ollama::new(format!("{}://{}", scheme, host), port)
        } else {
            Ollama::default()
        }
    }

    /// Map an ollama-rs error to our `EmbeddingError` type.
    fn map_ollama_error(&self, err: ollama_rs::error::OllamaError) -> EmbeddingError {
        let msg = err.to_string();

        if msg.contains("connect") || msg.contains("Connection refused") {
            EmbeddingError::ProviderUnavailable {
                message: format!(
                    "Cannot connect to Ollama at {}. Is the Ollama server running?",
                    self.base_url
                ),
            }
        } else if msg.contains("not found") || msg.contains("404") {
            EmbeddingError::ModelNotFound {
                model: self.model.clone(),
            }
        } else {
            EmbeddingError::NetworkError { message: msg }
        }
    }

    fn check_width(embeddings: &[Vec<f32>]) -> EmbeddingResult<()> {
        match embeddings.iter().find(|e| e.len() != EMBEDDING_DIMENSION) {
            Some(bad) => Err(EmbeddingError::DimensionMismatch {
                expected: EMBEDDING_DIMENSION,
                actual: bad.len(),
            }),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaEmbeddingProvider {
    async fn embed_documents(&self, documents: &[&str]) -> EmbeddingResult<Vec<Vec<f32>>> {
        if documents.is_empty() {
            return Ok(Vec::new());
        }

        if documents.len() > MAX_BATCH_SIZE {
            return Err(EmbeddingError::BatchSizeLimitExceeded {
                requested: documents.len(),
                max_allowed: MAX_BATCH_SIZE,
            });
        }

        let input = EmbeddingsInput::from(documents.to_vec());
        let request = GenerateEmbeddingsRequest::new(self.model.clone(), input);

        let response = self
            .client
            .generate_embeddings(request)
            .await
            .map_err(|e| self.map_ollama_error(e))?;

        if response.embeddings.len() != documents.len() {
            return Err(EmbeddingError::ParseError {
                message: format!(
                    "expected {} embeddings but Ollama returned {}",
                    documents.len(),
                    response.embeddings.len()
                ),
            });
        }
        Self::check_width(&response.embeddings)?;

        Ok(response.embeddings)
    }

    fn dimension(&self) -> usize {
        EMBEDDING_DIMENSION
    }

    async fn health_check(&self) -> EmbeddingResult<()> {
        let models = self
            .client
            .list_local_models()
            .await
            .map_err(|e| self.map_ollama_error(e))?;

        let model_base = self.model.split(':').next().unwrap_or(&self.model);
        let model_available = models.iter().any(|m| {
            let local_base = m.name.split(':').next().unwrap_or(&m.name);
            local_base == model_base || m.name == self.model
        });

        if !model_available {
            return Err(EmbeddingError::ModelNotFound {
                model: format!(
                    "'{}' is not available locally. Pull it with: ollama pull {}",
                    self.model, self.model
                ),
            });
        }

        // Probe once so a model of the wrong width is caught before any
        // vector is stored.
        let probe = self.embed_query("dimension probe").await?;
        Self::check_width(std::slice::from_ref(&probe))
    }

    fn is_local(&self) -> bool {
        true
    }

    fn max_batch_size(&self) -> usize {
        MAX_BATCH_SIZE
    }

    fn provider_type(&self) -> EmbeddingProviderType {
        EmbeddingProviderType::Ollama
    }

    fn display_name(&self) -> &str {
        &self.display_name
    }
}
