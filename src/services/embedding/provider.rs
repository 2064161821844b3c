//! Embedding Provider Abstraction Layer
//!
//! Defines the async `EmbeddingProvider` trait and supporting types for
//! pluggable embedding backends. The concrete strategy is chosen at
//! construction: a real model (Ollama) or the deterministic hash stub.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Width of every vector the memory bank stores or compares.
pub const EMBEDDING_DIMENSION: usize = 384;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors that can occur during embedding operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EmbeddingError {
    /// The requested model was not found or is not available.
    ModelNotFound { model: String },

    /// The provider is not reachable or not running.
    ProviderUnavailable { message: String },

    /// The input batch exceeds the provider's maximum batch size.
    BatchSizeLimitExceeded {
        requested: usize,
        max_allowed: usize,
    },

    /// Vectors of different widths were compared, or a provider produced
    /// a width other than the one it advertises.
    DimensionMismatch { expected: usize, actual: usize },

    /// A network or connection error occurred.
    NetworkError { message: String },

    /// The provider returned an unexpected or unparseable response.
    ParseError { message: String },
}

impl fmt::Display for EmbeddingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ModelNotFound { model } => write!(f, "model not found: {}", model),
            Self::ProviderUnavailable { message } => {
                write!(f, "provider unavailable: {}", message)
            }
            Self::BatchSizeLimitExceeded {
                requested,
                max_allowed,
            } => write!(
                f,
                "batch size {} exceeds maximum {}",
                requested, max_allowed
            ),
            Self::DimensionMismatch { expected, actual } => {
                write!(f, "dimension mismatch: expected {}, got {}", expected, actual)
            }
            Self::NetworkError { message } => write!(f, "network error: {}", message),
            Self::ParseError { message } => write!(f, "parse error: {}", message),
        }
    }
}

impl std::error::Error for EmbeddingError {}

/// Convenience alias for embedding operation results.
pub type EmbeddingResult<T> = Result<T, EmbeddingError>;

// ---------------------------------------------------------------------------
// Provider type enum
// ---------------------------------------------------------------------------

/// Identifies the embedding backend type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingProviderType {
    /// Deterministic hash-seeded pseudo-embeddings (offline).
    Hash,
    /// Ollama local embedding models.
    Ollama,
}

impl fmt::Display for EmbeddingProviderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hash => write!(f, "hash"),
            Self::Ollama => write!(f, "ollama"),
        }
    }
}

// ---------------------------------------------------------------------------
// Embedding provider trait
// ---------------------------------------------------------------------------

/// Async trait for embedding providers.
///
/// Implementations produce dense vector representations of text. The trait is
/// object-safe and requires `Send + Sync` for safe use across Tokio tasks.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a batch of document texts into dense vectors, one per input.
    async fn embed_documents(&self, documents: &[&str]) -> EmbeddingResult<Vec<Vec<f32>>>;

    /// Embed a single query text. Delegates to `embed_documents` by default.
    async fn embed_query(&self, query: &str) -> EmbeddingResult<Vec<f32>> {
        let results = self.embed_documents(&[query]).await?;
        results.into_iter().next().ok_or_else(|| EmbeddingError::ParseError {
            message: "embed_documents returned empty results for single query".to_string(),
        })
    }

    /// Returns the dimensionality of the embedding vectors produced.
    fn dimension(&self) -> usize;

    /// Check if the provider is healthy and reachable.
    ///
    /// Local providers always succeed. For Ollama, this checks that the
    /// server is running and the model is pulled.
    async fn health_check(&self) -> EmbeddingResult<()>;

    /// Returns whether this provider runs without network calls.
    fn is_local(&self) -> bool;

    /// Maximum number of texts accepted by one `embed_documents` call.
    fn max_batch_size(&self) -> usize;

    fn provider_type(&self) -> EmbeddingProviderType;

    /// Returns a human-readable name for this provider instance.
    fn display_name(&self) -> &str;
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
