//! Embedding Subsystem
//!
//! Text to fixed-width vectors, compact sign-bit storage, and similarity.
//!
//! ## Module Structure
//!
//! - `provider` - `EmbeddingProvider` trait, error and provider types
//! - `provider_hash` - deterministic offline pseudo-embeddings
//! - `provider_ollama` - local Ollama models via `ollama-rs`
//! - `service` - lazy provider resolution, fallback, batching, cosine similarity
//! - `quantize` - 48-byte sign-bit vectors

pub mod provider;
pub mod provider_hash;
pub mod provider_ollama;
pub mod quantize;
pub mod service;

pub use provider::{
    EmbeddingError, EmbeddingProvider, EmbeddingProviderType, EmbeddingResult,
    EMBEDDING_DIMENSION,
};
pub use provider_hash::{pseudo_embedding, HashEmbeddingProvider};
pub use provider_ollama::OllamaEmbeddingProvider;
pub use quantize::{dequantize_embedding, quantize_embedding, QuantizedVector, QUANTIZED_BYTES};
pub use service::{cosine_similarity, EmbeddingService, DEFAULT_BATCH_SIZE, DEFAULT_TIMEOUT};
