//! Deterministic Hash Embedding Provider
//!
//! Offline stand-in for a real embedding model. The SHA-256 digest of the
//! text seeds a ChaCha8 generator that fills the vector, which is then
//! unit-normalized. Identical text always yields an identical vector, on
//! any machine, with no model download.
//!
//! The vectors carry no semantics: two paraphrases are as far apart as two
//! unrelated strings. They keep retrieval functional and reproducible when
//! no model is available.

use async_trait::async_trait;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use sha2::{Digest, Sha256};

use super::provider::{
    EmbeddingProvider, EmbeddingProviderType, EmbeddingResult, EMBEDDING_DIMENSION,
};

/// Accepts any batch size; everything is computed in-process.
const MAX_BATCH_SIZE: usize = 1024;

pub struct HashEmbeddingProvider {
    dimension: usize,
}

impl Default for HashEmbeddingProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl HashEmbeddingProvider {
    pub fn new() -> Self {
        Self::with_dimension(EMBEDDING_DIMENSION)
    }

    pub fn with_dimension(dimension: usize) -> Self {
        Self { dimension }
    }

    /// Synchronous embedding used by the trait methods and by callers that
    /// need a vector without an async context.
    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        pseudo_embedding(text, self.dimension)
    }
}

/// Fill `dimension` floats from a text-seeded generator and unit-normalize.
pub fn pseudo_embedding(text: &str, dimension: usize) -> Vec<f32> {
    let digest = Sha256::digest(text.as_bytes());
    let mut seed = [0u8; 32];
    seed.copy_from_slice(&digest);
    let mut rng = ChaCha8Rng::from_seed(seed);

    let mut v: Vec<f32> = (0..dimension).map(|_| rng.gen_range(-1.0f32..1.0)).collect();

    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
    v
}

#[async_trait]
impl EmbeddingProvider for HashEmbeddingProvider {
    async fn embed_documents(&self, documents: &[&str]) -> EmbeddingResult<Vec<Vec<f32>>> {
        Ok(documents.iter().map(|d| self.embed_text(d)).collect())
    }

    async fn embed_query(&self, query: &str) -> EmbeddingResult<Vec<f32>> {
        Ok(self.embed_text(query))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn health_check(&self) -> EmbeddingResult<()> {
        Ok(())
    }

    fn is_local(&self) -> bool {
        true
    }

    fn max_batch_size(&self) -> usize {
        MAX_BATCH_SIZE
    }

    fn provider_type(&self) -> EmbeddingProviderType {
        EmbeddingProviderType::Hash
    }

    fn display_name(&self) -> &str {
        "Hash (offline)"
    }
}
