//! Embedding Service
//!
//! Owns the configured provider and the deterministic fallback. The
//! configured provider is health-checked lazily, once, on first use; if it
//! is unreachable, errors, or produces the wrong width, the service degrades
//! to the hash provider for the rest of its life so stored vectors never
//! mix embedding spaces.
//!
//! `embed` and `embed_batch` never fail. Provider errors are logged and
//! absorbed into the fallback. Every provider call runs under a deadline;
//! a call that misses it counts as the provider being unavailable.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::OnceCell;

use super::provider::{
    EmbeddingError, EmbeddingProvider, EmbeddingProviderType, EmbeddingResult,
    EMBEDDING_DIMENSION,
};
use super::provider_hash::HashEmbeddingProvider;
use super::provider_ollama::OllamaEmbeddingProvider;
use crate::models::settings::{EmbeddingBackend, EmbeddingSettings};

/// Default texts per chunk for batch embedding.
pub const DEFAULT_BATCH_SIZE: usize = 10;

/// Default deadline for a single provider call.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

pub struct EmbeddingService {
    configured: Arc<dyn EmbeddingProvider>,
    fallback: Arc<HashEmbeddingProvider>,
    /// Resolved on first use: `configured` if healthy, else `fallback`.
    active: OnceCell<Arc<dyn EmbeddingProvider>>,
    /// Set when the active provider failed after initialization.
    degraded: AtomicBool,
    batch_size: usize,
    timeout: Duration,
}

impl EmbeddingService {
    /// Wrap an explicit provider.
    pub fn new(provider: Arc<dyn EmbeddingProvider>, batch_size: usize) -> Self {
        Self {
            configured: provider,
            fallback: Arc::new(HashEmbeddingProvider::new()),
            active: OnceCell::new(),
            degraded: AtomicBool::new(false),
            batch_size: batch_size.max(1),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Replace the per-call deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Build the strategy named in settings.
    pub fn from_settings(settings: &EmbeddingSettings) -> Self {
        let provider: Arc<dyn EmbeddingProvider> = match settings.backend {
            EmbeddingBackend::Hash => Arc::new(HashEmbeddingProvider::new()),
            EmbeddingBackend::Ollama => Arc::new(OllamaEmbeddingProvider::new(settings)),
        };
        Self::new(provider, settings.batch_size)
            .with_timeout(Duration::from_millis(settings.timeout_ms.max(1)))
    }

    /// Hash-only service; needs no network and never degrades.
    pub fn offline() -> Self {
        Self::new(Arc::new(HashEmbeddingProvider::new()), DEFAULT_BATCH_SIZE)
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// True once the lazy health check has run.
    pub fn is_initialized(&self) -> bool {
        self.active.initialized()
    }

    /// The backend actually producing vectors. Triggers initialization.
    pub async fn active_backend(&self) -> EmbeddingProviderType {
        self.provider().await.provider_type()
    }

    async fn provider(&self) -> Arc<dyn EmbeddingProvider> {
        if self.degraded.load(Ordering::Acquire) {
            return self.fallback.clone();
        }
        self.active
            .get_or_init(|| async {
                match self.check_configured().await {
                    Ok(()) => {
                        tracing::info!(
                            provider = self.configured.display_name(),
                            "embedding provider ready"
                        );
                        self.configured.clone()
                    }
                    Err(e) => {
                        tracing::warn!(
                            provider = self.configured.display_name(),
                            error = %e,
                            "embedding provider unavailable, using deterministic fallback"
                        );
                        self.fallback.clone() as Arc<dyn EmbeddingProvider>
                    }
                }
            })
            .await
            .clone()
    }

    async fn check_configured(&self) -> EmbeddingResult<()> {
        if self.configured.dimension() != EMBEDDING_DIMENSION {
            return Err(EmbeddingError::DimensionMismatch {
                expected: EMBEDDING_DIMENSION,
                actual: self.configured.dimension(),
            });
        }
        self.bounded("health check", self.configured.health_check())
            .await
    }

    async fn bounded<T>(
        &self,
        operation: &str,
        call: impl Future<Output = EmbeddingResult<T>>,
    ) -> EmbeddingResult<T> {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(EmbeddingError::ProviderUnavailable {
                message: format!(
                    "{} timed out after {} ms",
                    operation,
                    self.timeout.as_millis()
                ),
            }),
        }
    }

    fn degrade(&self, err: &EmbeddingError) {
        if !self.degraded.swap(true, Ordering::AcqRel) {
            tracing::warn!(error = %err, "embedding provider failed, switching to deterministic fallback");
        }
    }

    /// Embed one text into a 384-dimension vector.
    pub async fn embed(&self, text: &str) -> Vec<f32> {
        let provider = self.provider().await;
        match self.bounded("embed", provider.embed_query(text)).await {
            Ok(v) if v.len() == EMBEDDING_DIMENSION => v,
            Ok(v) => {
                self.degrade(&EmbeddingError::DimensionMismatch {
                    expected: EMBEDDING_DIMENSION,
                    actual: v.len(),
                });
                self.fallback.embed_text(text)
            }
            Err(e) => {
                self.degrade(&e);
                self.fallback.embed_text(text)
            }
        }
    }

    /// Embed many texts in fixed-size chunks, yielding to the scheduler
    /// between chunks. Output order matches input order.
    ///
    /// If the provider fails partway, the whole batch is recomputed with the
    /// fallback so every returned vector comes from the same space.
    pub async fn embed_batch(&self, texts: &[String]) -> Vec<Vec<f32>> {
        let provider = self.provider().await;
        let chunk_size = self.batch_size.min(provider.max_batch_size()).max(1);

        let mut out = Vec::with_capacity(texts.len());
        for (i, chunk) in texts.chunks(chunk_size).enumerate() {
            if i > 0 {
                tokio::task::yield_now().await;
            }
            let refs: Vec<&str> = chunk.iter().map(String::as_str).collect();
            match self
                .bounded("batch embed", provider.embed_documents(&refs))
                .await
            {
                Ok(vectors)
                    if vectors.len() == refs.len()
                        && vectors.iter().all(|v| v.len() == EMBEDDING_DIMENSION) =>
                {
                    out.extend(vectors)
                }
                Ok(vectors) => {
                    self.degrade(&EmbeddingError::ParseError {
                        message: format!(
                            "provider returned {} vectors for {} texts or wrong width",
                            vectors.len(),
                            refs.len()
                        ),
                    });
                    return self.fallback_batch(texts).await;
                }
                Err(e) => {
                    self.degrade(&e);
                    return self.fallback_batch(texts).await;
                }
            }
        }
        out
    }

    async fn fallback_batch(&self, texts: &[String]) -> Vec<Vec<f32>> {
        let mut out = Vec::with_capacity(texts.len());
        for (i, chunk) in texts.chunks(self.batch_size).enumerate() {
            if i > 0 {
                tokio::task::yield_now().await;
            }
            out.extend(chunk.iter().map(|t| self.fallback.embed_text(t)));
        }
        out
    }
}

impl std::fmt::Debug for EmbeddingService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingService")
            .field("configured", &self.configured.display_name())
            .field("batch_size", &self.batch_size)
            .field("degraded", &self.degraded.load(Ordering::Relaxed))
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Cosine similarity of two equal-width vectors.
///
/// Returns 0.0 when either vector has zero magnitude. Vectors of different
/// widths are an error.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> EmbeddingResult<f32> {
    if a.len() != b.len() {
        return Err(EmbeddingError::DimensionMismatch {
            expected: a.len(),
            actual: b.len(),
        });
    }

    let mut dot = 0.0f32;
    let mut mag_a = 0.0f32;
    let mut mag_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        mag_a += x * x;
        mag_b += y * y;
    }

    let denom = mag_a.sqrt() * mag_b.sqrt();
    if denom == 0.0 {
        Ok(0.0)
    } else {
        Ok(dot / denom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::embedding::provider_hash::pseudo_embedding;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Provider that fails its health check.
    struct DownProvider;

    #[async_trait]
    impl EmbeddingProvider for DownProvider {
        async fn embed_documents(&self, _documents: &[&str]) -> EmbeddingResult<Vec<Vec<f32>>> {
            Err(EmbeddingError::ProviderUnavailable {
                message: "down".into(),
            })
        }
        fn dimension(&self) -> usize {
            EMBEDDING_DIMENSION
        }
        async fn health_check(&self) -> EmbeddingResult<()> {
            Err(EmbeddingError::ProviderUnavailable {
                message: "down".into(),
            })
        }
        fn is_local(&self) -> bool {
            true
        }
        fn max_batch_size(&self) -> usize {
            64
        }
        fn provider_type(&self) -> EmbeddingProviderType {
            EmbeddingProviderType::Ollama
        }
        fn display_name(&self) -> &str {
            "down"
        }
    }

    /// Healthy provider that records chunk sizes and returns index-tagged
    /// vectors, optionally failing on the nth call.
    struct RecordingProvider {
        chunks: Mutex<Vec<usize>>,
        fail_on_call: Option<usize>,
        dimension: usize,
    }

    impl RecordingProvider {
        fn new() -> Self {
            Self {
                chunks: Mutex::new(Vec::new()),
                fail_on_call: None,
                dimension: EMBEDDING_DIMENSION,
            }
        }
    }

    #[async_trait]
    impl EmbeddingProvider for RecordingProvider {
        async fn embed_documents(&self, documents: &[&str]) -> EmbeddingResult<Vec<Vec<f32>>> {
            let mut chunks = self.chunks.lock().unwrap();
            if Some(chunks.len()) == self.fail_on_call {
                return Err(EmbeddingError::NetworkError {
                    message: "reset".into(),
                });
            }
            chunks.push(documents.len());
            Ok(documents
                .iter()
                .map(|d| {
                    let mut v = vec![0.0f32; EMBEDDING_DIMENSION];
                    v[0] = d.parse::<f32>().unwrap_or(-1.0);
                    v
                })
                .collect())
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
            64
        }
        fn provider_type(&self) -> EmbeddingProviderType {
            EmbeddingProviderType::Ollama
        }
        fn display_name(&self) -> &str {
            "recording"
        }
    }

    /// Provider whose calls never complete. The health check can be made
    /// to pass so the hang happens on the embedding call itself.
    struct StalledProvider {
        healthy: bool,
    }

    #[async_trait]
    impl EmbeddingProvider for StalledProvider {
        async fn embed_documents(&self, _documents: &[&str]) -> EmbeddingResult<Vec<Vec<f32>>> {
            std::future::pending().await
        }
        async fn embed_query(&self, _query: &str) -> EmbeddingResult<Vec<f32>> {
            std::future::pending().await
        }
        fn dimension(&self) -> usize {
            EMBEDDING_DIMENSION
        }
        async fn health_check(&self) -> EmbeddingResult<()> {
            if self.healthy {
                Ok(())
            } else {
                std::future::pending().await
            }
        }
        fn is_local(&self) -> bool {
            true
        }
        fn max_batch_size(&self) -> usize {
            64
        }
        fn provider_type(&self) -> EmbeddingProviderType {
            EmbeddingProviderType::Ollama
        }
        fn display_name(&self) -> &str {
            "stalled"
        }
    }

    fn numbered(n: usize) -> Vec<String> {
        (0..n).map(|i| i.to_string()).collect()
    }

    #[tokio::test]
    async fn test_lazy_initialization() {
        let service = EmbeddingService::offline();
        assert!(!service.is_initialized());
        service.embed("x").await;
        assert!(service.is_initialized());
    }

    #[tokio::test]
    async fn test_unhealthy_provider_falls_back() {
        let service = EmbeddingService::new(Arc::new(DownProvider), 10);
        assert_eq!(service.active_backend().await, EmbeddingProviderType::Hash);
        let v = service.embed("hello").await;
        assert_eq!(v, pseudo_embedding("hello", EMBEDDING_DIMENSION));
    }

    #[tokio::test]
    async fn test_stalled_health_check_times_out() {
        let service = EmbeddingService::new(Arc::new(StalledProvider { healthy: false }), 10)
            .with_timeout(Duration::from_millis(50));
        assert_eq!(service.active_backend().await, EmbeddingProviderType::Hash);
        assert_eq!(service.embed("hello").await, pseudo_embedding("hello", EMBEDDING_DIMENSION));
    }

    #[tokio::test]
    async fn test_stalled_embedding_call_times_out() {
        let service = EmbeddingService::new(Arc::new(StalledProvider { healthy: true }), 10)
            .with_timeout(Duration::from_millis(50));
        assert_eq!(service.active_backend().await, EmbeddingProviderType::Ollama);

        let v = service.embed("hello").await;
        assert_eq!(v, pseudo_embedding("hello", EMBEDDING_DIMENSION));
        assert_eq!(service.active_backend().await, EmbeddingProviderType::Hash);

        let texts = numbered(3);
        let batch = service.embed_batch(&texts).await;
        assert_eq!(batch[2], pseudo_embedding("2", EMBEDDING_DIMENSION));
    }

    #[tokio::test]
    async fn test_stalled_batch_times_out() {
        let service = EmbeddingService::new(Arc::new(StalledProvider { healthy: true }), 10)
            .with_timeout(Duration::from_millis(50));
        let texts = numbered(12);
        let batch = service.embed_batch(&texts).await;
        assert_eq!(batch.len(), 12);
        for (text, v) in texts.iter().zip(&batch) {
            assert_eq!(v, &pseudo_embedding(text, EMBEDDING_DIMENSION));
        }
    }

    #[test]
    fn test_timeout_from_settings() {
        let settings = EmbeddingSettings {
            timeout_ms: 250,
            ..Default::default()
        };
        let service = EmbeddingService::from_settings(&settings);
        assert_eq!(service.timeout(), Duration::from_millis(250));
        assert_eq!(EmbeddingService::offline().timeout(), DEFAULT_TIMEOUT);
    }

    #[tokio::test]
    async fn test_wrong_width_provider_falls_back() {
        let provider = RecordingProvider {
            dimension: 768,
            ..RecordingProvider::new()
        };
        let service = EmbeddingService::new(Arc::new(provider), 10);
        assert_eq!(service.active_backend().await, EmbeddingProviderType::Hash);
    }

    #[tokio::test]
    async fn test_batch_chunks_and_order() {
        let provider = Arc::new(RecordingProvider::new());
        let service = EmbeddingService::new(provider.clone(), 10);

        let vectors = service.embed_batch(&numbered(25)).await;
        assert_eq!(vectors.len(), 25);
        for (i, v) in vectors.iter().enumerate() {
            assert_eq!(v[0], i as f32);
        }
        assert_eq!(*provider.chunks.lock().unwrap(), vec![10, 10, 5]);
    }

    #[tokio::test]
    async fn test_batch_failure_recomputes_with_fallback() {
        let provider = Arc::new(RecordingProvider {
            fail_on_call: Some(1),
            ..RecordingProvider::new()
        });
        let service = EmbeddingService::new(provider, 10);

        let texts = numbered(25);
        let vectors = service.embed_batch(&texts).await;
        assert_eq!(vectors.len(), 25);
        for (text, v) in texts.iter().zip(&vectors) {
            assert_eq!(v, &pseudo_embedding(text, EMBEDDING_DIMENSION));
        }
        // Degradation is sticky.
        assert_eq!(service.active_backend().await, EmbeddingProviderType::Hash);
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let service = EmbeddingService::offline();
        assert!(service.embed_batch(&[]).await.is_empty());
    }

    #[test]
    fn test_cosine_identities() {
        let v = pseudo_embedding("identity", EMBEDDING_DIMENSION);
        let neg: Vec<f32> = v.iter().map(|x| -x).collect();
        assert!((cosine_similarity(&v, &v).unwrap() - 1.0).abs() < 1e-5);
        assert!((cosine_similarity(&v, &neg).unwrap() + 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_cosine_zero_magnitude() {
        let zero = vec![0.0f32; 4];
        assert_eq!(cosine_similarity(&zero, &[1.0, 2.0, 3.0, 4.0]).unwrap(), 0.0);
    }

    #[test]
    fn test_cosine_dimension_mismatch() {
        assert!(matches!(
            cosine_similarity(&[1.0, 0.0], &[1.0, 0.0, 0.0]),
            Err(EmbeddingError::DimensionMismatch { .. })
        ));
    }
}
