//! Embedding Integration Tests
//!
//! Quantization and similarity properties over many deterministic vectors,
//! and fallback behavior when the configured model cannot be reached.

use memory_bank::models::settings::{EmbeddingBackend, EmbeddingSettings};
use memory_bank::services::embedding::{
    cosine_similarity, dequantize_embedding, pseudo_embedding, quantize_embedding,
    EmbeddingProviderType, EmbeddingService, EMBEDDING_DIMENSION,
};

fn sample_vectors() -> Vec<Vec<f32>> {
    (0..50)
        .map(|i| pseudo_embedding(&format!("sample text {}", i), EMBEDDING_DIMENSION))
        .collect()
}

#[test]
fn test_quantization_preserves_signs() {
    for v in sample_vectors() {
        let q = quantize_embedding(&v).unwrap();
        assert_eq!(q.as_bytes().len(), 48);
        let back = dequantize_embedding(&q);
        for i in 0..EMBEDDING_DIMENSION {
            assert_eq!(back[i] == 1.0, v[i] > 0.0);
        }
    }
}

#[test]
fn test_similarity_identities() {
    for v in sample_vectors() {
        let neg: Vec<f32> = v.iter().map(|x| -x).collect();
        assert!((cosine_similarity(&v, &v).unwrap() - 1.0).abs() < 1e-5);
        assert!((cosine_similarity(&v, &neg).unwrap() + 1.0).abs() < 1e-5);
    }
}

#[test]
fn test_similarity_edge_cases() {
    let zero = vec![0.0f32; EMBEDDING_DIMENSION];
    let v = pseudo_embedding("anything", EMBEDDING_DIMENSION);
    assert_eq!(cosine_similarity(&zero, &v).unwrap(), 0.0);
    assert!(cosine_similarity(&v, &v[..10]).is_err());
}

#[tokio::test]
async fn test_unreachable_model_falls_back_to_hash() {
    let settings = EmbeddingSettings {
        backend: EmbeddingBackend::Ollama,
        base_url: "http://127.0.0.1:1".to_string(),
        ..Default::default()
    };
    let service = EmbeddingService::from_settings(&settings);

    let v = service.embed("fallback please").await;
    assert_eq!(v.len(), EMBEDDING_DIMENSION);
    assert_eq!(v, pseudo_embedding("fallback please", EMBEDDING_DIMENSION));
    assert_eq!(service.active_backend().await, EmbeddingProviderType::Hash);

    let texts: Vec<String> = (0..23).map(|i| format!("t{}", i)).collect();
    let batch = service.embed_batch(&texts).await;
    assert_eq!(batch.len(), 23);
    assert!(batch.iter().all(|v| v.len() == EMBEDDING_DIMENSION));
}
