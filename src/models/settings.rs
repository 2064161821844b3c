//! Settings Models
//!
//! Memory bank configuration stored in config.json.
//!
//! Every field has a default so partial files load; missing sections fall
//! back wholesale.

use serde::{Deserialize, Serialize};

use memory_bank_core::DEFAULT_MAX_CONTENT_LENGTH;

/// Upper bound for `selection.max_age_days` (one hundred years).
pub const MAX_AGE_DAYS_LIMIT: u32 = 36_500;

/// Which embedding strategy to construct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingBackend {
    /// Deterministic offline pseudo-embeddings.
    Hash,
    /// A local Ollama server, with the hash backend as fallback.
    Ollama,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    pub backend: EmbeddingBackend,
    pub model: String,
    pub base_url: String,
    /// Texts per chunk in batch embedding.
    pub batch_size: usize,
    /// Per-request deadline for the embedding provider.
    pub timeout_ms: u64,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            backend: EmbeddingBackend::Hash,
            model: "all-minilm".to_string(),
            base_url: "http://localhost:11434".to_string(),
            batch_size: 10,
            timeout_ms: 5_000,
        }
    }
}

/// Context selection tuning. The blend weights and neutral score have no
/// derivation beyond "works in practice" and are meant to be tuned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionSettings {
    pub keyword_weight: f64,
    pub semantic_weight: f64,
    /// Semantic score used for entries with no stored vector.
    pub neutral_semantic_score: f64,
    pub min_relevance_threshold: f64,
    pub max_age_days: u32,
    pub default_token_budget: usize,
}

impl Default for SelectionSettings {
    fn default() -> Self {
        Self {
            keyword_weight: 0.6,
            semantic_weight: 0.4,
            neutral_semantic_score: 0.5,
            min_relevance_threshold: 0.1,
            max_age_days: 90,
            default_token_budget: 4000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// Name of the backup directory created beside the database file.
    pub backup_dir_name: String,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            backup_dir_name: "backups".to_string(),
        }
    }
}

/// Memory bank configuration stored in config.json
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryBankConfig {
    /// Maximum entry content length, in characters
    pub max_content_length: usize,
    pub embedding: EmbeddingSettings,
    pub selection: SelectionSettings,
    pub storage: StorageSettings,
}

impl Default for MemoryBankConfig {
    fn default() -> Self {
        Self {
            max_content_length: DEFAULT_MAX_CONTENT_LENGTH,
            embedding: EmbeddingSettings::default(),
            selection: SelectionSettings::default(),
            storage: StorageSettings::default(),
        }
    }
}

/// Settings update request (partial update)
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SettingsUpdate {
    pub max_content_length: Option<usize>,
    pub embedding_backend: Option<EmbeddingBackend>,
    pub embedding_model: Option<String>,
    pub embedding_base_url: Option<String>,
    pub batch_size: Option<usize>,
    pub keyword_weight: Option<f64>,
    pub semantic_weight: Option<f64>,
    pub min_relevance_threshold: Option<f64>,
    pub max_age_days: Option<u32>,
    pub default_token_budget: Option<usize>,
}

impl MemoryBankConfig {
    /// Apply a partial update to the configuration
    pub fn apply_update(&mut self, update: SettingsUpdate) {
        if let Some(max) = update.max_content_length {
            self.max_content_length = max;
        }
        if let Some(backend) = update.embedding_backend {
            self.embedding.backend = backend;
        }
        if let Some(model) = update.embedding_model {
            self.embedding.model = model;
        }
        if let Some(url) = update.embedding_base_url {
            self.embedding.base_url = url;
        }
        if let Some(size) = update.batch_size {
            self.embedding.batch_size = size;
        }
        if let Some(w) = update.keyword_weight {
            self.selection.keyword_weight = w;
        }
        if let Some(w) = update.semantic_weight {
            self.selection.semantic_weight = w;
        }
        if let Some(t) = update.min_relevance_threshold {
            self.selection.min_relevance_threshold = t;
        }
        if let Some(days) = update.max_age_days {
            self.selection.max_age_days = days;
        }
        if let Some(budget) = update.default_token_budget {
            self.selection.default_token_budget = budget;
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), String> {
        if self.max_content_length == 0 {
            return Err("max_content_length must be positive".to_string());
        }

        if self.embedding.batch_size == 0 {
            return Err("embedding.batch_size must be at least 1".to_string());
        }
        if self.embedding.timeout_ms == 0 {
            return Err("embedding.timeout_ms must be positive".to_string());
        }
        if self.embedding.backend == EmbeddingBackend::Ollama {
            url::Url::parse(&self.embedding.base_url)
                .map_err(|e| format!("Invalid embedding.base_url {}: {}", self.embedding.base_url, e))?;
        }

        let s = &self.selection;
        if s.max_age_days > MAX_AGE_DAYS_LIMIT {
            return Err(format!(
                "selection.max_age_days must be at most {}, got {}",
                MAX_AGE_DAYS_LIMIT, s.max_age_days
            ));
        }
        for (name, value) in [
            ("keyword_weight", s.keyword_weight),
            ("semantic_weight", s.semantic_weight),
            ("neutral_semantic_score", s.neutral_semantic_score),
            ("min_relevance_threshold", s.min_relevance_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(format!("selection.{} must be within [0, 1], got {}", name, value));
            }
        }
        if (s.keyword_weight + s.semantic_weight - 1.0).abs() > 1e-6 {
            return Err(format!(
                "selection weights must sum to 1.0, got {} + {}",
                s.keyword_weight, s.semantic_weight
            ));
        }

        let dir = &self.storage.backup_dir_name;
        if dir.is_empty() || dir.contains('/') || dir.contains('\\') || dir == ".." {
            return Err(format!("Invalid storage.backup_dir_name: {:?}", dir));
        }

        Ok(())
    }
}
