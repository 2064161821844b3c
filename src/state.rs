//! Memory Bank State
//!
//! Composition root owning every service. Nothing here is process-global:
//! each `MemoryBank` is built explicitly and tests can run many side by side.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use memory_bank_core::{EntryType, MemoryEntry, NewEntry};

use crate::models::metrics::{QueryMetric, TokenMetric};
use crate::models::settings::MemoryBankConfig;
use crate::services::embedding::{EmbeddingProviderType, EmbeddingService, QuantizedVector};
use crate::services::memory::{
    ContextSelector, EntryStore, RelevanceScorer, SelectionOptions, SelectionResult,
};
use crate::services::metrics::MetricsService;
use crate::storage::{BackendKind, ConfigService, MigrationReport, StoreLocation};
use crate::utils::error::{AppError, AppResult};
use crate::utils::paths::{database_path, ensure_memory_bank_dir};

const SELECT_OPERATION: &str = "select_context";

/// Snapshot for status displays.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub schema_version: u32,
    pub backend: BackendKind,
    pub embedding_backend: EmbeddingProviderType,
    pub database_healthy: bool,
    pub entry_counts: BTreeMap<EntryType, usize>,
}

pub struct MemoryBank {
    config: MemoryBankConfig,
    store: EntryStore,
    embeddings: Arc<EmbeddingService>,
    selector: ContextSelector,
    metrics: MetricsService,
    startup_migration: MigrationReport,
}

impl MemoryBank {
    /// Open using `~/.memory-bank/config.json` and `~/.memory-bank/memory.db`.
    pub async fn open_default() -> AppResult<Self> {
        ensure_memory_bank_dir()?;
        let config = ConfigService::new()?.get_config_clone();
        let location = StoreLocation::File(database_path()?);
        Self::open(location, config).await
    }

    /// Open a store at `location` with the embedding backend named in
    /// `config`.
    pub async fn open(location: StoreLocation, config: MemoryBankConfig) -> AppResult<Self> {
        let embeddings = EmbeddingService::from_settings(&config.embedding);
        Self::open_with_embeddings(location, config, embeddings).await
    }

    /// In-memory store with offline embeddings.
    pub async fn open_in_memory(config: MemoryBankConfig) -> AppResult<Self> {
        Self::open_with_embeddings(StoreLocation::InMemory, config, EmbeddingService::offline())
            .await
    }

    pub async fn open_with_embeddings(
        location: StoreLocation,
        config: MemoryBankConfig,
        embeddings: EmbeddingService,
    ) -> AppResult<Self> {
        config.validate().map_err(AppError::config)?;

        let (store, report) = EntryStore::init(location, &config).await?;
        let embeddings = Arc::new(embeddings);
        let selector = ContextSelector::new(
            store.clone(),
            embeddings.clone(),
            RelevanceScorer::new(),
            config.selection.clone(),
        );
        let metrics = MetricsService::new(store.clone());

        tracing::info!(
            backend = store.database().backend().as_str(),
            schema_version = report.to_version,
            migrations_applied = report.migrations_applied,
            "memory bank opened"
        );

        Ok(Self {
            config,
            store,
            embeddings,
            selector,
            metrics,
            startup_migration: report,
        })
    }

    pub fn config(&self) -> &MemoryBankConfig {
        &self.config
    }

    pub fn store(&self) -> &EntryStore {
        &self.store
    }

    pub fn embeddings(&self) -> &EmbeddingService {
        &self.embeddings
    }

    pub fn selector(&self) -> &ContextSelector {
        &self.selector
    }

    pub fn metrics(&self) -> &MetricsService {
        &self.metrics
    }

    /// The migration run performed while opening.
    pub fn startup_migration(&self) -> &MigrationReport {
        &self.startup_migration
    }

    // ========================================================================
    // Entries
    // ========================================================================

    /// Append an entry, then store its vector. A failure to store the
    /// vector is logged and does not fail the append.
    pub async fn record_entry(&self, entry: NewEntry) -> AppResult<MemoryEntry> {
        let stored = self.store.append_entry(entry).await?;
        self.attach_vector(&stored).await;
        Ok(stored)
    }

    /// Append a batch atomically, then embed it in chunks.
    pub async fn record_entries(&self, entries: Vec<NewEntry>) -> AppResult<Vec<MemoryEntry>> {
        let stored = self.store.append_entries(entries).await?;
        let texts: Vec<String> = stored.iter().map(|e| e.content.clone()).collect();
        let vectors = self.embeddings.embed_batch(&texts).await;
        for (entry, vector) in stored.iter().zip(vectors) {
            self.put_vector_best_effort(entry.id, &vector).await;
        }
        Ok(stored)
    }

    pub async fn edit_entry(&self, id: i64, content: String) -> AppResult<MemoryEntry> {
        let edited = self.store.edit_entry(id, content).await?;
        self.attach_vector(&edited).await;
        Ok(edited)
    }

    pub async fn append_to_entry(&self, id: i64, text: String) -> AppResult<MemoryEntry> {
        let appended = self.store.append_to_entry(id, text).await?;
        self.attach_vector(&appended).await;
        Ok(appended)
    }

    async fn attach_vector(&self, entry: &MemoryEntry) {
        let vector = self.embeddings.embed(&entry.content).await;
        self.put_vector_best_effort(entry.id, &vector).await;
    }

    async fn put_vector_best_effort(&self, id: i64, vector: &[f32]) {
        let quantized = match QuantizedVector::quantize(vector) {
            Ok(q) => q,
            Err(e) => {
                tracing::warn!(id, error = %e, "skipping vector for entry");
                return;
            }
        };
        if let Err(e) = self.store.put_vector(id, quantized).await {
            tracing::warn!(id, error = %e, "failed to store entry vector");
        }
    }

    // ========================================================================
    // Selection
    // ========================================================================

    /// Select context for `query`. `token_budget` defaults to the configured
    /// budget. Latency and token use are recorded as metrics; a metrics
    /// failure is logged, never returned.
    pub async fn select_context(
        &self,
        query: &str,
        token_budget: Option<usize>,
        options: &SelectionOptions,
    ) -> AppResult<SelectionResult> {
        let budget = token_budget.unwrap_or(self.config.selection.default_token_budget);
        let started = Instant::now();
        let result = self
            .selector
            .select_context_for_budget(query, budget, options)
            .await?;
        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;

        let selected = result.selected_count();
        if let Err(e) = self
            .metrics
            .record_query_metric(QueryMetric::new(SELECT_OPERATION, elapsed_ms, selected))
            .await
        {
            tracing::warn!(error = %e, "failed to record query metric");
        }
        if let Err(e) = self
            .metrics
            .record_token_metric(TokenMetric::new(SELECT_OPERATION, result.tokens_used, selected))
            .await
        {
            tracing::warn!(error = %e, "failed to record token metric");
        }

        Ok(result)
    }

    // ========================================================================
    // Maintenance
    // ========================================================================

    pub async fn migrate(&self) -> AppResult<MigrationReport> {
        self.store.migrate().await
    }

    pub async fn health(&self) -> AppResult<HealthReport> {
        let schema_version = self.store.schema_version().await?;
        let entry_counts = self.store.get_entry_counts().await?;
        let db = self.store.database().clone();
        let database_healthy = tokio::task::spawn_blocking(move || db.is_healthy())
            .await
            .map_err(|e| AppError::database(format!("Task join error: {}", e)))?;

        Ok(HealthReport {
            schema_version,
            backend: self.store.database().backend(),
            embedding_backend: self.embeddings.active_backend().await,
            database_healthy,
            entry_counts,
        })
    }
}

impl std::fmt::Debug for MemoryBank {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryBank")
            .field("store", &self.store)
            .field("embeddings", &self.embeddings)
            .finish()
    }
}
