//! Context Selection
//!
//! Answers "which entries should go into the prompt for query Q under a
//! budget of B tokens":
//!
//! 1. Load candidates (optional type filter, max age)
//! 2. Score each with the `RelevanceScorer`
//! 3. Optionally blend in semantic similarity from stored vectors
//! 4. Drop entries under the relevance threshold
//! 5. Stable-sort by score, highest first
//! 6. Greedily accept entries until the next one does not fit
//!
//! Step 6 stops at the first entry that would exceed the remaining budget.
//! It never skips ahead to a smaller entry, so the result is reproducible
//! rather than maximally packed.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use memory_bank_core::{EntryType, MemoryEntry};

use crate::models::settings::SelectionSettings;
use crate::services::embedding::{cosine_similarity, EmbeddingService};
use crate::services::memory::scoring::{RelevanceScorer, ScoredEntry};
use crate::services::memory::store::EntryStore;
use crate::utils::error::AppResult;

/// Characters per estimated token.
const CHARS_PER_TOKEN: usize = 4;

const ENTRY_SEPARATOR: &str = "\n\n";

// ============================================================================
// Request / Result Types
// ============================================================================

/// Per-call options. Unset fields fall back to the selector's settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionOptions {
    #[serde(default)]
    pub min_relevance_threshold: Option<f64>,
    /// Restrict candidates to these types. `None` means all types.
    #[serde(default)]
    pub include_types: Option<Vec<EntryType>>,
    #[serde(default)]
    pub max_age_days: Option<u32>,
    #[serde(default)]
    pub use_semantic_search: bool,
}

impl SelectionOptions {
    pub fn semantic() -> Self {
        Self {
            use_semantic_search: true,
            ..Default::default()
        }
    }

    pub fn with_types(mut self, types: Vec<EntryType>) -> Self {
        self.include_types = Some(types);
        self
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.min_relevance_threshold = Some(threshold);
        self
    }

    pub fn with_max_age_days(mut self, days: u32) -> Self {
        self.max_age_days = Some(days);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Coverage {
    /// `selected / total_candidates`, 0 when there were no candidates.
    pub entry_ratio: f64,
    /// `tokens_used / token_budget`, 0 when the budget is 0.
    pub budget_ratio: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionResult {
    /// Accepted entries, in acceptance order.
    pub entries: Vec<ScoredEntry>,
    /// Formatted entries joined by a blank line.
    pub text: String,
    pub tokens_used: usize,
    pub token_budget: usize,
    pub total_candidates: usize,
    pub coverage: Coverage,
}

impl SelectionResult {
    pub fn empty(token_budget: usize) -> Self {
        Self {
            entries: Vec::new(),
            text: String::new(),
            tokens_used: 0,
            token_budget,
            total_candidates: 0,
            coverage: Coverage {
                entry_ratio: 0.0,
                budget_ratio: 0.0,
            },
        }
    }

    pub fn selected_count(&self) -> usize {
        self.entries.len()
    }
}

// ============================================================================
// Formatting and Cost
// ============================================================================

/// Render an entry as it appears in the selection text.
pub fn format_entry(entry: &MemoryEntry) -> String {
    format!("{} {}", entry.tag, entry.content)
}

/// Estimated token cost: `ceil(chars / 4)`.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(CHARS_PER_TOKEN)
}

/// Greedy budget fill over already-ranked entries.
pub fn select_from_scored(
    ranked: Vec<ScoredEntry>,
    token_budget: usize,
    total_candidates: usize,
) -> SelectionResult {
    let mut accepted = Vec::new();
    let mut blocks = Vec::new();
    let mut tokens_used = 0usize;

    for scored in ranked {
        let block = format_entry(&scored.entry);
        let cost = estimate_tokens(&block);
        if tokens_used + cost > token_budget {
            break;
        }
        tokens_used += cost;
        blocks.push(block);
        accepted.push(scored);
    }

    let entry_ratio = if total_candidates == 0 {
        0.0
    } else {
        accepted.len() as f64 / total_candidates as f64
    };
    let budget_ratio = if token_budget == 0 {
        0.0
    } else {
        tokens_used as f64 / token_budget as f64
    };

    SelectionResult {
        entries: accepted,
        text: blocks.join(ENTRY_SEPARATOR),
        tokens_used,
        token_budget,
        total_candidates,
        coverage: Coverage {
            entry_ratio,
            budget_ratio,
        },
    }
}

/// Map cosine similarity in [-1, 1] to [0, 1].
fn normalize_similarity(cosine: f32) -> f64 {
    ((cosine as f64 + 1.0) / 2.0).clamp(0.0, 1.0)
}

// ============================================================================
// Selector
// ============================================================================

#[derive(Clone)]
pub struct ContextSelector {
    store: EntryStore,
    embeddings: Arc<EmbeddingService>,
    scorer: RelevanceScorer,
    settings: SelectionSettings,
}

impl ContextSelector {
    pub fn new(
        store: EntryStore,
        embeddings: Arc<EmbeddingService>,
        scorer: RelevanceScorer,
        settings: SelectionSettings,
    ) -> Self {
        Self {
            store,
            embeddings,
            scorer,
            settings,
        }
    }

    pub fn settings(&self) -> &SelectionSettings {
        &self.settings
    }

    pub async fn select_context_for_budget(
        &self,
        query: &str,
        token_budget: usize,
        options: &SelectionOptions,
    ) -> AppResult<SelectionResult> {
        self.select_at(query, token_budget, options, Utc::now(), None)
            .await
    }

    /// As [`select_context_for_budget`](Self::select_context_for_budget),
    /// abandoning the candidate scan when `cancel` fires.
    pub async fn select_context_cancellable(
        &self,
        query: &str,
        token_budget: usize,
        options: &SelectionOptions,
        cancel: &CancellationToken,
    ) -> AppResult<SelectionResult> {
        self.select_at(query, token_budget, options, Utc::now(), Some(cancel.clone()))
            .await
    }

    /// Select with an explicit clock for age filtering and recency.
    pub async fn select_at(
        &self,
        query: &str,
        token_budget: usize,
        options: &SelectionOptions,
        now: DateTime<Utc>,
        cancel: Option<CancellationToken>,
    ) -> AppResult<SelectionResult> {
        let max_age_days = options.max_age_days.unwrap_or(self.settings.max_age_days);
        let threshold = options
            .min_relevance_threshold
            .unwrap_or(self.settings.min_relevance_threshold);
        // An age window reaching past the representable range means no lower bound.
        let since = Duration::try_days(i64::from(max_age_days))
            .and_then(|window| now.checked_sub_signed(window));

        // Step 1: candidates
        let candidates = self
            .store
            .load_candidates(options.include_types.clone(), since, cancel)
            .await?;
        let total_candidates = candidates.len();
        if total_candidates == 0 {
            tracing::debug!(query, "no candidates for selection");
            return Ok(SelectionResult::empty(token_budget));
        }

        // Step 2: keyword scoring
        let mut scored = self.scorer.score_entries(candidates, query, now);

        // Step 3: semantic blend
        if options.use_semantic_search {
            self.blend_semantic(query, &mut scored).await?;
        }

        // Steps 4 and 5: threshold then rank
        let ranked = self
            .scorer
            .rank_entries(self.scorer.filter_by_threshold(scored, threshold));

        // Step 6: greedy fill
        let result = select_from_scored(ranked, token_budget, total_candidates);

        tracing::info!(
            candidates = total_candidates,
            selected = result.selected_count(),
            tokens_used = result.tokens_used,
            token_budget,
            semantic = options.use_semantic_search,
            "context selected"
        );
        Ok(result)
    }

    async fn blend_semantic(&self, query: &str, scored: &mut [ScoredEntry]) -> AppResult<()> {
        let query_vector = self.embeddings.embed(query).await;
        let ids: Vec<i64> = scored.iter().map(|s| s.entry.id).collect();
        let vectors = self.store.vectors_for(ids).await?;

        let keyword_weight = self.settings.keyword_weight;
        let semantic_weight = self.settings.semantic_weight;
        let neutral = self.settings.neutral_semantic_score;

        for s in scored.iter_mut() {
            // Stored vectors keep only signs, so this is a coarse similarity.
            let semantic = vectors.get(&s.entry.id).and_then(|v| {
                match cosine_similarity(&query_vector, &v.dequantize()) {
                    Ok(cos) => Some(normalize_similarity(cos)),
                    Err(e) => {
                        tracing::warn!(id = s.entry.id, error = %e, "semantic score unavailable");
                        None
                    }
                }
            });
            s.semantic = semantic;
            s.score = keyword_weight * s.breakdown.final_score
                + semantic_weight * semantic.unwrap_or(neutral);
        }
        Ok(())
    }
}

impl std::fmt::Debug for ContextSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextSelector")
            .field("settings", &self.settings)
            .finish()
    }
}
