//! Selection Integration Tests
//!
//! Greedy budget fill (scenario B), the budget bound over many inputs, and
//! full selection through `MemoryBank`.

use chrono::{Duration, Utc};

use memory_bank::models::settings::EmbeddingBackend;
use memory_bank::services::embedding::EmbeddingProviderType;
use memory_bank::services::memory::{
    estimate_tokens, format_entry, select_from_scored, ScoreBreakdown, ScoredEntry,
};
use memory_bank::storage::StoreLocation;
use memory_bank::{EntryType, MemoryBank, MemoryBankConfig, MemoryEntry, NewEntry, SelectionOptions};

// ============================================================================
// Helpers
// ============================================================================

const TAG: &str = "[CONTEXT:2025-01-15]";

fn scored(id: i64, score: f64, tokens: usize) -> ScoredEntry {
    // "{tag} {content}" is exactly tokens * 4 characters.
    let content = "a".repeat(tokens * 4 - TAG.len() - 1);
    let entry = MemoryEntry {
        id,
        file_type: EntryType::Context,
        timestamp: "2025-01-15T00:00:00Z".to_string(),
        tag: TAG.to_string(),
        content,
        metadata: None,
    };
    ScoredEntry::new(
        entry,
        ScoreBreakdown {
            relevance: score,
            recency: 1.0,
            priority: 1.0,
            final_score: score,
        },
    )
}

fn ids(entries: &[ScoredEntry]) -> Vec<i64> {
    entries.iter().map(|s| s.entry.id).collect()
}

// ============================================================================
// Tests
// ============================================================================

#[test]
fn test_scenario_b_greedy_fill() {
    let a = scored(1, 0.9, 150);
    let b = scored(2, 0.5, 50);

    let result = select_from_scored(vec![a.clone(), b.clone()], 150, 2);
    assert_eq!(ids(&result.entries), vec![1]);

    let result = select_from_scored(vec![a, b], 200, 2);
    assert_eq!(ids(&result.entries), vec![1, 2]);
    assert_eq!(result.tokens_used, 200);
}

#[test]
fn test_budget_bound_over_many_inputs() {
    let costs = [6usize, 17, 8, 40, 12, 7, 90, 6, 21, 33];
    let entries: Vec<ScoredEntry> = costs
        .iter()
        .enumerate()
        .map(|(i, c)| scored(i as i64, 1.0 - i as f64 * 0.05, *c))
        .collect();

    for budget in 0..=300 {
        let result = select_from_scored(entries.clone(), budget, entries.len());
        let summed: usize = result
            .entries
            .iter()
            .map(|s| estimate_tokens(&format_entry(&s.entry)))
            .sum();
        assert!(summed <= budget, "budget {} exceeded: {}", budget, summed);
        assert_eq!(summed, result.tokens_used);
        // Accepted entries are always a prefix of the ranked input.
        let expected: Vec<i64> = (0..result.entries.len() as i64).collect();
        assert_eq!(ids(&result.entries), expected);
    }
}

#[tokio::test]
async fn test_bank_selects_relevant_entries() {
    let bank = MemoryBank::open_in_memory(MemoryBankConfig::default())
        .await
        .unwrap();
    let now = Utc::now();

    bank.record_entry(NewEntry::at(
        EntryType::Decision,
        "Store memory entries in SQLite with WAL enabled",
        now - Duration::days(2),
    ))
    .await
    .unwrap();
    bank.record_entry(NewEntry::at(
        EntryType::Brief,
        "Memory bank for coding assistants",
        now - Duration::days(40),
    ))
    .await
    .unwrap();
    bank.record_entry(NewEntry::at(
        EntryType::Progress,
        "Finished the settings dialog",
        now - Duration::days(1),
    ))
    .await
    .unwrap();
    bank.record_entry(NewEntry::at(
        EntryType::Decision,
        "Old SQLite decision",
        now - Duration::days(200),
    ))
    .await
    .unwrap();

    let result = bank
        .select_context("sqlite memory", Some(1000), &SelectionOptions::default())
        .await
        .unwrap();

    // 200-day entry is outside the default age window.
    assert_eq!(result.total_candidates, 3);
    let contents: Vec<&str> = result
        .entries
        .iter()
        .map(|s| s.entry.content.as_str())
        .collect();
    assert_eq!(
        contents,
        vec![
            "Store memory entries in SQLite with WAL enabled",
            "Memory bank for coding assistants",
        ]
    );
    assert!(result.text.starts_with("[DECISION:"));
    assert!(result.text.contains("\n\n[BRIEF:"));
    assert!(result.tokens_used <= 1000);
}

#[tokio::test]
async fn test_bank_empty_selection() {
    let bank = MemoryBank::open_in_memory(MemoryBankConfig::default())
        .await
        .unwrap();
    let result = bank
        .select_context("nothing stored", Some(100), &SelectionOptions::semantic())
        .await
        .unwrap();
    assert!(result.entries.is_empty());
    assert_eq!(result.tokens_used, 0);
    assert_eq!(result.text, "");
}

#[tokio::test]
async fn test_semantic_selection_survives_unreachable_model() {
    let mut config = MemoryBankConfig::default();
    config.embedding.backend = EmbeddingBackend::Ollama;
    config.embedding.base_url = "http://127.0.0.1:1".to_string();

    let bank = MemoryBank::open(StoreLocation::InMemory, config).await.unwrap();
    bank.record_entry(NewEntry::new(EntryType::Pattern, "retry busy sqlite writes"))
        .await
        .unwrap();

    let result = bank
        .select_context("sqlite writes", None, &SelectionOptions::semantic())
        .await
        .unwrap();
    assert_eq!(result.selected_count(), 1);

    let health = bank.health().await.unwrap();
    assert_eq!(health.embedding_backend, EmbeddingProviderType::Hash);
    assert_eq!(health.entry_counts[&EntryType::Pattern], 1);
}
