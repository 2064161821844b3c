//! Relevance Scoring
//!
//! Multi-factor score of an entry against a query:
//!
//!   final_score = keyword_relevance * recency * priority
//!
//! Where:
//!   keyword_relevance = matched / distinct_terms
//!                     + min(0.1 * (matched - 1), 0.5)   (only when matched > 1)
//!                     capped at 1.0
//!   recency           = 1.0 (< 7 days), 0.7 (< 30), 0.3 (< 90), else 0.1;
//!                       0.5 when the timestamp cannot be parsed
//!   priority          = 1.5 BRIEF/PATTERN, 1.3 CONTEXT, 1.2 DECISION, else 1.0
//!
//! Scoring is a pure function of `(entry, query, now)`: the caller supplies
//! the clock, so identical inputs always produce identical scores.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use memory_bank_core::{EntryType, MemoryEntry};

/// Default cut-off for `filter_by_threshold`.
pub const DEFAULT_RELEVANCE_THRESHOLD: f64 = 0.1;

const PROXIMITY_STEP: f64 = 0.1;
const PROXIMITY_CAP: f64 = 0.5;
const UNKNOWN_AGE_RECENCY: f64 = 0.5;
const SECONDS_PER_DAY: f64 = 86_400.0;

const STOP_WORDS: &[&str] = &[
    "the", "and", "for", "are", "but", "not", "you", "all", "any", "can", "had", "her", "was",
    "one", "our", "out", "has", "have", "his", "how", "its", "may", "new", "now", "old", "see",
    "two", "way", "who", "did", "get", "let", "say", "she", "too", "use", "this", "that", "with",
    "from", "they", "will", "would", "there", "their", "what", "about", "which", "when", "were",
    "been", "into", "than", "then", "them", "these", "those", "some", "such", "only", "also",
    "very", "just", "over", "should", "could", "where", "does", "your",
];

// ============================================================================
// Score Types
// ============================================================================

/// The individual factors behind a score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreBreakdown {
    pub relevance: f64,
    pub recency: f64,
    pub priority: f64,
    /// `relevance * recency * priority`
    pub final_score: f64,
}

/// An entry with its scores.
///
/// `score` is what ranking and filtering use. It starts as the keyword
/// `final_score` and is replaced by the blended value when semantic scoring
/// is applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoredEntry {
    pub entry: MemoryEntry,
    pub breakdown: ScoreBreakdown,
    /// Normalized semantic similarity in [0, 1], when one was computed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub semantic: Option<f64>,
    pub score: f64,
}

impl ScoredEntry {
    pub fn new(entry: MemoryEntry, breakdown: ScoreBreakdown) -> Self {
        Self {
            entry,
            breakdown,
            semantic: None,
            score: breakdown.final_score,
        }
    }
}

// ============================================================================
// Factors
// ============================================================================

fn split_words(text: &str) -> impl Iterator<Item = &str> {
    text.split(|c: char| !c.is_alphanumeric() && c != '_')
        .filter(|s| !s.is_empty())
}

/// Distinct query terms after lowercasing, stop-word removal, and dropping
/// terms of 2 characters or fewer. Order of first appearance is kept.
pub fn extract_query_terms(query: &str) -> Vec<String> {
    let lowered = query.to_lowercase();
    let mut seen = HashSet::new();
    split_words(&lowered)
        .filter(|w| w.chars().count() > 2 && !STOP_WORDS.contains(w))
        .filter(|w| seen.insert(w.to_string()))
        .map(|w| w.to_string())
        .collect()
}

/// Fraction of `terms` present in `content` as whole words, case-insensitive,
/// plus the multi-term proximity bonus. In [0, 1].
pub fn keyword_relevance(terms: &[String], content: &str) -> f64 {
    if terms.is_empty() {
        return 0.0;
    }
    let lowered = content.to_lowercase();
    let words: HashSet<&str> = split_words(&lowered).collect();
    let matched = terms.iter().filter(|t| words.contains(t.as_str())).count();
    if matched == 0 {
        return 0.0;
    }

    let base = matched as f64 / terms.len() as f64;
    let bonus = if matched > 1 {
        (PROXIMITY_STEP * (matched - 1) as f64).min(PROXIMITY_CAP)
    } else {
        0.0
    };
    (base + bonus).min(1.0)
}

/// Step function of entry age in days. Future timestamps count as fresh.
pub fn recency_score(timestamp: &str, now: DateTime<Utc>) -> f64 {
    let Some(at) = memory_bank_core::parse_timestamp(timestamp) else {
        return UNKNOWN_AGE_RECENCY;
    };
    let age_days = (now - at).num_seconds() as f64 / SECONDS_PER_DAY;
    if age_days < 7.0 {
        1.0
    } else if age_days < 30.0 {
        0.7
    } else if age_days < 90.0 {
        0.3
    } else {
        0.1
    }
}

pub fn priority_multiplier(file_type: EntryType) -> f64 {
    match file_type {
        EntryType::Brief | EntryType::Pattern => 1.5,
        EntryType::Context => 1.3,
        EntryType::Decision => 1.2,
        EntryType::Progress | EntryType::Deprecated | EntryType::Superseded => 1.0,
    }
}

// ============================================================================
// Scorer
// ============================================================================

/// Stateless scorer. Constructed explicitly and owned by whoever uses it.
#[derive(Debug, Clone, Copy, Default)]
pub struct RelevanceScorer;

impl RelevanceScorer {
    pub fn new() -> Self {
        Self
    }

    pub fn score_entry(&self, entry: &MemoryEntry, query: &str, now: DateTime<Utc>) -> ScoreBreakdown {
        let terms = extract_query_terms(query);
        self.score_with_terms(entry, &terms, now)
    }

    fn score_with_terms(&self, entry: &MemoryEntry, terms: &[String], now: DateTime<Utc>) -> ScoreBreakdown {
        let relevance = keyword_relevance(terms, &entry.content);
        let recency = recency_score(&entry.timestamp, now);
        let priority = priority_multiplier(entry.file_type);
        ScoreBreakdown {
            relevance,
            recency,
            priority,
            final_score: relevance * recency * priority,
        }
    }

    /// Score every entry, keeping input order.
    pub fn score_entries(
        &self,
        entries: Vec<MemoryEntry>,
        query: &str,
        now: DateTime<Utc>,
    ) -> Vec<ScoredEntry> {
        let terms = extract_query_terms(query);
        entries
            .into_iter()
            .map(|entry| {
                let breakdown = self.score_with_terms(&entry, &terms, now);
                ScoredEntry::new(entry, breakdown)
            })
            .collect()
    }

    /// Stable sort by `score`, highest first. Ties keep their input order.
    pub fn rank_entries(&self, mut entries: Vec<ScoredEntry>) -> Vec<ScoredEntry> {
        entries.sort_by(|a, b| b.score.total_cmp(&a.score));
        entries
    }

    /// Drop entries scoring below `threshold`.
    pub fn filter_by_threshold(&self, entries: Vec<ScoredEntry>, threshold: f64) -> Vec<ScoredEntry> {
        entries.into_iter().filter(|e| e.score >= threshold).collect()
    }
}
