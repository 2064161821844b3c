//! Memory Bank
//!
//! Durable entries and budgeted retrieval over them.
//!
//! ## Module Structure
//!
//! - `store` - `EntryStore`: persistence, revisions, vectors, scheduling
//! - `scoring` - `RelevanceScorer`: keyword, recency and priority factors
//! - `selector` - `ContextSelector`: hybrid scoring and greedy budget fill

pub mod scoring;
pub mod selector;
pub mod store;

pub use scoring::{
    extract_query_terms, keyword_relevance, priority_multiplier, recency_score, RelevanceScorer,
    ScoreBreakdown, ScoredEntry, DEFAULT_RELEVANCE_THRESHOLD,
};
pub use selector::{
    estimate_tokens, format_entry, select_from_scored, ContextSelector, Coverage,
    SelectionOptions, SelectionResult,
};
pub use store::{EntryRevision, EntryStore, QueryResult, RevisionKind};
