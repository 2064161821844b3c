//! Memory Bank Core
//!
//! Entry types, tag grammar, validation rules and core error types for the
//! memory bank workspace. This crate has zero dependencies on storage,
//! embedding or async runtime code.
//!
//! ## Module Organization
//!
//! - `error` - Core error types (`CoreError`, `CoreResult`)
//! - `entry` - Entry types, typed metadata, timestamps (`MemoryEntry`, `NewEntry`)
//! - `tag` - The `[TYPE:YYYY-MM-DD]` tag grammar (`Tag`)
//! - `validation` - Entry validation rules (`ValidationIssue`, `ValidationErrors`)
//!
//! ## Design Principles
//!
//! 1. **Pure data and rules** - nothing here touches disk or the network
//! 2. **Unidirectional dependency** - this crate depends on nothing else in the workspace

pub mod entry;
pub mod error;
pub mod tag;
pub mod validation;

// ── Error Types ────────────────────────────────────────────────────────
pub use error::{CoreError, CoreResult};

// ── Entries ────────────────────────────────────────────────────────────
pub use entry::{
    format_timestamp, parse_timestamp, EntryMetadata, EntryType, MemoryEntry, NewEntry, Phase,
    ProgressStatus, METADATA_VERSION,
};

// ── Tags ───────────────────────────────────────────────────────────────
pub use tag::{Tag, TAG_PATTERN};

// ── Validation ─────────────────────────────────────────────────────────
pub use validation::{
    content_from_utf8, validate_content, validate_new_entry, validate_tag, validate_timestamp,
    ValidationErrors, ValidationIssue, DEFAULT_MAX_CONTENT_LENGTH,
};
