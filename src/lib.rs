//! Memory Bank - Rust Backend Library
//!
//! Durable memory for coding assistants: typed entries persisted in SQLite,
//! scored for relevance against a query and packed into a token budget.
//! It includes:
//! - Storage layer (SQLite engine, migrations, backups, config)
//! - Embedding, scoring and selection services
//! - Data models and utilities
//! - `MemoryBank`, the composition root

pub mod models;
pub mod services;
pub mod state;
pub mod storage;
pub mod utils;

pub use memory_bank_core::{
    EntryMetadata, EntryType, MemoryEntry, NewEntry, Phase, ProgressStatus, ValidationErrors,
    ValidationIssue,
};
pub use models::settings::{MemoryBankConfig, SettingsUpdate};
pub use services::memory::{SelectionOptions, SelectionResult};
pub use state::{HealthReport, MemoryBank};
pub use storage::StoreLocation;
pub use utils::error::{AppError, AppResult};
