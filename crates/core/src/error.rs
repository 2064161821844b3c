//! Core Error Types
//!
//! Defines the foundational error types used across the memory bank workspace.
//! These error types are dependency-light (only thiserror + serde_json) to keep
//! the core crate small.
//!
//! The root crate extends these with storage, migration and embedding
//! variants that require heavier dependencies.

use thiserror::Error;

use crate::validation::ValidationErrors;

/// Core error type for the memory bank workspace.
#[derive(Error, Debug)]
pub enum CoreError {
    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Entry failed one or more validation rules
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationErrors),

    /// Parse errors (unknown enum codes, malformed values)
    #[error("Parse error: {0}")]
    Parse(String),
}

/// Result type alias for core errors
pub type CoreResult<T> = Result<T, CoreError>;

impl CoreError {
    /// Create a parse error
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }
}

/// Convert CoreError to a string
impl From<CoreError> for String {
    fn from(err: CoreError) -> String {
        err.to_string()
    }
}
