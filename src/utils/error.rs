//! Error Handling
//!
//! Unified error types for the memory bank.
//! Uses thiserror for ergonomic error definitions.

use std::fmt;
use std::path::PathBuf;

use memory_bank_core::{CoreError, ValidationErrors};
use rusqlite::ErrorCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::services::embedding::EmbeddingError;

/// Classification of a storage failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageErrorKind {
    /// The file is damaged but a backup restore may recover it.
    CorruptedRecoverable,
    /// Read-only media, disk fault or a damaged file with no usable backup.
    /// The store stays inactive.
    CorruptedUnrecoverable,
    /// Lock contention or similar; retryable at the caller's discretion.
    Transient,
}

impl StorageErrorKind {
    /// Map a SQLite failure onto the storage taxonomy.
    ///
    /// Returns `None` for errors that are not storage faults (bad SQL,
    /// constraint violations, type mismatches).
    pub fn classify(err: &rusqlite::Error) -> Option<Self> {
        let code = err.sqlite_error_code()?;
        match code {
            ErrorCode::DatabaseCorrupt | ErrorCode::NotADatabase => {
                Some(Self::CorruptedRecoverable)
            }
            ErrorCode::ReadOnly
            | ErrorCode::CannotOpen
            | ErrorCode::DiskFull
            | ErrorCode::PermissionDenied
            | ErrorCode::SystemIoFailure => Some(Self::CorruptedUnrecoverable),
            ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked => Some(Self::Transient),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CorruptedRecoverable => "corrupted-recoverable",
            Self::CorruptedUnrecoverable => "corrupted-unrecoverable",
            Self::Transient => "transient",
        }
    }
}

impl fmt::Display for StorageErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Application-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    /// Database errors (pool, connection setup)
    #[error("Database error: {0}")]
    Database(String),

    /// SQLite errors (auto-converted from rusqlite::Error)
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Classified storage faults
    #[error("Storage error ({kind}): {message}")]
    Storage {
        kind: StorageErrorKind,
        message: String,
    },

    /// A schema migration failed and was rolled back
    #[error("Migration error: v{version} failed after {applied} applied migration(s): {message}")]
    Migration {
        version: u32,
        applied: usize,
        message: String,
        backup: Option<PathBuf>,
    },

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// File I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Entry rejected before persistence
    #[error("Validation error: {0}")]
    InvalidEntry(#[from] ValidationErrors),

    /// Other validation errors (arguments, config values)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Embedding backend errors
    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    /// A long-running scan was cancelled; partial results were discarded
    #[error("Operation cancelled")]
    Cancelled,

    /// Not found errors
    #[error("Not found: {0}")]
    NotFound(String),

    /// Generic internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for application errors
pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    /// Create a database error
    pub fn database(msg: impl Into<String>) -> Self {
        Self::Database(msg.into())
    }

    /// Create a classified storage error
    pub fn storage(kind: StorageErrorKind, msg: impl Into<String>) -> Self {
        Self::Storage {
            kind,
            message: msg.into(),
        }
    }

    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a not found error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// The storage classification of this error, if it is a storage fault.
    pub fn storage_kind(&self) -> Option<StorageErrorKind> {
        match self {
            Self::Storage { kind, .. } => Some(*kind),
            Self::Sqlite(err) => StorageErrorKind::classify(err),
            _ => None,
        }
    }

    /// Promote a raw SQLite error to a classified storage error when it is
    /// a storage fault; other errors pass through unchanged.
    pub fn classified(self) -> Self {
        match self {
            Self::Sqlite(err) => match StorageErrorKind::classify(&err) {
                Some(kind) => Self::storage(kind, err.to_string()),
                None => Self::Sqlite(err),
            },
            other => other,
        }
    }
}

impl From<CoreError> for AppError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Serialization(e) => Self::Serialization(e),
            CoreError::Validation(e) => Self::InvalidEntry(e),
            CoreError::Parse(msg) => Self::Validation(msg),
        }
    }
}

impl From<r2d2::Error> for AppError {
    fn from(err: r2d2::Error) -> Self {
        Self::database(format!("connection pool: {}", err))
    }
}

/// Convert AppError to a string for presentation layers
impl From<AppError> for String {
    fn from(err: AppError) -> String {
        err.to_string()
    }
}
