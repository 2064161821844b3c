//! Schema Migrations
//!
//! Forward-only versioning of the physical schema. The `schema_version`
//! ledger holds one row per applied migration; a store without a ledger is
//! at version 0.
//!
//! A run backs up the database first, then applies each pending migration
//! in its own transaction together with its ledger row. The first failure
//! stops the run: earlier migrations stay committed, the failing one rolls
//! back in full and the backup is left in place.

use std::path::PathBuf;

use chrono::Utc;
use rusqlite::params;
use rusqlite::types::Value;
use serde::{Deserialize, Serialize};

use crate::storage::database::Database;
use crate::utils::error::{AppError, AppResult};

/// One schema step.
#[derive(Debug, Clone, Copy)]
pub struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub statements: &'static [&'static str],
}

const LEDGER_DDL: &str = "CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY,
    description TEXT NOT NULL,
    applied_at TEXT NOT NULL
)";

// ============================================================================
// Migration list
// ============================================================================

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "create memory_entries",
        statements: &[
            "CREATE TABLE IF NOT EXISTS memory_entries (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                file_type TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                timestamp_unix INTEGER NOT NULL,
                tag TEXT NOT NULL,
                content TEXT NOT NULL,
                metadata TEXT,
                created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            )",
            "CREATE INDEX IF NOT EXISTS idx_memory_entries_type_time
             ON memory_entries(file_type, timestamp_unix DESC)",
        ],
    },
    Migration {
        version: 2,
        description: "add phase and progress_status columns",
        statements: &[
            "ALTER TABLE memory_entries ADD COLUMN phase TEXT",
            "ALTER TABLE memory_entries ADD COLUMN progress_status TEXT",
            "CREATE INDEX IF NOT EXISTS idx_memory_entries_phase
             ON memory_entries(phase, progress_status)",
        ],
    },
    Migration {
        version: 3,
        description: "create entry_vectors",
        statements: &["CREATE TABLE IF NOT EXISTS entry_vectors (
                entry_id INTEGER PRIMARY KEY REFERENCES memory_entries(id),
                vector BLOB NOT NULL CHECK (length(vector) = 48),
                updated_at TEXT NOT NULL
            )"],
    },
    Migration {
        version: 4,
        description: "create entry_revisions",
        statements: &[
            "CREATE TABLE IF NOT EXISTS entry_revisions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                entry_id INTEGER NOT NULL REFERENCES memory_entries(id),
                revision INTEGER NOT NULL,
                kind TEXT NOT NULL CHECK (kind IN ('edit', 'append')),
                previous_content TEXT NOT NULL,
                recorded_at TEXT NOT NULL,
                UNIQUE (entry_id, revision)
            )",
        ],
    },
    Migration {
        version: 5,
        description: "create token_metrics and query_metrics",
        statements: &[
            "CREATE TABLE IF NOT EXISTS token_metrics (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                operation TEXT NOT NULL,
                magnitude REAL NOT NULL,
                result_count INTEGER NOT NULL DEFAULT 0
            )",
            "CREATE TABLE IF NOT EXISTS query_metrics (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                operation TEXT NOT NULL,
                magnitude REAL NOT NULL,
                result_count INTEGER NOT NULL DEFAULT 0
            )",
            "CREATE INDEX IF NOT EXISTS idx_token_metrics_time ON token_metrics(timestamp DESC)",
            "CREATE INDEX IF NOT EXISTS idx_query_metrics_time ON query_metrics(timestamp DESC)",
        ],
    },
];

/// Highest version this build knows how to reach.
pub fn latest_schema_version() -> u32 {
    MIGRATIONS.last().map(|m| m.version).unwrap_or(0)
}

/// Outcome of a migration run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationReport {
    pub from_version: u32,
    pub to_version: u32,
    pub migrations_applied: usize,
    /// Pre-run snapshot; `None` when nothing was pending or there was
    /// nothing on disk to protect.
    pub backup_path: Option<PathBuf>,
}

/// A ledger row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaVersionRow {
    pub version: u32,
    pub description: String,
    pub applied_at: String,
}

// ============================================================================
// Manager
// ============================================================================

#[derive(Debug, Clone)]
pub struct MigrationManager {
    migrations: Vec<Migration>,
}

impl Default for MigrationManager {
    fn default() -> Self {
        Self::new()
    }
}

impl MigrationManager {
    pub fn new() -> Self {
        Self::with_migrations(MIGRATIONS.to_vec())
    }

    /// Use a custom migration list, sorted ascending by version.
    pub fn with_migrations(mut migrations: Vec<Migration>) -> Self {
        migrations.sort_by_key(|m| m.version);
        Self { migrations }
    }

    pub fn migrations(&self) -> &[Migration] {
        &self.migrations
    }

    /// Current schema version. No ledger means an unversioned store (0).
    pub fn current_version(&self, db: &Database) -> AppResult<u32> {
        if !ledger_exists(db)? {
            return Ok(0);
        }
        let rows = db.query_raw("SELECT COALESCE(MAX(version), 0) FROM schema_version")?;
        Ok(first_integer(&rows).unwrap_or(0) as u32)
    }

    /// Ledger rows in version order.
    pub fn history(&self, db: &Database) -> AppResult<Vec<SchemaVersionRow>> {
        if !ledger_exists(db)? {
            return Ok(Vec::new());
        }
        let rows = db.query_raw(
            "SELECT version, description, applied_at FROM schema_version ORDER BY version",
        )?;
        rows.into_iter()
            .map(|row| match row.as_slice() {
                [Value::Integer(v), Value::Text(d), Value::Text(a)] => Ok(SchemaVersionRow {
                    version: *v as u32,
                    description: d.clone(),
                    applied_at: a.clone(),
                }),
                other => Err(AppError::database(format!(
                    "unexpected schema_version row: {:?}",
                    other
                ))),
            })
            .collect()
    }

    /// Migrations above the current version, ascending.
    pub fn pending(&self, db: &Database) -> AppResult<Vec<Migration>> {
        let current = self.current_version(db)?;
        Ok(self
            .migrations
            .iter()
            .filter(|m| m.version > current)
            .copied()
            .collect())
    }

    /// Bring the schema up to date.
    ///
    /// With nothing pending this performs no writes and reports zero
    /// applied. Re-running after a failed run resumes from the ledger.
    pub fn apply_migrations(&self, db: &Database) -> AppResult<MigrationReport> {
        let from_version = self.current_version(db)?;
        let pending = self.pending(db)?;

        if pending.is_empty() {
            tracing::debug!(version = from_version, "schema up to date");
            return Ok(MigrationReport {
                from_version,
                to_version: from_version,
                migrations_applied: 0,
                backup_path: None,
            });
        }

        let backup_path = if has_user_tables(db)? {
            db.create_backup()?
        } else {
            None
        };

        let mut applied = 0;
        let mut to_version = from_version;
        for migration in &pending {
            if let Err(e) = apply_one(db, migration) {
                tracing::warn!(
                    version = migration.version,
                    applied,
                    error = %e,
                    backup = ?backup_path,
                    "migration failed, rolled back"
                );
                return Err(AppError::Migration {
                    version: migration.version,
                    applied,
                    message: e.to_string(),
                    backup: backup_path,
                });
            }
            applied += 1;
            to_version = migration.version;
            tracing::info!(
                version = migration.version,
                description = migration.description,
                "applied migration"
            );
        }

        Ok(MigrationReport {
            from_version,
            to_version,
            migrations_applied: applied,
            backup_path,
        })
    }
}

fn apply_one(db: &Database, migration: &Migration) -> AppResult<()> {
    db.transaction(|tx| {
        tx.execute_batch(LEDGER_DDL)?;
        for statement in migration.statements {
            tx.execute_batch(statement)?;
        }
        tx.execute(
            "INSERT INTO schema_version (version, description, applied_at) VALUES (?1, ?2, ?3)",
            params![
                migration.version,
                migration.description,
                Utc::now().to_rfc3339()
            ],
        )?;
        Ok(())
    })
}

fn ledger_exists(db: &Database) -> AppResult<bool> {
    let rows = db.query_raw(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'schema_version'",
    )?;
    Ok(first_integer(&rows).unwrap_or(0) > 0)
}

fn has_user_tables(db: &Database) -> AppResult<bool> {
    let rows = db.query_raw(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%'",
    )?;
    Ok(first_integer(&rows).unwrap_or(0) > 0)
}

fn first_integer(rows: &[Vec<Value>]) -> Option<i64> {
    match rows.first().and_then(|r| r.first()) {
        Some(Value::Integer(n)) => Some(*n),
        _ => None,
    }
}
