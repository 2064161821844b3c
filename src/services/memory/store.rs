//! Entry Store
//!
//! Durable, typed persistence of memory entries on top of [`Database`].
//! Every operation runs its SQLite work on the blocking pool under the
//! store's [`AccessGate`]: writes are serialized in submission order,
//! migrations run exclusively, reads run concurrently.
//!
//! Returned entries are independent copies; nothing handed to a caller is
//! mutated by the store afterwards.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rusqlite::types::{Type, Value};
use rusqlite::{params, params_from_iter, OptionalExtension, Transaction, TransactionBehavior};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use memory_bank_core::{
    parse_timestamp, validate_content, validate_new_entry, EntryMetadata, EntryType, MemoryEntry,
    NewEntry, ValidationErrors,
};

use crate::models::settings::MemoryBankConfig;
use crate::services::embedding::QuantizedVector;
use crate::storage::database::{Database, StoreLocation};
use crate::storage::migrations::{MigrationManager, MigrationReport};
use crate::storage::scheduler::AccessGate;
use crate::utils::error::{AppError, AppResult};

/// Rows scanned between cancellation checks.
const CANCEL_CHECK_INTERVAL: usize = 64;

/// Max bound parameters per `IN (...)` query.
const IN_CHUNK: usize = 500;

const ENTRY_COLUMNS: &str = "id, file_type, timestamp, tag, content, metadata";

// ============================================================================
// Data Types
// ============================================================================

/// A page of entries plus the total number matching, independent of the
/// page limit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub entries: Vec<MemoryEntry>,
    pub count: usize,
}

/// How an entry's content was changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RevisionKind {
    Edit,
    Append,
}

impl RevisionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RevisionKind::Edit => "edit",
            RevisionKind::Append => "append",
        }
    }

    fn from_str(s: &str) -> Option<Self> {
        match s {
            "edit" => Some(RevisionKind::Edit),
            "append" => Some(RevisionKind::Append),
            _ => None,
        }
    }
}

/// Content an entry held before a change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryRevision {
    pub entry_id: i64,
    pub revision: u32,
    pub kind: RevisionKind,
    pub previous_content: String,
    pub recorded_at: String,
}

// ============================================================================
// Store
// ============================================================================

#[derive(Clone)]
pub struct EntryStore {
    db: Database,
    gate: AccessGate,
    migrations: Arc<MigrationManager>,
    max_content_length: usize,
}

impl EntryStore {
    /// Open the store at `location` and bring its schema up to date.
    ///
    /// A missing file is created fresh. Corruption is repaired from the
    /// latest backup when possible; otherwise the error is returned and no
    /// store is produced.
    pub async fn init(
        location: StoreLocation,
        config: &MemoryBankConfig,
    ) -> AppResult<(Self, MigrationReport)> {
        let backup_dir_name = config.storage.backup_dir_name.clone();
        let db = tokio::task::spawn_blocking(move || Database::open(&location, &backup_dir_name))
            .await
            .map_err(|e| AppError::database(format!("Task join error: {}", e)))??;

        Self::with_database(db, MigrationManager::new(), config.max_content_length).await
    }

    /// Wrap an opened database, applying `migrations` before returning.
    pub async fn with_database(
        db: Database,
        migrations: MigrationManager,
        max_content_length: usize,
    ) -> AppResult<(Self, MigrationReport)> {
        let store = Self {
            db,
            gate: AccessGate::new(),
            migrations: Arc::new(migrations),
            max_content_length,
        };
        let report = store.migrate().await?;
        Ok((store, report))
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn max_content_length(&self) -> usize {
        self.max_content_length
    }

    // ========================================================================
    // Scheduling
    // ========================================================================

    pub(crate) async fn run_read<T, F>(&self, f: F) -> AppResult<T>
    where
        F: FnOnce(&Database) -> AppResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let permit = self.gate.read().await;
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || {
            let _permit = permit;
            f(&db).map_err(AppError::classified)
        })
        .await
        .map_err(|e| AppError::database(format!("Task join error: {}", e)))?
    }

    pub(crate) async fn run_write<T, F>(&self, f: F) -> AppResult<T>
    where
        F: FnOnce(&Database) -> AppResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let permit = self.gate.write().await;
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || {
            let _permit = permit;
            f(&db).map_err(AppError::classified)
        })
        .await
        .map_err(|e| AppError::database(format!("Task join error: {}", e)))?
    }

    // ========================================================================
    // Schema
    // ========================================================================

    /// Apply pending migrations with exclusive access: reads and writes
    /// queued meanwhile resume after the run commits or rolls back.
    pub async fn migrate(&self) -> AppResult<MigrationReport> {
        let permit = self.gate.exclusive().await;
        let db = self.db.clone();
        let migrations = self.migrations.clone();
        tokio::task::spawn_blocking(move || {
            let _permit = permit;
            migrations.apply_migrations(&db)
        })
        .await
        .map_err(|e| AppError::database(format!("Task join error: {}", e)))?
    }

    pub async fn schema_version(&self) -> AppResult<u32> {
        let migrations = self.migrations.clone();
        self.run_read(move |db| migrations.current_version(db)).await
    }

    /// Run `f` atomically under the write queue.
    pub async fn transaction<T, F>(&self, f: F) -> AppResult<T>
    where
        F: FnOnce(&Transaction<'_>) -> AppResult<T> + Send + 'static,
        T: Send + 'static,
    {
        self.run_write(move |db| db.transaction(f)).await
    }

    // ========================================================================
    // Write Operations
    // ========================================================================

    /// Validate and persist one entry. Nothing is written if validation or
    /// the insert fails.
    pub async fn append_entry(&self, entry: NewEntry) -> AppResult<MemoryEntry> {
        validate_new_entry(&entry, self.max_content_length)?;
        let stored = self
            .run_write(move |db| db.transaction(|tx| insert_entry(tx, entry)))
            .await?;
        tracing::debug!(id = stored.id, file_type = %stored.file_type, "entry appended");
        Ok(stored)
    }

    /// Validate and persist many entries in one transaction: all or none.
    pub async fn append_entries(&self, entries: Vec<NewEntry>) -> AppResult<Vec<MemoryEntry>> {
        for entry in &entries {
            validate_new_entry(entry, self.max_content_length)?;
        }
        self.run_write(move |db| {
            db.transaction(|tx| {
                entries
                    .into_iter()
                    .map(|e| insert_entry(tx, e))
                    .collect::<AppResult<Vec<_>>>()
            })
        })
        .await
    }

    /// Replace an entry's content, keeping the previous content as a
    /// revision. The entry's stored vector is dropped in the same
    /// transaction since it no longer matches.
    pub async fn edit_entry(&self, id: i64, content: String) -> AppResult<MemoryEntry> {
        self.revise(id, RevisionKind::Edit, content).await
    }

    /// Append `text` to an entry's content on a new line, keeping the
    /// previous content as a revision.
    pub async fn append_to_entry(&self, id: i64, text: String) -> AppResult<MemoryEntry> {
        self.revise(id, RevisionKind::Append, text).await
    }

    async fn revise(&self, id: i64, kind: RevisionKind, text: String) -> AppResult<MemoryEntry> {
        let max_len = self.max_content_length;
        self.run_write(move |db| {
            db.transaction(|tx| {
                let previous: String = tx
                    .query_row(
                        "SELECT content FROM memory_entries WHERE id = ?1",
                        params![id],
                        |row| row.get(0),
                    )
                    .optional()?
                    .ok_or_else(|| AppError::not_found(format!("Entry not found: {}", id)))?;

                let content = match kind {
                    RevisionKind::Edit => text,
                    RevisionKind::Append => format!("{}\n{}", previous, text),
                };
                let issues = validate_content(&content, max_len);
                if !issues.is_empty() {
                    return Err(ValidationErrors::from(issues).into());
                }

                let revision: u32 = tx.query_row(
                    "SELECT COALESCE(MAX(revision), 0) + 1 FROM entry_revisions WHERE entry_id = ?1",
                    params![id],
                    |row| row.get(0),
                )?;
                tx.execute(
                    "INSERT INTO entry_revisions (entry_id, revision, kind, previous_content, recorded_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![id, revision, kind.as_str(), previous, Utc::now().to_rfc3339()],
                )?;
                tx.execute(
                    "UPDATE memory_entries SET content = ?1 WHERE id = ?2",
                    params![content, id],
                )?;
                tx.execute("DELETE FROM entry_vectors WHERE entry_id = ?1", params![id])?;

                tracing::debug!(id, revision, kind = kind.as_str(), "entry revised");
                select_entry(tx, id)?
                    .ok_or_else(|| AppError::internal("revised entry vanished"))
            })
        })
        .await
    }

    /// Store (or replace) an entry's quantized vector.
    pub async fn put_vector(&self, id: i64, vector: QuantizedVector) -> AppResult<()> {
        self.run_write(move |db| {
            let conn = db.get_connection()?;
            let exists = conn
                .query_row(
                    "SELECT 1 FROM memory_entries WHERE id = ?1",
                    params![id],
                    |_| Ok(()),
                )
                .optional()?;
            if exists.is_none() {
                return Err(AppError::not_found(format!("Entry not found: {}", id)));
            }
            conn.execute(
                "INSERT OR REPLACE INTO entry_vectors (entry_id, vector, updated_at)
                 VALUES (?1, ?2, ?3)",
                params![id, &vector.as_bytes()[..], Utc::now().to_rfc3339()],
            )?;
            Ok(())
        })
        .await
    }

    // ========================================================================
    // Read Operations
    // ========================================================================

    /// At most `limit` entries of one type, newest first, with the total
    /// count of that type.
    pub async fn query_by_type(&self, file_type: EntryType, limit: usize) -> AppResult<QueryResult> {
        self.run_read(move |db| query_by_type_blocking(db, file_type, limit, None))
            .await
    }

    /// As [`query_by_type`](Self::query_by_type), checking `cancel` while
    /// scanning. A cancelled scan returns `AppError::Cancelled` and drops
    /// the rows read so far.
    pub async fn query_by_type_cancellable(
        &self,
        file_type: EntryType,
        limit: usize,
        cancel: &CancellationToken,
    ) -> AppResult<QueryResult> {
        let cancel = cancel.clone();
        self.run_read(move |db| query_by_type_blocking(db, file_type, limit, Some(&cancel)))
            .await
    }

    /// Total entries per type. Every type is present, zero if unused.
    pub async fn get_entry_counts(&self) -> AppResult<BTreeMap<EntryType, usize>> {
        self.run_read(|db| {
            let conn = db.get_connection()?;
            let mut counts: BTreeMap<EntryType, usize> =
                EntryType::all().iter().map(|t| (*t, 0)).collect();

            let mut stmt =
                conn.prepare("SELECT file_type, COUNT(*) FROM memory_entries GROUP BY file_type")?;
            let rows = stmt.query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })?;
            for row in rows {
                let (code, count) = row?;
                match EntryType::from_code(&code) {
                    Some(t) => {
                        counts.insert(t, count as usize);
                    }
                    None => tracing::warn!(file_type = %code, "unknown entry type in store"),
                }
            }
            Ok(counts)
        })
        .await
    }

    pub async fn get_entry(&self, id: i64) -> AppResult<Option<MemoryEntry>> {
        self.run_read(move |db| {
            let conn = db.get_connection()?;
            select_entry(&conn, id)
        })
        .await
    }

    /// The newest entries of any type.
    pub async fn query_recent(&self, limit: usize) -> AppResult<Vec<MemoryEntry>> {
        self.run_read(move |db| {
            let conn = db.get_connection()?;
            let sql = format!(
                "SELECT {} FROM memory_entries
                 ORDER BY timestamp_unix DESC, id DESC
                 LIMIT ?1",
                ENTRY_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params![limit as i64], row_to_entry)?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })
        .await
    }

    /// Candidate entries for selection: restricted to `types` when given,
    /// and to timestamps at or after `since` when given. Newest first.
    pub async fn load_candidates(
        &self,
        types: Option<Vec<EntryType>>,
        since: Option<DateTime<Utc>>,
        cancel: Option<CancellationToken>,
    ) -> AppResult<Vec<MemoryEntry>> {
        self.run_read(move |db| {
            let mut clauses: Vec<String> = Vec::new();
            let mut values: Vec<Value> = Vec::new();

            if let Some(types) = types.as_ref() {
                if types.is_empty() {
                    return Ok(Vec::new());
                }
                let marks = vec!["?"; types.len()].join(", ");
                clauses.push(format!("file_type IN ({})", marks));
                values.extend(types.iter().map(|t| Value::Text(t.as_str().to_string())));
            }
            if let Some(since) = since {
                clauses.push("timestamp_unix >= ?".to_string());
                values.push(Value::Integer(since.timestamp()));
            }

            let where_clause = if clauses.is_empty() {
                String::new()
            } else {
                format!("WHERE {}", clauses.join(" AND "))
            };
            let sql = format!(
                "SELECT {} FROM memory_entries {} ORDER BY timestamp_unix DESC, id DESC",
                ENTRY_COLUMNS, where_clause
            );

            let conn = db.get_connection()?;
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(values), row_to_entry)?;
            collect_cancellable(rows, cancel.as_ref())
        })
        .await
    }

    /// Revisions of an entry, oldest first.
    pub async fn entry_history(&self, id: i64) -> AppResult<Vec<EntryRevision>> {
        self.run_read(move |db| {
            let conn = db.get_connection()?;
            let mut stmt = conn.prepare(
                "SELECT entry_id, revision, kind, previous_content, recorded_at
                 FROM entry_revisions WHERE entry_id = ?1 ORDER BY revision",
            )?;
            let rows = stmt.query_map(params![id], |row| {
                let kind: String = row.get(2)?;
                Ok(EntryRevision {
                    entry_id: row.get(0)?,
                    revision: row.get(1)?,
                    kind: RevisionKind::from_str(&kind).ok_or_else(|| {
                        rusqlite::Error::FromSqlConversionFailure(
                            2,
                            Type::Text,
                            format!("unknown revision kind: {}", kind).into(),
                        )
                    })?,
                    previous_content: row.get(3)?,
                    recorded_at: row.get(4)?,
                })
            })?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })
        .await
    }

    /// Stored vectors for the given entries. Entries without a vector are
    /// absent from the map.
    pub async fn vectors_for(&self, ids: Vec<i64>) -> AppResult<HashMap<i64, QuantizedVector>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        self.run_read(move |db| {
            let conn = db.get_connection()?;
            let mut out = HashMap::with_capacity(ids.len());
            for chunk in ids.chunks(IN_CHUNK) {
                let marks = vec!["?"; chunk.len()].join(", ");
                let sql = format!(
                    "SELECT entry_id, vector FROM entry_vectors WHERE entry_id IN ({})",
                    marks
                );
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt.query_map(params_from_iter(chunk.iter()), |row| {
                    Ok((row.get::<_, i64>(0)?, row.get::<_, Vec<u8>>(1)?))
                })?;
                for row in rows {
                    let (id, blob) = row?;
                    match QuantizedVector::from_bytes(&blob) {
                        Ok(v) => {
                            out.insert(id, v);
                        }
                        Err(e) => tracing::warn!(id, error = %e, "skipping malformed vector"),
                    }
                }
            }
            Ok(out)
        })
        .await
    }
}

impl std::fmt::Debug for EntryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntryStore")
            .field("db", &self.db)
            .field("max_content_length", &self.max_content_length)
            .finish()
    }
}

// ============================================================================
// Helper functions
// ============================================================================

fn insert_entry(tx: &Transaction<'_>, entry: NewEntry) -> AppResult<MemoryEntry> {
    let parsed = parse_timestamp(&entry.timestamp)
        .ok_or_else(|| AppError::validation(format!("invalid timestamp: {}", entry.timestamp)))?;
    let metadata_json = entry.metadata.as_ref().map(|m| m.to_json()).transpose()?;
    let phase = entry.metadata.as_ref().and_then(|m| m.phase).map(|p| p.as_str());
    let status = entry
        .metadata
        .as_ref()
        .and_then(|m| m.progress_status)
        .map(|s| s.as_str());

    tx.execute(
        "INSERT INTO memory_entries
            (file_type, timestamp, timestamp_unix, tag, content, metadata, phase, progress_status)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            entry.file_type.as_str(),
            entry.timestamp,
            parsed.timestamp(),
            entry.tag,
            entry.content,
            metadata_json,
            phase,
            status,
        ],
    )?;

    Ok(MemoryEntry {
        id: tx.last_insert_rowid(),
        file_type: entry.file_type,
        timestamp: entry.timestamp,
        tag: entry.tag,
        content: entry.content,
        metadata: entry.metadata,
    })
}

fn select_entry(conn: &rusqlite::Connection, id: i64) -> AppResult<Option<MemoryEntry>> {
    let sql = format!("SELECT {} FROM memory_entries WHERE id = ?1", ENTRY_COLUMNS);
    Ok(conn.query_row(&sql, params![id], row_to_entry).optional()?)
}

fn query_by_type_blocking(
    db: &Database,
    file_type: EntryType,
    limit: usize,
    cancel: Option<&CancellationToken>,
) -> AppResult<QueryResult> {
    let mut conn = db.get_connection()?;
    // Count and page read one snapshot.
    let tx = conn.transaction_with_behavior(TransactionBehavior::Deferred)?;
    let count: i64 = tx.query_row(
        "SELECT COUNT(*) FROM memory_entries WHERE file_type = ?1",
        params![file_type.as_str()],
        |row| row.get(0),
    )?;

    let sql = format!(
        "SELECT {} FROM memory_entries WHERE file_type = ?1
         ORDER BY timestamp_unix DESC, id DESC
         LIMIT ?2",
        ENTRY_COLUMNS
    );
    let entries = {
        let mut stmt = tx.prepare(&sql)?;
        let rows = stmt.query_map(params![file_type.as_str(), limit as i64], row_to_entry)?;
        collect_cancellable(rows, cancel)?
    };
    tx.commit()?;

    Ok(QueryResult {
        entries,
        count: count as usize,
    })
}

fn collect_cancellable<I>(rows: I, cancel: Option<&CancellationToken>) -> AppResult<Vec<MemoryEntry>>
where
    I: Iterator<Item = rusqlite::Result<MemoryEntry>>,
{
    let is_cancelled = || cancel.map(|c| c.is_cancelled()).unwrap_or(false);
    if is_cancelled() {
        return Err(AppError::Cancelled);
    }

    let mut out = Vec::new();
    for (i, row) in rows.enumerate() {
        if i % CANCEL_CHECK_INTERVAL == 0 && is_cancelled() {
            tracing::debug!(scanned = i, "scan cancelled, discarding partial results");
            return Err(AppError::Cancelled);
        }
        out.push(row?);
    }
    if is_cancelled() {
        return Err(AppError::Cancelled);
    }
    Ok(out)
}

/// Convert a database row to a MemoryEntry. Unknown types and unreadable
/// metadata are errors, not silently defaulted.
fn row_to_entry(row: &rusqlite::Row) -> rusqlite::Result<MemoryEntry> {
    let code: String = row.get(1)?;
    let file_type = EntryType::from_code(&code).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            1,
            Type::Text,
            format!("unknown entry type: {}", code).into(),
        )
    })?;

    let metadata_json: Option<String> = row.get(5)?;
    let metadata = metadata_json
        .map(|json| EntryMetadata::from_json(&json))
        .transpose()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(5, Type::Text, Box::new(e)))?;

    Ok(MemoryEntry {
        id: row.get(0)?,
        file_type,
        timestamp: row.get(2)?,
        tag: row.get(3)?,
        content: row.get(4)?,
        metadata,
    })
}

// ============================================================================
// Tests
// ============================================================================
