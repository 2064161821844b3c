//! SQLite Database
//!
//! Embedded database for persistent storage using rusqlite with r2d2 connection pooling.
//!
//! The physical engine is resolved once, at open, from the requested
//! [`StoreLocation`]: a pooled WAL-mode file engine, or a single-connection
//! in-memory engine for hosts without a writable filesystem (and for tests).
//! Callers never branch on the engine after that.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::types::Value;
use rusqlite::{Connection, Transaction};
use serde::{Deserialize, Serialize};

use crate::storage::backup;
use crate::utils::error::{AppError, AppResult, StorageErrorKind};
use crate::utils::paths::backup_dir_for;

/// Type alias for the connection pool
pub type DbPool = Pool<SqliteConnectionManager>;

const FILE_POOL_SIZE: u32 = 8;
const BUSY_TIMEOUT_MS: u32 = 5000;

// ============================================================================
// Backend selection
// ============================================================================

/// Where the store lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreLocation {
    File(PathBuf),
    InMemory,
}

impl StoreLocation {
    /// Interpret a user-supplied path. `":memory:"` and the empty string
    /// select the in-memory engine.
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match path.to_str() {
            Some("") | Some(":memory:") => Self::InMemory,
            _ => Self::File(path.to_path_buf()),
        }
    }

    pub fn file_path(&self) -> Option<&Path> {
        match self {
            Self::File(path) => Some(path),
            Self::InMemory => None,
        }
    }
}

/// Concrete storage engine behind the store interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Pooled connections to a WAL-mode database file.
    SqliteFile,
    /// One connection to a private in-memory database.
    SqliteMemory,
}

impl BackendKind {
    /// Resolve the engine for a location.
    ///
    /// A file location whose parent directory cannot be created falls back
    /// to the in-memory engine so the host still gets a working, if
    /// volatile, store.
    pub fn detect(location: &StoreLocation) -> Self {
        match location {
            StoreLocation::InMemory => Self::SqliteMemory,
            StoreLocation::File(path) => {
                let parent_ok = match path.parent() {
                    Some(parent) if !parent.as_os_str().is_empty() => {
                        std::fs::create_dir_all(parent).is_ok()
                    }
                    _ => true,
                };
                if parent_ok {
                    Self::SqliteFile
                } else {
                    tracing::warn!(
                        path = %path.display(),
                        "database directory not writable, using in-memory engine"
                    );
                    Self::SqliteMemory
                }
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SqliteFile => "sqlite-file",
            Self::SqliteMemory => "sqlite-memory",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Database
// ============================================================================

/// Database service for managing SQLite operations
#[derive(Clone)]
pub struct Database {
    pool: DbPool,
    backend: BackendKind,
    path: Option<PathBuf>,
    backup_dir: Option<PathBuf>,
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("backend", &self.backend)
            .field("path", &self.path)
            .finish()
    }
}

impl Database {
    /// Open (or create) the store at `location`.
    ///
    /// A file store is integrity-checked before the pool is built. If the
    /// file is corrupted the latest backup in the sibling `backup_dir_name`
    /// directory is restored and the check retried once; without a usable
    /// backup the open fails with `CorruptedUnrecoverable`.
    pub fn open(location: &StoreLocation, backup_dir_name: &str) -> AppResult<Self> {
        let backend = BackendKind::detect(location);
        let db = match (backend, location.file_path()) {
            (BackendKind::SqliteFile, Some(path)) => {
                Self::recover_if_corrupted(path, backup_dir_name)?;
                Self::open_file(path, backup_dir_name)?
            }
            _ => Self::new_in_memory()?,
        };

        tracing::info!(backend = %db.backend, path = ?db.path, "memory store opened");
        Ok(db)
    }

    /// Create an in-memory database.
    ///
    /// The pool holds exactly one connection that never expires: the data
    /// lives only as long as that connection.
    pub fn new_in_memory() -> AppResult<Self> {
        let manager = SqliteConnectionManager::memory().with_init(|conn| {
            conn.execute_batch("PRAGMA foreign_keys = ON;")
        });
        let pool = Pool::builder()
            .max_size(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .build(manager)
            .map_err(|e| AppError::database(format!("Failed to create connection pool: {}", e)))?;

        Ok(Self {
            pool,
            backend: BackendKind::SqliteMemory,
            path: None,
            backup_dir: None,
        })
    }

    fn open_file(path: &Path, backup_dir_name: &str) -> AppResult<Self> {
        let manager = SqliteConnectionManager::file(path).with_init(|conn| {
            conn.execute_batch(&format!(
                "PRAGMA journal_mode = WAL;
                 PRAGMA foreign_keys = ON;
                 PRAGMA busy_timeout = {};",
                BUSY_TIMEOUT_MS
            ))
        });
        let pool = Pool::builder()
            .max_size(FILE_POOL_SIZE)
            .connection_timeout(Duration::from_secs(10))
            .build(manager)
            .map_err(|e| AppError::database(format!("Failed to create connection pool: {}", e)))?;

        Ok(Self {
            pool,
            backend: BackendKind::SqliteFile,
            path: Some(path.to_path_buf()),
            backup_dir: Some(backup_dir_for(path, backup_dir_name)),
        })
    }

    /// Check a database file with a direct connection, restoring the latest
    /// backup if it is corrupted.
    fn recover_if_corrupted(path: &Path, backup_dir_name: &str) -> AppResult<()> {
        if !path.exists() {
            return Ok(());
        }

        match probe_file(path) {
            Ok(()) => Ok(()),
            Err(err) if err.storage_kind() == Some(StorageErrorKind::CorruptedRecoverable) => {
                tracing::warn!(path = %path.display(), error = %err, "database corrupted, attempting restore");
                let backup_dir = backup_dir_for(path, backup_dir_name);
                let latest = backup::latest_backup(path, &backup_dir)?.ok_or_else(|| {
                    AppError::storage(
                        StorageErrorKind::CorruptedUnrecoverable,
                        format!("{} is corrupted and no backup is available", path.display()),
                    )
                })?;
                backup::restore_backup(&latest, path)?;
                probe_file(path).map_err(|e| {
                    AppError::storage(
                        StorageErrorKind::CorruptedUnrecoverable,
                        format!("restored backup {} is unusable: {}", latest.display(), e),
                    )
                })
            }
            Err(err) => Err(err),
        }
    }

    /// Get a connection from the pool
    pub fn get_connection(&self) -> AppResult<r2d2::PooledConnection<SqliteConnectionManager>> {
        self.pool
            .get()
            .map_err(|e| AppError::database(format!("Failed to get connection: {}", e)))
    }

    pub fn backend(&self) -> BackendKind {
        self.backend
    }

    /// Database file path; `None` for the in-memory engine.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Directory pre-migration backups are written to; `None` in memory.
    pub fn backup_dir(&self) -> Option<&Path> {
        self.backup_dir.as_deref()
    }

    /// Check if the database answers queries and passes `quick_check`.
    pub fn is_healthy(&self) -> bool {
        match self.pool.get() {
            Ok(conn) => {
                conn.query_row("SELECT 1", [], |_| Ok(())).is_ok() && quick_check(&conn).is_ok()
            }
            Err(_) => false,
        }
    }

    /// Snapshot the database into the backup directory. Returns `None` for
    /// the in-memory engine, which has no file to protect.
    pub fn create_backup(&self) -> AppResult<Option<PathBuf>> {
        match (&self.path, &self.backup_dir) {
            (Some(path), Some(dir)) => {
                let conn = self.get_connection()?;
                backup::create_backup(&conn, path, dir).map(Some)
            }
            _ => Ok(None),
        }
    }

    /// Execute `f` inside one transaction. Any error rolls back the whole
    /// batch and leaves prior committed state untouched.
    pub fn transaction<T, F>(&self, f: F) -> AppResult<T>
    where
        F: FnOnce(&Transaction<'_>) -> AppResult<T>,
    {
        let mut conn = self.get_connection()?;
        let tx = conn.transaction().map_err(|e| AppError::from(e).classified())?;
        let value = f(&tx)?;
        tx.commit().map_err(|e| AppError::from(e).classified())?;
        Ok(value)
    }

    /// Raw statement passthrough for schema work.
    pub(crate) fn exec_raw(&self, sql: &str) -> AppResult<()> {
        let conn = self.get_connection()?;
        conn.execute_batch(sql)
            .map_err(|e| AppError::from(e).classified())
    }

    /// Raw query passthrough for schema work. Rows come back as dynamically
    /// typed values.
    pub(crate) fn query_raw(&self, sql: &str) -> AppResult<Vec<Vec<Value>>> {
        let conn = self.get_connection()?;
        let mut stmt = conn.prepare(sql)?;
        let width = stmt.column_count();
        let rows = stmt.query_map([], |row| {
            (0..width)
                .map(|i| row.get::<_, Value>(i))
                .collect::<Result<Vec<_>, _>>()
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}

fn probe_file(path: &Path) -> AppResult<()> {
    let conn = Connection::open(path).map_err(|e| AppError::from(e).classified())?;
    quick_check(&conn)
}

fn quick_check(conn: &Connection) -> AppResult<()> {
    let verdict: String = conn
        .query_row("PRAGMA quick_check", [], |row| row.get(0))
        .map_err(|e| AppError::from(e).classified())?;
    if verdict.eq_ignore_ascii_case("ok") {
        Ok(())
    } else {
        Err(AppError::storage(
            StorageErrorKind::CorruptedRecoverable,
            format!("integrity check failed: {}", verdict),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_db() -> AppResult<Database> {
        Database::new_in_memory()
    }

    #[test]
    fn test_database_health() {
        let db = create_test_db().unwrap();
        assert!(db.is_healthy());
        assert_eq!(db.backend(), BackendKind::SqliteMemory);
    }

    #[test]
    fn test_location_parsing() {
        assert_eq!(StoreLocation::from_path(":memory:"), StoreLocation::InMemory);
        assert_eq!(StoreLocation::from_path(""), StoreLocation::InMemory);
        assert_eq!(
            StoreLocation::from_path("/tmp/x.db"),
            StoreLocation::File(PathBuf::from("/tmp/x.db"))
        );
    }

    #[test]
    fn test_detect_file_backend() {
        let tmp = TempDir::new().unwrap();
        let location = StoreLocation::File(tmp.path().join("nested").join("memory.db"));
        assert_eq!(BackendKind::detect(&location), BackendKind::SqliteFile);
        assert!(tmp.path().join("nested").is_dir());
    }

    #[test]
    fn test_open_file_uses_wal() {
        let tmp = TempDir::new().unwrap();
        let location = StoreLocation::File(tmp.path().join("memory.db"));
        let db = Database::open(&location, "backups").unwrap();
        assert_eq!(db.backend(), BackendKind::SqliteFile);
        assert_eq!(db.backup_dir(), Some(tmp.path().join("backups").as_path()));

        let conn = db.get_connection().unwrap();
        let mode: String = conn
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))
            .unwrap();
        assert_eq!(mode.to_lowercase(), "wal");
    }

    #[test]
    fn test_transaction_rolls_back_on_error() {
        let db = create_test_db().unwrap();
        db.exec_raw("CREATE TABLE t (v INTEGER NOT NULL)").unwrap();

        let result: AppResult<()> = db.transaction(|tx| {
            tx.execute("INSERT INTO t (v) VALUES (1)", [])?;
            tx.execute("INSERT INTO t (v) VALUES (NULL)", [])?;
            Ok(())
        });
        assert!(result.is_err());

        let rows = db.query_raw("SELECT COUNT(*) FROM t").unwrap();
        assert_eq!(rows[0][0], Value::Integer(0));
    }

    #[test]
    fn test_query_raw_returns_values() {
        let db = create_test_db().unwrap();
        db.exec_raw(
            "CREATE TABLE t (a INTEGER, b TEXT);
             INSERT INTO t VALUES (1, 'x');",
        )
        .unwrap();
        let rows = db.query_raw("SELECT a, b FROM t").unwrap();
        assert_eq!(rows, vec![vec![Value::Integer(1), Value::Text("x".into())]]);
    }

    #[test]
    fn test_in_memory_backup_is_none() {
        let db = create_test_db().unwrap();
        assert!(db.create_backup().unwrap().is_none());
    }

    #[test]
    fn test_corrupted_file_without_backup_is_unrecoverable() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("memory.db");
        std::fs::write(&path, vec![0x42u8; 4096]).unwrap();

        let err = Database::open(&StoreLocation::File(path), "backups").unwrap_err();
        assert_eq!(
            err.storage_kind(),
            Some(StorageErrorKind::CorruptedUnrecoverable)
        );
    }

    #[test]
    fn test_corrupted_file_restored_from_backup() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("memory.db");
        let location = StoreLocation::File(path.clone());
        {
            let db = Database::open(&location, "backups").unwrap();
            db.exec_raw(
                "CREATE TABLE notes (body TEXT);
                 INSERT INTO notes VALUES ('survives');",
            )
            .unwrap();
            db.create_backup().unwrap();
        }

        std::fs::write(&path, vec![0x42u8; 4096]).unwrap();

        let db = Database::open(&location, "backups").unwrap();
        let rows = db.query_raw("SELECT body FROM notes").unwrap();
        assert_eq!(rows, vec![vec![Value::Text("survives".into())]]);
    }
}
