//! Database Backups
//!
//! File-level snapshots taken before schema changes, and the restore path
//! used when a store is found corrupted on open.
//!
//! Backups live in a sibling directory of the database file and are named
//! `<dbfile>.<YYYY-MM-DDTHH-MM-SS>.backup` (no colons, no milliseconds).

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, DatabaseName};

use crate::utils::error::{AppError, AppResult};
use crate::utils::paths::ensure_dir;

const BACKUP_EXTENSION: &str = "backup";
const BACKUP_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H-%M-%S";

/// Backup file name for `db_path` taken at `at`.
pub fn backup_file_name(db_path: &Path, at: DateTime<Utc>) -> String {
    format!(
        "{}.{}.{}",
        db_file_name(db_path),
        at.format(BACKUP_TIMESTAMP_FORMAT),
        BACKUP_EXTENSION
    )
}

fn db_file_name(db_path: &Path) -> String {
    db_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "memory.db".to_string())
}

/// Snapshot the main database behind `conn` into `backup_dir`.
///
/// Uses the SQLite online backup API so the copy is consistent even with
/// a WAL file present. A second backup within the same second gets a
/// numeric suffix instead of overwriting the first.
pub fn create_backup(conn: &Connection, db_path: &Path, backup_dir: &Path) -> AppResult<PathBuf> {
    ensure_dir(backup_dir)?;

    let base = backup_file_name(db_path, Utc::now());
    let mut target = backup_dir.join(&base);
    let mut n = 1;
    while target.exists() {
        let stem = base.trim_end_matches(&format!(".{}", BACKUP_EXTENSION));
        target = backup_dir.join(format!("{}-{}.{}", stem, n, BACKUP_EXTENSION));
        n += 1;
    }

    conn.backup(DatabaseName::Main, &target, None)
        .map_err(|e| AppError::database(format!("Failed to back up to {}: {}", target.display(), e)))?;

    tracing::info!(backup = %target.display(), "database backup created");
    Ok(target)
}

/// All backups of `db_path` in `backup_dir`, oldest first.
pub fn list_backups(db_path: &Path, backup_dir: &Path) -> AppResult<Vec<PathBuf>> {
    if !backup_dir.is_dir() {
        return Ok(Vec::new());
    }

    let prefix = format!("{}.", db_file_name(db_path));
    let suffix = format!(".{}", BACKUP_EXTENSION);

    let mut found: Vec<(SystemTime, usize, PathBuf)> = Vec::new();
    for entry in fs::read_dir(backup_dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if !(name.starts_with(&prefix) && name.ends_with(&suffix)) {
            continue;
        }
        let modified = entry
            .metadata()
            .and_then(|m| m.modified())
            .unwrap_or(SystemTime::UNIX_EPOCH);
        // Same-second suffixes are longer and sort after their base name.
        found.push((modified, name.len(), entry.path()));
    }

    found.sort();
    Ok(found.into_iter().map(|(_, _, path)| path).collect())
}

/// The most recent backup of `db_path`, if any.
pub fn latest_backup(db_path: &Path, backup_dir: &Path) -> AppResult<Option<PathBuf>> {
    Ok(list_backups(db_path, backup_dir)?.pop())
}

/// Replace the database file with a backup copy.
///
/// Stale `-wal`/`-shm` siblings are removed first so SQLite does not replay
/// a journal that belongs to the damaged file. No connection to `db_path`
/// may be open while this runs.
pub fn restore_backup(backup: &Path, db_path: &Path) -> AppResult<()> {
    if !backup.is_file() {
        return Err(AppError::not_found(format!(
            "backup file does not exist: {}",
            backup.display()
        )));
    }

    for sibling in ["-wal", "-shm"] {
        let mut name = db_path.as_os_str().to_owned();
        name.push(sibling);
        let path = PathBuf::from(name);
        if path.exists() {
            fs::remove_file(&path)?;
        }
    }

    fs::copy(backup, db_path)?;
    tracing::warn!(
        backup = %backup.display(),
        database = %db_path.display(),
        "database restored from backup"
    );
    Ok(())
}
