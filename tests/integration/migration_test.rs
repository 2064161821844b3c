//! Migration Integration Tests
//!
//! Runs the real migration list against file-backed stores: upgrade from an
//! older schema, idempotent re-runs, and a failing step.

use tempfile::TempDir;

use memory_bank::storage::backup::list_backups;
use memory_bank::storage::{Database, Migration, MigrationManager, StoreLocation};
use memory_bank::AppError;

// ============================================================================
// Helpers
// ============================================================================

fn open_file_db(dir: &TempDir) -> Database {
    Database::open(&StoreLocation::File(dir.path().join("memory.db")), "backups")
        .expect("Failed to open file-backed test database")
}

fn first_n(n: usize) -> MigrationManager {
    MigrationManager::with_migrations(MigrationManager::new().migrations()[..n].to_vec())
}

fn data_version(conn: &rusqlite::Connection) -> i64 {
    conn.query_row("PRAGMA data_version", [], |row| row.get(0))
        .unwrap()
}

// ============================================================================
// Tests
// ============================================================================

#[test]
fn test_fresh_store_reaches_latest() {
    let dir = TempDir::new().unwrap();
    let db = open_file_db(&dir);
    let manager = MigrationManager::new();

    let report = manager.apply_migrations(&db).unwrap();
    assert_eq!(report.from_version, 0);
    assert_eq!(report.to_version, 5);
    assert_eq!(report.migrations_applied, 5);
    // Nothing existed to protect.
    assert!(report.backup_path.is_none());

    let history = manager.history(&db).unwrap();
    let versions: Vec<u32> = history.iter().map(|r| r.version).collect();
    assert_eq!(versions, vec![1, 2, 3, 4, 5]);
    assert!(history.iter().all(|r| !r.description.is_empty()));
}

#[test]
fn test_second_run_is_a_no_op() {
    let dir = TempDir::new().unwrap();
    let db = open_file_db(&dir);
    let manager = MigrationManager::new();
    manager.apply_migrations(&db).unwrap();

    let history = manager.history(&db).unwrap();

    // data_version on a held connection moves if any other connection commits.
    let observer = db.get_connection().unwrap();
    let before = data_version(&observer);
    let report = manager.apply_migrations(&db).unwrap();
    assert_eq!(report.migrations_applied, 0);
    assert_eq!(report.from_version, report.to_version);
    assert!(report.backup_path.is_none());
    assert_eq!(data_version(&observer), before);
    assert_eq!(manager.history(&db).unwrap(), history);

    let backups = list_backups(db.path().unwrap(), db.backup_dir().unwrap()).unwrap();
    assert!(backups.is_empty());
}

#[test]
fn test_upgrade_takes_backup_first() {
    let dir = TempDir::new().unwrap();
    let db = open_file_db(&dir);
    first_n(2).apply_migrations(&db).unwrap();
    db.get_connection()
        .unwrap()
        .execute(
            "INSERT INTO memory_entries (file_type, timestamp, timestamp_unix, tag, content)
             VALUES ('BRIEF', '2025-01-01T00:00:00Z', 1735689600, '[BRIEF:2025-01-01]', 'kept')",
            [],
        )
        .unwrap();

    let report = MigrationManager::new().apply_migrations(&db).unwrap();
    assert_eq!(report.from_version, 2);
    assert_eq!(report.migrations_applied, 3);
    let backup = report.backup_path.expect("upgrade should back up first");
    assert!(backup.exists());
    assert!(backup
        .file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with("memory.db.") && n.ends_with(".backup")));

    let content: String = db
        .get_connection()
        .unwrap()
        .query_row("SELECT content FROM memory_entries", [], |row| row.get(0))
        .unwrap();
    assert_eq!(content, "kept");
}

#[test]
fn test_failed_step_reports_progress_and_keeps_backup() {
    const BAD: Migration = Migration {
        version: 4,
        description: "references a missing table",
        statements: &["CREATE INDEX idx_missing ON no_such_table(x)"],
    };

    let dir = TempDir::new().unwrap();
    let db = open_file_db(&dir);
    first_n(1).apply_migrations(&db).unwrap();

    let mut list = MigrationManager::new().migrations()[..3].to_vec();
    list.push(BAD);
    let err = MigrationManager::with_migrations(list)
        .apply_migrations(&db)
        .unwrap_err();

    match err {
        AppError::Migration {
            version,
            applied,
            backup,
            ..
        } => {
            assert_eq!(version, 4);
            assert_eq!(applied, 2);
            assert!(backup.is_some_and(|p| p.exists()));
        }
        other => panic!("expected migration error, got {:?}", other),
    }

    // v2 and v3 stay committed; v4 left nothing behind.
    assert_eq!(MigrationManager::new().current_version(&db).unwrap(), 3);

    // A corrected list resumes from the ledger.
    let report = MigrationManager::new().apply_migrations(&db).unwrap();
    assert_eq!(report.from_version, 3);
    assert_eq!(report.to_version, 5);
}
