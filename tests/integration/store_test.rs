//! Entry Store Integration Tests
//!
//! Uses file-backed SQLite in a temp directory so reopen and WAL behavior are
//! exercised, plus the in-memory engine for the quick cases.

use chrono::{TimeZone, Utc};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use memory_bank::services::memory::EntryStore;
use memory_bank::storage::StoreLocation;
use memory_bank::{
    AppError, EntryMetadata, EntryType, MemoryBankConfig, NewEntry, Phase, ProgressStatus,
    ValidationIssue,
};

// ============================================================================
// Helpers
// ============================================================================

async fn open_store(location: StoreLocation) -> EntryStore {
    let (store, _) = EntryStore::init(location, &MemoryBankConfig::default())
        .await
        .expect("Failed to open test store");
    store
}

fn scenario_a() -> NewEntry {
    NewEntry::new(EntryType::Decision, "Use SQLite")
        .with_tag("[DECISION:2025-01-15]")
        .with_timestamp("2025-01-15T00:00:00Z")
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_scenario_a_decision_roundtrip() {
    let store = open_store(StoreLocation::InMemory).await;
    store.append_entry(scenario_a()).await.unwrap();

    let result = store.query_by_type(EntryType::Decision, 10).await.unwrap();
    assert_eq!(result.count, 1);
    assert_eq!(result.entries.len(), 1);
    let entry = &result.entries[0];
    assert_eq!(entry.content, "Use SQLite");
    assert_eq!(entry.tag, "[DECISION:2025-01-15]");
    assert_eq!(entry.timestamp, "2025-01-15T00:00:00Z");
}

#[tokio::test]
async fn test_roundtrip_every_type() {
    let store = open_store(StoreLocation::InMemory).await;
    let at = Utc.with_ymd_and_hms(2025, 2, 10, 8, 0, 0).unwrap();

    for file_type in EntryType::all() {
        let entry = NewEntry::at(*file_type, format!("{} content", file_type), at);
        store.append_entry(entry.clone()).await.unwrap();

        let result = store.query_by_type(*file_type, 1).await.unwrap();
        let got = &result.entries[0];
        assert_eq!(got.content, entry.content);
        assert_eq!(got.tag, entry.tag);
        assert_eq!(got.timestamp, entry.timestamp);
    }
}

#[tokio::test]
async fn test_scenario_c_reports_both_errors() {
    let store = open_store(StoreLocation::InMemory).await;
    let entry = NewEntry::new(EntryType::Decision, "Use SQLite").with_tag("[FOO:2025-13-01]");

    match store.append_entry(entry).await {
        Err(AppError::InvalidEntry(errors)) => {
            assert_eq!(errors.len(), 2);
            assert!(errors.contains(&ValidationIssue::UnknownTagType("FOO".to_string())));
            assert!(errors.contains(&ValidationIssue::MonthOutOfRange(13)));
        }
        other => panic!("expected validation failure, got {:?}", other),
    }
    assert_eq!(store.query_by_type(EntryType::Decision, 10).await.unwrap().count, 0);
}

#[tokio::test]
async fn test_oversized_content_rejected() {
    let store = open_store(StoreLocation::InMemory).await;
    let entry = NewEntry::new(EntryType::Context, "x".repeat(10_001));
    let err = store.append_entry(entry).await.unwrap_err();
    match err {
        AppError::InvalidEntry(errors) => assert!(errors.contains(&ValidationIssue::ContentTooLong {
            length: 10_001,
            max: 10_000
        })),
        other => panic!("expected validation failure, got {:?}", other),
    }
}

#[tokio::test]
async fn test_file_store_persists_across_reopen() {
    let dir = TempDir::new().unwrap();
    let location = StoreLocation::File(dir.path().join("memory.db"));
    let metadata = EntryMetadata::default()
        .with_phase(Phase::Checkpoint)
        .with_progress_status(ProgressStatus::Done)
        .with_target("storage");

    let id = {
        let store = open_store(location.clone()).await;
        let stored = store
            .append_entry(scenario_a().with_metadata(metadata.clone()))
            .await
            .unwrap();
        store
            .append_to_entry(stored.id, "with WAL".to_string())
            .await
            .unwrap();
        stored.id
    };

    let store = open_store(location).await;
    let entry = store.get_entry(id).await.unwrap().expect("entry survives reopen");
    assert_eq!(entry.content, "Use SQLite\nwith WAL");
    assert_eq!(entry.metadata, Some(metadata));

    let history = store.entry_history(id).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].previous_content, "Use SQLite");
}

#[tokio::test]
async fn test_returned_entries_are_independent_copies() {
    let store = open_store(StoreLocation::InMemory).await;
    let stored = store.append_entry(scenario_a()).await.unwrap();
    let before = store.get_entry(stored.id).await.unwrap().unwrap();

    store.edit_entry(stored.id, "Use Postgres".to_string()).await.unwrap();

    assert_eq!(before.content, "Use SQLite");
    let after = store.get_entry(stored.id).await.unwrap().unwrap();
    assert_eq!(after.content, "Use Postgres");
}

#[tokio::test]
async fn test_concurrent_reads_during_writes() {
    let store = open_store(StoreLocation::InMemory).await;
    let mut handles = Vec::new();
    for i in 0..10 {
        let writer = store.clone();
        handles.push(tokio::spawn(async move {
            writer
                .append_entry(NewEntry::new(EntryType::Progress, format!("step {}", i)))
                .await
                .map(|_| ())
        }));
        let reader = store.clone();
        handles.push(tokio::spawn(async move {
            reader.get_entry_counts().await.map(|_| ())
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }
    let counts = store.get_entry_counts().await.unwrap();
    assert_eq!(counts[&EntryType::Progress], 10);
}

#[tokio::test]
async fn test_cancelled_scan_returns_nothing() {
    let store = open_store(StoreLocation::InMemory).await;
    for i in 0..200 {
        store
            .append_entry(NewEntry::new(EntryType::Context, format!("note {}", i)))
            .await
            .unwrap();
    }
    let token = CancellationToken::new();
    token.cancel();
    let result = store
        .query_by_type_cancellable(EntryType::Context, 500, &token)
        .await;
    assert!(matches!(result, Err(AppError::Cancelled)));
}
