//! Checkpoint and truncation over the file-backed log.

use std::sync::Arc;

use serde_json::json;
use tempfile::TempDir;

use docstore_wal::checkpoint::CheckpointEngine;
use docstore_wal::entry::{EntryPayload, Operation, SequenceNumber, WalEntry};
use docstore_wal::store::{FileWal, LogStore, WalOptions};

fn wal_options(dir: &TempDir) -> WalOptions {
    WalOptions {
        wal_path: dir.path().join("wal.log"),
        flush_interval_ms: 0,
        ..WalOptions::default()
    }
}

#[tokio::test]
async fn checkpoint_then_truncate_empties_the_log() {
    let dir = TempDir::new().unwrap();
    let options = wal_options(&dir);
    let store: Arc<dyn LogStore> = Arc::new(FileWal::open(options.clone()).await.unwrap());

    // 50 committed transactions, two entries each: sequences 1..=100.
    for i in 1..=50 {
        let tx = format!("T{i}");
        store
            .append(WalEntry::data(
                tx.as_str(),
                "c",
                Operation::Insert,
                EntryPayload::insert(format!("k{i}"), json!(i)),
            ))
            .await
            .unwrap();
        store
            .append(WalEntry::commit(tx.as_str(), "c", format!("k{i}")))
            .await
            .unwrap();
    }
    assert_eq!(store.current_sequence().await.unwrap().value(), 100);

    let engine = CheckpointEngine::new(store.clone());
    let checkpoint = engine.create_checkpoint().await.unwrap();
    assert_eq!(checkpoint.sequence.value(), 101);

    store
        .truncate_below(SequenceNumber::new(102))
        .await
        .unwrap();

    assert!(store.read_from(SequenceNumber::ZERO).await.unwrap().is_empty());
    assert_eq!(store.current_sequence().await.unwrap().value(), 101);

    let next = store
        .append(WalEntry::commit("T51", "c", "k51"))
        .await
        .unwrap();
    assert_eq!(next.value(), 102);
}

#[tokio::test]
async fn truncation_boundary_preserves_the_marker() {
    let dir = TempDir::new().unwrap();
    let options = wal_options(&dir);
    let store: Arc<dyn LogStore> = Arc::new(FileWal::open(options.clone()).await.unwrap());

    store
        .append(WalEntry::data(
            "T1",
            "c",
            Operation::Insert,
            EntryPayload::insert("k", json!(1)),
        ))
        .await
        .unwrap();
    store.append(WalEntry::commit("T1", "c", "k")).await.unwrap();

    let engine = CheckpointEngine::new(store.clone());
    let checkpoint = engine.create_checkpoint().await.unwrap();

    // Truncating below the marker keeps the marker itself.
    store.truncate_below(checkpoint.sequence).await.unwrap();

    let entries = store.read_from(SequenceNumber::ZERO).await.unwrap();
    assert_eq!(entries.len(), 1);
    assert!(entries[0].is_checkpoint_marker());
    assert_eq!(entries[0].sequence, checkpoint.sequence);
}

#[tokio::test]
async fn checkpoint_marker_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let options = wal_options(&dir);

    let sequence = {
        let store: Arc<dyn LogStore> = Arc::new(FileWal::open(options.clone()).await.unwrap());
        let engine = CheckpointEngine::new(store.clone());
        engine.create_checkpoint().await.unwrap().sequence
    }; // crash without close

    let reopened = FileWal::open(options).await.unwrap();
    assert_eq!(reopened.current_sequence().await.unwrap(), sequence);

    let entries = reopened.read_from(SequenceNumber::ZERO).await.unwrap();
    assert_eq!(entries.len(), 1);
    assert!(entries[0].is_checkpoint_marker());
}

#[tokio::test]
async fn truncation_is_visible_after_reopen() {
    let dir = TempDir::new().unwrap();
    let options = wal_options(&dir);

    {
        let store: Arc<dyn LogStore> = Arc::new(FileWal::open(options.clone()).await.unwrap());
        for i in 1..=10 {
            store
                .append(WalEntry::commit(format!("T{i}"), "c", format!("k{i}")))
                .await
                .unwrap();
        }
        store.truncate_below(SequenceNumber::new(6)).await.unwrap();
    }

    let reopened = FileWal::open(options).await.unwrap();
    assert_eq!(reopened.current_sequence().await.unwrap().value(), 10);
    let entries = reopened.read_from(SequenceNumber::ZERO).await.unwrap();
    let sequences: Vec<u64> = entries.iter().map(|e| e.sequence.value()).collect();
    assert_eq!(sequences, vec![6, 7, 8, 9, 10]);
}
