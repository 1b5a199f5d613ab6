//! In-memory write-ahead log for testing.
//!
//! Preserves the async [`LogStore`] signature for substitutability but has
//! no true suspension points. Unlike the file backend, reads see buffered
//! entries immediately.

use parking_lot::Mutex;
use tracing::debug;

use docstore_core::{CoreError, CoreResult};

use crate::checksum;
use crate::entry::{SequenceNumber, WalEntry};
use crate::store::{LogStore, WalOptions};

use async_trait::async_trait;

/// In-memory [`LogStore`].
pub struct MemoryWal {
    options: WalOptions,
    inner: Mutex<Inner>,
}

struct Inner {
    /// The durable substrate stand-in: entries that survived a flush.
    log: Vec<WalEntry>,
    buffer: Vec<WalEntry>,
    sequence: SequenceNumber,
    closed: bool,
}

impl MemoryWal {
    /// Creates an empty in-memory log.
    #[must_use]
    pub fn new(options: WalOptions) -> Self {
        Self {
            options,
            inner: Mutex::new(Inner {
                log: Vec::new(),
                buffer: Vec::new(),
                sequence: SequenceNumber::ZERO,
                closed: false,
            }),
        }
    }

    /// Creates an in-memory log with default options.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(WalOptions::in_memory())
    }

    fn enqueue(&self, inner: &mut Inner, mut entry: WalEntry) -> CoreResult<SequenceNumber> {
        inner.sequence = inner.sequence.next();
        entry.sequence = inner.sequence;
        if self.options.enable_checksums {
            entry.checksum = checksum::sign(&entry)?;
        }
        inner.buffer.push(entry);
        Ok(inner.sequence)
    }

    fn flush_locked(inner: &mut Inner) {
        if inner.buffer.is_empty() {
            return;
        }
        let flushed = inner.buffer.len();
        inner.log.append(&mut inner.buffer);
        debug!(entries = flushed, "flushed in-memory log buffer");
    }
}

#[async_trait]
impl LogStore for MemoryWal {
    async fn append(&self, entry: WalEntry) -> CoreResult<SequenceNumber> {
        let mut inner = self.inner.lock();
        if inner.closed {
            return Err(CoreError::Closed);
        }

        let force = entry.forces_flush();
        let sequence = self.enqueue(&mut inner, entry)?;

        if force || inner.buffer.len() >= self.options.max_buffer_size {
            Self::flush_locked(&mut inner);
        }
        Ok(sequence)
    }

    async fn append_batch(&self, entries: Vec<WalEntry>) -> CoreResult<Vec<SequenceNumber>> {
        if entries.is_empty() {
            return Ok(Vec::new());
        }

        let mut inner = self.inner.lock();
        if inner.closed {
            return Err(CoreError::Closed);
        }

        let mut sequences = Vec::with_capacity(entries.len());
        let mut force = false;
        for entry in entries {
            force |= entry.forces_flush();
            sequences.push(self.enqueue(&mut inner, entry)?);
        }

        if force || inner.buffer.len() >= self.options.max_buffer_size {
            Self::flush_locked(&mut inner);
        }
        Ok(sequences)
    }

    async fn read_from(&self, since: SequenceNumber) -> CoreResult<Vec<WalEntry>> {
        let inner = self.inner.lock();
        let mut entries: Vec<WalEntry> = inner
            .log
            .iter()
            .chain(inner.buffer.iter())
            .filter(|e| e.sequence >= since)
            .cloned()
            .collect();
        entries.sort_by_key(|e| e.sequence);
        Ok(entries)
    }

    async fn truncate_below(&self, boundary: SequenceNumber) -> CoreResult<()> {
        let mut inner = self.inner.lock();
        if inner.closed {
            return Err(CoreError::Closed);
        }
        inner.log.retain(|e| e.sequence >= boundary);
        inner.buffer.retain(|e| e.sequence >= boundary);
        Ok(())
    }

    async fn flush(&self) -> CoreResult<()> {
        let mut inner = self.inner.lock();
        if inner.closed {
            return Err(CoreError::Closed);
        }
        Self::flush_locked(&mut inner);
        Ok(())
    }

    async fn tick(&self) -> CoreResult<()> {
        let mut inner = self.inner.lock();
        if inner.closed {
            return Err(CoreError::Closed);
        }
        Self::flush_locked(&mut inner);
        Ok(())
    }

    async fn current_sequence(&self) -> CoreResult<SequenceNumber> {
        Ok(self.inner.lock().sequence)
    }

    async fn close(&self) -> CoreResult<()> {
        let mut inner = self.inner.lock();
        if inner.closed {
            return Ok(());
        }
        Self::flush_locked(&mut inner);
        inner.closed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::{EntryPayload, Operation};
    use serde_json::json;

    fn data_entry(tx: &str, key: &str) -> WalEntry {
        WalEntry::data(
            tx,
            "users",
            Operation::Insert,
            EntryPayload::insert(key, json!({"k": key})),
        )
    }

    #[tokio::test]
    async fn buffered_entries_are_visible_immediately() {
        let wal = MemoryWal::with_defaults();

        wal.append(data_entry("tx-1", "a")).await.unwrap();

        // No flush has happened, but the in-memory backend sees the entry.
        let entries = wal.read_from(SequenceNumber::ZERO).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].sequence.value(), 1);
    }

    #[tokio::test]
    async fn entries_are_signed_on_append() {
        let wal = MemoryWal::with_defaults();
        wal.append(data_entry("tx-1", "a")).await.unwrap();

        let entries = wal.read_from(SequenceNumber::ZERO).await.unwrap();
        assert!(checksum::verify(&entries[0]).unwrap());
    }

    #[tokio::test]
    async fn read_from_filters_and_sorts() {
        let wal = MemoryWal::with_defaults();
        for i in 0..5 {
            wal.append(data_entry("tx-1", &format!("k{i}"))).await.unwrap();
        }

        let entries = wal.read_from(SequenceNumber::new(3)).await.unwrap();
        let sequences: Vec<u64> = entries.iter().map(|e| e.sequence.value()).collect();
        assert_eq!(sequences, vec![3, 4, 5]);
    }

    #[tokio::test]
    async fn truncate_below_drops_prefix() {
        let wal = MemoryWal::with_defaults();
        for i in 0..4 {
            wal.append(data_entry("tx-1", &format!("k{i}"))).await.unwrap();
        }

        wal.truncate_below(SequenceNumber::new(3)).await.unwrap();

        let entries = wal.read_from(SequenceNumber::ZERO).await.unwrap();
        let sequences: Vec<u64> = entries.iter().map(|e| e.sequence.value()).collect();
        assert_eq!(sequences, vec![3, 4]);
        assert_eq!(wal.current_sequence().await.unwrap().value(), 4);
    }

    #[tokio::test]
    async fn closed_store_rejects_mutations() {
        let wal = MemoryWal::with_defaults();
        wal.append(data_entry("tx-1", "a")).await.unwrap();
        wal.close().await.unwrap();

        assert!(matches!(
            wal.append(data_entry("tx-1", "b")).await,
            Err(CoreError::Closed)
        ));
        assert!(matches!(
            wal.truncate_below(SequenceNumber::new(1)).await,
            Err(CoreError::Closed)
        ));

        // Reads remain available after close.
        assert_eq!(wal.read_from(SequenceNumber::ZERO).await.unwrap().len(), 1);
    }
}
