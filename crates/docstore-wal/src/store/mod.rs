//! Pluggable log stores.
//!
//! Two interchangeable backends implement [`LogStore`]: [`FileWal`] persists
//! newline-delimited JSON with fsync discipline, [`MemoryWal`] keeps
//! everything in memory for tests. Both serialize appends behind one lock,
//! buffer entries, and force a flush on commit/rollback records.

mod file;
mod memory;

pub use file::FileWal;
pub use memory::MemoryWal;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use docstore_core::{CoreError, CoreResult};

use crate::compression::CompressionConfig;
use crate::entry::{SequenceNumber, WalEntry};

/// Path value selecting the in-memory backend.
pub const MEMORY_WAL_PATH: &str = ":memory:";

/// Store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WalOptions {
    /// Substrate path; `":memory:"` selects the in-memory backend.
    pub wal_path: PathBuf,
    /// Periodic flush interval in milliseconds; `0` disables the timer.
    pub flush_interval_ms: u64,
    /// Buffer high-water mark: reaching it forces a flush.
    pub max_buffer_size: usize,
    /// Compress payloads at flush time (file backend).
    pub enable_compression: bool,
    /// Sign entries on append and verify them on read.
    pub enable_checksums: bool,
    /// Codec settings used when compression is enabled.
    pub compression: CompressionConfig,
}

impl Default for WalOptions {
    fn default() -> Self {
        Self {
            wal_path: PathBuf::from("./data/wal.log"),
            flush_interval_ms: 1000,
            max_buffer_size: 100,
            enable_compression: false,
            enable_checksums: true,
            compression: CompressionConfig::default(),
        }
    }
}

impl WalOptions {
    /// Defaults for the in-memory backend: no flush timer, larger buffer.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            wal_path: PathBuf::from(MEMORY_WAL_PATH),
            flush_interval_ms: 0,
            max_buffer_size: 1000,
            ..Self::default()
        }
    }

    /// Whether these options select the in-memory backend.
    #[must_use]
    pub fn is_memory(&self) -> bool {
        self.wal_path == Path::new(MEMORY_WAL_PATH)
    }

    /// Validate configuration.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` for a zero buffer size or an out-of-range
    /// compression level.
    pub fn validate(&self) -> CoreResult<()> {
        if self.max_buffer_size == 0 {
            return Err(CoreError::invalid_config("max_buffer_size must be > 0"));
        }
        self.compression.validate()
    }
}

/// Durable append target for log entries.
///
/// Implementations must guarantee:
/// 1. Ordering: sequence numbers are strictly monotonically increasing and
///    assigned atomically with enqueueing.
/// 2. Durability: commit/rollback entries are flushed before `append`
///    returns.
/// 3. Retryability: a failed flush leaves the buffer intact.
/// 4. Terminal close: after `close()`, mutating calls fail with `Closed`.
#[async_trait]
pub trait LogStore: Send + Sync {
    /// Appends an entry, assigning the next sequence number.
    ///
    /// The entry arrives with its sequence unassigned (zero). When checksums
    /// are enabled the store signs the entry after assignment. Commit and
    /// rollback entries, or a full buffer, force a flush before returning.
    ///
    /// # Errors
    ///
    /// `Closed` after `close()`; `Io` if a forced flush fails (the entry
    /// stays buffered for retry).
    async fn append(&self, entry: WalEntry) -> CoreResult<SequenceNumber>;

    /// Appends several entries, assigning consecutive sequence numbers in a
    /// single critical section.
    ///
    /// # Errors
    ///
    /// Same as [`LogStore::append`].
    async fn append_batch(&self, entries: Vec<WalEntry>) -> CoreResult<Vec<SequenceNumber>>;

    /// Returns all persisted entries with `sequence >= since`, ascending.
    ///
    /// Malformed, corrupt, and undecompressable records are skipped with a
    /// warning. The file backend reads only flushed entries; the in-memory
    /// backend also sees its buffer.
    ///
    /// # Errors
    ///
    /// `Io` if the substrate cannot be read.
    async fn read_from(&self, since: SequenceNumber) -> CoreResult<Vec<WalEntry>>;

    /// Removes all entries with `sequence < boundary`.
    ///
    /// The sequence counter is unaffected. The file backend rewrites the
    /// surviving suffix to a temporary file and renames it over the log, so
    /// a crash leaves either the old or the new log intact.
    ///
    /// # Errors
    ///
    /// `Closed` after `close()`; `Io` on substrate failure.
    async fn truncate_below(&self, boundary: SequenceNumber) -> CoreResult<()>;

    /// Flushes buffered entries to the substrate.
    ///
    /// # Errors
    ///
    /// `Closed` after `close()`; `Io` on write failure (buffer preserved).
    async fn flush(&self) -> CoreResult<()>;

    /// Timer tick: flushes if the buffer is non-empty, otherwise a no-op.
    ///
    /// # Errors
    ///
    /// `Closed` after `close()` (the flush timer uses this to stop).
    async fn tick(&self) -> CoreResult<()>;

    /// Highest sequence number assigned so far.
    ///
    /// # Errors
    ///
    /// Infallible for the provided backends; kept fallible for parity with
    /// the other capabilities.
    async fn current_sequence(&self) -> CoreResult<SequenceNumber>;

    /// Performs a final flush and marks the store closed. Terminal.
    ///
    /// # Errors
    ///
    /// `Io` if the final flush fails; the store stays open in that case so
    /// the caller can retry.
    async fn close(&self) -> CoreResult<()>;
}

/// Opens the backend selected by `options.wal_path` and wires the periodic
/// flush timer when an interval is configured.
///
/// # Errors
///
/// Returns `InvalidConfig` for bad options and `Io` if the file backend
/// cannot prepare its directory or scan an existing log.
pub async fn open_store(options: WalOptions) -> CoreResult<Arc<dyn LogStore>> {
    options.validate()?;

    let store: Arc<dyn LogStore> = if options.is_memory() {
        Arc::new(MemoryWal::new(options.clone()))
    } else {
        Arc::new(FileWal::open(options.clone()).await?)
    };

    if options.flush_interval_ms > 0 {
        spawn_flush_timer(&store, options.flush_interval_ms);
    }

    Ok(store)
}

/// Delivers periodic ticks to the store. The task exits when the store is
/// closed or dropped; it never keeps the store alive.
fn spawn_flush_timer(store: &Arc<dyn LogStore>, interval_ms: u64) {
    let weak = Arc::downgrade(store);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_millis(interval_ms));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick of a tokio interval fires immediately; skip it.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let Some(store) = weak.upgrade() else {
                break;
            };
            match store.tick().await {
                Ok(()) => {}
                Err(CoreError::Closed) => {
                    debug!("flush timer stopping: store closed");
                    break;
                }
                Err(e) => warn!("periodic flush failed: {e}"),
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::{EntryPayload, Operation};
    use serde_json::json;

    #[test]
    fn options_defaults() {
        let file = WalOptions::default();
        assert_eq!(file.flush_interval_ms, 1000);
        assert_eq!(file.max_buffer_size, 100);
        assert!(file.enable_checksums);
        assert!(!file.enable_compression);
        assert!(!file.is_memory());

        let memory = WalOptions::in_memory();
        assert_eq!(memory.flush_interval_ms, 0);
        assert_eq!(memory.max_buffer_size, 1000);
        assert!(memory.is_memory());
    }

    #[test]
    fn options_validation() {
        let mut options = WalOptions::default();
        assert!(options.validate().is_ok());

        options.max_buffer_size = 0;
        assert!(options.validate().is_err());

        options.max_buffer_size = 10;
        options.compression.level = 0;
        assert!(options.validate().is_err());
    }

    #[tokio::test]
    async fn factory_selects_memory_backend() {
        let store = open_store(WalOptions::in_memory()).await.unwrap();

        let seq = store
            .append(WalEntry::data(
                "tx-1",
                "users",
                Operation::Insert,
                EntryPayload::insert("u1", json!(1)),
            ))
            .await
            .unwrap();
        assert_eq!(seq, SequenceNumber::new(1));
    }

    #[tokio::test]
    async fn flush_timer_persists_buffered_entries() {
        let dir = tempfile::TempDir::new().unwrap();
        let options = WalOptions {
            wal_path: dir.path().join("wal.log"),
            flush_interval_ms: 20,
            ..WalOptions::default()
        };
        let store = open_store(options).await.unwrap();

        store
            .append(WalEntry::data(
                "tx-1",
                "users",
                Operation::Insert,
                EntryPayload::insert("u1", json!(1)),
            ))
            .await
            .unwrap();

        // A DATA entry does not force a flush; the timer must pick it up.
        tokio::time::sleep(Duration::from_millis(200)).await;
        let entries = store.read_from(SequenceNumber::ZERO).await.unwrap();
        assert_eq!(entries.len(), 1);

        store.close().await.unwrap();
    }
}
