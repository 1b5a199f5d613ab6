//! Docstore write-ahead log - durable, crash-recoverable transactional logging
//!
//! This crate provides the durability core of the collection store:
//! - Append-only ordered logging with monotonic sequence numbers
//! - Buffered flush with fsync discipline; commits force durability
//! - Per-entry SHA-256 checksums, verified on read
//! - Optional payload compression (gzip or lz4) with a threshold gate
//! - Crash recovery by transaction replay and rollback
//! - Checkpoint markers and crash-safe truncation to bound log growth
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────┐
//! │  RecoveryEngine  │  CheckpointEngine │
//! └──────────────────────────────────────┘
//!                    ↓
//!          ┌───────────────────┐
//!          │  LogStore (trait) │
//!          └───────────────────┘
//!              ↓            ↓
//!        ┌─────────┐  ┌───────────┐
//!        │ FileWal │  │ MemoryWal │
//!        └─────────┘  └───────────┘
//! ```
//!
//! # Usage Example
//!
//! ```rust,no_run
//! use docstore_wal::entry::{EntryPayload, Operation, WalEntry};
//! use docstore_wal::store::{open_store, WalOptions};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> docstore_core::CoreResult<()> {
//!     let store = open_store(WalOptions::default()).await?;
//!
//!     store
//!         .append(WalEntry::data(
//!             "tx-1",
//!             "users",
//!             Operation::Insert,
//!             EntryPayload::insert("u1", json!({"name": "ada"})),
//!         ))
//!         .await?;
//!
//!     // The commit record is flushed and fsynced before append returns.
//!     store.append(WalEntry::commit("tx-1", "users", "u1")).await?;
//!
//!     store.close().await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod checkpoint;
pub mod checksum;
pub mod compression;
pub mod entry;
pub mod recovery;
pub mod store;

// Re-export commonly used types
pub use checkpoint::{Checkpoint, CheckpointEngine};
pub use compression::{
    CompressedEntry, CompressionAlgorithm, CompressionConfig, CompressionStats, StoredEntry,
};
pub use entry::{EntryKind, EntryPayload, Operation, SequenceNumber, WalEntry};
pub use recovery::{RecoveryEngine, RecoveryHandler, RecoveryReport};
pub use store::{open_store, FileWal, LogStore, MemoryWal, WalOptions, MEMORY_WAL_PATH};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
