//! Checkpoints: named boundaries that bound log growth.
//!
//! A checkpoint is made durable by writing a marker entry into the log
//! itself. Once the coordinator has proven that everything up to the marker
//! is reflected in the primary data store, it may truncate the log below
//! `checkpoint.sequence.next()`.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use docstore_core::{CheckpointId, CoreResult, TransactionId};

use crate::entry::{SequenceNumber, WalEntry};
use crate::store::LogStore;

/// A snapshot boundary in the log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Unique identifier of this checkpoint.
    #[serde(rename = "checkpointId")]
    pub checkpoint_id: CheckpointId,
    /// Wall-clock milliseconds at creation.
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    /// Sequence number of the marker entry.
    #[serde(rename = "sequenceNumber")]
    pub sequence: SequenceNumber,
    /// Transactions covered by the checkpoint. Populated by the coordinator;
    /// the core leaves it empty.
    #[serde(rename = "transactionIds")]
    pub transaction_ids: Vec<TransactionId>,
}

/// Writes checkpoint markers into a store.
pub struct CheckpointEngine {
    store: Arc<dyn LogStore>,
}

impl CheckpointEngine {
    /// Creates an engine over the given store.
    #[must_use]
    pub fn new(store: Arc<dyn LogStore>) -> Self {
        Self { store }
    }

    /// Flushes the store, appends a checkpoint marker, and flushes again so
    /// the marker itself is durable.
    ///
    /// The returned checkpoint's sequence number is the marker's position,
    /// which equals the store's post-append counter.
    ///
    /// # Errors
    ///
    /// `Closed` if the store was closed; `Io` on flush failure.
    pub async fn create_checkpoint(&self) -> CoreResult<Checkpoint> {
        self.store.flush().await?;

        let checkpoint_id = CheckpointId::new();
        let sequence = self
            .store
            .append(WalEntry::checkpoint_marker(checkpoint_id))
            .await?;
        self.store.flush().await?;

        info!(
            checkpoint = %checkpoint_id,
            sequence = sequence.value(),
            "created checkpoint"
        );

        Ok(Checkpoint {
            checkpoint_id,
            timestamp: Utc::now(),
            sequence,
            transaction_ids: Vec::new(),
        })
    }
}
