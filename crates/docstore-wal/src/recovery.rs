//! Crash recovery by transaction replay and rollback.
//!
//! At startup the engine scans the persisted log, groups entries by
//! transaction, and decides each group's fate: a group holding a COMMIT and
//! no ROLLBACK is replayed; everything else is rolled back. The commit
//! record is the durable witness of transaction outcome: a log prefix
//! observed after a crash either contains it (the transaction must be
//! reapplied) or does not (its effects must be undone).

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use docstore_core::{CoreError, CoreResult, TransactionId};

use crate::entry::{EntryKind, SequenceNumber, WalEntry};
use crate::store::LogStore;

/// Data-store hooks invoked during recovery.
///
/// The engine does not interpret operation semantics beyond ordering; the
/// handler applies or undoes the mutations.
#[async_trait]
pub trait RecoveryHandler: Send + Sync {
    /// Applies a committed transaction. `entries` are its DATA records in
    /// ascending sequence order.
    ///
    /// # Errors
    ///
    /// Any error aborts recovery and surfaces to the caller.
    async fn replay(
        &self,
        transaction_id: &TransactionId,
        entries: &[WalEntry],
    ) -> CoreResult<()>;

    /// Undoes an uncommitted or explicitly rolled-back transaction.
    /// `entries` are its DATA records in descending sequence order.
    ///
    /// # Errors
    ///
    /// Any error aborts recovery and surfaces to the caller.
    async fn rollback(
        &self,
        transaction_id: &TransactionId,
        entries: &[WalEntry],
    ) -> CoreResult<()>;
}

/// Outcome of a recovery pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryReport {
    /// Committed transactions that were replayed.
    pub transactions_replayed: usize,
    /// Uncommitted or rolled-back transactions that were undone.
    pub transactions_rolled_back: usize,
    /// Entries read from the log (markers included).
    pub entries_scanned: usize,
    /// Checkpoint markers encountered.
    pub checkpoint_markers: usize,
}

/// Scans the log at startup and drives registered handlers.
pub struct RecoveryEngine {
    store: Arc<dyn LogStore>,
    handlers: Vec<Arc<dyn RecoveryHandler>>,
}

impl RecoveryEngine {
    /// Creates an engine over the given store with no handlers registered.
    #[must_use]
    pub fn new(store: Arc<dyn LogStore>) -> Self {
        Self {
            store,
            handlers: Vec::new(),
        }
    }

    /// Registers a data-store collaborator.
    pub fn register(&mut self, handler: Arc<dyn RecoveryHandler>) {
        self.handlers.push(handler);
    }

    /// Runs recovery over the whole log.
    ///
    /// Corrupt entries were already elided by the store's read path, so the
    /// fate of each transaction is decided from the surviving subset.
    ///
    /// # Errors
    ///
    /// `SequenceViolation` when a duplicate sequence number is observed
    /// (the append contract makes this impossible, so it indicates log
    /// tampering or a store defect); handler and store errors propagate.
    pub async fn recover(&self) -> CoreResult<RecoveryReport> {
        let entries = self.store.read_from(SequenceNumber::ZERO).await?;

        let mut report = RecoveryReport {
            entries_scanned: entries.len(),
            ..RecoveryReport::default()
        };

        let mut seen = HashSet::with_capacity(entries.len());
        let mut order: Vec<TransactionId> = Vec::new();
        let mut groups: HashMap<TransactionId, Vec<WalEntry>> = HashMap::new();

        for entry in entries {
            if !seen.insert(entry.sequence) {
                return Err(CoreError::sequence_violation(format!(
                    "duplicate sequence number {} in transaction {}",
                    entry.sequence, entry.transaction_id
                )));
            }

            if entry.is_checkpoint_marker() {
                report.checkpoint_markers += 1;
                continue;
            }

            match groups.get_mut(&entry.transaction_id) {
                Some(group) => group.push(entry),
                None => {
                    order.push(entry.transaction_id.clone());
                    groups.insert(entry.transaction_id.clone(), vec![entry]);
                }
            }
        }

        for transaction_id in order {
            let Some(group) = groups.remove(&transaction_id) else {
                continue;
            };

            let has_commit = group.iter().any(|e| e.kind == EntryKind::Commit);
            let has_rollback = group.iter().any(|e| e.kind == EntryKind::Rollback);

            let mut data: Vec<WalEntry> = group
                .into_iter()
                .filter(|e| e.kind == EntryKind::Data)
                .collect();

            if has_commit && !has_rollback {
                debug!(transaction = %transaction_id, entries = data.len(), "replaying transaction");
                for handler in &self.handlers {
                    handler.replay(&transaction_id, &data).await?;
                }
                report.transactions_replayed += 1;
            } else {
                data.reverse();
                debug!(transaction = %transaction_id, entries = data.len(), "rolling back transaction");
                for handler in &self.handlers {
                    handler.rollback(&transaction_id, &data).await?;
                }
                report.transactions_rolled_back += 1;
            }
        }

        info!(
            replayed = report.transactions_replayed,
            rolled_back = report.transactions_rolled_back,
            scanned = report.entries_scanned,
            "recovery complete"
        );
        Ok(report)
    }
}
