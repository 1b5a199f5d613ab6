//! Log entry model.
//!
//! A [`WalEntry`] is the atomic record of the write-ahead log. Entries are
//! constructed with a zero sequence number and an empty checksum; the store
//! assigns the sequence at append time and signs the entry when checksums are
//! enabled. Checkpoint markers reuse the `Data` kind with the reserved
//! transaction id (see [`TransactionId::CHECKPOINT`]).

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use docstore_core::{CheckpointId, TransactionId};

/// Monotonically increasing identity of an entry within a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SequenceNumber(u64);

impl SequenceNumber {
    /// Zero sequence (start of log; the "unassigned" value on fresh entries).
    pub const ZERO: Self = Self(0);

    /// Creates a sequence number from a raw value.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Returns the next sequence number.
    ///
    /// # Panics
    ///
    /// Panics on `u64::MAX`. Wraparound would hand out duplicate sequence
    /// numbers and break the ordering invariant of the log.
    #[must_use]
    pub fn next(&self) -> Self {
        Self(
            self.0
                .checked_add(1)
                .expect("sequence overflow: exceeded u64::MAX entries"),
        )
    }

    /// Returns the raw value.
    #[must_use]
    pub const fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SequenceNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for SequenceNumber {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<SequenceNumber> for u64 {
    fn from(seq: SequenceNumber) -> Self {
        seq.0
    }
}

/// Role of an entry within its transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EntryKind {
    /// Opens a transaction.
    Begin,
    /// Carries a document mutation (also used by checkpoint markers).
    Data,
    /// Durable witness that the transaction committed.
    Commit,
    /// Explicit abort of the transaction.
    Rollback,
}

/// Mutation recorded by an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Operation {
    /// Insert a document.
    Insert,
    /// Update a document in place.
    Update,
    /// Delete a document.
    Delete,
    /// Transaction commit control record.
    Commit,
    /// Transaction rollback control record.
    Rollback,
}

/// Collection name used by checkpoint markers.
pub const ALL_COLLECTIONS: &str = "*";

/// Typed payload of an entry.
///
/// Replaces the dynamic payload of the wire format with a tagged union: a
/// document image (key plus optional old/new values) or a checkpoint marker
/// body. The variants are distinguished on the wire by their fields, so the
/// JSON carries no extra tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EntryPayload {
    /// Checkpoint marker body. Must precede `Document` so that untagged
    /// deserialization tries the stricter shape first.
    Checkpoint {
        /// Always the literal `"checkpoint"`.
        key: String,
        /// Identifier of the checkpoint this marker records.
        #[serde(rename = "checkpointId")]
        checkpoint_id: CheckpointId,
    },
    /// Document image carried by transactional entries.
    Document {
        /// Primary key of the document within its collection.
        key: String,
        /// Prior value, when known (updates and deletes).
        #[serde(rename = "oldValue", skip_serializing_if = "Option::is_none")]
        old_value: Option<Value>,
        /// New value, when present (inserts and updates).
        #[serde(rename = "newValue", skip_serializing_if = "Option::is_none")]
        new_value: Option<Value>,
    },
}

impl EntryPayload {
    /// Document payload carrying only a key (control records, deletes of
    /// unknown prior state).
    #[must_use]
    pub fn key(key: impl Into<String>) -> Self {
        Self::Document {
            key: key.into(),
            old_value: None,
            new_value: None,
        }
    }

    /// Document payload for an insert.
    #[must_use]
    pub fn insert(key: impl Into<String>, value: Value) -> Self {
        Self::Document {
            key: key.into(),
            old_value: None,
            new_value: Some(value),
        }
    }

    /// Document payload for an update, carrying both images.
    #[must_use]
    pub fn update(key: impl Into<String>, old_value: Value, new_value: Value) -> Self {
        Self::Document {
            key: key.into(),
            old_value: Some(old_value),
            new_value: Some(new_value),
        }
    }

    /// Document payload for a delete, carrying the prior image.
    #[must_use]
    pub fn delete(key: impl Into<String>, old_value: Value) -> Self {
        Self::Document {
            key: key.into(),
            old_value: Some(old_value),
            new_value: None,
        }
    }

    /// Checkpoint marker payload.
    #[must_use]
    pub fn checkpoint(checkpoint_id: CheckpointId) -> Self {
        Self::Checkpoint {
            key: "checkpoint".to_string(),
            checkpoint_id,
        }
    }
}

/// The atomic log record.
///
/// Field names on the wire follow the on-disk contract of the log file:
/// `transactionId`, `sequenceNumber`, `timestamp` (epoch milliseconds),
/// `type`, `collectionName`, `operation`, `data`, `checksum`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalEntry {
    /// Transaction this entry belongs to.
    #[serde(rename = "transactionId")]
    pub transaction_id: TransactionId,
    /// Store-assigned position in the log; zero until appended.
    #[serde(rename = "sequenceNumber")]
    pub sequence: SequenceNumber,
    /// Wall-clock milliseconds at construction. Informational only; ordering
    /// is defined by the sequence number.
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    /// Role of the entry within its transaction.
    #[serde(rename = "type")]
    pub kind: EntryKind,
    /// Target collection, or `"*"` for checkpoint markers.
    #[serde(rename = "collectionName")]
    pub collection: String,
    /// Mutation recorded by the entry.
    pub operation: Operation,
    /// Typed payload.
    pub data: EntryPayload,
    /// Hex-encoded SHA-256 over the entry with this field blanked. Empty for
    /// freshly constructed, not-yet-persisted entries.
    pub checksum: String,
}

impl WalEntry {
    /// Builds an entry with defaults assigned: current timestamp, zero
    /// sequence, empty checksum.
    #[must_use]
    pub fn new(
        transaction_id: impl Into<TransactionId>,
        kind: EntryKind,
        collection: impl Into<String>,
        operation: Operation,
        data: EntryPayload,
    ) -> Self {
        Self {
            transaction_id: transaction_id.into(),
            sequence: SequenceNumber::ZERO,
            timestamp: Utc::now(),
            kind,
            collection: collection.into(),
            operation,
            data,
            checksum: String::new(),
        }
    }

    /// Entry opening a transaction.
    #[must_use]
    pub fn begin(
        transaction_id: impl Into<TransactionId>,
        collection: impl Into<String>,
        operation: Operation,
        key: impl Into<String>,
    ) -> Self {
        Self::new(
            transaction_id,
            EntryKind::Begin,
            collection,
            operation,
            EntryPayload::key(key),
        )
    }

    /// Data entry carrying a document mutation.
    #[must_use]
    pub fn data(
        transaction_id: impl Into<TransactionId>,
        collection: impl Into<String>,
        operation: Operation,
        data: EntryPayload,
    ) -> Self {
        Self::new(transaction_id, EntryKind::Data, collection, operation, data)
    }

    /// Commit entry for a transaction. Appending one forces a flush.
    #[must_use]
    pub fn commit(
        transaction_id: impl Into<TransactionId>,
        collection: impl Into<String>,
        key: impl Into<String>,
    ) -> Self {
        Self::new(
            transaction_id,
            EntryKind::Commit,
            collection,
            Operation::Commit,
            EntryPayload::key(key),
        )
    }

    /// Rollback entry for a transaction. Appending one forces a flush.
    #[must_use]
    pub fn rollback(
        transaction_id: impl Into<TransactionId>,
        collection: impl Into<String>,
        key: impl Into<String>,
    ) -> Self {
        Self::new(
            transaction_id,
            EntryKind::Rollback,
            collection,
            Operation::Rollback,
            EntryPayload::key(key),
        )
    }

    /// Checkpoint marker entry: `Data` kind under the reserved transaction
    /// id, addressed to every collection.
    #[must_use]
    pub fn checkpoint_marker(checkpoint_id: CheckpointId) -> Self {
        Self::new(
            TransactionId::checkpoint_marker(),
            EntryKind::Data,
            ALL_COLLECTIONS,
            Operation::Commit,
            EntryPayload::checkpoint(checkpoint_id),
        )
    }

    /// Whether this entry is a checkpoint marker.
    #[must_use]
    pub fn is_checkpoint_marker(&self) -> bool {
        self.transaction_id.is_checkpoint_marker()
    }

    /// Whether appending this entry must flush before returning.
    #[must_use]
    pub fn forces_flush(&self) -> bool {
        matches!(self.kind, EntryKind::Commit | EntryKind::Rollback)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn sequence_ordering() {
        let s1 = SequenceNumber::new(1);
        let s2 = SequenceNumber::new(2);
        assert!(s1 < s2);
        assert_eq!(s1.next(), s2);
        assert_eq!(SequenceNumber::ZERO.next().value(), 1);
    }

    #[test]
    fn new_entry_has_defaults() {
        let entry = WalEntry::data(
            "tx-1",
            "users",
            Operation::Insert,
            EntryPayload::insert("u1", json!({"name": "ada"})),
        );
        assert_eq!(entry.sequence, SequenceNumber::ZERO);
        assert!(entry.checksum.is_empty());
        assert_eq!(entry.kind, EntryKind::Data);
        assert!(!entry.forces_flush());
    }

    #[test]
    fn commit_and_rollback_force_flush() {
        assert!(WalEntry::commit("tx-1", "users", "u1").forces_flush());
        assert!(WalEntry::rollback("tx-1", "users", "u1").forces_flush());
        assert!(!WalEntry::begin("tx-1", "users", Operation::Insert, "u1").forces_flush());
    }

    #[test]
    fn wire_field_names_match_log_format() {
        let entry = WalEntry::begin("tx-1", "users", Operation::Insert, "u1");
        let json = serde_json::to_value(&entry).unwrap();

        assert_eq!(json["transactionId"], "tx-1");
        assert_eq!(json["sequenceNumber"], 0);
        assert_eq!(json["type"], "BEGIN");
        assert_eq!(json["collectionName"], "users");
        assert_eq!(json["operation"], "INSERT");
        assert_eq!(json["checksum"], "");
        assert!(json["timestamp"].is_i64() || json["timestamp"].is_u64());
    }

    #[test]
    fn entry_round_trips_through_json() {
        let entry = WalEntry::data(
            "tx-2",
            "orders",
            Operation::Update,
            EntryPayload::update("o7", json!({"qty": 1}), json!({"qty": 2})),
        );
        let line = serde_json::to_string(&entry).unwrap();
        let parsed: WalEntry = serde_json::from_str(&line).unwrap();
        assert_eq!(parsed, entry);
    }

    #[test]
    fn checkpoint_marker_shape() {
        let id = CheckpointId::new();
        let marker = WalEntry::checkpoint_marker(id);

        assert!(marker.is_checkpoint_marker());
        assert_eq!(marker.kind, EntryKind::Data);
        assert_eq!(marker.collection, ALL_COLLECTIONS);
        assert_eq!(marker.operation, Operation::Commit);

        let json = serde_json::to_value(&marker).unwrap();
        assert_eq!(json["transactionId"], "CHECKPOINT");
        assert_eq!(json["data"]["key"], "checkpoint");
        assert_eq!(json["data"]["checkpointId"], id.to_string());
    }

    #[test]
    fn payload_untagged_forms_stay_distinct() {
        let doc = EntryPayload::insert("k", json!("v"));
        let parsed: EntryPayload =
            serde_json::from_str(&serde_json::to_string(&doc).unwrap()).unwrap();
        assert_eq!(parsed, doc);

        // A document whose key happens to be "checkpoint" still parses as a
        // document because it lacks the checkpointId field.
        let tricky = EntryPayload::key("checkpoint");
        let parsed: EntryPayload =
            serde_json::from_str(&serde_json::to_string(&tricky).unwrap()).unwrap();
        assert!(matches!(parsed, EntryPayload::Document { .. }));

        let marker = EntryPayload::checkpoint(CheckpointId::new());
        let parsed: EntryPayload =
            serde_json::from_str(&serde_json::to_string(&marker).unwrap()).unwrap();
        assert!(matches!(parsed, EntryPayload::Checkpoint { .. }));
    }
}
