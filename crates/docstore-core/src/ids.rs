use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque identifier of a transaction as recorded in the log.
///
/// The value `"CHECKPOINT"` is reserved: entries carrying it are checkpoint
/// markers, not part of any recoverable transaction.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionId(String);

impl TransactionId {
    /// Reserved identifier used by checkpoint marker entries.
    pub const CHECKPOINT: &'static str = "CHECKPOINT";

    /// Creates a transaction identifier from an opaque string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier reserved for checkpoint markers.
    #[must_use]
    pub fn checkpoint_marker() -> Self {
        Self(Self::CHECKPOINT.to_string())
    }

    /// Whether this identifier denotes a checkpoint marker.
    #[must_use]
    pub fn is_checkpoint_marker(&self) -> bool {
        self.0 == Self::CHECKPOINT
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for TransactionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for TransactionId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Unique identifier for a checkpoint boundary.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CheckpointId(Uuid);

impl CheckpointId {
    /// Generates a new random identifier.
    #[must_use]
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates an identifier from an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the inner UUID value.
    #[must_use]
    pub const fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for CheckpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for CheckpointId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl From<Uuid> for CheckpointId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

impl From<CheckpointId> for Uuid {
    fn from(value: CheckpointId) -> Self {
        value.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transaction_id_round_trips_through_strings() {
        let id = TransactionId::new("txn-42");
        assert_eq!(id.as_str(), "txn-42");
        assert_eq!(id.to_string(), "txn-42");
        assert!(!id.is_checkpoint_marker());
    }

    #[test]
    fn checkpoint_marker_is_reserved() {
        let marker = TransactionId::checkpoint_marker();
        assert!(marker.is_checkpoint_marker());
        assert_eq!(marker.as_str(), "CHECKPOINT");

        let spoofed = TransactionId::new("CHECKPOINT");
        assert!(spoofed.is_checkpoint_marker());
    }

    #[test]
    fn checkpoint_ids_are_unique() {
        let a = CheckpointId::new();
        let b = CheckpointId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn checkpoint_id_parses_from_string() {
        let id = CheckpointId::new();
        let parsed: CheckpointId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
    }
}
