use thiserror::Error;

/// Canonical error type for the durability core.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Operation was attempted on a store that has already been closed.
    #[error("write-ahead log is closed")]
    Closed,

    /// I/O error from the durable substrate.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A persisted record could not be parsed or failed its integrity check.
    #[error("corrupt log entry: {reason}")]
    CorruptEntry {
        /// Human-readable description of the corruption.
        reason: String,
    },

    /// A record claiming to be compressed could not be materialised.
    #[error("decompression failed: {reason}")]
    Decompression {
        /// Human-readable description of the failure.
        reason: String,
    },

    /// A duplicate or non-monotonic sequence number was observed.
    #[error("sequence invariant violated: {message}")]
    SequenceViolation {
        /// Details of the offending sequence numbers.
        message: String,
    },

    /// Serialization error occurred.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Deserialization error occurred.
    #[error("deserialization error: {0}")]
    Deserialization(String),

    /// Configuration value is out of range or inconsistent.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl CoreError {
    /// Creates a `CorruptEntry` variant.
    #[must_use]
    pub fn corrupt(reason: impl Into<String>) -> Self {
        Self::CorruptEntry {
            reason: reason.into(),
        }
    }

    /// Creates a `Decompression` variant.
    #[must_use]
    pub fn decompression(reason: impl Into<String>) -> Self {
        Self::Decompression {
            reason: reason.into(),
        }
    }

    /// Creates a `SequenceViolation` variant.
    #[must_use]
    pub fn sequence_violation(message: impl Into<String>) -> Self {
        Self::SequenceViolation {
            message: message.into(),
        }
    }

    /// Creates an `InvalidConfig` variant.
    #[must_use]
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_eof() || err.is_syntax() || err.is_data() {
            Self::Deserialization(err.to_string())
        } else {
            Self::Serialization(err.to_string())
        }
    }
}

/// Convenient result alias for core operations.
pub type CoreResult<T> = Result<T, CoreError>;
