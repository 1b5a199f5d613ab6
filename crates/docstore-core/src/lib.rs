//! Core domain types for the docstore durability layer.

pub mod error;
pub mod ids;

pub use error::{CoreError, CoreResult};
pub use ids::{CheckpointId, TransactionId};
