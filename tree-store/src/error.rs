//! Error types for tree-store.

use tree_types::TreeError;

/// Storage layer errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The calling thread already holds the write transaction.
    #[error("write transaction already open on this thread")]
    WriteReentrancy,

    /// A lock was poisoned by a panicking holder.
    #[error("store lock poisoned")]
    Poisoned,

    /// Record encoding failed.
    #[error("record encode error: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    /// Record decoding failed.
    #[error("record decode error: {0}")]
    Decode(#[from] rmp_serde::decode::Error),

    /// The on-disk database failed.
    #[error("database error: {0}")]
    Backend(#[from] redb::Error),
}

impl From<StoreError> for TreeError {
    fn from(err: StoreError) -> Self {
        TreeError::Store(err.to_string())
    }
}
