//! Push errors.

use thiserror::Error;
use tree_content::ContentError;
use tree_store::StoreError;
use tree_types::{OperationId, TreeError};

use crate::credentials::CredentialError;
use crate::transport::TransportError;

/// Errors that stop the push engine from driving an operation.
///
/// Failures reported by the server or object storage are not errors here:
/// they are recorded in the operation's counters and drive the retry policy.
#[derive(Debug, Error)]
pub enum PushError {
    /// Node graph error.
    #[error("tree error: {0}")]
    Tree(#[from] TreeError),

    /// Store error.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Encryption or framing error.
    #[error("content error: {0}")]
    Content(#[from] ContentError),

    /// Transport error.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Credential error.
    #[error("credential error: {0}")]
    Credential(#[from] CredentialError),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The operation was aborted; its ephemeral state is frozen.
    #[error("operation {0} was aborted")]
    Aborted(OperationId),

    /// No such operation in the pipeline.
    #[error("unknown operation {0}")]
    UnknownOperation(OperationId),
}

/// Convenience alias.
pub type PushResult<T> = Result<T, PushError>;
