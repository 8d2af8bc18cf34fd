//! Transport abstraction for 0k-Tree.
//!
//! The push engine talks to object storage and the server through this
//! trait. Every request carries credentials and the object location; the
//! server's verdict on an uploaded object is fetched separately by polling.
//!
//! # Design
//!
//! - `upload()` sends one object (or a move/delete request) and reports
//!   whether object storage accepted it
//! - `poll()` asks whether the server saw and processed the request
//!
//! Storage and server rejections are outcomes, not errors: they are counted
//! per failure domain by the pipeline. [`TransportError`] is reserved for
//! requests that never got an answer.

mod mock;

pub use mock::MockTransport;

use async_trait::async_trait;
use std::fmt;
use thiserror::Error;
use tree_types::{CloudFileExtension, CloudId, CloudLocator, OperationId};

use crate::credentials::StorageCredentials;

/// Transport errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// Connection failed.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Request timeout.
    #[error("request timeout")]
    Timeout,

    /// Unexpected HTTP status.
    #[error("http {status}: {message}")]
    Http {
        /// Status code.
        status: u32,
        /// Response body or reason.
        message: String,
    },
}

impl TransportError {
    /// HTTP status, if the request got a response.
    pub fn status(&self) -> Option<u32> {
        match self {
            TransportError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// What a request does to the object at its location.
#[derive(Clone, PartialEq, Eq)]
pub enum RequestBody {
    /// Store an encrypted object.
    Put {
        /// Which of the node's objects.
        ext: CloudFileExtension,
        /// Encrypted bytes.
        bytes: Vec<u8>,
    },
    /// Move the node's objects here from another location.
    MoveFrom(CloudLocator),
    /// Delete the node's objects.
    Delete,
}

impl fmt::Debug for RequestBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestBody::Put { ext, bytes } => f
                .debug_struct("Put")
                .field("ext", ext)
                .field("bytes", &format!("[{} bytes]", bytes.len()))
                .finish(),
            RequestBody::MoveFrom(from) => f.debug_tuple("MoveFrom").field(from).finish(),
            RequestBody::Delete => f.write_str("Delete"),
        }
    }
}

/// One request to object storage.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    /// Operation issuing the request.
    pub operation_id: OperationId,
    /// Target location.
    pub locator: CloudLocator,
    /// What to do there.
    pub body: RequestBody,
    /// Server identifier of the node, once known.
    pub cloud_id: Option<CloudId>,
    /// Change token of the last successful write, for optimistic concurrency.
    pub change_token: Option<String>,
    /// Token to resume a partially uploaded object.
    pub continuation: Option<String>,
    /// Credentials to sign the request with.
    pub credentials: StorageCredentials,
}

/// Object storage's answer to an upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    /// Accepted. Poll `request_id` for the server's verdict.
    Complete {
        /// Handle to poll.
        request_id: String,
    },
    /// Interrupted. Resend with the continuation token to resume.
    Partial {
        /// Resume token.
        continuation: String,
    },
    /// Rejected by object storage.
    Failed {
        /// HTTP status.
        status: u32,
    },
}

/// Why the server refused a request in a way retrying cannot fix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictReason {
    /// Another node already uses this name in the parent.
    NameTaken,
    /// The change token is out of date; someone else wrote first.
    StaleChangeToken,
    /// The parent does not exist on the server.
    MissingParent,
}

impl ConflictReason {
    /// Extended status code the server reports for this conflict.
    pub fn ext_status(&self) -> u32 {
        match self {
            ConflictReason::NameTaken => 1010,
            ConflictReason::StaleChangeToken => 1011,
            ConflictReason::MissingParent => 1012,
        }
    }
}

/// The server's answer to a poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// No notification yet.
    Pending,
    /// Processed and accepted.
    Processed {
        /// Server identifier of the node.
        cloud_id: CloudId,
        /// Token to send with the next write.
        change_token: String,
    },
    /// Processed and rejected.
    Rejected {
        /// Extended status code.
        code: u32,
    },
    /// Processed and refused because of a conflict.
    Conflict(ConflictReason),
}

/// Transport trait for object storage and server requests.
///
/// Implementations handle signing, endpoints and HTTP (or a mock).
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send one request.
    async fn upload(&self, request: UploadRequest) -> Result<UploadOutcome, TransportError>;

    /// Ask for the verdict on an accepted request.
    async fn poll(&self, request_id: &str) -> Result<PollOutcome, TransportError>;
}
