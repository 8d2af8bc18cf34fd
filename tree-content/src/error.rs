//! Error types for tree-content.

use thiserror::Error;

/// Errors that can occur while sealing, opening or framing cloud objects.
#[derive(Error, Debug)]
pub enum ContentError {
    /// Encryption operation failed.
    #[error("encryption failed: {0}")]
    EncryptionFailed(String),

    /// Decryption failed (authentication error).
    /// No details provided to prevent timing attacks.
    #[error("decryption failed")]
    DecryptionFailed,

    /// The object is shorter than its framing requires.
    #[error("truncated cloud file: need {expected} bytes, got {actual}")]
    Truncated {
        /// Bytes required.
        expected: u64,
        /// Bytes available.
        actual: u64,
    },

    /// The header is not a cloud-file header this code understands.
    #[error("invalid cloud file header: {0}")]
    InvalidHeader(String),

    /// Hash verification failed.
    #[error("hash mismatch: expected {expected}, got {actual}")]
    HashMismatch {
        /// Expected hash (hex-encoded).
        expected: String,
        /// Actual hash (hex-encoded).
        actual: String,
    },
}
