//! Error types for 0k-Tree.

use thiserror::Error;

/// Errors that can occur while reading or mutating the treesystem.
///
/// Lookup misses inside resolution are usually reported as `Ok(None)` by the
/// managers; `NotFound` is reserved for cases where the caller named a
/// specific entity that must exist.
#[derive(Debug, Error)]
pub enum TreeError {
    /// A required entity is missing.
    #[error("{what} not found: {id}")]
    NotFound {
        /// Kind of entity (node, user, parent, ...).
        what: &'static str,
        /// Identifier that was looked up.
        id: String,
    },

    /// A cycle or a depth guard violation was observed while walking the tree.
    #[error("corrupted tree at node {node_id}: {reason}")]
    CorruptedTree {
        /// Node at which the walk gave up.
        node_id: String,
        /// What went wrong.
        reason: String,
    },

    /// Attempted to mutate a finalized node.
    #[error("node {node_id} is immutable")]
    ImmutableNode {
        /// The immutable node.
        node_id: String,
    },

    /// A sibling with the same normalized name already exists.
    #[error("name conflict: {name:?} already exists under {parent_id}")]
    NameConflict {
        /// Parent under which the collision happened.
        parent_id: String,
        /// The colliding name.
        name: String,
    },

    /// A second, different cloudID was assigned to a node.
    #[error("cloudID already assigned for node {node_id}: {existing} (attempted {attempted})")]
    CloudIdReassigned {
        /// The node.
        node_id: String,
        /// The cloudID the node already carries.
        existing: String,
        /// The rejected cloudID.
        attempted: String,
    },

    /// The parent relationship of a node is not acceptable.
    #[error("invalid parent for node {node_id}: {reason}")]
    InvalidParent {
        /// The node being placed.
        node_id: String,
        /// Why the parent was rejected.
        reason: String,
    },

    /// Invalid data format.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// The transaction provider failed.
    #[error("storage error: {0}")]
    Store(String),

    /// MessagePack serialization failed.
    #[error("serialization failed: {0}")]
    Serialization(#[source] rmp_serde::encode::Error),

    /// MessagePack deserialization failed.
    #[error("deserialization failed: {0}")]
    Deserialization(#[source] rmp_serde::decode::Error),
}

impl TreeError {
    /// Shorthand for a [`TreeError::NotFound`].
    pub fn not_found(what: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            what,
            id: id.to_string(),
        }
    }

    /// Shorthand for a [`TreeError::CorruptedTree`].
    pub fn corrupted(node_id: impl ToString, reason: impl Into<String>) -> Self {
        Self::CorruptedTree {
            node_id: node_id.to_string(),
            reason: reason.into(),
        }
    }

    /// Whether this error is a lookup miss.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Result type alias for treesystem operations.
pub type TreeResult<T> = std::result::Result<T, TreeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = TreeError::NameConflict {
            parent_id: "p".into(),
            name: "Report.pdf".into(),
        };
        assert_eq!(
            err.to_string(),
            "name conflict: \"Report.pdf\" already exists under p"
        );
    }

    #[test]
    fn not_found_helper() {
        let err = TreeError::not_found("node", "abc");
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "node not found: abc");
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<TreeError>();
    }
}
