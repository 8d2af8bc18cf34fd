//! Queued outbound operations.

use std::fmt;
use tree_types::{unix_now, CloudLocator, CloudNodeId, NodeId, OperationId, TreeId, UserId};

/// Content sections of a file upload, in the clear.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct PutContent {
    /// File metadata section.
    pub metadata: Vec<u8>,
    /// Thumbnail section.
    pub thumbnail: Vec<u8>,
    /// File content.
    pub data: Vec<u8>,
}

impl PutContent {
    /// Content with only a data section.
    pub fn data(data: impl Into<Vec<u8>>) -> Self {
        Self {
            data: data.into(),
            ..Self::default()
        }
    }
}

impl fmt::Debug for PutContent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PutContent")
            .field("metadata", &format!("[{} bytes REDACTED]", self.metadata.len()))
            .field("thumbnail", &format!("[{} bytes REDACTED]", self.thumbnail.len()))
            .field("data", &format!("[{} bytes REDACTED]", self.data.len()))
            .finish()
    }
}

/// What an operation does on the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationKind {
    /// Upload a node's metadata record and, if given, its content object.
    Put {
        /// Node to upload.
        node_id: NodeId,
        /// Content object sections, for files.
        content: Option<PutContent>,
    },
    /// Move a node's objects from their previous location.
    Move {
        /// Node that moved or was renamed locally.
        node_id: NodeId,
        /// Where the objects are now.
        from: CloudLocator,
    },
    /// Delete objects recorded by a pending-delete shadow record.
    Delete {
        /// The shadow record.
        cloud_node_id: CloudNodeId,
    },
}

/// One queued outbound operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloudOperation {
    /// Operation identity.
    pub id: OperationId,
    /// Local user that queued it.
    pub local_user_id: UserId,
    /// Tree it applies to.
    pub tree_id: TreeId,
    /// What to do.
    pub kind: OperationKind,
    /// Unix seconds when queued.
    pub enqueued_at: u64,
}

impl CloudOperation {
    fn new(local_user_id: UserId, tree_id: TreeId, kind: OperationKind) -> Self {
        Self {
            id: OperationId::new(),
            local_user_id,
            tree_id,
            kind,
            enqueued_at: unix_now(),
        }
    }

    /// Upload `node_id`.
    pub fn put(
        local_user_id: UserId,
        tree_id: TreeId,
        node_id: NodeId,
        content: Option<PutContent>,
    ) -> Self {
        Self::new(local_user_id, tree_id, OperationKind::Put { node_id, content })
    }

    /// Move `node_id`'s objects away from `from`.
    pub fn moved(local_user_id: UserId, tree_id: TreeId, node_id: NodeId, from: CloudLocator) -> Self {
        Self::new(local_user_id, tree_id, OperationKind::Move { node_id, from })
    }

    /// Delete the objects behind a pending-delete shadow record.
    pub fn delete(local_user_id: UserId, tree_id: TreeId, cloud_node_id: CloudNodeId) -> Self {
        Self::new(local_user_id, tree_id, OperationKind::Delete { cloud_node_id })
    }

    /// The local node this operation uploads or moves.
    pub fn node_id(&self) -> Option<NodeId> {
        match &self.kind {
            OperationKind::Put { node_id, .. } | OperationKind::Move { node_id, .. } => {
                Some(*node_id)
            }
            OperationKind::Delete { .. } => None,
        }
    }

    /// Whether running `self` makes `other` redundant.
    ///
    /// A put reads the node when it runs, so it captures every later put of
    /// the same node, unless the later one carries content this one lacks.
    pub fn captures(&self, other: &CloudOperation) -> bool {
        if self.id == other.id
            || self.local_user_id != other.local_user_id
            || self.tree_id != other.tree_id
        {
            return false;
        }
        match (&self.kind, &other.kind) {
            (
                OperationKind::Put { node_id, content },
                OperationKind::Put {
                    node_id: other_node,
                    content: other_content,
                },
            ) => node_id == other_node && (content.is_some() || other_content.is_none()),
            _ => false,
        }
    }
}
