//! Identity types for 0k-Tree.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::TreeError;

/// Namespace for deterministic trunk node identifiers.
const TRUNK_NAMESPACE: uuid::Uuid = uuid::Uuid::from_u128(0x6b2f_1c0e_93a4_4d17_8e2a_5f0c_d1b9_7a43);

/// Local identifier of a node.
///
/// Random UUID v4 for ordinary nodes. Trunk nodes use a UUID v5 derived from
/// `(localUserID, treeID, trunk)` so they can be recomputed without a lookup.
/// Never reused.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(uuid::Uuid);

impl NodeId {
    /// Create a new random NodeId.
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    /// Derive the deterministic NodeId of a trunk.
    ///
    /// Each component is length-prefixed before hashing.
    pub fn for_trunk(local_user_id: &UserId, tree_id: &TreeId, trunk: &str) -> Self {
        let mut name = Vec::new();
        for component in [local_user_id.as_str(), tree_id.as_str(), trunk] {
            name.extend_from_slice(&(component.len() as u64).to_be_bytes());
            name.extend_from_slice(component.as_bytes());
        }
        Self(uuid::Uuid::new_v5(&TRUNK_NAMESPACE, &name))
    }

    /// Create a NodeId from an existing UUID.
    pub fn from_uuid(uuid: uuid::Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID.
    pub fn as_uuid(&self) -> &uuid::Uuid {
        &self.0
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl FromStr for NodeId {
    type Err = TreeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        uuid::Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| TreeError::InvalidData(format!("invalid node id {:?}: {}", s, e)))
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", &self.to_string()[..8])
    }
}

/// Local identifier of a [`CloudNode`](crate::CloudNode) shadow record.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CloudNodeId(uuid::Uuid);

impl CloudNodeId {
    /// Create a new random CloudNodeId.
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for CloudNodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl FromStr for CloudNodeId {
    type Err = TreeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        uuid::Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| TreeError::InvalidData(format!("invalid cloud node id {:?}: {}", s, e)))
    }
}

impl fmt::Display for CloudNodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for CloudNodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CloudNodeId({})", &self.to_string()[..8])
    }
}

/// Identifier of a queued outbound sync operation.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OperationId(uuid::Uuid);

impl OperationId {
    /// Create a new random OperationId.
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for OperationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OperationId({})", &self.to_string()[..8])
    }
}

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wrap a string identifier.
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Borrow the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

string_id!(
    /// Identifier of a user (local or remote).
    UserId
);

string_id!(
    /// Namespace partition of a treesystem (the application's tree).
    TreeId
);

string_id!(
    /// Server-assigned node identifier.
    ///
    /// Survives renames and moves, which makes it the key used to re-anchor a
    /// node after it changed location locally or remotely.
    CloudId
);

/// Size of a dirPrefix in bytes (rendered as 32 hex characters).
const DIR_PREFIX_BYTES: usize = 16;

/// Salt that scopes the encrypted cloud names of a node's children.
///
/// Trunks carry a well-known prefix; every other node gets a random one when
/// it is created, so two folders with the same name never share cloud names.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DirPrefix(String);

impl DirPrefix {
    /// Generate a new random dirPrefix.
    pub fn random() -> Self {
        let mut bytes = [0u8; DIR_PREFIX_BYTES];
        getrandom::getrandom(&mut bytes).expect("getrandom failed");
        Self(hex::encode(bytes))
    }

    /// Parse a dirPrefix, requiring 32 hex characters.
    pub fn parse(value: &str) -> Result<Self, TreeError> {
        let valid = value.len() == DIR_PREFIX_BYTES * 2
            && value.bytes().all(|b| b.is_ascii_hexdigit());
        if valid {
            Ok(Self(value.to_ascii_lowercase()))
        } else {
            Err(TreeError::InvalidData(format!("invalid dirPrefix: {:?}", value)))
        }
    }

    /// Build the well-known dirPrefix whose last byte is `index`.
    pub(crate) fn well_known(index: u8) -> Self {
        let mut bytes = [0u8; DIR_PREFIX_BYTES];
        bytes[DIR_PREFIX_BYTES - 1] = index;
        Self(hex::encode(bytes))
    }

    /// Borrow as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DirPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for DirPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DirPrefix({})", self.0)
    }
}
