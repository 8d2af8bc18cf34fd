//! The node graph.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::{CloudId, DirPrefix, NodeId, Region, TreeError, TreeId, UserId};

/// Size of a node's file encryption key (256 bits).
pub const ENCRYPTION_KEY_SIZE: usize = 32;

/// Current unix time in seconds.
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// The top-level containers every local user gets in each tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Trunk {
    /// The user's home "directory".
    Home,
    /// Application preferences.
    Prefs,
    /// Inbound messages.
    Inbox,
    /// Outbound messages.
    Outbox,
    /// The user's avatar.
    Avatar,
}

impl Trunk {
    /// Every trunk, in provisioning order.
    pub const ALL: [Trunk; 5] = [
        Trunk::Home,
        Trunk::Prefs,
        Trunk::Inbox,
        Trunk::Outbox,
        Trunk::Avatar,
    ];

    /// Stable name, used in paths and for deterministic identity.
    pub fn as_str(&self) -> &'static str {
        match self {
            Trunk::Home => "home",
            Trunk::Prefs => "prefs",
            Trunk::Inbox => "inbox",
            Trunk::Outbox => "outbox",
            Trunk::Avatar => "avatar",
        }
    }

    /// The hard-coded dirPrefix of this trunk.
    pub fn dir_prefix(&self) -> DirPrefix {
        let index = match self {
            Trunk::Home => 0,
            Trunk::Prefs => 1,
            Trunk::Inbox => 2,
            Trunk::Outbox => 3,
            Trunk::Avatar => 4,
        };
        DirPrefix::well_known(index)
    }

    /// The trunk owning a well-known dirPrefix, if any.
    pub fn for_dir_prefix(prefix: &DirPrefix) -> Option<Trunk> {
        Trunk::ALL.into_iter().find(|t| t.dir_prefix() == *prefix)
    }
}

impl fmt::Display for Trunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Trunk {
    type Err = TreeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Trunk::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| TreeError::InvalidData(format!("unknown trunk: {:?}", s)))
    }
}

/// Explicit storage location of a subtree.
///
/// Used when a subtree of one user's tree is physically hosted in another
/// user's bucket (shared folders).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Anchor {
    /// The user owning the storage.
    pub owner_id: UserId,
    /// Bucket holding the subtree.
    pub bucket: String,
    /// Region of the bucket.
    pub region: Region,
}

/// Permission set of one share-list entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permissions {
    /// May read the node.
    pub read: bool,
    /// May modify the node.
    pub write: bool,
    /// May change the share list.
    pub share: bool,
    /// May remove themselves from the share list.
    pub leave: bool,
}

impl Permissions {
    /// Full owner permissions (`rws`).
    pub fn owner() -> Self {
        Self {
            read: true,
            write: true,
            share: true,
            leave: false,
        }
    }

    /// Read-only permissions (`r`).
    pub fn read_only() -> Self {
        Self {
            read: true,
            ..Self::default()
        }
    }
}

impl fmt::Display for Permissions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (flag, c) in [
            (self.read, 'r'),
            (self.write, 'w'),
            (self.share, 's'),
            (self.leave, 'L'),
        ] {
            if flag {
                write!(f, "{}", c)?;
            }
        }
        Ok(())
    }
}

impl FromStr for Permissions {
    type Err = TreeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut perms = Permissions::default();
        for c in s.chars() {
            match c {
                'r' => perms.read = true,
                'w' => perms.write = true,
                's' => perms.share = true,
                'L' => perms.leave = true,
                other => {
                    return Err(TreeError::InvalidData(format!(
                        "unknown permission flag: {:?}",
                        other
                    )))
                }
            }
        }
        Ok(perms)
    }
}

/// Who may access a node, keyed by `UID:<userID>`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareList {
    entries: BTreeMap<String, Permissions>,
}

impl ShareList {
    /// Create an empty share list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Share list granting the given user owner permissions.
    pub fn for_owner(user_id: &UserId) -> Self {
        let mut list = Self::new();
        list.add_user(user_id, Permissions::owner());
        list
    }

    fn user_key(user_id: &UserId) -> String {
        format!("UID:{}", user_id)
    }

    /// Add or replace the entry of a user.
    pub fn add_user(&mut self, user_id: &UserId, permissions: Permissions) {
        self.entries.insert(Self::user_key(user_id), permissions);
    }

    /// Permissions granted to a user.
    pub fn user(&self, user_id: &UserId) -> Option<Permissions> {
        self.entries.get(&Self::user_key(user_id)).copied()
    }

    /// Remove a user. Returns whether an entry was removed.
    pub fn remove_user(&mut self, user_id: &UserId) -> bool {
        self.entries.remove(&Self::user_key(user_id)).is_some()
    }

    /// Iterate over `(key, permissions)` in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Permissions)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the list is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Per-node file encryption key.
///
/// Zeroized on drop; never printed.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct EncryptionKey([u8; ENCRYPTION_KEY_SIZE]);

impl EncryptionKey {
    /// Generate a new random key.
    pub fn random() -> Self {
        let mut bytes = [0u8; ENCRYPTION_KEY_SIZE];
        getrandom::getrandom(&mut bytes).expect("getrandom failed");
        Self(bytes)
    }

    /// Wrap raw key bytes.
    pub fn from_bytes(bytes: [u8; ENCRYPTION_KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Borrow the raw key bytes.
    pub fn as_bytes(&self) -> &[u8; ENCRYPTION_KEY_SIZE] {
        &self.0
    }
}

impl fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EncryptionKey([REDACTED])")
    }
}

/// Whether a node is an ordinary tree element or a trunk (root container).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeKind {
    /// Ordinary node with a parent.
    Regular,
    /// Root container.
    Trunk(Trunk),
}

/// A treesystem element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    /// Local, stable identifier.
    pub id: NodeId,
    /// Parent node (`None` only for trunks).
    pub parent_id: Option<NodeId>,
    /// Cleartext name.
    pub name: String,
    /// Local user this node belongs to.
    pub local_user_id: UserId,
    /// Tree (namespace partition).
    pub tree_id: TreeId,
    /// Server-assigned identifier. Use [`Node::set_cloud_id`] to assign it.
    cloud_id: Option<CloudId>,
    /// Salt scoping the cloud names of this node's children.
    pub dir_prefix: DirPrefix,
    /// Target of a pointer node.
    pub pointee_id: Option<NodeId>,
    /// Explicit storage location override.
    pub anchor: Option<Anchor>,
    /// Permissions.
    pub share_list: ShareList,
    /// Finalized nodes refuse mutation.
    pub immutable: bool,
    /// File encryption key.
    pub encryption_key: EncryptionKey,
    /// Unix seconds of the last local change.
    pub last_modified: u64,
    /// Regular node or trunk.
    pub kind: NodeKind,
}

impl Node {
    /// Create a new ordinary node under `parent_id`.
    pub fn new(
        parent_id: NodeId,
        name: impl Into<String>,
        local_user_id: UserId,
        tree_id: TreeId,
    ) -> Self {
        Self {
            id: NodeId::new(),
            parent_id: Some(parent_id),
            name: name.into(),
            local_user_id,
            tree_id,
            cloud_id: None,
            dir_prefix: DirPrefix::random(),
            pointee_id: None,
            anchor: None,
            share_list: ShareList::new(),
            immutable: false,
            encryption_key: EncryptionKey::random(),
            last_modified: unix_now(),
            kind: NodeKind::Regular,
        }
    }

    /// Create the trunk node for `(local_user_id, tree_id, trunk)`.
    ///
    /// The id and dirPrefix are deterministic; the node is immutable and
    /// its share list grants the local user owner permissions.
    pub fn new_trunk(local_user_id: UserId, tree_id: TreeId, trunk: Trunk) -> Self {
        Self {
            id: NodeId::for_trunk(&local_user_id, &tree_id, trunk.as_str()),
            parent_id: None,
            name: trunk.as_str().to_string(),
            share_list: ShareList::for_owner(&local_user_id),
            local_user_id,
            tree_id,
            cloud_id: None,
            dir_prefix: trunk.dir_prefix(),
            pointee_id: None,
            anchor: None,
            immutable: true,
            encryption_key: EncryptionKey::random(),
            last_modified: unix_now(),
            kind: NodeKind::Trunk(trunk),
        }
    }

    /// Turn this node into a pointer to `pointee_id`.
    pub fn with_pointee(mut self, pointee_id: NodeId) -> Self {
        self.pointee_id = Some(pointee_id);
        self
    }

    /// Give this node an explicit storage anchor.
    pub fn with_anchor(mut self, anchor: Anchor) -> Self {
        self.anchor = Some(anchor);
        self
    }

    /// Whether this node points at another node.
    pub fn is_pointer(&self) -> bool {
        self.pointee_id.is_some()
    }

    /// The trunk this node is, if it is one.
    pub fn trunk(&self) -> Option<Trunk> {
        match self.kind {
            NodeKind::Trunk(trunk) => Some(trunk),
            NodeKind::Regular => None,
        }
    }

    /// Whether this node is a trunk.
    pub fn is_trunk(&self) -> bool {
        self.trunk().is_some()
    }

    /// The server-assigned identifier, if the node was ever uploaded.
    pub fn cloud_id(&self) -> Option<&CloudId> {
        self.cloud_id.as_ref()
    }

    /// Assign the server identifier.
    ///
    /// Assigning the value the node already has is a no-op; assigning a
    /// different value fails with [`TreeError::CloudIdReassigned`].
    pub fn set_cloud_id(&mut self, cloud_id: CloudId) -> Result<(), TreeError> {
        match &self.cloud_id {
            None => {
                self.cloud_id = Some(cloud_id);
                Ok(())
            }
            Some(existing) if *existing == cloud_id => Ok(()),
            Some(existing) => Err(TreeError::CloudIdReassigned {
                node_id: self.id.to_string(),
                existing: existing.to_string(),
                attempted: cloud_id.to_string(),
            }),
        }
    }

    /// Serialize to MessagePack bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, TreeError> {
        rmp_serde::to_vec(self).map_err(TreeError::Serialization)
    }

    /// Deserialize from MessagePack bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, TreeError> {
        rmp_serde::from_slice(bytes).map_err(TreeError::Deserialization)
    }
}
