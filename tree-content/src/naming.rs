//! Cloud names.
//!
//! The server never sees cleartext names. A node is stored under a hash of
//! its normalized name salted with the parent's dirPrefix, so equal names
//! in different folders map to unrelated cloud names, and names that
//! collide locally also collide on the server.

use tree_types::{CloudPath, DirPrefix, NormalizedName, TreeId};

/// Number of hash bytes kept in a cloud name (rendered as 40 hex chars).
pub const CLOUD_NAME_BYTES: usize = 20;

/// Cloud name of a node called `name` under a parent with `parent_prefix`.
pub fn cloud_name(parent_prefix: &DirPrefix, name: &str) -> String {
    let normalized = NormalizedName::new(name);
    let mut hasher = blake3::Hasher::new();
    hasher.update(parent_prefix.as_str().as_bytes());
    hasher.update(&[0]);
    hasher.update(normalized.as_str().as_bytes());
    hex::encode(&hasher.finalize().as_bytes()[..CLOUD_NAME_BYTES])
}

/// Cloud path of a node called `name` under a parent with `parent_prefix`.
pub fn cloud_path_for(tree_id: &TreeId, parent_prefix: &DirPrefix, name: &str) -> CloudPath {
    CloudPath::new(
        tree_id.clone(),
        parent_prefix.clone(),
        cloud_name(parent_prefix, name),
    )
}
