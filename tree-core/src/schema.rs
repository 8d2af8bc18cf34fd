//! Storage layout of the node graph.
//!
//! Records are MessagePack-encoded. Every secondary index key starts with
//! `(localUserID, treeID)` except the cloud-path index, which is keyed the
//! way the server addresses objects.

use tree_store::{IndexEntry, IndexKey, ReadTransaction};
use tree_types::{
    CloudId, CloudLocator, CloudNode, CloudNodeId, DirPrefix, Node, NodeId, NormalizedName,
    TreeId, TreeResult, User, UserId,
};

pub(crate) const NODES: &str = "nodes";
pub(crate) const CLOUD_NODES: &str = "cloud_nodes";
pub(crate) const USERS: &str = "users";

pub(crate) const NODE_BY_PARENT_NAME: &str = "node_by_parent_name";
pub(crate) const NODE_BY_CLOUD_NAME: &str = "node_by_cloud_name";
pub(crate) const NODE_BY_CLOUD_ID: &str = "node_by_cloud_id";
pub(crate) const NODE_BY_DIR_PREFIX: &str = "node_by_dir_prefix";
pub(crate) const NODE_BY_POINTEE: &str = "node_by_pointee";
pub(crate) const NODE_BY_TREE: &str = "node_by_tree";
pub(crate) const NODE_UPLOADED: &str = "node_uploaded";

pub(crate) const CLOUD_NODE_BY_PATH: &str = "cloud_node_by_path";
pub(crate) const CLOUD_NODE_BY_CLOUD_ID: &str = "cloud_node_by_cloud_id";
pub(crate) const CLOUD_NODE_BY_PARENT_PREFIX: &str = "cloud_node_by_parent_prefix";
pub(crate) const CLOUD_NODE_BY_USER: &str = "cloud_node_by_user";

pub(crate) fn scope(user: &UserId, tree: &TreeId) -> IndexKey {
    IndexKey::new().push(user.as_str()).push(tree.as_str())
}

pub(crate) fn children_key(user: &UserId, tree: &TreeId, parent_id: &NodeId) -> IndexKey {
    scope(user, tree).push(parent_id.to_string())
}

pub(crate) fn name_key(
    user: &UserId,
    tree: &TreeId,
    parent_id: &NodeId,
    name: &NormalizedName,
) -> IndexKey {
    children_key(user, tree, parent_id).push(name.as_str())
}

pub(crate) fn cloud_name_key(
    user: &UserId,
    tree: &TreeId,
    parent_id: &NodeId,
    cloud_name: &str,
) -> IndexKey {
    children_key(user, tree, parent_id).push(cloud_name)
}

pub(crate) fn cloud_id_key(user: &UserId, tree: &TreeId, cloud_id: &CloudId) -> IndexKey {
    scope(user, tree).push(cloud_id.as_str())
}

pub(crate) fn dir_prefix_key(user: &UserId, tree: &TreeId, prefix: &DirPrefix) -> IndexKey {
    scope(user, tree).push(prefix.as_str())
}

pub(crate) fn pointee_key(user: &UserId, tree: &TreeId, pointee: &NodeId) -> IndexKey {
    scope(user, tree).push(pointee.to_string())
}

pub(crate) fn cloud_path_key(user: &UserId, locator: &CloudLocator) -> IndexKey {
    IndexKey::new()
        .push(user.as_str())
        .push(locator.region.as_str())
        .push(&locator.bucket)
        .push(locator.cloud_path.to_string())
}

/// Index entries of a node. `parent_prefix` is the parent's dirPrefix.
pub(crate) fn node_index_entries(node: &Node, parent_prefix: Option<&DirPrefix>) -> Vec<IndexEntry> {
    let user = &node.local_user_id;
    let tree = &node.tree_id;
    let mut entries = vec![
        IndexEntry::new(NODE_BY_TREE, scope(user, tree).push(node.id.to_string())),
        IndexEntry::new(NODE_BY_DIR_PREFIX, dir_prefix_key(user, tree, &node.dir_prefix)),
    ];

    if let (Some(parent_id), Some(prefix)) = (&node.parent_id, parent_prefix) {
        entries.push(IndexEntry::new(
            NODE_BY_PARENT_NAME,
            name_key(user, tree, parent_id, &NormalizedName::new(&node.name)),
        ));
        entries.push(IndexEntry::new(
            NODE_BY_CLOUD_NAME,
            cloud_name_key(
                user,
                tree,
                parent_id,
                &tree_content::cloud_name(prefix, &node.name),
            ),
        ));
    }
    if let Some(cloud_id) = node.cloud_id() {
        entries.push(IndexEntry::new(NODE_BY_CLOUD_ID, cloud_id_key(user, tree, cloud_id)));
        entries.push(IndexEntry::new(
            NODE_UPLOADED,
            scope(user, tree).push(node.id.to_string()),
        ));
    }
    if let Some(pointee) = &node.pointee_id {
        entries.push(IndexEntry::new(NODE_BY_POINTEE, pointee_key(user, tree, pointee)));
    }
    entries
}

pub(crate) fn cloud_node_index_entries(cloud_node: &CloudNode) -> Vec<IndexEntry> {
    let user = &cloud_node.local_user_id;
    let tree = &cloud_node.tree_id;
    let mut entries = vec![
        IndexEntry::new(CLOUD_NODE_BY_PATH, cloud_path_key(user, &cloud_node.locator)),
        IndexEntry::new(
            CLOUD_NODE_BY_PARENT_PREFIX,
            dir_prefix_key(user, tree, &cloud_node.locator.cloud_path.dir_prefix)
                .push(cloud_node.id.to_string()),
        ),
        IndexEntry::new(
            CLOUD_NODE_BY_USER,
            IndexKey::new()
                .push(user.as_str())
                .push(cloud_node.id.to_string()),
        ),
    ];
    if let Some(cloud_id) = &cloud_node.cloud_id {
        entries.push(IndexEntry::new(
            CLOUD_NODE_BY_CLOUD_ID,
            cloud_id_key(user, tree, cloud_id),
        ));
    }
    entries
}

pub(crate) fn load_node(
    txn: &(impl ReadTransaction + ?Sized),
    id: &NodeId,
) -> TreeResult<Option<Node>> {
    match txn.get(NODES, &id.to_string())? {
        Some(bytes) => Ok(Some(Node::from_bytes(&bytes)?)),
        None => Ok(None),
    }
}

pub(crate) fn load_cloud_node(
    txn: &(impl ReadTransaction + ?Sized),
    id: &CloudNodeId,
) -> TreeResult<Option<CloudNode>> {
    match txn.get(CLOUD_NODES, &id.to_string())? {
        Some(bytes) => Ok(Some(CloudNode::from_bytes(&bytes)?)),
        None => Ok(None),
    }
}

pub(crate) fn load_user(
    txn: &(impl ReadTransaction + ?Sized),
    id: &UserId,
) -> TreeResult<Option<User>> {
    match txn.get(USERS, id.as_str())? {
        Some(bytes) => Ok(Some(User::from_bytes(&bytes)?)),
        None => Ok(None),
    }
}

/// Parse the primary keys returned by an index lookup into node ids.
pub(crate) fn node_ids(keys: Vec<String>) -> TreeResult<Vec<NodeId>> {
    keys.iter().map(|k| k.parse()).collect()
}

/// Parse the primary keys of a prefix scan into node ids.
pub(crate) fn node_ids_of_scan(hits: Vec<(IndexKey, String)>) -> TreeResult<Vec<NodeId>> {
    hits.iter().map(|(_, k)| k.parse()).collect()
}

/// Load every node in `ids`, skipping ids without a record.
pub(crate) fn load_nodes(
    txn: &(impl ReadTransaction + ?Sized),
    ids: &[NodeId],
) -> TreeResult<Vec<Node>> {
    let mut nodes = Vec::with_capacity(ids.len());
    for id in ids {
        if let Some(node) = load_node(txn, id)? {
            nodes.push(node);
        }
    }
    Ok(nodes)
}

pub(crate) fn cloud_node_ids_of_scan(hits: Vec<(IndexKey, String)>) -> TreeResult<Vec<CloudNodeId>> {
    hits.iter().map(|(_, k)| k.parse()).collect()
}
