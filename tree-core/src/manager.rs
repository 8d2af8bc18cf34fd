//! Resolution, lookup and conflict naming over the node graph.

use std::collections::HashSet;
use tracing::{debug, warn};
use tree_store::ReadTransaction;
use tree_types::{
    CloudId, CloudPath, DirPrefix, Node, NodeId, NormalizedName, Region, TreeError, TreeId,
    TreeResult, TreesystemPath, Trunk, User, UserId,
};

use crate::config::TreeConfig;
use crate::conflict::next_available_name;
use crate::schema::{self, load_node, load_nodes, load_user};

/// Stateless algorithms over the node graph.
///
/// One instance per account session. Every call takes the transaction it
/// reads from, so nothing is cached across transactions.
#[derive(Debug, Clone, Default)]
pub struct NodeManager {
    config: TreeConfig,
}

impl NodeManager {
    /// Create a manager with the given traversal guards.
    pub fn new(config: TreeConfig) -> Self {
        Self { config }
    }

    /// Traversal guards in use.
    pub fn config(&self) -> &TreeConfig {
        &self.config
    }

    /// Load a node.
    pub fn node(
        &self,
        node_id: &NodeId,
        txn: &(impl ReadTransaction + ?Sized),
    ) -> TreeResult<Option<Node>> {
        load_node(txn, node_id)
    }

    /// Load a user.
    pub fn user(
        &self,
        user_id: &UserId,
        txn: &(impl ReadTransaction + ?Sized),
    ) -> TreeResult<Option<User>> {
        load_user(txn, user_id)
    }

    // ---------------------------------------------------------------------
    // Parent-chain walks
    // ---------------------------------------------------------------------

    /// `[node, parent, grandparent, ..., root]`, or `None` if a parent is missing.
    fn chain_to_root(
        &self,
        node: &Node,
        txn: &(impl ReadTransaction + ?Sized),
    ) -> TreeResult<Option<Vec<Node>>> {
        let mut seen = HashSet::from([node.id]);
        let mut chain = vec![node.clone()];

        while let Some(parent_id) = chain.last().and_then(|n| n.parent_id) {
            if chain.len() > self.config.max_depth {
                warn!(node_id = %node.id, max_depth = self.config.max_depth, "parent chain exceeds max depth");
                return Err(TreeError::corrupted(node.id, "parent chain exceeds max depth"));
            }
            if !seen.insert(parent_id) {
                warn!(node_id = %node.id, %parent_id, "cycle in parent chain");
                return Err(TreeError::corrupted(node.id, "cycle in parent chain"));
            }
            match load_node(txn, &parent_id)? {
                Some(parent) => chain.push(parent),
                None => {
                    debug!(node_id = %node.id, %parent_id, "dangling parent reference");
                    return Ok(None);
                }
            }
        }
        Ok(Some(chain))
    }

    /// The trunk node of `(user, tree, trunk)`.
    pub fn trunk_node_for(
        &self,
        local_user_id: &UserId,
        tree_id: &TreeId,
        trunk: Trunk,
        txn: &(impl ReadTransaction + ?Sized),
    ) -> TreeResult<Option<Node>> {
        load_node(txn, &NodeId::for_trunk(local_user_id, tree_id, trunk.as_str()))
    }

    /// The trunk `node` lives under (the node itself if it is a trunk).
    ///
    /// `Ok(None)` when the parent chain is dangling or ends at a root that
    /// is not a trunk. Cycles and over-deep chains fail with
    /// [`TreeError::CorruptedTree`].
    pub fn trunk_node_for_node(
        &self,
        node: &Node,
        txn: &(impl ReadTransaction + ?Sized),
    ) -> TreeResult<Option<Node>> {
        Ok(self
            .chain_to_root(node, txn)?
            .and_then(|mut chain| chain.pop())
            .filter(Node::is_trunk))
    }

    /// The first node from `node` upwards with an explicit anchor, else the trunk.
    pub fn anchor_node_for_node(
        &self,
        node: &Node,
        txn: &(impl ReadTransaction + ?Sized),
    ) -> TreeResult<Option<Node>> {
        let Some(mut chain) = self.chain_to_root(node, txn)? else {
            return Ok(None);
        };
        if let Some(pos) = chain.iter().position(|n| n.anchor.is_some()) {
            return Ok(Some(chain.swap_remove(pos)));
        }
        Ok(chain.pop().filter(Node::is_trunk))
    }

    /// The user owning the storage of `node`.
    ///
    /// The anchor's owner if the anchor node declares one, else the trunk's
    /// local user.
    pub fn owner_id_for_node(
        &self,
        node: &Node,
        txn: &(impl ReadTransaction + ?Sized),
    ) -> TreeResult<Option<UserId>> {
        Ok(self.anchor_node_for_node(node, txn)?.map(|anchor_node| {
            match anchor_node.anchor {
                Some(anchor) => anchor.owner_id,
                None => anchor_node.local_user_id,
            }
        }))
    }

    /// The owning user record, which may legitimately be unknown locally.
    pub fn owner_for_node(
        &self,
        node: &Node,
        txn: &(impl ReadTransaction + ?Sized),
    ) -> TreeResult<Option<User>> {
        match self.owner_id_for_node(node, txn)? {
            Some(owner_id) => load_user(txn, &owner_id),
            None => Ok(None),
        }
    }

    /// `(region, bucket)` holding the objects of `node`.
    pub fn storage_location_for_node(
        &self,
        node: &Node,
        txn: &(impl ReadTransaction + ?Sized),
    ) -> TreeResult<Option<(Region, String)>> {
        let Some(anchor_node) = self.anchor_node_for_node(node, txn)? else {
            return Ok(None);
        };
        if let Some(anchor) = anchor_node.anchor {
            return Ok(Some((anchor.region, anchor.bucket)));
        }
        Ok(load_user(txn, &anchor_node.local_user_id)?.map(|u| (u.region, u.bucket)))
    }

    /// Follow pointer hops to the node a pointer refers to.
    ///
    /// A non-pointer resolves to itself. `Ok(None)` when a target along the
    /// way no longer exists. A pointer cycle, or more than `max_pointer_hops`
    /// hops, fails with [`TreeError::CorruptedTree`].
    pub fn target_node_for_node(
        &self,
        node: &Node,
        txn: &(impl ReadTransaction + ?Sized),
    ) -> TreeResult<Option<Node>> {
        let mut seen = HashSet::from([node.id]);
        let mut current = node.clone();

        for _ in 0..self.config.max_pointer_hops {
            let Some(pointee_id) = current.pointee_id else {
                return Ok(Some(current));
            };
            let Some(next) = load_node(txn, &pointee_id)? else {
                debug!(node_id = %node.id, %pointee_id, "pointer target missing");
                return Ok(None);
            };
            if !seen.insert(next.id) {
                warn!(node_id = %node.id, "pointer cycle");
                return Err(TreeError::corrupted(node.id, "pointer cycle"));
            }
            current = next;
        }

        if current.is_pointer() {
            warn!(node_id = %node.id, hops = self.config.max_pointer_hops, "pointer hop limit exceeded");
            return Err(TreeError::corrupted(node.id, "pointer hop limit exceeded"));
        }
        Ok(Some(current))
    }

    /// Cleartext path of `node` from its trunk.
    pub fn path_for_node(
        &self,
        node: &Node,
        txn: &(impl ReadTransaction + ?Sized),
    ) -> TreeResult<Option<TreesystemPath>> {
        let Some(chain) = self.chain_to_root(node, txn)? else {
            return Ok(None);
        };
        let Some(trunk) = chain.last().and_then(Node::trunk) else {
            return Ok(None);
        };
        let components = chain
            .iter()
            .rev()
            .skip(1)
            .map(|n| n.name.clone())
            .collect();
        Ok(Some(TreesystemPath::new(trunk, components)))
    }

    /// Ancestor ids, the root first and the immediate parent last.
    ///
    /// Empty for a trunk. `Ok(None)` for a dangling chain.
    pub fn parent_node_ids_for_node(
        &self,
        node: &Node,
        txn: &(impl ReadTransaction + ?Sized),
    ) -> TreeResult<Option<Vec<NodeId>>> {
        Ok(self.chain_to_root(node, txn)?.map(|chain| {
            chain.iter().skip(1).rev().map(|n| n.id).collect()
        }))
    }

    /// Whether `ancestor_id` is a strict ancestor of `node`.
    pub fn is_node_a_descendant_of(
        &self,
        node: &Node,
        ancestor_id: &NodeId,
        txn: &(impl ReadTransaction + ?Sized),
    ) -> TreeResult<bool> {
        Ok(self
            .parent_node_ids_for_node(node, txn)?
            .map(|ids| ids.contains(ancestor_id))
            .unwrap_or(false))
    }

    // ---------------------------------------------------------------------
    // Children
    // ---------------------------------------------------------------------

    /// Ids of the direct children of `parent_id`, in normalized-name order.
    pub fn child_ids(
        &self,
        parent_id: &NodeId,
        txn: &(impl ReadTransaction + ?Sized),
    ) -> TreeResult<Vec<NodeId>> {
        let Some(parent) = load_node(txn, parent_id)? else {
            return Ok(Vec::new());
        };
        let prefix = schema::children_key(&parent.local_user_id, &parent.tree_id, parent_id);
        schema::node_ids_of_scan(txn.index_prefix(schema::NODE_BY_PARENT_NAME, &prefix)?)
    }

    /// The direct children of `parent_id`.
    pub fn children(
        &self,
        parent_id: &NodeId,
        txn: &(impl ReadTransaction + ?Sized),
    ) -> TreeResult<Vec<Node>> {
        load_nodes(txn, &self.child_ids(parent_id, txn)?)
    }

    /// Whether `parent_id` has at least one child.
    pub fn has_children(
        &self,
        parent_id: &NodeId,
        txn: &(impl ReadTransaction + ?Sized),
    ) -> TreeResult<bool> {
        Ok(!self.child_ids(parent_id, txn)?.is_empty())
    }

    // ---------------------------------------------------------------------
    // Finds
    // ---------------------------------------------------------------------

    /// The child of `parent_id` whose name matches `name` (normalized).
    pub fn find_node_with_name(
        &self,
        name: &str,
        parent_id: &NodeId,
        txn: &(impl ReadTransaction + ?Sized),
    ) -> TreeResult<Option<Node>> {
        let Some(parent) = load_node(txn, parent_id)? else {
            return Ok(None);
        };
        let key = schema::name_key(
            &parent.local_user_id,
            &parent.tree_id,
            parent_id,
            &NormalizedName::new(name),
        );
        self.first_hit(schema::NODE_BY_PARENT_NAME, &key, txn)
    }

    /// Walk `path` from its trunk.
    pub fn find_node_with_path(
        &self,
        path: &TreesystemPath,
        local_user_id: &UserId,
        tree_id: &TreeId,
        txn: &(impl ReadTransaction + ?Sized),
    ) -> TreeResult<Option<Node>> {
        let Some(mut current) = self.trunk_node_for(local_user_id, tree_id, path.trunk, txn)? else {
            return Ok(None);
        };
        for component in &path.components {
            match self.find_node_with_name(component, &current.id, txn)? {
                Some(child) => current = child,
                None => return Ok(None),
            }
        }
        Ok(Some(current))
    }

    /// The child of `parent_id` stored under `cloud_name`.
    pub fn find_node_with_cloud_name(
        &self,
        cloud_name: &str,
        parent_id: &NodeId,
        txn: &(impl ReadTransaction + ?Sized),
    ) -> TreeResult<Option<Node>> {
        let Some(parent) = load_node(txn, parent_id)? else {
            return Ok(None);
        };
        let key =
            schema::cloud_name_key(&parent.local_user_id, &parent.tree_id, parent_id, cloud_name);
        self.first_hit(schema::NODE_BY_CLOUD_NAME, &key, txn)
    }

    /// The node carrying the server identifier `cloud_id`.
    pub fn find_node_with_cloud_id(
        &self,
        cloud_id: &CloudId,
        local_user_id: &UserId,
        tree_id: &TreeId,
        txn: &(impl ReadTransaction + ?Sized),
    ) -> TreeResult<Option<Node>> {
        let key = schema::cloud_id_key(local_user_id, tree_id, cloud_id);
        self.first_hit(schema::NODE_BY_CLOUD_ID, &key, txn)
    }

    /// The node whose own dirPrefix is `prefix` and whose objects live in
    /// `(region, bucket)`.
    pub fn find_node_with_dir_prefix(
        &self,
        prefix: &DirPrefix,
        bucket: &str,
        region: Region,
        local_user_id: &UserId,
        tree_id: &TreeId,
        txn: &(impl ReadTransaction + ?Sized),
    ) -> TreeResult<Option<Node>> {
        let key = schema::dir_prefix_key(local_user_id, tree_id, prefix);
        let ids = schema::node_ids(txn.index_get(schema::NODE_BY_DIR_PREFIX, &key)?)?;
        for node in load_nodes(txn, &ids)? {
            let location = self.storage_location_for_node(&node, txn)?;
            if matches!(&location, Some((r, b)) if *r == region && b == bucket) {
                return Ok(Some(node));
            }
        }
        Ok(None)
    }

    /// The node stored at `cloud_path` in `(region, bucket)`.
    pub fn find_node_with_cloud_path(
        &self,
        cloud_path: &CloudPath,
        bucket: &str,
        region: Region,
        local_user_id: &UserId,
        txn: &(impl ReadTransaction + ?Sized),
    ) -> TreeResult<Option<Node>> {
        let parent = self.find_node_with_dir_prefix(
            &cloud_path.dir_prefix,
            bucket,
            region,
            local_user_id,
            &cloud_path.tree_id,
            txn,
        )?;
        match parent {
            Some(parent) => self.find_node_with_cloud_name(&cloud_path.file_name, &parent.id, txn),
            None => Ok(None),
        }
    }

    /// A pointer node whose target is `pointee_id`.
    pub fn find_node_with_pointee_id(
        &self,
        pointee_id: &NodeId,
        local_user_id: &UserId,
        tree_id: &TreeId,
        txn: &(impl ReadTransaction + ?Sized),
    ) -> TreeResult<Option<Node>> {
        let key = schema::pointee_key(local_user_id, tree_id, pointee_id);
        self.first_hit(schema::NODE_BY_POINTEE, &key, txn)
    }

    fn first_hit(
        &self,
        index: &str,
        key: &tree_store::IndexKey,
        txn: &(impl ReadTransaction + ?Sized),
    ) -> TreeResult<Option<Node>> {
        for id in schema::node_ids(txn.index_get(index, key)?)? {
            if let Some(node) = load_node(txn, &id)? {
                return Ok(Some(node));
            }
        }
        Ok(None)
    }

    // ---------------------------------------------------------------------
    // Lists
    // ---------------------------------------------------------------------

    /// Every node of a local user, across trees.
    pub fn all_node_ids(
        &self,
        local_user_id: &UserId,
        txn: &(impl ReadTransaction + ?Sized),
    ) -> TreeResult<Vec<NodeId>> {
        let prefix = tree_store::IndexKey::new().push(local_user_id.as_str());
        schema::node_ids_of_scan(txn.index_prefix(schema::NODE_BY_TREE, &prefix)?)
    }

    /// Every node of a local user in one tree.
    pub fn all_node_ids_in_tree(
        &self,
        local_user_id: &UserId,
        tree_id: &TreeId,
        txn: &(impl ReadTransaction + ?Sized),
    ) -> TreeResult<Vec<NodeId>> {
        let prefix = schema::scope(local_user_id, tree_id);
        schema::node_ids_of_scan(txn.index_prefix(schema::NODE_BY_TREE, &prefix)?)
    }

    /// Every node of a local user in one tree that has a cloudID.
    pub fn all_uploaded_node_ids(
        &self,
        local_user_id: &UserId,
        tree_id: &TreeId,
        txn: &(impl ReadTransaction + ?Sized),
    ) -> TreeResult<Vec<NodeId>> {
        let prefix = schema::scope(local_user_id, tree_id);
        schema::node_ids_of_scan(txn.index_prefix(schema::NODE_UPLOADED, &prefix)?)
    }

    // ---------------------------------------------------------------------
    // Permissions & conflicts
    // ---------------------------------------------------------------------

    /// Replace `node`'s share list with its parent's.
    ///
    /// Only the in-memory node is changed; persist it with
    /// [`NodeStore::update_node`](crate::NodeStore::update_node).
    pub fn reset_permissions_for_node(
        &self,
        node: &mut Node,
        txn: &(impl ReadTransaction + ?Sized),
    ) -> TreeResult<()> {
        if node.immutable {
            return Err(TreeError::ImmutableNode {
                node_id: node.id.to_string(),
            });
        }
        let parent_id = node
            .parent_id
            .ok_or_else(|| TreeError::not_found("parent", node.id))?;
        let parent =
            load_node(txn, &parent_id)?.ok_or_else(|| TreeError::not_found("parent", parent_id))?;
        node.share_list = parent.share_list;
        Ok(())
    }

    /// A name for `node` that no sibling uses.
    ///
    /// Returns the node's name when it is already free (the node itself
    /// does not count), otherwise the first free `"base N.ext"` with N >= 2.
    pub fn resolve_naming_conflict(
        &self,
        node: &Node,
        txn: &(impl ReadTransaction + ?Sized),
    ) -> TreeResult<String> {
        let Some(parent_id) = node.parent_id else {
            return Ok(node.name.clone());
        };
        next_available_name(&node.name, |candidate| {
            Ok(self
                .find_node_with_name(candidate, &parent_id, txn)?
                .map(|sibling| sibling.id != node.id)
                .unwrap_or(false))
        })
    }
}
