//! Index-maintaining writes.

use tracing::{debug, info};
use tree_store::{ReadTransaction, ReadWriteTransaction};
use tree_types::{
    CloudId, CloudLocator, CloudNode, CloudNodeId, CloudNodeState, Node, NodeId, NormalizedName,
    TreeError, TreeId, TreeResult, Trunk, User, UserId,
};

use crate::config::TreeConfig;
use crate::manager::NodeManager;
use crate::schema::{self, load_cloud_node, load_node, load_user};

/// Writes to the node graph.
///
/// Every write keeps the secondary indices in step with the record and
/// enforces the graph invariants: parents exist and share the node's
/// user/tree, sibling names are unique, immutable nodes are never changed,
/// and a cloudID is never replaced.
#[derive(Debug, Clone, Default)]
pub struct NodeStore {
    manager: NodeManager,
}

impl NodeStore {
    /// Create a store with the given traversal guards.
    pub fn new(config: TreeConfig) -> Self {
        Self {
            manager: NodeManager::new(config),
        }
    }

    /// The read-side manager used for validation.
    pub fn manager(&self) -> &NodeManager {
        &self.manager
    }

    // ---------------------------------------------------------------------
    // Reads
    // ---------------------------------------------------------------------

    /// Load a node.
    pub fn node(
        &self,
        id: &NodeId,
        txn: &(impl ReadTransaction + ?Sized),
    ) -> TreeResult<Option<Node>> {
        load_node(txn, id)
    }

    /// Load a node that must exist.
    pub fn require_node(
        &self,
        id: &NodeId,
        txn: &(impl ReadTransaction + ?Sized),
    ) -> TreeResult<Node> {
        load_node(txn, id)?.ok_or_else(|| TreeError::not_found("node", id))
    }

    /// Load a user.
    pub fn user(
        &self,
        id: &UserId,
        txn: &(impl ReadTransaction + ?Sized),
    ) -> TreeResult<Option<User>> {
        load_user(txn, id)
    }

    /// Load a shadow record.
    pub fn cloud_node(
        &self,
        id: &CloudNodeId,
        txn: &(impl ReadTransaction + ?Sized),
    ) -> TreeResult<Option<CloudNode>> {
        load_cloud_node(txn, id)
    }

    // ---------------------------------------------------------------------
    // Users
    // ---------------------------------------------------------------------

    /// Insert or replace a user record.
    pub fn put_user(
        &self,
        user: &User,
        txn: &mut (impl ReadWriteTransaction + ?Sized),
    ) -> TreeResult<()> {
        txn.put(schema::USERS, user.id.as_str(), user.to_bytes()?, Vec::new())?;
        Ok(())
    }

    /// Store a local user and create its trunks in `tree_id`.
    ///
    /// Idempotent: existing trunks are left untouched. Returns the trunks.
    pub fn provision_local_user(
        &self,
        user: &User,
        tree_id: &TreeId,
        txn: &mut (impl ReadWriteTransaction + ?Sized),
    ) -> TreeResult<Vec<Node>> {
        if !user.is_local {
            return Err(TreeError::InvalidData(format!(
                "cannot provision remote user {}",
                user.id
            )));
        }
        self.put_user(user, txn)?;

        let mut trunks = Vec::with_capacity(Trunk::ALL.len());
        for trunk in Trunk::ALL {
            if let Some(existing) = self.manager.trunk_node_for(&user.id, tree_id, trunk, &*txn)? {
                trunks.push(existing);
                continue;
            }
            let node = Node::new_trunk(user.id.clone(), tree_id.clone(), trunk);
            self.write_node(&node, txn)?;
            trunks.push(node);
        }
        info!(user_id = %user.id, tree_id = %tree_id, "provisioned local user");
        Ok(trunks)
    }

    // ---------------------------------------------------------------------
    // Nodes
    // ---------------------------------------------------------------------

    /// Insert a new node.
    ///
    /// The parent must exist in the same user/tree and no sibling may have
    /// the same normalized name ([`TreeError::NameConflict`]).
    pub fn insert_node(
        &self,
        node: &Node,
        txn: &mut (impl ReadWriteTransaction + ?Sized),
    ) -> TreeResult<()> {
        if load_node(&*txn, &node.id)?.is_some() {
            return Err(TreeError::InvalidData(format!("node {} already exists", node.id)));
        }
        self.validate_placement(node, &*txn)?;
        self.write_node(node, txn)?;
        debug!(node_id = %node.id, name = %node.name, "inserted node");
        Ok(())
    }

    /// Replace an existing node.
    ///
    /// Fails with [`TreeError::ImmutableNode`] if the stored node is
    /// immutable and with [`TreeError::CloudIdReassigned`] if `node` carries
    /// a different cloudID than the stored one.
    pub fn update_node(
        &self,
        node: &Node,
        txn: &mut (impl ReadWriteTransaction + ?Sized),
    ) -> TreeResult<()> {
        let existing = self.require_node(&node.id, &*txn)?;
        if existing.immutable {
            return Err(TreeError::ImmutableNode {
                node_id: node.id.to_string(),
            });
        }
        if let Some(existing_id) = existing.cloud_id() {
            if node.cloud_id() != Some(existing_id) {
                return Err(TreeError::CloudIdReassigned {
                    node_id: node.id.to_string(),
                    existing: existing_id.to_string(),
                    attempted: node
                        .cloud_id()
                        .map(ToString::to_string)
                        .unwrap_or_else(|| "none".into()),
                });
            }
        }
        if existing.kind != node.kind {
            return Err(TreeError::InvalidData(format!(
                "node {} cannot change kind",
                node.id
            )));
        }
        self.validate_placement(node, &*txn)?;
        self.write_node(node, txn)
    }

    /// Record the server identifier of a node after its first upload.
    ///
    /// Assigning the same value again is a no-op.
    pub fn set_cloud_id(
        &self,
        node_id: &NodeId,
        cloud_id: CloudId,
        txn: &mut (impl ReadWriteTransaction + ?Sized),
    ) -> TreeResult<Node> {
        let mut node = self.require_node(node_id, &*txn)?;
        if node.cloud_id() == Some(&cloud_id) {
            return Ok(node);
        }
        node.set_cloud_id(cloud_id)?;
        self.write_node(&node, txn)?;
        debug!(node_id = %node.id, cloud_id = ?node.cloud_id(), "assigned cloudID");
        Ok(node)
    }

    /// Rename a node, failing on a sibling name conflict.
    pub fn rename_node(
        &self,
        node_id: &NodeId,
        new_name: &str,
        txn: &mut (impl ReadWriteTransaction + ?Sized),
    ) -> TreeResult<Node> {
        let mut node = self.require_node(node_id, &*txn)?;
        node.name = new_name.to_string();
        node.last_modified = tree_types::unix_now();
        self.update_node(&node, txn)?;
        Ok(node)
    }

    /// Delete a node and its subtree.
    ///
    /// Every deleted node that was uploaded leaves a
    /// [`CloudNodeState::PendingDelete`] shadow record until the server
    /// delete is confirmed. Returns the deleted ids, children before parents.
    pub fn delete_node(
        &self,
        node_id: &NodeId,
        txn: &mut (impl ReadWriteTransaction + ?Sized),
    ) -> TreeResult<Vec<NodeId>> {
        let root = self.require_node(node_id, &*txn)?;

        let mut doomed = vec![root];
        for item in self.manager.descendants(node_id, &*txn)? {
            doomed.push(item?.node);
        }
        if let Some(frozen) = doomed.iter().find(|n| n.immutable) {
            return Err(TreeError::ImmutableNode {
                node_id: frozen.id.to_string(),
            });
        }

        let mut shadows = Vec::new();
        for node in doomed.iter().filter(|n| n.cloud_id().is_some()) {
            shadows.push(self.pending_delete_for(node, &*txn)?);
        }

        let mut deleted = Vec::with_capacity(doomed.len());
        for node in doomed.iter().rev() {
            txn.remove(schema::NODES, &node.id.to_string())?;
            deleted.push(node.id);
        }
        for shadow in &shadows {
            self.insert_cloud_node(shadow, txn)?;
        }

        info!(
            node_id = %node_id,
            deleted = deleted.len(),
            pending_deletes = shadows.len(),
            "deleted subtree"
        );
        Ok(deleted)
    }

    fn pending_delete_for(
        &self,
        node: &Node,
        txn: &(impl ReadTransaction + ?Sized),
    ) -> TreeResult<CloudNode> {
        let locator = self.cloud_locator_for_node(node, txn)?;
        let mut shadow = CloudNode::new(
            node.local_user_id.clone(),
            node.tree_id.clone(),
            locator,
            CloudNodeState::PendingDelete,
        )
        .with_dir_prefix(node.dir_prefix.clone());
        if let Some(cloud_id) = node.cloud_id() {
            shadow = shadow.with_cloud_id(cloud_id.clone());
        }
        Ok(shadow)
    }

    /// Where `node`'s objects live on the server.
    pub fn cloud_locator_for_node(
        &self,
        node: &Node,
        txn: &(impl ReadTransaction + ?Sized),
    ) -> TreeResult<CloudLocator> {
        let parent_id = node
            .parent_id
            .ok_or_else(|| TreeError::InvalidParent {
                node_id: node.id.to_string(),
                reason: "trunks have no cloud path".into(),
            })?;
        let parent = load_node(txn, &parent_id)?
            .ok_or_else(|| TreeError::not_found("parent", parent_id))?;
        let (region, bucket) = self
            .manager
            .storage_location_for_node(node, txn)?
            .ok_or_else(|| TreeError::not_found("storage location", node.id))?;
        let cloud_path =
            tree_content::cloud_path_for(&node.tree_id, &parent.dir_prefix, &node.name);
        Ok(CloudLocator::new(region, bucket, cloud_path))
    }

    fn validate_placement(
        &self,
        node: &Node,
        txn: &(impl ReadTransaction + ?Sized),
    ) -> TreeResult<()> {
        if node.name.is_empty() || node.name.contains('/') {
            return Err(TreeError::InvalidData(format!(
                "invalid node name: {:?}",
                node.name
            )));
        }

        let Some(parent_id) = node.parent_id else {
            return if node.is_trunk() {
                Ok(())
            } else {
                Err(TreeError::InvalidParent {
                    node_id: node.id.to_string(),
                    reason: "only trunks may be roots".into(),
                })
            };
        };
        if node.is_trunk() {
            return Err(TreeError::InvalidParent {
                node_id: node.id.to_string(),
                reason: "trunks cannot have a parent".into(),
            });
        }
        if parent_id == node.id {
            return Err(TreeError::InvalidParent {
                node_id: node.id.to_string(),
                reason: "node cannot be its own parent".into(),
            });
        }

        let parent = load_node(txn, &parent_id)?
            .ok_or_else(|| TreeError::not_found("parent", parent_id))?;
        if parent.local_user_id != node.local_user_id || parent.tree_id != node.tree_id {
            return Err(TreeError::InvalidParent {
                node_id: node.id.to_string(),
                reason: "parent belongs to another user or tree".into(),
            });
        }
        let Some(ancestors) = self.manager.parent_node_ids_for_node(&parent, txn)? else {
            return Err(TreeError::InvalidParent {
                node_id: node.id.to_string(),
                reason: "parent is not attached to a trunk".into(),
            });
        };
        if ancestors.contains(&node.id) {
            return Err(TreeError::InvalidParent {
                node_id: node.id.to_string(),
                reason: "cannot move a node below itself".into(),
            });
        }

        // A moved node brings its subtree along.
        let depth = ancestors.len() + 1;
        let mut height = 0;
        if load_node(txn, &node.id)?.is_some() {
            for item in self.manager.descendants(&node.id, txn)? {
                height = height.max(item?.path.len() + 1);
            }
        }
        let max_depth = self.manager.config().max_depth;
        if depth + height > max_depth {
            return Err(TreeError::InvalidParent {
                node_id: node.id.to_string(),
                reason: format!("node would sit deeper than the maximum depth of {max_depth}"),
            });
        }

        let key = schema::name_key(
            &node.local_user_id,
            &node.tree_id,
            &parent_id,
            &NormalizedName::new(&node.name),
        );
        let clash = schema::node_ids(txn.index_get(schema::NODE_BY_PARENT_NAME, &key)?)?
            .into_iter()
            .any(|id| id != node.id);
        if clash {
            return Err(TreeError::NameConflict {
                parent_id: parent_id.to_string(),
                name: node.name.clone(),
            });
        }
        Ok(())
    }

    fn write_node(
        &self,
        node: &Node,
        txn: &mut (impl ReadWriteTransaction + ?Sized),
    ) -> TreeResult<()> {
        let parent_prefix = match node.parent_id {
            Some(parent_id) => load_node(&*txn, &parent_id)?.map(|p| p.dir_prefix),
            None => None,
        };
        let entries = schema::node_index_entries(node, parent_prefix.as_ref());
        txn.put(schema::NODES, &node.id.to_string(), node.to_bytes()?, entries)?;
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Shadow records
    // ---------------------------------------------------------------------

    /// Insert or replace a shadow record.
    pub fn insert_cloud_node(
        &self,
        cloud_node: &CloudNode,
        txn: &mut (impl ReadWriteTransaction + ?Sized),
    ) -> TreeResult<()> {
        txn.put(
            schema::CLOUD_NODES,
            &cloud_node.id.to_string(),
            cloud_node.to_bytes()?,
            schema::cloud_node_index_entries(cloud_node),
        )?;
        Ok(())
    }

    /// Remove a shadow record. Returns whether it existed.
    pub fn remove_cloud_node(
        &self,
        id: &CloudNodeId,
        txn: &mut (impl ReadWriteTransaction + ?Sized),
    ) -> TreeResult<bool> {
        Ok(txn.remove(schema::CLOUD_NODES, &id.to_string())?)
    }
}
