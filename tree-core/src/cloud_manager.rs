//! Queries over the shadow index of server-only state.

use std::collections::HashSet;
use tracing::warn;
use tree_store::{IndexKey, ReadTransaction};
use tree_types::{
    CloudId, CloudLocator, CloudNode, CloudNodeId, CloudPath, DirPrefix, Region, TreeError,
    TreeId, TreeResult, UserId,
};

use crate::config::TreeConfig;
use crate::schema::{self, load_cloud_node};

/// Read-only queries over [`CloudNode`] shadow records.
///
/// Shadow records are written by reconciliation and by the push engine
/// through [`NodeStore`](crate::NodeStore).
#[derive(Debug, Clone, Default)]
pub struct CloudNodeManager {
    config: TreeConfig,
}

impl CloudNodeManager {
    /// Create a manager with the given traversal guards.
    pub fn new(config: TreeConfig) -> Self {
        Self { config }
    }

    /// Load a shadow record.
    pub fn cloud_node(
        &self,
        id: &CloudNodeId,
        txn: &(impl ReadTransaction + ?Sized),
    ) -> TreeResult<Option<CloudNode>> {
        load_cloud_node(txn, id)
    }

    /// The shadow record for `cloud_path` in `(region, bucket)`.
    pub fn find_cloud_node_with_cloud_path(
        &self,
        cloud_path: &CloudPath,
        bucket: &str,
        region: Region,
        local_user_id: &UserId,
        txn: &(impl ReadTransaction + ?Sized),
    ) -> TreeResult<Option<CloudNode>> {
        let locator = CloudLocator::new(region, bucket, cloud_path.clone());
        let key = schema::cloud_path_key(local_user_id, &locator);
        self.first_hit(schema::CLOUD_NODE_BY_PATH, &key, txn)
    }

    /// The shadow record carrying `cloud_id`.
    pub fn find_cloud_node_with_cloud_id(
        &self,
        cloud_id: &CloudId,
        local_user_id: &UserId,
        tree_id: &TreeId,
        txn: &(impl ReadTransaction + ?Sized),
    ) -> TreeResult<Option<CloudNode>> {
        let key = schema::cloud_id_key(local_user_id, tree_id, cloud_id);
        self.first_hit(schema::CLOUD_NODE_BY_CLOUD_ID, &key, txn)
    }

    /// Shadow records whose parent has `parent_prefix`.
    pub fn cloud_node_children(
        &self,
        parent_prefix: &DirPrefix,
        local_user_id: &UserId,
        tree_id: &TreeId,
        txn: &(impl ReadTransaction + ?Sized),
    ) -> TreeResult<Vec<CloudNode>> {
        let prefix = schema::dir_prefix_key(local_user_id, tree_id, parent_prefix);
        let ids = schema::cloud_node_ids_of_scan(
            txn.index_prefix(schema::CLOUD_NODE_BY_PARENT_PREFIX, &prefix)?,
        )?;
        let mut children = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(cloud_node) = load_cloud_node(txn, &id)? {
                children.push(cloud_node);
            }
        }
        Ok(children)
    }

    /// Lazily enumerate every shadow record below `parent_prefix`, depth
    /// first.
    ///
    /// Records with a known dirPrefix are descended into. Children deeper
    /// than `max_depth` levels, or a dirPrefix seen twice, end the
    /// enumeration with [`TreeError::CorruptedTree`].
    pub fn recursive_cloud_node_descendants<'a, T: ReadTransaction + ?Sized>(
        &'a self,
        parent_prefix: &DirPrefix,
        local_user_id: &UserId,
        tree_id: &TreeId,
        txn: &'a T,
    ) -> TreeResult<CloudDescendants<'a, T>> {
        let children = self.cloud_node_children(parent_prefix, local_user_id, tree_id, txn)?;
        Ok(CloudDescendants {
            manager: self,
            txn,
            local_user_id: local_user_id.clone(),
            tree_id: tree_id.clone(),
            seen: HashSet::from([parent_prefix.clone()]),
            stack: vec![(1, children.into_iter())],
            done: false,
        })
    }

    /// Every shadow record of a local user, across trees.
    pub fn all_cloud_node_ids(
        &self,
        local_user_id: &UserId,
        txn: &(impl ReadTransaction + ?Sized),
    ) -> TreeResult<Vec<CloudNodeId>> {
        let prefix = IndexKey::new().push(local_user_id.as_str());
        schema::cloud_node_ids_of_scan(txn.index_prefix(schema::CLOUD_NODE_BY_USER, &prefix)?)
    }

    fn first_hit(
        &self,
        index: &str,
        key: &IndexKey,
        txn: &(impl ReadTransaction + ?Sized),
    ) -> TreeResult<Option<CloudNode>> {
        for pk in txn.index_get(index, key)? {
            if let Some(cloud_node) = load_cloud_node(txn, &pk.parse::<CloudNodeId>()?)? {
                return Ok(Some(cloud_node));
            }
        }
        Ok(None)
    }
}

/// Lazy depth-first iterator over shadow records.
///
/// Created by [`CloudNodeManager::recursive_cloud_node_descendants`]. The
/// children of a record are loaded when the record is yielded.
pub struct CloudDescendants<'a, T: ReadTransaction + ?Sized> {
    manager: &'a CloudNodeManager,
    txn: &'a T,
    local_user_id: UserId,
    tree_id: TreeId,
    seen: HashSet<DirPrefix>,
    stack: Vec<(usize, std::vec::IntoIter<CloudNode>)>,
    done: bool,
}

impl<T: ReadTransaction + ?Sized> CloudDescendants<'_, T> {
    fn descend(&mut self, depth: usize, cloud_node: &CloudNode) -> TreeResult<()> {
        let Some(prefix) = &cloud_node.dir_prefix else {
            return Ok(());
        };
        if !self.seen.insert(prefix.clone()) {
            warn!(cloud_node_id = %cloud_node.id, "dirPrefix cycle in shadow records");
            return Err(TreeError::corrupted(cloud_node.id, "dirPrefix cycle"));
        }
        let children =
            self.manager
                .cloud_node_children(prefix, &self.local_user_id, &self.tree_id, self.txn)?;
        if children.is_empty() {
            return Ok(());
        }
        if depth + 1 > self.manager.config.max_depth {
            warn!(cloud_node_id = %cloud_node.id, depth, "shadow records exceed max depth");
            return Err(TreeError::corrupted(
                cloud_node.id,
                "shadow records exceed max depth",
            ));
        }
        self.stack.push((depth + 1, children.into_iter()));
        Ok(())
    }
}

impl<T: ReadTransaction + ?Sized> Iterator for CloudDescendants<'_, T> {
    type Item = TreeResult<CloudNode>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        loop {
            let (depth, children) = self.stack.last_mut()?;
            let depth = *depth;
            let Some(cloud_node) = children.next() else {
                self.stack.pop();
                continue;
            };
            if let Err(e) = self.descend(depth, &cloud_node) {
                self.done = true;
                return Some(Err(e));
            }
            return Some(Ok(cloud_node));
        }
    }
}
