//! Depth-first enumeration of a subtree.

use tracing::warn;
use tree_store::ReadTransaction;
use tree_types::{Node, NodeId, TreeError, TreeResult};

use crate::NodeManager;

/// One node produced by [`Descendants`].
#[derive(Debug, Clone)]
pub struct Descendant {
    /// The visited node.
    pub node: Node,
    /// Ids between the enumeration root and the node, excluding both.
    pub path: Vec<NodeId>,
}

struct Frame {
    path: Vec<NodeId>,
    children: std::vec::IntoIter<NodeId>,
}

/// Lazy depth-first iterator over the descendants of a node.
///
/// Children are visited in normalized-name order. A node's children are
/// only loaded when the iterator advances past it, so calling
/// [`skip_children`](Descendants::skip_children) right after a node is
/// yielded prunes its subtree without touching siblings. Dropping the
/// iterator stops the enumeration.
///
/// Created by [`NodeManager::descendants`].
pub struct Descendants<'a, T: ReadTransaction + ?Sized> {
    manager: &'a NodeManager,
    txn: &'a T,
    stack: Vec<Frame>,
    pending: Option<(NodeId, Vec<NodeId>)>,
    done: bool,
}

impl<'a, T: ReadTransaction + ?Sized> Descendants<'a, T> {
    pub(crate) fn new(manager: &'a NodeManager, txn: &'a T, root: NodeId) -> TreeResult<Self> {
        let children = manager.child_ids(&root, txn)?;
        Ok(Self {
            manager,
            txn,
            stack: vec![Frame {
                path: Vec::new(),
                children: children.into_iter(),
            }],
            pending: None,
            done: false,
        })
    }

    /// Do not descend into the node most recently returned by `next`.
    pub fn skip_children(&mut self) {
        self.pending = None;
    }

    fn expand_pending(&mut self) -> TreeResult<()> {
        let Some((id, mut path)) = self.pending.take() else {
            return Ok(());
        };
        let children = self.manager.child_ids(&id, self.txn)?;
        if children.is_empty() {
            return Ok(());
        }
        // Children sit at depth `path.len() + 2` below the root.
        if path.len() + 2 > self.manager.config().max_depth {
            warn!(node_id = %id, depth = path.len() + 1, "enumeration exceeded max depth");
            return Err(TreeError::corrupted(id, "enumeration exceeded max depth"));
        }
        path.push(id);
        self.stack.push(Frame {
            path,
            children: children.into_iter(),
        });
        Ok(())
    }
}

impl<T: ReadTransaction + ?Sized> Iterator for Descendants<'_, T> {
    type Item = TreeResult<Descendant>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        if let Err(e) = self.expand_pending() {
            self.done = true;
            return Some(Err(e));
        }

        loop {
            let frame = self.stack.last_mut()?;
            let Some(id) = frame.children.next() else {
                self.stack.pop();
                continue;
            };
            let path = frame.path.clone();
            match self.manager.node(&id, self.txn) {
                Ok(Some(node)) => {
                    self.pending = Some((id, path.clone()));
                    return Some(Ok(Descendant { node, path }));
                }
                // Removed between the index scan and the load.
                Ok(None) => continue,
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
    }
}

/// Flow control for the callback enumerators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Control {
    /// Visit the current node's children (recursive enumeration only).
    pub descend: bool,
    /// Stop after the current node.
    pub stop: bool,
}

impl Default for Control {
    fn default() -> Self {
        Self {
            descend: true,
            stop: false,
        }
    }
}

impl NodeManager {
    /// Lazily enumerate every descendant of `root_id`, depth first.
    pub fn descendants<'a, T: ReadTransaction + ?Sized>(
        &'a self,
        root_id: &NodeId,
        txn: &'a T,
    ) -> TreeResult<Descendants<'a, T>> {
        Descendants::new(self, txn, *root_id)
    }

    /// Call `f` for each direct child of `parent_id` until it sets `stop`.
    pub fn enumerate_children<F>(
        &self,
        parent_id: &NodeId,
        txn: &(impl ReadTransaction + ?Sized),
        mut f: F,
    ) -> TreeResult<()>
    where
        F: FnMut(&Node, &mut Control),
    {
        for node in self.children(parent_id, txn)? {
            let mut control = Control::default();
            f(&node, &mut control);
            if control.stop {
                break;
            }
        }
        Ok(())
    }

    /// Call `f` for each descendant of `root_id`, depth first.
    ///
    /// `f` receives the node, the ids between the root and the node
    /// (excluding both) and a [`Control`]. Clearing `descend` skips the
    /// node's subtree; setting `stop` ends the enumeration. The path slice
    /// is only valid for the duration of the call.
    pub fn recursive_enumerate<T, F>(&self, root_id: &NodeId, txn: &T, mut f: F) -> TreeResult<()>
    where
        T: ReadTransaction + ?Sized,
        F: FnMut(&Node, &[NodeId], &mut Control),
    {
        let mut iter = self.descendants(root_id, txn)?;
        while let Some(item) = iter.next() {
            let Descendant { node, path } = item?;
            let mut control = Control::default();
            f(&node, &path, &mut control);
            if control.stop {
                break;
            }
            if !control.descend {
                iter.skip_children();
            }
        }
        Ok(())
    }
}
