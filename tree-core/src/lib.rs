//! # tree-core
//!
//! Treesystem logic for 0k-Tree (no network I/O).
//!
//! This crate resolves, traverses and mutates the node graph stored through
//! `tree-store`, and holds the pure state machines that drive outbound
//! cloud operations.
//!
//! ## Design Philosophy
//!
//! The managers hold no mutable state. Every call takes the transaction it
//! reads from or writes to, so results are always consistent with one
//! snapshot of the graph:
//! - [`NodeManager`] - trunk/anchor/owner/pointer resolution, paths, finds,
//!   enumeration and naming conflicts
//! - [`CloudNodeManager`] - queries over shadow records of server-only state
//! - [`NodeStore`] - index-maintaining writes that enforce graph invariants
//!
//! The push side is split the same way as the rest of the workspace: the
//! [`OperationState`] machine, [`PhaseCounters`] and [`RetryPolicy`] live
//! here and are tested without mocks; `tree-push` performs the I/O they
//! ask for.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cloud_manager;
pub mod config;
pub mod conflict;
pub mod enumerate;
pub mod manager;
pub mod operation;
pub mod phase;
pub mod retry;
mod schema;
pub mod store;

pub use cloud_manager::{CloudDescendants, CloudNodeManager};
pub use config::TreeConfig;
pub use conflict::next_available_name;
pub use enumerate::{Control, Descendant, Descendants};
pub use manager::NodeManager;
pub use operation::{Action, Event, OperationState, Phase};
pub use phase::{DomainCounter, FailureDomain, PhaseCounters};
pub use retry::{Escalation, RetryPolicy, Verdict};
pub use store::NodeStore;

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use tree_store::{Database, MemoryDatabase, ReadWriteTransaction};
    use tree_types::{
        Anchor, CloudId, CloudLocator, CloudNode, CloudNodeState, CloudPath, DirPrefix, Node,
        NodeId, Permissions, Region, TreeError, TreeId, TreesystemPath, Trunk, User, UserId,
    };

    struct Fixture {
        db: MemoryDatabase,
        store: NodeStore,
        user: UserId,
        tree: TreeId,
        home: NodeId,
    }

    impl Fixture {
        fn new() -> Self {
            let db = MemoryDatabase::new();
            let store = NodeStore::default();
            let user = UserId::new("alice");
            let tree = TreeId::new("main");
            let alice = User::local(user.clone(), "Alice", Region::EuWest1, "alice-bucket");

            let mut txn = db.begin_read_write().unwrap();
            let trunks = store.provision_local_user(&alice, &tree, &mut txn).unwrap();
            txn.commit().unwrap();

            let home = trunks
                .iter()
                .find(|n| n.trunk() == Some(Trunk::Home))
                .unwrap()
                .id;
            Self {
                db,
                store,
                user,
                tree,
                home,
            }
        }

        fn node(&self, parent: NodeId, name: &str) -> Node {
            Node::new(parent, name, self.user.clone(), self.tree.clone())
        }

        fn insert(&self, parent: NodeId, name: &str) -> Node {
            let node = self.node(parent, name);
            let mut txn = self.db.begin_read_write().unwrap();
            self.store.insert_node(&node, &mut txn).unwrap();
            txn.commit().unwrap();
            node
        }

        /// Write a record without validation, to build corrupted graphs.
        fn put_raw(&self, node: &Node) {
            let mut txn = self.db.begin_read_write().unwrap();
            txn.put(
                schema::NODES,
                &node.id.to_string(),
                node.to_bytes().unwrap(),
                schema::node_index_entries(node, None),
            )
            .unwrap();
            txn.commit().unwrap();
        }

        fn manager(&self) -> &NodeManager {
            self.store.manager()
        }
    }

    fn is_corrupted(err: &TreeError) -> bool {
        matches!(err, TreeError::CorruptedTree { .. })
    }

    #[test]
    fn provisioning_is_idempotent() {
        let fx = Fixture::new();
        let alice = fx.store.user(&fx.user, &fx.db.begin_read().unwrap()).unwrap().unwrap();

        let mut txn = fx.db.begin_read_write().unwrap();
        let again = fx.store.provision_local_user(&alice, &fx.tree, &mut txn).unwrap();
        txn.commit().unwrap();

        assert_eq!(again.len(), Trunk::ALL.len());
        assert!(again.iter().any(|n| n.id == fx.home));
        let read = fx.db.begin_read().unwrap();
        assert_eq!(
            fx.manager().all_node_ids_in_tree(&fx.user, &fx.tree, &read).unwrap().len(),
            Trunk::ALL.len()
        );
    }

    #[test]
    fn remote_users_cannot_be_provisioned() {
        let fx = Fixture::new();
        let bob = User::remote(UserId::new("bob"), Region::UsEast1, "bob-bucket");
        let mut txn = fx.db.begin_read_write().unwrap();
        assert!(fx.store.provision_local_user(&bob, &fx.tree, &mut txn).is_err());
    }

    #[test]
    fn trunk_resolution() {
        let fx = Fixture::new();
        let docs = fx.insert(fx.home, "Docs");
        let report = fx.insert(docs.id, "Report.pdf");

        let read = fx.db.begin_read().unwrap();
        let trunk = fx.manager().trunk_node_for_node(&report, &read).unwrap().unwrap();
        assert_eq!(trunk.id, fx.home);

        let home = fx.store.require_node(&fx.home, &read).unwrap();
        let itself = fx.manager().trunk_node_for_node(&home, &read).unwrap().unwrap();
        assert_eq!(itself.id, fx.home);
    }

    #[test]
    fn depth_guard_reports_corruption() {
        let fx = Fixture::new();
        let mut parent = fx.home;
        let mut deepest = None;
        for i in 0..6 {
            let node = fx.insert(parent, &format!("level {}", i));
            parent = node.id;
            deepest = Some(node);
        }
        let deepest = deepest.unwrap();

        let shallow = NodeManager::new(TreeConfig {
            max_depth: 4,
            ..TreeConfig::default()
        });
        let read = fx.db.begin_read().unwrap();
        let err = shallow.path_for_node(&deepest, &read).unwrap_err();
        assert!(is_corrupted(&err));

        // The default guard is far above six levels.
        let path = fx.manager().path_for_node(&deepest, &read).unwrap().unwrap();
        assert_eq!(path.components.len(), 6);
    }

    #[test]
    fn parent_cycle_reports_corruption() {
        let fx = Fixture::new();
        let mut a = fx.node(fx.home, "a");
        let mut b = fx.node(fx.home, "b");
        a.parent_id = Some(b.id);
        b.parent_id = Some(a.id);
        fx.put_raw(&a);
        fx.put_raw(&b);

        let read = fx.db.begin_read().unwrap();
        let err = fx.manager().trunk_node_for_node(&a, &read).unwrap_err();
        assert!(is_corrupted(&err));
    }

    #[test]
    fn dangling_parent_resolves_to_none() {
        let fx = Fixture::new();
        let orphan = fx.node(NodeId::new(), "orphan");
        fx.put_raw(&orphan);

        let read = fx.db.begin_read().unwrap();
        assert!(fx.manager().trunk_node_for_node(&orphan, &read).unwrap().is_none());
        assert!(fx.manager().path_for_node(&orphan, &read).unwrap().is_none());
        assert!(fx.manager().anchor_node_for_node(&orphan, &read).unwrap().is_none());
    }

    #[test]
    fn path_round_trip_through_find() {
        let fx = Fixture::new();
        let docs = fx.insert(fx.home, "Docs");
        let report = fx.insert(docs.id, "Report.pdf");

        let read = fx.db.begin_read().unwrap();
        let path = fx.manager().path_for_node(&report, &read).unwrap().unwrap();
        assert_eq!(path.to_string(), "/home/Docs/Report.pdf");

        // Lookup uses the normalized name.
        let query = TreesystemPath::new(Trunk::Home, vec!["docs".into(), "REPORT.pdf".into()]);
        let found = fx
            .manager()
            .find_node_with_path(&query, &fx.user, &fx.tree, &read)
            .unwrap()
            .unwrap();
        assert_eq!(found.id, report.id);

        let ancestors = fx.manager().parent_node_ids_for_node(&report, &read).unwrap().unwrap();
        assert_eq!(ancestors, vec![fx.home, docs.id]);
        assert!(fx.manager().is_node_a_descendant_of(&report, &fx.home, &read).unwrap());
        assert!(!fx.manager().is_node_a_descendant_of(&docs, &report.id, &read).unwrap());
    }

    #[test]
    fn sibling_name_conflict_on_insert() {
        let fx = Fixture::new();
        fx.insert(fx.home, "Report.pdf");

        let clash = fx.node(fx.home, "report.PDF");
        let mut txn = fx.db.begin_read_write().unwrap();
        let err = fx.store.insert_node(&clash, &mut txn).unwrap_err();
        assert!(matches!(err, TreeError::NameConflict { .. }));
    }

    #[test]
    fn naming_conflicts_pick_next_free_counter() {
        let fx = Fixture::new();
        let original = fx.insert(fx.home, "Report.pdf");

        let second = fx.node(fx.home, "Report.pdf");
        let read = fx.db.begin_read().unwrap();
        let name = fx.manager().resolve_naming_conflict(&second, &read).unwrap();
        assert_eq!(name, "Report 2.pdf");
        drop(read);
        fx.insert(fx.home, &name);

        let third = fx.node(fx.home, "Report.pdf");
        let read = fx.db.begin_read().unwrap();
        assert_eq!(
            fx.manager().resolve_naming_conflict(&third, &read).unwrap(),
            "Report 3.pdf"
        );

        // A stored node does not conflict with itself.
        assert_eq!(
            fx.manager().resolve_naming_conflict(&original, &read).unwrap(),
            "Report.pdf"
        );
    }

    #[test]
    fn pointer_resolution() {
        let fx = Fixture::new();
        let target = fx.insert(fx.home, "target");
        let pointer = fx.node(fx.home, "pointer").with_pointee(target.id);
        let mut txn = fx.db.begin_read_write().unwrap();
        fx.store.insert_node(&pointer, &mut txn).unwrap();
        txn.commit().unwrap();

        let read = fx.db.begin_read().unwrap();
        let resolved = fx.manager().target_node_for_node(&pointer, &read).unwrap().unwrap();
        assert_eq!(resolved.id, target.id);
        let plain = fx.manager().target_node_for_node(&target, &read).unwrap().unwrap();
        assert_eq!(plain.id, target.id);
        let back = fx
            .manager()
            .find_node_with_pointee_id(&target.id, &fx.user, &fx.tree, &read)
            .unwrap()
            .unwrap();
        assert_eq!(back.id, pointer.id);
        drop(read);

        let mut txn = fx.db.begin_read_write().unwrap();
        fx.store.delete_node(&target.id, &mut txn).unwrap();
        txn.commit().unwrap();

        let read = fx.db.begin_read().unwrap();
        assert!(fx.manager().target_node_for_node(&pointer, &read).unwrap().is_none());
    }

    #[test]
    fn pointer_cycles_report_corruption() {
        let fx = Fixture::new();
        let mut first = fx.node(fx.home, "first");
        let second = fx.node(fx.home, "second").with_pointee(first.id);
        first.pointee_id = Some(second.id);
        let selfish = {
            let node = fx.node(fx.home, "selfish");
            let id = node.id;
            node.with_pointee(id)
        };

        let mut txn = fx.db.begin_read_write().unwrap();
        fx.store.insert_node(&first, &mut txn).unwrap();
        fx.store.insert_node(&second, &mut txn).unwrap();
        fx.store.insert_node(&selfish, &mut txn).unwrap();
        txn.commit().unwrap();

        let read = fx.db.begin_read().unwrap();
        assert!(is_corrupted(
            &fx.manager().target_node_for_node(&first, &read).unwrap_err()
        ));
        assert!(is_corrupted(
            &fx.manager().target_node_for_node(&selfish, &read).unwrap_err()
        ));
    }

    #[test]
    fn pruned_enumeration_skips_subtree() {
        let fx = Fixture::new();
        let a = fx.insert(fx.home, "A");
        fx.insert(a.id, "A1");
        fx.insert(fx.home, "B");

        let read = fx.db.begin_read().unwrap();
        let mut visited = BTreeSet::new();
        fx.manager()
            .recursive_enumerate(&fx.home, &read, |node, _path, control| {
                visited.insert(node.name.clone());
                if node.name == "A" {
                    control.descend = false;
                }
            })
            .unwrap();
        assert_eq!(visited, BTreeSet::from(["A".to_string(), "B".to_string()]));

        let mut all = Vec::new();
        fx.manager()
            .recursive_enumerate(&fx.home, &read, |node, path, _| {
                all.push((node.name.clone(), path.len()));
            })
            .unwrap();
        assert_eq!(
            all,
            vec![("A".to_string(), 0), ("A1".to_string(), 1), ("B".to_string(), 0)]
        );
    }

    #[test]
    fn enumeration_stops_on_request() {
        let fx = Fixture::new();
        for name in ["a", "b", "c"] {
            fx.insert(fx.home, name);
        }
        let read = fx.db.begin_read().unwrap();
        let mut seen = Vec::new();
        fx.manager()
            .enumerate_children(&fx.home, &read, |node, control| {
                seen.push(node.name.clone());
                control.stop = node.name == "b";
            })
            .unwrap();
        assert_eq!(seen, vec!["a", "b"]);
    }

    #[test]
    fn cloud_id_is_assigned_once() {
        let fx = Fixture::new();
        let node = fx.insert(fx.home, "doc");

        let mut txn = fx.db.begin_read_write().unwrap();
        fx.store.set_cloud_id(&node.id, CloudId::new("c1"), &mut txn).unwrap();
        fx.store.set_cloud_id(&node.id, CloudId::new("c1"), &mut txn).unwrap();
        let err = fx
            .store
            .set_cloud_id(&node.id, CloudId::new("c2"), &mut txn)
            .unwrap_err();
        assert!(matches!(err, TreeError::CloudIdReassigned { .. }));

        let mut renamed = fx.store.require_node(&node.id, &txn).unwrap();
        renamed.name = "renamed".into();
        fx.store.update_node(&renamed, &mut txn).unwrap();

        // Replacing with a copy that lost the cloudID is a reassignment too.
        let mut cleared = fx.node(fx.home, "renamed");
        cleared.id = node.id;
        assert!(matches!(
            fx.store.update_node(&cleared, &mut txn).unwrap_err(),
            TreeError::CloudIdReassigned { .. }
        ));
        txn.commit().unwrap();

        let read = fx.db.begin_read().unwrap();
        let found = fx
            .manager()
            .find_node_with_cloud_id(&CloudId::new("c1"), &fx.user, &fx.tree, &read)
            .unwrap()
            .unwrap();
        assert_eq!(found.name, "renamed");
        assert_eq!(
            fx.manager().all_uploaded_node_ids(&fx.user, &fx.tree, &read).unwrap(),
            vec![node.id]
        );
    }

    #[test]
    fn immutable_nodes_refuse_changes() {
        let fx = Fixture::new();
        let mut txn = fx.db.begin_read_write().unwrap();
        let mut home = fx.store.require_node(&fx.home, &txn).unwrap();
        home.name = "house".into();
        assert!(matches!(
            fx.store.update_node(&home, &mut txn).unwrap_err(),
            TreeError::ImmutableNode { .. }
        ));
        assert!(matches!(
            fx.store.delete_node(&fx.home, &mut txn).unwrap_err(),
            TreeError::ImmutableNode { .. }
        ));
    }

    #[test]
    fn moving_below_own_descendant_is_rejected() {
        let fx = Fixture::new();
        let parent = fx.insert(fx.home, "parent");
        let child = fx.insert(parent.id, "child");

        let mut moved = parent.clone();
        moved.parent_id = Some(child.id);
        let mut txn = fx.db.begin_read_write().unwrap();
        assert!(matches!(
            fx.store.update_node(&moved, &mut txn).unwrap_err(),
            TreeError::InvalidParent { .. }
        ));
    }

    #[test]
    fn insert_beyond_max_depth_is_rejected() {
        let fx = Fixture::new();
        let store = NodeStore::new(TreeConfig {
            max_depth: 3,
            ..TreeConfig::default()
        });

        let mut txn = fx.db.begin_read_write().unwrap();
        let mut parent = fx.home;
        for i in 1..=3 {
            let node = fx.node(parent, &format!("level {}", i));
            store.insert_node(&node, &mut txn).unwrap();
            parent = node.id;
        }
        let too_deep = fx.node(parent, "level 4");
        assert!(matches!(
            store.insert_node(&too_deep, &mut txn).unwrap_err(),
            TreeError::InvalidParent { .. }
        ));
        txn.commit().unwrap();

        // Everything that was accepted still resolves.
        let read = fx.db.begin_read().unwrap();
        let deepest = store.node(&parent, &read).unwrap().unwrap();
        let path = store.manager().path_for_node(&deepest, &read).unwrap().unwrap();
        assert_eq!(path.to_string(), "/home/level 1/level 2/level 3");
    }

    #[test]
    fn move_counts_the_depth_of_the_moved_subtree() {
        let fx = Fixture::new();
        let store = NodeStore::new(TreeConfig {
            max_depth: 3,
            ..TreeConfig::default()
        });
        let a = fx.insert(fx.home, "a");
        let b = fx.insert(a.id, "b");
        let folder = fx.insert(fx.home, "folder");
        fx.insert(folder.id, "file.txt");

        // folder/file.txt below a/b would put file.txt at depth 4.
        let mut moved = folder.clone();
        moved.parent_id = Some(b.id);
        let mut txn = fx.db.begin_read_write().unwrap();
        assert!(matches!(
            store.update_node(&moved, &mut txn).unwrap_err(),
            TreeError::InvalidParent { .. }
        ));

        moved.parent_id = Some(a.id);
        store.update_node(&moved, &mut txn).unwrap();
    }

    #[test]
    fn delete_leaves_pending_delete_shadow_records() {
        let fx = Fixture::new();
        let folder = fx.insert(fx.home, "folder");
        let file = fx.insert(folder.id, "file.txt");

        let mut txn = fx.db.begin_read_write().unwrap();
        fx.store.set_cloud_id(&file.id, CloudId::new("cf"), &mut txn).unwrap();
        let deleted = fx.store.delete_node(&folder.id, &mut txn).unwrap();
        txn.commit().unwrap();
        assert_eq!(deleted, vec![file.id, folder.id]);

        let read = fx.db.begin_read().unwrap();
        assert!(fx.store.node(&file.id, &read).unwrap().is_none());
        assert!(!fx.manager().has_children(&fx.home, &read).unwrap());

        let clouds = CloudNodeManager::default();
        let shadow = clouds
            .find_cloud_node_with_cloud_id(&CloudId::new("cf"), &fx.user, &fx.tree, &read)
            .unwrap()
            .unwrap();
        assert_eq!(shadow.state, CloudNodeState::PendingDelete);
        assert_eq!(shadow.locator.bucket, "alice-bucket");
        assert_eq!(clouds.all_cloud_node_ids(&fx.user, &read).unwrap(), vec![shadow.id]);

        // Only uploaded nodes leave a shadow record.
        let children = clouds
            .cloud_node_children(&folder.dir_prefix, &fx.user, &fx.tree, &read)
            .unwrap();
        assert_eq!(children.len(), 1);
    }

    fn shadow(fx: &Fixture, parent: &DirPrefix, name: &str, own: Option<DirPrefix>) -> CloudNode {
        let path = CloudPath::new(fx.tree.clone(), parent.clone(), name);
        let mut shadow = CloudNode::new(
            fx.user.clone(),
            fx.tree.clone(),
            CloudLocator::new(Region::EuWest1, "alice-bucket", path),
            CloudNodeState::Orphan {
                has_rcrd: true,
                has_data: false,
            },
        );
        shadow.dir_prefix = own;
        shadow
    }

    #[test]
    fn cloud_descendants_walk_nested_prefixes_lazily() {
        let fx = Fixture::new();
        let root = DirPrefix::random();
        let folder_prefix = DirPrefix::random();
        let folder = shadow(&fx, &root, "folder", Some(folder_prefix.clone()));
        let inner = shadow(&fx, &folder_prefix, "inner", None);
        let sibling = shadow(&fx, &root, "sibling", None);

        let mut txn = fx.db.begin_read_write().unwrap();
        for record in [&folder, &inner, &sibling] {
            fx.store.insert_cloud_node(record, &mut txn).unwrap();
        }
        txn.commit().unwrap();

        let read = fx.db.begin_read().unwrap();
        let clouds = CloudNodeManager::default();
        let ids: BTreeSet<_> = clouds
            .recursive_cloud_node_descendants(&root, &fx.user, &fx.tree, &read)
            .unwrap()
            .map(|item| item.unwrap().id)
            .collect();
        assert_eq!(ids, BTreeSet::from([folder.id, inner.id, sibling.id]));

        // Taking one record leaves the rest unvisited.
        let first = clouds
            .recursive_cloud_node_descendants(&root, &fx.user, &fx.tree, &read)
            .unwrap()
            .next()
            .unwrap()
            .unwrap();
        assert!(first.id == folder.id || first.id == sibling.id);
    }

    #[test]
    fn cloud_descendant_prefix_cycle_is_corruption() {
        let fx = Fixture::new();
        let root = DirPrefix::random();
        let looping = shadow(&fx, &root, "loop", Some(root.clone()));

        let mut txn = fx.db.begin_read_write().unwrap();
        fx.store.insert_cloud_node(&looping, &mut txn).unwrap();
        txn.commit().unwrap();

        let read = fx.db.begin_read().unwrap();
        let results: Vec<_> = CloudNodeManager::default()
            .recursive_cloud_node_descendants(&root, &fx.user, &fx.tree, &read)
            .unwrap()
            .collect();
        assert_eq!(results.len(), 1);
        assert!(is_corrupted(results[0].as_ref().unwrap_err()));
    }

    #[test]
    fn find_by_cloud_path_and_dir_prefix() {
        let fx = Fixture::new();
        let docs = fx.insert(fx.home, "Docs");
        let report = fx.insert(docs.id, "Report.pdf");

        let read = fx.db.begin_read().unwrap();
        let locator = fx.store.cloud_locator_for_node(&report, &read).unwrap();
        assert_eq!(locator.region, Region::EuWest1);
        assert_eq!(locator.cloud_path.dir_prefix, docs.dir_prefix);

        let found = fx
            .manager()
            .find_node_with_cloud_path(
                &locator.cloud_path,
                &locator.bucket,
                locator.region,
                &fx.user,
                &read,
            )
            .unwrap()
            .unwrap();
        assert_eq!(found.id, report.id);

        let by_prefix = fx
            .manager()
            .find_node_with_dir_prefix(
                &docs.dir_prefix,
                "alice-bucket",
                Region::EuWest1,
                &fx.user,
                &fx.tree,
                &read,
            )
            .unwrap()
            .unwrap();
        assert_eq!(by_prefix.id, docs.id);

        // Same prefix, wrong bucket.
        assert!(fx
            .manager()
            .find_node_with_dir_prefix(
                &docs.dir_prefix,
                "other-bucket",
                Region::EuWest1,
                &fx.user,
                &fx.tree,
                &read,
            )
            .unwrap()
            .is_none());
    }

    #[test]
    fn anchors_redirect_storage_and_ownership() {
        let fx = Fixture::new();
        let bob = UserId::new("bob");
        let shared = fx.node(fx.home, "Shared").with_anchor(Anchor {
            owner_id: bob.clone(),
            bucket: "bob-bucket".into(),
            region: Region::UsEast1,
        });
        let mut txn = fx.db.begin_read_write().unwrap();
        fx.store
            .put_user(&User::remote(bob.clone(), Region::UsEast1, "bob-bucket"), &mut txn)
            .unwrap();
        fx.store.insert_node(&shared, &mut txn).unwrap();
        txn.commit().unwrap();
        let inner = fx.insert(shared.id, "notes.txt");
        let plain = fx.insert(fx.home, "plain.txt");

        let read = fx.db.begin_read().unwrap();
        let m = fx.manager();
        assert_eq!(m.anchor_node_for_node(&inner, &read).unwrap().unwrap().id, shared.id);
        assert_eq!(m.owner_id_for_node(&inner, &read).unwrap(), Some(bob.clone()));
        assert_eq!(m.owner_for_node(&inner, &read).unwrap().unwrap().id, bob);
        assert_eq!(
            m.storage_location_for_node(&inner, &read).unwrap(),
            Some((Region::UsEast1, "bob-bucket".to_string()))
        );

        assert_eq!(m.anchor_node_for_node(&plain, &read).unwrap().unwrap().id, fx.home);
        assert_eq!(m.owner_id_for_node(&plain, &read).unwrap(), Some(fx.user.clone()));
        assert_eq!(
            m.storage_location_for_node(&plain, &read).unwrap(),
            Some((Region::EuWest1, "alice-bucket".to_string()))
        );
    }

    #[test]
    fn reset_permissions_copies_parent_share_list() {
        let fx = Fixture::new();
        let mut node = fx.insert(fx.home, "doc");
        node.share_list.add_user(&UserId::new("mallory"), Permissions::read_only());

        let read = fx.db.begin_read().unwrap();
        fx.manager().reset_permissions_for_node(&mut node, &read).unwrap();
        assert_eq!(node.share_list.len(), 1);
        assert_eq!(node.share_list.user(&fx.user), Some(Permissions::owner()));
        assert!(node.share_list.user(&UserId::new("mallory")).is_none());
    }

    #[test]
    fn rename_keeps_name_index_current() {
        let fx = Fixture::new();
        let node = fx.insert(fx.home, "draft.txt");

        let mut txn = fx.db.begin_read_write().unwrap();
        fx.store.rename_node(&node.id, "final.txt", &mut txn).unwrap();
        txn.commit().unwrap();

        let read = fx.db.begin_read().unwrap();
        let m = fx.manager();
        assert!(m.find_node_with_name("draft.txt", &fx.home, &read).unwrap().is_none());
        assert_eq!(
            m.find_node_with_name("FINAL.txt", &fx.home, &read).unwrap().unwrap().id,
            node.id
        );
        let cloud_name = tree_content::cloud_name(&Trunk::Home.dir_prefix(), "final.txt");
        assert_eq!(
            m.find_node_with_cloud_name(&cloud_name, &fx.home, &read)
                .unwrap()
                .unwrap()
                .id,
            node.id
        );
    }
}
