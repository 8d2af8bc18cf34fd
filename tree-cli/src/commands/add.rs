//! Create a node.

use anyhow::{anyhow, Result};
use std::path::Path;
use tree_core::next_available_name;
use tree_store::{Database, ReadWriteTransaction};
use tree_types::{Node, TreesystemPath};

use super::Session;
use crate::config::Config;

/// Run the add command.
pub async fn run(
    data_dir: &Path,
    config: Config,
    path: &str,
    pointer_to: Option<&str>,
) -> Result<()> {
    let session = Session::open(data_dir, config).await?;
    let added = add(&session, path, pointer_to)?;
    println!("Added {}", added);
    if added.name() != path.parse::<TreesystemPath>()?.name() {
        println!("  (renamed: a sibling already uses that name)");
    }
    Ok(())
}

/// Insert the node at `path`, returning where it actually landed.
pub fn add(session: &Session, path: &str, pointer_to: Option<&str>) -> Result<TreesystemPath> {
    let requested: TreesystemPath = path.parse()?;
    let (Some(parent_path), Some(name)) = (requested.parent(), requested.name()) else {
        anyhow::bail!("Trunks already exist and cannot be added");
    };

    let mut txn = session.db.begin_read_write()?;
    let parent = session.find(&parent_path, &txn)?;
    let manager = session.store.manager();
    let name = next_available_name(name, |candidate| {
        Ok(manager
            .find_node_with_name(candidate, &parent.id, &txn)?
            .is_some())
    })?;

    let mut node = Node::new(
        parent.id,
        name.clone(),
        session.profile.user_id.clone(),
        session.profile.tree_id.clone(),
    );
    if let Some(target) = pointer_to {
        let target = session
            .resolve(target, &txn)
            .map_err(|e| anyhow!("Pointer target: {}", e))?;
        node = node.with_pointee(target.id);
    }
    session.store.insert_node(&node, &mut txn)?;
    txn.commit()?;

    Ok(parent_path.child(name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::testing::initialized;
    use tempfile::tempdir;

    #[tokio::test]
    async fn add_creates_nested_nodes() {
        let dir = tempdir().unwrap();
        let config = initialized(dir.path()).await;
        let session = Session::open(dir.path(), config).await.unwrap();

        add(&session, "/home/Docs", None).unwrap();
        let added = add(&session, "/home/Docs/Report.pdf", None).unwrap();
        assert_eq!(added.to_string(), "/home/Docs/Report.pdf");

        let txn = session.db.begin_read().unwrap();
        let node = session.resolve("/home/Docs/Report.pdf", &txn).unwrap();
        assert_eq!(node.name, "Report.pdf");
    }

    #[tokio::test]
    async fn add_renames_on_sibling_conflict() {
        let dir = tempdir().unwrap();
        let config = initialized(dir.path()).await;
        let session = Session::open(dir.path(), config).await.unwrap();

        add(&session, "/home/Report.pdf", None).unwrap();
        let second = add(&session, "/home/report.PDF", None).unwrap();
        assert_eq!(second.to_string(), "/home/report 2.PDF");
    }

    #[tokio::test]
    async fn add_requires_existing_parent() {
        let dir = tempdir().unwrap();
        let config = initialized(dir.path()).await;
        let session = Session::open(dir.path(), config).await.unwrap();

        assert!(add(&session, "/home/Missing/Report.pdf", None).is_err());
        assert!(add(&session, "/home", None).is_err());
    }

    #[tokio::test]
    async fn add_pointer_resolves_to_target() {
        let dir = tempdir().unwrap();
        let config = initialized(dir.path()).await;
        let session = Session::open(dir.path(), config).await.unwrap();

        add(&session, "/home/Report.pdf", None).unwrap();
        add(&session, "/outbox/Shared", Some("/home/Report.pdf")).unwrap();

        let txn = session.db.begin_read().unwrap();
        let pointer = session.resolve("/outbox/Shared", &txn).unwrap();
        let target = session
            .store
            .manager()
            .target_node_for_node(&pointer, &txn)
            .unwrap()
            .unwrap();
        assert_eq!(target.name, "Report.pdf");
    }

    #[tokio::test]
    async fn add_without_init_fails() {
        let dir = tempdir().unwrap();
        let result = run(dir.path(), Config::default(), "/home/Docs", None).await;
        assert!(result.is_err());
    }
}
