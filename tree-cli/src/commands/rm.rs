//! Delete a subtree.

use anyhow::Result;
use std::path::Path;
use tree_store::{Database, ReadWriteTransaction};

use super::Session;
use crate::config::Config;

/// Totals of one removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Removed {
    /// Nodes deleted locally.
    pub nodes: usize,
    /// Server deletes now waiting for `push`.
    pub pending_deletes: usize,
}

/// Run the rm command.
pub async fn run(data_dir: &Path, config: Config, path: &str) -> Result<()> {
    let session = Session::open(data_dir, config).await?;
    let removed = remove(&session, path)?;
    println!("Deleted {} node(s)", removed.nodes);
    if removed.pending_deletes > 0 {
        println!(
            "  {} server delete(s) pending. Run 'tree-cli push' to send them.",
            removed.pending_deletes
        );
    }
    Ok(())
}

/// Delete the node at `path` and everything below it.
pub fn remove(session: &Session, path: &str) -> Result<Removed> {
    let mut txn = session.db.begin_read_write()?;
    let node = session.resolve(path, &txn)?;
    let before = session.pending_deletes(&txn)?;
    let deleted = session.store.delete_node(&node.id, &mut txn)?;
    let after = session.pending_deletes(&txn)?;
    txn.commit()?;

    Ok(Removed {
        nodes: deleted.len(),
        pending_deletes: after.saturating_sub(before),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::add::add;
    use crate::commands::testing::initialized;
    use tempfile::tempdir;
    use tree_types::CloudId;

    #[tokio::test]
    async fn removes_whole_subtree() {
        let dir = tempdir().unwrap();
        let config = initialized(dir.path()).await;
        let session = Session::open(dir.path(), config).await.unwrap();
        add(&session, "/home/Docs", None).unwrap();
        add(&session, "/home/Docs/A.txt", None).unwrap();
        add(&session, "/home/Docs/B.txt", None).unwrap();

        let removed = remove(&session, "/home/Docs").unwrap();
        assert_eq!(
            removed,
            Removed {
                nodes: 3,
                pending_deletes: 0
            }
        );

        let txn = session.db.begin_read().unwrap();
        assert!(session.resolve("/home/Docs", &txn).is_err());
    }

    #[tokio::test]
    async fn uploaded_nodes_leave_pending_deletes() {
        let dir = tempdir().unwrap();
        let config = initialized(dir.path()).await;
        let session = Session::open(dir.path(), config).await.unwrap();
        add(&session, "/home/Docs", None).unwrap();
        add(&session, "/home/Docs/A.txt", None).unwrap();
        {
            let mut txn = session.db.begin_read_write().unwrap();
            let node = session.resolve("/home/Docs", &txn).unwrap();
            session
                .store
                .set_cloud_id(&node.id, CloudId::new("cid-1"), &mut txn)
                .unwrap();
            txn.commit().unwrap();
        }

        let removed = remove(&session, "/home/Docs").unwrap();
        assert_eq!(removed.nodes, 2);
        assert_eq!(removed.pending_deletes, 1);

        let txn = session.db.begin_read().unwrap();
        assert_eq!(session.pending_deletes(&txn).unwrap(), 1);
    }

    #[tokio::test]
    async fn trunks_cannot_be_removed() {
        let dir = tempdir().unwrap();
        let config = initialized(dir.path()).await;
        let session = Session::open(dir.path(), config).await.unwrap();
        assert!(remove(&session, "/home").is_err());
    }
}
