//! Show treesystem status.

use anyhow::Result;
use std::path::Path;
use tree_store::Database;

use super::Session;
use crate::config::{Config, Profile};

/// Node counts of the profile's tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Counts {
    /// Every node, trunks included.
    pub nodes: usize,
    /// Nodes with a cloudID.
    pub uploaded: usize,
    /// Shadow records waiting for a server delete.
    pub pending_deletes: usize,
}

/// Run the status command.
pub async fn run(data_dir: &Path, config: Config) -> Result<()> {
    println!("=== tree-cli status ===");
    println!();

    if !Profile::exists(data_dir) {
        println!("Treesystem: NOT INITIALIZED");
        println!();
        println!("Run 'tree-cli init --user <id> --name <name> --bucket <bucket>' to initialize.");
        return Ok(());
    }

    let session = Session::open(data_dir, config).await?;
    let txn = session.db.begin_read()?;
    let user = session.user(&txn)?;
    drop(txn);
    let counts = counts(&session)?;

    println!("User:");
    println!("  ID:      {}", user.id);
    println!("  Name:    {}", user.display_name);
    println!("  Storage: {}/{}", user.region, user.bucket);
    println!("  Init:    {}", format_timestamp(session.profile.created_at));
    println!();
    println!("Tree {}:", session.profile.tree_id);
    println!("  Nodes:           {}", counts.nodes);
    println!("  Uploaded:        {}", counts.uploaded);
    println!("  Pending deletes: {}", counts.pending_deletes);

    Ok(())
}

/// Count the nodes of the profile's tree.
pub fn counts(session: &Session) -> Result<Counts> {
    let txn = session.db.begin_read()?;
    let manager = session.store.manager();
    let user = &session.profile.user_id;
    let tree = &session.profile.tree_id;
    Ok(Counts {
        nodes: manager.all_node_ids_in_tree(user, tree, &txn)?.len(),
        uploaded: manager.all_uploaded_node_ids(user, tree, &txn)?.len(),
        pending_deletes: session.pending_deletes(&txn)?,
    })
}

/// Format a Unix timestamp relative to now.
fn format_timestamp(ts: u64) -> String {
    let diff = tree_types::unix_now().saturating_sub(ts);

    if diff < 60 {
        "just now".to_string()
    } else if diff < 3600 {
        format!("{} minutes ago", diff / 60)
    } else if diff < 86400 {
        format!("{} hours ago", diff / 3600)
    } else {
        format!("{} days ago", diff / 86400)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::add::add;
    use crate::commands::testing::initialized;
    use tempfile::tempdir;

    #[tokio::test]
    async fn status_without_init() {
        let dir = tempdir().unwrap();

        // Should succeed but show "not initialized"
        let result = run(dir.path(), Config::default()).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn status_counts_nodes() {
        let dir = tempdir().unwrap();
        let config = initialized(dir.path()).await;
        let session = Session::open(dir.path(), config.clone()).await.unwrap();
        add(&session, "/home/Docs", None).unwrap();

        assert_eq!(
            counts(&session).unwrap(),
            Counts {
                nodes: 6,
                uploaded: 0,
                pending_deletes: 0
            }
        );
        drop(session);
        assert!(run(dir.path(), config).await.is_ok());
    }

    #[test]
    fn format_timestamp_works() {
        let now = tree_types::unix_now();

        assert_eq!(format_timestamp(now), "just now");
        assert!(format_timestamp(now - 120).contains("minutes"));
        assert!(format_timestamp(now - 7200).contains("hours"));
        assert!(format_timestamp(now - 172800).contains("days"));
    }
}
