//! List nodes.

use anyhow::Result;
use std::path::Path;
use tree_store::{Database, ReadTransaction};
use tree_types::{Node, Trunk};

use super::Session;
use crate::config::Config;

/// Run the ls command.
pub async fn run(
    data_dir: &Path,
    config: Config,
    path: Option<&str>,
    recursive: bool,
) -> Result<()> {
    let session = Session::open(data_dir, config).await?;
    for line in listing(&session, path, recursive)? {
        println!("{}", line);
    }
    Ok(())
}

/// One line per node: the root(s), then their children indented by depth.
pub fn listing(session: &Session, path: Option<&str>, recursive: bool) -> Result<Vec<String>> {
    let txn = session.db.begin_read()?;
    let manager = session.store.manager();

    let roots = match path {
        Some(path) => vec![session.resolve(path, &txn)?],
        None => {
            let mut trunks = Vec::with_capacity(Trunk::ALL.len());
            for trunk in Trunk::ALL {
                if let Some(node) = manager.trunk_node_for(
                    &session.profile.user_id,
                    &session.profile.tree_id,
                    trunk,
                    &txn,
                )? {
                    trunks.push(node);
                }
            }
            trunks
        }
    };

    let mut lines = Vec::new();
    for root in &roots {
        lines.push(format!("{}{}", session.display_path(root, &txn)?, marks(root, &txn, session)?));
        if recursive {
            for item in manager.descendants(&root.id, &txn)? {
                let item = item?;
                lines.push(entry(&item.node, item.path.len() + 1, &txn, session)?);
            }
        } else {
            for child in manager.children(&root.id, &txn)? {
                lines.push(entry(&child, 1, &txn, session)?);
            }
        }
    }
    Ok(lines)
}

fn entry(node: &Node, depth: usize, txn: &impl ReadTransaction, session: &Session) -> Result<String> {
    Ok(format!(
        "{}{}{}",
        "  ".repeat(depth),
        node.name,
        marks(node, txn, session)?
    ))
}

fn marks(node: &Node, txn: &impl ReadTransaction, session: &Session) -> Result<String> {
    let mut out = String::new();
    if let Some(pointee_id) = node.pointee_id {
        let target = match session.store.node(&pointee_id, txn)? {
            Some(target) => session.display_path(&target, txn)?,
            None => "(missing)".to_string(),
        };
        out.push_str(&format!(" -> {}", target));
    }
    if !node.is_trunk() {
        match node.cloud_id() {
            Some(_) => out.push_str("  [uploaded]"),
            None => out.push_str("  [local]"),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::add::add;
    use crate::commands::testing::initialized;
    use tempfile::tempdir;

    #[tokio::test]
    async fn lists_trunks_by_default() {
        let dir = tempdir().unwrap();
        let config = initialized(dir.path()).await;
        let session = Session::open(dir.path(), config).await.unwrap();

        let lines = listing(&session, None, false).unwrap();
        assert_eq!(lines, vec!["/home", "/prefs", "/inbox", "/outbox", "/avatar"]);
    }

    #[tokio::test]
    async fn recursive_listing_indents_by_depth() {
        let dir = tempdir().unwrap();
        let config = initialized(dir.path()).await;
        let session = Session::open(dir.path(), config).await.unwrap();
        add(&session, "/home/Docs", None).unwrap();
        add(&session, "/home/Docs/Report.pdf", None).unwrap();
        add(&session, "/home/Music", None).unwrap();

        let lines = listing(&session, Some("/home"), true).unwrap();
        assert_eq!(
            lines,
            vec![
                "/home",
                "  Docs  [local]",
                "    Report.pdf  [local]",
                "  Music  [local]",
            ]
        );

        let flat = listing(&session, Some("/home"), false).unwrap();
        assert_eq!(flat, vec!["/home", "  Docs  [local]", "  Music  [local]"]);
    }

    #[tokio::test]
    async fn pointers_show_their_target() {
        let dir = tempdir().unwrap();
        let config = initialized(dir.path()).await;
        let session = Session::open(dir.path(), config).await.unwrap();
        add(&session, "/home/Report.pdf", None).unwrap();
        add(&session, "/outbox/Shared", Some("/home/Report.pdf")).unwrap();

        let lines = listing(&session, Some("/outbox"), false).unwrap();
        assert_eq!(lines[1], "  Shared -> /home/Report.pdf  [local]");
    }

    #[tokio::test]
    async fn unknown_path_fails() {
        let dir = tempdir().unwrap();
        let config = initialized(dir.path()).await;
        let session = Session::open(dir.path(), config).await.unwrap();
        assert!(listing(&session, Some("/home/Nope"), false).is_err());
    }
}
