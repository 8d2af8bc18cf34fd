//! Show everything derived for a node.

use anyhow::Result;
use std::path::Path;
use tree_store::Database;

use super::Session;
use crate::config::Config;

/// Run the resolve command.
pub async fn run(data_dir: &Path, config: Config, path: &str) -> Result<()> {
    let session = Session::open(data_dir, config).await?;
    for (label, value) in describe(&session, path)? {
        println!("  {:<10} {}", format!("{}:", label), value);
    }
    Ok(())
}

/// `(label, value)` pairs describing the node at `path`.
pub fn describe(session: &Session, path: &str) -> Result<Vec<(&'static str, String)>> {
    let txn = session.db.begin_read()?;
    let manager = session.store.manager();
    let node = session.resolve(path, &txn)?;

    let mut out = vec![
        ("Path", session.display_path(&node, &txn)?),
        ("Node ID", node.id.to_string()),
    ];

    let trunk = manager
        .trunk_node_for_node(&node, &txn)?
        .map(|t| t.name)
        .unwrap_or_else(|| "(detached)".into());
    out.push(("Trunk", trunk));

    let owner = manager
        .owner_for_node(&node, &txn)?
        .map(|u| format!("{} ({})", u.display_name, u.id))
        .unwrap_or_else(|| "(unknown)".into());
    out.push(("Owner", owner));

    let storage = manager
        .storage_location_for_node(&node, &txn)?
        .map(|(region, bucket)| format!("{}/{}", region, bucket))
        .unwrap_or_else(|| "(unknown)".into());
    out.push(("Storage", storage));

    if !node.is_trunk() {
        let locator = session.store.cloud_locator_for_node(&node, &txn)?;
        out.push(("Cloud", locator.to_string()));
    }

    if node.is_pointer() {
        let target = match manager.target_node_for_node(&node, &txn)? {
            Some(target) => session.display_path(&target, &txn)?,
            None => "(missing)".into(),
        };
        out.push(("Target", target));
    }

    out.push((
        "Cloud ID",
        node.cloud_id()
            .map(ToString::to_string)
            .unwrap_or_else(|| "(not uploaded)".into()),
    ));
    if node.immutable {
        out.push(("Immutable", "yes".into()));
    }

    Ok(out)
}
