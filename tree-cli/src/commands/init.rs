//! Provision the local user and its trunks.

use anyhow::{Context, Result};
use std::path::Path;
use tree_core::NodeStore;
use tree_store::{Database, RedbDatabase, ReadWriteTransaction};
use tree_types::{Region, User};

use crate::config::{Config, Profile};

/// Run the init command.
pub async fn run(
    data_dir: &Path,
    config: &Config,
    user_id: &str,
    name: &str,
    region: &str,
    bucket: &str,
    tree: &str,
) -> Result<()> {
    // Check if already initialized
    if Profile::exists(data_dir) {
        anyhow::bail!(
            "Treesystem already initialized. Delete {} to reinitialize.",
            data_dir.join("profile.json").display()
        );
    }

    let region: Region = region.parse().context("Invalid region")?;
    let profile = Profile::new(user_id, name, tree);
    let user = User::local(profile.user_id.clone(), name, region, bucket);

    let db = RedbDatabase::open(&config.database_path(data_dir))?;
    let store = NodeStore::new(config.tree.clone());
    let mut txn = db.begin_read_write()?;
    let trunks = store.provision_local_user(&user, &profile.tree_id, &mut txn)?;
    txn.commit()?;

    profile.save(data_dir).await?;

    println!("Treesystem initialized successfully!");
    println!();
    println!("  User:     {} ({})", profile.display_name, profile.user_id);
    println!("  Tree:     {}", profile.tree_id);
    println!("  Storage:  {}/{}", user.region, user.bucket);
    println!("  Data dir: {}", data_dir.display());
    println!();
    println!("Trunks:");
    for trunk in &trunks {
        println!("  /{}", trunk.name);
    }

    Ok(())
}
