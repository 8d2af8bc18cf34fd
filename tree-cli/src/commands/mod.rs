//! CLI command implementations.

pub mod add;
pub mod init;
pub mod ls;
pub mod push;
pub mod resolve;
pub mod rm;
pub mod status;

use anyhow::{anyhow, Result};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;
use tree_core::{CloudNodeManager, NodeStore};
use tree_store::{RedbDatabase, ReadTransaction};
use tree_types::{CloudNodeState, Node, TreesystemPath, User};

use crate::config::{Config, Profile};

/// Everything a command needs once the treesystem is initialized.
pub struct Session {
    pub config: Config,
    pub profile: Profile,
    pub db: Arc<RedbDatabase>,
    pub store: NodeStore,
}

impl Session {
    /// Load the profile and open the database.
    pub async fn open(data_dir: &Path, config: Config) -> Result<Self> {
        let profile = Profile::load(data_dir).await?;
        let db_path = config.database_path(data_dir);
        let db = RedbDatabase::open(&db_path)?;
        debug!(path = %db_path.display(), user_id = %profile.user_id, "opened session");
        Ok(Self {
            store: NodeStore::new(config.tree.clone()),
            config,
            profile,
            db: Arc::new(db),
        })
    }

    /// The local user record.
    pub fn user(&self, txn: &impl ReadTransaction) -> Result<User> {
        self.store
            .user(&self.profile.user_id, txn)?
            .ok_or_else(|| anyhow!("User {} is missing from the database", self.profile.user_id))
    }

    /// The node at `path` in the profile's tree.
    pub fn find(&self, path: &TreesystemPath, txn: &impl ReadTransaction) -> Result<Node> {
        self.store
            .manager()
            .find_node_with_path(path, &self.profile.user_id, &self.profile.tree_id, txn)?
            .ok_or_else(|| anyhow!("No such node: {}", path))
    }

    /// Parse `path` and look it up.
    pub fn resolve(&self, path: &str, txn: &impl ReadTransaction) -> Result<Node> {
        let path: TreesystemPath = path.parse()?;
        self.find(&path, txn)
    }

    /// Display path of `node`, or `?` when its chain is broken.
    pub fn display_path(&self, node: &Node, txn: &impl ReadTransaction) -> Result<String> {
        Ok(self
            .store
            .manager()
            .path_for_node(node, txn)?
            .map(|p| p.to_string())
            .unwrap_or_else(|| "?".to_string()))
    }

    /// Shadow records of the profile's tree still waiting for a server delete.
    pub fn pending_deletes(&self, txn: &impl ReadTransaction) -> Result<usize> {
        let clouds = CloudNodeManager::new(self.config.tree.clone());
        let mut count = 0;
        for id in clouds.all_cloud_node_ids(&self.profile.user_id, txn)? {
            if let Some(shadow) = clouds.cloud_node(&id, txn)? {
                if shadow.tree_id == self.profile.tree_id
                    && shadow.state == CloudNodeState::PendingDelete
                {
                    count += 1;
                }
            }
        }
        Ok(count)
    }
}
