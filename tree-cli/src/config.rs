//! Configuration management for tree-cli.
//!
//! Settings come from a TOML file (default: `tree.toml` in the data
//! directory). The local profile (who this treesystem belongs to) is kept
//! separately in `profile.json`.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tree_core::TreeConfig;
use tree_push::PushConfig;
use tree_types::{unix_now, TreeId, UserId};

/// Name of the settings file inside the data directory.
pub const CONFIG_FILE: &str = "tree.toml";

const PROFILE_FILE: &str = "profile.json";

/// Root configuration for tree-cli.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Config {
    /// Traversal guards.
    #[serde(default)]
    pub tree: TreeConfig,
    /// Push engine settings.
    #[serde(default)]
    pub push: PushConfig,
    /// Database settings.
    #[serde(default)]
    pub database: DatabaseConfig,
}

/// Database configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DatabaseConfig {
    /// Snapshot file, relative to the data directory unless absolute
    /// (default: tree.db).
    #[serde(default = "default_database_path")]
    pub path: PathBuf,
}

fn default_database_path() -> PathBuf {
    PathBuf::from("tree.db")
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Load `path` if it exists, defaults otherwise.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Where the database snapshot lives for `data_dir`.
    pub fn database_path(&self, data_dir: &Path) -> PathBuf {
        if self.database.path.is_absolute() {
            self.database.path.clone()
        } else {
            data_dir.join(&self.database.path)
        }
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Failed to parse configuration file.
    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying TOML parse error.
        source: toml::de::Error,
    },
}

/// The local user and tree a data directory belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    /// Local user identifier.
    pub user_id: UserId,
    /// Human-readable name.
    pub display_name: String,
    /// Tree the CLI operates on.
    pub tree_id: TreeId,
    /// When the profile was created.
    pub created_at: u64,
}

impl Profile {
    /// Create a new profile.
    pub fn new(user_id: &str, display_name: &str, tree_id: &str) -> Self {
        Self {
            user_id: UserId::new(user_id),
            display_name: display_name.to_string(),
            tree_id: TreeId::new(tree_id),
            created_at: unix_now(),
        }
    }

    /// Load the profile from a directory.
    pub async fn load(data_dir: &Path) -> Result<Self> {
        let path = data_dir.join(PROFILE_FILE);
        let contents = tokio::fs::read_to_string(&path)
            .await
            .context("Treesystem not initialized. Run 'tree-cli init' first.")?;
        serde_json::from_str(&contents).context("Invalid profile")
    }

    /// Save the profile to a directory.
    pub async fn save(&self, data_dir: &Path) -> Result<()> {
        let path = data_dir.join(PROFILE_FILE);
        let contents = serde_json::to_string_pretty(self)?;
        tokio::fs::write(&path, contents)
            .await
            .context("Failed to save profile")?;
        Ok(())
    }

    /// Check if a profile exists.
    pub fn exists(data_dir: &Path) -> bool {
        data_dir.join(PROFILE_FILE).exists()
    }
}
