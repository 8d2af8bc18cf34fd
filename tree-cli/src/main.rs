//! # tree-cli
//!
//! CLI tool for inspecting and driving a 0k-Tree treesystem.
//!
//! ## Commands
//!
//! - `init`: Provision the local user and its trunks
//! - `add`: Create a node
//! - `ls`: List the children (or the whole subtree) of a node
//! - `resolve`: Show everything derived for a node
//! - `rm`: Delete a subtree
//! - `status`: Show treesystem status
//! - `push`: Push pending changes through a simulated server
//!
//! ## Example
//!
//! ```bash
//! # Provision the local user
//! tree-cli init --user alice --name "Alice" --region us-west-2 --bucket alice-bucket
//!
//! # Build a little tree
//! tree-cli add /home/Docs
//! tree-cli add /home/Docs/Report.pdf
//!
//! # Inspect it
//! tree-cli ls /home --recursive
//! tree-cli resolve /home/Docs/Report.pdf
//!
//! # Upload everything
//! tree-cli push
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;
mod config;

use commands::{add, init, ls, push, resolve, rm, status};

/// CLI tool for inspecting and driving a 0k-Tree treesystem.
#[derive(Parser, Debug)]
#[command(name = "tree-cli")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Data directory for the profile, settings and database
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Settings file (default: tree.toml in the data directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Provision the local user and its trunks
    Init {
        /// User identifier
        #[arg(long, short)]
        user: String,

        /// Display name
        #[arg(long, short)]
        name: String,

        /// Region of the user's bucket
        #[arg(long, default_value = "us-west-2")]
        region: String,

        /// The user's bucket
        #[arg(long)]
        bucket: String,

        /// Tree to operate on
        #[arg(long, default_value = "main")]
        tree: String,
    },

    /// Create a node (renamed to a free name on conflict)
    Add {
        /// Path of the new node, e.g. /home/Docs/Report.pdf
        path: String,

        /// Make the node a pointer to this path
        #[arg(long)]
        pointer_to: Option<String>,
    },

    /// List the children of a node
    Ls {
        /// Path to list (default: every trunk)
        path: Option<String>,

        /// List the whole subtree
        #[arg(long, short)]
        recursive: bool,
    },

    /// Show everything derived for a node
    Resolve {
        /// Path of the node
        path: String,
    },

    /// Delete a node and its subtree
    Rm {
        /// Path of the node
        path: String,
    },

    /// Show treesystem status
    Status,

    /// Push pending changes through a simulated server
    Push {
        /// Fail this many uploads with a connection error first
        #[arg(long, default_value = "0")]
        fail_uploads: u32,

        /// Reject this many uploaded objects during processing first
        #[arg(long, default_value = "0")]
        reject: u32,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    // Determine data directory
    let data_dir = match cli.data_dir {
        Some(dir) => dir,
        None => default_data_dir()?,
    };

    // Ensure data directory exists
    tokio::fs::create_dir_all(&data_dir)
        .await
        .context("Failed to create data directory")?;

    let config_path = cli
        .config
        .unwrap_or_else(|| data_dir.join(config::CONFIG_FILE));
    let settings = config::Config::load_or_default(&config_path)?;

    match cli.command {
        Commands::Init {
            user,
            name,
            region,
            bucket,
            tree,
        } => {
            init::run(&data_dir, &settings, &user, &name, &region, &bucket, &tree).await?;
        }
        Commands::Add { path, pointer_to } => {
            add::run(&data_dir, settings, &path, pointer_to.as_deref()).await?;
        }
        Commands::Ls { path, recursive } => {
            ls::run(&data_dir, settings, path.as_deref(), recursive).await?;
        }
        Commands::Resolve { path } => {
            resolve::run(&data_dir, settings, &path).await?;
        }
        Commands::Rm { path } => {
            rm::run(&data_dir, settings, &path).await?;
        }
        Commands::Status => {
            status::run(&data_dir, settings).await?;
        }
        Commands::Push {
            fail_uploads,
            reject,
        } => {
            push::run(&data_dir, settings, push::Faults { fail_uploads, reject }).await?;
        }
    }

    Ok(())
}

/// Get the default data directory for tree-cli.
fn default_data_dir() -> Result<PathBuf> {
    let dirs = directories::ProjectDirs::from("io", "zerok", "tree-cli")
        .context("Could not determine home directory")?;
    Ok(dirs.data_dir().to_path_buf())
}
