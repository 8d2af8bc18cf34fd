//! Traversal guards.

use serde::{Deserialize, Serialize};

/// Limits applied while walking the node graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeConfig {
    /// Maximum number of parent hops from any node to its trunk (default: 256).
    ///
    /// A longer chain is reported as a corrupted tree.
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
    /// Maximum number of pointer hops followed by pointer resolution (default: 16).
    #[serde(default = "default_max_pointer_hops")]
    pub max_pointer_hops: usize,
}

fn default_max_depth() -> usize {
    256
}

fn default_max_pointer_hops() -> usize {
    16
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
            max_pointer_hops: default_max_pointer_hops(),
        }
    }
}
