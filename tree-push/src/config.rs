//! Push engine settings.

use serde::{Deserialize, Serialize};
use tree_core::RetryPolicy;

/// Push engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushConfig {
    /// When to stop retrying a failing operation.
    #[serde(default)]
    pub retry: RetryPolicy,
    /// Cached storage credentials are refreshed this many seconds before
    /// they expire (default: 300).
    #[serde(default = "default_credential_refresh_margin_secs")]
    pub credential_refresh_margin_secs: u64,
    /// How long to wait for the server's verdict on an upload before
    /// counting a notification failure (default: 30).
    #[serde(default = "default_poll_timeout_secs")]
    pub poll_timeout_secs: u64,
}

fn default_credential_refresh_margin_secs() -> u64 {
    300
}

fn default_poll_timeout_secs() -> u64 {
    30
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            credential_refresh_margin_secs: default_credential_refresh_margin_secs(),
            poll_timeout_secs: default_poll_timeout_secs(),
        }
    }
}
