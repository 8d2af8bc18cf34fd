//! User records.

use serde::{Deserialize, Serialize};

use crate::{Region, TreeError, UserId};

/// A user known to this device.
///
/// Local users own treesystems on this device. Remote users are fetched on
/// demand, so a remote owner may legitimately be missing from the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// User identifier.
    pub id: UserId,
    /// Human-readable name.
    pub display_name: String,
    /// Region of the user's bucket.
    pub region: Region,
    /// The user's bucket.
    pub bucket: String,
    /// Whether the user is logged in on this device.
    pub is_local: bool,
}

impl User {
    /// Create a local user.
    pub fn local(
        id: UserId,
        display_name: impl Into<String>,
        region: Region,
        bucket: impl Into<String>,
    ) -> Self {
        Self {
            id,
            display_name: display_name.into(),
            region,
            bucket: bucket.into(),
            is_local: true,
        }
    }

    /// Create a remote user.
    pub fn remote(id: UserId, region: Region, bucket: impl Into<String>) -> Self {
        Self {
            display_name: id.to_string(),
            id,
            region,
            bucket: bucket.into(),
            is_local: false,
        }
    }

    /// Serialize to MessagePack bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, TreeError> {
        rmp_serde::to_vec(self).map_err(TreeError::Serialization)
    }

    /// Deserialize from MessagePack bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, TreeError> {
        rmp_serde::from_slice(bytes).map_err(TreeError::Deserialization)
    }
}
