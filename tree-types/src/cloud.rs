//! Cloud locations and the shadow records of server-only state.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{CloudId, CloudNodeId, DirPrefix, TreeError, TreeId, UserId};

/// Object-storage region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Region {
    /// us-east-1
    UsEast1,
    /// us-east-2
    UsEast2,
    /// us-west-1
    UsWest1,
    /// us-west-2
    UsWest2,
    /// eu-west-1
    EuWest1,
    /// eu-central-1
    EuCentral1,
    /// ap-southeast-1
    ApSoutheast1,
    /// ap-northeast-1
    ApNortheast1,
}

impl Region {
    /// Every known region.
    pub const ALL: [Region; 8] = [
        Region::UsEast1,
        Region::UsEast2,
        Region::UsWest1,
        Region::UsWest2,
        Region::EuWest1,
        Region::EuCentral1,
        Region::ApSoutheast1,
        Region::ApNortheast1,
    ];

    /// Region code as used by the storage backend.
    pub fn as_str(&self) -> &'static str {
        match self {
            Region::UsEast1 => "us-east-1",
            Region::UsEast2 => "us-east-2",
            Region::UsWest1 => "us-west-1",
            Region::UsWest2 => "us-west-2",
            Region::EuWest1 => "eu-west-1",
            Region::EuCentral1 => "eu-central-1",
            Region::ApSoutheast1 => "ap-southeast-1",
            Region::ApNortheast1 => "ap-northeast-1",
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Region {
    type Err = TreeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Region::ALL
            .into_iter()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| TreeError::InvalidData(format!("unknown region: {:?}", s)))
    }
}

/// The two server objects that make up a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CloudFileExtension {
    /// Treesystem metadata (encrypted name, permissions, wrapped key, cloudID).
    Rcrd,
    /// Encrypted node content.
    Data,
}

impl CloudFileExtension {
    /// File extension without the dot.
    pub fn as_str(&self) -> &'static str {
        match self {
            CloudFileExtension::Rcrd => "rcrd",
            CloudFileExtension::Data => "data",
        }
    }
}

/// Location of a node's objects within a bucket.
///
/// Rendered as `{treeID}/{dirPrefix}/{cloudName}`; the object keys append
/// `.rcrd` or `.data`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CloudPath {
    /// Tree the object belongs to.
    pub tree_id: TreeId,
    /// dirPrefix of the parent node.
    pub dir_prefix: DirPrefix,
    /// Hashed name of the node.
    pub file_name: String,
}

impl CloudPath {
    /// Create a cloud path.
    pub fn new(tree_id: TreeId, dir_prefix: DirPrefix, file_name: impl Into<String>) -> Self {
        Self {
            tree_id,
            dir_prefix,
            file_name: file_name.into(),
        }
    }

    /// Object key of one of the node's server objects.
    pub fn object_key(&self, ext: CloudFileExtension) -> String {
        format!("{}.{}", self, ext.as_str())
    }
}

impl fmt::Display for CloudPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.tree_id, self.dir_prefix, self.file_name)
    }
}

impl FromStr for CloudPath {
    type Err = TreeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s
            .strip_suffix(".rcrd")
            .or_else(|| s.strip_suffix(".data"))
            .unwrap_or(s);
        let mut parts = trimmed.splitn(3, '/');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(tree), Some(prefix), Some(name)) if !tree.is_empty() && !name.is_empty() => {
                Ok(Self::new(TreeId::new(tree), DirPrefix::parse(prefix)?, name))
            }
            _ => Err(TreeError::InvalidData(format!("invalid cloud path: {:?}", s))),
        }
    }
}

/// Fully qualified location of a node's objects.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CloudLocator {
    /// Bucket region.
    pub region: Region,
    /// Bucket name.
    pub bucket: String,
    /// Path within the bucket.
    pub cloud_path: CloudPath,
}

impl CloudLocator {
    /// Create a locator.
    pub fn new(region: Region, bucket: impl Into<String>, cloud_path: CloudPath) -> Self {
        Self {
            region,
            bucket: bucket.into(),
            cloud_path,
        }
    }
}

impl fmt::Display for CloudLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}/{}", self.region, self.bucket, self.cloud_path)
    }
}

/// Why a shadow record exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CloudNodeState {
    /// The local node was removed; the server delete is not yet confirmed.
    PendingDelete,
    /// Only part of the node exists on the server.
    Orphan {
        /// A metadata (rcrd) object exists.
        has_rcrd: bool,
        /// A content (data) object exists.
        has_data: bool,
    },
}

/// Shadow record for server state with no materialized local node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloudNode {
    /// Local identifier of the record.
    pub id: CloudNodeId,
    /// Local user the record belongs to.
    pub local_user_id: UserId,
    /// Tree the record belongs to.
    pub tree_id: TreeId,
    /// Where the server objects live.
    pub locator: CloudLocator,
    /// Server identifier, when known.
    pub cloud_id: Option<CloudId>,
    /// dirPrefix of the server node (scopes its children), when known.
    pub dir_prefix: Option<DirPrefix>,
    /// Why the record exists.
    pub state: CloudNodeState,
}

impl CloudNode {
    /// Create a shadow record.
    pub fn new(
        local_user_id: UserId,
        tree_id: TreeId,
        locator: CloudLocator,
        state: CloudNodeState,
    ) -> Self {
        Self {
            id: CloudNodeId::new(),
            local_user_id,
            tree_id,
            locator,
            cloud_id: None,
            dir_prefix: None,
            state,
        }
    }

    /// Attach the server identifier.
    pub fn with_cloud_id(mut self, cloud_id: CloudId) -> Self {
        self.cloud_id = Some(cloud_id);
        self
    }

    /// Attach the dirPrefix scoping this record's children.
    pub fn with_dir_prefix(mut self, dir_prefix: DirPrefix) -> Self {
        self.dir_prefix = Some(dir_prefix);
        self
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

#[cfg(test)]
mod tests {
    use super::*;

    fn path() -> CloudPath {
        CloudPath::new(
            TreeId::new("com.example.todo"),
            DirPrefix::parse("00000000000000000000000000000000").unwrap(),
            "k3j2h4",
        )
    }

    #[test]
    fn cloud_path_display_and_object_keys() {
        let p = path();
        assert_eq!(
            p.to_string(),
            "com.example.todo/00000000000000000000000000000000/k3j2h4"
        );
        assert!(p.object_key(CloudFileExtension::Rcrd).ends_with("k3j2h4.rcrd"));
        assert!(p.object_key(CloudFileExtension::Data).ends_with("k3j2h4.data"));
    }

    #[test]
    fn cloud_path_parse() {
        let p = path();
        let parsed: CloudPath = p.object_key(CloudFileExtension::Rcrd).parse().unwrap();
        assert_eq!(parsed, p);
        assert!("only/two".parse::<CloudPath>().is_err());
    }

    #[test]
    fn region_from_str() {
        assert_eq!("us-west-2".parse::<Region>().unwrap(), Region::UsWest2);
        assert!("mars-north-1".parse::<Region>().is_err());
    }

    #[test]
    fn cloud_node_builders() {
        let locator = CloudLocator::new(Region::UsWest2, "bucket", path());
        let node = CloudNode::new(
            UserId::new("alice"),
            TreeId::new("com.example.todo"),
            locator,
            CloudNodeState::PendingDelete,
        )
        .with_cloud_id(CloudId::new("c1"));
        assert_eq!(node.cloud_id, Some(CloudId::new("c1")));
        assert!(node.dir_prefix.is_none());
    }
}
