//! Metadata record (rcrd) documents.
//!
//! The server can read the envelope (version, cloudID, dirPrefix) but the
//! node's name and timestamps are sealed with the node key.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use tree_types::{CloudId, DirPrefix, EncryptionKey, Node, NodeId};

use crate::error::{PushError, PushResult};

/// Current rcrd document version.
pub const RCRD_VERSION: u8 = 1;

/// Cleartext fields sealed inside an rcrd.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordPayload {
    /// Node name.
    pub name: String,
    /// Unix seconds of the last local change.
    pub last_modified: u64,
    /// Pointer target, for pointer nodes.
    pub pointee_id: Option<NodeId>,
}

/// The rcrd object as stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordDocument {
    /// Document version.
    pub version: u8,
    /// Server identifier, absent on the first upload.
    pub cloud_id: Option<CloudId>,
    /// dirPrefix scoping the node's children.
    pub dir_prefix: DirPrefix,
    /// Base64 of the sealed [`RecordPayload`].
    pub sealed: String,
}

impl RecordDocument {
    /// Build and seal the document of `node`.
    pub fn for_node(node: &Node) -> PushResult<Self> {
        let payload = RecordPayload {
            name: node.name.clone(),
            last_modified: node.last_modified,
            pointee_id: node.pointee_id,
        };
        let plaintext =
            serde_json::to_vec(&payload).map_err(|e| PushError::Serialization(e.to_string()))?;
        let sealed = tree_content::seal_rcrd(&node.encryption_key, &plaintext)?;
        Ok(Self {
            version: RCRD_VERSION,
            cloud_id: node.cloud_id().cloned(),
            dir_prefix: node.dir_prefix.clone(),
            sealed: STANDARD.encode(sealed),
        })
    }

    /// Serialize for upload.
    pub fn to_bytes(&self) -> PushResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| PushError::Serialization(e.to_string()))
    }

    /// Parse an uploaded document.
    pub fn from_bytes(bytes: &[u8]) -> PushResult<Self> {
        serde_json::from_slice(bytes).map_err(|e| PushError::Serialization(e.to_string()))
    }

    /// Unseal the payload with the node key.
    pub fn open(&self, key: &EncryptionKey) -> PushResult<RecordPayload> {
        let sealed = STANDARD
            .decode(&self.sealed)
            .map_err(|e| PushError::Serialization(e.to_string()))?;
        let plaintext = tree_content::open_rcrd(key, &sealed)?;
        serde_json::from_slice(&plaintext).map_err(|e| PushError::Serialization(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tree_types::{TreeId, UserId};

    fn node(name: &str) -> Node {
        Node::new(NodeId::new(), name, UserId::new("alice"), TreeId::new("main"))
    }

    #[test]
    fn name_is_not_visible_in_document() {
        let node = node("Quarterly Report.pdf");
        let bytes = RecordDocument::for_node(&node).unwrap().to_bytes().unwrap();
        let text = String::from_utf8_lossy(&bytes);
        assert!(!text.contains("Quarterly"));
        assert!(text.contains(node.dir_prefix.as_str()));
    }

    #[test]
    fn owner_of_key_can_open() {
        let node = node("notes.txt");
        let bytes = RecordDocument::for_node(&node).unwrap().to_bytes().unwrap();
        let payload = RecordDocument::from_bytes(&bytes)
            .unwrap()
            .open(&node.encryption_key)
            .unwrap();
        assert_eq!(payload.name, "notes.txt");
        assert_eq!(payload.last_modified, node.last_modified);
    }

    #[test]
    fn wrong_key_fails() {
        let node = node("notes.txt");
        let document = RecordDocument::for_node(&node).unwrap();
        let result = document.open(&EncryptionKey::random());
        assert!(matches!(result, Err(PushError::Content(_))));
    }

    #[test]
    fn cloud_id_is_carried_once_assigned() {
        let mut node = node("notes.txt");
        assert_eq!(RecordDocument::for_node(&node).unwrap().cloud_id, None);
        node.set_cloud_id(CloudId::new("cid-1")).unwrap();
        assert_eq!(
            RecordDocument::for_node(&node).unwrap().cloud_id,
            Some(CloudId::new("cid-1"))
        );
    }
}
