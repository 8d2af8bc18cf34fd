//! # tree-content
//!
//! What the server is allowed to see of a node.
//!
//! Each node is stored as two objects: a metadata record (`.rcrd`) and a
//! content object (`.data`). This crate turns cleartext into those objects:
//!
//! ```text
//! name ──┐
//!        ├─ BLAKE3(dirPrefix || 0 || NFKC-lowercase name) → cloud name
//! parent dirPrefix ─┘
//!
//! node key ─ HKDF-SHA256 ─┬─ rcrd key ─ XChaCha20-Poly1305 → .rcrd object
//!                         └─ data key ─ XChaCha20-Poly1305 → CloudFile → .data object
//! ```
//!
//! [`CloudFile`] frames the content object behind a fixed 64-byte
//! [`CloudFileHeader`] so sizes and a thumbnail hash can be read without
//! downloading (or decrypting) the body.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod encrypt;
mod error;
mod header;
mod naming;

pub use encrypt::{
    decrypt, derive_object_key, encrypt, hash, verify_hash, HASH_SIZE, MAX_CONTENT_SIZE,
    NONCE_SIZE, OBJECT_KEY_SIZE, TAG_SIZE,
};
pub use error::ContentError;
pub use header::{
    thumbnail_hash, CloudDataInfo, CloudFile, CloudFileHeader, HEADER_MAGIC, HEADER_SIZE,
    HEADER_VERSION,
};
pub use naming::{cloud_name, cloud_path_for, CLOUD_NAME_BYTES};

use tree_types::{CloudFileExtension, EncryptionKey};

/// Seal a node's metadata record with its rcrd subkey.
pub fn seal_rcrd(node_key: &EncryptionKey, plaintext: &[u8]) -> Result<Vec<u8>, ContentError> {
    let key = derive_object_key(node_key, CloudFileExtension::Rcrd);
    encrypt(&key, plaintext)
}

/// Open a sealed metadata record.
pub fn open_rcrd(node_key: &EncryptionKey, sealed: &[u8]) -> Result<Vec<u8>, ContentError> {
    let key = derive_object_key(node_key, CloudFileExtension::Rcrd);
    decrypt(&key, sealed)
}

/// Encrypt the sections of a content object and frame them.
///
/// The header stays in the clear; each non-empty section is sealed with the
/// node's data subkey.
pub fn seal_data(
    node_key: &EncryptionKey,
    metadata: &[u8],
    thumbnail: &[u8],
    data: &[u8],
) -> Result<CloudFile, ContentError> {
    let key = derive_object_key(node_key, CloudFileExtension::Data);
    let seal = |section: &[u8]| -> Result<Vec<u8>, ContentError> {
        if section.is_empty() {
            Ok(Vec::new())
        } else {
            encrypt(&key, section)
        }
    };
    Ok(CloudFile::new(seal(metadata)?, seal(thumbnail)?, seal(data)?))
}

/// Decrypt the data section of a framed content object.
pub fn open_data(node_key: &EncryptionKey, object: &[u8]) -> Result<Vec<u8>, ContentError> {
    let file = CloudFile::decode(object)?;
    if file.data.is_empty() {
        return Ok(Vec::new());
    }
    let key = derive_object_key(node_key, CloudFileExtension::Data);
    decrypt(&key, &file.data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rcrd_roundtrip() {
        let key = EncryptionKey::random();
        let sealed = seal_rcrd(&key, b"{\"name\":\"Report.pdf\"}").unwrap();
        assert_eq!(open_rcrd(&key, &sealed).unwrap(), b"{\"name\":\"Report.pdf\"}");
    }

    #[test]
    fn data_object_roundtrip() {
        let key = EncryptionKey::random();
        let file = seal_data(&key, b"", b"", b"hello world").unwrap();
        assert_eq!(file.header.metadata_size, 0);
        assert_eq!(
            file.header.data_size,
            (NONCE_SIZE + b"hello world".len() + TAG_SIZE) as u64
        );
        assert_eq!(open_data(&key, &file.encode()).unwrap(), b"hello world");
    }

    #[test]
    fn rcrd_key_cannot_open_data() {
        let key = EncryptionKey::random();
        let file = seal_data(&key, b"", b"", b"hello").unwrap();
        assert!(matches!(
            open_rcrd(&key, &file.data),
            Err(ContentError::DecryptionFailed)
        ));
    }
}
