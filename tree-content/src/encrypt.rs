//! Object encryption.
//!
//! Every node has its own file key. The metadata (rcrd) and content (data)
//! objects are sealed with separate subkeys derived from it, so the two
//! objects never share a key/nonce space.
//!
//! Sealed layout: `nonce (24) || XChaCha20-Poly1305 ciphertext`.

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    XChaCha20Poly1305, XNonce,
};
use hkdf::Hkdf;
use sha2::Sha256;
use tree_types::{CloudFileExtension, EncryptionKey};
use zeroize::Zeroizing;

use crate::error::ContentError;

/// Size of an object encryption key in bytes (256 bits).
pub const OBJECT_KEY_SIZE: usize = 32;

/// Size of XChaCha20-Poly1305 nonce in bytes (192 bits).
pub const NONCE_SIZE: usize = 24;

/// Size of the Poly1305 authentication tag in bytes.
pub const TAG_SIZE: usize = 16;

/// Size of BLAKE3 hash output in bytes (256 bits).
pub const HASH_SIZE: usize = 32;

/// Maximum plaintext size for a single object (100 MB).
pub const MAX_CONTENT_SIZE: usize = 100 * 1024 * 1024;

/// Derive the key sealing one of a node's server objects.
///
/// HKDF-SHA256 with salt `"0k-tree-object-v1"` and info
/// `"{extension}-encryption"`.
pub fn derive_object_key(
    node_key: &EncryptionKey,
    ext: CloudFileExtension,
) -> Zeroizing<[u8; OBJECT_KEY_SIZE]> {
    let hkdf = Hkdf::<Sha256>::new(Some(b"0k-tree-object-v1"), node_key.as_bytes());

    let info = format!("{}-encryption", ext.as_str());
    let mut key = Zeroizing::new([0u8; OBJECT_KEY_SIZE]);
    hkdf.expand(info.as_bytes(), &mut *key)
        .expect("HKDF expand should not fail with valid lengths");
    key
}

/// Encrypt `plaintext`, returning `nonce || ciphertext`.
pub fn encrypt(key: &[u8; OBJECT_KEY_SIZE], plaintext: &[u8]) -> Result<Vec<u8>, ContentError> {
    if plaintext.len() > MAX_CONTENT_SIZE {
        return Err(ContentError::EncryptionFailed(format!(
            "content too large: {} bytes (max {})",
            plaintext.len(),
            MAX_CONTENT_SIZE
        )));
    }

    let mut nonce = [0u8; NONCE_SIZE];
    getrandom::getrandom(&mut nonce).map_err(|e| ContentError::EncryptionFailed(e.to_string()))?;

    let cipher = XChaCha20Poly1305::new_from_slice(key)
        .map_err(|e| ContentError::EncryptionFailed(e.to_string()))?;
    let ciphertext = cipher
        .encrypt(XNonce::from_slice(&nonce), plaintext)
        .map_err(|e| ContentError::EncryptionFailed(e.to_string()))?;

    let mut sealed = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    sealed.extend_from_slice(&nonce);
    sealed.extend_from_slice(&ciphertext);
    Ok(sealed)
}

/// Decrypt the output of [`encrypt`].
pub fn decrypt(key: &[u8; OBJECT_KEY_SIZE], sealed: &[u8]) -> Result<Vec<u8>, ContentError> {
    if sealed.len() < NONCE_SIZE + TAG_SIZE {
        return Err(ContentError::DecryptionFailed);
    }
    let (nonce, ciphertext) = sealed.split_at(NONCE_SIZE);
    let cipher =
        XChaCha20Poly1305::new_from_slice(key).map_err(|_| ContentError::DecryptionFailed)?;
    cipher
        .decrypt(XNonce::from_slice(nonce), ciphertext)
        .map_err(|_| ContentError::DecryptionFailed)
}

/// BLAKE3 hash of `bytes`.
pub fn hash(bytes: &[u8]) -> [u8; HASH_SIZE] {
    *blake3::hash(bytes).as_bytes()
}

/// Check that `bytes` hash to `expected`.
pub fn verify_hash(bytes: &[u8], expected: &[u8; HASH_SIZE]) -> Result<(), ContentError> {
    let actual = hash(bytes);
    if &actual != expected {
        return Err(ContentError::HashMismatch {
            expected: hex::encode(expected),
            actual: hex::encode(actual),
        });
    }
    Ok(())
}
