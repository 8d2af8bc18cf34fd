//! Binary framing of content (data) objects.
//!
//! ```text
//! offset  size  field
//!      0     8  magic ("0KTREE01", big-endian u64)
//!      8     8  metadata size
//!     16     8  thumbnail size
//!     24     8  data size
//!     32     8  thumbnail hash (first 8 bytes of BLAKE3)
//!     40     1  version
//!     41    23  reserved (zero)
//!     64     -  metadata || thumbnail || data
//! ```
//!
//! The thumbnail hash lets a client notice a changed thumbnail from the
//! header alone, without downloading the object.

use serde::{Deserialize, Serialize};

use crate::error::ContentError;

/// Size of the fixed header in bytes.
pub const HEADER_SIZE: usize = 64;

/// Header magic.
pub const HEADER_MAGIC: u64 = u64::from_be_bytes(*b"0KTREE01");

/// Header format version written by this crate.
pub const HEADER_VERSION: u8 = 1;

/// Hash of a thumbnail as stored in the header.
pub fn thumbnail_hash(thumbnail: &[u8]) -> u64 {
    let digest = blake3::hash(thumbnail);
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest.as_bytes()[..8]);
    u64::from_be_bytes(prefix)
}

/// The fixed-size header of a content object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloudFileHeader {
    /// Size of the metadata section.
    pub metadata_size: u64,
    /// Size of the thumbnail section.
    pub thumbnail_size: u64,
    /// Size of the data section.
    pub data_size: u64,
    /// [`thumbnail_hash`] of the thumbnail section (0 when empty).
    pub thumbnail_hash: u64,
    /// Format version.
    pub version: u8,
}

impl CloudFileHeader {
    /// Encode to the fixed 64-byte layout.
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut out = [0u8; HEADER_SIZE];
        out[0..8].copy_from_slice(&HEADER_MAGIC.to_be_bytes());
        out[8..16].copy_from_slice(&self.metadata_size.to_be_bytes());
        out[16..24].copy_from_slice(&self.thumbnail_size.to_be_bytes());
        out[24..32].copy_from_slice(&self.data_size.to_be_bytes());
        out[32..40].copy_from_slice(&self.thumbnail_hash.to_be_bytes());
        out[40] = self.version;
        out
    }

    /// Decode from the first 64 bytes of `bytes`.
    pub fn decode(bytes: &[u8]) -> Result<Self, ContentError> {
        if bytes.len() < HEADER_SIZE {
            return Err(ContentError::Truncated {
                expected: HEADER_SIZE as u64,
                actual: bytes.len() as u64,
            });
        }

        let read_u64 = |offset: usize| {
            let mut buf = [0u8; 8];
            buf.copy_from_slice(&bytes[offset..offset + 8]);
            u64::from_be_bytes(buf)
        };

        let magic = read_u64(0);
        if magic != HEADER_MAGIC {
            return Err(ContentError::InvalidHeader(format!("bad magic {:#018x}", magic)));
        }
        let version = bytes[40];
        if version != HEADER_VERSION {
            return Err(ContentError::InvalidHeader(format!(
                "unsupported version {}",
                version
            )));
        }

        Ok(Self {
            metadata_size: read_u64(8),
            thumbnail_size: read_u64(16),
            data_size: read_u64(24),
            thumbnail_hash: read_u64(32),
            version,
        })
    }

    /// Total object size described by this header.
    pub fn object_size(&self) -> Option<u64> {
        (HEADER_SIZE as u64)
            .checked_add(self.metadata_size)?
            .checked_add(self.thumbnail_size)?
            .checked_add(self.data_size)
    }
}

/// A content object split into its sections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloudFile {
    /// Parsed header.
    pub header: CloudFileHeader,
    /// Metadata section.
    pub metadata: Vec<u8>,
    /// Thumbnail section.
    pub thumbnail: Vec<u8>,
    /// Data section.
    pub data: Vec<u8>,
}

impl CloudFile {
    /// Build a content object, computing its header.
    pub fn new(metadata: Vec<u8>, thumbnail: Vec<u8>, data: Vec<u8>) -> Self {
        let header = CloudFileHeader {
            metadata_size: metadata.len() as u64,
            thumbnail_size: thumbnail.len() as u64,
            data_size: data.len() as u64,
            thumbnail_hash: if thumbnail.is_empty() {
                0
            } else {
                thumbnail_hash(&thumbnail)
            },
            version: HEADER_VERSION,
        };
        Self {
            header,
            metadata,
            thumbnail,
            data,
        }
    }

    /// Serialize header and sections.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(
            HEADER_SIZE + self.metadata.len() + self.thumbnail.len() + self.data.len(),
        );
        out.extend_from_slice(&self.header.encode());
        out.extend_from_slice(&self.metadata);
        out.extend_from_slice(&self.thumbnail);
        out.extend_from_slice(&self.data);
        out
    }

    /// Parse a content object, checking section sizes and the thumbnail hash.
    pub fn decode(bytes: &[u8]) -> Result<Self, ContentError> {
        let header = CloudFileHeader::decode(bytes)?;
        let expected = header
            .object_size()
            .ok_or_else(|| ContentError::InvalidHeader("section sizes overflow".into()))?;
        if (bytes.len() as u64) < expected {
            return Err(ContentError::Truncated {
                expected,
                actual: bytes.len() as u64,
            });
        }

        // Sizes fit in the buffer, so they fit in usize.
        let meta_end = HEADER_SIZE + header.metadata_size as usize;
        let thumb_end = meta_end + header.thumbnail_size as usize;
        let data_end = thumb_end + header.data_size as usize;

        let thumbnail = bytes[meta_end..thumb_end].to_vec();
        if !thumbnail.is_empty() && thumbnail_hash(&thumbnail) != header.thumbnail_hash {
            return Err(ContentError::HashMismatch {
                expected: format!("{:016x}", header.thumbnail_hash),
                actual: format!("{:016x}", thumbnail_hash(&thumbnail)),
            });
        }

        Ok(Self {
            header,
            metadata: bytes[HEADER_SIZE..meta_end].to_vec(),
            thumbnail,
            data: bytes[thumb_end..data_end].to_vec(),
        })
    }
}

/// What a client knows about a content object without downloading it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloudDataInfo {
    /// Header read from the object's first bytes.
    pub header: CloudFileHeader,
    /// Server entity tag of the object.
    pub etag: String,
    /// Unix seconds of the server-side modification.
    pub last_modified: u64,
}

impl CloudDataInfo {
    /// Build from the leading bytes of an object plus server attributes.
    pub fn from_prefix(
        prefix: &[u8],
        etag: impl Into<String>,
        last_modified: u64,
    ) -> Result<Self, ContentError> {
        Ok(Self {
            header: CloudFileHeader::decode(prefix)?,
            etag: etag.into(),
            last_modified,
        })
    }

    /// Whether the thumbnail differs from one with the given header hash.
    pub fn thumbnail_changed(&self, known_hash: u64) -> bool {
        self.header.thumbnail_hash != known_hash
    }
}
