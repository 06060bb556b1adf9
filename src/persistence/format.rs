//! On-disk format of a wordforest index.
//!
//! # Directory Layout
//!
//! ```text
//! glove.6B.50d.txt.index/
//! ├── manifest.json    # format version, dimension, counts, build parameters
//! ├── vectors.bin      # flat f32 vector store
//! ├── forest.bin       # node arenas of every tree
//! └── tokens/          # token directory, LMDB environment (forward and reverse databases)
//! ```
//!
//! # Framed Files
//!
//! Every binary artifact shares one frame:
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │ Magic bytes (4B): artifact kind         │
//! │ Format version (4B, LE)                 │
//! ├─────────────────────────────────────────┤
//! │ Payload (variable)                      │
//! ├─────────────────────────────────────────┤
//! │ CRC32 of magic + version + payload (4B) │
//! └─────────────────────────────────────────┘
//! ```
//!
//! The manifest is written last and is what marks an index as complete.

use crate::persistence::error::{PersistenceError, PersistenceResult};
use serde::{Deserialize, Serialize};

/// Magic bytes for the vector store segment.
pub const VECTORS_MAGIC: [u8; 4] = *b"WFVS";

/// Magic bytes for the forest segment.
pub const FOREST_MAGIC: [u8; 4] = *b"WFTR";

/// Current format version.
pub const FORMAT_VERSION: u32 = 1;

const HEADER_LEN: usize = 8;
const FOOTER_LEN: usize = 4;

/// Wrap `payload` in a checksummed frame.
pub fn encode_framed(magic: [u8; 4], payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(HEADER_LEN + payload.len() + FOOTER_LEN);
    out.extend_from_slice(&magic);
    out.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    out.extend_from_slice(payload);
    let crc = crc32fast::hash(&out);
    out.extend_from_slice(&crc.to_le_bytes());
    out
}

/// Verify a frame and return its payload.
pub fn decode_framed(magic: [u8; 4], bytes: &[u8]) -> PersistenceResult<&[u8]> {
    if bytes.len() < HEADER_LEN + FOOTER_LEN {
        return Err(PersistenceError::Format(format!(
            "file too short ({} bytes)",
            bytes.len()
        )));
    }
    if bytes[..4] != magic {
        return Err(PersistenceError::Format(format!(
            "bad magic: expected {:?}, found {:?}",
            String::from_utf8_lossy(&magic),
            String::from_utf8_lossy(&bytes[..4])
        )));
    }

    let body_end = bytes.len() - FOOTER_LEN;
    let mut crc_bytes = [0u8; 4];
    crc_bytes.copy_from_slice(&bytes[body_end..]);
    let expected = u32::from_le_bytes(crc_bytes);
    let actual = crc32fast::hash(&bytes[..body_end]);
    if expected != actual {
        return Err(PersistenceError::ChecksumMismatch { expected, actual });
    }

    let mut version_bytes = [0u8; 4];
    version_bytes.copy_from_slice(&bytes[4..HEADER_LEN]);
    let version = u32::from_le_bytes(version_bytes);
    if version != FORMAT_VERSION {
        return Err(PersistenceError::Format(format!(
            "unsupported format version {version} (expected {FORMAT_VERSION})"
        )));
    }

    Ok(&bytes[HEADER_LEN..body_end])
}

/// Manifest for an index directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexManifest {
    /// Format version
    pub version: u32,
    /// Vector dimension
    pub dimension: u32,
    /// Number of indexed vectors (and tokens)
    pub count: u64,
    /// Number of trees in the forest
    pub num_trees: u32,
    /// Leaf capacity the forest was built with
    pub leaf_capacity: u32,
    /// Base seed of the forest
    pub seed: u64,
    /// Creation timestamp (Unix seconds)
    pub created_at: u64,
}

impl IndexManifest {
    pub fn to_json(&self) -> PersistenceResult<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    pub fn from_json(bytes: &[u8]) -> PersistenceResult<Self> {
        let manifest: Self = serde_json::from_slice(bytes)
            .map_err(|e| PersistenceError::Deserialization(format!("manifest: {e}")))?;
        if manifest.version != FORMAT_VERSION {
            return Err(PersistenceError::Format(format!(
                "unsupported manifest version {} (expected {FORMAT_VERSION})",
                manifest.version
            )));
        }
        Ok(manifest)
    }
}
