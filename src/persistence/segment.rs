//! Vector store and forest segment persistence.
//!
//! - `vectors.bin`: dimension (u32 LE), count (u64 LE), then `count * dimension`
//!   f32 values (LE), row-major.
//! - `forest.bin`: postcard encoding of the whole [`Forest`], so hyperplane
//!   coefficients, arena indices, and seeds reload bit-for-bit.
//!
//! Both are wrapped in the checksummed frame from [`format`](super::format).

use crate::error::{Error, Result};
use crate::forest::Forest;
use crate::persistence::directory::Directory;
use crate::persistence::error::{PersistenceError, PersistenceResult};
use crate::persistence::format::{
    decode_framed, encode_framed, IndexManifest, FOREST_MAGIC, VECTORS_MAGIC,
};
use crate::store::VectorStore;
use std::sync::Arc;

/// Writes index artifacts into a directory.
pub struct SegmentWriter {
    directory: Arc<dyn Directory>,
}

impl SegmentWriter {
    pub fn new(directory: Arc<dyn Directory>) -> Self {
        Self { directory }
    }

    pub fn write_vectors(&self, name: &str, store: &VectorStore) -> PersistenceResult<()> {
        let flat = store.as_flat();
        let mut payload = Vec::with_capacity(12 + flat.len() * 4);
        payload.extend_from_slice(&(store.dimension() as u32).to_le_bytes());
        payload.extend_from_slice(&(store.len() as u64).to_le_bytes());
        for &x in flat {
            payload.extend_from_slice(&x.to_le_bytes());
        }
        self.directory
            .atomic_write(name, &encode_framed(VECTORS_MAGIC, &payload))?;
        tracing::debug!(file = name, count = store.len(), "wrote vector segment");
        Ok(())
    }

    pub fn write_forest(&self, name: &str, forest: &Forest) -> PersistenceResult<()> {
        let payload = postcard::to_stdvec(forest)?;
        self.directory
            .atomic_write(name, &encode_framed(FOREST_MAGIC, &payload))?;
        tracing::debug!(
            file = name,
            num_trees = forest.num_trees(),
            bytes = payload.len(),
            "wrote forest segment"
        );
        Ok(())
    }

    pub fn write_manifest(&self, name: &str, manifest: &IndexManifest) -> PersistenceResult<()> {
        self.directory.atomic_write(name, &manifest.to_json()?)
    }
}

/// Reads index artifacts from a directory.
pub struct SegmentReader {
    directory: Arc<dyn Directory>,
}

impl SegmentReader {
    pub fn new(directory: Arc<dyn Directory>) -> Self {
        Self { directory }
    }

    pub fn read_vectors(&self, name: &str) -> Result<VectorStore> {
        let raw = self.directory.read(name)?;
        let payload = decode_framed(VECTORS_MAGIC, &raw)?;
        if payload.len() < 12 {
            return Err(truncated(name).into());
        }

        let mut dim_bytes = [0u8; 4];
        dim_bytes.copy_from_slice(&payload[..4]);
        let mut count_bytes = [0u8; 8];
        count_bytes.copy_from_slice(&payload[4..12]);
        let dimension = u32::from_le_bytes(dim_bytes) as usize;
        let count = u64::from_le_bytes(count_bytes) as usize;

        let data = &payload[12..];
        let expected = count
            .checked_mul(dimension)
            .and_then(|n| n.checked_mul(4))
            .ok_or_else(|| truncated(name))?;
        if data.len() != expected {
            return Err(truncated(name).into());
        }

        let vectors: Vec<f32> = data
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        VectorStore::from_raw(dimension, vectors)
    }

    pub fn read_forest(&self, name: &str) -> Result<Forest> {
        let raw = self.directory.read(name)?;
        let payload = decode_framed(FOREST_MAGIC, &raw)?;
        let forest: Forest = postcard::from_bytes(payload)
            .map_err(|e| PersistenceError::Deserialization(format!("{name}: {e}")))?;
        forest.validate()?;
        Ok(forest)
    }

    pub fn read_manifest(&self, name: &str) -> Result<IndexManifest> {
        let raw = self.directory.read(name)?;
        Ok(IndexManifest::from_json(&raw)?)
    }
}

fn truncated(name: &str) -> PersistenceError {
    PersistenceError::Format(format!("{name}: payload length does not match header"))
}
