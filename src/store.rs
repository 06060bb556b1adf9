//! Flat vector storage addressed by dense ids.

use crate::error::{Error, Result};

/// Immutable-after-build array of fixed-length vectors.
///
/// Vectors are stored row-major in one buffer; id `i` occupies
/// `vectors[i * dimension..(i + 1) * dimension]`. The dimension is fixed by
/// the first append unless set up front with [`VectorStore::with_dimension`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VectorStore {
    pub(crate) vectors: Vec<f32>,
    pub(crate) dimension: usize,
    pub(crate) num_vectors: usize,
}

impl VectorStore {
    /// Create an empty store whose dimension is set by the first append.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty store with a fixed dimension.
    pub fn with_dimension(dimension: usize) -> Result<Self> {
        if dimension == 0 {
            return Err(Error::InvalidParameter(
                "dimension must be greater than 0".to_string(),
            ));
        }
        Ok(Self {
            vectors: Vec::new(),
            dimension,
            num_vectors: 0,
        })
    }

    /// Rebuild a store from its flat buffer (used when loading from disk).
    pub(crate) fn from_raw(dimension: usize, vectors: Vec<f32>) -> Result<Self> {
        if dimension == 0 {
            return Err(Error::InvalidParameter(
                "dimension must be greater than 0".to_string(),
            ));
        }
        if vectors.len() % dimension != 0 {
            return Err(Error::InvalidParameter(format!(
                "buffer of {} floats is not a multiple of dimension {dimension}",
                vectors.len()
            )));
        }
        let num_vectors = vectors.len() / dimension;
        Ok(Self {
            vectors,
            dimension,
            num_vectors,
        })
    }

    /// Append a vector, returning its id.
    ///
    /// A failed append leaves the store unchanged.
    pub fn append(&mut self, vector: &[f32]) -> Result<u32> {
        if vector.is_empty() {
            return Err(Error::InvalidParameter("empty vector".to_string()));
        }
        if self.dimension == 0 {
            self.dimension = vector.len();
        } else if vector.len() != self.dimension {
            return Err(Error::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        let id = u32::try_from(self.num_vectors).map_err(|_| {
            Error::InvalidParameter("vector store is full (u32 id space exhausted)".to_string())
        })?;
        self.vectors.extend_from_slice(vector);
        self.num_vectors += 1;
        Ok(id)
    }

    /// Get the vector stored under `id`.
    pub fn get(&self, id: u32) -> Result<&[f32]> {
        let idx = id as usize;
        if idx >= self.num_vectors {
            return Err(Error::id_not_found(id));
        }
        Ok(self.vector(idx))
    }

    /// Unchecked row access for ids known to be in range.
    #[inline]
    pub(crate) fn vector(&self, idx: usize) -> &[f32] {
        let start = idx * self.dimension;
        &self.vectors[start..start + self.dimension]
    }

    /// Number of stored vectors.
    pub fn len(&self) -> usize {
        self.num_vectors
    }

    pub fn is_empty(&self) -> bool {
        self.num_vectors == 0
    }

    /// Vector dimension (0 until the first append).
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// The flat row-major buffer.
    pub fn as_flat(&self) -> &[f32] {
        &self.vectors
    }
}
