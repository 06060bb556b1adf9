//! Error types for wordforest.

use crate::ingest::IngestError;
use crate::persistence::PersistenceError;
use thiserror::Error;

/// Errors that can occur while building or querying an index.
#[derive(Debug, Error)]
pub enum Error {
    /// Vector length disagrees with the dimension fixed by the first vector.
    #[error("dimension mismatch: expected {expected} dimensions, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// A token was inserted into the directory twice.
    #[error("duplicate token: {0:?}")]
    DuplicateToken(String),

    /// An id was inserted into the directory twice.
    #[error("duplicate id: {0}")]
    DuplicateId(u32),

    /// Token or id absent from the index.
    #[error("not found: {0}")]
    NotFound(String),

    /// The embedding source failed; the build is aborted.
    #[error("ingestion failed: {0}")]
    Ingestion(#[from] IngestError),

    /// Empty index (nothing ingested, or nothing built).
    #[error("index is empty")]
    EmptyIndex,

    /// Invalid parameter value.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// Persisted artifacts could not be read or written.
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

impl Error {
    pub(crate) fn token_not_found(token: &str) -> Self {
        Self::NotFound(format!("token {token:?}"))
    }

    pub(crate) fn id_not_found(id: u32) -> Self {
        Self::NotFound(format!("id {id}"))
    }

    /// True for errors a query caller can recover from (absent keys).
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::Persistence(PersistenceError::Io(e))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
