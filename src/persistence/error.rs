//! Error types for persistence operations.

use thiserror::Error;

/// Errors that can occur during persistence operations.
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// I/O error (file operations, disk I/O)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Format error (invalid magic bytes, version mismatch, truncation)
    #[error("format error: {0}")]
    Format(String),

    /// Serialization error (postcard, serde_json)
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Deserialization error
    #[error("deserialization error: {0}")]
    Deserialization(String),

    /// Checksum mismatch (data corruption detected)
    #[error("checksum mismatch: expected {expected:#010x}, got {actual:#010x}")]
    ChecksumMismatch { expected: u32, actual: u32 },

    /// Invalid state (e.g. writing through a read-only token directory)
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Resource not found (file, directory)
    #[error("resource not found: {0}")]
    NotFound(String),

    /// Invalid configuration passed to a storage backend
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Operation not supported by this backend
    #[error("not supported: {0}")]
    NotSupported(String),

    /// Failed to take a file lock
    #[error("lock failed on {resource}: {reason}")]
    LockFailed { resource: String, reason: String },

    /// Token store (LMDB) error
    #[error("token store error: {0}")]
    Lmdb(#[from] heed3::Error),
}

impl From<durability::PersistenceError> for PersistenceError {
    fn from(e: durability::PersistenceError) -> Self {
        match e {
            durability::PersistenceError::Io(e) => Self::Io(e),
            durability::PersistenceError::Format(s) => Self::Format(s),
            durability::PersistenceError::FormatDetail {
                message,
                expected,
                actual,
            } => {
                let mut s = message;
                if expected.is_some() || actual.is_some() {
                    s.push_str(&format!(" (expected={expected:?}, actual={actual:?})"));
                }
                Self::Format(s)
            }
            durability::PersistenceError::CrcMismatch { expected, actual } => {
                Self::ChecksumMismatch { expected, actual }
            }
            durability::PersistenceError::Encode(s) => Self::Serialization(s),
            durability::PersistenceError::Decode(s) => Self::Deserialization(s),
            durability::PersistenceError::InvalidState(s) => Self::InvalidState(s),
            durability::PersistenceError::InvalidConfig(s) => Self::InvalidConfig(s),
            durability::PersistenceError::NotSupported(s) => Self::NotSupported(s),
            durability::PersistenceError::LockFailed { resource, reason } => {
                Self::LockFailed { resource, reason }
            }
            durability::PersistenceError::NotFound(s) => Self::NotFound(s),
            durability::PersistenceError::MissingPath(p) => {
                Self::NotFound(p.to_string_lossy().to_string())
            }
        }
    }
}

impl From<postcard::Error> for PersistenceError {
    fn from(e: postcard::Error) -> Self {
        Self::Serialization(format!("postcard error: {}", e))
    }
}

impl From<serde_json::Error> for PersistenceError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(format!("json error: {}", e))
    }
}

/// Result type for persistence operations.
pub type PersistenceResult<T> = Result<T, PersistenceError>;
