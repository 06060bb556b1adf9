//! Disk persistence for wordforest indexes.
//!
//! An index is a directory of four artifacts (see [`format`] for the
//! layout). Segment files are written through the [`directory::Directory`]
//! abstraction with atomic replace semantics, and carry a CRC32 so
//! corruption is caught on load rather than at query time. The token
//! directory is an LMDB environment of its own (see [`crate::tokens`]).
//!
//! - [`segment`]: vector store and forest readers/writers
//! - [`format`]: framing, magic bytes, manifest

pub mod directory;
pub mod error;
pub mod format;
pub mod segment;

pub use directory::{Directory, FsDirectory, MemoryDirectory};
pub use error::{PersistenceError, PersistenceResult};
pub use format::IndexManifest;
pub use segment::{SegmentReader, SegmentWriter};
