//! End-to-end build and query pipelines.
//!
//! An index directory holds:
//!
//! ```text
//! <index>/
//!   manifest.json   written last; its presence marks the index complete
//!   vectors.bin     dense vectors, id order
//!   forest.bin      partition trees
//!   tokens/         token <-> id directory (LMDB environment)
//! ```
//!
//! [`BuildPipeline`] produces it, [`WordIndex`] opens it for queries.

mod build;
mod query;

pub use build::{default_index_path, BuildOptions, BuildOutcome, BuildPipeline, BuildStats};
pub use query::{Neighbor, QueryOptions, WordIndex};
