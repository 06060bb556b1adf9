//! wordforest: nearest-neighbor lookup over word embeddings.
//!
//! Builds a forest of random-hyperplane partition trees over a collection of
//! `(token, vector)` pairs, persists it next to a token directory, and
//! answers "which tokens are closest to this one?" queries.
//!
//! - `store`: dense, id-addressed vector storage
//! - `tokens`: persisted token <-> id directory (LMDB)
//! - `forest`: partition tree construction and search
//! - `pipeline`: build and query an on-disk index
//! - `persistence`: artifact formats and segment directories
//! - `ingest`: embedding file readers
//!
//! # Critical Nuances
//!
//! ## Results are approximate
//!
//! Candidates come only from the leaves the forest visits. More trees, or a
//! larger `search_k`, trade query time for recall; a `search_k` at least the
//! collection size makes the search exact. Final ranking is always by exact
//! Euclidean distance, so returned distances are true distances.
//!
//! ## The query token is its own nearest neighbor
//!
//! Querying by token searches with that token's own vector, so it normally
//! comes back first at distance zero. Set
//! [`QueryOptions::exclude_self`](pipeline::QueryOptions) to drop it.
//!
//! ## Duplicate vectors
//!
//! Identical vectors cannot be separated by any hyperplane. Such groups end
//! up in oversized leaves (logged and counted in
//! [`ForestStats::forced_leaves`](forest::ForestStats)) rather than failing
//! the build.

pub mod config;
pub mod distance;
pub mod error;
pub mod forest;
pub mod ingest;
pub mod persistence;
pub mod pipeline;
pub mod store;
pub mod tokens;

pub use error::{Error, Result};
pub use forest::{Forest, ForestParams};
pub use ingest::{open_embeddings, IngestError};
pub use pipeline::{
    default_index_path, BuildOptions, BuildOutcome, BuildPipeline, BuildStats, Neighbor,
    QueryOptions, WordIndex,
};
pub use store::VectorStore;
pub use tokens::TokenDirectory;
