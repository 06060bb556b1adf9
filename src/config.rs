//! Configuration constants for wordforest.
//!
//! Tuning defaults and on-disk names live here. Runtime configuration goes
//! through [`ForestParams`](crate::forest::ForestParams),
//! [`BuildOptions`](crate::pipeline::BuildOptions) and the CLI flags of the
//! `wordforest` binary.

/// Default number of trees in the forest.
///
/// More trees raise recall and memory use roughly linearly. The original
/// word-vector tooling this crate replaces defaulted to 30.
pub const DEFAULT_NUM_TREES: usize = 30;

/// Smallest leaf capacity chosen when the capacity is derived from the
/// collection size.
pub const MIN_LEAF_CAPACITY: usize = 16;

/// Depth the derived leaf capacity aims for: `ceil(N / 2^TARGET_DEPTH)`.
pub const DEFAULT_TARGET_DEPTH: u32 = 16;

/// Hard bound on tree depth. Nodes at this depth become leaves.
pub const DEFAULT_MAX_DEPTH: usize = 64;

/// Pivot pairs tried per node before a degenerate split is forced to a leaf.
pub const DEFAULT_SPLIT_RETRIES: usize = 3;

/// Base seed for tree construction.
pub const DEFAULT_SEED: u64 = 0x5eed_f0e5_7000_0001;

/// Largest vector dimension an embeddings header may announce.
pub const MAX_DIMENSION: usize = 65_536;

/// Ingestion progress is logged every this many items when verbose.
pub const PROGRESS_EVERY: usize = 1000;

/// Default number of results for the `query` command.
pub const DEFAULT_NUM_RESULTS: usize = 10;

/// Suffix appended to an embeddings path to name its index directory.
pub const INDEX_SUFFIX: &str = "index";

/// Suffix of the private directory a build writes into before publishing.
pub const STAGING_SUFFIX: &str = "staging";

/// Suffix a replaced index is moved to during a forced rebuild.
pub const RETIRED_SUFFIX: &str = "retired";

/// Index manifest file name.
pub const MANIFEST_FILE: &str = "manifest.json";

/// Vector store segment file name.
pub const VECTORS_FILE: &str = "vectors.bin";

/// Forest segment file name.
pub const FOREST_FILE: &str = "forest.bin";

/// Token directory LMDB environment (a subdirectory of the index).
pub const TOKENS_DIR: &str = "tokens";

/// Upper bound on the token directory's memory map. LMDB reserves address
/// space, not disk.
pub const TOKENS_MAP_SIZE: usize = 16 << 30;

/// Longest token the directory accepts (LMDB's default key size limit).
pub const MAX_TOKEN_BYTES: usize = 511;
