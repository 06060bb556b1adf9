//! Random projection forest (Annoy-style) approximate nearest neighbor index.
//!
//! # Algorithm
//!
//! Each tree recursively splits the id set with a hyperplane equidistant
//! from two randomly chosen pivot vectors, until a subset fits in a leaf.
//! A single tree is a cheap, rough Voronoi-like partition; `T` trees with
//! independent seeds partition differently, so a neighbor that one tree
//! separates from the query is likely to share a leaf with it in another.
//!
//! - **Construction**: trees are built in parallel, one rayon task per tree,
//!   and collected in tree order.
//! - **Search**: greedy descent in every tree, then a priority search over
//!   the untaken siblings closest to their hyperplanes until `search_k`
//!   candidates are pooled, then exact re-ranking.
//!
//! # Usage
//!
//! ```rust
//! use wordforest::forest::{Forest, ForestParams};
//! use wordforest::store::VectorStore;
//!
//! # fn main() -> wordforest::Result<()> {
//! let mut store = VectorStore::new();
//! store.append(&[0.0, 1.0])?;
//! store.append(&[0.0, 0.9])?;
//! store.append(&[5.0, 5.0])?;
//!
//! let forest = Forest::build(&store, &ForestParams::with_trees(4))?;
//! let hits = forest.search(&store, &[0.0, 1.0], 2, None)?;
//! assert_eq!(hits[0].0, 0);
//! # Ok(())
//! # }
//! ```
//!
//! # References
//!
//! - Bernhardsson (2015): Annoy, "Approximate Nearest Neighbors Oh Yeah"
//! - Dasgupta & Freund (2008): "Random projection trees and low dimensional
//!   manifolds"

mod construction;
mod search;
pub mod tree;

pub use tree::{Node, PartitionTree};

use crate::config;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Forest construction parameters.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ForestParams {
    /// Number of trees.
    pub num_trees: usize,

    /// Maximum ids per leaf. `None` derives it from the collection size,
    /// see [`ForestParams::leaf_capacity_for`].
    pub leaf_capacity: Option<usize>,

    /// Depth the derived leaf capacity aims for.
    pub target_depth: u32,

    /// Nodes at this depth become leaves regardless of size.
    pub max_depth: usize,

    /// Extra pivot pairs tried when a split leaves one side empty.
    pub split_retries: usize,

    /// Base seed; tree `t` uses a seed mixed from this and `t`.
    pub seed: u64,

    /// Worker threads for construction. `None` uses the global rayon pool.
    pub num_threads: Option<usize>,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            num_trees: config::DEFAULT_NUM_TREES,
            leaf_capacity: None,
            target_depth: config::DEFAULT_TARGET_DEPTH,
            max_depth: config::DEFAULT_MAX_DEPTH,
            split_retries: config::DEFAULT_SPLIT_RETRIES,
            seed: config::DEFAULT_SEED,
            num_threads: None,
        }
    }
}

impl ForestParams {
    /// Defaults with a given tree count.
    pub fn with_trees(num_trees: usize) -> Self {
        Self {
            num_trees,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.num_trees == 0 {
            return Err(Error::InvalidParameter(
                "num_trees must be at least 1".to_string(),
            ));
        }
        if self.leaf_capacity == Some(0) {
            return Err(Error::InvalidParameter(
                "leaf_capacity must be at least 1".to_string(),
            ));
        }
        if self.max_depth == 0 {
            return Err(Error::InvalidParameter(
                "max_depth must be at least 1".to_string(),
            ));
        }
        if self.num_threads == Some(0) {
            return Err(Error::InvalidParameter(
                "num_threads must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Leaf capacity used for a collection of `n` vectors.
    ///
    /// Explicit capacities win; otherwise `ceil(n / 2^target_depth)`, never
    /// below [`config::MIN_LEAF_CAPACITY`].
    pub fn leaf_capacity_for(&self, n: usize) -> usize {
        if let Some(capacity) = self.leaf_capacity {
            return capacity;
        }
        let buckets = 1usize.checked_shl(self.target_depth).unwrap_or(usize::MAX);
        n.div_ceil(buckets).max(config::MIN_LEAF_CAPACITY)
    }
}

/// Immutable forest of partition trees over a [`VectorStore`](crate::store::VectorStore).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Forest {
    pub(crate) dimension: usize,
    pub(crate) num_items: usize,
    pub(crate) leaf_capacity: usize,
    pub(crate) seed: u64,
    pub(crate) trees: Vec<PartitionTree>,
}

/// Shape statistics of a built forest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ForestStats {
    pub num_trees: usize,
    pub num_nodes: usize,
    pub num_leaves: usize,
    /// Deepest leaf over all trees.
    pub max_depth: usize,
    /// Leaves forced by degenerate splits or the depth bound.
    pub forced_leaves: usize,
}

impl Forest {
    pub fn trees(&self) -> &[PartitionTree] {
        &self.trees
    }

    pub fn num_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Number of ids the forest was built over.
    pub fn num_items(&self) -> usize {
        self.num_items
    }

    pub fn leaf_capacity(&self) -> usize {
        self.leaf_capacity
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn stats(&self) -> ForestStats {
        let mut stats = ForestStats {
            num_trees: self.trees.len(),
            ..ForestStats::default()
        };
        for tree in &self.trees {
            stats.num_nodes += tree.nodes.len();
            stats.num_leaves += tree.leaves().count();
            stats.max_depth = stats.max_depth.max(tree.depth());
            stats.forced_leaves += tree.forced_leaves as usize;
        }
        stats
    }

    /// Structural check run after decoding a persisted forest.
    pub(crate) fn validate(&self) -> Result<()> {
        if self.trees.is_empty() {
            return Err(Error::EmptyIndex);
        }
        for (t, tree) in self.trees.iter().enumerate() {
            if !tree.is_well_formed() {
                return Err(Error::InvalidParameter(format!("tree {t} is malformed")));
            }
            for node in &tree.nodes {
                match node {
                    Node::Split { normal, .. } if normal.len() != self.dimension => {
                        return Err(Error::InvalidParameter(format!(
                            "tree {t} has a hyperplane of dimension {}",
                            normal.len()
                        )));
                    }
                    Node::Leaf { ids }
                        if ids.iter().any(|&id| id as usize >= self.num_items) =>
                    {
                        return Err(Error::InvalidParameter(format!(
                            "tree {t} references an id outside 0..{}",
                            self.num_items
                        )));
                    }
                    _ => {}
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_leaf_capacity() {
        let params = ForestParams::default();
        assert_eq!(params.leaf_capacity_for(3), config::MIN_LEAF_CAPACITY);
        // 2^16 buckets: 400k words -> 7 per leaf, clamped up to the minimum.
        assert_eq!(params.leaf_capacity_for(400_000), config::MIN_LEAF_CAPACITY);

        let shallow = ForestParams {
            target_depth: 4,
            ..ForestParams::default()
        };
        assert_eq!(shallow.leaf_capacity_for(1000), 63);

        let explicit = ForestParams {
            leaf_capacity: Some(5),
            ..ForestParams::default()
        };
        assert_eq!(explicit.leaf_capacity_for(1_000_000), 5);
    }

    #[test]
    fn validate_rejects_zeroes() {
        assert!(ForestParams::default().validate().is_ok());
        assert!(ForestParams::with_trees(0).validate().is_err());
        let p = ForestParams {
            leaf_capacity: Some(0),
            ..ForestParams::default()
        };
        assert!(p.validate().is_err());
        let p = ForestParams {
            max_depth: 0,
            ..ForestParams::default()
        };
        assert!(p.validate().is_err());
        let p = ForestParams {
            num_threads: Some(0),
            ..ForestParams::default()
        };
        assert!(p.validate().is_err());
    }
}
