//! Forest construction.

use super::tree::{Node, PartitionTree};
use super::{Forest, ForestParams};
use crate::distance::dot;
use crate::error::{Error, Result};
use crate::store::VectorStore;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use std::time::Instant;

/// Seed for tree `tree` derived from the forest's base seed (splitmix64).
pub(crate) fn tree_seed(base: u64, tree: usize) -> u64 {
    let mut z = base.wrapping_add((tree as u64 + 1).wrapping_mul(0x9E37_79B9_7F4A_7C15));
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

impl Forest {
    /// Build a forest over every vector in `store`.
    pub fn build(store: &VectorStore, params: &ForestParams) -> Result<Self> {
        params.validate()?;
        if store.is_empty() {
            return Err(Error::EmptyIndex);
        }

        let n = store.len();
        let leaf_capacity = params.leaf_capacity_for(n);
        let started = Instant::now();
        tracing::debug!(
            num_trees = params.num_trees,
            num_items = n,
            leaf_capacity,
            "building forest"
        );

        let build_one = |t: usize| {
            let seed = tree_seed(params.seed, t);
            TreeBuilder {
                store,
                leaf_capacity,
                max_depth: params.max_depth,
                split_retries: params.split_retries,
                rng: StdRng::seed_from_u64(seed),
                nodes: Vec::new(),
                forced_leaves: 0,
            }
            .build(seed, (0..n as u32).collect())
        };

        // Indexed parallel iterators collect in index order, so tree order is
        // seed order no matter which worker finished first.
        let trees: Vec<PartitionTree> = match params.num_threads {
            Some(threads) => rayon::ThreadPoolBuilder::new()
                .num_threads(threads)
                .build()
                .map_err(|e| Error::InvalidParameter(format!("thread pool: {e}")))?
                .install(|| (0..params.num_trees).into_par_iter().map(build_one).collect()),
            None => (0..params.num_trees)
                .into_par_iter()
                .map(build_one)
                .collect(),
        };

        let forest = Self {
            dimension: store.dimension(),
            num_items: n,
            leaf_capacity,
            seed: params.seed,
            trees,
        };

        let stats = forest.stats();
        tracing::info!(
            num_trees = stats.num_trees,
            num_nodes = stats.num_nodes,
            max_depth = stats.max_depth,
            forced_leaves = stats.forced_leaves,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "forest built"
        );
        Ok(forest)
    }
}

/// Hyperplane and the two sides of a successful split.
struct Split {
    normal: Vec<f32>,
    offset: f32,
    left: Vec<u32>,
    right: Vec<u32>,
}

/// Builds one tree; owns its RNG and arena, borrows the store.
struct TreeBuilder<'a> {
    store: &'a VectorStore,
    leaf_capacity: usize,
    max_depth: usize,
    split_retries: usize,
    rng: StdRng,
    nodes: Vec<Node>,
    forced_leaves: u32,
}

impl TreeBuilder<'_> {
    fn build(mut self, seed: u64, ids: Vec<u32>) -> PartitionTree {
        self.build_node(ids, 0);
        PartitionTree {
            seed,
            nodes: self.nodes,
            forced_leaves: self.forced_leaves,
        }
    }

    /// Build the subtree for `ids` and return its arena index.
    fn build_node(&mut self, ids: Vec<u32>, depth: usize) -> u32 {
        let idx = self.nodes.len() as u32;

        if ids.len() <= self.leaf_capacity {
            self.nodes.push(Node::Leaf { ids });
            return idx;
        }
        if depth >= self.max_depth {
            tracing::debug!(depth, size = ids.len(), "depth bound reached, forcing leaf");
            self.forced_leaves += 1;
            self.nodes.push(Node::Leaf { ids });
            return idx;
        }

        let Some(split) = self.split(&ids) else {
            tracing::warn!(
                depth,
                size = ids.len(),
                attempts = self.split_retries + 1,
                "degenerate split, forcing leaf"
            );
            self.forced_leaves += 1;
            self.nodes.push(Node::Leaf { ids });
            return idx;
        };
        drop(ids);

        // Reserve the slot so the parent precedes its children in the arena.
        self.nodes.push(Node::Leaf { ids: Vec::new() });
        let left = self.build_node(split.left, depth + 1);
        let right = self.build_node(split.right, depth + 1);
        self.nodes[idx as usize] = Node::Split {
            normal: split.normal,
            offset: split.offset,
            left,
            right,
        };
        idx
    }

    /// Try up to `1 + split_retries` random pivot pairs; `None` if every
    /// attempt leaves one side empty.
    fn split(&mut self, ids: &[u32]) -> Option<Split> {
        debug_assert!(ids.len() >= 2);
        let dim = self.store.dimension();

        for _ in 0..=self.split_retries {
            let i = self.rng.random_range(0..ids.len());
            let mut j = self.rng.random_range(0..ids.len() - 1);
            if j >= i {
                j += 1;
            }
            // The lower id is the left pivot, so exact ties route toward it.
            let (a, b) = if ids[i] < ids[j] {
                (ids[i], ids[j])
            } else {
                (ids[j], ids[i])
            };
            let va = self.store.vector(a as usize);
            let vb = self.store.vector(b as usize);

            let mut normal = Vec::with_capacity(dim);
            let mut midpoint = Vec::with_capacity(dim);
            for (x, y) in va.iter().zip(vb.iter()) {
                normal.push(x - y);
                midpoint.push((x + y) * 0.5);
            }
            if normal.iter().all(|&c| c == 0.0) {
                continue; // identical pivots
            }
            let offset = dot(&normal, &midpoint);

            let mut left = Vec::new();
            let mut right = Vec::new();
            for &id in ids {
                let margin = dot(&normal, self.store.vector(id as usize)) - offset;
                if margin >= 0.0 {
                    left.push(id);
                } else {
                    right.push(id);
                }
            }

            if !left.is_empty() && !right.is_empty() {
                return Some(Split {
                    normal,
                    offset,
                    left,
                    right,
                });
            }
        }
        None
    }
}
