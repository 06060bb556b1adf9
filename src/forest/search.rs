//! Forest search: greedy descent, priority widening, exact re-ranking.

use super::tree::{Node, PartitionTree, ROOT};
use super::Forest;
use crate::distance::{dot, l2_distance, norm};
use crate::error::{Error, Result};
use crate::store::VectorStore;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};

/// An untaken sibling subtree waiting on the frontier.
///
/// `slack` is the largest query-to-hyperplane distance crossed on the way
/// to it; the heap pops the smallest slack first.
#[derive(Debug, Clone, Copy)]
struct Frontier {
    slack: f32,
    tree: u32,
    node: u32,
}

impl PartialEq for Frontier {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Frontier {}

impl PartialOrd for Frontier {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Frontier {
    // Reversed everywhere: BinaryHeap is a max-heap and we want the smallest
    // slack, then the lowest tree, then the lowest node first.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .slack
            .total_cmp(&self.slack)
            .then_with(|| other.tree.cmp(&self.tree))
            .then_with(|| other.node.cmp(&self.node))
    }
}

/// Candidate pool deduplicated across trees, in discovery order.
struct Pool {
    seen: HashSet<u32>,
    ids: Vec<u32>,
}

impl Pool {
    fn extend(&mut self, ids: &[u32]) {
        for &id in ids {
            if self.seen.insert(id) {
                self.ids.push(id);
            }
        }
    }
}

impl Forest {
    /// Approximate `k` nearest neighbors of `query` as `(id, distance)`,
    /// ascending by Euclidean distance, ties by ascending id.
    ///
    /// `search_k` bounds how many candidates are pooled before re-ranking;
    /// it defaults to `k * num_trees` and is never below `k`. Fewer than `k`
    /// results come back only when the forest holds fewer reachable items.
    pub fn search(
        &self,
        store: &VectorStore,
        query: &[f32],
        k: usize,
        search_k: Option<usize>,
    ) -> Result<Vec<(u32, f32)>> {
        if self.trees.is_empty() || store.is_empty() {
            return Err(Error::EmptyIndex);
        }
        if store.len() != self.num_items || store.dimension() != self.dimension {
            return Err(Error::InvalidParameter(format!(
                "vector store ({} x {}) does not match forest ({} x {})",
                store.len(),
                store.dimension(),
                self.num_items,
                self.dimension
            )));
        }
        if query.len() != self.dimension {
            return Err(Error::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }
        if k == 0 {
            return Ok(Vec::new());
        }

        let search_k = search_k
            .unwrap_or_else(|| k.saturating_mul(self.trees.len()))
            .max(k);
        let candidates = self.candidates(query, search_k);

        let mut scored: Vec<(u32, f32)> = candidates
            .into_iter()
            .map(|id| (id, l2_distance(query, store.vector(id as usize))))
            .collect();
        scored.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
        scored.truncate(k);
        Ok(scored)
    }

    /// [`Forest::search`] with the stored vector of `id` as the query.
    pub fn search_by_id(
        &self,
        store: &VectorStore,
        id: u32,
        k: usize,
        search_k: Option<usize>,
    ) -> Result<Vec<(u32, f32)>> {
        let query = store.get(id)?;
        self.search(store, query, k, search_k)
    }

    /// Pool at least `search_k` distinct ids, or everything reachable.
    fn candidates(&self, query: &[f32], search_k: usize) -> Vec<u32> {
        let mut pool = Pool {
            seen: HashSet::with_capacity(search_k),
            ids: Vec::with_capacity(search_k),
        };
        let mut frontier = BinaryHeap::new();

        // One leaf per tree, unconditionally.
        for (t, tree) in self.trees.iter().enumerate() {
            descend(tree, t as u32, ROOT, 0.0, query, &mut pool, &mut frontier);
        }

        // Widen across the siblings nearest to their hyperplanes.
        while pool.ids.len() < search_k {
            let Some(next) = frontier.pop() else {
                break;
            };
            let tree = &self.trees[next.tree as usize];
            descend(
                tree,
                next.tree,
                next.node,
                next.slack,
                query,
                &mut pool,
                &mut frontier,
            );
        }

        pool.ids
    }
}

/// Greedy descent from `start` to a leaf, pooling the leaf and queueing
/// every sibling not taken.
fn descend(
    tree: &PartitionTree,
    tree_idx: u32,
    start: u32,
    slack: f32,
    query: &[f32],
    pool: &mut Pool,
    frontier: &mut BinaryHeap<Frontier>,
) {
    let mut idx = start;
    loop {
        match tree.node(idx) {
            Node::Leaf { ids } => {
                pool.extend(ids);
                return;
            }
            Node::Split {
                normal,
                offset,
                left,
                right,
            } => {
                let margin = dot(normal, query) - offset;
                let n = norm(normal);
                let gap = if n > 0.0 { margin.abs() / n } else { 0.0 };
                let (near, far) = if margin >= 0.0 {
                    (*left, *right)
                } else {
                    (*right, *left)
                };
                frontier.push(Frontier {
                    slack: slack.max(gap),
                    tree: tree_idx,
                    node: far,
                });
                idx = near;
            }
        }
    }
}
