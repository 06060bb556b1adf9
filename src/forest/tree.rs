//! Arena representation of a single partition tree.

use crate::distance::dot;
use serde::{Deserialize, Serialize};

/// Index of the root node in every tree's arena.
pub const ROOT: u32 = 0;

/// A node of a partition tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Node {
    /// Internal node: hyperplane `normal · x = offset` and two children.
    ///
    /// Points with `normal · x - offset >= 0` belong to `left`.
    Split {
        normal: Vec<f32>,
        offset: f32,
        left: u32,
        right: u32,
    },
    /// Leaf node: ids routed here, in ascending order.
    Leaf { ids: Vec<u32> },
}

impl Node {
    /// Signed distance-like score of `v` against this node's hyperplane.
    ///
    /// Returns `None` for leaves.
    #[inline]
    pub fn margin(&self, v: &[f32]) -> Option<f32> {
        match self {
            Node::Split { normal, offset, .. } => Some(dot(normal, v) - offset),
            Node::Leaf { .. } => None,
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self, Node::Leaf { .. })
    }
}

/// One tree of the forest, stored as a flat node arena rooted at [`ROOT`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartitionTree {
    /// Seed the tree's pivot choices were drawn from.
    pub(crate) seed: u64,
    pub(crate) nodes: Vec<Node>,
    /// Leaves produced by exhausted split retries or the depth bound.
    pub(crate) forced_leaves: u32,
}

impl PartitionTree {
    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn node(&self, idx: u32) -> &Node {
        &self.nodes[idx as usize]
    }

    pub fn forced_leaves(&self) -> u32 {
        self.forced_leaves
    }

    /// Follow the build-time side rule from the root down to a leaf and
    /// return that leaf's ids.
    pub fn leaf_for(&self, v: &[f32]) -> &[u32] {
        let mut idx = ROOT;
        loop {
            match self.node(idx) {
                Node::Leaf { ids } => return ids,
                Node::Split {
                    normal,
                    offset,
                    left,
                    right,
                } => {
                    idx = if dot(normal, v) - offset >= 0.0 {
                        *left
                    } else {
                        *right
                    };
                }
            }
        }
    }

    /// Id lists of every leaf, in arena order.
    pub fn leaves(&self) -> impl Iterator<Item = &[u32]> {
        self.nodes.iter().filter_map(|n| match n {
            Node::Leaf { ids } => Some(ids.as_slice()),
            Node::Split { .. } => None,
        })
    }

    /// Depth of the deepest leaf (a lone root leaf has depth 0).
    pub fn depth(&self) -> usize {
        let mut max_depth = 0;
        let mut stack = vec![(ROOT, 0usize)];
        while let Some((idx, depth)) = stack.pop() {
            match self.node(idx) {
                Node::Leaf { .. } => max_depth = max_depth.max(depth),
                Node::Split { left, right, .. } => {
                    stack.push((*left, depth + 1));
                    stack.push((*right, depth + 1));
                }
            }
        }
        max_depth
    }

    /// Check arena shape: children in range and every node reachable once.
    pub(crate) fn is_well_formed(&self) -> bool {
        if self.nodes.is_empty() {
            return false;
        }
        let mut visited = vec![false; self.nodes.len()];
        let mut stack = vec![ROOT];
        while let Some(idx) = stack.pop() {
            let Some(seen) = visited.get_mut(idx as usize) else {
                return false;
            };
            if *seen {
                return false;
            }
            *seen = true;
            match self.node(idx) {
                Node::Leaf { ids } if ids.is_empty() => return false,
                Node::Leaf { .. } => {}
                Node::Split { left, right, .. } => {
                    stack.push(*left);
                    stack.push(*right);
                }
            }
        }
        visited.into_iter().all(|v| v)
    }
}
