//! Synthetic branch-length assignment.
//!
//! These helpers build test and demo trees; Neighbor-Joining sets its own
//! weights. The depth-indexed variants produce ultrametric trees: every leaf
//! ends up at the same path length `max` from the top of the tree.

use crate::error::{Result, TreeError};
use crate::tree::PackedTree;

impl PackedTree {
    /// Give every branch, top-level nodes included, the same length.
    pub fn set_weights_constant(&mut self, c: f64) -> &mut Self {
        for node in self.nodes_mut() {
            node.weight = c;
        }
        self
    }

    pub fn clear_weights(&mut self) -> &mut Self {
        self.set_weights_constant(0.0)
    }

    /// Internal node at depth `d` gets `f(d)`; a leaf at depth `d` gets
    /// `max - (f(0) + .. + f(d-1))`.
    ///
    /// Top-level nodes sit at depth 0. A single root is skipped (its weight
    /// becomes 0 and its children start at depth 0). `max` defaults to the sum
    /// of `f` over the tree's depth.
    pub fn set_weights_by_depth<F>(&mut self, f: F, max: Option<f64>) -> &mut Self
    where
        F: Fn(usize) -> f64,
    {
        let depth = self.depth();
        let mut prefix = Vec::with_capacity(depth + 1);
        prefix.push(0.0);
        for d in 0..depth {
            prefix.push(prefix[d] + f(d));
        }
        let max = max.unwrap_or(prefix[depth]);
        let single_root = match self.unroot() {
            [root] => Some(*root),
            _ => None,
        };

        let mut level = vec![0usize; self.len()];
        let nodes = self.nodes_mut();
        for i in 0..nodes.len() {
            let d = level[i];
            let node = &mut nodes[i];
            let child_level = match node.children() {
                _ if single_root == Some(i) => {
                    node.weight = 0.0;
                    0
                }
                Some(_) => {
                    node.weight = f(d);
                    d + 1
                }
                None => {
                    let above = match prefix.get(d) {
                        Some(p) => *p,
                        None => (0..d).map(&f).sum(),
                    };
                    node.weight = max - above;
                    continue;
                }
            };
            if let Some((l, r)) = node.children() {
                level[l] = child_level;
                level[r] = child_level;
            }
        }
        self
    }

    /// Ultrametric weights with `w` per level; the top-level branches get `w/2`
    /// so that two top-level subtrees are `w` apart.
    pub fn set_weights_uniform(&mut self, w: f64, max: Option<f64>) -> &mut Self {
        self.set_weights_by_depth(|d| if d == 0 { w / 2.0 } else { w }, max)
    }

    /// Ultrametric weights taken per level from `ws` (the first entry halved).
    pub fn set_weights_from_slice(&mut self, ws: &[f64], max: Option<f64>) -> Result<&mut Self> {
        let depth = self.depth();
        if ws.len() < depth {
            return Err(TreeError::dimension("per-level weight vector", depth, ws.len()));
        }
        Ok(self.set_weights_by_depth(|d| if d == 0 { ws[0] / 2.0 } else { ws[d] }, max))
    }
}
