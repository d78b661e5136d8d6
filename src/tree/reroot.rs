//! Root placement: outgroup rerooting and unrooting.
//!
//! Both operations copy the packed array into an [`IntermediateTree`], edit the
//! copy, and re-flatten it. The tree is only replaced once the new array has
//! been built, so a failing call leaves it untouched.

use log::debug;

use crate::error::{Result, TreeError};
use crate::tree::{IntermediateTree, Node, NodeIndex, PackedTree};

impl PackedTree {
    /// Move the root next to the leaf labelled `label`.
    ///
    /// The tree must be unrooted (three top-level members). Afterwards the
    /// unroot set is `{outgroup, rest}`: the outgroup keeps its branch length
    /// and the rest of the tree hangs from a node of weight 0. Path lengths
    /// between leaves are unchanged.
    pub fn set_outgroup(&mut self, label: &str) -> Result<&mut Self> {
        if self.unroot().len() != 3 {
            return Err(TreeError::InvalidTreeState(format!(
                "setting an outgroup needs an unrooted tree (3 top-level nodes), found {}",
                self.unroot().len()
            )));
        }
        let outgroup = self
            .find_leaf(label)
            .ok_or_else(|| TreeError::UnknownLabel(label.to_string()))?;

        let mut arena = IntermediateTree::from(&*self);
        let unroot = self.unroot().to_vec();

        let new_unroot = match arena.node(outgroup).parent {
            None => {
                debug!("outgroup '{}' is a top-level node", label);
                let others: Vec<NodeIndex> =
                    unroot.iter().copied().filter(|&u| u != outgroup).collect();
                let rest = arena.join(others[0], others[1]);
                vec![outgroup, rest]
            }
            Some(parent) => {
                let top = arena.top_of(outgroup)?;
                debug!(
                    "outgroup '{}' hangs below top-level node {}, rerooting through {}",
                    label, top, parent
                );
                let others: Vec<NodeIndex> =
                    unroot.iter().copied().filter(|&u| u != top).collect();
                if others.len() != 2 {
                    return Err(TreeError::MalformedTree(format!(
                        "ancestor {} of the outgroup is not a top-level node",
                        top
                    )));
                }

                // The old ternary centre becomes an ordinary node below `top`.
                let centre = arena.add_node(Node {
                    parent: Some(top),
                    left: Some(others[0]),
                    right: Some(others[1]),
                    ..Default::default()
                });
                arena.node_mut(others[0]).parent = Some(centre);
                arena.node_mut(others[1]).parent = Some(centre);
                arena.node_mut(top).parent = Some(centre);

                arena.node_mut(outgroup).parent = None;
                let p = arena.node_mut(parent);
                if p.left != Some(outgroup) {
                    std::mem::swap(&mut p.left, &mut p.right);
                }
                p.left = None;
                arena.reorient_towards(parent, None)?;
                vec![outgroup, parent]
            }
        };

        *self = PackedTree::from_unroot(arena, &new_unroot)?;
        Ok(self)
    }

    /// Dissolve the root until three top-level nodes remain.
    ///
    /// When a dissolved node had a sibling in the unroot set its branch length
    /// is added to that sibling, so leaf-to-leaf path lengths are preserved. A
    /// lone root's own weight is discarded.
    pub fn make_unrooted(&mut self) -> Result<&mut Self> {
        if !self.is_rooted() {
            return Err(TreeError::InvalidTreeState(
                "tree is already unrooted".to_string(),
            ));
        }
        if self.len() <= 2 {
            return Err(TreeError::InvalidTreeState(format!(
                "tree with {} nodes is too small to unroot",
                self.len()
            )));
        }

        let mut arena = IntermediateTree::from(&*self);
        let mut unroot = self.unroot().to_vec();
        while unroot.len() != 3 {
            let pos = unroot
                .iter()
                .position(|&u| !arena.node(u).is_leaf())
                .ok_or_else(|| {
                    TreeError::InvalidTreeState(
                        "no internal top-level node left to dissolve".to_string(),
                    )
                })?;
            let dissolved = unroot.remove(pos);
            let node = arena.node_mut(dissolved);
            let weight = node.weight;
            let (l, r) = match (node.left.take(), node.right.take()) {
                (Some(l), Some(r)) => (l, r),
                _ => {
                    return Err(TreeError::MalformedTree(format!(
                        "node {} has exactly one child",
                        dissolved
                    )))
                }
            };
            if let [sibling] = unroot.as_slice() {
                arena.node_mut(*sibling).weight += weight;
            }
            arena.node_mut(l).parent = None;
            arena.node_mut(r).parent = None;
            unroot.push(l);
            unroot.push(r);
            debug!("dissolved top-level node {}, unroot size {}", dissolved, unroot.len());
        }

        *self = PackedTree::from_unroot(arena, &unroot)?;
        Ok(self)
    }
}
