pub mod builder;
pub mod packed_tree;
pub mod reroot;
pub mod weights;

pub use builder::IntermediateTree;
pub use packed_tree::{PackedTree, DEFAULT_PRECISION};

/// Slot of a node inside an arena (either an [`IntermediateTree`] or a [`PackedTree`]).
pub type NodeIndex = usize;

/// A binary tree node stored in an arena.
///
/// `left` and `right` are either both set (internal node) or both unset (leaf).
/// `weight` is the length of the branch towards `parent`; for top-level nodes it
/// is the branch towards the (virtual) centre of the unroot set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Node {
    pub label: String,
    pub weight: f64,
    pub parent: Option<NodeIndex>,
    pub left: Option<NodeIndex>,
    pub right: Option<NodeIndex>,
}

impl Node {
    pub fn leaf<S: Into<String>>(label: S, weight: f64) -> Self {
        Self {
            label: label.into(),
            weight,
            ..Default::default()
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.left.is_none() && self.right.is_none()
    }

    /// Both children, if this is a well-formed internal node.
    pub fn children(&self) -> Option<(NodeIndex, NodeIndex)> {
        match (self.left, self.right) {
            (Some(l), Some(r)) => Some((l, r)),
            _ => None,
        }
    }
}
