//! Scratch arena used while a tree is being built or edited.
//!
//! An [`IntermediateTree`] is cheap to mutate: joining two clusters or moving a
//! root only rewrites a handful of indices. It is never traversed for queries;
//! once the structure is final it is moved into [`PackedTree::from_unroot`],
//! which lays the reachable nodes out in a fresh compact array.

use crate::error::{Result, TreeError};
use crate::tree::{Node, NodeIndex, PackedTree};

#[derive(Debug, Clone, Default)]
pub struct IntermediateTree {
    nodes: Vec<Node>,
}

impl IntermediateTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            nodes: Vec::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn node(&self, idx: NodeIndex) -> &Node {
        &self.nodes[idx]
    }

    pub fn node_mut(&mut self, idx: NodeIndex) -> &mut Node {
        &mut self.nodes[idx]
    }

    pub fn add_node(&mut self, node: Node) -> NodeIndex {
        self.nodes.push(node);
        self.nodes.len() - 1
    }

    pub fn add_leaf<S: Into<String>>(&mut self, label: S, weight: f64) -> NodeIndex {
        self.add_node(Node::leaf(label, weight))
    }

    /// Create a new internal node with the given children and point both
    /// children's parent at it. The new node starts with weight 0 and no parent.
    pub fn join(&mut self, left: NodeIndex, right: NodeIndex) -> NodeIndex {
        let idx = self.add_node(Node {
            left: Some(left),
            right: Some(right),
            ..Default::default()
        });
        self.nodes[left].parent = Some(idx);
        self.nodes[right].parent = Some(idx);
        idx
    }

    pub fn leaf_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_leaf()).count()
    }

    /// Follow parent links from `idx` to the parentless node above it.
    pub fn top_of(&self, idx: NodeIndex) -> Result<NodeIndex> {
        let mut cur = idx;
        for _ in 0..=self.nodes.len() {
            match self.nodes[cur].parent {
                Some(p) => cur = p,
                None => return Ok(cur),
            }
        }
        Err(TreeError::MalformedTree(format!(
            "parent chain starting at node {} does not terminate",
            idx
        )))
    }

    /// Repair parent orientation after the root moved.
    ///
    /// Starting at `start`, while `new_parent` occupies one of the node's child
    /// slots, that slot and the parent slot are exchanged and the walk continues
    /// at the former parent. Every edge on the walked path is reversed, so the
    /// branch length stored on the old child end is carried over to the new
    /// child end: `start` ends with weight 0 and the node where the walk stops
    /// receives the last carried length.
    pub fn reorient_towards(
        &mut self,
        start: NodeIndex,
        new_parent: Option<NodeIndex>,
    ) -> Result<()> {
        let mut current = start;
        let mut target = new_parent;
        let mut carried = 0.0;
        let mut moved = false;

        for _ in 0..=self.nodes.len() {
            let node = &mut self.nodes[current];
            let old_parent = node.parent;
            if node.left == target {
                node.left = old_parent;
            } else if node.right == target {
                node.right = old_parent;
            } else {
                if moved {
                    node.weight = carried;
                }
                return Ok(());
            }
            node.parent = target;
            carried = std::mem::replace(&mut node.weight, carried);
            moved = true;
            log::trace!("reoriented node {} towards {:?}", current, target);

            match old_parent {
                Some(next) => {
                    target = Some(current);
                    current = next;
                }
                None => return Ok(()),
            }
        }
        Err(TreeError::MalformedTree(format!(
            "orientation walk from node {} does not terminate",
            start
        )))
    }
}

/// Editable copy of a packed tree; indices are preserved one-to-one.
impl From<&PackedTree> for IntermediateTree {
    fn from(tree: &PackedTree) -> Self {
        Self {
            nodes: tree.nodes().to_vec(),
        }
    }
}
