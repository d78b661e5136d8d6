use std::fmt;

use log::{debug, trace};
use ndarray::Array2;

use crate::distances::{distance_matrix, LabelIndex};
use crate::error::{Result, TreeError};
use crate::newick::{parser::parse_newick, writer::to_newick};
use crate::tree::{IntermediateTree, Node, NodeIndex};

/// Decimal places used by the `Display` implementation.
pub const DEFAULT_PRECISION: usize = 5;

/// Flat, cache-friendly binary tree.
///
/// The nodes live in one array laid out by [`PackedTree::from_unroot`]; every
/// node comes after its parent, so a forward scan is a pre-order and a reverse
/// scan a post-order. The array is never resized: structural edits build a new
/// one and replace it wholesale.
///
/// `unroot` lists the 1 to 3 parentless top-level nodes. One entry means a
/// rooted tree, three an unrooted tree with a ternary base. Two entries are
/// produced by [`PackedTree::set_outgroup`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PackedTree {
    nodes: Vec<Node>,
    unroot: Vec<NodeIndex>,
}

impl PackedTree {
    /* ---------------- construction ---------------- */

    /// Flatten the subtrees hanging from `unroot` into a fresh array.
    ///
    /// Nodes not reachable from `unroot` are dropped. Child and parent links
    /// are remapped to the new slots, with parents derived from the child links.
    pub fn from_unroot(arena: IntermediateTree, unroot: &[NodeIndex]) -> Result<Self> {
        if unroot.is_empty() || unroot.len() > 3 {
            return Err(TreeError::InvalidTreeState(format!(
                "unroot set must hold 1 to 3 nodes, got {}",
                unroot.len()
            )));
        }
        let source = arena.nodes();
        let mut slot_of: Vec<Option<usize>> = vec![None; source.len()];
        let mut order: Vec<NodeIndex> = Vec::with_capacity(source.len());
        let mut stack: Vec<NodeIndex> = Vec::with_capacity(source.len());

        let mut visit = |idx: NodeIndex, order: &mut Vec<NodeIndex>| -> Result<()> {
            let slot = slot_of.get_mut(idx).ok_or_else(|| {
                TreeError::MalformedTree(format!("node index {} out of range", idx))
            })?;
            if slot.is_some() {
                return Err(TreeError::MalformedTree(format!(
                    "node {} is reachable more than once",
                    idx
                )));
            }
            *slot = Some(order.len());
            order.push(idx);
            Ok(())
        };

        for &root in unroot {
            visit(root, &mut order)?;
            stack.push(root);
        }
        while let Some(cur) = stack.pop() {
            let node = &source[cur];
            match (node.left, node.right) {
                (Some(l), Some(r)) => {
                    visit(l, &mut order)?;
                    visit(r, &mut order)?;
                    stack.push(l);
                    stack.push(r);
                }
                (None, None) => {}
                _ => {
                    return Err(TreeError::MalformedTree(format!(
                        "node {} ('{}') has exactly one child",
                        cur, node.label
                    )))
                }
            }
        }

        let mut nodes: Vec<Node> = order
            .iter()
            .map(|&old| {
                let src = &source[old];
                Node {
                    label: src.label.clone(),
                    weight: src.weight,
                    parent: None,
                    left: src.left.and_then(|l| slot_of[l]),
                    right: src.right.and_then(|r| slot_of[r]),
                }
            })
            .collect();
        for i in 0..nodes.len() {
            if let Some((l, r)) = nodes[i].children() {
                nodes[l].parent = Some(i);
                nodes[r].parent = Some(i);
            }
        }
        let unroot: Vec<NodeIndex> = unroot.iter().filter_map(|&r| slot_of[r]).collect();
        trace!(
            "flattened {} of {} arena nodes, unroot size {}",
            nodes.len(),
            source.len(),
            unroot.len()
        );
        Ok(Self { nodes, unroot })
    }

    /// Parse a Newick string and flatten it.
    pub fn from_newick(newick: &str) -> Result<Self> {
        let parsed = parse_newick(newick)?;
        debug!(
            "parsed newick with {} leaves, unroot size {}",
            parsed.leaf_count,
            parsed.unroot.len()
        );
        Self::from_unroot(parsed.tree, &parsed.unroot)
    }

    /* ---------------- accessors ---------------- */

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

    pub(crate) fn nodes_mut(&mut self) -> &mut [Node] {
        &mut self.nodes
    }

    pub fn unroot(&self) -> &[NodeIndex] {
        &self.unroot
    }

    pub fn leaves(&self) -> impl Iterator<Item = NodeIndex> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| n.is_leaf())
            .map(|(i, _)| i)
    }

    pub fn leaf_count(&self) -> usize {
        self.leaves().count()
    }

    /// First leaf (in array order) carrying `label`.
    pub fn find_leaf(&self, label: &str) -> Option<NodeIndex> {
        self.leaves().find(|&i| self.nodes[i].label == label)
    }

    pub fn is_rooted(&self) -> bool {
        self.unroot.len() <= 2
    }

    /* ---------------- queries ---------------- */

    /// Longest top-to-leaf path counted in nodes, minus one for a single root.
    pub fn depth(&self) -> usize {
        let mut depth = vec![1usize; self.nodes.len()];
        for i in (0..self.nodes.len()).rev() {
            if let Some((l, r)) = self.nodes[i].children() {
                depth[i] = depth[l].max(depth[r]) + 1;
            }
        }
        let max = self.unroot.iter().map(|&u| depth[u]).max().unwrap_or(0);
        if self.unroot.len() == 1 {
            max - 1
        } else {
            max
        }
    }

    /// Leaf-to-leaf path lengths, rows ordered by a fresh [`LabelIndex`].
    pub fn distance_matrix(&self) -> Result<(LabelIndex, Array2<f64>)> {
        distance_matrix(self)
    }

    pub fn to_newick(&self, precision: usize) -> String {
        to_newick(self, precision)
    }

    /* ---------------- canonical order ---------------- */

    /// Reorder children so that each subtree's smallest label comes first, and
    /// order the unroot members the same way. Shape and slots are unchanged.
    pub fn sort(&mut self) -> &mut Self {
        let mut key: Vec<String> = vec![String::new(); self.nodes.len()];
        for i in (0..self.nodes.len()).rev() {
            let node = &mut self.nodes[i];
            let k = match node.children() {
                None => node.label.clone(),
                Some((l, r)) => {
                    let first = if key[r] < key[l] {
                        std::mem::swap(&mut node.left, &mut node.right);
                        r
                    } else {
                        l
                    };
                    if node.label.is_empty() || key[first] < node.label {
                        key[first].clone()
                    } else {
                        node.label.clone()
                    }
                }
            };
            key[i] = k;
        }
        let mut unroot = std::mem::take(&mut self.unroot);
        unroot.sort_by(|a, b| key[*a].cmp(&key[*b]));
        self.unroot = unroot;
        self
    }
}

impl fmt::Display for PackedTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_newick(DEFAULT_PRECISION))
    }
}
