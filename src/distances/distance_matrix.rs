use log::debug;
use ndarray::Array2;
use rayon::prelude::*;

use crate::distances::LabelIndex;
use crate::error::{Result, TreeError};
use crate::tree::{NodeIndex, PackedTree};

/// Ancestor chain of `node`: the node itself, each ancestor in turn, and a
/// trailing `None` standing for the (virtual) centre above the unroot set.
pub fn ancestor_chain(tree: &PackedTree, node: NodeIndex) -> Result<Vec<Option<NodeIndex>>> {
    let mut chain = vec![Some(node)];
    let mut cur = node;
    while let Some(p) = tree.node(cur).parent {
        if chain.len() > tree.len() {
            return Err(TreeError::MalformedTree(format!(
                "parent chain of node {} does not terminate",
                node
            )));
        }
        chain.push(Some(p));
        cur = p;
    }
    chain.push(None);
    Ok(chain)
}

/// Path length between two nodes given their ancestor chains.
///
/// The chains are compared from the top end; the last shared element is the
/// lowest common ancestor, and the weights strictly below it on both sides are
/// summed. When only the trailing `None` is shared, both top-level branches
/// are part of the path. Every chain ends in that `None`, so there is always
/// a common element.
fn distance_from_chains(tree: &PackedTree, a: &[Option<NodeIndex>], b: &[Option<NodeIndex>]) -> f64 {
    let (mut i, mut j) = (a.len(), b.len());
    while i > 0 && j > 0 && a[i - 1] == b[j - 1] {
        i -= 1;
        j -= 1;
    }
    let below = |chain: &[Option<NodeIndex>]| -> f64 {
        chain
            .iter()
            .flatten()
            .map(|&n| tree.node(n).weight)
            .sum()
    };
    below(&a[..i]) + below(&b[..j])
}

/// Path length between nodes `a` and `b` through their lowest common ancestor.
pub fn pairwise_distance(tree: &PackedTree, a: NodeIndex, b: NodeIndex) -> Result<f64> {
    if a == b {
        return Ok(0.0);
    }
    let chain_a = ancestor_chain(tree, a)?;
    let chain_b = ancestor_chain(tree, b)?;
    Ok(distance_from_chains(tree, &chain_a, &chain_b))
}

/// All leaf-to-leaf distances, with rows ordered by a fresh [`LabelIndex`].
pub fn distance_matrix(tree: &PackedTree) -> Result<(LabelIndex, Array2<f64>)> {
    let index = LabelIndex::from_tree(tree)?;
    let matrix = distance_matrix_with_index(tree, &index)?;
    Ok((index, matrix))
}

/// All leaf-to-leaf distances, with rows ordered by a caller-supplied index.
///
/// Rows are computed in parallel; each leaf's ancestor chain is built once
/// and shared by all pairs it takes part in.
pub fn distance_matrix_with_index(tree: &PackedTree, index: &LabelIndex) -> Result<Array2<f64>> {
    let n = index.len();
    let mut row_of: Vec<(usize, NodeIndex)> = Vec::with_capacity(n);
    for leaf in tree.leaves() {
        let label = &tree.node(leaf).label;
        let row = index
            .get(label)
            .ok_or_else(|| TreeError::UnknownLabel(label.clone()))?;
        row_of.push((row, leaf));
    }
    if row_of.len() != n {
        return Err(TreeError::dimension("leaf count against label index", n, row_of.len()));
    }
    row_of.sort_unstable_by_key(|&(row, _)| row);

    let chains: Vec<Vec<Option<NodeIndex>>> = row_of
        .par_iter()
        .map(|&(_, leaf)| ancestor_chain(tree, leaf))
        .collect::<Result<_>>()?;

    let rows: Vec<Vec<f64>> = (0..n)
        .into_par_iter()
        .map(|i| {
            (0..n)
                .map(|j| {
                    if i == j {
                        0.0
                    } else {
                        distance_from_chains(tree, &chains[i], &chains[j])
                    }
                })
                .collect()
        })
        .collect();

    let mut matrix = Array2::<f64>::zeros((n, n));
    for (i, row) in rows.into_iter().enumerate() {
        for (j, d) in row.into_iter().enumerate() {
            matrix[[i, j]] = d;
        }
    }
    debug!("computed {}x{} tree distance matrix", n, n);
    Ok(matrix)
}
