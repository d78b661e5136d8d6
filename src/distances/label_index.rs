use std::collections::HashMap;

use crate::error::{Result, TreeError};
use crate::tree::PackedTree;

/// Stable mapping from leaf label to distance-matrix row.
///
/// Rows follow the tree's array order at the time the index was built. Build it
/// once and reuse it to compare matrices of different trees over the same taxa.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LabelIndex {
    labels: Vec<String>,
    rows: HashMap<String, usize>,
}

impl LabelIndex {
    pub fn from_tree(tree: &PackedTree) -> Result<Self> {
        Self::from_labels(tree.leaves().map(|i| tree.node(i).label.clone()))
    }

    pub fn from_labels<I, S>(labels: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut index = Self::default();
        for label in labels {
            let label = label.into();
            if index.rows.contains_key(&label) {
                return Err(TreeError::MalformedTree(format!(
                    "leaf label '{}' occurs more than once",
                    label
                )));
            }
            index.rows.insert(label.clone(), index.labels.len());
            index.labels.push(label);
        }
        Ok(index)
    }

    pub fn get(&self, label: &str) -> Option<usize> {
        self.rows.get(label).copied()
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}
