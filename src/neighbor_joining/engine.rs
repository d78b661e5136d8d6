use log::{debug, trace};
use ndarray::{Array2, ArrayView2};
use rayon::prelude::*;

use crate::error::{Result, TreeError};
use crate::tree::{IntermediateTree, NodeIndex, PackedTree};

/// One Neighbor-Joining run.
///
/// Holds the live distance matrix, the live cluster roots (one per matrix row,
/// same order) and the scratch arena the clusters are built in. Each join
/// shrinks the matrix by one row until three clusters remain; those become the
/// unroot set of the resulting [`PackedTree`].
pub struct NeighborJoining {
    dists: Array2<f64>,
    clusters: Vec<NodeIndex>,
    tree: IntermediateTree,
    r: Vec<f64>,
    q: Array2<f64>,
}

impl NeighborJoining {
    pub fn new(dists: Array2<f64>, labels: &[String]) -> Result<Self> {
        let (rows, cols) = dists.dim();
        if rows != cols {
            return Err(TreeError::dimension("distance matrix columns", rows, cols));
        }
        if labels.len() != rows {
            return Err(TreeError::dimension("labels", rows, labels.len()));
        }
        if rows < 3 {
            return Err(TreeError::InvalidTreeState(format!(
                "neighbor joining needs at least 3 taxa, got {}",
                rows
            )));
        }
        let mut tree = IntermediateTree::with_capacity(2 * rows - 2);
        let clusters = labels.iter().map(|l| tree.add_leaf(l.as_str(), 0.0)).collect();
        debug!("NJ initialised with {} taxa", rows);
        Ok(Self {
            dists,
            clusters,
            tree,
            r: Vec::with_capacity(rows),
            q: Array2::zeros((rows, rows)),
        })
    }

    /// Build from a row-major flattened square matrix.
    pub fn from_flat(dists: &[f64], labels: &[String]) -> Result<Self> {
        let row_size = (dists.len() as f64).sqrt().round() as usize;
        if row_size * row_size != dists.len() {
            return Err(TreeError::dimension(
                "flat distance matrix (perfect square)",
                row_size * row_size,
                dists.len(),
            ));
        }
        let matrix = Array2::from_shape_vec((row_size, row_size), dists.to_vec()).map_err(|e| {
            TreeError::InvalidTreeState(format!("cannot shape flat distance matrix: {}", e))
        })?;
        Self::new(matrix, labels)
    }

    fn row_size(&self) -> usize {
        self.clusters.len()
    }

    /// Current (reduced) distance matrix.
    pub fn distances(&self) -> ArrayView2<'_, f64> {
        self.dists.view()
    }

    /// Join clusters until three remain, then emit the unrooted tree.
    pub fn run(mut self) -> Result<PackedTree> {
        while self.row_size() > 3 {
            self.compute_r();
            self.compute_q()?;
            let (i, j) = self.find_pair();
            trace!(
                "joining rows {} and {} (Q = {}) of {}",
                i,
                j,
                self.q[[i, j]],
                self.row_size()
            );
            self.join_pair(i, j);
        }
        self.join_final();
        debug!("NJ finished, {} arena nodes", self.tree.len());
        PackedTree::from_unroot(self.tree, &self.clusters)
    }

    fn compute_r(&mut self) {
        self.r.clear();
        self.r.extend(self.dists.rows().into_iter().map(|row| row.sum()));
    }

    /// `Q[i][j] = (n-2)*D[i][j] - R[i] - R[j]`, one row per rayon task.
    fn compute_q(&mut self) -> Result<()> {
        let n = self.row_size();
        let scale = n as f64 - 2.0;
        if self.q.dim() != (n, n) {
            self.q = Array2::zeros((n, n));
        }
        let dists = &self.dists;
        let r = &self.r;
        let q = self.q.as_slice_mut().ok_or_else(|| {
            TreeError::InvalidTreeState("Q matrix is not contiguous".to_string())
        })?;
        q.par_chunks_mut(n).enumerate().for_each(|(i, row)| {
            for (j, cell) in row.iter_mut().enumerate() {
                *cell = scale * dists[[i, j]] - r[i] - r[j];
            }
        });
        Ok(())
    }

    /// Minimum of Q over the strict lower triangle. Ties go to the pair seen
    /// last in row-major order.
    fn find_pair(&self) -> (usize, usize) {
        let n = self.row_size();
        let (mut low_i, mut low_j) = (1, 0);
        for i in 1..n {
            for j in 0..i {
                if self.q[[i, j]] <= self.q[[low_i, low_j]] {
                    low_i = i;
                    low_j = j;
                }
            }
        }
        (low_i, low_j)
    }

    fn join_pair(&mut self, i: usize, j: usize) {
        let n = self.row_size();
        let d_ij = self.dists[[i, j]];
        let left = self.clusters[i];
        let right = self.clusters[j];

        let left_weight =
            0.5 * d_ij + (self.r[i] - self.r[j]) / (2.0 * (2.0 * n as f64 - 2.0));
        self.tree.node_mut(left).weight = left_weight;
        self.tree.node_mut(right).weight = d_ij - left_weight;
        let joined = self.tree.join(left, right);

        let survivors: Vec<usize> = (0..n).filter(|&k| k != i && k != j).collect();
        let m = n - 1;
        let mut reduced = Array2::<f64>::zeros((m, m));
        for (a, &ka) in survivors.iter().enumerate() {
            for (b, &kb) in survivors.iter().enumerate() {
                reduced[[a, b]] = self.dists[[ka, kb]];
            }
            let to_new = 0.5 * (self.dists[[ka, i]] + self.dists[[ka, j]] - d_ij);
            reduced[[a, m - 1]] = to_new;
            reduced[[m - 1, a]] = to_new;
        }
        self.dists = reduced;

        let mut clusters: Vec<NodeIndex> = survivors.iter().map(|&k| self.clusters[k]).collect();
        clusters.push(joined);
        self.clusters = clusters;
    }

    /// Branch lengths of the last three clusters towards their common centre.
    fn join_final(&mut self) {
        let n = self.row_size();
        for x in 0..n {
            let y = (x + 1) % n;
            let z = (x + 2) % n;
            let w = 0.5 * (self.dists[[x, y]] + self.dists[[x, z]] - self.dists[[y, z]]);
            self.tree.node_mut(self.clusters[x]).weight = w;
        }
    }
}

/// Reconstruct an unrooted tree from a square distance matrix.
pub fn neighbor_joining(dists: Array2<f64>, labels: &[String]) -> Result<PackedTree> {
    NeighborJoining::new(dists, labels)?.run()
}

#[cfg(test)]
mod engine_tests {
    use super::*;
    use crate::distances::distance_matrix_with_index;
    use crate::distances::LabelIndex;
    use crate::utils::compute_least_squares_fit;
    use ndarray::arr2;
    use pretty_assertions::assert_eq;

    fn labels(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn four_taxa() -> Array2<f64> {
        arr2(&[
            [0.0, 5.0, 9.0, 9.0],
            [5.0, 0.0, 10.0, 10.0],
            [9.0, 10.0, 0.0, 8.0],
            [9.0, 10.0, 8.0, 0.0],
        ])
    }

    #[test]
    fn tie_goes_to_later_pair() {
        let tree = neighbor_joining(four_taxa(), &labels(&["A", "B", "C", "D"])).unwrap();
        assert!(!tree.is_rooted());
        // (B,A) and (D,C) both reach Q = -38; (D,C) is scanned later
        assert_eq!(tree.to_newick(0), "(A:2,B:3,(D:4,C:4):3);");
        let mut sorted = tree.clone();
        sorted.sort();
        assert_eq!(sorted.to_newick(0), "(A:2,B:3,(C:4,D:4):3);");
    }

    #[test]
    fn q_matrix_matches_hand_computation() {
        let mut nj = NeighborJoining::new(four_taxa(), &labels(&["A", "B", "C", "D"])).unwrap();
        nj.compute_r();
        assert_eq!(nj.r, vec![23.0, 25.0, 27.0, 27.0]);
        nj.compute_q().unwrap();
        assert_eq!(nj.q[[1, 0]], -38.0);
        assert_eq!(nj.q[[3, 2]], -38.0);
        assert_eq!(nj.q[[2, 0]], -32.0);
        assert_eq!(nj.find_pair(), (3, 2));

        nj.join_pair(3, 2);
        assert_eq!(nj.row_size(), 3);
        assert_eq!(
            nj.distances(),
            arr2(&[[0.0, 5.0, 5.0], [5.0, 0.0, 6.0], [5.0, 6.0, 0.0]])
        );
    }

    #[test]
    fn runs_are_deterministic() {
        let d = arr2(&[
            [0.0, 5.0, 12.0, 7.0, 3.0, 9.0],
            [5.0, 0.0, 8.0, 2.0, 14.0, 5.0],
            [12.0, 8.0, 0.0, 4.0, 9.0, 3.0],
            [7.0, 2.0, 4.0, 0.0, 11.0, 7.0],
            [3.0, 14.0, 9.0, 11.0, 0.0, 8.0],
            [9.0, 5.0, 3.0, 7.0, 8.0, 0.0],
        ]);
        let names = labels(&["a", "b", "c", "d", "e", "f"]);
        let first = neighbor_joining(d.clone(), &names).unwrap();
        for _ in 0..5 {
            assert_eq!(neighbor_joining(d.clone(), &names).unwrap(), first);
        }
        assert_eq!(first.leaf_count(), 6);
        assert_eq!(first.len(), 9);
    }

    #[test]
    fn additive_input_is_reproduced() {
        // ((a,b),(c,d),(e,f)) with unit branches
        let source = PackedTree::from_newick("((a:1,b:1):1,(c:1,d:1):1,(e:1,f:1):1);").unwrap();
        let index = LabelIndex::from_labels(["a", "b", "c", "d", "e", "f"]).unwrap();
        let input = distance_matrix_with_index(&source, &index).unwrap();

        let tree = neighbor_joining(input.clone(), index.labels()).unwrap();
        let output = distance_matrix_with_index(&tree, &index).unwrap();
        assert_eq!(compute_least_squares_fit(&input, &output), 100.0);

        let scenario = neighbor_joining(four_taxa(), &labels(&["A", "B", "C", "D"])).unwrap();
        let index = LabelIndex::from_labels(["A", "B", "C", "D"]).unwrap();
        let output = distance_matrix_with_index(&scenario, &index).unwrap();
        assert_eq!(output, four_taxa());
    }

    #[test]
    fn three_taxa_skip_the_loop() {
        let d = arr2(&[[0.0, 3.0, 4.0], [3.0, 0.0, 5.0], [4.0, 5.0, 0.0]]);
        let tree = neighbor_joining(d, &labels(&["x", "y", "z"])).unwrap();
        assert_eq!(tree.to_newick(0), "(x:1,y:2,z:3);");
    }

    #[test]
    fn from_flat_requires_square_length() {
        let err = NeighborJoining::from_flat(&[0.0, 1.0, 1.0, 0.0, 2.0], &labels(&["a", "b"]))
            .err()
            .unwrap();
        assert!(matches!(err, TreeError::DimensionMismatch { found: 5, .. }));

        let flat: Vec<f64> = four_taxa().iter().copied().collect();
        let tree = NeighborJoining::from_flat(&flat, &labels(&["A", "B", "C", "D"]))
            .unwrap()
            .run()
            .unwrap();
        assert_eq!(tree, neighbor_joining(four_taxa(), &labels(&["A", "B", "C", "D"])).unwrap());
    }

    fn five_taxa() -> Array2<f64> {
        arr2(&[
            [0.0, 5.0, 9.0, 9.0, 8.0],
            [5.0, 0.0, 10.0, 10.0, 9.0],
            [9.0, 10.0, 0.0, 8.0, 7.0],
            [9.0, 10.0, 8.0, 0.0, 3.0],
            [8.0, 9.0, 7.0, 3.0, 0.0],
        ])
    }

    #[test]
    fn negative_and_nan_distances_pass_through() {
        let names = labels(&["A", "B", "C", "D", "E"]);

        let mut negative = five_taxa();
        negative[[0, 1]] = -5.0;
        negative[[1, 0]] = -5.0;
        let tree = neighbor_joining(negative.clone(), &names).unwrap();
        assert_eq!(tree.leaf_count(), 5);
        assert!(tree.nodes().iter().all(|n| n.weight.is_finite()));

        let mut with_nan = negative;
        with_nan[[1, 3]] = f64::NAN;
        with_nan[[3, 1]] = f64::NAN;
        let tree = neighbor_joining(with_nan, &names).unwrap();
        assert_eq!(tree.leaf_count(), 5);
        assert_eq!(tree.len(), 7);
        assert!(tree.nodes().iter().any(|n| n.weight.is_nan()));
    }

    #[test]
    fn rejects_bad_shapes() {
        let err = NeighborJoining::new(four_taxa(), &labels(&["A", "B", "C"]))
            .err()
            .unwrap();
        assert!(matches!(err, TreeError::DimensionMismatch { expected: 4, found: 3, .. }));

        let err = NeighborJoining::new(Array2::zeros((3, 4)), &labels(&["A", "B", "C"]))
            .err()
            .unwrap();
        assert!(matches!(err, TreeError::DimensionMismatch { .. }));

        let err = NeighborJoining::new(Array2::zeros((2, 2)), &labels(&["A", "B"]))
            .err()
            .unwrap();
        assert!(matches!(err, TreeError::InvalidTreeState(_)));
    }
}
