use ndarray::Array2;
use rayon::prelude::*;

/// Compute the least-squares fit (%) of tree distances to the input distances.
/// - `distances`: symmetric n×n input matrix
/// - `tree_distances`: n×n leaf-to-leaf path lengths, same row order
///
/// Returns a percentage, at most 100:
///   100 * (1 - sum((t_ij - d_ij)^2) / sum(d_ij^2))  over i<j.
pub fn compute_least_squares_fit(distances: &Array2<f64>, tree_distances: &Array2<f64>) -> f32 {
    let n = distances.nrows();
    if n < 2 || distances.dim() != tree_distances.dim() {
        return 0.0;
    }

    // Sum over the upper triangle (i<j) in parallel
    let (sum_diff_sq, sum_d_sq) = (0..n - 1)
        .into_par_iter()
        .map(|i| {
            let mut diff_sum = 0.0;
            let mut d_sum = 0.0;
            for j in (i + 1)..n {
                let tij = tree_distances[[i, j]];
                let dij = distances[[i, j]];
                let diff = tij - dij;
                diff_sum += diff * diff;
                d_sum += dij * dij;
            }
            (diff_sum, d_sum)
        })
        .reduce(|| (0.0, 0.0), |a, b| (a.0 + b.0, a.1 + b.1));

    let fit = if sum_d_sq > 0.0 {
        100.0 * (1.0 - (sum_diff_sq / sum_d_sq))
    } else {
        0.0
    };

    fit as f32
}

#[cfg(test)]
mod lsq_tests {
    use super::*;
    use crate::distances::{distance_matrix_with_index, LabelIndex};
    use crate::neighbor_joining::neighbor_joining;
    use crate::tree::PackedTree;
    use ndarray::arr2;

    #[test]
    fn lsq_perfect_fit() {
        let tree =
            PackedTree::from_newick("((a:1,b:0.7):0.4,(c:2,d:0.3):1.1,(e:0.5,f:0.9):0.2);").unwrap();
        let (_, d) = tree.distance_matrix().unwrap();
        let fit = compute_least_squares_fit(&d, &d);
        assert!((fit - 100.0).abs() < 1e-6, "fit was {fit}");
    }

    #[test]
    fn lsq_imperfect_fit_with_noise() {
        let tree =
            PackedTree::from_newick("((a:1,b:0.7):0.4,(c:2,d:0.3):1.1,(e:0.5,f:0.9):0.2);").unwrap();
        let (_, t) = tree.distance_matrix().unwrap();
        let mut d = t.clone();
        let n = d.nrows();
        for i in 0..n {
            for j in (i + 1)..n {
                d[[i, j]] += 0.01 * ((i + j) as f64);
                d[[j, i]] = d[[i, j]];
            }
        }
        let fit = compute_least_squares_fit(&d, &t);
        assert!(fit < 100.0 && fit > 0.0, "fit should drop below 100, got {fit}");
    }

    #[test]
    fn degenerate_inputs_fit_zero() {
        let zeros = Array2::<f64>::zeros((3, 3));
        assert_eq!(compute_least_squares_fit(&zeros, &zeros), 0.0);
        let other = Array2::<f64>::zeros((4, 4));
        assert_eq!(compute_least_squares_fit(&zeros, &other), 0.0);
    }

    #[test]
    fn smoke_nj_on_non_additive_input() {
        let d = arr2(&[
            [0.0, 5.0, 12.0, 7.0, 3.0, 9.0, 11.0, 6.0, 4.0, 10.0],
            [5.0, 0.0, 8.0, 2.0, 14.0, 5.0, 13.0, 7.0, 12.0, 1.0],
            [12.0, 8.0, 0.0, 4.0, 9.0, 3.0, 8.0, 2.0, 5.0, 6.0],
            [7.0, 2.0, 4.0, 0.0, 11.0, 7.0, 10.0, 4.0, 6.0, 9.0],
            [3.0, 14.0, 9.0, 11.0, 0.0, 8.0, 1.0, 13.0, 2.0, 7.0],
            [9.0, 5.0, 3.0, 7.0, 8.0, 0.0, 12.0, 5.0, 3.0, 4.0],
            [11.0, 13.0, 8.0, 10.0, 1.0, 12.0, 0.0, 6.0, 2.0, 8.0],
            [6.0, 7.0, 2.0, 4.0, 13.0, 5.0, 6.0, 0.0, 9.0, 7.0],
            [4.0, 12.0, 5.0, 6.0, 2.0, 3.0, 2.0, 9.0, 0.0, 5.0],
            [10.0, 1.0, 6.0, 9.0, 7.0, 4.0, 8.0, 7.0, 5.0, 0.0],
        ]);
        let labels: Vec<String> = (1..=10).map(|i| format!("t{}", i)).collect();
        let index = LabelIndex::from_labels(labels.iter().cloned()).unwrap();
        let tree = neighbor_joining(d.clone(), &labels).unwrap();
        let t = distance_matrix_with_index(&tree, &index).unwrap();

        let fit = compute_least_squares_fit(&d, &t);
        assert!(fit.is_finite() && fit < 100.0, "fit was {fit}");
        assert_eq!(fit, compute_least_squares_fit(&d, &t));
    }
}
