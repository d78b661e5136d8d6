pub mod distance_matrix;
pub mod label_index;

pub use distance_matrix::{
    ancestor_chain, distance_matrix, distance_matrix_with_index, pairwise_distance,
};
pub use label_index::LabelIndex;
