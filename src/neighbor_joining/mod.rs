pub mod engine;
pub mod matrix_io;
pub mod runner;

pub use engine::{neighbor_joining, NeighborJoining};
