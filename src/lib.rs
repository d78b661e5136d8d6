use std::{env, time::Instant};

use anyhow::{Context, Result};
use env_logger::Builder;
use log::{info, LevelFilter};
use ndarray::Array2;

use crate::{
    cli::{NeighborJoiningArgs, ProgramArgs},
    neighbor_joining::runner::build_tree,
    tree::PackedTree,
};

pub mod cli;
pub mod distances;
pub mod error;
pub mod neighbor_joining;
pub mod newick;
pub mod tree;
pub mod utils;

pub use error::TreeError;

pub fn set_log_level(matches: &ProgramArgs, is_last: bool, program_name: &str, version: &str) {
    let mut log_level = LevelFilter::Info;
    let mut specified = false;
    if matches.verbose {
        specified = true;
        log_level = LevelFilter::Debug;
    }
    if matches.quiet {
        specified = true;
        log_level = LevelFilter::Error;
    }
    if specified || is_last {
        let mut builder = Builder::new();
        builder.filter_level(log_level);
        if let Ok(filters) = env::var("RUST_LOG") {
            builder.parse_filters(&filters);
        }
        if builder.try_init().is_err() {
            panic!("Failed to set log level - has it been specified multiple times?")
        }
    }
    if is_last {
        info!("{} version {}", program_name, version);
    }
}

/// In-memory entry point: no files read or written.
///
/// - `dist`: square distance matrix (n x n)
/// - `labels`: length n
/// - `params`: outgroup and sort settings; `input`, `output_prefix` and
///   `precision` are ignored
pub fn run_neighbor_joining_from_memory(
    dist: Array2<f64>,
    labels: Vec<String>,
    params: NeighborJoiningArgs,
) -> Result<PackedTree> {
    let t0 = Instant::now();
    let tree = build_tree(dist, &labels, &params).context("Performing neighbor joining analysis")?;
    info!("Finished NeighborJoining in {:?}", t0.elapsed());
    Ok(tree)
}
