use clap::{Args, Parser, Subcommand};

use crate::tree::DEFAULT_PRECISION;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct ProgramArgs {
    #[command(subcommand)]
    pub subcommand: ProgramSubcommand,
    #[arg(
        short,
        long,
        default_value = "1",
        global = true,
        help = "Number of threads to use."
    )]
    pub threads: usize,
    #[arg(
        short,
        long,
        default_value = "false",
        conflicts_with = "quiet",
        global = true
    )]
    pub verbose: bool,
    #[arg(
        short,
        long,
        default_value = "false",
        conflicts_with = "verbose",
        global = true
    )]
    pub quiet: bool,
    #[arg(
        short = 'd',
        long,
        default_value = "output",
        global = true,
        help = "Output directory"
    )]
    pub output_directory: String,
}

#[derive(Subcommand, Debug)]
pub enum ProgramSubcommand {
    #[clap(
        name = "neighbor-joining",
        about = "Build a Neighbor-Joining tree from a distance matrix"
    )]
    NeighborJoining(NeighborJoiningArgs),
    #[clap(
        name = "distances",
        about = "Write the leaf-to-leaf distance matrix of a Newick tree"
    )]
    Distances(DistancesArgs),
}

#[derive(Args, Debug, Clone)]
pub struct NeighborJoiningArgs {
    /// Input distance matrix file path
    #[arg(short, long, help = "Input distance matrix file path", required = true)]
    pub input: String,
    #[arg(
        short,
        long,
        help = "Output prefix for result files",
        default_value = "output"
    )]
    pub output_prefix: String,
    #[arg(
        short = 'g',
        long,
        help = "Reroot the tree so that this leaf is the outgroup"
    )]
    pub outgroup: Option<String>,
    #[arg(
        short = 'p',
        long,
        help = "Decimal places for branch lengths in the Newick output",
        default_value_t = DEFAULT_PRECISION
    )]
    pub precision: usize,
    #[arg(
        short = 's',
        long,
        default_value = "false",
        help = "Put the tree in canonical (label-sorted) child order before writing"
    )]
    pub sort: bool,
}

impl NeighborJoiningArgs {
    pub fn default() -> Self {
        Self {
            input: String::new(),
            output_prefix: String::from("output"),
            outgroup: None,
            precision: DEFAULT_PRECISION,
            sort: false,
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct DistancesArgs {
    /// Newick tree file path
    #[arg(short, long, help = "Input Newick tree file path", required = true)]
    pub input: String,
    #[arg(
        short,
        long,
        help = "Output prefix for result files",
        default_value = "output"
    )]
    pub output_prefix: String,
}
