use anyhow::{anyhow, Context};
use clap::{crate_name, crate_version, Parser};

use fast_nj::{
    cli::{ProgramArgs, ProgramSubcommand},
    neighbor_joining::runner::{DistancesRunner, NeighborJoiningRunner},
    set_log_level,
};
use log::{error, info};

fn main() {
    let app = ProgramArgs::parse();

    set_log_level(&app, true, crate_name!(), crate_version!());

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(app.threads)
        .build_global()
        .context("configuring the rayon thread pool");
    if let Err(err) = pool {
        error!("{:#}", err);
        std::process::exit(1);
    }
    info!("Rayon threads: {}", rayon::current_num_threads());

    // Dispatch subcommands
    let result = match app.subcommand {
        ProgramSubcommand::NeighborJoining(args) => {
            NeighborJoiningRunner::new(app.output_directory, args).run()
        }
        ProgramSubcommand::Distances(args) => {
            DistancesRunner::new(app.output_directory, args).run()
        }

        #[allow(unreachable_patterns)]
        other => {
            error!("Subcommand not implemented: {:?}", other);
            Err(anyhow!("unsupported subcommand"))
        }
    };

    if let Err(err) = result {
        error!("{:#}", err);
        std::process::exit(1);
    }
}
