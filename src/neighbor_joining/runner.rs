use anyhow::{Context, Result};
use log::{debug, info};
use ndarray::Array2;
use serde::Serialize;
use std::{fs, path::Path, time::Instant};

use crate::cli::{DistancesArgs, NeighborJoiningArgs};
use crate::distances::{distance_matrix_with_index, LabelIndex};
use crate::neighbor_joining::engine::neighbor_joining;
use crate::neighbor_joining::matrix_io::{load_distance_matrix, write_distance_matrix, TableMeta};
use crate::newick::write_newick_to_path;
use crate::tree::PackedTree;
use crate::utils::compute_least_squares_fit;

pub struct NeighborJoiningRunner {
    out_dir: String,
    args: NeighborJoiningArgs,
}

impl NeighborJoiningRunner {
    pub fn new(out_dir: String, args: NeighborJoiningArgs) -> Self {
        NeighborJoiningRunner { out_dir, args }
    }

    pub fn run(&self) -> Result<()> {
        let t0 = Instant::now();

        // 1) Load distance matrix (+ labels + table meta)
        let (distance_matrix, labels, table_meta) =
            load_distance_matrix(&self.args.input).context("loading distance matrix")?;
        let n = distance_matrix.nrows();
        info!("Loaded distance matrix: {}x{}", n, n);

        // 2) Neighbor-Joining, then optional reroot + canonical order
        let t_nj = Instant::now();
        let tree = build_tree(distance_matrix.clone(), &labels, &self.args)?;
        let nj_sec = t_nj.elapsed().as_secs_f64();
        info!(
            "Built tree with {} leaves ({} nodes) in {:.3}s",
            tree.leaf_count(),
            tree.len(),
            nj_sec
        );

        // 3) Least-squares fit of tree distances against the input
        let t_fit = Instant::now();
        let index = LabelIndex::from_labels(labels.iter().cloned())?;
        let tree_distances = distance_matrix_with_index(&tree, &index)?;
        let fit = compute_least_squares_fit(&distance_matrix, &tree_distances);
        let fit_sec = t_fit.elapsed().as_secs_f64();
        info!("Least-squares fit: {:.4} % (computed in {:.3}s)", fit, fit_sec);

        // 4) Outputs
        let t_out = Instant::now();
        fs::create_dir_all(&self.out_dir).with_context(|| format!("creating {}", self.out_dir))?;
        let newick_path =
            Path::new(&self.out_dir).join(format!("{}.nwk", self.args.output_prefix));
        write_newick_to_path(&newick_path, &[&tree], self.args.precision)?;
        let output_sec = t_out.elapsed().as_secs_f64();
        info!("Outputs:");
        info!("  {}", newick_path.display());

        // 5) Run log
        let run_log_path = Path::new(&self.out_dir).join("run_log.json");
        let stats = RunLog {
            input: self.args.input.clone(),
            out_dir: self.out_dir.clone(),
            matrix: MatrixMeta {
                n,
                npairs: n * n.saturating_sub(1) / 2,
                table: table_meta.clone(),
            },
            tree: TreeMeta {
                num_leaves: tree.leaf_count(),
                num_nodes: tree.len(),
                rooted: tree.is_rooted(),
                outgroup: self.args.outgroup.clone(),
                sorted: self.args.sort,
                total_length: tree.nodes().iter().map(|n| n.weight).sum(),
            },
            fit_percent: fit,
            timings: RunTimings {
                load_sec: table_meta.load_sec,
                nj_sec,
                fit_sec,
                output_sec,
                total_sec: t0.elapsed().as_secs_f64(),
            },
            system: system_stats(),
        };
        fs::write(&run_log_path, serde_json::to_string_pretty(&stats)?)?;
        info!("Run log written: {}", run_log_path.display());

        info!("Done in {:.3}s total.", t0.elapsed().as_secs_f64());
        Ok(())
    }
}

/// Neighbor-Joining followed by the optional outgroup reroot and sort.
pub(crate) fn build_tree(
    dist: Array2<f64>,
    labels: &[String],
    args: &NeighborJoiningArgs,
) -> Result<PackedTree> {
    let mut tree = neighbor_joining(dist, labels).context("running neighbor joining")?;
    if let Some(outgroup) = &args.outgroup {
        tree.set_outgroup(outgroup)
            .with_context(|| format!("rerooting on outgroup '{}'", outgroup))?;
        debug!("Rerooted on {}", outgroup);
    }
    if args.sort {
        tree.sort();
    }
    Ok(tree)
}

/// Writes the leaf-to-leaf distances of a Newick tree as a labelled CSV.
pub struct DistancesRunner {
    out_dir: String,
    args: DistancesArgs,
}

impl DistancesRunner {
    pub fn new(out_dir: String, args: DistancesArgs) -> Self {
        DistancesRunner { out_dir, args }
    }

    pub fn run(&self) -> Result<()> {
        let t0 = Instant::now();
        let text = fs::read_to_string(&self.args.input)
            .with_context(|| format!("reading '{}'", self.args.input))?;
        let tree = PackedTree::from_newick(text.trim())
            .with_context(|| format!("parsing Newick tree in '{}'", self.args.input))?;
        info!("Loaded tree with {} leaves", tree.leaf_count());

        let (index, matrix) = tree.distance_matrix()?;
        fs::create_dir_all(&self.out_dir).with_context(|| format!("creating {}", self.out_dir))?;
        let csv_path =
            Path::new(&self.out_dir).join(format!("{}_distances.csv", self.args.output_prefix));
        write_distance_matrix(&csv_path, index.labels(), &matrix)?;
        info!("Outputs:");
        info!("  {}", csv_path.display());
        info!("Done in {:.3}s total.", t0.elapsed().as_secs_f64());
        Ok(())
    }
}

/* ───────────── metadata + logging structs ───────────── */

#[derive(Serialize)]
struct MatrixMeta {
    n: usize,
    npairs: usize,
    #[serde(flatten)]
    table: TableMeta,
}

#[derive(Serialize)]
struct TreeMeta {
    num_leaves: usize,
    num_nodes: usize,
    rooted: bool,
    outgroup: Option<String>,
    sorted: bool,
    total_length: f64,
}

#[derive(Serialize)]
struct RunTimings {
    load_sec: f64,
    nj_sec: f64,
    fit_sec: f64,
    output_sec: f64,
    total_sec: f64,
}

#[derive(Serialize)]
struct SystemStats {
    os: String,
    arch: String,
    num_cpus: usize,
    rayon_threads: usize,
    peak_rss_bytes: Option<u64>,
}

#[derive(Serialize)]
struct RunLog {
    input: String,
    out_dir: String,
    matrix: MatrixMeta,
    tree: TreeMeta,
    fit_percent: f32,
    timings: RunTimings,
    system: SystemStats,
}

/* ───────────── system / memory ───────────── */

fn system_stats() -> SystemStats {
    SystemStats {
        os: std::env::consts::OS.to_string(),
        arch: std::env::consts::ARCH.to_string(),
        num_cpus: num_cpus::get(),
        rayon_threads: rayon::current_num_threads(),
        peak_rss_bytes: peak_rss_bytes(),
    }
}

/// `VmHWM` from `/proc/self/status`, reported in kB.
#[cfg(target_os = "linux")]
fn peak_rss_bytes() -> Option<u64> {
    fs::read_to_string("/proc/self/status")
        .ok()?
        .lines()
        .find_map(|line| line.strip_prefix("VmHWM:"))
        .and_then(|rest| rest.split_whitespace().next())
        .and_then(|kb| kb.parse::<u64>().ok())
        .map(|kb| kb * 1024)
}

#[cfg(not(target_os = "linux"))]
fn peak_rss_bytes() -> Option<u64> {
    None
}

/* ───────────── tests ───────────── */

#[cfg(test)]
mod runner_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SCENARIO: &str = ",A,B,C,D\nA,0,5,9,9\nB,5,0,10,10\nC,9,10,0,8\nD,9,10,8,0\n";

    fn args_for(input: &Path) -> NeighborJoiningArgs {
        NeighborJoiningArgs {
            input: input.to_string_lossy().into_owned(),
            output_prefix: "tree".into(),
            ..NeighborJoiningArgs::default()
        }
    }

    #[test]
    fn writes_newick_and_run_log() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("dist.csv");
        fs::write(&input, SCENARIO).unwrap();
        let out_dir = dir.path().join("out");

        let mut args = args_for(&input);
        args.precision = 1;
        args.sort = true;
        NeighborJoiningRunner::new(out_dir.to_string_lossy().into_owned(), args)
            .run()
            .unwrap();

        let newick = fs::read_to_string(out_dir.join("tree.nwk")).unwrap();
        assert_eq!(newick, "(A:2.0,B:3.0,(C:4.0,D:4.0):3.0);\n");

        let log: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(out_dir.join("run_log.json")).unwrap())
                .unwrap();
        assert_eq!(log["matrix"]["n"], 4);
        assert_eq!(log["tree"]["rooted"], false);
        assert_eq!(log["fit_percent"], 100.0);
    }

    #[test]
    fn outgroup_reroots_before_writing() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("dist.csv");
        fs::write(&input, SCENARIO).unwrap();

        let mut args = args_for(&input);
        args.outgroup = Some("A".into());
        let (dist, labels, _) = load_distance_matrix(&args.input).unwrap();
        let tree = build_tree(dist, &labels, &args).unwrap();
        assert!(tree.is_rooted());
        assert_eq!(tree.unroot().len(), 2);
        assert_eq!(tree.node(tree.unroot()[0]).label, "A");

        args.outgroup = Some("Z".into());
        let err = NeighborJoiningRunner::new(dir.path().to_string_lossy().into_owned(), args)
            .run()
            .unwrap_err();
        assert!(format!("{:#}", err).contains("unknown label 'Z'"));
    }

    #[test]
    fn distances_subcommand_writes_labelled_csv() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("tree.nwk");
        fs::write(&input, "((A:1,B:2):3,C:4,D:5);\n").unwrap();
        let args = DistancesArgs {
            input: input.to_string_lossy().into_owned(),
            output_prefix: "t".into(),
        };
        DistancesRunner::new(dir.path().to_string_lossy().into_owned(), args)
            .run()
            .unwrap();

        let (mat, labels, meta) =
            load_distance_matrix(&dir.path().join("t_distances.csv").to_string_lossy()).unwrap();
        assert!(meta.has_header && meta.has_index);
        assert_eq!(labels, vec!["C", "D", "A", "B"]);
        assert_eq!(mat[[0, 1]], 9.0);
        assert_eq!(mat[[2, 3]], 3.0);
        assert_eq!(mat[[1, 3]], 10.0);
    }
}
