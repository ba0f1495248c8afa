#![allow(clippy::doc_markdown)]
#![allow(clippy::uninlined_format_args)]
//! `fpclust` CLI - clustering of binary fingerprint collections
//!
//! Usage:
//!   `fpclust index --fingerprints fps.bin --fpsize 1024 --output fps.idx`
//!   `fpclust cluster --index fps.idx --fpsize 1024 --output tree.json`
//!   `fpclust cut --dendrogram tree.json --n-clusters 100 --output labels.csv`
//!   `fpclust run --fingerprints fps.bin --fpsize 1024 --max-size 50`

mod commands;
mod logging;
mod progress;

use clap::{Args, Parser, Subcommand, ValueEnum};
use fpclust_core::{CutPolicy, FpclustConfig, Linkage, Metric};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "fpclust")]
#[command(
    author,
    version,
    about = "fpclust - hierarchical clustering of binary fingerprints"
)]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file (defaults to ./fpclust.toml when present)
    #[arg(short, long, global = true, env = "FPCLUST_CONFIG")]
    config: Option<PathBuf>,

    /// Hide progress bars
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

/// CLI metric option
#[derive(Debug, Clone, Copy, ValueEnum)]
enum MetricArg {
    Angular,
    Tanimoto,
}

impl From<MetricArg> for Metric {
    fn from(m: MetricArg) -> Self {
        match m {
            MetricArg::Angular => Metric::Angular,
            MetricArg::Tanimoto => Metric::Tanimoto,
        }
    }
}

/// CLI linkage option
#[derive(Debug, Clone, Copy, ValueEnum)]
enum LinkageArg {
    Average,
    Single,
    Complete,
}

impl From<LinkageArg> for Linkage {
    fn from(l: LinkageArg) -> Self {
        match l {
            LinkageArg::Average => Linkage::Average,
            LinkageArg::Single => Linkage::Single,
            LinkageArg::Complete => Linkage::Complete,
        }
    }
}

/// Settings that override the configuration file.
#[derive(Args, Debug, Default)]
struct TuningArgs {
    /// Similarity metric
    #[arg(long, value_enum)]
    metric: Option<MetricArg>,

    /// Neighbors per item in the kNN graph
    #[arg(short, long)]
    k: Option<usize>,

    /// Worker threads for index and graph construction
    #[arg(short = 'j', long)]
    parallelism: Option<usize>,

    /// Linkage rule
    #[arg(long, value_enum)]
    linkage: Option<LinkageArg>,
}

impl TuningArgs {
    fn apply(&self, config: &mut FpclustConfig) {
        if let Some(metric) = self.metric {
            config.index.metric = metric.into();
        }
        if let Some(k) = self.k {
            config.graph.k = k;
        }
        if let Some(parallelism) = self.parallelism {
            config.index.parallelism = parallelism;
            config.graph.parallelism = parallelism;
        }
        if let Some(linkage) = self.linkage {
            config.cluster.linkage = linkage.into();
        }
    }
}

/// Exactly one way of flattening the dendrogram.
#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
struct PolicyArgs {
    /// Cut into exactly this many clusters
    #[arg(long)]
    n_clusters: Option<usize>,

    /// Keep merges up to this height (1 - similarity)
    #[arg(long)]
    threshold: Option<f64>,

    /// Split until no cluster has more items than this
    #[arg(long)]
    max_size: Option<usize>,
}

impl PolicyArgs {
    fn policy(&self) -> anyhow::Result<CutPolicy> {
        match (self.n_clusters, self.threshold, self.max_size) {
            (Some(k), None, None) => Ok(CutPolicy::Clusters(k)),
            (None, Some(t), None) => Ok(CutPolicy::Threshold(t)),
            (None, None, Some(m)) => Ok(CutPolicy::MaxSize(m)),
            _ => anyhow::bail!("Use exactly one of --n-clusters, --threshold, --max-size"),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Build the neighbor index over a fingerprint file
    Index {
        /// Flat fingerprint file
        #[arg(short, long)]
        fingerprints: PathBuf,

        /// Fingerprint length in bits
        #[arg(long)]
        fpsize: usize,

        /// Index file to write
        #[arg(short, long)]
        output: PathBuf,

        #[command(flatten)]
        tuning: TuningArgs,
    },

    /// Build the kNN graph from an index and cluster it into a dendrogram
    Cluster {
        /// Index file written by `fpclust index`
        #[arg(short, long)]
        index: PathBuf,

        /// Fingerprint length in bits
        #[arg(long)]
        fpsize: usize,

        /// Dendrogram JSON file to write
        #[arg(short, long)]
        output: PathBuf,

        #[command(flatten)]
        tuning: TuningArgs,
    },

    /// Flatten a dendrogram into cluster labels
    Cut {
        /// Dendrogram JSON file written by `fpclust cluster`
        #[arg(short, long)]
        dendrogram: PathBuf,

        #[command(flatten)]
        policy: PolicyArgs,

        /// Labels CSV to write (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Run every stage on a fingerprint file
    Run {
        /// Flat fingerprint file
        #[arg(short, long)]
        fingerprints: PathBuf,

        /// Fingerprint length in bits
        #[arg(long)]
        fpsize: usize,

        #[command(flatten)]
        policy: PolicyArgs,

        /// Labels CSV to write (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Also write the dendrogram JSON here
        #[arg(long)]
        dendrogram: Option<PathBuf>,

        #[command(flatten)]
        tuning: TuningArgs,
    },
}

fn load_config(
    path: Option<&PathBuf>,
    tuning: Option<&TuningArgs>,
) -> anyhow::Result<FpclustConfig> {
    let mut config = match path {
        Some(path) => FpclustConfig::load_from_path(path)?,
        None => FpclustConfig::load()?,
    };
    if let Some(tuning) = tuning {
        tuning.apply(&mut config);
    }
    config.validate()?;
    Ok(config)
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let tuning = match &cli.command {
        Commands::Index { tuning, .. }
        | Commands::Cluster { tuning, .. }
        | Commands::Run { tuning, .. } => Some(tuning),
        Commands::Cut { .. } => None,
    };
    let config = load_config(cli.config.as_ref(), tuning)?;
    logging::init(&config.logging);
    tracing::debug!(?config, "Configuration loaded");
    let show_progress = !cli.quiet;

    match cli.command {
        Commands::Index {
            fingerprints,
            fpsize,
            output,
            ..
        } => {
            let stats = commands::index(config, &fingerprints, fpsize, &output)?;
            eprintln!(
                "Indexed {} fingerprints into {} in {} ms",
                stats.items,
                output.display(),
                stats.duration_ms
            );
        }
        Commands::Cluster {
            index,
            fpsize,
            output,
            ..
        } => {
            let stats = commands::cluster(config, &index, fpsize, &output, show_progress)?;
            eprintln!(
                "Clustered {} items over {} edges into {} in {} ms",
                stats.items,
                stats.edges,
                output.display(),
                stats.duration_ms
            );
        }
        Commands::Cut {
            dendrogram,
            policy,
            output,
        } => {
            let stats = commands::cut(&dendrogram, policy.policy()?, output.as_deref())?;
            eprintln!(
                "{} items in {} clusters (largest: {})",
                stats.items, stats.clusters, stats.largest
            );
        }
        Commands::Run {
            fingerprints,
            fpsize,
            policy,
            output,
            dendrogram,
            ..
        } => {
            let stats = commands::run(
                config,
                &commands::RunPaths {
                    fingerprints: &fingerprints,
                    output: output.as_deref(),
                    dendrogram: dendrogram.as_deref(),
                },
                fpsize,
                policy.policy()?,
                show_progress,
            )?;
            eprintln!(
                "{} items in {} clusters (largest: {})",
                stats.items, stats.clusters, stats.largest
            );
        }
    }

    Ok(())
}
