pub mod experiments;
pub mod expr;
pub mod io;
pub mod settings;

use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use roundsim_core::{
    Coordinator, GraphSpec, ProtocolKind, ReliabilityModel, SimError, SimResult,
    SimulationConfig, Topology,
};
use tracing::{error, info};

use crate::experiments::Experiment;
use crate::settings::Settings;

#[derive(Parser)]
#[command(name = "roundsim")]
#[command(about = "Round-synchronized simulator for distributed message-passing protocols")]
struct Cli {
    /// Optional TOML settings file
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one protocol over one topology
    Run(RunArgs),
    /// Run a size sweep, e.g. `extremaPropagation,2,20,2,5`
    Experiment {
        /// NAME,MIN,MAX,STEP,REPETITIONS
        details: String,
        /// Results directory (overrides the settings file)
        #[arg(long)]
        output_dir: Option<PathBuf>,
        /// Base seed; each run derives its own from it
        #[arg(long)]
        seed: Option<u64>,
    },
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Read the topology from a graph file
    #[arg(long)]
    graph_file: Option<PathBuf>,
    /// Generate the topology, e.g. `grid,4,5` or `regular,10,3`
    #[arg(long)]
    graph_type: Option<String>,
    /// `edge-remover`, `edge-remover-adder`, or empty for a static topology
    #[arg(long, default_value = "")]
    reliability_model: String,
    /// Edge probability expression over `n`, e.g. `log(n)/n`
    #[arg(short = 'p', long, default_value = "0.0")]
    probability: String,
    /// `hll` or `minPropagation`
    #[arg(long)]
    protocol: String,
    /// Save the post-run topology here
    #[arg(long)]
    graph_copy_file: Option<PathBuf>,
    /// Save statistics here
    #[arg(long)]
    stats_file: Option<PathBuf>,
    /// Seed for reproducible runs
    #[arg(long)]
    seed: Option<u64>,
}

enum GraphSource<'a> {
    File(&'a Path),
    Generated(GraphSpec),
}

/// Exactly one of `--graph-file` and `--graph-type` must be given.
fn graph_source(args: &RunArgs) -> SimResult<GraphSource<'_>> {
    match (&args.graph_file, &args.graph_type) {
        (Some(path), None) => Ok(GraphSource::File(path)),
        (None, Some(spec)) => Ok(GraphSource::Generated(spec.parse()?)),
        (Some(_), Some(_)) => Err(SimError::Configuration(
            "--graph-file and --graph-type are mutually exclusive".to_string(),
        )),
        (None, None) => Err(SimError::Configuration(
            "one of --graph-file or --graph-type is required".to_string(),
        )),
    }
}

fn load_topology(args: &RunArgs) -> Result<Topology> {
    let topology = match graph_source(args)? {
        GraphSource::File(path) => io::read_graph(path)?,
        GraphSource::Generated(spec) => {
            let p = expr::probability(&args.probability, spec.vertex_count()?)?;
            spec.build(p)?
        }
    };
    Ok(topology)
}

fn run(args: RunArgs, settings: &Settings) -> Result<()> {
    // Resolve every name before any topology work.
    let protocol: ProtocolKind = args.protocol.parse()?;
    let reliability_model = ReliabilityModel::parse_optional(&args.reliability_model)?;
    let topology = load_topology(&args)?;

    let config = SimulationConfig {
        reliability_model,
        seed: args.seed,
    };
    let mut coordinator = Coordinator::new(topology, config)?;
    let stats = coordinator.run_simulation(protocol)?;

    println!(
        "{protocol}: result={} rounds={} sent={} received={}",
        stats.result, stats.nof_rounds, stats.all_sent_msgs, stats.all_received_msgs
    );

    if let Some(path) = args.stats_file.or_else(|| settings.output.stats_file.clone()) {
        io::save_stats(&path, &stats)?;
        info!(path = %path.display(), "statistics saved");
    }
    if let Some(path) = args
        .graph_copy_file
        .or_else(|| settings.output.graph_copy_file.clone())
    {
        io::save_graph(&path, &coordinator.into_topology())?;
        info!(path = %path.display(), "graph copy saved");
    }
    Ok(())
}

fn experiment(
    details: &str,
    output_dir: Option<PathBuf>,
    seed: Option<u64>,
    settings: &Settings,
) -> Result<()> {
    let experiment: Experiment = details.parse()?;
    let dir = output_dir.unwrap_or_else(|| settings.output.experiments_dir.clone());
    info!(%experiment, dir = %dir.display(), "starting experiment");
    let written = experiment.run(&dir, seed)?;
    println!("{experiment}: {} result files in {}", written.len(), dir.display());
    Ok(())
}

fn init_logging(settings: &Settings) -> Result<()> {
    let builder = tracing_subscriber::fmt().with_max_level(settings.level()?);
    if settings.logging.json {
        tracing::subscriber::set_global_default(builder.json().finish())?;
    } else {
        tracing::subscriber::set_global_default(builder.finish())?;
    }
    Ok(())
}

fn main() {
    let cli = Cli::parse();

    let settings = match Settings::load(cli.settings.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("roundsim: {e:#}");
            std::process::exit(1);
        }
    };
    if let Err(e) = init_logging(&settings) {
        eprintln!("roundsim: {e:#}");
        std::process::exit(1);
    }

    let result = match cli.command {
        Commands::Run(args) => run(args, &settings),
        Commands::Experiment {
            details,
            output_dir,
            seed,
        } => experiment(&details, output_dir, seed, &settings),
    };

    if let Err(e) = result {
        error!(error = %format!("{e:#}"), "Fatal Error");
        std::process::exit(1);
    }
}
