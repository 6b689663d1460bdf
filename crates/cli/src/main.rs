//! Rolling Upgrade Planner CLI
//!
//! Plans upgrade batches for built-in testcases, generated fleets, snapshot
//! files or a live Kubernetes cluster.

mod cluster;
mod commands;
mod config;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use planner_lib::inventory::{FileSource, FixtureSource, RandomSource, SnapshotSource};
use planner_lib::planner::PlannerConfig;
use planner_lib::solver::{SearchLimits, SolverKind};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Rolling Upgrade Planner CLI
#[derive(Parser)]
#[command(name = "rup")]
#[command(author, version, about = "CLI for planning rolling upgrades under disruption budgets", long_about = None)]
pub struct Cli {
    /// Output format (defaults to the user config, then table)
    #[arg(long, short, global = true)]
    pub format: Option<output::OutputFormat>,

    /// Batch solver
    #[arg(long, global = true)]
    pub solver: Option<SolverKind>,

    /// Wall-clock budget for the whole plan, in milliseconds
    #[arg(long, global = true)]
    pub deadline_ms: Option<u64>,

    /// Maximum search steps per round
    #[arg(long, global = true)]
    pub max_steps: Option<u64>,

    /// Search the two top-level branches concurrently
    #[arg(long, global = true)]
    pub parallel: bool,

    /// Enable verbose output
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Plan a built-in testcase
    Testcase {
        /// Testcase index (0 is the reference fleet)
        index: usize,
    },

    /// Plan a randomly generated fleet
    Random {
        /// Number of machines
        machines: usize,

        /// Number of applications
        applications: usize,

        /// Generator seed (defaults to the current time)
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Plan a snapshot stored as JSON
    File {
        /// Path to the snapshot file
        path: PathBuf,
    },

    /// Plan the nodes of a Kubernetes cluster
    Cluster {
        /// Path to kubeconfig file (uses default if not specified)
        #[arg(long, env = "KUBECONFIG")]
        kubeconfig: Option<PathBuf>,

        /// Restrict pods and budgets to one namespace
        #[arg(long, short)]
        namespace: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(err) = run(cli).await {
        output::print_error(&format!("{:#}", err));
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    if cli.verbose {
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::new("debug"))
            .with_writer(std::io::stderr)
            .init();
    }

    let user_config = config::Config::load()?;
    let format = cli.format.or(user_config.format).unwrap_or_default();
    let planner_config = PlannerConfig {
        solver: cli.solver.or(user_config.solver).unwrap_or_default(),
        limits: SearchLimits {
            deadline_ms: cli.deadline_ms.or(user_config.deadline_ms),
            max_steps: cli.max_steps,
        },
        parallel: cli.parallel,
    };

    let source: Box<dyn SnapshotSource> = match cli.command {
        Commands::Testcase { index } => Box::new(FixtureSource::new(index)),
        Commands::Random {
            machines,
            applications,
            seed,
        } => {
            let seed = seed.unwrap_or_else(|| chrono::Utc::now().timestamp_millis() as u64);
            match format {
                output::OutputFormat::Table => {
                    output::print_info(&format!("Seed: {} (pass --seed to reproduce)", seed))
                }
                output::OutputFormat::Json => eprintln!("seed: {}", seed),
            }
            Box::new(RandomSource::new(machines, applications, seed))
        }
        Commands::File { path } => Box::new(FileSource::new(path)),
        Commands::Cluster {
            kubeconfig,
            namespace,
        } => Box::new(cluster::KubeSource::new(kubeconfig, namespace)),
    };

    commands::plan::run_plan(source.as_ref(), planner_config, format).await
}
