//! # cassnet
//!
//! Network-fault experiment campaigns against a Docker Compose Cassandra
//! cluster.
//!
//! ## Commands
//!
//! - `up` / `down`: Start or tear down the compose cluster
//! - `apply-fault`: Impose packet loss or delay on nodes
//! - `revoke-fault`: Remove any impairment from nodes
//! - `show-fault`: Show the impairment active on nodes
//! - `run-scenario`: Run one fault + workload scenario and record it
//! - `run-campaign`: Run a scenario list or a built-in sweep
//! - `summarize`: Print a digest of every recorded run
//!
//! ## Example
//!
//! ```bash
//! cassnet up
//! cassnet run-campaign --sweep loss --duration 90
//! cassnet summarize --lines 5
//! cassnet down
//! ```
//!
//! Exit status is 0 when every scenario is DONE, the number of ABORTED
//! scenarios (at most 255) otherwise, and 1 for configuration or usage
//! errors.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

mod commands;
mod context;

use commands::{campaign, cluster, fault, scenario, summarize};
use context::Context;

/// Network-fault experiment campaigns against a Cassandra cluster.
#[derive(Parser, Debug)]
#[command(name = "cassnet")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Configuration file (defaults to ./cassnet.toml when present)
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    /// Directory runs are recorded under (overrides campaign.storage_root)
    #[arg(long, global = true)]
    storage_root: Option<PathBuf>,

    /// Use in-memory fake backends instead of Docker (for testing/demo)
    #[arg(long, global = true)]
    fake: bool,

    /// More logging (-v debug, -vv trace). RUST_LOG takes precedence.
    #[arg(long, short, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the compose cluster and wait until every node is up
    Up {
        /// Return as soon as compose has started the containers
        #[arg(long)]
        no_wait: bool,
    },

    /// Stop the compose cluster and remove its volumes
    Down,

    /// Impose an impairment on nodes
    ApplyFault {
        /// loss, delay or none
        kind: String,

        /// Node list (`cassandra2,cassandra3`), `peers`, `all` or `random:K`
        targets: String,

        /// Percentage for loss (`10%`), duration for delay (`25ms`)
        #[arg(default_value = "")]
        magnitude: String,
    },

    /// Remove any impairment from nodes
    RevokeFault {
        /// Node list, `peers`, `all` or `random:K`
        #[arg(default_value = "all")]
        targets: String,
    },

    /// Show the impairment active on nodes
    ShowFault {
        /// Node list, `peers`, `all` or `random:K`
        #[arg(default_value = "all")]
        targets: String,
    },

    /// Run one scenario: apply, run the workload, record, revoke
    RunScenario {
        /// Scenario label, used in the run directory name
        label: String,

        /// loss, delay or none
        kind: String,

        /// Node list, `peers`, `all` or `random:K`
        targets: String,

        /// Percentage for loss, duration for delay
        #[arg(default_value = "")]
        magnitude: String,

        /// Workload duration in seconds
        #[arg(long, short)]
        duration: Option<u64>,
    },

    /// Run every scenario of a list or a built-in sweep
    RunCampaign {
        /// TOML scenario list
        #[arg(long, short, conflicts_with = "sweep", required_unless_present = "sweep")]
        file: Option<PathBuf>,

        /// Built-in sweep: loss or delay
        #[arg(long, short)]
        sweep: Option<String>,

        /// Sweep targets: node list, `peers`, `all` or `random:K`
        #[arg(long, default_value = "peers", requires = "sweep")]
        targets: String,

        /// Default workload duration in seconds
        #[arg(long, short)]
        duration: Option<u64>,

        /// Stop at the first aborted scenario
        #[arg(long)]
        abort_on_error: bool,
    },

    /// Print a digest of every recorded run, oldest first
    Summarize {
        /// Log lines shown per run
        #[arg(long, short)]
        lines: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() {
                ExitCode::from(1)
            } else {
                ExitCode::SUCCESS
            };
        }
    };
    init_tracing(cli.verbose);

    match dispatch(cli).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::from(1)
        }
    }
}

/// Run the chosen command and return the process exit status.
async fn dispatch(cli: Cli) -> Result<u8> {
    let ctx = Context::load(cli.config.as_deref(), cli.storage_root, cli.fake)?;

    match cli.command {
        Commands::Up { no_wait } => {
            cluster::up(&ctx, !no_wait).await?;
            Ok(0)
        }
        Commands::Down => {
            cluster::down(&ctx).await?;
            Ok(0)
        }
        Commands::ApplyFault {
            kind,
            targets,
            magnitude,
        } => {
            fault::apply(&ctx, &kind, &targets, &magnitude).await?;
            Ok(0)
        }
        Commands::RevokeFault { targets } => {
            fault::revoke(&ctx, &targets).await?;
            Ok(0)
        }
        Commands::ShowFault { targets } => {
            fault::show(&ctx, &targets).await?;
            Ok(0)
        }
        Commands::RunScenario {
            label,
            kind,
            targets,
            magnitude,
            duration,
        } => scenario::run(&ctx, &label, &kind, &targets, &magnitude, duration).await,
        Commands::RunCampaign {
            file,
            sweep,
            targets,
            duration,
            abort_on_error,
        } => {
            let source = match (file, sweep) {
                (Some(path), _) => campaign::Source::File(path),
                (None, Some(sweep)) => campaign::Source::Sweep(sweep.parse()?, targets),
                (None, None) => anyhow::bail!("Must specify either --file or --sweep"),
            };
            campaign::run(&ctx, source, duration, abort_on_error).await
        }
        Commands::Summarize { lines } => {
            summarize::run(&ctx, lines)?;
            Ok(0)
        }
    }
}

/// Log to stderr so stdout carries only the report.
fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
