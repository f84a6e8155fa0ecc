//! Run-campaign command - a scenario list or a built-in sweep.

use anyhow::{Context as _, Result};
use cassnet_core::{cancel_pair, load_plan, Campaign, CampaignReport, FaultBackend, Sweep, WorkloadBackend};
use std::path::PathBuf;

use crate::context::Context;

/// Where the scenarios come from.
#[derive(Debug)]
pub enum Source {
    /// A TOML scenario list.
    File(PathBuf),
    /// A built-in sweep over the given targets.
    Sweep(Sweep, String),
}

/// Run every scenario of `source`. Returns the exit status.
pub async fn run(
    ctx: &Context,
    source: Source,
    duration: Option<u64>,
    abort_on_error: bool,
) -> Result<u8> {
    let duration = ctx.duration(duration)?;
    let scenarios = match source {
        Source::File(path) => load_plan(&path, ctx.nodes(), duration, &mut rand::thread_rng())
            .with_context(|| format!("Failed to load scenarios from {}", path.display()))?,
        Source::Sweep(sweep, targets) => {
            let targets = ctx.targets(&targets)?;
            sweep.scenarios(&targets, duration)?
        }
    };

    let mut campaign = ctx.campaign(abort_on_error)?;
    campaign.enqueue_all(scenarios)?;
    Ok(execute(&campaign).await)
}

/// Run `campaign` until done or Ctrl-C, print the report and return the exit
/// status.
pub async fn execute<B: FaultBackend, W: WorkloadBackend>(campaign: &Campaign<B, W>) -> u8 {
    let (handle, signal) = cancel_pair();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, aborting the current scenario");
            handle.cancel();
        }
    });

    let report = campaign.run(&signal).await;
    interrupt.abort();

    print_report(&report);
    u8::try_from(report.exit_code()).unwrap_or(u8::MAX)
}

fn print_report(report: &CampaignReport) {
    for outcome in &report.outcomes {
        println!("{}", outcome);
    }
    println!();
    print!("{}", report.summary());
}
