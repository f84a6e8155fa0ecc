//! Run-scenario command - one fault + workload run, recorded.

use anyhow::Result;
use cassnet_types::{FaultKind, FaultSpec, Scenario};

use super::campaign;
use crate::context::Context;

/// Run a single scenario. Returns the exit status.
pub async fn run(
    ctx: &Context,
    label: &str,
    kind: &str,
    targets: &str,
    magnitude: &str,
    duration: Option<u64>,
) -> Result<u8> {
    let kind: FaultKind = kind.parse()?;
    let fault = FaultSpec::new(kind, ctx.targets(targets)?, magnitude)?;
    let scenario = Scenario::new(label, fault, ctx.duration(duration)?)?;

    let mut campaign = ctx.campaign(false)?;
    campaign.enqueue(scenario)?;
    Ok(campaign::execute(&campaign).await)
}
