//! Fault commands - apply, revoke and show impairments by hand.

use anyhow::{Context as _, Result};
use cassnet_types::{FaultKind, FaultSpec};

use crate::context::Context;

/// Impose `kind`/`magnitude` on `targets`, verified by read-back.
pub async fn apply(ctx: &Context, kind: &str, targets: &str, magnitude: &str) -> Result<()> {
    let kind: FaultKind = kind.parse()?;
    let targets = ctx.targets(targets)?;
    let spec = FaultSpec::new(kind, targets, magnitude)?;

    let controller = ctx.controller()?;
    controller
        .apply(&spec)
        .await
        .with_context(|| format!("Failed to apply {}", spec))?;

    println!("Applied {}", spec);
    Ok(())
}

/// Remove any impairment from `targets`.
pub async fn revoke(ctx: &Context, targets: &str) -> Result<()> {
    let targets = ctx.targets(targets)?;
    let controller = ctx.controller()?;
    controller
        .revoke(&targets)
        .await
        .context("Failed to revoke impairments")?;

    let names: Vec<&str> = targets.iter().map(|n| n.name()).collect();
    println!("Revoked impairments on {}", names.join(", "));
    Ok(())
}

/// Print the impairment currently active on each of `targets`.
pub async fn show(ctx: &Context, targets: &str) -> Result<()> {
    let targets = ctx.targets(targets)?;
    let controller = ctx.controller()?;
    for node in &targets {
        let active = controller
            .read(node)
            .await
            .with_context(|| format!("Failed to read {}", node.name()))?;
        println!("{}", active);
    }
    Ok(())
}
