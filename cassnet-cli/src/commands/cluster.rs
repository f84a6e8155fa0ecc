//! Up and down commands - compose cluster lifecycle.

use anyhow::{Context as _, Result};
use std::time::Duration;

use crate::context::Context;

/// Start the cluster, optionally waiting for every node to be up.
pub async fn up(ctx: &Context, wait: bool) -> Result<()> {
    if ctx.is_fake() {
        println!("Fake backends: nothing to start");
        return Ok(());
    }

    ctx.session
        .up()
        .await
        .context("Failed to start the cluster")?;
    println!("Cluster started ({} nodes)", ctx.nodes().len());

    if wait {
        let exec = ctx.session.connect().context("Failed to connect to Docker")?;
        let timeout = Duration::from_secs(ctx.config.cluster.up_timeout_secs);
        ctx.session
            .wait_ready(&exec, timeout)
            .await
            .context("Cluster did not become ready")?;
        println!("All nodes up and normal");
    }
    Ok(())
}

/// Stop the cluster and remove its volumes.
pub async fn down(ctx: &Context) -> Result<()> {
    if ctx.is_fake() {
        println!("Fake backends: nothing to stop");
        return Ok(());
    }

    ctx.session
        .down()
        .await
        .context("Failed to stop the cluster")?;
    println!("Cluster stopped");
    Ok(())
}
