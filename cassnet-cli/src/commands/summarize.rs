//! Summarize command - a bounded digest of every recorded run.

use anyhow::{Context as _, Result};
use cassnet_core::summarize;
use std::io::Write;

use crate::context::Context;

/// Print each run's header and the last `lines` lines of its log.
pub fn run(ctx: &Context, lines: Option<usize>) -> Result<()> {
    let root = &ctx.config.campaign.storage_root;
    let lines = lines.unwrap_or(ctx.config.campaign.summary_lines);
    let summaries = summarize(root, lines)
        .with_context(|| format!("Failed to list runs under {}", root.display()))?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let mut count = 0usize;
    for summary in summaries {
        writeln!(out, "{}", summary.header())?;
        out.write_all(&summary.tail)?;
        if !summary.tail.is_empty() && !summary.tail.ends_with(b"\n") {
            writeln!(out)?;
        }
        count += 1;
    }

    if count == 0 {
        writeln!(out, "No runs under {}", root.display())?;
    }
    Ok(())
}
