//! Experiment runner: one bounded load-generator run per call.

use cassnet_types::{TargetNode, WorkloadSpec};
use std::time::Duration;
use tokio::sync::OnceCell;
use tokio::time::Instant;

use crate::backend::{Termination, WorkloadBackend};
use crate::cancel::CancelSignal;
use crate::error::{CampaignError, Result};

/// Default slack on top of the requested duration before a run is killed.
pub const DEFAULT_GRACE: Duration = Duration::from_secs(30);

/// Output of a completed workload run.
#[derive(Debug, Clone)]
pub struct CapturedOutput {
    /// Combined stdout/stderr bytes, unmodified.
    pub bytes: Vec<u8>,
    /// The invocation that produced them.
    pub argv: Vec<String>,
    /// Wall-clock run time.
    pub elapsed: Duration,
}

/// Runs workloads through a [`WorkloadBackend`].
///
/// Environment preparation happens once, on the first run; a failed
/// preparation is retried on the next run.
#[derive(Debug)]
pub struct ExperimentRunner<W> {
    backend: W,
    grace: Duration,
    prepared: OnceCell<()>,
}

impl<W: WorkloadBackend> ExperimentRunner<W> {
    /// Create a runner with the default grace period.
    pub fn new(backend: W) -> Self {
        Self {
            backend,
            grace: DEFAULT_GRACE,
            prepared: OnceCell::new(),
        }
    }

    /// Set the grace period added to each run's duration.
    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// The underlying backend.
    pub fn backend(&self) -> &W {
        &self.backend
    }

    /// Run `workload` against `nodes` for `duration_secs`.
    ///
    /// Blocks for at most `duration + grace`. Failures carry whatever output
    /// was captured before the run ended.
    pub async fn run(
        &self,
        nodes: &[TargetNode],
        workload: &WorkloadSpec,
        duration_secs: u64,
        cancel: &CancelSignal,
    ) -> Result<CapturedOutput> {
        if cancel.is_cancelled() {
            return Err(CampaignError::WorkloadCancelled {
                partial_output: Vec::new(),
            });
        }

        self.prepared
            .get_or_try_init(|| async {
                tracing::info!("Preparing workload environment");
                self.backend.prepare().await
            })
            .await
            .map_err(|e| CampaignError::WorkloadExecution {
                detail: format!("environment preparation failed: {}", e),
                exit_code: None,
                partial_output: Vec::new(),
            })?;

        let argv = workload.to_args(nodes, duration_secs);
        let ceiling = Duration::from_secs(duration_secs) + self.grace;
        let started = Instant::now();
        tracing::info!("Running {} for {}s", workload.workload_name(), duration_secs);
        tracing::debug!("{}", argv.join(" "));

        let outcome = self
            .backend
            .execute(&argv, started + ceiling, cancel)
            .await
            .map_err(|e| CampaignError::WorkloadExecution {
                detail: format!("failed to start {}: {}", workload.command, e),
                exit_code: None,
                partial_output: Vec::new(),
            })?;
        let elapsed = started.elapsed();

        match (outcome.termination, outcome.exit_code) {
            (Termination::Exited, Some(0)) => {
                tracing::info!(
                    "Workload finished in {:.1}s ({} bytes captured)",
                    elapsed.as_secs_f64(),
                    outcome.output.len()
                );
                Ok(CapturedOutput {
                    bytes: outcome.output,
                    argv,
                    elapsed,
                })
            }
            (Termination::Exited, code) => Err(CampaignError::WorkloadExecution {
                detail: format!(
                    "{} exited with {}",
                    workload.command,
                    code.map_or_else(|| "unknown status".to_string(), |c| c.to_string())
                ),
                exit_code: code,
                partial_output: outcome.output,
            }),
            (Termination::DeadlineExceeded, _) => Err(CampaignError::WorkloadTimeout {
                ceiling,
                partial_output: outcome.output,
            }),
            (Termination::Cancelled, _) => Err(CampaignError::WorkloadCancelled {
                partial_output: outcome.output,
            }),
        }
    }
}
