//! Workload execution as a local child process.
//!
//! Uses `tokio::process::Command` with both pipes drained into one shared
//! buffer, so whatever the load tool printed before a kill is kept.

use async_trait::async_trait;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::time::Instant;

use super::{Termination, WorkloadBackend, WorkloadOutcome};
use crate::cancel::CancelSignal;
use crate::error::BackendError;

/// How long to keep draining pipes after the child is gone. Grandchildren
/// that inherited the pipes can keep them open indefinitely.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Runs the load generator on this host.
#[derive(Debug, Clone, Default)]
pub struct ProcessWorkloadBackend {
    /// Shell snippet run once through `sh -c` before the first workload.
    prepare_script: Option<String>,
}

impl ProcessWorkloadBackend {
    /// Create a backend with no preparation step.
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `script` via `sh -c` before the first workload.
    pub fn with_prepare_script(mut self, script: &str) -> Self {
        self.prepare_script = Some(script.to_string());
        self
    }
}

fn spawn_drain<R>(mut reader: R, sink: Arc<Mutex<Vec<u8>>>) -> tokio::task::JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut chunk = [0u8; 8192];
        loop {
            match reader.read(&mut chunk).await {
                Ok(0) | Err(_) => break,
                Ok(n) => sink.lock().unwrap().extend_from_slice(&chunk[..n]),
            }
        }
    })
}

#[async_trait]
impl WorkloadBackend for ProcessWorkloadBackend {
    async fn prepare(&self) -> Result<(), BackendError> {
        let Some(script) = &self.prepare_script else {
            return Ok(());
        };
        tracing::debug!("Preparing local workload environment: {}", script);

        let output = Command::new("sh").args(["-c", script]).output().await?;
        if !output.status.success() {
            return Err(BackendError::ExecFailed {
                target: "localhost".into(),
                exit_code: output.status.code().unwrap_or(-1) as i64,
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            });
        }
        Ok(())
    }

    async fn execute(
        &self,
        argv: &[String],
        deadline: Instant,
        cancel: &CancelSignal,
    ) -> Result<WorkloadOutcome, BackendError> {
        let (program, args) = argv.split_first().ok_or(BackendError::EmptyCommand)?;

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let sink = Arc::new(Mutex::new(Vec::new()));
        let mut drains = Vec::new();
        if let Some(stdout) = child.stdout.take() {
            drains.push(spawn_drain(stdout, sink.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            drains.push(spawn_drain(stderr, sink.clone()));
        }

        let exited = tokio::select! {
            status = child.wait() => Some(status?),
            _ = tokio::time::sleep_until(deadline) => None,
            _ = cancel.cancelled() => None,
        };

        let (termination, exit_code) = match exited {
            Some(status) => (Termination::Exited, Some(status.code().unwrap_or(-1) as i64)),
            None => {
                let termination = if cancel.is_cancelled() {
                    Termination::Cancelled
                } else {
                    Termination::DeadlineExceeded
                };
                tracing::warn!("Tearing down workload {} ({:?})", program, termination);
                if let Err(e) = child.kill().await {
                    tracing::warn!("Failed to kill workload {}: {}", program, e);
                }
                (termination, None)
            }
        };

        for drain in drains {
            let abort = drain.abort_handle();
            if tokio::time::timeout(DRAIN_TIMEOUT, drain).await.is_err() {
                abort.abort();
            }
        }

        let output = std::mem::take(&mut *sink.lock().unwrap());
        Ok(WorkloadOutcome {
            output,
            exit_code,
            termination,
        })
    }
}
