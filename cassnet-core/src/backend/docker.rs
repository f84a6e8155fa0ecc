//! Docker exec backends.
//!
//! Runs `tc` and the load generator inside the cluster's containers through
//! the Docker API (bollard), the same way an operator would with
//! `docker exec`.

use async_trait::async_trait;
use bollard::container::LogOutput;
use bollard::exec::{CreateExecOptions, StartExecResults};
use bollard::Docker;
use cassnet_types::TargetNode;
use futures_util::StreamExt;
use std::collections::HashSet;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

use super::{FaultBackend, Termination, WorkloadBackend, WorkloadOutcome};
use crate::cancel::CancelSignal;
use crate::error::BackendError;
use crate::netem::{self, NetemConfig};

/// Installs `tc` when the image lacks it. Cassandra images are Debian based.
const ENSURE_TC: &str =
    "command -v tc >/dev/null 2>&1 || (apt-get update -qq && apt-get install -y -qq iproute2)";

/// Result of executing a command inside a container.
#[derive(Debug, Clone)]
pub struct ExecResult {
    /// Standard output.
    pub stdout: String,
    /// Standard error.
    pub stderr: String,
    /// Exit code (0 = success).
    pub exit_code: i64,
}

impl ExecResult {
    /// Returns true if the command succeeded (exit code 0).
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// How compose services map to container names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContainerNaming {
    /// Services set `container_name:`; the service name is the container name.
    Fixed,
    /// Compose default naming: `<project>-<service>-1`.
    Project(String),
}

impl ContainerNaming {
    /// Build the full container name for a service.
    pub fn container_name(&self, service: &str) -> String {
        match self {
            ContainerNaming::Fixed => service.to_string(),
            ContainerNaming::Project(project) => format!("{}-{}-1", project, service),
        }
    }
}

/// Docker exec helper shared by the fault and workload backends.
#[derive(Debug, Clone)]
pub struct DockerExec {
    docker: Docker,
    naming: ContainerNaming,
}

impl DockerExec {
    /// Connect to the local Docker daemon.
    pub fn connect(naming: ContainerNaming) -> Result<Self, BackendError> {
        let docker = Docker::connect_with_local_defaults()?;
        Ok(Self { docker, naming })
    }

    /// Container name for a compose service.
    pub fn container_name(&self, service: &str) -> String {
        self.naming.container_name(service)
    }

    async fn create(&self, service: &str, cmd: Vec<String>) -> Result<String, BackendError> {
        let container_name = self.container_name(service);
        let exec_options = CreateExecOptions {
            cmd: Some(cmd),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            ..Default::default()
        };
        let exec = self
            .docker
            .create_exec(&container_name, exec_options)
            .await?;
        Ok(exec.id)
    }

    /// Execute a command inside a service's container and return the result.
    pub async fn exec(&self, service: &str, cmd: Vec<String>) -> Result<ExecResult, BackendError> {
        tracing::debug!("docker exec {}: {}", service, cmd.join(" "));
        let exec_id = self.create(service, cmd).await?;

        let mut stdout = String::new();
        let mut stderr = String::new();

        if let StartExecResults::Attached { mut output, .. } =
            self.docker.start_exec(&exec_id, None).await?
        {
            while let Some(Ok(msg)) = output.next().await {
                match msg {
                    LogOutput::StdOut { message } => {
                        stdout.push_str(&String::from_utf8_lossy(&message));
                    }
                    LogOutput::StdErr { message } => {
                        stderr.push_str(&String::from_utf8_lossy(&message));
                    }
                    _ => {}
                }
            }
        }

        let inspect = self.docker.inspect_exec(&exec_id).await?;
        let exit_code = inspect.exit_code.unwrap_or(-1);

        Ok(ExecResult {
            stdout,
            stderr,
            exit_code,
        })
    }

    /// Execute a command, returning an error on non-zero exit.
    pub async fn exec_ok(&self, service: &str, cmd: Vec<String>) -> Result<ExecResult, BackendError> {
        let result = self.exec(service, cmd).await?;
        if !result.success() {
            return Err(BackendError::ExecFailed {
                target: service.to_string(),
                exit_code: result.exit_code,
                stderr: result.stderr.clone(),
            });
        }
        Ok(result)
    }
}

fn tc(args: Vec<String>) -> Vec<String> {
    let mut cmd = vec!["tc".to_string()];
    cmd.extend(args);
    cmd
}

fn sh(script: &str) -> Vec<String> {
    vec!["sh".into(), "-c".into(), script.into()]
}

/// Fault backend that runs `tc` inside each node's container.
#[derive(Debug)]
pub struct DockerFaultBackend {
    exec: DockerExec,
    prepared: Mutex<HashSet<String>>,
}

impl DockerFaultBackend {
    /// Create a backend on top of a connected exec helper.
    pub fn new(exec: DockerExec) -> Self {
        Self {
            exec,
            prepared: Mutex::new(HashSet::new()),
        }
    }
}

#[async_trait]
impl FaultBackend for DockerFaultBackend {
    async fn prepare(&self, node: &TargetNode) -> Result<(), BackendError> {
        if self.prepared.lock().unwrap().contains(node.name()) {
            return Ok(());
        }
        self.exec.exec_ok(node.name(), sh(ENSURE_TC)).await?;
        self.prepared.lock().unwrap().insert(node.name().to_string());
        Ok(())
    }

    async fn install(&self, node: &TargetNode, netem: &NetemConfig) -> Result<(), BackendError> {
        self.exec
            .exec_ok(node.name(), tc(netem.to_tc_replace_args()))
            .await?;
        Ok(())
    }

    async fn remove(&self, node: &TargetNode, interface: &str) -> Result<(), BackendError> {
        let config = NetemConfig::new().interface(interface);
        let result = self.exec.exec(node.name(), tc(config.to_tc_del_args())).await?;

        // Removing a qdisc that is not there is the idempotent no-op case.
        if result.success() || netem::is_absent_qdisc_error(&result.stderr) {
            return Ok(());
        }
        Err(BackendError::ExecFailed {
            target: node.name().to_string(),
            exit_code: result.exit_code,
            stderr: result.stderr,
        })
    }

    async fn show(&self, node: &TargetNode, interface: &str) -> Result<String, BackendError> {
        let config = NetemConfig::new().interface(interface);
        let result = self
            .exec
            .exec_ok(node.name(), tc(config.to_tc_show_args()))
            .await?;
        Ok(result.stdout)
    }
}

/// Workload backend that runs the load generator inside one container.
#[derive(Debug)]
pub struct DockerWorkloadBackend {
    exec: DockerExec,
    service: String,
    prepare_script: Option<String>,
}

impl DockerWorkloadBackend {
    /// Run workloads inside `service`'s container.
    pub fn new(exec: DockerExec, service: &str) -> Self {
        Self {
            exec,
            service: service.to_string(),
            prepare_script: None,
        }
    }

    /// Run `script` via `sh -c` in the container before the first workload.
    pub fn with_prepare_script(mut self, script: &str) -> Self {
        self.prepare_script = Some(script.to_string());
        self
    }
}

#[async_trait]
impl WorkloadBackend for DockerWorkloadBackend {
    async fn prepare(&self) -> Result<(), BackendError> {
        if let Some(script) = &self.prepare_script {
            self.exec.exec_ok(&self.service, sh(script)).await?;
        }
        Ok(())
    }

    async fn execute(
        &self,
        argv: &[String],
        deadline: Instant,
        cancel: &CancelSignal,
    ) -> Result<WorkloadOutcome, BackendError> {
        if argv.is_empty() {
            return Err(BackendError::EmptyCommand);
        }

        // The in-container `timeout` guarantees the process dies even when we
        // stop listening at the deadline. It must fire after the local deadline,
        // otherwise a hang surfaces as exit code 137 instead of a timeout.
        let remaining = deadline.saturating_duration_since(Instant::now());
        let mut cmd = vec![
            "timeout".to_string(),
            "-s".to_string(),
            "KILL".to_string(),
            container_kill_secs(remaining).to_string(),
        ];
        cmd.extend(argv.iter().cloned());

        tracing::debug!("docker exec {}: {}", self.service, cmd.join(" "));
        let exec_id = self.exec.create(&self.service, cmd).await?;

        let mut output = Vec::new();
        let mut termination = Termination::Exited;

        if let StartExecResults::Attached {
            output: mut stream, ..
        } = self.exec.docker.start_exec(&exec_id, None).await?
        {
            loop {
                tokio::select! {
                    msg = stream.next() => match msg {
                        Some(Ok(LogOutput::StdOut { message }))
                        | Some(Ok(LogOutput::StdErr { message })) => {
                            output.extend_from_slice(&message);
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            tracing::warn!("Workload stream error on {}: {}", self.service, e);
                            break;
                        }
                        None => break,
                    },
                    _ = tokio::time::sleep_until(deadline) => {
                        termination = Termination::DeadlineExceeded;
                        break;
                    }
                    _ = cancel.cancelled() => {
                        termination = Termination::Cancelled;
                        break;
                    }
                }
            }
        }

        if termination != Termination::Exited {
            // Best effort: the workload shares the container's PID namespace.
            let kill = sh(&format!("pkill -KILL -f {} || true", argv[0]));
            if let Err(e) = self.exec.exec(&self.service, kill).await {
                tracing::warn!("Failed to tear down workload in {}: {}", self.service, e);
            }
            return Ok(WorkloadOutcome {
                output,
                exit_code: None,
                termination,
            });
        }

        let inspect = self.exec.docker.inspect_exec(&exec_id).await?;
        Ok(WorkloadOutcome {
            output,
            exit_code: Some(inspect.exit_code.unwrap_or(-1)),
            termination,
        })
    }
}

/// Slack between the local deadline and the in-container kill.
const CONTAINER_KILL_MARGIN_SECS: u64 = 2;

/// Whole seconds for the in-container `timeout`, never before `remaining`.
fn container_kill_secs(remaining: Duration) -> u64 {
    let whole = remaining.as_secs() + u64::from(remaining.subsec_nanos() > 0);
    whole.max(1) + CONTAINER_KILL_MARGIN_SECS
}
