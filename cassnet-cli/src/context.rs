//! Builds controllers, runners and campaigns from configuration.

use anyhow::{Context as _, Result};
use cassnet_core::{
    Campaign, ClusterSession, Config, DockerFaultBackend, DockerWorkloadBackend, ExperimentRunner,
    FakeFaultBackend, FakeWorkloadBackend, FaultBackend, FaultController, ProcessWorkloadBackend,
    RunRecorder, TargetSelector, WorkloadBackend, WorkloadRunner,
};
use cassnet_types::TargetNode;
use std::path::{Path, PathBuf};

/// Fault backend chosen at runtime.
pub type AnyFaultBackend = Box<dyn FaultBackend>;

/// Workload backend chosen at runtime.
pub type AnyWorkloadBackend = Box<dyn WorkloadBackend>;

/// Everything a command needs: configuration plus backend choice.
#[derive(Debug)]
pub struct Context {
    pub config: Config,
    pub session: ClusterSession,
    fake: bool,
}

impl Context {
    /// Load configuration and apply command-line overrides.
    pub fn load(path: Option<&Path>, storage_root: Option<PathBuf>, fake: bool) -> Result<Self> {
        let mut config = Config::load(path).context("Failed to load configuration")?;
        if let Some(root) = storage_root {
            config.campaign.storage_root = root;
        }
        let session = ClusterSession::from_config(&config.cluster)?;
        Ok(Self {
            config,
            session,
            fake,
        })
    }

    /// Whether the in-memory fakes stand in for Docker.
    pub fn is_fake(&self) -> bool {
        self.fake
    }

    /// Cluster members.
    pub fn nodes(&self) -> &[TargetNode] {
        self.session.nodes()
    }

    /// Resolve a target argument (`peers`, `all`, `random:K` or a node list).
    pub fn targets(&self, arg: &str) -> Result<Vec<TargetNode>> {
        let selector: TargetSelector = arg.parse()?;
        let targets = selector.resolve(self.nodes(), &mut rand::thread_rng())?;
        if targets.is_empty() {
            anyhow::bail!("Target {:?} selects no nodes", arg);
        }
        Ok(targets)
    }

    /// A fault controller over Docker exec, or the fake.
    pub fn controller(&self) -> Result<FaultController<AnyFaultBackend>> {
        let backend: AnyFaultBackend = if self.fake {
            Box::new(FakeFaultBackend::new())
        } else {
            let exec = self
                .session
                .connect()
                .context("Failed to connect to Docker")?;
            Box::new(DockerFaultBackend::new(exec))
        };
        Ok(FaultController::new(backend)
            .with_interface(&self.config.cluster.interface)
            .with_op_timeout(self.config.faults.op_timeout()))
    }

    /// A workload runner per `workload.runner`, or the fake.
    pub fn runner(&self) -> Result<ExperimentRunner<AnyWorkloadBackend>> {
        let workload = &self.config.workload;
        let backend: AnyWorkloadBackend = if self.fake {
            Box::new(FakeWorkloadBackend::new())
        } else {
            match workload.runner {
                WorkloadRunner::Docker => {
                    let exec = self
                        .session
                        .connect()
                        .context("Failed to connect to Docker")?;
                    let mut backend =
                        DockerWorkloadBackend::new(exec, &self.config.cluster.stress_service);
                    if let Some(script) = &workload.prepare_script {
                        backend = backend.with_prepare_script(script);
                    }
                    Box::new(backend)
                }
                WorkloadRunner::Local => {
                    let mut backend = ProcessWorkloadBackend::new();
                    if let Some(script) = &workload.prepare_script {
                        backend = backend.with_prepare_script(script);
                    }
                    Box::new(backend)
                }
            }
        };
        Ok(ExperimentRunner::new(backend).with_grace(workload.grace()))
    }

    /// Recorder rooted at `campaign.storage_root`.
    pub fn recorder(&self) -> RunRecorder {
        RunRecorder::new(&self.config.campaign.storage_root)
    }

    /// An empty campaign wired to this context's backends.
    pub fn campaign(
        &self,
        abort_on_error: bool,
    ) -> Result<Campaign<AnyFaultBackend, AnyWorkloadBackend>> {
        Ok(Campaign::new(
            self.controller()?,
            self.runner()?,
            self.recorder(),
            self.config.workload.to_spec(),
            self.nodes().to_vec(),
        )
        .abort_on_error(abort_on_error || self.config.campaign.abort_on_error))
    }

    /// Workload duration: the flag, else the configured default.
    pub fn duration(&self, flag: Option<u64>) -> Result<u64> {
        let secs = flag.unwrap_or(self.config.campaign.default_duration_secs);
        if secs == 0 {
            anyhow::bail!("Duration must be positive");
        }
        Ok(secs)
    }
}
