//! Campaign harness over fakes or a live compose cluster.
//!
//! [`FakeCluster`] keeps clones of the fake backends so a test can script the
//! workload, inject control-plane failures and inspect the timeline after
//! the campaign ran. [`LiveCluster`] drives the real Docker Compose topology.

use cassnet_core::config::{ClusterConfig, WorkloadConfig};
use cassnet_core::{
    BackendError, Campaign, ClusterSession, DockerFaultBackend, DockerWorkloadBackend,
    ExperimentRunner, FakeFaultBackend, FakeWorkloadBackend, FaultController, RunRecorder,
};
use cassnet_types::{TargetNode, WorkloadSpec};
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;

/// How long the live cluster may take to come up.
pub const LIVE_UP_TIMEOUT: Duration = Duration::from_secs(300);

/// A three-node cluster simulated by the in-memory fakes.
#[derive(Debug)]
pub struct FakeCluster {
    /// Shared fault backend state.
    pub faults: FakeFaultBackend,
    /// Shared workload backend state.
    pub workload: FakeWorkloadBackend,
    nodes: Vec<TargetNode>,
    storage: TempDir,
    grace: Duration,
}

impl FakeCluster {
    /// `cassandra1` (seed), `cassandra2`, `cassandra3` with fresh storage.
    pub fn new() -> std::io::Result<Self> {
        let nodes = ClusterConfig::default()
            .nodes()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;
        Ok(Self {
            faults: FakeFaultBackend::new(),
            workload: FakeWorkloadBackend::new(),
            nodes,
            storage: TempDir::new()?,
            grace: Duration::from_secs(5),
        })
    }

    /// Grace period added to every workload duration.
    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// Every node.
    pub fn nodes(&self) -> &[TargetNode] {
        &self.nodes
    }

    /// Non-seed nodes.
    pub fn peers(&self) -> Vec<TargetNode> {
        self.nodes.iter().filter(|n| !n.is_seed()).cloned().collect()
    }

    /// Run storage root.
    pub fn storage(&self) -> &Path {
        self.storage.path()
    }

    /// An empty campaign over the shared fakes.
    pub fn campaign(&self) -> Campaign<FakeFaultBackend, FakeWorkloadBackend> {
        Campaign::new(
            FaultController::new(self.faults.clone()),
            ExperimentRunner::new(self.workload.clone()).with_grace(self.grace),
            RunRecorder::new(self.storage.path()),
            WorkloadSpec::default(),
            self.nodes.clone(),
        )
    }
}

/// The compose topology from `docker-compose.cassandra.yml`.
#[derive(Debug)]
pub struct LiveCluster {
    session: ClusterSession,
    storage: TempDir,
}

impl LiveCluster {
    /// Start the cluster and wait for every node to be up and normal.
    pub async fn start() -> Result<Self, BackendError> {
        let config = ClusterConfig {
            compose_file: Path::new(env!("CARGO_MANIFEST_DIR"))
                .join("../../docker-compose.cassandra.yml"),
            ..ClusterConfig::default()
        };
        let session = ClusterSession::from_config(&config)
            .map_err(|e| BackendError::Compose(e.to_string()))?;
        session.up().await?;
        let exec = session.connect()?;
        session.wait_ready(&exec, LIVE_UP_TIMEOUT).await?;
        Ok(Self {
            session,
            storage: TempDir::new()?,
        })
    }

    /// The compose session.
    pub fn session(&self) -> &ClusterSession {
        &self.session
    }

    /// Run storage root.
    pub fn storage(&self) -> &Path {
        self.storage.path()
    }

    /// A campaign over Docker exec, running `cassandra-stress` on the seed.
    pub fn campaign(&self) -> Result<Campaign<DockerFaultBackend, DockerWorkloadBackend>, BackendError> {
        let seed = self
            .session
            .seed()
            .ok_or_else(|| BackendError::Compose("cluster has no nodes".into()))?;
        let mut workload = DockerWorkloadBackend::new(self.session.connect()?, seed.name());
        if let Some(script) = &WorkloadConfig::default().prepare_script {
            workload = workload.with_prepare_script(script);
        }
        Ok(Campaign::new(
            FaultController::new(DockerFaultBackend::new(self.session.connect()?)),
            ExperimentRunner::new(workload),
            RunRecorder::new(self.storage.path()),
            WorkloadSpec::default(),
            self.session.nodes().to_vec(),
        ))
    }

    /// Tear the cluster down.
    pub async fn cleanup(self) -> Result<(), BackendError> {
        self.session.down().await
    }
}
