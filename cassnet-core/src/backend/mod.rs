//! Capability interfaces for the two external collaborators.
//!
//! The controller and runner only ever talk to the cluster through these
//! traits:
//! - [`FaultBackend`] installs, removes and reads `tc netem` qdiscs on a node
//! - [`WorkloadBackend`] runs the load generator and captures its output
//!
//! Implementations: Docker exec ([`DockerFaultBackend`], [`DockerWorkloadBackend`]),
//! local processes ([`ProcessWorkloadBackend`]) and in-memory fakes for tests
//! ([`FakeFaultBackend`], [`FakeWorkloadBackend`]).

mod docker;
mod fake;
mod process;

pub use docker::{ContainerNaming, DockerExec, DockerFaultBackend, DockerWorkloadBackend, ExecResult};
pub use fake::{FakeFaultBackend, FakeWorkload, FakeWorkloadBackend, FaultEvent, FaultOp};
pub use process::ProcessWorkloadBackend;

use async_trait::async_trait;
use cassnet_types::TargetNode;
use tokio::time::Instant;

use crate::cancel::CancelSignal;
use crate::error::BackendError;
use crate::netem::NetemConfig;

/// Per-node network impairment control plane.
#[async_trait]
pub trait FaultBackend: Send + Sync {
    /// One-time per-node preparation (e.g. make sure `tc` exists).
    async fn prepare(&self, node: &TargetNode) -> Result<(), BackendError>;

    /// Install `netem` as the node's root qdisc, replacing whatever is there.
    async fn install(&self, node: &TargetNode, netem: &NetemConfig) -> Result<(), BackendError>;

    /// Remove the node's root qdisc. Removing an absent qdisc succeeds.
    async fn remove(&self, node: &TargetNode, interface: &str) -> Result<(), BackendError>;

    /// Raw `tc qdisc show dev <interface>` output for the node.
    async fn show(&self, node: &TargetNode, interface: &str) -> Result<String, BackendError>;
}

/// How a workload invocation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// The process exited on its own.
    Exited,
    /// The deadline passed and the process was torn down.
    DeadlineExceeded,
    /// Cancellation was requested and the process was torn down.
    Cancelled,
}

/// What a workload backend captured.
#[derive(Debug, Clone)]
pub struct WorkloadOutcome {
    /// Combined stdout/stderr, in arrival order.
    pub output: Vec<u8>,
    /// Exit code when the process exited on its own.
    pub exit_code: Option<i64>,
    /// How the invocation ended.
    pub termination: Termination,
}

/// Load generator execution.
#[async_trait]
pub trait WorkloadBackend: Send + Sync {
    /// One-time environment preparation before the first run.
    async fn prepare(&self) -> Result<(), BackendError>;

    /// Run `argv`, tearing it down at `deadline` or on `cancel`.
    ///
    /// Output captured up to teardown must be returned in the outcome rather
    /// than dropped.
    async fn execute(
        &self,
        argv: &[String],
        deadline: Instant,
        cancel: &CancelSignal,
    ) -> Result<WorkloadOutcome, BackendError>;
}

#[async_trait]
impl<T: FaultBackend + ?Sized> FaultBackend for Box<T> {
    async fn prepare(&self, node: &TargetNode) -> Result<(), BackendError> {
        (**self).prepare(node).await
    }

    async fn install(&self, node: &TargetNode, netem: &NetemConfig) -> Result<(), BackendError> {
        (**self).install(node, netem).await
    }

    async fn remove(&self, node: &TargetNode, interface: &str) -> Result<(), BackendError> {
        (**self).remove(node, interface).await
    }

    async fn show(&self, node: &TargetNode, interface: &str) -> Result<String, BackendError> {
        (**self).show(node, interface).await
    }
}

#[async_trait]
impl<T: WorkloadBackend + ?Sized> WorkloadBackend for Box<T> {
    async fn prepare(&self) -> Result<(), BackendError> {
        (**self).prepare().await
    }

    async fn execute(
        &self,
        argv: &[String],
        deadline: Instant,
        cancel: &CancelSignal,
    ) -> Result<WorkloadOutcome, BackendError> {
        (**self).execute(argv, deadline, cancel).await
    }
}
