//! # cassnet-core
//!
//! Network-fault experiment campaigns against a Docker Compose Cassandra
//! cluster.
//!
//! Components, leaves first:
//! - [`FaultController`] - applies, verifies and revokes `tc netem` impairments
//! - [`ExperimentRunner`] - runs the load generator for a bounded duration
//! - [`RunRecorder`] - one collision-free directory per run
//! - [`Campaign`] - runs scenarios one at a time and survives their failures
//! - [`summarize`] - a bounded digest per recorded run
//!
//! The cluster is only reached through the [`FaultBackend`] and
//! [`WorkloadBackend`] traits, so everything above them runs against the
//! in-memory fakes in tests.
//!
//! ## Example
//!
//! ```no_run
//! use cassnet_core::{
//!     CancelSignal, Campaign, ExperimentRunner, FaultController, RunRecorder, Sweep,
//!     ProcessWorkloadBackend, FakeFaultBackend,
//! };
//! use cassnet_types::{TargetNode, WorkloadSpec};
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let peers: Vec<TargetNode> = vec!["cassandra2".parse()?, "cassandra3".parse()?];
//! let mut campaign = Campaign::new(
//!     FaultController::new(FakeFaultBackend::new()),
//!     ExperimentRunner::new(ProcessWorkloadBackend::new()),
//!     RunRecorder::new("runs"),
//!     WorkloadSpec::default(),
//!     vec!["cassandra1:seed".parse()?],
//! );
//! campaign.enqueue_all(Sweep::Loss.scenarios(&peers, 90)?)?;
//! let report = campaign.run(&CancelSignal::never()).await;
//! print!("{}", report.summary());
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod backend;
pub mod cancel;
pub mod cluster;
pub mod config;
pub mod controller;
pub mod error;
pub mod netem;
pub mod plan;
pub mod recorder;
pub mod reporter;
pub mod runner;
pub mod sequencer;

pub use backend::{
    ContainerNaming, DockerExec, DockerFaultBackend, DockerWorkloadBackend, FakeFaultBackend,
    FakeWorkload, FakeWorkloadBackend, FaultBackend, ProcessWorkloadBackend, WorkloadBackend,
};
pub use cancel::{cancel_pair, CancelHandle, CancelSignal};
pub use cluster::ClusterSession;
pub use config::{Config, ConfigError, WorkloadRunner};
pub use controller::{ActiveImpairment, FaultController, Scoped, DEFAULT_FAULT_OP_TIMEOUT};
pub use error::{BackendError, CampaignError, Result};
pub use netem::NetemConfig;
pub use plan::{load_plan, parse_plan, Sweep, TargetSelector};
pub use recorder::{RunEntry, RunMetadata, RunRecord, RunRecorder, RunStatus};
pub use reporter::{summarize, RunSummary, StressDigest, SummaryStatus, DEFAULT_TAIL_LINES};
pub use runner::{CapturedOutput, ExperimentRunner, DEFAULT_GRACE};
pub use sequencer::{Campaign, CampaignReport, ScenarioOutcome};
