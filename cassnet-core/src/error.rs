//! Error types for cassnet-core.

use std::path::PathBuf;
use std::time::Duration;

use cassnet_types::TypesError;

/// Errors raised by a fault or workload backend.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// Docker API error.
    #[error("docker error: {0}")]
    Docker(#[from] bollard::errors::Error),

    /// Command ran but exited non-zero.
    #[error("exec failed on {target}: exit={exit_code}, stderr={stderr}")]
    ExecFailed {
        /// Container or host the command ran on.
        target: String,
        /// Exit code from the command.
        exit_code: i64,
        /// Standard error output.
        stderr: String,
    },

    /// Process spawn or pipe error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// `docker compose` failed or the cluster never became ready.
    #[error("compose error: {0}")]
    Compose(String),

    /// Empty argv handed to a workload backend.
    #[error("empty workload command")]
    EmptyCommand,

    /// Failure injected by a fake backend.
    #[error("injected failure: {0}")]
    Injected(String),
}

/// Errors raised while running a scenario or a campaign.
///
/// Everything a scenario can fail with is caught at the sequencer boundary
/// and turned into an `ABORTED` scenario; only `abort_on_error` or a fault
/// that cannot be revoked lets one escape the campaign.
#[derive(Debug, thiserror::Error)]
pub enum CampaignError {
    /// Installing an impairment failed on a node.
    #[error("failed to apply fault on {node}: {source}")]
    FaultApply {
        /// Node the install failed on.
        node: String,
        /// Backend failure.
        #[source]
        source: BackendError,
    },

    /// The install returned success but read-back shows something else.
    #[error("fault on {node} not installed: expected {expected}, found {found}")]
    FaultNotVerified {
        /// Node that failed verification.
        node: String,
        /// Requested impairment.
        expected: String,
        /// Observed impairment.
        found: String,
    },

    /// Removing an impairment failed on a node (after one retry).
    #[error("failed to revoke fault on {node}: {source}")]
    FaultRevoke {
        /// Node the removal failed on.
        node: String,
        /// Backend failure.
        #[source]
        source: BackendError,
    },

    /// A control-plane call exceeded its ceiling.
    #[error("fault {operation} on {node} timed out after {timeout:?}")]
    FaultOperationTimeout {
        /// Node the call was issued to.
        node: String,
        /// `prepare`, `apply`, `revoke` or `read`.
        operation: &'static str,
        /// Ceiling that was exceeded.
        timeout: Duration,
    },

    /// Workload exceeded `duration + grace`.
    #[error("workload timed out after {ceiling:?}")]
    WorkloadTimeout {
        /// Ceiling that was exceeded.
        ceiling: Duration,
        /// Output captured before teardown.
        partial_output: Vec<u8>,
    },

    /// Workload could not start or exited unsuccessfully.
    #[error("workload failed: {detail}")]
    WorkloadExecution {
        /// What went wrong.
        detail: String,
        /// Exit code, if the workload ran to exit.
        exit_code: Option<i64>,
        /// Output captured before the failure.
        partial_output: Vec<u8>,
    },

    /// Workload torn down by an external abort.
    #[error("workload cancelled")]
    WorkloadCancelled {
        /// Output captured before teardown.
        partial_output: Vec<u8>,
    },

    /// Writing the run record failed.
    #[error("failed to write run record {path}: {source}")]
    RecorderWrite {
        /// File or directory being written.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Scenario or fault spec failed validation.
    #[error("invalid scenario: {0}")]
    InvalidScenario(#[from] TypesError),

    /// Two scenarios in one campaign share a label.
    #[error("duplicate scenario label {0:?}")]
    DuplicateLabel(String),

    /// Backend failure outside apply/revoke (preparation, session setup).
    #[error("backend error: {0}")]
    Backend(#[from] BackendError),

    /// The campaign stopped before running every scenario.
    #[error("campaign halted: {0}")]
    Halted(String),
}

impl CampaignError {
    /// Output captured before a workload failure, if any.
    pub fn partial_output(&self) -> Option<&[u8]> {
        match self {
            CampaignError::WorkloadTimeout { partial_output, .. }
            | CampaignError::WorkloadExecution { partial_output, .. }
            | CampaignError::WorkloadCancelled { partial_output } => Some(partial_output),
            _ => None,
        }
    }

    /// Whether this error leaves a fault possibly installed on the cluster.
    pub fn is_revoke_failure(&self) -> bool {
        matches!(
            self,
            CampaignError::FaultRevoke { .. }
                | CampaignError::FaultOperationTimeout {
                    operation: "revoke",
                    ..
                }
        )
    }
}

/// Result type alias for campaign operations.
pub type Result<T> = std::result::Result<T, CampaignError>;
