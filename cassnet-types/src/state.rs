//! Per-scenario state machine.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::TypesError;

/// Lifecycle of one scenario inside a campaign.
///
/// ```text
/// PENDING -> FAULT_APPLIED -> RUNNING -> RECORDING -> DONE
///     \            \             \           \
///      +------------+-------------+-----------+--> ABORTED
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScenarioState {
    /// Enqueued, nothing touched yet.
    Pending,
    /// Fault installed and verified on every target.
    FaultApplied,
    /// Workload executing.
    Running,
    /// Captured output being sealed into the run record.
    Recording,
    /// Completed successfully.
    Done,
    /// Terminated by an unrecoverable error or cancellation.
    Aborted,
}

impl ScenarioState {
    /// Get the state as the upper-case name used in reports.
    pub fn as_str(&self) -> &'static str {
        match self {
            ScenarioState::Pending => "PENDING",
            ScenarioState::FaultApplied => "FAULT_APPLIED",
            ScenarioState::Running => "RUNNING",
            ScenarioState::Recording => "RECORDING",
            ScenarioState::Done => "DONE",
            ScenarioState::Aborted => "ABORTED",
        }
    }

    /// `DONE` and `ABORTED` are terminal.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ScenarioState::Done | ScenarioState::Aborted)
    }

    /// Move to `next`, rejecting transitions the lifecycle does not allow.
    pub fn advance(self, next: ScenarioState) -> Result<ScenarioState, TypesError> {
        use ScenarioState::*;
        let allowed = match (self, next) {
            (Pending, FaultApplied)
            | (FaultApplied, Running)
            | (Running, Recording)
            | (Recording, Done) => true,
            (from, Aborted) => !from.is_terminal(),
            _ => false,
        };
        if allowed {
            Ok(next)
        } else {
            Err(TypesError::IllegalTransition {
                from: self.to_string(),
                to: next.to_string(),
            })
        }
    }
}

impl fmt::Display for ScenarioState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
