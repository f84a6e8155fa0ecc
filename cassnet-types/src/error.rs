//! Validation errors for cassnet types.

use thiserror::Error;

/// Errors raised while building or parsing campaign types.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TypesError {
    /// Scenario label is empty, too long, or uses characters outside `[A-Za-z0-9_-]`.
    #[error("invalid scenario label {0:?}: expected 1-64 characters from [A-Za-z0-9_-]")]
    InvalidLabel(String),

    /// Node name is empty or contains characters a container name cannot hold.
    #[error("invalid node name {0:?}")]
    InvalidNode(String),

    /// Unknown fault kind.
    #[error("unknown fault kind {0:?} (expected loss, delay or none)")]
    UnknownKind(String),

    /// Magnitude could not be parsed for the given fault kind.
    #[error("invalid {kind} magnitude {magnitude:?}: {reason}")]
    InvalidMagnitude {
        /// Fault kind the magnitude was parsed for.
        kind: String,
        /// The offending magnitude string.
        magnitude: String,
        /// What was wrong with it.
        reason: String,
    },

    /// A loss or delay fault was requested with no target nodes.
    #[error("{0} fault requires at least one target node")]
    EmptyTargets(String),

    /// Scenario duration must be a positive number of seconds.
    #[error("scenario duration must be positive")]
    ZeroDuration,

    /// Unknown consistency level.
    #[error("unknown consistency level {0:?}")]
    UnknownConsistency(String),

    /// Unknown workload mode.
    #[error("unknown workload mode {0:?} (expected write, read or mixed)")]
    UnknownMode(String),

    /// A directory name or string is not a valid run identifier.
    #[error("invalid run id {0:?}")]
    InvalidRunId(String),

    /// Scenario state machine transition is not allowed.
    #[error("illegal scenario transition {from} -> {to}")]
    IllegalTransition {
        /// State the scenario was in.
        from: String,
        /// State that was requested.
        to: String,
    },
}
