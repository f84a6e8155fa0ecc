//! # cassnet-types
//!
//! Data model for cassnet network-fault experiment campaigns.
//!
//! This crate provides the types shared by the controller and the CLI:
//! - [`TargetNode`], [`NodeRole`] - Cluster members addressable for faults and load
//! - [`FaultKind`], [`FaultSpec`], [`Impairment`] - What to inject and where
//! - [`Scenario`], [`ScenarioLabel`] - One step of a campaign
//! - [`WorkloadSpec`] - Load generator knobs
//! - [`RunId`] - Collision-free, sortable run identifiers
//! - [`ScenarioState`] - Per-scenario state machine
//! - [`TypesError`] - Validation errors

#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
mod fault;
mod node;
mod run;
mod scenario;
mod state;
mod workload;

pub use error::TypesError;
pub use fault::{FaultKind, FaultSpec, Impairment};
pub use node::{NodeRole, TargetNode};
pub use run::RunId;
pub use scenario::{Scenario, ScenarioLabel};
pub use state::ScenarioState;
pub use workload::{ConsistencyLevel, WorkloadMode, WorkloadSpec};
