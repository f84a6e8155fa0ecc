//! # cluster-tests
//!
//! End-to-end campaign tests for cassnet.
//!
//! - [`harness`] wires whole campaigns over the in-memory fakes, or over a
//!   live Docker Compose cluster
//! - [`assertions`] checks recorded fault and workload timelines
//! - `scenarios` holds the tests themselves; live-cluster tests are
//!   `#[ignore = "requires docker"]`
//!
//! Run the live tests with `cargo test -p cluster-tests -- --ignored`.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod assertions;
pub mod harness;

#[cfg(test)]
mod scenarios;
