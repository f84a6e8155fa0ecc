//! CLI command implementations.

pub mod campaign;
pub mod cluster;
pub mod fault;
pub mod scenario;
pub mod summarize;
