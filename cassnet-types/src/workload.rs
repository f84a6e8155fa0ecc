//! Load generator knobs.
//!
//! The controller treats the load tool as opaque; these are the handful of
//! recognised knobs rendered into a `cassandra-stress` invocation.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{TargetNode, TypesError};

/// Cassandra consistency level passed as `cl=<level>`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConsistencyLevel {
    /// ANY
    Any,
    /// ONE
    One,
    /// TWO
    Two,
    /// THREE
    Three,
    /// QUORUM
    #[default]
    Quorum,
    /// ALL
    All,
    /// LOCAL_QUORUM
    LocalQuorum,
    /// EACH_QUORUM
    EachQuorum,
    /// LOCAL_ONE
    LocalOne,
}

impl ConsistencyLevel {
    /// Get the level as `cassandra-stress` spells it.
    pub fn as_str(&self) -> &'static str {
        match self {
            ConsistencyLevel::Any => "ANY",
            ConsistencyLevel::One => "ONE",
            ConsistencyLevel::Two => "TWO",
            ConsistencyLevel::Three => "THREE",
            ConsistencyLevel::Quorum => "QUORUM",
            ConsistencyLevel::All => "ALL",
            ConsistencyLevel::LocalQuorum => "LOCAL_QUORUM",
            ConsistencyLevel::EachQuorum => "EACH_QUORUM",
            ConsistencyLevel::LocalOne => "LOCAL_ONE",
        }
    }
}

impl fmt::Display for ConsistencyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConsistencyLevel {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "ANY" => Ok(ConsistencyLevel::Any),
            "ONE" => Ok(ConsistencyLevel::One),
            "TWO" => Ok(ConsistencyLevel::Two),
            "THREE" => Ok(ConsistencyLevel::Three),
            "QUORUM" => Ok(ConsistencyLevel::Quorum),
            "ALL" => Ok(ConsistencyLevel::All),
            "LOCAL_QUORUM" => Ok(ConsistencyLevel::LocalQuorum),
            "EACH_QUORUM" => Ok(ConsistencyLevel::EachQuorum),
            "LOCAL_ONE" => Ok(ConsistencyLevel::LocalOne),
            _ => Err(TypesError::UnknownConsistency(s.to_string())),
        }
    }
}

/// Operation mix for the load generator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkloadMode {
    /// Inserts only.
    #[default]
    Write,
    /// Reads only (expects a previously written keyspace).
    Read,
    /// 1:1 read/write mix.
    Mixed,
}

impl WorkloadMode {
    /// Get the mode name, also used in captured log file names.
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkloadMode::Write => "write",
            WorkloadMode::Read => "read",
            WorkloadMode::Mixed => "mixed",
        }
    }
}

impl fmt::Display for WorkloadMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkloadMode {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "write" => Ok(WorkloadMode::Write),
            "read" => Ok(WorkloadMode::Read),
            "mixed" => Ok(WorkloadMode::Mixed),
            _ => Err(TypesError::UnknownMode(s.to_string())),
        }
    }
}

/// Load generator invocation template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadSpec {
    /// Load tool binary.
    pub command: String,
    /// Operation mix.
    pub mode: WorkloadMode,
    /// Client thread count (`-rate threads=`).
    pub threads: u32,
    /// Keyspace replication factor (`-schema replication(factor=)`).
    pub replication_factor: u32,
    /// Consistency level (`cl=`).
    pub consistency: ConsistencyLevel,
    /// Extra arguments appended verbatim.
    pub extra_args: Vec<String>,
}

impl Default for WorkloadSpec {
    fn default() -> Self {
        Self {
            command: "cassandra-stress".into(),
            mode: WorkloadMode::Write,
            threads: 50,
            replication_factor: 3,
            consistency: ConsistencyLevel::Quorum,
            extra_args: Vec::new(),
        }
    }
}

impl WorkloadSpec {
    /// Name used for the captured log file (`<label>_<workload>.log`).
    pub fn workload_name(&self) -> &'static str {
        self.mode.as_str()
    }

    /// Build the full argv for a run of `duration_secs` against `nodes`.
    pub fn to_args(&self, nodes: &[TargetNode], duration_secs: u64) -> Vec<String> {
        let mut args = vec![self.command.clone(), self.mode.as_str().to_string()];
        if self.mode == WorkloadMode::Mixed {
            args.push("ratio(write=1,read=1)".into());
        }
        args.push(format!("duration={}s", duration_secs));
        args.push(format!("cl={}", self.consistency));
        args.push("-rate".into());
        args.push(format!("threads={}", self.threads));
        if !nodes.is_empty() {
            let names: Vec<&str> = nodes.iter().map(|n| n.name()).collect();
            args.push("-node".into());
            args.push(names.join(","));
        }
        args.push("-schema".into());
        args.push(format!("replication(factor={})", self.replication_factor));
        args.push("-log".into());
        args.push("interval=1".into());
        args.extend(self.extra_args.iter().cloned());
        args
    }
}
