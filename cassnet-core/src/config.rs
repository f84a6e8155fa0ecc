//! Configuration loading for cassnet.
//!
//! Configuration is loaded from a TOML file (default: `cassnet.toml`).
//! Every section and field is optional.

use cassnet_types::{ConsistencyLevel, TargetNode, TypesError, WorkloadMode, WorkloadSpec};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration for cassnet.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Cluster configuration.
    #[serde(default)]
    pub cluster: ClusterConfig,
    /// Load generator configuration.
    #[serde(default)]
    pub workload: WorkloadConfig,
    /// Fault injection configuration.
    #[serde(default)]
    pub faults: FaultsConfig,
    /// Campaign configuration.
    #[serde(default)]
    pub campaign: CampaignConfig,
}

/// Which workload backend runs the load generator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkloadRunner {
    /// `docker exec` in the stress service's container.
    #[default]
    Docker,
    /// Local child process on this host.
    Local,
}

/// Cluster configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ClusterConfig {
    /// Compose file describing the cluster (default: docker-compose.cassandra.yml).
    #[serde(default = "default_compose_file")]
    pub compose_file: PathBuf,
    /// Compose project name. When set, containers are `<project>-<service>-1`;
    /// otherwise services are expected to set `container_name`.
    #[serde(default)]
    pub project: Option<String>,
    /// Cluster members as `name` or `name:seed` (default: cassandra1..3, first is seed).
    #[serde(default = "default_nodes")]
    pub nodes: Vec<String>,
    /// Interface impairments are installed on (default: eth0).
    #[serde(default = "default_interface")]
    pub interface: String,
    /// Service whose container runs the load generator (default: cassandra1).
    #[serde(default = "default_stress_service")]
    pub stress_service: String,
    /// Seconds to wait for `docker compose up` to finish (default: 300).
    #[serde(default = "default_up_timeout_secs")]
    pub up_timeout_secs: u64,
}

/// Load generator configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkloadConfig {
    /// Workload backend (default: docker).
    #[serde(default)]
    pub runner: WorkloadRunner,
    /// Load tool binary (default: cassandra-stress).
    #[serde(default = "default_command")]
    pub command: String,
    /// Operation mix (default: write).
    #[serde(default)]
    pub mode: WorkloadMode,
    /// Client threads (default: 50).
    #[serde(default = "default_threads")]
    pub threads: u32,
    /// Keyspace replication factor (default: 3).
    #[serde(default = "default_replication_factor")]
    pub replication_factor: u32,
    /// Consistency level (default: QUORUM).
    #[serde(default)]
    pub consistency: ConsistencyLevel,
    /// Extra arguments appended to every invocation.
    #[serde(default)]
    pub extra_args: Vec<String>,
    /// Seconds added to the duration before a run is killed (default: 30).
    #[serde(default = "default_grace_secs")]
    pub grace_secs: u64,
    /// Shell snippet run once before the first workload.
    #[serde(default = "default_prepare_script")]
    pub prepare_script: Option<String>,
}

/// Fault injection configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct FaultsConfig {
    /// Ceiling for a single fault backend call in seconds (default: 10).
    #[serde(default = "default_op_timeout_secs")]
    pub op_timeout_secs: u64,
}

/// Campaign configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct CampaignConfig {
    /// Run storage root (default: runs).
    #[serde(default = "default_storage_root")]
    pub storage_root: PathBuf,
    /// Scenario duration when none is given (default: 90).
    #[serde(default = "default_duration_secs")]
    pub default_duration_secs: u64,
    /// Stop the campaign at the first aborted scenario (default: false).
    #[serde(default)]
    pub abort_on_error: bool,
    /// Log lines printed per run by `summarize` (default: 10).
    #[serde(default = "default_summary_lines")]
    pub summary_lines: usize,
}

// Default value functions
fn default_compose_file() -> PathBuf {
    PathBuf::from("docker-compose.cassandra.yml")
}

fn default_nodes() -> Vec<String> {
    vec![
        "cassandra1:seed".to_string(),
        "cassandra2".to_string(),
        "cassandra3".to_string(),
    ]
}

fn default_interface() -> String {
    crate::netem::DEFAULT_INTERFACE.to_string()
}

fn default_stress_service() -> String {
    "cassandra1".to_string()
}

fn default_up_timeout_secs() -> u64 {
    300
}

fn default_command() -> String {
    "cassandra-stress".to_string()
}

fn default_threads() -> u32 {
    50
}

fn default_replication_factor() -> u32 {
    3
}

fn default_grace_secs() -> u64 {
    30
}

fn default_prepare_script() -> Option<String> {
    Some(
        "command -v cassandra-stress >/dev/null 2>&1 || \
         ln -sf /opt/cassandra/tools/bin/cassandra-stress /usr/local/bin/cassandra-stress"
            .to_string(),
    )
}

fn default_op_timeout_secs() -> u64 {
    10
}

fn default_storage_root() -> PathBuf {
    PathBuf::from("runs")
}

fn default_duration_secs() -> u64 {
    90
}

fn default_summary_lines() -> usize {
    10
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            compose_file: default_compose_file(),
            project: None,
            nodes: default_nodes(),
            interface: default_interface(),
            stress_service: default_stress_service(),
            up_timeout_secs: default_up_timeout_secs(),
        }
    }
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        Self {
            runner: WorkloadRunner::default(),
            command: default_command(),
            mode: WorkloadMode::default(),
            threads: default_threads(),
            replication_factor: default_replication_factor(),
            consistency: ConsistencyLevel::default(),
            extra_args: Vec::new(),
            grace_secs: default_grace_secs(),
            prepare_script: default_prepare_script(),
        }
    }
}

impl Default for FaultsConfig {
    fn default() -> Self {
        Self {
            op_timeout_secs: default_op_timeout_secs(),
        }
    }
}

impl Default for CampaignConfig {
    fn default() -> Self {
        Self {
            storage_root: default_storage_root(),
            default_duration_secs: default_duration_secs(),
            abort_on_error: false,
            summary_lines: default_summary_lines(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or names an
    /// invalid node.
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path` if given, else `cassnet.toml` if present, else defaults.
    pub fn load(path: Option<&std::path::Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::from_file(path),
            None => {
                let default = std::path::Path::new("cassnet.toml");
                if default.is_file() {
                    Self::from_file(default)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    /// Check cross-field constraints serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let nodes = self.cluster.nodes()?;
        if nodes.is_empty() {
            return Err(ConfigError::Invalid("cluster.nodes is empty".into()));
        }
        if self.campaign.default_duration_secs == 0 {
            return Err(ConfigError::Invalid(
                "campaign.default_duration_secs must be positive".into(),
            ));
        }
        if self.workload.threads == 0 {
            return Err(ConfigError::Invalid("workload.threads must be positive".into()));
        }
        Ok(())
    }
}

impl ClusterConfig {
    /// Parsed cluster members.
    pub fn nodes(&self) -> Result<Vec<TargetNode>, ConfigError> {
        self.nodes
            .iter()
            .map(|n| n.parse::<TargetNode>().map_err(ConfigError::from))
            .collect()
    }

    /// Non-seed members; faults default to these.
    pub fn peers(&self) -> Result<Vec<TargetNode>, ConfigError> {
        Ok(self.nodes()?.into_iter().filter(|n| !n.is_seed()).collect())
    }
}

impl WorkloadConfig {
    /// Invocation template for the load generator.
    pub fn to_spec(&self) -> WorkloadSpec {
        WorkloadSpec {
            command: self.command.clone(),
            mode: self.mode,
            threads: self.threads,
            replication_factor: self.replication_factor,
            consistency: self.consistency,
            extra_args: self.extra_args.clone(),
        }
    }

    /// Grace period as a duration.
    pub fn grace(&self) -> Duration {
        Duration::from_secs(self.grace_secs)
    }
}

impl FaultsConfig {
    /// Per-call ceiling as a duration.
    pub fn op_timeout(&self) -> Duration {
        Duration::from_secs(self.op_timeout_secs)
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Failed to parse configuration file.
    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying TOML parse error.
        source: toml::de::Error,
    },
    /// A value failed validation.
    #[error("invalid configuration: {0}")]
    Invalid(String),
    /// A node, scenario or fault failed validation.
    #[error(transparent)]
    Types(#[from] TypesError),
}
