//! Docker Compose cluster lifecycle.
//!
//! Brings the Cassandra cluster up and down with the `docker compose` CLI and
//! waits for every node to report `UN` (up, normal) in `nodetool status`.

use cassnet_types::TargetNode;
use std::path::PathBuf;
use std::time::Duration;

use crate::backend::{ContainerNaming, DockerExec};
use crate::config::{ClusterConfig, ConfigError};
use crate::error::BackendError;

/// How often readiness is polled.
const READY_POLL: Duration = Duration::from_secs(5);

/// A compose-managed Cassandra cluster.
#[derive(Debug, Clone)]
pub struct ClusterSession {
    compose_file: PathBuf,
    project: Option<String>,
    nodes: Vec<TargetNode>,
}

impl ClusterSession {
    /// Build a session from configuration.
    pub fn from_config(config: &ClusterConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            compose_file: config.compose_file.clone(),
            project: config.project.clone(),
            nodes: config.nodes()?,
        })
    }

    /// Cluster members.
    pub fn nodes(&self) -> &[TargetNode] {
        &self.nodes
    }

    /// The seed node, or the first node when none is marked seed.
    pub fn seed(&self) -> Option<&TargetNode> {
        self.nodes
            .iter()
            .find(|n| n.is_seed())
            .or_else(|| self.nodes.first())
    }

    /// How compose names this cluster's containers.
    pub fn naming(&self) -> ContainerNaming {
        match &self.project {
            Some(project) => ContainerNaming::Project(project.clone()),
            None => ContainerNaming::Fixed,
        }
    }

    /// Connect a Docker exec helper for this cluster.
    pub fn connect(&self) -> Result<DockerExec, BackendError> {
        DockerExec::connect(self.naming())
    }

    /// `docker compose` arguments for `action`.
    pub fn compose_args(&self, action: &[&str]) -> Vec<String> {
        let mut args = vec![
            "compose".to_string(),
            "-f".to_string(),
            self.compose_file.to_string_lossy().to_string(),
        ];
        if let Some(project) = &self.project {
            args.push("-p".to_string());
            args.push(project.clone());
        }
        args.extend(action.iter().map(|a| a.to_string()));
        args
    }

    async fn compose(&self, action: &[&str]) -> Result<(), BackendError> {
        let args = self.compose_args(action);
        tracing::info!("docker {}", args.join(" "));
        let output = tokio::process::Command::new("docker")
            .args(&args)
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(BackendError::Compose(format!(
                "docker compose {} failed: {}",
                action.join(" "),
                stderr.trim()
            )));
        }
        Ok(())
    }

    /// Start the cluster in the background.
    pub async fn up(&self) -> Result<(), BackendError> {
        self.compose(&["up", "-d"]).await
    }

    /// Stop the cluster, removing containers and volumes.
    pub async fn down(&self) -> Result<(), BackendError> {
        self.compose(&["down", "-v", "--remove-orphans"]).await
    }

    /// Poll `nodetool status` on the seed until every node is up and normal.
    pub async fn wait_ready(&self, exec: &DockerExec, timeout: Duration) -> Result<(), BackendError> {
        let seed = self
            .seed()
            .ok_or_else(|| BackendError::Compose("cluster has no nodes".into()))?;
        let expected = self.nodes.len();
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            let up = match exec
                .exec(seed.name(), vec!["nodetool".into(), "status".into()])
                .await
            {
                Ok(result) if result.success() => count_up_normal(&result.stdout),
                Ok(result) => {
                    tracing::debug!("nodetool not ready: {}", result.stderr.trim());
                    0
                }
                Err(e) => {
                    tracing::debug!("nodetool not reachable: {}", e);
                    0
                }
            };
            tracing::info!("{}/{} nodes up", up, expected);
            if up >= expected {
                return Ok(());
            }
            if tokio::time::Instant::now() + READY_POLL > deadline {
                return Err(BackendError::Compose(format!(
                    "only {}/{} nodes up after {:?}",
                    up, expected, timeout
                )));
            }
            tokio::time::sleep(READY_POLL).await;
        }
    }
}

/// Count `UN` rows in `nodetool status` output.
pub fn count_up_normal(status: &str) -> usize {
    status
        .lines()
        .filter(|line| line.split_whitespace().next() == Some("UN"))
        .count()
}
