//! Cluster members addressable for fault injection and load traffic.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::TypesError;

/// Role of a node in the Cassandra ring.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum NodeRole {
    /// Seed node (contact point for gossip bootstrap).
    Seed,
    /// Regular peer.
    #[default]
    Peer,
}

impl NodeRole {
    /// Get the role as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeRole::Seed => "seed",
            NodeRole::Peer => "peer",
        }
    }
}

impl fmt::Display for NodeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A cluster member, identified by its compose service / container name.
///
/// Ordering is by name first so a `BTreeSet<TargetNode>` iterates in a
/// stable, human-friendly order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TargetNode {
    name: String,
    #[serde(default)]
    role: NodeRole,
}

impl TargetNode {
    /// Create a node after validating its name.
    pub fn new(name: &str, role: NodeRole) -> Result<Self, TypesError> {
        let valid = !name.is_empty()
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
        if !valid {
            return Err(TypesError::InvalidNode(name.to_string()));
        }
        Ok(Self {
            name: name.to_string(),
            role,
        })
    }

    /// Node name (container / service name).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Node role.
    pub fn role(&self) -> NodeRole {
        self.role
    }

    /// Whether this node is a seed.
    pub fn is_seed(&self) -> bool {
        self.role == NodeRole::Seed
    }
}

impl fmt::Display for TargetNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Parses `name` or `name:seed` / `name:peer`.
impl FromStr for TargetNode {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            Some((name, "seed")) => Self::new(name, NodeRole::Seed),
            Some((name, "peer")) => Self::new(name, NodeRole::Peer),
            Some(_) => Err(TypesError::InvalidNode(s.to_string())),
            None => Self::new(s, NodeRole::Peer),
        }
    }
}
