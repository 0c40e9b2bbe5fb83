use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Deployment role of a node. Fixed at deployment time.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Role {
    /// Plain replica set, not part of a sharded cluster
    #[serde(rename = "replication")]
    Replication,
    /// Replica set holding one partition of a sharded cluster
    #[serde(rename = "shard")]
    Shard,
    /// Replica set holding sharded-cluster metadata
    #[serde(rename = "config-server")]
    ConfigServer,
    /// Stateless query router
    #[serde(rename = "mongos")]
    Router,
}

impl Role {
    /// Wire name used in integration metadata and configuration
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Replication => "replication",
            Role::Shard => "shard",
            Role::ConfigServer => "config-server",
            Role::Router => "mongos",
        }
    }

    /// Whether this role takes part in a sharded cluster
    pub fn is_sharding(&self) -> bool {
        matches!(self, Role::Shard | Role::ConfigServer)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown role name
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown role: {0}")]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "replication" => Ok(Role::Replication),
            "shard" => Ok(Role::Shard),
            "config-server" => Ok(Role::ConfigServer),
            "mongos" => Ok(Role::Router),
            other => Err(UnknownRole(other.to_string())),
        }
    }
}

/// The node this agent is running on
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    /// Address the node is reachable on, without port
    pub address: String,
    pub role: Role,
    /// Whether this node currently holds cluster leadership
    pub is_leader: bool,
}

impl Node {
    pub fn new(address: impl Into<String>, role: Role, is_leader: bool) -> Self {
        Self {
            address: address.into(),
            role,
            is_leader,
        }
    }
}
