//! Replica-set configuration and member health
//!
//! `ReplicaSetConfig` is versioned: every accepted reconfiguration bumps the
//! version by exactly one, and a change is only applied when the caller's
//! expected version matches the current one (compare-and-swap).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Default mongod port
pub const DEFAULT_MONGODB_PORT: u16 = 27017;

/// Live status report: member address (`host` or `host:port`) to mongod state label
pub type ReplicaSetStatus = BTreeMap<String, String>;

/// Strip the `:port` suffix mongod appends to member hosts.
///
/// IPv6 literals come either bracketed (`[fd00::1]:27017`) or bare
/// (`fd00::1`); a bare literal has no port to strip.
pub fn host_of(address: &str) -> &str {
    if let Some(rest) = address.strip_prefix('[') {
        return rest.split_once(']').map_or(rest, |(host, _)| host);
    }
    match address.rsplit_once(':') {
        Some((host, _)) if !host.contains(':') => host,
        _ => address,
    }
}

/// A single member entry in the replica-set config
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ReplicaSetMember {
    pub host: String,
    pub port: u16,
    #[serde(default = "default_votes")]
    pub votes: u8,
}

fn default_votes() -> u8 {
    1
}

impl ReplicaSetMember {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            votes: default_votes(),
        }
    }

    /// `host:port` form used as the member's unique key
    pub fn address(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

/// A requested change to the member list, conditioned on `expected_version`
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Reconfiguration {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub add: Option<ReplicaSetMember>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remove: Option<String>,
    pub expected_version: u64,
}

impl Reconfiguration {
    pub fn add(member: ReplicaSetMember, expected_version: u64) -> Self {
        Self {
            add: Some(member),
            remove: None,
            expected_version,
        }
    }

    pub fn remove(host: impl Into<String>, expected_version: u64) -> Self {
        Self {
            add: None,
            remove: Some(host.into()),
            expected_version,
        }
    }
}

/// Why a reconfiguration was not applied
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigChangeRejected {
    #[error("config version conflict: expected {expected}, found {actual}")]
    VersionMismatch { expected: u64, actual: u64 },

    #[error("member {0} is already part of the replica set")]
    MemberExists(String),

    #[error("member {0} is not part of the replica set")]
    MemberMissing(String),
}

/// Versioned replica-set member list
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ReplicaSetConfig {
    pub members: Vec<ReplicaSetMember>,
    pub version: u64,
}

impl ReplicaSetConfig {
    /// Initial config created at bootstrap with a single member
    pub fn initial(member: ReplicaSetMember) -> Self {
        Self {
            members: vec![member],
            version: 1,
        }
    }

    /// Check membership by host, ignoring the port
    pub fn contains(&self, host: &str) -> bool {
        let host = host_of(host);
        self.members.iter().any(|m| m.host == host)
    }

    /// Hosts currently in the config
    pub fn hosts(&self) -> impl Iterator<Item = &str> {
        self.members.iter().map(|m| m.host.as_str())
    }

    /// Apply a change as compare-and-swap on the version.
    ///
    /// Returns the new config with `version + 1`; `self` is never modified, so
    /// a rejected change leaves the version where it was.
    pub fn apply(&self, change: &Reconfiguration) -> Result<Self, ConfigChangeRejected> {
        if change.expected_version != self.version {
            return Err(ConfigChangeRejected::VersionMismatch {
                expected: change.expected_version,
                actual: self.version,
            });
        }

        let mut members = self.members.clone();

        if let Some(ref host) = change.remove {
            let before = members.len();
            let host = host_of(host);
            members.retain(|m| m.host != host);
            if members.len() == before {
                return Err(ConfigChangeRejected::MemberMissing(host.to_string()));
            }
        }

        if let Some(ref member) = change.add {
            if members
                .iter()
                .any(|m| m.host == member.host || m.address() == member.address())
            {
                return Err(ConfigChangeRejected::MemberExists(member.address()));
            }
            members.push(member.clone());
        }

        Ok(Self {
            members,
            version: self.version + 1,
        })
    }
}

/// Health of a member as derived from its mongod state label
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NodeHealthState {
    Startup,
    Startup2Syncing,
    Startup2Reusing,
    Recovering,
    Rollback,
    Secondary,
    Primary,
    Removed,
    Unknown,
    Unreachable,
}

impl NodeHealthState {
    /// Parse a mongod `stateStr`. Exact and case-sensitive; unrecognised
    /// labels yield `None`.
    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "STARTUP" => Some(Self::Startup),
            "STARTUP2" => Some(Self::Startup2Syncing),
            "STARTUP2_REUSING" => Some(Self::Startup2Reusing),
            "RECOVERING" => Some(Self::Recovering),
            "ROLLBACK" => Some(Self::Rollback),
            "SECONDARY" => Some(Self::Secondary),
            "PRIMARY" => Some(Self::Primary),
            "REMOVED" => Some(Self::Removed),
            "UNKNOWN" => Some(Self::Unknown),
            "DOWN" | "UNREACHABLE" => Some(Self::Unreachable),
            _ => None,
        }
    }

    /// Member is still catching up and cannot safely take part in a reconfigure
    pub fn is_syncing(&self) -> bool {
        matches!(
            self,
            Self::Startup
                | Self::Startup2Syncing
                | Self::Startup2Reusing
                | Self::Recovering
                | Self::Rollback
        )
    }

    /// Member is serving data normally
    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Primary | Self::Secondary)
    }
}

impl std::fmt::Display for NodeHealthState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Startup => "STARTUP",
            Self::Startup2Syncing => "STARTUP2",
            Self::Startup2Reusing => "STARTUP2_REUSING",
            Self::Recovering => "RECOVERING",
            Self::Rollback => "ROLLBACK",
            Self::Secondary => "SECONDARY",
            Self::Primary => "PRIMARY",
            Self::Removed => "REMOVED",
            Self::Unknown => "UNKNOWN",
            Self::Unreachable => "UNREACHABLE",
        };
        f.write_str(label)
    }
}
