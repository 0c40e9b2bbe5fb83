use serde::{Deserialize, Serialize};

use super::Role;

/// Kind of external relationship attached to this node
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum IntegrationKind {
    ConfigServerLink,
    ShardLink,
    RouterLink,
    BackupLink,
    CertificateLink,
    ClientLink,
}

impl std::fmt::Display for IntegrationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IntegrationKind::ConfigServerLink => write!(f, "ConfigServerLink"),
            IntegrationKind::ShardLink => write!(f, "ShardLink"),
            IntegrationKind::RouterLink => write!(f, "RouterLink"),
            IntegrationKind::BackupLink => write!(f, "BackupLink"),
            IntegrationKind::CertificateLink => write!(f, "CertificateLink"),
            IntegrationKind::ClientLink => write!(f, "ClientLink"),
        }
    }
}

/// A declared relationship between this node and an external peer
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Integration {
    /// Remote application or relation name, unique per attached integration
    pub name: String,

    pub kind: IntegrationKind,

    /// Role declared by the remote side, when it has one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_role: Option<Role>,

    #[serde(default)]
    pub tls_enabled: bool,

    /// Fingerprint of the CA that signed the side's certificates
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca_fingerprint: Option<String>,

    /// Deployment revision published by the remote side
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<u64>,
}

impl Integration {
    pub fn new(name: impl Into<String>, kind: IntegrationKind) -> Self {
        Self {
            name: name.into(),
            kind,
            remote_role: None,
            tls_enabled: false,
            ca_fingerprint: None,
            revision: None,
        }
    }

    pub fn with_remote_role(mut self, role: Role) -> Self {
        self.remote_role = Some(role);
        self
    }

    pub fn with_tls(mut self, ca_fingerprint: Option<&str>) -> Self {
        self.tls_enabled = true;
        self.ca_fingerprint = ca_fingerprint.map(str::to_string);
        self
    }

    pub fn with_revision(mut self, revision: u64) -> Self {
        self.revision = Some(revision);
        self
    }

    /// Links that make up the shard/config-server topology
    pub fn is_sharding_link(&self) -> bool {
        matches!(
            self.kind,
            IntegrationKind::ShardLink | IntegrationKind::ConfigServerLink
        )
    }
}
