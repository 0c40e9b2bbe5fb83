//! Role and integration compatibility rules
//!
//! Each policy inspects the node's role and its current integrations and
//! returns the violation it is responsible for, if any. Policies run in a
//! fixed order and the first violation wins, so the same input always yields
//! the same verdict.

use tracing::warn;

use crate::model::{Integration, IntegrationKind, Role, SignalSource, StatusSignal};

/// Why an integration set is not acceptable for a role
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopologyViolation {
    ClientLinkOnShardingRole,
    ShardingLinkOnReplication,
    MultipleConfigServers { count: usize },
    RouterWithoutConfigServer,
    BackupOnShard,
    ShardTlsWithoutConfigServerTls,
    ConfigServerTlsWithoutShardTls,
    CertificateAuthorityMismatch,
}

impl TopologyViolation {
    /// Stable identifier for metrics and logs
    pub fn reason(&self) -> &'static str {
        match self {
            TopologyViolation::ClientLinkOnShardingRole => "ClientLinkOnShardingRole",
            TopologyViolation::ShardingLinkOnReplication => "ShardingLinkOnReplication",
            TopologyViolation::MultipleConfigServers { .. } => "MultipleConfigServers",
            TopologyViolation::RouterWithoutConfigServer => "RouterWithoutConfigServer",
            TopologyViolation::BackupOnShard => "BackupOnShard",
            TopologyViolation::ShardTlsWithoutConfigServerTls
            | TopologyViolation::ConfigServerTlsWithoutShardTls => "TlsParity",
            TopologyViolation::CertificateAuthorityMismatch => "CertificateAuthorityMismatch",
        }
    }
}

impl std::fmt::Display for TopologyViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TopologyViolation::ClientLinkOnShardingRole => {
                write!(f, "sharding role incompatible with direct-client integration")
            }
            TopologyViolation::ShardingLinkOnReplication => {
                write!(f, "replica-set role cannot participate in sharding topology")
            }
            TopologyViolation::MultipleConfigServers { .. } => {
                write!(f, "shard has multiple config-server links")
            }
            TopologyViolation::RouterWithoutConfigServer => {
                write!(f, "router integration requires config-server role")
            }
            TopologyViolation::BackupOnShard => {
                write!(f, "backup integration requires config-server role")
            }
            TopologyViolation::ShardTlsWithoutConfigServerTls => {
                write!(f, "Shard has TLS enabled, but config-server does not.")
            }
            TopologyViolation::ConfigServerTlsWithoutShardTls => {
                write!(f, "Config-server has TLS enabled, but shard does not.")
            }
            TopologyViolation::CertificateAuthorityMismatch => {
                write!(f, "certificate authority mismatch between shard and config-server")
            }
        }
    }
}

/// Result of validating a role against its integrations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopologyVerdict {
    Ok,
    Violation(TopologyViolation),
}

impl TopologyVerdict {
    pub fn is_ok(&self) -> bool {
        matches!(self, TopologyVerdict::Ok)
    }

    pub fn to_signal(&self) -> StatusSignal {
        match self {
            TopologyVerdict::Ok => StatusSignal::active(SignalSource::Topology, ""),
            TopologyVerdict::Violation(v) => {
                StatusSignal::blocked(SignalSource::Topology, v.to_string())
            }
        }
    }
}

/// Inputs shared by every policy
pub struct TopologyContext<'a> {
    pub role: Role,
    pub integrations: &'a [Integration],
}

impl<'a> TopologyContext<'a> {
    pub fn new(role: Role, integrations: &'a [Integration]) -> Self {
        Self { role, integrations }
    }

    fn count(&self, kind: IntegrationKind) -> usize {
        self.integrations.iter().filter(|i| i.kind == kind).count()
    }

    fn has(&self, kind: IntegrationKind) -> bool {
        self.integrations.iter().any(|i| i.kind == kind)
    }

    /// Every (shard link, config-server link) combination
    fn shard_pairs(&self) -> impl Iterator<Item = (&'a Integration, &'a Integration)> + 'a {
        let integrations = self.integrations;
        integrations
            .iter()
            .filter(|i| i.kind == IntegrationKind::ShardLink)
            .flat_map(move |shard| {
                integrations
                    .iter()
                    .filter(|i| i.kind == IntegrationKind::ConfigServerLink)
                    .map(move |config_server| (shard, config_server))
            })
    }
}

type Policy = fn(&TopologyContext) -> Option<TopologyViolation>;

/// Policies in precedence order
const POLICIES: [Policy; 7] = [
    validate_client_link,
    validate_replication_isolation,
    validate_config_server_cardinality,
    validate_router_link,
    validate_backup_link,
    validate_tls_parity,
    validate_certificate_authority,
];

/// Rule: sharding roles are reached through a router, never by clients directly
fn validate_client_link(ctx: &TopologyContext) -> Option<TopologyViolation> {
    match ctx.role {
        Role::Shard | Role::ConfigServer if ctx.has(IntegrationKind::ClientLink) => {
            Some(TopologyViolation::ClientLinkOnShardingRole)
        }
        Role::Shard | Role::ConfigServer | Role::Replication | Role::Router => None,
    }
}

/// Rule: a plain replica set takes no part in sharding
fn validate_replication_isolation(ctx: &TopologyContext) -> Option<TopologyViolation> {
    match ctx.role {
        Role::Replication
            if ctx.has(IntegrationKind::ShardLink)
                || ctx.has(IntegrationKind::ConfigServerLink) =>
        {
            Some(TopologyViolation::ShardingLinkOnReplication)
        }
        Role::Replication | Role::Shard | Role::ConfigServer | Role::Router => None,
    }
}

/// Rule: a shard belongs to exactly one config-server.
///
/// Attachment is normally limited upstream; this catches the case anyway.
fn validate_config_server_cardinality(ctx: &TopologyContext) -> Option<TopologyViolation> {
    let count = ctx.count(IntegrationKind::ConfigServerLink);
    match ctx.role {
        Role::Shard if count > 1 => Some(TopologyViolation::MultipleConfigServers { count }),
        Role::Shard | Role::Replication | Role::ConfigServer | Role::Router => None,
    }
}

/// Rule: only a config-server serves routers
fn validate_router_link(ctx: &TopologyContext) -> Option<TopologyViolation> {
    if !ctx.has(IntegrationKind::RouterLink) {
        return None;
    }
    match ctx.role {
        Role::ConfigServer => None,
        Role::Replication | Role::Shard | Role::Router => {
            Some(TopologyViolation::RouterWithoutConfigServer)
        }
    }
}

/// Rule: cluster backups are driven from the config-server
fn validate_backup_link(ctx: &TopologyContext) -> Option<TopologyViolation> {
    match ctx.role {
        Role::Shard if ctx.has(IntegrationKind::BackupLink) => {
            Some(TopologyViolation::BackupOnShard)
        }
        Role::Shard | Role::Replication | Role::ConfigServer | Role::Router => None,
    }
}

/// Rule: both ends of every shard/config-server link agree on TLS.
///
/// Every pair is checked, so the verdict does not depend on the order in
/// which links were attached.
fn validate_tls_parity(ctx: &TopologyContext) -> Option<TopologyViolation> {
    let mismatch = |shard_tls: bool, config_server_tls: bool| {
        ctx.shard_pairs().any(|(shard, config_server)| {
            shard.tls_enabled == shard_tls && config_server.tls_enabled == config_server_tls
        })
    };

    if mismatch(true, false) {
        Some(TopologyViolation::ShardTlsWithoutConfigServerTls)
    } else if mismatch(false, true) {
        Some(TopologyViolation::ConfigServerTlsWithoutShardTls)
    } else {
        None
    }
}

/// Rule: with TLS on both ends, certificates come from the same CA.
///
/// A side whose CA is not known yet is not compared.
fn validate_certificate_authority(ctx: &TopologyContext) -> Option<TopologyViolation> {
    ctx.shard_pairs()
        .filter(|(shard, config_server)| shard.tls_enabled && config_server.tls_enabled)
        .any(|(shard, config_server)| {
            matches!(
                (&shard.ca_fingerprint, &config_server.ca_fingerprint),
                (Some(a), Some(b)) if a != b
            )
        })
        .then_some(TopologyViolation::CertificateAuthorityMismatch)
}

/// Validate `integrations` against `role`; the first violated rule wins
pub fn validate_topology(role: Role, integrations: &[Integration]) -> TopologyVerdict {
    let ctx = TopologyContext::new(role, integrations);

    for policy in POLICIES {
        if let Some(violation) = policy(&ctx) {
            warn!(
                role = %role,
                reason = violation.reason(),
                "Topology violation: {}",
                violation
            );
            return TopologyVerdict::Violation(violation);
        }
    }

    TopologyVerdict::Ok
}
