//! Deployment revision agreement across the sharded cluster
//!
//! Shards and their config-server must run the same revision. A shard that
//! falls behind is blocked until it is upgraded; a config-server simply waits
//! for its shards to catch up.

use tracing::warn;

use crate::controller::error::{Error, Result};
use crate::model::{Integration, Role, SignalSource, StatusSignal};

/// Compare `local_revision` with every sharding link.
///
/// Returns `None` when all revisions agree or the role has no sharding links
/// to compare against. A link that has not published its revision yet is
/// reported as [`Error::NoVersion`].
pub fn check_revisions(
    role: Role,
    local_revision: u64,
    integrations: &[Integration],
) -> Result<Option<StatusSignal>> {
    if !role.is_sharding() {
        return Ok(None);
    }

    let mut mismatched = None;
    for integration in integrations.iter().filter(|i| i.is_sharding_link()) {
        let remote = integration
            .revision
            .ok_or_else(|| Error::NoVersion(integration.name.clone()))?;

        if remote != local_revision && mismatched.is_none() {
            mismatched = Some((integration.name.as_str(), remote));
        }
    }

    let Some((name, remote)) = mismatched else {
        return Ok(None);
    };

    warn!(
        role = %role,
        integration = name,
        local_revision,
        remote_revision = remote,
        "Deployment revision mismatch"
    );

    let signal = match role {
        Role::Shard => StatusSignal::blocked(
            SignalSource::CrossCluster,
            format!("Charm revision ({local_revision}) is not up-to date with config-server."),
        ),
        Role::ConfigServer => StatusSignal::waiting(
            SignalSource::CrossCluster,
            format!("Waiting for shards to upgrade/downgrade to revision {local_revision}."),
        ),
        Role::Replication | Role::Router => return Ok(None),
    };
    Ok(Some(signal))
}
