//! Replica-set membership coordination
//!
//! Agents on different nodes never share a lock. Every mutation is a fresh
//! read-decide-write sequence and the write is conditioned on the config
//! version that was just read, so a concurrent writer turns our write into a
//! version conflict instead of a lost update. Retries always start over from
//! the read.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::client::{DatabaseClient, DatabaseError};
use crate::controller::context::NodeContext;
use crate::controller::error::{Error, ErrorClass, Result};
use crate::controller::outcome::Outcome;
use crate::model::{
    NodeHealthState, Reconfiguration, ReplicaSetMember, ReplicaSetStatus, host_of,
};

/// Refuse to reconfigure while any member (other than `excluding`) is still
/// syncing or is being removed.
pub fn check_structural_readiness(status: &ReplicaSetStatus, excluding: Option<&str>) -> Result<()> {
    let excluded_host = excluding.map(host_of);

    for (address, label) in status {
        if excluded_host == Some(host_of(address)) {
            continue;
        }
        match NodeHealthState::from_label(label) {
            Some(state) if state.is_syncing() => {
                return Err(Error::StructuralNotReady(format!(
                    "member {} is {}",
                    address, label
                )));
            }
            Some(NodeHealthState::Removed) => {
                return Err(Error::StructuralNotReady(format!(
                    "member {} is being removed",
                    address
                )));
            }
            _ => {}
        }
    }

    Ok(())
}

fn ensure_leader(ctx: &NodeContext) -> Result<()> {
    if ctx.is_leader() {
        Ok(())
    } else {
        Err(Error::NotLeader)
    }
}

fn is_primary(status: &ReplicaSetStatus, host: &str) -> bool {
    let host = host_of(host);
    status.iter().any(|(address, label)| {
        host_of(address) == host
            && NodeHealthState::from_label(label) == Some(NodeHealthState::Primary)
    })
}

/// Issues replica-set reconfigurations on behalf of the leader
pub struct MembershipCoordinator {
    client: Arc<dyn DatabaseClient>,
}

impl MembershipCoordinator {
    pub fn new(client: Arc<dyn DatabaseClient>) -> Self {
        Self { client }
    }

    /// Initialise the replica set with this node as its only member
    pub async fn bootstrap(&self, ctx: &NodeContext) -> Outcome {
        let result = self.try_bootstrap(ctx).await;
        self.finish(ctx, "bootstrap", ctx.address(), result)
    }

    async fn try_bootstrap(&self, ctx: &NodeContext) -> Result<()> {
        ensure_leader(ctx)?;

        match self.client.init_replica_set(ctx.address()).await {
            Ok(()) => {
                info!(address = %ctx.address(), "Initialised replica set");
                Ok(())
            }
            Err(DatabaseError::AlreadyInitialized) => {
                debug!(address = %ctx.address(), "Replica set already initialised");
                Ok(())
            }
            Err(e) => {
                error!(address = %ctx.address(), error = %e, "Cannot initialise replica set");
                Err(e.into())
            }
        }
    }

    /// Add `host` to the replica set.
    ///
    /// Completes without writing when the host is already a member, so a
    /// retried call never produces a second entry.
    pub async fn add_member(&self, ctx: &NodeContext, host: &str) -> Outcome {
        let result = self.try_add_member(ctx, host).await;
        self.finish(ctx, "add", host, result)
    }

    async fn try_add_member(&self, ctx: &NodeContext, host: &str) -> Result<()> {
        ensure_leader(ctx)?;

        let status = self.client.get_status().await?;
        check_structural_readiness(&status, None)?;

        let config = self.client.get_config().await?;
        if config.contains(host) {
            debug!(host, version = config.version, "Host already a replica set member");
            return Ok(());
        }

        let member = ReplicaSetMember::new(host_of(host), ctx.config.mongodb_port);
        let change = Reconfiguration::add(member, config.version);
        self.client.reconfigure(&change).await?;

        info!(
            host,
            version = config.version + 1,
            "Added member to replica set"
        );
        Ok(())
    }

    /// Remove `host` from the replica set.
    ///
    /// Transient failures are retried with the configured fixed backoff,
    /// re-reading state on every attempt. A replica set that is mid-change
    /// defers the removal to the next triggering event.
    pub async fn remove_member(&self, ctx: &NodeContext, host: &str) -> Outcome {
        let policy = &ctx.config.removal_retry;
        let max_attempts = policy.max_attempts();
        let mut attempt = 1;

        let result = loop {
            match self.try_remove_member(ctx, host).await {
                Ok(()) => break Ok(()),
                Err(e) if e.class() == ErrorClass::Transient && attempt < max_attempts => {
                    debug!(
                        host,
                        attempt,
                        max_attempts,
                        error = %e,
                        "Member removal not possible yet, retrying"
                    );
                    tokio::time::sleep(policy.delay).await;
                    attempt += 1;
                }
                Err(e) => break Err(e),
            }
        };

        self.finish(ctx, "remove", host, result)
    }

    async fn try_remove_member(&self, ctx: &NodeContext, host: &str) -> Result<()> {
        ensure_leader(ctx)?;

        let status = self.client.get_status().await?;
        check_structural_readiness(&status, Some(host))?;

        let config = self.client.get_config().await?;
        if !config.contains(host) {
            debug!(host, version = config.version, "Host not a replica set member");
            return Ok(());
        }

        // Hand over the primary role first so the set stays writable
        if is_primary(&status, host) {
            info!(host, "Stepping down primary before removal");
            self.client.step_down_primary().await?;
        }

        let change = Reconfiguration::remove(host_of(host), config.version);
        self.client.reconfigure(&change).await?;

        info!(
            host,
            version = config.version + 1,
            "Removed member from replica set"
        );
        Ok(())
    }

    /// Converge the live member list on `desired`, one reconfiguration at a
    /// time, stopping at the first operation that does not complete.
    pub async fn reconcile_members(&self, ctx: &NodeContext, desired: &BTreeSet<String>) -> Outcome {
        if let Err(e) = ensure_leader(ctx) {
            return Outcome::Fatal(e);
        }

        let config = match self.client.get_config().await {
            Ok(config) => config,
            Err(e) => return Outcome::from_result(Err(e.into())),
        };

        let desired: BTreeSet<&str> = desired.iter().map(|h| host_of(h)).collect();
        let current: BTreeSet<&str> = config.hosts().collect();

        let to_add: Vec<&str> = desired.difference(&current).copied().collect();
        let to_remove: Vec<&str> = current.difference(&desired).copied().collect();

        if to_add.is_empty() && to_remove.is_empty() {
            debug!(version = config.version, "Replica set members already converged");
            return Outcome::Done;
        }

        info!(?to_add, ?to_remove, "Reconciling replica set members");

        for host in to_add {
            let outcome = self.add_member(ctx, host).await;
            if !outcome.is_done() {
                return outcome;
            }
        }
        for host in to_remove {
            let outcome = self.remove_member(ctx, host).await;
            if !outcome.is_done() {
                return outcome;
            }
        }

        Outcome::Done
    }

    fn finish(&self, ctx: &NodeContext, operation: &str, host: &str, result: Result<()>) -> Outcome {
        let outcome = Outcome::from_result(result);

        match &outcome {
            Outcome::Done => {}
            Outcome::RetryLater(e) => {
                warn!(operation, host, error = %e, "Membership operation postponed");
            }
            Outcome::Fatal(e) => {
                error!(operation, host, error = %e, "Membership operation failed");
            }
        }

        if let Some(ref state) = ctx.health_state {
            state
                .metrics
                .record_membership_operation(operation, outcome.label());
        }

        outcome
    }
}
