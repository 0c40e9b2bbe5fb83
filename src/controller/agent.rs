//! Per-node event handling
//!
//! The hosting platform delivers one event at a time. The agent routes it to
//! the right coordinator, then re-evaluates every signal from scratch and
//! reports the resulting status together with the operation outcome.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, instrument};

use crate::client::{BackupAgentProbe, DatabaseClient};
use crate::controller::backup_status::BackupMonitor;
use crate::controller::context::NodeContext;
use crate::controller::error::BackoffConfig;
use crate::controller::membership::MembershipCoordinator;
use crate::controller::outcome::{Outcome, Requeue, requeue_policy};
use crate::controller::status::{StatusInputs, node_health_signal, status_error_signal};
use crate::controller::topology::{TopologyVerdict, validate_topology};
use crate::controller::version_check::check_revisions;
use crate::model::{
    Integration, IntegrationKind, PrioritizedStatus, Role, SignalSource, StatusSignal,
};

/// Events delivered by the hosting platform
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentEvent {
    /// Leader elected for a fresh deployment
    Bootstrap,
    PeerJoined(String),
    PeerDeparted(String),
    IntegrationAttached(Integration),
    IntegrationChanged(Integration),
    /// Integration removed, by name
    IntegrationDetached(String),
    /// Periodic re-evaluation
    UpdateStatus,
}

impl AgentEvent {
    pub fn name(&self) -> &'static str {
        match self {
            AgentEvent::Bootstrap => "bootstrap",
            AgentEvent::PeerJoined(_) => "peer-joined",
            AgentEvent::PeerDeparted(_) => "peer-departed",
            AgentEvent::IntegrationAttached(_) => "integration-attached",
            AgentEvent::IntegrationChanged(_) => "integration-changed",
            AgentEvent::IntegrationDetached(_) => "integration-detached",
            AgentEvent::UpdateStatus => "update-status",
        }
    }
}

/// What happened while handling one event
#[derive(Debug)]
pub struct EventReport {
    pub outcome: Outcome,
    /// Status evaluated after the event was handled
    pub status: PrioritizedStatus,
}

impl EventReport {
    /// When the triggering event should be delivered again
    pub fn requeue(&self, backoff: &BackoffConfig, attempt: u32) -> Requeue {
        requeue_policy(&self.outcome, backoff, attempt)
    }
}

/// Coordinates a single node
pub struct NodeAgent {
    client: Arc<dyn DatabaseClient>,
    membership: MembershipCoordinator,
    backup: BackupMonitor,
    /// Attached integrations by name
    integrations: BTreeMap<String, Integration>,
    /// Deployment revision of this node, when known
    revision: Option<u64>,
}

impl NodeAgent {
    pub fn new(client: Arc<dyn DatabaseClient>, probe: Arc<dyn BackupAgentProbe>) -> Self {
        Self {
            membership: MembershipCoordinator::new(Arc::clone(&client)),
            client,
            backup: BackupMonitor::new(probe),
            integrations: BTreeMap::new(),
            revision: None,
        }
    }

    pub fn with_revision(mut self, revision: u64) -> Self {
        self.revision = Some(revision);
        self
    }

    pub fn integrations(&self) -> impl Iterator<Item = &Integration> {
        self.integrations.values()
    }

    fn integration_list(&self) -> Vec<Integration> {
        self.integrations.values().cloned().collect()
    }

    fn has_backup_link(&self) -> bool {
        self.integrations
            .values()
            .any(|i| i.kind == IntegrationKind::BackupLink)
    }

    /// Handle one event to completion and report the resulting status
    #[instrument(skip(self, ctx, event), fields(event = event.name(), address = %ctx.address()))]
    pub async fn handle(&mut self, ctx: &NodeContext, event: AgentEvent) -> EventReport {
        let started = Instant::now();
        let event_name = event.name();

        let outcome = self.dispatch(ctx, event).await;
        let status = self.evaluate(ctx, &outcome).await;

        if let Some(ref state) = ctx.health_state {
            state
                .metrics
                .record_event(event_name, started.elapsed().as_secs_f64());
        }

        info!(outcome = outcome.label(), status = %status, "Handled event");
        EventReport { outcome, status }
    }

    async fn dispatch(&mut self, ctx: &NodeContext, event: AgentEvent) -> Outcome {
        match event {
            AgentEvent::Bootstrap | AgentEvent::PeerJoined(_) | AgentEvent::PeerDeparted(_)
                if !ctx.is_leader() =>
            {
                debug!("Not the leader, ignoring membership event");
                Outcome::Done
            }
            AgentEvent::Bootstrap => self.membership.bootstrap(ctx).await,
            AgentEvent::PeerJoined(host) => self.membership.add_member(ctx, &host).await,
            AgentEvent::PeerDeparted(host) => self.membership.remove_member(ctx, &host).await,
            AgentEvent::IntegrationAttached(integration)
            | AgentEvent::IntegrationChanged(integration) => {
                self.upsert_integration(ctx, integration).await
            }
            AgentEvent::IntegrationDetached(name) => {
                if self.integrations.remove(&name).is_some() {
                    info!(integration = %name, "Integration detached");
                }
                Outcome::Done
            }
            AgentEvent::UpdateStatus => Outcome::Done,
        }
    }

    async fn upsert_integration(&mut self, ctx: &NodeContext, integration: Integration) -> Outcome {
        let is_backup = integration.kind == IntegrationKind::BackupLink;
        info!(
            integration = %integration.name,
            kind = %integration.kind,
            "Integration updated"
        );
        self.integrations
            .insert(integration.name.clone(), integration);

        // New storage settings make the backup agent resync; wait for it
        // unless the link is not allowed here in the first place
        if is_backup && validate_topology(ctx.role(), &self.integration_list()).is_ok() {
            let result = self.backup.verify_resync(&ctx.config.resync_retry).await;
            return Outcome::from_result(result.map(|state| {
                debug!(?state, "Backup agent ready");
            }));
        }

        Outcome::Done
    }

    /// Evaluate every signal afresh and reduce them to one status
    pub async fn evaluate(&self, ctx: &NodeContext, outcome: &Outcome) -> PrioritizedStatus {
        let integrations = self.integration_list();

        let node_health = match self.client.get_status().await {
            Ok(status) => node_health_signal(ctx.address(), &status),
            Err(e) => status_error_signal(&e),
        };

        let verdict = validate_topology(ctx.role(), &integrations);
        if let (TopologyVerdict::Violation(v), Some(state)) = (&verdict, &ctx.health_state) {
            state.metrics.record_topology_violation(v.reason());
        }

        let status = StatusInputs::new(node_health, verdict.to_signal())
            .with_operation(outcome.to_signal())
            .with_cross_cluster(self.cross_cluster_signal(ctx.role(), &integrations))
            .with_backup(self.backup_signal().await)
            .aggregate();

        if let Some(ref state) = ctx.health_state {
            state
                .metrics
                .record_evaluation(status.severity, status.source);
            state.set_ready(true).await;
        }

        status
    }

    fn cross_cluster_signal(&self, role: Role, integrations: &[Integration]) -> Option<StatusSignal> {
        let revision = self.revision?;
        match check_revisions(role, revision, integrations) {
            Ok(signal) => signal,
            Err(e) => Some(StatusSignal::waiting(SignalSource::CrossCluster, e.to_string())),
        }
    }

    async fn backup_signal(&self) -> Option<StatusSignal> {
        match self.backup.state(self.has_backup_link()).await {
            Ok(state) => state.to_signal(),
            Err(e) => Some(StatusSignal::blocked(SignalSource::Backup, e.to_string())),
        }
    }
}
