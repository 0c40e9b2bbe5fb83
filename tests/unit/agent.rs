//! Unit tests for end-to-end event handling in the node agent

use std::sync::Arc;

use mongodb_coordinator::client::DatabaseError;
use mongodb_coordinator::controller::{
    AgentEvent, BackoffConfig, Error, NodeAgent, NodeContext, Outcome, Requeue,
};
use mongodb_coordinator::health::{EvaluationLabels, HealthState};
use mongodb_coordinator::model::{IntegrationKind, Role, Severity, SignalSource};

use crate::common::*;

fn agent(db: &Arc<FakeDatabase>, probe: FakeProbe) -> NodeAgent {
    init_tracing();
    NodeAgent::new(db.clone(), Arc::new(probe))
}

fn primary_db() -> Arc<FakeDatabase> {
    Arc::new(FakeDatabase::with_members(&["10.0.0.1", "10.0.0.2"]))
}

mod membership_event_tests {
    use super::*;

    #[tokio::test]
    async fn test_update_status_on_primary() {
        let db = primary_db();
        let mut agent = agent(&db, FakeProbe::new(PBM_IDLE));
        let ctx = leader_context("10.0.0.1", Role::Replication);

        let report = agent.handle(&ctx, AgentEvent::UpdateStatus).await;

        assert!(report.outcome.is_done());
        assert_eq!(report.status.severity, Severity::Active);
        assert_eq!(report.status.message, "Primary");
        assert_eq!(report.requeue(&BackoffConfig::default(), 0), Requeue::Never);
    }

    #[tokio::test]
    async fn test_follower_ignores_membership_events() {
        let db = primary_db();
        let mut agent = agent(&db, FakeProbe::new(PBM_IDLE));
        let ctx = follower_context("10.0.0.2", Role::Replication);

        for event in [
            AgentEvent::Bootstrap,
            AgentEvent::PeerJoined("10.0.0.3".into()),
            AgentEvent::PeerDeparted("10.0.0.1".into()),
        ] {
            let report = agent.handle(&ctx, event).await;
            assert!(report.outcome.is_done());
        }
        assert_eq!(db.reconfigure_calls(), 0);
    }

    #[tokio::test]
    async fn test_leader_adds_joining_peer() {
        let db = primary_db();
        let mut agent = agent(&db, FakeProbe::new(PBM_IDLE));
        let ctx = leader_context("10.0.0.1", Role::Replication);

        let report = agent
            .handle(&ctx, AgentEvent::PeerJoined("10.0.0.3".into()))
            .await;

        assert!(report.outcome.is_done());
        assert!(db.config().contains("10.0.0.3"));
    }

    #[tokio::test]
    async fn test_joining_node_reports_being_added() {
        let db = primary_db();
        let mut agent = agent(&db, FakeProbe::new(PBM_IDLE));
        let ctx = follower_context("10.0.0.3", Role::Replication);

        let report = agent.handle(&ctx, AgentEvent::UpdateStatus).await;

        assert_eq!(report.status.severity, Severity::Waiting);
        assert_eq!(report.status.message, "Member being added.");
    }

    #[tokio::test]
    async fn test_structural_wait_deferred_to_next_event() {
        let db = primary_db();
        db.set_member_state("10.0.0.2", "STARTUP2");
        let mut agent = agent(&db, FakeProbe::new(PBM_IDLE));
        let ctx = leader_context("10.0.0.1", Role::Replication);

        let report = agent
            .handle(&ctx, AgentEvent::PeerJoined("10.0.0.3".into()))
            .await;

        assert!(matches!(
            report.outcome,
            Outcome::RetryLater(Error::StructuralNotReady(_))
        ));
        assert_eq!(report.status.severity, Severity::Waiting);
        assert_eq!(report.status.source, SignalSource::Operation);
        assert_eq!(
            report.requeue(&BackoffConfig::default(), 0),
            Requeue::OnNextEvent
        );
    }

    #[tokio::test]
    async fn test_fatal_outcome_reports_blocked() {
        let db = primary_db();
        db.fail_next_reconfigure(DatabaseError::Auth("bad credentials".into()));
        let mut agent = agent(&db, FakeProbe::new(PBM_IDLE));
        let ctx = leader_context("10.0.0.1", Role::Replication);

        let report = agent
            .handle(&ctx, AgentEvent::PeerJoined("10.0.0.3".into()))
            .await;

        assert!(matches!(report.outcome, Outcome::Fatal(_)));
        assert_eq!(report.status.severity, Severity::Blocked);
        assert_eq!(report.status.source, SignalSource::Operation);
        assert!(report.status.message.contains("bad credentials"));
        assert_eq!(report.requeue(&BackoffConfig::default(), 0), Requeue::Never);
    }

    #[tokio::test]
    async fn test_transient_failure_requeued_with_backoff() {
        let db = primary_db();
        db.fail_next_reconfigure(DatabaseError::Timeout);
        let mut agent = agent(&db, FakeProbe::new(PBM_IDLE));
        let ctx = leader_context("10.0.0.1", Role::Replication);

        let report = agent
            .handle(&ctx, AgentEvent::PeerJoined("10.0.0.3".into()))
            .await;

        let backoff = BackoffConfig {
            jitter: 0.0,
            ..Default::default()
        };
        assert!(matches!(
            report.requeue(&backoff, 2),
            Requeue::After(delay) if delay.as_secs() == 20
        ));
    }

    #[tokio::test]
    async fn test_database_down_reports_waiting() {
        let db = primary_db();
        db.fail_status(Some(DatabaseError::Unreachable("connection refused".into())));
        let mut agent = agent(&db, FakeProbe::new(PBM_IDLE));
        let ctx = leader_context("10.0.0.1", Role::Replication);

        let report = agent.handle(&ctx, AgentEvent::UpdateStatus).await;

        assert_eq!(report.status.severity, Severity::Waiting);
        assert_eq!(report.status.message, "Waiting for MongoDB to start");
    }
}

mod integration_event_tests {
    use super::*;

    #[tokio::test]
    async fn test_client_link_on_shard_blocks_until_detached() {
        let db = primary_db();
        let mut agent = agent(&db, FakeProbe::new(PBM_IDLE));
        let ctx = leader_context("10.0.0.1", Role::Shard);

        let report = agent
            .handle(&ctx, AgentEvent::IntegrationAttached(client_link()))
            .await;
        assert!(report.outcome.is_done());
        assert_eq!(report.status.severity, Severity::Blocked);
        assert_eq!(
            report.status.message,
            "sharding role incompatible with direct-client integration"
        );

        let report = agent
            .handle(&ctx, AgentEvent::IntegrationDetached("application".into()))
            .await;
        assert_eq!(report.status.severity, Severity::Active);
        assert_eq!(agent.integrations().count(), 0);
    }

    #[tokio::test]
    async fn test_tls_mismatch_reported_on_change() {
        let db = primary_db();
        let mut agent = agent(&db, FakeProbe::new(PBM_IDLE));
        let ctx = leader_context("10.0.0.1", Role::Shard);

        agent
            .handle(&ctx, AgentEvent::IntegrationAttached(config_server_link("config", false)))
            .await;
        let report = agent
            .handle(&ctx, AgentEvent::IntegrationAttached(shard_link("shard-one", true)))
            .await;
        assert_eq!(
            report.status.message,
            "Shard has TLS enabled, but config-server does not."
        );

        let report = agent
            .handle(&ctx, AgentEvent::IntegrationChanged(config_server_link("config", true)))
            .await;
        assert_eq!(report.status.severity, Severity::Active);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backup_link_waits_for_resync() {
        let db = primary_db();
        let probe = FakeProbe::scripted(vec![
            Ok(PBM_RESYNCING.to_string()),
            Ok(PBM_IDLE.to_string()),
        ]);
        let mut agent = agent(&db, probe);
        let ctx = leader_context("10.0.0.1", Role::Replication);

        let report = agent
            .handle(&ctx, AgentEvent::IntegrationAttached(backup_link()))
            .await;

        assert!(report.outcome.is_done());
        assert_eq!(report.status.severity, Severity::Active);
        assert_eq!(report.status.message, "Primary");
    }

    #[tokio::test(start_paused = true)]
    async fn test_backup_link_with_busy_agent_retries() {
        let db = primary_db();
        let mut agent = agent(&db, FakeProbe::new(PBM_BACKUP_RUNNING));
        let ctx = leader_context("10.0.0.1", Role::ConfigServer);

        let report = agent
            .handle(&ctx, AgentEvent::IntegrationAttached(backup_link()))
            .await;

        assert!(matches!(report.outcome, Outcome::RetryLater(Error::BackupBusy(_))));
        assert!(matches!(
            report.requeue(&BackoffConfig::default(), 0),
            Requeue::After(_)
        ));
    }

    #[tokio::test]
    async fn test_backup_link_on_shard_not_resynced() {
        let db = primary_db();
        let probe = Arc::new(FakeProbe::new(PBM_RESYNCING));
        let mut agent = NodeAgent::new(db.clone(), probe.clone());
        let ctx = leader_context("10.0.0.1", Role::Shard);

        let report = agent
            .handle(&ctx, AgentEvent::IntegrationAttached(backup_link()))
            .await;

        assert!(report.outcome.is_done());
        assert_eq!(report.status.source, SignalSource::Topology);
        // Only the status evaluation probes the agent
        assert_eq!(probe.calls(), 1);
    }

    #[tokio::test]
    async fn test_backup_credentials_rejected() {
        let db = primary_db();
        let mut agent = agent(&db, FakeProbe::failing(1, "status code: 403"));
        let ctx = leader_context("10.0.0.1", Role::Replication);

        let report = agent
            .handle(&ctx, AgentEvent::IntegrationAttached(backup_link()))
            .await;

        assert!(report.outcome.is_done());
        assert_eq!(report.status.severity, Severity::Blocked);
        assert_eq!(report.status.message, "s3 credentials are incorrect.");
    }
}

mod revision_tests {
    use super::*;
    use mongodb_coordinator::model::Integration;

    #[tokio::test]
    async fn test_outdated_shard_blocked() {
        let db = primary_db();
        let mut agent = agent(&db, FakeProbe::new(PBM_IDLE)).with_revision(7);
        let ctx = leader_context("10.0.0.1", Role::Shard);

        let link = Integration::new("config", IntegrationKind::ConfigServerLink).with_revision(8);
        let report = agent
            .handle(&ctx, AgentEvent::IntegrationAttached(link))
            .await;

        assert_eq!(report.status.severity, Severity::Blocked);
        assert_eq!(report.status.source, SignalSource::CrossCluster);
        assert_eq!(
            report.status.message,
            "Charm revision (7) is not up-to date with config-server."
        );
    }

    #[tokio::test]
    async fn test_topology_reported_before_revision() {
        let db = primary_db();
        let mut agent = agent(&db, FakeProbe::new(PBM_IDLE)).with_revision(7);
        let ctx = leader_context("10.0.0.1", Role::Shard);

        let link = Integration::new("config", IntegrationKind::ConfigServerLink).with_revision(8);
        agent
            .handle(&ctx, AgentEvent::IntegrationAttached(link))
            .await;
        let report = agent
            .handle(&ctx, AgentEvent::IntegrationAttached(client_link()))
            .await;

        assert_eq!(report.status.source, SignalSource::Topology);
    }
}

mod metrics_tests {
    use super::*;

    #[tokio::test]
    async fn test_evaluations_recorded() {
        let db = primary_db();
        let mut agent = agent(&db, FakeProbe::new(PBM_IDLE));
        let health = Arc::new(HealthState::new());
        let ctx: NodeContext =
            leader_context("10.0.0.1", Role::Replication).with_health_state(health.clone());

        assert!(!health.is_ready().await);
        agent.handle(&ctx, AgentEvent::UpdateStatus).await;
        agent.handle(&ctx, AgentEvent::UpdateStatus).await;

        assert!(health.is_ready().await);
        let labels = EvaluationLabels {
            severity: "active".into(),
            source: "node-health".into(),
        };
        assert_eq!(
            health
                .metrics
                .status_evaluations_total
                .get_or_create(&labels)
                .get(),
            2
        );
    }
}
