//! Unit tests for status aggregation

use mongodb_coordinator::client::DatabaseError;
use mongodb_coordinator::controller::{
    BackupState, StatusInputs, classify, node_health_signal, status_error_signal,
    validate_topology,
};
use mongodb_coordinator::model::{
    PrioritizedStatus, ReplicaSetStatus, Role, Severity, SignalSource, StatusSignal,
};

use crate::common::*;

fn healthy_topology() -> StatusSignal {
    validate_topology(Role::Replication, &[]).to_signal()
}

fn aggregate_for(status: &ReplicaSetStatus) -> PrioritizedStatus {
    StatusInputs::new(node_health_signal("1.1.1.1", status), healthy_topology()).aggregate()
}

mod node_health_tests {
    use super::*;

    #[test]
    fn test_primary_reports_primary() {
        let status = aggregate_for(&replica_status(&[("1.1.1.1", "PRIMARY")]));
        assert_eq!(status.severity, Severity::Active);
        assert_eq!(status.message, "Primary");
    }

    #[test]
    fn test_secondary_has_empty_message() {
        let status = aggregate_for(&replica_status(&[
            ("1.1.1.1", "SECONDARY"),
            ("1.1.1.2", "PRIMARY"),
        ]));
        assert_eq!(status.severity, Severity::Active);
        assert_eq!(status.message, "");
    }

    #[test]
    fn test_member_being_added() {
        let status = aggregate_for(&ReplicaSetStatus::new());
        assert_eq!(status.severity, Severity::Waiting);
        assert_eq!(status.message, "Member being added.");
    }

    #[test]
    fn test_member_removing() {
        let status = aggregate_for(&replica_status(&[("1.1.1.1", "REMOVED")]));
        assert_eq!(status.severity, Severity::Waiting);
        assert_eq!(status.message, "Member is removing...");
    }

    #[test]
    fn test_member_syncing() {
        for label in ["STARTUP", "STARTUP2", "ROLLBACK", "RECOVERING"] {
            let status = aggregate_for(&replica_status(&[("1.1.1.1", label)]));
            assert_eq!(status.severity, Severity::Waiting, "{}", label);
            assert_eq!(status.message, "Member is syncing...");
        }
    }

    #[test]
    fn test_unknown_state_blocked() {
        let status = aggregate_for(&replica_status(&[("1.1.1.1", "unknown")]));
        assert_eq!(status.severity, Severity::Blocked);
        assert_eq!(status.message, "unknown");
    }

    #[test]
    fn test_database_not_started() {
        let signal = status_error_signal(&DatabaseError::Connection("refused".into()));
        let status = StatusInputs::new(signal, healthy_topology()).aggregate();
        assert_eq!(status.severity, Severity::Waiting);
        assert_eq!(status.message, "Waiting for MongoDB to start");
    }
}

mod precedence_tests {
    use super::*;

    fn primary() -> StatusSignal {
        node_health_signal("1.1.1.1", &replica_status(&[("1.1.1.1", "PRIMARY")]))
    }

    #[test]
    fn test_backup_resync_makes_node_wait() {
        let backup = classify(true, Ok(PBM_RESYNCING.to_string())).unwrap();
        assert_eq!(backup, BackupState::Resyncing);

        let status = StatusInputs::new(primary(), healthy_topology())
            .with_backup(backup.to_signal())
            .aggregate();

        assert_eq!(status.severity, Severity::Waiting);
        assert_eq!(status.source, SignalSource::Backup);
    }

    #[test]
    fn test_node_health_wins_over_everything() {
        let status = StatusInputs::new(
            StatusSignal::waiting(SignalSource::NodeHealth, "Member is syncing..."),
            StatusSignal::blocked(SignalSource::Topology, "topology"),
        )
        .with_operation(Some(StatusSignal::blocked(SignalSource::Operation, "op")))
        .with_cross_cluster(Some(StatusSignal::blocked(SignalSource::CrossCluster, "cc")))
        .with_backup(Some(StatusSignal::blocked(SignalSource::Backup, "backup")))
        .aggregate();

        assert_eq!(status.source, SignalSource::NodeHealth);
        assert_eq!(status.message, "Member is syncing...");
    }

    #[test]
    fn test_operation_before_topology() {
        let status = StatusInputs::new(primary(), StatusSignal::blocked(SignalSource::Topology, "t"))
            .with_operation(Some(StatusSignal::blocked(SignalSource::Operation, "auth failed")))
            .aggregate();
        assert_eq!(status.source, SignalSource::Operation);
    }

    #[test]
    fn test_cross_cluster_before_backup() {
        let status = StatusInputs::new(primary(), healthy_topology())
            .with_cross_cluster(Some(StatusSignal::waiting(SignalSource::CrossCluster, "cc")))
            .with_backup(Some(StatusSignal::blocked(SignalSource::Backup, "backup")))
            .aggregate();
        assert_eq!(status.source, SignalSource::CrossCluster);
        assert_eq!(status.severity, Severity::Waiting);
    }

    #[test]
    fn test_absent_backup_ignored() {
        let status = StatusInputs::new(primary(), healthy_topology())
            .with_backup(None)
            .aggregate();
        assert_eq!(status.to_string(), "active: Primary");
    }
}
