//! Status aggregation
//!
//! Every subsystem forms its own opinion as a [`StatusSignal`]; the aggregator
//! reduces them to the single [`PrioritizedStatus`] shown for the node. Signals
//! are checked in a fixed order and the first one that is not Active wins.

use tracing::debug;

use crate::client::DatabaseError;
use crate::model::{
    NodeHealthState, PrioritizedStatus, ReplicaSetStatus, SignalSource, StatusSignal, host_of,
};

/// Signal describing this node's own replication state
pub fn node_health_signal(self_address: &str, status: &ReplicaSetStatus) -> StatusSignal {
    let own_host = host_of(self_address);
    let label = status
        .iter()
        .find(|(address, _)| host_of(address) == own_host)
        .map(|(_, label)| label.as_str());

    let Some(label) = label else {
        return StatusSignal::waiting(SignalSource::NodeHealth, "Member being added.");
    };

    match NodeHealthState::from_label(label) {
        Some(NodeHealthState::Primary) => StatusSignal::active(SignalSource::NodeHealth, "Primary"),
        Some(NodeHealthState::Secondary) => StatusSignal::active(SignalSource::NodeHealth, ""),
        Some(state) if state.is_syncing() => {
            StatusSignal::waiting(SignalSource::NodeHealth, "Member is syncing...")
        }
        Some(NodeHealthState::Removed) => {
            StatusSignal::waiting(SignalSource::NodeHealth, "Member is removing...")
        }
        _ => StatusSignal::blocked(SignalSource::NodeHealth, label),
    }
}

/// Signal for a failed status read
pub fn status_error_signal(error: &DatabaseError) -> StatusSignal {
    if error.is_transient() {
        StatusSignal::waiting(SignalSource::NodeHealth, "Waiting for MongoDB to start")
    } else {
        StatusSignal::blocked(SignalSource::NodeHealth, error.to_string())
    }
}

/// The signals feeding one evaluation, in precedence order
#[derive(Debug, Clone)]
pub struct StatusInputs {
    pub node_health: StatusSignal,
    /// Outcome of the event being handled, when it did not complete
    pub operation: Option<StatusSignal>,
    pub topology: StatusSignal,
    pub cross_cluster: Option<StatusSignal>,
    /// Absent when backups are not configured
    pub backup: Option<StatusSignal>,
}

impl StatusInputs {
    pub fn new(node_health: StatusSignal, topology: StatusSignal) -> Self {
        Self {
            node_health,
            operation: None,
            topology,
            cross_cluster: None,
            backup: None,
        }
    }

    pub fn with_operation(mut self, signal: Option<StatusSignal>) -> Self {
        self.operation = signal;
        self
    }

    pub fn with_cross_cluster(mut self, signal: Option<StatusSignal>) -> Self {
        self.cross_cluster = signal;
        self
    }

    pub fn with_backup(mut self, signal: Option<StatusSignal>) -> Self {
        self.backup = signal;
        self
    }

    /// Reduce to a single status.
    ///
    /// When everything is Active the node-health message is kept, so a
    /// healthy primary reports "Primary".
    pub fn aggregate(self) -> PrioritizedStatus {
        let StatusInputs {
            node_health,
            operation,
            topology,
            cross_cluster,
            backup,
        } = self;

        let ordered = [
            Some(node_health.clone()),
            operation,
            Some(topology),
            cross_cluster,
            backup,
        ];

        let status = ordered
            .into_iter()
            .flatten()
            .find(|signal| !signal.is_active())
            .map(PrioritizedStatus::from)
            .unwrap_or_else(|| PrioritizedStatus::from(node_health));

        debug!(
            severity = %status.severity,
            source = %status.source,
            message = %status.message,
            "Aggregated node status"
        );
        status
    }
}
