pub mod agent;
pub mod backup_status;
pub mod context;
pub mod error;
pub mod membership;
pub mod outcome;
pub mod status;
pub mod topology;
pub mod version_check;

pub use agent::{AgentEvent, EventReport, NodeAgent};
pub use backup_status::{BackupMonitor, BackupState, classify};
pub use context::NodeContext;
pub use error::{BackoffConfig, Error, ErrorClass, Result, RetryPolicy};
pub use membership::{MembershipCoordinator, check_structural_readiness};
pub use outcome::{Outcome, Requeue, requeue_policy};
pub use status::{StatusInputs, node_health_signal, status_error_signal};
pub use topology::{TopologyVerdict, TopologyViolation, validate_topology};
pub use version_check::check_revisions;
