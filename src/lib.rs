//! Per-node coordination for a multi-role MongoDB deployment
//!
//! Each node runs one [`NodeAgent`]. It keeps the replica-set member list in
//! step with the deployment, rejects integration sets the node's [`Role`]
//! cannot serve, tracks the backup agent and reduces all of that to a single
//! [`PrioritizedStatus`].

pub mod client;
pub mod config;
pub mod controller;
pub mod health;
pub mod model;

pub use client::{BackupAgentProbe, DatabaseClient, DatabaseError, ProbeError};
pub use config::AgentConfig;
pub use controller::{
    AgentEvent, BackoffConfig, BackupMonitor, BackupState, Error, EventReport,
    MembershipCoordinator, NodeAgent, NodeContext, Outcome, Requeue, Result, RetryPolicy,
    TopologyVerdict, TopologyViolation, validate_topology,
};
pub use health::{HealthState, Metrics, run_health_server};
pub use model::{
    Integration, IntegrationKind, Node, PrioritizedStatus, Role, Severity, SignalSource,
    StatusSignal,
};
