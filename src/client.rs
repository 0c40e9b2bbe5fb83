//! Capabilities consumed from the outside world
//!
//! The wire-protocol driver and the backup agent are not part of this crate.
//! Callers supply implementations of [`DatabaseClient`] and
//! [`BackupAgentProbe`]; the coordinators only ever talk to these traits.

use async_trait::async_trait;
use thiserror::Error;

use crate::model::{ConfigChangeRejected, Reconfiguration, ReplicaSetConfig, ReplicaSetStatus};

/// Errors reported by a [`DatabaseClient`]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DatabaseError {
    #[error("database unreachable: {0}")]
    Unreachable(String),

    #[error("connection failed: {0}")]
    Connection(String),

    #[error("operation timed out")]
    Timeout,

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("configuration rejected: {0}")]
    ConfigRejected(String),

    #[error("config version conflict: expected {expected}, found {actual}")]
    VersionConflict { expected: u64, actual: u64 },

    #[error("replica set already initialised")]
    AlreadyInitialized,

    #[error("database operation failed (code {code}): {message}")]
    Operation { code: i32, message: String },
}

impl DatabaseError {
    /// Failures that are expected to clear on their own
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            DatabaseError::Unreachable(_)
                | DatabaseError::Connection(_)
                | DatabaseError::Timeout
                | DatabaseError::VersionConflict { .. }
        )
    }
}

impl From<ConfigChangeRejected> for DatabaseError {
    fn from(rejected: ConfigChangeRejected) -> Self {
        match rejected {
            ConfigChangeRejected::VersionMismatch { expected, actual } => {
                DatabaseError::VersionConflict { expected, actual }
            }
            other => DatabaseError::ConfigRejected(other.to_string()),
        }
    }
}

/// Administrative access to the local mongod
#[async_trait]
pub trait DatabaseClient: Send + Sync {
    /// Member address to state label. `Unreachable` when mongod cannot be contacted.
    async fn get_status(&self) -> Result<ReplicaSetStatus, DatabaseError>;

    /// Current replica-set config including its version
    async fn get_config(&self) -> Result<ReplicaSetConfig, DatabaseError>;

    /// Initiate a single-member replica set on `self_address`
    async fn init_replica_set(&self, self_address: &str) -> Result<(), DatabaseError>;

    /// Apply a change conditioned on `change.expected_version`
    async fn reconfigure(&self, change: &Reconfiguration) -> Result<(), DatabaseError>;

    /// Ask the current primary to step down so another member is elected
    async fn step_down_primary(&self) -> Result<(), DatabaseError>;
}

/// Failure of the backup agent status command
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("backup agent probe failed (exit code {code}): {output}")]
pub struct ProbeError {
    /// Exit code of the status command
    pub code: i32,
    /// Captured output of the failed command
    pub output: String,
}

impl ProbeError {
    pub fn new(code: i32, output: impl Into<String>) -> Self {
        Self {
            code,
            output: output.into(),
        }
    }
}

/// Status access to the external backup agent
#[async_trait]
pub trait BackupAgentProbe: Send + Sync {
    /// Raw status output, normally a JSON document
    async fn probe_status(&self) -> Result<String, ProbeError>;
}
