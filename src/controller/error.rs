//! Error types for the cluster state coordinator

use std::time::Duration;

use thiserror::Error;

use crate::client::{DatabaseError, ProbeError};

/// Error variants are named with the `Error` suffix where they wrap another
/// error type (e.g., `DatabaseError`, `ProbeError`).
#[allow(clippy::enum_variant_names)]
#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    DatabaseError(#[from] DatabaseError),

    #[error("Backup agent error: {0}")]
    ProbeError(#[from] ProbeError),

    #[error("Unparseable backup agent output: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Membership changes require cluster leadership")]
    NotLeader,

    #[error("Replica set not ready for reconfiguration: {0}")]
    StructuralNotReady(String),

    #[error("Backup agent busy: {0}")]
    BackupBusy(String),

    #[error("Missing revision for integration {0}")]
    NoVersion(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// How the event-dispatch layer should treat an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Retry with backoff
    Transient,
    /// Re-evaluate when the next triggering event arrives
    Deferred,
    /// Surface as Blocked, never retry
    Permanent,
}

impl Error {
    pub fn class(&self) -> ErrorClass {
        match self {
            Error::DatabaseError(e) if e.is_transient() => ErrorClass::Transient,
            Error::DatabaseError(_) => ErrorClass::Permanent,
            Error::StructuralNotReady(_) => ErrorClass::Deferred,
            // Busy backup agents finish their operation eventually
            Error::BackupBusy(_) => ErrorClass::Transient,
            // Revision metadata is published asynchronously by the remote side
            Error::NoVersion(_) => ErrorClass::Deferred,
            Error::ProbeError(_) => ErrorClass::Permanent,
            Error::SerializationError(_) => ErrorClass::Permanent,
            Error::NotLeader => ErrorClass::Permanent,
            Error::InvalidConfig(_) => ErrorClass::Permanent,
        }
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        self.class() != ErrorClass::Permanent
    }

    /// Check if this error means the replica set is mid-change
    pub fn is_structural(&self) -> bool {
        matches!(self, Error::StructuralNotReady(_))
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Exponential backoff configuration
#[derive(Clone, Debug, PartialEq, serde::Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BackoffConfig {
    /// Initial delay for first retry
    #[serde(with = "crate::config::duration_secs")]
    pub initial_delay: Duration,
    /// Maximum delay between retries
    #[serde(with = "crate::config::duration_secs")]
    pub max_delay: Duration,
    /// Multiplier for each subsequent retry
    pub multiplier: f64,
    /// Random jitter factor (0.0 to 1.0)
    pub jitter: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(300), // 5 minutes
            multiplier: 2.0,
            jitter: 0.1,
        }
    }
}

impl BackoffConfig {
    /// Calculate the backoff delay for a given retry attempt
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base_delay_secs =
            self.initial_delay.as_secs_f64() * self.multiplier.powi(attempt as i32);

        let jitter_range = base_delay_secs * self.jitter;
        let jitter = rand::random::<f64>() * jitter_range * 2.0 - jitter_range;
        let delay_with_jitter = (base_delay_secs + jitter).max(0.0);

        let capped_delay = delay_with_jitter.min(self.max_delay.as_secs_f64());

        Duration::from_secs_f64(capped_delay)
    }

    /// Get the delay for an error, with different handling for retryable vs non-retryable
    pub fn delay_for_error(&self, error: &Error, attempt: u32) -> Duration {
        if error.is_retryable() {
            self.delay_for_attempt(attempt)
        } else {
            // Leave room for manual intervention before looking again
            self.max_delay
        }
    }
}

/// Fixed-interval, bounded retry policy
#[derive(Clone, Debug, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryPolicy {
    /// Total number of attempts, including the first
    pub attempts: u32,
    /// Delay between attempts
    #[serde(with = "crate::config::duration_secs")]
    pub delay: Duration,
}

impl RetryPolicy {
    pub const fn new(attempts: u32, delay: Duration) -> Self {
        Self { attempts, delay }
    }

    /// Attempts never drop below one
    pub fn max_attempts(&self) -> u32 {
        self.attempts.max(1)
    }
}
