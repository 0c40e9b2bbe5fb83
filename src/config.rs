//! Agent configuration
//!
//! Defaults mirror the timings the coordinator has always used: member
//! removal gets a one minute budget (12 attempts, 5s apart) and backup resync
//! polling two minutes. Every field can be overridden through
//! `MONGODB_COORDINATOR_*` environment variables.

use std::net::SocketAddr;
use std::time::Duration;

use serde::Deserialize;

use crate::controller::error::{BackoffConfig, Error, Result, RetryPolicy};
use crate::model::DEFAULT_MONGODB_PORT;

const ENV_PREFIX: &str = "MONGODB_COORDINATOR_";

/// Configuration shared by every coordinator call on this node
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AgentConfig {
    /// Port mongod listens on; used for new member entries
    pub mongodb_port: u16,
    /// Bounded retry for member removal
    pub removal_retry: RetryPolicy,
    /// Bounded polling while the backup agent resyncs
    pub resync_retry: RetryPolicy,
    /// Requeue delays handed to the event-dispatch layer
    pub requeue: BackoffConfig,
    /// Bind address of the health and metrics server
    pub health_addr: SocketAddr,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            mongodb_port: DEFAULT_MONGODB_PORT,
            removal_retry: RetryPolicy::new(12, Duration::from_secs(5)),
            resync_retry: RetryPolicy::new(24, Duration::from_secs(5)),
            requeue: BackoffConfig::default(),
            health_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
        }
    }
}

impl AgentConfig {
    /// Load defaults overridden by the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Parse a JSON document; missing fields keep their defaults
    pub fn from_json(raw: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(raw).map_err(|e| Error::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load defaults overridden by values from `lookup`, keyed by full
    /// environment variable name
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let get = |name: &str| lookup(&format!("{ENV_PREFIX}{name}"));

        if let Some(v) = get("MONGODB_PORT") {
            config.mongodb_port = parse_var("MONGODB_PORT", &v)?;
        }
        if let Some(v) = get("REMOVAL_ATTEMPTS") {
            config.removal_retry.attempts = parse_var("REMOVAL_ATTEMPTS", &v)?;
        }
        if let Some(v) = get("REMOVAL_DELAY_SECS") {
            config.removal_retry.delay = Duration::from_secs(parse_var("REMOVAL_DELAY_SECS", &v)?);
        }
        if let Some(v) = get("RESYNC_ATTEMPTS") {
            config.resync_retry.attempts = parse_var("RESYNC_ATTEMPTS", &v)?;
        }
        if let Some(v) = get("RESYNC_DELAY_SECS") {
            config.resync_retry.delay = Duration::from_secs(parse_var("RESYNC_DELAY_SECS", &v)?);
        }
        if let Some(v) = get("REQUEUE_MAX_DELAY_SECS") {
            config.requeue.max_delay =
                Duration::from_secs(parse_var("REQUEUE_MAX_DELAY_SECS", &v)?);
        }
        if let Some(v) = get("HEALTH_ADDR") {
            config.health_addr = parse_var("HEALTH_ADDR", &v)?;
        }

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.mongodb_port == 0 {
            return Err(Error::InvalidConfig("mongodb port must be non-zero".into()));
        }
        if !(0.0..=1.0).contains(&self.requeue.jitter) {
            return Err(Error::InvalidConfig(format!(
                "requeue jitter {} must be between 0.0 and 1.0",
                self.requeue.jitter
            )));
        }
        Ok(())
    }
}

fn parse_var<T>(name: &str, value: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e| {
        Error::InvalidConfig(format!("{ENV_PREFIX}{name}={value:?}: {e}"))
    })
}

/// Serde helper storing a `Duration` as whole seconds
pub(crate) mod duration_secs {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}
