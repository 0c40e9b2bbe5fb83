//! Backup agent state classification
//!
//! The backup agent reports its state as JSON on success and as free text
//! with an embedded HTTP status code on failure. Both are mapped onto a
//! closed [`BackupState`] so the status aggregator never sees raw output.

use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::client::{BackupAgentProbe, ProbeError};
use crate::controller::error::{Error, Result, RetryPolicy};
use crate::model::{SignalSource, StatusSignal};

const CREDENTIAL_ERROR_MARKER: &str = "status code: 403";
const CONFIG_ERROR_MARKER: &str = "status code: 404";
const RESYNC_KIND: &str = "resync";

/// Classified state of the backup agent
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackupState {
    /// No backup integration attached
    NoConfig,
    /// Agent is syncing its storage configuration
    Resyncing,
    /// A backup, restore or other operation is in progress
    Running { kind: String, id: String },
    Idle,
    /// Storage rejected the credentials
    CredentialError,
    /// Storage configuration does not match the bucket
    ConfigError,
}

impl BackupState {
    /// Signal for the aggregator; `None` when backups are not configured
    pub fn to_signal(&self) -> Option<StatusSignal> {
        let signal = match self {
            BackupState::NoConfig => return None,
            BackupState::Resyncing => {
                StatusSignal::waiting(SignalSource::Backup, "waiting to sync s3 configurations.")
            }
            BackupState::Running { kind, id } => StatusSignal::maintenance(
                SignalSource::Backup,
                format!("{kind} started/running, backup id:'{id}'"),
            ),
            BackupState::Idle => StatusSignal::active(SignalSource::Backup, ""),
            BackupState::CredentialError => {
                StatusSignal::blocked(SignalSource::Backup, "s3 credentials are incorrect.")
            }
            BackupState::ConfigError => {
                StatusSignal::blocked(SignalSource::Backup, "s3 configurations are incompatible.")
            }
        };
        Some(signal)
    }
}

/// Agent status document (from `pbm status --out json`, trimmed)
#[derive(Debug, Deserialize)]
struct AgentStatus {
    /// Operation in progress; empty object when idle
    #[serde(default)]
    running: Option<RunningOperation>,
}

#[derive(Debug, Default, Deserialize)]
struct RunningOperation {
    #[serde(rename = "type")]
    kind: Option<String>,

    /// Backup name, present for backups and restores
    name: Option<String>,

    #[serde(rename = "opID")]
    op_id: Option<String>,
}

/// Parse successful probe output
fn parse_status(raw: &str) -> Result<BackupState> {
    let status: AgentStatus = serde_json::from_str(raw)?;
    let running = status.running.unwrap_or_default();

    let state = match running.kind {
        None => BackupState::Idle,
        Some(kind) if kind == RESYNC_KIND => BackupState::Resyncing,
        Some(kind) => {
            let id = running.name.or(running.op_id).unwrap_or_default();
            BackupState::Running { kind, id }
        }
    };
    Ok(state)
}

/// Map a failed probe onto a state, or hand the failure back
fn classify_failure(error: ProbeError) -> Result<BackupState> {
    if error.output.contains(CREDENTIAL_ERROR_MARKER) {
        Ok(BackupState::CredentialError)
    } else if error.output.contains(CONFIG_ERROR_MARKER) {
        Ok(BackupState::ConfigError)
    } else {
        Err(error.into())
    }
}

/// Classify the backup agent from a single probe result.
///
/// Pure over its inputs: the same probe result always yields the same state.
pub fn classify(configured: bool, probe: std::result::Result<String, ProbeError>) -> Result<BackupState> {
    if !configured {
        return Ok(BackupState::NoConfig);
    }
    match probe {
        Ok(raw) => parse_status(&raw),
        Err(e) => classify_failure(e),
    }
}

/// Reads the backup agent through its probe
pub struct BackupMonitor {
    probe: Arc<dyn BackupAgentProbe>,
}

impl BackupMonitor {
    pub fn new(probe: Arc<dyn BackupAgentProbe>) -> Self {
        Self { probe }
    }

    /// Probe and classify once
    pub async fn state(&self, configured: bool) -> Result<BackupState> {
        if !configured {
            return Ok(BackupState::NoConfig);
        }
        let state = classify(true, self.probe.probe_status().await)?;
        debug!(?state, "Classified backup agent state");
        Ok(state)
    }

    /// Poll until the agent has finished resyncing its storage configuration.
    ///
    /// Credential and configuration errors are returned as states. A busy
    /// agent fails immediately with [`Error::BackupBusy`], as does exhausting
    /// the retry policy.
    pub async fn verify_resync(&self, policy: &RetryPolicy) -> Result<BackupState> {
        let max_attempts = policy.max_attempts();

        for attempt in 1..=max_attempts {
            match self.state(true).await? {
                BackupState::Resyncing => {
                    debug!(attempt, max_attempts, "Backup agent still resyncing");
                    if attempt < max_attempts {
                        tokio::time::sleep(policy.delay).await;
                    }
                }
                BackupState::Running { kind, id } => {
                    warn!(%kind, %id, "Backup agent busy");
                    return Err(Error::BackupBusy(format!(
                        "{kind} in progress, backup id:'{id}'"
                    )));
                }
                state => {
                    info!(?state, attempt, "Backup agent resync finished");
                    return Ok(state);
                }
            }
        }

        Err(Error::BackupBusy(format!(
            "still resyncing after {max_attempts} attempts"
        )))
    }
}
