use serde::{Deserialize, Serialize};

/// Severity of a status signal, as understood by the reporting layer
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Severity {
    Active,
    Waiting,
    Blocked,
    Maintenance,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Active => write!(f, "active"),
            Severity::Waiting => write!(f, "waiting"),
            Severity::Blocked => write!(f, "blocked"),
            Severity::Maintenance => write!(f, "maintenance"),
        }
    }
}

/// Which subsystem produced a signal
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SignalSource {
    NodeHealth,
    Topology,
    CrossCluster,
    Backup,
    /// A coordinator operation that failed permanently
    Operation,
}

impl std::fmt::Display for SignalSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SignalSource::NodeHealth => write!(f, "node-health"),
            SignalSource::Topology => write!(f, "topology"),
            SignalSource::CrossCluster => write!(f, "cross-cluster"),
            SignalSource::Backup => write!(f, "backup"),
            SignalSource::Operation => write!(f, "operation"),
        }
    }
}

/// One independent health opinion
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct StatusSignal {
    pub source: SignalSource,
    pub severity: Severity,
    pub message: String,
}

impl StatusSignal {
    pub fn new(source: SignalSource, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            source,
            severity,
            message: message.into(),
        }
    }

    pub fn active(source: SignalSource, message: impl Into<String>) -> Self {
        Self::new(source, Severity::Active, message)
    }

    pub fn waiting(source: SignalSource, message: impl Into<String>) -> Self {
        Self::new(source, Severity::Waiting, message)
    }

    pub fn blocked(source: SignalSource, message: impl Into<String>) -> Self {
        Self::new(source, Severity::Blocked, message)
    }

    pub fn maintenance(source: SignalSource, message: impl Into<String>) -> Self {
        Self::new(source, Severity::Maintenance, message)
    }

    pub fn is_active(&self) -> bool {
        self.severity == Severity::Active
    }
}

/// The single status reported for this node after merging all signals.
///
/// Recomputed on every evaluation and never cached.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct PrioritizedStatus {
    pub severity: Severity,
    pub message: String,
    /// Signal that decided the outcome
    pub source: SignalSource,
}

impl From<StatusSignal> for PrioritizedStatus {
    fn from(signal: StatusSignal) -> Self {
        Self {
            severity: signal.severity,
            message: signal.message,
            source: signal.source,
        }
    }
}

impl std::fmt::Display for PrioritizedStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.message.is_empty() {
            write!(f, "{}", self.severity)
        } else {
            write!(f, "{}: {}", self.severity, self.message)
        }
    }
}
