//! Three-way result of a coordinator operation
//!
//! Coordinators never decide when work is re-delivered. They return an
//! [`Outcome`] and the event-dispatch layer turns it into a [`Requeue`]
//! decision with [`requeue_policy`].

use std::time::Duration;

use tracing::{debug, error, warn};

use crate::controller::error::{BackoffConfig, Error, ErrorClass, Result};
use crate::model::{SignalSource, StatusSignal};

#[derive(Debug)]
pub enum Outcome {
    /// Operation completed, or there was nothing to do
    Done,
    /// Preconditions not met or a transient failure; re-deliver later
    RetryLater(Error),
    /// Permanent failure; surface as Blocked
    Fatal(Error),
}

impl Outcome {
    /// Classify the result of a read-decide-write sequence
    pub fn from_result(result: Result<()>) -> Self {
        match result {
            Ok(()) => Outcome::Done,
            Err(e) => match e.class() {
                ErrorClass::Permanent => Outcome::Fatal(e),
                ErrorClass::Transient | ErrorClass::Deferred => Outcome::RetryLater(e),
            },
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self, Outcome::Done)
    }

    pub fn error(&self) -> Option<&Error> {
        match self {
            Outcome::Done => None,
            Outcome::RetryLater(e) | Outcome::Fatal(e) => Some(e),
        }
    }

    /// Short label for logs and metrics
    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Done => "done",
            Outcome::RetryLater(e) if e.is_structural() => "deferred",
            Outcome::RetryLater(_) => "retry",
            Outcome::Fatal(_) => "fatal",
        }
    }

    /// Signal describing an unfinished operation, if any
    pub fn to_signal(&self) -> Option<StatusSignal> {
        match self {
            Outcome::Done => None,
            Outcome::RetryLater(e) => Some(StatusSignal::waiting(
                SignalSource::Operation,
                waiting_message(e),
            )),
            Outcome::Fatal(e) => Some(StatusSignal::blocked(SignalSource::Operation, e.to_string())),
        }
    }
}

fn waiting_message(error: &Error) -> String {
    match error {
        Error::StructuralNotReady(_) => "Waiting for replica set members to be ready".to_string(),
        other => other.to_string(),
    }
}

/// When the dispatch layer should deliver the triggering event again
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requeue {
    Never,
    /// Wait for the next platform event; no timer
    OnNextEvent,
    After(Duration),
}

/// Requeue policy with exponential backoff for transient failures
pub fn requeue_policy(outcome: &Outcome, backoff: &BackoffConfig, attempt: u32) -> Requeue {
    match outcome {
        Outcome::Done => Requeue::Never,
        Outcome::RetryLater(e) if e.class() == ErrorClass::Deferred => {
            debug!(error = %e, "Deferring until next event");
            Requeue::OnNextEvent
        }
        Outcome::RetryLater(e) => {
            let delay = backoff.delay_for_error(e, attempt);
            warn!(error = %e, ?delay, attempt, "Retryable error, requeuing");
            Requeue::After(delay)
        }
        Outcome::Fatal(e) => {
            error!(error = %e, "Non-retryable error, waiting for operator intervention");
            Requeue::Never
        }
    }
}
