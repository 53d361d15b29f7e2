//! Notifications emitted by the controller while a run progresses.
//!
//! Events are one-way: observers receive them as they happen and cannot
//! influence the run. Failure events carry the failure kind, the step key and
//! order, and the rendered underlying error.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{RunOutcome, StepKey, StepStatus};

/// Category of a reported failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// A main step rejected, panicked, or was not invocable on the handler.
    StepInvocation,
    /// A teardown step rejected, panicked, or was not invocable on the handler.
    Teardown,
}

/// Lifecycle event for a single controller run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControllerEvent {
    RunStarted {
        run_id: String,
        at: DateTime<Utc>,
    },
    StepStarted {
        run_id: String,
        order: i64,
        key: StepKey,
    },
    /// A main step settled, successfully or not. Always follows `StepStarted`.
    StepFinished {
        run_id: String,
        order: i64,
        key: StepKey,
        status: StepStatus,
        time_taken: Duration,
    },
    StepFailed {
        run_id: String,
        kind: FailureKind,
        order: i64,
        key: StepKey,
        error: String,
    },
    /// The stop latch was set; no further main steps run.
    RunStopped {
        run_id: String,
        order: i64,
        key: StepKey,
    },
    TeardownStarted {
        run_id: String,
        count: usize,
    },
    TeardownFailed {
        run_id: String,
        kind: FailureKind,
        order: i64,
        key: StepKey,
        error: String,
    },
    RunFinished {
        run_id: String,
        outcome: RunOutcome,
        finished_at: DateTime<Utc>,
    },
}

impl ControllerEvent {
    /// Run identifier carried by every event.
    pub fn run_id(&self) -> &str {
        match self {
            ControllerEvent::RunStarted { run_id, .. }
            | ControllerEvent::StepStarted { run_id, .. }
            | ControllerEvent::StepFinished { run_id, .. }
            | ControllerEvent::StepFailed { run_id, .. }
            | ControllerEvent::RunStopped { run_id, .. }
            | ControllerEvent::TeardownStarted { run_id, .. }
            | ControllerEvent::TeardownFailed { run_id, .. }
            | ControllerEvent::RunFinished { run_id, .. } => run_id,
        }
    }

    /// True for `StepFailed` and `TeardownFailed`.
    pub fn is_failure(&self) -> bool {
        matches!(self, ControllerEvent::StepFailed { .. } | ControllerEvent::TeardownFailed { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_events_are_tagged_and_flagged() {
        let event = ControllerEvent::TeardownFailed {
            run_id: "run-1".into(),
            kind: FailureKind::Teardown,
            order: 2,
            key: "close_socket".into(),
            error: "socket already closed".into(),
        };

        assert!(event.is_failure());
        assert_eq!(event.run_id(), "run-1");

        let value = serde_json::to_value(&event).expect("serialize event");
        assert_eq!(value["type"], "teardown_failed");
        assert_eq!(value["kind"], "teardown");
        assert_eq!(value["key"], "close_socket");
    }
}
