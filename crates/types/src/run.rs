//! Per-run records: the profile of executed main steps, teardown records,
//! and the phase/outcome of the controller's state machine.

use std::time::Duration;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::{StepKey, StepStatus};

/// Timing record for one executed main step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileEntry {
    /// Execution rank the step was registered with.
    pub order: i64,
    /// Wall-clock time between invoking the step and its settlement.
    pub time_taken: Duration,
    /// Whether the step settled successfully.
    pub status: StepStatus,
}

/// Record of which main steps executed in a run and how long each took.
///
/// Entries keep execution order. Steps skipped after an early stop have no entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkflowProfile {
    entries: IndexMap<StepKey, ProfileEntry>,
}

impl WorkflowProfile {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, key: StepKey, entry: ProfileEntry) {
        self.entries.insert(key, entry);
    }

    pub fn get(&self, key: &str) -> Option<&ProfileEntry> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Keys of the recorded steps in the order they executed.
    pub fn keys(&self) -> impl Iterator<Item = &StepKey> {
        self.entries.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&StepKey, &ProfileEntry)> {
        self.entries.iter()
    }

    /// Sum of `time_taken` across every recorded step.
    pub fn total_time(&self) -> Duration {
        self.entries.values().map(|entry| entry.time_taken).sum()
    }
}

/// Outcome of one teardown step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeardownRecord {
    pub order: i64,
    pub key: StepKey,
    pub time_taken: Duration,
    pub status: StepStatus,
}

/// How the main phase of a run ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RunOutcome {
    /// Every main step ran (failures tolerated when the controller continues past them).
    Completed,
    /// A main step failed and the remaining main steps were skipped.
    Stopped { key: StepKey, order: i64 },
}

impl RunOutcome {
    pub fn is_stopped(&self) -> bool {
        matches!(self, RunOutcome::Stopped { .. })
    }
}

/// Phase of the controller's run state machine.
///
/// `Idle -> Running -> TearingDown -> Finished`; the main phase ending early
/// still passes through `TearingDown`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum RunPhase {
    #[default]
    Idle,
    Running,
    TearingDown,
    Finished { outcome: RunOutcome },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(order: i64, millis: u64) -> ProfileEntry {
        ProfileEntry {
            order,
            time_taken: Duration::from_millis(millis),
            status: StepStatus::Succeeded,
        }
    }

    #[test]
    fn profile_keeps_execution_order_and_sums_time() {
        let mut profile = WorkflowProfile::new();
        profile.record("second".into(), entry(2, 5));
        profile.record("first".into(), entry(1, 10));

        let keys: Vec<&str> = profile.keys().map(StepKey::as_str).collect();
        assert_eq!(keys, vec!["second", "first"]);
        assert_eq!(profile.total_time(), Duration::from_millis(15));
        assert!(profile.contains("first"));

        profile.clear();
        assert!(profile.is_empty());
    }

    #[test]
    fn run_phase_serializes_with_outcome() {
        let phase = RunPhase::Finished {
            outcome: RunOutcome::Stopped {
                key: "deploy".into(),
                order: 3,
            },
        };
        let value = serde_json::to_value(&phase).expect("serialize phase");
        assert_eq!(value["phase"], "finished");
        assert_eq!(value["outcome"]["kind"], "stopped");
        assert_eq!(value["outcome"]["key"], "deploy");
    }
}
