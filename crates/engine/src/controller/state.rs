//! Per-run controller state.

use chrono::{DateTime, Utc};
use jalan_types::{RunOutcome, RunPhase, TeardownRecord, WorkflowProfile};
use serde::Serialize;
use uuid::Uuid;

/// State of the controller's most recent run.
///
/// Everything is reset by the next `start()`; `should_stop` is a one-way latch
/// within a run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ControllerState {
    pub(crate) run_id: Option<String>,
    pub(crate) profile: WorkflowProfile,
    pub(crate) start_time: Option<DateTime<Utc>>,
    pub(crate) end_time: Option<DateTime<Utc>>,
    pub(crate) should_stop: bool,
    pub(crate) phase: RunPhase,
    pub(crate) teardown: Vec<TeardownRecord>,
}

impl ControllerState {
    pub(crate) fn begin(&mut self, run_id: String, at: DateTime<Utc>) {
        self.run_id = Some(run_id);
        self.profile.clear();
        self.start_time = Some(at);
        self.end_time = None;
        self.should_stop = false;
        self.phase = RunPhase::Running;
        self.teardown.clear();
    }

    pub(crate) fn finish(&mut self, outcome: RunOutcome, at: DateTime<Utc>) {
        self.end_time = Some(at);
        self.phase = RunPhase::Finished { outcome };
    }

    pub fn run_id(&self) -> Option<&str> {
        self.run_id.as_deref()
    }

    pub fn profile(&self) -> &WorkflowProfile {
        &self.profile
    }

    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        self.start_time
    }

    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        self.end_time
    }

    pub fn should_stop(&self) -> bool {
        self.should_stop
    }

    pub fn phase(&self) -> &RunPhase {
        &self.phase
    }

    /// Teardown outcomes of the last run, sorted by order.
    pub fn teardown_records(&self) -> &[TeardownRecord] {
        &self.teardown
    }
}

/// `prefix` followed by 12 hex characters of a random v4 UUID.
pub(crate) fn generate_run_id(prefix: &str) -> String {
    let mut run_id = String::with_capacity(prefix.len() + 12);
    run_id.push_str(prefix);
    run_id.extend(Uuid::new_v4().simple().to_string().chars().take(12));
    run_id
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_ids_are_prefixed_short_and_distinct() {
        let first = generate_run_id("run-");
        let second = generate_run_id("run-");

        assert!(first.starts_with("run-"));
        assert_eq!(first.len(), "run-".len() + 12);
        assert!(first["run-".len()..].chars().all(|character| character.is_ascii_hexdigit()));
        assert_ne!(first, second);
    }

    #[test]
    fn begin_resets_the_previous_run() {
        let mut state = ControllerState::default();
        state.begin("run-1".into(), Utc::now());
        state.should_stop = true;
        state.finish(RunOutcome::Completed, Utc::now());
        assert!(state.end_time().is_some());

        state.begin("run-2".into(), Utc::now());
        assert_eq!(state.run_id(), Some("run-2"));
        assert!(!state.should_stop());
        assert!(state.end_time().is_none());
        assert_eq!(state.phase(), &RunPhase::Running);
    }
}
