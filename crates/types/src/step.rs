//! Step identity and status.

use std::{borrow::Borrow, fmt};

use serde::{Deserialize, Serialize};

/// Stable identifier of a workflow step, usually the name of the handler method it stands for.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StepKey(String);

impl StepKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StepKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl Borrow<str> for StepKey {
    fn borrow(&self) -> &str {
        self.as_str()
    }
}

impl From<&str> for StepKey {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for StepKey {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Which plan a step belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepPhase {
    /// Sequential steps that make up the body of the run.
    Main,
    /// Cleanup steps attempted concurrently once the main phase ends.
    Teardown,
}

impl fmt::Display for StepPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepPhase::Main => f.write_str("step"),
            StepPhase::Teardown => f.write_str("teardown step"),
        }
    }
}

/// Status of an executed step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// Step executed and returned successfully.
    Succeeded,
    /// Step was attempted but its callable failed, panicked, or was not invocable.
    Failed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_key_serializes_as_plain_string() {
        let key = StepKey::from("build");
        assert_eq!(serde_json::to_string(&key).expect("serialize"), "\"build\"");
        assert_eq!(key.to_string(), "build");
    }

    #[test]
    fn step_phase_display_names_teardown_steps() {
        assert_eq!(StepPhase::Main.to_string(), "step");
        assert_eq!(StepPhase::Teardown.to_string(), "teardown step");
    }
}
