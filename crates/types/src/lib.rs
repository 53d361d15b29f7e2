//! Shared value types for the Jalan workflow controller.
//!
//! The engine produces these while a run is in flight and hands them to
//! callers and observers afterwards. Everything here is plain data and
//! serializes with serde so the CLI can print it and observers can forward it.

pub mod event;
pub mod run;
pub mod step;

pub use event::{ControllerEvent, FailureKind};
pub use run::{ProfileEntry, RunOutcome, RunPhase, TeardownRecord, WorkflowProfile};
pub use step::{StepKey, StepPhase, StepStatus};
