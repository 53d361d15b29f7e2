//! Step registration and compilation.
//!
//! - `descriptor`: step descriptors and their registration sites
//! - `definition`: the handler definition builder and step callables
//! - `manifest`: declarative YAML step tables
//! - `compiler`: ordering and dependency validation into resolved plans

pub mod compiler;
mod definition;
mod descriptor;
mod manifest;

pub use compiler::{CompiledPlans, PlannedStep, ResolvedPlan, compile_plan, compile_plans};
pub use definition::{
    HandlerDefinition, HandlerDefinitionBuilder, StepCallable, StepFuture, StepRegistry, StepTable, WorkflowHandler, step_fn,
};
pub use descriptor::{RegistrationSite, StepDescriptor};
pub use manifest::{ManifestError, ManifestStep, StepManifest};

use crate::dependency::DependencyToken;

/// Token list for steps that need no dependencies.
pub const NO_DEPENDENCIES: [DependencyToken; 0] = [];
