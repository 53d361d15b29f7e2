//! # Jalan Engine
//!
//! The Jalan engine compiles a handler's registered steps into validated plans and
//! drives them: main steps strictly in order with per-step timing, a stop latch on
//! the first failure, and a concurrent, failure-isolated teardown batch.
//!
//! ## Key Features
//!
//! - **Registration**: steps and teardown steps declared with a builder or a YAML manifest
//! - **Dependency Resolution**: positional dependency tokens resolved through factories, with overrides
//! - **Compilation**: every missing token reported before anything runs
//! - **Execution**: sequential main phase, profile of what ran, isolated teardown
//! - **Outputs**: step results published to the handler's output store for later steps
//!
//! ## Usage
//!
//! ```rust
//! use jalan_engine::{DependencyEntry, HandlerDefinition, OutputStore, WorkflowHandler};
//! use serde_json::json;
//!
//! #[derive(Default)]
//! struct Greeter {
//!     outputs: OutputStore,
//! }
//!
//! impl WorkflowHandler for Greeter {
//!     fn output_store(&self) -> Option<&OutputStore> {
//!         Some(&self.outputs)
//!     }
//! }
//!
//! # tokio::runtime::Runtime::new()?.block_on(async {
//! let definition = HandlerDefinition::<Greeter>::builder("greeter")
//!     .dependency(DependencyEntry::provide("name", || "world".to_string()))
//!     .step(1, "greet", ["name"], |_, deps| async move {
//!         let name = deps.get::<String>(0)?;
//!         Ok(json!(format!("hello {name}")))
//!     })
//!     .build()?;
//!
//! let mut controller = definition.compile(Greeter::default(), Vec::new())?;
//! let outcome = controller.start().await;
//!
//! assert!(!outcome.is_stopped());
//! assert!(controller.profile().contains("greet"));
//! assert_eq!(controller.handler().outputs.get_output("greet")?, json!("hello world"));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! # })?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Architecture
//!
//! - **`registry`**: descriptors, the handler definition builder, manifests, and plan compilation
//! - **`dependency`**: tokens, factories, and the merged dependency map
//! - **`controller`**: run state and the execution loop
//! - **`output`**: the per-handler output store
//! - **`observer`**: one-way run notifications
//! - **`config`**: controller configuration loading and validation

pub mod config;
pub mod controller;
pub mod dependency;
pub mod error;
pub mod observer;
pub mod output;
pub mod registry;

pub use config::{ConfigError, ControllerConfig, OutputLifetime, load_config, load_config_from_path};
pub use controller::{ControllerState, WorkflowController};
pub use dependency::{Dependencies, Dependency, DependencyEntry, DependencyFactory, DependencyMap, DependencyToken};
pub use error::{CompileError, DependencyError, OutputError, RegistrationError, StepError, UnresolvedDependencies};
pub use jalan_types::{
    ControllerEvent, FailureKind, ProfileEntry, RunOutcome, RunPhase, StepKey, StepPhase, StepStatus, TeardownRecord,
    WorkflowProfile,
};
pub use observer::{ChannelObserver, RunObserver};
pub use output::OutputStore;
pub use registry::{
    HandlerDefinition, HandlerDefinitionBuilder, NO_DEPENDENCIES, RegistrationSite, ResolvedPlan, StepCallable, StepDescriptor,
    StepManifest, WorkflowHandler, step_fn,
};
