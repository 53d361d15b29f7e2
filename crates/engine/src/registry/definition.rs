//! Handler definitions: the registered steps of a handler type, the callables
//! that implement them, and the handler's default dependency configuration.
//!
//! A [`HandlerDefinition`] is assembled once per handler type with
//! [`HandlerDefinitionBuilder`] and can be compiled any number of times into a
//! [`WorkflowController`] bound to a concrete handler instance.

use std::{fmt, future::Future, sync::Arc};

use futures_util::future::BoxFuture;
use indexmap::IndexMap;
use jalan_types::{StepKey, StepPhase};
use serde_json::Value;
use tracing::debug;

use crate::{
    WorkflowController,
    config::ControllerConfig,
    dependency::{Dependencies, DependencyEntry, DependencyMap, DependencyToken},
    error::{CompileError, RegistrationError},
    output::OutputStore,
    registry::{RegistrationSite, StepDescriptor, StepManifest, compiler::compile_plans},
};

/// Future returned by a step callable.
pub type StepFuture = BoxFuture<'static, anyhow::Result<Value>>;

/// Capability interface implemented by every step.
///
/// Callables receive the shared handler and their resolved dependencies in the
/// order the step declared its tokens. The JSON value they resolve to becomes
/// the step's output.
pub trait StepCallable<H>: Send + Sync {
    fn call(&self, handler: Arc<H>, dependencies: Dependencies) -> StepFuture;
}

struct FnStep<F>(F);

impl<H, F, Fut> StepCallable<H> for FnStep<F>
where
    F: Fn(Arc<H>, Dependencies) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
{
    fn call(&self, handler: Arc<H>, dependencies: Dependencies) -> StepFuture {
        Box::pin((self.0)(handler, dependencies))
    }
}

/// Wrap an async closure as a shareable step callable.
pub fn step_fn<H, F, Fut>(callable: F) -> Arc<dyn StepCallable<H>>
where
    H: 'static,
    F: Fn(Arc<H>, Dependencies) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
{
    Arc::new(FnStep(callable))
}

/// Handler types driven by a controller.
///
/// Handlers that want later steps to read earlier steps' results expose an
/// [`OutputStore`]; the controller publishes every successful step's output there.
pub trait WorkflowHandler: Send + Sync + 'static {
    fn output_store(&self) -> Option<&OutputStore> {
        None
    }
}

/// Mapping from step key to the callable implementing it.
pub struct StepTable<H> {
    callables: IndexMap<StepKey, Arc<dyn StepCallable<H>>>,
}

impl<H> StepTable<H> {
    pub fn new() -> Self {
        Self {
            callables: IndexMap::new(),
        }
    }

    /// Insert a callable; returns `false` without replacing when `key` already has one.
    pub fn insert(&mut self, key: StepKey, callable: Arc<dyn StepCallable<H>>) -> bool {
        if self.callables.contains_key(&key) {
            return false;
        }
        self.callables.insert(key, callable);
        true
    }

    pub fn get(&self, key: &str) -> Option<&Arc<dyn StepCallable<H>>> {
        self.callables.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.callables.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.callables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.callables.is_empty()
    }
}

impl<H> Default for StepTable<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H> Clone for StepTable<H> {
    fn clone(&self) -> Self {
        Self {
            callables: self.callables.clone(),
        }
    }
}

impl<H> fmt::Debug for StepTable<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.callables.keys()).finish()
    }
}

/// Descriptors registered for one handler type, per phase, in discovery order.
#[derive(Debug, Clone, Default)]
pub struct StepRegistry {
    handler: String,
    main: Vec<StepDescriptor>,
    teardown: Vec<StepDescriptor>,
}

impl StepRegistry {
    pub fn new(handler: impl Into<String>) -> Self {
        Self {
            handler: handler.into(),
            main: Vec::new(),
            teardown: Vec::new(),
        }
    }

    /// Record a descriptor, rejecting a key already registered in the same phase.
    pub fn register(&mut self, phase: StepPhase, descriptor: StepDescriptor) -> Result<(), RegistrationError> {
        let descriptors = match phase {
            StepPhase::Main => &mut self.main,
            StepPhase::Teardown => &mut self.teardown,
        };
        if descriptors.iter().any(|existing| existing.key == descriptor.key) {
            return Err(RegistrationError::duplicate_registration(
                self.handler.clone(),
                phase,
                descriptor.key,
                descriptor.origin,
            ));
        }
        descriptors.push(descriptor);
        Ok(())
    }

    pub fn handler(&self) -> &str {
        &self.handler
    }

    pub fn descriptors(&self, phase: StepPhase) -> &[StepDescriptor] {
        match phase {
            StepPhase::Main => &self.main,
            StepPhase::Teardown => &self.teardown,
        }
    }
}

/// A handler type's registered steps, callables, and default dependencies.
pub struct HandlerDefinition<H> {
    registry: StepRegistry,
    table: StepTable<H>,
    defaults: Option<Vec<DependencyEntry>>,
}

impl<H: WorkflowHandler> HandlerDefinition<H> {
    pub fn builder(name: impl Into<String>) -> HandlerDefinitionBuilder<H> {
        HandlerDefinitionBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        self.registry.handler()
    }

    pub fn registry(&self) -> &StepRegistry {
        &self.registry
    }

    pub fn steps(&self) -> &StepTable<H> {
        &self.table
    }

    /// Compile against `handler` with the default controller configuration.
    pub fn compile<I>(&self, handler: impl Into<Arc<H>>, overrides: I) -> Result<WorkflowController<H>, CompileError>
    where
        I: IntoIterator<Item = DependencyEntry>,
    {
        self.compile_with(handler, overrides, ControllerConfig::default())
    }

    /// Validate every step against the merged dependency map and build a controller.
    ///
    /// Fails before anything executes when the handler declared no dependency
    /// configuration, when a key is registered twice, or when any required
    /// token is missing from the merged map.
    pub fn compile_with<I>(
        &self,
        handler: impl Into<Arc<H>>,
        overrides: I,
        config: ControllerConfig,
    ) -> Result<WorkflowController<H>, CompileError>
    where
        I: IntoIterator<Item = DependencyEntry>,
    {
        let defaults = self.defaults.as_ref().ok_or_else(|| CompileError::not_configured(self.name()))?;
        let dependencies = DependencyMap::build(defaults.iter().cloned(), overrides);
        let plans = compile_plans(&self.registry, &dependencies)?;
        debug!(
            handler = %self.name(),
            main_steps = plans.main.len(),
            teardown_steps = plans.teardown.len(),
            dependencies = dependencies.len(),
            "compiled workflow handler"
        );

        Ok(WorkflowController::new(
            self.name().to_string(),
            handler.into(),
            dependencies,
            plans,
            &self.table,
            config,
        ))
    }
}

impl<H> fmt::Debug for HandlerDefinition<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerDefinition")
            .field("registry", &self.registry)
            .field("table", &self.table)
            .field("configured", &self.defaults.is_some())
            .finish()
    }
}

/// Fluent registration API for a handler type.
///
/// Registration errors are collected as they happen and the first one is
/// returned by [`HandlerDefinitionBuilder::build`].
pub struct HandlerDefinitionBuilder<H> {
    registry: StepRegistry,
    table: StepTable<H>,
    defaults: Option<Vec<DependencyEntry>>,
    errors: Vec<RegistrationError>,
}

impl<H: WorkflowHandler> HandlerDefinitionBuilder<H> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            registry: StepRegistry::new(name),
            table: StepTable::new(),
            defaults: None,
            errors: Vec::new(),
        }
    }

    /// Declare the handler's default dependencies. May be empty.
    pub fn dependencies<I>(mut self, entries: I) -> Self
    where
        I: IntoIterator<Item = DependencyEntry>,
    {
        self.defaults.get_or_insert_with(Vec::new).extend(entries);
        self
    }

    /// Add one default dependency.
    pub fn dependency(mut self, entry: DependencyEntry) -> Self {
        self.defaults.get_or_insert_with(Vec::new).push(entry);
        self
    }

    /// Register a main step together with its callable.
    #[track_caller]
    pub fn step<K, T, F, Fut>(self, order: i64, key: K, tokens: T, callable: F) -> Self
    where
        K: Into<StepKey>,
        T: IntoIterator,
        T::Item: Into<DependencyToken>,
        F: Fn(Arc<H>, Dependencies) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        let descriptor = StepDescriptor::new(order, key, tokens);
        self.register_with_callable(StepPhase::Main, descriptor, step_fn(callable))
    }

    /// Register a teardown step together with its callable.
    #[track_caller]
    pub fn teardown<K, T, F, Fut>(self, order: i64, key: K, tokens: T, callable: F) -> Self
    where
        K: Into<StepKey>,
        T: IntoIterator,
        T::Item: Into<DependencyToken>,
        F: Fn(Arc<H>, Dependencies) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        let descriptor = StepDescriptor::new(order, key, tokens);
        self.register_with_callable(StepPhase::Teardown, descriptor, step_fn(callable))
    }

    /// Register a main-step descriptor without a callable.
    pub fn descriptor(mut self, descriptor: StepDescriptor) -> Self {
        self.record(StepPhase::Main, descriptor);
        self
    }

    /// Register a teardown descriptor without a callable.
    pub fn teardown_descriptor(mut self, descriptor: StepDescriptor) -> Self {
        self.record(StepPhase::Teardown, descriptor);
        self
    }

    /// Provide the callable for a key registered through a bare descriptor or a manifest.
    #[track_caller]
    pub fn callable(mut self, key: impl Into<StepKey>, callable: Arc<dyn StepCallable<H>>) -> Self {
        let key = key.into();
        if !self.table.insert(key.clone(), callable) {
            let handler = self.registry.handler().to_string();
            self.errors
                .push(RegistrationError::duplicate_callable(handler, key, RegistrationSite::caller()));
        }
        self
    }

    /// Register every descriptor of a step manifest.
    pub fn manifest(mut self, manifest: &StepManifest) -> Self {
        for phase in [StepPhase::Main, StepPhase::Teardown] {
            for descriptor in manifest.descriptors(phase) {
                self.record(phase, descriptor);
            }
        }
        self
    }

    pub fn build(mut self) -> Result<HandlerDefinition<H>, RegistrationError> {
        if !self.errors.is_empty() {
            return Err(self.errors.remove(0));
        }
        Ok(HandlerDefinition {
            registry: self.registry,
            table: self.table,
            defaults: self.defaults,
        })
    }

    fn register_with_callable(mut self, phase: StepPhase, descriptor: StepDescriptor, callable: Arc<dyn StepCallable<H>>) -> Self {
        let key = descriptor.key.clone();
        let origin = descriptor.origin.clone();
        if self.record(phase, descriptor) && !self.table.insert(key.clone(), callable) {
            let handler = self.registry.handler().to_string();
            self.errors.push(RegistrationError::duplicate_callable(handler, key, origin));
        }
        self
    }

    fn record(&mut self, phase: StepPhase, descriptor: StepDescriptor) -> bool {
        match self.registry.register(phase, descriptor) {
            Ok(()) => true,
            Err(error) => {
                self.errors.push(error);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::registry::NO_DEPENDENCIES;

    struct Release;
    impl WorkflowHandler for Release {}

    #[test]
    fn duplicate_main_keys_fail_at_registration() {
        let error = HandlerDefinition::<Release>::builder("release")
            .dependencies(Vec::new())
            .step(1, "build", NO_DEPENDENCIES, |_, _| async { Ok(json!(null)) })
            .step(2, "build", NO_DEPENDENCIES, |_, _| async { Ok(json!(null)) })
            .build()
            .expect_err("duplicate key should be rejected");

        assert!(matches!(error, RegistrationError::DuplicateRegistration { .. }));
        assert!(error.to_string().contains("'build' is already registered"), "unexpected: {error}");
        match error.origin() {
            RegistrationSite::Source { file, .. } => assert!(file.ends_with("definition.rs")),
            other => panic!("expected source site, got {other:?}"),
        }
    }

    #[test]
    fn same_key_may_be_registered_once_per_phase_with_a_shared_callable() {
        let definition = HandlerDefinition::<Release>::builder("release")
            .dependencies(Vec::new())
            .step(1, "flush", NO_DEPENDENCIES, |_, _| async { Ok(json!("flushed")) })
            .teardown_descriptor(StepDescriptor::new(1, "flush", NO_DEPENDENCIES))
            .build()
            .expect("build definition");

        assert_eq!(definition.registry().descriptors(StepPhase::Main).len(), 1);
        assert_eq!(definition.registry().descriptors(StepPhase::Teardown).len(), 1);
        assert_eq!(definition.steps().len(), 1);
    }

    #[test]
    fn second_callable_for_a_key_is_rejected() {
        let error = HandlerDefinition::<Release>::builder("release")
            .dependencies(Vec::new())
            .step(1, "flush", NO_DEPENDENCIES, |_, _| async { Ok(json!(null)) })
            .teardown(1, "flush", NO_DEPENDENCIES, |_, _| async { Ok(json!(null)) })
            .build()
            .expect_err("second callable should be rejected");

        assert!(matches!(error, RegistrationError::DuplicateCallable { .. }));
    }

    #[test]
    fn compile_requires_a_dependency_configuration() {
        let definition = HandlerDefinition::<Release>::builder("release")
            .step(1, "build", NO_DEPENDENCIES, |_, _| async { Ok(json!(null)) })
            .build()
            .expect("build definition");

        let error = definition.compile(Release, Vec::new()).expect_err("unconfigured handler");
        assert!(matches!(error, CompileError::NotConfiguredHandler { .. }));
    }
}
