//! Building and settling a single step call.

use std::{
    any::Any,
    panic::{self, AssertUnwindSafe},
    sync::Arc,
};

use futures_util::FutureExt;
use jalan_types::StepKey;
use serde_json::Value;

use crate::{
    dependency::{DependencyMap, DependencyToken},
    error::StepError,
    registry::{PlannedStep, ResolvedPlan, StepCallable, StepFuture, StepTable},
};

/// A plan whose steps are bound to their callables.
///
/// Binding happens once at compile time; a step whose key has no callable stays
/// unbound and fails when it is invoked.
pub(crate) struct BoundPlan<H> {
    pub(crate) plan: ResolvedPlan,
    callables: Vec<Option<Arc<dyn StepCallable<H>>>>,
}

impl<H> BoundPlan<H> {
    pub(crate) fn bind(plan: ResolvedPlan, table: &StepTable<H>) -> Self {
        let callables = plan.steps().iter().map(|step| table.get(step.key.as_str()).cloned()).collect();
        Self { plan, callables }
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (&PlannedStep, Option<&Arc<dyn StepCallable<H>>>)> {
        self.plan.steps().iter().zip(self.callables.iter().map(Option::as_ref))
    }

    pub(crate) fn unbound_keys(&self) -> impl Iterator<Item = &StepKey> {
        self.iter().filter(|(_, callable)| callable.is_none()).map(|(step, _)| &step.key)
    }
}

/// Resolve the step's dependencies and create its future.
///
/// Factories run here, so every call sees freshly produced values.
pub(crate) fn prepare_call<H>(
    step: &PlannedStep,
    callable: Option<&Arc<dyn StepCallable<H>>>,
    handler: &Arc<H>,
    dependencies: &DependencyMap,
) -> anyhow::Result<StepFuture> {
    let callable = callable.ok_or_else(|| StepError::not_invocable(step.key.clone()))?;
    let prepared = panic::catch_unwind(AssertUnwindSafe(|| -> anyhow::Result<StepFuture> {
        let resolved = dependencies.resolve(&step.dependencies)?;
        Ok(callable.call(handler.clone(), resolved))
    }));
    match prepared {
        Ok(result) => result,
        Err(payload) => Err(StepError::panicked(step.key.clone(), panic_message(payload.as_ref())).into()),
    }
}

/// Await a prepared call, turning a panic into an ordinary step failure.
pub(crate) async fn settle(key: &StepKey, call: anyhow::Result<StepFuture>) -> anyhow::Result<Value> {
    let future = call?;
    match AssertUnwindSafe(future).catch_unwind().await {
        Ok(result) => result,
        Err(payload) => Err(StepError::panicked(key.clone(), panic_message(payload.as_ref())).into()),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        return (*message).to_string();
    }
    if let Some(message) = payload.downcast_ref::<String>() {
        return message.clone();
    }
    "non-string panic payload".to_string()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::{
        dependency::{Dependencies, DependencyEntry},
        registry::step_fn,
    };

    struct Bystander;

    fn planned(key: &str, tokens: &[&'static str]) -> PlannedStep {
        PlannedStep {
            order: 1,
            key: key.into(),
            dependencies: tokens.iter().copied().map(DependencyToken::from_static).collect(),
        }
    }

    #[tokio::test]
    async fn missing_callable_is_not_a_function() {
        let step = planned("deploy", &[]);
        let call = prepare_call::<Bystander>(&step, None, &Arc::new(Bystander), &DependencyMap::default());
        let error = settle(&step.key, call).await.expect_err("nothing to call");
        assert_eq!(error.to_string(), "deploy is not a function");
    }

    #[tokio::test]
    async fn dependencies_are_passed_positionally() {
        let dependencies = DependencyMap::build(
            vec![
                DependencyEntry::provide("greeting", || "hello".to_string()),
                DependencyEntry::provide("target", || "world".to_string()),
            ],
            Vec::new(),
        );
        let callable = step_fn(|_: Arc<Bystander>, resolved: Dependencies| async move {
            let greeting = resolved.get::<String>(0)?;
            let target = resolved.get::<String>(1)?;
            Ok(json!(format!("{greeting} {target}")))
        });
        let step = planned("greet", &["greeting", "target"]);

        let call = prepare_call(&step, Some(&callable), &Arc::new(Bystander), &dependencies);
        let output = settle(&step.key, call).await.expect("greet succeeds");
        assert_eq!(output, json!("hello world"));
    }

    #[tokio::test]
    async fn panics_become_step_failures() {
        let callable = step_fn(|_: Arc<Bystander>, _: Dependencies| async move {
            if true {
                panic!("disk on fire");
            }
            Ok(json!(null))
        });
        let step = planned("burn", &[]);

        let call = prepare_call(&step, Some(&callable), &Arc::new(Bystander), &DependencyMap::default());
        let error = settle(&step.key, call).await.expect_err("panic is caught");
        assert_eq!(error.to_string(), "burn panicked: disk on fire");
    }
}
