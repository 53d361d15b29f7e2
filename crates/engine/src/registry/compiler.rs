//! Step ordering and dependency validation.
//!
//! Compilation sorts each phase's descriptors by `order` (stable, so equal
//! orders keep registration order), checks every required token against the
//! merged dependency map, and either yields complete plans or fails before any
//! step can run.

use std::collections::HashSet;

use jalan_types::{StepKey, StepPhase};
use serde::Serialize;

use crate::{
    dependency::{DependencyMap, DependencyToken},
    error::{CompileError, MissingToken, UnresolvedDependencies, UnresolvedStep},
    registry::{StepDescriptor, StepRegistry},
};

/// One validated entry of a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedStep {
    pub order: i64,
    pub key: StepKey,
    /// Tokens to resolve before each call, all known to be present in the map.
    pub dependencies: Vec<DependencyToken>,
}

/// Validated, ordered steps of one phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedPlan {
    phase: StepPhase,
    steps: Vec<PlannedStep>,
}

impl ResolvedPlan {
    pub fn phase(&self) -> StepPhase {
        self.phase
    }

    pub fn steps(&self) -> &[PlannedStep] {
        &self.steps
    }

    pub fn keys(&self) -> impl Iterator<Item = &StepKey> {
        self.steps.iter().map(|step| &step.key)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Main and teardown plans of one handler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompiledPlans {
    pub main: ResolvedPlan,
    pub teardown: ResolvedPlan,
}

/// Compile a single phase's descriptors against `dependencies`.
pub fn compile_plan(
    handler: &str,
    phase: StepPhase,
    descriptors: &[StepDescriptor],
    dependencies: &DependencyMap,
) -> Result<ResolvedPlan, CompileError> {
    let ordered = order_descriptors(handler, phase, descriptors)?;
    let unresolved = unresolved_steps(phase, &ordered, dependencies);
    if !unresolved.is_empty() {
        return Err(CompileError::UnresolvedDependency(UnresolvedDependencies {
            handler: handler.to_string(),
            steps: unresolved,
        }));
    }
    Ok(build_plan(phase, &ordered))
}

/// Compile both phases of `registry`.
///
/// Unresolved tokens are collected across main and teardown steps so one
/// failed attempt reports every missing dependency.
pub fn compile_plans(registry: &StepRegistry, dependencies: &DependencyMap) -> Result<CompiledPlans, CompileError> {
    let handler = registry.handler();
    let main = order_descriptors(handler, StepPhase::Main, registry.descriptors(StepPhase::Main))?;
    let teardown = order_descriptors(handler, StepPhase::Teardown, registry.descriptors(StepPhase::Teardown))?;

    let mut unresolved = unresolved_steps(StepPhase::Main, &main, dependencies);
    unresolved.extend(unresolved_steps(StepPhase::Teardown, &teardown, dependencies));
    if !unresolved.is_empty() {
        return Err(CompileError::UnresolvedDependency(UnresolvedDependencies {
            handler: handler.to_string(),
            steps: unresolved,
        }));
    }

    Ok(CompiledPlans {
        main: build_plan(StepPhase::Main, &main),
        teardown: build_plan(StepPhase::Teardown, &teardown),
    })
}

fn order_descriptors<'a>(
    handler: &str,
    phase: StepPhase,
    descriptors: &'a [StepDescriptor],
) -> Result<Vec<&'a StepDescriptor>, CompileError> {
    let mut seen = HashSet::new();
    for descriptor in descriptors {
        if !seen.insert(&descriptor.key) {
            return Err(CompileError::DuplicateRegistration {
                handler: handler.to_string(),
                phase,
                key: descriptor.key.clone(),
                origin: descriptor.origin.clone(),
            });
        }
    }

    let mut ordered: Vec<&StepDescriptor> = descriptors.iter().collect();
    // `sort_by_key` is stable: equal orders keep discovery order.
    ordered.sort_by_key(|descriptor| descriptor.order);
    Ok(ordered)
}

fn unresolved_steps(phase: StepPhase, ordered: &[&StepDescriptor], dependencies: &DependencyMap) -> Vec<UnresolvedStep> {
    ordered
        .iter()
        .filter_map(|descriptor| {
            let missing: Vec<MissingToken> = descriptor
                .required_tokens
                .iter()
                .enumerate()
                .filter(|(_, token)| !dependencies.contains(token))
                .map(|(position, token)| MissingToken {
                    position,
                    token: token.clone(),
                })
                .collect();
            (!missing.is_empty()).then(|| UnresolvedStep {
                phase,
                key: descriptor.key.clone(),
                origin: descriptor.origin.clone(),
                missing,
            })
        })
        .collect()
}

fn build_plan(phase: StepPhase, ordered: &[&StepDescriptor]) -> ResolvedPlan {
    ResolvedPlan {
        phase,
        steps: ordered
            .iter()
            .map(|descriptor| PlannedStep {
                order: descriptor.order,
                key: descriptor.key.clone(),
                dependencies: descriptor.required_tokens.clone(),
            })
            .collect(),
    }
}
