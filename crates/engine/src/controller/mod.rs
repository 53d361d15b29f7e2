//! The compiled, ready-to-run workflow controller.
//!
//! A [`WorkflowController`] owns a handler instance, the merged dependency map,
//! and the validated main and teardown plans. [`WorkflowController::start`]
//! drives one run:
//!
//! 1. a fresh run id is generated and the profile is cleared;
//! 2. main steps run strictly one after another in plan order, each timed and
//!    recorded in the profile whether it succeeded or failed;
//! 3. the first failure sets the stop latch and the remaining main steps are
//!    skipped without a profile entry;
//! 4. every teardown step is started together and awaited as one batch, each
//!    failure reported and otherwise ignored.
//!
//! Step failures never make `start()` fail; they surface through the profile,
//! the returned [`RunOutcome`], `tracing`, and any registered [`RunObserver`].

mod invoke;
mod state;

use std::{fmt, sync::Arc, time::Instant};

use chrono::Utc;
use futures_util::{StreamExt, stream::FuturesUnordered};
use jalan_types::{
    ControllerEvent, FailureKind, ProfileEntry, RunOutcome, RunPhase, StepPhase, StepStatus, TeardownRecord, WorkflowProfile,
};
use tracing::{debug, error, info, warn};

pub use state::ControllerState;

use crate::{
    config::{ControllerConfig, OutputLifetime},
    dependency::DependencyMap,
    observer::RunObserver,
    registry::{CompiledPlans, ResolvedPlan, StepTable, WorkflowHandler},
};
use invoke::{BoundPlan, prepare_call, settle};

/// Drives runs of a single handler instance.
///
/// Runs take `&mut self`, so at most one run is in flight per controller.
pub struct WorkflowController<H> {
    name: String,
    handler: Arc<H>,
    dependencies: DependencyMap,
    main: BoundPlan<H>,
    teardown: BoundPlan<H>,
    config: ControllerConfig,
    observers: Vec<Arc<dyn RunObserver>>,
    state: ControllerState,
}

impl<H: WorkflowHandler> WorkflowController<H> {
    pub(crate) fn new(
        name: String,
        handler: Arc<H>,
        dependencies: DependencyMap,
        plans: CompiledPlans,
        table: &StepTable<H>,
        config: ControllerConfig,
    ) -> Self {
        let main = BoundPlan::bind(plans.main, table);
        let teardown = BoundPlan::bind(plans.teardown, table);
        for (phase, key) in main
            .unbound_keys()
            .map(|key| (StepPhase::Main, key))
            .chain(teardown.unbound_keys().map(|key| (StepPhase::Teardown, key)))
        {
            debug!(handler = %name, %phase, %key, "no callable bound; the step will fail when invoked");
        }

        Self {
            name,
            handler,
            dependencies,
            main,
            teardown,
            config,
            observers: Vec::new(),
            state: ControllerState::default(),
        }
    }

    /// Register an observer for every subsequent run.
    pub fn observe(&mut self, observer: Arc<dyn RunObserver>) {
        self.observers.push(observer);
    }

    pub fn with_observer(mut self, observer: Arc<dyn RunObserver>) -> Self {
        self.observe(observer);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn handler(&self) -> &Arc<H> {
        &self.handler
    }

    pub fn dependencies(&self) -> &DependencyMap {
        &self.dependencies
    }

    pub fn main_plan(&self) -> &ResolvedPlan {
        &self.main.plan
    }

    pub fn teardown_plan(&self) -> &ResolvedPlan {
        &self.teardown.plan
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub fn state(&self) -> &ControllerState {
        &self.state
    }

    pub fn profile(&self) -> &WorkflowProfile {
        self.state.profile()
    }

    pub fn run_id(&self) -> Option<&str> {
        self.state.run_id()
    }

    pub fn start_time(&self) -> Option<chrono::DateTime<Utc>> {
        self.state.start_time()
    }

    pub fn end_time(&self) -> Option<chrono::DateTime<Utc>> {
        self.state.end_time()
    }

    pub fn should_stop(&self) -> bool {
        self.state.should_stop()
    }

    pub fn phase(&self) -> &RunPhase {
        self.state.phase()
    }

    pub fn teardown_records(&self) -> &[TeardownRecord] {
        self.state.teardown_records()
    }

    /// Execute one run: main steps in order, then every teardown step.
    ///
    /// Resolves once teardown has settled. Step failures are absorbed into the
    /// state and reported; they are never returned as errors.
    // TODO: a per-step `tokio::time::timeout` read from `ControllerConfig` would keep a hung step from blocking the run.
    pub async fn start(&mut self) -> RunOutcome {
        let run_id = state::generate_run_id(&self.config.run_id_prefix);
        let started_at = Utc::now();
        self.state.begin(run_id.clone(), started_at);
        if self.config.output_lifetime == OutputLifetime::PerRun
            && let Some(store) = self.handler.output_store()
        {
            store.reset();
        }

        info!(
            handler = %self.name,
            run_id = %run_id,
            main_steps = self.main.plan.len(),
            teardown_steps = self.teardown.plan.len(),
            "workflow run started"
        );
        self.notify(&ControllerEvent::RunStarted {
            run_id: run_id.clone(),
            at: started_at,
        });

        let outcome = self.run_main_steps(&run_id).await;

        self.state.phase = RunPhase::TearingDown;
        self.run_teardown(&run_id).await;

        let finished_at = Utc::now();
        self.state.finish(outcome.clone(), finished_at);
        info!(
            handler = %self.name,
            run_id = %run_id,
            stopped = outcome.is_stopped(),
            steps_run = self.state.profile.len(),
            total_ms = self.state.profile.total_time().as_millis() as u64,
            "workflow run finished"
        );
        self.notify(&ControllerEvent::RunFinished {
            run_id,
            outcome: outcome.clone(),
            finished_at,
        });
        outcome
    }

    async fn run_main_steps(&mut self, run_id: &str) -> RunOutcome {
        for (step, callable) in self.main.iter() {
            self.notify(&ControllerEvent::StepStarted {
                run_id: run_id.to_string(),
                order: step.order,
                key: step.key.clone(),
            });

            let started = Instant::now();
            let call = prepare_call(step, callable, &self.handler, &self.dependencies);
            let result = settle(&step.key, call).await;
            let time_taken = started.elapsed();

            let status = match result {
                Ok(output) => {
                    if let Some(store) = self.handler.output_store() {
                        store.set_output(step.key.clone(), output);
                    }
                    StepStatus::Succeeded
                }
                Err(err) => {
                    let message = format!("{err:#}");
                    if self.config.continue_on_step_failure {
                        warn!(run_id = %run_id, order = step.order, key = %step.key, error = %message, "workflow step failed; continuing");
                    } else {
                        error!(run_id = %run_id, order = step.order, key = %step.key, error = %message, "workflow step failed");
                        self.state.should_stop = true;
                    }
                    for observer in &self.observers {
                        observer.notify(&ControllerEvent::StepFailed {
                            run_id: run_id.to_string(),
                            kind: FailureKind::StepInvocation,
                            order: step.order,
                            key: step.key.clone(),
                            error: message.clone(),
                        });
                    }
                    StepStatus::Failed
                }
            };

            self.state.profile.record(
                step.key.clone(),
                ProfileEntry {
                    order: step.order,
                    time_taken,
                    status,
                },
            );
            debug!(run_id = %run_id, order = step.order, key = %step.key, ?status, duration_ms = time_taken.as_millis() as u64, "workflow step settled");
            self.notify(&ControllerEvent::StepFinished {
                run_id: run_id.to_string(),
                order: step.order,
                key: step.key.clone(),
                status,
                time_taken,
            });

            if self.state.should_stop {
                self.notify(&ControllerEvent::RunStopped {
                    run_id: run_id.to_string(),
                    order: step.order,
                    key: step.key.clone(),
                });
                return RunOutcome::Stopped {
                    key: step.key.clone(),
                    order: step.order,
                };
            }
        }
        RunOutcome::Completed
    }

    async fn run_teardown(&mut self, run_id: &str) {
        self.notify(&ControllerEvent::TeardownStarted {
            run_id: run_id.to_string(),
            count: self.teardown.plan.len(),
        });

        let mut pending: FuturesUnordered<_> = self
            .teardown
            .iter()
            .map(|(step, callable)| {
                let started = Instant::now();
                let call = prepare_call(step, callable, &self.handler, &self.dependencies);
                async move {
                    let result = settle(&step.key, call).await;
                    (step, started.elapsed(), result)
                }
            })
            .collect();

        let mut records = Vec::with_capacity(self.teardown.plan.len());
        while let Some((step, time_taken, result)) = pending.next().await {
            let status = match result {
                Ok(_) => StepStatus::Succeeded,
                Err(err) => {
                    let message = format!("{err:#}");
                    warn!(run_id = %run_id, order = step.order, key = %step.key, error = %message, "teardown step failed");
                    for observer in &self.observers {
                        observer.notify(&ControllerEvent::TeardownFailed {
                            run_id: run_id.to_string(),
                            kind: FailureKind::Teardown,
                            order: step.order,
                            key: step.key.clone(),
                            error: message.clone(),
                        });
                    }
                    StepStatus::Failed
                }
            };
            records.push(TeardownRecord {
                order: step.order,
                key: step.key.clone(),
                time_taken,
                status,
            });
        }
        drop(pending);

        records.sort_by_key(|record| record.order);
        self.state.teardown = records;
    }

    fn notify(&self, event: &ControllerEvent) {
        for observer in &self.observers {
            observer.notify(event);
        }
    }
}

impl<H> fmt::Debug for WorkflowController<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkflowController")
            .field("name", &self.name)
            .field("main", &self.main.plan)
            .field("teardown", &self.teardown.plan)
            .field("dependencies", &self.dependencies)
            .field("config", &self.config)
            .field("observers", &self.observers.len())
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}
