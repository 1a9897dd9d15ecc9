// Copyright (c) 2023 - 2026 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Events bind an activity to a firing mechanism: a manual call, an
//! external stimulus, or a stochastic distribution (see
//! [`stochastic`]).
//!
//! One firing brackets the activity execution with the event's preparation
//! steps, applies the optional guard with bounded retries, releases the
//! current waiter generation and owns the started/finished/errored
//! accounting. Failures inside the execution are handled here, logged with
//! their root cause and converted into an error count; they never crash
//! the process or sibling executions.

mod stochastic;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use metrics::counter;
use tokio::sync::watch;
use tracing::{debug, error, warn};

use protosim_core::{EvalError, ShutdownError, TagSet, TaskId, TaskKind};
use protosim_types::errors::root_cause;
use protosim_types::identifiers::{ActivityName, EventName};
use protosim_types::scope::VarScope;
use protosim_types::GenericError;

use crate::activity::{Activity, Completion, ExecutionContext, WaitTrigger};
use crate::error::{AssemblyError, FiringError};
use crate::metric_definitions::{ENGINE_GUARD_RETRIES, ENGINE_WAITERS_RELEASED};
use crate::RuntimeContext;

pub use stochastic::{StochasticEvent, WindowDriver};

/// Side-effecting setup/teardown bracketing one firing, e.g. reserving an
/// exclusive resource. Tags returned by `prepare` are attached to the
/// firing's run reports.
#[async_trait::async_trait]
pub trait PreparationStep: Send + Sync + 'static {
    async fn prepare(&self, scope: &Arc<VarScope>) -> Result<TagSet, GenericError>;

    async fn release(&self, scope: &Arc<VarScope>);
}

/// Inbound-stimulus binding. At start time it receives a handle it can use
/// to fire the event from its callback, e.g. when a matching message
/// arrives on a connection.
pub trait ExternalTriggerBinding: Send + Sync + 'static {
    fn attach(&self, handle: EventHandle);
}

/// Execution counters owned by one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RunCounts {
    pub started: u64,
    pub finished: u64,
    pub errored: u64,
}

/// Assembles an [`Event`]. Preparation steps and external-trigger
/// registrations can only be attached here; once built, the event is
/// immutable apart from its counters and waiter generation.
pub struct EventBuilder {
    name: EventName,
    activity: ActivityName,
    preparations: Vec<Arc<dyn PreparationStep>>,
    external_triggers: Vec<Arc<dyn ExternalTriggerBinding>>,
    guard: Option<Guard>,
}

struct Guard {
    expression: String,
    limit: u32,
}

impl EventBuilder {
    pub fn new(name: impl Into<EventName>, activity: impl Into<ActivityName>) -> Self {
        Self {
            name: name.into(),
            activity: activity.into(),
            preparations: Vec::new(),
            external_triggers: Vec::new(),
            guard: None,
        }
    }

    pub fn preparation(mut self, step: Arc<dyn PreparationStep>) -> Self {
        self.preparations.push(step);
        self
    }

    pub fn external_trigger(mut self, binding: Arc<dyn ExternalTriggerBinding>) -> Self {
        self.external_triggers.push(binding);
        self
    }

    /// Guard expression that must hold before a firing proceeds, with the
    /// number of preparation attempts it is allowed.
    pub fn guard(mut self, expression: impl Into<String>, limit: u32) -> Self {
        self.guard = Some(Guard {
            expression: expression.into(),
            limit: limit.max(1),
        });
        self
    }

    /// Resolve the activity reference and wire up external triggers. An
    /// event cannot exist unresolved: a missing activity name is fatal to
    /// this definition.
    pub fn build(self, runtime: RuntimeContext) -> Result<Arc<Event>, AssemblyError> {
        let activity = runtime.registry.resolve_activity(&self.activity)?;
        crate::metric_definitions::describe_metrics();

        let event = Arc::new(Event {
            name: self.name,
            activity,
            runtime,
            preparations: self.preparations,
            guard: self.guard,
            waiter_generation: watch::Sender::new(0),
            started: AtomicU64::new(0),
            finished: AtomicU64::new(0),
            errored: AtomicU64::new(0),
        });

        for binding in &self.external_triggers {
            binding.attach(EventHandle {
                event: Arc::clone(&event),
            });
        }

        Ok(event)
    }
}

pub struct Event {
    name: EventName,
    activity: Arc<Activity>,
    runtime: RuntimeContext,
    preparations: Vec<Arc<dyn PreparationStep>>,
    guard: Option<Guard>,
    /// Bumped exactly once per successful guard passage; waiters hold a
    /// receiver and wake on the change. The watch channel serializes
    /// concurrent firings against waiter registration.
    waiter_generation: watch::Sender<u64>,
    started: AtomicU64,
    finished: AtomicU64,
    errored: AtomicU64,
}

impl Event {
    pub fn name(&self) -> &EventName {
        &self.name
    }

    pub fn activity(&self) -> &Arc<Activity> {
        &self.activity
    }

    pub fn counts(&self) -> RunCounts {
        RunCounts {
            started: self.started.load(Ordering::Relaxed),
            finished: self.finished.load(Ordering::Relaxed),
            errored: self.errored.load(Ordering::Relaxed),
        }
    }

    /// Future completing exactly once, the next time a firing passes its
    /// guard. All waiters of one generation are released together; a
    /// waiter registered after that release waits for the following
    /// firing.
    pub fn waiter_signal(&self) -> impl std::future::Future<Output = ()> + Send + 'static {
        let mut receiver = self.waiter_generation.subscribe();
        let observed = *receiver.borrow();
        async move {
            // sender dropping means the event is gone; nothing to wake for
            let _ = receiver.wait_for(|generation| *generation > observed).await;
        }
    }

    /// Adapter so a `Wait` node can block on this event's next firing.
    pub fn wait_trigger(self: &Arc<Self>) -> Arc<dyn WaitTrigger> {
        struct EventWaitTrigger(Arc<Event>);

        #[async_trait::async_trait]
        impl WaitTrigger for EventWaitTrigger {
            async fn wait(&self, _scope: &Arc<VarScope>) -> Result<(), GenericError> {
                self.0.waiter_signal().await;
                Ok(())
            }
        }

        Arc::new(EventWaitTrigger(Arc::clone(self)))
    }

    /// The central operation: prepare, guard, release waiters, execute the
    /// bound activity, account. See the module docs for the exact
    /// bracketing rules.
    pub async fn trigger(&self, scope: &Arc<VarScope>) -> Result<Completion, FiringError> {
        self.fire(scope, true).await
    }

    /// Firing path used by stochastic window checks: same bracketing, no
    /// guard.
    pub async fn trigger_unguarded(
        &self,
        scope: &Arc<VarScope>,
    ) -> Result<Completion, FiringError> {
        self.fire(scope, false).await
    }

    async fn fire(&self, scope: &Arc<VarScope>, guarded: bool) -> Result<Completion, FiringError> {
        let guard = if guarded { self.guard.as_ref() } else { None };

        // Preparation/guard loop. On exit with Ok, all steps are prepared
        // and the guard (if any) passed.
        let tags = self.pass_guard(scope, guard).await?;

        // Release the current waiter generation, exactly once per firing.
        self.waiter_generation.send_modify(|generation| *generation += 1);
        counter!(ENGINE_WAITERS_RELEASED).increment(1);

        let result = self.run_activity(scope, &tags).await;

        // Teardown always runs, in registration order, whatever happened
        // above.
        self.release_preparations(scope).await;

        result
    }

    /// Run all preparation steps and evaluate the guard, re-preparing up
    /// to the guard's limit. On failure everything prepared so far has
    /// been released.
    async fn pass_guard(
        &self,
        scope: &Arc<VarScope>,
        guard: Option<&Guard>,
    ) -> Result<TagSet, FiringError> {
        let mut attempts = 0;
        loop {
            let tags = match self.run_preparations(scope).await {
                Ok(tags) => tags,
                Err((err, ran)) => {
                    self.release_first(scope, ran).await;
                    return Err(FiringError::Preparation {
                        event: self.name.clone(),
                        source: err,
                    });
                }
            };

            let Some(guard) = guard else {
                return Ok(tags);
            };

            attempts += 1;
            match self.evaluate_guard(guard, scope).await {
                Ok(true) => return Ok(tags),
                Ok(false) => {
                    self.release_preparations(scope).await;
                    if attempts >= guard.limit {
                        warn!(
                            event = %self.name,
                            guard = %guard.expression,
                            attempts,
                            "Guard never passed, giving up on this firing"
                        );
                        return Err(FiringError::GuardExhausted {
                            event: self.name.clone(),
                            guard: guard.expression.clone(),
                            attempts,
                        });
                    }
                    counter!(ENGINE_GUARD_RETRIES).increment(1);
                    debug!(event = %self.name, attempts, "Guard false, re-preparing");
                }
                Err(err) => {
                    self.release_preparations(scope).await;
                    return Err(err.into());
                }
            }
        }
    }

    async fn evaluate_guard(
        &self,
        guard: &Guard,
        scope: &Arc<VarScope>,
    ) -> Result<bool, EvalError> {
        let value = self
            .runtime
            .evaluator
            .evaluate(&guard.expression, scope)
            .await?;
        value.as_bool().ok_or_else(|| {
            EvalError::new(
                guard.expression.clone(),
                "guard did not evaluate to a boolean",
            )
        })
    }

    /// Run every preparation step in registration order, collecting tags.
    /// On error, returns the steps that already ran.
    async fn run_preparations(
        &self,
        scope: &Arc<VarScope>,
    ) -> Result<TagSet, (GenericError, usize)> {
        let mut tags = TagSet::new();
        for (ran, step) in self.preparations.iter().enumerate() {
            match step.prepare(scope).await {
                Ok(step_tags) => tags.extend(step_tags),
                Err(err) => return Err((err, ran)),
            }
        }
        Ok(tags)
    }

    async fn release_preparations(&self, scope: &Arc<VarScope>) {
        self.release_first(scope, self.preparations.len()).await;
    }

    async fn release_first(&self, scope: &Arc<VarScope>, count: usize) {
        for step in &self.preparations[..count] {
            step.release(scope).await;
        }
    }

    /// Execute the bound activity and do the started/finished/errored
    /// accounting. Execution failures are unwrapped to the root cause,
    /// logged and counted here, and also surfaced to the direct caller.
    async fn run_activity(
        &self,
        scope: &Arc<VarScope>,
        tags: &TagSet,
    ) -> Result<Completion, FiringError> {
        let ctx = ExecutionContext::new(self.activity.name().clone(), self.runtime.clone());
        let execution_id = ctx.execution_id;

        self.started.fetch_add(1, Ordering::Relaxed);
        self.runtime
            .reporter
            .report_started(&self.name, self.activity.name(), execution_id, tags);

        let start = Instant::now();
        match self.activity.execute(&ctx, scope).await {
            Ok(completion) => {
                self.finished.fetch_add(1, Ordering::Relaxed);
                self.runtime.reporter.report_finished(
                    &self.name,
                    self.activity.name(),
                    execution_id,
                    start.elapsed(),
                    tags,
                );
                Ok(completion)
            }
            Err(err) => {
                self.errored.fetch_add(1, Ordering::Relaxed);
                let cause = root_cause(&err);
                error!(
                    event = %self.name,
                    activity = %self.activity.name(),
                    execution = %execution_id,
                    error = %cause,
                    "Execution failed"
                );
                self.runtime.reporter.report_errored(
                    &self.name,
                    self.activity.name(),
                    execution_id,
                    start.elapsed(),
                    &cause.to_string(),
                    tags,
                );
                Err(err.into())
            }
        }
    }
}

/// Cheap handle for firing an event from outside the engine, e.g. from an
/// inbound-stimulus callback or an actor script. Each firing runs as its
/// own supervised task with a fresh scope derived from the model root.
#[derive(Clone)]
pub struct EventHandle {
    event: Arc<Event>,
}

impl EventHandle {
    pub fn fire(&self) -> Result<TaskId, ShutdownError> {
        let event = Arc::clone(&self.event);
        self.event.runtime.task_center.spawn(
            TaskKind::ActivityRun,
            "event-firing",
            async move {
                let scope = VarScope::derive(&event.runtime.registry.root_scope());
                if let Err(err) = event.trigger(&scope).await {
                    // the event boundary already accounted and logged this
                    // firing's failure
                    debug!(event = %event.name(), %err, "Firing failed");
                }
                Ok(())
            },
        )
    }

    pub fn event(&self) -> &Arc<Event> {
        &self.event
    }
}
