// Copyright (c) 2023 - 2026 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! The execution engine: a graph-structured activity interpreter and the
//! event/trigger system firing activities on demand, on external stimuli,
//! or stochastically.
//!
//! Activities are assembled once into sealed, immutable graphs and then
//! executed concurrently, one execution per firing, each with its own
//! variable scope. All fire-and-forget work (detached branches, stochastic
//! firings) runs supervised under the task center.

pub mod activity;
mod clock;
mod error;
pub mod event;
mod metric_definitions;

use std::sync::Arc;

use protosim_core::{Evaluator, ModelRegistry, RunReporter, TaskCenter};
use protosim_stats::BucketRegistry;

pub use activity::{
    Activity, ActivityBuilder, Completion, ExecutionContext, LeafBehavior, NodeIdx, Outcome,
    WaitArm, WaitTrigger,
};
pub use clock::{Clock, TokioClock};
pub use error::{AssemblyError, ExecutionError, FiringError};
pub use event::{
    Event, EventBuilder, EventHandle, ExternalTriggerBinding, PreparationStep, RunCounts,
    StochasticEvent, WindowDriver,
};

/// The registry carries sealed activities.
pub type Registry = ModelRegistry<Activity>;

/// Capability bundle handed to every component instead of ambient globals:
/// the task center, the pluggable evaluator/reporter contracts, the shared
/// buckets and the clock.
#[derive(Clone)]
pub struct RuntimeContext {
    pub task_center: TaskCenter,
    pub registry: Arc<Registry>,
    pub evaluator: Arc<dyn Evaluator>,
    pub reporter: Arc<dyn RunReporter>,
    pub buckets: Arc<BucketRegistry>,
    pub clock: Arc<dyn Clock>,
}

static_assertions::assert_impl_all!(RuntimeContext: Send, Sync, Clone);
