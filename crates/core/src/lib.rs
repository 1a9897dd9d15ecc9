// Copyright (c) 2023 - 2026 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Core runtime services: supervised task spawning, the model registry,
//! the expression-evaluator contract and run reporting.

mod error;
mod evaluator;
mod metric_definitions;
mod registry;
mod report;
mod task_center;
mod task_kind;

pub use error::ShutdownError;
pub use evaluator::{EvalError, Evaluator, ScopeEvaluator};
pub use registry::{ModelRegistry, RegistryError};
pub use report::{NoopReporter, RunReporter, StatsReporter, TagSet};
pub use task_center::{TaskCenter, TaskCenterBuilder};
pub use task_kind::{TaskId, TaskKind};
