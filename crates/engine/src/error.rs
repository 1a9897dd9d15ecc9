// Copyright (c) 2023 - 2026 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use protosim_core::{EvalError, RegistryError, ShutdownError};
use protosim_types::identifiers::{ActivityName, EventName, NodeName};
use protosim_types::GenericError;

/// Configuration errors, detected while assembling or starting a
/// definition and fatal to it.
#[derive(Debug, thiserror::Error)]
pub enum AssemblyError {
    #[error("activity '{activity}': jump target '{target}' does not exist")]
    UnresolvedJumpTarget {
        activity: ActivityName,
        target: NodeName,
    },
    #[error("activity '{activity}': node name '{name}' is used more than once")]
    DuplicateNodeName {
        activity: ActivityName,
        name: NodeName,
    },
    #[error("activity '{activity}': a wait accepts at most one timeout arm")]
    DuplicateTimeout { activity: ActivityName },
    #[error("activity '{activity}': a wait needs at least one arm")]
    EmptyWait { activity: ActivityName },
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Failure inside one activity execution. Aborts the whole invocation and
/// is handled at the event boundary.
#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    #[error("leaf node failed")]
    Leaf(#[source] GenericError),
    #[error(transparent)]
    Eval(#[from] EvalError),
    #[error("condition '{expression}' did not evaluate to a boolean")]
    NonBooleanCondition { expression: String },
    #[error("sample expression '{expression}' did not evaluate to a number")]
    NonNumericSample { expression: String },
    #[error("jump to '{target}' escaped every enclosing container")]
    UnroutableJump { target: NodeName },
    #[error("wait trigger failed")]
    WaitTrigger(#[source] GenericError),
    #[error("execution stopped")]
    Shutdown(#[from] ShutdownError),
}

/// Failure of one event firing.
#[derive(Debug, thiserror::Error)]
pub enum FiringError {
    #[error("event '{event}': guard '{guard}' still false after {attempts} attempts")]
    GuardExhausted {
        event: EventName,
        guard: String,
        attempts: u32,
    },
    #[error("event '{event}': preparation step failed")]
    Preparation {
        event: EventName,
        #[source]
        source: GenericError,
    },
    #[error(transparent)]
    Eval(#[from] EvalError),
    #[error(transparent)]
    Execution(#[from] ExecutionError),
    #[error("firing stopped")]
    Shutdown(#[from] ShutdownError),
}
