// Copyright (c) 2023 - 2026 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(1);

/// Unique id of a spawned task.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    derive_more::Display,
    derive_more::From,
    derive_more::Into,
)]
#[display("t{}", _0)]
pub struct TaskId(u64);

impl TaskId {
    pub(crate) fn next() -> Self {
        Self(NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// What a spawned task is doing. Determines shutdown behavior and metric
/// labels.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    strum::EnumProperty,
    strum::IntoStaticStr,
)]
pub enum TaskKind {
    /// One activity execution fired by an event.
    ActivityRun,
    /// A detached branch launched by a `Parallel` node.
    DetachedBranch,
    /// One unguarded firing launched by a stochastic window check.
    StochasticFiring,
    /// The periodic stochastic window driver.
    #[strum(props(OnCancel = "wait"))]
    WindowDriver,
    /// Anything else the embedding system runs under supervision.
    Background,
}

impl TaskKind {
    /// Whether shutdown waits for this task to observe its cancellation
    /// token and finish, rather than abandoning it.
    pub fn should_wait_on_cancel(&self) -> bool {
        use strum::EnumProperty;
        self.get_str("OnCancel") == Some("wait")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_ids_are_unique_and_ordered() {
        let a = TaskId::next();
        let b = TaskId::next();
        assert!(b > a);
        assert!(a.to_string().starts_with('t'));
    }

    #[test]
    fn only_the_driver_waits_on_cancel() {
        assert!(TaskKind::WindowDriver.should_wait_on_cancel());
        assert!(!TaskKind::ActivityRun.should_wait_on_cancel());
        assert!(!TaskKind::DetachedBranch.should_wait_on_cancel());
    }
}
