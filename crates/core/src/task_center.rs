// Copyright (c) 2023 - 2026 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::{Future, FutureExt};
use metrics::counter;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::{CancellationToken, WaitForCancellationFutureOwned};
use tracing::{debug, error, info, trace};

use crate::metric_definitions::{TC_FINISHED, TC_SPAWN, TC_STATUS_COMPLETED, TC_STATUS_FAILED};
use crate::{metric_definitions, ShutdownError, TaskId, TaskKind};

/// Task center is used to supervise the runtime's fire-and-forget work:
/// every firing, detached branch and stochastic launch goes through here so
/// that failures are captured and logged by the launcher's own error path
/// rather than left as unobserved task failures.
#[derive(Clone)]
pub struct TaskCenter {
    inner: Arc<TaskCenterInner>,
}

static_assertions::assert_impl_all!(TaskCenter: Send, Sync, Clone);

#[derive(Clone)]
struct TaskContext {
    id: TaskId,
    name: &'static str,
    kind: TaskKind,
    /// cancel this token to request cancelling this task.
    cancellation_token: CancellationToken,
}

struct Task {
    context: TaskContext,
    handle: Mutex<Option<JoinHandle<()>>>,
}

struct TaskCenterInner {
    global_cancel_token: CancellationToken,
    shutdown_requested: AtomicBool,
    managed_tasks: Mutex<HashMap<TaskId, Arc<Task>>>,
}

/// Used to create a new task center. In practice there is a single task
/// center per simulation run, but integration tests may build several.
#[derive(Default)]
pub struct TaskCenterBuilder {}

impl TaskCenterBuilder {
    pub fn build(self) -> TaskCenter {
        metric_definitions::describe_metrics();
        TaskCenter {
            inner: Arc::new(TaskCenterInner {
                global_cancel_token: CancellationToken::new(),
                shutdown_requested: AtomicBool::new(false),
                managed_tasks: Mutex::new(HashMap::new()),
            }),
        }
    }
}

impl TaskCenter {
    /// Launch a supervised task. The future's error is logged and counted
    /// by the task center; the caller is not expected to join the task.
    #[track_caller]
    pub fn spawn<F>(
        &self,
        kind: TaskKind,
        name: &'static str,
        future: F,
    ) -> Result<TaskId, ShutdownError>
    where
        F: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        if self.inner.shutdown_requested.load(Ordering::Relaxed) {
            return Err(ShutdownError);
        }

        let id = TaskId::next();
        let context = TaskContext {
            id,
            name,
            kind,
            cancellation_token: self.inner.global_cancel_token.child_token(),
        };
        let task = Arc::new(Task {
            context: context.clone(),
            handle: Mutex::new(None),
        });

        self.inner.managed_tasks.lock().insert(id, Arc::clone(&task));

        let kind_str: &'static str = kind.into();
        counter!(TC_SPAWN, "kind" => kind_str).increment(1);

        let mut handle_mut = task.handle.lock();
        *handle_mut = Some(tokio::spawn(wrapper(self.clone(), context, future)));
        drop(handle_mut);

        Ok(id)
    }

    /// Use to monitor an on-going shutdown when requested.
    pub fn watch_shutdown(&self) -> WaitForCancellationFutureOwned {
        self.inner.global_cancel_token.clone().cancelled_owned()
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.inner.global_cancel_token.clone()
    }

    pub fn is_shutdown_requested(&self) -> bool {
        self.inner.shutdown_requested.load(Ordering::Relaxed)
    }

    /// Number of supervised tasks currently alive.
    pub fn live_tasks(&self) -> usize {
        self.inner.managed_tasks.lock().len()
    }

    /// Triggers a shutdown of the runtime. All running tasks are asked to
    /// cancel; only tasks whose kind opts into waiting are awaited, each
    /// bounded by `grace_period`. Idempotent.
    pub async fn shutdown(&self, reason: &str, grace_period: Duration) {
        let inner = self.inner.clone();
        if inner
            .shutdown_requested
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .unwrap_or_else(|e| e)
        {
            // already shutting down....
            return;
        }
        let start = Instant::now();
        info!(%reason, "** Shutdown requested");
        inner.global_cancel_token.cancel();

        let victims: Vec<_> = inner.managed_tasks.lock().values().cloned().collect();
        for task in victims {
            let handle = task.handle.lock().take();
            let Some(mut handle) = handle else {
                continue;
            };
            if task.context.kind.should_wait_on_cancel() {
                if tokio::time::timeout(grace_period, &mut handle).await.is_err() {
                    debug!(
                        kind = ?task.context.kind,
                        name = ?task.context.name,
                        "task {} did not finish within the grace period, aborting",
                        task.context.id
                    );
                    handle.abort();
                }
            } else {
                handle.abort();
            }
        }
        // aborted tasks never reach on_finish, drop their entries
        inner.managed_tasks.lock().clear();
        info!("** Shutdown completed in {:?}", start.elapsed());
    }

    fn on_finish(
        &self,
        task_id: TaskId,
        result: std::result::Result<anyhow::Result<()>, Box<dyn std::any::Any + Send>>,
    ) {
        let Some(task) = self.inner.managed_tasks.lock().remove(&task_id) else {
            return;
        };
        let kind_str: &'static str = task.context.kind.into();

        match result {
            Ok(Ok(())) => {
                trace!(kind = ?task.context.kind, name = ?task.context.name, "Task {} exited normally", task_id);
                counter!(TC_FINISHED, "kind" => kind_str, "status" => TC_STATUS_COMPLETED)
                    .increment(1);
            }
            Ok(Err(err)) => {
                if err.root_cause().downcast_ref::<ShutdownError>().is_some() {
                    // The task stopped because the runtime is already
                    // shutting down, not a failure.
                    debug!(kind = ?task.context.kind, name = ?task.context.name, "[Shutdown] Task {} stopped due to shutdown", task_id);
                    return;
                }
                error!(kind = ?task.context.kind, name = ?task.context.name, "Task {} failed with: {:?}", task_id, err);
                counter!(TC_FINISHED, "kind" => kind_str, "status" => TC_STATUS_FAILED)
                    .increment(1);
            }
            Err(panic) => {
                error!(kind = ?task.context.kind, name = ?task.context.name, "Task {} panicked: {:?}", task_id, panic_message(&panic));
                counter!(TC_FINISHED, "kind" => kind_str, "status" => TC_STATUS_FAILED)
                    .increment(1);
            }
        }
    }
}

fn panic_message(panic: &Box<dyn std::any::Any + Send>) -> &str {
    if let Some(s) = panic.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s
    } else {
        "<non-string panic payload>"
    }
}

/// This wrapper function runs in a newly-spawned task. It shields the rest
/// of the runtime from panics of the payload and reports the outcome.
async fn wrapper<F>(task_center: TaskCenter, context: TaskContext, future: F)
where
    F: Future<Output = anyhow::Result<()>> + 'static,
{
    let id = context.id;
    trace!(kind = ?context.kind, name = ?context.name, "Starting task {}", context.id);

    // We use AssertUnwindSafe here so that the wrapped function doesn't
    // need to be UnwindSafe. We should not do anything after unwinding
    // that'd risk us being in unwind-unsafe behavior.
    let result = AssertUnwindSafe(future).catch_unwind().await;
    task_center.on_finish(id, result);
}

#[cfg(test)]
mod tests {
    use super::*;

    use tracing_test::traced_test;

    #[tokio::test(start_paused = true)]
    #[traced_test]
    async fn failed_task_is_logged_not_propagated() {
        let tc = TaskCenterBuilder::default().build();

        tc.spawn(TaskKind::DetachedBranch, "failing-branch", async {
            anyhow::bail!("connection refused")
        })
        .unwrap();

        // give the supervised task a chance to run
        tokio::task::yield_now().await;
        tokio::task::yield_now().await;

        assert!(logs_contain("failed with"));
        assert!(logs_contain("connection refused"));
        assert_eq!(tc.live_tasks(), 0);
    }

    #[tokio::test(start_paused = true)]
    #[traced_test]
    async fn panic_is_contained() {
        let tc = TaskCenterBuilder::default().build();

        tc.spawn(TaskKind::StochasticFiring, "panicking-firing", async {
            panic!("boom")
        })
        .unwrap();

        tokio::task::yield_now().await;
        tokio::task::yield_now().await;

        assert!(logs_contain("panicked"));
        // the supervising runtime survives
        tc.spawn(TaskKind::ActivityRun, "subsequent", async { Ok(()) })
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn spawn_after_shutdown_is_rejected() {
        let tc = TaskCenterBuilder::default().build();
        tc.shutdown("test over", Duration::from_secs(1)).await;

        let result = tc.spawn(TaskKind::ActivityRun, "late", async { Ok(()) });
        assert_eq!(result.unwrap_err(), ShutdownError);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_waits_for_opted_in_tasks() {
        let tc = TaskCenterBuilder::default().build();
        let token = tc.shutdown_token();

        tc.spawn(TaskKind::WindowDriver, "driver", async move {
            token.cancelled().await;
            Ok(())
        })
        .unwrap();

        tokio::task::yield_now().await;
        tc.shutdown("test over", Duration::from_secs(5)).await;
        assert_eq!(tc.live_tasks(), 0);
    }
}
