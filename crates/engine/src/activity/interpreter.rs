// Copyright (c) 2023 - 2026 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use metrics::counter;
use tracing::trace;

use protosim_core::TaskKind;
use protosim_types::identifiers::NodeName;
use protosim_types::scope::VarScope;

use crate::activity::graph::{
    Activity, Completion, ExecutionContext, Node, NodeIdx, NodeKind, Outcome,
};
use crate::error::ExecutionError;
use crate::metric_definitions::ENGINE_DETACHED_BRANCHES;

impl Activity {
    /// Run one execution of this activity against `scope`.
    ///
    /// Concurrent executions of the same activity are independent; the
    /// graph itself is never mutated.
    pub async fn execute(
        self: &Arc<Self>,
        ctx: &ExecutionContext,
        scope: &Arc<VarScope>,
    ) -> Result<Completion, ExecutionError> {
        let interpreter = Interpreter {
            activity: Arc::clone(self),
            ctx: ctx.clone(),
        };
        interpreter.run_root(scope).await
    }
}

struct Interpreter {
    activity: Arc<Activity>,
    ctx: ExecutionContext,
}

impl Interpreter {
    async fn run_root(&self, scope: &Arc<VarScope>) -> Result<Completion, ExecutionError> {
        trace!(
            activity = %self.activity.name,
            execution = %self.ctx.execution_id,
            "Starting execution"
        );
        match self.run_children(&self.activity.root, scope).await? {
            Outcome::Continue => Ok(Completion::Completed),
            Outcome::Terminate => Ok(Completion::Terminated),
            Outcome::Jump(target) => Err(ExecutionError::UnroutableJump {
                target: self.describe(target),
            }),
        }
    }

    /// Sequence semantics shared by every container: children in order,
    /// honoring overrides. An override naming one of `children` moves the
    /// cursor there; any other override propagates to the caller.
    fn run_children<'a>(
        &'a self,
        children: &'a [NodeIdx],
        scope: &'a Arc<VarScope>,
    ) -> BoxFuture<'a, Result<Outcome, ExecutionError>> {
        async move {
            let mut cursor = 0;
            while cursor < children.len() {
                match self.execute_node(children[cursor], scope).await? {
                    Outcome::Continue => cursor += 1,
                    Outcome::Jump(target) => {
                        match children.iter().position(|&child| child == target) {
                            Some(position) => cursor = position,
                            None => return Ok(Outcome::Jump(target)),
                        }
                    }
                    Outcome::Terminate => return Ok(Outcome::Terminate),
                }
            }
            Ok(Outcome::Continue)
        }
        .boxed()
    }

    async fn execute_node(
        &self,
        idx: NodeIdx,
        scope: &Arc<VarScope>,
    ) -> Result<Outcome, ExecutionError> {
        let node: &Node = self.activity.node(idx);
        trace!(node = %idx, kind = ?node.kind, "Executing node");

        match &node.kind {
            NodeKind::Sequence { children, .. } => self.run_children(children, scope).await,
            NodeKind::Branch { arms } => {
                for arm in arms {
                    let taken = match &arm.condition {
                        // unconditional else arm
                        None => true,
                        Some(expression) => self.eval_bool(expression, scope).await?,
                    };
                    if taken {
                        // first matching arm completes the whole chain
                        return self.run_children(&arm.body, scope).await;
                    }
                }
                Ok(Outcome::Continue)
            }
            NodeKind::While { condition, body } => {
                while self.eval_bool(condition, scope).await? {
                    match self.run_children(body, scope).await? {
                        Outcome::Continue => {}
                        outcome => return Ok(outcome),
                    }
                }
                Ok(Outcome::Continue)
            }
            NodeKind::Goto { target } => Ok(Outcome::Jump(*target)),
            NodeKind::Parallel { branches } => {
                for branch in branches {
                    self.launch_detached(branch.clone(), scope)?;
                }
                // resume immediately; the branches run on their own
                Ok(Outcome::Continue)
            }
            NodeKind::Wait { triggers, timeout } => {
                type ArmFuture<'f> = BoxFuture<'f, Result<&'f [NodeIdx], ExecutionError>>;

                let mut arms: Vec<ArmFuture<'_>> = triggers
                    .iter()
                    .map(|arm| {
                        let trigger = Arc::clone(&arm.trigger);
                        let body = &arm.body[..];
                        async move {
                            trigger
                                .wait(scope)
                                .await
                                .map_err(ExecutionError::WaitTrigger)?;
                            Ok(body)
                        }
                        .boxed()
                    })
                    .collect();
                if let Some(timeout) = timeout {
                    let sleep = self.ctx.runtime.clock.sleep(timeout.after);
                    let body = &timeout.body[..];
                    arms.push(
                        async move {
                            sleep.await;
                            Ok(body)
                        }
                        .boxed(),
                    );
                }

                // first completed arm wins; dropping the rest abandons them
                let (winner, _index, _losers) = futures::future::select_all(arms).await;
                self.run_children(winner?, scope).await
            }
            NodeKind::Finished => Ok(Outcome::Terminate),
            NodeKind::Delay { duration } => {
                self.ctx.runtime.clock.sleep(*duration).await;
                Ok(Outcome::Continue)
            }
            NodeKind::Count { counter } => {
                self.ctx.runtime.buckets.inc(counter);
                Ok(Outcome::Continue)
            }
            NodeKind::Sample {
                counter,
                expression,
            } => {
                let value = self.ctx.runtime.evaluator.evaluate(expression, scope).await?;
                let value = value.as_f64().ok_or_else(|| ExecutionError::NonNumericSample {
                    expression: expression.clone(),
                })?;
                self.ctx.runtime.buckets.sample(counter, value);
                Ok(Outcome::Continue)
            }
            NodeKind::Eval { expression } => {
                self.ctx
                    .runtime
                    .evaluator
                    .evaluate(expression, scope)
                    .await?;
                Ok(Outcome::Continue)
            }
            NodeKind::Leaf { behavior } => behavior
                .execute(&self.ctx, scope)
                .await
                .map_err(ExecutionError::Leaf),
        }
    }

    /// Launch one detached branch. The branch shares the parent's scope
    /// instance and runs supervised: its failure is logged and counted but
    /// never reaches the launching flow or sibling branches.
    fn launch_detached(
        &self,
        branch: Vec<NodeIdx>,
        scope: &Arc<VarScope>,
    ) -> Result<(), ExecutionError> {
        let interpreter = Interpreter {
            activity: Arc::clone(&self.activity),
            ctx: self.ctx.clone(),
        };
        let scope = Arc::clone(scope);
        counter!(ENGINE_DETACHED_BRANCHES).increment(1);
        self.ctx
            .runtime
            .task_center
            .spawn(TaskKind::DetachedBranch, "detached-branch", async move {
                match interpreter.run_children(&branch, &scope).await {
                    Ok(Outcome::Continue) | Ok(Outcome::Terminate) => Ok(()),
                    Ok(Outcome::Jump(target)) => Err(anyhow::anyhow!(
                        "jump to {target} escaped a detached branch of activity '{}'",
                        interpreter.activity.name
                    )),
                    Err(err) => Err(anyhow::Error::new(err).context(format!(
                        "detached branch of activity '{}' failed",
                        interpreter.activity.name
                    ))),
                }
            })?;
        Ok(())
    }

    async fn eval_bool(
        &self,
        expression: &str,
        scope: &Arc<VarScope>,
    ) -> Result<bool, ExecutionError> {
        let value = self.ctx.runtime.evaluator.evaluate(expression, scope).await?;
        value
            .as_bool()
            .ok_or_else(|| ExecutionError::NonBooleanCondition {
                expression: expression.to_owned(),
            })
    }

    fn describe(&self, idx: NodeIdx) -> NodeName {
        self.activity
            .node(idx)
            .name
            .clone()
            .unwrap_or_else(|| NodeName::from(idx.to_string()))
    }
}
