// Copyright (c) 2023 - 2026 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use protosim_types::identifiers::{ActivityName, CounterName, ExecutionId, NodeName};
use protosim_types::scope::VarScope;
use protosim_types::GenericError;

use crate::RuntimeContext;

/// Index into the activity's node arena. Jump targets are resolved to
/// indices in one pass when the graph is sealed, so execution never
/// performs string lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, derive_more::Display)]
#[display("n{}", _0)]
pub struct NodeIdx(pub(crate) u32);

impl NodeIdx {
    /// Stand-in used by the builder until the seal pass patches jump
    /// targets; never observable on a sealed graph.
    pub(crate) const PLACEHOLDER: NodeIdx = NodeIdx(u32::MAX);

    pub(crate) fn as_usize(self) -> usize {
        self.0 as usize
    }
}

/// Result of executing one node: continue with the structural next node,
/// override with an explicit next node, or end the whole execution.
///
/// Early termination is a variant, not an error or a panic, so it flows up
/// the call chain like any other outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Continue,
    Jump(NodeIdx),
    Terminate,
}

/// How one execution ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// Fell off the end of the graph.
    Completed,
    /// A `Finished` node ended the execution early.
    Terminated,
}

/// Per-execution context handed to every node. Cheap to clone; detached
/// branches carry a clone of it.
#[derive(Clone)]
pub struct ExecutionContext {
    pub execution_id: ExecutionId,
    pub activity: ActivityName,
    pub runtime: RuntimeContext,
    /// Set when the runtime shuts down; leaves doing long I/O should watch
    /// it.
    pub cancellation: CancellationToken,
}

impl ExecutionContext {
    pub fn new(activity: ActivityName, runtime: RuntimeContext) -> Self {
        let cancellation = runtime.task_center.shutdown_token();
        Self {
            execution_id: ExecutionId::generate(),
            activity,
            runtime,
            cancellation,
        }
    }
}

/// Contract of protocol-specific leaf behavior. The graph drives it; what
/// it does (write a register, send a chat message, open a socket) is
/// opaque to the core.
#[async_trait::async_trait]
pub trait LeafBehavior: Send + Sync + 'static {
    async fn execute(
        &self,
        ctx: &ExecutionContext,
        scope: &Arc<VarScope>,
    ) -> Result<Outcome, GenericError>;
}

/// An awaitable completion signal used as one arm of a `Wait` node.
#[async_trait::async_trait]
pub trait WaitTrigger: Send + Sync + 'static {
    async fn wait(&self, scope: &Arc<VarScope>) -> Result<(), GenericError>;
}

/// One non-timeout arm of a `Wait` node.
pub(crate) struct TriggerArm {
    pub(crate) trigger: Arc<dyn WaitTrigger>,
    pub(crate) body: Vec<NodeIdx>,
}

/// The single optional timeout arm of a `Wait` node.
pub(crate) struct TimeoutArm {
    pub(crate) after: Duration,
    pub(crate) body: Vec<NodeIdx>,
}

/// Arm description accepted by [`crate::ActivityBuilder::wait`].
pub enum WaitArm {
    Trigger {
        trigger: Arc<dyn WaitTrigger>,
        body: Vec<NodeIdx>,
    },
    Timeout {
        after: Duration,
        body: Vec<NodeIdx>,
    },
}

/// One condition arm of a branch chain; `condition: None` is the
/// unconditional else arm.
pub(crate) struct BranchArm {
    pub(crate) condition: Option<String>,
    pub(crate) body: Vec<NodeIdx>,
}

/// The closed set of node kinds the interpreter understands.
pub(crate) enum NodeKind {
    /// Children in order; purely structural. The label only shows up in
    /// diagnostics and diagram grouping.
    Sequence {
        label: Option<String>,
        children: Vec<NodeIdx>,
    },
    /// if/elseif/else chain; the first arm whose condition holds runs,
    /// then the chain is complete.
    Branch { arms: Vec<BranchArm> },
    /// Loop form: re-evaluates the condition before each iteration.
    While {
        condition: String,
        body: Vec<NodeIdx>,
    },
    /// Transfers control to the resolved target.
    Goto { target: NodeIdx },
    /// Launches each branch as a detached, supervised flow and continues
    /// immediately.
    Parallel { branches: Vec<Vec<NodeIdx>> },
    /// Suspends until the first trigger (or the timeout) completes, then
    /// runs exactly that arm's body.
    Wait {
        triggers: Vec<TriggerArm>,
        timeout: Option<TimeoutArm>,
    },
    /// Ends the whole execution.
    Finished,
    /// Suspends the flow for the configured duration.
    Delay { duration: Duration },
    /// Increments a named counter.
    Count { counter: CounterName },
    /// Evaluates an expression and records the numeric result.
    Sample {
        counter: CounterName,
        expression: String,
    },
    /// Evaluates an expression for its side effects only.
    Eval { expression: String },
    /// Protocol-specific behavior.
    Leaf { behavior: Arc<dyn LeafBehavior> },
}

impl fmt::Debug for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeKind::Sequence { label, children } => f
                .debug_struct("Sequence")
                .field("label", label)
                .field("children", children)
                .finish(),
            NodeKind::Branch { arms } => {
                f.debug_struct("Branch").field("arms", &arms.len()).finish()
            }
            NodeKind::While { condition, .. } => f
                .debug_struct("While")
                .field("condition", condition)
                .finish(),
            NodeKind::Goto { target } => f.debug_struct("Goto").field("target", target).finish(),
            NodeKind::Parallel { branches } => f
                .debug_struct("Parallel")
                .field("branches", &branches.len())
                .finish(),
            NodeKind::Wait { triggers, timeout } => f
                .debug_struct("Wait")
                .field("triggers", &triggers.len())
                .field("timeout", &timeout.is_some())
                .finish(),
            NodeKind::Finished => f.write_str("Finished"),
            NodeKind::Delay { duration } => {
                f.debug_struct("Delay").field("duration", duration).finish()
            }
            NodeKind::Count { counter } => {
                f.debug_struct("Count").field("counter", counter).finish()
            }
            NodeKind::Sample { counter, .. } => {
                f.debug_struct("Sample").field("counter", counter).finish()
            }
            NodeKind::Eval { expression } => {
                f.debug_struct("Eval").field("expression", expression).finish()
            }
            NodeKind::Leaf { .. } => f.write_str("Leaf"),
        }
    }
}

#[derive(Debug)]
pub(crate) struct Node {
    pub(crate) name: Option<NodeName>,
    pub(crate) kind: NodeKind,
}

/// A named, reusable, sealed graph with one implicit entry sequence.
///
/// Assembled through [`crate::ActivityBuilder`], immutable afterwards. Many
/// executions of the same activity may be in flight concurrently, each with
/// its own scope.
pub struct Activity {
    pub(crate) name: ActivityName,
    pub(crate) nodes: Vec<Node>,
    pub(crate) root: Vec<NodeIdx>,
}

impl Activity {
    pub fn name(&self) -> &ActivityName {
        &self.name
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub(crate) fn node(&self, idx: NodeIdx) -> &Node {
        &self.nodes[idx.as_usize()]
    }
}

impl fmt::Debug for Activity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Activity")
            .field("name", &self.name)
            .field("nodes", &self.nodes.len())
            .finish()
    }
}
