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
use std::sync::Arc;
use std::time::Duration;

use protosim_types::identifiers::{ActivityName, CounterName, NodeName};

use crate::activity::graph::{
    Activity, BranchArm, Node, NodeIdx, NodeKind, TimeoutArm, TriggerArm, WaitArm,
};
use crate::activity::LeafBehavior;
use crate::error::AssemblyError;

/// Assembles an activity graph.
///
/// Nodes are created bottom-up: leaves first, containers over their child
/// indices, and finally [`ActivityBuilder::seal`] freezes the arena,
/// resolves every jump target to its index and validates the graph.
/// Sealing consumes the builder; the resulting [`Activity`] is immutable.
pub struct ActivityBuilder {
    name: ActivityName,
    nodes: Vec<Node>,
    root: Vec<NodeIdx>,
    /// goto node index -> target name, patched during seal.
    pending_jumps: Vec<(NodeIdx, NodeName)>,
}

impl ActivityBuilder {
    pub fn new(name: impl Into<ActivityName>) -> Self {
        Self {
            name: name.into(),
            nodes: Vec::new(),
            root: Vec::new(),
            pending_jumps: Vec::new(),
        }
    }

    fn push(&mut self, kind: NodeKind) -> NodeIdx {
        let idx = NodeIdx(self.nodes.len() as u32);
        self.nodes.push(Node { name: None, kind });
        idx
    }

    /// Attach a stable name to a node so jumps can target it.
    pub fn name(&mut self, idx: NodeIdx, name: impl Into<NodeName>) -> NodeIdx {
        self.nodes[idx.as_usize()].name = Some(name.into());
        idx
    }

    pub fn sequence(&mut self, children: impl Into<Vec<NodeIdx>>) -> NodeIdx {
        self.push(NodeKind::Sequence {
            label: None,
            children: children.into(),
        })
    }

    pub fn group(
        &mut self,
        label: impl Into<String>,
        children: impl Into<Vec<NodeIdx>>,
    ) -> NodeIdx {
        self.push(NodeKind::Sequence {
            label: Some(label.into()),
            children: children.into(),
        })
    }

    /// if/elseif/else chain. `None` as condition is the else arm.
    pub fn branch(&mut self, arms: Vec<(Option<String>, Vec<NodeIdx>)>) -> NodeIdx {
        self.push(NodeKind::Branch {
            arms: arms
                .into_iter()
                .map(|(condition, body)| BranchArm { condition, body })
                .collect(),
        })
    }

    pub fn while_loop(
        &mut self,
        condition: impl Into<String>,
        body: impl Into<Vec<NodeIdx>>,
    ) -> NodeIdx {
        self.push(NodeKind::While {
            condition: condition.into(),
            body: body.into(),
        })
    }

    /// Jump to the node named `target`. The name must exist somewhere in
    /// this activity by the time the graph is sealed.
    pub fn goto(&mut self, target: impl Into<NodeName>) -> NodeIdx {
        let idx = self.push(NodeKind::Goto {
            target: NodeIdx::PLACEHOLDER,
        });
        self.pending_jumps.push((idx, target.into()));
        idx
    }

    pub fn parallel(&mut self, branches: Vec<Vec<NodeIdx>>) -> NodeIdx {
        self.push(NodeKind::Parallel { branches })
    }

    /// Multi-trigger wait. At most one [`WaitArm::Timeout`] is accepted,
    /// and the wait needs at least one arm.
    pub fn wait(&mut self, arms: Vec<WaitArm>) -> Result<NodeIdx, AssemblyError> {
        let mut triggers = Vec::new();
        let mut timeout: Option<TimeoutArm> = None;
        for arm in arms {
            match arm {
                WaitArm::Trigger { trigger, body } => {
                    triggers.push(TriggerArm { trigger, body });
                }
                WaitArm::Timeout { after, body } => {
                    if timeout.is_some() {
                        return Err(AssemblyError::DuplicateTimeout {
                            activity: self.name.clone(),
                        });
                    }
                    timeout = Some(TimeoutArm { after, body });
                }
            }
        }
        if triggers.is_empty() && timeout.is_none() {
            return Err(AssemblyError::EmptyWait {
                activity: self.name.clone(),
            });
        }
        Ok(self.push(NodeKind::Wait { triggers, timeout }))
    }

    /// Explicit end node, distinct from normal fall-through.
    pub fn finished(&mut self) -> NodeIdx {
        self.push(NodeKind::Finished)
    }

    pub fn delay(&mut self, duration: Duration) -> NodeIdx {
        self.push(NodeKind::Delay { duration })
    }

    pub fn count(&mut self, counter: impl Into<CounterName>) -> NodeIdx {
        self.push(NodeKind::Count {
            counter: counter.into(),
        })
    }

    pub fn sample(
        &mut self,
        counter: impl Into<CounterName>,
        expression: impl Into<String>,
    ) -> NodeIdx {
        self.push(NodeKind::Sample {
            counter: counter.into(),
            expression: expression.into(),
        })
    }

    pub fn eval(&mut self, expression: impl Into<String>) -> NodeIdx {
        self.push(NodeKind::Eval {
            expression: expression.into(),
        })
    }

    pub fn leaf(&mut self, behavior: Arc<dyn LeafBehavior>) -> NodeIdx {
        self.push(NodeKind::Leaf { behavior })
    }

    /// Set the entry sequence.
    pub fn root(&mut self, children: impl Into<Vec<NodeIdx>>) -> &mut Self {
        self.root = children.into();
        self
    }

    /// Freeze the graph: reject duplicate node names and resolve all jump
    /// targets to arena indices in a single pass, so execution never looks
    /// anything up by name.
    pub fn seal(self) -> Result<Activity, AssemblyError> {
        let ActivityBuilder {
            name,
            mut nodes,
            root,
            pending_jumps,
        } = self;

        let mut by_name: HashMap<NodeName, NodeIdx> = HashMap::new();
        for (position, node) in nodes.iter().enumerate() {
            if let Some(node_name) = &node.name {
                if by_name
                    .insert(node_name.clone(), NodeIdx(position as u32))
                    .is_some()
                {
                    return Err(AssemblyError::DuplicateNodeName {
                        activity: name,
                        name: node_name.clone(),
                    });
                }
            }
        }

        for (jump_idx, target_name) in pending_jumps {
            let Some(target) = by_name.get(&target_name).copied() else {
                return Err(AssemblyError::UnresolvedJumpTarget {
                    activity: name,
                    target: target_name,
                });
            };
            match &mut nodes[jump_idx.as_usize()].kind {
                NodeKind::Goto { target: slot } => *slot = target,
                _ => unreachable!("pending jump entries only reference goto nodes"),
            }
        }

        Ok(Activity { name, nodes, root })
    }
}
