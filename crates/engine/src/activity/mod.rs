// Copyright (c) 2023 - 2026 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Activity graphs: assembly, the sealed arena representation and the
//! interpreter walking it.

mod builder;
mod graph;
mod interpreter;

pub use builder::ActivityBuilder;
pub use graph::{
    Activity, Completion, ExecutionContext, LeafBehavior, NodeIdx, Outcome, WaitArm, WaitTrigger,
};
