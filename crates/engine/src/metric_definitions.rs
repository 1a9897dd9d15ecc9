// Copyright (c) 2023 - 2026 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

/// Optional to have but adds description/help message to the metrics emitted to
/// the metrics' sink.
use metrics::{describe_counter, Unit};

pub const ENGINE_DETACHED_BRANCHES: &str = "protosim.engine.detached_branches.total";
pub const ENGINE_STOCHASTIC_FIRINGS: &str = "protosim.engine.stochastic_firings.total";
pub const ENGINE_WAITERS_RELEASED: &str = "protosim.engine.waiters_released.total";
pub const ENGINE_GUARD_RETRIES: &str = "protosim.engine.guard_retries.total";

pub(crate) fn describe_metrics() {
    describe_counter!(
        ENGINE_DETACHED_BRANCHES,
        Unit::Count,
        "Number of detached branches launched by parallel nodes"
    );

    describe_counter!(
        ENGINE_STOCHASTIC_FIRINGS,
        Unit::Count,
        "Number of firings scheduled by stochastic window checks"
    );

    describe_counter!(
        ENGINE_WAITERS_RELEASED,
        Unit::Count,
        "Number of waiters released by event firings"
    );

    describe_counter!(
        ENGINE_GUARD_RETRIES,
        Unit::Count,
        "Number of guard re-evaluations after re-running preparation steps"
    );
}
