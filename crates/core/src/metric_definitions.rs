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
use metrics::{describe_counter, describe_histogram, Unit};

pub const TC_SPAWN: &str = "protosim.task_center.spawned.total";
pub const TC_FINISHED: &str = "protosim.task_center.finished.total";

pub const RUN_STARTED: &str = "protosim.runs.started.total";
pub const RUN_FINISHED: &str = "protosim.runs.finished.total";
pub const RUN_ERRORED: &str = "protosim.runs.errored.total";
pub const RUN_DURATION: &str = "protosim.runs.duration.seconds";

pub const TC_STATUS_COMPLETED: &str = "completed";
pub const TC_STATUS_FAILED: &str = "failed";

pub(crate) fn describe_metrics() {
    describe_counter!(TC_SPAWN, Unit::Count, "Number of tasks spawned");

    describe_counter!(
        TC_FINISHED,
        Unit::Count,
        "Number of tasks finished, by status"
    );

    describe_counter!(RUN_STARTED, Unit::Count, "Number of activity runs started");

    describe_counter!(
        RUN_FINISHED,
        Unit::Count,
        "Number of activity runs finished successfully"
    );

    describe_counter!(
        RUN_ERRORED,
        Unit::Count,
        "Number of activity runs that failed"
    );

    describe_histogram!(
        RUN_DURATION,
        Unit::Seconds,
        "Time taken by one activity run"
    );
}
