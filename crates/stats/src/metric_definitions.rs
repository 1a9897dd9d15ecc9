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
use metrics::{describe_counter, describe_gauge, Unit};

pub const STATS_RECORDINGS: &str = "protosim.stats.recordings.total";
pub const STATS_SNAPSHOTS: &str = "protosim.stats.snapshots.total";
pub const STATS_ACTIVE_BUCKETS: &str = "protosim.stats.active_buckets";

pub(crate) fn describe_metrics() {
    describe_counter!(
        STATS_RECORDINGS,
        Unit::Count,
        "Number of counter increments and samples recorded"
    );

    describe_counter!(
        STATS_SNAPSHOTS,
        Unit::Count,
        "Number of window snapshots emitted to the statistic sink"
    );

    describe_gauge!(
        STATS_ACTIVE_BUCKETS,
        Unit::Count,
        "Number of lazily created statistics buckets"
    );
}
