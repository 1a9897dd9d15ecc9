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
use std::time::Duration;

use bytestring::ByteString;
use metrics::{counter, histogram};
use tracing::{debug, warn};

use protosim_stats::BucketRegistry;
use protosim_types::identifiers::{ActivityName, CounterName, EventName, ExecutionId};

use crate::metric_definitions::{RUN_DURATION, RUN_ERRORED, RUN_FINISHED, RUN_STARTED};

/// Metadata tags contributed by preparation steps, attached to every run
/// report of one firing.
pub type TagSet = Vec<(ByteString, ByteString)>;

/// Consumes per-firing lifecycle reports. The default implementation feeds
/// the statistics buckets and the metrics sink; the external reporting
/// layer reads from there.
pub trait RunReporter: Send + Sync + 'static {
    fn report_started(
        &self,
        event: &EventName,
        activity: &ActivityName,
        execution: ExecutionId,
        tags: &TagSet,
    );

    fn report_finished(
        &self,
        event: &EventName,
        activity: &ActivityName,
        execution: ExecutionId,
        duration: Duration,
        tags: &TagSet,
    );

    fn report_errored(
        &self,
        event: &EventName,
        activity: &ActivityName,
        execution: ExecutionId,
        duration: Duration,
        root_cause: &str,
        tags: &TagSet,
    );
}

/// Reporter backed by the shared bucket registry: every firing feeds the
/// per-event started/finished/errored counters and samples the run
/// duration, which is how execution counts reach the windowed reports.
pub struct StatsReporter {
    buckets: Arc<BucketRegistry>,
}

impl StatsReporter {
    pub fn new(buckets: Arc<BucketRegistry>) -> Self {
        Self { buckets }
    }

    fn counter(event: &EventName, suffix: &str) -> CounterName {
        CounterName::from(format!("event.{}.{}", event, suffix))
    }
}

impl RunReporter for StatsReporter {
    fn report_started(
        &self,
        event: &EventName,
        activity: &ActivityName,
        execution: ExecutionId,
        _tags: &TagSet,
    ) {
        debug!(%event, %activity, %execution, "Firing started");
        counter!(RUN_STARTED, "event" => event.to_string()).increment(1);
        self.buckets.inc(&Self::counter(event, "started"));
    }

    fn report_finished(
        &self,
        event: &EventName,
        activity: &ActivityName,
        execution: ExecutionId,
        duration: Duration,
        _tags: &TagSet,
    ) {
        debug!(%event, %activity, %execution, ?duration, "Firing finished");
        counter!(RUN_FINISHED, "event" => event.to_string()).increment(1);
        histogram!(RUN_DURATION, "event" => event.to_string()).record(duration.as_secs_f64());
        self.buckets.inc(&Self::counter(event, "finished"));
        self.buckets
            .sample(&Self::counter(event, "duration-ms"), duration.as_secs_f64() * 1000.0);
    }

    fn report_errored(
        &self,
        event: &EventName,
        activity: &ActivityName,
        execution: ExecutionId,
        duration: Duration,
        root_cause: &str,
        _tags: &TagSet,
    ) {
        warn!(%event, %activity, %execution, ?duration, %root_cause, "Firing failed");
        counter!(RUN_ERRORED, "event" => event.to_string()).increment(1);
        self.buckets.inc(&Self::counter(event, "errored"));
    }
}

/// Reporter that drops everything. Useful for assembling graphs in tests
/// that don't assert on reporting.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopReporter;

impl RunReporter for NoopReporter {
    fn report_started(&self, _: &EventName, _: &ActivityName, _: ExecutionId, _: &TagSet) {}

    fn report_finished(
        &self,
        _: &EventName,
        _: &ActivityName,
        _: ExecutionId,
        _: Duration,
        _: &TagSet,
    ) {
    }

    fn report_errored(
        &self,
        _: &EventName,
        _: &ActivityName,
        _: ExecutionId,
        _: Duration,
        _: &str,
        _: &TagSet,
    ) {
    }
}
