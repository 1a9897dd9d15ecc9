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

use dashmap::DashMap;
use metrics::{counter, gauge};
use tracing::debug;

use protosim_types::identifiers::CounterName;
use protosim_types::time::MillisSinceEpoch;

use crate::bucket::{Bucket, Statistic};
use crate::metric_definitions::{
    STATS_ACTIVE_BUCKETS, STATS_RECORDINGS, STATS_SNAPSHOTS,
};

/// Receives window snapshots as they are produced. Implementations hand
/// them to the external reporting layer; the runtime owns no persisted
/// state of its own.
pub trait StatisticSink: Send + Sync + 'static {
    fn publish(&self, statistic: Statistic);
}

/// Default sink logging each snapshot at debug level.
#[derive(Debug, Default)]
pub struct TracingSink;

impl StatisticSink for TracingSink {
    fn publish(&self, statistic: Statistic) {
        debug!(
            counter = %statistic.counter,
            start = %statistic.start,
            count = statistic.count,
            mean = ?statistic.mean,
            "Closed statistics window"
        );
    }
}

/// Shared front-end over all buckets of a run.
///
/// Buckets are created lazily per counter identifier, with windows aligned
/// to a grid anchored at the simulation start. Mutations on the same bucket
/// serialize on the map shard lock; distinct counters do not contend.
pub struct BucketRegistry {
    base: MillisSinceEpoch,
    bucket_duration: Duration,
    track_variance: bool,
    buckets: DashMap<CounterName, Bucket>,
    sink: Arc<dyn StatisticSink>,
}

impl BucketRegistry {
    pub fn new(
        base: MillisSinceEpoch,
        bucket_duration: Duration,
        sink: Arc<dyn StatisticSink>,
    ) -> Self {
        assert!(
            !bucket_duration.is_zero(),
            "bucket duration must be positive"
        );
        crate::metric_definitions::describe_metrics();
        Self {
            base,
            bucket_duration,
            track_variance: true,
            buckets: DashMap::new(),
            sink,
        }
    }

    /// Disable per-window sample retention; variance/std-dev will be absent
    /// from all snapshots.
    pub fn without_variance(mut self) -> Self {
        self.track_variance = false;
        self
    }

    /// Count an event. Returns the containing window's start timestamp for
    /// correlation.
    pub fn inc(&self, id: &CounterName) -> MillisSinceEpoch {
        self.inc_at(id, MillisSinceEpoch::now())
    }

    pub fn inc_at(&self, id: &CounterName, now: MillisSinceEpoch) -> MillisSinceEpoch {
        self.with_bucket(id, now, |bucket| bucket.inc())
    }

    /// Record a numeric sample. Returns the containing window's start.
    pub fn sample(&self, id: &CounterName, value: f64) -> MillisSinceEpoch {
        self.sample_at(id, value, MillisSinceEpoch::now())
    }

    pub fn sample_at(
        &self,
        id: &CounterName,
        value: f64,
        now: MillisSinceEpoch,
    ) -> MillisSinceEpoch {
        self.with_bucket(id, now, |bucket| bucket.sample(value))
    }

    /// Count an occurrence and sample the running occurrence total.
    pub fn count_occurrence(&self, id: &CounterName) -> MillisSinceEpoch {
        self.count_occurrence_at(id, MillisSinceEpoch::now())
    }

    pub fn count_occurrence_at(
        &self,
        id: &CounterName,
        now: MillisSinceEpoch,
    ) -> MillisSinceEpoch {
        self.with_bucket(id, now, |bucket| bucket.count_occurrence())
    }

    /// Force a final snapshot of every bucket with unflushed data. Called
    /// once at run end; partial windows are emitted as-is.
    pub fn flush(&self) {
        for mut entry in self.buckets.iter_mut() {
            if entry.value().has_unflushed_data() {
                let statistic = entry.value_mut().roll_over();
                counter!(STATS_SNAPSHOTS).increment(1);
                self.sink.publish(statistic);
            }
        }
    }

    fn with_bucket(
        &self,
        id: &CounterName,
        now: MillisSinceEpoch,
        op: impl FnOnce(&mut Bucket) -> MillisSinceEpoch,
    ) -> MillisSinceEpoch {
        let mut bucket = self.buckets.entry(id.clone()).or_insert_with(|| {
            gauge!(STATS_ACTIVE_BUCKETS).increment(1.0);
            Bucket::new(
                id.clone(),
                self.base,
                self.bucket_duration,
                now,
                self.track_variance,
            )
        });

        bucket.advance(now, |statistic| {
            counter!(STATS_SNAPSHOTS).increment(1);
            self.sink.publish(statistic);
        });
        counter!(STATS_RECORDINGS).increment(1);
        op(bucket.value_mut())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use parking_lot::Mutex;

    #[derive(Default)]
    struct CollectingSink(Mutex<Vec<Statistic>>);

    impl StatisticSink for CollectingSink {
        fn publish(&self, statistic: Statistic) {
            self.0.lock().push(statistic);
        }
    }

    fn registry(sink: Arc<CollectingSink>) -> BucketRegistry {
        BucketRegistry::new(
            MillisSinceEpoch::new(0),
            Duration::from_secs(10),
            sink,
        )
    }

    #[test]
    fn lazily_creates_buckets_and_correlates_windows() {
        let sink = Arc::new(CollectingSink::default());
        let registry = registry(sink.clone());
        let id = CounterName::from("sent");

        let w1 = registry.inc_at(&id, MillisSinceEpoch::new(1_000));
        let w2 = registry.inc_at(&id, MillisSinceEpoch::new(9_999));
        assert_eq!(w1, w2);
        assert_eq!(w1, MillisSinceEpoch::new(0));

        let w3 = registry.inc_at(&id, MillisSinceEpoch::new(12_000));
        assert_eq!(w3, MillisSinceEpoch::new(10_000));

        let emitted = sink.0.lock();
        assert_eq!(emitted.len(), 1);
        assert_eq!(emitted[0].count, 2);
    }

    #[test]
    fn flush_emits_partial_window() {
        let sink = Arc::new(CollectingSink::default());
        let registry = registry(sink.clone());
        let id = CounterName::from("latency");

        registry.sample_at(&id, 5.0, MillisSinceEpoch::new(2_000));
        registry.sample_at(&id, 7.0, MillisSinceEpoch::new(3_000));
        registry.flush();

        let emitted = sink.0.lock();
        assert_eq!(emitted.len(), 1);
        assert_eq!(emitted[0].count, 2);
        assert_eq!(emitted[0].mean, Some(6.0));
        assert_eq!(emitted[0].min, Some(5.0));
        assert_eq!(emitted[0].max, Some(7.0));
        // population variance of [5, 7]
        assert_eq!(emitted[0].variance, Some(1.0));
    }

    #[test]
    fn flush_skips_untouched_windows() {
        let sink = Arc::new(CollectingSink::default());
        let registry = registry(sink.clone());
        let id = CounterName::from("quiet");

        registry.inc_at(&id, MillisSinceEpoch::new(500));
        // roll into a fresh, still-empty window
        registry.inc_at(&id, MillisSinceEpoch::new(10_500));
        registry.flush();
        registry.flush();

        let emitted = sink.0.lock();
        // one rollover snapshot + one flush snapshot; the second flush
        // found nothing new
        assert_eq!(emitted.len(), 2);
    }

    #[test]
    fn distinct_counters_do_not_share_buckets() {
        let sink = Arc::new(CollectingSink::default());
        let registry = registry(sink.clone());

        registry.sample_at(&CounterName::from("a"), 1.0, MillisSinceEpoch::new(100));
        registry.sample_at(&CounterName::from("b"), 100.0, MillisSinceEpoch::new(100));
        registry.flush();

        let emitted = sink.0.lock();
        assert_eq!(emitted.len(), 2);
        let by_name = |name: &str| {
            emitted
                .iter()
                .find(|s| s.counter.as_str() == name)
                .unwrap()
                .clone()
        };
        assert_eq!(by_name("a").max, Some(1.0));
        assert_eq!(by_name("b").min, Some(100.0));
    }

    #[test]
    fn variance_can_be_disabled() {
        let sink = Arc::new(CollectingSink::default());
        let registry = BucketRegistry::new(
            MillisSinceEpoch::new(0),
            Duration::from_secs(10),
            sink.clone(),
        )
        .without_variance();

        let id = CounterName::from("no-var");
        registry.sample_at(&id, 3.0, MillisSinceEpoch::new(100));
        registry.flush();

        let emitted = sink.0.lock();
        assert_eq!(emitted[0].mean, Some(3.0));
        assert_eq!(emitted[0].variance, None);
    }
}
