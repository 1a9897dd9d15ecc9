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

use metrics::counter;
use tracing::{debug, trace};

use protosim_core::{ShutdownError, TaskId, TaskKind};
use protosim_distribution::Distribution;
use protosim_types::identifiers::DistributionName;
use protosim_types::scope::VarScope;

use crate::error::AssemblyError;
use crate::event::Event;
use crate::metric_definitions::ENGINE_STOCHASTIC_FIRINGS;
use crate::RuntimeContext;

/// An event bound to a distribution: each window check asks the
/// distribution how many firings fall into the elapsed-time window and
/// launches that many independent, concurrent, unguarded firings, each
/// with a fresh scope derived from the model root. The caller never awaits
/// them.
pub struct StochasticEvent {
    event: Arc<Event>,
    distribution: Arc<Distribution>,
}

impl StochasticEvent {
    /// Resolve the distribution reference from the registry; an unresolved
    /// name is fatal to this definition.
    pub fn bind(event: Arc<Event>, distribution: &DistributionName) -> Result<Self, AssemblyError> {
        let distribution = event.runtime.registry.resolve_distribution(distribution)?;
        Ok(Self {
            event,
            distribution,
        })
    }

    pub fn event(&self) -> &Arc<Event> {
        &self.event
    }

    pub fn distribution(&self) -> &Arc<Distribution> {
        &self.distribution
    }

    /// Check the window `[t1, t2)` of elapsed simulated time, with
    /// `cycle_count` completed periodic cycles, and launch one supervised
    /// firing per due trigger. Returns how many were launched.
    pub fn check_window(
        &self,
        t1: Duration,
        t2: Duration,
        cycle_count: u64,
    ) -> Result<u64, ShutdownError> {
        let due = self.distribution.check_trigger(t1, t2, cycle_count);
        trace!(
            event = %self.event.name(),
            distribution = %self.distribution.name(),
            ?t1,
            ?t2,
            cycle_count,
            due,
            "Checked stochastic window"
        );

        for _ in 0..due {
            let event = Arc::clone(&self.event);
            counter!(ENGINE_STOCHASTIC_FIRINGS).increment(1);
            self.event.runtime.task_center.spawn(
                TaskKind::StochasticFiring,
                "stochastic-firing",
                async move {
                    let scope = VarScope::derive(&event.runtime.registry.root_scope());
                    if let Err(err) = event.trigger_unguarded(&scope).await {
                        // accounted and logged at the event boundary
                        debug!(event = %event.name(), %err, "Stochastic firing failed");
                    }
                    Ok(())
                },
            )?;
        }

        Ok(due)
    }
}

/// Periodic driver calling [`StochasticEvent::check_window`] on every
/// registered event. Window step and cycle duration come from the runtime
/// options; elapsed simulated time is measured from the driver's start.
pub struct WindowDriver {
    runtime: RuntimeContext,
    events: Vec<Arc<StochasticEvent>>,
}

impl WindowDriver {
    pub fn new(runtime: RuntimeContext) -> Self {
        Self {
            runtime,
            events: Vec::new(),
        }
    }

    pub fn register(&mut self, event: Arc<StochasticEvent>) {
        self.events.push(event);
    }

    /// Spawn the driver loop. It stops when the runtime shuts down; as a
    /// `WindowDriver`-kind task it is awaited during the shutdown grace
    /// period.
    pub fn start(self) -> Result<TaskId, ShutdownError> {
        let WindowDriver { runtime, events } = self;
        let step = runtime.registry.options().window_step();
        let cycle = runtime.registry.options().cycle_duration();
        let task_center = runtime.task_center.clone();
        let shutdown = task_center.shutdown_token();

        task_center.spawn(TaskKind::WindowDriver, "window-driver", async move {
            // tokio's clock, so paused-time tests drive simulated time
            let started = tokio::time::Instant::now();
            let mut interval = tokio::time::interval(step);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            let mut previous = Duration::ZERO;

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        debug!("Window driver stopping");
                        return Ok(());
                    }
                    _ = interval.tick() => {
                        let now = started.elapsed();
                        for event in &events {
                            check_spanning_cycles(event, previous, now, cycle)?;
                        }
                        previous = now;
                    }
                }
            }
        })
    }
}

/// One window check, split at cycle boundaries so that every
/// `check_window` call sees a single consistent cycle count.
fn check_spanning_cycles(
    event: &StochasticEvent,
    t1: Duration,
    t2: Duration,
    cycle: Option<Duration>,
) -> Result<(), ShutdownError> {
    for (from, to, cycle_count) in split_at_cycles(t1, t2, cycle) {
        event.check_window(from, to, cycle_count)?;
    }
    Ok(())
}

/// Split `[t1, t2)` into per-cycle segments of cycle-relative time.
fn split_at_cycles(
    t1: Duration,
    t2: Duration,
    cycle: Option<Duration>,
) -> Vec<(Duration, Duration, u64)> {
    let Some(cycle) = cycle else {
        return vec![(t1, t2, 0)];
    };

    let cycle_of = |t: Duration| (t.as_nanos() / cycle.as_nanos()) as u64;
    let within = |t: Duration| Duration::from_nanos((t.as_nanos() % cycle.as_nanos()) as u64);

    let mut segments = Vec::new();
    let mut from = t1;
    while cycle_of(from) < cycle_of(t2) {
        let current = cycle_of(from);
        segments.push((within(from), cycle, current));
        from = cycle * (current as u32 + 1);
    }
    segments.push((within(from), within(t2), cycle_of(t2)));
    segments
}

#[cfg(test)]
mod tests {
    use super::*;

    use test_log::test;

    use protosim_core::{NoopReporter, ScopeEvaluator, TaskCenterBuilder};
    use protosim_distribution::DistributionParams;
    use protosim_stats::{BucketRegistry, Statistic, StatisticSink};
    use protosim_types::time::MillisSinceEpoch;

    use crate::activity::ActivityBuilder;
    use crate::clock::TokioClock;
    use crate::event::EventBuilder;
    use crate::Registry;

    struct NullSink;

    impl StatisticSink for NullSink {
        fn publish(&self, _statistic: Statistic) {}
    }

    fn runtime_with_model(intensity: f64, params: DistributionParams) -> RuntimeContext {
        let registry = Registry::new(MillisSinceEpoch::new(0), Default::default());

        let mut b = ActivityBuilder::new("noop");
        let count = b.count("stochastic-runs");
        b.root([count]);
        registry
            .register_activity("noop".into(), b.seal().unwrap())
            .unwrap();

        registry
            .register_distribution(
                Distribution::from_params("arrivals".into(), intensity, params).unwrap(),
            )
            .unwrap();

        RuntimeContext {
            task_center: TaskCenterBuilder::default().build(),
            registry: Arc::new(registry),
            evaluator: Arc::new(ScopeEvaluator),
            reporter: Arc::new(NoopReporter),
            buckets: Arc::new(BucketRegistry::new(
                MillisSinceEpoch::new(0),
                Duration::from_secs(60),
                Arc::new(NullSink),
            )),
            clock: Arc::new(TokioClock),
        }
    }

    fn stochastic(runtime: &RuntimeContext) -> StochasticEvent {
        let event = EventBuilder::new("arrival-event", "noop")
            .build(runtime.clone())
            .unwrap();
        StochasticEvent::bind(event, &"arrivals".into()).unwrap()
    }

    async fn wait_for_finished(event: &Arc<Event>, expected: u64) {
        for _ in 0..1000 {
            if event.counts().finished >= expected {
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!(
            "expected {expected} finished firings, got {:?}",
            event.counts()
        );
    }

    #[test(tokio::test)]
    async fn window_check_launches_the_due_firings() {
        // exponential with rate 1 and intensity 10 over [0, 1s):
        // floor(10 * (1 - 1/e)) = 6 firings
        let runtime =
            runtime_with_model(10.0, DistributionParams::Exponential { rate: 1.0 });
        let stochastic = stochastic(&runtime);

        let launched = stochastic
            .check_window(Duration::ZERO, Duration::from_secs(1), 0)
            .unwrap();
        assert_eq!(launched, 6);

        // the caller did not await them; they run supervised on their own
        wait_for_finished(stochastic.event(), 6).await;
        let counts = stochastic.event().counts();
        assert_eq!(counts.started, 6);
        assert_eq!(counts.errored, 0);
    }

    #[test(tokio::test)]
    async fn empty_window_launches_nothing() {
        let runtime =
            runtime_with_model(10.0, DistributionParams::Exponential { rate: 1.0 });
        let stochastic = stochastic(&runtime);

        let launched = stochastic
            .check_window(Duration::from_secs(2), Duration::from_secs(2), 0)
            .unwrap();
        assert_eq!(launched, 0);
        assert_eq!(stochastic.event().counts(), Default::default());
    }

    #[test(tokio::test)]
    async fn unresolved_distribution_is_fatal() {
        let runtime =
            runtime_with_model(10.0, DistributionParams::Exponential { rate: 1.0 });
        let event = EventBuilder::new("dangling", "noop")
            .build(runtime.clone())
            .unwrap();

        let result = StochasticEvent::bind(event, &"no-such-distribution".into());
        protosim_test_util::assert!(let Err(AssemblyError::Registry(_)) = result);
    }

    #[test(tokio::test(start_paused = true))]
    async fn driver_checks_windows_until_shutdown() {
        // uniform ramp over 1s with intensity 5: all five firings are due
        // within the first second of simulated time
        let runtime = runtime_with_model(5.0, DistributionParams::Uniform { range: 1.0 });
        let stochastic = Arc::new(stochastic(&runtime));

        let mut driver = WindowDriver::new(runtime.clone());
        driver.register(Arc::clone(&stochastic));
        driver.start().unwrap();

        tokio::time::sleep(Duration::from_secs(3)).await;
        wait_for_finished(stochastic.event(), 5).await;

        runtime
            .task_center
            .shutdown("test over", Duration::from_secs(1))
            .await;
        assert_eq!(stochastic.event().counts().finished, 5);
    }

    #[test]
    fn cycle_boundary_splits_the_window() {
        let secs = Duration::from_secs;

        // no cycle configured: one segment, cycle count 0
        assert_eq!(
            split_at_cycles(secs(9), secs(11), None),
            vec![(secs(9), secs(11), 0)]
        );

        // [9s, 11s) with a 10s cycle: tail of cycle 0, head of cycle 1
        assert_eq!(
            split_at_cycles(secs(9), secs(11), Some(secs(10))),
            vec![(secs(9), secs(10), 0), (secs(0), secs(1), 1)]
        );

        // a window spanning several whole cycles covers each of them
        assert_eq!(
            split_at_cycles(secs(5), secs(35), Some(secs(10))),
            vec![
                (secs(5), secs(10), 0),
                (secs(0), secs(10), 1),
                (secs(0), secs(10), 2),
                (secs(0), secs(5), 3),
            ]
        );

        // within one cycle nothing is split
        assert_eq!(
            split_at_cycles(secs(12), secs(13), Some(secs(10))),
            vec![(secs(2), secs(3), 1)]
        );
    }
}
