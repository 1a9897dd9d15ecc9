// Copyright (c) 2023 - 2026 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! End-to-end flow over the whole runtime: model assembly, stochastic
//! arrivals driving an activity, a second activity waiting on the first
//! event's firings, statistics flushed at run end.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use test_log::test;

use protosim_core::{NoopReporter, ScopeEvaluator, StatsReporter, TaskCenterBuilder};
use protosim_distribution::{Distribution, DistributionParams};
use protosim_engine::{
    ActivityBuilder, EventBuilder, Registry, RuntimeContext, StochasticEvent, TokioClock, WaitArm,
    WindowDriver,
};
use protosim_stats::{BucketRegistry, Statistic, StatisticSink};
use protosim_types::config::RuntimeOptionsBuilder;
use protosim_types::time::MillisSinceEpoch;
use protosim_types::VarScope;

#[derive(Default)]
struct CollectingSink(Mutex<Vec<Statistic>>);

impl StatisticSink for CollectingSink {
    fn publish(&self, statistic: Statistic) {
        self.0.lock().push(statistic);
    }
}

fn runtime(registry: Registry, sink: Arc<CollectingSink>) -> RuntimeContext {
    let buckets = Arc::new(BucketRegistry::new(
        MillisSinceEpoch::new(0),
        Duration::from_secs(60),
        sink,
    ));
    RuntimeContext {
        task_center: TaskCenterBuilder::default().build(),
        registry: Arc::new(registry),
        evaluator: Arc::new(ScopeEvaluator),
        reporter: Arc::new(StatsReporter::new(Arc::clone(&buckets))),
        buckets,
        clock: Arc::new(TokioClock),
    }
}

#[test(tokio::test(start_paused = true))]
async fn stochastic_arrivals_drive_the_model() {
    let options = RuntimeOptionsBuilder::default()
        .window_step(Duration::from_millis(500).into())
        .build()
        .unwrap();
    let registry = Registry::new(MillisSinceEpoch::new(0), options);

    // the actor behavior: count the message and note the payload size
    let mut b = ActivityBuilder::new("send-message");
    let sent = b.count("messages-sent");
    let size = b.sample("message-size", "240");
    b.root([sent, size]);
    registry
        .register_activity("send-message".into(), b.seal().unwrap())
        .unwrap();

    // all five arrivals ramp in within the first second
    registry
        .register_distribution(
            Distribution::from_params(
                "arrivals".into(),
                5.0,
                DistributionParams::Uniform { range: 1.0 },
            )
            .unwrap(),
        )
        .unwrap();

    let sink = Arc::new(CollectingSink::default());
    let runtime = runtime(registry, Arc::clone(&sink));

    let event = EventBuilder::new("message-arrival", "send-message")
        .build(runtime.clone())
        .unwrap();
    let stochastic = Arc::new(StochasticEvent::bind(Arc::clone(&event), &"arrivals".into()).unwrap());

    let mut driver = WindowDriver::new(runtime.clone());
    driver.register(Arc::clone(&stochastic));
    driver.start().unwrap();

    // let simulated time cover the whole arrival ramp
    tokio::time::sleep(Duration::from_secs(3)).await;
    for _ in 0..1000 {
        if event.counts().finished >= 5 {
            break;
        }
        tokio::task::yield_now().await;
    }

    runtime
        .task_center
        .shutdown("run complete", Duration::from_secs(1))
        .await;

    let counts = event.counts();
    assert_eq!(counts.started, 5);
    assert_eq!(counts.finished, 5);
    assert_eq!(counts.errored, 0);

    // run end: flush partial windows and hand the snapshots over
    runtime.buckets.flush();
    let snapshots = sink.0.lock();
    let sent = snapshots
        .iter()
        .find(|s| s.counter.as_str() == "messages-sent")
        .expect("messages-sent bucket must have been flushed");
    assert_eq!(sent.count, 5);
    let sizes = snapshots
        .iter()
        .find(|s| s.counter.as_str() == "message-size")
        .expect("message-size bucket must have been flushed");
    assert_eq!(sizes.mean, Some(240.0));
    assert_eq!(sizes.min, Some(240.0));
    assert_eq!(sizes.max, Some(240.0));
}

#[test(tokio::test)]
async fn wait_node_resumes_on_event_firing() {
    let registry = Registry::new(MillisSinceEpoch::new(0), Default::default());

    // the upstream activity is trivial; what matters is its event firing
    let mut b = ActivityBuilder::new("login");
    let counted = b.count("logins");
    b.root([counted]);
    registry
        .register_activity("login".into(), b.seal().unwrap())
        .unwrap();

    let sink = Arc::new(CollectingSink::default());
    let runtime = runtime(registry, Arc::clone(&sink));

    let login_event = EventBuilder::new("login-event", "login")
        .build(runtime.clone())
        .unwrap();

    // downstream activity: wait for the next login, then record it
    let mut b = ActivityBuilder::new("follow-up");
    let reacted = b.count("reactions");
    let wait = b
        .wait(vec![
            WaitArm::Trigger {
                trigger: login_event.wait_trigger(),
                body: vec![reacted],
            },
            WaitArm::Timeout {
                after: Duration::from_secs(60),
                body: vec![],
            },
        ])
        .unwrap();
    b.root([wait]);
    runtime
        .registry
        .register_activity("follow-up".into(), b.seal().unwrap())
        .unwrap();

    let follow_up_event = EventBuilder::new("follow-up-event", "follow-up")
        .build(runtime.clone())
        .unwrap();

    // start the waiting execution, then fire the login event
    let waiting = {
        let event = Arc::clone(&follow_up_event);
        tokio::spawn(async move {
            let scope = VarScope::new_root();
            event.trigger(&scope).await
        })
    };
    tokio::task::yield_now().await;

    login_event.trigger(&VarScope::new_root()).await.unwrap();

    waiting.await.unwrap().unwrap();
    assert_eq!(follow_up_event.counts().finished, 1);

    runtime.buckets.flush();
    let snapshots = sink.0.lock();
    assert!(snapshots.iter().any(|s| s.counter.as_str() == "reactions"));
    // the StatsReporter fed the per-event lifecycle counters too
    assert!(snapshots
        .iter()
        .any(|s| s.counter.as_str() == "event.login-event.started"));
}

#[test(tokio::test)]
async fn noop_reporter_keeps_the_engine_quiet() {
    let registry = Registry::new(MillisSinceEpoch::new(0), Default::default());
    let mut b = ActivityBuilder::new("silent");
    let node = b.eval("'side effect only'");
    b.root([node]);
    registry
        .register_activity("silent".into(), b.seal().unwrap())
        .unwrap();

    let sink = Arc::new(CollectingSink::default());
    let mut runtime = runtime(registry, Arc::clone(&sink));
    runtime.reporter = Arc::new(NoopReporter);

    let event = EventBuilder::new("silent-event", "silent")
        .build(runtime.clone())
        .unwrap();
    event.trigger(&VarScope::new_root()).await.unwrap();

    runtime.buckets.flush();
    assert!(sink.0.lock().is_empty());
    assert_eq!(event.counts().finished, 1);
}
