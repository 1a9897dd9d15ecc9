// Copyright (c) 2023 - 2026 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::time::Duration;

use protosim_types::identifiers::CounterName;
use protosim_types::time::MillisSinceEpoch;

/// Immutable snapshot of one bucket window, handed to the reporting layer
/// as a plain record.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct Statistic {
    pub counter: CounterName,
    pub start: MillisSinceEpoch,
    pub stop: MillisSinceEpoch,
    pub count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mean: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variance: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub std_dev: Option<f64>,
}

/// Running aggregate of the current window of one counter.
///
/// A bucket never observes time by itself; every mutation passes the
/// caller's timestamp, which advances the window as a side effect.
#[derive(Debug)]
pub struct Bucket {
    counter: CounterName,
    start: MillisSinceEpoch,
    duration: Duration,
    count: u64,
    /// Number of calls that carried a value; `inc` bumps only `count`.
    values: u64,
    sum: f64,
    min: Option<f64>,
    max: Option<f64>,
    /// Per-window sample list, kept only when variance is tracked and
    /// cleared on every rollover.
    samples: Option<Vec<f64>>,
    /// Occurrence counter within the window, see [`Bucket::count_occurrence`].
    occurrences: u64,
}

impl Bucket {
    /// Create the bucket with its first window aligned to the window grid
    /// anchored at `base`, such that `now` falls inside it.
    pub(crate) fn new(
        counter: CounterName,
        base: MillisSinceEpoch,
        duration: Duration,
        now: MillisSinceEpoch,
        track_variance: bool,
    ) -> Self {
        let width = duration.as_millis() as u64;
        let elapsed = now.as_u64().saturating_sub(base.as_u64());
        let start = MillisSinceEpoch::new(base.as_u64() + (elapsed / width) * width);
        Self {
            counter,
            start,
            duration,
            count: 0,
            values: 0,
            sum: 0.0,
            min: None,
            max: None,
            samples: track_variance.then(Vec::new),
            occurrences: 0,
        }
    }

    pub fn window_start(&self) -> MillisSinceEpoch {
        self.start
    }

    pub fn window_stop(&self) -> MillisSinceEpoch {
        self.start + self.duration
    }

    /// Advance the window until `now` falls within `[start, stop)`, emitting
    /// one snapshot per window left behind (empty windows included). A call
    /// exactly at a boundary starts a new window.
    pub(crate) fn advance(&mut self, now: MillisSinceEpoch, mut emit: impl FnMut(Statistic)) {
        while now >= self.window_stop() {
            emit(self.roll_over());
        }
    }

    /// Count an event without an associated value.
    pub(crate) fn inc(&mut self) -> MillisSinceEpoch {
        self.count += 1;
        self.start
    }

    /// Record a numeric sample.
    pub(crate) fn sample(&mut self, value: f64) -> MillisSinceEpoch {
        self.count += 1;
        self.values += 1;
        self.sum += value;
        self.min = Some(self.min.map_or(value, |m| m.min(value)));
        self.max = Some(self.max.map_or(value, |m| m.max(value)));
        if let Some(samples) = &mut self.samples {
            samples.push(value);
        }
        self.start
    }

    /// Count an occurrence and sample the running occurrence total, so the
    /// window's aggregates describe how the occurrence count ramped up.
    pub(crate) fn count_occurrence(&mut self) -> MillisSinceEpoch {
        self.occurrences += 1;
        self.sample(self.occurrences as f64)
    }

    pub(crate) fn has_unflushed_data(&self) -> bool {
        self.count > 0
    }

    /// Snapshot the current window and reset for the next one.
    pub(crate) fn roll_over(&mut self) -> Statistic {
        // a window of bare `inc` calls has a count but no value aggregates
        let mean = (self.values > 0).then(|| self.sum / self.values as f64);
        let variance = self.samples.as_ref().and_then(|samples| {
            let mean = mean?;
            if samples.is_empty() {
                return None;
            }
            // biased (population) estimator over the window's samples
            Some(
                samples.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>()
                    / samples.len() as f64,
            )
        });

        let statistic = Statistic {
            counter: self.counter.clone(),
            start: self.start,
            stop: self.window_stop(),
            count: self.count,
            mean,
            min: self.min,
            max: self.max,
            variance,
            std_dev: variance.map(f64::sqrt),
        };

        self.start = self.window_stop();
        self.count = 0;
        self.values = 0;
        self.sum = 0.0;
        self.min = None;
        self.max = None;
        self.occurrences = 0;
        if let Some(samples) = &mut self.samples {
            samples.clear();
        }

        statistic
    }
}
