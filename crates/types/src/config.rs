// Copyright (c) 2023 - 2026 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::num::NonZeroUsize;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_with::serde_as;

/// # Runtime options
///
/// Options of the simulation runtime that are not derived from the model
/// configuration itself.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize, derive_builder::Builder)]
#[serde(rename_all = "kebab-case", default)]
#[builder(default)]
pub struct RuntimeOptions {
    /// # Bucket duration
    ///
    /// Width of one statistics window. All buckets roll over on multiples
    /// of this duration relative to the simulation start.
    ///
    /// Can be configured using the [`humantime`](https://docs.rs/humantime/latest/humantime/fn.parse_duration.html) format.
    #[serde_as(as = "serde_with::DisplayFromStr")]
    pub bucket_duration: humantime::Duration,

    /// # Window step
    ///
    /// Period at which stochastic events are checked for due firings. Each
    /// check covers the elapsed-time window since the previous one.
    ///
    /// Can be configured using the [`humantime`](https://docs.rs/humantime/latest/humantime/fn.parse_duration.html) format.
    #[serde_as(as = "serde_with::DisplayFromStr")]
    pub window_step: humantime::Duration,

    /// # Cycle duration
    ///
    /// Length of one periodic cycle for distributions defined as
    /// unbounded-rate processes. Unset means the run never completes a
    /// cycle.
    #[serde(with = "serde_with::As::<Option<serde_with::DisplayFromStr>>")]
    pub cycle_duration: Option<humantime::Duration>,

    /// # Worker threads
    ///
    /// Number of threads of the runtime spawning activity executions.
    worker_threads: Option<NonZeroUsize>,

    /// # Shutdown grace period
    ///
    /// Time the runtime waits for in-flight executions when shutting down.
    ///
    /// Can be configured using the [`humantime`](https://docs.rs/humantime/latest/humantime/fn.parse_duration.html) format.
    #[serde_as(as = "serde_with::DisplayFromStr")]
    pub shutdown_timeout: humantime::Duration,
}

impl RuntimeOptions {
    pub fn bucket_duration(&self) -> Duration {
        self.bucket_duration.into()
    }

    pub fn window_step(&self) -> Duration {
        self.window_step.into()
    }

    pub fn cycle_duration(&self) -> Option<Duration> {
        self.cycle_duration.map(Into::into)
    }

    pub fn worker_threads(&self) -> NonZeroUsize {
        self.worker_threads.unwrap_or_else(|| {
            std::thread::available_parallelism().unwrap_or(NonZeroUsize::new(4).unwrap())
        })
    }

    pub fn shutdown_grace_period(&self) -> Duration {
        self.shutdown_timeout.into()
    }
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            bucket_duration: Duration::from_secs(10).into(),
            window_step: Duration::from_secs(1).into(),
            cycle_duration: None,
            worker_threads: None,
            shutdown_timeout: Duration::from_secs(10).into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let opts = RuntimeOptions::default();
        assert_eq!(opts.bucket_duration(), Duration::from_secs(10));
        assert_eq!(opts.window_step(), Duration::from_secs(1));
        assert!(opts.cycle_duration().is_none());
    }

    #[test]
    fn humantime_roundtrip() {
        let parsed: RuntimeOptions = serde_json::from_str(
            r#"{"bucket-duration": "30s", "window-step": "500ms", "cycle-duration": "1h"}"#,
        )
        .unwrap();
        assert_eq!(parsed.bucket_duration(), Duration::from_secs(30));
        assert_eq!(parsed.window_step(), Duration::from_millis(500));
        assert_eq!(parsed.cycle_duration(), Some(Duration::from_secs(3600)));
    }

    #[test]
    fn builder_defaults() {
        let opts = RuntimeOptionsBuilder::default().build().unwrap();
        assert_eq!(opts.shutdown_grace_period(), Duration::from_secs(10));
    }
}
