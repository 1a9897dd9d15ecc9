// Copyright (c) 2023 - 2026 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::fmt;
use std::fmt::Display;
use std::ops::{Add, Sub};
use std::time::{Duration, SystemTime};

/// Milliseconds since the unix epoch.
///
/// Statistics windows and run reports are stamped with wall-clock instants
/// of this type; distribution time is relative and uses [`Duration`].
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(transparent)]
pub struct MillisSinceEpoch(u64);

impl MillisSinceEpoch {
    pub const UNIX_EPOCH: MillisSinceEpoch = MillisSinceEpoch::new(0);
    pub const MAX: MillisSinceEpoch = MillisSinceEpoch::new(u64::MAX);

    pub const fn new(millis_since_epoch: u64) -> Self {
        MillisSinceEpoch(millis_since_epoch)
    }

    pub fn now() -> Self {
        SystemTime::now().into()
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }

    /// Duration elapsed since `earlier`, zero if `earlier` is in the future.
    pub fn duration_since(&self, earlier: MillisSinceEpoch) -> Duration {
        Duration::from_millis(self.0.saturating_sub(earlier.0))
    }

    pub fn elapsed(&self) -> Duration {
        Self::now().duration_since(*self)
    }
}

impl From<u64> for MillisSinceEpoch {
    fn from(value: u64) -> Self {
        Self::new(value)
    }
}

impl From<SystemTime> for MillisSinceEpoch {
    fn from(value: SystemTime) -> Self {
        MillisSinceEpoch::new(
            u64::try_from(
                value
                    .duration_since(SystemTime::UNIX_EPOCH)
                    .expect("duration since Unix epoch should be well-defined")
                    .as_millis(),
            )
            .expect("millis since Unix epoch should fit in u64"),
        )
    }
}

impl From<MillisSinceEpoch> for SystemTime {
    fn from(value: MillisSinceEpoch) -> Self {
        SystemTime::UNIX_EPOCH + Duration::from_millis(value.as_u64())
    }
}

impl Add<Duration> for MillisSinceEpoch {
    type Output = MillisSinceEpoch;

    fn add(self, rhs: Duration) -> Self::Output {
        MillisSinceEpoch::new(self.0.saturating_add(rhs.as_millis() as u64))
    }
}

impl Sub<Duration> for MillisSinceEpoch {
    type Output = MillisSinceEpoch;

    fn sub(self, rhs: Duration) -> Self::Output {
        MillisSinceEpoch::new(self.0.saturating_sub(rhs.as_millis() as u64))
    }
}

impl Display for MillisSinceEpoch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ms since epoch", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_arithmetic() {
        let start = MillisSinceEpoch::new(10_000);
        let stop = start + Duration::from_secs(5);
        assert_eq!(stop.as_u64(), 15_000);
        assert_eq!(stop.duration_since(start), Duration::from_secs(5));
        // no underflow going backwards
        assert_eq!(start.duration_since(stop), Duration::ZERO);
    }
}
