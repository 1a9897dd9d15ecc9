// Copyright (c) 2023 - 2026 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Windowed statistics aggregation.
//!
//! Raw counters and numeric samples are folded into fixed-duration windows;
//! every window rollover emits an immutable [`Statistic`] snapshot to the
//! configured [`StatisticSink`]. Buckets are created lazily per counter
//! identifier and are shared by all concurrent producers.

mod bucket;
mod metric_definitions;
mod registry;

pub use bucket::{Bucket, Statistic};
pub use registry::{BucketRegistry, StatisticSink, TracingSink};
