// Copyright (c) 2023 - 2026 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use rand::distributions::{Alphanumeric, DistString};
use rand::Rng;

/// Random lowercase alphanumeric name, handy for unique counter/activity
/// names in tests that share a process-wide registry.
pub fn random_name(prefix: &str) -> String {
    let suffix = Alphanumeric
        .sample_string(&mut rand::thread_rng(), 8)
        .to_lowercase();
    format!("{prefix}-{suffix}")
}

/// Uniformly random f64 sample vector in `[0, bound)`.
pub fn random_samples(n: usize, bound: f64) -> Vec<f64> {
    let mut rng = rand::thread_rng();
    (0..n).map(|_| rng.gen_range(0.0..bound)).collect()
}
