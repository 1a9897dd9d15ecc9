// Copyright (c) 2023 - 2026 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Common error plumbing shared across the runtime crates.

/// Error type which abstracts away the actual [`std::error::Error`] type.
/// Leaf nodes and preparation steps return this; the runtime never needs to
/// know their concrete error types.
pub type GenericError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Walk the `source()` chain down to the root cause.
///
/// Failures crossing the event boundary are logged with their root cause so
/// that reports attribute an error to what actually went wrong rather than
/// to the outermost wrapper.
pub fn root_cause<'a>(error: &'a (dyn std::error::Error + 'static)) -> &'a (dyn std::error::Error + 'static) {
    let mut current = error;
    while let Some(source) = current.source() {
        current = source;
    }
    current
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, thiserror::Error)]
    #[error("outer wrapper")]
    struct Outer(#[source] Inner);

    #[derive(Debug, thiserror::Error)]
    #[error("actual failure")]
    struct Inner;

    #[test]
    fn unwraps_to_root() {
        let err = Outer(Inner);
        assert_eq!(root_cause(&err).to_string(), "actual failure");
    }

    #[test]
    fn root_is_identity_without_sources() {
        let err = Inner;
        assert_eq!(root_cause(&err).to_string(), "actual failure");
    }
}
