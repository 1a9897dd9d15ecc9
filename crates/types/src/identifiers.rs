// Copyright (c) 2023 - 2026 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Names and identifiers of the entities driven by the runtime.
//!
//! Names come out of the model configuration and are cheap-to-clone
//! [`ByteString`]s. Execution ids are generated per firing.

use std::fmt::{self, Display, Formatter};

use bytestring::ByteString;
use ulid::Ulid;

macro_rules! config_name {
    ($name:ident, $doc:literal) => {
        #[doc = $doc]
        #[derive(
            Debug,
            Clone,
            PartialEq,
            Eq,
            PartialOrd,
            Ord,
            Hash,
            derive_more::Display,
            serde::Serialize,
            serde::Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(ByteString);

        impl $name {
            pub fn new(name: impl Into<ByteString>) -> Self {
                Self(name.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(ByteString::from(value))
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(ByteString::from(value))
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

config_name!(
    ActivityName,
    "Name under which an activity graph is registered in the model."
);
config_name!(
    EventName,
    "Name of an event binding an activity to a firing mechanism."
);
config_name!(
    NodeName,
    "Stable identifier of a graph node, required only for jump targets."
);
config_name!(
    DistributionName,
    "Name under which a distribution is registered in the model."
);
config_name!(
    CounterName,
    "Identifier of a statistics counter/bucket."
);

/// Unique id of one activity execution (one firing).
///
/// Ulids embed the creation timestamp, which keeps concurrently logged
/// executions sortable by start time.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    serde_with::SerializeDisplay,
    serde_with::DeserializeFromStr,
)]
pub struct ExecutionId(Ulid);

impl ExecutionId {
    pub fn generate() -> Self {
        Self(Ulid::new())
    }

    pub const fn from_parts(timestamp_ms: u64, random: u128) -> Self {
        Self(Ulid::from_parts(timestamp_ms, random))
    }
}

impl Display for ExecutionId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "ex_{}", self.0)
    }
}

impl std::str::FromStr for ExecutionId {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.strip_prefix("ex_").unwrap_or(s);
        Ok(Self(Ulid::from_string(raw)?))
    }
}
