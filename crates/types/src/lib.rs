// Copyright (c) 2023 - 2026 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Shared types for the protosim runtime: identifiers, simulated time,
//! runtime values, the hierarchical variable scope, and configuration.

pub mod config;
pub mod errors;
pub mod identifiers;
pub mod scope;
pub mod time;
pub mod value;

pub use errors::GenericError;
pub use scope::VarScope;
pub use value::Value;
