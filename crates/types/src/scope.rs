// Copyright (c) 2023 - 2026 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Hierarchical variable scope.
//!
//! A scope is a name→value map chained to an optional parent. Lookups and
//! removals probe the local map first and then walk the parent chain;
//! writes always land in the local map, shadowing outer bindings.
//!
//! Scopes are shared by `Arc`: a `Parallel` node and its detached threads
//! operate on the same instance, while independently triggered firings each
//! derive a fresh child of the model's root scope.

use std::collections::HashMap;
use std::sync::Arc;

use bytestring::ByteString;
use parking_lot::RwLock;

use crate::value::Value;

#[derive(Debug, Default)]
pub struct VarScope {
    parent: Option<Arc<VarScope>>,
    vars: RwLock<HashMap<ByteString, Value>>,
}

impl VarScope {
    pub fn new_root() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Create a child scope shadowing `parent`.
    pub fn derive(parent: &Arc<VarScope>) -> Arc<Self> {
        Arc::new(Self {
            parent: Some(Arc::clone(parent)),
            vars: RwLock::default(),
        })
    }

    /// Resolve `name`, walking the parent chain on a local miss.
    pub fn get(&self, name: &str) -> Option<Value> {
        if let Some(value) = self.vars.read().get(name) {
            return Some(value.clone());
        }
        self.parent.as_ref().and_then(|parent| parent.get(name))
    }

    /// Bind `name` in the local scope, shadowing any outer binding.
    /// Returns the previously bound local value, if any.
    pub fn set(&self, name: impl Into<ByteString>, value: impl Into<Value>) -> Option<Value> {
        self.vars.write().insert(name.into(), value.into())
    }

    /// Remove `name` from the innermost scope that binds it.
    pub fn remove(&self, name: &str) -> Option<Value> {
        if let Some(value) = self.vars.write().remove(name) {
            return Some(value);
        }
        self.parent.as_ref().and_then(|parent| parent.remove(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.vars.read().contains_key(name)
            || self
                .parent
                .as_ref()
                .is_some_and(|parent| parent.contains(name))
    }

    /// Number of bindings in the local scope only.
    pub fn local_len(&self) -> usize {
        self.vars.read().len()
    }
}
