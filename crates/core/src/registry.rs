// Copyright (c) 2023 - 2026 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use parking_lot::RwLock;

use protosim_distribution::Distribution;
use protosim_types::config::RuntimeOptions;
use protosim_types::identifiers::{ActivityName, DistributionName};
use protosim_types::scope::VarScope;
use protosim_types::time::MillisSinceEpoch;

/// Lookup failures and duplicate registrations are configuration errors,
/// fatal to the definition that caused them.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("activity '{0}' is already registered")]
    DuplicateActivity(ActivityName),
    #[error("distribution '{0}' is already registered")]
    DuplicateDistribution(DistributionName),
    #[error("activity '{0}' is not registered")]
    UnresolvedActivity(ActivityName),
    #[error("distribution '{0}' is not registered")]
    UnresolvedDistribution(DistributionName),
}

/// The model registry owns everything the core consumes from the
/// surrounding simulation context: named activities and distributions, the
/// replaceable root variable scope, the simulated start time and the
/// configured bucket duration.
///
/// Registration happens during assembly; resolution happens at start time
/// and fails fatally on an unresolved name. The registry is generic over
/// the activity type so that it carries sealed graphs without depending on
/// the interpreter crate.
pub struct ModelRegistry<A> {
    activities: RwLock<HashMap<ActivityName, Arc<A>>>,
    distributions: RwLock<HashMap<DistributionName, Arc<Distribution>>>,
    root_scope: ArcSwap<VarScope>,
    start_time: MillisSinceEpoch,
    options: RuntimeOptions,
}

impl<A> ModelRegistry<A> {
    pub fn new(start_time: MillisSinceEpoch, options: RuntimeOptions) -> Self {
        Self {
            activities: RwLock::default(),
            distributions: RwLock::default(),
            root_scope: ArcSwap::new(VarScope::new_root()),
            start_time,
            options,
        }
    }

    pub fn register_activity(
        &self,
        name: ActivityName,
        activity: A,
    ) -> Result<(), RegistryError> {
        let mut activities = self.activities.write();
        if activities.contains_key(&name) {
            return Err(RegistryError::DuplicateActivity(name));
        }
        activities.insert(name, Arc::new(activity));
        Ok(())
    }

    pub fn register_distribution(
        &self,
        distribution: Distribution,
    ) -> Result<(), RegistryError> {
        let mut distributions = self.distributions.write();
        let name = distribution.name().clone();
        if distributions.contains_key(&name) {
            return Err(RegistryError::DuplicateDistribution(name));
        }
        distributions.insert(name, Arc::new(distribution));
        Ok(())
    }

    pub fn resolve_activity(&self, name: &ActivityName) -> Result<Arc<A>, RegistryError> {
        self.activities
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| RegistryError::UnresolvedActivity(name.clone()))
    }

    pub fn resolve_distribution(
        &self,
        name: &DistributionName,
    ) -> Result<Arc<Distribution>, RegistryError> {
        self.distributions
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| RegistryError::UnresolvedDistribution(name.clone()))
    }

    /// The model's current root scope. Independently triggered firings
    /// derive their fresh scopes from this.
    pub fn root_scope(&self) -> Arc<VarScope> {
        self.root_scope.load_full()
    }

    /// Replace the root scope, e.g. when the surrounding system reloads
    /// model-level values. In-flight executions keep the scope chain they
    /// started with.
    pub fn replace_root_scope(&self, scope: Arc<VarScope>) {
        self.root_scope.store(scope);
    }

    pub fn start_time(&self) -> MillisSinceEpoch {
        self.start_time
    }

    pub fn bucket_duration(&self) -> Duration {
        self.options.bucket_duration()
    }

    pub fn options(&self) -> &RuntimeOptions {
        &self.options
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use protosim_distribution::DistributionParams;
    use protosim_test_util::assert;

    fn registry() -> ModelRegistry<&'static str> {
        ModelRegistry::new(MillisSinceEpoch::new(0), RuntimeOptions::default())
    }

    #[test]
    fn duplicate_activity_is_rejected() {
        let registry = registry();
        registry
            .register_activity(ActivityName::from("login"), "graph")
            .unwrap();
        let result = registry.register_activity(ActivityName::from("login"), "other");
        assert!(let Err(RegistryError::DuplicateActivity(_)) = result);
    }

    #[test]
    fn unresolved_names_are_fatal() {
        let registry = registry();
        assert!(let Err(RegistryError::UnresolvedActivity(_)) =
            registry.resolve_activity(&ActivityName::from("ghost")));
        assert!(let Err(RegistryError::UnresolvedDistribution(_)) =
            registry.resolve_distribution(&DistributionName::from("ghost")));
    }

    #[test]
    fn distributions_resolve_after_registration() {
        let registry = registry();
        let dist = Distribution::from_params(
            DistributionName::from("arrivals"),
            10.0,
            DistributionParams::Exponential { rate: 1.0 },
        )
        .unwrap();
        registry.register_distribution(dist).unwrap();

        let resolved = registry
            .resolve_distribution(&DistributionName::from("arrivals"))
            .unwrap();
        assert_eq!(resolved.intensity(), 10.0);
    }

    #[test]
    fn root_scope_replacement_does_not_affect_derived_chains() {
        let registry = registry();
        registry.root_scope().set("model-var", 1i64);
        let derived = VarScope::derive(&registry.root_scope());

        registry.replace_root_scope(VarScope::new_root());

        // the old chain still resolves; new derivations see the new root
        assert_eq!(derived.get("model-var"), Some(1i64.into()));
        let fresh = VarScope::derive(&registry.root_scope());
        assert_eq!(fresh.get("model-var"), None);
    }
}
