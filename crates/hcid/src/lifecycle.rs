//! Adapter lifecycle: keeps the endpoint tree in step with attached adapters.
//!
//! Every attached adapter owns one endpoint per profile at
//! `/org/bluez/Manager/hci<id>/<profile>`. While at least one adapter is
//! attached, each profile also has an alias endpoint at
//! `/org/bluez/Manager/default/<profile>`. Registration failures are logged
//! and never abort the transition.

use std::collections::BTreeSet;

use tracing::{info, warn};

use crate::bus::{ObjectPath, PathError};
use crate::registry::{EndpointId, EndpointRegistry, RegistryError};

const LIFECYCLE_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::lifecycle");

/// Path of the manager endpoint; registered as a fallback for its subtree.
pub const MANAGER_PATH: &str = "/org/bluez/Manager";
/// Path of the device-class endpoint.
pub const DEVICE_PATH: &str = "/org/bluez/Device";
/// Segment naming the default-adapter alias.
pub const ALIAS_SEGMENT: &str = "default";

/// Path of `profile` on adapter `id`.
///
/// `profile` must be a single path segment.
pub fn adapter_path(id: u16, profile: &str) -> Result<ObjectPath, PathError> {
    ObjectPath::from_static(MANAGER_PATH)
        .child(&format!("hci{id}"))?
        .child(profile)
}

/// Path of the default-adapter alias of `profile`.
pub fn alias_path(profile: &str) -> Result<ObjectPath, PathError> {
    ObjectPath::from_static(MANAGER_PATH)
        .child(ALIAS_SEGMENT)?
        .child(profile)
}

/// Tracks attached adapters and mutates the registry on transitions.
#[derive(Debug)]
pub struct LifecycleManager {
    profiles: Vec<&'static str>,
    attached: BTreeSet<u16>,
}

impl LifecycleManager {
    /// Builds a manager that publishes the named profiles.
    #[must_use]
    pub fn new(profiles: impl IntoIterator<Item = &'static str>) -> Self {
        Self {
            profiles: profiles.into_iter().collect(),
            attached: BTreeSet::new(),
        }
    }

    /// Registers the device-class endpoint and the manager fallback.
    pub fn install_roots(&self, registry: &mut EndpointRegistry) {
        log_failure(
            registry.register(ObjectPath::from_static(DEVICE_PATH), EndpointId::Device),
            "register device endpoint",
        );
        log_failure(
            registry.register_fallback(ObjectPath::from_static(MANAGER_PATH), EndpointId::Manager),
            "register manager endpoint",
        );
    }

    /// Publishes endpoints for a newly attached adapter.
    ///
    /// Returns `false` when the adapter was already attached.
    pub fn attach(&mut self, registry: &mut EndpointRegistry, id: u16) -> bool {
        if !self.attached.insert(id) {
            warn!(target: LIFECYCLE_TARGET, adapter = id, "adapter already attached");
            return false;
        }
        let first = self.attached.len() == 1;
        for profile in &self.profiles {
            match adapter_path(id, profile) {
                Ok(path) => log_failure(
                    registry.register(path, EndpointId::Concrete(id)),
                    "register adapter endpoint",
                ),
                Err(error) => log_path_error(&error),
            }
            if first {
                match alias_path(profile) {
                    Ok(path) => {
                        log_failure(registry.register(path, EndpointId::Alias), "register alias");
                    }
                    Err(error) => log_path_error(&error),
                }
            }
        }
        info!(
            target: LIFECYCLE_TARGET,
            adapter = id,
            adapters = self.attached.len(),
            "adapter attached"
        );
        true
    }

    /// Withdraws the endpoints of a detached adapter.
    ///
    /// Returns `false` when the adapter was not attached.
    pub fn detach(&mut self, registry: &mut EndpointRegistry, id: u16) -> bool {
        if !self.attached.remove(&id) {
            warn!(target: LIFECYCLE_TARGET, adapter = id, "detach for unknown adapter");
            return false;
        }
        let last = self.attached.is_empty();
        for profile in &self.profiles {
            match adapter_path(id, profile) {
                Ok(path) => log_failure(
                    registry.unregister(&path).map(drop),
                    "unregister adapter endpoint",
                ),
                Err(error) => log_path_error(&error),
            }
            if last {
                match alias_path(profile) {
                    Ok(path) => {
                        log_failure(registry.unregister(&path).map(drop), "unregister alias");
                    }
                    Err(error) => log_path_error(&error),
                }
            }
        }
        info!(
            target: LIFECYCLE_TARGET,
            adapter = id,
            adapters = self.attached.len(),
            "adapter detached"
        );
        true
    }

    /// Number of attached adapters.
    #[must_use]
    pub fn adapter_count(&self) -> usize {
        self.attached.len()
    }

    /// Returns `true` while `id` is attached.
    #[must_use]
    pub fn is_attached(&self, id: u16) -> bool {
        self.attached.contains(&id)
    }

    /// Attached adapter ids in ascending order.
    pub fn attached(&self) -> impl Iterator<Item = u16> + '_ {
        self.attached.iter().copied()
    }
}

fn log_failure(result: Result<(), RegistryError>, action: &'static str) {
    if let Err(error) = result {
        warn!(target: LIFECYCLE_TARGET, action, error = %error, "endpoint registry update failed");
    }
}

fn log_path_error(error: &PathError) {
    warn!(target: LIFECYCLE_TARGET, error = %error, "cannot build endpoint path");
}

#[cfg(test)]
mod tests {
    use rstest::{fixture, rstest};

    use super::*;

    struct Fixture {
        lifecycle: LifecycleManager,
        registry: EndpointRegistry,
    }

    impl Fixture {
        fn alias(&self) -> Option<EndpointId> {
            self.registry
                .resolve(&alias_path("Controller").expect("alias path"))
        }

        fn concrete(&self, id: u16) -> Option<EndpointId> {
            self.registry
                .resolve(&adapter_path(id, "Controller").expect("adapter path"))
        }
    }

    #[fixture]
    fn fixture() -> Fixture {
        let lifecycle = LifecycleManager::new(["Controller"]);
        let mut registry = EndpointRegistry::new();
        lifecycle.install_roots(&mut registry);
        Fixture {
            lifecycle,
            registry,
        }
    }

    #[rstest]
    fn roots_are_registered(fixture: Fixture) {
        assert_eq!(
            fixture.registry.resolve(&ObjectPath::from_static(MANAGER_PATH)),
            Some(EndpointId::Manager)
        );
        assert_eq!(
            fixture.registry.resolve(&ObjectPath::from_static(DEVICE_PATH)),
            Some(EndpointId::Device)
        );
    }

    #[rstest]
    fn alias_tracks_first_and_last_adapter(mut fixture: Fixture) {
        assert_eq!(fixture.alias(), None);
        assert!(fixture.lifecycle.attach(&mut fixture.registry, 0));
        assert_eq!(fixture.alias(), Some(EndpointId::Alias));
        assert!(fixture.lifecycle.attach(&mut fixture.registry, 1));
        assert!(fixture.lifecycle.detach(&mut fixture.registry, 0));
        assert_eq!(fixture.alias(), Some(EndpointId::Alias));
        assert_eq!(fixture.concrete(0), None);
        assert_eq!(fixture.concrete(1), Some(EndpointId::Concrete(1)));
        assert!(fixture.lifecycle.detach(&mut fixture.registry, 1));
        assert_eq!(fixture.alias(), None);
        assert_eq!(fixture.lifecycle.adapter_count(), 0);
    }

    #[rstest]
    fn reattaching_another_adapter_leaves_the_old_one_withdrawn(mut fixture: Fixture) {
        assert!(fixture.lifecycle.attach(&mut fixture.registry, 0));
        assert!(fixture.lifecycle.detach(&mut fixture.registry, 0));
        assert!(fixture.lifecycle.attach(&mut fixture.registry, 1));
        assert_eq!(fixture.concrete(0), None);
        assert_eq!(fixture.concrete(1), Some(EndpointId::Concrete(1)));
        assert_eq!(fixture.alias(), Some(EndpointId::Alias));
    }

    #[rstest]
    #[case("Controller/Extra")]
    #[case("")]
    fn profiles_must_be_single_segments(#[case] profile: &str) {
        assert!(adapter_path(0, profile).is_err());
        assert!(alias_path(profile).is_err());
    }

    #[rstest]
    fn multi_segment_profiles_publish_nothing() {
        let mut lifecycle = LifecycleManager::new(["Controller/Extra"]);
        let mut registry = EndpointRegistry::new();
        lifecycle.install_roots(&mut registry);
        let roots = registry.len();
        assert!(lifecycle.attach(&mut registry, 0));
        assert_eq!(registry.len(), roots);
    }

    #[rstest]
    fn duplicate_attach_and_unknown_detach_are_ignored(mut fixture: Fixture) {
        assert!(fixture.lifecycle.attach(&mut fixture.registry, 3));
        let registered = fixture.registry.len();
        assert!(!fixture.lifecycle.attach(&mut fixture.registry, 3));
        assert!(!fixture.lifecycle.detach(&mut fixture.registry, 4));
        assert_eq!(fixture.registry.len(), registered);
        assert_eq!(fixture.lifecycle.attached().collect::<Vec<_>>(), vec![3]);
    }

    #[rstest]
    fn foreign_registration_does_not_block_attach(mut fixture: Fixture) {
        fixture
            .registry
            .register(alias_path("Controller").expect("alias"), EndpointId::Device)
            .expect("pre-registered");
        assert!(fixture.lifecycle.attach(&mut fixture.registry, 0));
        assert_eq!(fixture.concrete(0), Some(EndpointId::Concrete(0)));
        assert!(fixture.lifecycle.is_attached(0));
    }
}
