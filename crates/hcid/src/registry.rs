//! Endpoint registry: which paths exist and what they stand for.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use thiserror::Error;

use crate::bus::ObjectPath;

/// What a registered path stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EndpointId {
    /// The manager endpoint.
    Manager,
    /// The device-class endpoint.
    Device,
    /// The default-adapter alias of a profile.
    Alias,
    /// A specific adapter.
    Concrete(u16),
}

impl fmt::Display for EndpointId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Manager => formatter.write_str("manager"),
            Self::Device => formatter.write_str("device"),
            Self::Alias => formatter.write_str("default"),
            Self::Concrete(id) => write!(formatter, "hci{id}"),
        }
    }
}

/// How a path resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// The path itself is registered.
    Exact(EndpointId),
    /// Only a fallback ancestor is registered.
    Fallback {
        /// The registered ancestor.
        owner: ObjectPath,
        /// The ancestor's identifier.
        id: EndpointId,
    },
}

/// Registration failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// Another endpoint already owns the path.
    #[error("endpoint path '{path}' is already registered")]
    AlreadyRegistered {
        /// Contested path.
        path: ObjectPath,
    },
    /// Nothing is registered at the path.
    #[error("endpoint path '{path}' is not registered")]
    NotFound {
        /// Missing path.
        path: ObjectPath,
    },
}

#[derive(Debug, Clone, Copy)]
struct Registration {
    id: EndpointId,
    fallback: bool,
}

/// Map from path to endpoint identifier.
#[derive(Debug, Default)]
pub struct EndpointRegistry {
    entries: BTreeMap<ObjectPath, Registration>,
}

impl EndpointRegistry {
    /// Builds an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an endpoint that answers for `path` only.
    pub fn register(&mut self, path: ObjectPath, id: EndpointId) -> Result<(), RegistryError> {
        self.insert(path, id, false)
    }

    /// Registers an endpoint that also answers for unregistered descendants.
    pub fn register_fallback(
        &mut self,
        path: ObjectPath,
        id: EndpointId,
    ) -> Result<(), RegistryError> {
        self.insert(path, id, true)
    }

    fn insert(
        &mut self,
        path: ObjectPath,
        id: EndpointId,
        fallback: bool,
    ) -> Result<(), RegistryError> {
        if self.entries.contains_key(&path) {
            return Err(RegistryError::AlreadyRegistered { path });
        }
        self.entries.insert(path, Registration { id, fallback });
        Ok(())
    }

    /// Removes the endpoint at `path` and returns its identifier.
    pub fn unregister(&mut self, path: &ObjectPath) -> Result<EndpointId, RegistryError> {
        self.entries
            .remove(path)
            .map(|registration| registration.id)
            .ok_or_else(|| RegistryError::NotFound { path: path.clone() })
    }

    /// Identifier registered exactly at `path`.
    #[must_use]
    pub fn resolve(&self, path: &ObjectPath) -> Option<EndpointId> {
        self.entries.get(path).map(|registration| registration.id)
    }

    /// Resolves `path` exactly, else through the nearest fallback ancestor.
    #[must_use]
    pub fn lookup(&self, path: &ObjectPath) -> Option<Resolution> {
        if let Some(id) = self.resolve(path) {
            return Some(Resolution::Exact(id));
        }
        let mut ancestor = path.parent();
        while let Some(candidate) = ancestor {
            if let Some(registration) = self.entries.get(&candidate)
                && registration.fallback
            {
                return Some(Resolution::Fallback {
                    owner: candidate,
                    id: registration.id,
                });
            }
            ancestor = candidate.parent();
        }
        None
    }

    /// Names of the direct children of `path`, including intermediate nodes
    /// that lead to deeper registrations. Sorted and free of duplicates.
    #[must_use]
    pub fn children_of(&self, path: &ObjectPath) -> Vec<String> {
        self.entries
            .keys()
            .filter_map(|registered| path.next_segment_toward(registered))
            .map(str::to_owned)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Owned list of every registered path at or below `path`, deepest first.
    #[must_use]
    pub fn snapshot_under(&self, path: &ObjectPath) -> Vec<ObjectPath> {
        let mut paths: Vec<ObjectPath> = self
            .entries
            .keys()
            .filter(|registered| *registered == path || path.is_ancestor_of(registered))
            .cloned()
            .collect();
        paths.sort_by_key(|registered| std::cmp::Reverse(registered.depth()));
        paths
    }

    /// Number of registered endpoints.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` when nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use rstest::{fixture, rstest};

    use super::*;

    fn path(text: &str) -> ObjectPath {
        ObjectPath::parse(text).expect("valid path")
    }

    #[fixture]
    fn registry() -> EndpointRegistry {
        let mut registry = EndpointRegistry::new();
        registry
            .register_fallback(path("/org/bluez/Manager"), EndpointId::Manager)
            .expect("manager");
        registry
            .register(path("/org/bluez/Device"), EndpointId::Device)
            .expect("device");
        registry
            .register(
                path("/org/bluez/Manager/hci0/Controller"),
                EndpointId::Concrete(0),
            )
            .expect("hci0");
        registry
    }

    #[rstest]
    fn duplicate_registration_is_rejected(mut registry: EndpointRegistry) {
        let error = registry
            .register(path("/org/bluez/Device"), EndpointId::Device)
            .expect_err("duplicate");
        assert!(matches!(error, RegistryError::AlreadyRegistered { .. }));
    }

    #[rstest]
    fn unregistering_unknown_path_fails(mut registry: EndpointRegistry) {
        let error = registry
            .unregister(&path("/org/bluez/Manager/hci9/Controller"))
            .expect_err("missing");
        assert!(matches!(error, RegistryError::NotFound { .. }));
    }

    #[rstest]
    fn unregistered_descendants_resolve_through_fallback(registry: EndpointRegistry) {
        assert_eq!(
            registry.lookup(&path("/org/bluez/Manager/hci0")),
            Some(Resolution::Fallback {
                owner: path("/org/bluez/Manager"),
                id: EndpointId::Manager,
            })
        );
        assert_eq!(
            registry.lookup(&path("/org/bluez/Manager/hci0/Controller")),
            Some(Resolution::Exact(EndpointId::Concrete(0)))
        );
        assert_eq!(registry.lookup(&path("/org/bluez/Device/x")), None);
        assert_eq!(registry.lookup(&path("/org/other")), None);
    }

    #[rstest]
    fn children_include_intermediate_nodes(registry: EndpointRegistry) {
        assert_eq!(registry.children_of(&path("/org/bluez")), vec!["Device", "Manager"]);
        assert_eq!(registry.children_of(&path("/org/bluez/Manager")), vec!["hci0"]);
        assert!(registry.children_of(&path("/org/bluez/Device")).is_empty());
    }

    #[rstest]
    fn snapshot_lists_deepest_paths_first(registry: EndpointRegistry) {
        let snapshot = registry.snapshot_under(&path("/org/bluez/Manager"));
        assert_eq!(
            snapshot,
            vec![
                path("/org/bluez/Manager/hci0/Controller"),
                path("/org/bluez/Manager"),
            ]
        );
    }
}
