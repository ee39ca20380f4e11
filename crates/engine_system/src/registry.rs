//! System registry: the flat list of active system instances.
//!
//! Entries are kept in discovery order: each root followed by its auto-init
//! descendants, depth-first. Children are stored next to their parent, never
//! inside it. Lookups and lifecycle broadcasts iterate in this order.
//!
//! The registry performs no uniqueness check; callers expect at most one
//! active instance per type and get the first one.

use tracing::warn;
use uuid::Uuid;

use crate::instance::SystemHandle;
use crate::system::{CapabilityId, System, short_type_name};

/// Registry of all active systems.
#[derive(Debug, Default)]
pub struct SystemRegistry {
    /// Systems in registration order.
    systems: Vec<SystemHandle>,
}

impl SystemRegistry {
    /// Create a new empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            systems: Vec::new(),
        }
    }

    /// Append a system instance.
    pub fn register(&mut self, system: SystemHandle) {
        self.systems.push(system);
    }

    /// First instance built from a `T`.
    ///
    /// A miss is logged and returns `None`.
    #[must_use]
    pub fn lookup<T: System>(&self) -> Option<SystemHandle> {
        let found = self.systems.iter().find(|s| s.is::<T>()).cloned();
        if found.is_none() {
            warn!(system = short_type_name::<T>(), "system not found");
        }
        found
    }

    /// First instance advertising `capability`.
    ///
    /// A miss is logged and returns `None`.
    #[must_use]
    pub fn lookup_capability(&self, capability: CapabilityId) -> Option<SystemHandle> {
        let found = self
            .systems
            .iter()
            .find(|s| s.kind().has_capability(capability))
            .cloned();
        if found.is_none() {
            warn!(%capability, "no system with capability");
        }
        found
    }

    /// First instance with the given display name.
    #[must_use]
    pub fn lookup_by_name(&self, name: &str) -> Option<SystemHandle> {
        let found = self.systems.iter().find(|s| s.name() == name).cloned();
        if found.is_none() {
            warn!(system = name, "system not found");
        }
        found
    }

    /// The instance with the given id.
    #[must_use]
    pub fn get(&self, id: Uuid) -> Option<&SystemHandle> {
        self.systems.iter().find(|s| s.id() == id)
    }

    /// Returns an iterator over all systems in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &SystemHandle> {
        self.systems.iter()
    }

    /// All systems in registration order.
    #[must_use]
    pub fn as_slice(&self) -> &[SystemHandle] {
        &self.systems
    }

    /// Returns the number of registered systems.
    #[must_use]
    pub fn len(&self) -> usize {
        self.systems.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.systems.is_empty()
    }

    /// Remove and return every system, in registration order.
    pub fn drain(&mut self) -> Vec<SystemHandle> {
        std::mem::take(&mut self.systems)
    }
}
