//! Core [`System`] trait and type identity.
//!
//! A system is a unit of long-lived functionality with an init/finish
//! lifecycle. Concrete system types are plain Rust structs; the runtime wraps
//! them into [`SystemInstance`](crate::SystemInstance)s when a tree is built.
//!
//! ## Type identity
//!
//! Every template records a [`SystemKind`] when it is constructed: the
//! concrete [`TypeId`], a human-readable name and the list of
//! [`CapabilityId`]s the system advertises. Registry lookups compare against
//! this recorded key instead of inspecting values at runtime.

use std::any::{Any, TypeId};
use std::borrow::Cow;

use crate::context::InitContext;
use crate::log::LogSink;

/// Upcast helper so boxed systems can be downcast to their concrete type.
///
/// Implemented for every `'static` type; never implement it by hand.
pub trait AsAny: Any {
    /// Returns `self` as [`Any`].
    fn as_any(&self) -> &dyn Any;

    /// Returns `self` as mutable [`Any`].
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// The contract every system must satisfy.
pub trait System: AsAny {
    /// User-defined initialisation, called once after the parent has been
    /// recorded on the instance.
    ///
    /// # Errors
    ///
    /// Any error aborts the build of this subtree and is propagated to the
    /// host's startup call.
    fn init(&mut self, ctx: &InitContext<'_>) -> anyhow::Result<()>;

    /// Called once when the system lifecycle ends.
    fn finish(&mut self) {}

    /// Capabilities this system advertises for [`SystemRegistry::lookup_capability`](crate::SystemRegistry::lookup_capability).
    fn capabilities(&self) -> &'static [CapabilityId] {
        &[]
    }

    /// Exposes the system as a log sink. Systems advertising
    /// [`capability::LOG_SINK`] must return `Some`.
    fn as_log_sink(&self) -> Option<&dyn LogSink> {
        None
    }
}

/// Borrow a system trait object as [`Any`].
///
/// Method syntax on a `Box<dyn System>` would pick the blanket impl for the
/// box itself, so the call is spelled out.
pub(crate) fn as_any(system: &dyn System) -> &dyn Any {
    <dyn System as AsAny>::as_any(system)
}

pub(crate) fn as_any_mut(system: &mut dyn System) -> &mut dyn Any {
    <dyn System as AsAny>::as_any_mut(system)
}

/// A stable identifier for a capability a system can advertise, derived from
/// its string name with the FNV-1a 64-bit hash.
///
/// Capabilities stand in for interface assignability: a lookup by capability
/// finds any system that declared it, whatever its concrete type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CapabilityId(pub u64);

impl CapabilityId {
    const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
    const FNV_PRIME: u64 = 0x0100_0000_01b3;

    /// Compute the id for a capability name.
    #[must_use]
    pub const fn from_name(name: &str) -> Self {
        let bytes = name.as_bytes();
        let mut hash = Self::FNV_OFFSET_BASIS;
        let mut i = 0;
        while i < bytes.len() {
            hash ^= bytes[i] as u64;
            hash = hash.wrapping_mul(Self::FNV_PRIME);
            i += 1;
        }
        Self(hash)
    }
}

impl std::fmt::Display for CapabilityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Capability({:#018x})", self.0)
    }
}

/// Well-known capabilities.
pub mod capability {
    use super::CapabilityId;

    /// The system can receive diagnostic messages (see [`System::as_log_sink`]).
    pub const LOG_SINK: CapabilityId = CapabilityId::from_name("engine.log_sink");
}

/// Type key recorded for a template at construction time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemKind {
    /// The concrete Rust type of the system.
    pub type_id: TypeId,
    /// Human-readable name (manifest kind, or the Rust type name).
    pub name: Cow<'static, str>,
    /// Capabilities declared by the system.
    pub capabilities: &'static [CapabilityId],
}

impl SystemKind {
    /// Build the kind for `system`, named after its Rust type.
    #[must_use]
    pub fn of<T: System>(system: &T) -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            name: Cow::Borrowed(short_type_name::<T>()),
            capabilities: system.capabilities(),
        }
    }

    /// Replace the display name, e.g. with a manifest kind.
    #[must_use]
    pub fn named(mut self, name: impl Into<Cow<'static, str>>) -> Self {
        self.name = name.into();
        self
    }

    /// Returns `true` if this kind was recorded for `T`.
    #[must_use]
    pub fn is<T: System>(&self) -> bool {
        self.type_id == TypeId::of::<T>()
    }

    /// Returns `true` if the kind declares `capability`.
    #[must_use]
    pub fn has_capability(&self, capability: CapabilityId) -> bool {
        self.capabilities.contains(&capability)
    }
}

/// The last path segment of a type name (`my_crate::audio::Mixer` -> `Mixer`).
#[must_use]
pub fn short_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}
