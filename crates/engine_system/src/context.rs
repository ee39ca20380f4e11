//! Context handed to a system's `init` hook.

use std::rc::Rc;

use uuid::Uuid;

use crate::deferred::DeferredExecutor;
use crate::events::{ListenerId, SystemEvents, TickInfo};
use crate::instance::SystemHandle;
use crate::system::System;

/// Everything a system may touch while it initialises.
///
/// The parent has already been recorded on the instance when `init` runs.
/// Systems that react to the lifecycle subscribe to [`SystemEvents`] here,
/// usually through [`InitContext::on_start`] and [`InitContext::on_update`],
/// which route the broadcast back to the system's own state.
#[derive(Debug, Clone, Copy)]
pub struct InitContext<'a> {
    instance: &'a SystemHandle,
    parent: Option<&'a SystemHandle>,
    events: &'a SystemEvents,
    deferred: &'a DeferredExecutor,
}

impl<'a> InitContext<'a> {
    #[must_use]
    pub fn new(
        instance: &'a SystemHandle,
        parent: Option<&'a SystemHandle>,
        events: &'a SystemEvents,
        deferred: &'a DeferredExecutor,
    ) -> Self {
        Self {
            instance,
            parent,
            events,
            deferred,
        }
    }

    /// The instance being initialised. Its state is borrowed until `init`
    /// returns.
    #[must_use]
    pub fn instance(&self) -> &'a SystemHandle {
        self.instance
    }

    #[must_use]
    pub fn instance_id(&self) -> Uuid {
        self.instance.id()
    }

    /// The parent instance, `None` for roots.
    #[must_use]
    pub fn parent(&self) -> Option<&'a SystemHandle> {
        self.parent
    }

    /// The lifecycle broadcasts.
    #[must_use]
    pub fn events(&self) -> &'a SystemEvents {
        self.events
    }

    /// Cooperative scheduling on the ticking entity.
    #[must_use]
    pub fn deferred(&self) -> &'a DeferredExecutor {
        self.deferred
    }

    /// Subscribe `handler` to the start broadcast, called with this system's
    /// state. The listener does nothing once the instance is dropped.
    pub fn on_start<S, F>(&self, mut handler: F) -> ListenerId
    where
        S: System,
        F: FnMut(&mut S) -> anyhow::Result<()> + 'static,
    {
        let instance = Rc::downgrade(self.instance);
        self.events.start.subscribe(move |_| {
            let Some(instance) = instance.upgrade() else {
                return Ok(());
            };
            let Some(mut system) = instance.borrow_mut_as::<S>() else {
                return Ok(());
            };
            handler(&mut *system)
        })
    }

    /// Subscribe `handler` to the per-tick update broadcast, called with this
    /// system's state.
    pub fn on_update<S, F>(&self, mut handler: F) -> ListenerId
    where
        S: System,
        F: FnMut(&mut S, &TickInfo) -> anyhow::Result<()> + 'static,
    {
        let instance = Rc::downgrade(self.instance);
        self.events.update.subscribe(move |tick| {
            let Some(instance) = instance.upgrade() else {
                return Ok(());
            };
            let Some(mut system) = instance.borrow_mut_as::<S>() else {
                return Ok(());
            };
            handler(&mut *system, tick)
        })
    }
}
