//! Runtime system instances.
//!
//! A [`SystemInstance`] is what a template becomes once it is built: it owns
//! a unique id, a weak back-reference to its parent (recorded exactly once)
//! and one slot per declared child. Children flagged for auto-init hold their
//! built instance; the others keep only their template until owning code
//! calls [`init_child`](crate::builder::SystemTreeBuilder::init_child).

use std::cell::{Cell, OnceCell, Ref, RefCell, RefMut};
use std::fmt;
use std::rc::{Rc, Weak};

use uuid::Uuid;

use crate::context::InitContext;
use crate::deferred::DeferredExecutor;
use crate::error::SystemError;
use crate::events::SystemEvents;
use crate::system::{self, System, SystemKind};
use crate::template::{SharedState, SystemTemplate};

/// Shared handle to a built system.
pub type SystemHandle = Rc<SystemInstance>;

/// A declared child of an instance.
#[derive(Debug, Clone)]
pub struct ChildSlot {
    template: SystemTemplate,
    instance: Option<SystemHandle>,
}

impl ChildSlot {
    /// The template the child is built from.
    #[must_use]
    pub fn template(&self) -> &SystemTemplate {
        &self.template
    }

    /// The built child, if it has been initialised.
    #[must_use]
    pub fn instance(&self) -> Option<&SystemHandle> {
        self.instance.as_ref()
    }
}

/// A built system.
pub struct SystemInstance {
    id: Uuid,
    kind: SystemKind,
    requires_new_instance: bool,
    auto_init_at_startup: bool,
    /// `Some(None)` for initialised roots.
    parent: OnceCell<Option<Weak<SystemInstance>>>,
    children: RefCell<Vec<ChildSlot>>,
    state: SharedState,
    finished: Cell<bool>,
}

impl SystemInstance {
    /// Materialise `template` into an uninitialised instance.
    pub(crate) fn from_template(template: &SystemTemplate) -> SystemHandle {
        let state = template.materialize();
        let children = template
            .children()
            .iter()
            .map(|child| ChildSlot {
                template: child.clone(),
                instance: None,
            })
            .collect();

        Rc::new(Self {
            id: Uuid::new_v4(),
            kind: template.kind().clone(),
            requires_new_instance: template.requires_new_instance(),
            auto_init_at_startup: template.auto_init_at_startup(),
            parent: OnceCell::new(),
            children: RefCell::new(children),
            state,
            finished: Cell::new(false),
        })
    }

    /// Two-phase init: record the parent, then run the user hook.
    pub(crate) fn init_internal(
        self: &Rc<Self>,
        parent: Option<&SystemHandle>,
        events: &SystemEvents,
        deferred: &DeferredExecutor,
    ) -> Result<(), SystemError> {
        self.parent
            .set(parent.map(Rc::downgrade))
            .map_err(|_| SystemError::AlreadyInitialized {
                system: self.name().to_string(),
            })?;

        let ctx = InitContext::new(self, parent, events, deferred);
        self.state
            .borrow_mut()
            .init(&ctx)
            .map_err(|source| SystemError::Init {
                system: self.name().to_string(),
                source,
            })
    }

    pub(crate) fn set_child_instance(&self, index: usize, instance: SystemHandle) {
        if let Some(slot) = self.children.borrow_mut().get_mut(index) {
            slot.instance = Some(instance);
        }
    }

    /// Returns the unique id assigned when the instance was built.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Returns the display name of the template.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.kind.name
    }

    /// Returns the type key of the template.
    #[must_use]
    pub fn kind(&self) -> &SystemKind {
        &self.kind
    }

    /// Returns `true` if the instance was built from a `T`.
    #[must_use]
    pub fn is<T: System>(&self) -> bool {
        self.kind.is::<T>()
    }

    /// Returns `true` if the instance owns a private duplicate of its
    /// template, `false` if it shares the template's state.
    #[must_use]
    pub fn requires_new_instance(&self) -> bool {
        self.requires_new_instance
    }

    /// Returns `true` if the instance was built together with its parent.
    #[must_use]
    pub fn auto_init_at_startup(&self) -> bool {
        self.auto_init_at_startup
    }

    /// Returns `true` once the parent has been recorded.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.parent.get().is_some()
    }

    /// The parent instance, `None` for roots or if the parent was dropped.
    #[must_use]
    pub fn parent(&self) -> Option<SystemHandle> {
        self.parent.get()?.as_ref()?.upgrade()
    }

    /// Number of declared children.
    #[must_use]
    pub fn child_count(&self) -> usize {
        self.children.borrow().len()
    }

    /// The declared child at `index`.
    #[must_use]
    pub fn child(&self, index: usize) -> Option<ChildSlot> {
        self.children.borrow().get(index).cloned()
    }

    /// All declared children, in order.
    #[must_use]
    pub fn children(&self) -> Vec<ChildSlot> {
        self.children.borrow().clone()
    }

    /// Initialised children, in declaration order.
    #[must_use]
    pub fn child_instances(&self) -> Vec<SystemHandle> {
        self.children
            .borrow()
            .iter()
            .filter_map(|slot| slot.instance.clone())
            .collect()
    }

    /// Borrow the system state as a `T`.
    ///
    /// Returns `None` if the instance is not a `T`.
    ///
    /// # Panics
    ///
    /// Panics if the state is currently mutably borrowed.
    #[must_use]
    pub fn borrow_as<T: System>(&self) -> Option<Ref<'_, T>> {
        Ref::filter_map(self.state.borrow(), |state| {
            system::as_any(&**state).downcast_ref::<T>()
        })
        .ok()
    }

    /// Mutably borrow the system state as a `T`.
    ///
    /// # Panics
    ///
    /// Panics if the state is currently borrowed.
    #[must_use]
    pub fn borrow_mut_as<T: System>(&self) -> Option<RefMut<'_, T>> {
        RefMut::filter_map(self.state.borrow_mut(), |state| {
            system::as_any_mut(&mut **state).downcast_mut::<T>()
        })
        .ok()
    }

    /// Run `f` against the system as a trait object.
    pub fn with_system<R>(&self, f: impl FnOnce(&dyn System) -> R) -> R {
        f(&**self.state.borrow())
    }

    /// Returns `true` if both instances operate on the same state, which is
    /// the case for instances of one shared template.
    #[must_use]
    pub fn shares_state_with(&self, other: &SystemInstance) -> bool {
        Rc::ptr_eq(&self.state, &other.state)
    }

    /// Run the finish hook. Later calls are ignored.
    pub fn finish(&self) {
        if self.finished.replace(true) {
            return;
        }
        self.state.borrow_mut().finish();
    }

    /// Returns `true` once the finish hook has run.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.finished.get()
    }
}

impl fmt::Debug for SystemInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SystemInstance")
            .field("id", &self.id)
            .field("name", &self.kind.name)
            .field("requires_new_instance", &self.requires_new_instance)
            .field("auto_init_at_startup", &self.auto_init_at_startup)
            .field("initialized", &self.is_initialized())
            .field("children", &self.child_count())
            .field("finished", &self.finished.get())
            .finish()
    }
}
