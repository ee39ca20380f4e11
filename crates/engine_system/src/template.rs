//! System templates.
//!
//! A [`SystemTemplate`] is a pre-configured system descriptor, either a
//! **shared** singleton whose state every use operates on directly, or a
//! **prototype** duplicated into a private instance each time it is built.
//! The builder resolves both into uniform [`SystemInstance`](crate::SystemInstance)s.
//!
//! Cloning a `SystemTemplate` value copies handles, not state: a clone of a
//! shared template still points at the same system.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::system::{System, SystemKind};

/// Mutable system state behind an instance. Shared templates hand the same
/// state to every instance built from them.
pub type SharedState = Rc<RefCell<Box<dyn System>>>;

/// Clones the prototype value into a fresh boxed system.
type DuplicateFn = Rc<dyn Fn() -> Box<dyn System>>;

#[derive(Clone)]
enum TemplateSource {
    Shared(SharedState),
    Prototype(DuplicateFn),
}

/// A declarative system descriptor with an ordered list of child templates.
#[derive(Clone)]
pub struct SystemTemplate {
    kind: SystemKind,
    auto_init_at_startup: bool,
    children: Vec<SystemTemplate>,
    source: TemplateSource,
}

impl SystemTemplate {
    /// A template whose state is shared by every instance built from it.
    #[must_use]
    pub fn shared<T: System>(system: T) -> Self {
        let kind = SystemKind::of(&system);
        let boxed: Box<dyn System> = Box::new(system);
        Self::from_shared_state(kind, Rc::new(RefCell::new(boxed)))
    }

    /// A template wrapping existing shared state, e.g. one already handed to
    /// another template.
    #[must_use]
    pub fn from_shared_state(kind: SystemKind, state: SharedState) -> Self {
        Self {
            kind,
            auto_init_at_startup: true,
            children: Vec::new(),
            source: TemplateSource::Shared(state),
        }
    }

    /// A template duplicated into a fresh instance every time it is built.
    #[must_use]
    pub fn prototype<T: System + Clone>(system: T) -> Self {
        let kind = SystemKind::of(&system);
        Self {
            kind,
            auto_init_at_startup: true,
            children: Vec::new(),
            source: TemplateSource::Prototype(Rc::new(move || {
                let fresh: Box<dyn System> = Box::new(system.clone());
                fresh
            })),
        }
    }

    /// Set whether this template is initialised automatically when its
    /// parent is built. Defaults to `true`. Roots ignore it.
    #[must_use]
    pub fn auto_init(mut self, auto_init_at_startup: bool) -> Self {
        self.auto_init_at_startup = auto_init_at_startup;
        self
    }

    /// Append a child template.
    #[must_use]
    pub fn with_child(mut self, child: SystemTemplate) -> Self {
        self.children.push(child);
        self
    }

    /// Append several child templates, keeping their order.
    #[must_use]
    pub fn with_children(mut self, children: impl IntoIterator<Item = SystemTemplate>) -> Self {
        self.children.extend(children);
        self
    }

    /// Override the display name.
    #[must_use]
    pub fn named(mut self, name: impl Into<std::borrow::Cow<'static, str>>) -> Self {
        self.kind = self.kind.named(name);
        self
    }

    /// Returns the type key recorded when the template was created.
    #[must_use]
    pub fn kind(&self) -> &SystemKind {
        &self.kind
    }

    /// Returns the display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.kind.name
    }

    /// `true` for prototypes, `false` for shared templates.
    #[must_use]
    pub fn requires_new_instance(&self) -> bool {
        matches!(self.source, TemplateSource::Prototype(_))
    }

    /// Returns `true` if the template is built together with its parent.
    #[must_use]
    pub fn auto_init_at_startup(&self) -> bool {
        self.auto_init_at_startup
    }

    /// Returns the child templates in declaration order.
    #[must_use]
    pub fn children(&self) -> &[SystemTemplate] {
        &self.children
    }

    /// The state behind a shared template, `None` for prototypes.
    #[must_use]
    pub fn shared_state(&self) -> Option<SharedState> {
        match &self.source {
            TemplateSource::Shared(state) => Some(Rc::clone(state)),
            TemplateSource::Prototype(_) => None,
        }
    }

    /// Resolve the state an instance of this template operates on: the
    /// shared state itself, or a fresh clone of the prototype.
    pub(crate) fn materialize(&self) -> SharedState {
        match &self.source {
            TemplateSource::Shared(state) => Rc::clone(state),
            TemplateSource::Prototype(duplicate) => Rc::new(RefCell::new(duplicate())),
        }
    }
}

impl fmt::Debug for SystemTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SystemTemplate")
            .field("name", &self.kind.name)
            .field("requires_new_instance", &self.requires_new_instance())
            .field("auto_init_at_startup", &self.auto_init_at_startup)
            .field("children", &self.children)
            .finish()
    }
}
