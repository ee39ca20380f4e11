//! System tree builder.
//!
//! Turns an ordered forest of [`SystemTemplate`]s into instances:
//!
//! 1. For each root, in input order: materialise the template (duplicate a
//!    prototype, or reuse shared state), record the parent (none for roots),
//!    run `init`, then register the instance.
//! 2. Recurse into the instance's children. Each child flagged
//!    `auto_init_at_startup` goes through the same steps with the instance as
//!    its parent and is appended to the same flat registry, right after
//!    everything discovered before it.
//! 3. Children not flagged for auto-init stay as templates on their parent
//!    and are neither initialised nor registered. Owning code builds them
//!    later with [`SystemTreeBuilder::init_child`].
//!
//! A failure stops the build and is returned as is. Nothing is rolled back:
//! systems registered before the failure stay registered.

use tracing::{debug, info};

use crate::deferred::DeferredExecutor;
use crate::error::SystemError;
use crate::events::SystemEvents;
use crate::instance::{SystemHandle, SystemInstance};
use crate::registry::SystemRegistry;
use crate::template::SystemTemplate;

/// Builds system trees into a registry.
#[derive(Debug, Clone, Copy)]
pub struct SystemTreeBuilder<'a> {
    events: &'a SystemEvents,
    deferred: &'a DeferredExecutor,
}

impl<'a> SystemTreeBuilder<'a> {
    /// A builder whose systems see `events` and `deferred` during `init`.
    #[must_use]
    pub fn new(events: &'a SystemEvents, deferred: &'a DeferredExecutor) -> Self {
        Self { events, deferred }
    }

    /// Build every root and its auto-init descendants into `registry`.
    ///
    /// Returns the instances registered by this call, in registry order.
    ///
    /// # Errors
    ///
    /// Returns the first [`SystemError`] raised while duplicating or
    /// initialising a system.
    pub fn build(
        &self,
        roots: &[SystemTemplate],
        registry: &mut SystemRegistry,
    ) -> Result<Vec<SystemHandle>, SystemError> {
        let start = registry.len();
        {
            let mut register = |handle: SystemHandle| registry.register(handle);
            for root in roots {
                self.build_node(root, None, &mut register)?;
            }
        }

        let built = registry.as_slice()[start..].to_vec();
        info!(
            roots = roots.len(),
            systems = built.len(),
            "system tree built"
        );
        Ok(built)
    }

    /// Initialise the non-auto-init child at `index` of `parent`, together
    /// with its own auto-init descendants. Nothing is registered.
    ///
    /// Returns the built instances, the child first.
    ///
    /// # Errors
    ///
    /// Returns [`SystemError::NoSuchChild`] for a bad index,
    /// [`SystemError::ChildAlreadyInitialized`] if the slot already holds an
    /// instance, or any error raised while building the subtree.
    pub fn init_child(
        &self,
        parent: &SystemHandle,
        index: usize,
    ) -> Result<Vec<SystemHandle>, SystemError> {
        let slot = parent.child(index).ok_or_else(|| SystemError::NoSuchChild {
            system: parent.name().to_string(),
            index,
        })?;
        if slot.instance().is_some() {
            return Err(SystemError::ChildAlreadyInitialized {
                system: parent.name().to_string(),
                index,
            });
        }

        let mut built = Vec::new();
        let child = self.build_node(slot.template(), Some(parent), &mut |handle| {
            built.push(handle);
        })?;
        parent.set_child_instance(index, child);
        Ok(built)
    }

    fn build_node(
        &self,
        template: &SystemTemplate,
        parent: Option<&SystemHandle>,
        register: &mut dyn FnMut(SystemHandle),
    ) -> Result<SystemHandle, SystemError> {
        let instance = SystemInstance::from_template(template);
        instance.init_internal(parent, self.events, self.deferred)?;
        register(instance.clone());
        debug!(
            system = instance.name(),
            id = %instance.id(),
            parent = parent.map(|p| p.name()),
            shared = !instance.requires_new_instance(),
            "system initialised"
        );

        let auto_children: Vec<(usize, SystemTemplate)> = template
            .children()
            .iter()
            .enumerate()
            .filter(|(_, child)| child.auto_init_at_startup())
            .map(|(index, child)| (index, child.clone()))
            .collect();

        for (index, child) in auto_children {
            let built = self.build_node(&child, Some(&instance), register)?;
            instance.set_child_instance(index, built);
        }

        Ok(instance)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use proptest::prelude::*;

    use super::*;
    use crate::context::InitContext;
    use crate::system::System;

    macro_rules! marker_system {
        ($($name:ident),* $(,)?) => {
            $(
                #[derive(Debug, Clone, Default)]
                struct $name;

                impl System for $name {
                    fn init(&mut self, _ctx: &InitContext<'_>) -> anyhow::Result<()> {
                        Ok(())
                    }
                }
            )*
        };
    }

    marker_system!(A, B, C, D);

    #[derive(Debug, Clone)]
    struct Tag(u32);

    impl System for Tag {
        fn init(&mut self, _ctx: &InitContext<'_>) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[derive(Debug, Clone, Default)]
    struct Counter {
        value: u32,
    }

    impl System for Counter {
        fn init(&mut self, _ctx: &InitContext<'_>) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[derive(Debug, Clone)]
    struct Failing;

    impl System for Failing {
        fn init(&mut self, _ctx: &InitContext<'_>) -> anyhow::Result<()> {
            anyhow::bail!("bad configuration")
        }
    }

    fn build(roots: &[SystemTemplate], registry: &mut SystemRegistry) -> Result<Vec<SystemHandle>, SystemError> {
        let events = SystemEvents::default();
        let deferred = DeferredExecutor::detached();
        SystemTreeBuilder::new(&events, &deferred).build(roots, registry)
    }

    fn tags(systems: &[SystemHandle]) -> Vec<u32> {
        systems
            .iter()
            .map(|s| s.borrow_as::<Tag>().map_or(u32::MAX, |t| t.0))
            .collect()
    }

    #[test]
    fn test_roots_without_children_keep_input_order() {
        let roots: Vec<_> = (0..4).map(|i| SystemTemplate::prototype(Tag(i))).collect();
        let mut registry = SystemRegistry::new();
        let built = build(&roots, &mut registry).unwrap();

        assert_eq!(tags(&built), vec![0, 1, 2, 3]);
        assert_eq!(tags(registry.as_slice()), vec![0, 1, 2, 3]);
        assert!(built.iter().all(|s| s.parent().is_none() && s.is_initialized()));
    }

    #[test]
    fn test_roots_ignore_auto_init_flag() {
        let roots = vec![SystemTemplate::prototype(Tag(0)).auto_init(false)];
        let mut registry = SystemRegistry::new();
        build(&roots, &mut registry).unwrap();
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_auto_init_children_follow_their_root() {
        let roots = vec![
            SystemTemplate::prototype(Tag(0)).with_children([
                SystemTemplate::prototype(Tag(1)),
                SystemTemplate::prototype(Tag(2)).with_child(SystemTemplate::prototype(Tag(3))),
            ]),
            SystemTemplate::prototype(Tag(4)),
        ];
        let mut registry = SystemRegistry::new();
        build(&roots, &mut registry).unwrap();

        assert_eq!(tags(registry.as_slice()), vec![0, 1, 2, 3, 4]);
        let root = &registry.as_slice()[0];
        let grandchild = &registry.as_slice()[3];
        assert_eq!(grandchild.parent().unwrap().parent().unwrap().id(), root.id());
        assert_eq!(root.child_instances().len(), 2);
    }

    #[test]
    fn test_end_to_end_scenario() {
        let roots = vec![
            SystemTemplate::prototype(A).with_children([
                SystemTemplate::prototype(B),
                SystemTemplate::prototype(C).auto_init(false),
            ]),
            SystemTemplate::prototype(D),
        ];
        let mut registry = SystemRegistry::new();
        build(&roots, &mut registry).unwrap();

        let names: Vec<_> = registry.iter().map(|s| s.name().to_string()).collect();
        assert_eq!(names, vec!["A", "B", "D"]);
        assert!(registry.lookup::<C>().is_none());

        let a = registry.lookup::<A>().unwrap();
        let c_slot = a.child(1).unwrap();
        assert_eq!(c_slot.template().name(), "C");
        assert!(c_slot.instance().is_none());
    }

    #[test]
    fn test_init_child_builds_without_registering() {
        let roots = vec![SystemTemplate::prototype(A).with_child(
            SystemTemplate::prototype(C)
                .auto_init(false)
                .with_child(SystemTemplate::prototype(B)),
        )];
        let mut registry = SystemRegistry::new();
        build(&roots, &mut registry).unwrap();
        let a = registry.lookup::<A>().unwrap();

        let events = SystemEvents::default();
        let deferred = DeferredExecutor::detached();
        let builder = SystemTreeBuilder::new(&events, &deferred);
        let built = builder.init_child(&a, 0).unwrap();

        assert_eq!(built.len(), 2);
        assert!(built[0].is::<C>());
        assert!(built[1].is::<B>());
        assert_eq!(built[0].parent().unwrap().id(), a.id());
        assert_eq!(registry.len(), 1);
        assert_eq!(a.child(0).unwrap().instance().unwrap().id(), built[0].id());

        assert!(matches!(
            builder.init_child(&a, 0),
            Err(SystemError::ChildAlreadyInitialized { index: 0, .. })
        ));
        assert!(matches!(
            builder.init_child(&a, 5),
            Err(SystemError::NoSuchChild { index: 5, .. })
        ));
    }

    #[test]
    fn test_prototype_builds_are_independent() {
        let template = SystemTemplate::prototype(Counter::default());
        let mut first = SystemRegistry::new();
        let mut second = SystemRegistry::new();
        let a = build(std::slice::from_ref(&template), &mut first).unwrap().remove(0);
        let b = build(std::slice::from_ref(&template), &mut second).unwrap().remove(0);

        a.borrow_mut_as::<Counter>().unwrap().value = 9;
        assert_eq!(b.borrow_as::<Counter>().unwrap().value, 0);
        assert!(!a.shares_state_with(&b));
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_shared_builds_share_state() {
        let template = SystemTemplate::shared(Counter::default());
        let mut first = SystemRegistry::new();
        let mut second = SystemRegistry::new();
        let a = build(std::slice::from_ref(&template), &mut first).unwrap().remove(0);
        let b = build(std::slice::from_ref(&template), &mut second).unwrap().remove(0);

        a.borrow_mut_as::<Counter>().unwrap().value = 9;
        assert_eq!(b.borrow_as::<Counter>().unwrap().value, 9);
        assert!(a.shares_state_with(&b));
    }

    #[test]
    fn test_failure_keeps_already_registered_systems() {
        let roots = vec![
            SystemTemplate::prototype(Tag(0)),
            SystemTemplate::prototype(Tag(1)).with_child(SystemTemplate::prototype(Failing)),
            SystemTemplate::prototype(Tag(2)),
        ];
        let mut registry = SystemRegistry::new();
        let err = build(&roots, &mut registry).unwrap_err();

        assert!(matches!(err, SystemError::Init { ref system, .. } if system == "Failing"));
        assert_eq!(tags(registry.as_slice()), vec![0, 1]);
    }

    #[test]
    fn test_init_sees_parent_and_subscribes() {
        #[derive(Debug, Clone)]
        struct Child {
            parent_name: Rc<RefCell<Option<String>>>,
        }

        impl System for Child {
            fn init(&mut self, ctx: &InitContext<'_>) -> anyhow::Result<()> {
                *self.parent_name.borrow_mut() = ctx.parent().map(|p| p.name().to_string());
                ctx.events().start.subscribe(|_| Ok(()));
                Ok(())
            }
        }

        let seen = Rc::new(RefCell::new(None));
        let roots = vec![SystemTemplate::prototype(A).with_child(SystemTemplate::prototype(Child {
            parent_name: Rc::clone(&seen),
        }))];

        let events = SystemEvents::default();
        let deferred = DeferredExecutor::detached();
        let mut registry = SystemRegistry::new();
        SystemTreeBuilder::new(&events, &deferred)
            .build(&roots, &mut registry)
            .unwrap();

        assert_eq!(seen.borrow().as_deref(), Some("A"));
        assert_eq!(events.start.len(), 1);
    }

    /// A root's children: (auto_init, grandchildren auto_init flags).
    type Shape = Vec<Vec<(bool, Vec<bool>)>>;

    fn forest(shape: &Shape) -> (Vec<SystemTemplate>, Vec<u32>) {
        let mut next = 0;
        let mut label = || {
            next += 1;
            next - 1
        };
        let mut expected = Vec::new();
        let mut roots = Vec::new();

        for children in shape {
            let root_tag = label();
            expected.push(root_tag);
            let mut root = SystemTemplate::prototype(Tag(root_tag));
            for (auto, grandchildren) in children {
                let child_tag = label();
                if *auto {
                    expected.push(child_tag);
                }
                let mut child = SystemTemplate::prototype(Tag(child_tag)).auto_init(*auto);
                for grand_auto in grandchildren {
                    let grand_tag = label();
                    if *auto && *grand_auto {
                        expected.push(grand_tag);
                    }
                    child = child
                        .with_child(SystemTemplate::prototype(Tag(grand_tag)).auto_init(*grand_auto));
                }
                root = root.with_child(child);
            }
            roots.push(root);
        }
        (roots, expected)
    }

    fn shape_strategy() -> impl Strategy<Value = Shape> {
        prop::collection::vec(
            prop::collection::vec(
                (any::<bool>(), prop::collection::vec(any::<bool>(), 0..3)),
                0..4,
            ),
            0..5,
        )
    }

    proptest! {
        #[test]
        fn prop_registry_order_is_discovery_order(shape in shape_strategy()) {
            let (roots, expected) = forest(&shape);
            let mut registry = SystemRegistry::new();
            let built = build(&roots, &mut registry).unwrap();
            prop_assert_eq!(tags(&built), expected.clone());
            prop_assert_eq!(tags(registry.as_slice()), expected);
        }

        #[test]
        fn prop_roots_have_no_parent(count in 0usize..8) {
            let roots: Vec<_> = (0..count as u32).map(|i| SystemTemplate::prototype(Tag(i))).collect();
            let mut registry = SystemRegistry::new();
            build(&roots, &mut registry).unwrap();
            prop_assert_eq!(registry.len(), count);
            prop_assert!(registry.iter().all(|s| s.parent().is_none()));
        }
    }
}
