use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use serde::Deserialize;

use engine_app::{DriverConfig, LifecycleDriver, LifecycleState};
use engine_system::{InitContext, System, SystemCatalog, SystemTemplate, TickInfo};

type Journal = Rc<RefCell<Vec<String>>>;

macro_rules! journaled_system {
    ($name:ident) => {
        #[derive(Debug, Clone, Default, Deserialize)]
        struct $name {
            #[serde(skip)]
            journal: Journal,
        }

        impl $name {
            fn new(journal: &Journal) -> Self {
                Self {
                    journal: Rc::clone(journal),
                }
            }
        }

        impl System for $name {
            fn init(&mut self, ctx: &InitContext<'_>) -> anyhow::Result<()> {
                let parent = ctx.parent().map_or("-".to_string(), |p| p.name().to_string());
                self.journal
                    .borrow_mut()
                    .push(format!("init {} parent={parent}", stringify!($name)));
                Ok(())
            }

            fn finish(&mut self) {
                self.journal
                    .borrow_mut()
                    .push(format!("finish {}", stringify!($name)));
            }
        }
    };
}

journaled_system!(A);
journaled_system!(B);
journaled_system!(C);
journaled_system!(D);

fn scenario(journal: &Journal) -> Vec<SystemTemplate> {
    vec![
        SystemTemplate::prototype(A::new(journal)).with_children([
            SystemTemplate::prototype(B::new(journal)),
            SystemTemplate::prototype(C::new(journal)).auto_init(false),
        ]),
        SystemTemplate::prototype(D::new(journal)),
    ]
}

#[test]
fn test_end_to_end_scenario() {
    let journal = Journal::default();
    let mut driver = LifecycleDriver::new(DriverConfig::default());
    driver.build(&scenario(&journal)).unwrap();

    let names: Vec<&str> = driver.registry().iter().map(|s| s.name()).collect();
    assert_eq!(names, vec!["A", "B", "D"]);
    assert!(driver.lookup::<C>().is_none());

    let a = driver.lookup::<A>().unwrap();
    let children = a.children();
    assert_eq!(children.len(), 2);
    assert!(children[1].template().kind().is::<C>());
    assert!(children[1].instance().is_none());
    assert_eq!(a.child_instances()[0].parent().unwrap().id(), a.id());

    assert_eq!(
        *journal.borrow(),
        vec!["init A parent=-", "init B parent=A", "init D parent=-"]
    );

    driver.setup_complete().unwrap();
    journal.borrow_mut().clear();
    driver.teardown().unwrap();
    assert_eq!(*journal.borrow(), vec!["finish A", "finish B", "finish D"]);
    assert_eq!(driver.state(), LifecycleState::Terminated);
    assert!(!driver.is_setup_done());
}

#[test]
fn test_end_to_end_from_manifest() {
    let mut catalog = SystemCatalog::new();
    catalog
        .register::<A>("a")
        .register::<B>("b")
        .register::<C>("c")
        .register::<D>("d");
    let templates = catalog
        .load_json(
            r#"[
                { "kind": "a", "children": [
                    { "kind": "b" },
                    { "kind": "c", "auto_init_at_startup": false }
                ] },
                { "kind": "d" }
            ]"#,
        )
        .unwrap();

    let mut driver = LifecycleDriver::default();
    assert_eq!(driver.build(&templates).unwrap(), 3);
    let names: Vec<&str> = driver.registry().iter().map(|s| s.name()).collect();
    assert_eq!(names, vec!["a", "b", "d"]);
    assert!(driver.lookup::<C>().is_none());
}

#[test]
fn test_updates_reach_listeners_in_subscription_order() {
    let mut driver = LifecycleDriver::default();
    let order = Journal::default();
    for name in ["first", "second", "third"] {
        let order = Rc::clone(&order);
        driver.events().update.subscribe(move |tick: &TickInfo| {
            order.borrow_mut().push(format!("{name}@{}", tick.tick_id));
            Ok(())
        });
    }

    driver.build(&[]).unwrap();
    driver.tick(0.016).unwrap();
    assert!(order.borrow().is_empty());

    driver.setup_complete().unwrap();
    driver.tick(0.016).unwrap();
    assert_eq!(*order.borrow(), vec!["first@2", "second@2", "third@2"]);
}

#[test]
fn test_prototype_and_shared_across_independent_builds() {
    #[derive(Debug, Clone, Default)]
    struct Volume(u32);

    impl System for Volume {
        fn init(&mut self, _ctx: &InitContext<'_>) -> anyhow::Result<()> {
            Ok(())
        }
    }

    let prototype = SystemTemplate::prototype(Volume(1));
    let shared = SystemTemplate::shared(Volume(1));

    let mut first = LifecycleDriver::default();
    let mut second = LifecycleDriver::default();
    first.build(&[prototype.clone(), shared.clone()]).unwrap();
    second.build(&[prototype, shared]).unwrap();

    first.registry().as_slice()[0].borrow_mut_as::<Volume>().unwrap().0 = 7;
    first.registry().as_slice()[1].borrow_mut_as::<Volume>().unwrap().0 = 9;

    assert_eq!(second.registry().as_slice()[0].borrow_as::<Volume>().unwrap().0, 1);
    assert_eq!(second.registry().as_slice()[1].borrow_as::<Volume>().unwrap().0, 9);
}

#[test]
fn test_zero_delay_waits_for_next_tick() {
    let mut driver = LifecycleDriver::default();
    driver.build(&[]).unwrap();
    driver.setup_complete().unwrap();

    let fired = Rc::new(RefCell::new(Vec::new()));
    let inner = Rc::clone(&fired);
    driver
        .deferred()
        .execute_after_delay_sync(move || inner.borrow_mut().push("fired"), Duration::ZERO)
        .unwrap();
    assert!(fired.borrow().is_empty());

    driver.tick(0.016).unwrap();
    assert_eq!(*fired.borrow(), vec!["fired"]);
}
