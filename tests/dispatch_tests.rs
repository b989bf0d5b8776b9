/// Dispatch integration tests: fixture packages driven through triggers
/// and ticks.

use narrative_dispatch::core::loader::{NodeDef, PackageDef};
use narrative_dispatch::core::persistence::PersistenceSnapshot;
use narrative_dispatch::core::thread::{NodeBody, Step, StepContext, Suspend, ThreadHandle};
use narrative_dispatch::schema::actor::{Actor, ActorId};
use narrative_dispatch::schema::condition::VarRef;
use narrative_dispatch::schema::node::Node;
use narrative_dispatch::schema::script::Action;
use narrative_dispatch::schema::value::Value;
use narrative_dispatch::{DispatchConfig, Dispatcher, TriggerRequest};
use std::cell::RefCell;
use std::rc::Rc;

const PACKAGES: &str = "tests/fixtures/packages";

fn make_dispatcher(seed: u64) -> Dispatcher {
    Dispatcher::builder()
        .seed(seed)
        .packages_dir(PACKAGES)
        .build()
        .unwrap()
}

fn node_name(d: &Dispatcher, handle: ThreadHandle) -> String {
    d.node_of(handle).unwrap().name().to_string()
}

#[test]
fn fixture_packages_load() {
    let d = make_dispatcher(0);
    assert_eq!(d.library().len(), 3);
    assert!(d.library().find_node("penguins.greet_casual").is_some());
    assert!(d.library().find_node("cove.arrival").is_some());
}

#[test]
fn higher_priority_interrupts_and_same_priority_does_not() {
    let mut d = make_dispatcher(1);
    d.set_package_active("penguins_excited", false);

    // Only the casual greeting is available: it starts.
    let a = d.fire("Greet", Some("Penguin1"));
    assert_eq!(a.len(), 1);
    assert_eq!(node_name(&d, a[0]), "penguins.greet_casual");

    // The excited greeting outranks it and takes over.
    d.set_package_active("penguins_excited", true);
    let b = d.fire("Greet", Some("Penguin1"));
    assert_eq!(b.len(), 1);
    assert_eq!(node_name(&d, b[0]), "penguins_excited.greet_excited");
    assert!(d.thread(a[0]).unwrap().is_cancel_requested());
    assert_eq!(d.current_thread(Some("Penguin1")), Some(b[0]));

    // Nothing outranks the running High thread.
    assert!(d.fire("Greet", Some("Penguin1")).is_empty());
    assert_eq!(d.current_thread(Some("Penguin1")), Some(b[0]));

    // The cancelled thread unwinds on the next tick without touching the
    // newer mapping.
    let summary = d.tick(0.1);
    assert_eq!(summary.cancelled, 1);
    assert!(d.thread(a[0]).is_none());
    assert_eq!(d.current_thread(Some("Penguin1")), Some(b[0]));
    let casual = d.library().id_of("penguins").unwrap();
    assert_eq!(d.library().get(casual).unwrap().use_count(), 0);
}

#[test]
fn once_persistent_survives_restore_into_fresh_runtime() {
    let mut first = make_dispatcher(2);
    assert_eq!(first.fire("FindShell", None).len(), 1);
    first.tick(0.1);
    assert!(first.fire("FindShell", None).is_empty());

    let saved = first.snapshot().to_ron().unwrap();

    let mut second = make_dispatcher(2);
    second.restore(&PersistenceSnapshot::from_ron(&saved).unwrap());
    assert!(second.fire("FindShell", None).is_empty());

    // A fresh session without the save can see it again.
    let mut third = make_dispatcher(2);
    assert_eq!(third.fire("FindShell", None).len(), 1);
}

#[test]
fn time_cooldown_blocks_until_window_passes() {
    let mut d = make_dispatcher(3);
    assert_eq!(d.fire("Waddle", Some("Penguin1")).len(), 1);
    d.tick(1.0);
    d.tick(0.5);
    // Still waddling until t = 2.0.
    assert!(d.current_thread(Some("Penguin1")).is_some());

    // t = 1.5: still cooling down, for any target.
    assert!(d.fire("Waddle", Some("Penguin1")).is_empty());
    assert!(d.fire("Waddle", Some("Penguin2")).is_empty());

    d.tick(1.0);
    // t = 2.5
    assert_eq!(d.fire("Waddle", Some("Penguin1")).len(), 1);
}

#[test]
fn cutscene_silences_chatter() {
    let mut d = make_dispatcher(4);
    assert_eq!(d.fire("Chatter", None).len(), 1);
    d.tick(0.1);

    let cutscene = d.fire("Arrive", None);
    assert_eq!(cutscene.len(), 1);
    assert_eq!(d.runtime().cutscene(), Some(cutscene[0]));
    assert!(d.fire("Chatter", Some("Penguin2")).is_empty());

    d.tick(0.1);
    d.tick(3.0);
    assert!(!d.runtime().is_cutscene_running());
    assert_eq!(d.fire("Chatter", Some("Penguin2")).len(), 1);
}

#[test]
fn conditions_read_globals_and_bodies_emit() {
    let mut d = make_dispatcher(5);
    d.set_package_active("penguins_excited", false);
    assert!(d.fire("Hungry", None).is_empty());

    d.runtime_mut()
        .variables_mut()
        .global
        .set("fish", Value::Int(4));
    let started = d.fire("Hungry", None);
    assert_eq!(started.len(), 1);
    assert_eq!(d.thread(started[0]).unwrap().target(), Some(&ActorId::from("Penguin2")));

    let summary = d.tick(0.1);
    assert_eq!(summary.finished, 1);
    assert_eq!(summary.started, 1);
    assert_eq!(
        d.runtime().variables().global.get("fish"),
        Some(&Value::Int(0))
    );
    let greeting = d.current_thread(Some("Penguin1")).unwrap();
    assert_eq!(node_name(&d, greeting), "penguins.greet_casual");
}

#[test]
fn function_writes_actor_variables() {
    let mut d = make_dispatcher(6);
    let nest = d.register_actor(Actor::named("Penguin1"));
    let calls = d.call_function("Tidy", Some("Penguin1"));
    assert_eq!(calls.len(), 1);
    d.tick(0.1);
    let actor = d.runtime().actors().get(nest).unwrap();
    assert_eq!(actor.variables.get("nest_tidy"), Some(&Value::Bool(true)));
}

#[test]
fn actor_context_overrides_target_actor() {
    let package = PackageDef {
        name: "feeding".into(),
        nodes: vec![NodeDef::new("feed")
            .meta("@trigger Feed")
            .meta("@who Penguin1")
            .script(vec![Action::Set {
                var: VarRef::actor("fed"),
                value: Value::Bool(true),
            }])],
    };
    let mut d = Dispatcher::builder().with_package(package).build().unwrap();
    let penguin = d.register_actor(Actor::named("Penguin1"));
    let keeper = d.register_actor(Actor::anonymous("keeper"));

    let started = d.trigger(TriggerRequest::new("Feed").actor_context(keeper));
    assert_eq!(started.len(), 1);
    d.tick(0.1);

    let actors = d.runtime().actors();
    assert_eq!(
        actors.get(keeper).unwrap().variables.get("fed"),
        Some(&Value::Bool(true))
    );
    assert!(actors.get(penguin).unwrap().variables.get("fed").is_none());
}

#[test]
fn exposed_cutscene_runs_by_name() {
    let mut d = make_dispatcher(8);
    let handle = d.run_exposed("cove.arrival", None).unwrap();
    assert_eq!(d.runtime().cutscene(), Some(handle));
    assert!(d.run_exposed("penguins.chatter", None).is_err());
}

struct Recorder {
    log: Rc<RefCell<Vec<String>>>,
    name: String,
}

impl NodeBody for Recorder {
    fn step(&mut self, _ctx: &mut StepContext<'_>) -> Step {
        self.log.borrow_mut().push(format!("step {}", self.name));
        Step::Suspend(Suspend::NextTick)
    }

    fn on_cancel(&mut self, _ctx: &mut StepContext<'_>) {
        self.log.borrow_mut().push(format!("cancel {}", self.name));
    }
}

#[test]
fn custom_bodies_observe_cancellation() {
    let log = Rc::new(RefCell::new(Vec::new()));
    let factory_log = Rc::clone(&log);
    let mut d = Dispatcher::builder()
        .packages_dir(PACKAGES)
        .body_factory(move |node: &Node| -> Box<dyn NodeBody> {
            Box::new(Recorder {
                log: Rc::clone(&factory_log),
                name: node.name().to_string(),
            })
        })
        .build()
        .unwrap();
    d.set_package_active("penguins_excited", false);

    d.fire("Greet", Some("Penguin1"));
    d.tick(0.1);
    d.set_package_active("penguins_excited", true);
    d.fire("Greet", Some("Penguin1"));
    d.tick(0.1);

    assert_eq!(
        *log.borrow(),
        vec![
            "step penguins.greet_casual".to_string(),
            "cancel penguins.greet_casual".to_string(),
            "step penguins_excited.greet_excited".to_string(),
        ]
    );
}

#[test]
fn config_capacities_apply() {
    let config = DispatchConfig::from_ron("(recent_history_capacity: 4, thread_pool_capacity: 2)").unwrap();
    let d = Dispatcher::builder().config(config).build().unwrap();
    assert_eq!(d.persistence().recent_capacity(), 4);
    assert_eq!(d.runtime().threads().capacity(), 2);
}

#[test]
fn failed_packages_are_skipped() {
    let d = Dispatcher::builder()
        .packages_dir("tests/fixtures/broken")
        .build()
        .unwrap();
    let broken = d.library().by_name("broken").unwrap();
    assert!(broken.is_failed());
    assert_eq!(d.library().selectable().count(), 0);
}
