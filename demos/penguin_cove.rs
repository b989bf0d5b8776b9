/// Penguin Cove — a small scripted session driven through the dispatcher.
///
/// Run with: cargo run --example penguin_cove
/// Set RUST_LOG=narrative_dispatch=debug to watch selection decisions.

use narrative_dispatch::core::thread::ThreadHandle;
use narrative_dispatch::schema::actor::Actor;
use narrative_dispatch::schema::value::Value;
use narrative_dispatch::{Dispatcher, TriggerRequest};
use std::error::Error;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

const COVE: &str = r#"
Package(
    name: "cove",
    nodes: [
        Node(
            name: "greet_casual",
            meta: ["@trigger Greet", "@who Penguin1"],
            script: [Log("Penguin1: Oh. Hello."), Wait(seconds: 2.0, variance: 0.5)],
        ),
        Node(
            name: "greet_excited",
            meta: ["@trigger Greet", "@who Penguin1", "@priority High"],
            conditions: [TargetHasTag("excited")],
            script: [Log("Penguin1: HELLO! HELLO!"), Wait(seconds: 1.0)],
        ),
        Node(
            name: "night_watch",
            meta: ["@trigger Greet", "@who Penguin1", "@boostScore 2"],
            conditions: [Compare(var: (scope: Custom, name: "clock.hour"), op: Ge, value: Int(20))],
            script: [Log("Penguin1: Shh, it is late.")],
        ),
        Node(
            name: "first_fish",
            meta: ["@trigger Fish", "@once", "@scope session"],
            script: [
                Log("Penguin2 catches its very first fish."),
                Set(var: (scope: Global, name: "fish"), value: Int(1)),
                Emit(trigger: "Greet", target: Some("Penguin1")),
            ],
        ),
        Node(
            name: "storm",
            meta: ["@trigger Storm", "@cutscene", "@exposed"],
            script: [Log("A storm rolls over the cove."), Wait(seconds: 3.0)],
        ),
        Node(
            name: "gossip",
            meta: ["@trigger Gossip", "@who *", "@ignoreDuringCutscene", "@cooldown 2s"],
            script: [Log("Squawk squawk.")],
        ),
    ],
)
"#;

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("narrative_dispatch=info")))
        .with(fmt::layer().with_target(false))
        .init();

    let mut dispatcher = Dispatcher::builder()
        .seed(7)
        .resolver("clock", |name: &str| match name {
            "hour" => Some(Value::Int(14)),
            _ => None,
        })
        .build()?;
    dispatcher.load_package_str("cove", COVE)?;

    let penguin1 = dispatcher.register_actor(Actor::named("Penguin1"));
    dispatcher.register_actor(Actor::named("Penguin2"));

    println!("== A calm greeting");
    fire(&mut dispatcher, "Greet", Some("Penguin1"));
    dispatcher.tick(0.5);

    println!("== Penguin1 gets excited; the High greeting takes over");
    if let Some(actor) = dispatcher.runtime_mut().actors_mut().get_mut(penguin1) {
        actor.tags.insert("excited".to_string());
    }
    fire(&mut dispatcher, "Greet", Some("Penguin1"));
    run_for(&mut dispatcher, 1.5);

    println!("== The first fish is only caught once");
    fire(&mut dispatcher, "Fish", Some("Penguin2"));
    run_for(&mut dispatcher, 0.5);
    fire(&mut dispatcher, "Fish", Some("Penguin2"));

    println!("== A storm silences the gossip");
    let started = dispatcher.trigger(TriggerRequest::new("Storm"));
    report(&dispatcher, started);
    fire(&mut dispatcher, "Gossip", Some("Penguin2"));
    run_for(&mut dispatcher, 3.5);
    fire(&mut dispatcher, "Gossip", Some("Penguin2"));
    run_for(&mut dispatcher, 0.5);

    println!("== Persistent visits as a save file would store them");
    let saved = dispatcher.snapshot().to_ron()?;
    println!("{}", saved);

    println!(
        "Done at t={:.1}: fish = {:?}",
        dispatcher.now(),
        dispatcher.runtime().variables().global.get("fish")
    );
    Ok(())
}

fn fire(dispatcher: &mut Dispatcher, trigger: &str, target: Option<&str>) {
    let started = dispatcher.fire(trigger, target);
    report(dispatcher, started);
}

fn report(dispatcher: &Dispatcher, started: Vec<ThreadHandle>) {
    if started.is_empty() {
        println!("   (nothing started)");
    }
    for handle in started {
        if let Some(node) = dispatcher.node_of(handle) {
            println!("   started {} as {}", node.name(), handle);
        }
    }
}

fn run_for(dispatcher: &mut Dispatcher, seconds: f64) {
    let mut elapsed = 0.0;
    while elapsed < seconds {
        dispatcher.tick(0.25);
        elapsed += 0.25;
    }
}
