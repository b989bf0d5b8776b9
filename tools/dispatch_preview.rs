/// Dispatch Preview — interactive shell for exercising packages.
///
/// Usage: dispatch_preview --packages <path> [--config <dispatch.ron>] [--seed <n>]
///
/// Commands:
///   fire <trigger> [target]     — raise a trigger
///   call <function> [target]    — run function nodes
///   run <package.node> [target] — start an exposed node
///   cancel [target]             — cancel the thread controlling a target
///   tick <seconds> [n]          — advance time, n ticks of <seconds> each
///   actor <id> [tag1,tag2]      — register a named actor
///   set <scope> <name> <value>  — set a global/chapter/session variable
///   threads                     — list live threads
///   history                     — show recent visits
///   packages                    — list packages
///   toggle <package>            — activate or deactivate a package
///   chapter                     — start a new chapter
///   save <path> / load <path>   — write or read persistent visits
///   seed <n>                    — rebuild with a new seed
///   help                        — list commands
///   quit                        — exit

use narrative_dispatch::core::persistence::PersistenceSnapshot;
use narrative_dispatch::schema::actor::{Actor, ActorId};
use narrative_dispatch::schema::condition::VarScope;
use narrative_dispatch::schema::value::Value;
use narrative_dispatch::{DispatchConfig, Dispatcher};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

fn main() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("narrative_dispatch=info")))
        .with(fmt::layer().with_target(false))
        .init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 || args[1] == "--help" || args[1] == "-h" {
        print_usage();
        return;
    }

    let mut packages_path = None;
    let mut config = DispatchConfig::default();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--packages" if i + 1 < args.len() => {
                i += 1;
                packages_path = Some(PathBuf::from(&args[i]));
            }
            "--config" if i + 1 < args.len() => {
                i += 1;
                match DispatchConfig::load_from_ron(Path::new(&args[i])) {
                    Ok(c) => config = c,
                    Err(e) => {
                        eprintln!("ERROR: Failed to load config: {}", e);
                        std::process::exit(1);
                    }
                }
            }
            "--seed" if i + 1 < args.len() => {
                i += 1;
                config.seed = args[i].parse().unwrap_or(config.seed);
            }
            _ => {
                eprintln!("Unknown argument: {}", args[i]);
                print_usage();
                std::process::exit(1);
            }
        }
        i += 1;
    }

    let Some(packages_path) = packages_path else {
        eprintln!("ERROR: --packages is required");
        print_usage();
        std::process::exit(1);
    };

    let mut dispatcher = match build_dispatcher(&packages_path, config.clone()) {
        Ok(d) => d,
        Err(e) => {
            eprintln!("ERROR: {}", e);
            std::process::exit(1);
        }
    };

    println!("Loaded {} packages", dispatcher.library().len());
    println!("Seed: {}", config.seed);
    println!("Type 'help' for commands.\n");

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        print!("dispatch [t={:.2}]> ", dispatcher.now());
        stdout.flush().ok();

        let mut line = String::new();
        if stdin.lock().read_line(&mut line).is_err() || line.is_empty() {
            break;
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let parts: Vec<&str> = line.split_whitespace().collect();
        let cmd = parts[0].to_lowercase();
        let arg = |n: usize| parts.get(n).copied();

        match cmd.as_str() {
            "quit" | "exit" | "q" => {
                println!("Goodbye.");
                break;
            }
            "help" | "h" | "?" => print_help(),
            "fire" | "call" => {
                let Some(name) = arg(1) else {
                    println!("Usage: {} <name> [target]", cmd);
                    continue;
                };
                let started = if cmd == "fire" {
                    dispatcher.fire(name, arg(2))
                } else {
                    dispatcher.call_function(name, arg(2))
                };
                if started.is_empty() {
                    println!("Nothing started.");
                }
                for handle in started {
                    let node = dispatcher.node_of(handle).map(|n| n.name()).unwrap_or("?");
                    println!("Started {} -> {}", handle, node);
                }
            }
            "run" => {
                let Some(name) = arg(1) else {
                    println!("Usage: run <package.node> [target]");
                    continue;
                };
                match dispatcher.run_exposed(name, arg(2)) {
                    Ok(handle) => println!("Started {} -> {}", handle, name),
                    Err(e) => println!("ERROR: {}", e),
                }
            }
            "cancel" => {
                let target = arg(1).map(ActorId::from);
                if dispatcher.cancel(&target) {
                    println!("Cancellation requested.");
                } else {
                    println!("No thread controls that target.");
                }
            }
            "tick" => {
                let Some(dt) = arg(1).and_then(|s| s.parse::<f64>().ok()) else {
                    println!("Usage: tick <seconds> [n]");
                    continue;
                };
                let count = arg(2).and_then(|s| s.parse::<usize>().ok()).unwrap_or(1);
                for _ in 0..count {
                    let summary = dispatcher.tick(dt);
                    println!(
                        "t={:.2}: polled {}, finished {} ({} cancelled), started {}",
                        dispatcher.now(),
                        summary.polled,
                        summary.finished,
                        summary.cancelled,
                        summary.started
                    );
                }
            }
            "actor" => {
                let Some(id) = arg(1) else {
                    println!("Usage: actor <id> [tag1,tag2,...]");
                    for (handle, actor) in dispatcher.runtime().actors().iter() {
                        println!("    {:?} {} tags={:?}", handle, actor.name, actor.tags);
                    }
                    continue;
                };
                let tags: Vec<&str> = arg(2)
                    .map(|t| t.split(',').map(str::trim).filter(|s| !s.is_empty()).collect())
                    .unwrap_or_default();
                let handle = dispatcher.register_actor(Actor::named(id).with_tags(&tags));
                println!("Actor '{}' registered as {:?}", id, handle);
            }
            "set" => {
                let (Some(scope), Some(name), Some(value)) = (arg(1), arg(2), arg(3)) else {
                    println!("Usage: set <global|chapter|session> <name> <value>");
                    continue;
                };
                let Some(scope) = parse_scope(scope) else {
                    println!("Unknown scope: {}", scope);
                    continue;
                };
                let value = Value::parse_literal(value);
                match dispatcher.runtime_mut().variables_mut().table_mut(scope) {
                    Some(table) => {
                        println!("{:?}.{} = {:?}", scope, name, value);
                        table.set(name, value);
                    }
                    None => println!("Scope {:?} is not writable here.", scope),
                }
            }
            "threads" => print_threads(&dispatcher),
            "history" => print_history(&dispatcher),
            "packages" => {
                for package in dispatcher.library().iter() {
                    let state = match package.failure() {
                        Some(reason) => format!("FAILED: {}", reason),
                        None if package.active() => "active".to_string(),
                        None => "inactive".to_string(),
                    };
                    println!(
                        "  {} ({} nodes, {} running) {}",
                        package.name(),
                        package.nodes().len(),
                        package.use_count(),
                        state
                    );
                }
            }
            "toggle" => {
                let Some(name) = arg(1) else {
                    println!("Usage: toggle <package>");
                    continue;
                };
                let active = dispatcher.library().by_name(name).map(|p| p.active());
                match active {
                    Some(active) => {
                        dispatcher.set_package_active(name, !active);
                        println!("Package '{}' is now {}", name, if active { "inactive" } else { "active" });
                    }
                    None => println!("Package '{}' not found.", name),
                }
            }
            "chapter" => {
                dispatcher.reset_chapter();
                println!("New chapter started.");
            }
            "save" => {
                let Some(path) = arg(1) else {
                    println!("Usage: save <path>");
                    continue;
                };
                match dispatcher.snapshot().save(Path::new(path)) {
                    Ok(()) => println!("Saved to {}", path),
                    Err(e) => println!("ERROR: {}", e),
                }
            }
            "load" => {
                let Some(path) = arg(1) else {
                    println!("Usage: load <path>");
                    continue;
                };
                match PersistenceSnapshot::load(Path::new(path)) {
                    Ok(snapshot) => {
                        dispatcher.restore(&snapshot);
                        println!("Restored {}", path);
                    }
                    Err(e) => println!("ERROR: {}", e),
                }
            }
            "seed" => {
                let Some(seed) = arg(1).and_then(|s| s.parse::<u64>().ok()) else {
                    println!("Current seed: {}", config.seed);
                    continue;
                };
                config.seed = seed;
                match build_dispatcher(&packages_path, config.clone()) {
                    Ok(d) => {
                        dispatcher = d;
                        println!("Seed set to {}; runtime rebuilt", seed);
                    }
                    Err(e) => println!("ERROR: {}", e),
                }
            }
            _ => println!("Unknown command '{}'. Type 'help' for commands.", cmd),
        }
    }
}

fn build_dispatcher(
    path: &Path,
    config: DispatchConfig,
) -> Result<Dispatcher, narrative_dispatch::DispatchError> {
    let builder = Dispatcher::builder().config(config);
    if path.is_file() {
        let mut dispatcher = builder.build()?;
        dispatcher.load_package_file(path)?;
        Ok(dispatcher)
    } else {
        builder.packages_dir(path).build()
    }
}

fn parse_scope(s: &str) -> Option<VarScope> {
    match s.to_lowercase().as_str() {
        "global" => Some(VarScope::Global),
        "chapter" => Some(VarScope::Chapter),
        "session" => Some(VarScope::Session),
        _ => None,
    }
}

fn print_threads(dispatcher: &Dispatcher) {
    let threads = dispatcher.runtime().threads();
    if threads.live_count() == 0 {
        println!("No live threads.");
        return;
    }
    let cutscene = dispatcher.runtime().cutscene();
    for (handle, thread) in threads.iter() {
        let node = dispatcher.node_of(handle).map(|n| n.name()).unwrap_or("?");
        let target = thread.target().map(|t| t.as_str()).unwrap_or("*");
        println!(
            "  {} {} target={} priority={} {:?}{}{}{}",
            handle,
            node,
            target,
            thread.priority(),
            thread.state(),
            if thread.is_tracked() { "" } else { " untracked" },
            if thread.is_cancel_requested() { " cancelling" } else { "" },
            if cutscene == Some(handle) { " CUTSCENE" } else { "" },
        );
    }
}

fn print_history(dispatcher: &Dispatcher) {
    let persistence = dispatcher.persistence();
    println!(
        "Recent visits ({} of {}, newest first):",
        persistence.recent().count(),
        persistence.recent_capacity()
    );
    for record in persistence.recent() {
        let name = dispatcher
            .library()
            .find_by_id(record.node)
            .and_then(|r| dispatcher.library().node(r))
            .map(|n| n.name().to_string())
            .unwrap_or_else(|| format!("{:?}", record.node));
        println!("  t={:.2} {}", record.timestamp, name);
    }
}

fn print_usage() {
    println!("Usage: dispatch_preview --packages <path> [--config <dispatch.ron>] [--seed <n>]");
}

fn print_help() {
    println!("Commands:");
    println!("  fire <trigger> [target]     — raise a trigger");
    println!("  call <function> [target]    — run function nodes");
    println!("  run <package.node> [target] — start an exposed node");
    println!("  cancel [target]             — cancel the thread controlling a target");
    println!("  tick <seconds> [n]          — advance time");
    println!("  actor <id> [tag1,tag2]      — register a named actor");
    println!("  set <scope> <name> <value>  — set a global/chapter/session variable");
    println!("  threads                     — list live threads");
    println!("  history                     — show recent visits");
    println!("  packages                    — list packages");
    println!("  toggle <package>            — activate or deactivate a package");
    println!("  chapter                     — start a new chapter");
    println!("  save <path> / load <path>   — write or read persistent visits");
    println!("  seed <n>                    — rebuild with a new seed");
    println!("  help                        — this message");
    println!("  quit                        — exit");
}
