/// Package Linter — validates narrative packages before they ship.
///
/// Usage: package_linter <package_dir|file> [--config <dispatch.ron>]

use narrative_dispatch::core::loader;
use narrative_dispatch::schema::node::{Node, NodeFlags, PersistenceScope};
use narrative_dispatch::schema::package::PackageLibrary;
use narrative_dispatch::schema::script::Action;
use narrative_dispatch::DispatchConfig;
use rustc_hash::FxHashSet;
use std::path::Path;
use std::process;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

fn main() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("narrative_dispatch=warn")))
        .with(fmt::layer().with_target(false))
        .init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 || args[1] == "--help" || args[1] == "-h" {
        println!("Usage: package_linter <package_dir|file> [--config <dispatch.ron>]");
        process::exit(0);
    }

    let package_path = Path::new(&args[1]);
    let mut config = DispatchConfig::default();

    let mut i = 2;
    while i < args.len() {
        if args[i] == "--config" && i + 1 < args.len() {
            i += 1;
            match DispatchConfig::load_from_ron(Path::new(&args[i])) {
                Ok(c) => config = c,
                Err(e) => {
                    eprintln!("ERROR: Failed to load config: {}", e);
                    process::exit(1);
                }
            }
        }
        i += 1;
    }

    let mut library = PackageLibrary::new();
    let loaded = if package_path.is_file() {
        loader::load_file(&mut library, package_path).map(|id| vec![id])
    } else if package_path.is_dir() {
        loader::load_dir(&mut library, package_path)
    } else {
        eprintln!("ERROR: Path '{}' does not exist", package_path.display());
        process::exit(1);
    };
    if let Err(e) = loaded {
        eprintln!("ERROR: Failed to load packages: {}", e);
        process::exit(1);
    }

    let node_count: usize = library.iter().map(|p| p.nodes().len()).sum();
    println!("Loaded {} packages, {} nodes", library.len(), node_count);

    let (errors, warnings) = lint_packages(&library, &config);

    println!("\n=== Package Lint Report ===\n");

    if errors.is_empty() && warnings.is_empty() {
        println!("All checks passed!");
    }

    for warning in &warnings {
        println!("WARNING: {}", warning);
    }

    for error in &errors {
        println!("ERROR: {}", error);
    }

    println!(
        "\nSummary: {} errors, {} warnings",
        errors.len(),
        warnings.len()
    );

    if errors.is_empty() {
        process::exit(0);
    } else {
        process::exit(1);
    }
}

fn lint_packages(library: &PackageLibrary, config: &DispatchConfig) -> (Vec<String>, Vec<String>) {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    let triggers: FxHashSet<&str> = library
        .iter()
        .flat_map(|p| p.nodes())
        .filter(|n| n.is_trigger())
        .filter_map(|n| n.event_id())
        .collect();

    for package in library.iter() {
        if let Some(reason) = package.failure() {
            errors.push(format!("package '{}' failed to load: {}", package.name(), reason));
            continue;
        }
        if package.nodes().is_empty() {
            warnings.push(format!("package '{}' has no nodes", package.name()));
        }
        for node in package.nodes() {
            lint_node(node, &triggers, config, &mut errors, &mut warnings);
        }
    }

    (errors, warnings)
}

fn lint_node(
    node: &Node,
    triggers: &FxHashSet<&str>,
    config: &DispatchConfig,
    errors: &mut Vec<String>,
    warnings: &mut Vec<String>,
) {
    let name = node.name();

    // Unreachable: nothing can ever start it.
    if !node.is_trigger() && !node.is_function() && !node.has(NodeFlags::EXPOSED) {
        errors.push(format!(
            "node '{}' has no @trigger, @function or @exposed and can never run",
            name
        ));
    }

    if node.has(NodeFlags::ONCE) && node.scope() == PersistenceScope::Untracked {
        warnings.push(format!(
            "node '{}' is @once without a @scope; it is only remembered for the last {} visits",
            name, config.recent_history_capacity
        ));
    }

    if node.is_cutscene() && !node.is_trigger() && !node.has(NodeFlags::EXPOSED) {
        warnings.push(format!(
            "cutscene node '{}' is a function; it will not block other dispatch",
            name
        ));
    }

    if node.has(NodeFlags::IGNORE_DURING_CUTSCENE) && node.is_cutscene() {
        warnings.push(format!(
            "@ignoreDuringCutscene has no effect on cutscene node '{}'",
            name
        ));
    }

    for action in node.script() {
        if let Action::Emit { trigger, .. } = action {
            if !triggers.contains(trigger.as_str()) {
                warnings.push(format!(
                    "node '{}' emits '{}', which no loaded node handles",
                    name, trigger
                ));
            }
        }
    }
}
