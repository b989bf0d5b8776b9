/// Package loading integration tests against the RON fixtures.

use narrative_dispatch::core::loader::{self, LoaderError};
use narrative_dispatch::schema::node::{Cooldown, NodeFlags, PersistenceScope, Priority, Target};
use narrative_dispatch::schema::package::PackageLibrary;
use std::path::Path;

#[test]
fn load_dir_in_file_name_order() {
    let mut library = PackageLibrary::new();
    let ids = loader::load_dir(&mut library, Path::new("tests/fixtures/packages")).unwrap();
    let names: Vec<&str> = ids
        .iter()
        .map(|id| library.get(*id).unwrap().name())
        .collect();
    assert_eq!(names, vec!["cove", "penguins", "penguins_excited"]);
}

#[test]
fn fixture_metadata_is_applied() {
    let mut library = PackageLibrary::new();
    loader::load_file(&mut library, Path::new("tests/fixtures/packages/penguins.ron")).unwrap();

    let node = |name: &str| library.node(library.find_node(name).unwrap()).unwrap();

    let casual = node("penguins.greet_casual");
    assert_eq!(casual.target(), &Target::Actor("Penguin1".into()));
    assert_eq!(casual.priority(), Priority::Medium);

    let shell = node("penguins.find_shell");
    assert!(shell.has(NodeFlags::ONCE));
    assert_eq!(shell.scope(), PersistenceScope::Persistent);

    let waddle = node("penguins.waddle");
    assert!(waddle.has(NodeFlags::ANY_TARGET | NodeFlags::TIME_COOLDOWN));
    assert_eq!(waddle.cooldown(), Some(Cooldown::Seconds(2.5)));

    let beg = node("penguins.beg_for_fish");
    assert_eq!(beg.conditions().len(), 1);
    assert_eq!(beg.sorting_score(), 2);
}

#[test]
fn weighted_and_cutscene_nodes() {
    let mut library = PackageLibrary::new();
    loader::load_file(&mut library, Path::new("tests/fixtures/packages/cove.ron")).unwrap();
    let cove = library.by_name("cove").unwrap();

    let weights: Vec<f32> = cove
        .nodes()
        .iter()
        .filter(|n| n.event_id() == Some("Gull"))
        .map(|n| n.weight())
        .collect();
    assert_eq!(weights, vec![1.0, 2.0, 3.0]);

    let arrival = &cove.nodes()[0];
    assert!(arrival.is_cutscene());
    assert!(arrival.has(NodeFlags::EXPOSED));
    assert_eq!(arrival.priority(), Priority::Cutscene);
}

#[test]
fn broken_file_becomes_failed_package() {
    let mut library = PackageLibrary::new();
    let id = loader::load_file(&mut library, Path::new("tests/fixtures/broken/broken.ron")).unwrap();
    let package = library.get(id).unwrap();
    assert!(package.is_failed());
    assert!(package.nodes().is_empty());
    assert!(package.failure().is_some());
}

#[test]
fn missing_file_is_an_io_error() {
    let mut library = PackageLibrary::new();
    let result = loader::load_file(&mut library, Path::new("tests/fixtures/nope.ron"));
    assert!(matches!(result, Err(LoaderError::Io(_))));
}

#[test]
fn parse_reports_syntax_errors() {
    let source = std::fs::read_to_string("tests/fixtures/broken/broken.ron").unwrap();
    assert!(matches!(loader::parse(&source), Err(LoaderError::Ron(_))));
}
