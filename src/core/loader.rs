/// Package compiler: turns RON package sources into [`Package`]s.
///
/// A package file looks like:
///
/// ```ron
/// Package(
///     name: "penguins",
///     nodes: [
///         Node(
///             name: "greet",
///             meta: ["@trigger Greet", "@who Penguin1", "@cooldown 2.5s"],
///             conditions: [Var((scope: Global, name: "fish_ready"))],
///             script: [Log("Hello!"), Wait(seconds: 2.0)],
///         ),
///     ],
/// )
/// ```
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::schema::condition::ConditionGroup;
use crate::schema::metadata::{MetadataKind, NodeMetadata};
use crate::schema::package::{Package, PackageError, PackageId, PackageLibrary};
use crate::schema::script::Action;

#[derive(Debug, Error)]
pub enum LoaderError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON deserialization error: {0}")]
    Ron(#[from] ron::error::SpannedError),
    #[error("package error: {0}")]
    Package(#[from] PackageError),
}

/// Source form of a package.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename = "Package")]
pub struct PackageDef {
    pub name: String,
    #[serde(default)]
    pub nodes: Vec<NodeDef>,
}

/// Source form of a node: its local name, metadata tag lines, compiled
/// conditions and script.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename = "Node")]
pub struct NodeDef {
    pub name: String,
    #[serde(default)]
    pub meta: Vec<String>,
    #[serde(default)]
    pub conditions: ConditionGroup,
    #[serde(default)]
    pub script: Vec<Action>,
}

impl NodeDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            meta: Vec::new(),
            conditions: ConditionGroup::default(),
            script: Vec::new(),
        }
    }

    pub fn meta(mut self, line: &str) -> Self {
        self.meta.push(line.to_string());
        self
    }

    pub fn conditions(mut self, conditions: ConditionGroup) -> Self {
        self.conditions = conditions;
        self
    }

    pub fn script(mut self, script: Vec<Action>) -> Self {
        self.script = script;
        self
    }
}

/// Parse package source without compiling it.
pub fn parse(source: &str) -> Result<PackageDef, LoaderError> {
    Ok(ron::from_str(source)?)
}

/// Compile a parsed package into the library.
///
/// Bad metadata lines and duplicate node names are logged and skipped;
/// only a package-name clash fails the call.
pub fn compile(library: &mut PackageLibrary, def: PackageDef) -> Result<PackageId, LoaderError> {
    let package = library.create(&def.name)?;
    for node_def in def.nodes {
        compile_node(package, node_def);
    }
    info!(package = %package.name(), nodes = package.nodes().len(), "package compiled");
    Ok(package.id())
}

fn compile_node(package: &mut Package, def: NodeDef) {
    let node = match package.create_node(&def.name) {
        Ok(node) => node,
        Err(error) => {
            warn!(%error, "skipping node");
            return;
        }
    };
    let mut parsed = Vec::with_capacity(def.meta.len());
    for line in &def.meta {
        match NodeMetadata::parse(line) {
            Ok(meta) => parsed.push(meta),
            Err(error) => warn!(node = %node.name(), %error, "skipping metadata line"),
        }
    }
    // Bindings first: most other tags are only valid on a trigger or
    // function node, wherever the author wrote them.
    let (bindings, rest): (Vec<_>, Vec<_>) = parsed.into_iter().partition(|meta| {
        matches!(meta.kind(), MetadataKind::Trigger | MetadataKind::Function)
    });
    for meta in bindings.into_iter().chain(rest) {
        meta.apply(node);
    }
    if !def.conditions.is_empty() {
        node.set_conditions(def.conditions);
    }
    if !node.is_trigger() && !node.is_function() {
        debug!(node = %node.name(), "node has neither a trigger nor a function and can only run when exposed");
    }
    node.set_script(def.script);
}

/// Parse and compile `source`. A syntax error does not fail the call:
/// it yields an empty package named `fallback_name` marked as failed.
pub fn load_str(
    library: &mut PackageLibrary,
    fallback_name: &str,
    source: &str,
) -> Result<PackageId, LoaderError> {
    match parse(source) {
        Ok(def) => compile(library, def),
        Err(error) => {
            let package = library.create(fallback_name)?;
            package.mark_failed(error.to_string());
            Ok(package.id())
        }
    }
}

/// Load one package file. Its stem names the package if it fails to parse.
pub fn load_file(library: &mut PackageLibrary, path: &Path) -> Result<PackageId, LoaderError> {
    let source = std::fs::read_to_string(path)?;
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("unknown");
    load_str(library, stem, &source)
}

/// Load every `.ron` file in `dir`, in file-name order.
pub fn load_dir(library: &mut PackageLibrary, dir: &Path) -> Result<Vec<PackageId>, LoaderError> {
    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().and_then(|s| s.to_str()) == Some("ron") {
            paths.push(path);
        }
    }
    paths.sort();
    paths.iter().map(|path| load_file(library, path)).collect()
}
