/// Packages: named, independently loadable collections of nodes.
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use tracing::{debug, error, warn};

use super::node::{Node, NodeId};

#[derive(Debug, Error, PartialEq)]
pub enum PackageError {
    #[error("package '{package}' already has a node named '{node}'")]
    DuplicateNode { package: String, node: String },
    #[error("a package named '{0}' is already loaded")]
    DuplicatePackage(String),
    #[error("package not found: {0:?}")]
    NotFound(PackageId),
    #[error("package '{name}' is in use by {use_count} running thread(s)")]
    InUse { name: String, use_count: u32 },
}

/// Library-assigned package identifier. Never reused within a library.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PackageId(pub u32);

/// Index of a node inside its owning package.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeRef {
    pub package: PackageId,
    pub index: u32,
}

impl fmt::Display for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.package.0, self.index)
    }
}

/// An ordered collection of nodes with its own active flag and use count.
///
/// The package owns its nodes; a node only remembers its package's id.
/// `use_count` tracks running threads started from this package's nodes
/// and must be zero before the package is unloaded.
#[derive(Debug)]
pub struct Package {
    id: PackageId,
    name: String,
    nodes: Vec<Node>,
    by_name: FxHashMap<String, u32>,
    active: bool,
    use_count: u32,
    failure: Option<String>,
}

impl Package {
    pub(crate) fn new(id: PackageId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            nodes: Vec::new(),
            by_name: FxHashMap::default(),
            active: true,
            use_count: 0,
            failure: None,
        }
    }

    pub fn id(&self) -> PackageId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Create a node owned by this package. Its full name is
    /// `package.local_name`.
    pub fn create_node(&mut self, local_name: &str) -> Result<&mut Node, PackageError> {
        if self.by_name.contains_key(local_name) {
            return Err(PackageError::DuplicateNode {
                package: self.name.clone(),
                node: local_name.to_string(),
            });
        }
        let index = self.nodes.len();
        self.by_name.insert(local_name.to_string(), index as u32);
        self.nodes
            .push(Node::new(self.id, format!("{}.{}", self.name, local_name)));
        Ok(&mut self.nodes[index])
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn node(&self, index: u32) -> Option<&Node> {
        self.nodes.get(index as usize)
    }

    /// Look up a node by its local (unqualified) name.
    pub fn find(&self, local_name: &str) -> Option<NodeRef> {
        self.by_name.get(local_name).map(|&index| NodeRef {
            package: self.id,
            index,
        })
    }

    /// Iterate nodes together with their references.
    pub fn node_refs(&self) -> impl Iterator<Item = (NodeRef, &Node)> {
        let package = self.id;
        self.nodes.iter().enumerate().map(move |(i, node)| {
            (
                NodeRef {
                    package,
                    index: i as u32,
                },
                node,
            )
        })
    }

    pub fn active(&self) -> bool {
        self.active
    }

    /// Set the active flag, returning the previous value.
    pub fn set_active(&mut self, active: bool) -> bool {
        std::mem::replace(&mut self.active, active)
    }

    pub fn add_reference(&mut self) {
        self.use_count += 1;
    }

    pub fn release_reference(&mut self) {
        debug_assert!(
            self.use_count > 0,
            "package '{}' released more references than it took",
            self.name
        );
        if self.use_count == 0 {
            error!(package = %self.name, "unbalanced package reference release");
            return;
        }
        self.use_count -= 1;
    }

    pub fn is_referenced(&self) -> bool {
        self.use_count > 0
    }

    pub fn use_count(&self) -> u32 {
        self.use_count
    }

    /// Record a compile failure. The package is emptied so nothing from a
    /// half-compiled source can be selected.
    pub fn mark_failed(&mut self, reason: impl Into<String>) {
        let reason = reason.into();
        error!(package = %self.name, %reason, "package failed to compile");
        self.nodes.clear();
        self.by_name.clear();
        self.failure = Some(reason);
    }

    pub fn is_failed(&self) -> bool {
        self.failure.is_some()
    }

    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }
}

/// All loaded packages, addressed by [`PackageId`] or by name.
#[derive(Debug, Default)]
pub struct PackageLibrary {
    slots: Vec<Option<Package>>,
    by_name: FxHashMap<String, PackageId>,
}

impl PackageLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty, active package.
    pub fn create(&mut self, name: &str) -> Result<&mut Package, PackageError> {
        if self.by_name.contains_key(name) {
            return Err(PackageError::DuplicatePackage(name.to_string()));
        }
        let id = PackageId(self.slots.len() as u32);
        self.by_name.insert(name.to_string(), id);
        self.slots.push(Some(Package::new(id, name)));
        debug!(package = name, id = id.0, "package created");
        match self.slots.last_mut() {
            Some(Some(package)) => Ok(package),
            _ => Err(PackageError::NotFound(id)),
        }
    }

    /// Remove a package. Refused while any thread still uses it.
    pub fn unload(&mut self, id: PackageId) -> Result<Package, PackageError> {
        let slot = self
            .slots
            .get_mut(id.0 as usize)
            .ok_or(PackageError::NotFound(id))?;
        let package = slot.as_ref().ok_or(PackageError::NotFound(id))?;
        if package.is_referenced() {
            warn!(package = %package.name, use_count = package.use_count, "refusing to unload package in use");
            return Err(PackageError::InUse {
                name: package.name.clone(),
                use_count: package.use_count,
            });
        }
        let package = slot.take().ok_or(PackageError::NotFound(id))?;
        self.by_name.remove(&package.name);
        debug!(package = %package.name, "package unloaded");
        Ok(package)
    }

    pub fn get(&self, id: PackageId) -> Option<&Package> {
        self.slots.get(id.0 as usize).and_then(|s| s.as_ref())
    }

    pub fn get_mut(&mut self, id: PackageId) -> Option<&mut Package> {
        self.slots.get_mut(id.0 as usize).and_then(|s| s.as_mut())
    }

    pub fn id_of(&self, name: &str) -> Option<PackageId> {
        self.by_name.get(name).copied()
    }

    pub fn by_name(&self, name: &str) -> Option<&Package> {
        self.id_of(name).and_then(|id| self.get(id))
    }

    pub fn node(&self, node: NodeRef) -> Option<&Node> {
        self.get(node.package).and_then(|p| p.node(node.index))
    }

    /// Resolve a full `package.node` name.
    pub fn find_node(&self, full_name: &str) -> Option<NodeRef> {
        let (package, local) = full_name.split_once('.')?;
        self.by_name(package)?.find(local)
    }

    /// Find a node by its hashed id, scanning every loaded package.
    pub fn find_by_id(&self, id: NodeId) -> Option<NodeRef> {
        self.iter()
            .flat_map(|p| p.node_refs())
            .find(|(_, node)| node.id() == id)
            .map(|(r, _)| r)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Package> {
        self.slots.iter().filter_map(|s| s.as_ref())
    }

    /// Packages content may be selected from: active and not failed.
    pub fn selectable(&self) -> impl Iterator<Item = &Package> {
        self.iter().filter(|p| p.active() && !p.is_failed())
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_nodes_with_back_reference() {
        let mut library = PackageLibrary::new();
        let package = library.create("penguins").unwrap();
        let id = package.id();
        let node = package.create_node("greet").unwrap();
        assert_eq!(node.package(), id);
        assert_eq!(node.name(), "penguins.greet");
        assert_eq!(node.id(), NodeId::from_name("penguins.greet"));
    }

    #[test]
    fn duplicate_node_rejected() {
        let mut library = PackageLibrary::new();
        let package = library.create("penguins").unwrap();
        package.create_node("greet").unwrap();
        assert!(matches!(
            package.create_node("greet"),
            Err(PackageError::DuplicateNode { .. })
        ));
        assert_eq!(package.nodes().len(), 1);
    }

    #[test]
    fn duplicate_package_rejected() {
        let mut library = PackageLibrary::new();
        library.create("penguins").unwrap();
        assert_eq!(
            library.create("penguins").err(),
            Some(PackageError::DuplicatePackage("penguins".to_string()))
        );
    }

    #[test]
    fn set_active_returns_previous() {
        let mut library = PackageLibrary::new();
        let package = library.create("penguins").unwrap();
        assert!(package.active());
        assert!(package.set_active(false));
        assert!(!package.set_active(true));
        assert!(package.active());
    }

    #[test]
    fn reference_counting() {
        let mut library = PackageLibrary::new();
        let package = library.create("penguins").unwrap();
        assert!(!package.is_referenced());
        package.add_reference();
        package.add_reference();
        assert_eq!(package.use_count(), 2);
        package.release_reference();
        assert!(package.is_referenced());
        package.release_reference();
        assert!(!package.is_referenced());
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "released more references")]
    fn unbalanced_release_asserts() {
        let mut library = PackageLibrary::new();
        let package = library.create("penguins").unwrap();
        package.release_reference();
    }

    #[test]
    fn unload_refused_while_referenced() {
        let mut library = PackageLibrary::new();
        let id = library.create("penguins").unwrap().id();
        library.get_mut(id).unwrap().add_reference();
        assert!(matches!(library.unload(id), Err(PackageError::InUse { .. })));
        library.get_mut(id).unwrap().release_reference();
        let package = library.unload(id).unwrap();
        assert_eq!(package.name(), "penguins");
        assert!(library.get(id).is_none());
        assert!(library.by_name("penguins").is_none());
    }

    #[test]
    fn failed_package_is_empty_and_not_selectable() {
        let mut library = PackageLibrary::new();
        let package = library.create("broken").unwrap();
        package.create_node("a").unwrap();
        package.mark_failed("syntax error");
        assert!(package.is_failed());
        assert!(package.nodes().is_empty());
        assert_eq!(package.failure(), Some("syntax error"));
        assert_eq!(library.selectable().count(), 0);
    }

    #[test]
    fn find_node_by_full_name() {
        let mut library = PackageLibrary::new();
        let package = library.create("penguins").unwrap();
        package.create_node("greet").unwrap();
        package.create_node("wave").unwrap();
        let r = library.find_node("penguins.wave").unwrap();
        assert_eq!(r.index, 1);
        assert_eq!(library.node(r).unwrap().name(), "penguins.wave");
        assert!(library.find_node("penguins.missing").is_none());
        assert_eq!(
            library.find_by_id(NodeId::from_name("penguins.greet")),
            library.find_node("penguins.greet")
        );
    }
}
