/// Shared variable tables, custom resolvers, and the scratch-table pool.
use std::fmt;

use tracing::{debug, trace};

use crate::schema::condition::VarScope;
use crate::schema::value::{Value, VariableTable};

/// Answers lookups for one family of `VarScope::Custom` variables.
///
/// Any `Fn(&str) -> Option<Value>` closure is a resolver.
pub trait VariableResolver {
    fn resolve(&self, name: &str) -> Option<Value>;
}

impl<F> VariableResolver for F
where
    F: Fn(&str) -> Option<Value>,
{
    fn resolve(&self, name: &str) -> Option<Value> {
        self(name)
    }
}

/// Named custom resolvers, consulted in registration order.
///
/// A custom variable is written `resolver.variable`; the part before the
/// first dot picks the resolver and the rest is passed to it.
#[derive(Default)]
pub struct Resolvers {
    entries: Vec<(String, Box<dyn VariableResolver>)>,
}

impl fmt::Debug for Resolvers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.entries.iter().map(|(name, _)| name))
            .finish()
    }
}

impl Resolvers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a resolver. A later registration under the same name
    /// replaces the earlier one.
    pub fn register(&mut self, name: impl Into<String>, resolver: Box<dyn VariableResolver>) {
        let name = name.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => {
                debug!(resolver = %name, "replacing variable resolver");
                entry.1 = resolver;
            }
            None => self.entries.push((name, resolver)),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|(n, _)| n == name)
    }

    /// Resolve `resolver.variable`. The outer `None` means no resolver of
    /// that name is registered.
    pub fn resolve(&self, qualified: &str) -> Option<Option<Value>> {
        let (resolver, name) = qualified.split_once('.').unwrap_or((qualified, ""));
        self.entries
            .iter()
            .find(|(n, _)| n == resolver)
            .map(|(_, r)| r.resolve(name))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// The global, chapter and session variable tables of one runtime.
#[derive(Debug, Clone, Default)]
pub struct Variables {
    pub global: VariableTable,
    pub chapter: VariableTable,
    pub session: VariableTable,
}

impl Variables {
    pub fn new() -> Self {
        Self::default()
    }

    /// The table backing a shared scope. Actor, local and custom scopes
    /// live elsewhere and return `None`.
    pub fn table(&self, scope: VarScope) -> Option<&VariableTable> {
        match scope {
            VarScope::Global => Some(&self.global),
            VarScope::Chapter => Some(&self.chapter),
            VarScope::Session => Some(&self.session),
            VarScope::Actor | VarScope::Local | VarScope::Custom => None,
        }
    }

    pub fn table_mut(&mut self, scope: VarScope) -> Option<&mut VariableTable> {
        match scope {
            VarScope::Global => Some(&mut self.global),
            VarScope::Chapter => Some(&mut self.chapter),
            VarScope::Session => Some(&mut self.session),
            VarScope::Actor | VarScope::Local | VarScope::Custom => None,
        }
    }

    pub fn get(&self, scope: VarScope, name: &str) -> Option<&Value> {
        self.table(scope).and_then(|t| t.get(name))
    }

    /// Set a shared variable. Returns false if `scope` is not a shared scope.
    pub fn set(&mut self, scope: VarScope, name: impl Into<String>, value: Value) -> bool {
        match self.table_mut(scope) {
            Some(table) => {
                table.set(name, value);
                true
            }
            None => false,
        }
    }

    /// Drop every chapter variable, e.g. on chapter transition.
    pub fn reset_chapter(&mut self) {
        debug!(cleared = self.chapter.len(), "chapter variables reset");
        self.chapter.clear();
    }
}

/// Reusable scratch tables for thread-local variables.
///
/// Released tables are cleared and kept for the next acquire, so a steady
/// stream of triggers stops allocating once the pool has warmed up.
#[derive(Debug, Default)]
pub struct TablePool {
    free: Vec<VariableTable>,
    allocated: usize,
}

impl TablePool {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            free: (0..capacity).map(|_| VariableTable::new()).collect(),
            allocated: capacity,
        }
    }

    pub fn acquire(&mut self) -> VariableTable {
        match self.free.pop() {
            Some(table) => table,
            None => {
                self.allocated += 1;
                trace!(allocated = self.allocated, "table pool grew");
                VariableTable::new()
            }
        }
    }

    pub fn release(&mut self, mut table: VariableTable) {
        table.clear();
        self.free.push(table);
    }

    /// Tables currently sitting in the pool.
    pub fn available(&self) -> usize {
        self.free.len()
    }

    /// Tables ever created by this pool.
    pub fn allocated(&self) -> usize {
        self.allocated
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shared_scopes_only() {
        let mut vars = Variables::new();
        assert!(vars.set(VarScope::Global, "fish", Value::Int(3)));
        assert!(!vars.set(VarScope::Actor, "fish", Value::Int(3)));
        assert_eq!(vars.get(VarScope::Global, "fish"), Some(&Value::Int(3)));
        assert!(vars.get(VarScope::Local, "fish").is_none());
    }

    #[test]
    fn reset_chapter_leaves_session() {
        let mut vars = Variables::new();
        vars.set(VarScope::Chapter, "met_walrus", Value::Bool(true));
        vars.set(VarScope::Session, "deaths", Value::Int(2));
        vars.reset_chapter();
        assert!(vars.chapter.is_empty());
        assert_eq!(vars.get(VarScope::Session, "deaths"), Some(&Value::Int(2)));
    }

    #[test]
    fn closure_resolvers() {
        let mut resolvers = Resolvers::new();
        resolvers.register(
            "weather",
            Box::new(|name: &str| (name == "raining").then_some(Value::Bool(true))),
        );
        assert_eq!(resolvers.resolve("weather.raining"), Some(Some(Value::Bool(true))));
        assert_eq!(resolvers.resolve("weather.snowing"), Some(None));
        assert_eq!(resolvers.resolve("clock.hour"), None);
    }

    #[test]
    fn reregistering_replaces() {
        let mut resolvers = Resolvers::new();
        resolvers.register("w", Box::new(|_: &str| Some(Value::Int(1))));
        resolvers.register("w", Box::new(|_: &str| Some(Value::Int(2))));
        assert_eq!(resolvers.len(), 1);
        assert_eq!(resolvers.resolve("w.x"), Some(Some(Value::Int(2))));
    }

    #[test]
    fn table_pool_reuses_cleared_tables() {
        let mut pool = TablePool::with_capacity(1);
        let mut table = pool.acquire();
        table.set("x", Value::Int(1));
        let extra = pool.acquire();
        assert_eq!(pool.allocated(), 2);
        pool.release(table);
        pool.release(extra);
        assert_eq!(pool.available(), 2);
        assert!(pool.acquire().is_empty());
        assert_eq!(pool.allocated(), 2);
    }
}
