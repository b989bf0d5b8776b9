/// Which thread currently controls each target.
use rustc_hash::FxHashMap;

use crate::core::thread::ThreadHandle;
use crate::schema::actor::ActorId;
use crate::schema::node::Priority;

/// Thread Map key: an actor id, or `None` for content that targets no
/// actor in particular.
pub type TargetKey = Option<ActorId>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Entry {
    handle: ThreadHandle,
    priority: Priority,
}

/// At most one thread per target. A pure lookup table: assigning a
/// target's entry does not cancel the thread it replaces, and nothing
/// here touches thread lifetimes.
#[derive(Debug, Default)]
pub struct ThreadMap {
    entries: FxHashMap<TargetKey, Entry>,
}

impl ThreadMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Priority of the thread controlling `target`, or `None` if no
    /// thread is mapped.
    pub fn current_priority(&self, target: &TargetKey) -> Option<Priority> {
        self.entries.get(target).map(|e| e.priority)
    }

    pub fn current_handle(&self, target: &TargetKey) -> Option<ThreadHandle> {
        self.entries.get(target).map(|e| e.handle)
    }

    /// Map `target` to `handle`, returning the superseded handle.
    pub fn assign(
        &mut self,
        target: TargetKey,
        handle: ThreadHandle,
        priority: Priority,
    ) -> Option<ThreadHandle> {
        self.entries
            .insert(target, Entry { handle, priority })
            .map(|e| e.handle)
    }

    /// Remove `target`'s entry only if it still points at `handle`.
    pub fn remove_if(&mut self, target: &TargetKey, handle: ThreadHandle) -> bool {
        if self.current_handle(target) == Some(handle) {
            self.entries.remove(target);
            true
        } else {
            false
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&TargetKey, ThreadHandle, Priority)> {
        self.entries.iter().map(|(k, e)| (k, e.handle, e.priority))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
