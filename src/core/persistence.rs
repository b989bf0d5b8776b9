/// Visitation history: a rolling window of recent trigger visits plus one
/// visited-id set per tracked persistence scope.
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tracing::{debug, error};

use crate::core::config::DispatchConfig;
use crate::schema::node::{Cooldown, NodeId, PersistenceScope};

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON deserialization error: {0}")]
    Ron(#[from] ron::error::SpannedError),
    #[error("RON serialization error: {0}")]
    RonWrite(#[from] ron::Error),
}

/// Fixed-capacity ring buffer that overwrites its oldest entry when full.
#[derive(Debug, Clone)]
pub struct RingBuffer<T> {
    items: Vec<T>,
    head: usize,
    capacity: usize,
}

impl<T> RingBuffer<T> {
    /// A capacity of zero is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: Vec::with_capacity(capacity),
            head: 0,
            capacity,
        }
    }

    /// Push an item, returning the entry it overwrote, if any.
    pub fn push(&mut self, item: T) -> Option<T> {
        if self.items.len() < self.capacity {
            self.items.push(item);
            self.head = self.items.len() % self.capacity;
            None
        } else {
            let old = std::mem::replace(&mut self.items[self.head], item);
            self.head = (self.head + 1) % self.capacity;
            Some(old)
        }
    }

    /// Entries from newest to oldest.
    pub fn iter_newest(&self) -> impl Iterator<Item = &T> {
        let n = self.items.len();
        let head = self.head;
        (0..n).map(move |k| &self.items[(head + n - 1 - k) % n])
    }

    pub fn newest(&self) -> Option<&T> {
        self.iter_newest().next()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.head = 0;
    }
}

/// One entry of the recent-history window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VisitRecord {
    pub node: NodeId,
    pub timestamp: f64,
}

#[derive(Debug, Clone, Copy)]
struct LastVisit {
    /// Position in the global trigger-visit sequence; `None` for
    /// function visits, which do not take part in node-count cooldowns.
    sequence: Option<u64>,
    timestamp: f64,
}

/// Persistent-scope visited ids in a form an external save system can
/// store. The ids are sorted so equal sets serialize identically.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistenceSnapshot {
    pub visited: Vec<NodeId>,
}

impl PersistenceSnapshot {
    pub fn to_ron(&self) -> Result<String, SnapshotError> {
        Ok(ron::to_string(self)?)
    }

    pub fn from_ron(input: &str) -> Result<Self, SnapshotError> {
        Ok(ron::from_str(input)?)
    }

    pub fn save(&self, path: &Path) -> Result<(), SnapshotError> {
        std::fs::write(path, self.to_ron()?)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, SnapshotError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_ron(&contents)
    }
}

/// Visitation history for one runtime instance.
///
/// Visits must be recorded in non-decreasing timestamp order; the
/// timestamp queries rely on it to stop scanning early.
#[derive(Debug, Clone)]
pub struct PersistenceMap {
    recent: RingBuffer<VisitRecord>,
    scopes: [FxHashSet<NodeId>; 3],
    last_visits: FxHashMap<NodeId, LastVisit>,
    trigger_visits: u64,
}

impl Default for PersistenceMap {
    fn default() -> Self {
        Self::from_config(&DispatchConfig::default())
    }
}

impl PersistenceMap {
    pub fn new(
        recent_capacity: usize,
        chapter_capacity: usize,
        session_capacity: usize,
        persistent_capacity: usize,
    ) -> Self {
        let set = |capacity| FxHashSet::with_capacity_and_hasher(capacity, Default::default());
        Self {
            recent: RingBuffer::new(recent_capacity),
            scopes: [
                set(chapter_capacity),
                set(session_capacity),
                set(persistent_capacity),
            ],
            last_visits: FxHashMap::default(),
            trigger_visits: 0,
        }
    }

    pub fn from_config(config: &DispatchConfig) -> Self {
        Self::new(
            config.recent_history_capacity,
            config.chapter_capacity,
            config.session_capacity,
            config.persistent_capacity,
        )
    }

    /// True if `id` is among the newest `window` recent visits.
    pub fn has_recently_seen(&self, id: NodeId, window: usize) -> bool {
        self.recent
            .iter_newest()
            .take(window)
            .any(|record| record.node == id)
    }

    /// True if `id` was visited at or after `min_timestamp`.
    pub fn has_recently_seen_after_timestamp(&self, id: NodeId, min_timestamp: f64) -> bool {
        for record in self.recent.iter_newest() {
            if record.timestamp < min_timestamp {
                return false;
            }
            if record.node == id {
                return true;
            }
        }
        false
    }

    /// Has `id` ever been visited in `scope`?
    ///
    /// `Untracked` has no set of its own and falls back to scanning the
    /// recent-history window, so it only reaches back as far as that
    /// window's capacity.
    pub fn has_seen(&self, id: NodeId, scope: PersistenceScope) -> bool {
        match scope.tracked_index() {
            Some(index) => self.scopes[index].contains(&id),
            None => self.recent.iter_newest().any(|record| record.node == id),
        }
    }

    /// Record a visit at `timestamp`.
    ///
    /// Every visit enters the recent-history window and its scope's set;
    /// only trigger visits advance the trigger-visit counter.
    pub fn record_visit(
        &mut self,
        id: NodeId,
        scope: PersistenceScope,
        timestamp: f64,
        is_trigger: bool,
    ) {
        debug_assert!(
            self.recent.newest().map_or(true, |r| r.timestamp <= timestamp),
            "visits must be recorded in timestamp order"
        );
        self.recent.push(VisitRecord {
            node: id,
            timestamp,
        });
        let sequence = if is_trigger {
            let sequence = self.trigger_visits;
            self.trigger_visits += 1;
            Some(sequence)
        } else {
            None
        };
        self.last_visits.insert(
            id,
            LastVisit {
                sequence,
                timestamp,
            },
        );
        if let Some(index) = scope.tracked_index() {
            self.scopes[index].insert(id);
        }
    }

    /// Number of other trigger visits since `id` was last visited as a
    /// trigger, or `None` if it never was.
    pub fn trigger_visits_since(&self, id: NodeId) -> Option<u64> {
        let sequence = self.last_visits.get(&id)?.sequence?;
        Some(self.trigger_visits - sequence - 1)
    }

    pub fn last_visit_time(&self, id: NodeId) -> Option<f64> {
        self.last_visits.get(&id).map(|v| v.timestamp)
    }

    /// Is `id` still inside `cooldown` at time `now`?
    pub fn is_on_cooldown(&self, id: NodeId, cooldown: Cooldown, now: f64) -> bool {
        match cooldown {
            Cooldown::Nodes(window) => self
                .trigger_visits_since(id)
                .is_some_and(|since| since < u64::from(window)),
            Cooldown::Seconds(window) => self
                .last_visit_time(id)
                .is_some_and(|last| now - last < window),
        }
    }

    /// Total trigger visits recorded.
    pub fn trigger_visit_count(&self) -> u64 {
        self.trigger_visits
    }

    pub fn recent(&self) -> impl Iterator<Item = &VisitRecord> {
        self.recent.iter_newest()
    }

    pub fn recent_capacity(&self) -> usize {
        self.recent.capacity()
    }

    pub fn visited_in(&self, scope: PersistenceScope) -> Option<&FxHashSet<NodeId>> {
        scope.tracked_index().map(|index| &self.scopes[index])
    }

    /// Forget every visit in a tracked scope, e.g. on chapter change.
    pub fn clear_scope(&mut self, scope: PersistenceScope) {
        debug_assert!(
            scope.tracked_index().is_some(),
            "the untracked scope has no visited set to clear"
        );
        match scope.tracked_index() {
            Some(index) => {
                debug!(?scope, cleared = self.scopes[index].len(), "clearing visited scope");
                self.scopes[index].clear();
            }
            None => error!(?scope, "clear_scope called on untracked scope"),
        }
    }

    pub fn snapshot(&self) -> PersistenceSnapshot {
        let mut visited: Vec<NodeId> = self.scopes[2].iter().copied().collect();
        visited.sort();
        PersistenceSnapshot { visited }
    }

    /// Replace the Persistent-scope set with a saved snapshot.
    pub fn restore(&mut self, snapshot: &PersistenceSnapshot) {
        let set = &mut self.scopes[2];
        set.clear();
        set.extend(snapshot.visited.iter().copied());
        debug!(restored = set.len(), "persistent visits restored");
    }
}
