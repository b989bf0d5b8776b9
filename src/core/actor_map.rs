/// Registry of live actor instances.
use rustc_hash::FxHashMap;
use std::collections::hash_map::Entry;
use tracing::{debug, warn};

use crate::schema::actor::{Actor, ActorId};

/// Generational handle to a registered actor instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ActorHandle {
    index: u32,
    generation: u32,
}

#[derive(Debug)]
struct Slot {
    generation: u32,
    actor: Option<Actor>,
}

/// Every registered actor instance, plus an id-keyed index of the named
/// ones. When two instances claim the same id the first keeps it; the
/// second stays registered but cannot be found by id.
#[derive(Debug, Default)]
pub struct ActorMap {
    slots: Vec<Slot>,
    free: Vec<u32>,
    by_id: FxHashMap<ActorId, ActorHandle>,
    count: usize,
}

impl ActorMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, actor: Actor) -> ActorHandle {
        let handle = match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.generation = slot.generation.wrapping_add(1);
                ActorHandle {
                    index,
                    generation: slot.generation,
                }
            }
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    actor: None,
                });
                ActorHandle {
                    index: (self.slots.len() - 1) as u32,
                    generation: 0,
                }
            }
        };

        if let Some(id) = &actor.id {
            match self.by_id.entry(id.clone()) {
                Entry::Occupied(existing) => {
                    warn!(actor = %id, existing = ?existing.get(), "duplicate actor id; keeping the first registrant");
                }
                Entry::Vacant(entry) => {
                    entry.insert(handle);
                }
            }
        }
        debug!(actor = %actor.name, ?handle, "actor registered");
        self.slots[handle.index as usize].actor = Some(actor);
        self.count += 1;
        handle
    }

    /// Remove an actor. Stale handles are ignored.
    pub fn deregister(&mut self, handle: ActorHandle) -> Option<Actor> {
        let slot = self.slots.get_mut(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        let actor = slot.actor.take()?;
        if let Some(id) = &actor.id {
            if self.by_id.get(id) == Some(&handle) {
                self.by_id.remove(id);
            }
        }
        self.free.push(handle.index);
        self.count -= 1;
        debug!(actor = %actor.name, "actor deregistered");
        Some(actor)
    }

    pub fn get(&self, handle: ActorHandle) -> Option<&Actor> {
        let slot = self.slots.get(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.actor.as_ref()
    }

    pub fn get_mut(&mut self, handle: ActorHandle) -> Option<&mut Actor> {
        let slot = self.slots.get_mut(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.actor.as_mut()
    }

    pub fn find(&self, id: &ActorId) -> Option<ActorHandle> {
        self.by_id.get(id).copied()
    }

    pub fn by_id(&self, id: &ActorId) -> Option<&Actor> {
        self.find(id).and_then(|h| self.get(h))
    }

    pub fn by_id_mut(&mut self, id: &ActorId) -> Option<&mut Actor> {
        let handle = self.find(id)?;
        self.get_mut(handle)
    }

    pub fn iter(&self) -> impl Iterator<Item = (ActorHandle, &Actor)> {
        self.slots.iter().enumerate().filter_map(|(i, slot)| {
            slot.actor.as_ref().map(|actor| {
                (
                    ActorHandle {
                        index: i as u32,
                        generation: slot.generation,
                    },
                    actor,
                )
            })
        })
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Number of actors reachable by id.
    pub fn named_len(&self) -> usize {
        self.by_id.len()
    }
}
