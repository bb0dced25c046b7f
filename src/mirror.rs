//! Fixed-capacity mirror of remote agents.
//!
//! The [`SlotTable`] is an arena of `capacity` slots indexed by participant
//! id. A slot is reserved before the (slow) texture fetch and filled once
//! the agent exists, so the table lock is never held across I/O while
//! allocation stays atomic. The capacity is a hard ceiling: nothing is ever
//! evicted.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use hashbrown::HashMap;

use crate::agent::{AgentHandle, ParticipantId};

/// Position of a slot in the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotIndex(usize);

impl SlotIndex {
    /// Zero-based slot number.
    #[must_use]
    pub const fn get(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone)]
enum Slot {
    Free,
    Reserved(ParticipantId),
    Occupied(AgentHandle),
}

/// Result of looking a participant up in the table.
#[derive(Debug, Clone)]
pub enum Lookup {
    /// The participant has an agent.
    Tracked(AgentHandle),
    /// A slot is reserved but the agent is still being built.
    Pending,
    /// The participant is unknown.
    Absent,
}

/// Arena of remote agents keyed by participant id.
#[derive(Debug, Clone)]
pub struct SlotTable {
    slots: Vec<Slot>,
    index: HashMap<ParticipantId, SlotIndex>,
}

impl SlotTable {
    /// Creates an empty table with `capacity` slots.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: vec![Slot::Free; capacity],
            index: HashMap::with_capacity(capacity),
        }
    }

    /// Total number of slots.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of slots holding an agent.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handles().count()
    }

    /// Whether no slot holds an agent.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether every slot is reserved or occupied.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.index.len() >= self.slots.len()
    }

    /// Agent of a tracked participant.
    #[must_use]
    pub fn get(&self, id: ParticipantId) -> Option<&AgentHandle> {
        match self.lookup_slot(id)? {
            Slot::Occupied(handle) => Some(handle),
            Slot::Free | Slot::Reserved(_) => None,
        }
    }

    fn lookup_slot(&self, id: ParticipantId) -> Option<&Slot> {
        let slot = self.index.get(&id)?;
        self.slots.get(slot.get())
    }

    /// Classifies a participant as tracked, pending or absent.
    #[must_use]
    pub fn lookup(&self, id: ParticipantId) -> Lookup {
        match self.lookup_slot(id) {
            Some(Slot::Occupied(handle)) => Lookup::Tracked(handle.clone()),
            Some(Slot::Reserved(_)) => Lookup::Pending,
            Some(Slot::Free) | None => Lookup::Absent,
        }
    }

    /// Reserves the lowest free slot for `id`.
    ///
    /// Returns `None` when the table is full or `id` already has a slot.
    pub fn reserve(&mut self, id: ParticipantId) -> Option<SlotIndex> {
        if self.index.contains_key(&id) {
            return None;
        }
        let position = self
            .slots
            .iter()
            .position(|slot| matches!(slot, Slot::Free))?;
        let slot = self.slots.get_mut(position)?;
        *slot = Slot::Reserved(id);
        let index = SlotIndex(position);
        self.index.insert(id, index);
        Some(index)
    }

    /// Stores the agent for a slot reserved under the same participant id.
    ///
    /// Returns `false`, leaving the table unchanged, when the slot is not
    /// reserved for `handle`'s participant.
    pub fn fill(&mut self, index: SlotIndex, handle: AgentHandle) -> bool {
        let Some(slot) = self.slots.get_mut(index.get()) else {
            return false;
        };
        if !matches!(*slot, Slot::Reserved(id) if id == handle.id()) {
            return false;
        }
        *slot = Slot::Occupied(handle);
        true
    }

    /// Frees a reserved slot whose agent could not be built.
    ///
    /// Occupied slots are never released.
    pub fn release(&mut self, index: SlotIndex) {
        if let Some(slot) = self.slots.get_mut(index.get()) {
            if let Slot::Reserved(id) = *slot {
                self.index.remove(&id);
                *slot = Slot::Free;
            }
        }
    }

    /// Reserves and fills a slot in one step.
    pub fn insert(&mut self, handle: AgentHandle) -> Option<SlotIndex> {
        let index = self.reserve(handle.id())?;
        self.fill(index, handle);
        Some(index)
    }

    /// Agents in slot order.
    pub fn handles(&self) -> impl Iterator<Item = &AgentHandle> {
        self.slots.iter().filter_map(|slot| match slot {
            Slot::Occupied(handle) => Some(handle),
            Slot::Free | Slot::Reserved(_) => None,
        })
    }
}

/// Shared handle to the slot table.
///
/// Cloning yields another handle to the same table.
#[derive(Debug, Clone)]
pub struct Mirror {
    table: Arc<Mutex<SlotTable>>,
}

impl Mirror {
    /// Creates an empty mirror with `capacity` slots.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            table: Arc::new(Mutex::new(SlotTable::with_capacity(capacity))),
        }
    }

    /// Locks the table, recovering from poisoning. Never hold the guard
    /// across I/O.
    pub fn lock(&self) -> MutexGuard<'_, SlotTable> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Agent of a tracked participant.
    #[must_use]
    pub fn get(&self, id: ParticipantId) -> Option<AgentHandle> {
        self.lock().get(id).cloned()
    }

    /// Handles to every mirrored agent, in slot order.
    #[must_use]
    pub fn agents(&self) -> Vec<AgentHandle> {
        self.lock().handles().cloned().collect()
    }

    /// Number of mirrored agents.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether the mirror holds no agents.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Total number of slots.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.lock().capacity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{Agent, Pose, Texture};
    use crate::config::AgentParams;
    use rstest::rstest;

    fn handle(id: ParticipantId) -> AgentHandle {
        AgentHandle::new(Agent::new(
            id,
            AgentParams::default(),
            Pose::default(),
            Texture::default(),
        ))
    }

    #[rstest]
    fn insert_uses_lowest_free_slot() {
        let mut table = SlotTable::with_capacity(3);
        assert_eq!(table.insert(handle(10)).map(SlotIndex::get), Some(0));
        let reserved = table.reserve(11).expect("free slot");
        assert_eq!(table.insert(handle(12)).map(SlotIndex::get), Some(2));
        table.release(reserved);
        assert_eq!(table.insert(handle(13)).map(SlotIndex::get), Some(1));
        let ids: Vec<_> = table.handles().map(AgentHandle::id).collect();
        assert_eq!(ids, vec![10, 13, 12]);
    }

    #[rstest]
    fn full_table_refuses_new_participants() {
        let mut table = SlotTable::with_capacity(2);
        assert!(table.insert(handle(1)).is_some());
        assert!(table.insert(handle(2)).is_some());
        assert!(table.is_full());
        assert!(table.reserve(3).is_none());
        assert_eq!(table.len(), 2);
        assert!(table.get(3).is_none());
    }

    #[rstest]
    fn ids_are_unique() {
        let mut table = SlotTable::with_capacity(4);
        assert!(table.insert(handle(7)).is_some());
        assert!(table.insert(handle(7)).is_none());
        assert_eq!(table.len(), 1);
    }

    #[rstest]
    fn reserved_slots_are_pending_until_filled() {
        let mut table = SlotTable::with_capacity(1);
        let slot = table.reserve(5).expect("free slot");
        assert!(matches!(table.lookup(5), Lookup::Pending));
        assert!(table.is_empty());
        assert!(!table.fill(slot, handle(6)), "slot belongs to participant 5");
        assert!(table.fill(slot, handle(5)));
        assert!(matches!(table.lookup(5), Lookup::Tracked(found) if found.id() == 5));
    }

    #[rstest]
    fn occupied_slots_are_never_released() {
        let mut table = SlotTable::with_capacity(1);
        let slot = table.insert(handle(5)).expect("free slot");
        table.release(slot);
        assert!(table.get(5).is_some());
    }

    #[rstest]
    fn mirror_clones_share_one_table() {
        let mirror = Mirror::new(2);
        let other = mirror.clone();
        assert!(other.lock().insert(handle(9)).is_some());
        assert_eq!(mirror.len(), 1);
        assert_eq!(mirror.get(9).map(|found| found.id()), Some(9));
        assert_eq!(mirror.capacity(), 2);
    }
}
