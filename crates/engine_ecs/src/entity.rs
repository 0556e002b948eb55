//! Entity identifiers, allocation and dense entity sets.
//!
//! An [`Entity`] is a lightweight `u32` identifier with no inherent data. All
//! entity ids are handed out by one [`EntityAllocator`] owned by the
//! [`Universe`](crate::Universe), so an id is never live in two worlds at
//! once.

use std::fmt;

use serde::{Deserialize, Serialize};

/// An entity identifier.
///
/// Ids index directly into every component buffer, so they are kept small
/// and recycled aggressively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Entity(pub u32);

impl Entity {
    /// Create an entity from a raw `u32` identifier.
    #[must_use]
    pub const fn from_raw(id: u32) -> Self {
        Self(id)
    }

    /// Returns the raw `u32` identifier.
    #[must_use]
    pub const fn id(self) -> u32 {
        self.0
    }

    /// The id as a buffer index.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Entity({})", self.0)
    }
}

/// Hands out entity ids from a monotonically increasing cursor and a LIFO
/// free list of removed ids.
#[derive(Debug, Default)]
pub struct EntityAllocator {
    cursor: u32,
    free: Vec<Entity>,
}

impl EntityAllocator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reuse the most recently freed id, or mint a new one.
    pub fn allocate(&mut self) -> Entity {
        if let Some(entity) = self.free.pop() {
            return entity;
        }
        let entity = Entity(self.cursor);
        self.cursor += 1;
        entity
    }

    /// Return an id to the free list.
    pub fn free(&mut self, entity: Entity) {
        self.free.push(entity);
    }

    /// Number of ids ever minted. Every live id is below this value.
    #[must_use]
    pub fn cursor(&self) -> usize {
        self.cursor as usize
    }

    /// Number of ids waiting to be reused.
    #[must_use]
    pub fn free_count(&self) -> usize {
        self.free.len()
    }
}

/// A dense array of entities plus a reverse index from entity to slot.
///
/// Iteration is over the dense array; removal swaps the last entity into the
/// freed slot. The reverse index is never cleared, membership is checked by
/// validating it against the dense array.
#[derive(Debug, Clone, Default)]
pub struct DenseSet {
    dense: Vec<Entity>,
    sparse: Vec<u32>,
}

impl DenseSet {
    /// An empty set addressing ids below `capacity`.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            dense: Vec::new(),
            sparse: vec![0; capacity],
        }
    }

    /// Grow the reverse index to address ids below `capacity`.
    pub fn grow(&mut self, capacity: usize) {
        if capacity > self.sparse.len() {
            self.sparse.resize(capacity, 0);
        }
    }

    /// Number of ids the reverse index can address.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.sparse.len()
    }

    #[must_use]
    pub fn contains(&self, entity: Entity) -> bool {
        self.sparse
            .get(entity.index())
            .is_some_and(|&slot| self.dense.get(slot as usize) == Some(&entity))
    }

    /// Append `entity`. Returns `false` if it was already present.
    pub fn insert(&mut self, entity: Entity) -> bool {
        if self.contains(entity) {
            return false;
        }
        self.grow(entity.index() + 1);
        // Slots are bounded by live ids, which are u32.
        self.sparse[entity.index()] = self.dense.len() as u32;
        self.dense.push(entity);
        true
    }

    /// Swap-pop `entity` out of the dense array. Returns `false` if absent.
    pub fn remove(&mut self, entity: Entity) -> bool {
        if !self.contains(entity) {
            return false;
        }
        let slot = self.sparse[entity.index()] as usize;
        let last = self.dense.len() - 1;
        self.dense.swap(slot, last);
        self.dense.pop();
        if slot < last {
            self.sparse[self.dense[slot].index()] = slot as u32;
        }
        true
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.dense.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.dense.is_empty()
    }

    /// The dense array, in slot order.
    #[must_use]
    pub fn as_slice(&self) -> &[Entity] {
        &self.dense
    }

    pub fn iter(&self) -> impl Iterator<Item = Entity> + '_ {
        self.dense.iter().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_creation() {
        let e = Entity::from_raw(42);
        assert_eq!(e.id(), 42);
        assert_eq!(e.index(), 42);
        assert_eq!(e.to_string(), "Entity(42)");
    }

    #[test]
    fn test_allocator_mints_sequential_ids() {
        let mut alloc = EntityAllocator::new();
        assert_eq!(alloc.allocate(), Entity(0));
        assert_eq!(alloc.allocate(), Entity(1));
        assert_eq!(alloc.allocate(), Entity(2));
        assert_eq!(alloc.cursor(), 3);
    }

    #[test]
    fn test_allocator_reuses_lifo() {
        let mut alloc = EntityAllocator::new();
        let a = alloc.allocate();
        let b = alloc.allocate();
        alloc.free(a);
        alloc.free(b);
        assert_eq!(alloc.free_count(), 2);
        assert_eq!(alloc.allocate(), b);
        assert_eq!(alloc.allocate(), a);
        assert_eq!(alloc.allocate(), Entity(2));
        assert_eq!(alloc.cursor(), 3);
    }

    #[test]
    fn test_dense_set_swap_pop() {
        let mut set = DenseSet::with_capacity(8);
        for id in [3, 5, 7] {
            assert!(set.insert(Entity(id)));
        }
        assert!(!set.insert(Entity(5)));

        assert!(set.remove(Entity(3)));
        assert_eq!(set.as_slice(), &[Entity(7), Entity(5)]);
        assert!(!set.contains(Entity(3)));
        assert!(set.contains(Entity(7)));
        assert!(!set.remove(Entity(3)));

        assert!(set.remove(Entity(5)));
        assert_eq!(set.as_slice(), &[Entity(7)]);
    }

    #[test]
    fn test_dense_set_stale_reverse_index() {
        let mut set = DenseSet::with_capacity(4);
        set.insert(Entity(0));
        set.insert(Entity(1));
        set.remove(Entity(1));
        // Entity 1's stale slot points past the end.
        assert!(!set.contains(Entity(1)));
        // Entity 2 was never inserted; its zeroed slot points at entity 0.
        assert!(!set.contains(Entity(2)));
        assert!(!set.contains(Entity(100)));
    }

    #[test]
    fn test_entity_serialization_roundtrip() {
        let entity = Entity::from_raw(999);
        let json = serde_json::to_string(&entity).unwrap();
        let restored: Entity = serde_json::from_str(&json).unwrap();
        assert_eq!(entity, restored);
    }
}
