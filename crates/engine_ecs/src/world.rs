//! Worlds: entity lifecycle, component masks and capacity growth.
//!
//! A [`World`] tracks which entities it holds and which components each of
//! them has. Component membership is a bitmask per entity spread across
//! 32-bit "generation lanes": every registered component owns one bit in one
//! lane.
//!
//! ```text
//!             eid:  0      1      2      3
//! lane 0  [u32; N]  0b101  0b001  0b000  0b111   (components 0..32)
//! lane 1  [u32; N]  0b0    0b1    0b0    0b0     (components 32..64)
//! ```
//!
//! Worlds grow automatically when the shared id cursor nears their capacity.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use tracing::{debug, trace};

use crate::component::{ComponentId, ComponentRecord};
use crate::entity::{DenseSet, Entity};
use crate::error::EcsError;
use crate::query::{QueryId, QueryState};
use crate::universe::Universe;

/// Handle to a world inside a [`Universe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorldId(pub usize);

/// Entity membership and component masks for one world.
pub struct World {
    capacity: usize,
    enabled: Vec<bool>,
    entities: DenseSet,
    pub(crate) masks: Vec<Vec<u32>>,
    pub(crate) components: HashMap<ComponentId, ComponentRecord>,
    pub(crate) registered: Vec<ComponentId>,
    pub(crate) queries: BTreeMap<QueryId, QueryState>,
    pub(crate) dirty_queries: BTreeSet<QueryId>,
    /// Next bit to hand out. Zero once the current lane is full.
    pub(crate) bitflag: u32,
    pub(crate) registry_version: u64,
}

impl World {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            enabled: vec![false; capacity],
            entities: DenseSet::with_capacity(capacity),
            masks: vec![vec![0; capacity]],
            components: HashMap::new(),
            registered: Vec::new(),
            queries: BTreeMap::new(),
            dirty_queries: BTreeSet::new(),
            bitflag: 1,
            registry_version: 0,
        }
    }

    /// Number of entity slots.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns `true` if `entity` currently lives in this world.
    #[must_use]
    pub fn is_enabled(&self, entity: Entity) -> bool {
        self.enabled.get(entity.index()).copied().unwrap_or(false)
    }

    /// Live entities, in dense order.
    #[must_use]
    pub fn entities(&self) -> &[Entity] {
        self.entities.as_slice()
    }

    #[must_use]
    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    /// Length of the enabled flags; equals the capacity.
    #[must_use]
    pub fn enabled_len(&self) -> usize {
        self.enabled.len()
    }

    /// The generation lanes, one `u32` per entity slot each.
    #[must_use]
    pub fn mask_lanes(&self) -> &[Vec<u32>] {
        &self.masks
    }

    /// Registered components, in registration order.
    #[must_use]
    pub fn registered_components(&self) -> &[ComponentId] {
        &self.registered
    }

    /// The lane and bit assigned to a component, if registered.
    #[must_use]
    pub fn component_record(&self, component: ComponentId) -> Option<ComponentRecord> {
        self.components.get(&component).copied()
    }

    /// Bumped on every component registration.
    #[must_use]
    pub fn registry_version(&self) -> u64 {
        self.registry_version
    }

    pub(crate) fn has_bit(&self, record: ComponentRecord, entity: Entity) -> bool {
        self.masks[record.generation]
            .get(entity.index())
            .is_some_and(|mask| mask & record.bitflag == record.bitflag)
    }

    fn grow(&mut self, capacity: usize) {
        self.capacity = capacity;
        self.enabled.resize(capacity, false);
        self.entities.grow(capacity);
        for lane in &mut self.masks {
            lane.resize(capacity, 0);
        }
        for query in self.queries.values_mut() {
            query.grow(capacity);
        }
    }

    /// Disable `entity` and detach every component. Returns `false` if the
    /// entity was not live.
    fn remove(&mut self, entity: Entity) -> bool {
        if !self.is_enabled(entity) {
            return false;
        }
        for (&id, query) in &mut self.queries {
            if query.remove(entity) {
                self.dirty_queries.insert(id);
            }
        }
        self.enabled[entity.index()] = false;
        self.entities.remove(entity);
        for lane in &mut self.masks {
            lane[entity.index()] = 0;
        }
        true
    }

    /// Enter a fresh entity, whose masks are all zero, into every query
    /// without positive terms.
    fn admit(&mut self, entity: Entity) {
        for query in self.queries.values_mut() {
            if query.matches(&self.masks, entity) {
                query.add(entity);
            }
        }
    }

    /// Re-evaluate every query that mentions `record` for `entity`.
    pub(crate) fn update_queries(&mut self, record: ComponentRecord, entity: Entity) {
        for (&id, query) in &mut self.queries {
            if !query.touches(record) {
                continue;
            }
            if query.matches(&self.masks, entity) {
                query.add(entity);
            } else if query.remove(entity) {
                self.dirty_queries.insert(id);
            }
        }
    }
}

impl std::fmt::Debug for World {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("World")
            .field("capacity", &self.capacity)
            .field("entities", &self.entities.len())
            .field("lanes", &self.masks.len())
            .field("components", &self.registered)
            .field("queries", &self.queries.len())
            .finish_non_exhaustive()
    }
}

/// Capacity added on each automatic growth step: half the current capacity,
/// rounded up to a multiple of four.
fn growth_step(capacity: usize) -> usize {
    (capacity.div_ceil(8) * 4).max(4)
}

impl Universe {
    /// Create a world with room for `capacity` entities.
    pub fn create_world(&mut self, capacity: usize) -> WorldId {
        let id = WorldId(self.worlds.len());
        self.worlds.push(World::new(capacity));
        debug!(world = id.0, capacity, "world created");
        id
    }

    /// Create a world with the configured default capacity.
    pub fn create_default_world(&mut self) -> WorldId {
        self.create_world(self.config.default_capacity)
    }

    /// Allocate an entity and add it to `world`.
    ///
    /// The world first grows while the shared id cursor sits at or above
    /// 80% of its capacity.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::UnknownWorld`] for foreign handles.
    pub fn add_entity(&mut self, world: WorldId) -> Result<Entity, EcsError> {
        let current = self.world(world)?.capacity;
        let mut capacity = current;
        while self.allocator.cursor() >= capacity - capacity / 5 {
            capacity += growth_step(capacity);
        }
        if capacity > current {
            self.resize_world(world, capacity)?;
        }

        let entity = self.allocator.allocate();
        let w = &mut self.worlds[world.0];
        w.enabled[entity.index()] = true;
        w.entities.insert(entity);
        w.admit(entity);
        trace!(world = world.0, %entity, "entity added");
        Ok(entity)
    }

    /// Remove `entity` from `world`, detaching every component and returning
    /// its id to the allocator. Component data is left in place.
    ///
    /// Removing an entity that is not live is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::UnknownWorld`] for foreign handles.
    pub fn remove_entity(&mut self, world: WorldId, entity: Entity) -> Result<(), EcsError> {
        if self.world_mut(world)?.remove(entity) {
            self.allocator.free(entity);
            trace!(world = world.0, %entity, "entity removed");
        }
        Ok(())
    }

    /// Grow `world` and every store registered in it to `capacity`.
    /// Requests that do not grow the world are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::UnknownWorld`] for foreign handles.
    pub fn resize_world(&mut self, world: WorldId, capacity: usize) -> Result<(), EcsError> {
        let w = self
            .worlds
            .get_mut(world.0)
            .ok_or(EcsError::UnknownWorld(world))?;
        let old_capacity = w.capacity;
        if capacity <= old_capacity {
            return Ok(());
        }

        w.grow(capacity);
        for component in &w.registered {
            self.stores[component.0].resize(capacity);
        }
        debug!(world = world.0, old_capacity, capacity, "world resized");
        Ok(())
    }

    /// Returns `true` if `entity` lives in `world`.
    #[must_use]
    pub fn entity_exists(&self, world: WorldId, entity: Entity) -> bool {
        self.world(world).is_ok_and(|w| w.is_enabled(entity))
    }

    /// Live entities of `world`, in dense order.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::UnknownWorld`] for foreign handles.
    pub fn entities(&self, world: WorldId) -> Result<&[Entity], EcsError> {
        Ok(self.world(world)?.entities())
    }

    /// Number of live entities in `world`.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::UnknownWorld`] for foreign handles.
    pub fn entity_count(&self, world: WorldId) -> Result<usize, EcsError> {
        Ok(self.world(world)?.entity_count())
    }
}

#[cfg(test)]
mod tests {
    use engine_storage::{PrimitiveType, Schema};

    use super::*;

    #[test]
    fn test_create_world() {
        let mut universe = Universe::new();
        let world = universe.create_world(16);
        let w = universe.world(world).unwrap();
        assert_eq!(w.capacity(), 16);
        assert_eq!(w.enabled_len(), 16);
        assert_eq!(w.mask_lanes().len(), 1);
        assert_eq!(w.entity_count(), 0);
        assert_eq!(universe.world_count(), 1);

        let other = universe.create_default_world();
        assert_eq!(other, WorldId(1));
        assert_eq!(universe.world_count(), 2);
        assert!(matches!(universe.world(WorldId(2)), Err(EcsError::UnknownWorld(WorldId(2)))));
    }

    #[test]
    fn test_add_and_remove_entities() {
        let mut universe = Universe::new();
        let world = universe.create_world(16);

        let a = universe.add_entity(world).unwrap();
        let b = universe.add_entity(world).unwrap();
        let c = universe.add_entity(world).unwrap();
        assert_eq!(universe.entities(world).unwrap(), &[a, b, c]);

        universe.remove_entity(world, a).unwrap();
        assert!(!universe.entity_exists(world, a));
        assert_eq!(universe.entities(world).unwrap(), &[c, b]);

        // Idempotent: the id is not freed twice.
        universe.remove_entity(world, a).unwrap();
        assert_eq!(universe.allocator().free_count(), 1);
    }

    #[test]
    fn test_removed_ids_are_reused_lifo() {
        let mut universe = Universe::new();
        let world = universe.create_world(16);
        let a = universe.add_entity(world).unwrap();
        let b = universe.add_entity(world).unwrap();

        universe.remove_entity(world, a).unwrap();
        universe.remove_entity(world, b).unwrap();

        assert_eq!(universe.add_entity(world).unwrap(), b);
        assert_eq!(universe.add_entity(world).unwrap(), a);
        assert_eq!(universe.add_entity(world).unwrap(), Entity(2));
    }

    #[test]
    fn test_ids_are_shared_across_worlds() {
        let mut universe = Universe::new();
        let first = universe.create_world(16);
        let second = universe.create_world(16);

        let a = universe.add_entity(first).unwrap();
        let b = universe.add_entity(second).unwrap();
        assert_ne!(a, b);
        assert!(universe.entity_exists(first, a));
        assert!(!universe.entity_exists(second, a));
    }

    #[test]
    fn test_add_entity_grows_at_eighty_percent() {
        let mut universe = Universe::new();
        let world = universe.create_world(10);

        for _ in 0..8 {
            universe.add_entity(world).unwrap();
        }
        assert_eq!(universe.world(world).unwrap().capacity(), 10);

        // Cursor is 8 == 10 - 10/5: grow by ceil(10/8)*4 = 8.
        universe.add_entity(world).unwrap();
        let w = universe.world(world).unwrap();
        assert_eq!(w.capacity(), 18);
        assert_eq!(w.enabled_len(), 18);
        assert!(w.mask_lanes().iter().all(|lane| lane.len() == 18));
    }

    #[test]
    fn test_zero_capacity_world_grows() {
        let mut universe = Universe::new();
        let world = universe.create_world(0);
        let entity = universe.add_entity(world).unwrap();
        assert!(universe.world(world).unwrap().capacity() > entity.index());
    }

    #[test]
    fn test_resize_world_grows_registered_stores() {
        let mut universe = Universe::new();
        let world = universe.create_world(8);
        let position = universe
            .define_component_with_capacity(
                Schema::new().field("x", PrimitiveType::F32),
                8,
            )
            .unwrap();
        universe.register_component(world, position).unwrap();

        universe.resize_world(world, 32).unwrap();
        assert_eq!(universe.store(position).unwrap().capacity(), 32);

        universe.resize_world(world, 4).unwrap();
        assert_eq!(universe.world(world).unwrap().capacity(), 32);
    }

    #[test]
    fn test_unknown_world() {
        let mut universe = Universe::new();
        assert!(matches!(
            universe.add_entity(WorldId(3)),
            Err(EcsError::UnknownWorld(WorldId(3)))
        ));
        assert!(!universe.entity_exists(WorldId(3), Entity(0)));
    }
}
