//! Component definition and per-world registration.
//!
//! A component is a [`Store`] owned by the [`Universe`]. Registering it in a
//! world assigns it one bit in one generation lane; adding it to an entity
//! sets that bit, zeroes the entity's slot and updates every live query that
//! mentions the component.

use engine_storage::{Schema, Store};
use tracing::{debug, trace, warn};

use crate::entity::Entity;
use crate::error::EcsError;
use crate::universe::Universe;
use crate::world::WorldId;

/// Handle to a component store inside a [`Universe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentId(pub usize);

/// Where a component's bit lives in a world.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComponentRecord {
    /// Index of the generation lane.
    pub generation: usize,
    /// The component's single bit within that lane.
    pub bitflag: u32,
}

impl Universe {
    /// Define a component with the configured default capacity.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::Storage`] if the schema is invalid.
    pub fn define_component(&mut self, schema: Schema) -> Result<ComponentId, EcsError> {
        self.define_component_with_capacity(schema, self.config.default_capacity)
    }

    /// Define a component whose store starts at `capacity` entities. The
    /// store grows to match any larger world it is registered in.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::Storage`] if the schema is invalid.
    pub fn define_component_with_capacity(
        &mut self,
        schema: Schema,
        capacity: usize,
    ) -> Result<ComponentId, EcsError> {
        let store = Store::new(schema, capacity)?;
        let id = ComponentId(self.stores.len());
        debug!(
            component = id.0,
            capacity,
            leaves = store.flatten().len(),
            "component defined"
        );
        self.stores.push(store);
        Ok(id)
    }

    /// Assign `component` a lane and bit in `world`. Registering twice is a
    /// no-op.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::UnknownWorld`] or [`EcsError::UnknownComponent`]
    /// for foreign handles.
    pub fn register_component(&mut self, world: WorldId, component: ComponentId) -> Result<(), EcsError> {
        let store = self
            .stores
            .get_mut(component.0)
            .ok_or(EcsError::UnknownComponent(component))?;
        let w = self
            .worlds
            .get_mut(world.0)
            .ok_or(EcsError::UnknownWorld(world))?;
        if w.components.contains_key(&component) {
            return Ok(());
        }

        // The previous registration filled the last lane.
        if w.bitflag == 0 {
            w.masks.push(vec![0; w.capacity()]);
            w.bitflag = 1;
        }
        let record = ComponentRecord {
            generation: w.masks.len() - 1,
            bitflag: w.bitflag,
        };
        w.components.insert(component, record);
        w.registered.push(component);
        w.registry_version += 1;
        w.bitflag = if w.bitflag == 1 << 31 { 0 } else { w.bitflag << 1 };

        store.resize(w.capacity());
        debug!(
            world = world.0,
            component = component.0,
            generation = record.generation,
            bitflag = record.bitflag,
            "component registered"
        );
        Ok(())
    }

    /// Register several components in order.
    ///
    /// # Errors
    ///
    /// Stops at the first foreign handle, see [`Universe::register_component`].
    pub fn register_components(&mut self, world: WorldId, components: &[ComponentId]) -> Result<(), EcsError> {
        components
            .iter()
            .try_for_each(|&component| self.register_component(world, component))
    }

    /// Returns `true` if `entity` has `component` in `world`. Unregistered
    /// components and foreign handles yield `false`.
    #[must_use]
    pub fn has_component(&self, world: WorldId, component: ComponentId, entity: Entity) -> bool {
        let Ok(w) = self.world(world) else {
            return false;
        };
        w.component_record(component)
            .is_some_and(|record| w.has_bit(record, entity))
    }

    /// Attach `component` to `entity`, registering it first if needed. The
    /// entity's slot is zeroed and matching queries pick the entity up.
    ///
    /// Adding a component the entity already has is a no-op. Adding to an
    /// entity that is not live logs a warning and does nothing.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::UnknownWorld`] or [`EcsError::UnknownComponent`]
    /// for foreign handles.
    pub fn add_component(&mut self, world: WorldId, component: ComponentId, entity: Entity) -> Result<(), EcsError> {
        self.store(component)?;
        if !self.world(world)?.is_enabled(entity) {
            warn!(world = world.0, component = component.0, %entity, "add_component on an entity that is not live");
            return Ok(());
        }
        self.register_component(world, component)?;
        if self.has_component(world, component, entity) {
            return Ok(());
        }

        let w = &mut self.worlds[world.0];
        let Some(record) = w.component_record(component) else {
            return Ok(());
        };
        w.masks[record.generation][entity.index()] |= record.bitflag;
        self.stores[component.0].reset(entity.index());
        w.update_queries(record, entity);
        trace!(world = world.0, component = component.0, %entity, "component added");
        Ok(())
    }

    /// Detach `component` from `entity` and drop the entity from queries it
    /// no longer matches. Component data is left as it was.
    ///
    /// Removing a component the entity does not have, or one never
    /// registered in `world`, is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::UnknownWorld`] or [`EcsError::UnknownComponent`]
    /// for foreign handles.
    pub fn remove_component(&mut self, world: WorldId, component: ComponentId, entity: Entity) -> Result<(), EcsError> {
        self.store(component)?;
        let w = self.world_mut(world)?;
        if !w.is_enabled(entity) {
            warn!(world = world.0, component = component.0, %entity, "remove_component on an entity that is not live");
            return Ok(());
        }
        let Some(record) = w.component_record(component) else {
            return Ok(());
        };
        if !w.has_bit(record, entity) {
            return Ok(());
        }

        w.masks[record.generation][entity.index()] &= !record.bitflag;
        w.update_queries(record, entity);
        trace!(world = world.0, component = component.0, %entity, "component removed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use engine_storage::PrimitiveType;

    use super::*;

    fn position() -> Schema {
        Schema::new()
            .field("x", PrimitiveType::F32)
            .field("y", PrimitiveType::F32)
    }

    #[test]
    fn test_registration_assigns_successive_bits() {
        let mut universe = Universe::new();
        let world = universe.create_world(8);
        let a = universe.define_component_with_capacity(position(), 8).unwrap();
        let b = universe.define_component_with_capacity(Schema::new(), 8).unwrap();

        universe.register_components(world, &[a, b, a]).unwrap();
        let w = universe.world(world).unwrap();
        assert_eq!(w.component_record(a), Some(ComponentRecord { generation: 0, bitflag: 1 }));
        assert_eq!(w.component_record(b), Some(ComponentRecord { generation: 0, bitflag: 2 }));
        assert_eq!(w.registered_components(), &[a, b]);
        assert_eq!(w.registry_version(), 2);
    }

    #[test]
    fn test_lanes_open_after_thirty_two_components() {
        let mut universe = Universe::new();
        let world = universe.create_world(4);
        let components: Vec<_> = (0..33)
            .map(|_| universe.define_component_with_capacity(Schema::new(), 4).unwrap())
            .collect();

        universe.register_components(world, &components[..32]).unwrap();
        let w = universe.world(world).unwrap();
        assert_eq!(w.mask_lanes().len(), 1);
        assert_eq!(
            w.component_record(components[31]),
            Some(ComponentRecord { generation: 0, bitflag: 1 << 31 })
        );

        universe.register_component(world, components[32]).unwrap();
        let w = universe.world(world).unwrap();
        assert_eq!(w.mask_lanes().len(), 2);
        assert_eq!(w.mask_lanes()[1].len(), 4);
        assert_eq!(
            w.component_record(components[32]),
            Some(ComponentRecord { generation: 1, bitflag: 1 })
        );
    }

    #[test]
    fn test_registration_grows_small_stores() {
        let mut universe = Universe::new();
        let world = universe.create_world(64);
        let a = universe.define_component_with_capacity(position(), 8).unwrap();
        universe.register_component(world, a).unwrap();
        assert_eq!(universe.store(a).unwrap().capacity(), 64);
    }

    #[test]
    fn test_has_add_remove() {
        let mut universe = Universe::new();
        let world = universe.create_world(8);
        let a = universe.define_component_with_capacity(position(), 8).unwrap();
        let e = universe.add_entity(world).unwrap();

        assert!(!universe.has_component(world, a, e));
        universe.add_component(world, a, e).unwrap();
        assert!(universe.has_component(world, a, e));
        universe.add_component(world, a, e).unwrap();
        assert!(universe.has_component(world, a, e));

        universe.remove_component(world, a, e).unwrap();
        assert!(!universe.has_component(world, a, e));
        universe.remove_component(world, a, e).unwrap();
        assert!(!universe.has_component(world, a, e));
    }

    #[test]
    fn test_add_component_resets_slot_and_remove_keeps_data() {
        let mut universe = Universe::new();
        let world = universe.create_world(8);
        let a = universe.define_component_with_capacity(position(), 8).unwrap();
        let e = universe.add_entity(world).unwrap();
        let x = universe.store(a).unwrap().field("x").unwrap();

        universe.store_mut(a).unwrap().set(x, e.index(), 5.0f32).unwrap();
        universe.add_component(world, a, e).unwrap();
        assert_eq!(universe.store(a).unwrap().get::<f32>(x, e.index()).unwrap(), 0.0);

        universe.store_mut(a).unwrap().set(x, e.index(), 7.0f32).unwrap();
        universe.remove_component(world, a, e).unwrap();
        assert_eq!(universe.store(a).unwrap().get::<f32>(x, e.index()).unwrap(), 7.0);
    }

    #[test]
    fn test_component_ops_on_dead_entities_are_noops() {
        let mut universe = Universe::new();
        let world = universe.create_world(8);
        let a = universe.define_component_with_capacity(position(), 8).unwrap();

        universe.add_component(world, a, Entity(5)).unwrap();
        assert!(!universe.has_component(world, a, Entity(5)));
        universe.remove_component(world, a, Entity(5)).unwrap();
    }

    #[test]
    fn test_unregistered_component_is_absent() {
        let mut universe = Universe::new();
        let world = universe.create_world(8);
        let a = universe.define_component_with_capacity(position(), 8).unwrap();
        let e = universe.add_entity(world).unwrap();

        assert!(!universe.has_component(world, a, e));
        universe.remove_component(world, a, e).unwrap();
        assert!(universe.world(world).unwrap().component_record(a).is_none());
    }

    #[test]
    fn test_removing_entity_clears_every_bit() {
        let mut universe = Universe::new();
        let world = universe.create_world(8);
        let a = universe.define_component_with_capacity(position(), 8).unwrap();
        let b = universe.define_component_with_capacity(Schema::new(), 8).unwrap();
        let e = universe.add_entity(world).unwrap();
        universe.add_component(world, a, e).unwrap();
        universe.add_component(world, b, e).unwrap();

        universe.remove_entity(world, e).unwrap();
        let reused = universe.add_entity(world).unwrap();
        assert_eq!(reused, e);
        assert!(!universe.has_component(world, a, reused));
        assert!(!universe.has_component(world, b, reused));
    }

    #[test]
    fn test_invalid_schema_is_reported() {
        let mut universe = Universe::new();
        let err = universe
            .define_component(Schema::new().array("v", PrimitiveType::F32, 0))
            .unwrap_err();
        assert!(matches!(err, EcsError::Storage(_)));
    }

    #[test]
    fn test_foreign_component_handle() {
        let mut universe = Universe::new();
        let world = universe.create_world(8);
        assert!(matches!(
            universe.register_component(world, ComponentId(9)),
            Err(EcsError::UnknownComponent(ComponentId(9)))
        ));
    }
}
