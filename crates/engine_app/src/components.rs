//! Demo component set shared by the source and replica universes.
//!
//! Both universes must define the same components in the same order so the
//! delta codec's component ids line up on either side.

use engine_ecs::{ComponentId, EcsError, Entity, Universe};
use engine_storage::{FieldId, PrimitiveType, Schema, StorageError};

const VELOCITY_SCHEMA: &str = r#"{ "x": "f32", "y": "f32" }"#;

/// Handles to the demo components plus their resolved fields.
#[derive(Debug, Clone, Copy)]
pub struct Components {
    pub position: ComponentId,
    pub velocity: ComponentId,
    /// Tag without fields; excludes an entity from movement.
    pub frozen: ComponentId,
    pub position_x: FieldId,
    pub position_y: FieldId,
    pub velocity_x: FieldId,
    pub velocity_y: FieldId,
}

impl Components {
    /// Define `Position`, `Velocity` and `Frozen` in `universe`.
    pub fn define(universe: &mut Universe, capacity: usize) -> Result<Self, EcsError> {
        let position = universe.define_component_with_capacity(
            Schema::new()
                .field("x", PrimitiveType::F32)
                .field("y", PrimitiveType::F32),
            capacity,
        )?;
        let velocity_schema = Schema::from_json_str(VELOCITY_SCHEMA).map_err(StorageError::from)?;
        let velocity = universe.define_component_with_capacity(velocity_schema, capacity)?;
        let frozen = universe.define_component_with_capacity(Schema::new(), capacity)?;

        let (position_x, position_y) = xy(universe, position)?;
        let (velocity_x, velocity_y) = xy(universe, velocity)?;
        Ok(Self {
            position,
            velocity,
            frozen,
            position_x,
            position_y,
            velocity_x,
            velocity_y,
        })
    }

    /// Current position of `entity`.
    pub fn position(&self, universe: &Universe, entity: Entity) -> Result<(f32, f32), EcsError> {
        let store = universe.store(self.position)?;
        Ok((
            store.get(self.position_x, entity.index())?,
            store.get(self.position_y, entity.index())?,
        ))
    }

    pub fn set_position(&self, universe: &mut Universe, entity: Entity, (x, y): (f32, f32)) -> Result<(), EcsError> {
        let store = universe.store_mut(self.position)?;
        store.set(self.position_x, entity.index(), x)?;
        store.set(self.position_y, entity.index(), y)?;
        Ok(())
    }

    pub fn velocity(&self, universe: &Universe, entity: Entity) -> Result<(f32, f32), EcsError> {
        let store = universe.store(self.velocity)?;
        Ok((
            store.get(self.velocity_x, entity.index())?,
            store.get(self.velocity_y, entity.index())?,
        ))
    }

    pub fn set_velocity(&self, universe: &mut Universe, entity: Entity, (x, y): (f32, f32)) -> Result<(), EcsError> {
        let store = universe.store_mut(self.velocity)?;
        store.set(self.velocity_x, entity.index(), x)?;
        store.set(self.velocity_y, entity.index(), y)?;
        Ok(())
    }
}

fn xy(universe: &Universe, component: ComponentId) -> Result<(FieldId, FieldId), EcsError> {
    let store = universe.store(component)?;
    Ok((store.field_id("x")?, store.field_id("y")?))
}
