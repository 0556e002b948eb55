//! Demo tick loop.
//!
//! Each tick:
//!
//! 1. Run the system pipeline over the source world (freeze, then movement).
//! 2. Serialize a diff delta of `Position` and `Velocity` for every live
//!    entity.
//! 3. Replay the delta into the replica world.
//! 4. Advance the tick counter.

use std::time::{Duration, Instant};

use anyhow::{Result, ensure};
use engine_ecs::{
    Deserializer, EcsConfig, EcsError, Entity, Pipeline, SerializeTarget, Serializer, System, Term,
    Universe, WorldId, pipe,
};
use tracing::{debug, info, warn};

use crate::components::Components;

/// Configuration for the demo tick loop.
#[derive(Debug, Clone)]
pub struct TickConfig {
    /// Entities spawned before the first tick.
    pub entities: usize,
    /// Number of ticks to run.
    pub ticks: u64,
    /// Target ticks per second (0 = as fast as possible).
    pub tick_rate: f64,
    /// Every this many ticks the freeze system toggles `Frozen` on one
    /// entity.
    pub freeze_every: u64,
}

impl Default for TickConfig {
    fn default() -> Self {
        Self {
            entities: 1_000,
            ticks: 60,
            tick_rate: 60.0,
            freeze_every: 10,
        }
    }
}

/// Per-tick counters, kept for the final report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickStats {
    pub bytes: usize,
    pub blocks: usize,
}

/// Source universe, replica universe and the codec pair linking them.
#[derive(Debug)]
pub struct TickLoop {
    tick_id: u64,
    config: TickConfig,
    source: Universe,
    world: WorldId,
    replica: Universe,
    replica_world: WorldId,
    components: Components,
    pipeline: Pipeline,
    serializer: Serializer,
    deserializer: Deserializer,
}

impl TickLoop {
    /// Build both universes and spawn the configured entities in the source.
    ///
    /// # Errors
    ///
    /// Fails if a component or the codec cannot be set up.
    pub fn new(config: TickConfig, ecs: EcsConfig) -> Result<Self> {
        let mut source = Universe::with_config(ecs);
        let world = source.create_default_world();
        let components = Components::define(&mut source, ecs.default_capacity)?;

        let mut replica = Universe::with_config(ecs);
        let replica_world = replica.create_default_world();
        let replica_components = Components::define(&mut replica, ecs.default_capacity)?;
        ensure!(
            replica_components.position == components.position && replica_components.velocity == components.velocity,
            "replica component ids diverged"
        );

        for n in 0..config.entities {
            let entity = source.add_entity(world)?;
            source.add_component(world, components.position, entity)?;
            source.add_component(world, components.velocity, entity)?;
            components.set_position(&mut source, entity, (n as f32, 0.0))?;
            // Every seventh entity stands still and drops out of the deltas
            // after the first one.
            let velocity = if n % 7 == 3 {
                (0.0, 0.0)
            } else {
                ((n % 7) as f32 - 3.0, 1.0)
            };
            components.set_velocity(&mut source, entity, velocity)?;
        }

        let target = SerializeTarget::Components(vec![
            Term::Changed(components.position),
            Term::Changed(components.velocity),
        ]);
        let serializer = Serializer::with_config(target.clone(), source.config())?;
        let deserializer = Deserializer::new(target)?;
        let pipeline = pipe([
            freeze_system(components, config.freeze_every),
            movement_system(&mut source, components)?,
        ]);

        info!(
            entities = config.entities,
            capacity = ecs.default_capacity,
            systems = pipeline.len(),
            "demo universe ready"
        );
        Ok(Self {
            tick_id: 0,
            config,
            source,
            world,
            replica,
            replica_world,
            components,
            pipeline,
            serializer,
            deserializer,
        })
    }

    #[must_use]
    pub fn tick_id(&self) -> u64 {
        self.tick_id
    }

    #[must_use]
    pub fn source(&self) -> &Universe {
        &self.source
    }

    #[must_use]
    pub fn replica(&self) -> &Universe {
        &self.replica
    }

    /// Run one tick and return what crossed the wire.
    ///
    /// # Errors
    ///
    /// Propagates system and codec errors.
    pub fn tick(&mut self) -> Result<TickStats> {
        self.tick_id += 1;
        self.pipeline.run(&mut self.source, self.world)?;

        let entities = self.source.entities(self.world)?.to_vec();
        let bytes = self.serializer.serialize(&mut self.source, &entities)?;
        let size = bytes.len();
        let blocks = self
            .deserializer
            .deserialize(&mut self.replica, self.replica_world, bytes)?;

        debug!(tick_id = self.tick_id, entities = entities.len(), bytes = size, blocks, "tick done");
        Ok(TickStats { bytes: size, blocks })
    }

    /// Run the configured number of ticks, then check the replica.
    ///
    /// # Errors
    ///
    /// Propagates tick errors and fails if any replicated position differs
    /// from the source.
    pub fn run(&mut self) -> Result<()> {
        let budget = (self.config.tick_rate > 0.0).then(|| Duration::from_secs_f64(1.0 / self.config.tick_rate));
        let mut total_bytes = 0;

        info!(ticks = self.config.ticks, tick_rate = self.config.tick_rate, "starting tick loop");
        for _ in 0..self.config.ticks {
            let start = Instant::now();
            let stats = self.tick()?;
            total_bytes += stats.bytes;

            let Some(budget) = budget else {
                continue;
            };
            let elapsed = start.elapsed();
            if elapsed < budget {
                std::thread::sleep(budget - elapsed);
            } else {
                warn!(
                    tick_id = self.tick_id,
                    elapsed_ms = elapsed.as_millis() as u64,
                    budget_ms = budget.as_millis() as u64,
                    "tick exceeded time budget"
                );
            }
        }

        let mismatched = self.mismatched()?;
        info!(ticks = self.tick_id, total_bytes, mismatched, "tick loop complete");
        ensure!(mismatched == 0, "{mismatched} replicated positions differ from the source");
        Ok(())
    }

    /// Number of source entities whose replicated position differs.
    ///
    /// # Errors
    ///
    /// Fails on foreign handles.
    pub fn mismatched(&self) -> Result<usize> {
        let mut mismatched = 0;
        for &entity in self.source.entities(self.world)? {
            let expected = self.components.position(&self.source, entity)?;
            let actual = self.components.position(&self.replica, entity)?;
            if !self.replica.entity_exists(self.replica_world, entity) || expected != actual {
                mismatched += 1;
            }
        }
        Ok(mismatched)
    }
}

/// Toggle `Frozen` on one entity every `every` runs.
fn freeze_system(components: Components, every: u64) -> System {
    let mut runs = 0u64;
    System::new("freeze", move |universe, world| {
        runs += 1;
        if every == 0 || runs % every != 0 {
            return Ok(());
        }
        let entities = universe.entities(world)?;
        if entities.is_empty() {
            return Ok(());
        }
        let entity = entities[(runs / every) as usize % entities.len()];
        if universe.has_component(world, components.frozen, entity) {
            universe.remove_component(world, components.frozen, entity)?;
        } else {
            universe.add_component(world, components.frozen, entity)?;
        }
        Ok(())
    })
}

/// Add velocity to position for every moving entity that is not frozen.
fn movement_system(universe: &mut Universe, components: Components) -> Result<System, EcsError> {
    let moving = universe.define_query([
        Term::With(components.position),
        Term::With(components.velocity),
        Term::Not(components.frozen),
    ])?;
    Ok(System::new("movement", move |universe, world| {
        for entity in universe.query(world, moving)? {
            step(universe, components, entity)?;
        }
        Ok(())
    }))
}

fn step(universe: &mut Universe, components: Components, entity: Entity) -> Result<(), EcsError> {
    let (vx, vy) = components.velocity(universe, entity)?;
    let (x, y) = components.position(universe, entity)?;
    components.set_position(universe, entity, (x + vx, y + vy))
}
