//! Systems and pipelines.
//!
//! A [`System`] wraps an update function. Running it calls the update with
//! the universe and a world, then commits the world's pending query removals
//! so the next system sees compacted query lists. [`pipe`] chains systems
//! left to right over the same world.

use tracing::{debug, trace_span};

use crate::error::EcsError;
use crate::universe::Universe;
use crate::world::WorldId;

type Update = Box<dyn FnMut(&mut Universe, WorldId) -> Result<(), EcsError>>;

/// A named update function.
pub struct System {
    name: String,
    update: Update,
}

impl System {
    /// Wrap `update` as a system called `name`.
    pub fn new<F>(name: impl Into<String>, update: F) -> Self
    where
        F: FnMut(&mut Universe, WorldId) -> Result<(), EcsError> + 'static,
    {
        Self {
            name: name.into(),
            update: Box::new(update),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run the update, then commit pending query removals in `world`.
    ///
    /// # Errors
    ///
    /// Propagates the update's error; removals are not committed in that
    /// case.
    pub fn run(&mut self, universe: &mut Universe, world: WorldId) -> Result<(), EcsError> {
        let _span = trace_span!("system", name = %self.name, world = world.0).entered();
        (self.update)(universe, world)?;
        universe.commit_removals(world)
    }
}

impl std::fmt::Debug for System {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("System").field("name", &self.name).finish_non_exhaustive()
    }
}

/// Systems run in sequence over one world.
#[derive(Debug, Default)]
pub struct Pipeline {
    systems: Vec<System>,
}

impl Pipeline {
    /// Run every system in order, stopping at the first error.
    ///
    /// # Errors
    ///
    /// Returns the first system error.
    pub fn run(&mut self, universe: &mut Universe, world: WorldId) -> Result<(), EcsError> {
        self.systems
            .iter_mut()
            .try_for_each(|system| system.run(universe, world))
    }

    /// Append a system to the end of the pipeline.
    #[must_use]
    pub fn then(mut self, system: System) -> Self {
        self.systems.push(system);
        self
    }

    /// System names, in run order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.systems.iter().map(System::name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.systems.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.systems.is_empty()
    }
}

/// Compose systems left to right.
pub fn pipe(systems: impl IntoIterator<Item = System>) -> Pipeline {
    let pipeline = Pipeline {
        systems: systems.into_iter().collect(),
    };
    debug!(systems = pipeline.len(), "pipeline built");
    pipeline
}
