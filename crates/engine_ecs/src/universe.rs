//! The owner of every world, store and query definition.
//!
//! A [`Universe`] replaces process-wide state: the entity id cursor and free
//! list, the component stores and the query definitions all live here, and
//! callers refer to them through `Copy` handles. Operations are grouped by
//! concern in the [`world`](crate::world), [`component`](crate::component)
//! and [`query`](crate::query) modules.
//!
//! A `Universe` is not synchronized. It can be moved between threads, but
//! every mutation needs `&mut` access.

use engine_storage::Store;

use crate::component::ComponentId;
use crate::config::EcsConfig;
use crate::entity::EntityAllocator;
use crate::error::EcsError;
use crate::query::QueryDef;
use crate::world::{World, WorldId};

/// Worlds, component stores, query definitions and the shared entity
/// allocator.
#[derive(Default)]
pub struct Universe {
    pub(crate) config: EcsConfig,
    pub(crate) allocator: EntityAllocator,
    pub(crate) stores: Vec<Store>,
    pub(crate) worlds: Vec<World>,
    pub(crate) queries: Vec<QueryDef>,
}

impl Universe {
    /// An empty universe with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_config(config: EcsConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn config(&self) -> &EcsConfig {
        &self.config
    }

    /// The entity allocator shared by every world.
    #[must_use]
    pub fn allocator(&self) -> &EntityAllocator {
        &self.allocator
    }

    /// Look up a world.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::UnknownWorld`] for handles from another universe.
    pub fn world(&self, world: WorldId) -> Result<&World, EcsError> {
        self.worlds.get(world.0).ok_or(EcsError::UnknownWorld(world))
    }

    pub(crate) fn world_mut(&mut self, world: WorldId) -> Result<&mut World, EcsError> {
        self.worlds.get_mut(world.0).ok_or(EcsError::UnknownWorld(world))
    }

    /// The store backing a component.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::UnknownComponent`] for handles from another universe.
    pub fn store(&self, component: ComponentId) -> Result<&Store, EcsError> {
        self.stores
            .get(component.0)
            .ok_or(EcsError::UnknownComponent(component))
    }

    /// Mutable access to the store backing a component, for writing values.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::UnknownComponent`] for handles from another universe.
    pub fn store_mut(&mut self, component: ComponentId) -> Result<&mut Store, EcsError> {
        self.stores
            .get_mut(component.0)
            .ok_or(EcsError::UnknownComponent(component))
    }

    /// Number of worlds created so far.
    #[must_use]
    pub fn world_count(&self) -> usize {
        self.worlds.len()
    }
}

impl std::fmt::Debug for Universe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Universe")
            .field("config", &self.config)
            .field("allocator", &self.allocator)
            .field("stores", &self.stores.len())
            .field("worlds", &self.worlds.len())
            .field("queries", &self.queries.len())
            .finish()
    }
}
