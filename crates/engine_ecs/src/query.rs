//! Incrementally maintained queries.
//!
//! A query is defined once from a list of [`Term`]s and instantiated lazily
//! per world on first use. From then on the world keeps its entity list up
//! to date as components come and go:
//!
//! - entities that start matching are appended and queued for the enter
//!   callback,
//! - entities that stop matching are disabled at once and queued for the exit
//!   callback, but only swapped out of the dense array on the next
//!   invocation or [`Universe::commit_removals`].
//!
//! Queries with [`Term::Changed`] return only the entities whose tracked
//! values differ from the query shadow, advancing the shadow as they go.

use engine_storage::FieldId;
use tracing::{debug, trace};

use crate::component::{ComponentId, ComponentRecord};
use crate::entity::{DenseSet, Entity};
use crate::error::EcsError;
use crate::universe::Universe;
use crate::world::WorldId;

/// Handle to a query definition inside a [`Universe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueryId(pub usize);

/// One condition of a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Term {
    /// The entity must have the component.
    With(ComponentId),
    /// The entity must not have the component.
    Not(ComponentId),
    /// The entity must have the component; only entities whose values
    /// changed since the last invocation are returned.
    Changed(ComponentId),
}

impl Term {
    #[must_use]
    pub fn component(self) -> ComponentId {
        match self {
            Term::With(c) | Term::Not(c) | Term::Changed(c) => c,
        }
    }
}

impl From<ComponentId> for Term {
    fn from(component: ComponentId) -> Self {
        Term::With(component)
    }
}

/// Callback invoked with an entity entering or leaving a query.
pub type QueryCallback = Box<dyn FnMut(Entity)>;

#[derive(Debug, Clone)]
pub(crate) struct QueryDef {
    pub(crate) terms: Vec<Term>,
}

/// Required and forbidden bits within one generation lane.
#[derive(Debug, Clone, Copy)]
struct LaneMask {
    lane: usize,
    positive: u32,
    negative: u32,
}

/// A query's live state within one world.
pub(crate) struct QueryState {
    lanes: Vec<LaneMask>,
    entities: DenseSet,
    enabled: Vec<bool>,
    to_enter: Vec<Entity>,
    to_exit: Vec<Entity>,
    to_remove: Vec<Entity>,
    on_enter: Option<QueryCallback>,
    on_exit: Option<QueryCallback>,
    /// Leaves of the positive and changed components, compared when diffing.
    leaves: Vec<(ComponentId, FieldId)>,
    tracks_changes: bool,
}

impl QueryState {
    pub(crate) fn grow(&mut self, capacity: usize) {
        self.entities.grow(capacity);
        if capacity > self.enabled.len() {
            self.enabled.resize(capacity, false);
        }
    }

    /// Returns `true` if the query's masks mention the component.
    pub(crate) fn touches(&self, record: ComponentRecord) -> bool {
        self.lanes.iter().any(|mask| {
            mask.lane == record.generation && (mask.positive | mask.negative) & record.bitflag != 0
        })
    }

    pub(crate) fn matches(&self, masks: &[Vec<u32>], entity: Entity) -> bool {
        self.lanes.iter().all(|mask| {
            let bits = masks[mask.lane][entity.index()];
            bits & mask.positive == mask.positive && bits & mask.negative == 0
        })
    }

    fn is_enabled(&self, entity: Entity) -> bool {
        self.enabled.get(entity.index()).copied().unwrap_or(false)
    }

    /// Start tracking `entity`. An entity still awaiting compaction is
    /// re-enabled in place. Re-adding an entity whose exit is still queued
    /// cancels that exit instead of queueing an enter.
    pub(crate) fn add(&mut self, entity: Entity) {
        if self.is_enabled(entity) {
            return;
        }
        if entity.index() >= self.enabled.len() {
            self.grow(entity.index() + 1);
        }
        self.enabled[entity.index()] = true;
        self.entities.insert(entity);
        match self.to_exit.iter().position(|&e| e == entity) {
            Some(pending) => {
                self.to_exit.remove(pending);
            }
            None => self.to_enter.push(entity),
        }
    }

    /// Disable `entity` and queue it for compaction. Returns `false` if the
    /// entity was not matched.
    pub(crate) fn remove(&mut self, entity: Entity) -> bool {
        if !self.is_enabled(entity) {
            return false;
        }
        self.enabled[entity.index()] = false;
        self.to_remove.push(entity);
        self.to_exit.push(entity);
        true
    }

    /// Swap-pop every queued entity that is still disabled.
    pub(crate) fn commit(&mut self) {
        for entity in self.to_remove.drain(..) {
            if !self.enabled[entity.index()] {
                self.entities.remove(entity);
            }
        }
    }

    fn drain_callbacks(&mut self) {
        for entity in self.to_enter.drain(..) {
            if let Some(callback) = self.on_enter.as_mut() {
                callback(entity);
            }
        }
        for entity in self.to_exit.drain(..) {
            if let Some(callback) = self.on_exit.as_mut() {
                callback(entity);
            }
        }
    }
}

impl Universe {
    /// Define a query from its terms. Bare [`ComponentId`]s convert to
    /// [`Term::With`].
    ///
    /// Queries made only of [`Term::Not`] terms also pick up entities as
    /// they are added to a world, since a fresh entity has no components.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::UnknownComponent`] for foreign handles.
    pub fn define_query<I, T>(&mut self, terms: I) -> Result<QueryId, EcsError>
    where
        I: IntoIterator<Item = T>,
        T: Into<Term>,
    {
        let terms: Vec<Term> = terms.into_iter().map(Into::into).collect();
        for term in &terms {
            self.store(term.component())?;
        }
        let id = QueryId(self.queries.len());
        self.queries.push(QueryDef { terms });
        Ok(id)
    }

    /// Instantiate `query` in `world` if this is its first use there:
    /// register its components, build its masks and backfill it from the
    /// world's live entities.
    fn ensure_query(&mut self, world: WorldId, query: QueryId) -> Result<(), EcsError> {
        if self.world(world)?.queries.contains_key(&query) {
            return Ok(());
        }
        let terms = self
            .queries
            .get(query.0)
            .ok_or(EcsError::UnknownQuery(query))?
            .terms
            .clone();
        for term in &terms {
            self.register_component(world, term.component())?;
        }

        let w = &mut self.worlds[world.0];
        let mut lanes: Vec<LaneMask> = Vec::new();
        let mut leaves = Vec::new();
        let mut tracks_changes = false;

        for &term in &terms {
            let component = term.component();
            let record = w
                .component_record(component)
                .ok_or(EcsError::UnknownComponent(component))?;
            let found = lanes.iter().position(|mask| mask.lane == record.generation);
            let slot = match found {
                Some(slot) => slot,
                None => {
                    lanes.push(LaneMask {
                        lane: record.generation,
                        positive: 0,
                        negative: 0,
                    });
                    lanes.len() - 1
                }
            };

            match term {
                Term::Not(_) => lanes[slot].negative |= record.bitflag,
                Term::With(_) | Term::Changed(_) => {
                    lanes[slot].positive |= record.bitflag;
                    tracks_changes |= matches!(term, Term::Changed(_));
                    if !leaves.iter().any(|&(c, _)| c == component) {
                        leaves.extend(self.stores[component.0].field_ids().map(|f| (component, f)));
                    }
                }
            }
        }

        let mut state = QueryState {
            lanes,
            entities: DenseSet::with_capacity(w.capacity()),
            enabled: vec![false; w.capacity()],
            to_enter: Vec::new(),
            to_exit: Vec::new(),
            to_remove: Vec::new(),
            on_enter: None,
            on_exit: None,
            leaves,
            tracks_changes,
        };
        for &entity in w.entities() {
            if state.matches(&w.masks, entity) {
                state.add(entity);
            }
        }

        debug!(
            world = world.0,
            query = query.0,
            lanes = state.lanes.len(),
            matched = state.entities.len(),
            tracks_changes,
            "query registered"
        );
        w.queries.insert(query, state);
        Ok(())
    }

    /// Run `query` against `world`.
    ///
    /// Pending enter and exit callbacks fire first, then pending removals are
    /// compacted. Queries with [`Term::Changed`] return the entities whose
    /// tracked values changed since the previous call; others return every
    /// matching entity. Order follows the query's dense array.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::UnknownWorld`] or [`EcsError::UnknownQuery`] for
    /// foreign handles.
    pub fn query(&mut self, world: WorldId, query: QueryId) -> Result<Vec<Entity>, EcsError> {
        self.flush_query(world, query)?;
        let state = self.worlds[world.0]
            .queries
            .get(&query)
            .ok_or(EcsError::UnknownQuery(query))?;

        if !state.tracks_changes {
            return Ok(state.entities.as_slice().to_vec());
        }

        let mut changed = Vec::new();
        for entity in state.entities.iter() {
            let mut dirty = false;
            for &(component, field) in &state.leaves {
                dirty |= self.stores[component.0].sync_query_shadow(field, entity.index());
            }
            if dirty {
                changed.push(entity);
            }
        }
        trace!(world = world.0, query = query.0, changed = changed.len(), "query diffed");
        Ok(changed)
    }

    /// Borrow the live entity list of `query` without diffing.
    ///
    /// Callbacks fire and removals are compacted as in [`Universe::query`].
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::UnknownWorld`] or [`EcsError::UnknownQuery`] for
    /// foreign handles.
    pub fn query_entities(&mut self, world: WorldId, query: QueryId) -> Result<&[Entity], EcsError> {
        self.flush_query(world, query)?;
        self.worlds[world.0]
            .queries
            .get(&query)
            .map(|state| state.entities.as_slice())
            .ok_or(EcsError::UnknownQuery(query))
    }

    fn flush_query(&mut self, world: WorldId, query: QueryId) -> Result<(), EcsError> {
        self.ensure_query(world, query)?;
        let w = &mut self.worlds[world.0];
        let state = w
            .queries
            .get_mut(&query)
            .ok_or(EcsError::UnknownQuery(query))?;
        state.drain_callbacks();
        state.commit();
        w.dirty_queries.remove(&query);
        Ok(())
    }

    /// Set the callback run for each entity that starts matching `query`.
    /// Entities queued before the callback was set are delivered to it on the
    /// next invocation.
    ///
    /// Callbacks report net membership changes between invocations: an
    /// entity that leaves and rejoins before the next invocation fires
    /// neither callback.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::UnknownWorld`] or [`EcsError::UnknownQuery`] for
    /// foreign handles.
    pub fn enter_query(
        &mut self,
        world: WorldId,
        query: QueryId,
        callback: impl FnMut(Entity) + 'static,
    ) -> Result<(), EcsError> {
        self.query_state_mut(world, query)?.on_enter = Some(Box::new(callback));
        Ok(())
    }

    /// Set the callback run for each entity that stops matching `query`.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::UnknownWorld`] or [`EcsError::UnknownQuery`] for
    /// foreign handles.
    pub fn exit_query(
        &mut self,
        world: WorldId,
        query: QueryId,
        callback: impl FnMut(Entity) + 'static,
    ) -> Result<(), EcsError> {
        self.query_state_mut(world, query)?.on_exit = Some(Box::new(callback));
        Ok(())
    }

    fn query_state_mut(&mut self, world: WorldId, query: QueryId) -> Result<&mut QueryState, EcsError> {
        self.ensure_query(world, query)?;
        self.worlds[world.0]
            .queries
            .get_mut(&query)
            .ok_or(EcsError::UnknownQuery(query))
    }

    /// Compact the pending removals of every query in `world`.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::UnknownWorld`] for foreign handles.
    pub fn commit_removals(&mut self, world: WorldId) -> Result<(), EcsError> {
        let w = self.world_mut(world)?;
        let dirty = std::mem::take(&mut w.dirty_queries);
        for query in &dirty {
            if let Some(state) = w.queries.get_mut(query) {
                state.commit();
            }
        }
        if !dirty.is_empty() {
            trace!(world = world.0, queries = dirty.len(), "removals committed");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use engine_storage::{PrimitiveType, Schema};

    use super::*;

    struct Fixture {
        universe: Universe,
        world: WorldId,
        a: ComponentId,
        b: ComponentId,
    }

    fn fixture() -> Fixture {
        let mut universe = Universe::new();
        let world = universe.create_world(16);
        let a = universe
            .define_component_with_capacity(
                Schema::new()
                    .field("x", PrimitiveType::F32)
                    .array("v", PrimitiveType::U8, 2),
                16,
            )
            .unwrap();
        let b = universe.define_component_with_capacity(Schema::new(), 16).unwrap();
        Fixture { universe, world, a, b }
    }

    #[test]
    fn test_query_tracks_component_changes() {
        let Fixture { mut universe, world, a, .. } = fixture();
        let q = universe.define_query([a]).unwrap();
        let e = universe.add_entity(world).unwrap();

        assert!(universe.query(world, q).unwrap().is_empty());
        universe.add_component(world, a, e).unwrap();
        assert_eq!(universe.query(world, q).unwrap(), vec![e]);
        universe.remove_component(world, a, e).unwrap();
        assert!(universe.query(world, q).unwrap().is_empty());
    }

    #[test]
    fn test_query_backfills_existing_entities() {
        let Fixture { mut universe, world, a, .. } = fixture();
        let e0 = universe.add_entity(world).unwrap();
        let e1 = universe.add_entity(world).unwrap();
        universe.add_component(world, a, e0).unwrap();
        universe.add_component(world, a, e1).unwrap();

        let q = universe.define_query([a]).unwrap();
        assert_eq!(universe.query(world, q).unwrap(), vec![e0, e1]);
    }

    #[test]
    fn test_not_terms_exclude() {
        let Fixture { mut universe, world, a, b } = fixture();
        let q = universe.define_query([Term::With(a), Term::Not(b)]).unwrap();
        let e0 = universe.add_entity(world).unwrap();
        let e1 = universe.add_entity(world).unwrap();
        universe.add_component(world, a, e0).unwrap();
        universe.add_component(world, a, e1).unwrap();
        universe.add_component(world, b, e1).unwrap();

        assert_eq!(universe.query(world, q).unwrap(), vec![e0]);

        universe.remove_component(world, b, e1).unwrap();
        assert_eq!(universe.query(world, q).unwrap(), vec![e0, e1]);

        universe.add_component(world, b, e0).unwrap();
        assert_eq!(universe.query(world, q).unwrap(), vec![e1]);
    }

    #[test]
    fn test_changed_query_diffs_scalars_and_arrays() {
        let Fixture { mut universe, world, a, .. } = fixture();
        let q = universe.define_query([Term::Changed(a)]).unwrap();
        let e0 = universe.add_entity(world).unwrap();
        let e1 = universe.add_entity(world).unwrap();
        universe.add_component(world, a, e0).unwrap();
        universe.add_component(world, a, e1).unwrap();

        let store = universe.store_mut(a).unwrap();
        let x = store.field("x").unwrap();
        let v = store.field("v").unwrap();
        store.set(x, e0.index(), 1.0f32).unwrap();
        assert_eq!(universe.query(world, q).unwrap(), vec![e0]);
        assert!(universe.query(world, q).unwrap().is_empty());

        universe.store_mut(a).unwrap().array_mut::<u8>(v, e1.index()).unwrap()[1] = 4;
        assert_eq!(universe.query(world, q).unwrap(), vec![e1]);
        assert!(universe.query(world, q).unwrap().is_empty());
    }

    #[test]
    fn test_removal_is_deferred_until_invocation() {
        let Fixture { mut universe, world, a, .. } = fixture();
        let q = universe.define_query([a]).unwrap();
        let e0 = universe.add_entity(world).unwrap();
        let e1 = universe.add_entity(world).unwrap();
        let e2 = universe.add_entity(world).unwrap();
        for e in [e0, e1, e2] {
            universe.add_component(world, a, e).unwrap();
        }
        assert_eq!(universe.query(world, q).unwrap(), vec![e0, e1, e2]);

        universe.remove_component(world, a, e0).unwrap();
        let w = universe.world(world).unwrap();
        assert!(w.dirty_queries.contains(&q));
        assert_eq!(w.queries[&q].entities.len(), 3);

        universe.commit_removals(world).unwrap();
        let w = universe.world(world).unwrap();
        assert!(w.dirty_queries.is_empty());
        assert_eq!(w.queries[&q].entities.as_slice(), &[e2, e1]);
    }

    #[test]
    fn test_readd_before_commit_reenables_in_place() {
        let Fixture { mut universe, world, a, .. } = fixture();
        let q = universe.define_query([a]).unwrap();
        let e0 = universe.add_entity(world).unwrap();
        let e1 = universe.add_entity(world).unwrap();
        universe.add_component(world, a, e0).unwrap();
        universe.add_component(world, a, e1).unwrap();
        universe.query(world, q).unwrap();

        universe.remove_component(world, a, e0).unwrap();
        universe.add_component(world, a, e0).unwrap();
        assert_eq!(universe.query(world, q).unwrap(), vec![e0, e1]);
    }

    #[test]
    fn test_entity_removal_leaves_queries() {
        let Fixture { mut universe, world, a, .. } = fixture();
        let q = universe.define_query([a]).unwrap();
        let e0 = universe.add_entity(world).unwrap();
        let e1 = universe.add_entity(world).unwrap();
        universe.add_component(world, a, e0).unwrap();
        universe.add_component(world, a, e1).unwrap();
        universe.query(world, q).unwrap();

        universe.remove_entity(world, e0).unwrap();
        assert_eq!(universe.query(world, q).unwrap(), vec![e1]);
    }

    #[test]
    fn test_enter_and_exit_callbacks() {
        let Fixture { mut universe, world, a, .. } = fixture();
        let q = universe.define_query([a]).unwrap();
        let log = Rc::new(RefCell::new(Vec::new()));

        let entered = Rc::clone(&log);
        universe
            .enter_query(world, q, move |e| entered.borrow_mut().push(("enter", e)))
            .unwrap();
        let exited = Rc::clone(&log);
        universe
            .exit_query(world, q, move |e| exited.borrow_mut().push(("exit", e)))
            .unwrap();

        let e0 = universe.add_entity(world).unwrap();
        let e1 = universe.add_entity(world).unwrap();
        universe.add_component(world, a, e0).unwrap();
        universe.add_component(world, a, e1).unwrap();
        assert!(log.borrow().is_empty());

        universe.query(world, q).unwrap();
        assert_eq!(*log.borrow(), vec![("enter", e0), ("enter", e1)]);

        universe.remove_component(world, a, e1).unwrap();
        universe.query(world, q).unwrap();
        assert_eq!(log.borrow().last(), Some(&("exit", e1)));
    }

    #[test]
    fn test_rejoining_before_invocation_fires_no_callbacks() {
        let Fixture { mut universe, world, a, .. } = fixture();
        let q = universe.define_query([a]).unwrap();
        let log = Rc::new(RefCell::new(Vec::new()));
        let entered = Rc::clone(&log);
        universe
            .enter_query(world, q, move |e| entered.borrow_mut().push(("enter", e)))
            .unwrap();
        let exited = Rc::clone(&log);
        universe
            .exit_query(world, q, move |e| exited.borrow_mut().push(("exit", e)))
            .unwrap();

        let e0 = universe.add_entity(world).unwrap();
        universe.add_component(world, a, e0).unwrap();
        universe.query(world, q).unwrap();
        log.borrow_mut().clear();

        universe.remove_component(world, a, e0).unwrap();
        universe.add_component(world, a, e0).unwrap();
        assert_eq!(universe.query(world, q).unwrap(), vec![e0]);
        assert!(log.borrow().is_empty());

        // Same after the removal was already compacted.
        universe.remove_component(world, a, e0).unwrap();
        universe.commit_removals(world).unwrap();
        universe.add_component(world, a, e0).unwrap();
        assert_eq!(universe.query(world, q).unwrap(), vec![e0]);
        assert!(log.borrow().is_empty());

        universe.remove_component(world, a, e0).unwrap();
        assert!(universe.query(world, q).unwrap().is_empty());
        assert_eq!(*log.borrow(), vec![("exit", e0)]);
    }

    #[test]
    fn test_negated_only_query_admits_new_entities() {
        let Fixture { mut universe, world, b, .. } = fixture();
        let q = universe.define_query([Term::Not(b)]).unwrap();
        let e0 = universe.add_entity(world).unwrap();
        assert_eq!(universe.query(world, q).unwrap(), vec![e0]);

        let e1 = universe.add_entity(world).unwrap();
        let e2 = universe.add_entity(world).unwrap();
        universe.add_component(world, b, e2).unwrap();
        assert_eq!(universe.query(world, q).unwrap(), vec![e0, e1]);

        universe.remove_entity(world, e0).unwrap();
        assert_eq!(universe.query(world, q).unwrap(), vec![e1]);
    }

    #[test]
    fn test_query_spanning_two_lanes() {
        let mut universe = Universe::new();
        let world = universe.create_world(8);
        let c: Vec<_> = (0..34)
            .map(|_| universe.define_component_with_capacity(Schema::new(), 8).unwrap())
            .collect();
        universe.register_components(world, &c).unwrap();
        let q = universe
            .define_query([Term::With(c[0]), Term::With(c[33]), Term::Not(c[32])])
            .unwrap();
        let w = universe.world(world).unwrap();
        assert_eq!(w.component_record(c[0]).unwrap().generation, 0);
        assert_eq!(w.component_record(c[32]).unwrap().generation, 1);

        let e: Vec<_> = (0..4).map(|_| universe.add_entity(world).unwrap()).collect();
        // e0: c0 + c33, e1: c0 + c33 + c32, e2: c0 only, e3: c33 only
        for (entity, components) in [
            (e[0], vec![c[0], c[33]]),
            (e[1], vec![c[0], c[33], c[32]]),
            (e[2], vec![c[0]]),
            (e[3], vec![c[33]]),
        ] {
            for component in components {
                universe.add_component(world, component, entity).unwrap();
            }
        }
        assert_eq!(universe.query(world, q).unwrap(), vec![e[0]]);

        universe.remove_component(world, c[32], e[1]).unwrap();
        universe.add_component(world, c[0], e[3]).unwrap();
        universe.add_component(world, c[32], e[0]).unwrap();
        let mut found = universe.query(world, q).unwrap();
        found.sort();
        assert_eq!(found, vec![e[1], e[3]]);
    }

    #[test]
    fn test_query_entities_borrows_dense_array() {
        let Fixture { mut universe, world, a, .. } = fixture();
        let q = universe.define_query([Term::Changed(a)]).unwrap();
        let e0 = universe.add_entity(world).unwrap();
        universe.add_component(world, a, e0).unwrap();
        let store = universe.store_mut(a).unwrap();
        let x = store.field("x").unwrap();
        store.set(x, e0.index(), 2.0f32).unwrap();

        assert_eq!(universe.query_entities(world, q).unwrap(), &[e0]);
        // Borrowing does not consume the first observation.
        assert_eq!(universe.query(world, q).unwrap(), vec![e0]);
    }

    #[test]
    fn test_queries_grow_with_world() {
        let mut universe = Universe::new();
        let world = universe.create_world(4);
        let a = universe.define_component_with_capacity(Schema::new(), 4).unwrap();
        let q = universe.define_query([a]).unwrap();
        universe.query(world, q).unwrap();

        let entities: Vec<_> = (0..10).map(|_| universe.add_entity(world).unwrap()).collect();
        for &e in &entities {
            universe.add_component(world, a, e).unwrap();
        }
        assert_eq!(universe.query(world, q).unwrap(), entities);
    }

    #[test]
    fn test_unknown_query() {
        let Fixture { mut universe, world, .. } = fixture();
        assert!(matches!(
            universe.query(world, QueryId(7)),
            Err(EcsError::UnknownQuery(QueryId(7)))
        ));
    }
}
