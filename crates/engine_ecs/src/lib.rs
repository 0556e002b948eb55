//! # engine_ecs
//!
//! A bitmask entity-component system over packed, schema-driven stores.
//!
//! This crate provides:
//!
//! - [`Universe`]: owns the entity allocator, every component store, every
//!   world and every query definition.
//! - [`World`]: a set of live entities with per-entity component bitmasks
//!   split into 32-bit generation lanes.
//! - Components ([`ComponentId`]): registered lazily per world, backed by an
//!   [`engine_storage::Store`].
//! - Queries ([`QueryId`], [`Term`]): incrementally maintained entity lists
//!   with `Not` and `Changed` modifiers, enter/exit callbacks and deferred
//!   removal.
//! - [`Serializer`] and [`Deserializer`]: a big-endian binary delta codec.
//! - [`System`] and [`pipe`]: named update functions composed left to right.

pub mod component;
pub mod config;
pub mod entity;
pub mod error;
pub mod query;
pub mod serialize;
pub mod system;
pub mod universe;
pub mod world;

pub use component::{ComponentId, ComponentRecord};
pub use config::{DEFAULT_CAPACITY, DEFAULT_MAX_BYTES, EcsConfig};
pub use entity::{DenseSet, Entity, EntityAllocator};
pub use error::{CodecError, EcsError};
pub use query::{QueryCallback, QueryId, Term};
pub use serialize::{Deserializer, MAX_PROPERTIES, SerializeTarget, Serializer};
pub use system::{Pipeline, System, pipe};
pub use universe::Universe;
pub use world::{World, WorldId};
