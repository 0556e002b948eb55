//! # engine_storage
//!
//! Packed, schema-driven component storage.
//!
//! This crate provides:
//!
//! - [`Schema`]: declarative component layout, buildable in code or parsed
//!   from JSON.
//! - [`Store`]: typed buffers sized to an entity capacity, with array pools,
//!   nested groups, enum fields and two change-tracking shadows.
//! - [`Column`]: a single flat typed buffer and the [`Element`] trait used
//!   for typed access to it.

pub mod column;
pub mod error;
pub mod schema;
pub mod store;

pub use column::{Column, Element, Move};
pub use error::StorageError;
pub use schema::{FieldDef, FieldType, PrimitiveType, Schema, SchemaError};
pub use store::{Buffers, FieldDescriptor, FieldId, FieldLayout, IndexWidth, Store};
