//! Storage-layer error types.

use crate::schema::SchemaError;

/// Errors raised by [`Store`](crate::Store) construction and field access.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The schema failed validation.
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// No leaf exists at the given path.
    #[error("unknown field: {0}")]
    UnknownField(String),

    /// The requested element type does not match the field's buffer.
    #[error("field '{field}' stores {actual} elements")]
    TypeMismatch { field: String, actual: &'static str },

    /// A slice accessor was used on a scalar field.
    #[error("field '{0}' is not an array field")]
    NotAnArray(String),

    /// A scalar accessor was used on an array field.
    #[error("field '{0}' is an array field")]
    NotScalar(String),

    /// The entity id does not fit in the store.
    #[error("entity {eid} is outside store capacity {capacity}")]
    OutOfBounds { eid: usize, capacity: usize },

    /// A value supplied to [`Store::set_values`](crate::Store::set_values)
    /// does not fit the field.
    #[error("invalid value for field '{field}': {message}")]
    InvalidValue { field: String, message: String },
}
