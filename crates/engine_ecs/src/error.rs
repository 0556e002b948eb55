//! Error types for the ECS and its codec.

use engine_storage::StorageError;
use thiserror::Error;

use crate::component::ComponentId;
use crate::query::QueryId;
use crate::world::WorldId;

/// Errors raised by [`Universe`](crate::Universe) operations.
#[derive(Debug, Error)]
pub enum EcsError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("unknown world: {0:?}")]
    UnknownWorld(WorldId),

    #[error("unknown component: {0:?}")]
    UnknownComponent(ComponentId),

    #[error("unknown query: {0:?}")]
    UnknownQuery(QueryId),
}

/// Errors raised while encoding or decoding a delta buffer.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Property ids are a single byte on the wire.
    #[error("serializer has {0} properties, at most 255 are supported")]
    TooManyProperties(usize),

    #[error("payload exceeds the {max_bytes} byte scratch buffer")]
    BufferOverflow { max_bytes: usize },

    #[error("buffer ended at byte {offset} while reading {what}")]
    UnexpectedEof { offset: usize, what: &'static str },

    #[error("property id {0} is not part of the target")]
    UnknownProperty(u8),

    #[error("index {index} is out of range for array field '{field}' of length {length}")]
    ArrayIndexOutOfRange {
        field: String,
        index: usize,
        length: usize,
    },

    /// `Not` terms select nothing to encode.
    #[error("negated components cannot be serialized")]
    NegatedTerm,

    #[error(transparent)]
    Ecs(#[from] EcsError),
}
