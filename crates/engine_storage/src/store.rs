//! Schema-driven component stores.
//!
//! A [`Store`] turns a [`Schema`] into packed typed buffers sized to a fixed
//! entity capacity and indexed directly by entity id.
//!
//! ## Layout
//!
//! ```text
//! Schema { x: f32, y: f32, a: [ui8, 4], b: [ui8, 2] }, capacity N
//!
//!   x  ─► F32[N]                      (scalar leaf)
//!   y  ─► F32[N]                      (scalar leaf)
//!   a ┐
//!   b ┴► U8[round4(6N)]               (array pool, one per element type)
//!         a[e] = pool[4e .. 4e+4]
//!         b[e] = pool[4N + 2e .. 4N + 2e+2]
//! ```
//!
//! Every buffer is allocated three times: the primary data, a query shadow
//! (last value observed by a change-tracking query) and a serialize shadow
//! (last value emitted by a change-tracking serializer). All three always
//! share one shape and are regrown together.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::ops::Range;

use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::column::{Column, Element, Move};
use crate::error::StorageError;
use crate::schema::{FieldType, PrimitiveType, Schema, join_path};

/// Index of a leaf in [`Store::flatten`] order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldId(pub usize);

/// Width of the index and count integers written for an array field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexWidth {
    U8,
    U16,
    U32,
}

impl IndexWidth {
    /// Pick the narrowest width able to address `length` elements.
    #[must_use]
    pub const fn for_length(length: usize) -> Self {
        if length < u8::MAX as usize {
            IndexWidth::U8
        } else if length < u16::MAX as usize {
            IndexWidth::U16
        } else {
            IndexWidth::U32
        }
    }

    /// Width in bytes.
    #[must_use]
    pub const fn bytes(self) -> usize {
        match self {
            IndexWidth::U8 => 1,
            IndexWidth::U16 => 2,
            IndexWidth::U32 => 4,
        }
    }
}

/// How a leaf maps entity ids onto its buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldLayout {
    /// Element `eid` of a buffer of length `capacity`.
    Scalar,
    /// `length` elements starting at `cursor + eid * length` in a shared pool.
    Array {
        length: usize,
        cursor: usize,
        index_width: IndexWidth,
    },
}

impl FieldLayout {
    /// Range of buffer elements owned by `eid`.
    #[must_use]
    pub fn slot(self, eid: usize) -> Range<usize> {
        match self {
            FieldLayout::Scalar => eid..eid + 1,
            FieldLayout::Array { length, cursor, .. } => {
                let start = cursor + eid * length;
                start..start + length
            }
        }
    }
}

/// Describes one leaf of a store.
#[derive(Debug, Clone)]
pub struct FieldDescriptor {
    path: String,
    ty: PrimitiveType,
    buffer: usize,
    layout: FieldLayout,
    variants: Option<Vec<String>>,
}

impl FieldDescriptor {
    /// Dotted path of the leaf, e.g. `"pos.x"`.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    #[must_use]
    pub fn ty(&self) -> PrimitiveType {
        self.ty
    }

    /// Element width in bytes.
    #[must_use]
    pub fn element_width(&self) -> usize {
        self.ty.size()
    }

    #[must_use]
    pub fn layout(&self) -> FieldLayout {
        self.layout
    }

    #[must_use]
    pub fn is_array(&self) -> bool {
        matches!(self.layout, FieldLayout::Array { .. })
    }

    /// Elements per entity: 1 for scalars, the declared length for arrays.
    #[must_use]
    pub fn length(&self) -> usize {
        match self.layout {
            FieldLayout::Scalar => 1,
            FieldLayout::Array { length, .. } => length,
        }
    }

    /// Index width for array fields, `None` for scalars.
    #[must_use]
    pub fn index_width(&self) -> Option<IndexWidth> {
        match self.layout {
            FieldLayout::Scalar => None,
            FieldLayout::Array { index_width, .. } => Some(index_width),
        }
    }

    /// Variant names for enum fields.
    #[must_use]
    pub fn variants(&self) -> Option<&[String]> {
        self.variants.as_deref()
    }

    /// Range of buffer elements owned by `eid`.
    #[must_use]
    pub fn slot(&self, eid: usize) -> Range<usize> {
        self.layout.slot(eid)
    }
}

/// A primary buffer and its two shadows.
#[derive(Debug, Clone)]
pub struct Buffers {
    pub primary: Column,
    pub query_shadow: Column,
    pub serialize_shadow: Column,
}

impl Buffers {
    fn zeroed(ty: PrimitiveType, len: usize) -> Self {
        Self {
            primary: Column::zeroed(ty, len),
            query_shadow: Column::zeroed(ty, len),
            serialize_shadow: Column::zeroed(ty, len),
        }
    }

    fn regrow(&mut self, new_len: usize, moves: &[Move]) {
        self.primary = self.primary.regrow(new_len, moves);
        self.query_shadow = self.query_shadow.regrow(new_len, moves);
        self.serialize_shadow = self.serialize_shadow.regrow(new_len, moves);
    }
}

/// Array fields of one element type on one schema level.
#[derive(Debug, Clone)]
struct Pool {
    ty: PrimitiveType,
    buffer: usize,
    total_length: usize,
    members: Vec<usize>,
}

/// Packed storage for one component schema.
#[derive(Clone)]
pub struct Store {
    schema: Schema,
    capacity: usize,
    fields: Vec<FieldDescriptor>,
    buffers: Vec<Buffers>,
    pools: Vec<Pool>,
    paths: HashMap<String, FieldId>,
    groups: HashSet<String>,
}

impl Store {
    /// Allocate a store for `schema` holding `capacity` entities.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Schema`] if the schema fails validation.
    pub fn new(schema: Schema, capacity: usize) -> Result<Self, StorageError> {
        schema.validate()?;

        let mut store = Self {
            schema: Schema::new(),
            capacity,
            fields: Vec::new(),
            buffers: Vec::new(),
            pools: Vec::new(),
            paths: HashMap::new(),
            groups: HashSet::new(),
        };
        store.build_level(&schema, "");

        for pool in &mut store.pools {
            pool.buffer = store.buffers.len();
            store.buffers.push(Buffers::zeroed(
                pool.ty,
                pool_len(pool.ty, pool.total_length, capacity),
            ));
            for &member in &pool.members {
                store.fields[member].buffer = pool.buffer;
            }
        }
        store.layout_pools();
        store.schema = schema;

        debug!(
            capacity,
            leaves = store.fields.len(),
            pools = store.pools.len(),
            "store allocated"
        );
        Ok(store)
    }

    fn build_level(&mut self, schema: &Schema, prefix: &str) {
        let mut level_pools: Vec<(PrimitiveType, usize)> = Vec::new();

        for field in schema.fields() {
            let path = join_path(prefix, &field.name);
            match &field.ty {
                FieldType::Scalar(ty) => self.push_scalar(path, *ty, None),
                FieldType::Enum(variants) => {
                    self.push_scalar(path, PrimitiveType::U8, Some(variants.clone()));
                }
                FieldType::Nested(inner) => {
                    self.groups.insert(path.clone());
                    self.build_level(inner, &path);
                }
                FieldType::Array { ty, length } => {
                    let pool = match level_pools.iter().find(|(t, _)| t == ty) {
                        Some(&(_, pool)) => pool,
                        None => {
                            self.pools.push(Pool {
                                ty: *ty,
                                buffer: 0,
                                total_length: 0,
                                members: Vec::new(),
                            });
                            level_pools.push((*ty, self.pools.len() - 1));
                            self.pools.len() - 1
                        }
                    };
                    let id = self.fields.len();
                    self.pools[pool].total_length += length;
                    self.pools[pool].members.push(id);
                    self.paths.insert(path.clone(), FieldId(id));
                    self.fields.push(FieldDescriptor {
                        path,
                        ty: *ty,
                        buffer: 0,
                        layout: FieldLayout::Array {
                            length: *length,
                            cursor: 0,
                            index_width: IndexWidth::for_length(*length),
                        },
                        variants: None,
                    });
                }
            }
        }
    }

    fn push_scalar(&mut self, path: String, ty: PrimitiveType, variants: Option<Vec<String>>) {
        let id = self.fields.len();
        self.paths.insert(path.clone(), FieldId(id));
        self.fields.push(FieldDescriptor {
            path,
            ty,
            buffer: self.buffers.len(),
            layout: FieldLayout::Scalar,
            variants,
        });
        self.buffers.push(Buffers::zeroed(ty, self.capacity));
    }

    /// Recompute every array cursor for the current capacity.
    fn layout_pools(&mut self) {
        for pool in &self.pools {
            let mut cursor = 0;
            for &member in &pool.members {
                if let FieldLayout::Array {
                    length,
                    cursor: ref mut at,
                    ..
                } = self.fields[member].layout
                {
                    *at = cursor;
                    cursor += length * self.capacity;
                }
            }
        }
    }

    /// The schema this store was built from.
    #[must_use]
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Number of entity slots.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Every leaf in depth-first schema order.
    #[must_use]
    pub fn flatten(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    /// Ids of every leaf in [`flatten`](Self::flatten) order.
    pub fn field_ids(&self) -> impl Iterator<Item = FieldId> + '_ {
        (0..self.fields.len()).map(FieldId)
    }

    /// Look up a leaf by dotted path.
    #[must_use]
    pub fn field(&self, path: &str) -> Option<FieldId> {
        self.paths.get(path).copied()
    }

    /// Look up a leaf by dotted path.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::UnknownField`] if no leaf has this path.
    pub fn field_id(&self, path: &str) -> Result<FieldId, StorageError> {
        self.field(path)
            .ok_or_else(|| StorageError::UnknownField(path.to_string()))
    }

    /// The descriptor of a leaf.
    ///
    /// # Panics
    ///
    /// Panics if `field` was not produced by this store.
    #[must_use]
    pub fn descriptor(&self, field: FieldId) -> &FieldDescriptor {
        &self.fields[field.0]
    }

    /// The buffers backing a leaf. Array leaves share their pool's buffers.
    #[must_use]
    pub fn buffers(&self, field: FieldId) -> &Buffers {
        &self.buffers[self.fields[field.0].buffer]
    }

    /// Mutable access to the buffers backing a leaf.
    pub fn buffers_mut(&mut self, field: FieldId) -> &mut Buffers {
        let buffer = self.fields[field.0].buffer;
        &mut self.buffers[buffer]
    }

    /// Grow every buffer and both of its shadows to `new_capacity` entities.
    ///
    /// Existing values keep their entity ids. Array cursors are recomputed,
    /// so pool regions are copied field by field to their new offsets.
    /// Requests that do not grow the store are ignored.
    pub fn resize(&mut self, new_capacity: usize) {
        let old_capacity = self.capacity;
        if new_capacity <= old_capacity {
            return;
        }

        for field in &self.fields {
            if field.layout == FieldLayout::Scalar {
                self.buffers[field.buffer].regrow(
                    new_capacity,
                    &[Move {
                        from: 0,
                        to: 0,
                        len: old_capacity,
                    }],
                );
            }
        }

        for pool in &self.pools {
            let mut moves = Vec::with_capacity(pool.members.len());
            let mut to = 0;
            for &member in &pool.members {
                if let FieldLayout::Array { length, cursor, .. } = self.fields[member].layout {
                    moves.push(Move {
                        from: cursor,
                        to,
                        len: length * old_capacity,
                    });
                    to += length * new_capacity;
                }
            }
            self.buffers[pool.buffer].regrow(
                pool_len(pool.ty, pool.total_length, new_capacity),
                &moves,
            );
        }

        self.capacity = new_capacity;
        self.layout_pools();
        debug!(old_capacity, new_capacity, "store resized");
    }

    /// Zero every leaf's slot for `eid`. Shadows are left untouched.
    pub fn reset(&mut self, eid: usize) {
        if eid >= self.capacity {
            return;
        }
        for field in &self.fields {
            self.buffers[field.buffer]
                .primary
                .zero_range(field.slot(eid));
        }
    }

    /// Compare `eid`'s slot of `field` against the query shadow, advancing
    /// the shadow. Returns `true` if any element changed.
    pub fn sync_query_shadow(&mut self, field: FieldId, eid: usize) -> bool {
        let leaf = &self.fields[field.0];
        let buffers = &mut self.buffers[leaf.buffer];
        buffers
            .primary
            .sync_shadow(&mut buffers.query_shadow, leaf.slot(eid))
    }

    fn checked(&self, field: FieldId, eid: usize) -> Result<&FieldDescriptor, StorageError> {
        let leaf = self
            .fields
            .get(field.0)
            .ok_or_else(|| StorageError::UnknownField(format!("#{}", field.0)))?;
        if eid >= self.capacity {
            return Err(StorageError::OutOfBounds {
                eid,
                capacity: self.capacity,
            });
        }
        Ok(leaf)
    }

    fn checked_scalar(&self, field: FieldId, eid: usize) -> Result<&FieldDescriptor, StorageError> {
        let leaf = self.checked(field, eid)?;
        if leaf.is_array() {
            return Err(StorageError::NotScalar(leaf.path.clone()));
        }
        Ok(leaf)
    }

    fn checked_array(&self, field: FieldId, eid: usize) -> Result<&FieldDescriptor, StorageError> {
        let leaf = self.checked(field, eid)?;
        if !leaf.is_array() {
            return Err(StorageError::NotAnArray(leaf.path.clone()));
        }
        Ok(leaf)
    }

    /// Read a scalar value.
    ///
    /// # Errors
    ///
    /// Fails for unknown fields, array fields, ids beyond capacity and
    /// element types that do not match the field.
    pub fn get<T: Element>(&self, field: FieldId, eid: usize) -> Result<T, StorageError> {
        let leaf = self.checked_scalar(field, eid)?;
        let data = T::slice(&self.buffers[leaf.buffer].primary).ok_or_else(|| mismatch(leaf))?;
        Ok(data[eid])
    }

    /// Write a scalar value.
    ///
    /// # Errors
    ///
    /// Same conditions as [`Store::get`].
    pub fn set<T: Element>(&mut self, field: FieldId, eid: usize, value: T) -> Result<(), StorageError> {
        let buffer = self.checked_scalar(field, eid)?.buffer;
        match T::slice_mut(&mut self.buffers[buffer].primary) {
            Some(data) => {
                data[eid] = value;
                Ok(())
            }
            None => Err(mismatch(&self.fields[field.0])),
        }
    }

    /// Read a byte-backed scalar as a boolean.
    ///
    /// # Errors
    ///
    /// Same conditions as [`Store::get`].
    pub fn get_bool(&self, field: FieldId, eid: usize) -> Result<bool, StorageError> {
        Ok(self.get::<u8>(field, eid)? != 0)
    }

    /// Write a boolean into a byte-backed scalar.
    ///
    /// # Errors
    ///
    /// Same conditions as [`Store::get`].
    pub fn set_bool(&mut self, field: FieldId, eid: usize, value: bool) -> Result<(), StorageError> {
        self.set::<u8>(field, eid, u8::from(value))
    }

    /// Write a numeric value into a scalar, converting to the field type.
    /// `ui8c` fields round and clamp to `0..=255`; `bool` fields store 0/1.
    ///
    /// # Errors
    ///
    /// Fails for unknown fields, array fields and ids beyond capacity.
    pub fn set_number(&mut self, field: FieldId, eid: usize, value: f64) -> Result<(), StorageError> {
        let leaf = self.checked_scalar(field, eid)?;
        let (buffer, ty) = (leaf.buffer, leaf.ty);
        write_number(&mut self.buffers[buffer].primary, ty, eid, value);
        Ok(())
    }

    /// Borrow an entity's slice of an array field.
    ///
    /// # Errors
    ///
    /// Fails for unknown fields, scalar fields, ids beyond capacity and
    /// element types that do not match the field.
    pub fn array<T: Element>(&self, field: FieldId, eid: usize) -> Result<&[T], StorageError> {
        let leaf = self.checked_array(field, eid)?;
        let data = T::slice(&self.buffers[leaf.buffer].primary).ok_or_else(|| mismatch(leaf))?;
        Ok(&data[leaf.slot(eid)])
    }

    /// Mutably borrow an entity's slice of an array field.
    ///
    /// # Errors
    ///
    /// Same conditions as [`Store::array`].
    pub fn array_mut<T: Element>(&mut self, field: FieldId, eid: usize) -> Result<&mut [T], StorageError> {
        let leaf = self.checked_array(field, eid)?;
        let (buffer, slot) = (leaf.buffer, leaf.slot(eid));
        match T::slice_mut(&mut self.buffers[buffer].primary) {
            Some(data) => Ok(&mut data[slot]),
            None => Err(mismatch(&self.fields[field.0])),
        }
    }

    /// The variant name stored in an enum field.
    ///
    /// Returns `None` and logs a warning when the field is not an enum or
    /// holds an index outside the variant list.
    #[must_use]
    pub fn enum_value(&self, field: FieldId, eid: usize) -> Option<&str> {
        let leaf = self.enum_leaf(field, eid)?;
        let variants = leaf.variants.as_deref()?;
        let index = u8::slice(&self.buffers[leaf.buffer].primary)?[eid];
        let variant = variants.get(usize::from(index));
        if variant.is_none() {
            warn!(field = %leaf.path, index, "enum index has no variant");
        }
        variant.map(String::as_str)
    }

    /// Store a variant by name into an enum field.
    ///
    /// Returns `None` and logs a warning when the field is not an enum or the
    /// variant is not part of it; the stored value is left unchanged.
    pub fn set_enum(&mut self, field: FieldId, eid: usize, variant: &str) -> Option<()> {
        let leaf = self.enum_leaf(field, eid)?;
        let buffer = leaf.buffer;
        let position = leaf.variants.as_deref()?.iter().position(|v| v == variant);
        let Some(index) = position.and_then(|i| u8::try_from(i).ok()) else {
            warn!(field = %leaf.path, variant, "value is not part of enum");
            return None;
        };
        u8::slice_mut(&mut self.buffers[buffer].primary)?[eid] = index;
        Some(())
    }

    fn enum_leaf(&self, field: FieldId, eid: usize) -> Option<&FieldDescriptor> {
        let Some(leaf) = self.fields.get(field.0) else {
            warn!(field = field.0, "unknown field");
            return None;
        };
        if leaf.variants.is_none() {
            warn!(field = %leaf.path, "property is not an enum");
            return None;
        }
        if eid >= self.capacity {
            warn!(eid, capacity = self.capacity, "entity outside store capacity");
            return None;
        }
        Some(leaf)
    }

    /// An entity's values as a JSON object shaped like the schema.
    ///
    /// Enum fields render as variant names, `bool` fields as booleans and
    /// array fields as JSON arrays.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::OutOfBounds`] for ids beyond capacity.
    pub fn get_values(&self, eid: usize) -> Result<Value, StorageError> {
        if eid >= self.capacity {
            return Err(StorageError::OutOfBounds {
                eid,
                capacity: self.capacity,
            });
        }
        Ok(self.values_at(&self.schema, "", eid))
    }

    fn values_at(&self, schema: &Schema, prefix: &str, eid: usize) -> Value {
        let mut object = Map::new();
        for field in schema.fields() {
            let path = join_path(prefix, &field.name);
            let value = if let FieldType::Nested(inner) = &field.ty {
                self.values_at(inner, &path, eid)
            } else {
                let Some(&id) = self.paths.get(&path) else {
                    continue;
                };
                self.leaf_value(&self.fields[id.0], eid)
            };
            object.insert(field.name.clone(), value);
        }
        Value::Object(object)
    }

    fn leaf_value(&self, leaf: &FieldDescriptor, eid: usize) -> Value {
        let column = &self.buffers[leaf.buffer].primary;
        match (&leaf.variants, leaf.ty, leaf.layout) {
            (Some(variants), _, _) => u8::slice(column)
                .and_then(|data| variants.get(usize::from(data[eid])))
                .map_or(Value::Null, |v| Value::from(v.as_str())),
            (None, PrimitiveType::Bool, FieldLayout::Scalar) => {
                Value::Bool(u8::slice(column).is_some_and(|data| data[eid] != 0))
            }
            (None, _, FieldLayout::Scalar) => column.json_at(eid),
            (None, _, FieldLayout::Array { .. }) => {
                Value::Array(leaf.slot(eid).map(|i| column.json_at(i)).collect())
            }
        }
    }

    /// Write an entity's values from a JSON object shaped like the schema.
    /// Fields absent from `values` are left unchanged; array values shorter
    /// than the field only overwrite their prefix.
    ///
    /// # Errors
    ///
    /// Fails for unknown keys, ids beyond capacity and values whose JSON
    /// kind does not fit the field.
    pub fn set_values(&mut self, eid: usize, values: &Value) -> Result<(), StorageError> {
        if eid >= self.capacity {
            return Err(StorageError::OutOfBounds {
                eid,
                capacity: self.capacity,
            });
        }
        self.set_values_at("", eid, values)
    }

    fn set_values_at(&mut self, prefix: &str, eid: usize, values: &Value) -> Result<(), StorageError> {
        let object = values.as_object().ok_or_else(|| StorageError::InvalidValue {
            field: prefix.to_string(),
            message: "expected an object".into(),
        })?;

        for (name, value) in object {
            let path = join_path(prefix, name);
            if self.groups.contains(&path) {
                self.set_values_at(&path, eid, value)?;
                continue;
            }
            let id = self.field_id(&path)?;
            self.set_leaf_value(id, eid, value)?;
        }
        Ok(())
    }

    fn set_leaf_value(&mut self, id: FieldId, eid: usize, value: &Value) -> Result<(), StorageError> {
        let leaf = &self.fields[id.0];
        let invalid = |message: &str| StorageError::InvalidValue {
            field: leaf.path.clone(),
            message: message.to_string(),
        };

        match (value, leaf.layout) {
            (Value::String(variant), FieldLayout::Scalar) if leaf.variants.is_some() => {
                // Unknown variants are a soft failure, already logged.
                let _ = self.set_enum(id, eid, variant);
                Ok(())
            }
            (Value::Array(items), FieldLayout::Array { length, .. }) => {
                if items.len() > length {
                    return Err(invalid(&format!(
                        "{} values for an array of length {length}",
                        items.len()
                    )));
                }
                let numbers = items
                    .iter()
                    .map(json_number)
                    .collect::<Option<Vec<_>>>()
                    .ok_or_else(|| invalid("array values must be numbers"))?;
                let (buffer, ty, start) = (leaf.buffer, leaf.ty, leaf.slot(eid).start);
                let column = &mut self.buffers[buffer].primary;
                for (offset, number) in numbers.into_iter().enumerate() {
                    write_number(column, ty, start + offset, number);
                }
                Ok(())
            }
            (_, FieldLayout::Scalar) => {
                let number = json_number(value).ok_or_else(|| invalid("expected a number or boolean"))?;
                let (buffer, ty) = (leaf.buffer, leaf.ty);
                write_number(&mut self.buffers[buffer].primary, ty, eid, number);
                Ok(())
            }
            (_, FieldLayout::Array { .. }) => Err(invalid("expected an array")),
        }
    }
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("capacity", &self.capacity)
            .field("fields", &self.fields)
            .field("buffers", &self.buffers)
            .finish_non_exhaustive()
    }
}

fn mismatch(leaf: &FieldDescriptor) -> StorageError {
    StorageError::TypeMismatch {
        field: leaf.path.clone(),
        actual: leaf.ty.tag(),
    }
}

fn json_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::Bool(b) => Some(f64::from(u8::from(*b))),
        _ => None,
    }
}

fn write_number(column: &mut Column, ty: PrimitiveType, index: usize, value: f64) {
    let value = match ty {
        PrimitiveType::U8Clamped => value.round_ties_even().clamp(0.0, 255.0),
        PrimitiveType::Bool => f64::from(u8::from(value != 0.0)),
        _ => value,
    };
    column.set_number(index, value);
}

/// Element count of an array pool: the byte size is rounded up to a
/// multiple of four.
fn pool_len(ty: PrimitiveType, total_length: usize, capacity: usize) -> usize {
    let bytes = (ty.size() * total_length * capacity).div_ceil(4) * 4;
    bytes / ty.size()
}
