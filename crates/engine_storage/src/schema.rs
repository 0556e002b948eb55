//! Component schemas: the declarative description a [`Store`](crate::Store)
//! is built from.
//!
//! A schema is an ordered list of named fields. Each field is one of:
//!
//! - a primitive tag (`f32`, `ui8`, ...) producing a scalar leaf,
//! - a fixed-length array `[tag, length]`,
//! - a nested schema, stored as a recursive sub-store,
//! - an enum: a list of variant names stored as a `ui8` index.
//!
//! Schemas can be assembled with the builder methods or parsed from JSON in
//! the object-literal form:
//!
//! ```text
//! {
//!   "x": "f32",
//!   "slots": ["ui8", 4],
//!   "pos": { "x": "f32", "y": "f32" },
//!   "mode": ["idle", "walk", "run"]
//! }
//! ```
//!
//! Field order is significant: it fixes the flattened leaf order and
//! therefore the property ids on the wire.

use std::collections::HashSet;
use std::fmt;

use serde_json::{Map, Value};
use thiserror::Error;

/// Errors raised while validating or parsing a schema.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("array field '{0}' must declare a length greater than zero")]
    MissingArrayLength(String),
    #[error("unknown primitive type '{tag}' on field '{field}'")]
    UnknownType { field: String, tag: String },
    #[error("invalid field '{field}': {message}")]
    InvalidField { field: String, message: String },
    #[error("duplicate field: {0}")]
    DuplicateField(String),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// The primitive element types a leaf buffer can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveType {
    Bool,
    I8,
    U8,
    /// Unsigned byte whose numeric writes clamp to `0..=255`.
    U8Clamped,
    I16,
    U16,
    I32,
    U32,
    F32,
    F64,
}

impl PrimitiveType {
    /// Every primitive, in tag order.
    pub const ALL: [PrimitiveType; 10] = [
        PrimitiveType::Bool,
        PrimitiveType::I8,
        PrimitiveType::U8,
        PrimitiveType::U8Clamped,
        PrimitiveType::I16,
        PrimitiveType::U16,
        PrimitiveType::I32,
        PrimitiveType::U32,
        PrimitiveType::F32,
        PrimitiveType::F64,
    ];

    /// Resolve a schema tag such as `"ui16"`.
    #[must_use]
    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|ty| ty.tag() == tag)
    }

    /// The schema tag for this type.
    #[must_use]
    pub const fn tag(self) -> &'static str {
        match self {
            PrimitiveType::Bool => "bool",
            PrimitiveType::I8 => "i8",
            PrimitiveType::U8 => "ui8",
            PrimitiveType::U8Clamped => "ui8c",
            PrimitiveType::I16 => "i16",
            PrimitiveType::U16 => "ui16",
            PrimitiveType::I32 => "i32",
            PrimitiveType::U32 => "ui32",
            PrimitiveType::F32 => "f32",
            PrimitiveType::F64 => "f64",
        }
    }

    /// Size of one element in bytes.
    #[must_use]
    pub const fn size(self) -> usize {
        match self {
            PrimitiveType::Bool
            | PrimitiveType::I8
            | PrimitiveType::U8
            | PrimitiveType::U8Clamped => 1,
            PrimitiveType::I16 | PrimitiveType::U16 => 2,
            PrimitiveType::I32 | PrimitiveType::U32 | PrimitiveType::F32 => 4,
            PrimitiveType::F64 => 8,
        }
    }
}

impl fmt::Display for PrimitiveType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// The shape of a single schema field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldType {
    /// One value per entity.
    Scalar(PrimitiveType),
    /// `length` values per entity, packed into a pool shared with the other
    /// array fields of the same element type.
    Array { ty: PrimitiveType, length: usize },
    /// A nested group of fields.
    Nested(Schema),
    /// A `ui8` index into a fixed list of variant names.
    Enum(Vec<String>),
}

/// A named field of a [`Schema`].
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDef {
    pub name: String,
    pub ty: FieldType,
}

/// An ordered set of field definitions.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Schema {
    fields: Vec<FieldDef>,
}

impl Schema {
    /// An empty schema. Components without fields act as tags.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a scalar field.
    #[must_use]
    pub fn field(self, name: impl Into<String>, ty: PrimitiveType) -> Self {
        self.with(name, FieldType::Scalar(ty))
    }

    /// Add a fixed-length array field.
    #[must_use]
    pub fn array(self, name: impl Into<String>, ty: PrimitiveType, length: usize) -> Self {
        self.with(name, FieldType::Array { ty, length })
    }

    /// Add a nested group of fields.
    #[must_use]
    pub fn nested(self, name: impl Into<String>, schema: Schema) -> Self {
        self.with(name, FieldType::Nested(schema))
    }

    /// Add an enum field with the given variant names.
    #[must_use]
    pub fn enumeration<I, S>(self, name: impl Into<String>, variants: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let variants = variants.into_iter().map(Into::into).collect();
        self.with(name, FieldType::Enum(variants))
    }

    fn with(mut self, name: impl Into<String>, ty: FieldType) -> Self {
        self.fields.push(FieldDef {
            name: name.into(),
            ty,
        });
        self
    }

    /// The fields of this schema level, in declaration order.
    #[must_use]
    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    /// Look up a field of this level by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Returns `true` if the schema has no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Check the structural rules the builder cannot enforce.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::MissingArrayLength`] for zero-length arrays,
    /// [`SchemaError::DuplicateField`] for repeated names on one level and
    /// [`SchemaError::InvalidField`] for empty or oversized enums.
    pub fn validate(&self) -> Result<(), SchemaError> {
        self.validate_level("")
    }

    fn validate_level(&self, prefix: &str) -> Result<(), SchemaError> {
        let mut seen = HashSet::new();
        for field in &self.fields {
            let path = join_path(prefix, &field.name);
            if field.name.is_empty() || field.name.contains('.') {
                return Err(SchemaError::InvalidField {
                    field: path,
                    message: "field names must be non-empty and must not contain '.'".into(),
                });
            }
            if !seen.insert(field.name.as_str()) {
                return Err(SchemaError::DuplicateField(path));
            }
            match &field.ty {
                FieldType::Scalar(_) => {}
                FieldType::Array { length, .. } => {
                    if *length == 0 {
                        return Err(SchemaError::MissingArrayLength(path));
                    }
                }
                FieldType::Nested(inner) => inner.validate_level(&path)?,
                FieldType::Enum(variants) => {
                    if variants.is_empty() || variants.len() > usize::from(u8::MAX) + 1 {
                        return Err(SchemaError::InvalidField {
                            field: path,
                            message: format!("enum must have 1..=256 variants, got {}", variants.len()),
                        });
                    }
                }
            }
        }
        Ok(())
    }

    /// Parse a schema from JSON text.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::Json`] on malformed JSON and the errors of
    /// [`Schema::from_json`] otherwise.
    pub fn from_json_str(source: &str) -> Result<Self, SchemaError> {
        let value: Value = serde_json::from_str(source)?;
        Self::from_json(&value)
    }

    /// Parse a schema from its JSON object form.
    ///
    /// # Errors
    ///
    /// Returns a [`SchemaError`] for unknown tags, arrays without a length
    /// and values that are not a tag, array, enum or object.
    pub fn from_json(value: &Value) -> Result<Self, SchemaError> {
        let object = value.as_object().ok_or_else(|| SchemaError::InvalidField {
            field: String::new(),
            message: "schema root must be an object".into(),
        })?;
        let schema = Self::from_object("", object)?;
        schema.validate()?;
        Ok(schema)
    }

    fn from_object(prefix: &str, object: &Map<String, Value>) -> Result<Self, SchemaError> {
        let mut schema = Schema::new();
        for (name, value) in object {
            let path = join_path(prefix, name);
            let ty = parse_field(&path, value)?;
            schema = schema.with(name.clone(), ty);
        }
        Ok(schema)
    }

    /// Render the schema back to its JSON object form.
    #[must_use]
    pub fn to_json(&self) -> Value {
        let mut object = Map::new();
        for field in &self.fields {
            let value = match &field.ty {
                FieldType::Scalar(ty) => Value::from(ty.tag()),
                FieldType::Array { ty, length } => {
                    Value::Array(vec![Value::from(ty.tag()), Value::from(*length)])
                }
                FieldType::Nested(inner) => inner.to_json(),
                FieldType::Enum(variants) => {
                    Value::Array(variants.iter().map(|v| Value::from(v.as_str())).collect())
                }
            };
            object.insert(field.name.clone(), value);
        }
        Value::Object(object)
    }
}

fn parse_field(path: &str, value: &Value) -> Result<FieldType, SchemaError> {
    match value {
        Value::String(tag) => PrimitiveType::from_tag(tag)
            .map(FieldType::Scalar)
            .ok_or_else(|| SchemaError::UnknownType {
                field: path.to_string(),
                tag: tag.clone(),
            }),
        Value::Object(object) => Ok(FieldType::Nested(Schema::from_object(path, object)?)),
        Value::Array(items) => parse_array_field(path, items),
        other => Err(SchemaError::InvalidField {
            field: path.to_string(),
            message: format!("expected a type tag, array or object, got {other}"),
        }),
    }
}

fn parse_array_field(path: &str, items: &[Value]) -> Result<FieldType, SchemaError> {
    // Long form: [{ "type": "f32", "length": 4 }]
    if let [Value::Object(entry)] = items {
        let tag = entry.get("type").and_then(Value::as_str).unwrap_or_default();
        let length = entry.get("length").and_then(Value::as_u64);
        return array_type(path, tag, length);
    }

    match items {
        [Value::String(tag), rest @ ..]
            if rest.iter().all(Value::is_number) && (!rest.is_empty() || is_tag(tag)) =>
        {
            if rest.len() > 1 {
                return Err(SchemaError::InvalidField {
                    field: path.to_string(),
                    message: "array fields take exactly one length".into(),
                });
            }
            array_type(path, tag, rest.first().and_then(Value::as_u64))
        }
        _ if !items.is_empty() && items.iter().all(Value::is_string) => Ok(FieldType::Enum(
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect(),
        )),
        _ => Err(SchemaError::InvalidField {
            field: path.to_string(),
            message: "expected [tag, length] or a list of enum variants".into(),
        }),
    }
}

fn array_type(path: &str, tag: &str, length: Option<u64>) -> Result<FieldType, SchemaError> {
    let ty = PrimitiveType::from_tag(tag).ok_or_else(|| SchemaError::UnknownType {
        field: path.to_string(),
        tag: tag.to_string(),
    })?;
    let length = match length.and_then(|l| usize::try_from(l).ok()) {
        Some(length) if length > 0 => length,
        _ => return Err(SchemaError::MissingArrayLength(path.to_string())),
    };
    Ok(FieldType::Array { ty, length })
}

fn is_tag(tag: &str) -> bool {
    PrimitiveType::from_tag(tag).is_some()
}

pub(crate) fn join_path(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}.{name}")
    }
}
