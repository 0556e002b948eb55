//! Binary delta codec over flattened component stores.
//!
//! A [`Serializer`] encodes the values of a fixed, ordered list of
//! properties (store leaves) for a list of entities. A [`Deserializer`] with
//! the same target replays such a buffer into a world.
//!
//! ## Wire format
//!
//! All integers are big-endian. One block per property, in canonical order:
//!
//! ```text
//! u8   property id (index in the canonical list)
//! u32  entity count
//! repeat entity count:
//!   u32  entity id
//!   scalar leaf:  value                       (element width)
//!   array leaf:   dirty count                 (index width)
//!                 repeat: index, value        (index width, element width)
//! ```
//!
//! The index width of an array leaf (1, 2 or 4 bytes) follows from its
//! declared length, so both sides must share identical schemas.
//!
//! Properties wrapped in [`Term::Changed`] only emit entities and array
//! elements that differ from the serialize shadow; block headers are written
//! even when nothing changed.

use std::collections::HashMap;

use engine_storage::{FieldId, FieldLayout, IndexWidth, StorageError};
use tracing::{debug, trace};

use crate::component::ComponentId;
use crate::config::EcsConfig;
use crate::entity::Entity;
use crate::error::{CodecError, EcsError};
use crate::query::Term;
use crate::universe::Universe;
use crate::world::WorldId;

/// Most properties a single serializer can address.
pub const MAX_PROPERTIES: usize = 255;

/// What a serializer or deserializer encodes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SerializeTarget {
    /// An explicit component list. [`Term::Changed`] enables diffing for
    /// that component; [`Term::Not`] is rejected.
    Components(Vec<Term>),
    /// Every component registered in a world, in registration order. The
    /// property list follows later registrations.
    World(WorldId),
}

#[derive(Debug, Clone, Copy)]
struct Property {
    component: ComponentId,
    field: FieldId,
    diff: bool,
}

/// The canonical property list, tagged with the registry version it was
/// derived from.
#[derive(Debug, Default)]
struct Canonical {
    version: Option<u64>,
    properties: Vec<Property>,
}

impl Canonical {
    fn refresh(&mut self, target: &SerializeTarget, universe: &Universe) -> Result<(), CodecError> {
        let version = match target {
            SerializeTarget::Components(_) => 0,
            SerializeTarget::World(world) => universe.world(*world)?.registry_version(),
        };
        if self.version == Some(version) {
            return Ok(());
        }

        let terms: Vec<Term> = match target {
            SerializeTarget::Components(terms) => terms.clone(),
            SerializeTarget::World(world) => universe
                .world(*world)?
                .registered_components()
                .iter()
                .map(|&c| Term::With(c))
                .collect(),
        };

        let mut properties = Vec::new();
        for term in terms {
            let diff = match term {
                Term::With(_) => false,
                Term::Changed(_) => true,
                Term::Not(_) => return Err(CodecError::NegatedTerm),
            };
            let component = term.component();
            let store = universe.store(component)?;
            properties.extend(store.field_ids().map(|field| Property {
                component,
                field,
                diff,
            }));
        }
        if properties.len() > MAX_PROPERTIES {
            return Err(CodecError::TooManyProperties(properties.len()));
        }

        debug!(version, properties = properties.len(), "canonical property list built");
        self.version = Some(version);
        self.properties = properties;
        Ok(())
    }
}

/// Encodes entity deltas into a reusable scratch buffer.
#[derive(Debug)]
pub struct Serializer {
    target: SerializeTarget,
    canonical: Canonical,
    buffer: Vec<u8>,
    /// `(property, element)` pairs written by the current call, synced into
    /// the serialize shadow once the whole payload fits.
    written: Vec<(usize, usize)>,
}

impl Serializer {
    /// A serializer writing at most `max_bytes` per call.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::NegatedTerm`] if the target holds a `Not` term.
    pub fn new(target: SerializeTarget, max_bytes: usize) -> Result<Self, CodecError> {
        reject_negated(&target)?;
        Ok(Self {
            target,
            canonical: Canonical::default(),
            buffer: vec![0; max_bytes],
            written: Vec::new(),
        })
    }

    /// A serializer using the configured default scratch size.
    ///
    /// # Errors
    ///
    /// Same as [`Serializer::new`].
    pub fn with_config(target: SerializeTarget, config: &EcsConfig) -> Result<Self, CodecError> {
        Self::new(target, config.default_max_bytes)
    }

    #[must_use]
    pub fn target(&self) -> &SerializeTarget {
        &self.target
    }

    /// Size of the scratch buffer.
    #[must_use]
    pub fn max_bytes(&self) -> usize {
        self.buffer.len()
    }

    /// Encode every property of `entities`. The returned slice borrows the
    /// scratch buffer and is overwritten by the next call.
    ///
    /// Every written value also advances the serialize shadow, but only when
    /// the call succeeds: a failed call leaves every shadow untouched.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::BufferOverflow`] if the payload does not fit,
    /// [`CodecError::TooManyProperties`] if the target flattens to more than
    /// [`MAX_PROPERTIES`] leaves, and [`CodecError::Ecs`] for foreign handles
    /// or entities beyond a store's capacity.
    pub fn serialize(&mut self, universe: &mut Universe, entities: &[Entity]) -> Result<&[u8], CodecError> {
        self.canonical.refresh(&self.target, universe)?;
        self.written.clear();
        let mut out = Writer::new(&mut self.buffer);

        for (pid, property) in self.canonical.properties.iter().enumerate() {
            // Bounded by MAX_PROPERTIES.
            out.put(&[pid as u8])?;
            let count_at = out.reserve(4)?;
            let mut count: u32 = 0;

            let store = universe.store_mut(property.component)?;
            let capacity = store.capacity();
            let leaf = store.descriptor(property.field);
            let (layout, width) = (leaf.layout(), leaf.element_width());
            let buffers = store.buffers_mut(property.field);

            for &entity in entities {
                if entity.index() >= capacity {
                    return Err(EcsError::from(StorageError::OutOfBounds {
                        eid: entity.index(),
                        capacity,
                    })
                    .into());
                }
                let slot = layout.slot(entity.index());
                if property.diff
                    && !slot
                        .clone()
                        .any(|i| buffers.primary.differs_at(&buffers.serialize_shadow, i))
                {
                    continue;
                }

                out.put(&entity.id().to_be_bytes())?;
                match layout {
                    FieldLayout::Scalar => {
                        buffers.primary.write_be(slot.start, out.take(width)?);
                        self.written.push((pid, slot.start));
                    }
                    FieldLayout::Array { index_width, .. } => {
                        let dirty_at = out.reserve(index_width.bytes())?;
                        let mut dirty = 0;
                        for (index, i) in slot.enumerate() {
                            if property.diff && !buffers.primary.differs_at(&buffers.serialize_shadow, i) {
                                continue;
                            }
                            put_index(out.take(index_width.bytes())?, index_width, index);
                            buffers.primary.write_be(i, out.take(width)?);
                            self.written.push((pid, i));
                            dirty += 1;
                        }
                        put_index(out.at(dirty_at, index_width.bytes()), index_width, dirty);
                    }
                }
                count += 1;
            }
            out.at(count_at, 4).copy_from_slice(&count.to_be_bytes());
        }

        let len = out.len();
        for &(pid, i) in &self.written {
            let property = self.canonical.properties[pid];
            let buffers = universe.store_mut(property.component)?.buffers_mut(property.field);
            buffers.serialize_shadow.copy_element(&buffers.primary, i);
        }
        trace!(entities = entities.len(), bytes = len, "serialized");
        Ok(&self.buffer[..len])
    }

    /// Encode the full entity list of the target world.
    ///
    /// Component-list targets have no world of their own and encode nothing
    /// but empty headers here; pass an explicit list to
    /// [`Serializer::serialize`] instead.
    ///
    /// # Errors
    ///
    /// Same as [`Serializer::serialize`].
    pub fn serialize_world(&mut self, universe: &mut Universe) -> Result<&[u8], CodecError> {
        let entities = match self.target {
            SerializeTarget::World(world) => universe.entities(world)?.to_vec(),
            SerializeTarget::Components(_) => Vec::new(),
        };
        self.serialize(universe, &entities)
    }
}

/// Replays encoded deltas into a world.
#[derive(Debug)]
pub struct Deserializer {
    target: SerializeTarget,
    canonical: Canonical,
}

impl Deserializer {
    /// # Errors
    ///
    /// Returns [`CodecError::NegatedTerm`] if the target holds a `Not` term.
    pub fn new(target: SerializeTarget) -> Result<Self, CodecError> {
        reject_negated(&target)?;
        Ok(Self {
            target,
            canonical: Canonical::default(),
        })
    }

    #[must_use]
    pub fn target(&self) -> &SerializeTarget {
        &self.target
    }

    /// Decode every property block in `bytes` into `world` and return the
    /// number of blocks read.
    ///
    /// Entity ids not live in `world` are replaced by freshly allocated
    /// entities; the mapping holds for the rest of the call. The owning
    /// component is added to each entity that lacks it before its values are
    /// written.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::UnexpectedEof`] on truncated input,
    /// [`CodecError::UnknownProperty`] for ids past the canonical list and
    /// [`CodecError::ArrayIndexOutOfRange`] for array indices past the
    /// field's length. Blocks before the failing one stay applied.
    pub fn deserialize(&mut self, universe: &mut Universe, world: WorldId, bytes: &[u8]) -> Result<usize, CodecError> {
        self.canonical.refresh(&self.target, universe)?;
        let mut input = Reader::new(bytes);
        let mut remap: HashMap<u32, Entity> = HashMap::new();
        let mut blocks = 0;

        while !input.is_empty() {
            let pid = input.take(1, "property id")?[0];
            let property = *self
                .canonical
                .properties
                .get(usize::from(pid))
                .ok_or(CodecError::UnknownProperty(pid))?;
            let count = read_u32(input.take(4, "entity count")?);

            for _ in 0..count {
                let wire = read_u32(input.take(4, "entity id")?);
                let entity = match remap.get(&wire) {
                    Some(&entity) => entity,
                    None => {
                        let entity = if universe.entity_exists(world, Entity(wire)) {
                            Entity(wire)
                        } else {
                            universe.add_entity(world)?
                        };
                        remap.insert(wire, entity);
                        entity
                    }
                };
                if !universe.has_component(world, property.component, entity) {
                    universe.add_component(world, property.component, entity)?;
                }

                let store = universe.store_mut(property.component)?;
                let leaf = store.descriptor(property.field);
                let (layout, width) = (leaf.layout(), leaf.element_width());
                let slot = layout.slot(entity.index());

                match layout {
                    FieldLayout::Scalar => {
                        let value = input.take(width, "value")?;
                        store.buffers_mut(property.field).primary.read_be(slot.start, value);
                    }
                    FieldLayout::Array { length, index_width, .. } => {
                        let dirty = read_index(input.take(index_width.bytes(), "dirty count")?, index_width);
                        for _ in 0..dirty {
                            let index = read_index(input.take(index_width.bytes(), "array index")?, index_width);
                            if index >= length {
                                return Err(CodecError::ArrayIndexOutOfRange {
                                    field: store.descriptor(property.field).path().to_string(),
                                    index,
                                    length,
                                });
                            }
                            let value = input.take(width, "value")?;
                            store.buffers_mut(property.field).primary.read_be(slot.start + index, value);
                        }
                    }
                }
            }
            blocks += 1;
        }

        trace!(world = world.0, blocks, bytes = bytes.len(), "deserialized");
        Ok(blocks)
    }
}

fn reject_negated(target: &SerializeTarget) -> Result<(), CodecError> {
    match target {
        SerializeTarget::Components(terms) if terms.iter().any(|t| matches!(t, Term::Not(_))) => {
            Err(CodecError::NegatedTerm)
        }
        _ => Ok(()),
    }
}

/// Cursor over the serializer's scratch buffer.
struct Writer<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> Writer<'a> {
    fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn len(&self) -> usize {
        self.pos
    }

    /// Claim the next `n` bytes.
    fn take(&mut self, n: usize) -> Result<&mut [u8], CodecError> {
        let end = self.pos + n;
        if end > self.buf.len() {
            return Err(CodecError::BufferOverflow {
                max_bytes: self.buf.len(),
            });
        }
        let start = self.pos;
        self.pos = end;
        Ok(&mut self.buf[start..end])
    }

    fn put(&mut self, bytes: &[u8]) -> Result<(), CodecError> {
        self.take(bytes.len())?.copy_from_slice(bytes);
        Ok(())
    }

    /// Skip `n` bytes to be patched later; returns their offset.
    fn reserve(&mut self, n: usize) -> Result<usize, CodecError> {
        let at = self.pos;
        self.take(n)?;
        Ok(at)
    }

    /// A previously reserved region.
    fn at(&mut self, offset: usize, n: usize) -> &mut [u8] {
        &mut self.buf[offset..offset + n]
    }
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn is_empty(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    fn take(&mut self, n: usize, what: &'static str) -> Result<&'a [u8], CodecError> {
        let end = self.pos + n;
        if end > self.bytes.len() {
            return Err(CodecError::UnexpectedEof {
                offset: self.pos,
                what,
            });
        }
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }
}

fn read_u32(bytes: &[u8]) -> u32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(bytes);
    u32::from_be_bytes(raw)
}

fn put_index(out: &mut [u8], width: IndexWidth, value: usize) {
    // Values never exceed the field length, which the width was chosen for.
    match width {
        IndexWidth::U8 => out.copy_from_slice(&(value as u8).to_be_bytes()),
        IndexWidth::U16 => out.copy_from_slice(&(value as u16).to_be_bytes()),
        IndexWidth::U32 => out.copy_from_slice(&(value as u32).to_be_bytes()),
    }
}

fn read_index(bytes: &[u8], width: IndexWidth) -> usize {
    match width {
        IndexWidth::U8 => usize::from(bytes[0]),
        IndexWidth::U16 => usize::from(u16::from_be_bytes([bytes[0], bytes[1]])),
        IndexWidth::U32 => read_u32(bytes) as usize,
    }
}
