//! Typed property columns.
//!
//! One column exists per (group type, property) pair. Rows are addressed by
//! the dense group index, so a column is a sparse array over the group id
//! space: storage is split into chunks of [`COLUMN_CHUNK`] rows, a chunk is
//! allocated on its first write and released when its last row is removed.
//!
//! The concrete representation is chosen once from the property's
//! [`ValueType`] by [`make_column`]:
//!
//! * boolean and integer types → [`ScalarColumn`] over the native primitive,
//! * `float` / `double` → [`ScalarColumn`] over `f32` / `f64`,
//! * enums → [`EnumColumn`] storing `u32` ordinals,
//! * everything else → [`ReferenceColumn`] storing owned values.
//!
//! Every row also records the time of its last write.

use std::sync::Arc;

use crate::engine::error::IncompatibleValueError;
use crate::engine::property::{EnumType, PropertyValue, ValueType};
use crate::engine::types::{
    chunk_position, GroupPropertyId, Time, COLUMN_CHUNK, WORDS_PER_CHUNK, WORD_BITS,
};


/// Capability shared by every column representation.
pub trait PropertyColumn: Send + Sync {
    /// Property stored by this column.
    fn property(&self) -> GroupPropertyId;

    /// Static type of stored values.
    fn value_type(&self) -> &ValueType;

    /// Number of rows holding an explicit value.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Explicit value at `index`; `None` when the row was never written.
    fn get(&self, index: usize) -> Option<PropertyValue>;

    /// Time of the last write to `index`.
    fn time_of(&self, index: usize) -> Option<Time>;

    /// Writes `value` at `index`, returning the previous explicit value.
    fn set(
        &mut self,
        index: usize,
        value: &PropertyValue,
        time: Time,
    ) -> Result<Option<PropertyValue>, IncompatibleValueError>;

    /// Clears `index`, returning the value it held.
    fn remove(&mut self, index: usize) -> Option<PropertyValue>;
}

/// Chunk of rows.
///
/// Invariant: `count` equals the number of set bits in `occupied`, and only
/// occupied rows hold meaningful `values` / `times`.
#[derive(Debug)]
struct Chunk<T> {
    values: Box<[T]>,
    times: Box<[Time]>,
    occupied: [u64; WORDS_PER_CHUNK],
    count: usize,
}

impl<T: Clone + Default> Chunk<T> {
    fn new() -> Self {
        Self {
            values: vec![T::default(); COLUMN_CHUNK].into_boxed_slice(),
            times: vec![0.0; COLUMN_CHUNK].into_boxed_slice(),
            occupied: [0; WORDS_PER_CHUNK],
            count: 0,
        }
    }

    #[inline]
    fn is_occupied(&self, row: usize) -> bool {
        (self.occupied[row / WORD_BITS] >> (row % WORD_BITS)) & 1 == 1
    }

    #[inline]
    fn mark(&mut self, row: usize) {
        self.occupied[row / WORD_BITS] |= 1u64 << (row % WORD_BITS);
    }

    #[inline]
    fn unmark(&mut self, row: usize) {
        self.occupied[row / WORD_BITS] &= !(1u64 << (row % WORD_BITS));
    }
}

/// Sparse chunked storage with per-row write times.
#[derive(Debug)]
pub struct Slots<T> {
    chunks: Vec<Option<Box<Chunk<T>>>>,
    length: usize,
}

impl<T> Default for Slots<T> {
    fn default() -> Self {
        Self { chunks: Vec::new(), length: 0 }
    }
}

impl<T: Clone + Default> Slots<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of occupied rows.
    #[inline]
    pub fn len(&self) -> usize {
        self.length
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Number of chunks currently allocated.
    pub fn allocated_chunks(&self) -> usize {
        self.chunks.iter().filter(|c| c.is_some()).count()
    }

    #[inline]
    fn chunk(&self, index: usize) -> Option<(&Chunk<T>, usize)> {
        let (chunk, row) = chunk_position(index);
        let chunk = self.chunks.get(chunk)?.as_deref()?;
        if chunk.is_occupied(row) { Some((chunk, row)) } else { None }
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        self.chunk(index).map(|(chunk, row)| &chunk.values[row])
    }

    pub fn time_of(&self, index: usize) -> Option<Time> {
        self.chunk(index).map(|(chunk, row)| chunk.times[row])
    }

    /// Stores `value` at `index`, returning the previous value if the row was
    /// occupied.
    pub fn insert(&mut self, index: usize, value: T, time: Time) -> Option<T> {
        let (chunk_index, row) = chunk_position(index);
        if self.chunks.len() <= chunk_index {
            self.chunks.resize_with(chunk_index + 1, || None);
        }
        let chunk = self.chunks[chunk_index].get_or_insert_with(|| Box::new(Chunk::new()));

        chunk.times[row] = time;
        let previous = std::mem::replace(&mut chunk.values[row], value);
        if chunk.is_occupied(row) {
            return Some(previous);
        }
        chunk.mark(row);
        chunk.count += 1;
        self.length += 1;
        None
    }

    /// Clears `index`. Releases the chunk once it holds no rows.
    pub fn remove(&mut self, index: usize) -> Option<T> {
        let (chunk_index, row) = chunk_position(index);
        let slot = self.chunks.get_mut(chunk_index)?;
        let chunk = slot.as_deref_mut()?;
        if !chunk.is_occupied(row) {
            return None;
        }

        chunk.unmark(row);
        chunk.count -= 1;
        let value = std::mem::take(&mut chunk.values[row]);
        self.length -= 1;

        if chunk.count == 0 {
            *slot = None;
            while matches!(self.chunks.last(), Some(None)) {
                self.chunks.pop();
            }
        }
        Some(value)
    }
}

/// Primitive representable in a [`ScalarColumn`].
pub trait Scalar: Copy + Default + Send + Sync + 'static {
    fn from_value(value: &PropertyValue) -> Option<Self>;
    fn into_value(self) -> PropertyValue;
}

macro_rules! scalar {
    ($ty:ty, $variant:ident) => {
        impl Scalar for $ty {
            #[inline]
            fn from_value(value: &PropertyValue) -> Option<Self> {
                match value {
                    PropertyValue::$variant(v) => Some(*v),
                    _ => None,
                }
            }

            #[inline]
            fn into_value(self) -> PropertyValue {
                PropertyValue::$variant(self)
            }
        }
    };
}

scalar!(bool, Boolean);
scalar!(i8, Byte);
scalar!(i16, Short);
scalar!(i32, Int);
scalar!(i64, Long);
scalar!(f32, Float);
scalar!(f64, Double);

/// Column over a primitive type.
pub struct ScalarColumn<T> {
    property: GroupPropertyId,
    value_type: ValueType,
    slots: Slots<T>,
}

impl<T: Scalar> ScalarColumn<T> {
    pub fn new(property: GroupPropertyId, value_type: ValueType) -> Self {
        Self { property, value_type, slots: Slots::new() }
    }

    fn mismatch(&self, value: &PropertyValue) -> IncompatibleValueError {
        IncompatibleValueError {
            property: self.property,
            expected: self.value_type.to_string(),
            actual: value.describe(),
        }
    }
}

impl<T: Scalar> PropertyColumn for ScalarColumn<T> {
    fn property(&self) -> GroupPropertyId { self.property }
    fn value_type(&self) -> &ValueType { &self.value_type }
    fn len(&self) -> usize { self.slots.len() }

    fn get(&self, index: usize) -> Option<PropertyValue> {
        self.slots.get(index).map(|v| v.into_value())
    }

    fn time_of(&self, index: usize) -> Option<Time> {
        self.slots.time_of(index)
    }

    fn set(
        &mut self,
        index: usize,
        value: &PropertyValue,
        time: Time,
    ) -> Result<Option<PropertyValue>, IncompatibleValueError> {
        let raw = T::from_value(value)
            .filter(|_| self.value_type.accepts(value))
            .ok_or_else(|| self.mismatch(value))?;
        Ok(self.slots.insert(index, raw, time).map(Scalar::into_value))
    }

    fn remove(&mut self, index: usize) -> Option<PropertyValue> {
        self.slots.remove(index).map(Scalar::into_value)
    }
}

/// Column over an enum type, storing variant ordinals.
pub struct EnumColumn {
    property: GroupPropertyId,
    value_type: ValueType,
    enum_type: Arc<EnumType>,
    slots: Slots<u32>,
}

impl EnumColumn {
    pub fn new(property: GroupPropertyId, enum_type: Arc<EnumType>) -> Self {
        Self {
            property,
            value_type: ValueType::Enum(Arc::clone(&enum_type)),
            enum_type,
            slots: Slots::new(),
        }
    }

    fn decode(&self, ordinal: u32) -> PropertyValue {
        // Ordinals only enter the column through `ordinal()`.
        let variant = self.enum_type.variant(ordinal).unwrap_or_default();
        PropertyValue::Enum(variant.to_string())
    }
}

impl PropertyColumn for EnumColumn {
    fn property(&self) -> GroupPropertyId { self.property }
    fn value_type(&self) -> &ValueType { &self.value_type }
    fn len(&self) -> usize { self.slots.len() }

    fn get(&self, index: usize) -> Option<PropertyValue> {
        self.slots.get(index).map(|&ordinal| self.decode(ordinal))
    }

    fn time_of(&self, index: usize) -> Option<Time> {
        self.slots.time_of(index)
    }

    fn set(
        &mut self,
        index: usize,
        value: &PropertyValue,
        time: Time,
    ) -> Result<Option<PropertyValue>, IncompatibleValueError> {
        let ordinal = match value {
            PropertyValue::Enum(variant) => self.enum_type.ordinal(variant),
            _ => None,
        };
        let Some(ordinal) = ordinal else {
            return Err(IncompatibleValueError {
                property: self.property,
                expected: self.value_type.to_string(),
                actual: value.to_string(),
            });
        };
        Ok(self.slots.insert(index, ordinal, time).map(|previous| self.decode(previous)))
    }

    fn remove(&mut self, index: usize) -> Option<PropertyValue> {
        self.slots.remove(index).map(|ordinal| self.decode(ordinal))
    }
}

/// Column holding owned values.
pub struct ReferenceColumn {
    property: GroupPropertyId,
    value_type: ValueType,
    slots: Slots<Option<PropertyValue>>,
}

impl ReferenceColumn {
    pub fn new(property: GroupPropertyId, value_type: ValueType) -> Self {
        Self { property, value_type, slots: Slots::new() }
    }
}

impl PropertyColumn for ReferenceColumn {
    fn property(&self) -> GroupPropertyId { self.property }
    fn value_type(&self) -> &ValueType { &self.value_type }
    fn len(&self) -> usize { self.slots.len() }

    fn get(&self, index: usize) -> Option<PropertyValue> {
        self.slots.get(index).cloned().flatten()
    }

    fn time_of(&self, index: usize) -> Option<Time> {
        self.slots.time_of(index)
    }

    fn set(
        &mut self,
        index: usize,
        value: &PropertyValue,
        time: Time,
    ) -> Result<Option<PropertyValue>, IncompatibleValueError> {
        self.value_type.check(self.property, value)?;
        Ok(self.slots.insert(index, Some(value.clone()), time).flatten())
    }

    fn remove(&mut self, index: usize) -> Option<PropertyValue> {
        self.slots.remove(index).flatten()
    }
}

/// Picks the column representation for `value_type`.
pub fn make_column(property: GroupPropertyId, value_type: &ValueType) -> Box<dyn PropertyColumn> {
    let ty = value_type.clone();
    match value_type {
        ValueType::Boolean => Box::new(ScalarColumn::<bool>::new(property, ty)),
        ValueType::Byte => Box::new(ScalarColumn::<i8>::new(property, ty)),
        ValueType::Short => Box::new(ScalarColumn::<i16>::new(property, ty)),
        ValueType::Int => Box::new(ScalarColumn::<i32>::new(property, ty)),
        ValueType::Long => Box::new(ScalarColumn::<i64>::new(property, ty)),
        ValueType::Float => Box::new(ScalarColumn::<f32>::new(property, ty)),
        ValueType::Double => Box::new(ScalarColumn::<f64>::new(property, ty)),
        ValueType::Enum(enum_type) => Box::new(EnumColumn::new(property, Arc::clone(enum_type))),
        ValueType::Text => Box::new(ReferenceColumn::new(property, ty)),
    }
}
