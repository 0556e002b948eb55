//! Typed contiguous buffers.
//!
//! A [`Column`] is one flat buffer of a single primitive type. Scalar leaves
//! own a column of length `capacity`; array pools own a column holding every
//! entity's slice for every array field of that element type.

use std::fmt;
use std::ops::Range;

use serde_json::Value;

use crate::schema::PrimitiveType;

/// A flat buffer of one primitive element type.
///
/// `bool`, `ui8` and `ui8c` all share the `U8` representation.
#[derive(Clone, PartialEq)]
pub enum Column {
    I8(Vec<i8>),
    U8(Vec<u8>),
    I16(Vec<i16>),
    U16(Vec<u16>),
    I32(Vec<i32>),
    U32(Vec<u32>),
    F32(Vec<f32>),
    F64(Vec<f64>),
}

macro_rules! dispatch {
    ($column:expr, $data:ident => $body:expr) => {
        match $column {
            Column::I8($data) => $body,
            Column::U8($data) => $body,
            Column::I16($data) => $body,
            Column::U16($data) => $body,
            Column::I32($data) => $body,
            Column::U32($data) => $body,
            Column::F32($data) => $body,
            Column::F64($data) => $body,
        }
    };
}

macro_rules! dispatch_pair {
    ($a:expr, $b:expr, $x:ident, $y:ident => $body:expr, _ => $mismatch:expr) => {
        match ($a, $b) {
            (Column::I8($x), Column::I8($y)) => $body,
            (Column::U8($x), Column::U8($y)) => $body,
            (Column::I16($x), Column::I16($y)) => $body,
            (Column::U16($x), Column::U16($y)) => $body,
            (Column::I32($x), Column::I32($y)) => $body,
            (Column::U32($x), Column::U32($y)) => $body,
            (Column::F32($x), Column::F32($y)) => $body,
            (Column::F64($x), Column::F64($y)) => $body,
            _ => $mismatch,
        }
    };
}

/// A region copied when a column is regrown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Move {
    pub from: usize,
    pub to: usize,
    pub len: usize,
}

impl Column {
    /// A zero-filled column of `len` elements for the given type.
    #[must_use]
    pub fn zeroed(ty: PrimitiveType, len: usize) -> Self {
        match ty {
            PrimitiveType::Bool | PrimitiveType::U8 | PrimitiveType::U8Clamped => {
                Column::U8(vec![0; len])
            }
            PrimitiveType::I8 => Column::I8(vec![0; len]),
            PrimitiveType::I16 => Column::I16(vec![0; len]),
            PrimitiveType::U16 => Column::U16(vec![0; len]),
            PrimitiveType::I32 => Column::I32(vec![0; len]),
            PrimitiveType::U32 => Column::U32(vec![0; len]),
            PrimitiveType::F32 => Column::F32(vec![0.0; len]),
            PrimitiveType::F64 => Column::F64(vec![0.0; len]),
        }
    }

    /// Number of elements.
    #[must_use]
    pub fn len(&self) -> usize {
        dispatch!(self, data => data.len())
    }

    /// Returns `true` if the column holds no elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Set every element in `range` to zero.
    pub fn zero_range(&mut self, range: Range<usize>) {
        dispatch!(self, data => data[range].fill(Default::default()));
    }

    /// Allocate a zeroed column of `new_len` elements and copy the given
    /// regions of `self` into it.
    #[must_use]
    pub fn regrow(&self, new_len: usize, moves: &[Move]) -> Self {
        dispatch!(self, data => {
            let mut grown = vec![Default::default(); new_len];
            for m in moves {
                grown[m.to..m.to + m.len].copy_from_slice(&data[m.from..m.from + m.len]);
            }
            grown.into()
        })
    }

    /// Returns `true` if element `index` differs between `self` and `other`.
    ///
    /// Floats compare by value, so a `NaN` element always differs.
    #[must_use]
    pub fn differs_at(&self, other: &Column, index: usize) -> bool {
        dispatch_pair!(self, other, a, b => a[index] != b[index], _ => true)
    }

    /// Copy element `index` of `source` into `self`.
    pub fn copy_element(&mut self, source: &Column, index: usize) {
        dispatch_pair!(self, source, dst, src => dst[index] = src[index], _ => {
            debug_assert!(false, "copy between columns of different types");
        });
    }

    /// Compare `range` against `shadow`, advancing every differing shadow
    /// element. Returns `true` if any element differed.
    pub fn sync_shadow(&self, shadow: &mut Column, range: Range<usize>) -> bool {
        dispatch_pair!(self, shadow, current, last => {
            let mut dirty = false;
            for i in range {
                if current[i] != last[i] {
                    last[i] = current[i];
                    dirty = true;
                }
            }
            dirty
        }, _ => true)
    }

    /// Write element `index` big-endian into `out`, which must be exactly
    /// one element wide.
    pub fn write_be(&self, index: usize, out: &mut [u8]) {
        dispatch!(self, data => data[index].write_be(out));
    }

    /// Read element `index` big-endian from `bytes`, which must be exactly
    /// one element wide.
    pub fn read_be(&mut self, index: usize, bytes: &[u8]) {
        dispatch!(self, data => data[index] = Element::read_be(bytes));
    }

    /// Element `index` as JSON.
    #[must_use]
    pub fn json_at(&self, index: usize) -> Value {
        dispatch!(self, data => data[index].to_json())
    }

    /// Store a numeric value at `index`, converting with `as` semantics
    /// (saturating, truncating toward zero for integers).
    pub fn set_number(&mut self, index: usize, value: f64) {
        dispatch!(self, data => data[index] = Element::from_f64(value));
    }
}

impl fmt::Debug for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            Column::I8(_) => "I8",
            Column::U8(_) => "U8",
            Column::I16(_) => "I16",
            Column::U16(_) => "U16",
            Column::I32(_) => "I32",
            Column::U32(_) => "U32",
            Column::F32(_) => "F32",
            Column::F64(_) => "F64",
        };
        write!(f, "Column::{kind}(len = {})", self.len())
    }
}

mod sealed {
    pub trait Sealed {}
}

/// A Rust type that can be read from and written to a [`Column`].
pub trait Element: sealed::Sealed + Copy + PartialEq + Default + fmt::Debug + 'static {
    /// Borrow the column's data if it holds `Self`.
    fn slice(column: &Column) -> Option<&[Self]>;

    /// Mutably borrow the column's data if it holds `Self`.
    fn slice_mut(column: &mut Column) -> Option<&mut [Self]>;

    /// Write `self` big-endian into `out` (`out` is exactly the type's size).
    fn write_be(self, out: &mut [u8]);

    /// Read a value big-endian from `bytes` (`bytes` is exactly the type's size).
    fn read_be(bytes: &[u8]) -> Self;

    fn from_f64(value: f64) -> Self;

    fn to_json(self) -> Value;
}

macro_rules! impl_element {
    ($ty:ty, $variant:ident, $width:expr, |$v:ident| $json:expr) => {
        impl sealed::Sealed for $ty {}

        impl Element for $ty {
            fn slice(column: &Column) -> Option<&[Self]> {
                match column {
                    Column::$variant(data) => Some(data),
                    _ => None,
                }
            }

            fn slice_mut(column: &mut Column) -> Option<&mut [Self]> {
                match column {
                    Column::$variant(data) => Some(data),
                    _ => None,
                }
            }

            fn write_be(self, out: &mut [u8]) {
                out.copy_from_slice(&self.to_be_bytes());
            }

            fn read_be(bytes: &[u8]) -> Self {
                let mut raw = [0u8; $width];
                raw.copy_from_slice(bytes);
                <$ty>::from_be_bytes(raw)
            }

            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_lossless)]
            fn from_f64(value: f64) -> Self {
                value as $ty
            }

            fn to_json(self) -> Value {
                let $v = self;
                $json
            }
        }

        impl From<Vec<$ty>> for Column {
            fn from(data: Vec<$ty>) -> Self {
                Column::$variant(data)
            }
        }
    };
}

impl_element!(i8, I8, 1, |v| Value::from(v));
impl_element!(u8, U8, 1, |v| Value::from(v));
impl_element!(i16, I16, 2, |v| Value::from(v));
impl_element!(u16, U16, 2, |v| Value::from(v));
impl_element!(i32, I32, 4, |v| Value::from(v));
impl_element!(u32, U32, 4, |v| Value::from(v));
impl_element!(f32, F32, 4, |v| Value::from(f64::from(v)));
impl_element!(f64, F64, 8, |v| Value::from(v));

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zeroed_shares_byte_representation() {
        for ty in [
            PrimitiveType::Bool,
            PrimitiveType::U8,
            PrimitiveType::U8Clamped,
        ] {
            assert!(matches!(Column::zeroed(ty, 3), Column::U8(ref v) if v.len() == 3));
        }
        assert!(matches!(
            Column::zeroed(PrimitiveType::F64, 2),
            Column::F64(_)
        ));
    }

    #[test]
    fn test_regrow_moves_regions() {
        let column: Column = vec![1u16, 2, 3, 4].into();
        let grown = column.regrow(
            8,
            &[
                Move { from: 0, to: 0, len: 2 },
                Move { from: 2, to: 4, len: 2 },
            ],
        );
        assert_eq!(grown, Column::U16(vec![1, 2, 0, 0, 3, 4, 0, 0]));
    }

    #[test]
    fn test_sync_shadow_reports_and_advances() {
        let current: Column = vec![1.0f32, 2.0, 3.0].into();
        let mut shadow = Column::zeroed(PrimitiveType::F32, 3);

        assert!(current.sync_shadow(&mut shadow, 0..2));
        assert_eq!(shadow, Column::F32(vec![1.0, 2.0, 0.0]));
        assert!(!current.sync_shadow(&mut shadow, 0..2));
        assert!(current.sync_shadow(&mut shadow, 2..3));
    }

    #[test]
    fn test_nan_always_differs() {
        let current: Column = vec![f32::NAN].into();
        let mut shadow = current.clone();
        assert!(current.differs_at(&shadow, 0));
        assert!(current.sync_shadow(&mut shadow, 0..1));
    }

    #[test]
    fn test_big_endian_element_io() {
        let mut column = Column::zeroed(PrimitiveType::U32, 1);
        column.read_be(0, &[0, 0, 1, 2]);
        assert_eq!(column, Column::U32(vec![0x0102]));

        let mut out = [0u8; 4];
        column.write_be(0, &mut out);
        assert_eq!(out, [0, 0, 1, 2]);
    }

    #[test]
    fn test_set_number_saturates() {
        let mut column = Column::zeroed(PrimitiveType::I8, 2);
        column.set_number(0, 300.0);
        column.set_number(1, -3.7);
        assert_eq!(column, Column::I8(vec![127, -3]));
    }

    #[test]
    fn test_typed_slices() {
        let mut column = Column::zeroed(PrimitiveType::I16, 2);
        i16::slice_mut(&mut column).unwrap()[1] = -5;
        assert_eq!(i16::slice(&column).unwrap(), &[0, -5]);
        assert!(u16::slice(&column).is_none());
    }
}
