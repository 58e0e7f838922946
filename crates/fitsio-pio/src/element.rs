//! Array element kinds and their big-endian encoding.

use std::fmt::Debug;

use bytemuck::{cast_slice, pod_collect_to_vec, Pod};

use crate::error::{Error, Result};

/// Numeric type of an array element, as encoded by `BITPIX`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementKind {
    U8,
    I16,
    I32,
    I64,
    F32,
    F64,
}

impl ElementKind {
    /// Map a `BITPIX` code to its element kind.
    pub fn from_bitpix(bitpix: i64) -> Result<Self> {
        match bitpix {
            8 => Ok(ElementKind::U8),
            16 => Ok(ElementKind::I16),
            32 => Ok(ElementKind::I32),
            64 => Ok(ElementKind::I64),
            -32 => Ok(ElementKind::F32),
            -64 => Ok(ElementKind::F64),
            other => Err(Error::InvalidBitpix(other)),
        }
    }

    pub const fn bitpix(self) -> i64 {
        match self {
            ElementKind::U8 => 8,
            ElementKind::I16 => 16,
            ElementKind::I32 => 32,
            ElementKind::I64 => 64,
            ElementKind::F32 => -32,
            ElementKind::F64 => -64,
        }
    }

    /// Bytes occupied by one element.
    pub const fn byte_width(self) -> usize {
        match self {
            ElementKind::U8 => 1,
            ElementKind::I16 => 2,
            ElementKind::I32 | ElementKind::F32 => 4,
            ElementKind::I64 | ElementKind::F64 => 8,
        }
    }
}

/// A Rust type that can be stored as a FITS array element.
pub trait Element: Pod + PartialEq + Debug + Send + 'static {
    const KIND: ElementKind;

    /// Reinterpret a value loaded from big-endian bytes as native.
    fn from_big_endian(self) -> Self;

    /// Convert a native value into its big-endian bit pattern.
    fn to_big_endian(self) -> Self;
}

macro_rules! impl_element_int {
    ($($t:ty => $kind:ident),* $(,)?) => {
        $(
            impl Element for $t {
                const KIND: ElementKind = ElementKind::$kind;

                fn from_big_endian(self) -> Self {
                    <$t>::from_be(self)
                }

                fn to_big_endian(self) -> Self {
                    self.to_be()
                }
            }
        )*
    };
}

impl_element_int!(u8 => U8, i16 => I16, i32 => I32, i64 => I64);

impl Element for f32 {
    const KIND: ElementKind = ElementKind::F32;

    fn from_big_endian(self) -> Self {
        f32::from_bits(u32::from_be(self.to_bits()))
    }

    fn to_big_endian(self) -> Self {
        f32::from_bits(self.to_bits().to_be())
    }
}

impl Element for f64 {
    const KIND: ElementKind = ElementKind::F64;

    fn from_big_endian(self) -> Self {
        f64::from_bits(u64::from_be(self.to_bits()))
    }

    fn to_big_endian(self) -> Self {
        f64::from_bits(self.to_bits().to_be())
    }
}

/// Decode big-endian bytes into native values.
///
/// Trailing bytes that do not fill a whole element are ignored.
pub fn decode<T: Element>(raw: &[u8]) -> Vec<T> {
    let whole = raw.len() - raw.len() % T::KIND.byte_width();
    let mut values: Vec<T> = pod_collect_to_vec(&raw[..whole]);
    for v in &mut values {
        *v = v.from_big_endian();
    }
    values
}

/// Encode native values as big-endian bytes.
pub fn encode<T: Element>(values: &[T]) -> Vec<u8> {
    let swapped: Vec<T> = values.iter().map(|v| v.to_big_endian()).collect();
    cast_slice::<T, u8>(&swapped).to_vec()
}
