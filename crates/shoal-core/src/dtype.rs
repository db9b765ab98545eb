//! Element types and typed storage.
//!
//! Storage is an enum over typed `Vec`s rather than a byte buffer, so
//! typed access hands out real `&[T]` / `&mut [T]` slices with no casts.
//! [`Element`] is the sealed bridge from a Rust scalar type to its
//! [`Dtype`] and storage variant.

use std::fmt;

use crate::error::ArrayError;

/// Element type of an array.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Dtype {
    /// `bool`
    Bool,
    /// `u8`
    U8,
    /// `i32`
    I32,
    /// `i64`
    I64,
    /// `f32`
    F32,
    /// `f64`
    F64,
}

impl Dtype {
    /// Size of one element in bytes.
    pub fn size_of(self) -> usize {
        match self {
            Self::Bool | Self::U8 => 1,
            Self::I32 | Self::F32 => 4,
            Self::I64 | Self::F64 => 8,
        }
    }
}

impl fmt::Display for Dtype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Bool => "bool",
            Self::U8 => "u8",
            Self::I32 => "i32",
            Self::I64 => "i64",
            Self::F32 => "f32",
            Self::F64 => "f64",
        };
        f.write_str(name)
    }
}

/// Apply the same expression to whichever variant is populated.
macro_rules! each_variant {
    ($value:expr, $kind:ident, $v:ident => $body:expr) => {
        match $value {
            $kind::Bool($v) => $body,
            $kind::U8($v) => $body,
            $kind::I32($v) => $body,
            $kind::I64($v) => $body,
            $kind::F32($v) => $body,
            $kind::F64($v) => $body,
        }
    };
}

/// Map one storage kind to another, preserving the variant.
macro_rules! map_variant {
    ($value:expr, $from:ident => $to:ident, $v:ident => $body:expr) => {
        match $value {
            $from::Bool($v) => $to::Bool($body),
            $from::U8($v) => $to::U8($body),
            $from::I32($v) => $to::I32($body),
            $from::I64($v) => $to::I64($body),
            $from::F32($v) => $to::F32($body),
            $from::F64($v) => $to::F64($body),
        }
    };
}

/// Owned, typed, flat storage.
#[derive(Clone, Debug, PartialEq)]
pub enum Buffer {
    /// `bool` elements.
    Bool(Vec<bool>),
    /// `u8` elements.
    U8(Vec<u8>),
    /// `i32` elements.
    I32(Vec<i32>),
    /// `i64` elements.
    I64(Vec<i64>),
    /// `f32` elements.
    F32(Vec<f32>),
    /// `f64` elements.
    F64(Vec<f64>),
}

impl Buffer {
    /// Zero-initialised storage of `len` elements.
    pub fn zeros(dtype: Dtype, len: usize) -> Self {
        match dtype {
            Dtype::Bool => Self::Bool(vec![false; len]),
            Dtype::U8 => Self::U8(vec![0; len]),
            Dtype::I32 => Self::I32(vec![0; len]),
            Dtype::I64 => Self::I64(vec![0; len]),
            Dtype::F32 => Self::F32(vec![0.0; len]),
            Dtype::F64 => Self::F64(vec![0.0; len]),
        }
    }

    /// Element type of this storage.
    pub fn dtype(&self) -> Dtype {
        self.as_ref().dtype()
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        each_variant!(self, Buffer, v => v.len())
    }

    /// Returns `true` if the storage holds no elements.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Borrow as a read-only typed slice.
    pub fn as_ref(&self) -> BufferRef<'_> {
        map_variant!(self, Buffer => BufferRef, v => v.as_slice())
    }

    /// Borrow as a mutable typed slice.
    pub fn as_mut(&mut self) -> BufferMut<'_> {
        map_variant!(self, Buffer => BufferMut, v => v.as_mut_slice())
    }
}

/// Borrowed read-only storage.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum BufferRef<'a> {
    /// `bool` elements.
    Bool(&'a [bool]),
    /// `u8` elements.
    U8(&'a [u8]),
    /// `i32` elements.
    I32(&'a [i32]),
    /// `i64` elements.
    I64(&'a [i64]),
    /// `f32` elements.
    F32(&'a [f32]),
    /// `f64` elements.
    F64(&'a [f64]),
}

impl<'a> BufferRef<'a> {
    /// Element type of this storage.
    pub fn dtype(&self) -> Dtype {
        match self {
            Self::Bool(_) => Dtype::Bool,
            Self::U8(_) => Dtype::U8,
            Self::I32(_) => Dtype::I32,
            Self::I64(_) => Dtype::I64,
            Self::F32(_) => Dtype::F32,
            Self::F64(_) => Dtype::F64,
        }
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        each_variant!(self, BufferRef, v => v.len())
    }

    /// Returns `true` if no elements are borrowed.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Narrow to the element range `start..end`.
    ///
    /// # Panics
    ///
    /// Panics if the range is out of bounds; callers validate rows first.
    pub fn range(self, start: usize, end: usize) -> BufferRef<'a> {
        map_variant!(self, BufferRef => BufferRef, v => &v[start..end])
    }

    /// Copy into owned storage.
    pub fn to_buffer(self) -> Buffer {
        map_variant!(self, BufferRef => Buffer, v => v.to_vec())
    }
}

/// Borrowed mutable storage.
#[derive(Debug, PartialEq)]
pub enum BufferMut<'a> {
    /// `bool` elements.
    Bool(&'a mut [bool]),
    /// `u8` elements.
    U8(&'a mut [u8]),
    /// `i32` elements.
    I32(&'a mut [i32]),
    /// `i64` elements.
    I64(&'a mut [i64]),
    /// `f32` elements.
    F32(&'a mut [f32]),
    /// `f64` elements.
    F64(&'a mut [f64]),
}

impl<'a> BufferMut<'a> {
    /// Element type of this storage.
    pub fn dtype(&self) -> Dtype {
        self.as_ref().dtype()
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        each_variant!(self, BufferMut, v => v.len())
    }

    /// Returns `true` if no elements are borrowed.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reborrow as read-only storage.
    pub fn as_ref(&self) -> BufferRef<'_> {
        map_variant!(self, BufferMut => BufferRef, v => &**v)
    }

    /// Reborrow mutably for a shorter lifetime.
    pub fn reborrow(&mut self) -> BufferMut<'_> {
        map_variant!(self, BufferMut => BufferMut, v => &mut **v)
    }

    /// Narrow to the element range `start..end`, consuming the borrow.
    ///
    /// # Panics
    ///
    /// Panics if the range is out of bounds; callers validate rows first.
    pub fn into_range(self, start: usize, end: usize) -> BufferMut<'a> {
        map_variant!(self, BufferMut => BufferMut, v => &mut v[start..end])
    }

    /// Element-wise copy from `src`.
    ///
    /// Both sides must have the same dtype and element count.
    pub fn copy_from(&mut self, src: BufferRef<'_>) -> Result<(), ArrayError> {
        let (expected, found) = (self.dtype(), src.dtype());
        if self.len() != src.len() {
            return Err(ArrayError::LengthMismatch {
                expected: self.len(),
                found: src.len(),
            });
        }
        match (self, src) {
            (BufferMut::Bool(d), BufferRef::Bool(s)) => d.copy_from_slice(s),
            (BufferMut::U8(d), BufferRef::U8(s)) => d.copy_from_slice(s),
            (BufferMut::I32(d), BufferRef::I32(s)) => d.copy_from_slice(s),
            (BufferMut::I64(d), BufferRef::I64(s)) => d.copy_from_slice(s),
            (BufferMut::F32(d), BufferRef::F32(s)) => d.copy_from_slice(s),
            (BufferMut::F64(d), BufferRef::F64(s)) => d.copy_from_slice(s),
            _ => return Err(ArrayError::DtypeMismatch { expected, found }),
        }
        Ok(())
    }

    /// Reset every element to its zero value.
    pub fn fill_default(&mut self) {
        each_variant!(self, BufferMut, v => v.fill(Default::default()))
    }
}

mod sealed {
    pub trait Sealed {}
}

/// A scalar type that can be stored in an [`Array`](crate::Array).
///
/// Sealed: implemented for `bool`, `u8`, `i32`, `i64`, `f32` and `f64`.
pub trait Element:
    Copy + Default + PartialEq + fmt::Debug + Send + Sync + 'static + sealed::Sealed
{
    /// The dtype tag of this element type.
    const DTYPE: Dtype;

    /// View storage as a typed slice, or `None` on dtype mismatch.
    fn from_ref(buf: BufferRef<'_>) -> Option<&[Self]>;

    /// View storage as a mutable typed slice, or `None` on dtype mismatch.
    fn from_mut(buf: BufferMut<'_>) -> Option<&mut [Self]>;

    /// Wrap a vector as owned storage.
    fn into_buffer(values: Vec<Self>) -> Buffer;
}

macro_rules! impl_element {
    ($ty:ty, $variant:ident) => {
        impl sealed::Sealed for $ty {}

        impl Element for $ty {
            const DTYPE: Dtype = Dtype::$variant;

            fn from_ref(buf: BufferRef<'_>) -> Option<&[Self]> {
                match buf {
                    BufferRef::$variant(v) => Some(v),
                    _ => None,
                }
            }

            fn from_mut(buf: BufferMut<'_>) -> Option<&mut [Self]> {
                match buf {
                    BufferMut::$variant(v) => Some(v),
                    _ => None,
                }
            }

            fn into_buffer(values: Vec<Self>) -> Buffer {
                Buffer::$variant(values)
            }
        }
    };
}

impl_element!(bool, Bool);
impl_element!(u8, U8);
impl_element!(i32, I32);
impl_element!(i64, I64);
impl_element!(f32, F32);
impl_element!(f64, F64);
