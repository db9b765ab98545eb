//! Typed n-dimensional arrays and zero-copy views.
//!
//! [`Array`] owns its storage. [`ArrayView`] and [`ArrayViewMut`] borrow
//! a contiguous element range of an owner, so a view can never outlive
//! the buffer it aliases. Two ways of taking rows are provided:
//!
//! - [`slice`](ArrayView::slice) keeps the leading dimension and
//!   narrows it to `start..end`;
//! - [`row`](ArrayView::row) drops the leading dimension and yields a
//!   single row.
//!
//! Both are zero-copy. Copies only happen through
//! [`assign`](ArrayViewMut::assign) and [`to_owned`](ArrayView::to_owned).

use smallvec::SmallVec;

use crate::dtype::{Buffer, BufferMut, BufferRef, Dtype, Element};
use crate::error::ArrayError;

/// Concrete array shape.
///
/// Inline for up to 4 dimensions, which covers every field layout the
/// pool produces; higher ranks spill to the heap transparently.
pub type Shape = SmallVec<[usize; 4]>;

fn element_count(shape: &[usize]) -> usize {
    shape.iter().product()
}

fn row_len_of(shape: &[usize]) -> usize {
    element_count(shape.get(1..).unwrap_or(&[]))
}

fn check_range(shape: &[usize], start: usize, end: usize) -> Result<(), ArrayError> {
    let rows = *shape.first().ok_or(ArrayError::NotIndexable)?;
    if start > end || end > rows {
        return Err(ArrayError::InvalidRange { start, end, rows });
    }
    Ok(())
}

fn check_row(shape: &[usize], index: usize) -> Result<(), ArrayError> {
    let rows = *shape.first().ok_or(ArrayError::NotIndexable)?;
    if index >= rows {
        return Err(ArrayError::IndexOutOfBounds { index, rows });
    }
    Ok(())
}

fn narrowed(shape: &[usize], rows: usize) -> Shape {
    let mut out = Shape::from_slice(shape);
    out[0] = rows;
    out
}

/// An owned, typed, row-major n-dimensional array.
#[derive(Clone, Debug, PartialEq)]
pub struct Array {
    shape: Shape,
    data: Buffer,
}

impl Array {
    /// Zero-initialised array of the given dtype and shape.
    pub fn zeros(dtype: Dtype, shape: &[usize]) -> Self {
        Self {
            shape: Shape::from_slice(shape),
            data: Buffer::zeros(dtype, element_count(shape)),
        }
    }

    /// Build an array from row-major values.
    ///
    /// Returns [`ArrayError::LengthMismatch`] if `values` does not hold
    /// exactly as many elements as `shape` describes.
    pub fn from_vec<T: Element>(shape: &[usize], values: Vec<T>) -> Result<Self, ArrayError> {
        let expected = element_count(shape);
        if values.len() != expected {
            return Err(ArrayError::LengthMismatch {
                expected,
                found: values.len(),
            });
        }
        Ok(Self {
            shape: Shape::from_slice(shape),
            data: T::into_buffer(values),
        })
    }

    /// One-dimensional array holding `values`.
    pub fn from_slice<T: Element>(values: &[T]) -> Self {
        Self {
            shape: smallvec::smallvec![values.len()],
            data: T::into_buffer(values.to_vec()),
        }
    }

    /// Element type.
    pub fn dtype(&self) -> Dtype {
        self.data.dtype()
    }

    /// Full shape.
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Size of dimension `d`, or `None` if the array has fewer dimensions.
    pub fn dim(&self, d: usize) -> Option<usize> {
        self.shape.get(d).copied()
    }

    /// Size of the leading dimension (0 for a zero-dimensional array).
    pub fn rows(&self) -> usize {
        self.shape.first().copied().unwrap_or(0)
    }

    /// Total number of elements.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if the array holds no elements.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Underlying storage.
    pub fn buffer(&self) -> &Buffer {
        &self.data
    }

    /// Borrow the whole array as a view.
    pub fn view(&self) -> ArrayView<'_> {
        ArrayView {
            shape: self.shape.clone(),
            data: self.data.as_ref(),
        }
    }

    /// Borrow the whole array as a mutable view.
    pub fn view_mut(&mut self) -> ArrayViewMut<'_> {
        ArrayViewMut {
            shape: self.shape.clone(),
            data: self.data.as_mut(),
        }
    }

    /// Zero-copy view of rows `start..end`.
    pub fn slice(&self, start: usize, end: usize) -> Result<ArrayView<'_>, ArrayError> {
        self.view().slice(start, end)
    }

    /// Zero-copy view of row `index`, without the leading dimension.
    pub fn row(&self, index: usize) -> Result<ArrayView<'_>, ArrayError> {
        self.view().row(index)
    }

    /// Mutable zero-copy view of rows `start..end`.
    pub fn slice_mut(&mut self, start: usize, end: usize) -> Result<ArrayViewMut<'_>, ArrayError> {
        self.view_mut().into_slice(start, end)
    }

    /// Mutable zero-copy view of row `index`.
    pub fn row_mut(&mut self, index: usize) -> Result<ArrayViewMut<'_>, ArrayError> {
        self.view_mut().into_row(index)
    }

    /// Typed access to all elements.
    pub fn as_slice<T: Element>(&self) -> Result<&[T], ArrayError> {
        T::from_ref(self.data.as_ref()).ok_or(ArrayError::DtypeMismatch {
            expected: T::DTYPE,
            found: self.dtype(),
        })
    }

    /// Typed mutable access to all elements.
    pub fn as_mut_slice<T: Element>(&mut self) -> Result<&mut [T], ArrayError> {
        let found = self.dtype();
        T::from_mut(self.data.as_mut()).ok_or(ArrayError::DtypeMismatch {
            expected: T::DTYPE,
            found,
        })
    }

    /// Reset every element to zero.
    pub fn fill_default(&mut self) {
        self.data.as_mut().fill_default();
    }
}

/// A read-only, zero-copy view into an [`Array`].
#[derive(Clone, Debug, PartialEq)]
pub struct ArrayView<'a> {
    shape: Shape,
    data: BufferRef<'a>,
}

impl<'a> ArrayView<'a> {
    /// Element type.
    pub fn dtype(&self) -> Dtype {
        self.data.dtype()
    }

    /// Full shape of the viewed region.
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Size of dimension `d`, or `None` if the view has fewer dimensions.
    pub fn dim(&self, d: usize) -> Option<usize> {
        self.shape.get(d).copied()
    }

    /// Size of the leading dimension (0 for a zero-dimensional view).
    pub fn rows(&self) -> usize {
        self.shape.first().copied().unwrap_or(0)
    }

    /// Elements per row.
    pub fn row_len(&self) -> usize {
        row_len_of(&self.shape)
    }

    /// Total number of elements.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if the view covers no elements.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Underlying borrowed storage.
    pub fn buffer(&self) -> BufferRef<'a> {
        self.data
    }

    /// Zero-copy view of rows `start..end`.
    pub fn slice(&self, start: usize, end: usize) -> Result<ArrayView<'a>, ArrayError> {
        check_range(&self.shape, start, end)?;
        let row_len = self.row_len();
        Ok(ArrayView {
            shape: narrowed(&self.shape, end - start),
            data: self.data.range(start * row_len, end * row_len),
        })
    }

    /// Zero-copy view of row `index`, without the leading dimension.
    pub fn row(&self, index: usize) -> Result<ArrayView<'a>, ArrayError> {
        check_row(&self.shape, index)?;
        let row_len = self.row_len();
        Ok(ArrayView {
            shape: Shape::from_slice(&self.shape[1..]),
            data: self.data.range(index * row_len, (index + 1) * row_len),
        })
    }

    /// Typed access to the viewed elements.
    pub fn as_slice<T: Element>(&self) -> Result<&'a [T], ArrayError> {
        T::from_ref(self.data).ok_or(ArrayError::DtypeMismatch {
            expected: T::DTYPE,
            found: self.dtype(),
        })
    }

    /// Read the first element; convenient for scalar rows.
    pub fn scalar<T: Element>(&self) -> Result<T, ArrayError> {
        let values = self.as_slice::<T>()?;
        values
            .first()
            .copied()
            .ok_or(ArrayError::IndexOutOfBounds { index: 0, rows: 0 })
    }

    /// Copy the viewed region into a new owned array.
    pub fn to_owned(&self) -> Array {
        Array {
            shape: self.shape.clone(),
            data: self.data.to_buffer(),
        }
    }
}

/// A mutable, zero-copy view into an [`Array`].
#[derive(Debug)]
pub struct ArrayViewMut<'a> {
    shape: Shape,
    data: BufferMut<'a>,
}

impl<'a> ArrayViewMut<'a> {
    /// Element type.
    pub fn dtype(&self) -> Dtype {
        self.data.dtype()
    }

    /// Full shape of the viewed region.
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Size of the leading dimension (0 for a zero-dimensional view).
    pub fn rows(&self) -> usize {
        self.shape.first().copied().unwrap_or(0)
    }

    /// Elements per row.
    pub fn row_len(&self) -> usize {
        row_len_of(&self.shape)
    }

    /// Total number of elements.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if the view covers no elements.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Reborrow as a read-only view.
    pub fn view(&self) -> ArrayView<'_> {
        ArrayView {
            shape: self.shape.clone(),
            data: self.data.as_ref(),
        }
    }

    /// Reborrow mutably for a shorter lifetime.
    pub fn reborrow(&mut self) -> ArrayViewMut<'_> {
        ArrayViewMut {
            shape: self.shape.clone(),
            data: self.data.reborrow(),
        }
    }

    /// Mutable view of rows `start..end`, consuming this view.
    pub fn into_slice(self, start: usize, end: usize) -> Result<ArrayViewMut<'a>, ArrayError> {
        check_range(&self.shape, start, end)?;
        let row_len = self.row_len();
        Ok(ArrayViewMut {
            shape: narrowed(&self.shape, end - start),
            data: self.data.into_range(start * row_len, end * row_len),
        })
    }

    /// Mutable view of row `index`, consuming this view.
    pub fn into_row(self, index: usize) -> Result<ArrayViewMut<'a>, ArrayError> {
        check_row(&self.shape, index)?;
        let row_len = self.row_len();
        Ok(ArrayViewMut {
            shape: Shape::from_slice(&self.shape[1..]),
            data: self.data.into_range(index * row_len, (index + 1) * row_len),
        })
    }

    /// Mutable view of rows `start..end`.
    pub fn slice_mut(&mut self, start: usize, end: usize) -> Result<ArrayViewMut<'_>, ArrayError> {
        self.reborrow().into_slice(start, end)
    }

    /// Mutable view of row `index`.
    pub fn row_mut(&mut self, index: usize) -> Result<ArrayViewMut<'_>, ArrayError> {
        self.reborrow().into_row(index)
    }

    /// Element-wise copy of `src` into this view.
    ///
    /// Shapes may differ as long as dtype and element count agree, so a
    /// `[1, d]` slice can be assigned from a `[d]` row and vice versa.
    pub fn assign(&mut self, src: &ArrayView<'_>) -> Result<(), ArrayError> {
        self.data.copy_from(src.buffer())
    }

    /// Set every element of this view to `value`.
    pub fn set<T: Element>(&mut self, value: T) -> Result<(), ArrayError> {
        self.as_mut_slice::<T>()?.fill(value);
        Ok(())
    }

    /// Typed mutable access to the viewed elements.
    pub fn as_mut_slice<T: Element>(&mut self) -> Result<&mut [T], ArrayError> {
        let found = self.dtype();
        T::from_mut(self.data.reborrow()).ok_or(ArrayError::DtypeMismatch {
            expected: T::DTYPE,
            found,
        })
    }

    /// Typed mutable access that keeps the full view lifetime.
    pub fn into_mut_slice<T: Element>(self) -> Result<&'a mut [T], ArrayError> {
        let found = self.dtype();
        T::from_mut(self.data).ok_or(ArrayError::DtypeMismatch {
            expected: T::DTYPE,
            found,
        })
    }

    /// Reset every element to zero.
    pub fn fill_default(&mut self) {
        self.data.fill_default();
    }
}
