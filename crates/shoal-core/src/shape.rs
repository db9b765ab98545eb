//! Field shape descriptors.

use crate::array::{Array, Shape};
use crate::dtype::Dtype;
use crate::error::SpecError;

/// Dtype and declared shape of one action or state field.
///
/// A leading `-1` marks a per-player field: its batched rows are the
/// active players of the round rather than the environments. No other
/// dimension may be negative.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ShapeSpec {
    /// Element type.
    pub dtype: Dtype,
    /// Declared shape, excluding the batch dimension for per-env fields.
    pub shape: Vec<i64>,
}

impl ShapeSpec {
    /// Validate and build a shape descriptor.
    pub fn new(dtype: Dtype, shape: &[i64]) -> Result<Self, SpecError> {
        let bad_tail = shape.iter().skip(1).any(|&d| d < 0);
        let bad_head = shape.first().is_some_and(|&d| d < -1);
        if bad_tail || bad_head {
            return Err(SpecError::InvalidShape {
                shape: shape.to_vec(),
            });
        }
        Ok(Self {
            dtype,
            shape: shape.to_vec(),
        })
    }

    /// A per-environment scalar.
    pub fn scalar(dtype: Dtype) -> Self {
        Self {
            dtype,
            shape: Vec::new(),
        }
    }

    /// A per-player field whose rows have shape `row_shape`.
    pub fn per_player(dtype: Dtype, row_shape: &[usize]) -> Self {
        let mut shape = Vec::with_capacity(row_shape.len() + 1);
        shape.push(-1);
        shape.extend(row_shape.iter().map(|&d| d as i64));
        Self { dtype, shape }
    }

    /// A per-environment field whose rows have shape `row_shape`.
    pub fn per_env(dtype: Dtype, row_shape: &[usize]) -> Self {
        Self {
            dtype,
            shape: row_shape.iter().map(|&d| d as i64).collect(),
        }
    }

    /// Returns `true` if rows of this field are players, not environments.
    pub fn is_per_player(&self) -> bool {
        self.shape.first() == Some(&-1)
    }

    /// Shape of a single row.
    pub fn row_shape(&self) -> Shape {
        let dims = if self.is_per_player() {
            &self.shape[1..]
        } else {
            &self.shape[..]
        };
        dims.iter().map(|&d| d.max(0) as usize).collect()
    }

    /// Elements per row.
    pub fn row_len(&self) -> usize {
        self.row_shape().iter().product()
    }

    /// Shape of a batch holding `rows` rows of this field.
    pub fn batch_shape(&self, rows: usize) -> Shape {
        let mut shape = Shape::new();
        shape.push(rows);
        shape.extend(self.row_shape());
        shape
    }

    /// Zeroed batch array holding `rows` rows of this field.
    pub fn zeros(&self, rows: usize) -> Array {
        Array::zeros(self.dtype, &self.batch_shape(rows))
    }
}
