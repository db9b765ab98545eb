//! Error types for array access and spec construction.

use std::error::Error;
use std::fmt;

use crate::dtype::Dtype;

/// Errors from array and view operations.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ArrayError {
    /// Typed access or assignment with the wrong element type.
    DtypeMismatch {
        /// The dtype the operation required.
        expected: Dtype,
        /// The dtype actually stored.
        found: Dtype,
    },
    /// Row index past the leading dimension.
    IndexOutOfBounds {
        /// The requested row.
        index: usize,
        /// Number of rows available.
        rows: usize,
    },
    /// Row range not contained in the leading dimension.
    InvalidRange {
        /// Range start (inclusive).
        start: usize,
        /// Range end (exclusive).
        end: usize,
        /// Number of rows available.
        rows: usize,
    },
    /// Element count of a source does not match its destination.
    LengthMismatch {
        /// Element count of the destination.
        expected: usize,
        /// Element count of the source.
        found: usize,
    },
    /// Row operation on a zero-dimensional array.
    NotIndexable,
}

impl fmt::Display for ArrayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DtypeMismatch { expected, found } => {
                write!(f, "dtype mismatch: expected {expected}, found {found}")
            }
            Self::IndexOutOfBounds { index, rows } => {
                write!(f, "row {index} out of bounds ({rows} rows)")
            }
            Self::InvalidRange { start, end, rows } => {
                write!(f, "row range {start}..{end} invalid for {rows} rows")
            }
            Self::LengthMismatch { expected, found } => {
                write!(f, "length mismatch: expected {expected} elements, found {found}")
            }
            Self::NotIndexable => write!(f, "cannot index rows of a zero-dimensional array"),
        }
    }
}

impl Error for ArrayError {}

/// Errors detected while building field tables, specs and configs.
#[derive(Clone, Debug, PartialEq)]
pub enum SpecError {
    /// A field name was declared twice in one table.
    DuplicateField {
        /// The repeated name.
        name: String,
    },
    /// A user table declared a name reserved by the pool.
    ReservedField {
        /// The reserved name.
        name: String,
    },
    /// A lookup named a field the table does not contain.
    UnknownField {
        /// The missing name.
        name: String,
    },
    /// A shape contains a negative dimension outside the leading position.
    InvalidShape {
        /// The offending shape.
        shape: Vec<i64>,
    },
    /// An [`EnvConfig`](crate::EnvConfig) invariant was violated.
    InvalidConfig {
        /// Description of which invariant was violated.
        reason: String,
    },
}

impl fmt::Display for SpecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicateField { name } => write!(f, "field '{name}' declared twice"),
            Self::ReservedField { name } => write!(f, "field name '{name}' is reserved"),
            Self::UnknownField { name } => write!(f, "unknown field '{name}'"),
            Self::InvalidShape { shape } => write!(f, "invalid shape {shape:?}"),
            Self::InvalidConfig { reason } => write!(f, "invalid config: {reason}"),
        }
    }
}

impl Error for SpecError {}
