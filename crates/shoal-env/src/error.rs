//! Environment, driver and action-batch error types.

use std::error::Error;
use std::fmt;

use shoal_buffer::BufferError;
use shoal_core::{ArrayError, Dtype, EnvId};

// ── EnvError ───────────────────────────────────────────────────────

/// Errors raised from inside an environment's `create`, `reset` or `step`.
#[derive(Clone, Debug, PartialEq)]
pub enum EnvError {
    /// Environment-specific failure.
    Failed {
        /// Human-readable description of the failure.
        reason: String,
    },
    /// [`allocate`](crate::EnvContext::allocate) called twice in one step.
    AlreadyAllocated,
    /// State access before [`allocate`](crate::EnvContext::allocate).
    NotAllocated,
    /// Slot allocation or slot write failed.
    Buffer(BufferError),
    /// A view or typed access failed.
    Array(ArrayError),
}

impl EnvError {
    /// Shorthand for [`EnvError::Failed`].
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed {
            reason: reason.into(),
        }
    }
}

impl fmt::Display for EnvError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Failed { reason } => write!(f, "environment failed: {reason}"),
            Self::AlreadyAllocated => write!(f, "state slot already allocated this step"),
            Self::NotAllocated => write!(f, "state slot not allocated"),
            Self::Buffer(e) => write!(f, "buffer: {e}"),
            Self::Array(e) => write!(f, "array: {e}"),
        }
    }
}

impl Error for EnvError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Buffer(e) => Some(e),
            Self::Array(e) => Some(e),
            _ => None,
        }
    }
}

impl From<BufferError> for EnvError {
    fn from(e: BufferError) -> Self {
        Self::Buffer(e)
    }
}

impl From<ArrayError> for EnvError {
    fn from(e: ArrayError) -> Self {
        Self::Array(e)
    }
}

// ── StepError ──────────────────────────────────────────────────────

/// Errors from one [`env_step`](crate::EnvDriver::env_step) call.
///
/// Whatever the error, the driver has published a slot for its `order`
/// before returning, so the round still completes.
#[derive(Clone, Debug, PartialEq)]
pub enum StepError {
    /// The environment returned an error.
    Env(EnvError),
    /// The environment returned without allocating its state slot.
    MissingAllocation {
        /// The offending environment.
        env_id: EnvId,
    },
    /// The environment tried to allocate more than once.
    AlreadyAllocated {
        /// The offending environment.
        env_id: EnvId,
    },
    /// Slot allocation, stamping or publication failed.
    Buffer(BufferError),
    /// Demultiplexing the action batch failed.
    Array(ArrayError),
}

impl fmt::Display for StepError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Env(e) => write!(f, "{e}"),
            Self::MissingAllocation { env_id } => {
                write!(f, "env {env_id} finished its step without allocating a state slot")
            }
            Self::AlreadyAllocated { env_id } => {
                write!(f, "env {env_id} allocated its state slot more than once")
            }
            Self::Buffer(e) => write!(f, "buffer: {e}"),
            Self::Array(e) => write!(f, "action demux: {e}"),
        }
    }
}

impl Error for StepError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Env(e) => Some(e),
            Self::Buffer(e) => Some(e),
            Self::Array(e) => Some(e),
            _ => None,
        }
    }
}

impl From<EnvError> for StepError {
    fn from(e: EnvError) -> Self {
        Self::Env(e)
    }
}

impl From<BufferError> for StepError {
    fn from(e: BufferError) -> Self {
        Self::Buffer(e)
    }
}

impl From<ArrayError> for StepError {
    fn from(e: ArrayError) -> Self {
        Self::Array(e)
    }
}

// ── BatchError ─────────────────────────────────────────────────────

/// An action batch that does not match its action table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BatchError {
    /// Wrong number of field arrays.
    FieldCount {
        /// Fields declared by the table.
        expected: usize,
        /// Arrays supplied.
        found: usize,
    },
    /// A field array has the wrong element type.
    Dtype {
        /// Field name.
        field: String,
        /// Declared dtype.
        expected: Dtype,
        /// Supplied dtype.
        found: Dtype,
    },
    /// A field array's row shape or row count disagrees with the table
    /// or with the other fields of the same kind.
    Shape {
        /// Field name.
        field: String,
        /// Expected full shape.
        expected: Vec<usize>,
        /// Supplied full shape.
        found: Vec<usize>,
    },
}

impl fmt::Display for BatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FieldCount { expected, found } => {
                write!(f, "action batch has {found} fields, table declares {expected}")
            }
            Self::Dtype {
                field,
                expected,
                found,
            } => write!(f, "action field '{field}': expected {expected}, found {found}"),
            Self::Shape {
                field,
                expected,
                found,
            } => write!(
                f,
                "action field '{field}': expected shape {expected:?}, found {found:?}"
            ),
        }
    }
}

impl Error for BatchError {}
