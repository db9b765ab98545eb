//! Slot-queue error types.

use std::error::Error;
use std::fmt;

use shoal_core::{ArrayError, SpecError};

/// Errors from slot allocation, slot writes and round retrieval.
#[derive(Clone, Debug, PartialEq)]
pub enum BufferError {
    /// `order` is not a position inside the round.
    OrderOutOfRange {
        /// The requested position.
        order: usize,
        /// Slots per round.
        batch_size: usize,
    },
    /// More players requested than a slot has rows for.
    TooManyPlayers {
        /// Requested player count.
        requested: usize,
        /// Per-slot player capacity.
        max: usize,
    },
    /// The queue was closed; no further rounds will be produced.
    Closed,
    /// A timed wait elapsed before the oldest round completed.
    Timeout,
    /// Invalid queue construction or unknown field name.
    Spec(SpecError),
    /// A view or copy inside a slot failed.
    Array(ArrayError),
}

impl fmt::Display for BufferError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OrderOutOfRange { order, batch_size } => {
                write!(f, "order {order} out of range for batch size {batch_size}")
            }
            Self::TooManyPlayers { requested, max } => {
                write!(f, "{requested} players requested, slot holds at most {max}")
            }
            Self::Closed => write!(f, "state buffer queue closed"),
            Self::Timeout => write!(f, "timed out waiting for a complete round"),
            Self::Spec(e) => write!(f, "spec: {e}"),
            Self::Array(e) => write!(f, "array: {e}"),
        }
    }
}

impl Error for BufferError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Spec(e) => Some(e),
            Self::Array(e) => Some(e),
            _ => None,
        }
    }
}

impl From<SpecError> for BufferError {
    fn from(e: SpecError) -> Self {
        Self::Spec(e)
    }
}

impl From<ArrayError> for BufferError {
    fn from(e: ArrayError) -> Self {
        Self::Array(e)
    }
}
