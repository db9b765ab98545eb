//! Pool error types.

use std::error::Error;
use std::fmt;

use shoal_buffer::{BufferError, StateBatch};
use shoal_core::{EnvId, SpecError};
use shoal_env::StepError;

/// Errors from [`EnvPool`](crate::EnvPool) construction and round traffic.
#[derive(Clone, Debug, PartialEq)]
pub enum PoolError {
    /// The environment configuration failed validation.
    Spec(SpecError),
    /// The state buffer queue rejected an operation.
    Buffer(BufferError),
    /// An environment could not be created.
    Create {
        /// The environment that failed.
        env_id: EnvId,
        /// Why it failed.
        error: StepError,
    },
    /// A reset or step round does not fit the pool.
    InvalidRound {
        /// What was wrong with it.
        reason: String,
    },
    /// A worker thread could not be spawned.
    Spawn {
        /// The OS error message.
        reason: String,
    },
    /// An environment in the retrieved round failed. The round was
    /// still retired; this is the failure with the lowest order.
    Step {
        /// The environment that failed.
        env_id: EnvId,
        /// The driver's error.
        error: StepError,
        /// The assembled round. Rows of environments that did not fail
        /// hold their normal output.
        batch: Box<StateBatch>,
    },
    /// A worker thread exited while rounds were outstanding.
    WorkerLost {
        /// Index of the worker.
        worker: usize,
    },
    /// `recv` was called with no round in flight.
    NothingInFlight,
    /// The pool was shut down.
    ShutDown,
}

impl fmt::Display for PoolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Spec(e) => write!(f, "config: {e}"),
            Self::Buffer(e) => write!(f, "buffer: {e}"),
            Self::Create { env_id, error } => write!(f, "creating env {env_id}: {error}"),
            Self::InvalidRound { reason } => write!(f, "invalid round: {reason}"),
            Self::Spawn { reason } => write!(f, "failed to spawn worker: {reason}"),
            Self::Step { env_id, error, .. } => write!(f, "env {env_id}: {error}"),
            Self::WorkerLost { worker } => write!(f, "worker {worker} exited unexpectedly"),
            Self::NothingInFlight => write!(f, "no round in flight"),
            Self::ShutDown => write!(f, "pool is shut down"),
        }
    }
}

impl PoolError {
    /// The round a [`PoolError::Step`] still delivered.
    pub fn into_batch(self) -> Option<StateBatch> {
        match self {
            Self::Step { batch, .. } => Some(*batch),
            _ => None,
        }
    }
}

impl Error for PoolError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Spec(e) => Some(e),
            Self::Buffer(e) => Some(e),
            Self::Create { error, .. } | Self::Step { error, .. } => Some(error),
            _ => None,
        }
    }
}

impl From<SpecError> for PoolError {
    fn from(e: SpecError) -> Self {
        Self::Spec(e)
    }
}

impl From<BufferError> for PoolError {
    fn from(e: BufferError) -> Self {
        match e {
            BufferError::Closed => Self::ShutDown,
            other => Self::Buffer(other),
        }
    }
}
