//! Environment capability, action demultiplexing and the per-environment
//! driver for the Shoal environment pool.
//!
//! An [`EnvDriver`] advances one [`Env`] per call to
//! [`env_step`](EnvDriver::env_step): it narrows the round's shared
//! [`ActionBatch`] to this environment's rows with [`ActionDemux`],
//! runs the environment against an [`EnvContext`], then stamps and
//! publishes the environment's slot in the
//! [`StateBufferQueue`](shoal_buffer::StateBufferQueue).

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod action;
pub mod context;
pub mod demux;
pub mod driver;
pub mod env;
pub mod error;

pub use action::{Action, ActionBatch, ActionField, DemuxPath, RawAction};
pub use context::{EnvContext, State};
pub use demux::ActionDemux;
pub use driver::{EnvDriver, StepInput, ELAPSED_STEP_UNSET};
pub use env::Env;
pub use error::{BatchError, EnvError, StepError};
