//! Worker-pool harness for the Shoal environment pool.
//!
//! [`EnvPool`] runs a fixed set of environments on named worker threads
//! (`shoal-worker-{i}`). Each environment is owned by exactly one
//! worker, so its resets and steps execute in the order they were
//! issued. Finished rounds come back as
//! [`StateBatch`](shoal_buffer::StateBatch)es whose rows follow slot
//! order, independent of which worker finished first.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod pool;
mod worker;

pub use config::{PoolConfig, DEFAULT_POLL_INTERVAL};
pub use error::PoolError;
pub use pool::EnvPool;
