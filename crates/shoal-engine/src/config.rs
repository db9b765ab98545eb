//! Resolved pool layout.
//!
//! [`PoolConfig`] is derived once from the environment's
//! [`EnvConfig`] at pool construction: automatic values are resolved
//! and the env-to-worker assignment is fixed.

use std::time::Duration;

use shoal_core::{EnvConfig, EnvId};

use crate::error::PoolError;

/// How often blocking waits check for lost workers.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Concrete pool layout after resolving `0` (auto) settings.
///
/// Environment `i` is owned by worker `i % num_threads` for the whole
/// life of the pool, so one environment's jobs always run in the order
/// they were issued.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PoolConfig {
    /// Environment instances in the pool.
    pub num_envs: usize,
    /// Environments per round.
    pub batch_size: usize,
    /// Worker threads.
    pub num_threads: usize,
    /// Rounds the slot queue keeps in flight.
    pub queue_capacity: usize,
    /// Wake-up interval for lost-worker checks while waiting.
    pub poll_interval: Duration,
}

impl PoolConfig {
    /// Validate `config` and resolve its automatic settings.
    pub fn resolve(config: &EnvConfig) -> Result<Self, PoolError> {
        config.validate()?;
        Ok(Self {
            num_envs: config.num_envs,
            batch_size: config.resolved_batch_size(),
            num_threads: config.resolved_num_threads(),
            queue_capacity: config.queue_capacity,
            poll_interval: DEFAULT_POLL_INTERVAL,
        })
    }

    /// Worker that owns `env_id`.
    pub fn worker_of(&self, env_id: EnvId) -> usize {
        env_id.index() % self.num_threads
    }

    /// Position of `env_id` in its worker's driver list.
    pub fn local_index(&self, env_id: EnvId) -> usize {
        env_id.index() / self.num_threads
    }

    /// Environments owned by `worker`, in local-index order.
    pub fn envs_of(&self, worker: usize) -> impl Iterator<Item = EnvId> + '_ {
        (worker..self.num_envs)
            .step_by(self.num_threads)
            .filter_map(|i| u32::try_from(i).ok().map(EnvId))
    }
}
