//! Worker threads for the environment pool.
//!
//! Each worker owns the drivers of the environments assigned to it and
//! receives [`Job`]s over its own crossbeam channel. A job runs one
//! `env_step`, which publishes the environment's slot in the shared
//! queue; the worker then reports a [`Completion`] so the pool can
//! attribute failures to the round they belong to.

use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender};
use shoal_buffer::StateBufferQueue;
use shoal_core::EnvId;
use shoal_env::{ActionBatch, Env, EnvDriver, EnvError, StepError, StepInput};

use crate::config::PoolConfig;

/// One environment's share of one round.
pub(crate) enum Job {
    /// Reset the environment into slot `order`.
    Reset {
        round: u64,
        order: usize,
        env_id: EnvId,
    },
    /// Step the environment with row `order` of `batch`.
    Step {
        round: u64,
        order: usize,
        env_id: EnvId,
        batch: Arc<ActionBatch>,
    },
}

impl Job {
    fn round(&self) -> u64 {
        match self {
            Self::Reset { round, .. } | Self::Step { round, .. } => *round,
        }
    }

    fn order(&self) -> usize {
        match self {
            Self::Reset { order, .. } | Self::Step { order, .. } => *order,
        }
    }

    fn env_id(&self) -> EnvId {
        match self {
            Self::Reset { env_id, .. } | Self::Step { env_id, .. } => *env_id,
        }
    }

    fn input(&self) -> StepInput<'_> {
        match self {
            Self::Reset { .. } => StepInput::Reset,
            Self::Step { batch, order, .. } => StepInput::step(batch, *order),
        }
    }
}

/// Outcome of one [`Job`], sent after the slot was published.
#[derive(Debug)]
pub(crate) struct Completion {
    pub round: u64,
    pub order: usize,
    pub env_id: EnvId,
    pub result: Result<(), StepError>,
}

/// Drivers owned by one worker thread.
pub(crate) struct Worker<E: Env> {
    index: usize,
    layout: PoolConfig,
    drivers: Vec<EnvDriver<E>>,
    queue: Arc<StateBufferQueue>,
}

impl<E: Env> Worker<E> {
    /// `drivers` must be the environments `layout` assigns to worker
    /// `index`, in local-index order.
    pub(crate) fn new(
        index: usize,
        layout: PoolConfig,
        drivers: Vec<EnvDriver<E>>,
        queue: Arc<StateBufferQueue>,
    ) -> Self {
        Self {
            index,
            layout,
            drivers,
            queue,
        }
    }

    /// Run jobs until the job channel closes or the pool stops listening.
    pub(crate) fn run(mut self, jobs: Receiver<Job>, done: Sender<Completion>) {
        tracing::debug!(worker = self.index, envs = self.drivers.len(), "worker started");
        while let Ok(job) = jobs.recv() {
            let completion = self.execute(&job);
            if done.send(completion).is_err() {
                break;
            }
        }
        tracing::debug!(worker = self.index, "worker stopped");
    }

    fn execute(&mut self, job: &Job) -> Completion {
        let env_id = job.env_id();
        let order = job.order();
        let result = match self.drivers.get_mut(self.layout.local_index(env_id)) {
            Some(driver) if driver.env_id() == env_id => {
                driver.env_step(&self.queue, order, job.input())
            }
            _ => {
                // Keep the round completable even for a misrouted job.
                tracing::error!(worker = self.index, env_id = env_id.0, "job for unowned env");
                match self.queue.allocate(0, order) {
                    Ok(slice) => {
                        slice.done_write();
                        Err(StepError::Env(EnvError::failed(format!(
                            "env {env_id} is not owned by worker {}",
                            self.index
                        ))))
                    }
                    Err(e) => Err(e.into()),
                }
            }
        };
        Completion {
            round: job.round(),
            order,
            env_id,
            result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shoal_core::EnvConfig;
    use shoal_test_utils::{counting_spec, CountingEnv};

    /// Single-threaded layout: worker 0 owns every env.
    fn setup(num_envs: usize) -> (Arc<StateBufferQueue>, Worker<CountingEnv>) {
        let spec = counting_spec(EnvConfig {
            num_envs,
            num_threads: 1,
            ..EnvConfig::default()
        })
        .unwrap();
        let layout = PoolConfig::resolve(spec.config()).unwrap();
        let queue = Arc::new(StateBufferQueue::from_spec(&spec).unwrap());
        let drivers = layout
            .envs_of(0)
            .map(|env_id| EnvDriver::new(Arc::clone(&spec), env_id).unwrap())
            .collect();
        let worker = Worker::new(0, layout, drivers, Arc::clone(&queue));
        (queue, worker)
    }

    #[test]
    fn worker_reports_each_job() {
        let (queue, worker) = setup(2);
        let (job_tx, job_rx) = crossbeam_channel::unbounded();
        let (done_tx, done_rx) = crossbeam_channel::unbounded();
        let handle = std::thread::spawn(move || worker.run(job_rx, done_tx));

        for (order, id) in [1u32, 0].into_iter().enumerate() {
            job_tx
                .send(Job::Reset {
                    round: 0,
                    order,
                    env_id: EnvId(id),
                })
                .unwrap();
        }
        drop(job_tx);
        handle.join().unwrap();

        let completions: Vec<_> = done_rx.iter().collect();
        assert_eq!(completions.len(), 2);
        assert!(completions.iter().all(|c| c.round == 0 && c.result.is_ok()));
        let batch = queue.wait_round().unwrap();
        assert_eq!(batch.env_ids().unwrap(), &[1, 0]);
    }

    #[test]
    fn misrouted_job_still_publishes() {
        let (queue, mut worker) = setup(1);
        let completion = worker.execute(&Job::Reset {
            round: 0,
            order: 0,
            env_id: EnvId(5),
        });
        assert!(matches!(completion.result, Err(StepError::Env(_))));
        let batch = queue.try_round().unwrap().unwrap();
        assert_eq!(batch.player_counts(), &[0]);
    }
}
