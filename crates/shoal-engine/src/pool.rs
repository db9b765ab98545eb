//! The worker-pool harness.
//!
//! [`EnvPool`] creates `num_envs` drivers, pins each to one worker
//! thread, and turns whole-round requests (`reset`, `send`) into
//! per-environment jobs. [`recv`](EnvPool::recv) hands back the oldest
//! round assembled by the [`StateBufferQueue`], in slot order.
//!
//! Several rounds may be in flight at once, up to the queue's capacity
//! without blocking the workers. While rounds are in flight every new
//! round must use the same environment at each order, so that an
//! environment's slot in round N+1 can never be claimed ahead of its
//! slot in round N.

use std::collections::VecDeque;
use std::marker::PhantomData;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use shoal_buffer::{BufferError, StateBatch, StateBufferQueue};
use shoal_core::{EnvId, EnvSpec};
use shoal_env::{ActionBatch, Env, EnvDriver};

use crate::config::PoolConfig;
use crate::error::PoolError;
use crate::worker::{Completion, Job, Worker};

/// A round issued but not yet received.
#[derive(Debug)]
struct PendingRound {
    round: u64,
    env_ids: Vec<EnvId>,
}

/// A fixed set of environments of type `E` stepped by worker threads.
///
/// # Examples
///
/// ```
/// use shoal_core::{EnvConfig, EnvId};
/// use shoal_engine::EnvPool;
/// use shoal_test_utils::{counting_spec, single_player_batch, CountingEnv};
///
/// let spec = counting_spec(EnvConfig { num_envs: 4, ..EnvConfig::default() }).unwrap();
/// let mut pool = EnvPool::<CountingEnv>::new(spec.clone()).unwrap();
///
/// let state = pool.reset_all().unwrap();
/// assert_eq!(state.env_ids().unwrap(), &[0, 1, 2, 3]);
///
/// let state = pool.step(single_player_batch(&spec, &[3, 2, 1, 0])).unwrap();
/// assert_eq!(state.env_ids().unwrap(), &[3, 2, 1, 0]);
/// assert_eq!(state.elapsed_steps().unwrap(), &[1, 1, 1, 1]);
/// ```
pub struct EnvPool<E: Env + 'static> {
    spec: Arc<EnvSpec>,
    config: PoolConfig,
    queue: Arc<StateBufferQueue>,
    jobs: Vec<Sender<Job>>,
    completions: Receiver<Completion>,
    workers: Vec<JoinHandle<()>>,
    in_flight: VecDeque<PendingRound>,
    stash: Vec<Completion>,
    next_round: u64,
    shut_down: bool,
    _env: PhantomData<fn() -> E>,
}

impl<E: Env + 'static> EnvPool<E> {
    /// Validate the config, create every environment and spawn the workers.
    pub fn new(spec: impl Into<Arc<EnvSpec>>) -> Result<Self, PoolError> {
        let spec = spec.into();
        let config = PoolConfig::resolve(spec.config())?;
        let queue = Arc::new(StateBufferQueue::from_spec(&spec)?);

        let (done_tx, completions) = crossbeam_channel::unbounded();
        let mut jobs = Vec::with_capacity(config.num_threads);
        let mut workers = Vec::with_capacity(config.num_threads);
        for index in 0..config.num_threads {
            let drivers = config
                .envs_of(index)
                .map(|env_id| {
                    EnvDriver::<E>::new(Arc::clone(&spec), env_id)
                        .map_err(|error| PoolError::Create { env_id, error })
                })
                .collect::<Result<Vec<_>, _>>()?;
            let worker = Worker::new(index, config.clone(), drivers, Arc::clone(&queue));
            let (job_tx, job_rx) = crossbeam_channel::unbounded();
            let done = done_tx.clone();
            let handle = thread::Builder::new()
                .name(format!("shoal-worker-{index}"))
                .spawn(move || worker.run(job_rx, done))
                .map_err(|e| PoolError::Spawn {
                    reason: e.to_string(),
                })?;
            jobs.push(job_tx);
            workers.push(handle);
        }

        tracing::debug!(
            env = spec.name(),
            num_envs = config.num_envs,
            batch_size = config.batch_size,
            num_threads = config.num_threads,
            queue_capacity = config.queue_capacity,
            "pool started"
        );

        Ok(Self {
            spec,
            config,
            queue,
            jobs,
            completions,
            workers,
            in_flight: VecDeque::new(),
            stash: Vec::new(),
            next_round: 0,
            shut_down: false,
            _env: PhantomData,
        })
    }

    /// Environment instances in the pool.
    pub fn num_envs(&self) -> usize {
        self.config.num_envs
    }

    /// Environments per round.
    pub fn batch_size(&self) -> usize {
        self.config.batch_size
    }

    /// The environment type's spec.
    pub fn spec(&self) -> &EnvSpec {
        &self.spec
    }

    /// The resolved pool layout.
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Rounds issued and not yet received.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Issue a reset round; `env_ids[i]` fills slot `i`.
    pub fn reset(&mut self, env_ids: &[EnvId]) -> Result<(), PoolError> {
        self.ensure_running()?;
        self.check_round(env_ids)?;
        self.dispatch(env_ids.to_vec(), |round, order, env_id| Job::Reset {
            round,
            order,
            env_id,
        })
    }

    /// Issue a step round.
    ///
    /// Row `i` of the batch's `env_id` field names the environment that
    /// fills slot `i` and reads per-env action row `i`.
    pub fn send(&mut self, batch: ActionBatch) -> Result<(), PoolError> {
        self.ensure_running()?;
        if batch.spec() != self.spec.action_spec() {
            return Err(invalid("action batch does not match the pool's action table"));
        }
        let env_ids = batch
            .env_ids()
            .ok_or_else(|| invalid("action batch has no i32 env_id field"))?
            .iter()
            .map(|&id| {
                u32::try_from(id)
                    .map(EnvId)
                    .map_err(|_| invalid(format!("negative env id {id}")))
            })
            .collect::<Result<Vec<_>, _>>()?;
        self.check_round(&env_ids)?;

        let batch = Arc::new(batch);
        self.dispatch(env_ids, |round, order, env_id| Job::Step {
            round,
            order,
            env_id,
            batch: Arc::clone(&batch),
        })
    }

    /// Wait for the oldest round in flight.
    ///
    /// If any environment in the round failed, the round is retired and
    /// the failure with the lowest order is returned as
    /// [`PoolError::Step`], which still carries the assembled batch.
    pub fn recv(&mut self) -> Result<StateBatch, PoolError> {
        self.ensure_running()?;
        let pending = self
            .in_flight
            .pop_front()
            .ok_or(PoolError::NothingInFlight)?;
        let batch = self.wait_batch()?;
        let completions = self.collect(pending.round, pending.env_ids.len())?;

        let mut failures: Vec<_> = completions
            .into_iter()
            .filter_map(|c| c.result.err().map(|error| (c.order, c.env_id, error)))
            .collect();
        failures.sort_by_key(|(order, ..)| *order);
        for (order, env_id, error) in &failures {
            tracing::warn!(
                round = pending.round,
                order = *order,
                env_id = env_id.0,
                %error,
                "environment failed"
            );
        }
        match failures.into_iter().next() {
            Some((_, env_id, error)) => Err(PoolError::Step {
                env_id,
                error,
                batch: Box::new(batch),
            }),
            None => Ok(batch),
        }
    }

    /// [`send`](Self::send) then [`recv`](Self::recv).
    ///
    /// With other rounds already in flight this returns the oldest of
    /// them, not the one just sent.
    pub fn step(&mut self, batch: ActionBatch) -> Result<StateBatch, PoolError> {
        self.send(batch)?;
        self.recv()
    }

    /// Reset every environment, in id order, and wait for the result.
    ///
    /// Requires `batch_size == num_envs`.
    pub fn reset_all(&mut self) -> Result<StateBatch, PoolError> {
        if self.config.batch_size != self.config.num_envs {
            return Err(invalid(format!(
                "reset_all needs batch_size == num_envs, have {} and {}",
                self.config.batch_size, self.config.num_envs
            )));
        }
        let env_ids: Vec<EnvId> = (0..self.config.num_envs)
            .filter_map(|i| u32::try_from(i).ok().map(EnvId))
            .collect();
        self.reset(&env_ids)?;
        self.recv()
    }

    /// Stop the workers. Rounds still in flight are dropped.
    ///
    /// Idempotent; also runs on drop.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;
        self.jobs.clear();
        self.queue.close();
        let mut joined = 0;
        for handle in self.workers.drain(..) {
            if handle.join().is_ok() {
                joined += 1;
            }
        }
        tracing::debug!(
            joined,
            dropped_rounds = self.in_flight.len(),
            "pool shut down"
        );
        self.in_flight.clear();
        self.stash.clear();
    }

    /// Returns `true` once [`shutdown`](Self::shutdown) has run.
    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }

    fn ensure_running(&self) -> Result<(), PoolError> {
        if self.shut_down {
            Err(PoolError::ShutDown)
        } else {
            Ok(())
        }
    }

    fn check_round(&self, env_ids: &[EnvId]) -> Result<(), PoolError> {
        if env_ids.len() != self.config.batch_size {
            return Err(invalid(format!(
                "round names {} envs, batch size is {}",
                env_ids.len(),
                self.config.batch_size
            )));
        }
        let mut seen = vec![false; self.config.num_envs];
        for &env_id in env_ids {
            match seen.get_mut(env_id.index()) {
                None => {
                    return Err(invalid(format!(
                        "env {env_id} out of range for {} envs",
                        self.config.num_envs
                    )))
                }
                Some(taken) if *taken => {
                    return Err(invalid(format!("env {env_id} appears twice")));
                }
                Some(taken) => *taken = true,
            }
        }
        if let Some(pending) = self.in_flight.back() {
            if pending.env_ids != env_ids {
                return Err(invalid(
                    "env order differs from the round still in flight",
                ));
            }
        }
        Ok(())
    }

    fn dispatch(
        &mut self,
        env_ids: Vec<EnvId>,
        make_job: impl Fn(u64, usize, EnvId) -> Job,
    ) -> Result<(), PoolError> {
        let round = self.next_round;
        for (order, &env_id) in env_ids.iter().enumerate() {
            let worker = self.config.worker_of(env_id);
            let sent = self
                .jobs
                .get(worker)
                .is_some_and(|jobs| jobs.send(make_job(round, order, env_id)).is_ok());
            if !sent {
                self.shutdown();
                return Err(PoolError::WorkerLost { worker });
            }
        }
        self.next_round += 1;
        self.in_flight.push_back(PendingRound { round, env_ids });
        Ok(())
    }

    fn wait_batch(&mut self) -> Result<StateBatch, PoolError> {
        loop {
            match self.queue.wait_round_timeout(self.config.poll_interval) {
                Ok(batch) => return Ok(batch),
                Err(BufferError::Timeout) => self.check_workers()?,
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Gather the completions of `round`, keeping later ones for later.
    fn collect(&mut self, round: u64, expected: usize) -> Result<Vec<Completion>, PoolError> {
        let (mut ready, later): (Vec<_>, Vec<_>) = std::mem::take(&mut self.stash)
            .into_iter()
            .partition(|c| c.round == round);
        self.stash = later;
        while ready.len() < expected {
            match self.completions.recv_timeout(self.config.poll_interval) {
                Ok(c) if c.round == round => ready.push(c),
                Ok(c) => self.stash.push(c),
                Err(RecvTimeoutError::Timeout) => self.check_workers()?,
                Err(RecvTimeoutError::Disconnected) => return Err(PoolError::ShutDown),
            }
        }
        Ok(ready)
    }

    fn check_workers(&mut self) -> Result<(), PoolError> {
        match self.workers.iter().position(|h| h.is_finished()) {
            Some(worker) => {
                tracing::error!(worker, "worker exited with rounds in flight");
                self.shutdown();
                Err(PoolError::WorkerLost { worker })
            }
            None => Ok(()),
        }
    }
}

impl<E: Env + 'static> Drop for EnvPool<E> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn invalid(reason: impl Into<String>) -> PoolError {
    PoolError::InvalidRound {
        reason: reason.into(),
    }
}
