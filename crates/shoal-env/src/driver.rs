//! The per-environment driver.
//!
//! [`EnvDriver`] owns one environment together with its step counter,
//! RNG and action demultiplexer, and runs one reset or step per
//! [`env_step`](EnvDriver::env_step) call. Each call ends with exactly
//! one published slot at its `order`, whether the environment
//! succeeded, failed, or forgot to allocate.

use std::sync::Arc;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use shoal_buffer::{BufferError, StateBufferQueue, WritableSlice};
use shoal_core::{keys, EnvId, EnvSpec};

use crate::action::ActionBatch;
use crate::context::EnvContext;
use crate::demux::ActionDemux;
use crate::env::Env;
use crate::error::StepError;

/// Step counter value before the first reset.
pub const ELAPSED_STEP_UNSET: i32 = -1;

/// What one [`env_step`](EnvDriver::env_step) call should do.
#[derive(Clone, Copy, Debug)]
pub enum StepInput<'a> {
    /// Start a new episode.
    Reset,
    /// Advance one step using the round's action batch.
    Step {
        /// The round's actions, shared read-only by every driver.
        batch: &'a ActionBatch,
        /// Row of this environment in the batch's per-env fields.
        env_index: usize,
    },
}

impl<'a> StepInput<'a> {
    /// Step input for the environment at `env_index` of `batch`.
    pub fn step(batch: &'a ActionBatch, env_index: usize) -> Self {
        Self::Step { batch, env_index }
    }
}

/// Drives one environment instance.
pub struct EnvDriver<E: Env> {
    spec: Arc<EnvSpec>,
    env_id: EnvId,
    seed: u64,
    rng: ChaCha8Rng,
    elapsed_step: i32,
    demux: ActionDemux,
    env: E,
}

impl<E: Env> EnvDriver<E> {
    /// Create the environment and its driver state.
    pub fn new(spec: Arc<EnvSpec>, env_id: EnvId) -> Result<Self, StepError> {
        let env = E::create(&spec, env_id)?;
        let seed = spec.config().env_seed(env_id);
        Ok(Self {
            demux: ActionDemux::new(&spec),
            rng: ChaCha8Rng::seed_from_u64(seed),
            spec,
            env_id,
            seed,
            elapsed_step: ELAPSED_STEP_UNSET,
            env,
        })
    }

    /// Id of the driven environment.
    pub fn env_id(&self) -> EnvId {
        self.env_id
    }

    /// Seed of the driver's RNG.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Step counter: `-1` before the first reset, `0` after a reset,
    /// `+1` per step.
    pub fn elapsed_step(&self) -> i32 {
        self.elapsed_step
    }

    /// The environment type's spec.
    pub fn spec(&self) -> &EnvSpec {
        &self.spec
    }

    /// The concrete environment.
    pub fn env(&self) -> &E {
        &self.env
    }

    /// Mutable access to the concrete environment.
    pub fn env_mut(&mut self) -> &mut E {
        &mut self.env
    }

    /// Run one reset or step and publish this environment's slot at
    /// `order` in `queue`.
    ///
    /// On any error a slot is still published (a zero-player placeholder
    /// if the environment never allocated), so the round completes.
    pub fn env_step(
        &mut self,
        queue: &StateBufferQueue,
        order: usize,
        input: StepInput<'_>,
    ) -> Result<(), StepError> {
        self.elapsed_step = match input {
            StepInput::Reset => 0,
            StepInput::Step { .. } => self.elapsed_step.saturating_add(1),
        };

        let action = match input {
            StepInput::Reset => None,
            StepInput::Step { batch, env_index } => {
                match self.demux.parse(batch, self.env_id, env_index) {
                    Ok(action) => Some(action),
                    Err(e) => {
                        self.publish_placeholder(queue, order)?;
                        return Err(e.into());
                    }
                }
            }
        };

        let mut ctx = EnvContext::new(
            self.env_id,
            &self.spec,
            self.elapsed_step,
            &mut self.rng,
            queue,
            order,
        );
        let outcome = match &action {
            None => self.env.reset(&mut ctx),
            Some(action) => self.env.step(action, &mut ctx),
        };
        let repeat_allocation = ctx.repeat_allocation();
        let slot = ctx.take_slot();
        drop(ctx);

        let allocated = slot.is_some();
        match slot {
            Some(slice) => self.publish(slice)?,
            None => self.publish_placeholder(queue, order)?,
        }

        if repeat_allocation {
            return Err(StepError::AlreadyAllocated {
                env_id: self.env_id,
            });
        }
        outcome?;
        if !allocated {
            tracing::error!(
                env_id = self.env_id.0,
                order,
                "environment returned without allocating; published empty slot"
            );
            return Err(StepError::MissingAllocation {
                env_id: self.env_id,
            });
        }
        Ok(())
    }

    /// Stamp the reserved fields and publish.
    fn publish(&self, mut slice: WritableSlice) -> Result<(), StepError> {
        let stamped = self.stamp(&mut slice);
        slice.done_write();
        Ok(stamped?)
    }

    fn publish_placeholder(&self, queue: &StateBufferQueue, order: usize) -> Result<(), StepError> {
        let slice = queue.allocate(0, order)?;
        self.publish(slice)
    }

    fn stamp(&self, slice: &mut WritableSlice) -> Result<(), BufferError> {
        let id = self.env_id.stamp();
        slice
            .field_mut(keys::STATE_DONE_INDEX)?
            .set(self.env.is_done())?;
        slice.field_mut(keys::STATE_ENV_ID_INDEX)?.set(id)?;
        slice
            .field_mut(keys::STATE_ELAPSED_STEP_INDEX)?
            .set(self.elapsed_step)?;
        slice.field_mut(keys::STATE_PLAYER_ENV_ID_INDEX)?.set(id)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::Action;
    use crate::error::EnvError;
    use rand::Rng;
    use shoal_core::{Dtype, EnvConfig, ShapeSpec, SpecTable};

    /// Single-player env: obs = last action, done after 3 steps.
    struct Echo {
        steps: i32,
    }

    impl Env for Echo {
        fn create(_spec: &EnvSpec, _env_id: EnvId) -> Result<Self, EnvError> {
            Ok(Self { steps: 0 })
        }

        fn reset(&mut self, ctx: &mut EnvContext<'_>) -> Result<(), EnvError> {
            self.steps = 0;
            let mut state = ctx.allocate(1)?;
            state.set("obs", -1.0f32)?;
            Ok(())
        }

        fn step(&mut self, action: &Action<'_>, ctx: &mut EnvContext<'_>) -> Result<(), EnvError> {
            self.steps += 1;
            let value = action.by_name("act").ok_or(EnvError::failed("no act"))?;
            let value = value.as_slice::<f32>()?[0];
            ctx.allocate(1)?.set("obs", value)?;
            Ok(())
        }

        fn is_done(&self) -> bool {
            self.steps >= 3
        }
    }

    /// Misbehaving env selected by env id: 0 never allocates, 1 fails
    /// after allocating, 2 allocates twice, 3 fails before allocating.
    struct Faulty {
        id: u32,
    }

    impl Env for Faulty {
        fn create(_spec: &EnvSpec, env_id: EnvId) -> Result<Self, EnvError> {
            Ok(Self { id: env_id.0 })
        }

        fn reset(&mut self, ctx: &mut EnvContext<'_>) -> Result<(), EnvError> {
            match self.id {
                0 => Ok(()),
                1 => {
                    ctx.allocate(1)?;
                    Err(EnvError::failed("boom"))
                }
                2 => {
                    ctx.allocate(1)?;
                    ctx.allocate(1)?;
                    Ok(())
                }
                _ => Err(EnvError::failed("early")),
            }
        }

        fn step(&mut self, _action: &Action<'_>, ctx: &mut EnvContext<'_>) -> Result<(), EnvError> {
            self.reset(ctx)
        }

        fn is_done(&self) -> bool {
            false
        }
    }

    fn spec(num_envs: usize) -> Arc<EnvSpec> {
        let config = EnvConfig {
            num_envs,
            seed: 7,
            ..EnvConfig::default()
        };
        let action = SpecTable::new()
            .with("act", ShapeSpec::scalar(Dtype::F32))
            .unwrap();
        let state = SpecTable::new()
            .with("obs", ShapeSpec::scalar(Dtype::F32))
            .unwrap();
        EnvSpec::new("echo", config, action, state)
            .unwrap()
            .into_shared()
    }

    fn queue(spec: &EnvSpec) -> StateBufferQueue {
        StateBufferQueue::from_spec(spec).unwrap()
    }

    fn action_batch(spec: &EnvSpec, values: &[f32]) -> ActionBatch {
        let table = Arc::new(spec.action_spec().clone());
        let mut batch = ActionBatch::zeros(table, values.len(), values.len());
        batch
            .field_by_name_mut("act")
            .unwrap()
            .as_mut_slice::<f32>()
            .unwrap()
            .copy_from_slice(values);
        batch
    }

    #[test]
    fn step_counter_law() {
        let spec = spec(1);
        let queue = queue(&spec);
        let mut driver = EnvDriver::<Echo>::new(Arc::clone(&spec), EnvId(0)).unwrap();
        assert_eq!(driver.elapsed_step(), ELAPSED_STEP_UNSET);

        driver.env_step(&queue, 0, StepInput::Reset).unwrap();
        assert_eq!(driver.elapsed_step(), 0);
        queue.wait_round().unwrap();

        let batch = action_batch(&spec, &[0.5]);
        for expected in 1..=2 {
            driver
                .env_step(&queue, 0, StepInput::step(&batch, 0))
                .unwrap();
            assert_eq!(driver.elapsed_step(), expected);
            queue.wait_round().unwrap();
        }

        driver.env_step(&queue, 0, StepInput::Reset).unwrap();
        assert_eq!(driver.elapsed_step(), 0);
    }

    #[test]
    fn reserved_fields_stamped_after_env_returns() {
        let spec = spec(1);
        let queue = queue(&spec);
        let mut driver = EnvDriver::<Echo>::new(Arc::clone(&spec), EnvId(0)).unwrap();
        driver.env_step(&queue, 0, StepInput::Reset).unwrap();
        queue.wait_round().unwrap();

        let batch = action_batch(&spec, &[2.5]);
        let mut last = None;
        for _ in 0..3 {
            driver
                .env_step(&queue, 0, StepInput::step(&batch, 0))
                .unwrap();
            last = Some(queue.wait_round().unwrap());
        }
        let out = last.unwrap();
        // done is read after the third step updated the env.
        assert_eq!(out.done().unwrap(), &[true]);
        assert_eq!(out.elapsed_steps().unwrap(), &[3]);
        assert_eq!(out.env_ids().unwrap(), &[0]);
        assert_eq!(out.player_env_ids().unwrap(), &[0]);
        assert_eq!(out.typed::<f32>("obs").unwrap(), &[2.5]);
    }

    #[test]
    fn faults_still_publish_their_slot() {
        let spec = spec(4);
        let queue = queue(&spec);
        let mut results = Vec::new();
        for id in 0..4u32 {
            let mut driver = EnvDriver::<Faulty>::new(Arc::clone(&spec), EnvId(id)).unwrap();
            results.push(driver.env_step(&queue, id as usize, StepInput::Reset));
        }
        assert_eq!(
            results[0],
            Err(StepError::MissingAllocation { env_id: EnvId(0) })
        );
        assert_eq!(
            results[1],
            Err(StepError::Env(EnvError::failed("boom")))
        );
        assert_eq!(
            results[2],
            Err(StepError::AlreadyAllocated { env_id: EnvId(2) })
        );
        assert_eq!(
            results[3],
            Err(StepError::Env(EnvError::failed("early")))
        );

        let out = queue.try_round().unwrap().expect("every order published");
        assert_eq!(out.env_ids().unwrap(), &[0, 1, 2, 3]);
        assert_eq!(out.elapsed_steps().unwrap(), &[0, 0, 0, 0]);
        // Placeholders carry no player rows; allocated slots keep theirs.
        assert_eq!(out.player_counts(), &[0, 1, 1, 0]);
    }

    #[test]
    fn bad_env_index_publishes_placeholder() {
        let spec = spec(1);
        let queue = queue(&spec);
        let mut driver = EnvDriver::<Echo>::new(Arc::clone(&spec), EnvId(0)).unwrap();
        let batch = action_batch(&spec, &[1.0]);
        let err = driver
            .env_step(&queue, 0, StepInput::step(&batch, 5))
            .unwrap_err();
        assert!(matches!(err, StepError::Array(_)));
        assert_eq!(queue.try_round().unwrap().unwrap().player_counts(), &[0]);
    }

    #[test]
    fn rng_is_seeded_per_env() {
        let spec = spec(2);
        let a = EnvDriver::<Echo>::new(Arc::clone(&spec), EnvId(0)).unwrap();
        let b = EnvDriver::<Echo>::new(Arc::clone(&spec), EnvId(1)).unwrap();
        assert_eq!(a.seed(), 7);
        assert_eq!(b.seed(), 8);
        let mut expected = ChaCha8Rng::seed_from_u64(8);
        let mut rng = b.rng.clone();
        assert_eq!(rng.random::<u64>(), expected.random::<u64>());
    }
}
