//! Execution context passed to environments during reset and step.
//!
//! [`EnvContext`] gives an environment its identity, configuration,
//! step counter and RNG, plus the single operation that reserves its
//! output: [`allocate`](EnvContext::allocate). The returned [`State`]
//! writes straight into the round's slot for this environment.

use rand_chacha::ChaCha8Rng;
use shoal_buffer::{StateBufferQueue, WritableSlice};
use shoal_core::{ArrayViewMut, Element, EnvConfig, EnvId, EnvSpec, RoundId};

use crate::error::EnvError;

/// Lifecycle of the output slot within one `env_step` call.
#[derive(Debug)]
pub(crate) enum SlotState {
    Unallocated,
    Allocated(WritableSlice),
    Published,
}

/// Per-call context handed to [`Env::reset`](crate::Env::reset) and
/// [`Env::step`](crate::Env::step).
///
/// Lives for exactly one `env_step` call; the queue reference and the
/// slot never escape it.
pub struct EnvContext<'a> {
    env_id: EnvId,
    spec: &'a EnvSpec,
    elapsed_step: i32,
    rng: &'a mut ChaCha8Rng,
    queue: &'a StateBufferQueue,
    order: usize,
    slot: SlotState,
    repeat_allocation: bool,
}

impl<'a> EnvContext<'a> {
    pub(crate) fn new(
        env_id: EnvId,
        spec: &'a EnvSpec,
        elapsed_step: i32,
        rng: &'a mut ChaCha8Rng,
        queue: &'a StateBufferQueue,
        order: usize,
    ) -> Self {
        Self {
            env_id,
            spec,
            elapsed_step,
            rng,
            queue,
            order,
            slot: SlotState::Unallocated,
            repeat_allocation: false,
        }
    }

    /// Id of the environment being driven.
    pub fn env_id(&self) -> EnvId {
        self.env_id
    }

    /// Spec of the environment type.
    pub fn spec(&self) -> &EnvSpec {
        self.spec
    }

    /// Shorthand for `spec().config()`.
    pub fn config(&self) -> &EnvConfig {
        self.spec.config()
    }

    /// Step counter after this call's update: `0` on reset.
    pub fn elapsed_step(&self) -> i32 {
        self.elapsed_step
    }

    /// The driver's RNG, seeded with `seed + env_id`.
    pub fn rng(&mut self) -> &mut ChaCha8Rng {
        self.rng
    }

    /// Position of this environment's slot in the round.
    pub fn order(&self) -> usize {
        self.order
    }

    /// Returns `true` once [`allocate`](Self::allocate) has succeeded.
    pub fn is_allocated(&self) -> bool {
        matches!(self.slot, SlotState::Allocated(_))
    }

    /// Reserve this environment's output slot for `player_num` players.
    ///
    /// Must be called exactly once per reset or step. May block while
    /// every in-flight round already holds this environment's order.
    pub fn allocate(&mut self, player_num: usize) -> Result<State<'_>, EnvError> {
        if !matches!(self.slot, SlotState::Unallocated) {
            self.repeat_allocation = true;
            return Err(EnvError::AlreadyAllocated);
        }
        let slice = self.queue.allocate(player_num, self.order)?;
        self.slot = SlotState::Allocated(slice);
        self.state()
    }

    /// Writer for the slot reserved by [`allocate`](Self::allocate).
    pub fn state(&mut self) -> Result<State<'_>, EnvError> {
        match &mut self.slot {
            SlotState::Allocated(slice) => Ok(State { slice }),
            _ => Err(EnvError::NotAllocated),
        }
    }

    /// Hand the slot to the driver for stamping and publication.
    pub(crate) fn take_slot(&mut self) -> Option<WritableSlice> {
        match std::mem::replace(&mut self.slot, SlotState::Published) {
            SlotState::Allocated(slice) => Some(slice),
            _ => None,
        }
    }

    pub(crate) fn repeat_allocation(&self) -> bool {
        self.repeat_allocation
    }
}

/// Named writer over an allocated state slot.
///
/// Per-env fields are single rows (a scalar field is a zero-dimensional
/// view); per-player fields have `player_num` rows.
pub struct State<'s> {
    slice: &'s mut WritableSlice,
}

impl State<'_> {
    /// Player rows reserved.
    pub fn player_num(&self) -> usize {
        self.slice.player_num()
    }

    /// Position of the slot in its round.
    pub fn order(&self) -> usize {
        self.slice.order()
    }

    /// Round the slot belongs to.
    pub fn round(&self) -> RoundId {
        self.slice.round()
    }

    /// Mutable view of a field by name.
    pub fn field(&mut self, name: &str) -> Result<ArrayViewMut<'_>, EnvError> {
        Ok(self.slice.field_mut_by_name(name)?)
    }

    /// Mutable view of a field by declaration position.
    pub fn field_at(&mut self, index: usize) -> Result<ArrayViewMut<'_>, EnvError> {
        Ok(self.slice.field_mut(index)?)
    }

    /// Set every element of a field to `value`.
    pub fn set<T: Element>(&mut self, name: &str, value: T) -> Result<(), EnvError> {
        self.field(name)?.set(value)?;
        Ok(())
    }

    /// Copy `values` into a field, element for element.
    pub fn write<T: Element>(&mut self, name: &str, values: &[T]) -> Result<(), EnvError> {
        let mut view = self.field(name)?;
        let dst = view.as_mut_slice::<T>()?;
        if dst.len() != values.len() {
            return Err(EnvError::Array(shoal_core::ArrayError::LengthMismatch {
                expected: dst.len(),
                found: values.len(),
            }));
        }
        dst.copy_from_slice(values);
        Ok(())
    }
}
