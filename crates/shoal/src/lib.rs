//! Shoal: the execution and data-plane core of a vectorized environment pool.
//!
//! This is the top-level facade crate that re-exports the public API from all
//! Shoal sub-crates. For most users, adding `shoal` as a single dependency is
//! sufficient.
//!
//! # Quick start
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use shoal::prelude::*;
//!
//! // Scores one point whenever the guess is positive.
//! struct Guess {
//!     score: i32,
//! }
//!
//! impl Env for Guess {
//!     fn create(_spec: &EnvSpec, _env_id: EnvId) -> Result<Self, EnvError> {
//!         Ok(Self { score: 0 })
//!     }
//!
//!     fn reset(&mut self, ctx: &mut EnvContext<'_>) -> Result<(), EnvError> {
//!         self.score = 0;
//!         ctx.allocate(1)?.set("score", 0i32)?;
//!         Ok(())
//!     }
//!
//!     fn step(&mut self, action: &Action<'_>, ctx: &mut EnvContext<'_>) -> Result<(), EnvError> {
//!         let guess = action
//!             .by_name("guess")
//!             .ok_or_else(|| EnvError::failed("no guess"))?;
//!         if guess.as_slice::<i32>()?.iter().any(|&g| g > 0) {
//!             self.score += 1;
//!         }
//!         ctx.allocate(1)?.set("score", self.score)?;
//!         Ok(())
//!     }
//!
//!     fn is_done(&self) -> bool {
//!         self.score >= 3
//!     }
//! }
//!
//! let config = EnvConfig { num_envs: 2, ..EnvConfig::default() };
//! let action = SpecTable::new().with("guess", ShapeSpec::per_player(Dtype::I32, &[]))?;
//! let state = SpecTable::new().with("score", ShapeSpec::scalar(Dtype::I32))?;
//! let spec = EnvSpec::new("guess", config, action, state)?.into_shared();
//!
//! let mut pool = EnvPool::<Guess>::new(spec.clone())?;
//! pool.reset_all()?;
//!
//! let mut batch = ActionBatch::zeros(Arc::new(spec.action_spec().clone()), 2, 2);
//! for key in [keys::ACTION_ENV_ID, keys::ACTION_PLAYER_ENV_ID] {
//!     if let Some(mut ids) = batch.field_by_name_mut(key) {
//!         ids.as_mut_slice::<i32>()?.copy_from_slice(&[0, 1]);
//!     }
//! }
//! if let Some(mut guess) = batch.field_by_name_mut("guess") {
//!     guess.as_mut_slice::<i32>()?.copy_from_slice(&[1, -1]);
//! }
//!
//! let out = pool.step(batch)?;
//! assert_eq!(out.typed::<i32>("score")?, &[1, 0]);
//! assert_eq!(out.elapsed_steps()?, &[1, 1]);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # Modules
//!
//! | Module | Sub-crate | Contents |
//! |--------|-----------|----------|
//! | [`types`] | `shoal-core` | Arrays and views, dtypes, spec tables, config, ids |
//! | [`buffer`] | `shoal-buffer` | Round-scoped state buffer queue and assembled batches |
//! | [`env`] | `shoal-env` | `Env` trait, action demultiplexer, per-environment driver |
//! | [`engine`] | `shoal-engine` | Worker-pool harness |

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

/// Arrays, dtypes, spec tables, configuration and ids (`shoal-core`).
///
/// Reserved field names and their positions live in [`types::keys`].
pub use shoal_core as types;

/// The state buffer queue (`shoal-buffer`).
///
/// Use [`buffer::StateBufferQueue`] directly when driving environments
/// from your own scheduler instead of [`engine::EnvPool`].
pub use shoal_buffer as buffer;

/// Environment capability and driver (`shoal-env`).
pub use shoal_env as env;

/// Worker-pool harness (`shoal-engine`).
pub use shoal_engine as engine;

/// Common imports for typical Shoal usage.
///
/// ```rust
/// use shoal::prelude::*;
/// ```
pub mod prelude {
    // Core types
    pub use shoal_core::{
        keys, Array, ArrayView, ArrayViewMut, ConfigValue, Dtype, Element, EnvConfig, EnvId,
        EnvSpec, RoundId, ShapeSpec, SpecTable,
    };

    // Errors
    pub use shoal_buffer::BufferError;
    pub use shoal_core::{ArrayError, SpecError};
    pub use shoal_engine::PoolError;
    pub use shoal_env::{BatchError, EnvError, StepError};

    // Buffer queue
    pub use shoal_buffer::{StateBatch, StateBufferQueue, WritableSlice};

    // Environments
    pub use shoal_env::{
        Action, ActionBatch, ActionDemux, Env, EnvContext, EnvDriver, State, StepInput,
    };

    // Engine
    pub use shoal_engine::EnvPool;
}
