//! The [`Env`] capability trait.

use shoal_core::{EnvId, EnvSpec};

use crate::action::Action;
use crate::context::EnvContext;
use crate::error::EnvError;

/// A concrete environment driven by an [`EnvDriver`](crate::EnvDriver).
///
/// # Contract
///
/// - `reset` and `step` must call [`EnvContext::allocate`] exactly once
///   and write their output through the returned
///   [`State`](crate::State). The driver stamps `done`, `info:env_id`,
///   `elapsed_step` and `info:players.env_id` afterwards.
/// - `is_done` is read after `reset`/`step` returns, so it must reflect
///   the state just produced.
///
/// # Examples
///
/// ```
/// use shoal_core::{EnvId, EnvSpec};
/// use shoal_env::{Action, Env, EnvContext, EnvError};
///
/// struct Countdown {
///     left: u32,
/// }
///
/// impl Env for Countdown {
///     fn create(_spec: &EnvSpec, _env_id: EnvId) -> Result<Self, EnvError> {
///         Ok(Self { left: 3 })
///     }
///
///     fn reset(&mut self, ctx: &mut EnvContext<'_>) -> Result<(), EnvError> {
///         self.left = 3;
///         ctx.allocate(1)?;
///         Ok(())
///     }
///
///     fn step(&mut self, _action: &Action<'_>, ctx: &mut EnvContext<'_>) -> Result<(), EnvError> {
///         self.left = self.left.saturating_sub(1);
///         ctx.allocate(1)?;
///         Ok(())
///     }
///
///     fn is_done(&self) -> bool {
///         self.left == 0
///     }
/// }
/// ```
pub trait Env: Send + Sized {
    /// Build the environment with id `env_id`.
    fn create(spec: &EnvSpec, env_id: EnvId) -> Result<Self, EnvError>;

    /// Start a new episode.
    fn reset(&mut self, ctx: &mut EnvContext<'_>) -> Result<(), EnvError>;

    /// Advance one step with this environment's share of the round's actions.
    fn step(&mut self, action: &Action<'_>, ctx: &mut EnvContext<'_>) -> Result<(), EnvError>;

    /// Whether the current episode has ended.
    fn is_done(&self) -> bool;
}
