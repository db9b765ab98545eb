//! Reference environments.
//!
//! - [`CountingEnv`]: one player, echoes its action, ends after
//!   `episode_len` steps.
//! - [`TeamEnv`]: several players, echoes each player's `move` row.
//! - [`LazyEnv`]: resets correctly but never allocates on step.

use std::sync::Arc;

use shoal_core::{Dtype, EnvConfig, EnvId, EnvSpec, ShapeSpec, SpecError, SpecTable};
use shoal_env::{Action, Env, EnvContext, EnvError};

/// Episode length used when the `episode_len` extra is absent.
pub const DEFAULT_EPISODE_LEN: i64 = 5;

/// Spec shared by [`CountingEnv`] and [`LazyEnv`].
///
/// Action: `act: f32 [-1]`. State: `obs: f32 [-1]`, `counter: i64 []`.
pub fn counting_spec(config: EnvConfig) -> Result<Arc<EnvSpec>, SpecError> {
    let action = SpecTable::new().with("act", ShapeSpec::per_player(Dtype::F32, &[]))?;
    let state = SpecTable::new()
        .with("obs", ShapeSpec::per_player(Dtype::F32, &[]))?
        .with("counter", ShapeSpec::scalar(Dtype::I64))?;
    Ok(EnvSpec::new("counting", config, action, state)?.into_shared())
}

/// Spec for [`TeamEnv`].
///
/// Action: `move: i32 [-1, 2]`. State: `obs: i32 [-1, 2]`, `players: i32 []`.
pub fn team_spec(config: EnvConfig) -> Result<Arc<EnvSpec>, SpecError> {
    let action = SpecTable::new().with("move", ShapeSpec::per_player(Dtype::I32, &[2]))?;
    let state = SpecTable::new()
        .with("obs", ShapeSpec::per_player(Dtype::I32, &[2]))?
        .with("players", ShapeSpec::scalar(Dtype::I32))?;
    Ok(EnvSpec::new("team", config, action, state)?.into_shared())
}

/// Single-player counter.
///
/// `obs` is the last action (`0.0` after reset); `counter` is the number
/// of steps since reset.
pub struct CountingEnv {
    counter: i64,
    episode_len: i64,
}

impl Env for CountingEnv {
    fn create(spec: &EnvSpec, _env_id: EnvId) -> Result<Self, EnvError> {
        let episode_len = spec
            .config()
            .get_int("episode_len")
            .unwrap_or(DEFAULT_EPISODE_LEN);
        if episode_len < 1 {
            return Err(EnvError::failed(format!(
                "episode_len must be positive, got {episode_len}"
            )));
        }
        Ok(Self {
            counter: 0,
            episode_len,
        })
    }

    fn reset(&mut self, ctx: &mut EnvContext<'_>) -> Result<(), EnvError> {
        self.counter = 0;
        let mut state = ctx.allocate(1)?;
        state.set("obs", 0.0f32)?;
        state.set("counter", 0i64)?;
        Ok(())
    }

    fn step(&mut self, action: &Action<'_>, ctx: &mut EnvContext<'_>) -> Result<(), EnvError> {
        self.counter += 1;
        let act = action
            .by_name("act")
            .ok_or_else(|| EnvError::failed("missing 'act' field"))?;
        let value = act.as_slice::<f32>()?.first().copied().unwrap_or(0.0);
        let mut state = ctx.allocate(1)?;
        state.set("obs", value)?;
        state.set("counter", self.counter)?;
        Ok(())
    }

    fn is_done(&self) -> bool {
        self.counter >= self.episode_len
    }
}

/// Multi-player echo.
///
/// On reset, environment `i` activates `1 + i % max_num_players`
/// players with zeroed observations. On step, it reserves one row per
/// player row routed to it and copies each `move` row to `obs`.
pub struct TeamEnv {
    env_id: EnvId,
}

impl TeamEnv {
    /// Players activated on reset.
    pub fn reset_players(env_id: EnvId, max_num_players: usize) -> usize {
        1 + env_id.index() % max_num_players.max(1)
    }
}

impl Env for TeamEnv {
    fn create(_spec: &EnvSpec, env_id: EnvId) -> Result<Self, EnvError> {
        Ok(Self { env_id })
    }

    fn reset(&mut self, ctx: &mut EnvContext<'_>) -> Result<(), EnvError> {
        let players = Self::reset_players(self.env_id, ctx.config().max_num_players);
        let mut state = ctx.allocate(players)?;
        state.set("players", players as i32)?;
        Ok(())
    }

    fn step(&mut self, action: &Action<'_>, ctx: &mut EnvContext<'_>) -> Result<(), EnvError> {
        let players = action.player_num();
        let moves = action
            .by_name("move")
            .ok_or_else(|| EnvError::failed("missing 'move' field"))?;
        let mut state = ctx.allocate(players)?;
        state.field("obs")?.assign(&moves)?;
        state.set("players", players as i32)?;
        Ok(())
    }

    fn is_done(&self) -> bool {
        false
    }
}

/// Resets like [`CountingEnv`] but returns from `step` without
/// allocating its state slot.
pub struct LazyEnv;

impl Env for LazyEnv {
    fn create(_spec: &EnvSpec, _env_id: EnvId) -> Result<Self, EnvError> {
        Ok(Self)
    }

    fn reset(&mut self, ctx: &mut EnvContext<'_>) -> Result<(), EnvError> {
        ctx.allocate(1)?;
        Ok(())
    }

    fn step(&mut self, _action: &Action<'_>, _ctx: &mut EnvContext<'_>) -> Result<(), EnvError> {
        Ok(())
    }

    fn is_done(&self) -> bool {
        false
    }
}
