//! Integration test: environment failures never wedge the pool.
//!
//! A failing or non-allocating environment still produces a slot for
//! its order, so the round retires, the failure surfaces as
//! `PoolError::Step` together with the assembled round, and the next
//! round runs normally.

use shoal_core::{EnvConfig, EnvId, EnvSpec};
use shoal_engine::{EnvPool, PoolError};
use shoal_env::{Action, Env, EnvContext, EnvError, StepError};
use shoal_test_utils::{
    counting_spec, fill, init_tracing, single_player_batch, CountingEnv, LazyEnv,
};

// ── Failing environment ──────────────────────────────────────────────

/// Echoes its action into `obs`, then rejects negative actions.
struct Picky;

impl Env for Picky {
    fn create(_spec: &EnvSpec, _env_id: EnvId) -> Result<Self, EnvError> {
        Ok(Self)
    }

    fn reset(&mut self, ctx: &mut EnvContext<'_>) -> Result<(), EnvError> {
        ctx.allocate(1)?;
        Ok(())
    }

    fn step(&mut self, action: &Action<'_>, ctx: &mut EnvContext<'_>) -> Result<(), EnvError> {
        let act = action
            .by_name("act")
            .ok_or_else(|| EnvError::failed("missing act"))?;
        let value = act.as_slice::<f32>()?.first().copied().unwrap_or_default();
        ctx.allocate(1)?.set("obs", value)?;
        if value < 0.0 {
            return Err(EnvError::failed("negative action"));
        }
        Ok(())
    }

    fn is_done(&self) -> bool {
        false
    }
}

fn config(num_envs: usize) -> EnvConfig {
    EnvConfig {
        num_envs,
        num_threads: 2,
        ..EnvConfig::default()
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[test]
fn missing_allocation_surfaces_and_round_retires() {
    init_tracing();
    let spec = counting_spec(config(3)).unwrap();
    let mut pool = EnvPool::<LazyEnv>::new(spec.clone()).unwrap();
    pool.reset_all().unwrap();

    let err = pool.step(single_player_batch(&spec, &[0, 1, 2])).unwrap_err();
    match err {
        PoolError::Step { env_id, error, batch } => {
            assert_eq!(env_id, EnvId(0));
            assert_eq!(error, StepError::MissingAllocation { env_id: EnvId(0) });
            // Placeholder slots still carry the reserved columns.
            assert_eq!(batch.env_ids().unwrap(), &[0, 1, 2]);
            assert_eq!(batch.elapsed_steps().unwrap(), &[1, 1, 1]);
        }
        other => panic!("expected a step failure, got {other:?}"),
    }
    assert_eq!(pool.in_flight(), 0);

    // The lowest order is reported, whatever the env id.
    let err = pool.step(single_player_batch(&spec, &[2, 1, 0])).unwrap_err();
    assert!(matches!(err, PoolError::Step { env_id: EnvId(2), .. }));

    let state = pool.reset_all().unwrap();
    assert_eq!(state.elapsed_steps().unwrap(), &[0, 0, 0]);
    assert_eq!(state.player_counts(), &[1, 1, 1]);
}

#[test]
fn env_error_keeps_written_slot() {
    init_tracing();
    let spec = counting_spec(config(2)).unwrap();
    let mut pool = EnvPool::<Picky>::new(spec.clone()).unwrap();
    pool.reset_all().unwrap();

    let mut batch = single_player_batch(&spec, &[0, 1]);
    fill(&mut batch, "act", &[0.5f32, -1.0]);
    let err = pool.step(batch).unwrap_err();
    assert!(matches!(
        err,
        PoolError::Step {
            env_id: EnvId(1),
            error: StepError::Env(EnvError::Failed { .. }),
            ..
        }
    ));

    // Env 0's output for the failed round is still delivered, and so is
    // what env 1 wrote before failing.
    let failed = err.into_batch().unwrap();
    assert_eq!(failed.env_ids().unwrap(), &[0, 1]);
    assert_eq!(failed.elapsed_steps().unwrap(), &[1, 1]);
    assert_eq!(failed.typed::<f32>("obs").unwrap(), &[0.5, -1.0]);

    let mut batch = single_player_batch(&spec, &[0, 1]);
    fill(&mut batch, "act", &[0.25f32, 0.75]);
    let state = pool.step(batch).unwrap();
    assert_eq!(state.elapsed_steps().unwrap(), &[2, 2]);
    assert_eq!(state.typed::<f32>("obs").unwrap(), &[0.25, 0.75]);
}

#[test]
fn failed_round_does_not_disturb_pipelined_round() {
    init_tracing();
    let spec = counting_spec(config(2)).unwrap();
    let mut pool = EnvPool::<Picky>::new(spec.clone()).unwrap();
    pool.reset_all().unwrap();

    let mut bad = single_player_batch(&spec, &[0, 1]);
    fill(&mut bad, "act", &[-1.0f32, 0.0]);
    pool.send(bad).unwrap();
    pool.send(single_player_batch(&spec, &[0, 1])).unwrap();

    assert!(matches!(
        pool.recv(),
        Err(PoolError::Step { env_id: EnvId(0), .. })
    ));
    let state = pool.recv().unwrap();
    assert_eq!(state.elapsed_steps().unwrap(), &[2, 2]);
}

#[test]
fn create_failure_reported_per_env() {
    init_tracing();
    let spec = counting_spec(config(2).with_extra("episode_len", 0i64)).unwrap();
    let err = EnvPool::<CountingEnv>::new(spec).err().unwrap();
    assert!(matches!(
        err,
        PoolError::Create {
            env_id: EnvId(0),
            error: StepError::Env(EnvError::Failed { .. }),
        }
    ));
}

#[test]
fn invalid_config_rejected() {
    let spec = counting_spec(EnvConfig {
        num_envs: 2,
        batch_size: 4,
        ..EnvConfig::default()
    });
    // EnvSpec::new already validates the config.
    assert!(spec.is_err());
}

#[test]
fn calls_after_shutdown_fail() {
    let spec = counting_spec(config(2)).unwrap();
    let mut pool = EnvPool::<CountingEnv>::new(spec.clone()).unwrap();
    pool.shutdown();
    assert_eq!(
        pool.send(single_player_batch(&spec, &[0, 1])).unwrap_err(),
        PoolError::ShutDown
    );
    assert_eq!(pool.recv().unwrap_err(), PoolError::ShutDown);
}
