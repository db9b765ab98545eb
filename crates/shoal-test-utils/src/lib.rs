//! Test utilities and reference environments for Shoal development.
//!
//! Provides the reference [`Env`](shoal_env::Env) implementations in
//! [`fixtures`], helpers for building filled [`ActionBatch`]es, and a
//! one-call tracing subscriber for tests and benches.

#![forbid(unsafe_code)]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod fixtures;

use std::sync::Arc;

use shoal_core::{keys, Element, EnvSpec};
use shoal_env::ActionBatch;

pub use fixtures::{counting_spec, team_spec, CountingEnv, LazyEnv, TeamEnv};

/// Install a `fmt` subscriber filtered by `RUST_LOG` (default `warn`).
///
/// Safe to call from every test; only the first call installs.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

/// Zeroed action batch with the reserved id columns filled in.
///
/// `env_ids[i]` targets per-env row `i`; `player_env_ids[r]` routes
/// player row `r`.
pub fn action_batch(spec: &EnvSpec, env_ids: &[i32], player_env_ids: &[i32]) -> ActionBatch {
    let table = Arc::new(spec.action_spec().clone());
    let mut batch = ActionBatch::zeros(table, env_ids.len(), player_env_ids.len());
    fill(&mut batch, keys::ACTION_ENV_ID, env_ids);
    fill(&mut batch, keys::ACTION_PLAYER_ENV_ID, player_env_ids);
    batch
}

/// Single-player batch: one player row per environment, in the same order.
pub fn single_player_batch(spec: &EnvSpec, env_ids: &[i32]) -> ActionBatch {
    action_batch(spec, env_ids, env_ids)
}

/// Overwrite a field of `batch` with `values`.
///
/// # Panics
///
/// Panics if the field is missing or `values` has the wrong type or length.
pub fn fill<T: Element>(batch: &mut ActionBatch, name: &str, values: &[T]) {
    batch
        .field_by_name_mut(name)
        .unwrap_or_else(|| panic!("no action field '{name}'"))
        .as_mut_slice::<T>()
        .unwrap_or_else(|e| panic!("action field '{name}': {e}"))
        .copy_from_slice(values);
}

#[cfg(test)]
mod tests {
    use super::*;
    use shoal_core::EnvConfig;

    #[test]
    fn action_batch_fills_reserved_columns() {
        let spec = team_spec(EnvConfig {
            num_envs: 2,
            max_num_players: 2,
            ..EnvConfig::default()
        })
        .unwrap();
        let batch = action_batch(&spec, &[1, 0], &[0, 1, 1]);
        assert_eq!(batch.env_ids(), Some(&[1, 0][..]));
        assert_eq!(batch.player_env_ids(), Some(&[0, 1, 1][..]));
        assert_eq!(batch.field_by_name("move").unwrap().shape(), &[3, 2]);
    }

    #[test]
    fn reset_players_cycle_through_capacity() {
        let counts: Vec<_> = (0..5)
            .map(|i| TeamEnv::reset_players(shoal_core::EnvId(i), 3))
            .collect();
        assert_eq!(counts, [1, 2, 3, 1, 2]);
    }
}
