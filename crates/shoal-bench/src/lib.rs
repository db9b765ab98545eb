//! Benchmark profiles for the Shoal environment pool.
//!
//! - [`team_profile`]: multi-player spec sized for a benchmark run
//! - [`grouped_batch`]: player rows grouped by environment (slice path)
//! - [`interleaved_batch`]: player rows dealt round-robin (gather path)

#![forbid(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use std::sync::Arc;

use shoal_core::{EnvConfig, EnvSpec};
use shoal_env::ActionBatch;
use shoal_test_utils::{action_batch, fill, team_spec};

/// `TeamEnv` spec with `num_envs` environments of up to `players` players.
pub fn team_profile(num_envs: usize, players: usize) -> Arc<EnvSpec> {
    team_spec(EnvConfig {
        num_envs,
        max_num_players: players,
        ..EnvConfig::default()
    })
    .unwrap()
}

/// Every environment owns `players` consecutive rows.
pub fn grouped_batch(spec: &EnvSpec, num_envs: usize, players: usize) -> ActionBatch {
    let mapping: Vec<i32> = (0..num_envs as i32)
        .flat_map(|env| std::iter::repeat_n(env, players))
        .collect();
    batch_with_mapping(spec, num_envs, &mapping)
}

/// Row `r` belongs to environment `r % num_envs`, so no environment's
/// rows are contiguous once `players > 1`.
pub fn interleaved_batch(spec: &EnvSpec, num_envs: usize, players: usize) -> ActionBatch {
    let mapping: Vec<i32> = (0..num_envs * players)
        .map(|row| (row % num_envs) as i32)
        .collect();
    batch_with_mapping(spec, num_envs, &mapping)
}

fn batch_with_mapping(spec: &EnvSpec, num_envs: usize, mapping: &[i32]) -> ActionBatch {
    let env_ids: Vec<i32> = (0..num_envs as i32).collect();
    let mut batch = action_batch(spec, &env_ids, mapping);
    let moves: Vec<i32> = (0..mapping.len() as i32 * 2).collect();
    fill(&mut batch, "move", &moves);
    batch
}
