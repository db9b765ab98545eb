//! Names and positions of the reserved action and state fields.
//!
//! [`EnvSpec::new`](crate::EnvSpec::new) prepends these fields to every
//! user table, so their positions are fixed for all environment types.

/// Action field naming the environment of each per-env row.
pub const ACTION_ENV_ID: &str = "env_id";
/// Position of [`ACTION_ENV_ID`] in the action table.
pub const ACTION_ENV_ID_INDEX: usize = 0;

/// Action field mapping each player row to its environment.
pub const ACTION_PLAYER_ENV_ID: &str = "players.env_id";
/// Position of [`ACTION_PLAYER_ENV_ID`] in the action table.
pub const ACTION_PLAYER_ENV_ID_INDEX: usize = 1;

/// State field flagging episode termination.
pub const STATE_DONE: &str = "done";
/// Position of [`STATE_DONE`] in the state table.
pub const STATE_DONE_INDEX: usize = 0;

/// State field holding the producing environment's id.
pub const STATE_ENV_ID: &str = "info:env_id";
/// Position of [`STATE_ENV_ID`] in the state table.
pub const STATE_ENV_ID_INDEX: usize = 1;

/// State field holding the environment's step counter.
pub const STATE_ELAPSED_STEP: &str = "elapsed_step";
/// Position of [`STATE_ELAPSED_STEP`] in the state table.
pub const STATE_ELAPSED_STEP_INDEX: usize = 2;

/// State field mapping each player row to its environment.
pub const STATE_PLAYER_ENV_ID: &str = "info:players.env_id";
/// Position of [`STATE_PLAYER_ENV_ID`] in the state table.
pub const STATE_PLAYER_ENV_ID_INDEX: usize = 3;

/// All reserved action field names, in table order.
pub const RESERVED_ACTION: [&str; 2] = [ACTION_ENV_ID, ACTION_PLAYER_ENV_ID];

/// All reserved state field names, in table order.
pub const RESERVED_STATE: [&str; 4] = [
    STATE_DONE,
    STATE_ENV_ID,
    STATE_ELAPSED_STEP,
    STATE_PLAYER_ENV_ID,
];
