//! Strongly-typed identifiers.

use std::fmt;

/// Identifies an environment instance within a pool.
///
/// Environments are created with sequential IDs. `EnvId(n)` is the n-th
/// environment of the pool and is the value stamped into the
/// `info:env_id` and `info:players.env_id` state fields.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EnvId(pub u32);

impl EnvId {
    /// The value written into `i32` id fields of action and state batches.
    ///
    /// Pool construction rejects more than `i32::MAX` environments, so the
    /// conversion is lossless for every id a pool hands out.
    pub fn stamp(self) -> i32 {
        i32::try_from(self.0).unwrap_or(i32::MAX)
    }

    /// Position of this environment in a pool's driver list.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for EnvId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for EnvId {
    fn from(v: u32) -> Self {
        Self(v)
    }
}

/// Monotonically increasing round counter.
///
/// A round is one synchronized cycle in which a fixed set of
/// environments each contribute one slot to one assembled batch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RoundId(pub u64);

impl fmt::Display for RoundId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for RoundId {
    fn from(v: u64) -> Self {
        Self(v)
    }
}
