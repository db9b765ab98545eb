//! Environment configuration and validation.
//!
//! [`EnvConfig`] carries the pool-level knobs every environment type
//! shares plus an ordered bag of environment-specific extras.
//! [`validate()`](EnvConfig::validate) checks structural invariants once,
//! when an [`EnvSpec`](crate::EnvSpec) is built.

use std::fmt;

use indexmap::IndexMap;

use crate::error::SpecError;
use crate::id::EnvId;

// ── ConfigValue ────────────────────────────────────────────────────

/// A dynamically-typed configuration value.
#[derive(Clone, Debug, PartialEq)]
pub enum ConfigValue {
    /// Integer value.
    Int(i64),
    /// Floating-point value.
    Float(f64),
    /// Boolean flag.
    Bool(bool),
    /// String value.
    Str(String),
}

impl ConfigValue {
    /// Integer payload.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Float payload. Integers convert.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            Self::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    /// Boolean payload.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// String payload.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for ConfigValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Str(v) => write!(f, "{v:?}"),
        }
    }
}

impl From<i64> for ConfigValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for ConfigValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<bool> for ConfigValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<&str> for ConfigValue {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

impl From<String> for ConfigValue {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

// ── EnvConfig ──────────────────────────────────────────────────────

/// Pool-level configuration shared by every environment of a spec.
#[derive(Clone, Debug, PartialEq)]
pub struct EnvConfig {
    /// Number of environment instances. Default: 1.
    pub num_envs: usize,
    /// Environments per round. `0` means `num_envs`. Default: 0.
    pub batch_size: usize,
    /// Worker threads. `0` = auto-detect (`available_parallelism`,
    /// clamped to `[1, num_envs]`). Default: 0.
    pub num_threads: usize,
    /// Upper bound on players per environment. Default: 1.
    pub max_num_players: usize,
    /// Base seed; environment `i` is seeded with `seed + i`. Default: 42.
    pub seed: u64,
    /// Rounds the slot queue keeps in flight. Default: 2.
    pub queue_capacity: usize,
    /// Environment-specific keys, in insertion order.
    pub extras: IndexMap<String, ConfigValue>,
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self {
            num_envs: 1,
            batch_size: 0,
            num_threads: 0,
            max_num_players: 1,
            seed: 42,
            queue_capacity: 2,
            extras: IndexMap::new(),
        }
    }
}

impl EnvConfig {
    /// Names of the built-in keys, in lookup order.
    pub const BUILTIN_KEYS: [&'static str; 6] = [
        "num_envs",
        "batch_size",
        "num_threads",
        "max_num_players",
        "seed",
        "queue_capacity",
    ];

    /// Check structural invariants.
    pub fn validate(&self) -> Result<(), SpecError> {
        let fail = |reason: String| Err(SpecError::InvalidConfig { reason });
        if self.num_envs == 0 {
            return fail("num_envs must be at least 1".into());
        }
        if i32::try_from(self.num_envs).is_err() {
            return fail(format!(
                "num_envs {} exceeds the i32 id range",
                self.num_envs
            ));
        }
        if self.max_num_players == 0 {
            return fail("max_num_players must be at least 1".into());
        }
        if self.queue_capacity == 0 {
            return fail("queue_capacity must be at least 1".into());
        }
        if self.batch_size > self.num_envs {
            return fail(format!(
                "batch_size {} exceeds num_envs {}",
                self.batch_size, self.num_envs
            ));
        }
        for key in self.extras.keys() {
            if Self::BUILTIN_KEYS.contains(&key.as_str()) {
                return fail(format!("extra key '{key}' shadows a built-in key"));
            }
        }
        Ok(())
    }

    /// Builder-style insertion of an environment-specific key.
    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<ConfigValue>) -> Self {
        self.extras.insert(key.into(), value.into());
        self
    }

    /// Symbolic lookup over built-in keys and extras.
    ///
    /// Built-in values that do not fit an `i64` read as absent.
    pub fn get(&self, key: &str) -> Option<ConfigValue> {
        let int = |v: usize| i64::try_from(v).ok().map(ConfigValue::Int);
        match key {
            "num_envs" => int(self.num_envs),
            "batch_size" => int(self.batch_size),
            "num_threads" => int(self.num_threads),
            "max_num_players" => int(self.max_num_players),
            "seed" => i64::try_from(self.seed).ok().map(ConfigValue::Int),
            "queue_capacity" => int(self.queue_capacity),
            _ => self.extras.get(key).cloned(),
        }
    }

    /// Integer lookup.
    pub fn get_int(&self, key: &str) -> Option<i64> {
        self.get(key)?.as_int()
    }

    /// Float lookup; integer values convert.
    pub fn get_float(&self, key: &str) -> Option<f64> {
        self.get(key)?.as_float()
    }

    /// Boolean lookup.
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key)?.as_bool()
    }

    /// String lookup.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.extras.get(key)?.as_str()
    }

    /// Environments per round, with `0` resolved to `num_envs`.
    pub fn resolved_batch_size(&self) -> usize {
        if self.batch_size == 0 {
            self.num_envs
        } else {
            self.batch_size
        }
    }

    /// Worker thread count, applying auto-detection if `0`.
    pub fn resolved_num_threads(&self) -> usize {
        let upper = self.num_envs.max(1);
        match self.num_threads {
            0 => std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
                .clamp(1, upper),
            n => n.clamp(1, upper),
        }
    }

    /// Seed for one environment's RNG.
    pub fn env_seed(&self, env_id: EnvId) -> u64 {
        self.seed.wrapping_add(u64::from(env_id.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        let config = EnvConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.resolved_batch_size(), 1);
        assert_eq!(config.resolved_num_threads(), 1);
    }

    #[test]
    fn batch_size_above_num_envs_rejected() {
        let config = EnvConfig {
            num_envs: 2,
            batch_size: 3,
            ..EnvConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(SpecError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn zero_players_or_capacity_rejected() {
        for config in [
            EnvConfig {
                max_num_players: 0,
                ..EnvConfig::default()
            },
            EnvConfig {
                queue_capacity: 0,
                ..EnvConfig::default()
            },
        ] {
            assert!(config.validate().is_err());
        }
    }

    #[test]
    fn extras_cannot_shadow_builtins() {
        let config = EnvConfig::default().with_extra("seed", 7i64);
        assert!(config.validate().is_err());
    }

    #[test]
    fn symbolic_lookup_covers_builtins_and_extras() {
        let config = EnvConfig {
            num_envs: 8,
            ..EnvConfig::default()
        }
        .with_extra("gravity", 9.81)
        .with_extra("map", "arena")
        .with_extra("render", false);
        assert_eq!(config.get_int("num_envs"), Some(8));
        assert_eq!(config.get_int("seed"), Some(42));
        assert_eq!(config.get_float("gravity"), Some(9.81));
        assert_eq!(config.get_float("num_envs"), Some(8.0));
        assert_eq!(config.get_str("map"), Some("arena"));
        assert_eq!(config.get_bool("render"), Some(false));
        assert_eq!(config.get("missing"), None);
        assert_eq!(config.get_int("map"), None);
    }

    #[test]
    fn seed_beyond_i64_is_not_wrapped() {
        let config = EnvConfig {
            seed: u64::MAX,
            ..EnvConfig::default()
        };
        assert_eq!(config.get("seed"), None);
        let config = EnvConfig {
            seed: i64::MAX as u64,
            ..EnvConfig::default()
        };
        assert_eq!(config.get_int("seed"), Some(i64::MAX));
    }

    #[test]
    fn explicit_threads_clamped_to_envs() {
        let config = EnvConfig {
            num_envs: 3,
            num_threads: 16,
            ..EnvConfig::default()
        };
        assert_eq!(config.resolved_num_threads(), 3);
    }

    #[test]
    fn env_seed_offsets_base() {
        let config = EnvConfig {
            seed: 100,
            ..EnvConfig::default()
        };
        assert_eq!(config.env_seed(EnvId(0)), 100);
        assert_eq!(config.env_seed(EnvId(5)), 105);
    }
}
