//! Field tables and environment specs.

use std::sync::Arc;

use indexmap::IndexMap;

use crate::config::EnvConfig;
use crate::dtype::Dtype;
use crate::error::SpecError;
use crate::keys;
use crate::shape::ShapeSpec;

/// Ordered map from field name to [`ShapeSpec`].
///
/// Fields are addressable both by name and by declaration position; the
/// position is the index into an action batch or an assembled state batch.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SpecTable {
    fields: IndexMap<String, ShapeSpec>,
}

impl SpecTable {
    /// Empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn with(mut self, name: impl Into<String>, spec: ShapeSpec) -> Result<Self, SpecError> {
        self.insert(name, spec)?;
        Ok(self)
    }

    /// Append a field. Names must be unique.
    pub fn insert(&mut self, name: impl Into<String>, spec: ShapeSpec) -> Result<usize, SpecError> {
        let name = name.into();
        if self.fields.contains_key(&name) {
            return Err(SpecError::DuplicateField { name });
        }
        let (index, _) = self.fields.insert_full(name, spec);
        Ok(index)
    }

    /// Look up a field by name.
    pub fn get(&self, name: &str) -> Option<&ShapeSpec> {
        self.fields.get(name)
    }

    /// Position of a field, or [`SpecError::UnknownField`].
    pub fn index_of(&self, name: &str) -> Result<usize, SpecError> {
        self.fields
            .get_index_of(name)
            .ok_or_else(|| SpecError::UnknownField {
                name: name.to_string(),
            })
    }

    /// Name and spec of the field at `index`.
    pub fn get_index(&self, index: usize) -> Option<(&str, &ShapeSpec)> {
        self.fields
            .get_index(index)
            .map(|(name, spec)| (name.as_str(), spec))
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns `true` if the table has no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Fields in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ShapeSpec)> {
        self.fields.iter().map(|(name, spec)| (name.as_str(), spec))
    }

    /// Field names in declaration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// Field specs in declaration order.
    pub fn specs(&self) -> impl Iterator<Item = &ShapeSpec> {
        self.fields.values()
    }

    /// Per-player flag of every field, in declaration order.
    pub fn per_player_mask(&self) -> Vec<bool> {
        self.fields.values().map(ShapeSpec::is_per_player).collect()
    }

    fn prepend_reserved(
        user: &SpecTable,
        reserved: &[(&str, ShapeSpec)],
    ) -> Result<SpecTable, SpecError> {
        let mut out = SpecTable::new();
        for (name, spec) in reserved {
            out.insert(*name, spec.clone())?;
        }
        for (name, spec) in user.iter() {
            if out.fields.contains_key(name) {
                return Err(SpecError::ReservedField {
                    name: name.to_string(),
                });
            }
            out.insert(name, spec.clone())?;
        }
        Ok(out)
    }
}

/// Immutable description of an environment type.
///
/// Built once and shared by `Arc` between every driver, the slot queue
/// and the pool. The action and state tables always start with the
/// reserved fields listed in [`keys`].
#[derive(Clone, Debug, PartialEq)]
pub struct EnvSpec {
    name: String,
    config: EnvConfig,
    action_spec: SpecTable,
    state_spec: Arc<SpecTable>,
}

impl EnvSpec {
    /// Validate `config` and build a spec from the user's field tables.
    ///
    /// The reserved fields are prepended; a user table that redefines
    /// one of them is rejected with [`SpecError::ReservedField`].
    pub fn new(
        name: impl Into<String>,
        config: EnvConfig,
        action: SpecTable,
        state: SpecTable,
    ) -> Result<Self, SpecError> {
        config.validate()?;
        let action_spec = SpecTable::prepend_reserved(
            &action,
            &[
                (keys::ACTION_ENV_ID, ShapeSpec::scalar(Dtype::I32)),
                (
                    keys::ACTION_PLAYER_ENV_ID,
                    ShapeSpec::per_player(Dtype::I32, &[]),
                ),
            ],
        )?;
        let state_spec = SpecTable::prepend_reserved(
            &state,
            &[
                (keys::STATE_DONE, ShapeSpec::scalar(Dtype::Bool)),
                (keys::STATE_ENV_ID, ShapeSpec::scalar(Dtype::I32)),
                (keys::STATE_ELAPSED_STEP, ShapeSpec::scalar(Dtype::I32)),
                (
                    keys::STATE_PLAYER_ENV_ID,
                    ShapeSpec::per_player(Dtype::I32, &[]),
                ),
            ],
        )?;
        Ok(Self {
            name: name.into(),
            config,
            action_spec,
            state_spec: Arc::new(state_spec),
        })
    }

    /// Environment type name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Validated configuration.
    pub fn config(&self) -> &EnvConfig {
        &self.config
    }

    /// Action fields, reserved fields first.
    pub fn action_spec(&self) -> &SpecTable {
        &self.action_spec
    }

    /// State fields, reserved fields first.
    pub fn state_spec(&self) -> &SpecTable {
        &self.state_spec
    }

    /// Shared handle to the state table, as the slot queue holds it.
    pub fn shared_state_spec(&self) -> Arc<SpecTable> {
        Arc::clone(&self.state_spec)
    }

    /// Returns `true` if every environment has exactly one player.
    pub fn is_single_player(&self) -> bool {
        self.config.max_num_players == 1
    }

    /// Wrap in an `Arc` for sharing across drivers.
    pub fn into_shared(self) -> Arc<Self> {
        Arc::new(self)
    }
}
