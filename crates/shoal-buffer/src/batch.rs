//! Assembled round output.

use shoal_core::{keys, Array, Element, RoundId, SpecError, SpecTable};

use crate::error::BufferError;
use crate::slot::SlotStorage;

/// One retired round, copied into contiguous per-field arrays.
///
/// Per-env fields are shaped `[batch_size, ...row]` with row `i` taken
/// from the slot at order `i`. Per-player fields are shaped
/// `[total_players, ...row]`: the player rows of order 0, then order 1,
/// and so on.
///
/// A batch owns its data, so it stays valid while later rounds reuse
/// the queue's slot storage.
#[derive(Clone, Debug, PartialEq)]
pub struct StateBatch {
    round: RoundId,
    names: Vec<String>,
    fields: Vec<Array>,
    player_counts: Vec<usize>,
}

impl StateBatch {
    pub(crate) fn assemble(
        round: RoundId,
        spec: &SpecTable,
        per_player: &[bool],
        slots: &[SlotStorage],
        player_counts: Vec<usize>,
    ) -> Result<Self, BufferError> {
        let total_players: usize = player_counts.iter().sum();
        let mut fields = Vec::with_capacity(spec.len());
        for (index, shape) in spec.specs().enumerate() {
            let per_player = per_player[index];
            let mut out = shape.zeros(if per_player {
                total_players
            } else {
                slots.len()
            });
            let mut offset = 0;
            for (order, slot) in slots.iter().enumerate() {
                let players = player_counts[order];
                let src = slot.rows(index, per_player, players)?;
                let rows = src.rows();
                out.slice_mut(offset, offset + rows)?.assign(&src)?;
                offset += rows;
            }
            fields.push(out);
        }
        Ok(Self {
            round,
            names: spec.names().map(str::to_string).collect(),
            fields,
            player_counts,
        })
    }

    /// Round this batch was assembled from.
    pub fn round(&self) -> RoundId {
        self.round
    }

    /// Number of environments (slots) in the batch.
    pub fn len(&self) -> usize {
        self.player_counts.len()
    }

    /// Returns `true` if the batch holds no environments.
    pub fn is_empty(&self) -> bool {
        self.player_counts.is_empty()
    }

    /// Player rows contributed by each order.
    pub fn player_counts(&self) -> &[usize] {
        &self.player_counts
    }

    /// Total player rows across the batch.
    pub fn total_players(&self) -> usize {
        self.player_counts.iter().sum()
    }

    /// Field by name.
    pub fn field(&self, name: &str) -> Option<&Array> {
        let index = self.names.iter().position(|n| n == name)?;
        self.fields.get(index)
    }

    /// Field by declaration position.
    pub fn field_at(&self, index: usize) -> Option<&Array> {
        self.fields.get(index)
    }

    /// `(name, array)` pairs in declaration order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &Array)> {
        self.names.iter().map(String::as_str).zip(&self.fields)
    }

    /// Typed access to a field by name.
    pub fn typed<T: Element>(&self, name: &str) -> Result<&[T], BufferError> {
        let field = self.field(name).ok_or_else(|| SpecError::UnknownField {
            name: name.to_string(),
        })?;
        field.as_slice::<T>().map_err(BufferError::from)
    }

    /// The `done` flag of every environment.
    pub fn done(&self) -> Result<&[bool], BufferError> {
        self.typed(keys::STATE_DONE)
    }

    /// The producing environment id of every row.
    pub fn env_ids(&self) -> Result<&[i32], BufferError> {
        self.typed(keys::STATE_ENV_ID)
    }

    /// The step counter of every environment.
    pub fn elapsed_steps(&self) -> Result<&[i32], BufferError> {
        self.typed(keys::STATE_ELAPSED_STEP)
    }

    /// The owning environment id of every player row.
    pub fn player_env_ids(&self) -> Result<&[i32], BufferError> {
        self.typed(keys::STATE_PLAYER_ENV_ID)
    }

    /// Split into `(name, array)` pairs.
    pub fn into_fields(self) -> Vec<(String, Array)> {
        self.names.into_iter().zip(self.fields).collect()
    }
}
