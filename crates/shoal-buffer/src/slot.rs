//! Per-slot storage and the writable handle environments fill.
//!
//! A slot is the region of one round that belongs to one `order`. Its
//! storage is owned by the queue while vacant, moved into a
//! [`WritableSlice`] by [`allocate`](crate::StateBufferQueue::allocate),
//! and moved back by [`done_write`](WritableSlice::done_write). Writes
//! therefore never happen under the queue lock and never alias another
//! slot.

use std::sync::Arc;

use shoal_core::{Array, ArrayView, ArrayViewMut, RoundId, SpecTable};

use crate::error::BufferError;
use crate::queue::Shared;

/// Storage for one slot: one array per state field.
///
/// Per-env fields are shaped `[1, ...row]`; per-player fields are
/// shaped `[max_num_players, ...row]`.
#[derive(Debug, Default)]
pub(crate) struct SlotStorage {
    pub(crate) fields: Vec<Array>,
}

impl SlotStorage {
    pub(crate) fn new(spec: &SpecTable, max_num_players: usize) -> Self {
        let fields = spec
            .specs()
            .map(|s| s.zeros(if s.is_per_player() { max_num_players } else { 1 }))
            .collect();
        Self { fields }
    }

    /// Zero every field so stale data from a previous round never leaks.
    pub(crate) fn clear(&mut self) {
        for field in &mut self.fields {
            field.fill_default();
        }
    }

    /// The first `player_num` rows of a per-player field, or the single
    /// row of a per-env field.
    pub(crate) fn rows(
        &self,
        index: usize,
        per_player: bool,
        player_num: usize,
    ) -> Result<ArrayView<'_>, BufferError> {
        let field = self.field(index)?;
        Ok(if per_player {
            field.slice(0, player_num)?
        } else {
            field.slice(0, 1)?
        })
    }

    fn field(&self, index: usize) -> Result<&Array, BufferError> {
        let len = self.fields.len();
        self.fields
            .get(index)
            .ok_or(BufferError::Array(shoal_core::ArrayError::IndexOutOfBounds {
                index,
                rows: len,
            }))
    }

    fn field_mut(&mut self, index: usize) -> Result<&mut Array, BufferError> {
        let len = self.fields.len();
        self.fields
            .get_mut(index)
            .ok_or(BufferError::Array(shoal_core::ArrayError::IndexOutOfBounds {
                index,
                rows: len,
            }))
    }
}

/// Exclusive write access to one slot of one round.
///
/// Per-env fields are exposed as a single row (the leading dimension is
/// dropped, so a scalar field is a zero-dimensional view). Per-player
/// fields are exposed as `[player_num, ...row]`.
///
/// Call [`done_write`](Self::done_write) to publish the slot. Dropping
/// an unpublished slice publishes it anyway and logs a warning, so a
/// round can never be wedged by a lost handle.
#[derive(Debug)]
pub struct WritableSlice {
    storage: SlotStorage,
    spec: Arc<SpecTable>,
    shared: Arc<Shared>,
    round: RoundId,
    order: usize,
    player_num: usize,
    published: bool,
}

impl WritableSlice {
    pub(crate) fn new(
        storage: SlotStorage,
        spec: Arc<SpecTable>,
        shared: Arc<Shared>,
        round: RoundId,
        order: usize,
        player_num: usize,
    ) -> Self {
        Self {
            storage,
            spec,
            shared,
            round,
            order,
            player_num,
            published: false,
        }
    }

    /// Round this slot belongs to.
    pub fn round(&self) -> RoundId {
        self.round
    }

    /// Position of this slot in the round.
    pub fn order(&self) -> usize {
        self.order
    }

    /// Number of player rows reserved.
    pub fn player_num(&self) -> usize {
        self.player_num
    }

    /// State fields, in declaration order.
    pub fn spec(&self) -> &SpecTable {
        &self.spec
    }

    /// Number of state fields.
    pub fn num_fields(&self) -> usize {
        self.storage.fields.len()
    }

    /// Read back a field by position.
    pub fn field(&self, index: usize) -> Result<ArrayView<'_>, BufferError> {
        let per_player = self.is_per_player(index);
        let rows = self.storage.rows(index, per_player, self.player_num)?;
        if per_player {
            Ok(rows)
        } else {
            Ok(rows.row(0)?)
        }
    }

    /// Mutable view of a field by position.
    pub fn field_mut(&mut self, index: usize) -> Result<ArrayViewMut<'_>, BufferError> {
        let per_player = self.is_per_player(index);
        let player_num = self.player_num;
        let field = self.storage.field_mut(index)?;
        Ok(if per_player {
            field.slice_mut(0, player_num)?
        } else {
            field.row_mut(0)?
        })
    }

    /// Mutable view of a field by name.
    pub fn field_mut_by_name(&mut self, name: &str) -> Result<ArrayViewMut<'_>, BufferError> {
        let index = self.spec.index_of(name)?;
        self.field_mut(index)
    }

    /// Returns `true` if the field at `index` has one row per player.
    pub fn is_per_player(&self, index: usize) -> bool {
        self.spec
            .get_index(index)
            .is_some_and(|(_, s)| s.is_per_player())
    }

    /// Publish this slot: the completion signal for its `order`.
    pub fn done_write(mut self) {
        self.publish();
    }

    fn publish(&mut self) {
        if self.published {
            return;
        }
        self.published = true;
        let storage = std::mem::take(&mut self.storage);
        self.shared
            .complete(self.round, self.order, storage, self.player_num);
    }
}

impl Drop for WritableSlice {
    fn drop(&mut self) {
        if !self.published {
            tracing::warn!(
                round = self.round.0,
                order = self.order,
                "writable slice dropped without done_write; publishing as-is"
            );
            self.publish();
        }
    }
}
