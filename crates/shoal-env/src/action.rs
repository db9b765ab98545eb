//! Batched actions and their per-environment subsets.
//!
//! An [`ActionBatch`] holds one array per declared action field for a
//! whole round. Per-env fields have one row per environment in the
//! round; per-player fields have one row per active player, with the
//! `players.env_id` field naming the environment each player row
//! belongs to.
//!
//! A [`RawAction`] is what one environment sees of that batch after
//! demultiplexing: borrowed views where its rows are contiguous, owned
//! gathered copies where they are not.

use std::sync::Arc;

use shoal_core::{keys, Array, ArrayView, ArrayViewMut, SpecTable};

use crate::error::BatchError;

/// Round-wide action input, read-only once handed to the drivers.
#[derive(Clone, Debug, PartialEq)]
pub struct ActionBatch {
    spec: Arc<SpecTable>,
    fields: Vec<Array>,
    env_rows: usize,
    player_rows: usize,
}

impl ActionBatch {
    /// Validate `fields` against the action table.
    ///
    /// Every per-env field must have the same number of rows, as must
    /// every per-player field; row shapes and dtypes must match the
    /// table exactly.
    pub fn new(spec: Arc<SpecTable>, fields: Vec<Array>) -> Result<Self, BatchError> {
        if fields.len() != spec.len() {
            return Err(BatchError::FieldCount {
                expected: spec.len(),
                found: fields.len(),
            });
        }
        let mut env_rows = None;
        let mut player_rows = None;
        for ((name, shape), array) in spec.iter().zip(&fields) {
            if array.dtype() != shape.dtype {
                return Err(BatchError::Dtype {
                    field: name.to_string(),
                    expected: shape.dtype,
                    found: array.dtype(),
                });
            }
            let rows = if shape.is_per_player() {
                *player_rows.get_or_insert(array.rows())
            } else {
                *env_rows.get_or_insert(array.rows())
            };
            let expected = shape.batch_shape(rows);
            if array.shape() != expected.as_slice() {
                return Err(BatchError::Shape {
                    field: name.to_string(),
                    expected: expected.to_vec(),
                    found: array.shape().to_vec(),
                });
            }
        }
        Ok(Self {
            spec,
            fields,
            env_rows: env_rows.unwrap_or(0),
            player_rows: player_rows.unwrap_or(0),
        })
    }

    /// Zeroed batch for `env_rows` environments and `player_rows` players.
    pub fn zeros(spec: Arc<SpecTable>, env_rows: usize, player_rows: usize) -> Self {
        let fields = spec
            .specs()
            .map(|s| s.zeros(if s.is_per_player() { player_rows } else { env_rows }))
            .collect();
        Self {
            spec,
            fields,
            env_rows,
            player_rows,
        }
    }

    /// The action table this batch was built for.
    pub fn spec(&self) -> &SpecTable {
        &self.spec
    }

    /// Rows of every per-env field.
    pub fn env_rows(&self) -> usize {
        self.env_rows
    }

    /// Rows of every per-player field.
    pub fn player_rows(&self) -> usize {
        self.player_rows
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns `true` if the batch has no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Field by declaration position.
    pub fn field(&self, index: usize) -> Option<&Array> {
        self.fields.get(index)
    }

    /// Field by name.
    pub fn field_by_name(&self, name: &str) -> Option<&Array> {
        self.fields.get(self.spec.index_of(name).ok()?)
    }

    /// Mutable view of a field by declaration position, for filling a
    /// batch. Contents can change; the validated shape cannot.
    pub fn field_mut(&mut self, index: usize) -> Option<ArrayViewMut<'_>> {
        self.fields.get_mut(index).map(Array::view_mut)
    }

    /// Mutable view of a field by name, for filling a batch.
    pub fn field_by_name_mut(&mut self, name: &str) -> Option<ArrayViewMut<'_>> {
        let index = self.spec.index_of(name).ok()?;
        self.field_mut(index)
    }

    /// The `env_id` column: which environment each per-env row targets.
    pub fn env_ids(&self) -> Option<&[i32]> {
        self.fields
            .get(keys::ACTION_ENV_ID_INDEX)?
            .as_slice::<i32>()
            .ok()
    }

    /// The `players.env_id` column: which environment each player row
    /// belongs to.
    pub fn player_env_ids(&self) -> Option<&[i32]> {
        self.fields
            .get(keys::ACTION_PLAYER_ENV_ID_INDEX)?
            .as_slice::<i32>()
            .ok()
    }
}

/// One field of a [`RawAction`].
#[derive(Clone, Debug, PartialEq)]
pub enum ActionField<'a> {
    /// Zero-copy view into the round's [`ActionBatch`].
    Borrowed(ArrayView<'a>),
    /// Rows gathered from scattered positions of the batch.
    Owned(Array),
}

impl ActionField<'_> {
    /// Read access regardless of how the field was produced.
    pub fn view(&self) -> ArrayView<'_> {
        match self {
            Self::Borrowed(view) => view.clone(),
            Self::Owned(array) => array.view(),
        }
    }

    /// Returns `true` if the field aliases the batch.
    pub fn is_borrowed(&self) -> bool {
        matches!(self, Self::Borrowed(_))
    }
}

/// How a [`RawAction`]'s per-player fields were produced.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DemuxPath {
    /// One player per environment; rows indexed by batch position.
    SinglePlayer,
    /// The environment's player rows were one contiguous run.
    Contiguous {
        /// First matching row.
        start: usize,
        /// One past the last matching row.
        end: usize,
    },
    /// The environment's player rows were scattered and copied.
    Gathered {
        /// Matching rows, in batch order.
        rows: Vec<usize>,
    },
    /// No player row belongs to the environment this round.
    NoPlayers,
}

/// The slice of an [`ActionBatch`] that belongs to one environment.
///
/// One entry per declared action field, in declaration order. Rebuilt
/// for every step and never outlives the batch it borrows from.
#[derive(Clone, Debug, PartialEq)]
pub struct RawAction<'a> {
    spec: &'a SpecTable,
    fields: Vec<ActionField<'a>>,
    player_num: usize,
    path: DemuxPath,
}

/// The per-environment action handed to [`Env::step`](crate::Env::step).
pub type Action<'a> = RawAction<'a>;

impl<'a> RawAction<'a> {
    pub(crate) fn new(
        spec: &'a SpecTable,
        fields: Vec<ActionField<'a>>,
        player_num: usize,
        path: DemuxPath,
    ) -> Self {
        Self {
            spec,
            fields,
            player_num,
            path,
        }
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns `true` if there are no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Active players of this environment in this round.
    pub fn player_num(&self) -> usize {
        self.player_num
    }

    /// Which demultiplexing path produced this action.
    pub fn path(&self) -> &DemuxPath {
        &self.path
    }

    /// Field by declaration position.
    pub fn field(&self, index: usize) -> Option<&ActionField<'a>> {
        self.fields.get(index)
    }

    /// View of a field by declaration position.
    pub fn get(&self, index: usize) -> Option<ArrayView<'_>> {
        self.fields.get(index).map(ActionField::view)
    }

    /// View of a field by name.
    pub fn by_name(&self, name: &str) -> Option<ArrayView<'_>> {
        self.get(self.spec.index_of(name).ok()?)
    }

    /// All fields in declaration order.
    pub fn fields(&self) -> &[ActionField<'a>] {
        &self.fields
    }
}
