//! Demultiplexing a round's action batch down to one environment.
//!
//! With one player per environment every field is indexed by the
//! environment's batch position. With several players, the
//! `players.env_id` column is scanned for rows equal to the
//! environment's id:
//!
//! - no match: per-player fields become zero-row views;
//! - one contiguous run: per-player fields are zero-copy slices;
//! - scattered rows: per-player fields are gathered into owned arrays,
//!   preserving batch order.
//!
//! Per-env fields are always the single row at the batch position.

use shoal_core::{keys, Array, ArrayError, EnvId, EnvSpec, Shape};

use crate::action::{ActionBatch, ActionField, DemuxPath, RawAction};

/// Per-field layout flags resolved once per environment type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ActionDemux {
    per_player: Vec<bool>,
    single_player: bool,
}

impl ActionDemux {
    /// Resolve the layout of `spec`'s action table.
    pub fn new(spec: &EnvSpec) -> Self {
        Self {
            per_player: spec.action_spec().per_player_mask(),
            single_player: spec.is_single_player(),
        }
    }

    /// Per-player flag of every action field.
    pub fn per_player(&self) -> &[bool] {
        &self.per_player
    }

    /// Select the rows of `batch` that belong to `env_id`, whose per-env
    /// rows sit at `env_index`.
    pub fn parse<'a>(
        &self,
        batch: &'a ActionBatch,
        env_id: EnvId,
        env_index: usize,
    ) -> Result<RawAction<'a>, ArrayError> {
        let spec = batch.spec();
        if batch.len() != self.per_player.len() {
            return Err(ArrayError::LengthMismatch {
                expected: self.per_player.len(),
                found: batch.len(),
            });
        }

        if self.single_player {
            let fields = self.select(batch, env_index, |field| {
                Ok(ActionField::Borrowed(field.slice(env_index, env_index + 1)?))
            })?;
            return Ok(RawAction::new(spec, fields, 1, DemuxPath::SinglePlayer));
        }

        let mapping = batch
            .field(keys::ACTION_PLAYER_ENV_ID_INDEX)
            .ok_or(ArrayError::IndexOutOfBounds {
                index: keys::ACTION_PLAYER_ENV_ID_INDEX,
                rows: batch.len(),
            })?
            .as_slice::<i32>()?;
        let id = env_id.stamp();
        let rows: Vec<usize> = mapping
            .iter()
            .enumerate()
            .filter_map(|(row, &owner)| (owner == id).then_some(row))
            .collect();
        let player_num = rows.len();

        let bounds = rows.first().copied().zip(rows.last().copied());
        let (path, fields) = match bounds {
            Some((start, last)) if last + 1 - start == player_num => {
                let end = last + 1;
                let fields = self.select(batch, env_index, |field| {
                    Ok(ActionField::Borrowed(field.slice(start, end)?))
                })?;
                (DemuxPath::Contiguous { start, end }, fields)
            }
            Some(_) => {
                tracing::trace!(env_id = env_id.0, player_num, "gathering scattered player rows");
                let fields = self.select(batch, env_index, |field| {
                    Ok(ActionField::Owned(gather(field, &rows)?))
                })?;
                (DemuxPath::Gathered { rows }, fields)
            }
            None => {
                let fields = self.select(batch, env_index, |field| {
                    Ok(ActionField::Borrowed(field.slice(0, 0)?))
                })?;
                (DemuxPath::NoPlayers, fields)
            }
        };
        Ok(RawAction::new(spec, fields, player_num, path))
    }

    /// Build one entry per field: per-env fields take the row at
    /// `env_index`, per-player fields go through `per_player`.
    fn select<'a>(
        &self,
        batch: &'a ActionBatch,
        env_index: usize,
        per_player: impl Fn(&'a Array) -> Result<ActionField<'a>, ArrayError>,
    ) -> Result<Vec<ActionField<'a>>, ArrayError> {
        self.per_player
            .iter()
            .enumerate()
            .map(|(index, &is_player)| {
                let field = batch.field(index).ok_or(ArrayError::IndexOutOfBounds {
                    index,
                    rows: batch.len(),
                })?;
                if is_player {
                    per_player(field)
                } else {
                    Ok(ActionField::Borrowed(field.row(env_index)?))
                }
            })
            .collect()
    }
}

/// Copy `rows` of `field`, in the given order, into a new array.
fn gather(field: &Array, rows: &[usize]) -> Result<Array, ArrayError> {
    let mut shape = Shape::from_slice(field.shape());
    *shape.first_mut().ok_or(ArrayError::NotIndexable)? = rows.len();
    let mut out = Array::zeros(field.dtype(), &shape);
    for (dst, &src) in rows.iter().enumerate() {
        out.row_mut(dst)?.assign(&field.row(src)?)?;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use shoal_core::{Dtype, EnvConfig, ShapeSpec, SpecTable};
    use std::sync::Arc;

    fn env_spec(max_num_players: usize) -> EnvSpec {
        let config = EnvConfig {
            num_envs: 4,
            max_num_players,
            ..EnvConfig::default()
        };
        let action = SpecTable::new()
            .with("move", ShapeSpec::per_player(Dtype::I32, &[2]))
            .unwrap()
            .with("speed", ShapeSpec::scalar(Dtype::F32))
            .unwrap();
        EnvSpec::new("demux", config, action, SpecTable::new()).unwrap()
    }

    /// Batch with one row per env and the given player-to-env mapping.
    /// `move` row `r` holds `[r, -r]`; `speed` row `e` holds `e`.
    fn batch(spec: &EnvSpec, env_rows: usize, mapping: &[i32]) -> ActionBatch {
        let table = Arc::new(spec.action_spec().clone());
        let mut batch = ActionBatch::zeros(table, env_rows, mapping.len());
        let env_ids: Vec<i32> = (0..env_rows as i32).collect();
        batch
            .field_mut(0)
            .unwrap()
            .as_mut_slice::<i32>()
            .unwrap()
            .copy_from_slice(&env_ids);
        batch
            .field_mut(1)
            .unwrap()
            .as_mut_slice::<i32>()
            .unwrap()
            .copy_from_slice(mapping);
        let moves: Vec<i32> = (0..mapping.len() as i32).flat_map(|r| [r, -r]).collect();
        batch
            .field_mut(2)
            .unwrap()
            .as_mut_slice::<i32>()
            .unwrap()
            .copy_from_slice(&moves);
        for (e, v) in batch
            .field_mut(3)
            .unwrap()
            .as_mut_slice::<f32>()
            .unwrap()
            .iter_mut()
            .enumerate()
        {
            *v = e as f32;
        }
        batch
    }

    fn move_rows(action: &RawAction<'_>) -> Vec<i32> {
        action
            .by_name("move")
            .unwrap()
            .as_slice::<i32>()
            .unwrap()
            .iter()
            .step_by(2)
            .copied()
            .collect()
    }

    #[test]
    fn single_player_takes_row_at_env_index() {
        let spec = env_spec(1);
        let batch = batch(&spec, 3, &[0, 1, 2]);
        let demux = ActionDemux::new(&spec);
        let action = demux.parse(&batch, EnvId(1), 1).unwrap();
        assert_eq!(action.len(), 4);
        assert_eq!(action.path(), &DemuxPath::SinglePlayer);
        assert_eq!(action.player_num(), 1);
        // Per-player fields keep a leading dim of 1.
        assert_eq!(action.get(1).unwrap().shape(), &[1]);
        assert_eq!(action.get(2).unwrap().shape(), &[1, 2]);
        assert_eq!(move_rows(&action), [1]);
        // Per-env fields are a single row.
        assert!(action.get(3).unwrap().shape().is_empty());
        assert_eq!(action.by_name("speed").unwrap().scalar::<f32>().unwrap(), 1.0);
        assert!(action.fields().iter().all(ActionField::is_borrowed));
    }

    #[test]
    fn contiguous_players_are_sliced() {
        let spec = env_spec(2);
        let batch = batch(&spec, 3, &[0, 0, 1, 2, 2]);
        let demux = ActionDemux::new(&spec);

        let env0 = demux.parse(&batch, EnvId(0), 0).unwrap();
        assert_eq!(env0.path(), &DemuxPath::Contiguous { start: 0, end: 2 });
        assert_eq!(move_rows(&env0), [0, 1]);

        let env1 = demux.parse(&batch, EnvId(1), 1).unwrap();
        assert_eq!(env1.path(), &DemuxPath::Contiguous { start: 2, end: 3 });
        assert_eq!(env1.player_num(), 1);

        let env2 = demux.parse(&batch, EnvId(2), 2).unwrap();
        assert_eq!(env2.path(), &DemuxPath::Contiguous { start: 3, end: 5 });
        assert_eq!(move_rows(&env2), [3, 4]);
        assert_eq!(env2.by_name("speed").unwrap().scalar::<f32>().unwrap(), 2.0);

        for action in [&env0, &env1, &env2] {
            assert!(action.fields().iter().all(ActionField::is_borrowed));
        }
    }

    #[test]
    fn scattered_players_are_gathered_in_batch_order() {
        let spec = env_spec(2);
        let batch = batch(&spec, 3, &[0, 1, 0, 2, 2]);
        let demux = ActionDemux::new(&spec);

        let env0 = demux.parse(&batch, EnvId(0), 0).unwrap();
        assert_eq!(env0.path(), &DemuxPath::Gathered { rows: vec![0, 2] });
        assert_eq!(env0.player_num(), 2);
        assert_eq!(
            env0.by_name("move").unwrap().as_slice::<i32>().unwrap(),
            &[0, 0, 2, -2]
        );
        assert!(!env0.field(2).unwrap().is_borrowed());
        // Per-env fields stay borrowed on the gather path.
        assert!(env0.field(3).unwrap().is_borrowed());

        let env1 = demux.parse(&batch, EnvId(1), 1).unwrap();
        assert_eq!(env1.path(), &DemuxPath::Contiguous { start: 1, end: 2 });
    }

    #[test]
    fn env_without_players_gets_empty_rows() {
        let spec = env_spec(2);
        let batch = batch(&spec, 3, &[0, 0, 2]);
        let demux = ActionDemux::new(&spec);
        let env1 = demux.parse(&batch, EnvId(1), 1).unwrap();
        assert_eq!(env1.path(), &DemuxPath::NoPlayers);
        assert_eq!(env1.player_num(), 0);
        assert_eq!(env1.by_name("move").unwrap().shape(), &[0, 2]);
        assert_eq!(env1.by_name("speed").unwrap().scalar::<f32>().unwrap(), 1.0);
    }

    #[test]
    fn env_index_out_of_range_is_an_error() {
        let spec = env_spec(2);
        let batch = batch(&spec, 2, &[0, 1]);
        let demux = ActionDemux::new(&spec);
        assert_eq!(
            demux.parse(&batch, EnvId(1), 2).unwrap_err(),
            ArrayError::IndexOutOfBounds { index: 2, rows: 2 }
        );
    }

    #[test]
    fn gathering_a_zero_dimensional_field_is_an_error() {
        let scalar = Array::zeros(Dtype::I32, &[]);
        assert_eq!(gather(&scalar, &[0, 2]), Err(ArrayError::NotIndexable));
    }

    fn mapping_strategy() -> impl Strategy<Value = Vec<i32>> {
        proptest::collection::vec(0i32..4, 0..16)
    }

    proptest! {
        #[test]
        fn selection_is_exactly_the_matching_rows(mapping in mapping_strategy(), env in 0u32..4) {
            let spec = env_spec(4);
            let batch = batch(&spec, 4, &mapping);
            let demux = ActionDemux::new(&spec);
            let action = demux.parse(&batch, EnvId(env), env as usize).unwrap();
            let expected: Vec<i32> = mapping
                .iter()
                .enumerate()
                .filter(|&(_, &owner)| owner == env as i32)
                .map(|(row, _)| row as i32)
                .collect();
            prop_assert_eq!(action.player_num(), expected.len());
            prop_assert_eq!(move_rows(&action), expected);
        }

        #[test]
        fn contiguity_detection_is_exact(mapping in mapping_strategy(), env in 0u32..4) {
            let spec = env_spec(4);
            let batch = batch(&spec, 4, &mapping);
            let demux = ActionDemux::new(&spec);
            let action = demux.parse(&batch, EnvId(env), env as usize).unwrap();
            let rows: Vec<usize> = mapping
                .iter()
                .enumerate()
                .filter(|&(_, &owner)| owner == env as i32)
                .map(|(row, _)| row)
                .collect();
            let contiguous = rows.windows(2).all(|w| w[1] == w[0] + 1);
            match action.path() {
                DemuxPath::NoPlayers => prop_assert!(rows.is_empty()),
                DemuxPath::Contiguous { start, end } => {
                    prop_assert!(!rows.is_empty() && contiguous);
                    prop_assert_eq!((*start, *end), (rows[0], rows[rows.len() - 1] + 1));
                }
                DemuxPath::Gathered { rows: gathered } => {
                    prop_assert!(!contiguous);
                    prop_assert_eq!(gathered, &rows);
                }
                DemuxPath::SinglePlayer => prop_assert!(false, "multi-player spec"),
            }
        }

        #[test]
        fn gather_matches_slice_content(start in 0usize..6, len in 1usize..5) {
            // A contiguous run for env 1, sliced by the demux, must equal a
            // forced gather of the same rows.
            let spec = env_spec(4);
            let mut mapping = vec![0i32; start];
            mapping.extend(std::iter::repeat_n(1, len));
            mapping.push(2);
            let batch = batch(&spec, 4, &mapping);
            let demux = ActionDemux::new(&spec);
            let action = demux.parse(&batch, EnvId(1), 1).unwrap();
            prop_assert_eq!(action.path(), &DemuxPath::Contiguous { start, end: start + len });
            let rows: Vec<usize> = (start..start + len).collect();
            let gathered = gather(batch.field(2).unwrap(), &rows).unwrap();
            prop_assert_eq!(action.get(2).unwrap(), gathered.view());
        }
    }
}
