//! The round-scoped buffer-slot queue.
//!
//! [`StateBufferQueue`] keeps a ring of `capacity` rounds in flight.
//! Producers reserve the slot for their `order` in the oldest round
//! where it is still vacant, write it without holding any lock, and
//! publish it. The single consumer retires the oldest round once all
//! `batch_size` slots are published, regardless of the order in which
//! they completed.
//!
//! ```text
//! rounds (front = oldest)
//! ├── RoundBuffer { id: N,   slots: [Done, Writing, Done, ...] }
//! └── RoundBuffer { id: N+1, slots: [Writing, Vacant, Vacant, ...] }
//! ```
//!
//! The mutex guards bookkeeping only: slot state, completion counts and
//! the hand-off of slot storage.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use shoal_core::{EnvSpec, RoundId, SpecError, SpecTable};

use crate::batch::StateBatch;
use crate::error::BufferError;
use crate::slot::{SlotStorage, WritableSlice};

#[derive(Debug)]
enum SlotState {
    Vacant(SlotStorage),
    Writing,
    Done {
        storage: SlotStorage,
        player_num: usize,
    },
}

#[derive(Debug)]
struct RoundBuffer {
    id: RoundId,
    slots: Vec<SlotState>,
    done_count: usize,
}

impl RoundBuffer {
    fn is_complete(&self) -> bool {
        self.done_count == self.slots.len()
    }
}

#[derive(Debug)]
struct QueueState {
    rounds: VecDeque<RoundBuffer>,
    next_round: u64,
    completed: u64,
    closed: bool,
}

/// State shared between the queue and every outstanding [`WritableSlice`].
#[derive(Debug)]
pub(crate) struct Shared {
    state: Mutex<QueueState>,
    round_ready: Condvar,
    slot_freed: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Return a slot's storage and mark it done.
    pub(crate) fn complete(
        &self,
        round: RoundId,
        order: usize,
        storage: SlotStorage,
        player_num: usize,
    ) {
        let mut state = self.lock();
        let Some(buffer) = state.rounds.iter_mut().find(|r| r.id == round) else {
            tracing::error!(round = round.0, order, "published slot for a retired round");
            return;
        };
        buffer.slots[order] = SlotState::Done {
            storage,
            player_num,
        };
        buffer.done_count += 1;
        if buffer.is_complete() {
            tracing::trace!(round = round.0, "round complete");
            self.round_ready.notify_all();
        }
    }
}

/// Round-scoped slot allocator and batch assembler.
///
/// Many producers call [`allocate`](Self::allocate) concurrently; one
/// consumer calls [`wait_round`](Self::wait_round) (or its timed and
/// non-blocking variants). Rows of the retrieved [`StateBatch`] are
/// placed by `order`, never by completion time.
#[derive(Debug)]
pub struct StateBufferQueue {
    spec: Arc<SpecTable>,
    per_player: Vec<bool>,
    batch_size: usize,
    max_num_players: usize,
    capacity: usize,
    shared: Arc<Shared>,
}

// Compile-time assertion: the queue is shared by reference across workers.
const _: fn() = || {
    fn assert<T: Send + Sync>() {}
    assert::<StateBufferQueue>();
    assert::<WritableSlice>();
};

impl StateBufferQueue {
    /// Create a queue with `capacity` rounds of `batch_size` slots.
    ///
    /// Every slot is pre-sized for `max_num_players` player rows.
    pub fn new(
        spec: Arc<SpecTable>,
        batch_size: usize,
        max_num_players: usize,
        capacity: usize,
    ) -> Result<Self, BufferError> {
        let invalid = |reason: &str| {
            Err(BufferError::Spec(SpecError::InvalidConfig {
                reason: reason.to_string(),
            }))
        };
        if batch_size == 0 {
            return invalid("batch_size must be at least 1");
        }
        if max_num_players == 0 {
            return invalid("max_num_players must be at least 1");
        }
        if capacity == 0 {
            return invalid("queue capacity must be at least 1");
        }
        let rounds = (0..capacity as u64)
            .map(|id| Self::fresh_round(&spec, RoundId(id), batch_size, max_num_players))
            .collect();
        let per_player = spec.per_player_mask();
        Ok(Self {
            spec,
            per_player,
            batch_size,
            max_num_players,
            capacity,
            shared: Arc::new(Shared {
                state: Mutex::new(QueueState {
                    rounds,
                    next_round: capacity as u64,
                    completed: 0,
                    closed: false,
                }),
                round_ready: Condvar::new(),
                slot_freed: Condvar::new(),
            }),
        })
    }

    /// Queue sized from an environment spec's state table and config.
    pub fn from_spec(spec: &EnvSpec) -> Result<Self, BufferError> {
        let config = spec.config();
        Self::new(
            spec.shared_state_spec(),
            config.resolved_batch_size(),
            config.max_num_players,
            config.queue_capacity,
        )
    }

    fn fresh_round(
        spec: &SpecTable,
        id: RoundId,
        batch_size: usize,
        max_num_players: usize,
    ) -> RoundBuffer {
        RoundBuffer {
            id,
            slots: (0..batch_size)
                .map(|_| SlotState::Vacant(SlotStorage::new(spec, max_num_players)))
                .collect(),
            done_count: 0,
        }
    }

    /// Reserve the slot at `order` for `player_num` players.
    ///
    /// The slot comes from the oldest in-flight round in which `order`
    /// is still vacant. If every in-flight round already holds `order`,
    /// blocks until the consumer retires the oldest round.
    pub fn allocate(&self, player_num: usize, order: usize) -> Result<WritableSlice, BufferError> {
        if order >= self.batch_size {
            return Err(BufferError::OrderOutOfRange {
                order,
                batch_size: self.batch_size,
            });
        }
        if player_num > self.max_num_players {
            return Err(BufferError::TooManyPlayers {
                requested: player_num,
                max: self.max_num_players,
            });
        }

        let mut state = self.shared.lock();
        let (round, mut storage) = loop {
            if state.closed {
                return Err(BufferError::Closed);
            }
            let vacant = state.rounds.iter_mut().find_map(|buffer| {
                match std::mem::replace(&mut buffer.slots[order], SlotState::Writing) {
                    SlotState::Vacant(storage) => Some((buffer.id, storage)),
                    held => {
                        buffer.slots[order] = held;
                        None
                    }
                }
            });
            if let Some(found) = vacant {
                break found;
            }
            state = self
                .shared
                .slot_freed
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        };
        drop(state);

        storage.clear();
        tracing::trace!(round = round.0, order, player_num, "slot allocated");
        Ok(WritableSlice::new(
            storage,
            Arc::clone(&self.spec),
            Arc::clone(&self.shared),
            round,
            order,
            player_num,
        ))
    }

    /// Block until the oldest round is complete and return it.
    pub fn wait_round(&self) -> Result<StateBatch, BufferError> {
        self.retire(None)
    }

    /// Like [`wait_round`](Self::wait_round), giving up after `timeout`.
    pub fn wait_round_timeout(&self, timeout: Duration) -> Result<StateBatch, BufferError> {
        self.retire(Some(Instant::now() + timeout))
    }

    /// Return the oldest round if it is already complete.
    ///
    /// `Ok(None)` means the round is still being written.
    pub fn try_round(&self) -> Result<Option<StateBatch>, BufferError> {
        let mut state = self.shared.lock();
        if state.closed {
            return Err(BufferError::Closed);
        }
        if !state.rounds.front().is_some_and(RoundBuffer::is_complete) {
            return Ok(None);
        }
        let Some(buffer) = state.rounds.pop_front() else {
            return Ok(None);
        };
        drop(state);
        self.assemble_and_recycle(buffer).map(Some)
    }

    fn retire(&self, deadline: Option<Instant>) -> Result<StateBatch, BufferError> {
        let mut state = self.shared.lock();
        loop {
            if state.closed {
                return Err(BufferError::Closed);
            }
            if state.rounds.front().is_some_and(RoundBuffer::is_complete) {
                break;
            }
            state = match deadline {
                None => self
                    .shared
                    .round_ready
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner),
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(BufferError::Timeout);
                    }
                    self.shared
                        .round_ready
                        .wait_timeout(state, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
            };
        }
        let buffer = state.rounds.pop_front().ok_or(BufferError::Closed)?;
        drop(state);
        self.assemble_and_recycle(buffer)
    }

    /// Copy a complete round into a batch, then reopen its storage as
    /// the newest in-flight round.
    fn assemble_and_recycle(&self, mut buffer: RoundBuffer) -> Result<StateBatch, BufferError> {
        let mut storages = Vec::with_capacity(self.batch_size);
        let mut player_counts = Vec::with_capacity(self.batch_size);
        for slot in buffer.slots.drain(..) {
            match slot {
                SlotState::Done {
                    storage,
                    player_num,
                } => {
                    storages.push(storage);
                    player_counts.push(player_num);
                }
                // Not reachable for a complete round; keep the storage.
                SlotState::Vacant(storage) => {
                    storages.push(storage);
                    player_counts.push(0);
                }
                SlotState::Writing => {
                    storages.push(SlotStorage::new(&self.spec, self.max_num_players));
                    player_counts.push(0);
                }
            }
        }

        let result = StateBatch::assemble(
            buffer.id,
            &self.spec,
            &self.per_player,
            &storages,
            player_counts,
        );

        let mut state = self.shared.lock();
        let id = RoundId(state.next_round);
        state.next_round += 1;
        state.completed += 1;
        state.rounds.push_back(RoundBuffer {
            id,
            slots: storages.into_iter().map(SlotState::Vacant).collect(),
            done_count: 0,
        });
        drop(state);
        self.shared.slot_freed.notify_all();

        match &result {
            Ok(batch) => tracing::debug!(
                round = batch.round().0,
                players = batch.total_players(),
                "round retired"
            ),
            Err(error) => {
                tracing::error!(round = buffer.id.0, %error, "round could not be assembled");
            }
        }
        result
    }

    /// Wake every waiter; later operations fail with [`BufferError::Closed`].
    pub fn close(&self) {
        self.shared.lock().closed = true;
        self.shared.round_ready.notify_all();
        self.shared.slot_freed.notify_all();
    }

    /// Returns `true` once [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.shared.lock().closed
    }

    /// Slots per round.
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Rounds kept in flight.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Player rows per slot.
    pub fn max_num_players(&self) -> usize {
        self.max_num_players
    }

    /// State fields every slot carries.
    pub fn spec(&self) -> &SpecTable {
        &self.spec
    }

    /// Number of rounds retrieved so far.
    pub fn rounds_completed(&self) -> u64 {
        self.shared.lock().completed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use shoal_core::{keys, Dtype, ShapeSpec};
    use std::thread;

    fn spec() -> Arc<SpecTable> {
        Arc::new(
            SpecTable::new()
                .with(keys::STATE_ENV_ID, ShapeSpec::scalar(Dtype::I32))
                .unwrap()
                .with("obs", ShapeSpec::per_player(Dtype::F32, &[2]))
                .unwrap(),
        )
    }

    fn write(queue: &StateBufferQueue, order: usize, players: usize) {
        let mut slice = queue.allocate(players, order).unwrap();
        slice.field_mut(0).unwrap().set(order as i32).unwrap();
        let obs = slice.field_mut(1).unwrap().into_mut_slice::<f32>().unwrap();
        for (i, v) in obs.iter_mut().enumerate() {
            *v = (order * 100 + i) as f32;
        }
        slice.done_write();
    }

    #[test]
    fn rejects_order_and_player_overflow() {
        let queue = StateBufferQueue::new(spec(), 2, 3, 2).unwrap();
        assert_eq!(
            queue.allocate(1, 2).unwrap_err(),
            BufferError::OrderOutOfRange {
                order: 2,
                batch_size: 2
            }
        );
        assert_eq!(
            queue.allocate(4, 0).unwrap_err(),
            BufferError::TooManyPlayers {
                requested: 4,
                max: 3
            }
        );
    }

    #[test]
    fn zero_sized_construction_rejected() {
        assert!(StateBufferQueue::new(spec(), 0, 1, 1).is_err());
        assert!(StateBufferQueue::new(spec(), 1, 0, 1).is_err());
        assert!(StateBufferQueue::new(spec(), 1, 1, 0).is_err());
    }

    #[test]
    fn incomplete_round_not_returned() {
        let queue = StateBufferQueue::new(spec(), 2, 1, 2).unwrap();
        write(&queue, 1, 1);
        assert!(queue.try_round().unwrap().is_none());
        assert_eq!(
            queue.wait_round_timeout(Duration::from_millis(10)).unwrap_err(),
            BufferError::Timeout
        );
        write(&queue, 0, 1);
        let batch = queue.try_round().unwrap().unwrap();
        assert_eq!(batch.env_ids().unwrap(), &[0, 1]);
        assert_eq!(queue.rounds_completed(), 1);
    }

    #[test]
    fn second_allocation_of_same_order_goes_to_next_round() {
        let queue = StateBufferQueue::new(spec(), 1, 1, 2).unwrap();
        let first = queue.allocate(1, 0).unwrap();
        let second = queue.allocate(1, 0).unwrap();
        assert_eq!(first.round(), RoundId(0));
        assert_eq!(second.round(), RoundId(1));
        second.done_write();
        // Round 1 is complete but round 0 is still the oldest.
        assert!(queue.try_round().unwrap().is_none());
        first.done_write();
        assert_eq!(queue.try_round().unwrap().unwrap().round(), RoundId(0));
        assert_eq!(queue.try_round().unwrap().unwrap().round(), RoundId(1));
    }

    #[test]
    fn allocation_blocks_until_round_retired() {
        let queue = Arc::new(StateBufferQueue::new(spec(), 1, 1, 1).unwrap());
        write(&queue, 0, 1);
        let producer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                let slice = queue.allocate(1, 0).unwrap();
                let round = slice.round();
                slice.done_write();
                round
            })
        };
        assert_eq!(queue.wait_round().unwrap().round(), RoundId(0));
        assert_eq!(producer.join().unwrap(), RoundId(1));
        assert_eq!(queue.wait_round().unwrap().round(), RoundId(1));
    }

    #[test]
    fn dropped_slice_still_publishes() {
        let queue = StateBufferQueue::new(spec(), 1, 1, 1).unwrap();
        {
            let mut slice = queue.allocate(1, 0).unwrap();
            slice.field_mut(0).unwrap().set(9i32).unwrap();
        }
        let batch = queue.try_round().unwrap().unwrap();
        assert_eq!(batch.env_ids().unwrap(), &[9]);
    }

    #[test]
    fn recycled_slots_are_zeroed() {
        let queue = StateBufferQueue::new(spec(), 1, 2, 1).unwrap();
        write(&queue, 0, 2);
        queue.wait_round().unwrap();
        let slice = queue.allocate(2, 0).unwrap();
        assert_eq!(
            slice.field(1).unwrap().as_slice::<f32>().unwrap(),
            &[0.0f32; 4]
        );
        slice.done_write();
    }

    #[test]
    fn close_wakes_consumer() {
        let queue = Arc::new(StateBufferQueue::new(spec(), 2, 1, 1).unwrap());
        let consumer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.wait_round())
        };
        queue.close();
        assert_eq!(consumer.join().unwrap().unwrap_err(), BufferError::Closed);
        assert_eq!(queue.allocate(1, 0).unwrap_err(), BufferError::Closed);
        assert_eq!(queue.try_round().unwrap_err(), BufferError::Closed);
        assert!(queue.is_closed());
    }

    #[test]
    fn threaded_producers_land_by_order() {
        let batch_size = 8;
        let queue = Arc::new(StateBufferQueue::new(spec(), batch_size, 1, 2).unwrap());
        for _ in 0..3 {
            let handles: Vec<_> = (0..batch_size)
                .rev()
                .map(|order| {
                    let queue = Arc::clone(&queue);
                    thread::spawn(move || write(&queue, order, 1))
                })
                .collect();
            let batch = queue.wait_round().unwrap();
            for handle in handles {
                handle.join().unwrap();
            }
            let expected: Vec<i32> = (0..batch_size as i32).collect();
            assert_eq!(batch.env_ids().unwrap(), expected.as_slice());
        }
    }

    proptest! {
        #[test]
        fn rows_follow_order_for_any_completion_permutation(
            (players, perm) in (1usize..7).prop_flat_map(|n| {
                (
                    proptest::collection::vec(0usize..3, n),
                    Just((0..n).collect::<Vec<_>>()).prop_shuffle(),
                )
            })
        ) {
            let n = players.len();
            let queue = StateBufferQueue::new(spec(), n, 2, 2).unwrap();
            // Allocate in permuted order, publish in reverse of that.
            let slices: Vec<_> = perm
                .iter()
                .map(|&order| {
                    let mut slice = queue.allocate(players[order], order).unwrap();
                    slice.field_mut(0).unwrap().set(order as i32).unwrap();
                    slice.field_mut(1).unwrap().set(order as f32).unwrap();
                    slice
                })
                .collect();
            for slice in slices.into_iter().rev() {
                slice.done_write();
            }
            let batch = queue.try_round().unwrap().unwrap();
            let expected_ids: Vec<i32> = (0..n as i32).collect();
            prop_assert_eq!(batch.env_ids().unwrap(), expected_ids.as_slice());
            prop_assert_eq!(batch.player_counts(), players.as_slice());

            let obs = batch.field("obs").unwrap().as_slice::<f32>().unwrap();
            let expected_obs: Vec<f32> = players
                .iter()
                .enumerate()
                .flat_map(|(order, &p)| std::iter::repeat_n(order as f32, p * 2))
                .collect();
            prop_assert_eq!(obs, expected_obs.as_slice());
        }
    }
}
