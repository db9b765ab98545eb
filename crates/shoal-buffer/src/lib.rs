//! Round-scoped buffer-slot queue for the Shoal environment pool.
//!
//! Many worker threads each write one environment's output for a round
//! into a disjoint slot; one consumer retrieves the round as a single
//! batch once every slot is published, in an order fixed by the slot
//! positions rather than by completion time.
//!
//! # Architecture
//!
//! ```text
//! StateBufferQueue
//! ├── Mutex<QueueState> + Condvar × 2 (round ready / slot freed)
//! │   └── RoundBuffer × capacity (oldest first)
//! │       └── SlotState × batch_size (Vacant | Writing | Done)
//! └── Arc<SpecTable> (state fields, shared with every WritableSlice)
//!
//! allocate ──▶ WritableSlice (owns slot storage) ──done_write──▶ Done
//! wait_round ──▶ StateBatch (one linear copy, storage recycled)
//! ```
//!
//! Slot storage changes hands by move, so writes need no lock and the
//! crate needs no `unsafe`. The assembled [`StateBatch`] owns its data
//! and never aliases storage that a later round is writing.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod batch;
pub mod error;
pub mod queue;
pub mod slot;

pub use batch::StateBatch;
pub use error::BufferError;
pub use queue::StateBufferQueue;
pub use slot::WritableSlice;
