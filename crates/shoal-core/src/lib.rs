//! Core types for the Shoal environment pool.
//!
//! This is the leaf crate with zero internal dependencies. It defines
//! the data primitives shared by every other Shoal crate: typed arrays
//! and zero-copy views, field shape descriptors, environment specs and
//! configuration, identifiers, and the core error types.
//!
//! # Layout conventions
//!
//! Every batched field is stored row-major with a leading "row"
//! dimension. For a per-environment field the rows are environments;
//! for a per-player field (declared with a leading `-1`) the rows are
//! the active players of every environment in the round.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod array;
pub mod config;
pub mod dtype;
pub mod error;
pub mod id;
pub mod keys;
pub mod shape;
pub mod spec;

pub use array::{Array, ArrayView, ArrayViewMut, Shape};
pub use config::{ConfigValue, EnvConfig};
pub use dtype::{Buffer, BufferMut, BufferRef, Dtype, Element};
pub use error::{ArrayError, SpecError};
pub use id::{EnvId, RoundId};
pub use shape::ShapeSpec;
pub use spec::{EnvSpec, SpecTable};
