//! # rf-board: Symbol Grid and Mutation Model
//!
//! The board a spin presents, and the server-declared changes to it.
//!
//! ```text
//! raw outcome JSON ──parse──▶ MutationBatch ──▶ MutationManager ──apply (once)──▶ Grid
//!                    (MalformedMutation                 │ query(kind)              │
//!                     skipped, reported)                ▼                          ▼
//!                                                 presentation modules       SymbolChange log
//! ```
//!
//! ## Invariants
//!
//! - A [`SymbolRef`] is valid until the next [`Grid::begin_spin`]; stale use
//!   fails with `MissingAnimationTarget`.
//! - [`MutationManager::apply`] reaches the grid at most once per mutation
//!   per spin; [`Grid::mutate_to`] itself is not guarded.
//! - Every apply resolves all targets before writing: fully applied or not
//!   at all.

mod batch;
mod error;
mod grid;
mod manager;
mod meter;
pub mod mutation;
mod order;

pub use batch::*;
pub use error::*;
pub use grid::*;
pub use manager::*;
pub use meter::*;
pub use mutation::{ApplyReport, MeterKind, Mutation, MutationKind, ParseReport, ResolvedMutation};
pub use order::*;
