#![forbid(unsafe_code)]

//! Sequence kernel for the Vantage view engine.
//!
//! This crate provides the two building blocks every live view needs and
//! nothing else:
//!
//! - [`DiffableVec<T>`]: an ordered sequence with range operations
//!   (`push_range`, `insert_range`, `remove_range`, `replace_all`) and a
//!   cheap positional copy-equality test, [`DiffableVec::is_copy_of`].
//!   Used both as the materialized storage of a view and as a
//!   general-purpose editable sequence.
//! - [`reconcile`]: given old and new content, computes the multiset
//!   [`Diff`] (`added` / `removed`) between them. Duplicate-correct and
//!   equality-based, not identity-based.
//!
//! # Design
//!
//! The diff here is deliberately coarse: one `{added, removed}` pair per
//! reconciliation, not a positional edit script. Consumers that redraw from
//! the full new content only need to know *which elements* appeared or
//! vanished, so an LCS-style minimal script would be wasted work.
//!
//! # Invariants
//!
//! 1. `is_copy_of` holds iff both sequences have equal length and every
//!    position holds an equal element (which implies multiset equality).
//! 2. `reconcile(a, b)` returns an empty diff whenever `a` and `b` are
//!    multiset-equal, including permutations of each other.
//! 3. For every element, `occurrences(b) - occurrences(a)` copies appear in
//!    `added` (when positive) or `removed` (when negative).

pub mod diffable;
pub mod reconcile;

pub use diffable::DiffableVec;
pub use reconcile::{Diff, is_copy_of, reconcile};
