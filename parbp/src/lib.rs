//! Parallel construction of a succinct-tree index over a balanced
//! parenthesis sequence, and the forward-search navigation queries it
//! answers.
//!
//! The index is a range min-max tree summarising the excess function of
//! the sequence in 256-bit chunks. Construction is a three-phase
//! fork-join pipeline over disjoint index ranges; queries combine
//! byte-granular lookup tables with a climb through the tree.

#![allow(clippy::needless_range_loop)]

pub mod bitseq;
pub mod lookup;
pub mod search;
pub mod tree;
