//! Key filters: per-depth range/union predicates with skip-jump
//! traversal.
//!
//! - `term` — the immutable term model (wildcard, range, union)
//! - `engine` — membership testing and directional candidate jumps
//! - `parse` — the compact textual grammar

pub mod engine;
pub(crate) mod parse;
pub mod term;

pub use engine::{KeyFilter, UNBOUNDED};
pub use term::{Range, Term};
