//! Error types for the keyspan core.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, KeyError>;

#[derive(Error, Debug)]
pub enum KeyError {
    /// Malformed or truncated segment encoding. Always fatal to the decode
    /// that hit it; never retried (corruption indicates a storage bug).
    #[error("Decode error at offset {offset}: {msg}")]
    Decode { offset: usize, msg: String },

    /// A key operation would exceed the fixed buffer capacity. The key is
    /// left in its last valid state.
    #[error("Key overflow: {needed} bytes needed, capacity is {capacity}")]
    KeyOverflow { needed: usize, capacity: usize },

    /// Malformed textual filter. No partial filter is returned.
    #[error("Filter syntax error at position {pos}: {msg}")]
    FilterSyntax { pos: usize, msg: String },

    /// Filter construction violated an invariant (reversed bounds,
    /// overlapping union subranges, min depth above max depth).
    #[error("Invalid filter: {0}")]
    InvalidFilter(String),

    /// An edge-marked segment must be the final segment of a key.
    #[error("Edge-marked segment must be the final segment")]
    EdgeNotLast,

    /// `cut` asked for more segments than the key holds.
    #[error("Cut depth {depth} exceeds key depth {key_depth}")]
    CutTooDeep { depth: usize, key_depth: usize },
}

impl KeyError {
    pub(crate) fn decode(offset: usize, msg: impl Into<String>) -> Self {
        Self::Decode {
            offset,
            msg: msg.into(),
        }
    }
}
