//! Segment codec: typed values and their ordered byte encoding.
//!
//! The codec guarantees that bytewise comparison of encoded segments
//! equals semantic comparison of the decoded values, and that no two
//! distinct values share an encoding. Both properties are load-bearing
//! for the whole crate: `Key` comparison and filter traversal operate on
//! raw bytes.

pub(crate) mod encode;
pub mod value;

pub use value::{Edge, Value};
