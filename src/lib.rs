//! # keyspan
//!
//! Composite-key encoding and range-filter traversal for embedded
//! ordered key-value storage.
//!
//! Keys are tuples of heterogeneous typed values (strings, integers,
//! floats, dates, byte arrays, sentinels) serialized into a single
//! strictly-ordered byte sequence: bytewise comparison of encodings
//! equals semantic comparison of the decoded tuples. On top of the
//! encoding sits a filter engine expressing multi-segment range and
//! union predicates that can compute — without scanning every
//! intermediate key — the next key that could possibly match in a given
//! scan direction, turning an O(keys-in-range) cursor walk into an
//! O(filter-terms) jump.
//!
//! ## Core loop
//!
//! ```
//! use keyspan::{FilteredScan, Key, KeyFilter, MemStore};
//!
//! let mut store = MemStore::new();
//! for i in 0..100i64 {
//!     store.insert(&Key::with_segments([i]).unwrap());
//! }
//!
//! let filter = KeyFilter::parse("{{[10:20),[50:60),(80:90]}}").unwrap();
//! let hits: Vec<Key> = FilteredScan::new(&store, &filter, true)
//!     .collect::<keyspan::Result<_>>()
//!     .unwrap();
//! assert_eq!(hits.len(), 10 + 10 + 10);
//! ```
//!
//! The tree storage that physically holds keys, transactions, recovery
//! and buffer management live elsewhere; this crate only consumes a
//! directional "next/previous stored key" primitive (see
//! [`OrderedStore`]) and hands back match/seek decisions.

pub mod codec;
pub mod error;
pub mod filter;
pub mod key;
pub mod store;

// Public re-exports for the top-level API
pub use codec::{Edge, Value};
pub use error::{KeyError, Result};
pub use filter::{KeyFilter, Range, Term};
pub use key::{Key, MAX_KEY_SIZE};
pub use store::{FilteredScan, MemStore, OrderedStore};
