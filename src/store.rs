//! Storage collaborator contract and the filtered scan loop.
//!
//! The traversal core does not own any storage: it only asks an
//! [`OrderedStore`] for the next or previous stored key relative to a
//! seek target, and hands back "does this key match / where to seek
//! next" decisions. [`FilteredScan`] wires the two together into the
//! canonical loop: fetch, test `selected`, on failure `traverse` to a
//! jump target and re-fetch inclusively, stop on exhaustion.
//!
//! [`MemStore`] is the in-memory reference implementation, used by the
//! integration tests and benches and as a template for real backends.

use std::collections::BTreeSet;
use std::ops::Bound;

use crate::error::Result;
use crate::filter::KeyFilter;
use crate::key::Key;

/// Directional access to stored keys. The seek target may be synthetic
/// (sentinel or edge-marked); implementations compare raw encoded bytes
/// and never need to decode it.
pub trait OrderedStore {
    /// Smallest stored key greater than `from` (or equal, when
    /// `inclusive`).
    fn next_key(&self, from: &Key, inclusive: bool) -> Option<Key>;

    /// Largest stored key less than `from` (or equal, when `inclusive`).
    fn prev_key(&self, from: &Key, inclusive: bool) -> Option<Key>;
}

/// A directional filtered scan over a store: yields exactly the stored
/// keys selected by the filter, in key order, skipping excluded regions
/// via `traverse` jumps instead of stepping through them.
pub struct FilteredScan<'a, S: OrderedStore> {
    store: &'a S,
    filter: &'a KeyFilter,
    cursor: Key,
    forward: bool,
    inclusive: bool,
    done: bool,
}

impl<'a, S: OrderedStore> FilteredScan<'a, S> {
    pub fn new(store: &'a S, filter: &'a KeyFilter, forward: bool) -> Self {
        let mut cursor = Key::new();
        cursor
            .append(if forward {
                crate::codec::Value::Before
            } else {
                crate::codec::Value::After
            })
            .expect("a sentinel fits any key buffer");
        Self {
            store,
            filter,
            cursor,
            forward,
            inclusive: false,
            done: false,
        }
    }
}

impl<S: OrderedStore> Iterator for FilteredScan<'_, S> {
    type Item = Result<Key>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        loop {
            let fetched = if self.forward {
                self.store.next_key(&self.cursor, self.inclusive)
            } else {
                self.store.prev_key(&self.cursor, self.inclusive)
            };
            let Some(key) = fetched else {
                self.done = true;
                return None;
            };
            self.cursor = key;
            self.inclusive = false;

            match self.filter.selected(&self.cursor) {
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
                Ok(true) => return Some(Ok(self.cursor.clone())),
                Ok(false) => match self.filter.traverse(&mut self.cursor, self.forward) {
                    Err(e) => {
                        self.done = true;
                        return Some(Err(e));
                    }
                    Ok(false) => {
                        self.done = true;
                        return None;
                    }
                    Ok(true) => {
                        self.inclusive = true;
                    }
                },
            }
        }
    }
}

/// In-memory ordered key store over the raw encoded bytes.
#[derive(Debug, Default)]
pub struct MemStore {
    keys: BTreeSet<Vec<u8>>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: &Key) {
        self.keys.insert(key.as_bytes().to_vec());
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// All stored keys in order. Brute-force comparison baseline for
    /// tests and benches.
    pub fn keys(&self) -> impl Iterator<Item = Key> + '_ {
        self.keys
            .iter()
            .map(|bytes| Key::from_bytes(bytes.clone()).expect("store holds only encoded keys"))
    }
}

impl OrderedStore for MemStore {
    fn next_key(&self, from: &Key, inclusive: bool) -> Option<Key> {
        let start = if inclusive {
            Bound::Included(from.as_bytes().to_vec())
        } else {
            Bound::Excluded(from.as_bytes().to_vec())
        };
        self.keys
            .range((start, Bound::Unbounded))
            .next()
            .map(|bytes| Key::from_bytes(bytes.clone()).expect("store holds only encoded keys"))
    }

    fn prev_key(&self, from: &Key, inclusive: bool) -> Option<Key> {
        let end = if inclusive {
            Bound::Included(from.as_bytes().to_vec())
        } else {
            Bound::Excluded(from.as_bytes().to_vec())
        };
        self.keys
            .range((Bound::Unbounded, end))
            .next_back()
            .map(|bytes| Key::from_bytes(bytes.clone()).expect("store holds only encoded keys"))
    }
}

// ── Tests ──────────────────────────────────────────────────────────
