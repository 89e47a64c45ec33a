//! `Key`: a mutable, bounded buffer of encoded segments.
//!
//! A key holds the concatenated encodings of its segments plus an index
//! of segment boundaries. All mutation happens in place — a scan loop
//! threads one `Key` through thousands of seek/test cycles without
//! allocating per step. One key is exclusively owned by one scan at a
//! time.
//!
//! Comparison, equality and hashing operate on the raw encoded bytes;
//! the codec guarantees this equals tuple comparison of the decoded
//! segments (a strict prefix sorts before any key extending it).

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use crate::codec::encode::{decode_segment, encode_value, ESCAPE};
use crate::codec::{Edge, Value};
use crate::error::{KeyError, Result};

/// Maximum encoded size of a key in bytes.
pub const MAX_KEY_SIZE: usize = 2047;

/// A composite key: an ordered sequence of typed segments in one
/// contiguous encoded buffer.
#[derive(Clone)]
pub struct Key {
    buf: Vec<u8>,
    /// End offset (exclusive) of each segment, one entry per depth.
    ends: Vec<usize>,
    /// Edge marker on the final segment, if any. Mirrors the buffer
    /// bytes; kept separately so append can reject follow-ups in O(1).
    edge: Option<Edge>,
    /// Next segment index for `decode_next`.
    cursor: usize,
    capacity: usize,
}

impl Key {
    pub fn new() -> Self {
        Self::with_capacity(MAX_KEY_SIZE)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::new(),
            ends: Vec::new(),
            edge: None,
            cursor: 0,
            capacity,
        }
    }

    /// Build a key from decoded segment values. Test and setup helper;
    /// scan loops should reuse one key via `append`/`to`/`cut`.
    pub fn with_segments<I>(segments: I) -> Result<Self>
    where
        I: IntoIterator,
        I::Item: Into<Value>,
    {
        let mut key = Self::new();
        for seg in segments {
            key.append(seg)?;
        }
        Ok(key)
    }

    /// Reconstruct a key from its encoded bytes, validating every
    /// segment. This is how the storage layer hands keys back.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        if bytes.len() > MAX_KEY_SIZE {
            return Err(KeyError::KeyOverflow {
                needed: bytes.len(),
                capacity: MAX_KEY_SIZE,
            });
        }
        let mut ends = Vec::new();
        let mut edge = None;
        let mut offset = 0;
        while offset < bytes.len() {
            let (_, seg_edge, next) = decode_segment(&bytes, offset)?;
            if seg_edge.is_some() && next != bytes.len() {
                return Err(KeyError::decode(offset, "edge marker on non-final segment"));
            }
            ends.push(next);
            edge = seg_edge;
            offset = next;
        }
        Ok(Self {
            buf: bytes,
            ends,
            edge,
            cursor: 0,
            capacity: MAX_KEY_SIZE,
        })
    }

    // ── Accessors ──────────────────────────────────────────────────

    /// Number of segments currently appended.
    pub fn depth(&self) -> usize {
        self.ends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ends.is_empty()
    }

    /// Raw encoded bytes. This is the durable on-disk form and the seek
    /// target handed to the storage layer.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// True iff the key is the single terminal `{before}` sentinel.
    pub fn is_before(&self) -> bool {
        self.depth() == 1 && matches!(self.segment(0), Ok((Value::Before, None)))
    }

    /// True iff the key is the single terminal `{after}` sentinel.
    pub fn is_after(&self) -> bool {
        self.depth() == 1 && matches!(self.segment(0), Ok((Value::After, None)))
    }

    /// Decode the segment at `depth` without touching the read cursor.
    pub fn segment(&self, depth: usize) -> Result<(Value, Option<Edge>)> {
        if depth >= self.depth() {
            return Err(KeyError::decode(self.buf.len(), "no segment remains"));
        }
        let start = if depth == 0 { 0 } else { self.ends[depth - 1] };
        let (value, edge, _) = decode_segment(&self.buf, start)?;
        Ok((value, edge))
    }

    // ── Mutation ───────────────────────────────────────────────────

    /// Append one segment. Fails with `KeyOverflow` if the encoding
    /// would exceed capacity; the key is unchanged on failure.
    pub fn append(&mut self, value: impl Into<Value>) -> Result<&mut Self> {
        self.append_value(value.into(), None)
    }

    /// Append one segment with an optional edge marker. Edge-marked
    /// segments are terminal: nothing may be appended after them.
    pub(crate) fn append_value(&mut self, value: Value, edge: Option<Edge>) -> Result<&mut Self> {
        if self.edge.is_some() {
            return Err(KeyError::EdgeNotLast);
        }
        let old_len = self.buf.len();
        encode_value(&value, &mut self.buf);
        match edge {
            Some(Edge::Before) => {
                self.buf.pop();
            }
            Some(Edge::After) => {
                *self.buf.last_mut().expect("segment is never empty") = ESCAPE;
            }
            None => {}
        }
        if self.buf.len() > self.capacity {
            let needed = self.buf.len();
            self.buf.truncate(old_len);
            return Err(KeyError::KeyOverflow {
                needed,
                capacity: self.capacity,
            });
        }
        self.ends.push(self.buf.len());
        self.edge = edge;
        Ok(self)
    }

    /// Replace the final segment (append when the key is empty).
    /// Unchanged on failure.
    pub fn to(&mut self, value: impl Into<Value>) -> Result<&mut Self> {
        if self.is_empty() {
            return self.append(value);
        }
        let start = if self.depth() == 1 {
            0
        } else {
            self.ends[self.depth() - 2]
        };
        // Snapshot the tail so a failed re-encode has no partial effect.
        let saved_tail: Vec<u8> = self.buf[start..].to_vec();
        let saved_edge = self.edge;
        self.buf.truncate(start);
        self.ends.pop();
        self.edge = None;
        match self.append(value) {
            Ok(_) => {
                self.clamp_cursor();
                Ok(self)
            }
            Err(e) => {
                self.buf.extend_from_slice(&saved_tail);
                self.ends.push(self.buf.len());
                self.edge = saved_edge;
                Err(e)
            }
        }
    }

    /// Truncate to exactly `depth` segments.
    pub fn cut(&mut self, depth: usize) -> Result<&mut Self> {
        if depth > self.depth() {
            return Err(KeyError::CutTooDeep {
                depth,
                key_depth: self.depth(),
            });
        }
        if depth < self.depth() {
            let end = if depth == 0 { 0 } else { self.ends[depth - 1] };
            self.buf.truncate(end);
            self.ends.truncate(depth);
            self.edge = None;
        }
        self.clamp_cursor();
        Ok(self)
    }

    /// Remove all segments.
    pub fn clear(&mut self) -> &mut Self {
        self.buf.clear();
        self.ends.clear();
        self.edge = None;
        self.cursor = 0;
        self
    }

    fn clamp_cursor(&mut self) {
        if self.cursor > self.depth() {
            self.cursor = self.depth();
        }
    }

    // ── Sequential decode ──────────────────────────────────────────

    /// Reposition the read cursor to depth 0.
    pub fn reset(&mut self) -> &mut Self {
        self.cursor = 0;
        self
    }

    /// Decode the segment at the read cursor and advance it. Fails with
    /// a decode error when no segment remains.
    pub fn decode_next(&mut self) -> Result<Value> {
        let (value, _) = self.segment(self.cursor)?;
        self.cursor += 1;
        Ok(value)
    }

    pub(crate) fn edge(&self) -> Option<Edge> {
        self.edge
    }
}

impl Default for Key {
    fn default() -> Self {
        Self::new()
    }
}

// ── Comparison / hashing: raw encoded bytes ────────────────────────

impl PartialEq for Key {
    fn eq(&self, other: &Self) -> bool {
        self.buf == other.buf
    }
}

impl Eq for Key {}

impl PartialOrd for Key {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Key {
    fn cmp(&self, other: &Self) -> Ordering {
        self.buf.cmp(&other.buf)
    }
}

impl Hash for Key {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.buf.hash(state);
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Key({})", self)
    }
}

/// Renders `{seg,seg,…}` in grammar literal syntax, with a trailing `-`
/// (before-edge) or `+` (after-edge) when the final segment is
/// edge-marked.
impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for depth in 0..self.depth() {
            if depth > 0 {
                write!(f, ",")?;
            }
            match self.segment(depth) {
                Ok((value, _)) => write!(f, "{}", value)?,
                Err(_) => write!(f, "<corrupt>")?,
            }
        }
        write!(f, "}}")?;
        match self.edge {
            Some(Edge::Before) => write!(f, "-"),
            Some(Edge::After) => write!(f, "+"),
            None => Ok(()),
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_append_and_decode_roundtrip() {
        let mut key = Key::new();
        key.append("atlantic").unwrap();
        key.append(1.3).unwrap();
        key.append(42i64).unwrap();
        assert_eq!(key.depth(), 3);

        key.reset();
        assert_eq!(key.decode_next().unwrap(), Value::from("atlantic"));
        assert_eq!(key.decode_next().unwrap(), Value::Float(1.3));
        assert_eq!(key.decode_next().unwrap(), Value::Int(42));
        assert!(key.decode_next().is_err());
    }

    #[test]
    fn test_to_replaces_final_segment() {
        let mut key = Key::with_segments(["atlantic"]).unwrap();
        key.append("y").unwrap();
        key.to("w").unwrap();
        assert_eq!(key.depth(), 2);
        assert_eq!(key.segment(1).unwrap().0, Value::from("w"));
        assert_eq!(key.segment(0).unwrap().0, Value::from("atlantic"));
    }

    #[test]
    fn test_to_on_empty_appends() {
        let mut key = Key::new();
        key.to(7i64).unwrap();
        assert_eq!(key.depth(), 1);
        assert_eq!(key.segment(0).unwrap().0, Value::Int(7));
    }

    #[test]
    fn test_cut() {
        let mut key = Key::with_segments([1i64, 2, 3, 4]).unwrap();
        key.cut(2).unwrap();
        assert_eq!(key.depth(), 2);
        assert_eq!(key.segment(1).unwrap().0, Value::Int(2));
        assert!(key.segment(2).is_err());
        assert!(key.cut(5).is_err());
        key.cut(2).unwrap(); // cut to current depth is a no-op
        assert_eq!(key.depth(), 2);
    }

    #[test]
    fn test_compare_matches_tuple_order() {
        let a = Key::with_segments(["atlantic"]).unwrap();
        let mut ab = a.clone();
        ab.append(1i64).unwrap();
        let b = Key::with_segments(["baltic"]).unwrap();

        assert!(a < ab, "prefix sorts before its extension");
        assert!(ab < b);
        assert_eq!(a.cmp(&a.clone()), Ordering::Equal);
    }

    #[test]
    fn test_equality_and_hash_from_bytes() {
        use std::collections::HashSet;
        let a = Key::with_segments([10i64, 20]).unwrap();
        let b = Key::with_segments([10i64, 20]).unwrap();
        assert_eq!(a, b);
        let mut set = HashSet::new();
        set.insert(a);
        assert!(set.contains(&b));
    }

    #[test]
    fn test_overflow_leaves_key_unchanged() {
        let mut key = Key::with_capacity(24);
        key.append(1i64).unwrap();
        let before = key.as_bytes().to_vec();
        let err = key.append("a very long string that cannot fit").unwrap_err();
        assert!(matches!(err, KeyError::KeyOverflow { .. }));
        assert_eq!(key.as_bytes(), &before[..]);
        assert_eq!(key.depth(), 1);
    }

    #[test]
    fn test_to_overflow_restores_original() {
        let mut key = Key::with_capacity(24);
        key.append("ab").unwrap();
        let before = key.as_bytes().to_vec();
        assert!(key.to("a much longer replacement segment").is_err());
        assert_eq!(key.as_bytes(), &before[..]);
        assert_eq!(key.segment(0).unwrap().0, Value::from("ab"));
    }

    #[test]
    fn test_mutation_clamps_decode_cursor() {
        let mut key = Key::with_segments([1i64, 2, 3]).unwrap();
        key.reset();
        key.decode_next().unwrap();
        key.decode_next().unwrap();
        key.cut(1).unwrap();
        assert!(key.decode_next().is_err());
        key.reset();
        assert_eq!(key.decode_next().unwrap(), Value::Int(1));
    }

    #[test]
    fn test_append_after_edge_rejected() {
        let mut key = Key::new();
        key.append_value(Value::from("z"), Some(Edge::Before)).unwrap();
        let err = key.append(1i64).unwrap_err();
        assert!(matches!(err, KeyError::EdgeNotLast));
    }

    #[test]
    fn test_edge_ordering_at_key_level() {
        let mut z_before = Key::new();
        z_before
            .append_value(Value::from("z"), Some(Edge::Before))
            .unwrap();
        let z = Key::with_segments(["z"]).unwrap();
        let mut z_deep = z.clone();
        z_deep.append("anything").unwrap();
        let y_deep = Key::with_segments(["y", "deeper"]).unwrap();

        assert!(y_deep < z_before);
        assert!(z_before < z);
        assert!(z_before < z_deep);
    }

    #[test]
    fn test_from_bytes_roundtrip_and_validation() {
        let key = Key::with_segments(["a", "b"]).unwrap();
        let restored = Key::from_bytes(key.as_bytes().to_vec()).unwrap();
        assert_eq!(restored, key);
        assert_eq!(restored.depth(), 2);

        // Corrupt tag.
        assert!(Key::from_bytes(vec![0x7f, 0x00]).is_err());

        // Before-edge form (missing final terminator) round-trips.
        let mut bytes = key.as_bytes().to_vec();
        bytes.pop();
        let edged = Key::from_bytes(bytes).unwrap();
        assert_eq!(edged.edge(), Some(Edge::Before));

        // After-edge form round-trips; bytes following it are malformed.
        let mut bytes = key.as_bytes().to_vec();
        *bytes.last_mut().unwrap() = ESCAPE;
        let edged = Key::from_bytes(bytes.clone()).unwrap();
        assert_eq!(edged.edge(), Some(Edge::After));
        bytes.extend_from_slice(key.as_bytes());
        assert!(Key::from_bytes(bytes).is_err());
    }

    #[test]
    fn test_display() {
        let mut key = Key::with_segments(["atlantic"]).unwrap();
        key.append(1.3).unwrap();
        key.append("z").unwrap();
        assert_eq!(key.to_string(), "{\"atlantic\",1.3,\"z\"}");

        key.cut(2).unwrap();
        key.append_value(Value::from("z"), Some(Edge::Before)).unwrap();
        assert_eq!(key.to_string(), "{\"atlantic\",1.3,\"z\"}-");

        let mut sentinel = Key::new();
        sentinel.append(Value::After).unwrap();
        assert_eq!(sentinel.to_string(), "{{after}}");
    }

    proptest! {
        #[test]
        fn prop_key_compare_matches_segment_compare(
            a in proptest::collection::vec(any::<i64>(), 0..5),
            b in proptest::collection::vec(any::<i64>(), 0..5),
        ) {
            let ka = Key::with_segments(a.clone()).unwrap();
            let kb = Key::with_segments(b.clone()).unwrap();
            prop_assert_eq!(ka.cmp(&kb), a.cmp(&b));
        }
    }
}
