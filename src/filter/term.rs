//! Filter terms: the per-depth predicates of a key filter.
//!
//! A term describes the allowed value set at one segment depth:
//! `Wildcard` (anything), a single `Range`, or a `Union` of disjoint
//! ranges. Terms are immutable pure values; invariants are checked at
//! construction and never silently repaired — a quietly "fixed" filter
//! would change query semantics invisibly.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::codec::{Edge, Value};
use crate::error::{KeyError, Result};

/// Where a value sits relative to a range, in key order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RangePos {
    Below,
    In,
    Above,
}

/// A single interval over segment values. `None` bounds are unbounded.
///
/// Bounds compare across type classes like any segment values, so a
/// range may span classes (`[10 : "x")` is legal).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Range {
    low: Option<Value>,
    low_inclusive: bool,
    high: Option<Value>,
    high_inclusive: bool,
}

impl Range {
    /// Construct a range, failing fast on a reversed or empty interval.
    pub fn new(
        low: Option<Value>,
        low_inclusive: bool,
        high: Option<Value>,
        high_inclusive: bool,
    ) -> Result<Self> {
        if let Some(b) = [&low, &high].into_iter().flatten().find(|b| b.is_sentinel()) {
            return Err(KeyError::InvalidFilter(format!(
                "sentinel {} cannot bound a range; use an unbounded side",
                b
            )));
        }
        if let (Some(lo), Some(hi)) = (&low, &high) {
            match lo.cmp(hi) {
                Ordering::Greater => {
                    return Err(KeyError::InvalidFilter(format!(
                        "range bounds reversed: {} > {}",
                        lo, hi
                    )));
                }
                Ordering::Equal if !(low_inclusive && high_inclusive) => {
                    return Err(KeyError::InvalidFilter(format!(
                        "range [{}:{}] is empty under exclusive bounds",
                        lo, hi
                    )));
                }
                _ => {}
            }
        }
        Ok(Self {
            low,
            low_inclusive,
            high,
            high_inclusive,
        })
    }

    /// The closed interval `[low:high]`.
    pub fn closed(low: impl Into<Value>, high: impl Into<Value>) -> Result<Self> {
        Self::new(Some(low.into()), true, Some(high.into()), true)
    }

    /// The half-open interval `[low:high)`.
    pub fn half_open(low: impl Into<Value>, high: impl Into<Value>) -> Result<Self> {
        Self::new(Some(low.into()), true, Some(high.into()), false)
    }

    /// The degenerate interval `[v:v]`.
    pub fn point(value: impl Into<Value>) -> Result<Self> {
        let v = value.into();
        Self::new(Some(v.clone()), true, Some(v), true)
    }

    /// Unbounded on both sides: every real value, but not the sentinels.
    pub fn all() -> Self {
        Self {
            low: None,
            low_inclusive: false,
            high: None,
            high_inclusive: false,
        }
    }

    pub fn low(&self) -> Option<&Value> {
        self.low.as_ref()
    }

    pub fn high(&self) -> Option<&Value> {
        self.high.as_ref()
    }

    pub fn low_inclusive(&self) -> bool {
        self.low_inclusive
    }

    pub fn high_inclusive(&self) -> bool {
        self.high_inclusive
    }

    /// True iff this is a `[v:v]` point.
    pub fn is_point(&self) -> bool {
        self.low_inclusive
            && self.high_inclusive
            && matches!((&self.low, &self.high), (Some(lo), Some(hi)) if lo == hi)
    }

    pub fn matches(&self, value: &Value) -> bool {
        !value.is_sentinel() && self.position(value, None) == RangePos::In
    }

    /// Position of a (possibly edge-marked) segment value relative to
    /// this range. An edge-marked value compares as "just below" or
    /// "just above" its literal, mirroring the byte-level ordering.
    pub(crate) fn position(&self, value: &Value, edge: Option<Edge>) -> RangePos {
        match value {
            Value::Before => return RangePos::Below,
            Value::After => return RangePos::Above,
            _ => {}
        }
        if let Some(lo) = &self.low {
            match cmp_edged(value, edge, lo) {
                Ordering::Less => return RangePos::Below,
                Ordering::Equal if !self.low_inclusive => return RangePos::Below,
                _ => {}
            }
        }
        if let Some(hi) = &self.high {
            match cmp_edged(value, edge, hi) {
                Ordering::Greater => return RangePos::Above,
                Ordering::Equal if !self.high_inclusive => return RangePos::Above,
                _ => {}
            }
        }
        RangePos::In
    }

    /// True iff some allowed value lies strictly above `value`.
    pub(crate) fn has_room_above(&self, value: &Value) -> bool {
        match &self.high {
            Some(hi) => value < hi,
            None => true,
        }
    }

    /// True iff some allowed value lies strictly below `value`.
    pub(crate) fn has_room_below(&self, value: &Value) -> bool {
        match &self.low {
            Some(lo) => value > lo,
            None => true,
        }
    }

    /// True iff `other` starts after every value of `self` ends
    /// (allowing touching bounds when at most one side is inclusive).
    fn precedes_disjoint(&self, other: &Self) -> bool {
        match (&self.high, &other.low) {
            (Some(hi), Some(lo)) => match hi.cmp(lo) {
                Ordering::Less => true,
                Ordering::Equal => !(self.high_inclusive && other.low_inclusive),
                Ordering::Greater => false,
            },
            // An unbounded side overlaps everything beyond it.
            _ => false,
        }
    }
}

/// Compare a possibly edge-marked value against a literal. An edge
/// breaks the tie when the literals are equal: before-edge sorts just
/// below, after-edge just above.
fn cmp_edged(value: &Value, edge: Option<Edge>, other: &Value) -> Ordering {
    match value.cmp(other) {
        Ordering::Equal => match edge {
            Some(Edge::Before) => Ordering::Less,
            Some(Edge::After) => Ordering::Greater,
            None => Ordering::Equal,
        },
        ord => ord,
    }
}

/// One filter term: the allowed value set at one segment depth.
///
/// `Union` must hold subranges sorted ascending and pairwise disjoint;
/// build it through [`Term::union`], which checks both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Term {
    /// Matches any segment, sentinels included.
    Wildcard,
    Range(Range),
    Union(Vec<Range>),
}

impl Term {
    /// A point term `[v:v]`.
    pub fn point(value: impl Into<Value>) -> Result<Self> {
        Ok(Term::Range(Range::point(value)?))
    }

    /// Build a union term, failing fast unless the subranges are sorted
    /// ascending and pairwise non-overlapping. A single subrange
    /// collapses to a plain range term.
    pub fn union(ranges: Vec<Range>) -> Result<Self> {
        if ranges.is_empty() {
            return Err(KeyError::InvalidFilter("empty union".into()));
        }
        for (i, pair) in ranges.windows(2).enumerate() {
            if !pair[0].precedes_disjoint(&pair[1]) {
                return Err(KeyError::InvalidFilter(format!(
                    "union subranges {} and {} overlap or are out of order",
                    pair[0],
                    ranges[i + 1]
                )));
            }
        }
        let mut ranges = ranges;
        if ranges.len() == 1 {
            Ok(Term::Range(ranges.remove(0)))
        } else {
            Ok(Term::Union(ranges))
        }
    }

    pub fn matches(&self, value: &Value) -> bool {
        match self {
            Term::Wildcard => true,
            Term::Range(r) => r.matches(value),
            Term::Union(ranges) => ranges.iter().any(|r| r.matches(value)),
        }
    }
}

// ── Display: canonical grammar rendering ───────────────────────────

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_point() {
            return write!(f, "{}", self.low.as_ref().expect("point has bounds"));
        }
        match (&self.low, self.low_inclusive) {
            (Some(lo), true) => write!(f, "[{}", lo)?,
            (Some(lo), false) => write!(f, "({}", lo)?,
            (None, _) => write!(f, "(")?,
        }
        write!(f, ":")?;
        match (&self.high, self.high_inclusive) {
            (Some(hi), true) => write!(f, "{}]", hi),
            (Some(hi), false) => write!(f, "{})", hi),
            (None, _) => write!(f, ")"),
        }
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Wildcard => write!(f, "*"),
            Term::Range(r) => write!(f, "{}", r),
            Term::Union(ranges) => {
                write!(f, "{{")?;
                for (i, r) in ranges.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{}", r)?;
                }
                write!(f, "}}")
            }
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────────
