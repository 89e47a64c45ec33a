//! The filter engine: membership testing and skip-jump traversal.
//!
//! A `KeyFilter` is an ordered sequence of terms indexed by segment
//! depth, plus a `[min_depth, max_depth]` window. `selected` tests one
//! key in O(depth). `traverse` is the hard part: given a key that is not
//! selected, it rewrites the key in place to the nearest encoding that
//! could possibly be selected in the scan direction, so the storage
//! layer can seek straight there instead of stepping one entry at a
//! time — O(filter terms) instead of O(keys in the gap).
//!
//! Filters are immutable after construction: `append` and `limit`
//! return new values, and a filter can be shared by any number of
//! concurrent scans.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::codec::{Edge, Value};
use crate::error::{KeyError, Result};
use crate::filter::term::{Range, RangePos, Term};
use crate::key::Key;

/// Depth value meaning "no upper bound".
pub const UNBOUNDED: usize = usize::MAX;

static WILDCARD: Term = Term::Wildcard;

/// A multi-segment range/union predicate over composite keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyFilter {
    terms: Vec<Term>,
    min_depth: usize,
    max_depth: usize,
}

impl Default for KeyFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyFilter {
    /// The empty filter: selects every key.
    pub fn new() -> Self {
        Self {
            terms: Vec::new(),
            min_depth: 0,
            max_depth: UNBOUNDED,
        }
    }

    /// A filter whose leading terms match `key`'s segments exactly, with
    /// `min_depth = max_depth = key.depth()`. This is the literal-prefix
    /// form: extend it with `append` to constrain deeper segments.
    pub fn from_key(key: &Key) -> Result<Self> {
        let mut terms = Vec::with_capacity(key.depth());
        for depth in 0..key.depth() {
            let (value, edge) = key.segment(depth)?;
            if edge.is_some() || value.is_sentinel() {
                return Err(KeyError::InvalidFilter(
                    "sentinel or edge-marked segments cannot seed a filter".into(),
                ));
            }
            terms.push(Term::point(value)?);
        }
        Ok(Self {
            min_depth: terms.len(),
            max_depth: terms.len(),
            terms,
        })
    }

    /// Parse the textual grammar. See the `parse` module docs.
    pub fn parse(input: &str) -> Result<Self> {
        crate::filter::parse::parse_filter(input)
    }

    pub(crate) fn from_parts(terms: Vec<Term>, min_depth: usize, max_depth: usize) -> Result<Self> {
        if min_depth > max_depth {
            return Err(KeyError::InvalidFilter(format!(
                "depth window reversed: {} > {}",
                min_depth, max_depth
            )));
        }
        Ok(Self {
            terms,
            min_depth,
            max_depth,
        })
    }

    /// A new filter with `term` appended at the next depth. The depth
    /// window widens to cover the new term if it was finite.
    #[must_use]
    pub fn append(&self, term: Term) -> Self {
        let mut terms = self.terms.clone();
        terms.push(term);
        let max_depth = if self.max_depth == UNBOUNDED {
            UNBOUNDED
        } else {
            self.max_depth.max(terms.len())
        };
        Self {
            terms,
            min_depth: self.min_depth,
            max_depth,
        }
    }

    /// `append` for several terms at once.
    #[must_use]
    pub fn append_terms(&self, terms: impl IntoIterator<Item = Term>) -> Self {
        terms.into_iter().fold(self.clone(), |f, t| f.append(t))
    }

    /// A new filter with the given depth window. Fails fast when
    /// `min > max`.
    pub fn limit(&self, min_depth: usize, max_depth: usize) -> Result<Self> {
        if min_depth > max_depth {
            return Err(KeyError::InvalidFilter(format!(
                "depth window reversed: {} > {}",
                min_depth, max_depth
            )));
        }
        Ok(Self {
            terms: self.terms.clone(),
            min_depth,
            max_depth,
        })
    }

    pub fn min_depth(&self) -> usize {
        self.min_depth
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    pub fn terms(&self) -> &[Term] {
        &self.terms
    }

    /// The term governing `depth`: an implicit wildcard past the list.
    pub fn term(&self, depth: usize) -> &Term {
        self.terms.get(depth).unwrap_or(&WILDCARD)
    }

    // ── Membership ─────────────────────────────────────────────────

    /// Test whether `key` satisfies this filter.
    ///
    /// Depths beyond `max_depth` are ignored: a deeper key agreeing on
    /// the first `max_depth` segments is selected regardless of what
    /// follows. Edge-marked keys are synthetic seek targets and are
    /// never selected.
    pub fn selected(&self, key: &Key) -> Result<bool> {
        if key.depth() < self.min_depth {
            return Ok(false);
        }
        let checked = key.depth().min(self.max_depth);
        for depth in 0..checked {
            let (value, edge) = key.segment(depth)?;
            if edge.is_some() || !self.term(depth).matches(&value) {
                return Ok(false);
            }
        }
        Ok(true)
    }

    // ── Traversal ──────────────────────────────────────────────────

    /// Rewrite `key` in place to the nearest key, in the scan direction,
    /// that could possibly be selected.
    ///
    /// Returns `Ok(true)` when a candidate exists: the caller re-seeks
    /// the storage cursor to the rewritten key (inclusive seek) and
    /// resumes. Returns `Ok(false)` when the filter is exhausted in this
    /// direction; the key is left at the terminal sentinel (`{after}`
    /// forward, `{before}` backward) and the scan must stop.
    pub fn traverse(&self, key: &mut Key, forward: bool) -> Result<bool> {
        let checked = key.depth().min(self.max_depth);
        let mut failing = None;
        for depth in 0..checked {
            let (value, edge) = key.segment(depth)?;
            if edge.is_some() || !self.term(depth).matches(&value) {
                failing = Some((depth, value, edge));
                break;
            }
        }

        let Some((mut depth, value, edge)) = failing else {
            return self.traverse_agreeing(key, forward);
        };

        let mut candidate = boundary_for(self.term(depth), &value, edge, forward);
        while candidate.is_none() {
            // This depth has no further candidate in the direction;
            // advance the nearest shallower depth past its current value.
            if depth == 0 {
                return self.exhaust(key, forward);
            }
            depth -= 1;
            let (value, _) = key.segment(depth)?;
            candidate = step_past(self.term(depth), &value, forward);
        }
        let (boundary, boundary_edge) = candidate.expect("loop exits with a candidate");

        key.cut(depth)?;
        key.append_value(boundary, boundary_edge)?;
        self.finish_candidate(key, forward)?;
        tracing::trace!(candidate = %key, forward, depth, "skip-jump");
        Ok(true)
    }

    /// Every checked depth agrees with its term. Either the key is too
    /// shallow (extend toward `min_depth`) or it is already selected —
    /// in which case still make progress, so a scan loop that calls
    /// traverse unconditionally cannot spin.
    fn traverse_agreeing(&self, key: &mut Key, forward: bool) -> Result<bool> {
        if key.edge().is_some() {
            // Already a synthetic bound; the inclusive re-seek makes
            // progress through storage.
            return Ok(true);
        }
        if forward {
            if key.depth() < self.min_depth {
                self.extend_to_min(key, true)?;
            } else {
                key.append_value(Value::Before, None)?;
            }
            Ok(true)
        } else {
            // Deeper extensions of this key all sort above it, so the
            // next candidate downward is just below the final segment.
            let Some(last) = key.depth().checked_sub(1) else {
                return self.exhaust(key, false);
            };
            let (value, _) = key.segment(last)?;
            if value.is_sentinel() {
                return Ok(true);
            }
            key.cut(last)?;
            key.append_value(value, Some(Edge::Before))?;
            Ok(true)
        }
    }

    /// Seed depths up to `min_depth` with each term's entry value in the
    /// scan direction. Stops early if an entry is edge-marked (an
    /// edge-marked segment is terminal).
    fn extend_to_min(&self, key: &mut Key, forward: bool) -> Result<()> {
        while key.depth() < self.min_depth {
            let (value, edge) = entry_bound(self.term(key.depth()), forward);
            key.append_value(value, edge)?;
            if edge.is_some() {
                break;
            }
        }
        Ok(())
    }

    /// Post-process a rewritten candidate: forward keys too shallow for
    /// the window are extended downward-inclusive; backward candidates
    /// get an `{after}` cap so the seek does not skip deeper keys that
    /// share the boundary prefix.
    fn finish_candidate(&self, key: &mut Key, forward: bool) -> Result<()> {
        let (last, last_edge) = key.segment(key.depth() - 1)?;
        if last_edge.is_some() || last.is_sentinel() {
            return Ok(());
        }
        if forward {
            self.extend_to_min(key, true)?;
        } else {
            key.append_value(Value::After, None)?;
        }
        Ok(())
    }

    fn exhaust(&self, key: &mut Key, forward: bool) -> Result<bool> {
        key.clear();
        key.append_value(if forward { Value::After } else { Value::Before }, None)?;
        tracing::trace!(forward, "filter exhausted");
        Ok(false)
    }
}

// ── Boundary computation ───────────────────────────────────────────

/// First allowed value of `range` when entering from below.
fn enter_low(range: &Range) -> (Value, Option<Edge>) {
    match range.low() {
        Some(lo) => {
            let edge = if range.low_inclusive() {
                None
            } else {
                Some(Edge::After)
            };
            (lo.clone(), edge)
        }
        None => (Value::Before, None),
    }
}

/// Last allowed value of `range` when entering from above.
fn enter_high(range: &Range) -> (Value, Option<Edge>) {
    match range.high() {
        Some(hi) => {
            let edge = if range.high_inclusive() {
                None
            } else {
                Some(Edge::Before)
            };
            (hi.clone(), edge)
        }
        None => (Value::After, None),
    }
}

/// Entry bound of a whole term in the scan direction.
fn entry_bound(term: &Term, forward: bool) -> (Value, Option<Edge>) {
    match term {
        Term::Wildcard => (
            if forward { Value::Before } else { Value::After },
            None,
        ),
        Term::Range(r) => {
            if forward {
                enter_low(r)
            } else {
                enter_high(r)
            }
        }
        Term::Union(ranges) => {
            if forward {
                enter_low(ranges.first().expect("unions are non-empty"))
            } else {
                enter_high(ranges.last().expect("unions are non-empty"))
            }
        }
    }
}

/// Candidate at a failing depth: the nearest boundary of `term` at or
/// beyond the segment's value in the scan direction, or `None` when the
/// term has no further candidate that way.
fn boundary_for(
    term: &Term,
    value: &Value,
    edge: Option<Edge>,
    forward: bool,
) -> Option<(Value, Option<Edge>)> {
    match term {
        // A wildcard only fails on an edge-marked segment; the literal
        // value (or the mark itself) is already the tightest bound.
        Term::Wildcard => Some(unmark_toward(value, edge, forward)),
        Term::Range(r) => range_boundary(r, value, edge, forward),
        Term::Union(ranges) => {
            if forward {
                ranges
                    .iter()
                    .find_map(|r| range_boundary(r, value, edge, true))
            } else {
                ranges
                    .iter()
                    .rev()
                    .find_map(|r| range_boundary(r, value, edge, false))
            }
        }
    }
}

fn range_boundary(
    range: &Range,
    value: &Value,
    edge: Option<Edge>,
    forward: bool,
) -> Option<(Value, Option<Edge>)> {
    match (range.position(value, edge), forward) {
        (RangePos::Below, true) => Some(enter_low(range)),
        (RangePos::Above, false) => Some(enter_high(range)),
        (RangePos::In, _) => Some(unmark_toward(value, edge, forward)),
        (RangePos::Below, false) | (RangePos::Above, true) => None,
    }
}

/// An edge-marked segment whose literal lies inside the allowed set:
/// moving forward past a before-edge (or backward past an after-edge)
/// lands on the literal itself; otherwise the mark is already the
/// tightest bound in that direction and the candidate is unchanged.
fn unmark_toward(value: &Value, edge: Option<Edge>, forward: bool) -> (Value, Option<Edge>) {
    match (edge, forward) {
        (Some(Edge::Before), true) | (Some(Edge::After), false) => (value.clone(), None),
        _ => (value.clone(), edge),
    }
}

/// Smallest (forward) / largest (backward) allowed candidate strictly
/// beyond `value` at a depth whose segment currently matches `term`, or
/// `None` when the term is exhausted past it.
fn step_past(term: &Term, value: &Value, forward: bool) -> Option<(Value, Option<Edge>)> {
    let nudge = Some(if forward { Edge::After } else { Edge::Before });
    match term {
        Term::Wildcard => Some((value.clone(), nudge)),
        Term::Range(r) => {
            let has_room = if forward {
                r.has_room_above(value)
            } else {
                r.has_room_below(value)
            };
            has_room.then(|| (value.clone(), nudge))
        }
        Term::Union(ranges) => {
            if forward {
                let idx = ranges
                    .iter()
                    .position(|r| r.position(value, None) == RangePos::In)?;
                if ranges[idx].has_room_above(value) {
                    Some((value.clone(), nudge))
                } else {
                    ranges.get(idx + 1).map(enter_low)
                }
            } else {
                let idx = ranges
                    .iter()
                    .rposition(|r| r.position(value, None) == RangePos::In)?;
                if ranges[idx].has_room_below(value) {
                    Some((value.clone(), nudge))
                } else {
                    idx.checked_sub(1).map(|i| enter_high(&ranges[i]))
                }
            }
        }
    }
}

// ── Display: canonical grammar rendering ───────────────────────────

impl fmt::Display for KeyFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut rendered = self.terms.len().max(self.min_depth);
        if self.max_depth != UNBOUNDED {
            rendered = rendered.max(self.max_depth);
        }
        write!(f, "{{")?;
        for depth in 0..rendered {
            if depth > 0 {
                write!(f, ",")?;
            }
            if self.min_depth > 0 && depth + 1 == self.min_depth {
                write!(f, ">")?;
            }
            write!(f, "{}", self.term(depth))?;
            if self.max_depth != UNBOUNDED && depth + 1 == self.max_depth {
                write!(f, "<")?;
            }
        }
        write!(f, "}}")
    }
}

// ── Tests ──────────────────────────────────────────────────────────
