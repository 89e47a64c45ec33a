//! Textual filter grammar.
//!
//! Compact notation for authoring and rendering filters:
//!
//! ```text
//! {"atlantic",>1.3,["x":"z"],{[100:150),[300:350)},*<}
//! ```
//!
//! ```text
//! filter  := '{' [ marked (',' marked)* ] '}'
//! marked  := ['>'] term ['<']          depth markers: '>' before the
//!                                      term at depth d sets min_depth
//!                                      to d+1, '<' after it sets
//!                                      max_depth to d+1
//! term    := '*' | union | range | value
//! union   := '{' range (',' range)* '}'
//! range   := ['[' | '('] [value] ':' [value] [']' | ')']
//! value   := '"'…'"'                   string (\" \\ \n \t \r)
//!          | -?digits                  int
//!          | float literal             1.5, -0.25, NaN, inf, -inf
//!          | true | false              bool
//!          | #hex                      bytes (even digit count)
//!          | @"RFC-3339" | @nanos      date
//! ```
//!
//! A missing bound is unbounded on that side. Bare `low:high` defaults
//! to inclusive-low/exclusive-high. Rendering is canonical rather than
//! input-identical (explicit brackets, padded wildcards); reparsing a
//! rendering always reproduces an equivalent filter.

use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::codec::Value;
use crate::error::{KeyError, Result};
use crate::filter::engine::{KeyFilter, UNBOUNDED};
use crate::filter::term::{Range, Term};

pub(crate) fn parse_filter(input: &str) -> Result<KeyFilter> {
    Parser::new(input).parse()
}

struct Parser {
    src: Vec<char>,
    pos: usize,
}

impl Parser {
    fn new(input: &str) -> Self {
        Self {
            src: input.chars().collect(),
            pos: 0,
        }
    }

    fn parse(mut self) -> Result<KeyFilter> {
        self.skip_ws();
        self.expect('{')?;
        let mut terms = Vec::new();
        let mut min_depth = None;
        let mut max_depth = None;

        self.skip_ws();
        if !self.eat('}') {
            loop {
                self.skip_ws();
                let mark_min = self.eat('>');
                self.skip_ws();
                let term = self.parse_term()?;
                self.skip_ws();
                let mark_max = self.eat('<');

                let depth = terms.len() + 1;
                terms.push(term);
                if mark_min {
                    if min_depth.replace(depth).is_some() {
                        return Err(self.err("duplicate minimum-depth marker '>'"));
                    }
                }
                if mark_max {
                    if max_depth.replace(depth).is_some() {
                        return Err(self.err("duplicate maximum-depth marker '<'"));
                    }
                }

                self.skip_ws();
                if self.eat(',') {
                    continue;
                }
                self.expect('}')?;
                break;
            }
        }
        self.skip_ws();
        if self.pos != self.src.len() {
            return Err(self.err("trailing input after filter"));
        }

        KeyFilter::from_parts(
            terms,
            min_depth.unwrap_or(0),
            max_depth.unwrap_or(UNBOUNDED),
        )
        .map_err(|e| self.lift(e))
    }

    fn parse_term(&mut self) -> Result<Term> {
        match self.peek() {
            Some('*') => {
                self.bump();
                Ok(Term::Wildcard)
            }
            Some('{') => self.parse_union(),
            _ => {
                let range = self.parse_range()?;
                Ok(Term::Range(range))
            }
        }
    }

    fn parse_union(&mut self) -> Result<Term> {
        self.expect('{')?;
        let mut ranges = Vec::new();
        loop {
            self.skip_ws();
            if self.peek() == Some('*') {
                return Err(self.err("wildcard is not allowed inside a union"));
            }
            ranges.push(self.parse_range()?);
            self.skip_ws();
            if self.eat(',') {
                continue;
            }
            self.expect('}')?;
            break;
        }
        Term::union(ranges).map_err(|e| self.lift(e))
    }

    /// One range, a bracketed range, or a bare value (a point range).
    fn parse_range(&mut self) -> Result<Range> {
        self.skip_ws();
        let bracket = match self.peek() {
            Some('[') => {
                self.bump();
                Some(true)
            }
            Some('(') => {
                self.bump();
                Some(false)
            }
            _ => None,
        };
        self.skip_ws();
        let low = if self.peek() == Some(':') {
            None
        } else {
            Some(self.parse_value()?)
        };
        self.skip_ws();

        if !self.eat(':') {
            if bracket.is_some() {
                return Err(self.err("expected ':' inside bracketed range"));
            }
            let value = low.ok_or_else(|| self.err("expected a term"))?;
            return Range::point(value).map_err(|e| self.lift(e));
        }

        self.skip_ws();
        let high = match self.peek() {
            Some(']') | Some(')') | Some(',') | Some('}') | Some('<') | None => None,
            _ => Some(self.parse_value()?),
        };
        self.skip_ws();

        let (low_inclusive, high_inclusive) = match bracket {
            Some(low_inclusive) => {
                let high_inclusive = match self.peek() {
                    Some(']') => {
                        self.bump();
                        true
                    }
                    Some(')') => {
                        self.bump();
                        false
                    }
                    _ => return Err(self.err("expected ']' or ')' to close range")),
                };
                (low_inclusive, high_inclusive)
            }
            // Bare low:high defaults to [low:high).
            None => (true, false),
        };

        Range::new(low, low_inclusive, high, high_inclusive).map_err(|e| self.lift(e))
    }

    fn parse_value(&mut self) -> Result<Value> {
        match self.peek() {
            Some('"') => self.parse_string().map(Value::String),
            Some('#') => self.parse_bytes(),
            Some('@') => self.parse_date(),
            Some('t') | Some('f') => self.parse_bool(),
            Some('N') | Some('i') => self.parse_float_keyword(false),
            Some('-') if matches!(self.peek_at(1), Some('N') | Some('i')) => {
                self.bump();
                self.parse_float_keyword(true)
            }
            Some(c) if c == '-' || c.is_ascii_digit() => self.parse_number(),
            _ => Err(self.err("expected a value literal")),
        }
    }

    fn parse_string(&mut self) -> Result<String> {
        self.expect('"')?;
        let mut out = String::new();
        loop {
            match self.bump() {
                None => return Err(self.err("unterminated string literal")),
                Some('"') => return Ok(out),
                Some('\\') => match self.bump() {
                    Some('"') => out.push('"'),
                    Some('\\') => out.push('\\'),
                    Some('n') => out.push('\n'),
                    Some('t') => out.push('\t'),
                    Some('r') => out.push('\r'),
                    _ => return Err(self.err("invalid string escape")),
                },
                Some(c) => out.push(c),
            }
        }
    }

    fn parse_bytes(&mut self) -> Result<Value> {
        self.expect('#')?;
        let mut digits = String::new();
        while let Some(c) = self.peek() {
            if c.is_ascii_hexdigit() {
                digits.push(c);
                self.bump();
            } else {
                break;
            }
        }
        if digits.len() % 2 != 0 {
            return Err(self.err("byte literal needs an even number of hex digits"));
        }
        let bytes = digits
            .as_bytes()
            .chunks(2)
            .map(|pair| {
                u8::from_str_radix(std::str::from_utf8(pair).expect("hex digits are ASCII"), 16)
                    .expect("chunks are validated hex")
            })
            .collect();
        Ok(Value::Bytes(bytes))
    }

    fn parse_date(&mut self) -> Result<Value> {
        self.expect('@')?;
        if self.peek() == Some('"') {
            let text = self.parse_string()?;
            let date = OffsetDateTime::parse(&text, &Rfc3339)
                .map_err(|_| self.err("invalid RFC-3339 date"))?;
            return Ok(Value::Date(date));
        }
        let start = self.pos;
        if self.peek() == Some('-') {
            self.bump();
        }
        while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
            self.bump();
        }
        if self.pos == start {
            return Err(self.err("expected RFC-3339 date or epoch nanoseconds after '@'"));
        }
        let text: String = self.src[start..self.pos].iter().collect();
        let nanos: i128 = text
            .parse()
            .map_err(|_| self.err("epoch nanoseconds out of range"))?;
        OffsetDateTime::from_unix_timestamp_nanos(nanos)
            .map(Value::Date)
            .map_err(|_| self.err("epoch nanoseconds out of range"))
    }

    fn parse_bool(&mut self) -> Result<Value> {
        if self.eat_keyword("true") {
            Ok(Value::Bool(true))
        } else if self.eat_keyword("false") {
            Ok(Value::Bool(false))
        } else {
            Err(self.err("expected a value literal"))
        }
    }

    fn parse_float_keyword(&mut self, negative: bool) -> Result<Value> {
        let v = if self.eat_keyword("NaN") {
            f64::NAN
        } else if self.eat_keyword("inf") {
            f64::INFINITY
        } else {
            return Err(self.err("expected a value literal"));
        };
        Ok(Value::Float(if negative { -v } else { v }))
    }

    fn parse_number(&mut self) -> Result<Value> {
        let start = self.pos;
        if self.peek() == Some('-') {
            self.bump();
        }
        let mut is_float = false;
        while let Some(c) = self.peek() {
            match c {
                '0'..='9' => {
                    self.bump();
                }
                '.' => {
                    is_float = true;
                    self.bump();
                }
                'e' | 'E' => {
                    is_float = true;
                    self.bump();
                    if matches!(self.peek(), Some('+') | Some('-')) {
                        self.bump();
                    }
                }
                _ => break,
            }
        }
        let text: String = self.src[start..self.pos].iter().collect();
        if is_float {
            text.parse::<f64>()
                .map(Value::Float)
                .map_err(|_| self.err("malformed float literal"))
        } else {
            text.parse::<i64>()
                .map(Value::Int)
                .map_err(|_| self.err("integer literal out of range"))
        }
    }

    // ── Low-level cursor ───────────────────────────────────────────

    fn peek(&self) -> Option<char> {
        self.src.get(self.pos).copied()
    }

    fn peek_at(&self, ahead: usize) -> Option<char> {
        self.src.get(self.pos + ahead).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek();
        if c.is_some() {
            self.pos += 1;
        }
        c
    }

    fn eat(&mut self, c: char) -> bool {
        if self.peek() == Some(c) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn eat_keyword(&mut self, kw: &str) -> bool {
        let chars: Vec<char> = kw.chars().collect();
        if self.src[self.pos..].starts_with(&chars)
            && !matches!(self.peek_at(chars.len()), Some(c) if c.is_ascii_alphanumeric())
        {
            self.pos += chars.len();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, c: char) -> Result<()> {
        if self.eat(c) {
            Ok(())
        } else {
            Err(self.err(format!("expected '{}'", c)))
        }
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.pos += 1;
        }
    }

    fn err(&self, msg: impl Into<String>) -> KeyError {
        KeyError::FilterSyntax {
            pos: self.pos,
            msg: msg.into(),
        }
    }

    /// Surface a construction-time invariant violation as a syntax error
    /// at the current position; the parser never returns partial filters.
    fn lift(&self, e: KeyError) -> KeyError {
        match e {
            KeyError::InvalidFilter(msg) => KeyError::FilterSyntax { pos: self.pos, msg },
            e => e,
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────────
