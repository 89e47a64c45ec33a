//! Ordered byte encoding for key segments.
//!
//! One segment on the wire:
//!
//! ```text
//! [tag: u8] [payload: escaped bytes] [terminator: 0x00]
//! ```
//!
//! Bytes 0x00 and 0x01 never appear literally inside a payload; the
//! order-preserving escape is `0x00 -> 0x01 0x10` and `0x01 -> 0x01 0x11`.
//! The 0x00 terminator therefore doubles as the segment-boundary scanner,
//! and bytewise comparison of whole keys equals semantic comparison of
//! their segment tuples.
//!
//! Tags (durable format — never renumber):
//!
//! ```text
//! 0x02  Before   no payload
//! 0x10  Bool     one byte: 0x02 = false, 0x03 = true
//! 0x20  Int      8 bytes BE of (bits XOR sign flip), escaped
//! 0x30  Float    8 bytes BE of the total_cmp transform, escaped
//! 0x40  String   UTF-8 bytes, escaped
//! 0x50  Bytes    raw bytes, escaped
//! 0x60  Date     16 bytes BE of (epoch-nanos i128 XOR sign flip), escaped
//! 0xFF  After    no payload
//! ```
//!
//! Edge markers live directly in the bytes: a before-edge drops the
//! terminator (the encoding becomes a strict prefix of the literal form),
//! an after-edge bumps the terminator to 0x01 (sorting above the literal
//! form and every deeper extension, below the next distinct value).

use time::OffsetDateTime;

use crate::codec::value::{Edge, Value};
use crate::error::{KeyError, Result};

// ── Wire constants ─────────────────────────────────────────────────

pub(crate) const TERMINATOR: u8 = 0x00;
pub(crate) const ESCAPE: u8 = 0x01;
const ESCAPED_00: u8 = 0x10;
const ESCAPED_01: u8 = 0x11;

pub(crate) const TAG_BEFORE: u8 = 0x02;
pub(crate) const TAG_BOOL: u8 = 0x10;
pub(crate) const TAG_INT: u8 = 0x20;
pub(crate) const TAG_FLOAT: u8 = 0x30;
pub(crate) const TAG_STRING: u8 = 0x40;
pub(crate) const TAG_BYTES: u8 = 0x50;
pub(crate) const TAG_DATE: u8 = 0x60;
pub(crate) const TAG_AFTER: u8 = 0xFF;

const BOOL_FALSE: u8 = 0x02;
const BOOL_TRUE: u8 = 0x03;

const SIGN_64: u64 = 1 << 63;
const SIGN_128: u128 = 1 << 127;

// ── Encoding ───────────────────────────────────────────────────────

/// Append the full encoding of `value` (tag, escaped payload, terminator)
/// to `out`.
pub(crate) fn encode_value(value: &Value, out: &mut Vec<u8>) {
    match value {
        Value::Before => out.push(TAG_BEFORE),
        Value::After => out.push(TAG_AFTER),
        Value::Bool(b) => {
            out.push(TAG_BOOL);
            out.push(if *b { BOOL_TRUE } else { BOOL_FALSE });
        }
        Value::Int(i) => {
            out.push(TAG_INT);
            let bits = (*i as u64) ^ SIGN_64;
            escape_into(&bits.to_be_bytes(), out);
        }
        Value::Float(v) => {
            out.push(TAG_FLOAT);
            escape_into(&float_to_ordered(*v).to_be_bytes(), out);
        }
        Value::String(s) => {
            out.push(TAG_STRING);
            escape_into(s.as_bytes(), out);
        }
        Value::Bytes(b) => {
            out.push(TAG_BYTES);
            escape_into(b, out);
        }
        Value::Date(d) => {
            out.push(TAG_DATE);
            let bits = (d.unix_timestamp_nanos() as u128) ^ SIGN_128;
            escape_into(&bits.to_be_bytes(), out);
        }
    }
    out.push(TERMINATOR);
}

fn escape_into(payload: &[u8], out: &mut Vec<u8>) {
    for &b in payload {
        match b {
            0x00 => out.extend_from_slice(&[ESCAPE, ESCAPED_00]),
            0x01 => out.extend_from_slice(&[ESCAPE, ESCAPED_01]),
            b => out.push(b),
        }
    }
}

/// Map f64 bits to u64 such that unsigned order equals `total_cmp` order.
fn float_to_ordered(v: f64) -> u64 {
    let bits = v.to_bits();
    if bits & SIGN_64 != 0 {
        !bits
    } else {
        bits | SIGN_64
    }
}

fn float_from_ordered(enc: u64) -> f64 {
    let bits = if enc & SIGN_64 != 0 { enc ^ SIGN_64 } else { !enc };
    f64::from_bits(bits)
}

// ── Decoding ───────────────────────────────────────────────────────

/// Decode one segment starting at `offset`. Returns the value, its edge
/// marker if the segment is unterminated or 0x01-terminated, and the
/// offset one past the segment.
///
/// Edge-marked forms are only legal as the final segment of a buffer;
/// the caller (`Key::from_bytes`) enforces that.
pub(crate) fn decode_segment(buf: &[u8], offset: usize) -> Result<(Value, Option<Edge>, usize)> {
    let tag = *buf
        .get(offset)
        .ok_or_else(|| KeyError::decode(offset, "no segment remains"))?;

    let mut payload = Vec::new();
    let mut pos = offset + 1;
    let edge = loop {
        match buf.get(pos) {
            None => break Some(Edge::Before),
            Some(&TERMINATOR) => {
                pos += 1;
                break None;
            }
            Some(&ESCAPE) => {
                if pos + 1 == buf.len() {
                    pos += 1;
                    break Some(Edge::After);
                }
                match buf[pos + 1] {
                    ESCAPED_00 => payload.push(0x00),
                    ESCAPED_01 => payload.push(0x01),
                    code => {
                        return Err(KeyError::decode(
                            pos,
                            format!("invalid escape code 0x{:02x}", code),
                        ))
                    }
                }
                pos += 2;
            }
            Some(&b) => {
                payload.push(b);
                pos += 1;
            }
        }
    };

    let value = match tag {
        TAG_BEFORE | TAG_AFTER => {
            if !payload.is_empty() {
                return Err(KeyError::decode(offset, "sentinel segment with payload"));
            }
            if tag == TAG_BEFORE {
                Value::Before
            } else {
                Value::After
            }
        }
        TAG_BOOL => match payload.as_slice() {
            [BOOL_FALSE] => Value::Bool(false),
            [BOOL_TRUE] => Value::Bool(true),
            _ => return Err(KeyError::decode(offset, "malformed bool payload")),
        },
        TAG_INT => {
            let bytes: [u8; 8] = payload
                .as_slice()
                .try_into()
                .map_err(|_| KeyError::decode(offset, "int payload is not 8 bytes"))?;
            Value::Int((u64::from_be_bytes(bytes) ^ SIGN_64) as i64)
        }
        TAG_FLOAT => {
            let bytes: [u8; 8] = payload
                .as_slice()
                .try_into()
                .map_err(|_| KeyError::decode(offset, "float payload is not 8 bytes"))?;
            Value::Float(float_from_ordered(u64::from_be_bytes(bytes)))
        }
        TAG_STRING => Value::String(
            String::from_utf8(payload)
                .map_err(|_| KeyError::decode(offset, "string payload is not valid UTF-8"))?,
        ),
        TAG_BYTES => Value::Bytes(payload),
        TAG_DATE => {
            let bytes: [u8; 16] = payload
                .as_slice()
                .try_into()
                .map_err(|_| KeyError::decode(offset, "date payload is not 16 bytes"))?;
            let nanos = (u128::from_be_bytes(bytes) ^ SIGN_128) as i128;
            Value::Date(
                OffsetDateTime::from_unix_timestamp_nanos(nanos)
                    .map_err(|_| KeyError::decode(offset, "date out of representable range"))?,
            )
        }
        tag => {
            return Err(KeyError::decode(
                offset,
                format!("unknown segment tag 0x{:02x}", tag),
            ))
        }
    };

    Ok((value, edge, pos))
}

// ── Tests ──────────────────────────────────────────────────────────
