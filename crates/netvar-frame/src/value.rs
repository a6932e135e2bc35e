//! Typed scalar values and their per-kind wire encoding.
//!
//! Integer kinds are written as their two's-complement bit pattern and read
//! back signed, so a WORD written from `0x8000` reads back as `-32768`.

use std::fmt;

use bytes::{BufMut, BytesMut};
use serde::Serialize;

use crate::error::{FrameError, Result};
use crate::kind::VariableKind;

/// A typed variable value. One variant per [`VariableKind`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Byte(i8),
    Word(i16),
    Dword(i32),
    /// Milliseconds.
    Time(i32),
    Real(f32),
    Lreal(f64),
    String(String),
    WString(String),
}

impl Value {
    /// The kind this value belongs to.
    pub fn kind(&self) -> VariableKind {
        match self {
            Value::Bool(_) => VariableKind::Bool,
            Value::Byte(_) => VariableKind::Byte,
            Value::Word(_) => VariableKind::Word,
            Value::Dword(_) => VariableKind::Dword,
            Value::Time(_) => VariableKind::Time,
            Value::Real(_) => VariableKind::Real,
            Value::Lreal(_) => VariableKind::Lreal,
            Value::String(_) => VariableKind::String,
            Value::WString(_) => VariableKind::WString,
        }
    }

    /// The zero value of a kind (`FALSE`, `0`, empty string).
    pub fn default_for(kind: VariableKind) -> Self {
        match kind {
            VariableKind::Bool => Value::Bool(false),
            VariableKind::Byte => Value::Byte(0),
            VariableKind::Word => Value::Word(0),
            VariableKind::Dword => Value::Dword(0),
            VariableKind::Time => Value::Time(0),
            VariableKind::Real => Value::Real(0.0),
            VariableKind::Lreal => Value::Lreal(0.0),
            VariableKind::String => Value::String(String::new()),
            VariableKind::WString => Value::WString(String::new()),
        }
    }

    /// BYTE from its unsigned bit pattern.
    pub fn byte_bits(bits: u8) -> Self {
        Value::Byte(bits as i8)
    }

    /// WORD from its unsigned bit pattern.
    pub fn word_bits(bits: u16) -> Self {
        Value::Word(bits as i16)
    }

    /// DWORD from its unsigned bit pattern.
    pub fn dword_bits(bits: u32) -> Self {
        Value::Dword(bits as i32)
    }

    /// TIME (milliseconds) from its unsigned bit pattern.
    pub fn time_bits(bits: u32) -> Self {
        Value::Time(bits as i32)
    }

    /// Parse textual input for a given kind.
    ///
    /// Integer kinds accept both the signed and the unsigned range of their
    /// width; values above the signed range are stored by bit pattern.
    pub fn parse(kind: VariableKind, text: &str) -> std::result::Result<Self, ParseValueError> {
        let trimmed = text.trim();
        match kind {
            VariableKind::Bool => match trimmed.to_ascii_lowercase().as_str() {
                "true" | "1" => Ok(Value::Bool(true)),
                "false" | "0" => Ok(Value::Bool(false)),
                _ => Err(ParseValueError::invalid(kind, text)),
            },
            VariableKind::Byte => parse_bits(kind, trimmed, 8).map(|b| Value::byte_bits(b as u8)),
            VariableKind::Word => parse_bits(kind, trimmed, 16).map(|b| Value::word_bits(b as u16)),
            VariableKind::Dword => {
                parse_bits(kind, trimmed, 32).map(|b| Value::dword_bits(b as u32))
            }
            VariableKind::Time => parse_bits(kind, trimmed, 32).map(|b| Value::time_bits(b as u32)),
            VariableKind::Real => trimmed
                .parse::<f32>()
                .map(Value::Real)
                .map_err(|_| ParseValueError::invalid(kind, text)),
            VariableKind::Lreal => trimmed
                .parse::<f64>()
                .map(Value::Lreal)
                .map_err(|_| ParseValueError::invalid(kind, text)),
            VariableKind::String => Ok(Value::String(text.to_string())),
            VariableKind::WString => Ok(Value::WString(text.to_string())),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(v) => write!(f, "{}", if *v { "TRUE" } else { "FALSE" }),
            Value::Byte(v) => write!(f, "{v}"),
            Value::Word(v) => write!(f, "{v}"),
            Value::Dword(v) => write!(f, "{v}"),
            Value::Time(v) => write!(f, "T#{v}ms"),
            Value::Real(v) => write!(f, "{v}"),
            Value::Lreal(v) => write!(f, "{v}"),
            Value::String(v) | Value::WString(v) => write!(f, "{v:?}"),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Real(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Lreal(v)
    }
}

/// Errors from [`Value::parse`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseValueError {
    #[error("invalid {kind} literal: {text:?}")]
    Invalid { kind: VariableKind, text: String },

    #[error("{kind} literal out of range: {text}")]
    OutOfRange { kind: VariableKind, text: String },
}

impl ParseValueError {
    fn invalid(kind: VariableKind, text: &str) -> Self {
        Self::Invalid {
            kind,
            text: text.to_string(),
        }
    }
}

fn parse_bits(
    kind: VariableKind,
    text: &str,
    width: u32,
) -> std::result::Result<u64, ParseValueError> {
    let parsed = match text.strip_prefix("16#").or_else(|| text.strip_prefix("0x")) {
        Some(hex) => i64::from_str_radix(&hex.replace('_', ""), 16),
        None => text.replace('_', "").parse::<i64>(),
    }
    .map_err(|_| ParseValueError::invalid(kind, text))?;

    let min = -(1i64 << (width - 1));
    let max = (1i64 << width) - 1;
    if parsed < min || parsed > max {
        return Err(ParseValueError::OutOfRange {
            kind,
            text: text.to_string(),
        });
    }
    Ok((parsed as u64) & (max as u64))
}

/// One declared variable: wire index, fixed kind and current value.
#[derive(Debug, Clone, PartialEq)]
pub struct VariableSlot {
    idx: u16,
    kind: VariableKind,
    value: Value,
}

impl VariableSlot {
    /// Create a slot; the kind is fixed to the initial value's kind.
    pub fn new(idx: u16, value: Value) -> Self {
        Self {
            idx,
            kind: value.kind(),
            value,
        }
    }

    /// Create a slot holding the zero value of `kind`.
    pub fn zeroed(idx: u16, kind: VariableKind) -> Self {
        Self::new(idx, Value::default_for(kind))
    }

    /// Wire index.
    pub fn idx(&self) -> u16 {
        self.idx
    }

    /// Declared kind.
    pub fn kind(&self) -> VariableKind {
        self.kind
    }

    /// Current value.
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Replace the value, returning the previous one.
    ///
    /// A value of a different kind is handed back unchanged in `Err`.
    pub fn set_value(&mut self, value: Value) -> std::result::Result<Value, Value> {
        if value.kind() != self.kind {
            return Err(value);
        }
        Ok(std::mem::replace(&mut self.value, value))
    }

    /// Append this slot's encoded value. Returns bytes written.
    pub fn encode(&self, dst: &mut BytesMut) -> Result<usize> {
        encode_value(&self.value, dst)
    }
}

/// Append the wire encoding of `value` to `dst`. Returns bytes written.
///
/// Nothing is written when the value cannot be encoded.
pub fn encode_value(value: &Value, dst: &mut BytesMut) -> Result<usize> {
    let start = dst.len();
    match value {
        Value::Bool(v) => dst.put_u8(u8::from(*v)),
        Value::Byte(v) => dst.put_i8(*v),
        Value::Word(v) => dst.put_u16_le(*v as u16),
        Value::Dword(v) | Value::Time(v) => dst.put_u32_le(*v as u32),
        Value::Real(v) => dst.put_f32_le(*v),
        Value::Lreal(v) => dst.put_f64_le(*v),
        Value::String(text) => {
            let bytes = latin1_bytes(text).ok_or(FrameError::UnencodableString {
                kind: VariableKind::String,
            })?;
            dst.reserve(bytes.len() + 1);
            dst.put_slice(&bytes);
            dst.put_u8(0);
        }
        Value::WString(text) => {
            let units: Vec<u16> = text.encode_utf16().collect();
            if units.contains(&0) {
                return Err(FrameError::UnencodableString {
                    kind: VariableKind::WString,
                });
            }
            dst.reserve(units.len() * 2 + 2);
            for unit in units {
                dst.put_u16_le(unit);
            }
            dst.put_u16_le(0);
        }
    }
    Ok(dst.len() - start)
}

/// Decode one value of `kind` starting at `offset`.
///
/// Returns the value and the number of bytes consumed, terminators included.
pub fn decode_value(kind: VariableKind, payload: &[u8], offset: usize) -> Result<(Value, usize)> {
    match kind {
        VariableKind::Bool => {
            let [b] = read_fixed::<1>(kind, payload, offset)?;
            Ok((Value::Bool(b != 0), 1))
        }
        VariableKind::Byte => {
            let raw = read_fixed::<1>(kind, payload, offset)?;
            Ok((Value::Byte(i8::from_le_bytes(raw)), 1))
        }
        VariableKind::Word => {
            let raw = read_fixed::<2>(kind, payload, offset)?;
            Ok((Value::Word(i16::from_le_bytes(raw)), 2))
        }
        VariableKind::Dword => {
            let raw = read_fixed::<4>(kind, payload, offset)?;
            Ok((Value::Dword(i32::from_le_bytes(raw)), 4))
        }
        VariableKind::Time => {
            let raw = read_fixed::<4>(kind, payload, offset)?;
            Ok((Value::Time(i32::from_le_bytes(raw)), 4))
        }
        VariableKind::Real => {
            let raw = read_fixed::<4>(kind, payload, offset)?;
            Ok((Value::Real(f32::from_le_bytes(raw)), 4))
        }
        VariableKind::Lreal => {
            let raw = read_fixed::<8>(kind, payload, offset)?;
            Ok((Value::Lreal(f64::from_le_bytes(raw)), 8))
        }
        VariableKind::String => decode_string(payload, offset),
        VariableKind::WString => decode_wstring(payload, offset),
    }
}

fn read_fixed<const N: usize>(kind: VariableKind, payload: &[u8], offset: usize) -> Result<[u8; N]> {
    payload
        .get(offset..)
        .and_then(|rest| rest.get(..N))
        .and_then(|field| field.try_into().ok())
        .ok_or(FrameError::Truncated {
            kind,
            offset,
            needed: N,
            available: payload.len().saturating_sub(offset),
        })
}

fn decode_string(payload: &[u8], offset: usize) -> Result<(Value, usize)> {
    let rest = payload.get(offset..).unwrap_or_default();
    let end = rest
        .iter()
        .position(|b| *b == 0)
        .ok_or(FrameError::TerminatorNotFound {
            kind: VariableKind::String,
            offset,
        })?;
    let text: String = rest[..end].iter().map(|b| char::from(*b)).collect();
    Ok((Value::String(text), end + 1))
}

fn decode_wstring(payload: &[u8], offset: usize) -> Result<(Value, usize)> {
    let rest = payload.get(offset..).unwrap_or_default();
    let units: Vec<u16> = rest
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .take_while(|unit| *unit != 0)
        .collect();
    let consumed = units.len() * 2 + 2;
    if consumed > rest.len() {
        return Err(FrameError::TerminatorNotFound {
            kind: VariableKind::WString,
            offset,
        });
    }
    Ok((Value::WString(String::from_utf16_lossy(&units)), consumed))
}

fn latin1_bytes(text: &str) -> Option<Vec<u8>> {
    text.chars()
        .map(|c| match u32::from(c) {
            0 => None,
            code @ 1..=0xFF => Some(code as u8),
            _ => None,
        })
        .collect()
}
