//! Field Encoding
//!
//! Fixed-width fields are written directly. Variable-length fields carry a
//! length prefix and are bounds-checked against both the schema maximum and
//! the bytes remaining in the buffer. All integers are little-endian.
//!
//! ```text
//! U8 U16 U32 U64 I32 F64   raw little-endian
//! Fixed(n)                 n raw bytes
//! Str { max }              u16 unit count | UTF-16LE units
//! Bytes { max }            u32 byte count | bytes
//! ```

use serde::{Deserialize, Serialize};

use super::error::ProtocolError;

/// Wire kind of a single field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Unsigned byte.
    U8,
    /// Unsigned 16-bit.
    U16,
    /// Unsigned 32-bit.
    U32,
    /// Unsigned 64-bit.
    U64,
    /// Signed 32-bit.
    I32,
    /// IEEE-754 double.
    F64,
    /// Exactly this many raw bytes.
    Fixed(usize),
    /// UTF-16 string of at most `max` units.
    Str {
        /// Maximum UTF-16 units.
        max: usize,
    },
    /// Opaque blob of at most `max` bytes.
    Bytes {
        /// Maximum bytes.
        max: usize,
    },
}

impl FieldKind {
    fn label(self) -> &'static str {
        match self {
            FieldKind::U8 => "u8",
            FieldKind::U16 => "u16",
            FieldKind::U32 => "u32",
            FieldKind::U64 => "u64",
            FieldKind::I32 => "i32",
            FieldKind::F64 => "f64",
            FieldKind::Fixed(_) => "fixed bytes",
            FieldKind::Str { .. } => "string",
            FieldKind::Bytes { .. } => "bytes",
        }
    }
}

/// Named field in a message schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDef {
    /// Field name.
    pub name: &'static str,
    /// Wire kind.
    pub kind: FieldKind,
}

/// Shorthand for schema tables.
pub const fn field(name: &'static str, kind: FieldKind) -> FieldDef {
    FieldDef { name, kind }
}

/// A decoded field value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// Unsigned byte.
    U8(u8),
    /// Unsigned 16-bit.
    U16(u16),
    /// Unsigned 32-bit.
    U32(u32),
    /// Unsigned 64-bit.
    U64(u64),
    /// Signed 32-bit.
    I32(i32),
    /// Double.
    F64(f64),
    /// Fixed-width raw bytes.
    Fixed(Vec<u8>),
    /// String.
    Str(String),
    /// Blob.
    Bytes(Vec<u8>),
}

impl From<u8> for Value {
    fn from(v: u8) -> Self {
        Value::U8(v)
    }
}

impl From<u16> for Value {
    fn from(v: u16) -> Self {
        Value::U16(v)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::U32(v)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::U64(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::I32(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::F64(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::U8(v as u8)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

// ============================================================================
// Reader
// ============================================================================

/// Bounds-checked cursor over a received buffer.
pub struct WireReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> WireReader<'a> {
    /// Wrap a buffer.
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Consume exactly `n` bytes.
    pub fn take(&mut self, n: usize) -> Result<&'a [u8], ProtocolError> {
        if n > self.remaining() {
            return Err(ProtocolError::TruncatedMessage {
                needed: n,
                available: self.remaining(),
            });
        }
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N], ProtocolError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    /// Read a u8.
    pub fn u8(&mut self) -> Result<u8, ProtocolError> {
        Ok(self.take_array::<1>()?[0])
    }

    /// Read a little-endian u16.
    pub fn u16(&mut self) -> Result<u16, ProtocolError> {
        Ok(u16::from_le_bytes(self.take_array()?))
    }

    /// Read a little-endian u32.
    pub fn u32(&mut self) -> Result<u32, ProtocolError> {
        Ok(u32::from_le_bytes(self.take_array()?))
    }

    /// Read a little-endian u64.
    pub fn u64(&mut self) -> Result<u64, ProtocolError> {
        Ok(u64::from_le_bytes(self.take_array()?))
    }

    /// Read a little-endian i32.
    pub fn i32(&mut self) -> Result<i32, ProtocolError> {
        Ok(i32::from_le_bytes(self.take_array()?))
    }

    /// Read a little-endian f64.
    pub fn f64(&mut self) -> Result<f64, ProtocolError> {
        Ok(f64::from_le_bytes(self.take_array()?))
    }
}

impl FieldDef {
    /// Decode this field from the reader.
    pub fn read(&self, r: &mut WireReader<'_>) -> Result<Value, ProtocolError> {
        Ok(match self.kind {
            FieldKind::U8 => Value::U8(r.u8()?),
            FieldKind::U16 => Value::U16(r.u16()?),
            FieldKind::U32 => Value::U32(r.u32()?),
            FieldKind::U64 => Value::U64(r.u64()?),
            FieldKind::I32 => Value::I32(r.i32()?),
            FieldKind::F64 => Value::F64(r.f64()?),
            FieldKind::Fixed(n) => Value::Fixed(r.take(n)?.to_vec()),
            FieldKind::Str { max } => {
                let units = r.u16()? as usize;
                self.check_len(units, max)?;
                let raw = r.take(units * 2)?;
                let wide: Vec<u16> = raw
                    .chunks_exact(2)
                    .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
                    .collect();
                Value::Str(
                    String::from_utf16(&wide)
                        .map_err(|_| ProtocolError::InvalidString(self.name))?,
                )
            }
            FieldKind::Bytes { max } => {
                let len = r.u32()? as usize;
                self.check_len(len, max)?;
                Value::Bytes(r.take(len)?.to_vec())
            }
        })
    }

    /// Encode a value for this field.
    pub fn write(&self, value: &Value, out: &mut Vec<u8>) -> Result<(), ProtocolError> {
        match (self.kind, value) {
            (FieldKind::U8, Value::U8(v)) => out.push(*v),
            (FieldKind::U16, Value::U16(v)) => out.extend_from_slice(&v.to_le_bytes()),
            (FieldKind::U32, Value::U32(v)) => out.extend_from_slice(&v.to_le_bytes()),
            (FieldKind::U64, Value::U64(v)) => out.extend_from_slice(&v.to_le_bytes()),
            (FieldKind::I32, Value::I32(v)) => out.extend_from_slice(&v.to_le_bytes()),
            (FieldKind::F64, Value::F64(v)) => out.extend_from_slice(&v.to_le_bytes()),
            (FieldKind::Fixed(n), Value::Fixed(bytes)) => {
                if bytes.len() != n {
                    return Err(self.type_error());
                }
                out.extend_from_slice(bytes);
            }
            (FieldKind::Str { max }, Value::Str(text)) => {
                let wide: Vec<u16> = text.encode_utf16().collect();
                self.check_len(wide.len(), max.min(u16::MAX as usize))?;
                out.extend_from_slice(&(wide.len() as u16).to_le_bytes());
                for unit in wide {
                    out.extend_from_slice(&unit.to_le_bytes());
                }
            }
            (FieldKind::Bytes { max }, Value::Bytes(bytes)) => {
                self.check_len(bytes.len(), max)?;
                out.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
                out.extend_from_slice(bytes);
            }
            _ => return Err(self.type_error()),
        }
        Ok(())
    }

    /// Check a value's kind without encoding it.
    pub fn accepts(&self, value: &Value) -> bool {
        matches!(
            (self.kind, value),
            (FieldKind::U8, Value::U8(_))
                | (FieldKind::U16, Value::U16(_))
                | (FieldKind::U32, Value::U32(_))
                | (FieldKind::U64, Value::U64(_))
                | (FieldKind::I32, Value::I32(_))
                | (FieldKind::F64, Value::F64(_))
                | (FieldKind::Fixed(_), Value::Fixed(_))
                | (FieldKind::Str { .. }, Value::Str(_))
                | (FieldKind::Bytes { .. }, Value::Bytes(_))
        )
    }

    fn check_len(&self, length: usize, max: usize) -> Result<(), ProtocolError> {
        if length > max {
            return Err(ProtocolError::FieldTooLong {
                field: self.name,
                length,
                max,
            });
        }
        Ok(())
    }

    pub(crate) fn type_error(&self) -> ProtocolError {
        ProtocolError::FieldType {
            field: self.name,
            expected: self.kind.label(),
        }
    }
}
