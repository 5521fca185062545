//! Protobuf wire primitives
//!
//! Just enough of the protobuf encoding to speak the X Protocol messages:
//! varints, zigzag integers, fixed-width floats and length-delimited
//! fields. Unknown fields are skipped by the reader.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{Result, XError};

/// Protobuf wire types used by the X Protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireType {
    Varint,
    Fixed64,
    LengthDelimited,
    Fixed32,
}

impl WireType {
    fn bits(self) -> u64 {
        match self {
            WireType::Varint => 0,
            WireType::Fixed64 => 1,
            WireType::LengthDelimited => 2,
            WireType::Fixed32 => 5,
        }
    }

    fn from_bits(bits: u64) -> Result<Self> {
        match bits {
            0 => Ok(WireType::Varint),
            1 => Ok(WireType::Fixed64),
            2 => Ok(WireType::LengthDelimited),
            5 => Ok(WireType::Fixed32),
            other => Err(XError::decode(format!("Unsupported wire type {}", other))),
        }
    }
}

// =============================================================================
// Integer Encodings
// =============================================================================

pub fn put_varint(buf: &mut BytesMut, mut value: u64) {
    while value >= 0x80 {
        buf.put_u8((value as u8 & 0x7f) | 0x80);
        value >>= 7;
    }
    buf.put_u8(value as u8);
}

pub fn get_varint<B: Buf>(buf: &mut B) -> Result<u64> {
    let mut result: u64 = 0;
    let mut shift = 0u32;
    loop {
        if !buf.has_remaining() {
            return Err(XError::decode("Truncated varint"));
        }
        let byte = buf.get_u8();
        if shift == 63 && byte > 1 {
            return Err(XError::decode("Varint overflows 64 bits"));
        }
        result |= u64::from(byte & 0x7f) << shift;
        if byte & 0x80 == 0 {
            return Ok(result);
        }
        shift += 7;
        if shift > 63 {
            return Err(XError::decode("Varint overflows 64 bits"));
        }
    }
}

pub fn zigzag_encode(value: i64) -> u64 {
    ((value << 1) ^ (value >> 63)) as u64
}

pub fn zigzag_decode(value: u64) -> i64 {
    ((value >> 1) as i64) ^ -((value & 1) as i64)
}

// =============================================================================
// Field Writers
// =============================================================================

pub fn put_key(buf: &mut BytesMut, field: u32, wire_type: WireType) {
    put_varint(buf, (u64::from(field) << 3) | wire_type.bits());
}

pub fn put_uint_field(buf: &mut BytesMut, field: u32, value: u64) {
    put_key(buf, field, WireType::Varint);
    put_varint(buf, value);
}

pub fn put_sint_field(buf: &mut BytesMut, field: u32, value: i64) {
    put_uint_field(buf, field, zigzag_encode(value));
}

pub fn put_bool_field(buf: &mut BytesMut, field: u32, value: bool) {
    put_uint_field(buf, field, u64::from(value));
}

pub fn put_double_field(buf: &mut BytesMut, field: u32, value: f64) {
    put_key(buf, field, WireType::Fixed64);
    buf.put_f64_le(value);
}

pub fn put_float_field(buf: &mut BytesMut, field: u32, value: f32) {
    put_key(buf, field, WireType::Fixed32);
    buf.put_f32_le(value);
}

pub fn put_bytes_field(buf: &mut BytesMut, field: u32, value: &[u8]) {
    put_key(buf, field, WireType::LengthDelimited);
    put_varint(buf, value.len() as u64);
    buf.put_slice(value);
}

pub fn put_string_field(buf: &mut BytesMut, field: u32, value: &str) {
    put_bytes_field(buf, field, value.as_bytes());
}

/// Write a nested message built by `build`
pub fn put_message_field<F>(buf: &mut BytesMut, field: u32, build: F)
where
    F: FnOnce(&mut BytesMut),
{
    let mut inner = BytesMut::new();
    build(&mut inner);
    put_bytes_field(buf, field, &inner);
}

// =============================================================================
// Field Reader
// =============================================================================

/// A decoded field payload
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Varint(u64),
    Fixed64(u64),
    Fixed32(u32),
    Bytes(Bytes),
}

impl FieldValue {
    pub fn as_u64(&self) -> Result<u64> {
        match self {
            FieldValue::Varint(v) | FieldValue::Fixed64(v) => Ok(*v),
            FieldValue::Fixed32(v) => Ok(u64::from(*v)),
            FieldValue::Bytes(_) => Err(XError::decode("Expected an integer field")),
        }
    }

    pub fn as_u32(&self) -> Result<u32> {
        let value = self.as_u64()?;
        u32::try_from(value)
            .map_err(|_| XError::decode(format!("Value {} does not fit in 32 bits", value)))
    }

    pub fn as_sint(&self) -> Result<i64> {
        Ok(zigzag_decode(self.as_u64()?))
    }

    pub fn as_bool(&self) -> Result<bool> {
        Ok(self.as_u64()? != 0)
    }

    pub fn as_f64(&self) -> Result<f64> {
        match self {
            FieldValue::Fixed64(bits) => Ok(f64::from_bits(*bits)),
            _ => Err(XError::decode("Expected a double field")),
        }
    }

    pub fn as_f32(&self) -> Result<f32> {
        match self {
            FieldValue::Fixed32(bits) => Ok(f32::from_bits(*bits)),
            _ => Err(XError::decode("Expected a float field")),
        }
    }

    pub fn into_bytes(self) -> Result<Bytes> {
        match self {
            FieldValue::Bytes(bytes) => Ok(bytes),
            _ => Err(XError::decode("Expected a length-delimited field")),
        }
    }

    pub fn into_string(self) -> Result<String> {
        let bytes = self.into_bytes()?;
        String::from_utf8(bytes.to_vec())
            .map_err(|e| XError::decode(format!("Invalid UTF-8 in string field: {}", e)))
    }
}

/// Iterates the fields of one protobuf message
#[derive(Debug)]
pub struct FieldReader {
    buf: Bytes,
}

impl FieldReader {
    pub fn new(buf: Bytes) -> Self {
        Self { buf }
    }

    /// Next `(field_number, value)` pair, `None` at the end of the message
    pub fn next_field(&mut self) -> Result<Option<(u32, FieldValue)>> {
        if !self.buf.has_remaining() {
            return Ok(None);
        }

        let key = get_varint(&mut self.buf)?;
        let field = u32::try_from(key >> 3)
            .map_err(|_| XError::decode(format!("Field number too large in key {}", key)))?;
        if field == 0 {
            return Err(XError::decode("Field number 0 is invalid"));
        }

        let value = match WireType::from_bits(key & 0x7)? {
            WireType::Varint => FieldValue::Varint(get_varint(&mut self.buf)?),
            WireType::Fixed64 => {
                if self.buf.remaining() < 8 {
                    return Err(XError::decode("Truncated fixed64 field"));
                }
                FieldValue::Fixed64(self.buf.get_u64_le())
            }
            WireType::Fixed32 => {
                if self.buf.remaining() < 4 {
                    return Err(XError::decode("Truncated fixed32 field"));
                }
                FieldValue::Fixed32(self.buf.get_u32_le())
            }
            WireType::LengthDelimited => {
                let len = get_varint(&mut self.buf)? as usize;
                if self.buf.remaining() < len {
                    return Err(XError::decode(format!(
                        "Truncated field {}: expected {} bytes, got {}",
                        field,
                        len,
                        self.buf.remaining()
                    )));
                }
                FieldValue::Bytes(self.buf.split_to(len))
            }
        };

        Ok(Some((field, value)))
    }
}
