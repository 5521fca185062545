//! Row field decoding
//!
//! Each field of a `Row` message is encoded according to its column type.
//! An empty field is NULL.

use bytes::Buf;

use crate::error::{Result, XError};
use crate::protocol::wire::{get_varint, zigzag_decode};
use crate::value::DynamicValue;

use super::column::{ColumnMetadata, FieldType, CONTENT_TYPE_JSON};

/// Decode one field of `column`
pub fn decode_field(column: &ColumnMetadata, field: &[u8]) -> Result<DynamicValue> {
    if field.is_empty() {
        return Ok(DynamicValue::Null);
    }

    let value = match column.field_type {
        FieldType::SInt => {
            let mut buf = field;
            let value = zigzag_decode(get_varint(&mut buf)?);
            expect_end(column, buf)?;
            DynamicValue::Integer(value)
        }
        FieldType::UInt | FieldType::Bit => {
            let mut buf = field;
            let value = get_varint(&mut buf)?;
            expect_end(column, buf)?;
            DynamicValue::UInteger(value)
        }
        FieldType::Double => {
            let bytes: [u8; 8] = field.try_into().map_err(|_| bad_length(column, field, 8))?;
            DynamicValue::Float(f64::from_le_bytes(bytes))
        }
        FieldType::Float => {
            let bytes: [u8; 4] = field.try_into().map_err(|_| bad_length(column, field, 4))?;
            DynamicValue::Float(f64::from(f32::from_le_bytes(bytes)))
        }
        FieldType::Bytes | FieldType::Enum => {
            // Trailing byte marks the value as non-NULL
            let text = utf8(column, &field[..field.len() - 1])?;
            if column.content_type == CONTENT_TYPE_JSON {
                match serde_json::from_str::<serde_json::Value>(&text) {
                    Ok(json) => DynamicValue::from(json),
                    Err(_) => DynamicValue::String(text),
                }
            } else {
                DynamicValue::String(text)
            }
        }
        FieldType::Set => DynamicValue::String(decode_set(column, field)?),
        FieldType::Decimal => DynamicValue::String(decode_decimal(column, field)?),
        FieldType::DateTime => DynamicValue::String(decode_datetime(column, field)?),
        FieldType::Time => DynamicValue::String(decode_time(column, field)?),
        FieldType::Unknown(kind) => {
            return Err(XError::decode(format!(
                "Column '{}' has unsupported type {}",
                column.name, kind
            )))
        }
    };

    Ok(value)
}

fn expect_end(column: &ColumnMetadata, rest: &[u8]) -> Result<()> {
    if rest.is_empty() {
        Ok(())
    } else {
        Err(XError::decode(format!(
            "Column '{}': {} unexpected trailing bytes",
            column.name,
            rest.len()
        )))
    }
}

fn bad_length(column: &ColumnMetadata, field: &[u8], expected: usize) -> XError {
    XError::decode(format!(
        "Column '{}' ({}): expected {} bytes, got {}",
        column.name,
        column.field_type,
        expected,
        field.len()
    ))
}

fn utf8(column: &ColumnMetadata, bytes: &[u8]) -> Result<String> {
    String::from_utf8(bytes.to_vec()).map_err(|e| {
        XError::decode(format!(
            "Column '{}': invalid UTF-8 at byte {}",
            column.name,
            e.utf8_error().valid_up_to()
        ))
    })
}

/// Length-prefixed members; a lone `0x01` is the empty set
fn decode_set(column: &ColumnMetadata, field: &[u8]) -> Result<String> {
    if field == [0x01] {
        return Ok(String::new());
    }

    let mut buf = field;
    let mut members = Vec::new();
    while buf.has_remaining() {
        let len = get_varint(&mut buf)? as usize;
        if buf.remaining() < len {
            return Err(XError::decode(format!(
                "Column '{}': truncated SET member",
                column.name
            )));
        }
        members.push(utf8(column, &buf[..len])?);
        buf.advance(len);
    }
    Ok(members.join(","))
}

/// Scale byte, then packed BCD digits closed by a sign nibble
fn decode_decimal(column: &ColumnMetadata, field: &[u8]) -> Result<String> {
    let scale = usize::from(field[0]);
    let mut digits = String::new();
    let mut negative = None;

    'bytes: for byte in &field[1..] {
        for nibble in [byte >> 4, byte & 0x0f] {
            match nibble {
                0..=9 => digits.push(char::from(b'0' + nibble)),
                0x0c => {
                    negative = Some(false);
                    break 'bytes;
                }
                0x0d => {
                    negative = Some(true);
                    break 'bytes;
                }
                other => {
                    return Err(XError::decode(format!(
                        "Column '{}': invalid DECIMAL nibble 0x{:x}",
                        column.name, other
                    )))
                }
            }
        }
    }

    let negative = negative.ok_or_else(|| {
        XError::decode(format!("Column '{}': DECIMAL without sign", column.name))
    })?;

    if digits.len() <= scale {
        digits.insert_str(0, &"0".repeat(scale - digits.len() + 1));
    }
    if scale > 0 {
        digits.insert(digits.len() - scale, '.');
    }
    if negative {
        digits.insert(0, '-');
    }
    Ok(digits)
}

fn read_parts(column: &ColumnMetadata, field: &[u8], max: usize) -> Result<Vec<u64>> {
    let mut buf = field;
    let mut parts = Vec::with_capacity(max);
    while buf.has_remaining() {
        if parts.len() == max {
            return Err(XError::decode(format!(
                "Column '{}': too many {} components",
                column.name, column.field_type
            )));
        }
        parts.push(get_varint(&mut buf)?);
    }
    Ok(parts)
}

/// Varints year, month, day and optionally hour, minute, second, microsecond
fn decode_datetime(column: &ColumnMetadata, field: &[u8]) -> Result<String> {
    let parts = read_parts(column, field, 7)?;
    if parts.len() < 3 {
        return Err(XError::decode(format!(
            "Column '{}': DATETIME needs year, month and day",
            column.name
        )));
    }

    let mut text = format!("{:04}-{:02}-{:02}", parts[0], parts[1], parts[2]);
    if parts.len() > 3 {
        let part = |i: usize| parts.get(i).copied().unwrap_or(0);
        text.push_str(&format!(" {:02}:{:02}:{:02}", part(3), part(4), part(5)));
        if part(6) > 0 {
            text.push_str(&format!(".{:06}", part(6)));
        }
    }
    Ok(text)
}

/// Sign byte, then varints hours, minutes, seconds, microseconds
fn decode_time(column: &ColumnMetadata, field: &[u8]) -> Result<String> {
    let negative = match field[0] {
        0x00 => false,
        0x01 => true,
        other => {
            return Err(XError::decode(format!(
                "Column '{}': invalid TIME sign 0x{:02x}",
                column.name, other
            )))
        }
    };

    let parts = read_parts(column, &field[1..], 4)?;
    let part = |i: usize| parts.get(i).copied().unwrap_or(0);

    let mut text = String::new();
    if negative {
        text.push('-');
    }
    text.push_str(&format!("{:02}:{:02}:{:02}", part(0), part(1), part(2)));
    if part(3) > 0 {
        text.push_str(&format!(".{:06}", part(3)));
    }
    Ok(text)
}
