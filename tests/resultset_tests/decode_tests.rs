//! Row Field Decoding Tests
//!
//! One test group per column type, fed with the byte layouts the server
//! produces.

use bytes::BytesMut;
use xclient::protocol::wire::{put_varint, zigzag_encode};
use xclient::resultset::{decode_field, ColumnMetadata, FieldType, CONTENT_TYPE_JSON};
use xclient::DynamicValue;

// =============================================================================
// Helper Functions
// =============================================================================

fn column(field_type: FieldType) -> ColumnMetadata {
    ColumnMetadata {
        catalog: "def".to_string(),
        schema: "test".to_string(),
        table: "t".to_string(),
        original_table: "t".to_string(),
        name: "c".to_string(),
        original_name: "c".to_string(),
        collation: 255,
        length: 0,
        field_type,
        flags: 0,
        fractional_digits: 0,
        content_type: 0,
    }
}

fn varints(values: &[u64]) -> Vec<u8> {
    let mut buf = BytesMut::new();
    for value in values {
        put_varint(&mut buf, *value);
    }
    buf.to_vec()
}

fn decode(field_type: FieldType, field: &[u8]) -> DynamicValue {
    decode_field(&column(field_type), field).unwrap()
}

fn text(value: &str) -> DynamicValue {
    DynamicValue::String(value.to_string())
}

// =============================================================================
// Numeric Tests
// =============================================================================

#[test]
fn test_empty_field_is_null() {
    assert_eq!(decode(FieldType::SInt, &[]), DynamicValue::Null);
    assert_eq!(decode(FieldType::Bytes, &[]), DynamicValue::Null);
    assert_eq!(decode(FieldType::DateTime, &[]), DynamicValue::Null);
}

#[test]
fn test_signed_integers() {
    for value in [0i64, 1, -1, 127, -128, i64::MAX, i64::MIN] {
        let field = varints(&[zigzag_encode(value)]);
        assert_eq!(decode(FieldType::SInt, &field), DynamicValue::Integer(value));
    }
}

#[test]
fn test_unsigned_integers() {
    let field = varints(&[u64::MAX]);
    assert_eq!(decode(FieldType::UInt, &field), DynamicValue::UInteger(u64::MAX));

    let field = varints(&[0b1011]);
    assert_eq!(decode(FieldType::Bit, &field), DynamicValue::UInteger(11));
}

#[test]
fn test_integer_with_trailing_bytes_is_error() {
    let mut field = varints(&[zigzag_encode(5)]);
    field.push(0);
    let err = decode_field(&column(FieldType::SInt), &field).unwrap_err();
    assert!(err.is_decode_error());
}

#[test]
fn test_double_and_float() {
    let field = 2.5f64.to_le_bytes();
    assert_eq!(decode(FieldType::Double, &field), DynamicValue::Float(2.5));

    let field = 0.5f32.to_le_bytes();
    assert_eq!(decode(FieldType::Float, &field), DynamicValue::Float(0.5));

    let err = decode_field(&column(FieldType::Double), &[1, 2, 3]).unwrap_err();
    assert!(err.is_decode_error());
}

#[test]
fn test_decimal() {
    // scale 2, digits 1 2 3 4 5, positive sign nibble
    assert_eq!(
        decode(FieldType::Decimal, &[0x02, 0x12, 0x34, 0x5c]),
        text("123.45")
    );
    // scale 0, digits 4 2, negative sign closes the next byte
    assert_eq!(decode(FieldType::Decimal, &[0x00, 0x42, 0xd0]), text("-42"));
    // scale 3, digit 5
    assert_eq!(decode(FieldType::Decimal, &[0x03, 0x5c]), text("0.005"));
}

#[test]
fn test_decimal_without_sign_is_error() {
    let err = decode_field(&column(FieldType::Decimal), &[0x00, 0x12]).unwrap_err();
    assert!(err.is_decode_error());
}

// =============================================================================
// Text Tests
// =============================================================================

#[test]
fn test_bytes_strip_pad_byte() {
    assert_eq!(decode(FieldType::Bytes, b"hello\0"), text("hello"));
    assert_eq!(decode(FieldType::Bytes, b"\0"), text(""));
    assert_eq!(decode(FieldType::Enum, b"red\0"), text("red"));
}

#[test]
fn test_json_content_is_parsed() {
    let mut json = column(FieldType::Bytes);
    json.content_type = CONTENT_TYPE_JSON;

    let value = decode_field(&json, b"{\"a\": [1, 2]}\0").unwrap();
    match value {
        DynamicValue::Map(map) => assert_eq!(
            map.get("a"),
            Some(&DynamicValue::Array(vec![
                DynamicValue::Integer(1),
                DynamicValue::Integer(2)
            ]))
        ),
        other => panic!("Expected a map, got {:?}", other),
    }

    // Text that is not JSON stays text
    assert_eq!(decode_field(&json, b"{oops\0").unwrap(), text("{oops"));
}

#[test]
fn test_set() {
    assert_eq!(decode(FieldType::Set, &[0x01]), text(""));

    let mut field = vec![1, b'a'];
    field.extend_from_slice(&[2, b'b', b'c']);
    assert_eq!(decode(FieldType::Set, &field), text("a,bc"));

    let err = decode_field(&column(FieldType::Set), &[5, b'a']).unwrap_err();
    assert!(err.is_decode_error());
}

#[test]
fn test_binary_bytes_are_not_replaced() {
    let mut binary = column(FieldType::Bytes);
    binary.collation = 63;
    binary.name = "blob".to_string();

    let err = decode_field(&binary, &[0xff, 0xfe, 0x00]).unwrap_err();
    assert!(err.is_decode_error());
    assert!(err.to_string().contains("Column 'blob'"));

    // Distinct invalid payloads must never collapse to the same value
    assert!(decode_field(&binary, &[0xfd, 0x80, 0x00]).is_err());
    assert!(decode_field(&column(FieldType::Enum), &[0xc3, 0x00]).is_err());
}

#[test]
fn test_set_member_with_invalid_utf8_is_error() {
    let err = decode_field(&column(FieldType::Set), &[1, 0xff]).unwrap_err();
    assert!(err.is_decode_error());
}

// =============================================================================
// Temporal Tests
// =============================================================================

#[test]
fn test_date() {
    let field = varints(&[2024, 2, 29]);
    assert_eq!(decode(FieldType::DateTime, &field), text("2024-02-29"));
}

#[test]
fn test_datetime() {
    let field = varints(&[2024, 2, 29, 13, 5, 9]);
    assert_eq!(decode(FieldType::DateTime, &field), text("2024-02-29 13:05:09"));

    let field = varints(&[2024, 2, 29, 13]);
    assert_eq!(decode(FieldType::DateTime, &field), text("2024-02-29 13:00:00"));

    let field = varints(&[1999, 12, 31, 23, 59, 59, 250]);
    assert_eq!(
        decode(FieldType::DateTime, &field),
        text("1999-12-31 23:59:59.000250")
    );
}

#[test]
fn test_datetime_too_short_is_error() {
    let field = varints(&[2024, 2]);
    let err = decode_field(&column(FieldType::DateTime), &field).unwrap_err();
    assert!(err.is_decode_error());
}

#[test]
fn test_time() {
    let mut field = vec![0x00];
    field.extend(varints(&[12, 30, 15]));
    assert_eq!(decode(FieldType::Time, &field), text("12:30:15"));

    let mut field = vec![0x01];
    field.extend(varints(&[838, 59, 59, 1]));
    assert_eq!(decode(FieldType::Time, &field), text("-838:59:59.000001"));

    assert_eq!(decode(FieldType::Time, &[0x00]), text("00:00:00"));
}

#[test]
fn test_time_bad_sign_is_error() {
    let err = decode_field(&column(FieldType::Time), &[0x07, 0x01]).unwrap_err();
    assert!(err.is_decode_error());
}

// =============================================================================
// Unsupported Types
// =============================================================================

#[test]
fn test_unknown_type_is_error() {
    let err = decode_field(&column(FieldType::Unknown(99)), &[1]).unwrap_err();
    assert!(err.is_decode_error());
    assert!(err.to_string().contains("99"));
}

#[test]
fn test_field_type_codes() {
    for code in [1u32, 2, 5, 6, 7, 10, 12, 15, 16, 17, 18] {
        assert_eq!(FieldType::from_u32(code).as_u32(), code);
    }
    assert_eq!(FieldType::from_u32(3), FieldType::Unknown(3));
    assert_eq!(FieldType::Decimal.to_string(), "DECIMAL");
}
