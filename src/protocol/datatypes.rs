//! Datatypes messages
//!
//! `Scalar` and `Any`, the typed value envelopes used for statement
//! arguments, capabilities and notice payloads.

use bytes::{Bytes, BytesMut};

use crate::error::{Result, XError};
use crate::value::{DynamicValue, WireValue};

use super::wire::{
    put_bool_field, put_bytes_field, put_double_field, put_float_field, put_message_field,
    put_sint_field, put_string_field, put_uint_field, FieldReader,
};

const V_SINT: u64 = 1;
const V_UINT: u64 = 2;
const V_NULL: u64 = 3;
const V_OCTETS: u64 = 4;
const V_DOUBLE: u64 = 5;
const V_FLOAT: u64 = 6;
const V_BOOL: u64 = 7;
const V_STRING: u64 = 8;

const ANY_SCALAR: u64 = 1;
const ANY_OBJECT: u64 = 2;
const ANY_ARRAY: u64 = 3;

/// `Mysqlx.Datatypes.Scalar`
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Null,
    SInt(i64),
    UInt(u64),
    Double(f64),
    Float(f32),
    Bool(bool),
    String(String),
    Octets { value: Vec<u8>, content_type: u32 },
}

impl Scalar {
    pub fn encode(&self, buf: &mut BytesMut) {
        match self {
            Scalar::Null => put_uint_field(buf, 1, V_NULL),
            Scalar::SInt(v) => {
                put_uint_field(buf, 1, V_SINT);
                put_sint_field(buf, 2, *v);
            }
            Scalar::UInt(v) => {
                put_uint_field(buf, 1, V_UINT);
                put_uint_field(buf, 3, *v);
            }
            Scalar::Octets {
                value,
                content_type,
            } => {
                put_uint_field(buf, 1, V_OCTETS);
                put_message_field(buf, 5, |inner| {
                    put_bytes_field(inner, 1, value);
                    if *content_type != 0 {
                        put_uint_field(inner, 2, u64::from(*content_type));
                    }
                });
            }
            Scalar::Double(v) => {
                put_uint_field(buf, 1, V_DOUBLE);
                put_double_field(buf, 6, *v);
            }
            Scalar::Float(v) => {
                put_uint_field(buf, 1, V_FLOAT);
                put_float_field(buf, 7, *v);
            }
            Scalar::Bool(v) => {
                put_uint_field(buf, 1, V_BOOL);
                put_bool_field(buf, 8, *v);
            }
            Scalar::String(v) => {
                put_uint_field(buf, 1, V_STRING);
                put_message_field(buf, 9, |inner| put_string_field(inner, 1, v));
            }
        }
    }

    pub fn decode(payload: Bytes) -> Result<Self> {
        let mut reader = FieldReader::new(payload);
        let mut scalar_type = None;
        let mut signed = 0i64;
        let mut unsigned = 0u64;
        let mut double = 0f64;
        let mut float = 0f32;
        let mut boolean = false;
        let mut string = String::new();
        let mut octets = (Vec::new(), 0u32);

        while let Some((field, value)) = reader.next_field()? {
            match field {
                1 => scalar_type = Some(value.as_u64()?),
                2 => signed = value.as_sint()?,
                3 => unsigned = value.as_u64()?,
                5 => octets = decode_octets(value.into_bytes()?)?,
                6 => double = value.as_f64()?,
                7 => float = value.as_f32()?,
                8 => boolean = value.as_bool()?,
                9 => string = decode_string(value.into_bytes()?)?,
                _ => {}
            }
        }

        match scalar_type {
            Some(V_SINT) => Ok(Scalar::SInt(signed)),
            Some(V_UINT) => Ok(Scalar::UInt(unsigned)),
            Some(V_NULL) => Ok(Scalar::Null),
            Some(V_OCTETS) => Ok(Scalar::Octets {
                value: octets.0,
                content_type: octets.1,
            }),
            Some(V_DOUBLE) => Ok(Scalar::Double(double)),
            Some(V_FLOAT) => Ok(Scalar::Float(float)),
            Some(V_BOOL) => Ok(Scalar::Bool(boolean)),
            Some(V_STRING) => Ok(Scalar::String(string)),
            Some(other) => Err(XError::decode(format!("Unknown scalar type {}", other))),
            None => Err(XError::decode("Scalar without a type")),
        }
    }
}

fn decode_octets(payload: Bytes) -> Result<(Vec<u8>, u32)> {
    let mut reader = FieldReader::new(payload);
    let mut value = Vec::new();
    let mut content_type = 0;
    while let Some((field, v)) = reader.next_field()? {
        match field {
            1 => value = v.into_bytes()?.to_vec(),
            2 => content_type = v.as_u32()?,
            _ => {}
        }
    }
    Ok((value, content_type))
}

fn decode_string(payload: Bytes) -> Result<String> {
    let mut reader = FieldReader::new(payload);
    let mut value = String::new();
    while let Some((field, v)) = reader.next_field()? {
        if field == 1 {
            value = v.into_string()?;
        }
    }
    Ok(value)
}

impl TryFrom<&WireValue> for Scalar {
    type Error = XError;

    /// Expression literals travel inside statement text, never as arguments
    fn try_from(value: &WireValue) -> Result<Self> {
        match value {
            WireValue::Null => Ok(Scalar::Null),
            WireValue::Bool(b) => Ok(Scalar::Bool(*b)),
            WireValue::String(s) => Ok(Scalar::String(s.clone())),
            WireValue::SInt(i) => Ok(Scalar::SInt(*i)),
            WireValue::UInt(u) => Ok(Scalar::UInt(*u)),
            WireValue::Double(d) => Ok(Scalar::Double(*d)),
            WireValue::Expression(expr) => Err(XError::argument(format!(
                "Expression '{}' can not be sent as a typed argument",
                expr.as_str()
            ))),
        }
    }
}

impl From<Scalar> for DynamicValue {
    fn from(value: Scalar) -> Self {
        match value {
            Scalar::Null => DynamicValue::Null,
            Scalar::SInt(i) => DynamicValue::Integer(i),
            Scalar::UInt(u) => DynamicValue::UInteger(u),
            Scalar::Double(d) => DynamicValue::Float(d),
            Scalar::Float(f) => DynamicValue::Float(f64::from(f)),
            Scalar::Bool(b) => DynamicValue::Bool(b),
            Scalar::String(s) => DynamicValue::String(s),
            Scalar::Octets { value, .. } => {
                DynamicValue::String(String::from_utf8_lossy(&value).into_owned())
            }
        }
    }
}

/// `Mysqlx.Datatypes.Any`
#[derive(Debug, Clone, PartialEq)]
pub enum Any {
    Scalar(Scalar),
    Object(Vec<(String, Any)>),
    Array(Vec<Any>),
}

impl Any {
    pub fn encode(&self, buf: &mut BytesMut) {
        match self {
            Any::Scalar(scalar) => {
                put_uint_field(buf, 1, ANY_SCALAR);
                put_message_field(buf, 2, |inner| scalar.encode(inner));
            }
            Any::Object(fields) => {
                put_uint_field(buf, 1, ANY_OBJECT);
                put_message_field(buf, 3, |object| {
                    for (key, value) in fields {
                        put_message_field(object, 1, |fld| {
                            put_string_field(fld, 1, key);
                            put_message_field(fld, 2, |inner| value.encode(inner));
                        });
                    }
                });
            }
            Any::Array(items) => {
                put_uint_field(buf, 1, ANY_ARRAY);
                put_message_field(buf, 4, |array| {
                    for item in items {
                        put_message_field(array, 1, |inner| item.encode(inner));
                    }
                });
            }
        }
    }

    pub fn decode(payload: Bytes) -> Result<Self> {
        let mut reader = FieldReader::new(payload);
        let mut any_type = None;
        let mut scalar = None;
        let mut object = Vec::new();
        let mut array = Vec::new();

        while let Some((field, value)) = reader.next_field()? {
            match field {
                1 => any_type = Some(value.as_u64()?),
                2 => scalar = Some(Scalar::decode(value.into_bytes()?)?),
                3 => object = decode_object(value.into_bytes()?)?,
                4 => array = decode_array(value.into_bytes()?)?,
                _ => {}
            }
        }

        match any_type {
            Some(ANY_SCALAR) => scalar
                .map(Any::Scalar)
                .ok_or_else(|| XError::decode("Scalar Any without a scalar")),
            Some(ANY_OBJECT) => Ok(Any::Object(object)),
            Some(ANY_ARRAY) => Ok(Any::Array(array)),
            Some(other) => Err(XError::decode(format!("Unknown Any type {}", other))),
            None => Err(XError::decode("Any without a type")),
        }
    }
}

fn decode_object(payload: Bytes) -> Result<Vec<(String, Any)>> {
    let mut reader = FieldReader::new(payload);
    let mut fields = Vec::new();
    while let Some((field, value)) = reader.next_field()? {
        if field != 1 {
            continue;
        }
        let mut fld = FieldReader::new(value.into_bytes()?);
        let mut key = String::new();
        let mut any = None;
        while let Some((f, v)) = fld.next_field()? {
            match f {
                1 => key = v.into_string()?,
                2 => any = Some(Any::decode(v.into_bytes()?)?),
                _ => {}
            }
        }
        let any = any.ok_or_else(|| XError::decode(format!("Object field '{}' has no value", key)))?;
        fields.push((key, any));
    }
    Ok(fields)
}

fn decode_array(payload: Bytes) -> Result<Vec<Any>> {
    let mut reader = FieldReader::new(payload);
    let mut items = Vec::new();
    while let Some((field, value)) = reader.next_field()? {
        if field == 1 {
            items.push(Any::decode(value.into_bytes()?)?);
        }
    }
    Ok(items)
}

impl From<Scalar> for Any {
    fn from(value: Scalar) -> Self {
        Any::Scalar(value)
    }
}

impl From<Any> for DynamicValue {
    fn from(value: Any) -> Self {
        match value {
            Any::Scalar(scalar) => scalar.into(),
            Any::Object(fields) => DynamicValue::Map(
                fields
                    .into_iter()
                    .map(|(k, v)| (k, DynamicValue::from(v)))
                    .collect(),
            ),
            Any::Array(items) => {
                DynamicValue::Array(items.into_iter().map(DynamicValue::from).collect())
            }
        }
    }
}
