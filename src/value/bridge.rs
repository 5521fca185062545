//! Value Bridge
//!
//! Converts a front-end value into a protocol operand, or rejects it.

use crate::error::{Result, XError};

use super::{DynamicValue, ExpressionLiteral, WireValue};

/// Map a dynamic value onto a wire value
///
/// Scalars map losslessly onto the matching variant. Objects are accepted
/// only when they expose non-empty expression text. Containers and
/// callables have no single-operand representation and are rejected.
pub fn map(value: &DynamicValue) -> Result<WireValue> {
    match value {
        DynamicValue::Undefined => Err(XError::argument("Invalid value")),
        DynamicValue::Null => Ok(WireValue::Null),
        DynamicValue::Bool(b) => Ok(WireValue::Bool(*b)),
        DynamicValue::String(s) => Ok(WireValue::String(s.clone())),
        DynamicValue::Integer(i) => Ok(WireValue::SInt(*i)),
        DynamicValue::UInteger(u) => Ok(WireValue::UInt(*u)),
        DynamicValue::Float(f) => Ok(WireValue::Double(*f)),
        DynamicValue::Object(object) => match object.as_expression() {
            // Empty text fails inside ExpressionLiteral::new
            Some(expr) => ExpressionLiteral::new(expr.expression_text()).map(WireValue::Expression),
            None => Err(unsupported(value)),
        },
        DynamicValue::Array(_)
        | DynamicValue::Map(_)
        | DynamicValue::MapRef(_)
        | DynamicValue::Function(_) => Err(unsupported(value)),
    }
}

fn unsupported(value: &DynamicValue) -> XError {
    XError::argument(format!("Unsupported value received: {}", value.descr()))
}
