//! Value Module
//!
//! The two value systems the engine sits between.
//!
//! ## Types
//! - [`DynamicValue`]: the runtime-tagged value handed over by a scripting
//!   front-end. Read, never owned, by the engine.
//! - [`WireValue`]: the closed set of operands the protocol can carry.
//! - [`Expression`]: the stock object exposing raw expression text through
//!   the [`AsExpressionText`] capability.
//!
//! [`map`] is the only bridge between the two.

mod bridge;

pub use bridge::map;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::{Result, XError};

// =============================================================================
// Capabilities
// =============================================================================

/// Raw expression text forwarded to the server without quoting
pub trait AsExpressionText {
    fn expression_text(&self) -> &str;
}

/// An object living in the scripting front-end
pub trait ObjectRef: Send + Sync {
    /// Class name used in human descriptions
    fn class_name(&self) -> &str;

    /// Expression capability, present only on expression objects
    fn as_expression(&self) -> Option<&dyn AsExpressionText> {
        None
    }
}

/// A function value of the scripting front-end
pub trait Callable: Send + Sync {
    fn name(&self) -> &str;
}

/// `mysqlx.expr(...)` object: carries a single expression string
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expression {
    data: String,
}

impl Expression {
    /// Any text is accepted here; emptiness is rejected when mapped
    pub fn new(data: impl Into<String>) -> Self {
        Self { data: data.into() }
    }

    pub fn data(&self) -> &str {
        &self.data
    }
}

impl AsExpressionText for Expression {
    fn expression_text(&self) -> &str {
        &self.data
    }
}

impl ObjectRef for Expression {
    fn class_name(&self) -> &str {
        "Expression"
    }

    fn as_expression(&self) -> Option<&dyn AsExpressionText> {
        Some(self)
    }
}

// =============================================================================
// Dynamic Value
// =============================================================================

/// Shared, mutable keyed mapping
pub type MapRef = Arc<RwLock<BTreeMap<String, DynamicValue>>>;

/// A value produced by a scripting front-end
#[derive(Clone)]
pub enum DynamicValue {
    /// No value at all; never a legal operand
    Undefined,
    Null,
    Bool(bool),
    String(String),
    Integer(i64),
    UInteger(u64),
    Float(f64),
    Object(Arc<dyn ObjectRef>),
    Array(Vec<DynamicValue>),
    Map(BTreeMap<String, DynamicValue>),
    MapRef(MapRef),
    Function(Arc<dyn Callable>),
}

impl DynamicValue {
    /// Wrap an expression object
    pub fn expression(text: impl Into<String>) -> Self {
        DynamicValue::Object(Arc::new(Expression::new(text)))
    }

    /// Expression text, when the value is an object exposing it
    pub fn has_expression_text(&self) -> Option<String> {
        match self {
            DynamicValue::Object(object) => object
                .as_expression()
                .map(|expr| expr.expression_text().to_string()),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, DynamicValue::Null)
    }

    /// Name of the variant, for error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            DynamicValue::Undefined => "Undefined",
            DynamicValue::Null => "Null",
            DynamicValue::Bool(_) => "Bool",
            DynamicValue::String(_) => "String",
            DynamicValue::Integer(_) => "Integer",
            DynamicValue::UInteger(_) => "UInteger",
            DynamicValue::Float(_) => "Float",
            DynamicValue::Object(_) => "Object",
            DynamicValue::Array(_) => "Array",
            DynamicValue::Map(_) => "Map",
            DynamicValue::MapRef(_) => "MapRef",
            DynamicValue::Function(_) => "Function",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            DynamicValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            DynamicValue::Integer(i) => Some(*i),
            DynamicValue::UInteger(u) => i64::try_from(*u).ok(),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            DynamicValue::UInteger(u) => Some(*u),
            DynamicValue::Integer(i) => u64::try_from(*i).ok(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            DynamicValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            DynamicValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Human description of the value
    ///
    /// Sequences and mappings render JSON-like (`[1,"a"]`,
    /// `{"k": 1}`), objects as `<ClassName>`, callables as
    /// `<Function:name>`.
    pub fn descr(&self) -> String {
        let mut out = String::new();
        self.write_descr(&mut out);
        out
    }

    fn write_descr(&self, out: &mut String) {
        match self {
            DynamicValue::Undefined => out.push_str("undefined"),
            DynamicValue::Null => out.push_str("null"),
            DynamicValue::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
            DynamicValue::String(s) => out.push_str(&quote_json(s)),
            DynamicValue::Integer(i) => out.push_str(&i.to_string()),
            DynamicValue::UInteger(u) => out.push_str(&u.to_string()),
            DynamicValue::Float(f) => out.push_str(&f.to_string()),
            DynamicValue::Object(object) => {
                out.push('<');
                out.push_str(object.class_name());
                out.push('>');
            }
            DynamicValue::Array(items) => {
                out.push('[');
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    item.write_descr(out);
                }
                out.push(']');
            }
            DynamicValue::Map(map) => write_map_descr(map, out),
            DynamicValue::MapRef(map) => write_map_descr(&map.read(), out),
            DynamicValue::Function(function) => {
                out.push_str("<Function:");
                out.push_str(function.name());
                out.push('>');
            }
        }
    }
}

fn write_map_descr(map: &BTreeMap<String, DynamicValue>, out: &mut String) {
    out.push('{');
    for (i, (key, value)) in map.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        out.push_str(&quote_json(key));
        out.push_str(": ");
        value.write_descr(out);
    }
    out.push('}');
}

fn quote_json(s: &str) -> String {
    serde_json::Value::String(s.to_string()).to_string()
}

impl fmt::Debug for DynamicValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.type_name(), self.descr())
    }
}

impl fmt::Display for DynamicValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.descr())
    }
}

impl PartialEq for DynamicValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (DynamicValue::Undefined, DynamicValue::Undefined) => true,
            (DynamicValue::Null, DynamicValue::Null) => true,
            (DynamicValue::Bool(a), DynamicValue::Bool(b)) => a == b,
            (DynamicValue::String(a), DynamicValue::String(b)) => a == b,
            (DynamicValue::Integer(a), DynamicValue::Integer(b)) => a == b,
            (DynamicValue::UInteger(a), DynamicValue::UInteger(b)) => a == b,
            (DynamicValue::Float(a), DynamicValue::Float(b)) => a == b,
            // Objects and callables compare by identity
            (DynamicValue::Object(a), DynamicValue::Object(b)) => Arc::ptr_eq(a, b),
            (DynamicValue::Function(a), DynamicValue::Function(b)) => Arc::ptr_eq(a, b),
            (DynamicValue::Array(a), DynamicValue::Array(b)) => a == b,
            (DynamicValue::Map(a), DynamicValue::Map(b)) => a == b,
            (DynamicValue::MapRef(a), DynamicValue::MapRef(b)) => {
                Arc::ptr_eq(a, b) || *a.read() == *b.read()
            }
            _ => false,
        }
    }
}

impl From<bool> for DynamicValue {
    fn from(value: bool) -> Self {
        DynamicValue::Bool(value)
    }
}

impl From<i64> for DynamicValue {
    fn from(value: i64) -> Self {
        DynamicValue::Integer(value)
    }
}

impl From<i32> for DynamicValue {
    fn from(value: i32) -> Self {
        DynamicValue::Integer(i64::from(value))
    }
}

impl From<u64> for DynamicValue {
    fn from(value: u64) -> Self {
        DynamicValue::UInteger(value)
    }
}

impl From<f64> for DynamicValue {
    fn from(value: f64) -> Self {
        DynamicValue::Float(value)
    }
}

impl From<&str> for DynamicValue {
    fn from(value: &str) -> Self {
        DynamicValue::String(value.to_string())
    }
}

impl From<String> for DynamicValue {
    fn from(value: String) -> Self {
        DynamicValue::String(value)
    }
}

impl From<serde_json::Value> for DynamicValue {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => DynamicValue::Null,
            serde_json::Value::Bool(b) => DynamicValue::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    DynamicValue::Integer(i)
                } else if let Some(u) = n.as_u64() {
                    DynamicValue::UInteger(u)
                } else {
                    DynamicValue::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            serde_json::Value::String(s) => DynamicValue::String(s),
            serde_json::Value::Array(items) => {
                DynamicValue::Array(items.into_iter().map(DynamicValue::from).collect())
            }
            serde_json::Value::Object(map) => DynamicValue::Map(
                map.into_iter()
                    .map(|(k, v)| (k, DynamicValue::from(v)))
                    .collect(),
            ),
        }
    }
}

// =============================================================================
// Wire Value
// =============================================================================

/// Expression text that is known to be non-empty
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpressionLiteral(String);

impl ExpressionLiteral {
    pub fn new(text: impl Into<String>) -> Result<Self> {
        let text = text.into();
        if text.is_empty() {
            return Err(XError::argument("Expressions can not be empty"));
        }
        Ok(Self(text))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A protocol-level operand
///
/// Every variant except `Expression` is sent as a typed argument;
/// `Expression` text is placed into the statement verbatim.
#[derive(Debug, Clone, PartialEq)]
pub enum WireValue {
    Null,
    Bool(bool),
    String(String),
    SInt(i64),
    UInt(u64),
    Double(f64),
    Expression(ExpressionLiteral),
}

impl WireValue {
    /// Expression literal; fails on empty text
    pub fn expression(text: impl Into<String>) -> Result<Self> {
        ExpressionLiteral::new(text).map(WireValue::Expression)
    }

    pub fn is_expression(&self) -> bool {
        matches!(self, WireValue::Expression(_))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, WireValue::Null)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            WireValue::Null => "null",
            WireValue::Bool(_) => "bool",
            WireValue::String(_) => "string",
            WireValue::SInt(_) => "sint",
            WireValue::UInt(_) => "uint",
            WireValue::Double(_) => "double",
            WireValue::Expression(_) => "expression",
        }
    }
}

impl fmt::Display for WireValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WireValue::Null => f.write_str("NULL"),
            WireValue::Bool(b) => write!(f, "{}", b),
            WireValue::String(s) => f.write_str(&quote_json(s)),
            WireValue::SInt(i) => write!(f, "{}", i),
            WireValue::UInt(u) => write!(f, "{}", u),
            WireValue::Double(d) => write!(f, "{}", d),
            WireValue::Expression(e) => f.write_str(e.as_str()),
        }
    }
}

impl From<bool> for WireValue {
    fn from(value: bool) -> Self {
        WireValue::Bool(value)
    }
}

impl From<i64> for WireValue {
    fn from(value: i64) -> Self {
        WireValue::SInt(value)
    }
}

impl From<i32> for WireValue {
    fn from(value: i32) -> Self {
        WireValue::SInt(i64::from(value))
    }
}

impl From<u64> for WireValue {
    fn from(value: u64) -> Self {
        WireValue::UInt(value)
    }
}

impl From<f64> for WireValue {
    fn from(value: f64) -> Self {
        WireValue::Double(value)
    }
}

impl From<&str> for WireValue {
    fn from(value: &str) -> Self {
        WireValue::String(value.to_string())
    }
}

impl From<String> for WireValue {
    fn from(value: String) -> Self {
        WireValue::String(value)
    }
}

impl TryFrom<&DynamicValue> for WireValue {
    type Error = XError;

    fn try_from(value: &DynamicValue) -> Result<Self> {
        map(value)
    }
}

impl TryFrom<DynamicValue> for WireValue {
    type Error = XError;

    fn try_from(value: DynamicValue) -> Result<Self> {
        map(&value)
    }
}
