//! Column metadata

use std::collections::BTreeMap;
use std::fmt;

use crate::protocol::ColumnMetaDataFrame;
use crate::value::DynamicValue;

/// Names of the metadata fields exposed per column, in order
pub const METADATA_FIELDS: [&str; 11] = [
    "catalog", "db", "table", "org_table", "name", "org_name", "charset", "length", "type",
    "flags", "decimal",
];

/// Column type as sent by the server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    SInt,
    UInt,
    Double,
    Float,
    Bytes,
    Time,
    DateTime,
    Set,
    Enum,
    Bit,
    Decimal,
    Unknown(u32),
}

impl FieldType {
    pub fn from_u32(value: u32) -> Self {
        match value {
            1 => FieldType::SInt,
            2 => FieldType::UInt,
            5 => FieldType::Double,
            6 => FieldType::Float,
            7 => FieldType::Bytes,
            10 => FieldType::Time,
            12 => FieldType::DateTime,
            15 => FieldType::Set,
            16 => FieldType::Enum,
            17 => FieldType::Bit,
            18 => FieldType::Decimal,
            other => FieldType::Unknown(other),
        }
    }

    pub fn as_u32(&self) -> u32 {
        match self {
            FieldType::SInt => 1,
            FieldType::UInt => 2,
            FieldType::Double => 5,
            FieldType::Float => 6,
            FieldType::Bytes => 7,
            FieldType::Time => 10,
            FieldType::DateTime => 12,
            FieldType::Set => 15,
            FieldType::Enum => 16,
            FieldType::Bit => 17,
            FieldType::Decimal => 18,
            FieldType::Unknown(other) => *other,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            FieldType::SInt => "SINT",
            FieldType::UInt => "UINT",
            FieldType::Double => "DOUBLE",
            FieldType::Float => "FLOAT",
            FieldType::Bytes => "BYTES",
            FieldType::Time => "TIME",
            FieldType::DateTime => "DATETIME",
            FieldType::Set => "SET",
            FieldType::Enum => "ENUM",
            FieldType::Bit => "BIT",
            FieldType::Decimal => "DECIMAL",
            FieldType::Unknown(_) => "UNKNOWN",
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// `BYTES` content hints
pub const CONTENT_TYPE_GEOMETRY: u32 = 1;
pub const CONTENT_TYPE_JSON: u32 = 2;
pub const CONTENT_TYPE_XML: u32 = 3;

/// Character set of a collation id; ids without text data are `binary`
pub fn charset_name(collation: u64) -> &'static str {
    match collation {
        0 | 63 => "binary",
        8 | 47 | 48 | 49 => "latin1",
        11 | 65 => "ascii",
        33 | 83 | 192..=215 => "utf8",
        45 | 46 | 224..=247 | 255..=323 => "utf8mb4",
        _ => "unknown",
    }
}

/// Metadata of one result column
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMetadata {
    pub catalog: String,
    pub schema: String,
    pub table: String,
    pub original_table: String,
    pub name: String,
    pub original_name: String,
    pub collation: u64,
    pub length: u32,
    pub field_type: FieldType,
    pub flags: u32,
    pub fractional_digits: u32,
    pub content_type: u32,
}

impl ColumnMetadata {
    pub fn charset(&self) -> &'static str {
        charset_name(self.collation)
    }

    /// `UINT` columns flag zerofill, `BYTES` columns flag right-padding
    pub fn is_padded(&self) -> bool {
        self.flags & 0x0001 != 0
    }

    /// One of the 11 named metadata fields
    pub fn field(&self, name: &str) -> Option<DynamicValue> {
        let value = match name {
            "catalog" => DynamicValue::from(self.catalog.as_str()),
            "db" => DynamicValue::from(self.schema.as_str()),
            "table" => DynamicValue::from(self.table.as_str()),
            "org_table" => DynamicValue::from(self.original_table.as_str()),
            "name" => DynamicValue::from(self.name.as_str()),
            "org_name" => DynamicValue::from(self.original_name.as_str()),
            "charset" => DynamicValue::from(self.charset()),
            "length" => DynamicValue::UInteger(u64::from(self.length)),
            "type" => DynamicValue::from(self.field_type.name()),
            "flags" => DynamicValue::UInteger(u64::from(self.flags)),
            "decimal" => DynamicValue::UInteger(u64::from(self.fractional_digits)),
            _ => return None,
        };
        Some(value)
    }

    /// All 11 fields as a keyed mapping
    pub fn to_value(&self) -> DynamicValue {
        let map: BTreeMap<String, DynamicValue> = METADATA_FIELDS
            .iter()
            .filter_map(|name| self.field(name).map(|v| (name.to_string(), v)))
            .collect();
        DynamicValue::Map(map)
    }
}

impl From<ColumnMetaDataFrame> for ColumnMetadata {
    fn from(frame: ColumnMetaDataFrame) -> Self {
        Self {
            catalog: frame.catalog,
            schema: frame.schema,
            table: frame.table,
            original_table: frame.original_table,
            name: frame.name,
            original_name: frame.original_name,
            collation: frame.collation,
            length: frame.length,
            field_type: FieldType::from_u32(frame.field_type),
            flags: frame.flags,
            fractional_digits: frame.fractional_digits,
            content_type: frame.content_type,
        }
    }
}
