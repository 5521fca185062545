//! Server message definitions
//!
//! Represents the messages a server sends back: handshake replies,
//! notices, result set frames and statement markers.

use bytes::{Bytes, BytesMut};

use crate::error::{Result, XError};

use super::command::{decode_capabilities, encode_capabilities};
use super::datatypes::{Any, Scalar};
use super::wire::{
    put_bytes_field, put_message_field, put_string_field, put_uint_field, FieldReader,
};

/// Server message types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ServerMessageType {
    Ok = 0,
    Error = 1,
    Capabilities = 2,
    AuthenticateContinue = 3,
    AuthenticateOk = 4,
    Notice = 11,
    ColumnMetaData = 12,
    Row = 13,
    FetchDone = 14,
    FetchSuspended = 15,
    FetchDoneMoreResultsets = 16,
    StmtExecuteOk = 17,
    FetchDoneMoreOutParams = 18,
}

impl ServerMessageType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(ServerMessageType::Ok),
            1 => Some(ServerMessageType::Error),
            2 => Some(ServerMessageType::Capabilities),
            3 => Some(ServerMessageType::AuthenticateContinue),
            4 => Some(ServerMessageType::AuthenticateOk),
            11 => Some(ServerMessageType::Notice),
            12 => Some(ServerMessageType::ColumnMetaData),
            13 => Some(ServerMessageType::Row),
            14 => Some(ServerMessageType::FetchDone),
            15 => Some(ServerMessageType::FetchSuspended),
            16 => Some(ServerMessageType::FetchDoneMoreResultsets),
            17 => Some(ServerMessageType::StmtExecuteOk),
            18 => Some(ServerMessageType::FetchDoneMoreOutParams),
            _ => None,
        }
    }
}

// =============================================================================
// Payload Types
// =============================================================================

/// `Mysqlx.Error`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorFrame {
    /// True for errors that close the connection
    pub fatal: bool,
    pub code: u32,
    pub sql_state: String,
    pub message: String,
}

/// Raw `Mysqlx.Resultset.ColumnMetaData` fields
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnMetaDataFrame {
    pub field_type: u32,
    pub name: String,
    pub original_name: String,
    pub table: String,
    pub original_table: String,
    pub schema: String,
    pub catalog: String,
    pub collation: u64,
    pub fractional_digits: u32,
    pub length: u32,
    pub flags: u32,
    pub content_type: u32,
}

/// Warning severity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningLevel {
    Note,
    Warning,
    Error,
}

impl WarningLevel {
    fn from_u64(value: u64) -> Self {
        match value {
            1 => WarningLevel::Note,
            3 => WarningLevel::Error,
            _ => WarningLevel::Warning,
        }
    }

    fn as_u64(self) -> u64 {
        match self {
            WarningLevel::Note => 1,
            WarningLevel::Warning => 2,
            WarningLevel::Error => 3,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WarningLevel::Note => "Note",
            WarningLevel::Warning => "Warning",
            WarningLevel::Error => "Error",
        }
    }
}

/// A warning raised while executing a statement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Warning {
    pub level: WarningLevel,
    pub code: u32,
    pub message: String,
}

/// `Mysqlx.Notice.SessionStateChanged` parameters
#[derive(Debug, Clone, PartialEq)]
pub enum StateChange {
    CurrentSchema(String),
    AccountExpired,
    GeneratedInsertId(u64),
    RowsAffected(u64),
    RowsFound(u64),
    RowsMatched(u64),
    TrxCommitted,
    TrxRolledBack,
    ProducedMessage(String),
    ClientIdAssigned(u64),
    Other { param: u32, value: Option<Scalar> },
}

const STATE_CURRENT_SCHEMA: u32 = 1;
const STATE_ACCOUNT_EXPIRED: u32 = 2;
const STATE_GENERATED_INSERT_ID: u32 = 3;
const STATE_ROWS_AFFECTED: u32 = 4;
const STATE_ROWS_FOUND: u32 = 5;
const STATE_ROWS_MATCHED: u32 = 6;
const STATE_TRX_COMMITTED: u32 = 7;
const STATE_TRX_ROLLEDBACK: u32 = 9;
const STATE_PRODUCED_MESSAGE: u32 = 10;
const STATE_CLIENT_ID_ASSIGNED: u32 = 11;

impl StateChange {
    fn from_parts(param: u32, value: Option<Scalar>) -> Self {
        let as_u64 = |v: &Option<Scalar>| match v {
            Some(Scalar::UInt(u)) => Some(*u),
            Some(Scalar::SInt(i)) => u64::try_from(*i).ok(),
            _ => None,
        };
        let as_string = |v: &Option<Scalar>| match v {
            Some(Scalar::String(s)) => Some(s.clone()),
            Some(Scalar::Octets { value, .. }) => {
                Some(String::from_utf8_lossy(value).into_owned())
            }
            _ => None,
        };

        let known = match param {
            STATE_CURRENT_SCHEMA => as_string(&value).map(StateChange::CurrentSchema),
            STATE_ACCOUNT_EXPIRED => Some(StateChange::AccountExpired),
            STATE_GENERATED_INSERT_ID => as_u64(&value).map(StateChange::GeneratedInsertId),
            STATE_ROWS_AFFECTED => as_u64(&value).map(StateChange::RowsAffected),
            STATE_ROWS_FOUND => as_u64(&value).map(StateChange::RowsFound),
            STATE_ROWS_MATCHED => as_u64(&value).map(StateChange::RowsMatched),
            STATE_TRX_COMMITTED => Some(StateChange::TrxCommitted),
            STATE_TRX_ROLLEDBACK => Some(StateChange::TrxRolledBack),
            STATE_PRODUCED_MESSAGE => as_string(&value).map(StateChange::ProducedMessage),
            STATE_CLIENT_ID_ASSIGNED => as_u64(&value).map(StateChange::ClientIdAssigned),
            _ => None,
        };
        known.unwrap_or(StateChange::Other { param, value })
    }

    fn to_parts(&self) -> (u32, Option<Scalar>) {
        match self {
            StateChange::CurrentSchema(s) => (STATE_CURRENT_SCHEMA, Some(Scalar::String(s.clone()))),
            StateChange::AccountExpired => (STATE_ACCOUNT_EXPIRED, None),
            StateChange::GeneratedInsertId(v) => (STATE_GENERATED_INSERT_ID, Some(Scalar::UInt(*v))),
            StateChange::RowsAffected(v) => (STATE_ROWS_AFFECTED, Some(Scalar::UInt(*v))),
            StateChange::RowsFound(v) => (STATE_ROWS_FOUND, Some(Scalar::UInt(*v))),
            StateChange::RowsMatched(v) => (STATE_ROWS_MATCHED, Some(Scalar::UInt(*v))),
            StateChange::TrxCommitted => (STATE_TRX_COMMITTED, None),
            StateChange::TrxRolledBack => (STATE_TRX_ROLLEDBACK, None),
            StateChange::ProducedMessage(s) => {
                (STATE_PRODUCED_MESSAGE, Some(Scalar::String(s.clone())))
            }
            StateChange::ClientIdAssigned(v) => (STATE_CLIENT_ID_ASSIGNED, Some(Scalar::UInt(*v))),
            StateChange::Other { param, value } => (*param, value.clone()),
        }
    }
}

/// Notice scope
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeScope {
    Global,
    Local,
}

/// `Mysqlx.Notice.Frame`, with its payload decoded
#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
    Warning(Warning),
    SessionVariableChanged { param: String, value: Option<Scalar> },
    SessionStateChanged(StateChange),
    Unknown { notice_type: u32, payload: Bytes },
}

const NOTICE_WARNING: u32 = 1;
const NOTICE_SESSION_VARIABLE_CHANGED: u32 = 2;
const NOTICE_SESSION_STATE_CHANGED: u32 = 3;

// =============================================================================
// Server Message
// =============================================================================

/// A server message
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    Ok { message: Option<String> },
    Error(ErrorFrame),
    Capabilities(Vec<(String, Any)>),
    AuthenticateContinue { auth_data: Bytes },
    AuthenticateOk { auth_data: Option<Bytes> },
    Notice { scope: NoticeScope, notice: Notice },
    ColumnMetaData(ColumnMetaDataFrame),
    /// Encoded field values, one per column
    Row(Vec<Bytes>),
    FetchDone,
    FetchSuspended,
    FetchDoneMoreResultsets,
    FetchDoneMoreOutParams,
    StmtExecuteOk,
}

impl ServerMessage {
    /// Local notice
    pub fn notice(notice: Notice) -> Self {
        ServerMessage::Notice {
            scope: NoticeScope::Local,
            notice,
        }
    }

    /// Get the message type
    pub fn message_type(&self) -> ServerMessageType {
        match self {
            ServerMessage::Ok { .. } => ServerMessageType::Ok,
            ServerMessage::Error(_) => ServerMessageType::Error,
            ServerMessage::Capabilities(_) => ServerMessageType::Capabilities,
            ServerMessage::AuthenticateContinue { .. } => ServerMessageType::AuthenticateContinue,
            ServerMessage::AuthenticateOk { .. } => ServerMessageType::AuthenticateOk,
            ServerMessage::Notice { .. } => ServerMessageType::Notice,
            ServerMessage::ColumnMetaData(_) => ServerMessageType::ColumnMetaData,
            ServerMessage::Row(_) => ServerMessageType::Row,
            ServerMessage::FetchDone => ServerMessageType::FetchDone,
            ServerMessage::FetchSuspended => ServerMessageType::FetchSuspended,
            ServerMessage::FetchDoneMoreResultsets => ServerMessageType::FetchDoneMoreResultsets,
            ServerMessage::FetchDoneMoreOutParams => ServerMessageType::FetchDoneMoreOutParams,
            ServerMessage::StmtExecuteOk => ServerMessageType::StmtExecuteOk,
        }
    }

    /// Encode the protobuf payload (without frame header)
    pub fn encode_payload(&self, buf: &mut BytesMut) {
        match self {
            ServerMessage::Ok { message } => {
                if let Some(message) = message {
                    put_string_field(buf, 1, message);
                }
            }
            ServerMessage::Error(error) => {
                put_uint_field(buf, 1, u64::from(error.fatal));
                put_uint_field(buf, 2, u64::from(error.code));
                put_string_field(buf, 3, &error.message);
                put_string_field(buf, 4, &error.sql_state);
            }
            ServerMessage::Capabilities(capabilities) => encode_capabilities(buf, capabilities),
            ServerMessage::AuthenticateContinue { auth_data } => put_bytes_field(buf, 1, auth_data),
            ServerMessage::AuthenticateOk { auth_data } => {
                if let Some(data) = auth_data {
                    put_bytes_field(buf, 1, data);
                }
            }
            ServerMessage::Notice { scope, notice } => encode_notice(buf, *scope, notice),
            ServerMessage::ColumnMetaData(column) => encode_column(buf, column),
            ServerMessage::Row(fields) => {
                for field in fields {
                    put_bytes_field(buf, 1, field);
                }
            }
            ServerMessage::FetchDone
            | ServerMessage::FetchSuspended
            | ServerMessage::FetchDoneMoreResultsets
            | ServerMessage::FetchDoneMoreOutParams
            | ServerMessage::StmtExecuteOk => {}
        }
    }

    /// Decode a server message from its type and payload
    pub fn decode(message_type: u8, payload: Bytes) -> Result<Self> {
        let kind = ServerMessageType::from_u8(message_type).ok_or_else(|| {
            XError::decode(format!("Unknown server message type: 0x{:02x}", message_type))
        })?;

        match kind {
            ServerMessageType::Ok => {
                let mut reader = FieldReader::new(payload);
                let mut message = None;
                while let Some((field, value)) = reader.next_field()? {
                    if field == 1 {
                        message = Some(value.into_string()?);
                    }
                }
                Ok(ServerMessage::Ok { message })
            }
            ServerMessageType::Error => decode_error(payload).map(ServerMessage::Error),
            ServerMessageType::Capabilities => {
                decode_capabilities(payload).map(ServerMessage::Capabilities)
            }
            ServerMessageType::AuthenticateContinue => {
                let mut reader = FieldReader::new(payload);
                let mut auth_data = Bytes::new();
                while let Some((field, value)) = reader.next_field()? {
                    if field == 1 {
                        auth_data = value.into_bytes()?;
                    }
                }
                Ok(ServerMessage::AuthenticateContinue { auth_data })
            }
            ServerMessageType::AuthenticateOk => {
                let mut reader = FieldReader::new(payload);
                let mut auth_data = None;
                while let Some((field, value)) = reader.next_field()? {
                    if field == 1 {
                        auth_data = Some(value.into_bytes()?);
                    }
                }
                Ok(ServerMessage::AuthenticateOk { auth_data })
            }
            ServerMessageType::Notice => decode_notice(payload),
            ServerMessageType::ColumnMetaData => {
                decode_column(payload).map(ServerMessage::ColumnMetaData)
            }
            ServerMessageType::Row => {
                let mut reader = FieldReader::new(payload);
                let mut fields = Vec::new();
                while let Some((field, value)) = reader.next_field()? {
                    if field == 1 {
                        fields.push(value.into_bytes()?);
                    }
                }
                Ok(ServerMessage::Row(fields))
            }
            ServerMessageType::FetchDone => Ok(ServerMessage::FetchDone),
            ServerMessageType::FetchSuspended => Ok(ServerMessage::FetchSuspended),
            ServerMessageType::FetchDoneMoreResultsets => Ok(ServerMessage::FetchDoneMoreResultsets),
            ServerMessageType::FetchDoneMoreOutParams => Ok(ServerMessage::FetchDoneMoreOutParams),
            ServerMessageType::StmtExecuteOk => Ok(ServerMessage::StmtExecuteOk),
        }
    }
}

// =============================================================================
// Payload Codecs
// =============================================================================

fn decode_error(payload: Bytes) -> Result<ErrorFrame> {
    let mut reader = FieldReader::new(payload);
    let mut error = ErrorFrame {
        fatal: false,
        code: 0,
        sql_state: String::new(),
        message: String::new(),
    };
    while let Some((field, value)) = reader.next_field()? {
        match field {
            1 => error.fatal = value.as_u64()? == 1,
            2 => error.code = value.as_u32()?,
            3 => error.message = value.into_string()?,
            4 => error.sql_state = value.into_string()?,
            _ => {}
        }
    }
    Ok(error)
}

fn encode_column(buf: &mut BytesMut, column: &ColumnMetaDataFrame) {
    put_uint_field(buf, 1, u64::from(column.field_type));
    put_bytes_field(buf, 2, column.name.as_bytes());
    put_bytes_field(buf, 3, column.original_name.as_bytes());
    put_bytes_field(buf, 4, column.table.as_bytes());
    put_bytes_field(buf, 5, column.original_table.as_bytes());
    put_bytes_field(buf, 6, column.schema.as_bytes());
    put_bytes_field(buf, 7, column.catalog.as_bytes());
    put_uint_field(buf, 8, column.collation);
    put_uint_field(buf, 9, u64::from(column.fractional_digits));
    put_uint_field(buf, 10, u64::from(column.length));
    put_uint_field(buf, 11, u64::from(column.flags));
    if column.content_type != 0 {
        put_uint_field(buf, 12, u64::from(column.content_type));
    }
}

fn decode_column(payload: Bytes) -> Result<ColumnMetaDataFrame> {
    let mut reader = FieldReader::new(payload);
    let mut column = ColumnMetaDataFrame::default();
    while let Some((field, value)) = reader.next_field()? {
        match field {
            1 => column.field_type = value.as_u32()?,
            2 => column.name = value.into_string()?,
            3 => column.original_name = value.into_string()?,
            4 => column.table = value.into_string()?,
            5 => column.original_table = value.into_string()?,
            6 => column.schema = value.into_string()?,
            7 => column.catalog = value.into_string()?,
            8 => column.collation = value.as_u64()?,
            9 => column.fractional_digits = value.as_u32()?,
            10 => column.length = value.as_u32()?,
            11 => column.flags = value.as_u32()?,
            12 => column.content_type = value.as_u32()?,
            _ => {}
        }
    }
    if column.field_type == 0 {
        return Err(XError::decode(format!(
            "Column '{}' metadata has no type",
            column.name
        )));
    }
    Ok(column)
}

fn encode_notice(buf: &mut BytesMut, scope: NoticeScope, notice: &Notice) {
    let mut payload = BytesMut::new();
    let notice_type = match notice {
        Notice::Warning(warning) => {
            put_uint_field(&mut payload, 1, warning.level.as_u64());
            put_uint_field(&mut payload, 2, u64::from(warning.code));
            put_string_field(&mut payload, 3, &warning.message);
            NOTICE_WARNING
        }
        Notice::SessionVariableChanged { param, value } => {
            put_string_field(&mut payload, 1, param);
            if let Some(value) = value {
                put_message_field(&mut payload, 2, |inner| value.encode(inner));
            }
            NOTICE_SESSION_VARIABLE_CHANGED
        }
        Notice::SessionStateChanged(change) => {
            let (param, value) = change.to_parts();
            put_uint_field(&mut payload, 1, u64::from(param));
            if let Some(value) = value {
                put_message_field(&mut payload, 2, |inner| value.encode(inner));
            }
            NOTICE_SESSION_STATE_CHANGED
        }
        Notice::Unknown {
            notice_type,
            payload: raw,
        } => {
            payload.extend_from_slice(raw);
            *notice_type
        }
    };

    put_uint_field(buf, 1, u64::from(notice_type));
    let scope = match scope {
        NoticeScope::Global => 1,
        NoticeScope::Local => 2,
    };
    put_uint_field(buf, 2, scope);
    put_bytes_field(buf, 3, &payload);
}

fn decode_notice(payload: Bytes) -> Result<ServerMessage> {
    let mut reader = FieldReader::new(payload);
    let mut notice_type = 0u32;
    let mut scope = NoticeScope::Global;
    let mut body = Bytes::new();
    while let Some((field, value)) = reader.next_field()? {
        match field {
            1 => notice_type = value.as_u32()?,
            2 => {
                scope = if value.as_u64()? == 2 {
                    NoticeScope::Local
                } else {
                    NoticeScope::Global
                }
            }
            3 => body = value.into_bytes()?,
            _ => {}
        }
    }

    let notice = match notice_type {
        NOTICE_WARNING => {
            let mut reader = FieldReader::new(body);
            let mut warning = Warning {
                level: WarningLevel::Warning,
                code: 0,
                message: String::new(),
            };
            while let Some((field, value)) = reader.next_field()? {
                match field {
                    1 => warning.level = WarningLevel::from_u64(value.as_u64()?),
                    2 => warning.code = value.as_u32()?,
                    3 => warning.message = value.into_string()?,
                    _ => {}
                }
            }
            Notice::Warning(warning)
        }
        NOTICE_SESSION_VARIABLE_CHANGED => {
            let mut reader = FieldReader::new(body);
            let mut param = String::new();
            let mut scalar = None;
            while let Some((field, value)) = reader.next_field()? {
                match field {
                    1 => param = value.into_string()?,
                    2 => scalar = Some(Scalar::decode(value.into_bytes()?)?),
                    _ => {}
                }
            }
            Notice::SessionVariableChanged {
                param,
                value: scalar,
            }
        }
        NOTICE_SESSION_STATE_CHANGED => {
            let mut reader = FieldReader::new(body);
            let mut param = 0u32;
            let mut scalar = None;
            while let Some((field, value)) = reader.next_field()? {
                match field {
                    1 => param = value.as_u32()?,
                    // Newer servers repeat the value; the first one is enough
                    2 if scalar.is_none() => scalar = Some(Scalar::decode(value.into_bytes()?)?),
                    _ => {}
                }
            }
            Notice::SessionStateChanged(StateChange::from_parts(param, scalar))
        }
        other => Notice::Unknown {
            notice_type: other,
            payload: body,
        },
    };

    Ok(ServerMessage::Notice { scope, notice })
}
