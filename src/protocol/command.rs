//! Client message definitions
//!
//! Represents the messages a client sends to the server.

use bytes::{Bytes, BytesMut};

use crate::error::{Result, XError};

use super::datatypes::{Any, Scalar};
use super::wire::{
    put_bool_field, put_bytes_field, put_message_field, put_string_field, FieldReader,
};

/// Client message types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ClientMessageType {
    CapabilitiesGet = 1,
    CapabilitiesSet = 2,
    ConnectionClose = 3,
    AuthenticateStart = 4,
    AuthenticateContinue = 5,
    SessionReset = 6,
    SessionClose = 7,
    StmtExecute = 12,
}

impl ClientMessageType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(ClientMessageType::CapabilitiesGet),
            2 => Some(ClientMessageType::CapabilitiesSet),
            3 => Some(ClientMessageType::ConnectionClose),
            4 => Some(ClientMessageType::AuthenticateStart),
            5 => Some(ClientMessageType::AuthenticateContinue),
            6 => Some(ClientMessageType::SessionReset),
            7 => Some(ClientMessageType::SessionClose),
            12 => Some(ClientMessageType::StmtExecute),
            _ => None,
        }
    }
}

/// A client message
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    /// Ask for the server capabilities
    CapabilitiesGet,

    /// Change connection capabilities (e.g. `tls`)
    CapabilitiesSet(Vec<(String, Any)>),

    /// Close the connection
    ConnectionClose,

    /// Start authentication with a mechanism
    AuthenticateStart {
        mech_name: String,
        auth_data: Option<Vec<u8>>,
        initial_response: Option<Vec<u8>>,
    },

    /// Answer an authentication challenge
    AuthenticateContinue { auth_data: Vec<u8> },

    /// Reset the session state
    SessionReset,

    /// Close the session, keeping the connection
    SessionClose,

    /// Execute a statement in a namespace (`sql` by default)
    StmtExecute {
        namespace: String,
        stmt: String,
        args: Vec<Any>,
        compact_metadata: bool,
    },
}

impl ClientMessage {
    /// SQL statement with positional arguments
    pub fn sql(stmt: impl Into<String>, args: Vec<Scalar>) -> Self {
        ClientMessage::StmtExecute {
            namespace: "sql".to_string(),
            stmt: stmt.into(),
            args: args.into_iter().map(Any::Scalar).collect(),
            compact_metadata: false,
        }
    }

    /// Get the message type
    pub fn message_type(&self) -> ClientMessageType {
        match self {
            ClientMessage::CapabilitiesGet => ClientMessageType::CapabilitiesGet,
            ClientMessage::CapabilitiesSet(_) => ClientMessageType::CapabilitiesSet,
            ClientMessage::ConnectionClose => ClientMessageType::ConnectionClose,
            ClientMessage::AuthenticateStart { .. } => ClientMessageType::AuthenticateStart,
            ClientMessage::AuthenticateContinue { .. } => ClientMessageType::AuthenticateContinue,
            ClientMessage::SessionReset => ClientMessageType::SessionReset,
            ClientMessage::SessionClose => ClientMessageType::SessionClose,
            ClientMessage::StmtExecute { .. } => ClientMessageType::StmtExecute,
        }
    }

    /// Encode the protobuf payload (without frame header)
    pub fn encode_payload(&self, buf: &mut BytesMut) {
        match self {
            ClientMessage::CapabilitiesGet
            | ClientMessage::ConnectionClose
            | ClientMessage::SessionReset
            | ClientMessage::SessionClose => {}
            ClientMessage::CapabilitiesSet(capabilities) => {
                put_message_field(buf, 1, |caps| encode_capabilities(caps, capabilities));
            }
            ClientMessage::AuthenticateStart {
                mech_name,
                auth_data,
                initial_response,
            } => {
                put_string_field(buf, 1, mech_name);
                if let Some(data) = auth_data {
                    put_bytes_field(buf, 2, data);
                }
                if let Some(response) = initial_response {
                    put_bytes_field(buf, 3, response);
                }
            }
            ClientMessage::AuthenticateContinue { auth_data } => {
                put_bytes_field(buf, 1, auth_data);
            }
            ClientMessage::StmtExecute {
                namespace,
                stmt,
                args,
                compact_metadata,
            } => {
                put_bytes_field(buf, 1, stmt.as_bytes());
                for arg in args {
                    put_message_field(buf, 2, |inner| arg.encode(inner));
                }
                put_string_field(buf, 3, namespace);
                if *compact_metadata {
                    put_bool_field(buf, 4, true);
                }
            }
        }
    }

    /// Decode a client message from its type and payload
    pub fn decode(message_type: u8, payload: Bytes) -> Result<Self> {
        let kind = ClientMessageType::from_u8(message_type).ok_or_else(|| {
            XError::decode(format!("Unknown client message type: 0x{:02x}", message_type))
        })?;
        let mut reader = FieldReader::new(payload);

        match kind {
            ClientMessageType::CapabilitiesGet => Ok(ClientMessage::CapabilitiesGet),
            ClientMessageType::ConnectionClose => Ok(ClientMessage::ConnectionClose),
            ClientMessageType::SessionReset => Ok(ClientMessage::SessionReset),
            ClientMessageType::SessionClose => Ok(ClientMessage::SessionClose),
            ClientMessageType::CapabilitiesSet => {
                let mut capabilities = Vec::new();
                while let Some((field, value)) = reader.next_field()? {
                    if field == 1 {
                        capabilities = decode_capabilities(value.into_bytes()?)?;
                    }
                }
                Ok(ClientMessage::CapabilitiesSet(capabilities))
            }
            ClientMessageType::AuthenticateStart => {
                let mut mech_name = String::new();
                let mut auth_data = None;
                let mut initial_response = None;
                while let Some((field, value)) = reader.next_field()? {
                    match field {
                        1 => mech_name = value.into_string()?,
                        2 => auth_data = Some(value.into_bytes()?.to_vec()),
                        3 => initial_response = Some(value.into_bytes()?.to_vec()),
                        _ => {}
                    }
                }
                Ok(ClientMessage::AuthenticateStart {
                    mech_name,
                    auth_data,
                    initial_response,
                })
            }
            ClientMessageType::AuthenticateContinue => {
                let mut auth_data = Vec::new();
                while let Some((field, value)) = reader.next_field()? {
                    if field == 1 {
                        auth_data = value.into_bytes()?.to_vec();
                    }
                }
                Ok(ClientMessage::AuthenticateContinue { auth_data })
            }
            ClientMessageType::StmtExecute => {
                let mut namespace = "sql".to_string();
                let mut stmt = String::new();
                let mut args = Vec::new();
                let mut compact_metadata = false;
                while let Some((field, value)) = reader.next_field()? {
                    match field {
                        1 => stmt = value.into_string()?,
                        2 => args.push(Any::decode(value.into_bytes()?)?),
                        3 => namespace = value.into_string()?,
                        4 => compact_metadata = value.as_bool()?,
                        _ => {}
                    }
                }
                Ok(ClientMessage::StmtExecute {
                    namespace,
                    stmt,
                    args,
                    compact_metadata,
                })
            }
        }
    }
}

/// Decode a `Capabilities` message into name/value pairs
pub(crate) fn decode_capabilities(payload: Bytes) -> Result<Vec<(String, Any)>> {
    let mut reader = FieldReader::new(payload);
    let mut capabilities = Vec::new();
    while let Some((field, value)) = reader.next_field()? {
        if field != 1 {
            continue;
        }
        let mut cap = FieldReader::new(value.into_bytes()?);
        let mut name = String::new();
        let mut any = None;
        while let Some((f, v)) = cap.next_field()? {
            match f {
                1 => name = v.into_string()?,
                2 => any = Some(Any::decode(v.into_bytes()?)?),
                _ => {}
            }
        }
        let any =
            any.ok_or_else(|| XError::decode(format!("Capability '{}' has no value", name)))?;
        capabilities.push((name, any));
    }
    Ok(capabilities)
}

/// Encode a `Capabilities` message
pub(crate) fn encode_capabilities(buf: &mut BytesMut, capabilities: &[(String, Any)]) {
    for (name, value) in capabilities {
        put_message_field(buf, 1, |cap| {
            put_string_field(cap, 1, name);
            put_message_field(cap, 2, |inner| value.encode(inner));
        });
    }
}
