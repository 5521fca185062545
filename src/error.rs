//! Error types for xclient
//!
//! Provides a unified error type for all operations.
//!
//! ## Taxonomy
//! - `Argument`: an operand was rejected while building a request. Never
//!   reaches the wire.
//! - `Connection`: endpoint malformed, transport refused or authentication
//!   rejected. Terminal for the session.
//! - `ProtocolState`: the caller broke the one-statement-in-flight rule or
//!   used a result set after it finished.
//! - `Io`: transport failure while a request or fetch was pending. The owning
//!   session becomes `Failed`.
//! - `Decode`: the server sent bytes that do not parse. The owning session
//!   becomes `Failed`.
//! - `Server`: the server rejected a statement. The session stays usable.

use thiserror::Error;

/// Result type alias using XError
pub type Result<T> = std::result::Result<T, XError>;

/// Unified error type for xclient operations
#[derive(Debug, Error)]
pub enum XError {
    // -------------------------------------------------------------------------
    // Request Construction Errors
    // -------------------------------------------------------------------------
    #[error("Argument error: {0}")]
    Argument(String),

    // -------------------------------------------------------------------------
    // Connection Errors
    // -------------------------------------------------------------------------
    #[error("Connection error: {0}")]
    Connection(String),

    // -------------------------------------------------------------------------
    // State Machine Errors
    // -------------------------------------------------------------------------
    #[error("Protocol state error: {0}")]
    ProtocolState(String),

    // -------------------------------------------------------------------------
    // Transport Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Wire Errors
    // -------------------------------------------------------------------------
    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Server error {code} ({sql_state}): {message}")]
    Server {
        code: u32,
        sql_state: String,
        message: String,
    },

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl XError {
    /// Shorthand for an argument error
    pub fn argument(message: impl Into<String>) -> Self {
        XError::Argument(message.into())
    }

    /// Shorthand for a decode error
    pub fn decode(message: impl Into<String>) -> Self {
        XError::Decode(message.into())
    }

    pub fn is_argument_error(&self) -> bool {
        matches!(self, XError::Argument(_))
    }

    pub fn is_connection_error(&self) -> bool {
        matches!(self, XError::Connection(_))
    }

    pub fn is_protocol_state_error(&self) -> bool {
        matches!(self, XError::ProtocolState(_))
    }

    pub fn is_io_error(&self) -> bool {
        matches!(self, XError::Io(_))
    }

    pub fn is_decode_error(&self) -> bool {
        matches!(self, XError::Decode(_))
    }

    pub fn is_server_error(&self) -> bool {
        matches!(self, XError::Server { .. })
    }

    /// Whether this error leaves the stream position unrecoverable
    ///
    /// Server errors terminate only the statement; argument and state errors
    /// never touch the stream.
    pub fn is_fatal_to_session(&self) -> bool {
        matches!(
            self,
            XError::Io(_) | XError::Decode(_) | XError::Connection(_)
        )
    }
}
