//! Protocol Module
//!
//! X Protocol framing and the protobuf messages the client speaks.
//!
//! ## Frame Format
//! ```text
//! ┌──────────────┬──────────┬─────────────────────────────┐
//! │ Len (4, LE)  │ Type (1) │    Protobuf payload         │
//! └──────────────┴──────────┴─────────────────────────────┘
//! ```
//!
//! ### Client Messages
//! - 0x01: CapabilitiesGet
//! - 0x02: CapabilitiesSet
//! - 0x03: ConnectionClose
//! - 0x04: AuthenticateStart
//! - 0x05: AuthenticateContinue
//! - 0x06: SessionReset
//! - 0x07: SessionClose
//! - 0x0c: StmtExecute
//!
//! ### Server Messages
//! - 0x00: Ok, 0x01: Error
//! - 0x02: Capabilities
//! - 0x03: AuthenticateContinue, 0x04: AuthenticateOk
//! - 0x0b: Notice
//! - 0x0c: ColumnMetaData, 0x0d: Row
//! - 0x0e: FetchDone, 0x0f: FetchSuspended
//! - 0x10: FetchDoneMoreResultsets, 0x12: FetchDoneMoreOutParams
//! - 0x11: StmtExecuteOk

mod codec;
mod command;
mod datatypes;
mod response;
pub mod wire;

pub use codec::{
    decode_client_message, decode_frame, decode_server_message, encode_client_message,
    encode_frame, encode_server_message, read_frame, write_client_message,
    write_server_message, Frame, FrameDecoder, HEADER_SIZE, MAX_FRAME_SIZE,
};
pub use command::{ClientMessage, ClientMessageType};
pub use datatypes::{Any, Scalar};
pub use response::{
    ColumnMetaDataFrame, ErrorFrame, Notice, NoticeScope, ServerMessage, ServerMessageType,
    StateChange, Warning, WarningLevel,
};
