//! Message Tests
//!
//! Decoding of server messages from hand-built payloads and encoding of
//! client messages.

use bytes::{Bytes, BytesMut};
use xclient::protocol::wire::{put_string_field, put_uint_field, FieldReader, FieldValue};
use xclient::protocol::{
    decode_client_message, decode_server_message, encode_client_message, encode_server_message,
    Any, ClientMessage, ColumnMetaDataFrame, ErrorFrame, Frame, FrameDecoder, Notice, NoticeScope,
    Scalar, ServerMessage, StateChange, Warning, WarningLevel,
};

// =============================================================================
// Helper Functions
// =============================================================================

fn server(message_type: u8, payload: &[u8]) -> ServerMessage {
    decode_server_message(Frame::new(message_type, payload.to_vec())).unwrap()
}

fn reencode(message: &ServerMessage) -> ServerMessage {
    let mut decoder = FrameDecoder::default();
    decoder.extend(&encode_server_message(message));
    decode_server_message(decoder.next_frame().unwrap().unwrap()).unwrap()
}

// =============================================================================
// Notice Tests
// =============================================================================

#[test]
fn test_rows_affected_notice_bytes() {
    // SessionStateChanged { param: ROWS_AFFECTED, value: UInt(5) }
    let body = [0x08, 0x04, 0x12, 0x04, 0x08, 0x02, 0x18, 0x05];
    let mut payload = vec![0x08, 0x03, 0x10, 0x02, 0x1a, body.len() as u8];
    payload.extend_from_slice(&body);

    assert_eq!(
        server(11, &payload),
        ServerMessage::Notice {
            scope: NoticeScope::Local,
            notice: Notice::SessionStateChanged(StateChange::RowsAffected(5)),
        }
    );
}

#[test]
fn test_warning_notice_bytes() {
    let mut body = BytesMut::new();
    put_uint_field(&mut body, 1, 1);
    put_uint_field(&mut body, 2, 1287);
    put_string_field(&mut body, 3, "deprecated");

    let mut payload = vec![0x08, 0x01, 0x1a, body.len() as u8];
    payload.extend_from_slice(&body);

    // No scope field means global
    assert_eq!(
        server(11, &payload),
        ServerMessage::Notice {
            scope: NoticeScope::Global,
            notice: Notice::Warning(Warning {
                level: WarningLevel::Note,
                code: 1287,
                message: "deprecated".to_string(),
            }),
        }
    );
}

#[test]
fn test_state_changes_survive_encoding() {
    let changes = vec![
        StateChange::CurrentSchema("test".to_string()),
        StateChange::AccountExpired,
        StateChange::GeneratedInsertId(77),
        StateChange::RowsFound(3),
        StateChange::RowsMatched(2),
        StateChange::TrxCommitted,
        StateChange::TrxRolledBack,
        StateChange::ProducedMessage("Rows matched: 2".to_string()),
        StateChange::ClientIdAssigned(42),
        StateChange::Other {
            param: 8,
            value: Some(Scalar::SInt(-1)),
        },
    ];
    for change in changes {
        let message = ServerMessage::notice(Notice::SessionStateChanged(change));
        assert_eq!(reencode(&message), message);
    }
}

#[test]
fn test_session_variable_notice() {
    let message = ServerMessage::notice(Notice::SessionVariableChanged {
        param: "autocommit".to_string(),
        value: Some(Scalar::Bool(true)),
    });
    assert_eq!(reencode(&message), message);
}

#[test]
fn test_unknown_notice_is_kept() {
    let payload = [0x08, 0x05, 0x1a, 0x02, 0xde, 0xad];
    match server(11, &payload) {
        ServerMessage::Notice {
            notice: Notice::Unknown {
                notice_type,
                payload,
            },
            ..
        } => {
            assert_eq!(notice_type, 5);
            assert_eq!(&payload[..], &[0xde, 0xad]);
        }
        other => panic!("Expected unknown notice, got {:?}", other),
    }
}

// =============================================================================
// Error and Metadata Tests
// =============================================================================

#[test]
fn test_error_bytes() {
    let mut payload = BytesMut::new();
    put_uint_field(&mut payload, 2, 1064);
    put_string_field(&mut payload, 3, "You have an error in your SQL syntax");
    put_string_field(&mut payload, 4, "42000");

    assert_eq!(
        server(1, &payload),
        ServerMessage::Error(ErrorFrame {
            fatal: false,
            code: 1064,
            sql_state: "42000".to_string(),
            message: "You have an error in your SQL syntax".to_string(),
        })
    );
}

#[test]
fn test_column_metadata_survives_encoding() {
    let column = ServerMessage::ColumnMetaData(ColumnMetaDataFrame {
        field_type: 7,
        name: "alphacol".to_string(),
        original_name: "alphacol".to_string(),
        table: "a".to_string(),
        original_table: "alpha".to_string(),
        schema: "test".to_string(),
        catalog: "def".to_string(),
        collation: 255,
        fractional_digits: 0,
        length: 180,
        flags: 16,
        content_type: 0,
    });
    assert_eq!(reencode(&column), column);
}

#[test]
fn test_column_without_type_is_error() {
    let mut payload = BytesMut::new();
    put_string_field(&mut payload, 2, "nameless");
    let err = decode_server_message(Frame::new(12, payload.freeze())).unwrap_err();
    assert!(err.is_decode_error());
}

#[test]
fn test_truncated_payload_is_error() {
    // Length-delimited field claiming 9 bytes, only 2 present
    let err = decode_server_message(Frame::new(0, vec![0x0a, 0x09, b'o', b'k'])).unwrap_err();
    assert!(err.is_decode_error());
}

// =============================================================================
// Client Message Tests
// =============================================================================

#[test]
fn test_stmt_execute_fields() {
    let message = ClientMessage::sql(
        "SELECT ?",
        vec![Scalar::String("x".to_string())],
    );
    let bytes = encode_client_message(&message);
    assert_eq!(bytes[4], 12);

    let mut reader = FieldReader::new(bytes.slice(5..));
    let mut fields = Vec::new();
    while let Some((field, value)) = reader.next_field().unwrap() {
        fields.push((field, value));
    }
    assert_eq!(fields.len(), 3);
    assert!(matches!(&fields[0], (1, FieldValue::Bytes(b)) if &b[..] == b"SELECT ?"));
    assert_eq!(fields[1].0, 2);
    assert!(matches!(&fields[2], (3, FieldValue::Bytes(b)) if &b[..] == b"sql"));
}

#[test]
fn test_client_messages_survive_encoding() {
    let messages = vec![
        ClientMessage::CapabilitiesGet,
        ClientMessage::CapabilitiesSet(vec![(
            "tls".to_string(),
            Any::Scalar(Scalar::Bool(true)),
        )]),
        ClientMessage::AuthenticateStart {
            mech_name: "MYSQL41".to_string(),
            auth_data: None,
            initial_response: None,
        },
        ClientMessage::AuthenticateContinue {
            auth_data: b"\0root\0*ABC".to_vec(),
        },
        ClientMessage::sql(
            "INSERT INTO t VALUES (?, ?, ?, ?)",
            vec![
                Scalar::Null,
                Scalar::SInt(-3),
                Scalar::UInt(3),
                Scalar::Double(0.5),
            ],
        ),
        ClientMessage::SessionReset,
        ClientMessage::SessionClose,
        ClientMessage::ConnectionClose,
    ];

    for message in messages {
        let bytes = encode_client_message(&message);
        let frame = Frame::new(bytes[4], Bytes::copy_from_slice(&bytes[5..]));
        assert_eq!(decode_client_message(frame).unwrap(), message);
    }
}

#[test]
fn test_capabilities_with_nested_values() {
    let message = ServerMessage::Capabilities(vec![
        (
            "authentication.mechanisms".to_string(),
            Any::Array(vec![
                Any::Scalar(Scalar::String("MYSQL41".to_string())),
                Any::Scalar(Scalar::String("PLAIN".to_string())),
            ]),
        ),
        (
            "client.interactive".to_string(),
            Any::Object(vec![(
                "enabled".to_string(),
                Any::Scalar(Scalar::Bool(false)),
            )]),
        ),
    ]);
    assert_eq!(reencode(&message), message);
}
