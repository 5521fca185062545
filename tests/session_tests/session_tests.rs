//! Tests for Session
//!
//! These tests verify:
//! - Open: capabilities, authentication, connection id
//! - Open failures: bad endpoint, refused connection, rejected credentials
//! - One statement in flight at a time
//! - Server errors versus fatal transport errors
//! - Cancellation and read timeouts
//! - Graceful, idempotent close

#[path = "../common/mod.rs"]
mod common;

use std::io::ErrorKind;
use std::net::TcpListener;
use std::thread;
use std::time::{Duration, Instant};

use common::{
    alpha_select, dml_ok, reactor, server_error, MockServer, Reply, Script, CONNECTION_ID, SALT,
};
use xclient::crud::{CollectionFind, Statement, TableInsert};
use xclient::protocol::{ClientMessage, ColumnMetaDataFrame, Scalar, ServerMessage};
use xclient::session::mysql41_scramble;
use xclient::{AuthMethod, DynamicValue, Session, SessionConfig, SessionState, SslMode, XError};

// =============================================================================
// Helper Functions
// =============================================================================

fn open(server: &MockServer) -> Session {
    let mut session = Session::new(server.config(), reactor());
    session.open().unwrap();
    session
}

fn statements(received: &[ClientMessage]) -> Vec<(String, Vec<xclient::protocol::Any>)> {
    received
        .iter()
        .filter_map(|m| match m {
            ClientMessage::StmtExecute { stmt, args, .. } => Some((stmt.clone(), args.clone())),
            _ => None,
        })
        .collect()
}

fn io_kind(error: &XError) -> Option<ErrorKind> {
    match error {
        XError::Io(e) => Some(e.kind()),
        _ => None,
    }
}

// =============================================================================
// Open Tests
// =============================================================================

#[test]
fn test_new_session_is_closed() {
    let session = Session::new(SessionConfig::default(), reactor());
    assert_eq!(session.state(), SessionState::Closed);
    assert!(!session.is_open());
    assert_eq!(session.connection_id(), None);
}

#[test]
fn test_open_reaches_ready() {
    let server = MockServer::start(Script::default());
    let session = open(&server);

    assert_eq!(session.state(), SessionState::Ready);
    assert!(session.is_open());
    assert_eq!(session.connection_id(), Some(CONNECTION_ID));
    assert!(session
        .server_capabilities()
        .iter()
        .any(|(name, _)| name == "authentication.mechanisms"));

    session.close().unwrap();
    server.finish();
}

#[test]
fn test_open_sends_mysql41_scramble() {
    let server = MockServer::start(Script::default());
    let session = open(&server);
    session.close().unwrap();

    let received = server.finish();
    assert_eq!(received[0], ClientMessage::CapabilitiesGet);
    match &received[1] {
        ClientMessage::AuthenticateStart { mech_name, .. } => assert_eq!(mech_name, "MYSQL41"),
        other => panic!("Expected AuthenticateStart, got {:?}", other),
    }

    let hex: String = mysql41_scramble("secret", SALT)
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect();
    let expected = format!("\0root\0*{}", hex).into_bytes();
    match &received[2] {
        ClientMessage::AuthenticateContinue { auth_data } => assert_eq!(auth_data, &expected),
        other => panic!("Expected AuthenticateContinue, got {:?}", other),
    }
}

#[test]
fn test_open_with_plain_auth() {
    let server = MockServer::start(Script::default());
    let config = SessionConfig {
        auth_method: AuthMethod::Plain,
        schema: Some("test".to_string()),
        ..server.config()
    };
    let mut session = Session::new(config, reactor());
    session.open().unwrap();
    assert_eq!(session.current_schema().as_deref(), Some("test"));
    session.close().unwrap();

    let received = server.finish();
    match &received[1] {
        ClientMessage::AuthenticateStart {
            mech_name,
            auth_data,
            ..
        } => {
            assert_eq!(mech_name, "PLAIN");
            assert_eq!(auth_data.as_deref(), Some(&b"test\0root\0secret"[..]));
        }
        other => panic!("Expected AuthenticateStart, got {:?}", other),
    }
}

#[test]
fn test_open_rejected_credentials() {
    let server = MockServer::start(Script {
        reject_auth: true,
        ..Script::default()
    });
    let mut session = Session::new(server.config(), reactor());

    let err = session.open().unwrap_err();
    assert!(err.is_connection_error());
    assert!(err.to_string().contains("Invalid user or password"));
    assert_eq!(session.state(), SessionState::Failed);

    drop(session);
    server.finish();
}

#[test]
fn test_open_malformed_endpoint() {
    let config = SessionConfig::builder().host("127.0.0.1").port(0).build();
    let mut session = Session::new(config, reactor());

    let err = session.open().unwrap_err();
    assert!(err.is_connection_error());
    assert_eq!(session.state(), SessionState::Failed);
}

#[test]
fn test_open_refused_connection() {
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let config = SessionConfig::builder()
        .host("127.0.0.1")
        .port(port)
        .connect_timeout_ms(1_000)
        .build();
    let mut session = Session::new(config, reactor());

    let err = session.open().unwrap_err();
    assert!(err.is_connection_error());
    assert_eq!(session.state(), SessionState::Failed);
}

#[test]
fn test_reopen_is_protocol_state_error() {
    let server = MockServer::start(Script::default());
    let mut session = open(&server);

    let err = session.open().unwrap_err();
    assert!(err.is_protocol_state_error());
    assert_eq!(session.state(), SessionState::Ready);

    session.close().unwrap();
    server.finish();
}

#[test]
fn test_open_failed_session_is_protocol_state_error() {
    let config = SessionConfig::builder().host("").build();
    let mut session = Session::new(config, reactor());
    assert!(session.open().unwrap_err().is_connection_error());

    assert!(session.open().unwrap_err().is_protocol_state_error());
}

#[test]
fn test_ssl_required_fails_open() {
    let server = MockServer::start(Script::default());
    let config = SessionConfig {
        ssl_mode: SslMode::Required,
        ..server.config()
    };
    let mut session = Session::new(config, reactor());

    let err = session.open().unwrap_err();
    assert!(err.is_connection_error());
    assert!(err.to_string().contains("TLS"));
    assert_eq!(session.state(), SessionState::Failed);

    drop(session);
    server.finish();
}

#[test]
fn test_ssl_preferred_continues_unencrypted() {
    let server = MockServer::start(Script::default());
    let config = SessionConfig {
        ssl_mode: SslMode::Preferred,
        ..server.config()
    };
    let mut session = Session::new(config, reactor());
    session.open().unwrap();
    assert!(session.is_open());

    session.close().unwrap();
    server.finish();
}

#[test]
fn test_connect_with_private_reactor() {
    let server = MockServer::start(Script::default());
    let session = Session::connect(server.config()).unwrap();
    assert_eq!(session.state(), SessionState::Ready);
    drop(session);
    server.finish();
}

// =============================================================================
// Execute Tests
// =============================================================================

#[test]
fn test_execute_on_closed_session() {
    let session = Session::new(SessionConfig::default(), reactor());
    let err = session.sql("SELECT 1").unwrap_err();
    assert!(err.is_protocol_state_error());
}

#[test]
fn test_execute_sends_statement_and_args() {
    let server = MockServer::start(Script::replies(vec![Reply::Messages(dml_ok(1))]));
    let session = open(&server);

    let statement = Statement::new("INSERT INTO alpha VALUES (?, ?)")
        .bind(7)
        .bind("seven");
    let result = session.execute(statement).unwrap();
    assert_eq!(result.affected_rows(), 1);
    assert_eq!(session.state(), SessionState::Ready);
    drop(result);

    session.close().unwrap();
    let received = server.finish();
    let sent = statements(&received);
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, "INSERT INTO alpha VALUES (?, ?)");
    assert_eq!(
        sent[0].1,
        vec![
            xclient::protocol::Any::Scalar(Scalar::SInt(7)),
            xclient::protocol::Any::Scalar(Scalar::String("seven".to_string())),
        ]
    );
}

#[test]
fn test_execute_request_renders_crud() {
    let server = MockServer::start(Script::replies(vec![Reply::Messages(dml_ok(2))]));
    let session = open(&server);

    let request = TableInsert::new("test.alpha")
        .columns(&["idalpha", "alphacol"])
        .unwrap()
        .values(vec![1.into(), "one".into()])
        .unwrap()
        .values(vec![2.into(), "two".into()])
        .unwrap()
        .build()
        .unwrap();
    let result = session.execute_request(&request).unwrap();
    assert_eq!(result.affected_rows(), 2);
    drop(result);

    session.close().unwrap();
    let sent = statements(&server.finish());
    assert_eq!(
        sent[0].0,
        "INSERT INTO `test`.`alpha` (`idalpha`, `alphacol`) VALUES (?, ?), (?, ?)"
    );
    assert_eq!(sent[0].1.len(), 4);
}

#[test]
fn test_expression_argument_rejected_before_dispatch() {
    let server = MockServer::start(Script::default());
    let session = open(&server);

    let statement = Statement::new("SELECT ?")
        .bind_value(&DynamicValue::expression("NOW()"))
        .unwrap();
    let err = session.execute(statement).unwrap_err();
    assert!(err.is_argument_error());
    assert_eq!(session.state(), SessionState::Ready);

    session.close().unwrap();
    assert!(statements(&server.finish()).is_empty());
}

#[test]
fn test_second_statement_while_executing() {
    let server = MockServer::start(Script::replies(vec![
        Reply::Messages(alpha_select()),
        Reply::Messages(dml_ok(0)),
    ]));
    let session = open(&server);

    let mut result = session.sql("SELECT * FROM alpha").unwrap();
    assert_eq!(session.state(), SessionState::Executing);

    let err = session.sql("DELETE FROM alpha").unwrap_err();
    assert!(err.is_protocol_state_error());

    result.drain().unwrap();
    assert_eq!(session.state(), SessionState::Ready);
    session.sql("DELETE FROM alpha").unwrap();

    session.close().unwrap();
    assert_eq!(statements(&server.finish()).len(), 2);
}

#[test]
fn test_dropping_undrained_result_frees_session() {
    let server = MockServer::start(Script::replies(vec![
        Reply::Messages(alpha_select()),
        Reply::Messages(dml_ok(3)),
    ]));
    let session = open(&server);

    {
        let mut result = session.sql("SELECT * FROM alpha").unwrap();
        assert!(result.next(false).unwrap().is_some());
    }
    assert_eq!(session.state(), SessionState::Ready);

    let result = session.sql("DELETE FROM alpha").unwrap();
    assert_eq!(result.affected_rows(), 3);
    drop(result);

    session.close().unwrap();
    server.finish();
}

#[test]
fn test_server_error_keeps_session_ready() {
    let server = MockServer::start(Script::replies(vec![
        Reply::Messages(vec![server_error(1146, "Table 'test.nope' doesn't exist")]),
        Reply::Messages(dml_ok(0)),
    ]));
    let session = open(&server);

    let err = session.sql("SELECT * FROM nope").unwrap_err();
    match &err {
        XError::Server {
            code,
            sql_state,
            message,
        } => {
            assert_eq!(*code, 1146);
            assert_eq!(sql_state, "42S02");
            assert!(message.contains("doesn't exist"));
        }
        other => panic!("Expected server error, got {:?}", other),
    }
    assert!(!err.is_fatal_to_session());
    assert_eq!(session.state(), SessionState::Ready);

    session.sql("DO 1").unwrap();

    session.close().unwrap();
    server.finish();
}

#[test]
fn test_sql_one_returns_first_document() {
    let server = MockServer::start(Script::replies(vec![Reply::Messages(alpha_select())]));
    let session = open(&server);

    let document = session.sql_one("SELECT * FROM alpha").unwrap().unwrap();
    assert_eq!(document.get("idalpha"), Some(&DynamicValue::Integer(1)));
    assert_eq!(
        document.get("alphacol"),
        Some(&DynamicValue::String("first".to_string()))
    );
    assert_eq!(session.state(), SessionState::Ready);

    session.close().unwrap();
    server.finish();
}

#[test]
fn test_session_notices_update_current_schema() {
    use xclient::protocol::StateChange;

    let mut messages = vec![common::state_change(StateChange::CurrentSchema(
        "sakila".to_string(),
    ))];
    messages.extend(dml_ok(0));
    let server = MockServer::start(Script::replies(vec![Reply::Messages(messages)]));
    let session = open(&server);

    session.sql("USE sakila").unwrap();
    assert_eq!(session.current_schema().as_deref(), Some("sakila"));

    session.close().unwrap();
    server.finish();
}

#[test]
fn test_collection_find_returns_documents() {
    let doc_column = ServerMessage::ColumnMetaData(ColumnMetaDataFrame {
        field_type: 7,
        name: "doc".to_string(),
        original_name: "doc".to_string(),
        table: "people".to_string(),
        original_table: "people".to_string(),
        schema: "test".to_string(),
        catalog: "def".to_string(),
        collation: 63,
        fractional_digits: 0,
        length: 4_294_967_295,
        flags: 0,
        content_type: 2,
    });
    let server = MockServer::start(Script::replies(vec![Reply::Messages(vec![
        doc_column,
        ServerMessage::Row(vec![common::string_field(
            r#"{"_id": "1", "name": "Ann", "age": 31}"#,
        )]),
        ServerMessage::FetchDone,
        ServerMessage::StmtExecuteOk,
    ])]));
    let session = open(&server);

    let request = CollectionFind::new("test.people")
        .filter("$.age > :age")
        .unwrap()
        .bind("age", 30)
        .unwrap()
        .build()
        .unwrap();
    let mut result = session.execute_request(&request).unwrap();
    let rows = result.all(false).unwrap();
    assert_eq!(rows.len(), 1);

    let document = rows[0].as_document().unwrap();
    assert_eq!(document.len(), 3);
    assert_eq!(document.get("name"), Some(&DynamicValue::from("Ann")));
    assert_eq!(document.get("age"), Some(&DynamicValue::Integer(31)));
    drop(result);

    session.close().unwrap();
    let sent = statements(&server.finish());
    assert_eq!(
        sent[0].0,
        "SELECT doc FROM `test`.`people` WHERE JSON_EXTRACT(doc,'$.age') > ?"
    );
}

// =============================================================================
// Failure Tests
// =============================================================================

#[test]
fn test_cancel_before_reply_fails_session() {
    let server = MockServer::start(Script::replies(vec![Reply::Silent]));
    let session = open(&server);
    let cancel = session.cancel_handle();

    let canceller = thread::spawn(move || {
        thread::sleep(Duration::from_millis(100));
        cancel.cancel();
    });

    let err = session.sql("SELECT SLEEP(10)").unwrap_err();
    canceller.join().unwrap();

    assert_eq!(io_kind(&err), Some(ErrorKind::Interrupted));
    assert!(session.cancel_handle().is_cancelled());
    assert_eq!(session.state(), SessionState::Failed);

    let err = session.sql("SELECT 1").unwrap_err();
    assert!(err.is_protocol_state_error());

    drop(session);
    server.finish();
}

#[test]
fn test_cancel_wakes_unbounded_wait() {
    let server = MockServer::start(Script::replies(vec![Reply::Silent]));
    let config = SessionConfig {
        read_timeout_ms: 0,
        ..server.config()
    };
    let mut session = Session::new(config, reactor());
    session.open().unwrap();
    let cancel = session.cancel_handle();

    let canceller = thread::spawn(move || {
        thread::sleep(Duration::from_millis(50));
        cancel.cancel();
    });

    let started = Instant::now();
    let err = session.sql("SELECT SLEEP(10)").unwrap_err();
    assert_eq!(io_kind(&err), Some(ErrorKind::Interrupted));
    assert!(started.elapsed() < Duration::from_secs(2));
    canceller.join().unwrap();

    drop(session);
    server.finish();
}

#[test]
fn test_read_timeout_fails_session() {
    let server = MockServer::start(Script::replies(vec![Reply::Silent]));
    let config = SessionConfig {
        read_timeout_ms: 200,
        ..server.config()
    };
    let mut session = Session::new(config, reactor());
    session.open().unwrap();

    let err = session.sql("SELECT SLEEP(10)").unwrap_err();
    assert_eq!(io_kind(&err), Some(ErrorKind::TimedOut));
    assert_eq!(session.state(), SessionState::Failed);

    drop(session);
    server.finish();
}

#[test]
fn test_server_hangup_fails_session() {
    let server = MockServer::start(Script::replies(vec![Reply::Hangup(Vec::new())]));
    let session = open(&server);

    let err = session.sql("SELECT 1").unwrap_err();
    assert!(err.is_io_error());
    assert!(err.is_fatal_to_session());
    assert_eq!(session.state(), SessionState::Failed);

    server.finish();
}

// =============================================================================
// Close Tests
// =============================================================================

#[test]
fn test_close_is_graceful_and_idempotent() {
    let server = MockServer::start(Script::default());
    let session = open(&server);

    session.close().unwrap();
    assert_eq!(session.state(), SessionState::Closed);
    session.close().unwrap();
    assert_eq!(session.state(), SessionState::Closed);

    let received = server.finish();
    let tail = &received[received.len() - 2..];
    assert_eq!(
        tail,
        &[ClientMessage::SessionClose, ClientMessage::ConnectionClose]
    );
}

#[test]
fn test_close_failed_session_is_noop() {
    let config = SessionConfig::builder().host("127.0.0.1").port(0).build();
    let mut session = Session::new(config, reactor());
    let _ = session.open();

    session.close().unwrap();
    assert_eq!(session.state(), SessionState::Failed);
}

#[test]
fn test_execute_after_close() {
    let server = MockServer::start(Script::default());
    let session = open(&server);
    session.close().unwrap();

    let err = session.sql("SELECT 1").unwrap_err();
    assert!(err.is_protocol_state_error());
    server.finish();
}

#[test]
fn test_sessions_share_one_reactor() {
    let first = MockServer::start(Script::replies(vec![Reply::Messages(dml_ok(1))]));
    let second = MockServer::start(Script::replies(vec![Reply::Messages(dml_ok(2))]));
    let shared = reactor();

    let a = Session::open_in_span(first.config(), &shared, tracing::Span::none()).unwrap();
    let b = Session::open_in_span(second.config(), &shared, tracing::Span::none()).unwrap();

    assert_eq!(a.sql("DO 1").unwrap().affected_rows(), 1);
    assert_eq!(b.sql("DO 2").unwrap().affected_rows(), 2);

    a.close().unwrap();
    b.close().unwrap();
    first.finish();
    second.finish();
}
