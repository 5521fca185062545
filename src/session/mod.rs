//! Session Module
//!
//! Lifecycle of one X Protocol connection.
//!
//! ## States
//! ```text
//! Closed → Connecting → Authenticating → Ready ⇄ Executing
//!                                          ↓         ↓
//!                                        Closed    Failed
//! ```
//!
//! ## Responsibilities
//! - Connect, discover capabilities and authenticate
//! - Dispatch one statement at a time and hand back its [`Resultset`]
//! - Track session notices (connection id, current schema)
//! - Close gracefully, or fail for good on transport and decode errors
//!
//! A `Resultset` shares the session state and reads the stream directly;
//! the session is `Executing` until that result consumes its terminal
//! marker, and refuses new statements until then.

mod auth;
mod transport;

pub use auth::{mysql41_scramble, sha256_scramble};

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::Mutex;
use tracing::Span;

use crate::config::{AuthMethod, ReactorConfig, SessionConfig, SslMode};
use crate::crud::{CrudRequest, Statement};
use crate::error::{Result, XError};
use crate::protocol::{
    Any, ClientMessage, ErrorFrame, Notice, Scalar, ServerMessage, StateChange,
};
use crate::reactor::ReactorHandle;
use crate::resultset::{Document, Resultset};

use transport::Transport;

/// Bounded wait for the replies of a graceful close
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

/// Session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Closed,
    Connecting,
    Authenticating,
    Ready,
    Executing,
    /// Terminal; create a new session to reconnect
    Failed,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Closed => "Closed",
            SessionState::Connecting => "Connecting",
            SessionState::Authenticating => "Authenticating",
            SessionState::Ready => "Ready",
            SessionState::Executing => "Executing",
            SessionState::Failed => "Failed",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Aborts the pending (or next) wait of a session
///
/// The interrupted session becomes `Failed`: the stream position is lost.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    signal: Arc<CancelSignal>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.signal.set();
    }

    pub fn is_cancelled(&self) -> bool {
        self.signal.is_set()
    }
}

/// Sticky cancellation flag plus a channel that wakes a blocked wait
#[derive(Debug)]
pub(crate) struct CancelSignal {
    flag: AtomicBool,
    wake: Sender<()>,
    woken: Receiver<()>,
}

impl CancelSignal {
    fn new() -> Self {
        let (wake, woken) = channel::bounded(1);
        Self {
            flag: AtomicBool::new(false),
            wake,
            woken,
        }
    }

    fn set(&self) {
        self.flag.store(true, Ordering::Release);
        // A full channel already holds a wakeup
        let _ = self.wake.try_send(());
    }

    pub(crate) fn is_set(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    pub(crate) fn receiver(&self) -> &Receiver<()> {
        &self.woken
    }
}

// =============================================================================
// Shared State
// =============================================================================

pub(crate) struct SessionInner {
    state: SessionState,
    transport: Option<Transport>,
    /// Statement currently allowed to read the stream
    active_statement: Option<u64>,
    next_statement_id: u64,
    connection_id: Option<u64>,
    current_schema: Option<String>,
    span: Span,
}

impl SessionInner {
    fn transport(&mut self) -> Result<&mut Transport> {
        let state = self.state;
        self.transport.as_mut().ok_or_else(|| {
            XError::ProtocolState(format!("Session has no connection (state: {})", state))
        })
    }

    /// Session-wide effects of a notice
    fn observe(&mut self, notice: &Notice) {
        match notice {
            Notice::SessionStateChanged(StateChange::ClientIdAssigned(id)) => {
                tracing::debug!(parent: &self.span, connection_id = id, "client id assigned");
                self.connection_id = Some(*id);
            }
            Notice::SessionStateChanged(StateChange::CurrentSchema(schema)) => {
                self.current_schema = Some(schema.clone());
            }
            Notice::SessionStateChanged(StateChange::AccountExpired) => {
                tracing::warn!(parent: &self.span, "account password has expired");
            }
            _ => {}
        }
    }

    /// Drop the connection for good
    fn fail(&mut self, reason: &XError) {
        if self.state != SessionState::Failed {
            tracing::warn!(parent: &self.span, "session failed: {}", reason);
        }
        self.state = SessionState::Failed;
        self.active_statement = None;
        if let Some(mut transport) = self.transport.take() {
            transport.close();
        }
    }
}

/// Read access to the stream for one statement
pub(crate) struct StatementStream {
    inner: Arc<Mutex<SessionInner>>,
    statement_id: u64,
}

impl StatementStream {
    pub(crate) fn statement_id(&self) -> u64 {
        self.statement_id
    }

    /// Next message of this statement
    ///
    /// Session-level notices are observed on the way through. Transport and
    /// decode errors fail the session.
    pub(crate) fn read(&self) -> Result<ServerMessage> {
        let mut inner = self.inner.lock();
        if inner.active_statement != Some(self.statement_id) {
            return Err(XError::ProtocolState(format!(
                "Statement {} no longer owns the connection (session {})",
                self.statement_id, inner.state
            )));
        }

        let result = inner.transport().and_then(|t| t.recv());
        match result {
            Ok(message) => {
                if let ServerMessage::Notice { notice, .. } = &message {
                    inner.observe(notice);
                }
                Ok(message)
            }
            Err(e) => {
                if e.is_fatal_to_session() {
                    inner.fail(&e);
                }
                Err(e)
            }
        }
    }

    /// The statement consumed its terminal marker
    pub(crate) fn finish(&self) {
        let mut inner = self.inner.lock();
        if inner.active_statement == Some(self.statement_id) {
            inner.active_statement = None;
            if inner.state == SessionState::Executing {
                inner.state = SessionState::Ready;
            }
            tracing::debug!(parent: &inner.span, statement = self.statement_id, "statement finished");
        }
    }

    /// The stream is unusable after an error found above the transport
    pub(crate) fn fail(&self, reason: &XError) {
        let mut inner = self.inner.lock();
        if inner.active_statement == Some(self.statement_id) {
            inner.fail(reason);
        }
    }

    /// Whether this statement still owns the stream
    pub(crate) fn is_active(&self) -> bool {
        self.inner.lock().active_statement == Some(self.statement_id)
    }

    pub(crate) fn span(&self) -> Span {
        self.inner.lock().span.clone()
    }
}

// =============================================================================
// Session
// =============================================================================

/// One connection to an X Protocol server
pub struct Session {
    inner: Arc<Mutex<SessionInner>>,
    config: SessionConfig,
    reactor: ReactorHandle,
    cancel: Arc<CancelSignal>,
    capabilities: Vec<(String, Any)>,
    span: Span,
}

impl Session {
    /// A closed session using `reactor` for its socket
    pub fn new(config: SessionConfig, reactor: ReactorHandle) -> Self {
        Self::new_in_span(config, reactor, Span::current())
    }

    /// A closed session that logs inside `span`
    pub fn new_in_span(config: SessionConfig, reactor: ReactorHandle, span: Span) -> Self {
        Self {
            inner: Arc::new(Mutex::new(SessionInner {
                state: SessionState::Closed,
                transport: None,
                active_statement: None,
                next_statement_id: 1,
                connection_id: None,
                current_schema: None,
                span: span.clone(),
            })),
            config,
            reactor,
            cancel: Arc::new(CancelSignal::new()),
            capabilities: Vec::new(),
            span,
        }
    }

    /// Connect with a private reactor thread
    pub fn connect(config: SessionConfig) -> Result<Self> {
        let reactor = ReactorHandle::spawn(ReactorConfig::default())?;
        let mut session = Session::new(config, reactor);
        session.open()?;
        Ok(session)
    }

    /// Connect through a shared reactor, logging inside `span`
    pub fn open_in_span(
        config: SessionConfig,
        reactor: &ReactorHandle,
        span: Span,
    ) -> Result<Self> {
        let mut session = Session::new_in_span(config, reactor.clone(), span);
        session.open()?;
        Ok(session)
    }

    pub fn state(&self) -> SessionState {
        self.inner.lock().state
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn is_open(&self) -> bool {
        matches!(self.state(), SessionState::Ready | SessionState::Executing)
    }

    /// Connection id assigned by the server
    pub fn connection_id(&self) -> Option<u64> {
        self.inner.lock().connection_id
    }

    /// Schema the server reports as current
    pub fn current_schema(&self) -> Option<String> {
        self.inner.lock().current_schema.clone()
    }

    /// Capabilities reported by the server during `open`
    pub fn server_capabilities(&self) -> &[(String, Any)] {
        &self.capabilities
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            signal: Arc::clone(&self.cancel),
        }
    }

    // -------------------------------------------------------------------------
    // Open
    // -------------------------------------------------------------------------

    /// Connect and authenticate
    ///
    /// Only legal from `Closed`. Any failure leaves the session `Failed`
    /// and is reported as a connection error.
    pub fn open(&mut self) -> Result<()> {
        {
            let mut inner = self.inner.lock();
            if inner.state != SessionState::Closed {
                return Err(XError::ProtocolState(format!(
                    "Session can only be opened from Closed (state: {})",
                    inner.state
                )));
            }
            inner.state = SessionState::Connecting;
        }

        let span = self.span.clone();
        let _entered = span.enter();
        tracing::debug!(endpoint = %self.config.endpoint(), user = %self.config.user, "opening session");

        match self.handshake() {
            Ok(()) => {
                let mut inner = self.inner.lock();
                inner.state = SessionState::Ready;
                if inner.current_schema.is_none() {
                    inner.current_schema = self.config.schema.clone();
                }
                tracing::info!(
                    endpoint = %self.config.endpoint(),
                    connection_id = ?inner.connection_id,
                    "session ready"
                );
                Ok(())
            }
            Err(e) => {
                let error = match e {
                    XError::Connection(_) => e,
                    other => XError::Connection(other.to_string()),
                };
                self.inner.lock().fail(&error);
                Err(error)
            }
        }
    }

    fn handshake(&mut self) -> Result<()> {
        self.config
            .validate()
            .map_err(|e| XError::Connection(e.to_string()))?;

        let transport = Transport::connect(&self.config, &self.reactor, Arc::clone(&self.cancel))?;
        tracing::debug!(peer = transport.peer(), "connected");
        self.inner.lock().transport = Some(transport);

        self.send(&ClientMessage::CapabilitiesGet)?;
        self.capabilities = match self.recv_handshake()? {
            ServerMessage::Capabilities(capabilities) => capabilities,
            other => return Err(unexpected("capabilities", &other)),
        };
        tracing::debug!(count = self.capabilities.len(), "server capabilities");

        self.negotiate_tls()?;

        self.inner.lock().state = SessionState::Authenticating;
        self.authenticate()
    }

    fn negotiate_tls(&self) -> Result<()> {
        let offered = self.capabilities.iter().any(|(name, _)| name == "tls");
        match self.config.ssl_mode {
            SslMode::Disabled => Ok(()),
            SslMode::Preferred => {
                tracing::warn!(server_offers_tls = offered, "TLS is not available, continuing unencrypted");
                Ok(())
            }
            SslMode::Required => Err(XError::Connection(
                "TLS was required but this client can not encrypt connections".to_string(),
            )),
        }
    }

    fn authenticate(&mut self) -> Result<()> {
        let method = self.config.auth_method;
        let schema = self.config.schema.clone().unwrap_or_default();
        let user = self.config.user.clone();
        let password = self.config.password.clone();

        match method {
            AuthMethod::Plain => {
                self.send(&ClientMessage::AuthenticateStart {
                    mech_name: method.mechanism_name().to_string(),
                    auth_data: Some(auth::plain_payload(&schema, &user, &password)),
                    initial_response: None,
                })?;
            }
            AuthMethod::Mysql41 | AuthMethod::Sha256Memory => {
                self.send(&ClientMessage::AuthenticateStart {
                    mech_name: method.mechanism_name().to_string(),
                    auth_data: None,
                    initial_response: None,
                })?;
                let salt = match self.recv_handshake()? {
                    ServerMessage::AuthenticateContinue { auth_data } => auth_data,
                    other => return Err(unexpected("an authentication challenge", &other)),
                };
                let response = match method {
                    AuthMethod::Mysql41 => auth::mysql41_response(&schema, &user, &password, &salt),
                    _ => auth::sha256_memory_response(&schema, &user, &password, &salt),
                };
                self.send(&ClientMessage::AuthenticateContinue {
                    auth_data: response,
                })?;
            }
        }

        match self.recv_handshake()? {
            ServerMessage::AuthenticateOk { .. } => {
                tracing::debug!(mechanism = method.mechanism_name(), "authenticated");
                Ok(())
            }
            other => Err(unexpected("authentication result", &other)),
        }
    }

    fn send(&self, message: &ClientMessage) -> Result<()> {
        self.inner.lock().transport()?.send(message)
    }

    /// Next non-notice handshake message; server errors become connection errors
    fn recv_handshake(&self) -> Result<ServerMessage> {
        let mut inner = self.inner.lock();
        loop {
            let message = inner.transport()?.recv()?;
            match message {
                ServerMessage::Notice { notice, .. } => inner.observe(&notice),
                ServerMessage::Error(error) => {
                    return Err(XError::Connection(format!(
                        "{} (code {}, state {})",
                        error.message, error.code, error.sql_state
                    )))
                }
                other => return Ok(other),
            }
        }
    }

    // -------------------------------------------------------------------------
    // Execute
    // -------------------------------------------------------------------------

    /// Dispatch a statement
    ///
    /// Only legal from `Ready`. The first result part's metadata is read
    /// before returning, so statement errors surface here.
    pub fn execute(&self, statement: impl Into<Statement>) -> Result<Resultset> {
        let statement = statement.into();
        let args = statement.scalar_args()?;

        let statement_id = {
            let mut inner = self.inner.lock();
            match inner.state {
                SessionState::Ready => {}
                SessionState::Executing => {
                    return Err(XError::ProtocolState(format!(
                        "Statement {} is still in flight; drain or drop its result first",
                        inner.active_statement.unwrap_or_default()
                    )))
                }
                other => {
                    return Err(XError::ProtocolState(format!(
                        "Session is not ready (state: {})",
                        other
                    )))
                }
            }

            let id = inner.next_statement_id;
            inner.next_statement_id += 1;

            tracing::debug!(parent: &self.span, statement = id, sql = statement.sql(), args = args.len(), "execute");
            let message = ClientMessage::sql(statement.sql(), args);
            if let Err(e) = inner.transport().and_then(|t| t.send(&message)) {
                if e.is_fatal_to_session() {
                    inner.fail(&e);
                }
                return Err(e);
            }

            inner.state = SessionState::Executing;
            inner.active_statement = Some(id);
            id
        };

        let stream = StatementStream {
            inner: Arc::clone(&self.inner),
            statement_id,
        };
        Resultset::start(stream, statement.data_model())
    }

    /// Dispatch a CRUD request
    pub fn execute_request(&self, request: &CrudRequest) -> Result<Resultset> {
        self.execute(request.to_statement()?)
    }

    /// Run SQL text
    pub fn sql(&self, text: &str) -> Result<Resultset> {
        self.execute(Statement::new(text))
    }

    /// Run SQL text and return its first row as a document
    pub fn sql_one(&self, text: &str) -> Result<Option<Document>> {
        let mut result = self.sql(text)?;
        result.fetch_one()
    }

    // -------------------------------------------------------------------------
    // Close
    // -------------------------------------------------------------------------

    /// Release the connection; idempotent
    ///
    /// From `Ready` the server is told first. A session closed mid-statement
    /// just drops the socket.
    pub fn close(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        match inner.state {
            SessionState::Closed | SessionState::Failed => return Ok(()),
            SessionState::Ready => {
                if let Ok(transport) = inner.transport() {
                    graceful_close(transport);
                }
            }
            _ => {}
        }

        if let Some(mut transport) = inner.transport.take() {
            transport.close();
        }
        inner.state = SessionState::Closed;
        inner.active_statement = None;
        tracing::debug!(parent: &self.span, "session closed");
        Ok(())
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("endpoint", &self.config.endpoint())
            .field("state", &self.state())
            .finish()
    }
}

/// `Session.Close` then `Connection.Close`, each waiting briefly for `Ok`
fn graceful_close(transport: &mut Transport) {
    for message in [ClientMessage::SessionClose, ClientMessage::ConnectionClose] {
        if transport.send(&message).is_err() {
            return;
        }
        loop {
            match transport.recv_within(Some(CLOSE_TIMEOUT)) {
                Ok(ServerMessage::Ok { .. }) => break,
                Ok(ServerMessage::Notice { .. }) => continue,
                Ok(other) => {
                    tracing::debug!(reply = ?other.message_type(), "unexpected reply while closing");
                    break;
                }
                Err(_) => return,
            }
        }
    }
}

fn unexpected(expected: &str, message: &ServerMessage) -> XError {
    XError::Connection(format!(
        "Expected {} from the server, got {:?}",
        expected,
        message.message_type()
    ))
}

/// Statement error reported by the server
pub(crate) fn server_error(error: ErrorFrame) -> XError {
    XError::Server {
        code: error.code,
        sql_state: error.sql_state,
        message: error.message,
    }
}

/// Scalar of a session variable notice, as a display string
pub(crate) fn scalar_text(value: &Scalar) -> String {
    match value {
        Scalar::Null => "NULL".to_string(),
        Scalar::SInt(v) => v.to_string(),
        Scalar::UInt(v) => v.to_string(),
        Scalar::Double(v) => v.to_string(),
        Scalar::Float(v) => v.to_string(),
        Scalar::Bool(v) => v.to_string(),
        Scalar::String(v) => v.clone(),
        Scalar::Octets { value, .. } => String::from_utf8_lossy(value).into_owned(),
    }
}
