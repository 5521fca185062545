//! Session transport
//!
//! One registered socket plus the frame decoder fed by its reactor events.
//! Waiting happens on the caller's thread; the reactor thread only moves
//! bytes.

use std::io::{self, ErrorKind};
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam::channel::{self, select, Receiver, RecvError};

use crate::config::SessionConfig;
use crate::error::{Result, XError};
use crate::protocol::{
    decode_server_message, encode_client_message, ClientMessage, FrameDecoder, ServerMessage,
};
use crate::reactor::{tcp_source, Event, Interest, ReactorHandle, Token};

use super::CancelSignal;

pub(crate) struct Transport {
    reactor: ReactorHandle,
    token: Token,
    events: Receiver<Event>,
    decoder: FrameDecoder,
    read_timeout: Option<Duration>,
    cancel: Arc<CancelSignal>,
    peer: String,
    registered: bool,
}

impl Transport {
    /// Connect to the configured endpoint and register with the reactor
    pub(crate) fn connect(
        config: &SessionConfig,
        reactor: &ReactorHandle,
        cancel: Arc<CancelSignal>,
    ) -> Result<Self> {
        let endpoint = config.endpoint();
        let addrs: Vec<_> = endpoint
            .to_socket_addrs()
            .map_err(|e| XError::Connection(format!("Invalid endpoint {}: {}", endpoint, e)))?
            .collect();
        if addrs.is_empty() {
            return Err(XError::Connection(format!(
                "Endpoint {} resolved to no address",
                endpoint
            )));
        }

        let mut last_error = None;
        let mut stream = None;
        for addr in &addrs {
            match TcpStream::connect_timeout(addr, config.connect_timeout()) {
                Ok(s) => {
                    stream = Some(s);
                    break;
                }
                Err(e) => {
                    tracing::debug!("connect to {} failed: {}", addr, e);
                    last_error = Some(e);
                }
            }
        }
        let stream = stream.ok_or_else(|| {
            let reason = last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no address".to_string());
            XError::Connection(format!("Unable to connect to {}: {}", endpoint, reason))
        })?;

        // Disable Nagle's algorithm for low latency
        stream.set_nodelay(true)?;
        let peer = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| endpoint.clone());

        let (handler, events) = channel::unbounded();
        let token = reactor.register(Box::new(tcp_source(stream)?), Interest::READABLE, handler)?;
        tracing::debug!(%token, %peer, "transport connected");

        Ok(Self {
            reactor: reactor.clone(),
            token,
            events,
            decoder: FrameDecoder::new(config.max_frame_size),
            read_timeout: config.read_timeout(),
            cancel,
            peer,
            registered: true,
        })
    }

    pub(crate) fn peer(&self) -> &str {
        &self.peer
    }

    /// Queue one message for the wire
    pub(crate) fn send(&mut self, message: &ClientMessage) -> Result<()> {
        if !self.registered {
            return Err(closed());
        }
        tracing::trace!(peer = %self.peer, message = ?message.message_type(), "send");
        self.reactor.write(self.token, encode_client_message(message))
    }

    /// Wait for the next complete server message
    pub(crate) fn recv(&mut self) -> Result<ServerMessage> {
        self.recv_within(self.read_timeout)
    }

    pub(crate) fn recv_within(&mut self, timeout: Option<Duration>) -> Result<ServerMessage> {
        let deadline = timeout.map(|t| Instant::now() + t);

        loop {
            if let Some(frame) = self.decoder.next_frame()? {
                let message = decode_server_message(frame)?;
                tracing::trace!(peer = %self.peer, message = ?message.message_type(), "recv");
                return Ok(message);
            }

            if !self.registered {
                return Err(closed());
            }

            if self.cancel.is_set() {
                return Err(cancelled());
            }

            let event = match deadline {
                Some(deadline) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        return Err(self.timed_out());
                    }
                    select! {
                        recv(self.events) -> event => event,
                        recv(self.cancel.receiver()) -> _ => return Err(cancelled()),
                        default(remaining) => return Err(self.timed_out()),
                    }
                }
                None => select! {
                    recv(self.events) -> event => event,
                    recv(self.cancel.receiver()) -> _ => return Err(cancelled()),
                },
            };

            match event {
                Ok(Event::Readable(bytes)) => self.decoder.extend(&bytes),
                Ok(Event::Writable) => {}
                Ok(Event::Closed) => {
                    self.registered = false;
                    // Frames already buffered are still delivered
                    if self.decoder.buffered() == 0 {
                        return Err(closed());
                    }
                }
                Ok(Event::Error(e)) => {
                    self.registered = false;
                    return Err(XError::Io(e));
                }
                Err(RecvError) => {
                    self.registered = false;
                    return Err(closed());
                }
            }
        }
    }

    fn timed_out(&self) -> XError {
        XError::Io(io::Error::new(
            ErrorKind::TimedOut,
            format!("No reply from {} within the read timeout", self.peer),
        ))
    }

    /// Deregister the socket; the reactor closes it
    pub(crate) fn close(&mut self) {
        if !self.registered {
            return;
        }
        self.registered = false;
        if let Err(e) = self.reactor.deregister(self.token) {
            tracing::debug!(token = %self.token, "deregister failed: {}", e);
        }
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        if self.registered {
            self.reactor.deregister_later(self.token);
        }
    }
}

fn cancelled() -> XError {
    XError::Io(io::Error::new(
        ErrorKind::Interrupted,
        "Operation cancelled while waiting for the server",
    ))
}

fn closed() -> XError {
    XError::Io(io::Error::new(
        ErrorKind::UnexpectedEof,
        "Connection closed by the server",
    ))
}
