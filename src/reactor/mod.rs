//! Reactor Module
//!
//! Readiness-driven multiplexer for nonblocking sockets, built on `mio`.
//!
//! ## Responsibilities
//! - Watch registered sources for readable and writable readiness
//! - Move bytes: inbound chunks out to handlers, queued outbound bytes in
//! - Dispatch events for every ready source to its handler
//!
//! The reactor knows nothing about frames or messages. Handlers are
//! channel senders; whoever owns the receiving end decodes.
//!
//! ## Readiness
//! `poll` blocks in the OS readiness API (epoll, kqueue) until a source is
//! ready, the timeout passes or the [`Waker`] fires. Readiness is
//! edge-triggered: a ready source is read until it would block. Writable
//! readiness is armed while the outbound queue holds bytes or the
//! registration asked for it; a source is writable once its queue drained.

mod handle;
mod source;

pub use handle::ReactorHandle;
pub use source::{tcp_source, Source, SourceId};

use std::collections::BTreeMap;
use std::fmt;
use std::io::{self, ErrorKind};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::{Buf, Bytes, BytesMut};
use crossbeam::channel::Sender;
use mio::{Events, Poll, Registry, Waker};

use crate::config::ReactorConfig;
use crate::error::{Result, XError};

/// Reserved for the waker; registration tokens count up from zero
const WAKE_TOKEN: mio::Token = mio::Token(usize::MAX);

/// Registration key handed out by `register`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Token(pub usize);

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl From<Token> for mio::Token {
    fn from(token: Token) -> Self {
        mio::Token(token.0)
    }
}

/// Readiness a registration cares about
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interest {
    pub readable: bool,
    pub writable: bool,
}

impl Interest {
    pub const READABLE: Interest = Interest {
        readable: true,
        writable: false,
    };
    pub const WRITABLE: Interest = Interest {
        readable: false,
        writable: true,
    };
    pub const BOTH: Interest = Interest {
        readable: true,
        writable: true,
    };

    /// Readiness to arm with the OS; pending output always needs writable
    fn to_mio(self, output_pending: bool) -> Option<mio::Interest> {
        match (self.readable, self.writable || output_pending) {
            (true, true) => Some(mio::Interest::READABLE | mio::Interest::WRITABLE),
            (true, false) => Some(mio::Interest::READABLE),
            (false, true) => Some(mio::Interest::WRITABLE),
            (false, false) => None,
        }
    }
}

/// Notification delivered to a handler
#[derive(Debug)]
pub enum Event {
    /// Bytes arrived
    Readable(Bytes),
    /// The outbound queue drained; more can be written
    Writable,
    /// The peer closed the stream; the registration is gone
    Closed,
    /// The stream failed; the registration is gone
    Error(io::Error),
}

/// Result of one `poll`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// Number of events dispatched
    Dispatched(usize),
    /// The waker fired before any source had something to report
    Woken,
    TimedOut,
}

struct Registration {
    id: SourceId,
    source: Box<dyn Source>,
    interest: Interest,
    /// Interest currently armed with the registry
    armed: mio::Interest,
    handler: Sender<Event>,
    outbound: BytesMut,
    /// A writable event is owed once the outbound queue drains
    write_pending: bool,
}

impl Registration {
    /// Re-arm the registry when the wanted readiness changed
    ///
    /// Re-arming also reports readiness that already holds, so a queued
    /// write on an idle socket is picked up by the next poll.
    fn arm(&mut self, registry: &Registry, token: Token, force: bool) -> io::Result<()> {
        let Some(wanted) = self.interest.to_mio(!self.outbound.is_empty()) else {
            return Err(no_interest(token));
        };
        if force || wanted != self.armed {
            registry.reregister(self.source.as_mut(), token.into(), wanted)?;
            self.armed = wanted;
        }
        Ok(())
    }

    /// Write queued bytes until the socket would block
    fn flush(&mut self) -> io::Result<()> {
        while self.outbound.has_remaining() {
            match self.source.try_write(&self.outbound) {
                Ok(0) => {
                    return Err(io::Error::new(
                        ErrorKind::WriteZero,
                        "Source accepted no bytes",
                    ))
                }
                Ok(n) => self.outbound.advance(n),
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

/// One ready source as reported by the OS
#[derive(Debug, Clone, Copy)]
struct Readiness {
    token: Token,
    readable: bool,
    writable: bool,
}

/// Single-threaded readiness multiplexer
pub struct Reactor {
    config: ReactorConfig,
    poll: Poll,
    events: Events,
    waker: Arc<Waker>,
    registrations: BTreeMap<Token, Registration>,
    next_token: usize,
    read_buf: Vec<u8>,
}

impl Reactor {
    pub fn new(config: ReactorConfig) -> Result<Self> {
        let poll = Poll::new()?;
        let waker = Arc::new(Waker::new(poll.registry(), WAKE_TOKEN)?);
        let events = Events::with_capacity(config.max_events_per_poll.max(1));
        let read_buf = vec![0u8; config.read_chunk_size.max(1)];
        Ok(Self {
            config,
            poll,
            events,
            waker,
            registrations: BTreeMap::new(),
            next_token: 0,
            read_buf,
        })
    }

    pub fn config(&self) -> &ReactorConfig {
        &self.config
    }

    /// Wakes a blocked `poll` from another thread
    pub fn waker(&self) -> Arc<Waker> {
        Arc::clone(&self.waker)
    }

    /// Start monitoring a connected source
    ///
    /// Fails with an IO error when the source has no identity (not
    /// connected), the same source is already registered or the interest
    /// is empty.
    pub fn register(
        &mut self,
        mut source: Box<dyn Source>,
        interest: Interest,
        handler: Sender<Event>,
    ) -> Result<Token> {
        let id = source.identity().map_err(|e| {
            XError::Io(io::Error::new(
                ErrorKind::InvalidInput,
                format!("Invalid source: {}", e),
            ))
        })?;

        if self.registrations.values().any(|r| r.id == id) {
            return Err(XError::Io(io::Error::new(
                ErrorKind::AlreadyExists,
                format!("Source {} is already registered", id),
            )));
        }

        let token = Token(self.next_token);
        let armed = interest.to_mio(false).ok_or_else(|| no_interest(token))?;
        self.poll
            .registry()
            .register(source.as_mut(), token.into(), armed)?;
        self.next_token += 1;
        tracing::debug!(%token, source = %id, "registered source");

        self.registrations.insert(
            token,
            Registration {
                id,
                source,
                interest,
                armed,
                handler,
                outbound: BytesMut::new(),
                write_pending: interest.writable,
            },
        );
        Ok(token)
    }

    /// Change the readiness a registration cares about
    pub fn reregister(&mut self, token: Token, interest: Interest) -> Result<()> {
        let registration = self.registrations.get_mut(&token).ok_or_else(|| {
            XError::Io(io::Error::new(
                ErrorKind::NotFound,
                format!("Token {} is not registered", token),
            ))
        })?;
        let previous = registration.interest;
        registration.interest = interest;
        if let Err(e) = registration.arm(self.poll.registry(), token, true) {
            registration.interest = previous;
            return Err(e.into());
        }
        if interest.writable && !previous.writable {
            registration.write_pending = true;
        }
        Ok(())
    }

    /// Queue bytes for a registration
    pub fn write(&mut self, token: Token, data: &[u8]) -> Result<()> {
        let registration = self.registrations.get_mut(&token).ok_or_else(|| {
            XError::Io(io::Error::new(
                ErrorKind::NotConnected,
                format!("Token {} is not registered", token),
            ))
        })?;
        registration.outbound.extend_from_slice(data);
        registration.write_pending = registration.interest.writable;
        registration.arm(self.poll.registry(), token, true)?;
        Ok(())
    }

    /// Stop monitoring; returns the source if it was registered
    pub fn deregister(&mut self, token: Token) -> Option<Box<dyn Source>> {
        let mut registration = self.registrations.remove(&token)?;
        if let Err(e) = self.poll.registry().deregister(registration.source.as_mut()) {
            tracing::debug!(%token, "registry deregister failed: {}", e);
        }
        tracing::debug!(%token, source = %registration.id, "deregistered source");
        Some(registration.source)
    }

    pub fn is_registered(&self, token: Token) -> bool {
        self.registrations.contains_key(&token)
    }

    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }

    /// Wait up to `timeout` for readiness and dispatch events
    ///
    /// `None` waits until at least one event is dispatched or the waker
    /// fires.
    pub fn poll(&mut self, timeout: Option<Duration>) -> Result<PollOutcome> {
        let deadline = timeout.map(|t| Instant::now() + t);

        loop {
            let remaining = deadline.map(|d| d.saturating_duration_since(Instant::now()));
            match self.poll.poll(&mut self.events, remaining) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }

            let mut woken = false;
            let mut ready = Vec::new();
            for event in self.events.iter() {
                if event.token() == WAKE_TOKEN {
                    woken = true;
                    continue;
                }
                ready.push(Readiness {
                    token: Token(event.token().0),
                    readable: event.is_readable() || event.is_read_closed() || event.is_error(),
                    writable: event.is_writable() || event.is_write_closed() || event.is_error(),
                });
            }

            let dispatched: usize = ready.into_iter().map(|r| self.dispatch(r)).sum();
            if dispatched > 0 {
                return Ok(PollOutcome::Dispatched(dispatched));
            }
            if woken {
                return Ok(PollOutcome::Woken);
            }
            if let Some(deadline) = deadline {
                if Instant::now() >= deadline {
                    return Ok(PollOutcome::TimedOut);
                }
            }
        }
    }

    /// Service one ready source; returns the number of events sent
    fn dispatch(&mut self, readiness: Readiness) -> usize {
        let token = readiness.token;
        let Some(registration) = self.registrations.get_mut(&token) else {
            // Deregistered after the OS reported it
            return 0;
        };

        let mut events = Vec::new();
        let mut terminal = false;

        if readiness.writable {
            if let Err(e) = registration.flush() {
                events.push(Event::Error(e));
                terminal = true;
            }
        }

        if !terminal && readiness.readable && registration.interest.readable {
            loop {
                match registration.source.try_read(&mut self.read_buf) {
                    Ok(0) => {
                        events.push(Event::Closed);
                        terminal = true;
                        break;
                    }
                    Ok(n) => events.push(Event::Readable(Bytes::copy_from_slice(
                        &self.read_buf[..n],
                    ))),
                    Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                    Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                    Err(e) => {
                        events.push(Event::Error(e));
                        terminal = true;
                        break;
                    }
                }
            }
        }

        if !terminal && registration.write_pending && registration.outbound.is_empty() {
            registration.write_pending = false;
            events.push(Event::Writable);
        }

        if !terminal {
            if let Err(e) = registration.arm(self.poll.registry(), token, false) {
                events.push(Event::Error(e));
                terminal = true;
            }
        }

        let mut sent = 0;
        let mut listening = true;
        for event in events {
            tracing::trace!(%token, ?event, "dispatching");
            if registration.handler.send(event).is_err() {
                // Nobody is listening any more
                listening = false;
                break;
            }
            sent += 1;
        }

        if terminal || !listening {
            if let Some(mut source) = self.deregister(token) {
                let _ = source.shutdown();
            }
        }
        sent
    }
}

impl fmt::Debug for Reactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reactor")
            .field("registrations", &self.registrations.len())
            .field("next_token", &self.next_token)
            .finish()
    }
}

fn no_interest(token: Token) -> io::Error {
    io::Error::new(
        ErrorKind::InvalidInput,
        format!("Token {} must be readable or writable", token),
    )
}
