//! Reactor thread
//!
//! Runs a [`Reactor`] on one dedicated thread. Sessions reach it through a
//! cloneable handle over a command channel. Every command wakes the thread
//! out of its readiness wait; the thread stops when the last handle is
//! dropped.

use std::sync::Arc;
use std::thread::JoinHandle;

use bytes::Bytes;
use crossbeam::channel::{self, Receiver, Sender, TryRecvError};
use mio::Waker;
use parking_lot::Mutex;
use tracing::Span;

use crate::config::ReactorConfig;
use crate::error::{Result, XError};

use super::{Event, Interest, Reactor, Source, Token};

enum Command {
    Register {
        source: Box<dyn Source>,
        interest: Interest,
        handler: Sender<Event>,
        reply: Sender<Result<Token>>,
    },
    Write {
        token: Token,
        data: Bytes,
        reply: Sender<Result<()>>,
    },
    Deregister {
        token: Token,
        reply: Option<Sender<bool>>,
    },
    Shutdown,
}

struct Inner {
    commands: Sender<Command>,
    waker: Arc<Waker>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl Inner {
    fn send(&self, command: Command) -> Result<()> {
        self.commands.send(command).map_err(|_| stopped())?;
        self.waker.wake()?;
        Ok(())
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Err(e) = self.send(Command::Shutdown) {
            tracing::debug!("reactor shutdown signal failed: {}", e);
        }
        if let Some(thread) = self.thread.lock().take() {
            if thread.join().is_err() {
                tracing::error!("reactor thread panicked");
            }
        }
    }
}

/// Cloneable handle to a reactor thread
#[derive(Clone)]
pub struct ReactorHandle {
    inner: Arc<Inner>,
}

impl ReactorHandle {
    /// Spawn a reactor thread inside the current span
    pub fn spawn(config: ReactorConfig) -> Result<Self> {
        Self::spawn_in_span(config, Span::current())
    }

    /// Spawn a reactor thread that logs inside `span`
    pub fn spawn_in_span(config: ReactorConfig, span: Span) -> Result<Self> {
        let reactor = Reactor::new(config)?;
        let waker = reactor.waker();
        let (commands, receiver) = channel::unbounded();
        let thread = std::thread::Builder::new()
            .name("xclient-reactor".to_string())
            .spawn(move || {
                let _entered = span.enter();
                run(reactor, receiver);
            })?;

        Ok(Self {
            inner: Arc::new(Inner {
                commands,
                waker,
                thread: Mutex::new(Some(thread)),
            }),
        })
    }

    /// Register a source; events go to `handler`
    pub fn register(
        &self,
        source: Box<dyn Source>,
        interest: Interest,
        handler: Sender<Event>,
    ) -> Result<Token> {
        let (reply, response) = channel::bounded(1);
        self.send(Command::Register {
            source,
            interest,
            handler,
            reply,
        })?;
        response.recv().map_err(|_| stopped())?
    }

    /// Queue bytes for a registered source
    ///
    /// Waits until the reactor accepted the bytes; a token that is no
    /// longer registered fails with `NotConnected`.
    pub fn write(&self, token: Token, data: Bytes) -> Result<()> {
        let (reply, response) = channel::bounded(1);
        self.send(Command::Write { token, data, reply })?;
        response.recv().map_err(|_| stopped())?
    }

    /// Deregister and wait until the reactor has let go of the source
    ///
    /// Returns whether the token was still registered. Idempotent.
    pub fn deregister(&self, token: Token) -> Result<bool> {
        let (reply, response) = channel::bounded(1);
        self.send(Command::Deregister {
            token,
            reply: Some(reply),
        })?;
        response.recv().map_err(|_| stopped())
    }

    /// Deregister without waiting; used from destructors
    pub(crate) fn deregister_later(&self, token: Token) {
        if let Err(e) = self.send(Command::Deregister { token, reply: None }) {
            tracing::debug!(%token, "deregister failed: {}", e);
        }
    }

    fn send(&self, command: Command) -> Result<()> {
        self.inner.send(command)
    }
}

impl std::fmt::Debug for ReactorHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReactorHandle")
            .field("handles", &Arc::strong_count(&self.inner))
            .finish()
    }
}

fn stopped() -> XError {
    XError::Io(std::io::Error::new(
        std::io::ErrorKind::BrokenPipe,
        "Reactor thread has stopped",
    ))
}

// =============================================================================
// Thread Loop
// =============================================================================

fn run(mut reactor: Reactor, commands: Receiver<Command>) {
    tracing::debug!("reactor thread started");

    'outer: loop {
        loop {
            match commands.try_recv() {
                Ok(command) => {
                    if !apply(&mut reactor, command) {
                        break 'outer;
                    }
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => break 'outer,
            }
        }

        // Blocks until a source is ready or a command wakes us
        if let Err(e) = reactor.poll(None) {
            tracing::error!("reactor poll failed: {}", e);
            break;
        }
    }

    tracing::debug!(remaining = reactor.len(), "reactor thread stopped");
}

/// Apply one command; false means shut down
fn apply(reactor: &mut Reactor, command: Command) -> bool {
    match command {
        Command::Register {
            source,
            interest,
            handler,
            reply,
        } => {
            let _ = reply.send(reactor.register(source, interest, handler));
        }
        Command::Write { token, data, reply } => {
            let _ = reply.send(reactor.write(token, &data));
        }
        Command::Deregister { token, reply } => {
            let registered = match reactor.deregister(token) {
                Some(mut source) => {
                    let _ = source.shutdown();
                    true
                }
                None => false,
            };
            if let Some(reply) = reply {
                let _ = reply.send(registered);
            }
        }
        Command::Shutdown => return false,
    }
    true
}
