//! Reactor sources
//!
//! Anything the reactor can multiplex: a nonblocking byte stream that the
//! OS readiness API can watch, with a stable identity.

use std::fmt;
use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr};

use mio::net::TcpStream;

/// Identity of a connected source: its (local, peer) address pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceId {
    pub local: SocketAddr,
    pub peer: SocketAddr,
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.local, self.peer)
    }
}

/// A byte stream the reactor can watch
pub trait Source: mio::event::Source + Send {
    /// Stable identity; fails for sockets that are not connected
    fn identity(&self) -> io::Result<SourceId>;

    /// Read without blocking; `WouldBlock` when nothing is available
    fn try_read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Write without blocking; `WouldBlock` when the socket buffer is full
    fn try_write(&mut self, buf: &[u8]) -> io::Result<usize>;

    /// Close both directions
    fn shutdown(&mut self) -> io::Result<()>;
}

impl Source for TcpStream {
    fn identity(&self) -> io::Result<SourceId> {
        Ok(SourceId {
            local: self.local_addr()?,
            peer: self.peer_addr()?,
        })
    }

    fn try_read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.read(buf)
    }

    fn try_write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write(buf)
    }

    fn shutdown(&mut self) -> io::Result<()> {
        TcpStream::shutdown(self, Shutdown::Both)
    }
}

/// Switch a connected standard library socket to nonblocking mode and wrap
/// it for registration
pub fn tcp_source(stream: std::net::TcpStream) -> io::Result<TcpStream> {
    stream.set_nonblocking(true)?;
    Ok(TcpStream::from_std(stream))
}
