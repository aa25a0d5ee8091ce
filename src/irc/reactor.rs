/// The event loop core — a thin wrapper over the OS readiness facility.
///
/// Registration is edge-triggered: an interest fires when the descriptor
/// transitions into readiness, so consumers must drain until the kernel
/// reports `WouldBlock`. Tokens are the raw descriptors themselves, which
/// keeps the reactor's view and the user table keyed identically.
use std::io;
use std::os::fd::RawFd;
use std::time::Duration;

use mio::event::Source;
use mio::{Events, Poll, Token};

pub use mio::Interest;

/// One readiness notification, detached from the poll buffer.
#[derive(Debug, Clone, Copy)]
pub struct IoEvent {
    pub fd: RawFd,
    pub readable: bool,
    pub writable: bool,
    pub error: bool,
}

/// Owns the poll instance and its event buffer.
#[derive(Debug)]
pub struct Reactor {
    poll: Poll,
    events: Events,
}

impl Reactor {
    pub fn new() -> io::Result<Self> {
        Ok(Self {
            poll: Poll::new()?,
            events: Events::with_capacity(256),
        })
    }

    /// Start watching `source` under its descriptor.
    pub fn register(&self, source: &mut impl Source, fd: RawFd, interest: Interest) -> io::Result<()> {
        self.poll
            .registry()
            .register(source, Token(fd as usize), interest)
    }

    /// Replace the interest set of an already-registered descriptor.
    pub fn reregister(
        &self,
        source: &mut impl Source,
        fd: RawFd,
        interest: Interest,
    ) -> io::Result<()> {
        self.poll
            .registry()
            .reregister(source, Token(fd as usize), interest)
    }

    pub fn deregister(&self, source: &mut impl Source) -> io::Result<()> {
        self.poll.registry().deregister(source)
    }

    /// Block until readiness or `timeout`. A signal interrupting the wait
    /// yields an empty batch so the caller can re-check its shutdown flag
    /// before retrying; any other poll failure is fatal to the caller.
    pub fn wait(&mut self, timeout: Duration) -> io::Result<Vec<IoEvent>> {
        match self.poll.poll(&mut self.events, Some(timeout)) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::Interrupted => return Ok(Vec::new()),
            Err(e) => return Err(e),
        }

        Ok(self
            .events
            .iter()
            .map(|event| IoEvent {
                fd: event.token().0 as RawFd,
                // A half-closed peer must still wake the read path so it
                // can observe the zero-length read.
                readable: event.is_readable() || event.is_read_closed(),
                writable: event.is_writable(),
                error: event.is_error(),
            })
            .collect())
    }
}
