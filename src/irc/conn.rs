/// Per-connection byte transport.
///
/// A `Connection` owns the socket and nothing else; the buffers it pumps
/// live on the `User` record. Reads drain the socket in fixed chunks
/// until `WouldBlock`, as edge-triggered notification requires. Writes
/// push from the front of the write buffer until the kernel refuses; a
/// partial send leaves the remainder pending and the caller keeps write
/// interest armed until the buffer empties.
use std::io::{self, Read, Write};

use bytes::{Buf, BytesMut};
use mio::net::TcpStream;

use super::framing;

/// Size of the transient read chunk.
pub const READ_CHUNK_SIZE: usize = 4096;

/// Hard cap on a user's accumulated read buffer. A peer that keeps a
/// connection open without ever sending CR-LF hits this and is dropped.
pub const MAX_READ_BUFFER: usize = 8192;

/// Result of draining the socket into a read buffer.
#[derive(Debug)]
pub enum ReadOutcome {
    /// Socket exhausted; everything available was appended.
    Drained,
    /// Peer closed the connection cleanly.
    Closed,
    /// The read buffer grew past [`MAX_READ_BUFFER`].
    Overflow,
    /// A non-retriable transport error.
    Failed(io::Error),
}

#[derive(Debug)]
pub struct Connection {
    pub stream: TcpStream,
    /// Whether the reactor currently has write interest for this socket.
    pub write_armed: bool,
}

impl Connection {
    pub fn new(stream: TcpStream) -> Self {
        Self {
            stream,
            write_armed: false,
        }
    }

    /// Read until `WouldBlock`, appending to `buf` with EOT bytes
    /// stripped out.
    pub fn fill(&mut self, buf: &mut BytesMut) -> ReadOutcome {
        let mut chunk = [0u8; READ_CHUNK_SIZE];
        loop {
            match self.stream.read(&mut chunk) {
                Ok(0) => return ReadOutcome::Closed,
                Ok(n) => {
                    framing::append_stripped(buf, &chunk[..n]);
                    if buf.len() > MAX_READ_BUFFER {
                        return ReadOutcome::Overflow;
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return ReadOutcome::Drained,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return ReadOutcome::Failed(e),
            }
        }
    }

    /// Send from the front of `buf` until it empties or the kernel
    /// pushes back. Returns `true` when the buffer drained completely.
    pub fn flush(&mut self, buf: &mut BytesMut) -> io::Result<bool> {
        while !buf.is_empty() {
            match self.stream.write(buf) {
                Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
                Ok(n) => buf.advance(n),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(false),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(true)
    }
}
