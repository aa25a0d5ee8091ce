/// The server proper — listener, event loop, and connection lifecycle.
///
/// One thread owns everything. The reactor is the only place that
/// blocks; every handler runs to completion between waits, so all side
/// effects of one message (broadcast fan-out included) land before the
/// next message from any client is considered.
///
/// Write interest is armed only when a write buffer goes from empty to
/// non-empty and disarmed the moment it drains, so idle clients never
/// wake the loop.
use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::os::fd::{AsRawFd, RawFd};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use mio::net::TcpListener;
use socket2::{Domain, Socket, Type};
use tracing::{error, info, warn};

use crate::config::ServerConfig;

use super::conn::{Connection, ReadOutcome};
use super::dispatch::{self, Outcome};
use super::framing;
use super::message::Message;
use super::reactor::{Interest, Reactor};
use super::replies;
use super::state::ServerState;

/// Connections beyond this are accepted and immediately closed.
pub const MAX_CLIENTS: usize = 128;

/// Listen backlog.
pub const LISTEN_BACKLOG: i32 = 8;

/// Wait timeout; bounds how long a shutdown request can go unnoticed on
/// an idle server.
pub const POLL_TIMEOUT: Duration = Duration::from_secs(30);

/// Reason attached to QUIT broadcasts for transport-level disconnects.
const TRANSPORT_QUIT_REASON: &str = "Connection closed";

/// Unrecoverable process failures. Everything else stays per-connection.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("failed to bind listener: {0}")]
    Bind(#[source] io::Error),
    #[error("reactor failure: {0}")]
    Reactor(#[source] io::Error),
    #[error("accept failure: {0}")]
    Accept(#[source] io::Error),
}

pub struct Server {
    listener: TcpListener,
    listener_fd: RawFd,
    reactor: Reactor,
    conns: HashMap<RawFd, Connection>,
    state: ServerState,
    shutdown: Arc<AtomicBool>,
}

impl Server {
    /// Bind the listening socket and set up the reactor.
    pub fn bind(config: &ServerConfig) -> Result<Self, ServerError> {
        let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
        let socket =
            Socket::new(Domain::IPV4, Type::STREAM, None).map_err(ServerError::Bind)?;
        socket.set_reuse_address(true).map_err(ServerError::Bind)?;
        socket.bind(&addr.into()).map_err(ServerError::Bind)?;
        socket.listen(LISTEN_BACKLOG).map_err(ServerError::Bind)?;
        socket.set_nonblocking(true).map_err(ServerError::Bind)?;
        let mut listener = TcpListener::from_std(socket.into());
        let listener_fd = listener.as_raw_fd();

        let reactor = Reactor::new().map_err(ServerError::Reactor)?;
        reactor
            .register(&mut listener, listener_fd, Interest::READABLE)
            .map_err(ServerError::Reactor)?;

        Ok(Self {
            listener,
            listener_fd,
            reactor,
            conns: HashMap::new(),
            state: ServerState::new(config.password.clone()),
            shutdown: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Address the listener actually bound (useful with port 0 in tests).
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Flag that requests an orderly shutdown when set. Hand this to the
    /// signal handlers.
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    /// Run until the shutdown flag is raised or a fatal error occurs.
    pub fn run(&mut self) -> Result<(), ServerError> {
        if let Ok(addr) = self.local_addr() {
            info!(target: "system", "listening on {addr}");
        }

        loop {
            if self.shutdown.load(Ordering::Relaxed) {
                break;
            }
            let events = self
                .reactor
                .wait(POLL_TIMEOUT)
                .map_err(ServerError::Reactor)?;

            for event in events {
                if event.fd == self.listener_fd {
                    self.accept_pending()?;
                } else if event.error {
                    self.disconnect(event.fd, TRANSPORT_QUIT_REASON);
                } else {
                    if event.readable {
                        self.handle_readable(event.fd);
                    }
                    if event.writable && self.conns.contains_key(&event.fd) {
                        self.handle_writable(event.fd);
                    }
                }
                self.flush_pending();
            }
        }

        self.shutdown_all();
        info!(target: "system", "server stopped");
        Ok(())
    }

    /// Accept every pending connection; `WouldBlock` ends the batch, any
    /// other accept failure is fatal.
    fn accept_pending(&mut self) -> Result<(), ServerError> {
        loop {
            match self.listener.accept() {
                Ok((stream, addr)) => {
                    if self.state.users.len() >= MAX_CLIENTS {
                        warn!(target: "connection", "connection limit reached, closing {addr}");
                        drop(stream);
                        continue;
                    }
                    let fd = stream.as_raw_fd();
                    let mut conn = Connection::new(stream);
                    if let Err(e) =
                        self.reactor
                            .register(&mut conn.stream, fd, Interest::READABLE)
                    {
                        error!(target: "system", "failed to register fd {fd}: {e}");
                        continue;
                    }
                    let ip = addr.ip().to_string();
                    self.conns.insert(fd, conn);
                    self.state.users.add(fd, ip.clone());
                    self.state.send(fd, &replies::notice_auth_required());
                    info!(target: "connection", "new connection from {ip} (fd {fd})");
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(()),
                Err(e) => return Err(ServerError::Accept(e)),
            }
        }
    }

    fn handle_readable(&mut self, fd: RawFd) {
        let Some(conn) = self.conns.get_mut(&fd) else {
            return;
        };
        let Some(user) = self.state.users.get_mut(fd) else {
            return;
        };

        match conn.fill(&mut user.read_buf) {
            ReadOutcome::Drained => self.process_lines(fd),
            ReadOutcome::Closed => {
                info!(target: "connection", "peer closed fd {fd}");
                self.disconnect(fd, TRANSPORT_QUIT_REASON);
            }
            ReadOutcome::Overflow => {
                error!(target: "connection", "read buffer is too large: {}", user.ip);
                self.disconnect(fd, TRANSPORT_QUIT_REASON);
            }
            ReadOutcome::Failed(e) => {
                error!(target: "network", "recv failed on fd {fd}: {e}");
                self.disconnect(fd, TRANSPORT_QUIT_REASON);
            }
        }
    }

    /// Frame, parse and dispatch every complete line buffered for `fd`.
    fn process_lines(&mut self, fd: RawFd) {
        loop {
            let line_bytes = {
                let Some(user) = self.state.users.get_mut(fd) else {
                    return;
                };
                match framing::next_line(&mut user.read_buf) {
                    Some(line) => line,
                    None => break,
                }
            };
            if line_bytes.is_empty() {
                continue;
            }

            let Ok(line) = std::str::from_utf8(&line_bytes) else {
                warn!(target: "command", "non-UTF-8 line from fd {fd}");
                self.state.send_line(fd, replies::invalid_format_line());
                continue;
            };

            let msg = match Message::parse(line) {
                Ok(msg) => msg,
                Err(e) => {
                    warn!(target: "command", "malformed line from fd {fd}: {e}");
                    self.state.send_line(fd, replies::invalid_format_line());
                    continue;
                }
            };

            match dispatch::dispatch(&mut self.state, fd, &msg) {
                Outcome::Continue => self.flush_pending(),
                Outcome::Disconnect(reason) => {
                    self.disconnect(fd, &reason);
                    return;
                }
            }
        }
    }

    fn handle_writable(&mut self, fd: RawFd) {
        if self.flush_one(fd).is_err() {
            self.disconnect(fd, TRANSPORT_QUIT_REASON);
        }
    }

    /// Push one user's pending bytes and keep write interest in step with
    /// what is left: armed while data is pending, disarmed once empty.
    fn flush_one(&mut self, fd: RawFd) -> io::Result<()> {
        let Some(conn) = self.conns.get_mut(&fd) else {
            return Ok(());
        };
        let Some(user) = self.state.users.get_mut(fd) else {
            return Ok(());
        };

        let drained = conn.flush(&mut user.write_buf)?;
        if drained && conn.write_armed {
            self.reactor
                .reregister(&mut conn.stream, fd, Interest::READABLE)?;
            conn.write_armed = false;
        } else if !drained && !conn.write_armed {
            self.reactor.reregister(
                &mut conn.stream,
                fd,
                Interest::READABLE | Interest::WRITABLE,
            )?;
            conn.write_armed = true;
        }
        Ok(())
    }

    /// Flush every connection with pending output, disconnecting the ones
    /// whose transport failed. A disconnect can queue QUIT broadcasts, so
    /// sweep again until the failure list is empty.
    fn flush_pending(&mut self) {
        loop {
            let mut failed: Vec<RawFd> = Vec::new();
            for fd in self.conns.keys().copied().collect::<Vec<_>>() {
                if let Err(e) = self.flush_one(fd) {
                    warn!(target: "network", "send failed on fd {fd}: {e}");
                    failed.push(fd);
                }
            }
            if failed.is_empty() {
                break;
            }
            for fd in failed {
                self.disconnect(fd, TRANSPORT_QUIT_REASON);
            }
        }
    }

    /// Tear one connection down: QUIT fan-out (idempotent if the QUIT
    /// handler already ran), reactor deregistration, index removal, and
    /// socket close on drop.
    fn disconnect(&mut self, fd: RawFd, reason: &str) {
        self.state.purge_user(fd, reason);
        if let Some(mut conn) = self.conns.remove(&fd) {
            let _ = self.reactor.deregister(&mut conn.stream);
        }
        if let Some(user) = self.state.users.remove(fd) {
            info!(target: "connection", "disconnected {} (fd {fd})", user.ip);
        }
    }

    /// Leaves-first teardown of every remaining connection.
    fn shutdown_all(&mut self) {
        for fd in self.state.users.fds() {
            if let Some(mut conn) = self.conns.remove(&fd) {
                let _ = self.reactor.deregister(&mut conn.stream);
            }
            self.state.users.remove(fd);
        }
        info!(target: "system", "all connections closed");
    }
}
