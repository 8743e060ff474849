use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Context;
use mio::net::TcpListener;
use mio::{Events, Interest, Poll, Token};
use tracing::{debug, info, warn};

use crate::config::ServerConfig;
use crate::http::connection::Connection;
use crate::http::outbox::{Outbox, ResponseHandle};
use crate::http::request::Request;
use crate::server::listener::bind_loopback;
use crate::server::notify::{Notifier, WakeSocket};

const LISTENER: Token = Token(0);
const WAKE: Token = Token(1);
const FIRST_CLIENT: usize = 2;

/// Size of the reusable recv buffer.
pub const RECV_BUFFER_SIZE: usize = 20_000;

const EVENT_CAPACITY: usize = 1024;

/// Single-threaded HTTP/1.1 server driven one tick at a time.
///
/// ```no_run
/// use std::time::Duration;
/// use loophttp::{Server, StatusCode};
///
/// let mut server = Server::bind(8080)?;
/// loop {
///     server.poll(|request, mut response| {
///         if request.path() == "/" {
///             response.set_body("<html><body>Hello World.</body></html>");
///         } else {
///             response.set_status(StatusCode::NotFound);
///         }
///     }, Duration::from_millis(16))?;
/// }
/// # Ok::<(), anyhow::Error>(())
/// ```
///
/// Handles passed to the callback can be kept and finished later, from any
/// thread; their responses still go out in request order.
pub struct Server {
    poll: Poll,
    events: Events,
    listener: TcpListener,
    wake: WakeSocket,
    notifier: Notifier,
    outbox: Outbox,
    connections: HashMap<Token, Connection>,
    next_token: usize,
    buffer: Box<[u8]>,
    local_addr: SocketAddr,
}

impl Server {
    /// Binds to `127.0.0.1:port` (0 for an ephemeral port).
    pub fn bind(port: u16) -> anyhow::Result<Self> {
        let mut listener = bind_loopback(port)?;
        let local_addr = listener
            .local_addr()
            .context("failed to read listener address")?;

        let (mut wake, notifier) = WakeSocket::bind()?;

        let poll = Poll::new().context("failed to create poller")?;
        poll.registry()
            .register(&mut listener, LISTENER, Interest::READABLE)
            .context("failed to register listener")?;
        poll.registry()
            .register(wake.source(), WAKE, Interest::READABLE)
            .context("failed to register wake socket")?;

        info!(port = local_addr.port(), "Server started at localhost");

        Ok(Self {
            poll,
            events: Events::with_capacity(EVENT_CAPACITY),
            listener,
            wake,
            outbox: Outbox::new(notifier.clone()),
            notifier,
            connections: HashMap::new(),
            next_token: FIRST_CLIENT,
            buffer: vec![0u8; RECV_BUFFER_SIZE].into_boxed_slice(),
            local_addr,
        })
    }

    pub fn from_config(cfg: &ServerConfig) -> anyhow::Result<Self> {
        Self::bind(cfg.port)
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// A handle other threads can use to cut the current readiness wait short.
    pub fn notifier(&self) -> Notifier {
        self.notifier.clone()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Response slots not yet flushed, across all connections.
    pub fn pending_responses(&self) -> usize {
        self.outbox.len()
    }

    /// Runs one tick: wait up to `timeout` for readiness, accept, read and
    /// parse, hand new requests to `handler`, flush ready responses, reap.
    pub fn poll<F>(&mut self, mut handler: F, timeout: Duration) -> anyhow::Result<()>
    where
        F: FnMut(&Request, ResponseHandle),
    {
        let flush_pending = self.connections.values().any(Connection::wants_flush);
        let timeout = if flush_pending { Duration::ZERO } else { timeout };

        match self.poll.poll(&mut self.events, Some(timeout)) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::Interrupted => return Ok(()),
            Err(e) => {
                warn!(error = %e, "readiness wait failed");
                return Err(e).context("readiness wait failed");
            }
        }

        if self.events.is_empty() && !flush_pending {
            return Ok(());
        }

        let mut accept = false;
        for event in self.events.iter() {
            match event.token() {
                LISTENER => accept = true,
                WAKE => {
                    self.wake.drain();
                }
                token => {
                    if let Some(conn) = self.connections.get_mut(&token) {
                        if event.is_readable() || event.is_read_closed() || event.is_error() {
                            conn.mark_readable();
                        }
                        if event.is_writable() {
                            conn.mark_writable();
                        }
                    }
                }
            }
        }

        if accept {
            self.accept();
        }

        for conn in self.connections.values_mut() {
            conn.read_ready(&mut self.buffer, &mut handler);
        }

        for conn in self.connections.values_mut() {
            conn.flush();
        }

        let registry = self.poll.registry();
        self.connections.retain(|_, conn| {
            if conn.is_open() {
                return true;
            }
            if let Err(e) = registry.deregister(conn.source()) {
                debug!(peer = %conn.peer(), error = %e, "failed to deregister client");
            }
            false
        });

        Ok(())
    }

    fn accept(&mut self) {
        loop {
            match self.listener.accept() {
                Ok((mut stream, peer)) => {
                    let token = Token(self.next_token);
                    self.next_token += 1;

                    if let Err(e) = self.poll.registry().register(
                        &mut stream,
                        token,
                        Interest::READABLE | Interest::WRITABLE,
                    ) {
                        debug!(%peer, error = %e, "failed to register client");
                        continue;
                    }

                    debug!(%peer, token = token.0, "client connected");
                    self.connections
                        .insert(token, Connection::new(stream, peer, self.outbox.clone()));
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => {
                    // try again on the next readiness report
                    debug!(error = %e, "accept failed");
                    return;
                }
            }
        }
    }
}
