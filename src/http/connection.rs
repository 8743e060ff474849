use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::net::SocketAddr;

use bytes::{Buf, BytesMut};
use mio::net::TcpStream;

use crate::http::outbox::{Outbox, ResponseHandle, SlotId};
use crate::http::parser::RequestParser;
use crate::http::request::Request;

/// One accepted client: its socket, parser and FIFO of response slots.
///
/// Only the event-loop thread touches a connection. Dropping it discards
/// every slot it still owns.
pub struct Connection {
    stream: TcpStream,
    peer: SocketAddr,
    parser: RequestParser,
    queue: VecDeque<SlotId>,
    outgoing: BytesMut,
    readable: bool,
    writable: bool,
    state: ConnectionState,
    outbox: Outbox,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Open,
    Closed,
}

/// How a single non-blocking recv/send turned out.
#[derive(Debug)]
pub enum IoOutcome {
    Transferred(usize),
    WouldBlock,
    Interrupted,
    /// Zero bytes: peer closed on read, or the transport took nothing on write
    Closed,
    Failed(io::Error),
    /// More bytes reported than the buffer offered
    Overlong(usize),
}

pub fn classify_io(result: io::Result<usize>, capacity: usize) -> IoOutcome {
    match result {
        Ok(0) => IoOutcome::Closed,
        Ok(n) if n > capacity => IoOutcome::Overlong(n),
        Ok(n) => IoOutcome::Transferred(n),
        Err(e) if e.kind() == io::ErrorKind::WouldBlock => IoOutcome::WouldBlock,
        Err(e) if e.kind() == io::ErrorKind::Interrupted => IoOutcome::Interrupted,
        Err(e) => IoOutcome::Failed(e),
    }
}

impl Connection {
    pub fn new(stream: TcpStream, peer: SocketAddr, outbox: Outbox) -> Self {
        Self {
            stream,
            peer,
            parser: RequestParser::new(),
            queue: VecDeque::new(),
            outgoing: BytesMut::new(),
            readable: false,
            writable: false,
            state: ConnectionState::Open,
            outbox,
        }
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn source(&mut self) -> &mut TcpStream {
        &mut self.stream
    }

    pub fn is_open(&self) -> bool {
        self.state == ConnectionState::Open
    }

    pub fn mark_readable(&mut self) {
        self.readable = true;
    }

    pub fn mark_writable(&mut self) {
        self.writable = true;
    }

    /// True when bytes could go out right now without waiting for readiness.
    pub fn wants_flush(&self) -> bool {
        self.is_open() && self.writable && self.has_ready_output()
    }

    fn has_ready_output(&self) -> bool {
        !self.outgoing.is_empty()
            || self
                .queue
                .front()
                .is_some_and(|&id| self.outbox.is_ready(id))
    }

    fn close(&mut self, reason: &str) {
        if self.is_open() {
            tracing::debug!(peer = %self.peer, reason, "disconnecting client");
            self.state = ConnectionState::Closed;
        }
    }

    /// Reads until the socket would block, feeding the parser. Does nothing
    /// unless readiness was reported since the last would-block.
    ///
    /// Each completed request gets a new slot at the tail of the queue and
    /// its handle is passed to `handler` right away.
    pub fn read_ready<F>(&mut self, buf: &mut [u8], handler: &mut F)
    where
        F: FnMut(&Request, ResponseHandle),
    {
        while self.is_open() && self.readable {
            match classify_io(self.stream.read(buf), buf.len()) {
                IoOutcome::Transferred(n) => {
                    let queue = &mut self.queue;
                    let outbox = &self.outbox;
                    let parsed = self.parser.feed(&buf[..n], |request| {
                        let (id, handle) = outbox.handle();
                        queue.push_back(id);
                        handler(&request, handle);
                    });
                    if let Err(e) = parsed {
                        tracing::debug!(peer = %self.peer, error = %e, "failed parsing request");
                        self.close("parse error");
                    }
                }
                IoOutcome::WouldBlock => self.readable = false,
                IoOutcome::Interrupted => {}
                IoOutcome::Closed => self.close("peer closed"),
                IoOutcome::Failed(e) => {
                    tracing::debug!(peer = %self.peer, error = %e, "recv failed");
                    self.close("recv error");
                }
                IoOutcome::Overlong(n) => {
                    tracing::debug!(peer = %self.peer, bytes = n, "recv returned strange number of bytes");
                    self.close("recv overlong");
                }
            }
        }
    }

    /// Sends ready responses in queue order until the socket would block or
    /// the head slot is not finalized yet.
    pub fn flush(&mut self) {
        while self.is_open() && self.writable {
            if self.outgoing.is_empty() {
                let Some(&head) = self.queue.front() else {
                    return;
                };
                let Some(data) = self.outbox.take_ready(head) else {
                    return;
                };
                self.queue.pop_front();
                self.outgoing = data;
                continue;
            }

            let len = self.outgoing.len();
            match classify_io(self.stream.write(&self.outgoing), len) {
                IoOutcome::Transferred(n) => self.outgoing.advance(n),
                IoOutcome::WouldBlock => self.writable = false,
                IoOutcome::Interrupted => {}
                IoOutcome::Closed => self.close("send accepted zero bytes"),
                IoOutcome::Failed(e) => {
                    tracing::debug!(peer = %self.peer, error = %e, "send failed");
                    self.close("send error");
                }
                IoOutcome::Overlong(n) => {
                    tracing::debug!(peer = %self.peer, sent = n, len, "send returned strange number of bytes");
                    self.close("send overlong");
                }
            }
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if !self.queue.is_empty() {
            tracing::debug!(peer = %self.peer, slots = self.queue.len(), "discarding queued responses");
        }
        self.outbox.discard(self.queue.drain(..));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_io_outcomes() {
        assert!(matches!(classify_io(Ok(5), 10), IoOutcome::Transferred(5)));
        assert!(matches!(classify_io(Ok(0), 10), IoOutcome::Closed));
        assert!(matches!(classify_io(Ok(11), 10), IoOutcome::Overlong(11)));
        assert!(matches!(
            classify_io(Err(io::ErrorKind::WouldBlock.into()), 10),
            IoOutcome::WouldBlock
        ));
        assert!(matches!(
            classify_io(Err(io::ErrorKind::Interrupted.into()), 10),
            IoOutcome::Interrupted
        ));
        assert!(matches!(
            classify_io(Err(io::ErrorKind::ConnectionReset.into()), 10),
            IoOutcome::Failed(_)
        ));
    }
}
