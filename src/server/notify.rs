//! Loopback datagram wake channel.
//!
//! The event loop owns a UDP socket bound to an ephemeral loopback port and
//! keeps it in its read-interest set. Any thread holding a [`Notifier`] can
//! send it a single byte, which makes a blocked readiness wait return so
//! that freshly finalized responses get flushed without waiting out the
//! timeout.

use std::io;
use std::net::{Ipv4Addr, SocketAddr, UdpSocket};
use std::sync::Arc;

use anyhow::Context;

/// Receiving end, owned by the event loop.
pub struct WakeSocket {
    socket: mio::net::UdpSocket,
}

/// Cloneable, thread-safe sending end.
#[derive(Debug, Clone)]
pub struct Notifier {
    socket: Arc<UdpSocket>,
    target: SocketAddr,
}

impl WakeSocket {
    pub fn bind() -> anyhow::Result<(Self, Notifier)> {
        let loopback = SocketAddr::from((Ipv4Addr::LOCALHOST, 0));

        let socket = mio::net::UdpSocket::bind(loopback).context("failed to bind wake socket")?;
        let target = socket.local_addr().context("failed to read wake socket address")?;

        let sender = UdpSocket::bind(loopback).context("failed to bind wake sender")?;
        sender
            .set_nonblocking(true)
            .context("failed to make wake sender non-blocking")?;

        let notifier = Notifier {
            socket: Arc::new(sender),
            target,
        };
        Ok((Self { socket }, notifier))
    }

    pub fn source(&mut self) -> &mut mio::net::UdpSocket {
        &mut self.socket
    }

    /// Discards every pending wake datagram. Returns how many were read.
    pub fn drain(&self) -> usize {
        let mut buf = [0u8; 64];
        let mut count = 0;
        loop {
            match self.socket.recv(&mut buf) {
                Ok(_) => count += 1,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    if e.kind() != io::ErrorKind::WouldBlock {
                        tracing::debug!(error = %e, "wake socket recv failed");
                    }
                    return count;
                }
            }
        }
    }
}

impl Notifier {
    /// Makes the owning loop's next (or current) readiness wait return promptly.
    pub fn notify(&self) {
        match self.socket.send_to(&[1], self.target) {
            Ok(_) => {}
            // a full receive buffer already guarantees a wake-up
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
            Err(e) => tracing::trace!(error = %e, "wake notification dropped"),
        }
    }
}
