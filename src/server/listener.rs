use std::net::{Ipv4Addr, SocketAddr};

use anyhow::Context;
use socket2::{Domain, Protocol, Socket, Type};

/// Pending-connection queue length handed to `listen(2)`.
pub const ACCEPT_BACKLOG: i32 = 5;

/// Binds a non-blocking listener on the loopback interface only.
///
/// Port 0 picks an ephemeral port. Every setup step is fatal.
pub fn bind_loopback(port: u16) -> anyhow::Result<mio::net::TcpListener> {
    let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, port));

    let socket = Socket::new(Domain::IPV4, Type::STREAM, Some(Protocol::TCP))
        .context("failed to create socket")?;
    socket
        .set_reuse_address(true)
        .context("failed to set socket reuse address")?;
    socket
        .set_nonblocking(true)
        .context("failed to make socket non-blocking")?;
    socket
        .bind(&addr.into())
        .with_context(|| format!("failed to bind socket to {addr}"))?;
    socket
        .listen(ACCEPT_BACKLOG)
        .context("failed to listen on socket")?;

    let listener: std::net::TcpListener = socket.into();
    Ok(mio::net::TcpListener::from_std(listener))
}
