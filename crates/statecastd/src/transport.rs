//! UDP transport: bind the relay socket and push datagrams out of it.
//!
//! Sends are fire-and-forget: a failed send is logged and forgotten, the
//! protocol has no delivery confirmation to report it to.

use std::net::SocketAddr;

use anyhow::{Context, Result};
use bytes::Bytes;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;

/// One datagram ready to leave the relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outbound {
    pub to: SocketAddr,
    pub bytes: Bytes,
}

impl Outbound {
    pub fn new(to: SocketAddr, bytes: impl Into<Bytes>) -> Self {
        Self {
            to,
            bytes: bytes.into(),
        }
    }
}

/// Bind the relay's non-blocking UDP socket.
pub fn bind(addr: SocketAddr) -> Result<UdpSocket> {
    let domain = if addr.is_ipv4() { Domain::IPV4 } else { Domain::IPV6 };
    let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP)).context("socket()")?;

    if addr.is_ipv6() {
        // Accept IPv4-mapped clients too when bound to [::].
        socket.set_only_v6(false).context("IPV6_V6ONLY")?;
    }
    socket.set_nonblocking(true).context("set_nonblocking")?;
    socket
        .bind(&addr.into())
        .with_context(|| format!("bind({addr})"))?;

    UdpSocket::from_std(socket.into()).context("failed to convert to tokio UdpSocket")
}

/// Send every datagram. Returns how many were handed to the OS.
pub async fn send_all(socket: &UdpSocket, outbound: &[Outbound]) -> usize {
    let mut sent = 0;
    for datagram in outbound {
        match socket.send_to(&datagram.bytes, datagram.to).await {
            Ok(n) => {
                sent += 1;
                tracing::trace!(to = %datagram.to, bytes = n, "datagram sent");
            }
            Err(e) => tracing::warn!(to = %datagram.to, error = %e, "send_to failed"),
        }
    }
    sent
}
