//! UDP transport for the radio's network channels.
//!
//! [`UdpTransport`] wraps a [`tokio::net::UdpSocket`] and implements
//! [`DatagramTransport`]. Each protocol channel (control, CI-V, audio)
//! binds its own socket and connects it to the radio's port for that
//! channel, so the OS filters out datagrams from anyone else.
//!
//! # Example
//!
//! ```no_run
//! use riglink_core::DatagramTransport;
//! use riglink_transport::UdpTransport;
//! use std::time::Duration;
//!
//! # async fn example() -> riglink_core::Result<()> {
//! let mut transport = UdpTransport::bind("0.0.0.0:0").await?;
//! transport.connect("192.168.1.50:50001".parse().unwrap()).await?;
//!
//! transport.send(&[0x10, 0x00, 0x00, 0x00]).await?;
//!
//! let mut buf = [0u8; 1500];
//! let n = transport.receive(&mut buf, Duration::from_millis(100)).await?;
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use riglink_core::error::{Error, Result};
use riglink_core::transport::DatagramTransport;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;

/// UDP transport for one protocol channel.
#[derive(Debug)]
pub struct UdpTransport {
    /// The underlying UDP socket; `None` once closed.
    socket: Option<UdpSocket>,
    /// The local address the socket is bound to.
    local_addr: SocketAddr,
    /// The radio endpoint, once connected.
    remote: Option<SocketAddr>,
}

impl UdpTransport {
    /// Bind to a local address.
    ///
    /// Use `"0.0.0.0:0"` to bind to any available port on all interfaces.
    pub async fn bind(addr: &str) -> Result<Self> {
        tracing::debug!(addr = %addr, "Binding UDP socket");

        let socket = UdpSocket::bind(addr).await.map_err(|e| {
            tracing::error!(addr = %addr, error = %e, "Failed to bind UDP socket");
            Error::Io(e)
        })?;

        let local_addr = socket.local_addr().map_err(|e| {
            tracing::error!(error = %e, "Failed to get local address");
            Error::Io(e)
        })?;

        tracing::debug!(local_addr = %local_addr, "UDP socket bound");

        Ok(Self {
            socket: Some(socket),
            local_addr,
            remote: None,
        })
    }

    /// Bind to a specific port on all interfaces (0 for any port).
    pub async fn bind_port(port: u16) -> Result<Self> {
        Self::bind(&format!("0.0.0.0:{}", port)).await
    }

    /// Get the local address this socket is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// The connected remote endpoint, if any.
    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote
    }

    fn socket(&self) -> Result<&UdpSocket> {
        self.socket.as_ref().ok_or(Error::NotConnected)
    }

    /// Send a datagram to an explicit address, regardless of `connect`.
    pub async fn send_to(&self, data: &[u8], addr: SocketAddr) -> Result<()> {
        tracing::trace!(
            local = %self.local_addr,
            remote = %addr,
            bytes = data.len(),
            "Sending datagram"
        );

        self.socket()?.send_to(data, addr).await.map_err(|e| {
            tracing::error!(
                local = %self.local_addr,
                remote = %addr,
                error = %e,
                "Failed to send datagram"
            );
            Error::Io(e)
        })?;

        Ok(())
    }

    /// Receive a datagram with timeout. Returns `(bytes_read, source_addr)`.
    ///
    /// Returns [`Error::Timeout`] if no datagram arrives within `timeout`.
    pub async fn recv_from(
        &self,
        buf: &mut [u8],
        timeout: Duration,
    ) -> Result<(usize, SocketAddr)> {
        let socket = self.socket()?;
        let result = tokio::time::timeout(timeout, socket.recv_from(buf)).await;

        match result {
            Ok(Ok((n, src))) => {
                tracing::trace!(
                    local = %self.local_addr,
                    remote = %src,
                    bytes = n,
                    "Received datagram"
                );
                Ok((n, src))
            }
            Ok(Err(e)) => {
                tracing::debug!(
                    local = %self.local_addr,
                    error = %e,
                    "Failed to receive datagram"
                );
                Err(Error::Io(e))
            }
            Err(_) => Err(Error::Timeout),
        }
    }
}

#[async_trait]
impl DatagramTransport for UdpTransport {
    /// Connect this socket to the radio's channel port.
    ///
    /// UDP "connect" performs no handshake; it sets the default
    /// destination and makes the OS drop datagrams from other sources.
    async fn connect(&mut self, remote: SocketAddr) -> Result<()> {
        tracing::debug!(
            local = %self.local_addr,
            remote = %remote,
            "Connecting UDP socket to remote address"
        );

        self.socket()?.connect(remote).await.map_err(|e| {
            tracing::error!(
                local = %self.local_addr,
                remote = %remote,
                error = %e,
                "Failed to connect UDP socket"
            );
            Error::Io(e)
        })?;

        self.remote = Some(remote);
        Ok(())
    }

    async fn send(&mut self, datagram: &[u8]) -> Result<()> {
        let remote = self.remote.ok_or(Error::NotConnected)?;
        tracing::trace!(
            local = %self.local_addr,
            remote = %remote,
            bytes = datagram.len(),
            "Sending datagram"
        );
        self.socket()?.send(datagram).await.map_err(|e| {
            tracing::error!(
                local = %self.local_addr,
                remote = %remote,
                error = %e,
                "Failed to send datagram"
            );
            Error::Io(e)
        })?;
        Ok(())
    }

    async fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        if self.remote.is_none() {
            return Err(Error::NotConnected);
        }
        let (n, _src) = self.recv_from(buf, timeout).await?;
        Ok(n)
    }

    async fn close(&mut self) -> Result<()> {
        tracing::debug!(local = %self.local_addr, "Closing UDP socket");
        self.socket = None;
        self.remote = None;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.socket.is_some() && self.remote.is_some()
    }
}
