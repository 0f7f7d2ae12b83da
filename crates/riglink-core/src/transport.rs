//! Datagram transport trait for remote radio links.
//!
//! The [`DatagramTransport`] trait abstracts over the socket that carries one
//! logical channel (control, CI-V or audio) to the radio. The real
//! implementation is `UdpTransport` in `riglink-transport`; tests use
//! `MockDatagramTransport` from `riglink-test-harness`.
//!
//! The protocol engine never blocks on the transport for long: receives are
//! always bounded by a timeout so the channel task can service timers and
//! commands in between.

use async_trait::async_trait;
use std::net::SocketAddr;
use std::time::Duration;

use crate::error::Result;

/// Asynchronous datagram transport to a single remote endpoint.
///
/// Each datagram passed to [`send`](DatagramTransport::send) is delivered
/// whole or not at all; each successful
/// [`receive`](DatagramTransport::receive) yields exactly one datagram.
/// No ordering, delivery or de-duplication guarantees are assumed.
#[async_trait]
pub trait DatagramTransport: Send + Sync {
    /// Set the remote endpoint all subsequent datagrams are sent to and
    /// received from.
    async fn connect(&mut self, remote: SocketAddr) -> Result<()>;

    /// Send one datagram to the connected endpoint.
    async fn send(&mut self, datagram: &[u8]) -> Result<()>;

    /// Receive one datagram into `buf`, returning its length.
    ///
    /// Waits up to `timeout`; returns [`Error::Timeout`](crate::error::Error::Timeout)
    /// if nothing arrives. Any other error means the link is unusable and
    /// the channel should be reset.
    async fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize>;

    /// Close the transport.
    ///
    /// After calling `close()`, `send()` and `receive()` return
    /// [`Error::NotConnected`](crate::error::Error::NotConnected).
    async fn close(&mut self) -> Result<()>;

    /// Whether a remote endpoint is set and the transport is open.
    fn is_connected(&self) -> bool;
}
