//! Mock datagram transport for deterministic testing of channel tasks.
//!
//! [`MockDatagramTransport`] implements [`DatagramTransport`] without a
//! socket. It is created together with a [`MockDatagramHandle`], which the
//! test keeps after the transport itself has been moved into a channel
//! task. Through the handle a test can inject inbound datagrams, inspect
//! every datagram the engine sent, and make the transport fail.
//!
//! # Example
//!
//! ```
//! use riglink_test_harness::MockDatagramTransport;
//!
//! let (transport, handle) = MockDatagramTransport::new();
//! // Script a datagram for the engine to receive.
//! handle.inject(&[0x14, 0x00, 0x00, 0x00, 0x04, 0x00]);
//! assert!(handle.sent().is_empty());
//! # drop(transport);
//! ```

use async_trait::async_trait;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;

use riglink_core::error::{Error, Result};
use riglink_core::transport::DatagramTransport;

#[derive(Debug, Default)]
struct Shared {
    /// Every datagram passed to `send()`, in order.
    sent_log: Mutex<Vec<Vec<u8>>>,
    /// Endpoint passed to `connect()`.
    remote: Mutex<Option<SocketAddr>>,
    /// When set, the next `send()`/`receive()` fails with `ConnectionLost`.
    fail_next: AtomicBool,
    /// Set once `close()` has been called.
    closed: AtomicBool,
}

/// A mock [`DatagramTransport`] fed from a [`MockDatagramHandle`].
#[derive(Debug)]
pub struct MockDatagramTransport {
    shared: Arc<Shared>,
    inbound: mpsc::UnboundedReceiver<Vec<u8>>,
}

/// Test-side handle to a [`MockDatagramTransport`].
#[derive(Debug, Clone)]
pub struct MockDatagramHandle {
    shared: Arc<Shared>,
    inbound: mpsc::UnboundedSender<Vec<u8>>,
}

impl MockDatagramTransport {
    /// Create an unconnected mock transport and its handle.
    pub fn new() -> (MockDatagramTransport, MockDatagramHandle) {
        let shared = Arc::new(Shared::default());
        let (tx, rx) = mpsc::unbounded_channel();
        (
            MockDatagramTransport {
                shared: shared.clone(),
                inbound: rx,
            },
            MockDatagramHandle { shared, inbound: tx },
        )
    }

    fn take_failure(&self) -> Result<()> {
        if self.shared.fail_next.swap(false, Ordering::SeqCst) {
            return Err(Error::ConnectionLost);
        }
        Ok(())
    }

    fn ensure_open(&self) -> Result<()> {
        if self.shared.closed.load(Ordering::SeqCst) {
            return Err(Error::NotConnected);
        }
        Ok(())
    }
}

impl MockDatagramHandle {
    /// Queue a datagram for the engine to receive.
    pub fn inject(&self, datagram: &[u8]) {
        // The receiver only goes away with the transport; nothing to report then.
        let _ = self.inbound.send(datagram.to_vec());
    }

    /// All datagrams sent so far.
    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.shared
            .sent_log
            .lock()
            .map(|log| log.clone())
            .unwrap_or_default()
    }

    /// Number of datagrams sent so far.
    pub fn sent_count(&self) -> usize {
        self.shared.sent_log.lock().map(|log| log.len()).unwrap_or(0)
    }

    /// Forget the datagrams sent so far.
    pub fn clear_sent(&self) {
        if let Ok(mut log) = self.shared.sent_log.lock() {
            log.clear();
        }
    }

    /// The endpoint the engine connected to, if any.
    pub fn remote(&self) -> Option<SocketAddr> {
        self.shared.remote.lock().ok().and_then(|r| *r)
    }

    /// Make the next `send()` or `receive()` fail with
    /// [`Error::ConnectionLost`].
    pub fn fail_next(&self) {
        self.shared.fail_next.store(true, Ordering::SeqCst);
    }

    /// Whether the engine closed the transport.
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DatagramTransport for MockDatagramTransport {
    async fn connect(&mut self, remote: SocketAddr) -> Result<()> {
        self.ensure_open()?;
        if let Ok(mut r) = self.shared.remote.lock() {
            *r = Some(remote);
        }
        Ok(())
    }

    async fn send(&mut self, datagram: &[u8]) -> Result<()> {
        self.ensure_open()?;
        self.take_failure()?;
        if let Ok(mut log) = self.shared.sent_log.lock() {
            log.push(datagram.to_vec());
        }
        Ok(())
    }

    async fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        self.ensure_open()?;
        self.take_failure()?;
        match tokio::time::timeout(timeout, self.inbound.recv()).await {
            Ok(Some(datagram)) => {
                let n = datagram.len().min(buf.len());
                buf[..n].copy_from_slice(&datagram[..n]);
                Ok(n)
            }
            // Handle dropped: behave like a quiet socket.
            Ok(None) => {
                tokio::time::sleep(timeout).await;
                Err(Error::Timeout)
            }
            Err(_) => Err(Error::Timeout),
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.shared.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        !self.shared.closed.load(Ordering::SeqCst)
            && self.shared.remote.lock().map(|r| r.is_some()).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr() -> SocketAddr {
        "192.168.1.50:50001".parse().unwrap()
    }

    #[tokio::test]
    async fn records_sent_datagrams() {
        let (mut transport, handle) = MockDatagramTransport::new();
        transport.connect(addr()).await.unwrap();
        transport.send(&[1, 2, 3]).await.unwrap();
        transport.send(&[4]).await.unwrap();

        assert_eq!(handle.sent(), vec![vec![1, 2, 3], vec![4]]);
        assert_eq!(handle.sent_count(), 2);
        assert_eq!(handle.remote(), Some(addr()));
        assert!(transport.is_connected());

        handle.clear_sent();
        assert_eq!(handle.sent_count(), 0);
    }

    #[tokio::test]
    async fn delivers_injected_datagrams_in_order() {
        let (mut transport, handle) = MockDatagramTransport::new();
        handle.inject(&[0xAA]);
        handle.inject(&[0xBB, 0xCC]);

        let mut buf = [0u8; 16];
        let n = transport
            .receive(&mut buf, Duration::from_millis(50))
            .await
            .unwrap();
        assert_eq!(&buf[..n], &[0xAA]);
        let n = transport
            .receive(&mut buf, Duration::from_millis(50))
            .await
            .unwrap();
        assert_eq!(&buf[..n], &[0xBB, 0xCC]);
    }

    #[tokio::test]
    async fn receive_times_out_when_idle() {
        let (mut transport, _handle) = MockDatagramTransport::new();
        let mut buf = [0u8; 16];
        let result = transport.receive(&mut buf, Duration::from_millis(10)).await;
        assert!(matches!(result, Err(Error::Timeout)));
    }

    #[tokio::test]
    async fn injected_failure_fires_once() {
        let (mut transport, handle) = MockDatagramTransport::new();
        handle.fail_next();

        assert!(matches!(
            transport.send(&[1]).await,
            Err(Error::ConnectionLost)
        ));
        assert!(transport.send(&[1]).await.is_ok());
    }

    #[tokio::test]
    async fn close_marks_handle() {
        let (mut transport, handle) = MockDatagramTransport::new();
        transport.close().await.unwrap();
        assert!(handle.is_closed());
        assert!(matches!(
            transport.send(&[1]).await,
            Err(Error::NotConnected)
        ));
    }
}
