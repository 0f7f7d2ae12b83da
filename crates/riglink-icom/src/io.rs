//! Channel task: drives one [`ConnectionStateMachine`] over a transport.
//!
//! Each channel gets its own Tokio task that owns the transport and the
//! state machine exclusively. Every packet arrival and timer firing for
//! the channel is serialized through this one task, so the machine needs
//! no locking. Callers talk to the task through a small request channel.
//!
//! The loop uses `tokio::select! { biased; }` to prioritize:
//! 1. Cancellation
//! 2. Requests (status, shutdown)
//! 3. The state machine's next deadline
//! 4. Inbound datagrams

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use riglink_core::error::{Error, Result};
use riglink_core::events::LinkEvent;
use riglink_core::transport::DatagramTransport;
use riglink_core::types::{Channel, ChannelStatus};

use crate::machine::ConnectionStateMachine;

/// Largest datagram the radio sends.
const MAX_DATAGRAM: usize = 1500;

/// Upper bound on a single receive wait. Timers and requests preempt it.
const RECEIVE_POLL: Duration = Duration::from_secs(1);

/// Pause after a transport error before the next attempt.
const TRANSPORT_BACKOFF: Duration = Duration::from_millis(500);

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// A request from the session to a channel task.
pub(crate) enum Request {
    /// Snapshot the channel's status.
    Status {
        reply: oneshot::Sender<ChannelStatus>,
    },
    /// Stop the channel (sending Disconnect if bound) and hand back the
    /// transport.
    Shutdown {
        reply: oneshot::Sender<Box<dyn DatagramTransport>>,
    },
}

/// Handle to a channel task. Stored inside `RemoteSession`.
pub(crate) struct ChannelIo {
    pub channel: Channel,
    pub cmd_tx: mpsc::Sender<Request>,
    pub cancel: CancellationToken,
    pub task: JoinHandle<()>,
}

impl ChannelIo {
    /// Current status of the channel.
    pub async fn status(&self) -> Result<ChannelStatus> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.cmd_tx
            .send(Request::Status { reply: reply_tx })
            .await
            .map_err(|_| Error::NotConnected)?;
        reply_rx.await.map_err(|_| Error::NotConnected)
    }

    /// Stop the channel task and recover the transport.
    pub async fn shutdown(self) -> Result<Box<dyn DatagramTransport>> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let _ = self
            .cmd_tx
            .send(Request::Shutdown { reply: reply_tx })
            .await;
        let transport = reply_rx.await.map_err(|_| Error::NotConnected)?;
        let _ = self.task.await;
        Ok(transport)
    }
}

// ---------------------------------------------------------------------------
// Spawn
// ---------------------------------------------------------------------------

/// Spawn the task for one channel. The transport must already be
/// connected to the radio's port for this channel.
pub(crate) fn spawn_channel_task(
    transport: Box<dyn DatagramTransport>,
    machine: ConnectionStateMachine,
    endpoint: Option<SocketAddr>,
    event_tx: broadcast::Sender<LinkEvent>,
) -> ChannelIo {
    let (cmd_tx, cmd_rx) = mpsc::channel::<Request>(8);
    let cancel = CancellationToken::new();
    let channel = machine.channel();

    let task = tokio::spawn(channel_loop(
        transport,
        machine,
        endpoint,
        event_tx,
        cmd_rx,
        cancel.clone(),
    ));

    ChannelIo {
        channel,
        cmd_tx,
        cancel,
        task,
    }
}

// ---------------------------------------------------------------------------
// Loop
// ---------------------------------------------------------------------------

/// Wall-clock for the machine. Taken from Tokio so paused-time tests see
/// the same clock as the timers.
fn now() -> Instant {
    tokio::time::Instant::now().into_std()
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(tokio::time::Instant::from_std(at)).await,
        None => std::future::pending().await,
    }
}

async fn channel_loop(
    mut transport: Box<dyn DatagramTransport>,
    mut machine: ConnectionStateMachine,
    endpoint: Option<SocketAddr>,
    event_tx: broadcast::Sender<LinkEvent>,
    mut cmd_rx: mpsc::Receiver<Request>,
    cancel: CancellationToken,
) {
    let channel = machine.channel();
    machine.start(endpoint, now());

    let mut buf = vec![0u8; MAX_DATAGRAM];

    loop {
        if let Err(e) = flush(&mut *transport, &mut machine).await {
            warn!(%channel, error = %e, "send failed");
            machine.on_transport_disconnect(now());
            forward_events(&mut machine, &event_tx);
            tokio::time::sleep(TRANSPORT_BACKOFF).await;
            continue;
        }
        forward_events(&mut machine, &event_tx);

        let deadline = machine.next_deadline();

        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                debug!(%channel, "channel task cancelled");
                break;
            }

            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(Request::Status { reply }) => {
                        let _ = reply.send(machine.status().clone());
                    }
                    Some(Request::Shutdown { reply }) => {
                        debug!(%channel, "channel shutdown requested");
                        machine.stop();
                        let _ = flush(&mut *transport, &mut machine).await;
                        forward_events(&mut machine, &event_tx);
                        let _ = reply.send(transport);
                        return;
                    }
                    None => {
                        debug!(%channel, "all request senders dropped, exiting channel task");
                        break;
                    }
                }
            }

            _ = sleep_until(deadline) => {
                machine.on_timer_tick(now());
            }

            result = transport.receive(&mut buf, RECEIVE_POLL) => {
                match result {
                    Ok(n) => machine.on_packet_received(&buf[..n], now()),
                    Err(Error::Timeout) => {}
                    Err(e) => {
                        warn!(%channel, error = %e, "receive failed");
                        machine.on_transport_disconnect(now());
                        forward_events(&mut machine, &event_tx);
                        tokio::time::sleep(TRANSPORT_BACKOFF).await;
                    }
                }
            }
        }
    }

    machine.stop();
    let _ = flush(&mut *transport, &mut machine).await;
    forward_events(&mut machine, &event_tx);
    let _ = transport.close().await;
}

/// Send everything the machine has queued.
async fn flush(
    transport: &mut dyn DatagramTransport,
    machine: &mut ConnectionStateMachine,
) -> Result<()> {
    while let Some(datagram) = machine.poll_transmit() {
        transport.send(&datagram).await?;
    }
    Ok(())
}

fn forward_events(machine: &mut ConnectionStateMachine, event_tx: &broadcast::Sender<LinkEvent>) {
    while let Some(event) = machine.poll_event() {
        // No subscribers is fine.
        let _ = event_tx.send(event);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
