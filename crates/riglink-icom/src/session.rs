//! RemoteSession -- one running connection to a radio.
//!
//! A session owns one channel task per logical channel (control, CI-V and
//! audio by default). The channels share nothing but the event broadcast;
//! each one discovers, authenticates and keeps itself alive on its own.
//! Build one with [`SessionBuilder`](crate::builder::SessionBuilder).

use std::net::SocketAddr;
use std::time::Duration;

use tokio::sync::broadcast;
use tracing::debug;

use riglink_core::error::{Error, Result};
use riglink_core::events::LinkEvent;
use riglink_core::transport::DatagramTransport;
use riglink_core::types::{Channel, ChannelStatus};

use crate::io::{self, ChannelIo};
use crate::machine::ConnectionStateMachine;

/// How often [`RemoteSession::wait_established`] re-checks status.
const ESTABLISH_POLL: Duration = Duration::from_millis(20);

/// A running remote-control session.
///
/// Dropping the session cancels every channel task; call
/// [`stop()`](RemoteSession::stop) instead to tell the radio first.
pub struct RemoteSession {
    our_identifier: u32,
    channels: Vec<ChannelIo>,
    event_tx: broadcast::Sender<LinkEvent>,
}

impl RemoteSession {
    pub(crate) fn new(our_identifier: u32, event_tx: broadcast::Sender<LinkEvent>) -> Self {
        RemoteSession {
            our_identifier,
            channels: Vec::new(),
            event_tx,
        }
    }

    /// Connect `transport` to `endpoint` and start the channel's task.
    pub(crate) async fn add_channel(
        &mut self,
        mut transport: Box<dyn DatagramTransport>,
        machine: ConnectionStateMachine,
        endpoint: SocketAddr,
    ) -> Result<()> {
        let channel = machine.channel();
        if self.find(channel).is_some() {
            return Err(Error::InvalidParameter(format!(
                "channel {channel} added twice"
            )));
        }
        transport.connect(endpoint).await?;
        debug!(%channel, %endpoint, "channel task starting");
        let io = io::spawn_channel_task(transport, machine, Some(endpoint), self.event_tx.clone());
        self.channels.push(io);
        Ok(())
    }

    fn find(&self, channel: Channel) -> Option<&ChannelIo> {
        self.channels.iter().find(|io| io.channel == channel)
    }

    /// Identifier this client announces on every channel.
    pub fn our_identifier(&self) -> u32 {
        self.our_identifier
    }

    /// The channels this session runs, in start order.
    pub fn channels(&self) -> Vec<Channel> {
        self.channels.iter().map(|io| io.channel).collect()
    }

    /// Status of one channel.
    ///
    /// Returns [`Error::InvalidParameter`] for a channel the session does
    /// not run and [`Error::NotConnected`] if its task has exited.
    pub async fn status(&self, channel: Channel) -> Result<ChannelStatus> {
        let io = self
            .find(channel)
            .ok_or_else(|| Error::InvalidParameter(format!("channel {channel} is not running")))?;
        io.status().await
    }

    /// Status of every channel, in start order.
    pub async fn statuses(&self) -> Result<Vec<ChannelStatus>> {
        let mut out = Vec::with_capacity(self.channels.len());
        for io in &self.channels {
            out.push(io.status().await?);
        }
        Ok(out)
    }

    /// Subscribe to link events from every channel.
    pub fn subscribe(&self) -> broadcast::Receiver<LinkEvent> {
        self.event_tx.subscribe()
    }

    /// Wait until every channel has completed its handshake.
    ///
    /// Returns [`Error::Timeout`] if that does not happen within `timeout`.
    pub async fn wait_established(&self, timeout: Duration) -> Result<()> {
        let wait = async {
            loop {
                let statuses = self.statuses().await?;
                if statuses.iter().all(|s| s.state.is_established()) {
                    return Ok::<(), Error>(());
                }
                tokio::time::sleep(ESTABLISH_POLL).await;
            }
        };
        match tokio::time::timeout(timeout, wait).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout),
        }
    }

    /// Stop every channel (bound channels send Disconnect) and close the
    /// transports.
    pub async fn stop(mut self) -> Result<()> {
        let channels = std::mem::take(&mut self.channels);
        for io in channels {
            let channel = io.channel;
            let mut transport = io.shutdown().await?;
            transport.close().await?;
            debug!(%channel, "channel closed");
        }
        Ok(())
    }
}

impl Drop for RemoteSession {
    fn drop(&mut self) {
        for io in &self.channels {
            io.cancel.cancel();
        }
    }
}
