//! Per-channel data shared by every state.
//!
//! The [`ChannelContext`] is owned by the state machine and lent to the
//! active state for each event. States never hold on to it between calls,
//! so there is exactly one writer and no locking.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::time::Instant;

use riglink_core::audio::AudioPipeline;
use riglink_core::types::{Channel, ChannelStatus, Credentials};
use tracing::trace;

use crate::config::ProtocolConfig;
use crate::packet::IcomPacket;
use crate::seq::SequenceCounters;

/// Identifiers, counters and output queue for one channel.
pub(crate) struct ChannelContext {
    pub channel: Channel,
    pub config: ProtocolConfig,
    /// Locally generated, stable for the life of the process.
    pub our_id: u32,
    /// Learned from the radio's IAmHere; `None` until bound.
    pub their_id: Option<u32>,
    pub counters: SequenceCounters,
    pub credentials: Credentials,
    pub client_name: String,
    /// Encoded datagrams waiting for the IO task.
    pub outbox: VecDeque<Vec<u8>>,
    pub audio: Option<Box<dyn AudioPipeline>>,
    pub status: ChannelStatus,
    pub endpoint: Option<SocketAddr>,
    /// Reference point for ping timestamps.
    pub epoch: Instant,
}

impl ChannelContext {
    pub fn new(
        channel: Channel,
        our_id: u32,
        config: ProtocolConfig,
        credentials: Credentials,
        client_name: String,
    ) -> Self {
        ChannelContext {
            channel,
            config,
            our_id,
            their_id: None,
            counters: SequenceCounters::new(),
            credentials,
            client_name,
            outbox: VecDeque::new(),
            audio: None,
            status: ChannelStatus::new(channel),
            endpoint: None,
            epoch: Instant::now(),
        }
    }

    /// The radio's identifier, or zero while unbound.
    pub fn their(&self) -> u32 {
        self.their_id.unwrap_or(0)
    }

    /// Record the radio's identifier.
    pub fn bind(&mut self, their_id: u32) {
        self.their_id = Some(their_id);
        self.status.bound = true;
        self.status.their_identifier = Some(their_id);
    }

    /// Queue a packet for transmission.
    pub fn transmit(&mut self, packet: &IcomPacket) {
        trace!(
            channel = %self.channel,
            packet_type = ?packet.packet_type(),
            seq = packet.sequence(),
            "queue"
        );
        self.outbox.push_back(packet.encode());
    }

    /// Milliseconds since the channel was created, for ping payloads.
    pub fn timestamp_ms(&self, now: Instant) -> u32 {
        now.saturating_duration_since(self.epoch).as_millis() as u32
    }

    /// Forget everything learned from the radio.
    pub fn clear_session(&mut self) {
        self.their_id = None;
        self.counters.reset();
        self.outbox.clear();
        self.status.bound = false;
        self.status.authenticated = false;
        self.status.their_identifier = None;
        self.status.token = None;
        self.status.round_trip = None;
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::packet::{self, IcomPacket};

    pub const OUR_ID: u32 = 0x0A0B_0C0D;
    pub const THEIR_ID: u32 = 0x1234;

    pub fn context(channel: Channel) -> ChannelContext {
        ChannelContext::new(
            channel,
            OUR_ID,
            ProtocolConfig::default(),
            Credentials::new("w1aw", "hunter2"),
            "riglink".into(),
        )
    }

    pub fn bound_context(channel: Channel) -> ChannelContext {
        let mut ctx = context(channel);
        ctx.bind(THEIR_ID);
        ctx
    }

    /// Decode and empty the outbox.
    pub fn drain(ctx: &mut ChannelContext) -> Vec<IcomPacket> {
        ctx.outbox
            .drain(..)
            .map(|raw| packet::decode(&raw).expect("engine emitted a malformed packet"))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    #[test]
    fn bind_updates_status() {
        let mut ctx = context(Channel::Control);
        assert_eq!(ctx.their(), 0);
        ctx.bind(THEIR_ID);
        assert_eq!(ctx.their(), THEIR_ID);
        assert!(ctx.status.bound);
        assert_eq!(ctx.status.their_identifier, Some(THEIR_ID));
    }

    #[test]
    fn clear_session_forgets_radio() {
        let mut ctx = bound_context(Channel::Civ);
        ctx.counters.next_tracked();
        ctx.status.token = Some(7);
        ctx.transmit(&IcomPacket::are_you_there(OUR_ID));
        ctx.clear_session();
        assert_eq!(ctx.their_id, None);
        assert_eq!(ctx.counters.next_tracked(), 0);
        assert!(ctx.outbox.is_empty());
        assert!(!ctx.status.bound);
        assert_eq!(ctx.status.token, None);
    }
}
