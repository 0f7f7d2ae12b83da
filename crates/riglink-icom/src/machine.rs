//! Per-channel connection state machine.
//!
//! [`ConnectionStateMachine`] is sans-IO: it never touches a socket or a
//! clock. The owner feeds it raw datagrams and timer ticks with an explicit
//! `now`, then drains the datagrams it wants sent with
//! [`poll_transmit`](ConnectionStateMachine::poll_transmit) and the events
//! it raised with [`poll_event`](ConnectionStateMachine::poll_event).
//! [`next_deadline`](ConnectionStateMachine::next_deadline) says when the
//! next tick is due.
//!
//! The channel task in [`crate::io`] is the production owner; tests drive
//! the machine directly and step time by hand.
//!
//! # Example
//!
//! ```
//! use std::time::Instant;
//! use riglink_core::{Channel, Credentials, StateKind};
//! use riglink_icom::machine::ConnectionStateMachine;
//! use riglink_icom::packet::{decode, IcomPacket, PacketType};
//!
//! let mut machine = ConnectionStateMachine::new(
//!     Channel::Control,
//!     0x0102_0304,
//!     Default::default(),
//!     Credentials::new("user", "pass"),
//!     "riglink",
//! );
//! let now = Instant::now();
//! machine.start(None, now);
//!
//! let probe = decode(&machine.poll_transmit().unwrap()).unwrap();
//! assert_eq!(probe.packet_type(), PacketType::AreYouThere);
//!
//! let reply = IcomPacket::i_am_here(0xAAAA, 0x0102_0304, 0x1234);
//! machine.on_packet_received(&reply.encode(), now);
//! assert_eq!(machine.state_kind(), Some(StateKind::AreYouReady));
//! assert_eq!(machine.their_identifier(), Some(0x1234));
//! ```

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::time::Instant;

use riglink_core::audio::AudioPipeline;
use riglink_core::events::LinkEvent;
use riglink_core::types::{Channel, ChannelStatus, Credentials, ResetReason, StateKind};
use tracing::{debug, info, trace, warn};

use crate::config::ProtocolConfig;
use crate::context::ChannelContext;
use crate::packet::{self, IcomPacket, PacketType};
use crate::state::{State, Transition};

/// Owns exactly one active state for one channel, plus the channel's
/// identifiers and sequence counters.
pub struct ConnectionStateMachine {
    ctx: ChannelContext,
    /// `None` before `start()` and after `stop()`.
    state: Option<State>,
    events: VecDeque<LinkEvent>,
}

impl ConnectionStateMachine {
    pub fn new(
        channel: Channel,
        our_identifier: u32,
        config: ProtocolConfig,
        credentials: Credentials,
        client_name: impl Into<String>,
    ) -> Self {
        ConnectionStateMachine {
            ctx: ChannelContext::new(channel, our_identifier, config, credentials, client_name.into()),
            state: None,
            events: VecDeque::new(),
        }
    }

    /// Attach the audio pipeline used while streaming.
    pub fn with_audio_pipeline(mut self, pipeline: Box<dyn AudioPipeline>) -> Self {
        self.ctx.audio = Some(pipeline);
        self
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Forget any previous session and enter AreYouThere.
    pub fn start(&mut self, endpoint: Option<SocketAddr>, now: Instant) {
        self.ctx.endpoint = endpoint;
        info!(channel = %self.ctx.channel, endpoint = ?endpoint, "starting channel");
        self.reset(ResetReason::Started, now);
    }

    /// Leave the active state. A bound channel tells the radio with an
    /// untracked Disconnect, left in the outbox for the owner to flush.
    pub fn stop(&mut self) {
        let Some(state) = self.state.take() else {
            return;
        };
        state.exit(&mut self.ctx);

        if let Some(their_id) = self.ctx.their_id {
            let bye = IcomPacket::disconnect(self.ctx.our_id, their_id);
            self.ctx.transmit(&bye);
        }
        self.ctx.status.bound = false;
        self.ctx.status.authenticated = false;
        debug!(channel = %self.ctx.channel, "channel stopped");
        self.events.push_back(LinkEvent::Stopped {
            channel: self.ctx.channel,
        });
    }

    pub fn is_running(&self) -> bool {
        self.state.is_some()
    }

    // -----------------------------------------------------------------------
    // Events from the outside
    // -----------------------------------------------------------------------

    /// Decode and dispatch one inbound datagram.
    pub fn on_packet_received(&mut self, raw: &[u8], now: Instant) {
        let Some(state) = self.state.as_mut() else {
            return;
        };

        let packet = match packet::decode(raw) {
            Ok(p) => p,
            Err(e) => {
                debug!(channel = %self.ctx.channel, error = %e, "dropping undecodable datagram");
                return;
            }
        };

        if self.ctx.their_id.is_some() && packet.receiver_id() != self.ctx.our_id {
            trace!(
                channel = %self.ctx.channel,
                receiver = packet.receiver_id(),
                "ignoring packet addressed elsewhere"
            );
            return;
        }

        trace!(
            channel = %self.ctx.channel,
            packet_type = ?packet.packet_type(),
            seq = packet.sequence(),
            "recv"
        );

        let transition = if packet.packet_type() == PacketType::Disconnect {
            self.ctx
                .their_id
                .map(|_| Transition::Reset(ResetReason::RemoteDisconnect))
        } else {
            state.on_receive_packet(&mut self.ctx, &packet, now)
        };

        if let Some(t) = transition {
            self.apply(t, now);
        }
    }

    /// Run the active state's periodic work.
    pub fn on_timer_tick(&mut self, now: Instant) {
        let Some(state) = self.state.as_mut() else {
            return;
        };
        if let Some(t) = state.on_timer_tick(&mut self.ctx, now) {
            self.apply(t, now);
        }
    }

    /// The socket failed or reported a disconnect.
    pub fn on_transport_disconnect(&mut self, now: Instant) {
        if self.state.is_some() {
            self.reset(ResetReason::TransportDisconnect, now);
        }
    }

    // -----------------------------------------------------------------------
    // Transitions
    // -----------------------------------------------------------------------

    fn apply(&mut self, transition: Transition, now: Instant) {
        match transition {
            Transition::To(kind) => self.transition_to(kind, now),
            Transition::Reset(reason) => self.reset(reason, now),
        }
    }

    /// Exit the old state, then construct and enter the new one.
    fn transition_to(&mut self, kind: StateKind, now: Instant) {
        let from = match self.state.take() {
            Some(old) => {
                let from = old.kind();
                old.exit(&mut self.ctx);
                Some(from)
            }
            None => None,
        };

        let new = State::enter(kind, &mut self.ctx, now);
        self.state = Some(new);

        let channel = self.ctx.channel;
        let status = &mut self.ctx.status;
        status.state = kind;
        if kind == StateKind::SteadyState {
            status.authenticated = true;
        }
        if kind.is_established() {
            status.dead = false;
        }

        debug!(channel = %channel, from = ?from, to = %kind, "state transition");
        if let Some(from) = from {
            self.events.push_back(LinkEvent::StateChanged {
                channel,
                from,
                to: kind,
            });
        }
        if kind.is_established() {
            info!(channel = %channel, state = %kind, "channel established");
            self.events.push_back(LinkEvent::Established { channel });
        }
    }

    /// Fall back to AreYouThere with a fresh session.
    fn reset(&mut self, reason: ResetReason, now: Instant) {
        let from = match self.state.take() {
            Some(old) => {
                let from = old.kind();
                old.exit(&mut self.ctx);
                Some(from)
            }
            None => None,
        };
        if reason.is_failure() {
            warn!(channel = %self.ctx.channel, state = ?from, %reason, "channel reset");
        }

        self.ctx.clear_session();
        self.note_reset(reason);
        self.state = Some(State::enter(StateKind::AreYouThere, &mut self.ctx, now));
        self.ctx.status.state = StateKind::AreYouThere;

        if let Some(from) = from.filter(|k| *k != StateKind::AreYouThere) {
            self.events.push_back(LinkEvent::StateChanged {
                channel: self.ctx.channel,
                from,
                to: StateKind::AreYouThere,
            });
        }
    }

    fn note_reset(&mut self, reason: ResetReason) {
        let status = &mut self.ctx.status;
        if reason.is_failure() {
            status.resets += 1;
            status.dead = true;
        }
        self.events.push_back(LinkEvent::Reset {
            channel: self.ctx.channel,
            reason,
        });
    }

    // -----------------------------------------------------------------------
    // Queries and output
    // -----------------------------------------------------------------------

    /// When `on_timer_tick` next has work, if the channel is running.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.state.as_ref().and_then(|s| s.next_deadline(&self.ctx))
    }

    /// Next encoded datagram to send.
    pub fn poll_transmit(&mut self) -> Option<Vec<u8>> {
        self.ctx.outbox.pop_front()
    }

    /// Next event raised since the last poll.
    pub fn poll_event(&mut self) -> Option<LinkEvent> {
        self.events.pop_front()
    }

    pub fn status(&self) -> &ChannelStatus {
        &self.ctx.status
    }

    pub fn channel(&self) -> Channel {
        self.ctx.channel
    }

    pub fn state_kind(&self) -> Option<StateKind> {
        self.state.as_ref().map(State::kind)
    }

    pub fn our_identifier(&self) -> u32 {
        self.ctx.our_id
    }

    pub fn their_identifier(&self) -> Option<u32> {
        self.ctx.their_id
    }

    pub fn endpoint(&self) -> Option<SocketAddr> {
        self.ctx.endpoint
    }

    /// Tracked packets awaiting acknowledgment in the active state.
    pub fn pending_len(&self) -> usize {
        self.state.as_ref().map_or(0, State::pending_len)
    }
}
